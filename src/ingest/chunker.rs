//! Markdown cleaning and overlapping chunking
//!
//! Windows are measured in characters. A window that would cut a word is
//! backed off to the last whitespace, as long as that keeps at least half
//! of the window. Consecutive chunks share `overlap` characters.

use crate::config::ChunkingConfig;
use crate::errors::{ForgeError, Result};
use regex::Regex;

/// Strips link and emphasis markup while leaving code untouched
#[derive(Debug, Clone)]
pub struct MarkdownCleaner {
    fenced_code: Regex,
    inline_code: Regex,
    link: Regex,
    bold: Regex,
    italic_star: Regex,
    italic_underscore: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| ForgeError::Config(format!("bad pattern {}: {}", pattern, e)))
}

impl MarkdownCleaner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            fenced_code: compile(r"(?s)```.*?```")?,
            inline_code: compile(r"`[^`\n]+`")?,
            link: compile(r"\[([^\]]+)\]\([^)]+\)")?,
            bold: compile(r"\*\*([^*]+)\*\*")?,
            italic_star: compile(r"\*([^*\n]+)\*")?,
            italic_underscore: compile(r"(^|[^\w])_([^_\n]+)_")?,
        })
    }

    pub fn clean(&self, markdown: &str) -> String {
        let mut stash: Vec<String> = Vec::new();
        let mut hide = |re: &Regex, text: &str| -> String {
            re.replace_all(text, |caps: &regex::Captures| {
                stash.push(caps[0].to_string());
                format!("\u{0}{}\u{0}", stash.len() - 1)
            })
            .into_owned()
        };

        let text = hide(&self.fenced_code, markdown);
        let text = hide(&self.inline_code, &text);

        let text = self.link.replace_all(&text, "$1");
        let text = self.bold.replace_all(&text, "$1");
        let text = self.italic_star.replace_all(&text, "$1");
        let mut text = self.italic_underscore.replace_all(&text, "$1$2").into_owned();

        for (i, code) in stash.iter().enumerate() {
            text = text.replace(&format!("\u{0}{}\u{0}", i), code);
        }
        text
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    window: usize,
    overlap: usize,
    cleaner: MarkdownCleaner,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        if config.window_chars == 0 || config.overlap_chars >= config.window_chars {
            return Err(ForgeError::Config(format!(
                "chunk overlap ({}) must be smaller than the window ({})",
                config.overlap_chars, config.window_chars
            )));
        }
        Ok(Self {
            window: config.window_chars,
            overlap: config.overlap_chars,
            cleaner: MarkdownCleaner::new()?,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Clean `markdown`, then split it into overlapping windows
    pub fn chunk(&self, markdown: &str) -> Vec<String> {
        let cleaned = self.cleaner.clean(markdown);
        self.split(cleaned.trim())
    }

    fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        if len == 0 {
            return chunks;
        }

        let mut start = 0;
        loop {
            let mut end = (start + self.window).min(len);
            if end < len {
                let floor = start + self.window / 2;
                if let Some(ws) = (floor + 1..end).rev().find(|&i| chars[i].is_whitespace()) {
                    end = ws;
                }
            }

            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }

            if end == len {
                break;
            }
            start = end.saturating_sub(self.overlap).max(start + 1);
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(window: usize, overlap: usize) -> Chunker {
        Chunker::new(&ChunkingConfig {
            window_chars: window,
            overlap_chars: overlap,
        })
        .unwrap()
    }

    #[test]
    fn test_clean_markdown_preserves_code() {
        let cleaner = MarkdownCleaner::new().unwrap();
        let cleaned = cleaner.clean(
            "See [the docs](https://x.dev) for **bold** and *soft* _emphasis_.\n```rust\nlet a = **b;\n```\nand `my_var_name` plus snake_case_word",
        );
        assert!(cleaned.contains("See the docs for bold and soft emphasis."));
        assert!(cleaned.contains("let a = **b;"));
        assert!(cleaned.contains("`my_var_name`"));
        assert!(cleaned.contains("snake_case_word"));
    }

    #[test]
    fn test_chunks_respect_window_and_overlap() {
        let text = (0..400).map(|i| format!("word{} ", i)).collect::<String>();
        let chunker = chunker(120, 20);
        let chunks = chunker.chunk(&text);

        assert!(chunks.len() > 5);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 120);
        }
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(10).collect::<Vec<_>>().into_iter().rev().collect();
            assert!(pair[1].contains(tail.trim()), "no overlap between chunks");
        }
        assert!(chunks.last().unwrap().ends_with("word399"));
    }

    #[test]
    fn test_short_and_empty_text() {
        let chunker = chunker(500, 50);
        assert_eq!(chunker.chunk("Just one line."), vec!["Just one line."]);
        assert!(chunker.chunk("   \n\n ").is_empty());
    }

    #[test]
    fn test_unbroken_text_still_progresses() {
        let chunker = chunker(10, 3);
        let chunks = chunker.chunk(&"x".repeat(35));
        assert!(chunks.iter().all(|c| c.len() <= 10));
        assert_eq!(chunks.len(), 5);
    }

    #[test]
    fn test_overlap_must_be_below_window() {
        let err = Chunker::new(&ChunkingConfig {
            window_chars: 50,
            overlap_chars: 50,
        });
        assert!(err.is_err());
    }
}
