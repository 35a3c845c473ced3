//! Collision-safe post publishing
//!
//! Posts are written as `{YYYY-MM-DD}-{slug}.md` through a sibling temp
//! file that is linked into place only if no file of that name exists. A
//! taken slug or file name moves on to the next numeric suffix.

use super::slug::unique_slug;
use crate::config::ForgeConfig;
use crate::errors::{ForgeError, Result};
use crate::ingest::split_frontmatter;
use crate::persist::write_new;
use crate::types::{FrontMatter, GeneratedPost};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A post as it landed on disk
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedPost {
    pub path: PathBuf,
    /// The post with its final, possibly suffixed, slug
    pub post: GeneratedPost,
}

#[derive(Debug, Clone)]
pub struct Publisher {
    output_dir: PathBuf,
    layout: String,
}

impl Publisher {
    pub fn new(output_dir: impl Into<PathBuf>, layout: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            layout: layout.into(),
        }
    }

    pub fn from_config(config: &ForgeConfig) -> Self {
        Self::new(config.paths.output_dir.clone(), config.seo.layout.clone())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn layout(&self) -> &str {
        &self.layout
    }

    /// Slugs of the posts already in the output directory, read from their
    /// `{YYYY-MM-DD}-{slug}.md` file names
    pub fn existing_slugs(&self) -> Result<BTreeSet<String>> {
        let entries = match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };

        let mut slugs = BTreeSet::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            if let Some(slug) = path.file_stem().and_then(|s| s.to_str()).and_then(slug_from_stem) {
                slugs.insert(slug.to_string());
            }
        }
        Ok(slugs)
    }

    /// The slug `post` would be published under right now
    pub fn next_slug(&self, base: &str) -> Result<String> {
        Ok(unique_slug(base, &self.existing_slugs()?))
    }

    /// Frontmatter block followed by the body
    pub fn render(&self, post: &GeneratedPost) -> Result<String> {
        let yaml = serde_yaml::to_string(&post.front_matter(&self.layout))?;
        Ok(format!("---\n{}---\n\n{}\n", yaml, post.body.trim_end()))
    }

    pub fn publish(&self, mut post: GeneratedPost) -> Result<PublishedPost> {
        let base = post.slug.clone();
        let mut taken = self.existing_slugs()?;

        loop {
            post.slug = unique_slug(&base, &taken);
            let path = self.output_dir.join(post.file_name());
            let rendered = self.render(&post)?;

            match write_new(&path, rendered.as_bytes()) {
                Ok(()) => {
                    info!(path = %path.display(), slug = %post.slug, words = post.word_count(), "Post published");
                    return Ok(PublishedPost { path, post });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(slug = %post.slug, "File name taken, trying next suffix");
                    taken.insert(post.slug.clone());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Parse a published file back into its frontmatter and body
pub fn read_post(path: &Path) -> Result<(FrontMatter, String)> {
    let raw = fs::read_to_string(path)?;
    let (yaml, body) = split_frontmatter(&raw).ok_or_else(|| {
        ForgeError::validation("invalid_front_matter", format!("{} has no frontmatter", path.display()))
    })?;
    let front_matter: FrontMatter = serde_yaml::from_str(yaml)?;
    Ok((front_matter, body.trim().to_string()))
}

fn slug_from_stem(stem: &str) -> Option<&str> {
    let (date, slug) = (stem.get(..10)?, stem.get(11..)?);
    let date_shaped = date
        .char_indices()
        .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
    (date_shaped && stem.as_bytes().get(10) == Some(&b'-') && !slug.is_empty()).then_some(slug)
}
