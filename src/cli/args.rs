//! Command-line arguments for blogforge

use crate::config::ForgeConfig;
use crate::errors::{ForgeError, Result};
use crate::types::{GenerationRequest, LengthClass};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// blogforge - grounded blog posts from your own archive and a local model
#[derive(Parser, Debug)]
#[command(name = "blogforge")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Generate SEO-ready blog posts grounded in an existing markdown corpus", long_about = None)]
pub struct Args {
    /// Configuration file path (default ~/.blogforge/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Use the feature-hashing embedder instead of a model
    #[arg(long, global = true)]
    pub offline: bool,

    /// Verbosity: -v for debug logs, -vv for trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index the corpus into the knowledge base
    Ingest {
        /// Re-embed every file, not only changed ones
        #[arg(long)]
        force: bool,
    },

    /// Generate and publish a post on a topic
    Generate(GenerateArgs),

    /// Search the knowledge base directly
    Search {
        query: String,

        #[arg(short, default_value_t = 5)]
        k: usize,
    },

    /// Show knowledge base statistics
    Stats,

    /// Clear the knowledge base and its manifest
    Reset,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GenerateArgs {
    pub topic: String,

    #[arg(long, default_value = "technical")]
    pub style: String,

    /// short, medium or long
    #[arg(long)]
    pub length: Option<LengthClass>,

    #[arg(long = "category")]
    pub categories: Vec<String>,

    #[arg(long = "tag")]
    pub tags: Vec<String>,

    #[arg(long = "keyword")]
    pub keywords: Vec<String>,

    #[arg(long, default_value = "informative")]
    pub tone: String,

    #[arg(long)]
    pub min_words: Option<usize>,

    #[arg(long)]
    pub max_words: Option<usize>,

    /// Run every stage and validate, but do not write the post
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    /// Default tracing filter for the chosen verbosity
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "blogforge=info",
            1 => "blogforge=debug",
            _ => "blogforge=trace",
        }
    }

    /// Explicit file or the default location, env overrides applied
    pub fn load_config(&self) -> Result<ForgeConfig> {
        match &self.config {
            Some(path) => ForgeConfig::load_from(path),
            None => ForgeConfig::load(),
        }
    }
}

impl GenerateArgs {
    /// An explicit word range needs both ends; it overrides `--length`
    pub fn to_request(&self, config: &ForgeConfig) -> Result<GenerationRequest> {
        let mut builder = GenerationRequest::builder(self.topic.clone())
            .style(self.style.clone())
            .categories(self.categories.clone())
            .tags(self.tags.clone())
            .keywords(self.keywords.clone())
            .tone(self.tone.clone());
        if let Some(length) = self.length {
            builder = builder.length(length);
        }

        match (self.min_words, self.max_words) {
            (None, None) => {}
            (min, max) => {
                let min = min.unwrap_or(config.generation.min_words);
                let max = max.unwrap_or(config.generation.max_words);
                if min >= max {
                    return Err(ForgeError::Config(format!(
                        "--min-words ({}) must be below --max-words ({})",
                        min, max
                    )));
                }
                builder = builder.word_range(min, max);
            }
        }

        if self.topic.trim().is_empty() {
            return Err(ForgeError::Config("topic must not be empty".to_string()));
        }
        Ok(builder.build())
    }
}
