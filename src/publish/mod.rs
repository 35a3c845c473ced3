//! Validation & Publishing

pub mod slug;
pub mod validator;
pub mod writer;

pub use slug::{is_valid_slug, slugify, unique_slug};
pub use validator::{check_headings, PostValidator, ValidationIssue, ValidationReport};
pub use writer::{read_post, PublishedPost, Publisher};
