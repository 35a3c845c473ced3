pub mod scorer;

pub use scorer::{ReRanker, RetrievalResult};
