//! Consistency run pipeline components.
//!
//! - **discovery**: Find image files in the input folder
//! - **extract**: Parse service responses and test for subject mentions
//! - **collector**: Repeat the captioning call per image and gather records

pub mod collector;
pub mod discovery;
pub mod extract;

// Re-exports for convenient access
pub use collector::{AttemptEvent, AttemptOutcome, CollectOptions, Collector};
pub use discovery::{image_id_for, FileDiscovery};
pub use extract::{Extractor, MentionMatcher, SubstringMatcher};
