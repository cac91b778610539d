//! Announce parsing: regex rule engine, variable binding and URL templating.

mod multiline;
mod parser;
pub mod template;

pub use multiline::MultiLineBuffer;
pub use parser::AnnounceProcessor;

use thiserror::Error;

/// Errors from building or running an announce rule.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid parse pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The line matched a rule but the composed release is unusable
    /// (empty or schemeless URL, no release name).
    #[error("Invalid release: {0}")]
    InvalidRelease(String),
}
