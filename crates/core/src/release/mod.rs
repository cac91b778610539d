//! Release records and the persist → dedup → filter → push pipeline.

mod pipeline;
mod types;

pub use pipeline::{ReleasePipeline, ReleaseSink};
pub use types::*;
