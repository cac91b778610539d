//! HTTP control plane for the trawler announce pipeline.

pub mod api;
pub mod session;
pub mod state;

pub use api::create_router;
pub use state::AppState;
