//! HTTP API layer for the analytics engine.

pub mod extractors;
pub mod response;
pub mod routes;
pub mod sessions;
pub mod state;

pub use routes::router;
pub use sessions::{AdminSessions, HeaderTokenSessions};
pub use state::AppState;
