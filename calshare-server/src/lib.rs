//! HTTP surface of calshare.

pub mod extract;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
