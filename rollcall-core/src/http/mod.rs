//! HTTP surface
//!
//! The redirect and callback endpoints of the identity link round trip,
//! plus the webhook the platform adapter posts join events to.

pub mod api;
pub mod handlers;
pub mod server;
pub mod state;

pub use api::build_router;
pub use server::HttpServer;
pub use state::AppState;
