//! HTTP layer for tally.
//!
//! - **Endpoints**: voting pages, admin pages and JSON admin actions
//! - **Extractors**: client address, admin access
//! - **Middleware**: shared state, cache headers
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod html;
pub mod middleware;

pub use endpoints::router;
pub use middleware::{AppState, SiteSettings};
