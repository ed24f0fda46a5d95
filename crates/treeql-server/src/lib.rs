//! TreeQL Server
//!
//! Serves TreeQL queries over HTTP against an in-memory engine loaded from a
//! JSON fixture.
//!
//! - `config` - [`ServerConfig`], loadable from a JSON file
//! - `fixture` - Schema and row fixtures
//! - `http` - The Axum router (`POST /query`, `GET /health`)
//! - `server` - Listener lifecycle

pub mod config;
pub mod fixture;
pub mod http;
pub mod server;

pub use config::ServerConfig;
pub use fixture::Fixture;
pub use http::create_router;
pub use server::Server;
