//! Blogging module library.
//!
//! Entries with publish and pin policies, runtime content templates, HTML
//! views and a REST API. The `blogging` binary serves it; integration tests
//! drive the same router over the in-memory store.

pub mod cli;
pub mod config;
pub mod content;
pub mod csrf;
pub mod db;
pub mod error;
pub mod models;
pub mod policy;
pub mod routes;
pub mod serializers;
pub mod session;
pub mod state;
pub mod store;
pub mod template;
pub mod theme;

pub use config::Config;
pub use state::AppState;
