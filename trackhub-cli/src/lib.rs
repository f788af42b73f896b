//! Library side of the `trackhub` binary: configuration, wiring and rendering.

/// Assembly of the tracking service from configuration.
pub mod app;
/// TOML configuration.
pub mod config;
/// Plain-text output.
pub mod output;

pub use app::App;
pub use config::Config;
