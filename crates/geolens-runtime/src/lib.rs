//! `geolens-runtime` – running a geolens session.
//!
//! # Modules
//!
//! - [`session`] – [`SessionController`][session::SessionController]: the
//!   state machine that probes capabilities, feeds location/agent updates to
//!   the proximity engine and the scene manager, and tears everything down.
//! - [`config`] – [`SessionConfig`][config::SessionConfig]: render budget,
//!   visibility default, orientation tracking, jitter and load timeout, read
//!   from `~/.geolens/config.toml` with `GEOLENS_*` overrides.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod config;
pub mod session;
pub mod telemetry;

pub use config::SessionConfig;
pub use session::SessionController;
pub use telemetry::{TracerProviderGuard, init_tracing};
