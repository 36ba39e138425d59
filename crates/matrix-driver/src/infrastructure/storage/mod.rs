//! Storage infrastructure: configuration and runtime-state persistence.
//!
//! - `config` reads the TOML configuration from the platform-appropriate
//!   directory and converts its sections into domain types.
//! - `state` persists the small amount of runtime state (first run,
//!   identified displays) next to it.
//!
//! Both fall back to defaults when their file does not exist yet, so the
//! driver works on first run without any setup.

pub mod config;
pub mod state;
