//! Infrastructure layer for the matrix driver.
//!
//! Contains OS-facing adapters: the serial transport to the displays,
//! device discovery from configuration, and file-system storage.
//!
//! **Dependency rule**: this layer may depend on `matrix_core`, but the
//! domain crate never imports it.  Application code reaches it only through
//! the [`transport::DeviceTransport`] and [`discovery::DeviceSource`] traits.

pub mod discovery;
pub mod storage;
pub mod transport;
