//! Application layer: how a group of LED matrices is driven.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rendering and topology rules in `matrix-core`) and the
//! infrastructure (serial ports, files).  Code here depends on traits such
//! as `DeviceTransport` rather than on a concrete port, so every use case can
//! be tested against the in-memory recording transport.
//!
//! # Sub-modules
//!
//! - **`sync_gate`** – Per-device command lock, breather pausing and
//!   thread-misuse warnings around every device command.
//!
//! - **`keep_alive`** – Background wake pings so idle displays stay on.
//!
//! - **`breather`** – Optional brightness "breathing" effect, paused while
//!   frames are drawn.
//!
//! - **`history`** – Bounded record of what each display showed, used for
//!   "go back" and brightness restore.
//!
//! - **`controller`** – `MatrixController`, one device assembled from the
//!   pieces above by an ordered builder.
//!
//! - **`execution_guard`** – Time-boxed sessions with guaranteed cleanup.
//!
//! - **`operations`** – The caller-facing use cases: scroll text (optionally
//!   spanned across matrices), display static text and identify.
//!
//! - **`runtime`** – Bridges the blocking operations into the async binary:
//!   Ctrl-C becomes an interrupt on the shared stop signal.

pub mod breather;
pub mod controller;
pub mod execution_guard;
pub mod history;
pub mod keep_alive;
pub mod operations;
pub mod runtime;
pub mod sync_gate;
