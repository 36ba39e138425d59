//! Domain entities for LED matrix rendering.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain** (or "entities" layer).  Domain code:
//!
//! - Contains the core business rules of the application.
//! - Has **no** imports from OS APIs, serial ports or configuration files.
//! - Can be compiled and tested on any platform without hardware attached.
//!
//! Here the domain is the pixel [`grid::Grid`], the [`animation::Animation`]
//! built from grids, the identity and position of each attached device, and
//! the rules that order several devices into one physically contiguous strip.

/// Timed frames, animations and the [`animation::FrameSink`] playback seam.
pub mod animation;

/// Device identity and keyboard-relative location.
pub mod device;

/// Column-major pixel buffer and display geometry.
pub mod grid;

/// One-shot cancellation latch shared across threads.
pub mod signal;

/// Physical ordering of several devices.
pub mod topology;
