//! Physical ordering of devices around the keyboard.
//!
//! When several matrices are treated as one wide canvas, the pixel columns of
//! the canvas must land on the displays in the order they physically sit.
//! [`TopologyRanker`] derives that order from each device's [`Location`].
//!
//! # Ranking keys
//!
//! "Leftmost" picks the minimum of `(side_rank, slot, original_index)` with
//! `left = 0`, `unknown = 1`, `right = 2`.  "Rightmost" picks the minimum of
//! `(side_rank', -slot, original_index)` with `right = 0`, `unknown = 1`,
//! `left = 2`.  Unknown devices rank between the two sides: an unknown device
//! is an extreme whenever the opposite side has no devices left, and a set of
//! only unknown devices keeps its input order.
//! The trailing index makes both keys total orders, so repeated calls always
//! produce the same result.

use std::sync::Arc;

use super::device::{DeviceHandle, Location, Side};

/// Anything with a physical location that can be ranked.
pub trait Positioned {
    fn location(&self) -> Location;
}

impl Positioned for DeviceHandle {
    fn location(&self) -> Location {
        DeviceHandle::location(self)
    }
}

impl Positioned for Location {
    fn location(&self) -> Location {
        *self
    }
}

impl<T: Positioned + ?Sized> Positioned for &T {
    fn location(&self) -> Location {
        (**self).location()
    }
}

impl<T: Positioned + ?Sized> Positioned for Arc<T> {
    fn location(&self) -> Location {
        (**self).location()
    }
}

/// Which extreme a span ordering starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpanStart {
    Left,
    #[default]
    Right,
}

/// Sort key for one candidate.  Field order is the comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RankedEntry {
    side_rank: u8,
    slot_rank: i64,
    original_index: usize,
}

impl RankedEntry {
    fn leftmost(location: Location, original_index: usize) -> Self {
        let side_rank = match location.side {
            Side::Left => 0,
            Side::Unknown => 1,
            Side::Right => 2,
        };
        Self {
            side_rank,
            slot_rank: i64::from(location.slot),
            original_index,
        }
    }

    fn rightmost(location: Location, original_index: usize) -> Self {
        let side_rank = match location.side {
            Side::Right => 0,
            Side::Unknown => 1,
            Side::Left => 2,
        };
        Self {
            side_rank,
            slot_rank: -i64::from(location.slot),
            original_index,
        }
    }

    fn for_extreme(extreme: SpanStart, location: Location, original_index: usize) -> Self {
        match extreme {
            SpanStart::Left => Self::leftmost(location, original_index),
            SpanStart::Right => Self::rightmost(location, original_index),
        }
    }
}

/// Stateless ranking helpers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopologyRanker;

impl TopologyRanker {
    /// The device physically furthest left, or `None` for an empty slice.
    pub fn leftmost<T: Positioned>(devices: &[T]) -> Option<&T> {
        Self::extreme_index(devices.iter().map(Positioned::location), SpanStart::Left)
            .map(|i| &devices[i])
    }

    /// The device physically furthest right, or `None` for an empty slice.
    pub fn rightmost<T: Positioned>(devices: &[T]) -> Option<&T> {
        Self::extreme_index(devices.iter().map(Positioned::location), SpanStart::Right)
            .map(|i| &devices[i])
    }

    /// Orders `devices` for a span, starting from the rightmost device.
    ///
    /// See [`order_for_span_from`](Self::order_for_span_from).
    pub fn order_for_span<T: Positioned>(devices: Vec<T>) -> Vec<T> {
        Self::order_for_span_from(devices, SpanStart::Right)
    }

    /// Orders `devices` for a span.
    ///
    /// Takes the extreme named by `start`, then repeatedly takes the opposite
    /// extreme of whatever remains.  The result is always a permutation of the
    /// input.  Original indices break ties, so the order is deterministic.
    pub fn order_for_span_from<T: Positioned>(devices: Vec<T>, start: SpanStart) -> Vec<T> {
        let mut remaining: Vec<(usize, T)> = devices.into_iter().enumerate().collect();
        let mut ordered = Vec::with_capacity(remaining.len());
        let mut extreme = start;

        while !remaining.is_empty() {
            let Some(position) = remaining
                .iter()
                .enumerate()
                .min_by_key(|(_, (index, device))| {
                    RankedEntry::for_extreme(extreme, device.location(), *index)
                })
                .map(|(position, _)| position)
            else {
                break;
            };
            ordered.push(remaining.remove(position).1);
            extreme = match extreme {
                SpanStart::Left => SpanStart::Right,
                SpanStart::Right => SpanStart::Left,
            };
        }
        ordered
    }

    /// Keeps only the devices mounted on `side`, preserving input order.
    pub fn filter_side<T: Positioned>(devices: Vec<T>, side: Side) -> Vec<T> {
        devices
            .into_iter()
            .filter(|device| device.location().side == side)
            .collect()
    }

    fn extreme_index(
        locations: impl Iterator<Item = Location>,
        extreme: SpanStart,
    ) -> Option<usize> {
        locations
            .enumerate()
            .min_by_key(|&(index, location)| RankedEntry::for_extreme(extreme, location, index))
            .map(|(index, _)| index)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
