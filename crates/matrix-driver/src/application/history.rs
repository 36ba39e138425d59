//! Rolling record of what a display has shown.
//!
//! Every draw, clear, text, percentage, animation and brightness change on a
//! controller appends one [`DisplayEvent`].  The buffer is bounded: once
//! `max_len` events are stored the oldest is dropped.  Events that put a
//! known picture on the display carry a snapshot of it, which is what
//! `MatrixController::go_back` redraws.
//!
//! Brightness is tracked separately from the buffer so that
//! `restore_last_brightness` keeps working even with `max_len == 0`.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use matrix_core::Grid;

/// Events kept per device unless configured otherwise.
pub const DEFAULT_HISTORY_LEN: usize = 256;

/// What happened on the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayAction {
    Grid,
    Clear,
    Text(String),
    Percentage(u8),
    /// A host-side animation ended after `frames_shown` frames.
    Animation { frames_shown: usize },
    Brightness { value: u8, previous: Option<u8> },
    /// An earlier snapshot was redrawn, `steps` events back.
    Restore { steps: usize },
}

/// One entry of a [`DisplayHistory`].
#[derive(Debug, Clone)]
pub struct DisplayEvent {
    pub at: SystemTime,
    pub action: DisplayAction,
    /// Brightness in effect when the event was recorded, if known.
    pub brightness: Option<u8>,
    /// The picture left on the display, when known.
    pub grid: Option<Grid>,
}

#[derive(Default)]
struct HistoryState {
    events: VecDeque<DisplayEvent>,
    brightness: Option<u8>,
    last_brightness: Option<u8>,
    on_screen: Option<Grid>,
}

/// Bounded, thread-safe display history for one device.
pub struct DisplayHistory {
    max_len: usize,
    state: Mutex<HistoryState>,
}

impl DisplayHistory {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            state: Mutex::new(HistoryState {
                events: VecDeque::with_capacity(max_len.min(DEFAULT_HISTORY_LEN)),
                ..HistoryState::default()
            }),
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Appends an event, evicting the oldest one when full.
    pub fn record(&self, action: DisplayAction, grid: Option<Grid>) {
        let mut state = self.lock();
        if let Some(grid) = &grid {
            state.on_screen = Some(grid.clone());
        }
        let event = DisplayEvent {
            at: SystemTime::now(),
            action,
            brightness: state.brightness,
            grid,
        };
        Self::push(&mut state, event, self.max_len);
    }

    /// Remembers `grid` as the picture on the display without adding an
    /// event.  Used for animation frames.
    pub fn note_frame(&self, grid: &Grid) {
        self.lock().on_screen = Some(grid.clone());
    }

    /// The last picture drawn, including animation frames.
    pub fn on_screen(&self) -> Option<Grid> {
        self.lock().on_screen.clone()
    }

    /// Records a brightness change; the value in effect before becomes the
    /// one [`last_brightness`](Self::last_brightness) returns.
    pub fn record_brightness(&self, value: u8) {
        let mut state = self.lock();
        let previous = state.brightness;
        if previous.is_some() {
            state.last_brightness = previous;
        }
        state.brightness = Some(value);
        let event = DisplayEvent {
            at: SystemTime::now(),
            action: DisplayAction::Brightness { value, previous },
            brightness: Some(value),
            grid: None,
        };
        Self::push(&mut state, event, self.max_len);
    }

    /// Brightness set most recently, if any was recorded.
    pub fn brightness(&self) -> Option<u8> {
        self.lock().brightness
    }

    /// Brightness in effect before the most recent change.
    pub fn last_brightness(&self) -> Option<u8> {
        self.lock().last_brightness
    }

    /// The most recent event.
    pub fn current(&self) -> Option<DisplayEvent> {
        self.lock().events.back().cloned()
    }

    /// Snapshot carried by the most recent event.
    pub fn current_grid(&self) -> Option<Grid> {
        self.lock().events.back().and_then(|event| event.grid.clone())
    }

    /// The event `steps` entries before the current one (`0` is the current
    /// event), or `None` when the history is not that deep.
    pub fn steps_back(&self, steps: usize) -> Option<DisplayEvent> {
        let state = self.lock();
        let index = state.events.len().checked_sub(steps + 1)?;
        state.events.get(index).cloned()
    }

    /// All stored events, oldest first.
    pub fn events(&self) -> Vec<DisplayEvent> {
        self.lock().events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    fn push(state: &mut HistoryState, event: DisplayEvent, max_len: usize) {
        if max_len == 0 {
            return;
        }
        while state.events.len() >= max_len {
            state.events.pop_front();
        }
        state.events.push_back(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DisplayHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

impl std::fmt::Debug for DisplayHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayHistory")
            .field("max_len", &self.max_len)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(value: u8) -> Grid {
        Grid::filled(9, 34, value)
    }

    #[test]
    fn test_history_is_bounded_and_drops_oldest() {
        // Arrange
        let history = DisplayHistory::new(3);

        // Act
        for n in 0..5 {
            history.record(DisplayAction::Percentage(n), None);
        }

        // Assert
        let actions: Vec<_> = history.events().into_iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                DisplayAction::Percentage(2),
                DisplayAction::Percentage(3),
                DisplayAction::Percentage(4),
            ]
        );
    }

    #[test]
    fn test_zero_length_history_keeps_no_events() {
        let history = DisplayHistory::new(0);

        history.record(DisplayAction::Grid, Some(grid(1)));
        history.record_brightness(40);

        assert!(history.is_empty());
        assert_eq!(history.brightness(), Some(40));
        assert_eq!(history.on_screen(), Some(grid(1)));
    }

    #[test]
    fn test_current_grid_follows_latest_event() {
        let history = DisplayHistory::default();

        history.record(DisplayAction::Grid, Some(grid(1)));
        assert_eq!(history.current_grid(), Some(grid(1)));

        history.record_brightness(50);
        assert!(history.current_grid().is_none());
        assert_eq!(history.current().unwrap().brightness, Some(50));
    }

    #[test]
    fn test_steps_back_counts_from_current_event() {
        let history = DisplayHistory::default();
        history.record(DisplayAction::Grid, Some(grid(1)));
        history.record(DisplayAction::Clear, Some(grid(0)));

        assert_eq!(history.steps_back(0).unwrap().action, DisplayAction::Clear);
        assert_eq!(history.steps_back(1).unwrap().grid, Some(grid(1)));
        assert!(history.steps_back(2).is_none());
    }

    #[test]
    fn test_last_brightness_tracks_previous_value() {
        // Arrange
        let history = DisplayHistory::default();

        // Act / Assert: nothing to go back to after the first change.
        history.record_brightness(30);
        assert_eq!(history.last_brightness(), None);

        history.record_brightness(80);
        assert_eq!(history.last_brightness(), Some(30));
        assert_eq!(
            history.current().unwrap().action,
            DisplayAction::Brightness {
                value: 80,
                previous: Some(30)
            }
        );
    }

    #[test]
    fn test_note_frame_updates_screen_without_event() {
        let history = DisplayHistory::default();

        history.note_frame(&grid(1));

        assert!(history.is_empty());
        assert_eq!(history.on_screen(), Some(grid(1)));
    }
}
