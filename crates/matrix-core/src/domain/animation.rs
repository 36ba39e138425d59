//! Frames, animations and frame-by-frame playback.
//!
//! An [`Animation`] is an ordered list of [`Frame`]s.  It knows nothing about
//! hardware: playback pushes each grid into one or more [`FrameSink`]s (the
//! driver crate implements the trait for its device controllers) and sleeps
//! on a [`StopSignal`] between frames so that a stop request interrupts the
//! wait immediately instead of after the current frame's full duration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::grid::{DisplayGeometry, Grid, ModelError};
use super::signal::{StopReason, StopSignal};

/// Duration given to the blank placeholder frame of an empty animation.
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(330);

/// One grid shown for a fixed amount of time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    grid: Grid,
    duration: Duration,
}

impl Frame {
    /// Creates a frame from an already validated duration.
    pub fn new(grid: Grid, duration: Duration) -> Self {
        Self { grid, duration }
    }

    /// Creates a frame from a duration in (possibly fractional) seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidFrameDuration`] for negative, NaN or
    /// infinite values.
    pub fn from_secs(grid: Grid, secs: f64) -> Result<Self, ModelError> {
        Ok(Self::new(grid, duration_from_secs(secs)?))
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// How long the frame stays on screen.  Zero means "advance immediately".
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Converts float seconds to a [`Duration`], rejecting negative and non-finite input.
pub fn duration_from_secs(secs: f64) -> Result<Duration, ModelError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(ModelError::InvalidFrameDuration(secs));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ModelError::InvalidFrameDuration(secs))
}

/// Destination for rendered grids.
///
/// Implemented by device controllers in the driver crate and by test doubles.
pub trait FrameSink {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Shows `grid` on the sink.
    fn show_grid(&self, grid: &Grid) -> Result<(), Self::Error>;
}

impl<T: FrameSink + ?Sized> FrameSink for &T {
    type Error = T::Error;

    fn show_grid(&self, grid: &Grid) -> Result<(), Self::Error> {
        (**self).show_grid(grid)
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Arc<T> {
    type Error = T::Error;

    fn show_grid(&self, grid: &Grid) -> Result<(), Self::Error> {
        (**self).show_grid(grid)
    }
}

/// How a playback ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every frame was shown (once, for non-looping animations).
    Completed { frames_shown: usize },
    /// The stop signal fired before the animation finished.
    Stopped {
        reason: StopReason,
        frames_shown: usize,
    },
}

impl PlaybackOutcome {
    pub fn frames_shown(&self) -> usize {
        match self {
            PlaybackOutcome::Completed { frames_shown }
            | PlaybackOutcome::Stopped { frames_shown, .. } => *frames_shown,
        }
    }
}

/// Errors that abort a playback.
#[derive(Debug, Error)]
pub enum PlaybackError<E: std::error::Error + 'static> {
    /// `play` was called while the same animation was already playing.
    #[error("animation is already playing")]
    AlreadyPlaying,

    /// A sink rejected a frame.
    #[error("failed to show frame {frame}")]
    Sink {
        frame: usize,
        #[source]
        source: E,
    },
}

/// An ordered sequence of frames, optionally looping.
#[derive(Debug)]
pub struct Animation {
    frames: Vec<Frame>,
    looping: bool,
    playing: AtomicBool,
}

impl Animation {
    /// Creates an animation.  An empty `frames` list is replaced by a single
    /// blank frame of the default display geometry.
    pub fn new(frames: Vec<Frame>, looping: bool) -> Self {
        let frames = if frames.is_empty() {
            vec![Frame::new(
                DisplayGeometry::default().blank_grid(),
                DEFAULT_FRAME_DURATION,
            )]
        } else {
            frames
        };
        Self {
            frames,
            looping,
            playing: AtomicBool::new(false),
        }
    }

    /// Builds a non-looping animation where every grid gets `duration`.
    pub fn from_grids(grids: impl IntoIterator<Item = Grid>, duration: Duration) -> Self {
        let frames = grids
            .into_iter()
            .map(|grid| Frame::new(grid, duration))
            .collect();
        Self::new(frames, false)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Returns `true` while a [`play`](Self::play) call is in progress.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Sum of all frame durations for a single pass.
    pub fn total_duration(&self) -> Duration {
        self.frames.iter().map(Frame::duration).sum()
    }

    /// Overwrites every frame's duration.
    pub fn set_all_frame_durations(&mut self, duration: Duration) {
        for frame in &mut self.frames {
            frame.duration = duration;
        }
    }

    /// Plays the animation on every sink in `sinks`, frame by frame.
    ///
    /// Each frame is pushed to all sinks in order, then playback waits for
    /// the frame's duration on `stop`.  Playback ends when every frame has
    /// been shown (non-looping) or when `stop` fires.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::AlreadyPlaying`] if this animation is already being played.
    /// - [`PlaybackError::Sink`] if any sink fails; playback stops at that frame.
    pub fn play<S: FrameSink>(
        &self,
        sinks: &[S],
        stop: &StopSignal,
    ) -> Result<PlaybackOutcome, PlaybackError<S::Error>> {
        if self.playing.swap(true, Ordering::AcqRel) {
            return Err(PlaybackError::AlreadyPlaying);
        }
        let _playing = PlayingFlag(&self.playing);

        let mut frames_shown = 0;
        loop {
            for (index, frame) in self.frames.iter().enumerate() {
                if let Some(reason) = stop.reason() {
                    return Ok(PlaybackOutcome::Stopped {
                        reason,
                        frames_shown,
                    });
                }
                for sink in sinks {
                    sink.show_grid(frame.grid())
                        .map_err(|source| PlaybackError::Sink {
                            frame: index,
                            source,
                        })?;
                }
                frames_shown += 1;
                if let Some(reason) = stop.wait_timeout(frame.duration()) {
                    return Ok(PlaybackOutcome::Stopped {
                        reason,
                        frames_shown,
                    });
                }
            }
            if !self.looping {
                return Ok(PlaybackOutcome::Completed { frames_shown });
            }
        }
    }
}

impl Clone for Animation {
    fn clone(&self) -> Self {
        Self {
            frames: self.frames.clone(),
            looping: self.looping,
            playing: AtomicBool::new(false),
        }
    }
}

impl PartialEq for Animation {
    fn eq(&self, other: &Self) -> bool {
        self.looping == other.looping && self.frames == other.frames
    }
}

/// Clears the playing flag when playback returns or unwinds.
struct PlayingFlag<'a>(&'a AtomicBool);

impl Drop for PlayingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
