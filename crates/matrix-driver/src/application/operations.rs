//! Caller-facing operations: scroll text, display text, identify.
//!
//! Each operation validates its request, prepares the per-device work and
//! hands an activator to an [`ExecutionGuard`].  The activator fans the work
//! out to the selected controllers, either one thread per device
//! (concurrent) or one device after another (sequential).
//!
//! Concurrent fan-out waits for every worker but gives up waiting as soon as
//! the session's stop signal fires, so guard cleanup is never held hostage
//! by a device that is still finishing its current frame.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use matrix_core::{
    Animation, GlyphError, ScrollConfig, ScrollDirection, SpanCompositor, SpanError, StopReason,
    StopSignal, TextScroller, TopologyRanker,
};

use crate::application::controller::{ControllerError, MatrixController};
use crate::application::execution_guard::{ActivationError, ExecutionGuard, GuardError, GuardState};
use crate::infrastructure::storage::state::{StateError, StateStore};

/// Default number of location/name cycles shown by [`identify`].
pub const DEFAULT_IDENTIFY_CYCLES: u32 = 3;
/// Default time each identify message stays on screen.
pub const DEFAULT_IDENTIFY_HOLD: Duration = Duration::from_secs(3);
/// Default overall identify time limit, in seconds.
pub const DEFAULT_IDENTIFY_RUN_FOR: f64 = 30.0;

/// Errors raised by the operations in this module.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("no LED matrices selected")]
    NoDevices,

    #[error("spanning requires horizontal scrolling, got {0}")]
    SpanRequiresHorizontal(ScrollDirection),

    #[error("spanning cannot be combined with sequential mode")]
    SpanWithSequential,

    #[error("sequential display on several matrices requires run_for")]
    SequentialRequiresRunFor,

    #[error(transparent)]
    Span(#[from] SpanError),

    #[error(transparent)]
    Glyph(#[from] GlyphError),

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    State(#[from] StateError),
}

/// A controller operation failed on one device.
#[derive(Debug)]
pub struct DeviceFailure {
    pub device: String,
    pub source: ControllerError,
}

/// Failures collected by one fan-out.
#[derive(Debug, Error)]
#[error("{} device(s) failed, first: {}", .failures.len(), first_failure(.failures))]
pub struct FanOutError {
    pub failures: Vec<DeviceFailure>,
}

fn first_failure(failures: &[DeviceFailure]) -> String {
    failures
        .first()
        .map(|failure| format!("{}: {}", failure.device, failure.source))
        .unwrap_or_default()
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// Parameters of [`scroll_text`].
#[derive(Debug, Clone)]
pub struct ScrollTextRequest {
    pub text: String,
    pub scroll: ScrollConfig,
    /// Treat the selected matrices as one wide display.
    pub span: bool,
    /// Scroll on one matrix after another instead of all at once.
    pub sequential: bool,
    pub looping: bool,
    /// Keep the matrices awake while scrolling.
    pub keep_alive: bool,
    /// Time limit in seconds.
    pub run_for: Option<f64>,
    pub clear_after: bool,
}

impl ScrollTextRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            scroll: ScrollConfig::default(),
            span: false,
            sequential: false,
            looping: false,
            keep_alive: true,
            run_for: None,
            clear_after: false,
        }
    }
}

/// Parameters of [`display_text`].
#[derive(Debug, Clone)]
pub struct DisplayTextRequest {
    pub text: String,
    pub sequential: bool,
    pub keep_alive: bool,
    /// Without a limit the text stays until interrupted.
    pub run_for: Option<f64>,
    pub clear_after: bool,
}

impl DisplayTextRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sequential: false,
            keep_alive: true,
            run_for: None,
            clear_after: true,
        }
    }
}

/// Parameters of [`identify`].
#[derive(Debug, Clone)]
pub struct IdentifyRequest {
    pub cycles: u32,
    pub hold: Duration,
    pub run_for: Option<f64>,
    pub clear_after: bool,
}

impl Default for IdentifyRequest {
    fn default() -> Self {
        Self {
            cycles: DEFAULT_IDENTIFY_CYCLES,
            hold: DEFAULT_IDENTIFY_HOLD,
            run_for: Some(DEFAULT_IDENTIFY_RUN_FOR),
            clear_after: true,
        }
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

/// Scrolls text across the selected controllers.
///
/// Span and sequential only take effect with more than one controller.  With
/// span on, the controllers are ordered with
/// [`TopologyRanker::order_for_span`] and each plays its own segment of one
/// shared scroll.
///
/// # Errors
///
/// - [`OperationError::SpanRequiresHorizontal`] / [`OperationError::SpanWithSequential`]
///   for invalid span requests.
/// - [`OperationError::Span`] / [`OperationError::Glyph`] if the text cannot be rendered.
/// - [`OperationError::Guard`] for device failures during or after the run.
pub fn scroll_text(
    controllers: &[Arc<MatrixController>],
    request: &ScrollTextRequest,
    guard: &ExecutionGuard,
    stop: &StopSignal,
) -> Result<Vec<GuardState>, OperationError> {
    let first = controllers.first().ok_or(OperationError::NoDevices)?;
    let several = controllers.len() > 1;
    let span = request.span && several;
    let sequential = request.sequential && several;

    if span {
        if !request.scroll.direction.is_horizontal() {
            return Err(OperationError::SpanRequiresHorizontal(request.scroll.direction));
        }
        if sequential {
            return Err(OperationError::SpanWithSequential);
        }
    }

    let glyphs = Arc::clone(first.glyphs());
    let geometry = first.geometry();
    let mut plan: Vec<(Arc<MatrixController>, Animation)> = if span {
        let ordered = TopologyRanker::order_for_span(controllers.to_vec());
        let compositor = SpanCompositor::new(request.scroll, geometry)?;
        let segments = compositor.compose_segments(&request.text, ordered.len(), &glyphs)?;
        ordered.into_iter().zip(segments).collect()
    } else {
        let animation = TextScroller::new(request.scroll, geometry).build(&request.text, &glyphs)?;
        controllers
            .iter()
            .map(|controller| (Arc::clone(controller), animation.clone()))
            .collect()
    };
    for (_, animation) in &mut plan {
        animation.set_looping(request.looping);
    }
    info!(
        "scrolling {:?} on {} matrices (span: {span}, sequential: {sequential})",
        request.text,
        plan.len()
    );

    let keep_alive = request.keep_alive;
    let play = move |(controller, animation): (Arc<MatrixController>, Animation),
                     stop: &StopSignal|
          -> Result<(), ControllerError> {
        if keep_alive {
            controller.set_keep_alive(true)?;
        }
        controller.play_animation(&animation, stop)?;
        Ok(())
    };

    if sequential {
        let mut states = Vec::with_capacity(plan.len());
        for (index, job) in plan.into_iter().enumerate() {
            let devices = [Arc::clone(&job.0)];
            let session = guard.renamed(format!("scroll-text-guard-{}", index + 1));
            let state = session.run(
                &devices,
                |_, stop| run_jobs(vec![job], stop, false, "scroll", play),
                request.run_for,
                request.clear_after,
                stop,
            )?;
            states.push(state);
            if stop.is_stopped() {
                break;
            }
        }
        return Ok(states);
    }

    let devices: Vec<Arc<MatrixController>> =
        plan.iter().map(|(controller, _)| Arc::clone(controller)).collect();
    let state = guard.renamed("scroll-text-guard").run(
        &devices,
        |_, stop| run_jobs(plan, stop, true, "scroll", play),
        request.run_for,
        request.clear_after,
        stop,
    )?;
    Ok(vec![state])
}

/// Shows static text on the selected controllers.
///
/// Without `run_for` the text stays up until `stop` fires.
///
/// # Errors
///
/// - [`OperationError::SequentialRequiresRunFor`] for a sequential request on
///   several controllers without a time limit.
/// - [`OperationError::Guard`] for invalid durations and device failures.
pub fn display_text(
    controllers: &[Arc<MatrixController>],
    request: &DisplayTextRequest,
    guard: &ExecutionGuard,
    stop: &StopSignal,
) -> Result<Vec<GuardState>, OperationError> {
    if controllers.is_empty() {
        return Err(OperationError::NoDevices);
    }
    let sequential = request.sequential && controllers.len() > 1;
    if sequential && request.run_for.is_none() {
        return Err(OperationError::SequentialRequiresRunFor);
    }
    let guard = guard.clone().wait_for_interrupt(request.run_for.is_none());
    let text: Arc<str> = Arc::from(request.text.as_str());
    let keep_alive = request.keep_alive;

    let show = move |controller: Arc<MatrixController>,
                     _: &StopSignal|
          -> Result<(), ControllerError> {
        if keep_alive {
            controller.set_keep_alive(true)?;
        }
        controller.show_text(&text)
    };

    if sequential {
        let mut states = Vec::with_capacity(controllers.len());
        for (index, controller) in controllers.iter().enumerate() {
            let devices = [Arc::clone(controller)];
            let session = guard.renamed(format!("display-text-guard-{}", index + 1));
            let state = session.run(
                &devices,
                |devices, stop| run_jobs(devices.to_vec(), stop, false, "display", show.clone()),
                request.run_for,
                request.clear_after,
                stop,
            )?;
            states.push(state);
            if stop.is_stopped() {
                break;
            }
        }
        return Ok(states);
    }

    let state = guard.renamed("display-text-guard").run(
        controllers,
        |devices, stop| run_jobs(devices.to_vec(), stop, true, "display", show),
        request.run_for,
        request.clear_after,
        stop,
    )?;
    Ok(vec![state])
}

/// Makes each controller show its location abbreviation, then its name,
/// `cycles` times, so the operator can tell the matrices apart.
///
/// # Errors
///
/// [`OperationError::Guard`] for invalid durations and device failures.
pub fn identify(
    controllers: &[Arc<MatrixController>],
    request: &IdentifyRequest,
    guard: &ExecutionGuard,
    stop: &StopSignal,
) -> Result<GuardState, OperationError> {
    if controllers.is_empty() {
        return Err(OperationError::NoDevices);
    }
    let cycles = request.cycles;
    let hold = request.hold;

    let cycle = move |controller: Arc<MatrixController>,
                      stop: &StopSignal|
          -> Result<(), ControllerError> {
        let device = controller.device().clone();
        for _ in 0..cycles {
            for message in [device.location_abbrev(), device.name().to_string()] {
                if stop.is_stopped() {
                    return Ok(());
                }
                controller.show_text(&message)?;
                if stop.wait_timeout(hold).is_some() {
                    return Ok(());
                }
            }
        }
        Ok(())
    };

    let state = guard.renamed("identify-guard").run(
        controllers,
        |devices, stop| {
            if request.clear_after {
                for device in devices {
                    device.clear()?;
                }
            }
            run_jobs(devices.to_vec(), stop, true, "identify", cycle)?;
            // The routine has a natural end; don't sit out the rest of run_for.
            stop.stop(StopReason::Finished);
            Ok(())
        },
        request.run_for,
        request.clear_after,
        stop,
    )?;
    Ok(state)
}

/// Identifies every controller whose serial has not been identified before,
/// then records those serials in `store`.
///
/// Returns the number of controllers identified.  Serials are only recorded
/// when the identify session completed; an interrupted session leaves the
/// state untouched so the next start tries again.
///
/// # Errors
///
/// [`OperationError::State`] if the state cannot be loaded or saved, plus
/// everything [`identify`] returns.
pub fn identify_new_devices<S: StateStore>(
    controllers: &[Arc<MatrixController>],
    store: &S,
    request: &IdentifyRequest,
    guard: &ExecutionGuard,
    stop: &StopSignal,
) -> Result<usize, OperationError> {
    let state = store.load()?;
    let fresh: Vec<Arc<MatrixController>> = controllers
        .iter()
        .filter(|controller| !state.is_identified(controller.device().serial()))
        .cloned()
        .collect();
    if fresh.is_empty() {
        debug!("all {} matrices identified before", controllers.len());
        return Ok(0);
    }

    info!("identifying {} new matrices", fresh.len());
    if identify(&fresh, request, guard, stop)? == GuardState::Cancelled {
        return Ok(0);
    }

    store.update(|state| {
        let mut changed = !state.first_run_complete;
        state.first_run_complete = true;
        for controller in &fresh {
            changed |= state.mark_identified(controller.device().serial());
        }
        changed
    })?;
    Ok(fresh.len())
}

// ── Fan-out ───────────────────────────────────────────────────────────────────

/// Something a fan-out job can be labelled by.
trait JobLabel {
    fn job_label(&self) -> String;
}

impl JobLabel for Arc<MatrixController> {
    fn job_label(&self) -> String {
        self.device().to_string()
    }
}

impl JobLabel for (Arc<MatrixController>, Animation) {
    fn job_label(&self) -> String {
        self.0.job_label()
    }
}

/// Runs `op` for every job and collects the failures.
///
/// Concurrent mode spawns one named thread per job and returns once every
/// job has finished or `stop` has fired, whichever comes first.
fn run_jobs<J, F>(
    jobs: Vec<J>,
    stop: &StopSignal,
    concurrent: bool,
    operation: &str,
    op: F,
) -> Result<(), ActivationError>
where
    J: JobLabel + Send + 'static,
    F: Fn(J, &StopSignal) -> Result<(), ControllerError> + Send + Sync + Clone + 'static,
{
    let failures = if concurrent && jobs.len() > 1 {
        fan_out(jobs, stop, operation, op)?
    } else {
        let mut failures = Vec::new();
        for job in jobs {
            if stop.is_stopped() {
                break;
            }
            let device = job.job_label();
            if let Err(source) = op(job, stop) {
                failures.push(DeviceFailure { device, source });
            }
        }
        failures
    };

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Box::new(FanOutError { failures }))
    }
}

fn fan_out<J, F>(
    jobs: Vec<J>,
    stop: &StopSignal,
    operation: &str,
    op: F,
) -> Result<Vec<DeviceFailure>, ActivationError>
where
    J: JobLabel + Send + 'static,
    F: Fn(J, &StopSignal) -> Result<(), ControllerError> + Send + Sync + Clone + 'static,
{
    // Fires when the last worker finishes, or with `stop` through the parent link.
    let settled = stop.child();
    let failures = Arc::new(Mutex::new(Vec::new()));
    let remaining = Arc::new(Mutex::new(jobs.len()));

    for job in jobs {
        let device = job.job_label();
        let op = op.clone();
        let worker_stop = stop.clone();
        let failures = Arc::clone(&failures);
        let countdown = Countdown {
            remaining: Arc::clone(&remaining),
            settled: settled.clone(),
        };
        let operation_name = operation.to_string();
        let spawned = thread::Builder::new()
            .name(format!("{operation}-{device}"))
            .spawn(move || {
                let _countdown = countdown;
                if let Err(source) = op(job, &worker_stop) {
                    warn!("{operation_name} failed on {device}: {source}");
                    failures
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(DeviceFailure { device, source });
                }
            });
        if let Err(error) = spawned {
            // Workers already running see the stop and wind down on their own.
            stop.stop(StopReason::Interrupted);
            return Err(Box::new(error));
        }
    }

    let reason = settled.wait();
    debug!("{operation} fan-out settled ({reason:?})");
    let failures = std::mem::take(&mut *failures.lock().unwrap_or_else(PoisonError::into_inner));
    Ok(failures)
}

/// Counts a fan-out worker as finished when dropped, even on panic.
struct Countdown {
    remaining: Arc<Mutex<usize>>,
    settled: StopSignal,
}

impl Drop for Countdown {
    fn drop(&mut self) {
        let mut remaining = self.remaining.lock().unwrap_or_else(PoisonError::into_inner);
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.settled.stop(StopReason::Finished);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
