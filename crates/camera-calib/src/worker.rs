//! Background calibration run: accumulate, persist, solve, derive the
//! rectification map, persist parameters.

use crate::cancel::CancelToken;
use crate::config::CalibrationConfig;
use crate::error::CalibError;
use crate::session::{CalibrationSession, StepOutcome};
use crate::source::FrameSource;
use crate::state::Phase;
use crate::store::{CornerStore, ParameterStore};
use camera_calib_chessboard::CornerFinder;
use camera_calib_core::CorrespondenceSet;
use camera_calib_solver::{CalibrationResult, Calibrator, RectificationMap};
use image::GrayImage;
use log::{debug, info, warn};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Where the worker gets its corner correspondences from.
pub enum CornerInput {
    /// Detect boards in frames from this source.
    Frames(Box<dyn FrameSource>),
    /// Reuse the corner store named in the configuration.
    Stored,
}

/// Messages from the worker to whoever presents progress.
#[derive(Debug)]
pub enum WorkerEvent {
    PhaseChanged(Phase),
    Progress {
        accepted: usize,
        total: usize,
    },
    /// A slot was committed; `flash` is the negative capture feedback image.
    Captured {
        index: usize,
        flash: GrayImage,
    },
    Calibrated {
        result: Box<CalibrationResult>,
        map: Arc<RectificationMap>,
    },
    Failed(CalibError),
    Cancelled,
    Warning(String),
}

impl WorkerEvent {
    /// True for the last event a run emits.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerEvent::Calibrated { .. } | WorkerEvent::Failed(_) | WorkerEvent::Cancelled
        )
    }
}

enum Flow<T> {
    Continue(T),
    Cancelled,
}

/// One calibration run. Owns everything it touches, so it can be moved onto
/// a thread as a unit.
pub struct CalibrationWorker {
    config: CalibrationConfig,
    finder: Arc<dyn CornerFinder>,
    input: CornerInput,
    cancel: CancelToken,
    events: Sender<WorkerEvent>,
}

impl CalibrationWorker {
    pub fn new(
        config: CalibrationConfig,
        finder: Arc<dyn CornerFinder>,
        input: CornerInput,
        cancel: CancelToken,
        events: Sender<WorkerEvent>,
    ) -> Self {
        Self {
            config,
            finder,
            input,
            cancel,
            events,
        }
    }

    fn emit(&self, event: WorkerEvent) {
        // A dropped receiver only means nobody is watching any more.
        let _ = self.events.send(event);
    }

    fn warn(&self, msg: String) {
        warn!("{msg}");
        self.emit(WorkerEvent::Warning(msg));
    }

    /// Run to completion on the current thread. Exactly one terminal event
    /// is emitted.
    pub fn run(mut self) {
        let input = std::mem::replace(&mut self.input, CornerInput::Stored);
        let terminal = match self.run_inner(input) {
            Ok(Flow::Continue((result, map))) => WorkerEvent::Calibrated {
                result: Box::new(result),
                map,
            },
            Ok(Flow::Cancelled) => {
                info!("calibration cancelled");
                WorkerEvent::Cancelled
            }
            Err(e) => {
                warn!("calibration run failed: {e}");
                WorkerEvent::Failed(e)
            }
        };
        self.emit(terminal);
    }

    fn run_inner(
        &self,
        input: CornerInput,
    ) -> Result<Flow<(CalibrationResult, Arc<RectificationMap>)>, CalibError> {
        self.config.validate()?;
        self.emit(WorkerEvent::PhaseChanged(Phase::Accumulating));

        let set = match input {
            CornerInput::Stored => {
                let store = CornerStore::new(&self.config.corners_path);
                let set = store.load(self.config.pattern.n_points(), self.config.image_count)?;
                info!("loaded {} stored views from {}", set.len(), store.path().display());
                set
            }
            CornerInput::Frames(mut source) => match self.accumulate(source.as_mut())? {
                Flow::Continue(set) => {
                    let store = CornerStore::new(&self.config.corners_path);
                    if let Err(e) = store.save(&set) {
                        self.warn(format!("could not write {}: {e}", store.path().display()));
                    }
                    set
                }
                Flow::Cancelled => return Ok(Flow::Cancelled),
            },
        };

        if self.cancel.is_cancelled() {
            return Ok(Flow::Cancelled);
        }
        self.emit(WorkerEvent::PhaseChanged(Phase::Solving));
        let result = Calibrator::new(self.config.calibrate.clone()).calibrate(&set, self.config.frame_size)?;

        let map = Arc::new(RectificationMap::build(&result.camera, result.image_size));
        let params = ParameterStore::new(&self.config.intrinsics_path);
        if let Err(e) = params.save(&result.camera) {
            self.warn(format!("could not write {}: {e}", params.path().display()));
        }
        Ok(Flow::Continue((result, map)))
    }

    fn accumulate(&self, source: &mut dyn FrameSource) -> Result<Flow<CorrespondenceSet>, CalibError> {
        let mut session = CalibrationSession::new(
            self.config.pattern,
            self.config.image_count,
            self.config.debounce_frames,
        );
        let total = session.image_count();
        let pause = self.config.capture_pause();
        let miss_limit = if source.is_still() {
            Some(1)
        } else {
            self.config.max_misses_per_slot
        };

        while !session.is_complete() {
            if self.cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }
            match session.step(source, self.finder.as_ref())? {
                StepOutcome::Accepted { index, flash } => {
                    info!("captured view {}/{}", index + 1, total);
                    self.emit(WorkerEvent::Captured { index, flash });
                    self.emit(WorkerEvent::Progress {
                        accepted: session.accepted_count(),
                        total,
                    });
                    if !pause.is_zero() && !self.cancel.sleep(pause) {
                        return Ok(Flow::Cancelled);
                    }
                }
                StepOutcome::Tracking { consecutive } => {
                    debug!("slot {}: board seen {consecutive} times in a row", session.accepted_count());
                }
                StepOutcome::NotFound => {
                    if miss_limit.is_some_and(|limit| session.misses() >= limit) {
                        return Err(CalibError::BoardNotFound {
                            view: session.accepted_count() + 1,
                            misses: session.misses(),
                        });
                    }
                }
                StepOutcome::NoFrame | StepOutcome::Complete => {}
            }
        }
        Ok(Flow::Continue(session.into_correspondences()))
    }
}

/// Handle to a worker running on its own thread.
pub struct WorkerHandle {
    cancel: CancelToken,
    events: Receiver<WorkerEvent>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Next pending event without blocking. `None` when the queue is empty
    /// or the worker is gone.
    pub fn try_next(&self) -> Option<WorkerEvent> {
        match self.events.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Block for the next event; `None` once the worker has finished and the
    /// queue is drained.
    pub fn next_blocking(&self) -> Option<WorkerEvent> {
        self.events.recv().ok()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    pub fn join(mut self) {
        if let Some(t) = self.thread.take() {
            if t.join().is_err() {
                warn!("calibration worker panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

/// Start a calibration run on a dedicated thread.
pub fn spawn_worker(
    config: CalibrationConfig,
    finder: Arc<dyn CornerFinder>,
    input: CornerInput,
) -> Result<WorkerHandle, CalibError> {
    config.validate()?;
    let cancel = CancelToken::new();
    let (tx, rx) = mpsc::channel();
    let worker = CalibrationWorker::new(config, finder, input, cancel.clone(), tx);
    let thread = thread::Builder::new()
        .name("calibration".to_string())
        .spawn(move || worker.run())
        .map_err(CalibError::WorkerSpawn)?;
    Ok(WorkerHandle {
        cancel,
        events: rx,
        thread: Some(thread),
    })
}
