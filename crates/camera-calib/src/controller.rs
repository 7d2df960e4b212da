//! Presentation-side owner of the calibration state.

use crate::config::CalibrationConfig;
use crate::error::CalibError;
use crate::rectifier::SharedRectifier;
use crate::source::LiveFrameBuffer;
use crate::state::{CalibrationState, Phase, StateError};
use crate::store::ParameterStore;
use crate::worker::{spawn_worker, CornerInput, WorkerEvent, WorkerHandle};
use camera_calib_chessboard::CornerFinder;
use camera_calib_core::GrayImage;
use camera_calib_solver::{CalibrationResult, CameraParams, RectificationMap};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

/// Drives calibration runs and applies the resulting undistortion to live
/// frames.
///
/// All state transitions happen here, on the caller's thread: the worker
/// only reports through events, which [`CalibrationController::poll`]
/// drains and applies.
pub struct CalibrationController {
    config: CalibrationConfig,
    finder: Arc<dyn CornerFinder>,
    state: CalibrationState,
    rectifier: SharedRectifier,
    live: LiveFrameBuffer,
    worker: Option<WorkerHandle>,
    camera: Option<CameraParams>,
    last_result: Option<CalibrationResult>,
    scratch: GrayImage,
}

impl CalibrationController {
    pub fn new(config: CalibrationConfig, finder: Arc<dyn CornerFinder>) -> Result<Self, CalibError> {
        config.validate()?;
        Ok(Self {
            config,
            finder,
            state: CalibrationState::new(),
            rectifier: SharedRectifier::new(),
            live: LiveFrameBuffer::new(),
            worker: None,
            camera: None,
            last_result: None,
            scratch: GrayImage::new(0, 0),
        })
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn rectifier(&self) -> &SharedRectifier {
        &self.rectifier
    }

    /// Buffer that `process_frame` publishes into while accumulating.
    pub fn live_buffer(&self) -> &LiveFrameBuffer {
        &self.live
    }

    pub fn camera(&self) -> Option<&CameraParams> {
        self.camera.as_ref()
    }

    pub fn last_result(&self) -> Option<&CalibrationResult> {
        self.last_result.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Start a calibration run (`Idle -> Accumulating`).
    pub fn start(&mut self, input: CornerInput) -> Result<(), CalibError> {
        if !self.state.can_transition(Phase::Accumulating) {
            return Err(self.refused(Phase::Accumulating));
        }
        let handle = spawn_worker(self.config.clone(), self.finder.clone(), input)?;
        self.state.start_accumulating()?;
        self.worker = Some(handle);
        info!("calibration started");
        Ok(())
    }

    /// Start a run that consumes frames passed to `process_frame`.
    pub fn start_live(&mut self) -> Result<(), CalibError> {
        let source = Box::new(self.live.clone());
        self.start(CornerInput::Frames(source))
    }

    /// Ask the running worker to stop. The state returns to `Idle` once the
    /// worker acknowledges through `poll`.
    pub fn cancel(&self) {
        if let Some(w) = &self.worker {
            w.cancel();
        }
    }

    /// Drain pending worker events, apply their state transitions and hand
    /// them back for presentation.
    pub fn poll(&mut self) -> Vec<WorkerEvent> {
        let mut events = Vec::new();
        let Some(worker) = &self.worker else {
            return events;
        };
        while let Some(ev) = worker.try_next() {
            events.push(ev);
        }

        let mut finished = false;
        for ev in &events {
            match ev {
                WorkerEvent::PhaseChanged(phase) => {
                    if *phase != self.state.phase() {
                        if let Err(e) = self.state.transition(*phase) {
                            warn!("{e}");
                        }
                    }
                }
                WorkerEvent::Calibrated { result, map } => {
                    self.rectifier.install(Arc::clone(map));
                    self.camera = Some(result.camera);
                    self.last_result = Some((**result).clone());
                    if let Err(e) = self.state.begin_rectifying() {
                        warn!("{e}");
                        self.state.abort();
                    }
                    finished = true;
                }
                WorkerEvent::Failed(_) | WorkerEvent::Cancelled => {
                    self.state.abort();
                    finished = true;
                }
                WorkerEvent::Progress { .. } | WorkerEvent::Captured { .. } | WorkerEvent::Warning(_) => {}
            }
        }

        if finished {
            if let Some(w) = self.worker.take() {
                w.join();
            }
        }
        events
    }

    /// Load a parameter store and start rectifying (`Idle -> Rectifying`).
    /// On failure nothing changes.
    pub fn load_parameters(&mut self, path: impl AsRef<Path>) -> Result<(), CalibError> {
        if self.state.phase() != Phase::Idle {
            return Err(self.refused(Phase::Rectifying));
        }
        let camera = ParameterStore::new(path.as_ref()).load()?;
        let map = RectificationMap::build(&camera, self.config.frame_size);
        self.rectifier.install(Arc::new(map));
        self.camera = Some(camera);
        self.state.begin_rectifying()?;
        info!("loaded camera parameters from {}", path.as_ref().display());
        Ok(())
    }

    /// Stop rectifying (`Rectifying -> Idle`) and drop the map.
    pub fn reset(&mut self) -> Result<(), CalibError> {
        self.state.reset()?;
        self.rectifier.clear();
        Ok(())
    }

    /// Per-frame callback. While accumulating the frame is handed to the
    /// worker; while rectifying the undistorted frame is returned.
    pub fn process_frame(&mut self, frame: image::GrayImage) -> Result<Option<&GrayImage>, CalibError> {
        match self.state.phase() {
            Phase::Accumulating => {
                self.live.publish(frame);
                Ok(None)
            }
            Phase::Rectifying => {
                if self.rectifier.rectify_into(&frame, &mut self.scratch)? {
                    Ok(Some(&self.scratch))
                } else {
                    Ok(None)
                }
            }
            Phase::Idle | Phase::Solving => Ok(None),
        }
    }

    fn refused(&self, to: Phase) -> CalibError {
        CalibError::State(StateError {
            from: self.state.phase(),
            to,
        })
    }
}

impl Drop for CalibrationController {
    fn drop(&mut self) {
        self.live.close();
        if let Some(w) = self.worker.take() {
            w.cancel();
            w.join();
        }
    }
}
