//! Debounced accumulation of board views.

use crate::source::{FrameSource, SourceError};
use camera_calib_chessboard::{draw_chessboard_corners, negative, CornerFinder};
use camera_calib_core::{CorrespondenceSet, ObjectPoint, PatternGeometry};
use image::GrayImage;
use log::debug;

/// Result of feeding one frame to a [`CalibrationSession`].
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// The source had no frame ready.
    NoFrame,
    /// No complete board in the frame; the success streak was reset.
    NotFound,
    /// Board found, slot not committed yet.
    Tracking { consecutive: u32 },
    /// Board committed as entry `index`. `flash` is the negative of the
    /// annotated frame, shown to the operator as capture feedback.
    Accepted { index: usize, flash: GrayImage },
    /// Every slot is already filled.
    Complete,
}

pub struct CalibrationSession {
    pattern: PatternGeometry,
    object_points: Vec<ObjectPoint>,
    set: CorrespondenceSet,
    debounce_frames: u32,
    consecutive: u32,
    misses: u32,
}

impl CalibrationSession {
    pub fn new(pattern: PatternGeometry, image_count: usize, debounce_frames: u32) -> Self {
        Self {
            pattern,
            object_points: pattern.object_points(),
            set: CorrespondenceSet::new(pattern.n_points(), image_count),
            debounce_frames,
            consecutive: 0,
            misses: 0,
        }
    }

    pub fn pattern(&self) -> &PatternGeometry {
        &self.pattern
    }

    pub fn accepted_count(&self) -> usize {
        self.set.len()
    }

    pub fn image_count(&self) -> usize {
        self.set.capacity()
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive
    }

    /// Frames without a board since the current slot opened.
    pub fn misses(&self) -> u32 {
        self.misses
    }

    pub fn is_complete(&self) -> bool {
        self.set.is_full()
    }

    pub fn correspondences(&self) -> &CorrespondenceSet {
        &self.set
    }

    pub fn into_correspondences(self) -> CorrespondenceSet {
        self.set
    }

    /// Run detection on `frame` and update the debounce state.
    ///
    /// A detection is committed only once `debounce_frames` earlier frames
    /// in a row also contained the board; any miss resets the streak.
    pub fn process_frame(&mut self, frame: &GrayImage, finder: &dyn CornerFinder) -> StepOutcome {
        if self.is_complete() {
            return StepOutcome::Complete;
        }

        let corners = match finder.find_corners(frame, &self.pattern) {
            Ok(c) if c.len() == self.pattern.n_points() => c,
            Ok(c) => {
                debug!("finder returned {} corners, expected {}", c.len(), self.pattern.n_points());
                self.miss();
                return StepOutcome::NotFound;
            }
            Err(e) => {
                debug!("slot {}: {e}", self.accepted_count());
                self.miss();
                return StepOutcome::NotFound;
            }
        };

        if self.consecutive < self.debounce_frames {
            self.consecutive += 1;
            return StepOutcome::Tracking {
                consecutive: self.consecutive,
            };
        }

        let index = match self.set.push(&self.object_points, &corners) {
            Ok(index) => index,
            Err(e) => {
                debug!("could not commit slot: {e}");
                self.miss();
                return StepOutcome::NotFound;
            }
        };
        self.consecutive = 0;
        self.misses = 0;

        let mut annotated = frame.clone();
        draw_chessboard_corners(&mut annotated, &self.pattern, &corners, true);
        StepOutcome::Accepted {
            index,
            flash: negative(&annotated),
        }
    }

    fn miss(&mut self) {
        self.consecutive = 0;
        self.misses = self.misses.saturating_add(1);
    }

    /// Pull one frame for the current slot and process it.
    pub fn step(
        &mut self,
        source: &mut dyn FrameSource,
        finder: &dyn CornerFinder,
    ) -> Result<StepOutcome, SourceError> {
        if self.is_complete() {
            return Ok(StepOutcome::Complete);
        }
        match source.grab(self.accepted_count())? {
            Some(frame) => Ok(self.process_frame(&frame, finder)),
            None => Ok(StepOutcome::NoFrame),
        }
    }
}
