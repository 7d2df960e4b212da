//! Core types and utilities for chessboard camera calibration.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete corner detector, solver or image codec.

mod correspondence;
mod criteria;
mod homography;
mod image;
mod logger;
mod pattern;

pub use correspondence::{Correspondence, CorrespondenceError, CorrespondenceSet, CorrespondenceView};
pub use criteria::TermCriteria;
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView, ImageSize};
pub use pattern::{generate_object_points, ImagePoint, ObjectPoint, PatternError, PatternGeometry};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
