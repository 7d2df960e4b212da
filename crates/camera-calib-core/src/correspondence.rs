//! Fixed-size arena of (board point, image point) pairs.
//!
//! Entries are appended whole and in acceptance order. The arena never grows
//! past the capacity chosen at construction and every entry has exactly
//! `points_per_image` pairs.

use crate::pattern::{ImagePoint, ObjectPoint};

/// One board corner together with its observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    pub object: ObjectPoint,
    pub image: ImagePoint,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrespondenceError {
    #[error("entry has {got} object points and {image} image points, expected {expected} of each")]
    LengthMismatch {
        expected: usize,
        got: usize,
        image: usize,
    },
    #[error("correspondence set is full ({capacity} images)")]
    Full { capacity: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CorrespondenceSet {
    points_per_image: usize,
    capacity: usize,
    object: Vec<ObjectPoint>,
    image: Vec<ImagePoint>,
}

/// Borrowed view of one image entry.
#[derive(Clone, Copy, Debug)]
pub struct CorrespondenceView<'a> {
    pub index: usize,
    pub object: &'a [ObjectPoint],
    pub image: &'a [ImagePoint],
}

impl<'a> CorrespondenceView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.object.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.object.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = Correspondence> + 'a {
        self.object
            .iter()
            .zip(self.image.iter())
            .map(|(o, i)| Correspondence {
                object: *o,
                image: *i,
            })
    }
}

impl CorrespondenceSet {
    /// Create an empty arena for `capacity` images of `points_per_image` corners.
    pub fn new(points_per_image: usize, capacity: usize) -> Self {
        let total = points_per_image.saturating_mul(capacity);
        Self {
            points_per_image,
            capacity,
            object: Vec::with_capacity(total),
            image: Vec::with_capacity(total),
        }
    }

    /// Append one complete entry. Nothing is written on error.
    pub fn push(
        &mut self,
        object: &[ObjectPoint],
        image: &[ImagePoint],
    ) -> Result<usize, CorrespondenceError> {
        if object.len() != self.points_per_image || image.len() != self.points_per_image {
            return Err(CorrespondenceError::LengthMismatch {
                expected: self.points_per_image,
                got: object.len(),
                image: image.len(),
            });
        }
        if self.is_full() {
            return Err(CorrespondenceError::Full {
                capacity: self.capacity,
            });
        }
        let index = self.len();
        self.object.extend_from_slice(object);
        self.image.extend_from_slice(image);
        Ok(index)
    }

    /// Number of committed image entries.
    #[inline]
    pub fn len(&self) -> usize {
        if self.points_per_image == 0 {
            0
        } else {
            self.object.len() / self.points_per_image
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn points_per_image(&self) -> usize {
        self.points_per_image
    }

    /// True once `capacity` entries are committed (or the arena is degenerate).
    #[inline]
    pub fn is_full(&self) -> bool {
        self.points_per_image == 0 || self.len() >= self.capacity
    }

    /// Total number of stored point pairs.
    #[inline]
    pub fn total_points(&self) -> usize {
        self.object.len()
    }

    pub fn view(&self, index: usize) -> Option<CorrespondenceView<'_>> {
        if index >= self.len() {
            return None;
        }
        let start = index * self.points_per_image;
        let end = start + self.points_per_image;
        Some(CorrespondenceView {
            index,
            object: &self.object[start..end],
            image: &self.image[start..end],
        })
    }

    pub fn get(&self, image_index: usize, point_index: usize) -> Option<Correspondence> {
        let view = self.view(image_index)?;
        Some(Correspondence {
            object: *view.object.get(point_index)?,
            image: *view.image.get(point_index)?,
        })
    }

    pub fn views(&self) -> impl Iterator<Item = CorrespondenceView<'_>> {
        (0..self.len()).filter_map(move |i| self.view(i))
    }
}
