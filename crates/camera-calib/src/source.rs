//! Frame acquisition.

use image::GrayImage;
use log::debug;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("image directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("cannot read frame {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("live frame buffer was closed")]
    Closed,
}

/// Supplies grayscale frames to the capture loop.
///
/// `slot` is the index of the board view currently being collected. Live
/// sources ignore it; image sequences use it to pick the file. `Ok(None)`
/// means no frame is available right now and the caller should retry.
pub trait FrameSource: Send {
    fn grab(&mut self, slot: usize) -> Result<Option<GrayImage>, SourceError>;

    /// True when every grab for a slot returns the same picture, as with
    /// files on disk. A miss on such a source never turns into a detection.
    fn is_still(&self) -> bool {
        false
    }
}

/// Reads `left{slot + 1}.bmp` from a directory.
#[derive(Clone, Debug)]
pub struct ImageSequenceSource {
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(SourceError::MissingDirectory(dir));
        }
        Ok(Self {
            dir,
            prefix: "left".to_string(),
            extension: "bmp".to_string(),
        })
    }

    /// Override the `left` / `bmp` naming.
    pub fn with_naming(mut self, prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self.extension = extension.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frame_path(&self, slot: usize) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", self.prefix, slot + 1, self.extension))
    }
}

impl FrameSource for ImageSequenceSource {
    fn grab(&mut self, slot: usize) -> Result<Option<GrayImage>, SourceError> {
        let path = self.frame_path(slot);
        let img = image::open(&path).map_err(|source| SourceError::Unreadable {
            path: path.clone(),
            source,
        })?;
        debug!("read {}", path.display());
        Ok(Some(img.to_luma8()))
    }

    fn is_still(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct Slot {
    frame: Option<GrayImage>,
    closed: bool,
}

/// Single-frame mailbox between a camera callback and the capture loop.
///
/// `publish` never blocks on the consumer; a newer frame replaces an unread
/// one.
#[derive(Clone)]
pub struct LiveFrameBuffer {
    inner: Arc<(Mutex<Slot>, Condvar)>,
    wait: Duration,
}

impl Default for LiveFrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveFrameBuffer {
    pub fn new() -> Self {
        Self {
            inner: Arc::default(),
            wait: Duration::from_millis(100),
        }
    }

    /// How long `grab` waits for a frame before returning `Ok(None)`.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn publish(&self, frame: GrayImage) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut slot) = lock.lock() {
            slot.frame = Some(frame);
            cvar.notify_all();
        }
    }

    /// Wake the consumer and make every further `grab` fail with `Closed`.
    pub fn close(&self) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut slot) = lock.lock() {
            slot.closed = true;
            cvar.notify_all();
        }
    }

    fn take(&self) -> Result<Option<GrayImage>, SourceError> {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().map_err(|_| SourceError::Closed)?;
        let (mut slot, _) = cvar
            .wait_timeout_while(guard, self.wait, |s| s.frame.is_none() && !s.closed)
            .map_err(|_| SourceError::Closed)?;
        if slot.closed {
            return Err(SourceError::Closed);
        }
        Ok(slot.frame.take())
    }
}

impl FrameSource for LiveFrameBuffer {
    fn grab(&mut self, _slot: usize) -> Result<Option<GrayImage>, SourceError> {
        self.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn sequence_reads_file_for_slot() {
        let dir = tempfile::tempdir().expect("tempdir");
        GrayImage::from_pixel(8, 6, image::Luma([42]))
            .save(dir.path().join("left3.bmp"))
            .expect("write bmp");

        let mut src = ImageSequenceSource::new(dir.path()).expect("dir exists");
        let frame = src.grab(2).expect("readable").expect("frame");
        assert_eq!(frame.dimensions(), (8, 6));
        assert_eq!(frame.get_pixel(3, 3).0[0], 42);
        assert!(matches!(src.grab(0), Err(SourceError::Unreadable { .. })));
        assert!(src.is_still());
        assert!(!LiveFrameBuffer::new().is_still());
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        assert!(matches!(
            ImageSequenceSource::new(&missing),
            Err(SourceError::MissingDirectory(p)) if p == missing
        ));
    }

    #[test]
    fn live_buffer_hands_over_latest_frame() {
        let mut buffer = LiveFrameBuffer::new().with_wait(Duration::from_millis(5));
        assert!(buffer.grab(0).expect("open").is_none());

        let producer = buffer.clone();
        producer.publish(GrayImage::new(2, 2));
        producer.publish(GrayImage::from_pixel(4, 4, image::Luma([9])));
        let frame = buffer.grab(0).expect("open").expect("frame");
        assert_eq!(frame.dimensions(), (4, 4));
        assert!(buffer.grab(0).expect("open").is_none());
    }

    #[test]
    fn close_wakes_waiting_consumer() {
        let mut buffer = LiveFrameBuffer::new().with_wait(Duration::from_secs(30));
        let producer = buffer.clone();
        let handle = thread::spawn(move || buffer.grab(0));
        thread::sleep(Duration::from_millis(20));
        producer.close();
        let res = handle.join().expect("join");
        assert!(matches!(res, Err(SourceError::Closed)));
    }
}
