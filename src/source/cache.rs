//! Two-slot lookahead over the frame codec
//!
//! The scheduler needs the time stamp of the following frame before it can
//! pace the current one, so the cache always holds `current` and, until the
//! source runs out, `next`.

use tokio::io::AsyncRead;

use crate::error::FrameError;
use crate::protocol::{decode, Frame, InputMode};

/// Result of [`FrameCache::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// `current` holds a new frame
    Ready,
    /// No further frame; `current` still holds the last valid one
    EndOfStream,
}

/// Current/next frame lookahead
#[derive(Debug)]
pub struct FrameCache {
    current: Option<Frame>,
    next: Option<Frame>,
    max_len: usize,
    mode: InputMode,
    /// Read error that ended the source early, kept for the caller to log
    pending_error: Option<FrameError>,
}

impl FrameCache {
    pub fn new(max_len: usize, mode: InputMode) -> Self {
        Self {
            current: None,
            next: None,
            max_len,
            mode,
            pending_error: None,
        }
    }

    /// Load the first two frames of a fresh source.
    ///
    /// Fails if the first frame cannot be read, in which case the source is
    /// unusable. A source holding a single frame seeds with no `next`.
    pub async fn seed<R>(&mut self, src: &mut R) -> Result<(), FrameError>
    where
        R: AsyncRead + Unpin,
    {
        self.current = None;
        self.next = None;
        self.pending_error = None;

        self.current = Some(decode(src, self.max_len, self.mode).await?);
        self.next = self.read_next(src).await;
        Ok(())
    }

    /// Move `next` into `current` and read a new `next`
    pub async fn advance<R>(&mut self, src: &mut R) -> Advance
    where
        R: AsyncRead + Unpin,
    {
        match self.next.take() {
            Some(frame) => {
                self.current = Some(frame);
                self.next = self.read_next(src).await;
                Advance::Ready
            }
            None => Advance::EndOfStream,
        }
    }

    async fn read_next<R>(&mut self, src: &mut R) -> Option<Frame>
    where
        R: AsyncRead + Unpin,
    {
        match decode(src, self.max_len, self.mode).await {
            Ok(frame) => Some(frame),
            Err(FrameError::EndOfStream) => None,
            Err(e) => {
                self.pending_error = Some(e);
                None
            }
        }
    }

    pub fn current(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    pub fn next(&self) -> Option<&Frame> {
        self.next.as_ref()
    }

    /// Seconds between the `next` and `current` time stamps
    pub fn delta(&self) -> Option<f64> {
        let current = self.current.as_ref()?.timestamp()?;
        let next = self.next.as_ref()?.timestamp()?;
        Some(next - current)
    }

    /// Error that cut the source short, if any
    pub fn take_error(&mut self) -> Option<FrameError> {
        self.pending_error.take()
    }
}
