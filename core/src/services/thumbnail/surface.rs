use image::RgbaImage;

use super::{error::Result, model::MediaSource};

/// Metadata of a loaded media source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    /// Seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Seconds between two decoded frames, used as the seek precision.
    pub frame_duration: f64,
}

/// A decoded RGBA frame and its presentation time in seconds.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub image: RgbaImage,
    pub time: f64,
}

#[derive(Debug)]
pub enum FramePoll {
    /// The decoder has not yet produced the frame for the requested position.
    Pending,
    Ready(DecodedFrame),
}

/// A media decoding handle that can be positioned and read one frame at a time.
///
/// A surface is driven from a single thread: `load`, then any number of
/// `seek` + `poll_frame` rounds, then `release` exactly once.
pub trait DecodeSurface {
    /// Points the surface at `source` and waits for its metadata.
    fn load(&mut self, source: &MediaSource) -> Result<SourceInfo>;

    /// Requests the playback position `time`. Does not wait for the frame.
    fn seek(&mut self, time: f64) -> Result<()>;

    /// Performs one decode step. Returns `Ready` only once the frame at the
    /// requested position has been decoded.
    fn poll_frame(&mut self) -> Result<FramePoll>;

    /// Frees the decoder and any resource it opened.
    fn release(&mut self);
}

/// Builds the surface on the thread that will own it.
pub type SurfaceFactory = Box<dyn FnOnce() -> Box<dyn DecodeSurface> + Send>;
