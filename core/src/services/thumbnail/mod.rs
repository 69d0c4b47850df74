pub(crate) mod capture;
pub(crate) mod decoder;
pub(crate) mod encode;
pub(crate) mod error;
pub(crate) mod generator;
pub(crate) mod model;
pub(crate) mod options;
pub(crate) mod service;
pub(crate) mod surface;
#[cfg(any(test, feature = "testing"))]
pub(crate) mod synthetic;

pub use capture::{resolve_time, CaptureRequest, FrameCapture};
pub use decoder::FfmpegSurface;
pub use encode::{encode, rasterize};
pub use error::{Result, ThumbnailError};
pub use generator::{grid_timestamps, interval_timestamps, GeneratorConfig, ThumbnailGenerator, DEFAULT_SEEK_TIMEOUT};
pub use model::{KeyMoment, MediaSource, Thumbnail, ThumbnailMap};
pub use options::{Fit, ImageFormat, ThumbnailOptions, TimePolicy};
pub use service::ThumbnailService;
pub use surface::{DecodeSurface, DecodedFrame, FramePoll, SourceInfo, SurfaceFactory};
#[cfg(any(test, feature = "testing"))]
pub use synthetic::SyntheticSurface;
