use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    encode,
    error::{Result, ThumbnailError},
    model::{MediaSource, Thumbnail},
    options::{ThumbnailOptions, TimePolicy},
    surface::{DecodeSurface, FramePoll, SourceInfo},
};

/// A single capture: where to seek and how to encode what is found there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRequest {
    pub time: f64,
    pub options: ThumbnailOptions,
}

/// Seek-and-grab primitive over one exclusively owned [`DecodeSurface`].
pub struct FrameCapture {
    surface: Box<dyn DecodeSurface>,
    loaded: Option<(MediaSource, SourceInfo)>,
    policy: TimePolicy,
    seek_timeout: Duration,
    released: bool,
}

impl FrameCapture {
    pub fn new(surface: Box<dyn DecodeSurface>, policy: TimePolicy, seek_timeout: Duration) -> Self {
        Self {
            surface,
            loaded: None,
            policy,
            seek_timeout,
            released: false,
        }
    }

    /// Points the surface at `source` unless it already is, returning its metadata.
    pub fn ensure_source(&mut self, source: &MediaSource) -> Result<SourceInfo> {
        if let Some((loaded, info)) = &self.loaded {
            if loaded == source {
                return Ok(*info);
            }
        }

        self.loaded = None;
        let info = self.surface.load(source)?;
        debug!(source = %source, duration = info.duration, width = info.width, height = info.height, "source loaded");
        self.loaded = Some((source.clone(), info));

        Ok(info)
    }

    /// Moves the playback head to `request.time` and encodes the frame found there.
    ///
    /// `cancel` is checked between decode steps so a disposed generator stops
    /// waiting on a frame.
    pub fn seek_and_capture(
        &mut self,
        source: &MediaSource,
        request: &CaptureRequest,
        cancel: &CancellationToken,
    ) -> Result<Thumbnail> {
        if self.released {
            return Err(ThumbnailError::GeneratorDisposed);
        }

        let info = self.ensure_source(source)?;
        let time = resolve_time(request.time, info.duration, self.policy)?;

        let deadline = Instant::now() + self.seek_timeout;
        self.surface.seek(time)?;

        let frame = loop {
            if cancel.is_cancelled() {
                return Err(ThumbnailError::GeneratorDisposed);
            }

            match self.surface.poll_frame()? {
                FramePoll::Ready(frame) => break frame,
                FramePoll::Pending if Instant::now() >= deadline => {
                    return Err(ThumbnailError::SeekTimeout {
                        time,
                        timeout_ms: self.seek_timeout.as_millis(),
                    });
                }
                FramePoll::Pending => {}
            }
        };

        let options = &request.options;
        let (width, height) = options.resolve_size(frame.image.width(), frame.image.height());
        let canvas = encode::rasterize(&frame.image, width, height, options.fit);
        let bytes = encode::encode(&canvas, options.format, options.normalized_quality())?;

        debug!(requested = request.time, captured = frame.time, width, height, "frame captured");

        Ok(Thumbnail::from_encoded(&bytes, width, height, frame.time, options.format))
    }

    /// Releases the surface. Later calls are no-ops.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.loaded = None;
            self.surface.release();
        }
    }
}

/// Applies `policy` to a requested time. An unknown (non-positive) duration
/// only bounds the time from below.
pub fn resolve_time(time: f64, duration: f64, policy: TimePolicy) -> Result<f64> {
    let upper = if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        f64::INFINITY
    };

    if !time.is_finite() {
        return Err(ThumbnailError::TimeOutOfRange { time, duration });
    }

    match policy {
        TimePolicy::Clamp => Ok(time.clamp(0.0, upper)),
        TimePolicy::Strict if time < 0.0 || time > upper => {
            Err(ThumbnailError::TimeOutOfRange { time, duration })
        }
        TimePolicy::Strict => Ok(time),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::thumbnail::{options::ImageFormat, synthetic::SyntheticSurface};
    use std::sync::atomic::Ordering;

    fn png_options() -> ThumbnailOptions {
        ThumbnailOptions::preview().with_format(ImageFormat::Png).with_quality(1.0)
    }

    fn captured_index(thumb: &Thumbnail) -> u32 {
        let image = image::load_from_memory(&thumb.bytes().unwrap()).unwrap().to_rgba8();
        SyntheticSurface::frame_index_of(image.get_pixel(image.width() / 2, image.height() / 2))
    }

    #[test]
    fn test_resolve_time() {
        assert_eq!(resolve_time(-3.0, 10.0, TimePolicy::Clamp).unwrap(), 0.0);
        assert_eq!(resolve_time(12.0, 10.0, TimePolicy::Clamp).unwrap(), 10.0);
        assert_eq!(resolve_time(10.0, 10.0, TimePolicy::Strict).unwrap(), 10.0);
        assert_eq!(resolve_time(50.0, 0.0, TimePolicy::Strict).unwrap(), 50.0);
        assert!(matches!(
            resolve_time(10.5, 10.0, TimePolicy::Strict),
            Err(ThumbnailError::TimeOutOfRange { .. })
        ));
        assert!(matches!(
            resolve_time(-0.1, 10.0, TimePolicy::Strict),
            Err(ThumbnailError::TimeOutOfRange { .. })
        ));
        assert!(resolve_time(f64::NAN, 10.0, TimePolicy::Clamp).is_err());
    }

    #[test]
    fn test_capture_reads_requested_frame() {
        let surface = SyntheticSurface::new(20.0, 25.0, 64, 36);
        let loads = surface.load_counter();
        let mut capture = FrameCapture::new(Box::new(surface), TimePolicy::Clamp, Duration::from_secs(1));
        let source = MediaSource::from("talk.mp4");
        let cancel = CancellationToken::new();

        for time in [0.0, 4.0, 12.48, 20.0] {
            let request = CaptureRequest { time, options: png_options() };
            let thumb = capture.seek_and_capture(&source, &request, &cancel).unwrap();

            assert!((thumb.source_time - time).abs() <= 1.0 / 25.0 + 1e-9, "{time} -> {}", thumb.source_time);
            assert_eq!(captured_index(&thumb), (thumb.source_time * 25.0).round() as u32);
            assert_eq!((thumb.width, thumb.height), (160, 90));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_capture_switches_source() {
        let surface = SyntheticSurface::new(5.0, 10.0, 8, 8);
        let loads = surface.load_counter();
        let mut capture = FrameCapture::new(Box::new(surface), TimePolicy::Clamp, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let request = CaptureRequest { time: 1.0, options: png_options() };

        capture.seek_and_capture(&"a.mp4".into(), &request, &cancel).unwrap();
        capture.seek_and_capture(&"b.mp4".into(), &request, &cancel).unwrap();
        capture.seek_and_capture(&"b.mp4".into(), &request, &cancel).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_single_side_keeps_aspect_ratio() {
        let surface = SyntheticSurface::new(5.0, 10.0, 128, 72);
        let mut capture = FrameCapture::new(Box::new(surface), TimePolicy::Clamp, Duration::from_secs(1));
        let request = CaptureRequest {
            time: 1.0,
            options: png_options().with_size(Some(64), None),
        };

        let thumb = capture
            .seek_and_capture(&"a.mp4".into(), &request, &CancellationToken::new())
            .unwrap();
        assert_eq!((thumb.width, thumb.height), (64, 36));
    }

    #[test]
    fn test_stalled_seek_times_out() {
        let surface = SyntheticSurface::new(10.0, 10.0, 8, 8).with_stall_at(3.0);
        let mut capture = FrameCapture::new(Box::new(surface), TimePolicy::Clamp, Duration::from_millis(30));
        let source = MediaSource::from("a.mp4");
        let cancel = CancellationToken::new();

        let stalled = CaptureRequest { time: 3.0, options: png_options() };
        let err = capture.seek_and_capture(&source, &stalled, &cancel).unwrap_err();
        assert!(matches!(err, ThumbnailError::SeekTimeout { .. }));

        // the surface stays usable after a timeout
        let next = CaptureRequest { time: 4.0, options: png_options() };
        assert!(capture.seek_and_capture(&source, &next, &cancel).is_ok());
    }

    #[test]
    fn test_unreachable_source_and_strict_policy() {
        let surface = SyntheticSurface::new(10.0, 10.0, 8, 8).with_unreachable_source("gone.mp4");
        let mut capture = FrameCapture::new(Box::new(surface), TimePolicy::Strict, Duration::from_secs(1));
        let cancel = CancellationToken::new();

        let request = CaptureRequest { time: 1.0, options: png_options() };
        let err = capture.seek_and_capture(&"gone.mp4".into(), &request, &cancel).unwrap_err();
        assert!(err.is_source_failure());

        let request = CaptureRequest { time: 11.0, options: png_options() };
        let err = capture.seek_and_capture(&"ok.mp4".into(), &request, &cancel).unwrap_err();
        assert!(matches!(err, ThumbnailError::TimeOutOfRange { .. }));
    }

    #[test]
    fn test_cancelled_and_released() {
        let surface = SyntheticSurface::new(10.0, 10.0, 8, 8);
        let releases = surface.release_counter();
        let mut capture = FrameCapture::new(Box::new(surface), TimePolicy::Clamp, Duration::from_secs(1));
        let request = CaptureRequest { time: 1.0, options: png_options() };

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = capture.seek_and_capture(&"a.mp4".into(), &request, &cancel).unwrap_err();
        assert!(matches!(err, ThumbnailError::GeneratorDisposed));

        capture.release();
        capture.release();
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        let err = capture
            .seek_and_capture(&"a.mp4".into(), &request, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ThumbnailError::GeneratorDisposed));
    }
}
