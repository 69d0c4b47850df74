use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use image::{Rgba, RgbaImage};

use super::{
    error::{Result, ThumbnailError},
    model::MediaSource,
    surface::{DecodeSurface, DecodedFrame, FramePoll, SourceInfo},
};

const TIME_EPSILON: f64 = 1e-6;

/// In-memory test pattern video.
///
/// Frame `n` is filled with a colour that encodes `n` (see
/// [`SyntheticSurface::frame_index_of`]), so an encoded thumbnail can be traced
/// back to the exact frame that was captured.
#[derive(Debug, Clone)]
pub struct SyntheticSurface {
    duration: f64,
    fps: f64,
    width: u32,
    height: u32,
    decode_steps: usize,
    step_delay: Duration,
    unreachable: Vec<MediaSource>,
    stalled_at: Vec<f64>,
    broken_at: Vec<f64>,
    loads: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    loaded: bool,
    target: Option<f64>,
    remaining_steps: usize,
}

impl SyntheticSurface {
    pub fn new(duration: f64, fps: f64, width: u32, height: u32) -> Self {
        Self {
            duration,
            fps,
            width,
            height,
            decode_steps: 2,
            step_delay: Duration::ZERO,
            unreachable: vec![],
            stalled_at: vec![],
            broken_at: vec![],
            loads: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
            loaded: false,
            target: None,
            remaining_steps: 0,
        }
    }

    /// Number of `Pending` polls before a seek settles, and the time each poll takes.
    pub fn with_decode_latency(mut self, steps: usize, step_delay: Duration) -> Self {
        self.decode_steps = steps;
        self.step_delay = step_delay;
        self
    }

    /// Loading `source` fails as if the network or codec rejected it.
    pub fn with_unreachable_source(mut self, source: impl Into<MediaSource>) -> Self {
        self.unreachable.push(source.into());
        self
    }

    /// Seeks to `time` never settle.
    pub fn with_stall_at(mut self, time: f64) -> Self {
        self.stalled_at.push(time);
        self
    }

    /// Seeks to `time` produce a decode error.
    pub fn with_broken_frame_at(mut self, time: f64) -> Self {
        self.broken_at.push(time);
        self
    }

    /// Shared count of successful `load` calls.
    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        self.loads.clone()
    }

    /// Shared count of `release` calls.
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        self.releases.clone()
    }

    pub fn frame_count(&self) -> u32 {
        ((self.duration * self.fps).round() as u32).max(1)
    }

    /// Index of the first frame presented at or after `time`, or the last frame.
    pub fn frame_index_at(&self, time: f64) -> u32 {
        let index = (time * self.fps - TIME_EPSILON).ceil().max(0.0) as u32;
        index.min(self.frame_count() - 1)
    }

    pub fn frame_color(index: u32) -> Rgba<u8> {
        Rgba([(index & 0xff) as u8, ((index >> 8) & 0xff) as u8, 0x80, 0xff])
    }

    /// Recovers the frame index from a pixel of a losslessly encoded frame.
    pub fn frame_index_of(pixel: &Rgba<u8>) -> u32 {
        pixel[0] as u32 | ((pixel[1] as u32) << 8)
    }

    fn matches(times: &[f64], time: f64) -> bool {
        times.iter().any(|t| (t - time).abs() < TIME_EPSILON)
    }

    fn render(&self, time: f64) -> DecodedFrame {
        let index = self.frame_index_at(time);
        let image = RgbaImage::from_pixel(self.width, self.height, Self::frame_color(index));

        DecodedFrame {
            image,
            time: index as f64 / self.fps,
        }
    }
}

impl DecodeSurface for SyntheticSurface {
    fn load(&mut self, source: &MediaSource) -> Result<SourceInfo> {
        if self.unreachable.contains(source) {
            return Err(ThumbnailError::unavailable(source.as_str(), "connection refused"));
        }

        self.loaded = true;
        self.target = None;
        self.loads.fetch_add(1, Ordering::SeqCst);

        Ok(SourceInfo {
            duration: self.duration,
            width: self.width,
            height: self.height,
            frame_duration: 1.0 / self.fps,
        })
    }

    fn seek(&mut self, time: f64) -> Result<()> {
        if !self.loaded {
            return Err(ThumbnailError::Decode {
                time,
                reason: "no source loaded".into(),
            });
        }

        self.target = Some(time);
        self.remaining_steps = self.decode_steps;
        Ok(())
    }

    fn poll_frame(&mut self) -> Result<FramePoll> {
        let Some(target) = self.target else {
            return Ok(FramePoll::Pending);
        };

        if !self.step_delay.is_zero() {
            thread::sleep(self.step_delay);
        }

        if Self::matches(&self.stalled_at, target) {
            thread::sleep(Duration::from_millis(1));
            return Ok(FramePoll::Pending);
        }

        if Self::matches(&self.broken_at, target) {
            self.target = None;
            return Err(ThumbnailError::Decode {
                time: target,
                reason: "corrupt packet".into(),
            });
        }

        if self.remaining_steps > 0 {
            self.remaining_steps -= 1;
            return Ok(FramePoll::Pending);
        }

        self.target = None;
        Ok(FramePoll::Ready(self.render(target)))
    }

    fn release(&mut self) {
        self.loaded = false;
        self.target = None;
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(surface: &mut SyntheticSurface) -> DecodedFrame {
        loop {
            match surface.poll_frame().unwrap() {
                FramePoll::Ready(frame) => break frame,
                FramePoll::Pending => continue,
            }
        }
    }

    #[test]
    fn test_frame_index_mapping() {
        let surface = SyntheticSurface::new(10.0, 30.0, 8, 8);
        assert_eq!(surface.frame_count(), 300);
        assert_eq!(surface.frame_index_at(0.0), 0);
        assert_eq!(surface.frame_index_at(1.0), 30);
        assert_eq!(surface.frame_index_at(1.01), 31);
        assert_eq!(surface.frame_index_at(10.0), 299);

        for index in [0, 1, 255, 256, 4799] {
            let color = SyntheticSurface::frame_color(index);
            assert_eq!(SyntheticSurface::frame_index_of(&color), index);
        }
    }

    #[test]
    fn test_seek_settles_after_decode_steps() {
        let mut surface = SyntheticSurface::new(10.0, 25.0, 4, 4)
            .with_decode_latency(3, Duration::ZERO);
        surface.load(&MediaSource::from("talk.mp4")).unwrap();
        surface.seek(2.0).unwrap();

        for _ in 0..3 {
            assert!(matches!(surface.poll_frame().unwrap(), FramePoll::Pending));
        }
        let frame = settle(&mut surface);
        assert_eq!(frame.time, 2.0);
        assert_eq!(SyntheticSurface::frame_index_of(frame.image.get_pixel(0, 0)), 50);
    }

    #[test]
    fn test_faults() {
        let mut surface = SyntheticSurface::new(10.0, 25.0, 4, 4)
            .with_unreachable_source("down.mp4")
            .with_broken_frame_at(4.0);

        assert!(surface.load(&MediaSource::from("down.mp4")).unwrap_err().is_source_failure());
        assert!(surface.seek(1.0).is_err());

        surface.load(&MediaSource::from("up.mp4")).unwrap();
        surface.seek(4.0).unwrap();
        let err = loop {
            match surface.poll_frame() {
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert!(matches!(err, ThumbnailError::Decode { .. }));

        surface.release();
        assert_eq!(surface.release_counter().load(Ordering::SeqCst), 1);
        assert_eq!(surface.load_counter().load(Ordering::SeqCst), 1);
    }
}
