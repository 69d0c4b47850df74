use ffmpeg_next as ffmpeg;
use ffmpeg::{
    format,
    media::Type,
    software::scaling,
    util::frame,
};
use std::time::Duration;

use image::RgbaImage;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use super::{
    error::{Result, ThumbnailError},
    model::MediaSource,
    surface::{DecodeSurface, DecodedFrame, FramePoll, SourceInfo},
};

const AV_TIME_BASE: f64 = 1_000_000.0;
const FALLBACK_FRAME_RATE: f64 = 30.0;

fn init() -> Result<(), ffmpeg::Error> {
    static INIT: OnceCell<Result<(), ffmpeg::Error>> = OnceCell::new();

    *INIT.get_or_init(|| {
        let result = ffmpeg::init();
        if result.is_ok() {
            format::network::init();
        }
        result
    })
}

struct OpenedSource {
    input: format::context::Input,
    stream_index: usize,
    time_base: f64,
    decoder: ffmpeg::decoder::Video,
    info: SourceInfo,
}

impl OpenedSource {
    fn open(source: &MediaSource, io_timeout: Option<Duration>) -> Result<Self, ffmpeg::Error> {
        init()?;
        let input = format::input_with_dictionary(&source.as_str(), open_options(io_timeout))?;

        let (stream_index, time_base, frame_rate, stream_duration, decoder) = {
            let stream = input
                .streams()
                .best(Type::Video)
                .ok_or(ffmpeg::Error::StreamNotFound)?;

            let frame_rate = f64::from(stream.avg_frame_rate());
            let time_base = f64::from(stream.time_base());
            let decode_context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
            let decoder = decode_context.decoder().video()?;

            (stream.index(), time_base, frame_rate, stream.duration() as f64 * time_base, decoder)
        };

        let duration = if input.duration() > 0 {
            input.duration() as f64 / AV_TIME_BASE
        } else {
            stream_duration.max(0.0)
        };
        let frame_rate = if frame_rate.is_finite() && frame_rate > 0.0 {
            frame_rate
        } else {
            FALLBACK_FRAME_RATE
        };

        let info = SourceInfo {
            duration,
            width: decoder.width(),
            height: decoder.height(),
            frame_duration: 1.0 / frame_rate,
        };

        Ok(Self {
            input,
            stream_index,
            time_base,
            decoder,
            info,
        })
    }

    /// Drains decoded frames, returning the first one presented at `target` or later.
    /// Earlier frames are kept in `last` for the end-of-stream case.
    fn receive(
        &mut self,
        target: f64,
        last: &mut Option<(frame::Video, f64)>,
    ) -> Option<(frame::Video, f64)> {
        let half_frame = self.info.frame_duration / 2.0;

        loop {
            let mut decoded = frame::Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_err() {
                return None;
            }

            let time = decoded
                .timestamp()
                .map(|ts| ts as f64 * self.time_base)
                .unwrap_or(0.0);

            if time + half_frame >= target {
                return Some((decoded, time));
            }
            *last = Some((decoded, time));
        }
    }
}

/// Demuxer options for opening a source. `rw_timeout` bounds every blocking
/// read on network protocols, which otherwise wait forever on a stalled peer.
fn open_options(io_timeout: Option<Duration>) -> ffmpeg::Dictionary<'static> {
    let mut options = ffmpeg::Dictionary::new();
    if let Some(timeout) = io_timeout {
        options.set("rw_timeout", &timeout.as_micros().max(1).to_string());
    }
    options
}

fn is_timeout(err: &ffmpeg::Error) -> bool {
    matches!(err, ffmpeg::Error::Other { errno } if *errno == libc::ETIMEDOUT)
}

/// Decode surface backed by FFmpeg. Opens local files and network URLs.
#[derive(Default)]
pub struct FfmpegSurface {
    io_timeout: Option<Duration>,
    opened: Option<OpenedSource>,
    target: Option<f64>,
    last: Option<(frame::Video, f64)>,
    eof: bool,
}

impl FfmpegSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface whose network reads give up after `timeout`.
    pub fn with_io_timeout(timeout: Duration) -> Self {
        Self {
            io_timeout: Some(timeout),
            ..Self::default()
        }
    }

    fn to_rgba(decoded: &frame::Video, time: f64) -> Result<DecodedFrame> {
        let (width, height) = (decoded.width(), decoded.height());
        let decode_error = |err: ffmpeg::Error| ThumbnailError::Decode {
            time,
            reason: err.to_string(),
        };

        let mut sws_context = scaling::Context::get(
            decoded.format(),
            width,
            height,
            format::Pixel::RGBA,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .map_err(decode_error)?;

        let mut rgba_frame = frame::Video::empty();
        sws_context.run(decoded, &mut rgba_frame).map_err(decode_error)?;

        // rows may be padded past width * 4
        let stride = rgba_frame.stride(0);
        let row_len = width as usize * 4;
        let mut data = Vec::with_capacity(row_len * height as usize);
        for row in rgba_frame.data(0).chunks(stride).take(height as usize) {
            data.extend_from_slice(&row[..row_len]);
        }

        let image = RgbaImage::from_raw(width, height, data).ok_or_else(|| ThumbnailError::Decode {
            time,
            reason: "frame buffer smaller than frame".into(),
        })?;

        Ok(DecodedFrame { image, time })
    }
}

impl DecodeSurface for FfmpegSurface {
    fn load(&mut self, source: &MediaSource) -> Result<SourceInfo> {
        self.release();

        let opened = OpenedSource::open(source, self.io_timeout).map_err(|err| {
            warn!(source = %source, error = %err, "failed to open media source");
            ThumbnailError::unavailable(source.as_str(), err)
        })?;
        let info = opened.info;
        self.opened = Some(opened);

        Ok(info)
    }

    fn seek(&mut self, time: f64) -> Result<()> {
        let opened = self.opened.as_mut().ok_or_else(|| ThumbnailError::Decode {
            time,
            reason: "no source loaded".into(),
        })?;

        let ts = (time * AV_TIME_BASE) as i64;
        let io_timeout = self.io_timeout;
        opened.input.seek(ts, ..ts).map_err(|err| match io_timeout {
            Some(timeout) if is_timeout(&err) => ThumbnailError::SeekTimeout {
                time,
                timeout_ms: timeout.as_millis(),
            },
            _ => ThumbnailError::Decode {
                time,
                reason: format!("seek failed: {err}"),
            },
        })?;
        opened.decoder.flush();

        self.target = Some(time);
        self.last = None;
        self.eof = false;
        debug!(time, "seek requested");

        Ok(())
    }

    fn poll_frame(&mut self) -> Result<FramePoll> {
        let (Some(opened), Some(target)) = (self.opened.as_mut(), self.target) else {
            return Ok(FramePoll::Pending);
        };

        if let Some((decoded, time)) = opened.receive(target, &mut self.last) {
            self.target = None;
            return Self::to_rgba(&decoded, time).map(FramePoll::Ready);
        }

        if self.eof {
            // the requested position lies past the last frame
            self.target = None;
            return match self.last.take() {
                Some((decoded, time)) => Self::to_rgba(&decoded, time).map(FramePoll::Ready),
                None => Err(ThumbnailError::Decode {
                    time: target,
                    reason: "stream ended before any frame was decoded".into(),
                }),
            };
        }

        // read packets one at a time: the packets() iterator retries failed
        // reads forever, which would swallow a network timeout
        let mut packet = ffmpeg::Packet::empty();
        let sent = match packet.read(&mut opened.input) {
            Ok(()) if packet.stream() == opened.stream_index => opened.decoder.send_packet(&packet),
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::Eof) => {
                self.eof = true;
                opened.decoder.send_eof()
            }
            Err(ffmpeg::Error::Other { errno }) if errno == libc::EAGAIN => Ok(()),
            Err(err) if is_timeout(&err) => {
                warn!(time = target, "media source stopped sending data");
                self.target = None;
                return Err(ThumbnailError::SeekTimeout {
                    time: target,
                    timeout_ms: self.io_timeout.map_or(0, |timeout| timeout.as_millis()),
                });
            }
            Err(err) => Err(err),
        };

        sent.map_err(|err| ThumbnailError::Decode {
            time: target,
            reason: err.to_string(),
        })?;

        Ok(FramePoll::Pending)
    }

    fn release(&mut self) {
        if self.opened.take().is_some() {
            debug!("media source closed");
        }
        self.target = None;
        self.last = None;
        self.eof = false;
    }
}
