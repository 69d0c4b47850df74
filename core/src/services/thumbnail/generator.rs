use std::{
    mem,
    sync::{Mutex, PoisonError},
    thread,
    time::Duration,
};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    capture::{CaptureRequest, FrameCapture},
    decoder::FfmpegSurface,
    error::{Result, ThumbnailError},
    model::{KeyMoment, MediaSource, Thumbnail, ThumbnailMap},
    options::{ThumbnailOptions, TimePolicy},
    surface::{DecodeSurface, SourceInfo, SurfaceFactory},
};

pub const DEFAULT_SEEK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorConfig {
    /// Upper bound on the wait for a seek to produce its frame.
    pub seek_timeout: Duration,
    pub time_policy: TimePolicy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seek_timeout: DEFAULT_SEEK_TIMEOUT,
            time_policy: TimePolicy::Clamp,
        }
    }
}

enum Job {
    Capture {
        source: MediaSource,
        request: CaptureRequest,
        reply: oneshot::Sender<Result<Thumbnail>>,
    },
    Probe {
        source: MediaSource,
        reply: oneshot::Sender<Result<SourceInfo>>,
    },
}

enum State {
    /// No capture has been requested yet; the surface does not exist.
    Idle(SurfaceFactory),
    Running(mpsc::UnboundedSender<Job>),
    Disposed,
}

/// Captures thumbnails from videos through one private decode surface.
///
/// The surface lives on a dedicated worker thread that takes capture jobs from
/// a FIFO queue, so captures run one at a time and in the order they were
/// requested, however many callers await the generator concurrently. The
/// surface is never shared with anything else, in particular not with a
/// player showing the same video.
pub struct ThumbnailGenerator {
    config: GeneratorConfig,
    state: Mutex<State>,
    cancel: CancellationToken,
}

impl ThumbnailGenerator {
    /// Generator decoding through FFmpeg. Network reads are bounded by the
    /// seek timeout too, so a stalled remote source cannot block a poll.
    pub fn new(config: GeneratorConfig) -> Self {
        let seek_timeout = config.seek_timeout;
        Self::with_surface(config, move || FfmpegSurface::with_io_timeout(seek_timeout))
    }

    /// Generator decoding through the surface built by `factory` on first use.
    pub fn with_surface<F, S>(config: GeneratorConfig, factory: F) -> Self
    where
        F: FnOnce() -> S + Send + 'static,
        S: DecodeSurface + 'static,
    {
        Self::from_factory(config, Box::new(move || Box::new(factory()) as Box<dyn DecodeSurface>))
    }

    pub(crate) fn from_factory(config: GeneratorConfig, factory: SurfaceFactory) -> Self {
        Self {
            config,
            state: Mutex::new(State::Idle(factory)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Captures one frame. Errors are returned as they occur.
    pub async fn generate_thumbnail(
        &self,
        source: &MediaSource,
        time: f64,
        options: &ThumbnailOptions,
    ) -> Result<Thumbnail> {
        let request = CaptureRequest {
            time,
            options: *options,
        };
        self.capture(source, request).await
    }

    /// Captures each of `timestamps`, in order, skipping the ones that fail.
    ///
    /// Fails as a whole only when the source cannot be loaded or the generator
    /// is disposed.
    pub async fn generate_thumbnails(
        &self,
        source: &MediaSource,
        timestamps: &[f64],
        options: &ThumbnailOptions,
    ) -> Result<Vec<Thumbnail>> {
        let mut thumbnails = Vec::with_capacity(timestamps.len());

        for &time in timestamps {
            if let Some(thumbnail) = self.capture_in_batch(source, time, options).await? {
                thumbnails.push(thumbnail);
            }
        }

        Ok(thumbnails)
    }

    /// Captures `count` frames evenly spread over `[0, duration]`, first at 0
    /// and last at `duration`. See [`interval_timestamps`].
    pub async fn generate_interval_thumbnails(
        &self,
        source: &MediaSource,
        duration: f64,
        count: usize,
        options: &ThumbnailOptions,
    ) -> Result<Vec<Thumbnail>> {
        let timestamps = interval_timestamps(duration, count);
        debug!(source = %source, duration, count, "generating interval thumbnails");

        self.generate_thumbnails(source, &timestamps, options).await
    }

    /// Captures a frame every `step` seconds from 0 while before `duration`.
    /// See [`grid_timestamps`].
    pub async fn generate_grid_thumbnails(
        &self,
        source: &MediaSource,
        duration: f64,
        step: f64,
        options: &ThumbnailOptions,
    ) -> Result<Vec<Thumbnail>> {
        let timestamps = grid_timestamps(duration, step)?;
        debug!(source = %source, duration, step, count = timestamps.len(), "generating grid thumbnails");

        self.generate_thumbnails(source, &timestamps, options).await
    }

    /// Captures one frame per event, keyed by event id. Events whose capture
    /// fails are left out of the map.
    pub async fn generate_event_thumbnails(
        &self,
        source: &MediaSource,
        events: &[KeyMoment],
        options: &ThumbnailOptions,
    ) -> Result<ThumbnailMap> {
        let mut thumbnails = ThumbnailMap::with_capacity(events.len());

        for event in events {
            if let Some(thumbnail) = self.capture_in_batch(source, event.timestamp, options).await? {
                if thumbnails.insert(event.id.clone(), thumbnail).is_some() {
                    warn!(id = %event.id, "duplicate event id, keeping the later capture");
                }
            }
        }

        Ok(thumbnails)
    }

    /// Loads `source` on the generator's surface and returns its metadata.
    pub async fn probe(&self, source: &MediaSource) -> Result<SourceInfo> {
        self.submit(|reply| Job::Probe {
            source: source.clone(),
            reply,
        })
        .await
    }

    /// Tears the decode surface down. Pending and later captures fail with
    /// [`ThumbnailError::GeneratorDisposed`]. Calling it again does nothing.
    pub fn dispose(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            mem::replace(&mut *state, State::Disposed)
        };

        if matches!(previous, State::Disposed) {
            return;
        }

        self.cancel.cancel();
        // dropping the queue sender lets the worker drain, release and exit
        drop(previous);
        info!("thumbnail generator disposed");
    }

    async fn capture_in_batch(
        &self,
        source: &MediaSource,
        time: f64,
        options: &ThumbnailOptions,
    ) -> Result<Option<Thumbnail>> {
        match self.generate_thumbnail(source, time, options).await {
            Ok(thumbnail) => Ok(Some(thumbnail)),
            Err(err) if err.is_source_failure() || err.is_terminal() => Err(err),
            Err(err) => {
                warn!(source = %source, time, error = %err, "skipping thumbnail");
                Ok(None)
            }
        }
    }

    async fn capture(&self, source: &MediaSource, request: CaptureRequest) -> Result<Thumbnail> {
        self.submit(|reply| Job::Capture {
            source: source.clone(),
            request,
            reply,
        })
        .await
    }

    /// Queues the job built by `job` and waits for its reply or for disposal.
    async fn submit<T>(&self, job: impl FnOnce(oneshot::Sender<Result<T>>) -> Job) -> Result<T> {
        let (reply, response) = oneshot::channel();

        self.queue()?
            .send(job(reply))
            .map_err(|_| self.closed_error())?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ThumbnailError::GeneratorDisposed),
            result = response => result.unwrap_or_else(|_| Err(self.closed_error())),
        }
    }

    fn closed_error(&self) -> ThumbnailError {
        if self.is_disposed() {
            ThumbnailError::GeneratorDisposed
        } else {
            ThumbnailError::Worker
        }
    }

    /// Sender of the job queue, starting the worker on first use.
    fn queue(&self) -> Result<mpsc::UnboundedSender<Job>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let factory = match mem::replace(&mut *state, State::Disposed) {
            State::Idle(factory) => factory,
            State::Running(sender) => {
                *state = State::Running(sender.clone());
                return Ok(sender);
            }
            State::Disposed => return Err(ThumbnailError::GeneratorDisposed),
        };

        let (sender, jobs) = mpsc::unbounded_channel();
        let config = self.config;
        let cancel = self.cancel.clone();

        thread::Builder::new()
            .name("thumbnail-capture".into())
            .spawn(move || run_worker(factory, jobs, config, cancel))?;

        *state = State::Running(sender.clone());
        Ok(sender)
    }
}

impl Drop for ThumbnailGenerator {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn run_worker(
    factory: SurfaceFactory,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    config: GeneratorConfig,
    cancel: CancellationToken,
) {
    let mut capture = FrameCapture::new(factory(), config.time_policy, config.seek_timeout);
    debug!("decode surface created");

    while let Some(job) = jobs.blocking_recv() {
        match job {
            // a closed reply means the caller stopped waiting
            Job::Capture { reply, .. } if reply.is_closed() => {}
            Job::Capture { reply, .. } if cancel.is_cancelled() => {
                let _ = reply.send(Err(ThumbnailError::GeneratorDisposed));
            }
            Job::Capture { source, request, reply } => {
                let _ = reply.send(capture.seek_and_capture(&source, &request, &cancel));
            }
            Job::Probe { reply, .. } if reply.is_closed() => {}
            Job::Probe { reply, .. } if cancel.is_cancelled() => {
                let _ = reply.send(Err(ThumbnailError::GeneratorDisposed));
            }
            Job::Probe { source, reply } => {
                let _ = reply.send(capture.ensure_source(&source));
            }
        }
    }

    capture.release();
    debug!("decode surface released");
}

/// `count` times evenly spread over `[0, duration]`, both ends included.
///
/// A `count` of 0 or 1, or a duration that is not a positive number, yields
/// the single time 0.
pub fn interval_timestamps(duration: f64, count: usize) -> Vec<f64> {
    if count <= 1 || !duration.is_finite() || duration <= 0.0 {
        return vec![0.0];
    }

    let intervals = (count - 1) as f64;
    let mut timestamps: Vec<f64> = (0..count)
        .map(|i| duration * i as f64 / intervals)
        .collect();
    timestamps[count - 1] = duration;

    timestamps
}

/// `0, step, 2 * step, ...` up to but excluding `duration`. There is always a
/// point at 0, even for an empty or unknown duration.
pub fn grid_timestamps(duration: f64, step: f64) -> Result<Vec<f64>> {
    if !step.is_finite() || step <= 0.0 {
        return Err(ThumbnailError::TimeOutOfRange { time: step, duration });
    }
    if !duration.is_finite() || duration <= 0.0 {
        return Ok(vec![0.0]);
    }

    Ok((0..)
        .map(|i| i as f64 * step)
        .take_while(|&time| time < duration)
        .collect())
}
