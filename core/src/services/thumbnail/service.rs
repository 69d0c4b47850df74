use std::sync::Arc;

use super::{
    decoder::FfmpegSurface,
    error::Result,
    generator::{GeneratorConfig, ThumbnailGenerator},
    model::{MediaSource, Thumbnail},
    options::ThumbnailOptions,
    surface::DecodeSurface,
};

type SurfaceMaker = Arc<dyn Fn() -> Box<dyn DecodeSurface> + Send + Sync>;

/// Hands out independent generators that share one configuration.
///
/// Each generator gets its own decode surface, so two consumers of the same
/// video (a player and a key-moment grid, say) never move each other's
/// playback position.
#[derive(Clone)]
pub struct ThumbnailService {
    config: GeneratorConfig,
    make_surface: SurfaceMaker,
}

impl ThumbnailService {
    pub fn new(config: GeneratorConfig) -> Self {
        let seek_timeout = config.seek_timeout;
        Self::with_surface(config, move || FfmpegSurface::with_io_timeout(seek_timeout))
    }

    pub fn with_surface<F, S>(config: GeneratorConfig, make_surface: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: DecodeSurface + 'static,
    {
        Self {
            config,
            make_surface: Arc::new(move || Box::new(make_surface()) as Box<dyn DecodeSurface>),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn generator(&self) -> ThumbnailGenerator {
        let make_surface = self.make_surface.clone();
        ThumbnailGenerator::from_factory(self.config, Box::new(move || make_surface()))
    }

    /// Captures one frame with a generator that is disposed right after.
    pub async fn generate_video_thumbnail(
        &self,
        source: &MediaSource,
        time: f64,
        options: &ThumbnailOptions,
    ) -> Result<Thumbnail> {
        let generator = self.generator();
        let result = generator.generate_thumbnail(source, time, options).await;
        generator.dispose();

        result
    }

    /// Captures `timestamps` with a generator that is disposed right after.
    pub async fn generate_video_thumbnails(
        &self,
        source: &MediaSource,
        timestamps: &[f64],
        options: &ThumbnailOptions,
    ) -> Result<Vec<Thumbnail>> {
        let generator = self.generator();
        let result = generator.generate_thumbnails(source, timestamps, options).await;
        generator.dispose();

        result
    }
}

impl Default for ThumbnailService {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}
