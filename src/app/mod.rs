pub mod config;
pub mod models;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use core_seekshot::{
    export::{export_key_moments, EntryNames, DEFAULT_ARCHIVE_NAME},
    thumbnail::{Fit, ImageFormat, KeyMoment, MediaSource, Thumbnail, ThumbnailGenerator, ThumbnailMap, ThumbnailOptions},
};
use serde::Serialize;
use tracing::{info, warn};

use config::settings::{OptionsOverride, Settings, DEFAULT_CONFIG_FILE};
use models::{ExportSummary, ProbeSummary, ThumbnailSummary};

#[derive(Debug, Parser)]
#[command(name = "seekshot")]
#[command(about = "Capture video thumbnails at timestamps, intervals and key moments")]
#[command(version)]
pub struct Cli {
    /// Settings file
    #[arg(short, long, global = true, env = "SEEKSHOT_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Log at debug level regardless of the settings
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print duration, size and frame rate of a video
    Probe {
        source: String,
    },
    /// Capture the frame at TIME seconds
    Single {
        source: String,
        #[arg(allow_negative_numbers = true)]
        time: f64,
        /// Start from the export preset instead of the preview preset
        #[arg(long)]
        full: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Capture COUNT frames spread from the start to the end of the video
    Interval {
        source: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
        /// Seconds to spread the captures over; probed from the video when omitted
        #[arg(long)]
        duration: Option<f64>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Capture a frame every STEP seconds from the start of the video
    Grid {
        source: String,
        #[arg(short, long, default_value_t = 10.0)]
        step: f64,
        /// Seconds to cover; probed from the video when omitted
        #[arg(long)]
        duration: Option<f64>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Capture one frame per key moment of a JSON file
    Events {
        source: String,
        /// JSON array of { id, timestamp } or { id, start, end } records
        moments: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Pack key-moment captures into a zip archive
    Export {
        source: String,
        moments: PathBuf,
        /// Archive file name inside the output directory
        #[arg(long, default_value = DEFAULT_ARCHIVE_NAME)]
        name: String,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Output directory, defaults to `output_dir` of the settings
    #[arg(short, long)]
    pub out: Option<PathBuf>,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    /// Encoder quality between 0 and 1
    #[arg(long)]
    pub quality: Option<f32>,
    /// jpeg, png or webp
    #[arg(long)]
    pub format: Option<ImageFormat>,
    /// stretch or cover
    #[arg(long)]
    pub fit: Option<Fit>,
}

impl OutputArgs {
    fn options(&self, preset: ThumbnailOptions) -> ThumbnailOptions {
        OptionsOverride {
            width: self.width,
            height: self.height,
            quality: self.quality,
            format: self.format,
            fit: self.fit,
        }
        .apply(preset)
    }

    async fn dir(&self, settings: &Settings) -> Result<PathBuf> {
        let dir = self.out.clone().unwrap_or_else(|| settings.output_dir.clone());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        Ok(dir)
    }
}

pub async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let generator = ThumbnailGenerator::new(settings.generator_config());
    let result = execute(&generator, cli.command, &settings).await;
    generator.dispose();

    result
}

async fn execute(generator: &ThumbnailGenerator, command: Commands, settings: &Settings) -> Result<()> {
    match command {
        Commands::Probe { source } => {
            let source = MediaSource::from(source);
            let info = generator
                .probe(&source)
                .await
                .with_context(|| format!("failed to probe {source}"))?;

            print_json(&ProbeSummary::from(info))
        }
        Commands::Single { source, time, full, output } => {
            let source = MediaSource::from(source);
            let preset = if full {
                settings.export_options()
            } else {
                settings.preview_options()
            };

            let thumbnail = generator
                .generate_thumbnail(&source, time, &output.options(preset))
                .await
                .with_context(|| format!("failed to capture {source} at {time}s"))?;
            let path = thumbnail.save_to_dir(output.dir(settings).await?).await?;

            print_json(&ThumbnailSummary::new(None, &path, &thumbnail))
        }
        Commands::Interval { source, count, duration, output } => {
            let source = MediaSource::from(source);
            let duration = match duration {
                Some(duration) => duration,
                None => generator.probe(&source).await.context("failed to probe duration")?.duration,
            };

            let thumbnails = generator
                .generate_interval_thumbnails(&source, duration, count, &output.options(settings.preview_options()))
                .await
                .with_context(|| format!("failed to capture {source}"))?;

            let summaries = save_numbered(&output.dir(settings).await?, &thumbnails).await?;
            if summaries.len() < count.max(1) {
                warn!(requested = count.max(1), captured = summaries.len(), "some captures failed");
            }
            print_json(&summaries)
        }
        Commands::Grid { source, step, duration, output } => {
            let source = MediaSource::from(source);
            let duration = match duration {
                Some(duration) => duration,
                None => generator.probe(&source).await.context("failed to probe duration")?.duration,
            };

            let thumbnails = generator
                .generate_grid_thumbnails(&source, duration, step, &output.options(settings.preview_options()))
                .await
                .with_context(|| format!("failed to capture {source} every {step}s"))?;

            print_json(&save_numbered(&output.dir(settings).await?, &thumbnails).await?)
        }
        Commands::Events { source, moments, output } => {
            let source = MediaSource::from(source);
            let moments = read_moments(&moments).await?;

            let thumbnails = generator
                .generate_event_thumbnails(&source, &moments, &output.options(settings.preview_options()))
                .await
                .with_context(|| format!("failed to capture {source}"))?;

            let summaries = save_moments(&output.dir(settings).await?, &moments, &thumbnails).await?;
            print_json(&summaries)
        }
        Commands::Export { source, moments, name, output } => {
            let source = MediaSource::from(source);
            let moments = read_moments(&moments).await?;
            let destination = output.dir(settings).await?.join(name);

            let report = export_key_moments(
                generator,
                &source,
                &moments,
                &output.options(settings.export_options()),
                &destination,
            )
            .await
            .with_context(|| format!("failed to export key moments of {source}"))?;

            info!(archive = %report.archive.display(), "archive written");
            print_json(&ExportSummary::from(report))
        }
    }
}

/// Saves batch captures as `001-thumbnail-<t>s.<ext>`, `002-...` in capture order.
async fn save_numbered(dir: &Path, thumbnails: &[Thumbnail]) -> Result<Vec<ThumbnailSummary>> {
    let mut summaries = Vec::with_capacity(thumbnails.len());
    for (index, thumbnail) in thumbnails.iter().enumerate() {
        let path = dir.join(format!("{:03}-{}", index + 1, thumbnail.file_name()));
        thumbnail.save_as(&path).await?;
        summaries.push(ThumbnailSummary::new(None, &path, thumbnail));
    }

    Ok(summaries)
}

/// Saves one file per captured moment, named like the archive entries but
/// falling back to the moment id when there is no label.
async fn save_moments(dir: &Path, moments: &[KeyMoment], thumbnails: &ThumbnailMap) -> Result<Vec<ThumbnailSummary>> {
    let mut names = EntryNames::new();
    let mut summaries = Vec::with_capacity(thumbnails.len());

    for moment in moments {
        let Some(thumbnail) = thumbnails.get(&moment.id) else {
            warn!(id = %moment.id, "no thumbnail for moment");
            continue;
        };

        let label = moment.label.as_deref().unwrap_or(&moment.id);
        let path = dir.join(names.assign(Some(label), moment.timestamp, thumbnail.extension()));
        thumbnail
            .save_as(&path)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        summaries.push(ThumbnailSummary::new(Some(&moment.id), &path, thumbnail));
    }

    Ok(summaries)
}

async fn read_moments(path: &Path) -> Result<Vec<KeyMoment>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    KeyMoment::parse_list(&content).with_context(|| format!("invalid key moments in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
