use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use core_seekshot::thumbnail::{
    Fit, GeneratorConfig, ImageFormat, ThumbnailOptions, TimePolicy, DEFAULT_SEEK_TIMEOUT,
};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "seekshot.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub log_level: String,
    pub seek_timeout_ms: u64,
    pub time_policy: TimePolicy,
    pub output_dir: PathBuf,
    pub preview: OptionsOverride,
    pub export: OptionsOverride,
}

impl Settings {
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            seek_timeout: Duration::from_millis(self.seek_timeout_ms),
            time_policy: self.time_policy,
        }
    }

    pub fn preview_options(&self) -> ThumbnailOptions {
        self.preview.apply(ThumbnailOptions::preview())
    }

    pub fn export_options(&self) -> ThumbnailOptions {
        self.export.apply(ThumbnailOptions::export())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            seek_timeout_ms: DEFAULT_SEEK_TIMEOUT.as_millis() as u64,
            time_policy: TimePolicy::Clamp,
            output_dir: PathBuf::from("."),
            preview: OptionsOverride::default(),
            export: OptionsOverride::default(),
        }
    }
}

/// Fields set here replace the ones of a preset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionsOverride {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<f32>,
    pub format: Option<ImageFormat>,
    pub fit: Option<Fit>,
}

impl OptionsOverride {
    pub fn apply(&self, mut options: ThumbnailOptions) -> ThumbnailOptions {
        if self.width.is_some() || self.height.is_some() {
            options = options.with_size(self.width, self.height);
        }
        if let Some(quality) = self.quality {
            options.quality = quality;
        }
        if let Some(format) = self.format {
            options.format = format;
        }
        if let Some(fit) = self.fit {
            options.fit = fit;
        }
        options
    }
}

pub fn parse(content: &str) -> Result<Settings> {
    toml::from_str(content).context("invalid settings")
}

/// Reads the settings file. A missing file yields the defaults.
pub fn load(path: &Path) -> Result<Settings> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse(&content).with_context(|| format!("failed to load {}", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = parse("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.preview_options(), ThumbnailOptions::preview());
        assert_eq!(settings.export_options(), ThumbnailOptions::export());
        assert_eq!(settings.generator_config(), GeneratorConfig::default());
    }

    #[test]
    fn test_parse_settings() {
        let settings = parse(
            r#"
            log_level = "debug"
            seek_timeout_ms = 1500
            time_policy = "strict"
            output_dir = "thumbs"

            [preview]
            width = 320

            [export]
            format = "webp"
            fit = "cover"
            quality = 0.75
            "#,
        )
        .unwrap();

        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.output_dir, PathBuf::from("thumbs"));
        assert_eq!(settings.generator_config().seek_timeout, Duration::from_millis(1500));
        assert_eq!(settings.generator_config().time_policy, TimePolicy::Strict);

        let preview = settings.preview_options();
        assert_eq!((preview.width, preview.height), (Some(320), None));
        assert_eq!(preview.format, ImageFormat::Jpeg);

        let export = settings.export_options();
        assert_eq!((export.width, export.height), (Some(1920), Some(1080)));
        assert_eq!(export.format, ImageFormat::Webp);
        assert_eq!(export.fit, Fit::Cover);
        assert_eq!(export.quality, 0.75);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(parse("seek_timeout = 3").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
