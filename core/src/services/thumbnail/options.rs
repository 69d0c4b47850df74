use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

/// How a frame is mapped onto the requested box when both sides are given.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    #[default]
    Stretch,
    /// Keep the source aspect ratio and crop the overflow around the centre.
    Cover,
}

/// What to do with a time outside `[0, duration]`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum TimePolicy {
    #[default]
    Clamp,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: f32,
    pub format: ImageFormat,
    pub fit: Fit,
}

impl ThumbnailOptions {
    /// Scrubber preview defaults: 160x90 jpeg at 0.8.
    pub fn preview() -> Self {
        Self {
            width: Some(160),
            height: Some(90),
            quality: 0.8,
            format: ImageFormat::Jpeg,
            fit: Fit::Stretch,
        }
    }

    /// Export defaults: 1920x1080 png at 0.9.
    pub fn export() -> Self {
        Self {
            width: Some(1920),
            height: Some(1080),
            quality: 0.9,
            format: ImageFormat::Png,
            fit: Fit::Stretch,
        }
    }

    pub fn with_size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_fit(mut self, fit: Fit) -> Self {
        self.fit = fit;
        self
    }

    /// Quality clamped into `[0, 1]`; NaN falls back to the preview default.
    pub fn normalized_quality(&self) -> f32 {
        if self.quality.is_nan() {
            0.8
        } else {
            self.quality.clamp(0.0, 1.0)
        }
    }

    /// Output box for a source of `source_width` x `source_height`.
    ///
    /// A single given side derives the other from the source aspect ratio,
    /// neither keeps the native size.
    pub fn resolve_size(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        let source_width = source_width.max(1);
        let source_height = source_height.max(1);
        let aspect = source_width as f64 / source_height as f64;

        match (self.width, self.height) {
            (Some(w), Some(h)) => (w.max(1), h.max(1)),
            (Some(w), None) => (w.max(1), ((w as f64 / aspect).round() as u32).max(1)),
            (None, Some(h)) => (((h as f64 * aspect).round() as u32).max(1), h.max(1)),
            (None, None) => (source_width, source_height),
        }
    }
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self::preview()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_presets() {
        let preview = ThumbnailOptions::default();
        assert_eq!((preview.width, preview.height), (Some(160), Some(90)));
        assert_eq!(preview.format, ImageFormat::Jpeg);
        assert_eq!(preview.quality, 0.8);

        let export = ThumbnailOptions::export();
        assert_eq!((export.width, export.height), (Some(1920), Some(1080)));
        assert_eq!(export.format, ImageFormat::Png);
        assert_eq!(export.quality, 0.9);
    }

    #[test]
    fn test_resolve_size() {
        let options = ThumbnailOptions::preview();
        assert_eq!(options.resolve_size(640, 480), (160, 90));

        let options = options.with_size(Some(320), None);
        assert_eq!(options.resolve_size(1280, 720), (320, 180));

        let options = options.with_size(None, Some(100));
        assert_eq!(options.resolve_size(400, 200), (200, 100));

        let options = options.with_size(None, None);
        assert_eq!(options.resolve_size(64, 48), (64, 48));

        let options = options.with_size(Some(1), None);
        assert_eq!(options.resolve_size(1000, 10), (1, 1));
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(ThumbnailOptions::preview().with_quality(1.7).normalized_quality(), 1.0);
        assert_eq!(ThumbnailOptions::preview().with_quality(-2.0).normalized_quality(), 0.0);
        assert_eq!(ThumbnailOptions::preview().with_quality(f32::NAN).normalized_quality(), 0.8);
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!(ImageFormat::from_str("PNG").unwrap(), ImageFormat::Png);
        assert_eq!(ImageFormat::Webp.to_string(), "webp");
        assert_eq!(Fit::from_str("cover").unwrap(), Fit::Cover);
        assert_eq!(TimePolicy::from_str("strict").unwrap(), TimePolicy::Strict);
        assert!(ImageFormat::from_str("gif").is_err());
    }
}
