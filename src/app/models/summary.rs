use std::path::Path;

use core_seekshot::{
    export::ExportReport,
    thumbnail::{SourceInfo, Thumbnail},
};
use serde::Serialize;

/// One written thumbnail, as printed on stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThumbnailSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub path: String,
    pub source_time: f64,
    pub width: u32,
    pub height: u32,
}

impl ThumbnailSummary {
    pub fn new(id: Option<&str>, path: &Path, thumbnail: &Thumbnail) -> Self {
        Self {
            id: id.map(str::to_owned),
            path: path.display().to_string(),
            source_time: (thumbnail.source_time * 1000.0).round() / 1000.0,
            width: thumbnail.width,
            height: thumbnail.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeSummary {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

impl From<SourceInfo> for ProbeSummary {
    fn from(info: SourceInfo) -> Self {
        Self {
            duration: info.duration,
            width: info.width,
            height: info.height,
            frame_rate: if info.frame_duration > 0.0 {
                (1.0 / info.frame_duration * 100.0).round() / 100.0
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub archive: String,
    pub entries: Vec<String>,
    pub skipped: Vec<String>,
}

impl From<ExportReport> for ExportSummary {
    fn from(report: ExportReport) -> Self {
        Self {
            archive: report.archive.display().to_string(),
            entries: report.entries,
            skipped: report.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_seekshot::thumbnail::ImageFormat;

    #[test]
    fn test_thumbnail_summary_json() {
        let thumbnail = Thumbnail {
            data_url: "data:image/png;base64,".into(),
            width: 160,
            height: 90,
            source_time: 17.777_777,
            format: ImageFormat::Png,
        };

        let summary = ThumbnailSummary::new(None, Path::new("out/thumbnail-17s.png"), &thumbnail);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "path": "out/thumbnail-17s.png",
                "source_time": 17.778,
                "width": 160,
                "height": 90
            })
        );
    }

    #[test]
    fn test_probe_summary() {
        let info = SourceInfo {
            duration: 160.0,
            width: 1280,
            height: 720,
            frame_duration: 1.0 / 29.97,
        };
        let summary = ProbeSummary::from(info);
        assert_eq!(summary.frame_rate, 29.97);
    }
}
