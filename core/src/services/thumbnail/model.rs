use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Deserializer, Serialize};

use super::{
    error::{Result, ThumbnailError},
    options::ImageFormat,
};

/// Locator of a video: a local path or an http(s) URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaSource(String);

impl MediaSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_remote(&self) -> bool {
        let lower = self.0.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaSource {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MediaSource {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&Path> for MediaSource {
    fn from(value: &Path) -> Self {
        Self(value.to_string_lossy().into_owned())
    }
}

impl From<&PathBuf> for MediaSource {
    fn from(value: &PathBuf) -> Self {
        Self::from(value.as_path())
    }
}

/// One encoded frame together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub source_time: f64,
    pub format: ImageFormat,
}

impl Thumbnail {
    /// Wraps already encoded image bytes.
    pub fn from_encoded(
        bytes: &[u8],
        width: u32,
        height: u32,
        source_time: f64,
        format: ImageFormat,
    ) -> Self {
        let data_url = format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(bytes));

        Self {
            data_url,
            width,
            height,
            source_time,
            format,
        }
    }

    /// Decoded image payload of the data URL.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        let (_, payload) = self
            .data_url
            .split_once(";base64,")
            .ok_or_else(|| ThumbnailError::EncodeFailure("malformed data url".into()))?;

        STANDARD
            .decode(payload)
            .map_err(|err| ThumbnailError::EncodeFailure(err.to_string()))
    }

    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }

    /// `thumbnail-<whole seconds>s.<ext>`
    pub fn file_name(&self) -> String {
        format!(
            "thumbnail-{}s.{}",
            self.source_time.max(0.0).floor() as u64,
            self.extension()
        )
    }

    /// Writes the image into `dir` under [`Thumbnail::file_name`].
    pub async fn save_to_dir<P>(&self, dir: P) -> Result<PathBuf>
    where P: AsRef<Path>,
    {
        let path = dir.as_ref().join(self.file_name());
        self.save_as(&path).await?;

        Ok(path)
    }

    pub async fn save_as<P>(&self, path: P) -> Result<()>
    where P: AsRef<Path>,
    {
        tokio::fs::write(path, self.bytes()?).await?;
        Ok(())
    }
}

/// Thumbnails keyed by event id.
pub type ThumbnailMap = HashMap<String, Thumbnail>;

/// A named point of interest in a video.
///
/// Accepts both `{ id, timestamp }` records and `{ id, start, end }` records.
/// A span is captured at its midpoint, or at `start` when `end` is missing or
/// does not lie after `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MomentRecord")]
pub struct KeyMoment {
    pub id: String,
    pub timestamp: f64,
    pub label: Option<String>,
}

impl KeyMoment {
    pub fn new(id: impl Into<String>, timestamp: f64) -> Self {
        Self {
            id: id.into(),
            timestamp,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Parses a JSON array of moment records.
    pub fn parse_list(json: &str) -> serde_json::Result<Vec<Self>> {
        serde_json::from_str(json)
    }
}

#[derive(Deserialize)]
struct MomentRecord {
    #[serde(deserialize_with = "id_as_string")]
    id: String,
    timestamp: Option<f64>,
    start: Option<f64>,
    end: Option<f64>,
    #[serde(alias = "title")]
    label: Option<String>,
}

impl TryFrom<MomentRecord> for KeyMoment {
    type Error = String;

    fn try_from(record: MomentRecord) -> Result<Self, Self::Error> {
        let timestamp = match (record.timestamp, record.start, record.end) {
            (Some(timestamp), _, _) => timestamp,
            (None, Some(start), Some(end)) if end > start => (start + end) / 2.0,
            (None, Some(start), _) => start,
            (None, None, _) => return Err(format!("moment {} has neither timestamp nor start", record.id)),
        };

        Ok(Self {
            id: record.id,
            timestamp,
            label: record.label.filter(|label| !label.trim().is_empty()),
        })
    }
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Int(n) => n.to_string(),
        RawId::Float(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_source() {
        assert!(MediaSource::from("https://cdn.example.com/talk.mp4").is_remote());
        assert!(MediaSource::from("HTTP://host/a.webm").is_remote());
        assert!(!MediaSource::from("/videos/talk.mp4").is_remote());
        assert_eq!(MediaSource::from(Path::new("a/b.mp4")).as_str(), "a/b.mp4");
    }

    #[test]
    fn test_thumbnail_bytes_and_name() {
        let thumb = Thumbnail::from_encoded(b"\x89PNG", 2, 2, 12.9, ImageFormat::Png);
        assert!(thumb.data_url.starts_with("data:image/png;base64,"));
        assert_eq!(thumb.bytes().unwrap(), b"\x89PNG");
        assert_eq!(thumb.file_name(), "thumbnail-12s.png");

        let bad = Thumbnail {
            data_url: "nonsense".into(),
            ..thumb
        };
        assert!(matches!(bad.bytes(), Err(ThumbnailError::EncodeFailure(_))));
    }

    #[test]
    fn test_parse_moment_records() {
        let json = r#"[
            { "id": "a", "timestamp": 5.5, "title": "Crossed arms" },
            { "id": 7, "start": 12.0, "end": 14.0 },
            { "id": "c", "timestamp": 3, "label": "  " }
        ]"#;
        let moments = KeyMoment::parse_list(json).unwrap();

        assert_eq!(moments.len(), 3);
        assert_eq!(moments[0], KeyMoment::new("a", 5.5).with_label("Crossed arms"));
        assert_eq!(moments[1], KeyMoment::new("7", 13.0));
        assert_eq!(moments[2].label, None);
    }

    #[test]
    fn test_span_moments() {
        let json = r#"[
            { "id": "open", "start": 40 },
            { "id": "zero-end", "start": 8, "end": 0 },
            { "id": "both", "timestamp": 2, "start": 10, "end": 20 },
            { "id": "span", "start": 12, "end": 14 }
        ]"#;
        let stamps: Vec<f64> = KeyMoment::parse_list(json)
            .unwrap()
            .into_iter()
            .map(|moment| moment.timestamp)
            .collect();

        assert_eq!(stamps, [40.0, 8.0, 2.0, 13.0]);
    }

    #[test]
    fn test_parse_moment_without_time() {
        let err = KeyMoment::parse_list(r#"[{ "id": "x" }]"#).unwrap_err();
        assert!(err.to_string().contains("neither timestamp nor start"));
    }

    #[tokio::test]
    async fn test_save_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let thumb = Thumbnail::from_encoded(b"jpegdata", 4, 3, 3.2, ImageFormat::Jpeg);

        let path = thumb.save_to_dir(dir.path()).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "thumbnail-3s.jpg");
        assert_eq!(std::fs::read(path).unwrap(), b"jpegdata");
    }
}
