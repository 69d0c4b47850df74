use std::{
    collections::HashSet,
    io::Write,
    path::{Path, PathBuf},
};

use tracing::{info, warn};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::services::thumbnail::{
    KeyMoment, MediaSource, Result, ThumbnailGenerator, ThumbnailOptions,
};

pub const DEFAULT_ARCHIVE_NAME: &str = "key-moments-thumbnails.zip";
const FALLBACK_LABEL: &str = "moment";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// Outcome of a key-moment export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub archive: PathBuf,
    pub entries: Vec<String>,
    /// Ids of the moments that produced no thumbnail.
    pub skipped: Vec<String>,
}

/// Captures every moment and packs the captured images into a zip archive at
/// `destination`.
///
/// Moments whose capture fails are listed in [`ExportReport::skipped`] and the
/// archive is written with the rest. Only an unreachable source or a disposed
/// generator fails the export.
pub async fn export_key_moments<P>(
    generator: &ThumbnailGenerator,
    source: &MediaSource,
    moments: &[KeyMoment],
    options: &ThumbnailOptions,
    destination: P,
) -> Result<ExportReport>
where P: AsRef<Path>,
{
    let thumbnails = generator.generate_event_thumbnails(source, moments, options).await?;

    let mut names = EntryNames::new();
    let mut entries = Vec::with_capacity(thumbnails.len());
    let mut skipped = vec![];

    for moment in moments {
        let Some(thumbnail) = thumbnails.get(&moment.id) else {
            skipped.push(moment.id.clone());
            continue;
        };

        let data = match thumbnail.bytes() {
            Ok(data) => data,
            Err(err) => {
                warn!(id = %moment.id, error = %err, "unreadable thumbnail, skipping");
                skipped.push(moment.id.clone());
                continue;
            }
        };

        let name = names.assign(moment.label.as_deref(), moment.timestamp, thumbnail.extension());
        entries.push(ArchiveEntry { name, data });
    }

    let names = entries.iter().map(|entry| entry.name.clone()).collect();
    let archive = write_archive(entries, destination).await?;

    info!(
        archive = %archive.display(),
        written = moments.len() - skipped.len(),
        skipped = skipped.len(),
        "key moments exported"
    );

    Ok(ExportReport {
        archive,
        entries: names,
        skipped,
    })
}

/// `<label>-<whole seconds>s.<ext>`, with the label made safe for an archive path.
pub fn entry_name(label: Option<&str>, timestamp: f64, extension: &str) -> String {
    let label: String = label
        .unwrap_or_default()
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let label = label.trim_matches('.');
    let label = if label.is_empty() { FALLBACK_LABEL } else { label };

    let seconds = if timestamp.is_finite() {
        timestamp.max(0.0).floor() as u64
    } else {
        0
    };

    format!("{label}-{seconds}s.{extension}")
}

/// Names for one set of captures: [`entry_name`] with `-2`, `-3`, ... appended
/// to names already handed out.
#[derive(Debug, Default)]
pub struct EntryNames {
    used: HashSet<String>,
}

impl EntryNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, label: Option<&str>, timestamp: f64, extension: &str) -> String {
        let name = entry_name(label, timestamp, extension);
        if self.used.insert(name.clone()) {
            return name;
        }

        let (stem, extension) = match name.rsplit_once('.') {
            Some((stem, extension)) => (stem.to_owned(), format!(".{extension}")),
            None => (name.clone(), String::new()),
        };

        (2..)
            .map(|n| format!("{stem}-{n}{extension}"))
            .find(|candidate| self.used.insert(candidate.clone()))
            .unwrap_or(name)
    }
}

/// Writes `entries` into a zip archive at `destination`.
///
/// The archive is assembled in a temporary file beside `destination` and moved
/// into place once complete; on failure the temporary file is deleted. The
/// whole archive is built in one blocking task, which bounds how large an
/// export stays responsive.
pub async fn write_archive<P>(entries: Vec<ArchiveEntry>, destination: P) -> Result<PathBuf>
where P: AsRef<Path>,
{
    let destination = destination.as_ref().to_owned();

    tokio::task::spawn_blocking(move || {
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_owned(),
            _ => PathBuf::from("."),
        };

        let mut temp = tempfile::Builder::new()
            .prefix(".seekshot-")
            .suffix(".zip.part")
            .tempfile_in(&dir)?;

        {
            // images are already compressed
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            let mut zip = ZipWriter::new(temp.as_file_mut());

            for entry in &entries {
                zip.start_file(entry.name.as_str(), options)?;
                zip.write_all(&entry.data)?;
            }
            zip.finish()?;
        }

        temp.persist(&destination).map_err(|err| err.error)?;

        Ok(destination)
    })
    .await?
}
