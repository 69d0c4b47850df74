pub(crate) mod archive;

pub use archive::{
    entry_name, export_key_moments, write_archive, ArchiveEntry, EntryNames, ExportReport, DEFAULT_ARCHIVE_NAME,
};
