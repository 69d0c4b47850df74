mod summary;

pub use summary::{ExportSummary, ProbeSummary, ThumbnailSummary};
