use std::{path::Path, str::FromStr};

use super::settings::{self, Settings};
use anyhow::{Context, Result};

pub fn init(config_path: &Path, verbose: bool) -> Result<Settings> {
    let settings = settings::load(config_path)?;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::from_str(&settings.log_level)
            .with_context(|| format!("invalid log_level {:?}", settings.log_level))?
    };

    // Enable logging
    tracing_subscriber::fmt()
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::FULL)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    Ok(settings)
}
