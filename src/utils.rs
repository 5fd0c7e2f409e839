use fs_err::File;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::error::Result;

/// Creates a progress bar for monitoring function progress.
pub fn progress_bar_for_count(count: usize) -> ProgressBar {
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {human_pos}/{human_len} \
         ({per_sec}, {eta}) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(count as u64).with_style(style)
}

/// Creates `path` and any missing parents.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        info!("Creating {}", path.display());
        fs_err::create_dir_all(path)?;
    }
    Ok(())
}

pub fn write_json_file<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    info!("Writing to {}", path.display());
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, data)?;
    writer.flush()?;
    Ok(())
}
