//! Filesystem helpers shared by the known-depot cache and the payload dump.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{DumpError, DumpResult};

pub(crate) fn default_data_dir() -> DumpResult<PathBuf> {
    let base = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| DumpError::Config {
            message: "could not determine cache directory".to_string(),
        })?;

    Ok(base.join("tokendump"))
}

/// Write `content` to a sibling temp file, then rename it over `path`.
pub(crate) async fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content).await?;
    fs::rename(&temp_path, path).await
}
