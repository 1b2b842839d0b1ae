use crate::cue::ExportFormat;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Writes `content` to `<dir>/<stem>.<ext>`, replacing any existing file.
pub async fn write_export(
    dir: &Path,
    stem: &str,
    format: ExportFormat,
    content: &str,
) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create output directory '{}'", dir.display()))?;
    let path = dir.join(format!("{stem}.{}", format.extension()));
    log::debug!("writing {} ({})", path.display(), format.mime_type());
    let mut outfile = tokio::fs::File::create(&path)
        .await
        .with_context(|| format!("create {}", path.display()))?;
    outfile
        .write_all(content.as_bytes())
        .await
        .context("write out export")?;
    outfile.flush().await.context("flush export")?;
    Ok(path)
}
