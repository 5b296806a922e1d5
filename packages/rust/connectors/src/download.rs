//! PDF download with validate-then-commit semantics.
//!
//! Bytes are written to a `.part` sibling and renamed onto the destination
//! only after status, content type and write all succeeded. On any failure
//! the destination is left untouched and the temp file is removed.

use std::path::{Path, PathBuf};

use leizilla_shared::{LawRecord, LeizillaError, Result};
use tracing::{info, warn};

use crate::fetcher::PageFetcher;

/// Download the PDF referenced by `law` into `destination`.
///
/// Returns `false` without any network I/O when the record has no PDF URL.
pub async fn download_pdf(fetcher: &dyn PageFetcher, law: &LawRecord, destination: &Path) -> bool {
    let Some(url) = law.pdf_url.as_deref().filter(|u| !u.trim().is_empty()) else {
        warn!(id = %law.id, "no PDF URL, skipping download");
        return false;
    };

    match fetch_and_commit(fetcher, url, destination).await {
        Ok(size) => {
            info!(id = %law.id, size, path = %destination.display(), "PDF downloaded");
            true
        }
        Err(e) => {
            warn!(id = %law.id, url, error = %e, "PDF download failed");
            false
        }
    }
}

async fn fetch_and_commit(fetcher: &dyn PageFetcher, url: &str, destination: &Path) -> Result<usize> {
    let body = fetcher.fetch_binary(url).await?;

    if !body.is_success() {
        return Err(LeizillaError::Network(format!("{url}: HTTP {}", body.status)));
    }
    if !body.is_pdf() {
        return Err(LeizillaError::validation(format!(
            "{url}: unexpected content type {:?}",
            body.content_type
        )));
    }
    if body.bytes.is_empty() {
        return Err(LeizillaError::validation(format!("{url}: empty body")));
    }

    write_atomic(destination, &body.bytes).await?;
    Ok(body.bytes.len())
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Write `bytes` to `destination` through a temp file and rename.
pub async fn write_atomic(destination: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LeizillaError::io(parent, e))?;
    }

    let tmp = part_path(destination);
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(LeizillaError::io(&tmp, e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, destination).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(LeizillaError::io(destination, e));
    }
    Ok(())
}
