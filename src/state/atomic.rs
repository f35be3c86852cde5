//! Write-temp-then-rename document replacement

use std::future::Future;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Retry schedule for a rename blocked by an open reader
#[derive(Debug, Clone, Copy)]
pub struct RenamePolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RenamePolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_backoff: Duration::from_millis(50),
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        "{name}.tmp.{}.{}",
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ))
}

/// Replace `path` with `bytes` so readers see the old or the new document
pub async fn write_atomic(path: &Path, bytes: &[u8], policy: RenamePolicy) -> io::Result<()> {
    replace_with(path, bytes, policy, fs::rename).await
}

pub(crate) async fn replace_with<R, F>(
    path: &Path,
    bytes: &[u8],
    policy: RenamePolicy,
    mut rename: R,
) -> io::Result<()>
where
    R: FnMut(PathBuf, PathBuf) -> F,
    F: Future<Output = io::Result<()>>,
{
    let tmp = temp_path(path);

    if let Err(e) = write_synced(&tmp, bytes).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }

    let mut delay = policy.initial_backoff;
    for attempt in 1..=policy.attempts {
        match rename(tmp.clone(), path.to_path_buf()).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    path = ?path,
                    "Rename blocked, backing off"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                return Err(e);
            }
        }
    }

    tracing::warn!(
        path = ?path,
        attempts = policy.attempts,
        "Rename kept failing, overwriting in place"
    );
    let result = fs::write(path, bytes).await;
    let _ = fs::remove_file(&tmp).await;
    result
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}
