//! Proof file naming and safe writes

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

pub const PROOF_EXTENSION: &str = "ots";
const BACKUP_SUFFIX: &str = ".bak";

/// `FILE` -> `FILE.ots`
#[must_use]
pub fn proof_path_for(target: &Path) -> PathBuf {
    append_suffix(target, &format!(".{PROOF_EXTENSION}"))
}

/// `FILE.ots` -> `FILE`; `None` if the name lacks the extension
#[must_use]
pub fn target_path_for(proof: &Path) -> Option<PathBuf> {
    if proof.extension()? != PROOF_EXTENSION {
        return None;
    }
    let stem = proof.file_stem()?;
    Some(proof.with_file_name(stem))
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Write `bytes` to a file that must not exist yet
pub async fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}

/// Keep the current contents as `PATH.bak`, then replace `PATH`
///
/// Refuses to run if a backup already exists. Returns the backup path.
pub async fn backup_and_replace(path: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
    let backup = append_suffix(path, BACKUP_SUFFIX);
    let old = tokio::fs::read(path).await?;
    write_new(&backup, &old).await?;

    let tmp = append_suffix(path, ".tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;

    Ok(backup)
}
