// src/manager/runtime.rs — Managed runtime process lifecycle and bootstrap
//
// The runtime lives in a sandboxed directory under the data root. It is
// spawned at daemon boot when present and reaped at shutdown.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::PathBuf;

use super::{JobStatus, ModelManager};
use crate::infra::errors::SkiffError;

#[cfg(target_os = "windows")]
const RUNTIME_BIN: &str = "runtime.exe";
#[cfg(not(target_os = "windows"))]
const RUNTIME_BIN: &str = "runtime";

/// Binaries a user may have installed themselves; a copy on PATH can
/// shadow the sandboxed runtime's port.
const CONFLICTING_BINS: &[&str] = &["ollama"];

fn runtime_bin(manager: &ModelManager) -> PathBuf {
    manager.runtime_dir().join("bin").join(RUNTIME_BIN)
}

/// Spawn the sandboxed runtime. Returns false (without error) when the
/// runtime isn't installed yet.
pub fn start(manager: &ModelManager) -> Result<bool, SkiffError> {
    let bin = runtime_bin(manager);
    if !bin.exists() {
        tracing::debug!("runtime binary not present at {}", bin.display());
        return Ok(false);
    }

    for candidate in CONFLICTING_BINS {
        if let Ok(path) = which::which(candidate) {
            // Surfaced through the host dialog collaborator by the shell;
            // the daemon proceeds with the sandboxed copy.
            tracing::warn!(
                "user-installed runtime detected at {}; the managed runtime may conflict",
                path.display()
            );
        }
    }

    let mut slot = manager
        .runtime_slot()
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    if slot.is_some() {
        return Ok(true);
    }

    let host = manager
        .runtime_url()
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .to_string();
    let child = tokio::process::Command::new(&bin)
        .arg("serve")
        .env("RUNTIME_HOST", host)
        .current_dir(manager.runtime_dir())
        .kill_on_drop(true)
        .spawn()?;
    tracing::info!("runtime started (pid {:?})", child.id());
    *slot = Some(child);
    Ok(true)
}

pub async fn shutdown(manager: &ModelManager) {
    let child = manager
        .runtime_slot()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();
    if let Some(mut child) = child {
        if let Err(e) = child.start_kill() {
            tracing::warn!("runtime kill failed: {}", e);
            return;
        }
        let _ = child.wait().await;
        tracing::info!("runtime stopped");
    }
}

/// Download the runtime archive from the current mirror, verify its
/// digest against the optional sidecar checksum, and unpack it into the
/// sandbox directory.
pub async fn download_and_unpack(manager: &ModelManager, name: &str) -> Result<(), SkiffError> {
    let mirror = manager.current_mirror();
    if mirror.is_empty() {
        return Err(SkiffError::InvalidRequest("no download mirrors configured".into()));
    }
    let url = format!("{mirror}/{name}.tar.gz");
    tracing::info!("downloading runtime from {}", url);

    let response = manager
        .http()
        .get(&url)
        .send()
        .await
        .map_err(|e| SkiffError::upstream("mirror", e.to_string()))?;
    if !response.status().is_success() {
        return Err(SkiffError::upstream(
            "mirror",
            format!("{} for {url}", response.status()),
        ));
    }

    let total = response.content_length().unwrap_or(0);
    let downloads = manager.runtime_dir().join("downloads");
    std::fs::create_dir_all(&downloads)?;
    let archive_path = downloads.join(format!("{name}.tar.gz"));

    let mut file = std::fs::File::create(&archive_path)?;
    let mut hasher = Sha256::new();
    let mut received: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|e| SkiffError::upstream("mirror", e.to_string()))?;
        file.write_all(&bytes)?;
        hasher.update(&bytes);
        received += bytes.len() as u64;
        let fraction = if total > 0 {
            received as f32 / total as f32
        } else {
            0.0
        };
        manager.update_manager_progress(
            JobStatus::Downloading,
            fraction,
            &format!("{received}/{total} bytes"),
        );
    }
    file.sync_all()?;
    drop(file);

    let digest = hex::encode(hasher.finalize());
    if let Some(expected) = fetch_checksum(manager, &mirror, name).await {
        if !expected.eq_ignore_ascii_case(&digest) {
            return Err(SkiffError::upstream(
                "mirror",
                format!("checksum mismatch: expected {expected}, got {digest}"),
            ));
        }
    } else {
        tracing::debug!("no checksum published for {name}; sha256 {digest}");
    }

    manager.update_manager_progress(JobStatus::Installing, 0.95, "unpacking");
    let archive = std::fs::File::open(&archive_path)?;
    let decoder = flate2::read::GzDecoder::new(archive);
    let mut tar = tar::Archive::new(decoder);
    tar.unpack(manager.runtime_dir())
        .map_err(|e| SkiffError::Internal(anyhow::anyhow!("unpack runtime archive: {e}")))?;

    let _ = std::fs::remove_file(&archive_path);
    Ok(())
}

/// Sidecar checksum file next to the archive, when the mirror publishes
/// one.
async fn fetch_checksum(manager: &ModelManager, mirror: &str, name: &str) -> Option<String> {
    let url = format!("{mirror}/{name}.tar.gz.sha256");
    let resp = manager.http().get(&url).send().await.ok()?;
    if !resp.status().is_success() {
        return None;
    }
    let text = resp.text().await.ok()?;
    text.split_whitespace().next().map(|s| s.to_string())
}
