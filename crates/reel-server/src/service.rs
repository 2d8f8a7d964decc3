//! Artifact lifecycle operations offered to the HTTP layer
//!
//! [`ArtifactService`] ties the store, the reaper and the renderer together.
//! Handlers never touch the store directly.

use crate::render::{RenderError, RenderParams, Renderer};
use reel_domain::{ArtifactId, ArtifactRecord, ArtifactStore};
use reel_janitor::{DisposalJob, JanitorError, Reaper};
use reel_store::{ChunkStream, MemoryStore, StoreError, StreamError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Name offered to clients for every rendered artifact
pub const DISPLAY_FILENAME: &str = "processed.mp4";

/// Errors surfaced to callers of [`ArtifactService`]
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Unknown, evicted, or vanished artifact
    #[error("Artifact not found: {0}")]
    NotFound(String),

    /// Malformed upload or parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Registry failure
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Sweep failure
    #[error("Janitor error: {0}")]
    Janitor(#[from] JanitorError),

    /// Transfer could not start
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Rendering failed
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Filesystem failure around uploads
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Read-only operational snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// Artifacts currently tracked
    pub active_artifacts: usize,
    /// Sum of tracked artifact sizes
    pub tracked_bytes: u64,
    /// File deletions queued but not finished
    pub deletions_pending: u64,
    /// File deletions that succeeded (or found nothing to delete)
    pub deletions_succeeded: u64,
    /// File deletions that gave up; these files may be orphaned on disk
    pub deletions_failed: u64,
    /// Sweeps performed since startup
    pub sweep_count: usize,
}

/// Artifact lifecycle facade
pub struct ArtifactService {
    store: Arc<MemoryStore>,
    reaper: Arc<Reaper>,
    renderer: Arc<dyn Renderer>,
    work_dir: PathBuf,
    chunk_size: usize,
    clean_residual_files: bool,
}

impl ArtifactService {
    /// Create a service over existing components
    pub fn new(
        store: Arc<MemoryStore>,
        reaper: Arc<Reaper>,
        renderer: Arc<dyn Renderer>,
        work_dir: impl Into<PathBuf>,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            reaper,
            renderer,
            work_dir: work_dir.into(),
            chunk_size,
            clean_residual_files: true,
        }
    }

    /// Toggle removal of untracked work-dir files on shutdown
    pub fn with_residual_cleanup(mut self, enabled: bool) -> Self {
        self.clean_residual_files = enabled;
        self
    }

    /// Shared store handle (for the background reaper worker)
    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }

    /// Shared reaper handle
    pub fn reaper(&self) -> Arc<Reaper> {
        Arc::clone(&self.reaper)
    }

    /// Directory holding uploads and outputs
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Parse a client-supplied id; malformed ids are simply unknown
    pub fn parse_id(raw: &str) -> Result<ArtifactId> {
        raw.parse()
            .map_err(|_| ServiceError::NotFound(raw.to_string()))
    }

    /// Track a rendered output file
    pub fn register_artifact(
        &self,
        path: PathBuf,
        display_filename: &str,
        original_filename: &str,
        size_bytes: u64,
    ) -> Result<ArtifactId> {
        let id = self.store.register(
            path,
            display_filename.to_string(),
            original_filename.to_string(),
            size_bytes,
        )?;
        tracing::info!(artifact_id = %id, size_bytes, "Artifact registered");
        Ok(id)
    }

    /// Look up a tracked artifact whose file still exists
    ///
    /// A record whose file vanished out of band is dropped from the store.
    /// Any other failure to check the file is returned as
    /// [`ServiceError::Io`] and the record is kept.
    pub async fn resolve_artifact(&self, id: ArtifactId) -> Result<ArtifactRecord> {
        let record = self
            .store
            .lookup(id)?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;

        match tokio::fs::try_exists(&record.path).await {
            Ok(true) => Ok(record),
            Ok(false) => {
                self.forget_stale(&record)?;
                Err(ServiceError::NotFound(id.to_string()))
            }
            Err(e) => {
                // Only a confirmed-missing file makes the entry stale
                tracing::warn!(
                    artifact_id = %id,
                    path = %record.path.display(),
                    error = %e,
                    "Could not check artifact file"
                );
                Err(ServiceError::Io(e))
            }
        }
    }

    /// Resolve an artifact and open a chunk stream over its file
    ///
    /// Callers advertise `record.size_bytes` as the content length.
    pub async fn open_artifact(&self, id: ArtifactId) -> Result<(ArtifactRecord, ChunkStream)> {
        let record = self.resolve_artifact(id).await?;

        match ChunkStream::open(&record.path, self.chunk_size).await {
            Ok(stream) => Ok((record, stream)),
            Err(e) if e.is_not_found() => {
                // Evicted between resolve and open
                self.forget_stale(&record)?;
                Err(ServiceError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stop tracking an artifact and dispose of its file
    ///
    /// Idempotent: unknown ids succeed without touching the filesystem.
    pub async fn delete_artifact(&self, id: ArtifactId) -> Result<()> {
        match self.store.remove(id)? {
            Some(record) => {
                tracing::info!(artifact_id = %id, "Artifact deleted");
                self.reaper
                    .disposer()
                    .dispose(DisposalJob::for_artifact(&record))
                    .await;
            }
            None => {
                tracing::debug!(artifact_id = %id, "Delete of unknown artifact ignored");
            }
        }
        Ok(())
    }

    /// Evict expired artifacts now
    pub async fn sweep_now(&self) -> Result<usize> {
        Ok(self.reaper.sweep_now(self.store.as_ref()).await?)
    }

    /// Best-effort cleanup before exit; never fails
    ///
    /// Evicts every tracked artifact, waits for queued deletions, then
    /// optionally deletes untracked files left in the work directory.
    pub async fn shutdown_cleanup(&self) {
        match self.reaper.evict_all(self.store.as_ref()).await {
            Ok(evicted) => tracing::info!(evicted, "Shutdown sweep complete"),
            Err(e) => tracing::error!(error = %e, "Shutdown sweep failed"),
        }

        // Closing the queue first makes residual deletions run inline
        self.reaper.disposer().drain().await;

        if self.clean_residual_files {
            if let Err(e) = self.remove_residual_files().await {
                tracing::warn!(
                    work_dir = %self.work_dir.display(),
                    error = %e,
                    "Could not scan work directory for residual files"
                );
            }
        }

        let stats = self.reaper.disposer().stats();
        if stats.failed > 0 {
            tracing::warn!(failed = stats.failed, "Some artifact files could not be deleted");
        }
    }

    /// Read-only snapshot
    pub fn status(&self) -> Result<ServiceStatus> {
        let disposal = self.reaper.disposer().stats();
        Ok(ServiceStatus {
            active_artifacts: self.store.count()?,
            tracked_bytes: self.store.tracked_bytes()?,
            deletions_pending: disposal.pending,
            deletions_succeeded: disposal.succeeded,
            deletions_failed: disposal.failed,
            sweep_count: self.reaper.metrics().sweep_count,
        })
    }

    /// Where an upload named `original_filename` should be written
    pub fn upload_path(&self, original_filename: &str) -> PathBuf {
        self.work_dir.join(format!(
            "{}_{}",
            uuid::Uuid::new_v4(),
            sanitize_filename(original_filename)
        ))
    }

    /// Render an uploaded file and track the result
    ///
    /// Sweeps first so that expired artifacts free disk space before new
    /// work lands. The input is removed whether or not rendering succeeds.
    pub async fn process_upload(
        &self,
        input: PathBuf,
        original_filename: &str,
        params: RenderParams,
    ) -> Result<ArtifactRecord> {
        if let Err(e) = self.sweep_now().await {
            tracing::warn!(error = %e, "Pre-upload sweep failed");
        }

        if let Err(e) = params.validate() {
            self.discard(&input).await;
            return Err(ServiceError::InvalidRequest(e.to_string()));
        }

        let output = output_path_for(&input);
        let renderer = Arc::clone(&self.renderer);
        let (render_in, render_out) = (input.clone(), output.clone());
        let outcome = tokio::task::spawn_blocking(move || {
            renderer.render(&render_in, &render_out, &params)
        })
        .await
        .map_err(|e| RenderError::Aborted(e.to_string()));

        self.discard(&input).await;

        if let Err(e) = outcome.and_then(|r| r) {
            self.discard(&output).await;
            tracing::error!(input = %input.display(), error = %e, "Render failed");
            return Err(e.into());
        }

        let size_bytes = tokio::fs::metadata(&output).await?.len();
        let id = self.register_artifact(output, DISPLAY_FILENAME, original_filename, size_bytes)?;

        self.store
            .lookup(id)?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    fn forget_stale(&self, record: &ArtifactRecord) -> Result<()> {
        if self.store.remove(record.id)?.is_some() {
            tracing::warn!(
                artifact_id = %record.id,
                path = %record.path.display(),
                "Artifact file vanished; dropped stale entry"
            );
        }
        Ok(())
    }

    async fn discard(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
            }
        }
    }

    async fn remove_residual_files(&self) -> std::io::Result<()> {
        let tracked: Vec<PathBuf> = match self.store.list() {
            Ok(records) => records.into_iter().map(|r| r.path).collect(),
            Err(_) => Vec::new(),
        };

        let mut entries = tokio::fs::read_dir(&self.work_dir).await?;
        let mut residual = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if tracked.contains(&path) {
                continue;
            }
            self.reaper
                .disposer()
                .dispose(DisposalJob::residual(path))
                .await;
            residual += 1;
        }

        if residual > 0 {
            tracing::info!(residual, "Removed residual work files");
        }
        Ok(())
    }
}

impl std::fmt::Debug for ArtifactService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactService")
            .field("work_dir", &self.work_dir)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

/// Keep only the final path component, restricted to a safe alphabet
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload.mp4".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `<dir>/<stem>_out.mp4` next to the input
pub fn output_path_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    input.with_file_name(format!("{stem}_out.mp4"))
}
