//! Repository sweep: mirror every file of a Hub repository into the bucket.
//!
//! The sweep runs in two phases:
//!   - List: pull the whole recursive listing from a [`RepoLister`], keep files only. A listing
//!     failure ends the sweep before anything is transferred.
//!   - Transfer: hand every file to a [`Submitter`] exactly once, in discovery order, and record
//!     one [`BulkResult`] per file. A failed file never stops the sweep and is never retried here.
//!
//! Which submitter is used decides what "success" means: a finished object for the direct path,
//! an admitted job for the queued paths.
//!
//! # Navigation
//! - Main entrypoint: [`Synchroniser::sync_repository`]
//! - Destination layout: [`destination_path`]

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, error, info};

use crate::config::{HubConfig, SyncConfig};
use crate::contract::{EntryKind, HubError, RepoLister, Submitter};
use crate::job::{BulkResult, RepoRef, RepoType, SyncSummary};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to list {repo_type} {repo_id}: {source}")]
    Listing {
        repo_id: String,
        repo_type: RepoType,
        #[source]
        source: HubError,
    },
}

pub struct Synchroniser<L, S> {
    lister: L,
    submitter: S,
    hub: HubConfig,
    sync: SyncConfig,
}

impl<L: RepoLister, S: Submitter> Synchroniser<L, S> {
    pub fn new(lister: L, submitter: S, hub: HubConfig, sync: SyncConfig) -> Self {
        Self {
            lister,
            submitter,
            hub,
            sync,
        }
    }

    /// Mirror one repository. `destination_prefix` defaults to `datasets` or `models`.
    ///
    /// Results come back in discovery order regardless of the configured concurrency.
    pub async fn sync_repository(
        &self,
        repo_id: &str,
        repo_type: RepoType,
        destination_prefix: Option<&str>,
    ) -> Result<Vec<BulkResult>, SyncError> {
        let repo = RepoRef::new(repo_id, repo_type);
        let prefix = effective_prefix(destination_prefix, repo_type);
        info!(repo_id, repo_type = %repo_type, prefix = %prefix, "[SYNC] Starting repository sync");

        let files = self.list_files(&repo).await?;
        info!(repo_id, files = files.len(), "[SYNC] Found files");

        let concurrency = self.sync.concurrency.max(1);
        let results: Vec<BulkResult> = stream::iter(files)
            .map(|path| self.sync_file(&repo, &prefix, path))
            .buffered(concurrency)
            .collect()
            .await;

        let summary = SyncSummary::from_results(repo, &results);
        info!(
            repo_id,
            succeeded = summary.succeeded,
            total = summary.total,
            "[SYNC] Repository sync finished"
        );
        Ok(results)
    }

    async fn list_files(&self, repo: &RepoRef) -> Result<Vec<String>, SyncError> {
        let entries: Vec<_> = self
            .lister
            .list_files(repo)
            .try_collect()
            .await
            .map_err(|source| {
                error!(repo_id = %repo.repo_id, error = %source, "[SYNC][ERROR] Listing failed");
                SyncError::Listing {
                    repo_id: repo.repo_id.clone(),
                    repo_type: repo.repo_type,
                    source,
                }
            })?;

        Ok(entries
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::File)
            .map(|entry| entry.path)
            .collect())
    }

    async fn sync_file(&self, repo: &RepoRef, prefix: &str, path: String) -> BulkResult {
        let source_url = self.hub.file_url(repo, &path);
        let destination = destination_path(prefix, &repo.repo_id, &path);
        debug!(file = %path, source_url = %source_url, destination = %destination, "[SYNC] Submitting file");

        let result = self.submitter.submit(&source_url, &destination).await;
        if result.is_success() {
            info!(file = %path, "[SYNC] ✓ {}", path);
        } else {
            error!(file = %path, outcome = ?result, "[SYNC] ✗ {}", path);
        }
        BulkResult { file: path, result }
    }
}

/// Explicit prefix with surrounding slashes removed, else the repository type's default.
/// A prefix that is empty once trimmed counts as absent.
pub fn effective_prefix(explicit: Option<&str>, repo_type: RepoType) -> String {
    match explicit.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => prefix.to_string(),
        None => repo_type.default_prefix().to_string(),
    }
}

/// Bucket key of a repository file: `{prefix}/{repo_id}/{path}`.
pub fn destination_path(prefix: &str, repo_id: &str, path: &str) -> String {
    if prefix.is_empty() {
        format!("{repo_id}/{path}")
    } else {
        format!("{prefix}/{repo_id}/{path}")
    }
}
