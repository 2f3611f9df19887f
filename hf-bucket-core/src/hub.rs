//! Recursive repository listing against the Hub tree API.
//!
//! `GET {endpoint}/api/{datasets|models}/{repo}/tree/{revision}?recursive=true` returns one page
//! of entries; further pages are announced with a `Link: <…>; rel="next"` header. Pages are only
//! fetched as the stream is pulled.

use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::LINK;
use serde::Deserialize;
use std::collections::VecDeque;
use tracing::{debug, error, info};

use crate::config::HubConfig;
use crate::contract::{EntryKind, HubError, RepoEntry, RepoLister};
use crate::job::RepoRef;

#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    #[serde(default)]
    size: Option<u64>,
}

impl From<TreeEntry> for RepoEntry {
    fn from(entry: TreeEntry) -> Self {
        let kind = if entry.kind == "file" {
            EntryKind::File
        } else {
            EntryKind::Directory
        };
        RepoEntry {
            path: entry.path,
            kind,
            size: entry.size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HubClient {
    http: reqwest::Client,
    config: HubConfig,
}

impl HubClient {
    pub fn new(config: &HubConfig) -> Result<Self, HubError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("hf-bucket/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// First page of the recursive tree listing.
    pub fn tree_url(&self, repo: &RepoRef) -> String {
        format!(
            "{}/api/{}/{}/tree/{}?recursive=true",
            self.config.endpoint.trim_end_matches('/'),
            repo.repo_type.api_segment(),
            repo.repo_id,
            self.config.revision
        )
    }
}

struct Pager {
    http: reqwest::Client,
    next: Option<String>,
    buffer: VecDeque<RepoEntry>,
}

impl RepoLister for HubClient {
    fn list_files(&self, repo: &RepoRef) -> BoxStream<'static, Result<RepoEntry, HubError>> {
        let first = self.tree_url(repo);
        info!(url = %first, repo_id = %repo.repo_id, "[HUB] Listing repository");
        let pager = Pager {
            http: self.http.clone(),
            next: Some(first),
            buffer: VecDeque::new(),
        };

        stream::unfold(pager, |mut pager| async move {
            loop {
                if let Some(entry) = pager.buffer.pop_front() {
                    return Some((Ok(entry), pager));
                }
                let url = pager.next.take()?;
                match fetch_page(&pager.http, &url).await {
                    Ok((entries, next)) => {
                        debug!(url = %url, entries = entries.len(), "[HUB] Fetched listing page");
                        pager.buffer.extend(entries);
                        pager.next = next;
                    }
                    // `next` is already taken, so the stream ends after the error.
                    Err(e) => return Some((Err(e), pager)),
                }
            }
        })
        .boxed()
    }
}

async fn fetch_page(
    http: &reqwest::Client,
    url: &str,
) -> Result<(Vec<RepoEntry>, Option<String>), HubError> {
    let resp = http.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        error!(status = %status, url = %url, "[HUB] Listing API returned error");
        return Err(HubError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    let next = resp
        .headers()
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .and_then(next_link);
    let entries: Vec<TreeEntry> = resp
        .json()
        .await
        .map_err(|e| HubError::Payload(e.to_string()))?;
    Ok((entries.into_iter().map(RepoEntry::from).collect(), next))
}

/// Target of the `rel="next"` member of an RFC 8288 `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if is_next {
            target
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .map(str::to_string)
        } else {
            None
        }
    })
}
