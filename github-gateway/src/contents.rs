//! Repository contents: default-branch tree walk plus raw file reads.
//!
//!   * GET /repos/{owner}/{repo}
//!   * GET /repos/{owner}/{repo}/git/trees/{branch}?recursive=1
//!   * GET /repos/{owner}/{repo}/contents/{path}?ref={branch}   (`v3.raw`)

use futures::{StreamExt, TryStreamExt, stream};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::client::{ACCEPT_JSON, GitHubClient, encode_file_path};
use crate::errors::{GitHubError, GitHubProviderError, GitHubResult};
use crate::types::RepositoryFile;

const ACCEPT_RAW: &str = "application/vnd.github.v3.raw";

/// Files above this size are not worth embedding.
pub const MAX_FILE_BYTES: u64 = 512 * 1024;

/// Parallel raw reads per repository.
const FETCH_CONCURRENCY: usize = 8;

const SKIPPED_DIRS: &[&str] = &[
    ".git/",
    "node_modules/",
    "vendor/",
    "dist/",
    "build/",
    "target/",
    ".next/",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svg", "pdf", "zip", "gz", "tgz", "tar",
    "7z", "rar", "jar", "class", "exe", "dll", "so", "dylib", "bin", "wasm", "woff", "woff2",
    "ttf", "otf", "eot", "mp3", "mp4", "mov", "avi", "webm", "lock",
];

impl GitHubClient {
    /// Lists every indexable text file on the default branch with its content.
    ///
    /// Binary-looking paths, vendored directories and oversized blobs are
    /// filtered from the tree listing. Files that vanish between listing and
    /// reading, or are not UTF-8, are skipped. Output is sorted by path.
    pub async fn repository_files(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> GitHubResult<Vec<RepositoryFile>> {
        let repo_url = self.repo_url(owner, repo)?;

        let meta: GitHubRepo = self
            .send(self.request(Method::GET, &repo_url, token, ACCEPT_JSON)?)
            .await?
            .json()
            .await?;
        let branch = meta.default_branch;

        let tree_url = format!(
            "{}/git/trees/{}?recursive=1",
            repo_url,
            urlencoding::encode(&branch)
        );
        debug!("GitHub tree: {}", tree_url);
        let tree: GitHubTree = self
            .send(self.request(Method::GET, &tree_url, token, ACCEPT_JSON)?)
            .await?
            .json()
            .await?;
        if tree.truncated {
            warn!(owner, repo, "tree listing truncated by GitHub; indexing a partial file set");
        }

        let paths: Vec<String> = tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob" && is_indexable(&e.path, e.size.unwrap_or(0)))
            .map(|e| e.path)
            .collect();
        debug!(owner, repo, candidates = paths.len(), "tree filtered");

        let mut files: Vec<RepositoryFile> = stream::iter(paths)
            .map(|path| {
                let repo_url = &repo_url;
                let branch = &branch;
                async move {
                    let content = self.read_text(token, repo_url, &path, branch).await?;
                    Ok::<_, GitHubError>(content.map(|content| RepositoryFile { path, content }))
                }
            })
            .buffer_unordered(FETCH_CONCURRENCY)
            .try_filter_map(|f| async move { Ok(f) })
            .try_collect()
            .await?;

        files.sort_by(|a, b| a.path.cmp(&b.path));
        info!(owner, repo, files = files.len(), "repository files fetched");
        Ok(files)
    }

    /// Raw file read; `None` when missing at the ref or not valid UTF-8.
    async fn read_text(
        &self,
        token: &str,
        repo_url: &str,
        path: &str,
        git_ref: &str,
    ) -> GitHubResult<Option<String>> {
        let url = format!("{}/contents/{}", repo_url, encode_file_path(path));
        let req = self
            .request(Method::GET, &url, token, ACCEPT_RAW)?
            .query(&[("ref", git_ref)]);

        let resp = match self.send(req).await {
            Ok(r) => r,
            Err(GitHubError::Provider(GitHubProviderError::NotFound)) => {
                debug!(path, "file vanished between tree listing and read");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let bytes = resp.bytes().await?;
        match String::from_utf8(bytes.to_vec()) {
            Ok(s) => Ok(Some(s)),
            Err(_) => {
                debug!(path, "skipping non-UTF-8 file");
                Ok(None)
            }
        }
    }
}

/// Tree filter: text-looking, outside vendored dirs, under the size cap.
pub fn is_indexable(path: &str, size: u64) -> bool {
    if size > MAX_FILE_BYTES {
        return false;
    }
    if SKIPPED_DIRS
        .iter()
        .any(|d| path.starts_with(d) || path.contains(&format!("/{d}")))
    {
        return false;
    }
    match path.rsplit_once('.') {
        Some((_, ext)) => !BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => true,
    }
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct GitHubTree {
    tree: Vec<GitHubTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct GitHubTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexable_filter() {
        assert!(is_indexable("src/main.rs", 1200));
        assert!(is_indexable("Makefile", 10));
        assert!(!is_indexable("assets/logo.PNG", 10));
        assert!(!is_indexable("Cargo.lock", 10));
        assert!(!is_indexable("node_modules/x/index.js", 10));
        assert!(!is_indexable("web/node_modules/x/index.js", 10));
        assert!(!is_indexable("src/huge.rs", MAX_FILE_BYTES + 1));
    }

    #[test]
    fn tree_entries_parse() {
        let raw = r#"{"sha":"abc","truncated":false,"tree":[
            {"path":"src","type":"tree","mode":"040000"},
            {"path":"src/lib.rs","type":"blob","size":42}
        ]}"#;
        let tree: GitHubTree = serde_json::from_str(raw).unwrap();
        let blobs: Vec<_> = tree.tree.iter().filter(|e| e.kind == "blob").collect();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].size, Some(42));
    }
}
