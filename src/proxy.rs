//! Content proxy
//!
//! Reshapes GitHub Contents API answers into directory listings and
//! passes raw file text through.

use serde::Serialize;

use crate::error::AppError;
use crate::github::{ContentEntry, EntryKind, GitHub};

/// Folders and files of one repository directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryListing {
    pub owner: String,
    pub repo: String,
    pub subpath: String,
    pub folders: Vec<String>,
    pub files: Vec<String>,
}

impl DirectoryListing {
    /// Split entries into folders and files, in upstream order
    ///
    /// Dot-prefixed names and entries that are neither files nor
    /// directories are left out.
    pub fn from_entries(
        owner: impl Into<String>,
        repo: impl Into<String>,
        subpath: impl Into<String>,
        entries: impl IntoIterator<Item = ContentEntry>,
    ) -> Self {
        let mut folders = Vec::new();
        let mut files = Vec::new();

        for entry in entries {
            if entry.name.starts_with('.') {
                continue;
            }
            match entry.kind {
                EntryKind::Dir => folders.push(entry.name),
                EntryKind::File => files.push(entry.name),
                _ => {}
            }
        }

        Self {
            owner: owner.into(),
            repo: repo.into(),
            subpath: subpath.into(),
            folders,
            files,
        }
    }
}

/// Fetch and reshape a directory listing
pub async fn list_directory(
    github: &GitHub,
    owner: &str,
    repo: &str,
    subpath: &str,
    access_token: &str,
) -> Result<DirectoryListing, AppError> {
    let entries = github
        .list_contents(owner, repo, subpath, access_token)
        .await?;
    Ok(DirectoryListing::from_entries(owner, repo, subpath, entries))
}

/// Fetch a file's raw text from the configured branch
pub async fn raw_file(
    github: &GitHub,
    owner: &str,
    repo: &str,
    subpath: &str,
    access_token: &str,
) -> Result<String, AppError> {
    Ok(github.raw_file(owner, repo, subpath, access_token).await?)
}

/// Target of a `/_go` redirect
///
/// A link on the GitHub web origin becomes the matching path on this site;
/// anything else is passed through untouched.
pub fn go_target(web_url: &str, repo: &str) -> String {
    match repo.strip_prefix(web_url) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => repo.to_string(),
    }
}
