// src/blame.rs

use crate::model::{Commit, SourceLineKey};
use chrono::{TimeZone, Utc};
use git2::{BlameOptions, Oid, Repository};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Debug, Error)]
pub enum BlameError {
    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error("{} is outside of the repository work tree", .0.display())]
    OutsideRepository(PathBuf),

    #[error("repository has no work tree")]
    Bare,

    #[error("no blame information for line {0}")]
    NoSuchLine(u32),

    #[error("author time {0} is out of range")]
    BadTimestamp(i64),
}

/// Attributes one source line to the commit that last modified it.
///
/// Implementations are called from many threads at once.
pub trait Blame: Sync {
    /// `Ok(None)` means there is legitimately nothing to blame (an empty file).
    fn blame(&self, key: &SourceLineKey) -> Result<Option<Commit>, BlameError>;
}

/// Blame backed by libgit2
pub struct GitBlamer {
    repo_path: PathBuf,
}

impl GitBlamer {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }
}

impl Blame for GitBlamer {
    fn blame(&self, key: &SourceLineKey) -> Result<Option<Commit>, BlameError> {
        // git2::Repository is not Sync, so every call gets its own handle
        let repo = Repository::open(&self.repo_path)?;
        let rel = relative_path(&repo, Path::new(&key.path))?;
        let revision = repo.revparse_single(&key.revision)?.peel_to_commit()?;

        let blob = revision
            .tree()?
            .get_path(&rel)?
            .to_object(&repo)?
            .peel_to_blob()?;
        if blob.size() == 0 {
            trace!("{key} is an empty file, nothing to blame");
            return Ok(None);
        }

        let line = key.line as usize;
        let mut opts = BlameOptions::new();
        opts.newest_commit(revision.id())
            .min_line(line)
            .max_line(line)
            .ignore_whitespace(true);
        let blame = repo.blame_file(&rel, Some(&mut opts))?;
        let hunk = blame
            .get_line(line)
            .ok_or(BlameError::NoSuchLine(key.line))?;

        load_commit(&repo, hunk.final_commit_id()).map(Some)
    }
}

fn load_commit(repo: &Repository, id: Oid) -> Result<Commit, BlameError> {
    let commit = repo.find_commit(id)?;
    let author = commit.author();
    let seconds = author.when().seconds();
    let date = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or(BlameError::BadTimestamp(seconds))?;

    Ok(Commit {
        id: id.to_string(),
        author: author.name().unwrap_or("Unknown").to_string(),
        email: author.email().unwrap_or_default().to_string(),
        summary: commit.summary().unwrap_or_default().to_string(),
        full_message: commit
            .message()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty()),
        date,
    })
}

/// Paths in a dump are usually absolute; blame wants them relative to the work tree.
fn relative_path(repo: &Repository, path: &Path) -> Result<PathBuf, BlameError> {
    if path.is_relative() {
        return Ok(path.to_path_buf());
    }
    let workdir = repo.workdir().ok_or(BlameError::Bare)?;
    if let Ok(rel) = path.strip_prefix(workdir) {
        return Ok(rel.to_path_buf());
    }
    // either side may have been reached through a symlink
    let (Ok(workdir), Ok(canonical)) = (workdir.canonicalize(), path.canonicalize()) else {
        return Err(BlameError::OutsideRepository(path.to_path_buf()));
    };
    match canonical.strip_prefix(&workdir) {
        Ok(rel) => Ok(rel.to_path_buf()),
        Err(_) => Err(BlameError::OutsideRepository(path.to_path_buf())),
    }
}

/// Pins `spec` to a concrete commit id, so that every blame of one dump sees the same tree.
///
/// Falls back to the revision as given when it cannot be resolved.
pub fn resolve_revision(repo_path: &Path, spec: &str) -> String {
    let resolved = Repository::open(repo_path).and_then(|repo| {
        let commit = repo.revparse_single(spec)?.peel_to_commit()?;
        Ok(commit.id().to_string())
    });
    match resolved {
        Ok(id) => id,
        Err(e) => {
            warn!("Failed to resolve revision {spec:?}, using it verbatim: {e}");
            spec.to_string()
        }
    }
}

/// Top level of the work tree containing `start`
pub fn discover_repository(start: &Path) -> Option<PathBuf> {
    let repo = Repository::discover(start).ok()?;
    repo.workdir().map(Path::to_path_buf)
}

#[cfg(test)]
pub(crate) mod testing {
    use git2::{Repository, Signature, Time};
    use std::fs;
    use std::path::Path;

    /// Writes `files` into the work tree and commits them at `when`.
    pub fn commit_files(
        repo: &Repository,
        files: &[(&str, &str)],
        author: &str,
        when: i64,
        message: &str,
    ) -> git2::Oid {
        let root = repo.workdir().unwrap().to_path_buf();
        let mut index = repo.index().unwrap();
        for (name, content) in files {
            fs::write(root.join(name), content).unwrap();
            index.add_path(Path::new(name)).unwrap();
        }
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

        let email = format!("{}@example.com", author.to_lowercase());
        let sig = Signature::new(author, &email, &Time::new(when, 0)).unwrap();
        let parent = repo.head().ok().map(|h| h.peel_to_commit().unwrap());
        let parents: Vec<_> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }
}
