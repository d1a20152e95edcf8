// src/model.rs

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// A commit that last touched one of the dump's source lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: String,
    pub author: String,
    pub email: String,
    /// First line of the commit message
    pub summary: String,
    pub full_message: Option<String>,
    /// When the change was originally authored. Rebases move the commit date, not this one.
    pub date: DateTime<Utc>,
}

impl Commit {
    /// At most the first `n` characters of the commit id
    pub fn short_id(&self, n: usize) -> &str {
        match self.id.char_indices().nth(n) {
            Some((end, _)) => &self.id[..end],
            None => &self.id,
        }
    }
}

/// One exact line of one exact file at one exact revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceLineKey {
    pub path: String,
    pub line: u32,
    pub revision: String,
}

impl SourceLineKey {
    pub fn new(path: impl Into<String>, line: u32, revision: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line,
            revision: revision.into(),
        }
    }
}

impl fmt::Display for SourceLineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.path, self.line, self.revision)
    }
}

/// Every distinct commit found for a dump, indexed by id and by source line.
///
/// Entries are only ever appended. Sorting reorders a separate view, so the indexes never go stale.
#[derive(Debug)]
pub struct CommitStore {
    entries: Vec<Commit>,
    order: Vec<usize>,
    by_id: HashMap<String, usize>,
    by_source: HashMap<SourceLineKey, usize>,
    sorted: bool,
}

impl CommitStore {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            order: Vec::new(),
            by_id: HashMap::new(),
            by_source: HashMap::new(),
            sorted: true,
        }
    }

    /// Link `source` to `commit`, reusing an existing entry with the same id.
    pub fn add(&mut self, source: SourceLineKey, commit: Commit) {
        let idx = match self.by_id.get(&commit.id) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                self.by_id.insert(commit.id.clone(), idx);
                self.entries.push(commit);
                self.order.push(idx);
                self.sorted = false;
                idx
            }
        };
        self.by_source.insert(source, idx);
    }

    pub fn lookup(&self, source: &SourceLineKey) -> Option<&Commit> {
        self.by_source.get(source).map(|&idx| &self.entries[idx])
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<&Commit> {
        self.by_id.get(id).map(|&idx| &self.entries[idx])
    }

    /// Most recently authored first; equal dates keep discovery order.
    pub fn sort_by_date_descending(&mut self) {
        if self.sorted {
            return;
        }
        let entries = &self.entries;
        self.order
            .sort_by(|&a, &b| entries[b].date.cmp(&entries[a].date));
        self.sorted = true;
    }

    /// Commits in the current order (discovery order until sorted)
    pub fn all(&self) -> impl Iterator<Item = &Commit> + '_ {
        self.order.iter().map(|&idx| &self.entries[idx])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Number of source lines linked to some commit
    pub fn linked_sources(&self) -> usize {
        self.by_source.len()
    }
}

impl Default for CommitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) fn commit_at(id: &str, secs: i64) -> Commit {
    use chrono::TimeZone;
    Commit {
        id: id.to_string(),
        author: "Grace Hopper".to_string(),
        email: "grace@example.com".to_string(),
        summary: format!("Change {id}"),
        full_message: None,
        date: Utc.timestamp_opt(secs, 0).unwrap(),
    }
}
