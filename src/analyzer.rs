// src/analyzer.rs

use crate::blame::{resolve_revision, Blame};
use crate::config::Source;
use crate::model::{CommitStore, SourceLineKey};
use crate::stack::{self, Bucket, Call};
use anyhow::{Context, Result};
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, debug_span, info, trace};

/// A parsed dump together with the commits behind its source lines
#[derive(Debug)]
pub struct Dump {
    pub repository: PathBuf,
    /// Concrete revision every line was blamed at
    pub revision: String,
    pub buckets: Vec<Bucket>,
    pub commits: CommitStore,
    /// Non-stack output of the dump, e.g. the panic message
    pub skipped: String,
}

impl Dump {
    pub fn key_for(&self, call: &Call) -> SourceLineKey {
        source_key(call, &self.revision)
    }
}

fn source_key(call: &Call, revision: &str) -> SourceLineKey {
    SourceLineKey::new(call.source_path.as_str(), call.line, revision)
}

/// Resolves source lines to commits on a dedicated pool of blame workers.
pub struct Resolver {
    pool: rayon::ThreadPool,
}

impl Resolver {
    pub fn new(jobs: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("blame-{i}"))
            .build()
            .context("Failed to create blame worker pool")?;
        Ok(Self { pool })
    }

    /// Blames every distinct key once and collects the results, sorted newest first.
    ///
    /// Keys that fail to blame are left out. Workers only produce; a single collector thread
    /// owns the store and performs every insertion.
    pub fn resolve<B, I>(&self, blamer: &B, keys: I, progress: &ProgressBar) -> CommitStore
    where
        B: Blame + ?Sized,
        I: IntoIterator<Item = SourceLineKey>,
    {
        let keys: Vec<SourceLineKey> = keys
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if keys.is_empty() {
            return CommitStore::new();
        }

        let t1 = Instant::now();
        progress.set_length(keys.len() as u64);
        let failed = AtomicUsize::new(0);
        let (send, recv) = crossbeam_channel::unbounded();

        let mut store = std::thread::scope(|scope| {
            let collector = scope.spawn(move || {
                let mut store = CommitStore::new();
                for (key, commit) in recv {
                    store.add(key, commit);
                }
                store
            });

            self.pool.install(|| {
                keys.par_iter()
                    .progress_with(progress.clone())
                    .for_each_with(send, |send, key| match blamer.blame(key) {
                        Ok(Some(commit)) => {
                            let _ = send.send((key.clone(), commit));
                        }
                        Ok(None) => trace!("Nothing to blame for {key}"),
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            debug!("Failed to blame {key}: {e}");
                        }
                    });
            });

            // every sender is gone once the workers are done, which ends the collector
            collector
                .join()
                .unwrap_or_else(|e| std::panic::resume_unwind(e))
        });
        store.sort_by_date_descending();
        progress.finish();

        info!(
            "Blamed {} source lines in {:.2?}: {} commits for {} lines, {} failures",
            keys.len(),
            t1.elapsed(),
            store.len(),
            store.linked_sources(),
            failed.into_inner()
        );
        store
    }
}

/// Parses `raw`, pins the revision, and blames every frame of every bucket.
pub fn analyze<B>(
    source: &Source,
    raw: &[u8],
    blamer: &B,
    resolver: &Resolver,
    progress: &ProgressBar,
) -> Result<Dump>
where
    B: Blame + ?Sized,
{
    let _span = debug_span!("analyze", "{}", source.repository.display()).entered();

    let parsed = stack::parse_dump(raw).context("Failed to parse dump")?;
    let revision = resolve_revision(&source.repository, source.revision_spec());
    debug!("Pinned revision {:?} to {revision}", source.revision_spec());

    let buckets = stack::bucketize(&parsed.routines);
    debug!(
        "Parsed {} goroutines into {} buckets",
        parsed.routines.len(),
        buckets.len()
    );

    let keys = buckets
        .iter()
        .flat_map(|b| b.calls.iter())
        .map(|c| source_key(c, &revision));
    let commits = resolver.resolve(blamer, keys, progress);

    Ok(Dump {
        repository: source.repository.clone(),
        revision,
        buckets,
        commits,
        skipped: parsed.skipped,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::blame::{Blame, BlameError};
    use crate::model::{commit_at, Commit, SourceLineKey};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Blames from a fixed table; paths absent from the table fail.
    #[derive(Default)]
    pub struct TableBlamer {
        pub table: HashMap<(String, u32), Option<Commit>>,
        pub calls: Mutex<Vec<SourceLineKey>>,
    }

    impl TableBlamer {
        pub fn with(mut self, path: &str, line: u32, commit: Option<(&str, i64)>) -> Self {
            let commit = commit.map(|(id, secs)| commit_at(id, secs));
            self.table.insert((path.to_string(), line), commit);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Blame for TableBlamer {
        fn blame(&self, key: &SourceLineKey) -> Result<Option<Commit>, BlameError> {
            self.calls.lock().unwrap().push(key.clone());
            match self.table.get(&(key.path.clone(), key.line)) {
                Some(commit) => Ok(commit.clone()),
                None => Err(BlameError::NoSuchLine(key.line)),
            }
        }
    }
}
