// src/trace.rs

use crate::analyzer::Dump;
use crate::format::Format;
use crate::stack;
use std::path::Path;

/// What a piece of a display line shows, so the renderer can pick a style for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Plain,
    Routine,
    RoutineFirst,
    CommitDate,
    CommitId,
    SourceFile,
    Function(FunctionKind),
    Arguments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    StdLib,
    StdLibExported,
    Main,
    Other,
    OtherExported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub role: Role,
}

impl Segment {
    pub fn new(text: impl Into<String>, role: Role) -> Self {
        Self {
            text: text.into(),
            role,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, Role::Plain)
    }
}

/// Where a frame's source line lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// Revision the dump was blamed at
    pub head: String,
    /// Relative to the repository when the frame is inside it
    pub file: String,
    pub line: u32,
}

/// One display line of an annotated dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedFrame {
    pub segments: Vec<Segment>,
    /// Absent for headers, separators and other lines without a source
    pub origin: Option<Origin>,
    pub commit_id: Option<String>,
}

impl AnnotatedFrame {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::plain(text)],
            origin: None,
            commit_id: None,
        }
    }

    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotatedTrace {
    frames: Vec<AnnotatedFrame>,
}

impl AnnotatedTrace {
    /// Lays out the dump bucket by bucket, attaching the commit found for each call.
    pub fn build(dump: &Dump, format: &Format) -> Self {
        let mut frames: Vec<AnnotatedFrame> = dump.skipped.lines().map(AnnotatedFrame::plain).collect();

        let width = stack::source_width(&dump.buckets, format.full_path());
        let multiple = dump.buckets.len() > 1;
        for bucket in &dump.buckets {
            if !frames.is_empty() {
                frames.push(AnnotatedFrame::plain(""));
            }
            frames.push(AnnotatedFrame {
                segments: format.bucket_header(bucket, multiple),
                origin: None,
                commit_id: None,
            });

            for call in &bucket.calls {
                let commit = dump.commits.lookup(&dump.key_for(call));
                frames.push(AnnotatedFrame {
                    segments: format.call_line(call, commit, width),
                    origin: Some(Origin {
                        head: dump.revision.clone(),
                        file: repository_relative(&dump.repository, &call.source_path),
                        line: call.line,
                    }),
                    commit_id: commit.map(|c| c.id.clone()),
                });
            }

            if bucket.elided {
                frames.push(AnnotatedFrame::plain("    (...)"));
            }
        }
        Self { frames }
    }

    pub fn frames(&self) -> &[AnnotatedFrame] {
        &self.frames
    }

    pub fn get(&self, index: usize) -> Option<&AnnotatedFrame> {
        self.frames.get(index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Index of the first frame with a source location, or 0 if there is none
    pub fn first_with_source(&self) -> usize {
        self.frames
            .iter()
            .position(|f| f.origin.is_some())
            .unwrap_or(0)
    }
}

fn repository_relative(repository: &Path, path: &str) -> String {
    match Path::new(path).strip_prefix(repository) {
        Ok(rel) if !repository.as_os_str().is_empty() => rel.to_string_lossy().into_owned(),
        _ => path.to_string(),
    }
}
