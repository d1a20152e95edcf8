// src/format.rs

use crate::analyzer::Dump;
use crate::config::FormatConfig;
use crate::model::{Commit, CommitStore};
use crate::stack::{self, Bucket, Call};
use crate::template::{Fields, Template, TemplateError};
use crate::trace::{AnnotatedFrame, FunctionKind, Role, Segment};

const SHORT_ID: usize = 4;

const DEFAULT_MESSAGE: &str = "\
Hi {author},

a crash at revision {revision} runs through code from your commit {short_id} ({date}):

    {summary}

Could you take a look?

{stacktrace}
";

/// Kinds of web page that can be opened for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Commit,
    File,
    Blame,
}

/// Display formatting, with every configured template compiled up front
#[derive(Debug, Clone)]
pub struct Format {
    commit_url: Option<Template>,
    file_url: Option<Template>,
    blame_url: Option<Template>,
    message: Template,
    full_path: bool,
}

impl Format {
    pub fn compile(cfg: &FormatConfig) -> Result<Self, TemplateError> {
        let url = |name: &str, text: &Option<String>| -> Result<Option<Template>, TemplateError> {
            match text.as_deref() {
                Some(text) if !text.trim().is_empty() => {
                    Template::parse::<AnnotatedFrame>(name, text).map(Some)
                }
                _ => Ok(None),
            }
        };
        let message = match cfg.custom_message.as_deref() {
            Some(text) if !text.trim().is_empty() => Template::parse::<Candidate>("custom_message", text)?,
            _ => Template::parse::<Candidate>("message", DEFAULT_MESSAGE)?,
        };

        Ok(Self {
            commit_url: url("commit_url", &cfg.commit_url)?,
            file_url: url("file_url", &cfg.file_url)?,
            blame_url: url("blame_url", &cfg.blame_url)?,
            message,
            full_path: cfg.full_path,
        })
    }

    pub fn full_path(&self) -> bool {
        self.full_path
    }

    fn link_template(&self, link: Link) -> Option<&Template> {
        match link {
            Link::Commit => self.commit_url.as_ref(),
            Link::File => self.file_url.as_ref(),
            Link::Blame => self.blame_url.as_ref(),
        }
    }

    pub fn has_link(&self, link: Link) -> bool {
        self.link_template(link).is_some()
    }

    /// URL of `link` for `frame`, if configured and the frame has what it points at
    pub fn link(&self, link: Link, frame: &AnnotatedFrame) -> Option<String> {
        let template = self.link_template(link)?;
        let usable = match link {
            Link::Commit => frame.commit_id.is_some(),
            Link::File | Link::Blame => frame.origin.is_some(),
        };
        usable.then(|| template.render(frame))
    }

    pub fn bucket_header(&self, bucket: &Bucket, multiple_buckets: bool) -> Vec<Segment> {
        let role = if bucket.first && multiple_buckets {
            Role::RoutineFirst
        } else {
            Role::Routine
        };
        vec![Segment::new(header_text(bucket), role)]
    }

    pub fn call_line(&self, call: &Call, commit: Option<&Commit>, source_width: usize) -> Vec<Segment> {
        let (date, id) = match commit {
            Some(c) => (c.date.format("%Y-%m-%d").to_string(), c.short_id(SHORT_ID).to_string()),
            None => ("????-??-??".to_string(), "????".to_string()),
        };
        let source = if self.full_path {
            call.full_source_line()
        } else {
            call.source_line()
        };

        vec![
            Segment::plain("    {"),
            Segment::new(date, Role::CommitDate),
            Segment::plain(" @ "),
            Segment::new(id, Role::CommitId),
            Segment::plain("} "),
            Segment::new(format!("{source:<source_width$}"), Role::SourceFile),
            Segment::plain("  "),
            Segment::new(call.pkg_dot_name(), Role::Function(function_kind(call))),
            Segment::new(format!("({})", call.args), Role::Arguments),
        ]
    }

    /// Text of the commit pane
    pub fn commit_details(&self, commit: &Commit) -> String {
        let body = commit.full_message.as_deref().unwrap_or(&commit.summary);
        format!(
            "{}\nAuthor: {} <{}>\nDate:   {}\n\n{}",
            commit.id,
            commit.author,
            commit.email,
            commit.date.format("%Y-%m-%d %H:%M:%S UTC"),
            body
        )
    }

    /// One dated line per commit, in store order
    pub fn commit_list(&self, commits: &CommitStore) -> Vec<String> {
        commits
            .all()
            .map(|c| format!("[{}] {}", c.date.format("%Y-%m-%d %H:%M:%S"), c.id))
            .collect()
    }

    /// The dump as plain text with full paths, for pasting into messages
    pub fn stacktrace_for_message(&self, dump: &Dump) -> String {
        let mut out = String::new();
        if !dump.skipped.is_empty() {
            out.push_str(&dump.skipped);
            out.push_str("\n\n");
        }
        let width = stack::source_width(&dump.buckets, true);
        for (i, bucket) in dump.buckets.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&header_text(bucket));
            out.push('\n');
            for call in &bucket.calls {
                out.push_str(&format!(
                    "    {:<width$} {}({})\n",
                    call.full_source_line(),
                    call.pkg_dot_name(),
                    call.args
                ));
            }
            if bucket.elided {
                out.push_str("    (...)\n");
            }
        }
        out
    }

    /// The message to send the author of `commit`
    pub fn message(&self, dump: &Dump, commit: &Commit) -> String {
        self.message.render(&Candidate {
            format: self,
            dump,
            commit,
        })
    }
}

fn header_text(bucket: &Bucket) -> String {
    let mut extra = String::new();
    match (bucket.sleep_min, bucket.sleep_max) {
        (Some(min), Some(max)) if min != max => extra.push_str(&format!(" ({min}~{max} minutes)")),
        (_, Some(max)) => extra.push_str(&format!(" ({max} minutes)")),
        _ => {}
    }
    if bucket.locked {
        extra.push_str(" (locked)");
    }
    if let Some(creator) = &bucket.created_by {
        extra.push_str(&format!(
            " (Created by {} @ {})",
            creator.pkg_dot_name(),
            creator.source_line()
        ));
    }
    format!("{}: {}{}", bucket.routines.len(), bucket.state, extra)
}

fn function_kind(call: &Call) -> FunctionKind {
    let exported = call.is_exported();
    if call.is_stdlib() {
        if exported {
            FunctionKind::StdLibExported
        } else {
            FunctionKind::StdLib
        }
    } else if call.is_pkg_main() {
        FunctionKind::Main
    } else if exported {
        FunctionKind::OtherExported
    } else {
        FunctionKind::Other
    }
}

impl Fields for AnnotatedFrame {
    const NAMES: &'static [&'static str] = &["head", "file", "line", "commit"];

    fn field(&self, name: &str) -> String {
        match (name, &self.origin) {
            ("head", Some(o)) => o.head.clone(),
            ("file", Some(o)) => o.file.clone(),
            ("line", Some(o)) => o.line.to_string(),
            ("commit", _) => self.commit_id.clone().unwrap_or_default(),
            _ => String::new(),
        }
    }
}

/// A commit whose author may want to hear about a dump
struct Candidate<'a> {
    format: &'a Format,
    dump: &'a Dump,
    commit: &'a Commit,
}

impl Fields for Candidate<'_> {
    const NAMES: &'static [&'static str] = &[
        "author",
        "email",
        "id",
        "short_id",
        "summary",
        "message",
        "date",
        "revision",
        "stacktrace",
    ];

    fn field(&self, name: &str) -> String {
        let c = self.commit;
        match name {
            "author" => c.author.clone(),
            "email" => c.email.clone(),
            "id" => c.id.clone(),
            "short_id" => c.short_id(8).to_string(),
            "summary" => c.summary.clone(),
            "message" => c.full_message.clone().unwrap_or_else(|| c.summary.clone()),
            "date" => c.date.format("%Y-%m-%d").to_string(),
            "revision" => self.dump.revision.clone(),
            "stacktrace" => self.format.stacktrace_for_message(self.dump),
            _ => String::new(),
        }
    }
}
