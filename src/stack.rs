// src/stack.rs

//! Parsing of Go goroutine dumps and grouping of identical stacks into buckets.

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no goroutines found in dump")]
    NoGoroutines,

    #[error("line {line}: malformed goroutine header {text:?}")]
    BadHeader { line: usize, text: String },

    #[error("line {line}: call {text:?} is not followed by a source location")]
    MissingSource { line: usize, text: String },
}

/// One frame of a goroutine stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Fully qualified function, e.g. `net/http.(*conn).serve`
    pub func: String,
    pub args: String,
    pub source_path: String,
    pub line: u32,
}

impl Call {
    /// The function without its import path prefix, e.g. `http.(*conn).serve`
    pub fn pkg_dot_name(&self) -> &str {
        match self.func.rfind('/') {
            Some(slash) => &self.func[slash + 1..],
            None => &self.func,
        }
    }

    /// Import path of the package, e.g. `net/http`
    pub fn pkg_path(&self) -> &str {
        let start = self.func.rfind('/').map_or(0, |slash| slash + 1);
        match self.func[start..].find('.') {
            Some(dot) => &self.func[..start + dot],
            None => &self.func,
        }
    }

    pub fn source_line(&self) -> String {
        let file = Path::new(&self.source_path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or(&self.source_path);
        format!("{}:{}", file, self.line)
    }

    pub fn full_source_line(&self) -> String {
        format!("{}:{}", self.source_path, self.line)
    }

    pub fn is_pkg_main(&self) -> bool {
        self.pkg_path() == "main"
    }

    /// Standard library packages have no dot in the first path element.
    pub fn is_stdlib(&self) -> bool {
        let pkg = self.pkg_path();
        let first = pkg.split('/').next().unwrap_or(pkg);
        !self.is_pkg_main() && !first.contains('.')
    }

    pub fn is_exported(&self) -> bool {
        let last = self
            .pkg_dot_name()
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .trim_start_matches("(*")
            .trim_start_matches('(');
        last.chars().next().is_some_and(char::is_uppercase)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goroutine {
    pub id: u64,
    pub state: String,
    pub sleep_minutes: Option<u32>,
    pub locked: bool,
    pub calls: Vec<Call>,
    pub created_by: Option<Call>,
    pub elided: bool,
}

/// Output of [`parse_dump`]
#[derive(Debug, Default)]
pub struct ParsedDump {
    pub routines: Vec<Goroutine>,
    /// Everything that is not part of a goroutine stack (panic message, exit status, ...)
    pub skipped: String,
}

/// A group of goroutines sharing one stack signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub state: String,
    pub sleep_min: Option<u32>,
    pub sleep_max: Option<u32>,
    pub locked: bool,
    pub created_by: Option<Call>,
    pub calls: Vec<Call>,
    pub elided: bool,
    /// Goroutine ids, in dump order
    pub routines: Vec<u64>,
    /// Holds the first goroutine of the dump, usually the one that panicked
    pub first: bool,
}

const ELIDED: &str = "...additional frames elided...";

pub fn parse_dump(raw: &[u8]) -> Result<ParsedDump, ParseError> {
    let text = String::from_utf8_lossy(raw);
    let lines: Vec<&str> = text.lines().collect();

    let mut dump = ParsedDump::default();
    let mut skipped: Vec<&str> = Vec::new();
    let mut current: Option<Goroutine> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let line_no = i + 1;

        if line.starts_with("goroutine ") && line.ends_with("]:") {
            if let Some(g) = current.take() {
                dump.routines.push(g);
            }
            current = Some(parse_header(line).ok_or_else(|| ParseError::BadHeader {
                line: line_no,
                text: line.to_string(),
            })?);
            i += 1;
            continue;
        }

        let Some(g) = current.as_mut() else {
            skipped.push(line);
            i += 1;
            continue;
        };

        if line.trim().is_empty() {
            dump.routines.extend(current.take());
            i += 1;
            continue;
        }

        if line == ELIDED {
            g.elided = true;
            i += 1;
            continue;
        }

        // notes such as `\tgoroutine running on other thread; stack unavailable`
        if line.starts_with('\t') && parse_source(line).is_none() {
            i += 1;
            continue;
        }

        let source = lines.get(i + 1).and_then(|next| parse_source(next));
        match source {
            Some((path, src_line)) => {
                let (call_text, is_creator) = match line.strip_prefix("created by ") {
                    Some(rest) => (strip_creator_goroutine(rest), true),
                    None => (line, false),
                };
                let (func, args) = split_call(call_text);
                let call = Call {
                    func: func.to_string(),
                    args: args.to_string(),
                    source_path: path.to_string(),
                    line: src_line,
                };
                if is_creator {
                    g.created_by = Some(call);
                } else {
                    g.calls.push(call);
                }
                i += 2;
            }
            None if looks_like_call(line) => {
                return Err(ParseError::MissingSource {
                    line: line_no,
                    text: line.to_string(),
                });
            }
            None => {
                // trailing output such as `exit status 2` right after the last frame
                dump.routines.extend(current.take());
                skipped.push(line);
                i += 1;
            }
        }
    }
    dump.routines.extend(current);

    if dump.routines.is_empty() {
        return Err(ParseError::NoGoroutines);
    }

    dump.skipped = skipped.join("\n").trim_matches('\n').to_string();
    Ok(dump)
}

/// `goroutine 18 [chan receive, 5 minutes, locked to thread]:`, optionally with
/// `gp=0x.. m=0 mp=0x..` between the id and the brackets
fn parse_header(line: &str) -> Option<Goroutine> {
    let rest = line.strip_prefix("goroutine ")?;
    let (id, rest) = rest.split_once(' ')?;
    let id = id.parse().ok()?;
    let rest = rest.strip_suffix("]:")?;
    let open = rest.rfind('[')?;
    if open > 0 && !rest[..open].ends_with(' ') {
        return None;
    }
    let inner = &rest[open + 1..];

    let mut items = inner.split(", ");
    let state = items.next()?.to_string();
    let mut sleep_minutes = None;
    let mut locked = false;
    for item in items {
        if item == "locked to thread" {
            locked = true;
        } else if let Some(n) = item.strip_suffix(" minutes").or(item.strip_suffix(" minute")) {
            sleep_minutes = n.parse().ok();
        }
    }

    Some(Goroutine {
        id,
        state,
        sleep_minutes,
        locked,
        calls: Vec::new(),
        created_by: None,
        elided: false,
    })
}

/// `\t/path/to/file.go:123 +0x1d`
fn parse_source(line: &str) -> Option<(&str, u32)> {
    let rest = line.strip_prefix('\t')?;
    let rest = match rest.rsplit_once(' ') {
        Some((loc, offset)) if offset.starts_with("+0x") => loc,
        _ => rest,
    };
    let (path, num) = rest.rsplit_once(':')?;
    Some((path, num.parse().ok()?))
}

/// Go 1.21 appends the creating goroutine: `created by main.main in goroutine 1`
fn strip_creator_goroutine(text: &str) -> &str {
    match text.rsplit_once(" in goroutine ") {
        Some((func, id)) if id.chars().all(|c| c.is_ascii_digit()) => func,
        _ => text,
    }
}

fn looks_like_call(line: &str) -> bool {
    line.ends_with(')') && line.contains('(') && !line.starts_with(char::is_whitespace)
}

/// Splits `pkg.(*T).M(0x1, 0x2)` into the function and its argument list.
fn split_call(text: &str) -> (&str, &str) {
    if !text.ends_with(')') {
        return (text, "");
    }
    let mut depth = 0usize;
    for (idx, ch) in text.char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    // a bare method receiver like `(*T)` has no function name before it
                    if idx == 0 || text[..idx].ends_with('.') {
                        return (text, "");
                    }
                    return (&text[..idx], &text[idx + 1..text.len() - 1]);
                }
            }
            _ => {}
        }
    }
    (text, "")
}

#[derive(PartialEq, Eq, Hash)]
struct Signature<'a> {
    state: &'a str,
    locked: bool,
    elided: bool,
    created_by: Option<(&'a str, &'a str, u32)>,
    calls: Vec<(&'a str, &'a str, u32)>,
}

impl<'a> Signature<'a> {
    fn of(g: &'a Goroutine) -> Self {
        let key = |c: &'a Call| (c.func.as_str(), c.source_path.as_str(), c.line);
        Self {
            state: &g.state,
            locked: g.locked,
            elided: g.elided,
            created_by: g.created_by.as_ref().map(key),
            calls: g.calls.iter().map(key).collect(),
        }
    }
}

/// Groups goroutines with identical stacks; call arguments are ignored.
///
/// The bucket with the dump's first goroutine leads, then larger buckets before smaller ones.
pub fn bucketize(routines: &[Goroutine]) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut index: HashMap<Signature, usize> = HashMap::new();

    for (n, g) in routines.iter().enumerate() {
        let idx = *index.entry(Signature::of(g)).or_insert_with(|| {
            buckets.push(Bucket {
                state: g.state.clone(),
                sleep_min: None,
                sleep_max: None,
                locked: g.locked,
                created_by: g.created_by.clone(),
                calls: g.calls.clone(),
                elided: g.elided,
                routines: Vec::new(),
                first: false,
            });
            buckets.len() - 1
        });

        let bucket = &mut buckets[idx];
        bucket.routines.push(g.id);
        bucket.first |= n == 0;
        if let Some(m) = g.sleep_minutes {
            bucket.sleep_min = Some(bucket.sleep_min.map_or(m, |min| min.min(m)));
            bucket.sleep_max = Some(bucket.sleep_max.map_or(m, |max| max.max(m)));
        }
    }

    buckets.sort_by(|a, b| {
        b.first
            .cmp(&a.first)
            .then_with(|| b.routines.len().cmp(&a.routines.len()))
    });
    buckets
}

/// Width of the widest source location across all buckets
pub fn source_width(buckets: &[Bucket], full_path: bool) -> usize {
    buckets
        .iter()
        .flat_map(|b| b.calls.iter())
        .map(|c| {
            if full_path {
                c.full_source_line().len()
            } else {
                c.source_line().len()
            }
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
pub(crate) const SAMPLE_DUMP: &str = "\
panic: boom

goroutine 1 [running]:
main.crash(0x2a, {0xc000012345, 0x3})
\t/home/dev/app/main.go:12 +0x39
main.main()
\t/home/dev/app/main.go:8 +0x20

goroutine 6 [chan receive, 3 minutes]:
github.com/acme/worker.(*Pool).Run(0xc00001c0c0)
\t/home/dev/app/vendor/github.com/acme/worker/pool.go:41 +0x5c
created by main.main in goroutine 1
\t/home/dev/app/main.go:7 +0x6e

goroutine 7 [chan receive, 5 minutes]:
github.com/acme/worker.(*Pool).Run(0xc00001c0f0)
\t/home/dev/app/vendor/github.com/acme/worker/pool.go:41 +0x5c
created by main.main in goroutine 1
\t/home/dev/app/main.go:7 +0x6e

goroutine 9 [select, locked to thread]:
runtime.gopark(0x0?, 0x0?, 0x0?, 0x0?, 0x0?)
\t/usr/local/go/src/runtime/proc.go:398 +0xce
...additional frames elided...
exit status 2
";
