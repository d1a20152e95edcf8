// src/renderer.rs

use crate::analyzer::Dump;
use crate::config::Palette;
use crate::format::Format;
use crate::messages::Side;
use crate::trace::{AnnotatedFrame, AnnotatedTrace, FunctionKind, Role, Segment};
use crate::ui::App;
use anyhow::{bail, Context, Result};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;
use std::io::Write;
use std::str::FromStr;

/// Palette entries parsed into terminal styles
#[derive(Debug, Clone, PartialEq)]
pub struct Styles {
    function_std_lib: Style,
    function_std_lib_exported: Style,
    function_main: Style,
    function_other: Style,
    function_other_exported: Style,
    routine: Style,
    routine_first: Style,
    source_file: Style,
    arguments: Style,
    commit_id: Style,
    commit_date: Style,
    highlight: Style,
}

impl Styles {
    pub fn from_palette(palette: &Palette) -> Result<Self> {
        let parse = |name: &str, spec: &str| {
            parse_style(spec).with_context(|| format!("Invalid style for colors.{name}"))
        };
        Ok(Self {
            function_std_lib: parse("function_std_lib", &palette.function_std_lib)?,
            function_std_lib_exported: parse(
                "function_std_lib_exported",
                &palette.function_std_lib_exported,
            )?,
            function_main: parse("function_main", &palette.function_main)?,
            function_other: parse("function_other", &palette.function_other)?,
            function_other_exported: parse(
                "function_other_exported",
                &palette.function_other_exported,
            )?,
            routine: parse("routine", &palette.routine)?,
            routine_first: parse("routine_first", &palette.routine_first)?,
            source_file: parse("source_file", &palette.source_file)?,
            arguments: parse("arguments", &palette.arguments)?,
            commit_id: parse("commit_id", &palette.commit_id)?,
            commit_date: parse("commit_date", &palette.commit_date)?,
            highlight: parse("highlight", &palette.highlight)?,
        })
    }

    pub fn for_role(&self, role: Role) -> Style {
        match role {
            Role::Plain => Style::default(),
            Role::Routine => self.routine,
            Role::RoutineFirst => self.routine_first,
            Role::CommitDate => self.commit_date,
            Role::CommitId => self.commit_id,
            Role::SourceFile => self.source_file,
            Role::Arguments => self.arguments,
            Role::Function(kind) => match kind {
                FunctionKind::StdLib => self.function_std_lib,
                FunctionKind::StdLibExported => self.function_std_lib_exported,
                FunctionKind::Main => self.function_main,
                FunctionKind::Other => self.function_other,
                FunctionKind::OtherExported => self.function_other_exported,
            },
        }
    }

    /// One styled line; the selected row gets the highlight patched over every span.
    pub fn line<'a>(&self, frame: &'a AnnotatedFrame, selected: bool) -> Line<'a> {
        let spans: Vec<Span<'a>> = frame
            .segments
            .iter()
            .map(|Segment { text, role }| {
                let mut style = self.for_role(*role);
                if selected {
                    style = style.patch(self.highlight);
                }
                Span::styled(text.as_str(), style)
            })
            .collect();
        let line = Line::from(spans);
        if selected {
            line.style(self.highlight)
        } else {
            line
        }
    }
}

/// Parses words like `red`, `fg-white`, `bg-blue`, `bold`, separated by spaces or commas.
fn parse_style(spec: &str) -> Result<Style> {
    let mut style = Style::default();
    for word in spec
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|w| !w.is_empty())
    {
        let word = word.to_ascii_lowercase();
        style = match word.as_str() {
            "bold" => style.add_modifier(Modifier::BOLD),
            "italic" => style.add_modifier(Modifier::ITALIC),
            "underline" => style.add_modifier(Modifier::UNDERLINED),
            "dim" => style.add_modifier(Modifier::DIM),
            "reversed" => style.add_modifier(Modifier::REVERSED),
            other => {
                if let Some(color) = other.strip_prefix("bg-") {
                    style.bg(parse_color(color)?)
                } else {
                    let color = other.strip_prefix("fg-").unwrap_or(other);
                    style.fg(parse_color(color)?)
                }
            }
        };
    }
    Ok(style)
}

fn parse_color(name: &str) -> Result<Color> {
    match Color::from_str(name) {
        Ok(color) => Ok(color),
        Err(_) => bail!("unknown color {name:?}"),
    }
}

/// Draws the trace list, the commit pane and the message bar.
pub fn draw(frame: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(frame.area());
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(3, 4), Constraint::Ratio(1, 4)])
        .split(rows[0]);

    draw_trace(frame, app, columns[0]);
    draw_commit(frame, app, columns[1]);
    draw_messages(frame, app, rows[1]);
}

/// Rows available for frames in a terminal `height` rows tall
pub fn list_height(height: u16) -> usize {
    // the message bar and the list's top and bottom borders
    height.saturating_sub(3) as usize
}

fn draw_trace(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(app.title());

    let Some(loaded) = app.loaded() else {
        frame.render_widget(Paragraph::new("Loading...").block(block), area);
        return;
    };

    let lines: Vec<Line> = app
        .viewport()
        .visible(loaded.trace.frames())
        .map(|(f, selected)| app.styles().line(f, selected))
        .collect();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_commit(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title("Commit");
    let text = match app.loaded() {
        Some(loaded) => match app.selected_commit() {
            Some(commit) => app.format().commit_details(commit),
            None => app.format().commit_list(&loaded.dump.commits).join("\n"),
        },
        None => String::new(),
    };
    frame.render_widget(
        Paragraph::new(text).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

fn draw_messages(frame: &mut Frame, app: &App, area: Rect) {
    let messages = app.messages();
    let right = messages.text(Side::Right);
    let slots = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(right.chars().count() as u16),
        ])
        .split(area);
    frame.render_widget(
        Paragraph::new(messages.text(Side::Left)).alignment(Alignment::Left),
        slots[0],
    );
    frame.render_widget(Paragraph::new(right).alignment(Alignment::Right), slots[1]);
}

/// Writes the annotated trace followed by the commits, newest first.
pub fn print_plain<W: Write>(out: &mut W, trace: &AnnotatedTrace, dump: &Dump, format: &Format) -> Result<()> {
    for frame in trace.frames() {
        writeln!(out, "{}", frame.text())?;
    }
    if !dump.commits.is_empty() {
        writeln!(out)?;
        writeln!(out, "Commits:")?;
        for line in format.commit_list(&dump.commits) {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{commit_at, CommitStore, SourceLineKey};
    use crate::config::FormatConfig;
    use crate::stack::{bucketize, parse_dump, SAMPLE_DUMP};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn parses_styles() {
        assert_eq!(parse_style("").unwrap(), Style::default());
        assert_eq!(
            parse_style("red bold").unwrap(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        );
        assert_eq!(
            parse_style("fg-white,bg-blue").unwrap(),
            Style::default().fg(Color::White).bg(Color::Blue)
        );
        assert_eq!(
            parse_style("Italic  underline").unwrap(),
            Style::default().add_modifier(Modifier::ITALIC | Modifier::UNDERLINED)
        );
        assert!(parse_style("bg-nocolor").is_err());
    }

    #[test]
    fn default_palette_is_valid() {
        let styles = Styles::from_palette(&Palette::default()).unwrap();
        assert_eq!(
            styles.for_role(Role::Function(FunctionKind::Main)),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        );
        assert_eq!(styles.for_role(Role::Plain), Style::default());
    }

    #[test]
    fn bad_palette_names_the_entry() {
        let palette = Palette {
            routine: "purple-ish".into(),
            ..Default::default()
        };
        let err = Styles::from_palette(&palette).unwrap_err();
        assert_eq!(err.to_string(), "Invalid style for colors.routine");
    }

    #[test]
    fn selected_rows_are_highlighted() {
        let styles = Styles::from_palette(&Palette::default()).unwrap();
        let frame = AnnotatedFrame {
            segments: vec![
                Segment::plain("    {"),
                Segment::new("main.main", Role::Function(FunctionKind::Main)),
            ],
            origin: None,
            commit_id: None,
        };

        let plain = styles.line(&frame, false);
        assert_eq!(plain.spans[0].style, Style::default());
        assert_eq!(plain.spans[1].style.fg, Some(Color::Yellow));

        let selected = styles.line(&frame, true);
        assert_eq!(selected.spans[0].style.bg, Some(Color::Blue));
        assert_eq!(selected.spans[1].style.bg, Some(Color::Blue));
        assert_eq!(selected.spans[1].style.fg, Some(Color::Yellow));
    }

    #[test]
    fn prints_trace_and_commits() {
        let parsed = parse_dump(SAMPLE_DUMP.as_bytes()).unwrap();
        let mut commits = CommitStore::new();
        commits.add(
            SourceLineKey::new("/home/dev/app/main.go", 12, "HEAD"),
            commit_at("abcdef12", 1_600_000_000),
        );
        let dump = Dump {
            repository: PathBuf::from("/home/dev/app"),
            revision: "HEAD".to_string(),
            buckets: bucketize(&parsed.routines),
            commits,
            skipped: parsed.skipped,
        };
        let format = Format::compile(&FormatConfig::default()).unwrap();
        let trace = AnnotatedTrace::build(&dump, &format);

        let mut out = Vec::new();
        print_plain(&mut out, &trace, &dump, &format).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("panic: boom\n\nexit status 2\n\n1: running\n"));
        assert!(text.contains("    {2020-09-13 @ abcd} main.go:12   main.crash("));
        assert!(text.ends_with("\nCommits:\n[2020-09-13 12:26:40] abcdef12\n"));
    }

    #[test]
    fn no_commit_section_without_commits() {
        let parsed = parse_dump(SAMPLE_DUMP.as_bytes()).unwrap();
        let dump = Dump {
            repository: PathBuf::from("/home/dev/app"),
            revision: "HEAD".to_string(),
            buckets: bucketize(&parsed.routines),
            commits: CommitStore::new(),
            skipped: parsed.skipped,
        };
        let format = Format::compile(&FormatConfig::default()).unwrap();
        let trace = AnnotatedTrace::build(&dump, &format);

        let mut out = Vec::new();
        print_plain(&mut out, &trace, &dump, &format).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("Commits:"));
        assert!(text.ends_with("    (...)\n"));
    }
}
