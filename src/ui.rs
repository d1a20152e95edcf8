// src/ui.rs

use crate::analyzer::Dump;
use crate::format::{Format, Link};
use crate::messages::{MessageBox, MessageId, Side};
use crate::model::Commit;
use crate::renderer::{self, Styles};
use crate::trace::AnnotatedTrace;
use crate::viewport::Viewport;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::TryRecvError;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const STATUS_TICKS: i32 = 5;
const TICK: Duration = Duration::from_secs(1);

/// A processed dump and its display lines
pub struct Loaded {
    pub dump: Dump,
    pub trace: AnnotatedTrace,
}

/// Side effect requested by a key press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Copy(String),
    Open(Link, String),
}

pub struct App {
    format: Format,
    styles: Styles,
    loaded: Option<Loaded>,
    viewport: Viewport,
    messages: MessageBox,
    status: MessageId,
    quit: bool,
}

impl App {
    pub fn new(format: Format, styles: Styles, height: usize) -> Self {
        let mut messages = MessageBox::new();
        let status = messages.register("", STATUS_TICKS);
        let usage = messages.register(usage_hint(&format), -1);
        messages.post(usage, Side::Right);

        Self {
            format,
            styles,
            loaded: None,
            viewport: Viewport::new(0, height),
            messages,
            status,
            quit: false,
        }
    }

    /// Lays out `dump` and selects its first frame with a source file.
    pub fn load(&mut self, dump: Dump) {
        let trace = AnnotatedTrace::build(&dump, &self.format);
        info!(
            "Loaded {} lines with {} commits at {}",
            trace.len(),
            dump.commits.len(),
            dump.revision
        );
        self.viewport.reset(trace.len());
        self.viewport.select(trace.first_with_source());
        self.loaded = Some(Loaded { dump, trace });
    }

    pub fn loaded(&self) -> Option<&Loaded> {
        self.loaded.as_ref()
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn styles(&self) -> &Styles {
        &self.styles
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn messages(&self) -> &MessageBox {
        &self.messages
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn title(&self) -> String {
        match &self.loaded {
            Some(loaded) => format!(
                "{} @ {}",
                loaded.dump.repository.display(),
                short_revision(&loaded.dump.revision)
            ),
            None => "blame-trace".to_string(),
        }
    }

    pub fn resize(&mut self, height: usize) {
        self.viewport.set_height(height);
    }

    pub fn tick(&mut self) -> bool {
        self.messages.tick()
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.messages.show(self.status, text, Side::Left);
    }

    /// Commit of the selected frame, if it was blamed
    pub fn selected_commit(&self) -> Option<&Commit> {
        let loaded = self.loaded.as_ref()?;
        let frame = loaded.trace.get(self.viewport.selected()?)?;
        loaded.dump.commits.lookup_by_id(frame.commit_id.as_deref()?)
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.quit = true;
                return Action::None;
            }
            _ if self.loaded.is_none() => return Action::None,
            KeyCode::Char('j') | KeyCode::Down => self.viewport.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.viewport.select_previous(),
            KeyCode::PageDown => self.viewport.page_down(),
            KeyCode::PageUp => self.viewport.page_up(),
            KeyCode::Char('g') | KeyCode::Home => self.viewport.select_first(),
            KeyCode::Char('G') | KeyCode::End => self.viewport.select_last(),
            KeyCode::Char('m') => return self.message_action(),
            KeyCode::Char('c') => return self.link_action(Link::Commit),
            KeyCode::Char('f') => return self.link_action(Link::File),
            KeyCode::Char('b') => return self.link_action(Link::Blame),
            _ => {}
        }
        Action::None
    }

    fn message_action(&mut self) -> Action {
        let message = match (self.loaded.as_ref(), self.selected_commit()) {
            (Some(loaded), Some(commit)) => Some(self.format.message(&loaded.dump, commit)),
            _ => None,
        };
        match message {
            Some(text) => Action::Copy(text),
            None => {
                self.set_status("No commit for this line");
                Action::None
            }
        }
    }

    fn link_action(&mut self, link: Link) -> Action {
        if !self.format.has_link(link) {
            self.set_status(format!("No {} URL configured", link_name(link)));
            return Action::None;
        }
        let url = self
            .loaded
            .as_ref()
            .zip(self.viewport.selected())
            .and_then(|(loaded, idx)| loaded.trace.get(idx))
            .and_then(|frame| self.format.link(link, frame));
        match url {
            Some(url) => Action::Open(link, url),
            None => {
                self.set_status(format!("No {} for this line", link_name(link)));
                Action::None
            }
        }
    }

    /// Carries out `action` and reports the outcome in the status slot.
    fn perform(&mut self, action: Action) {
        match action {
            Action::None => {}
            Action::Copy(text) => match copy_to_clipboard(&text) {
                Ok(()) => self.set_status("Message copied"),
                Err(e) => {
                    warn!("Failed to copy message: {e:#}");
                    self.set_status("Failed to copy message");
                }
            },
            Action::Open(link, url) => match open_in_browser(&url) {
                Ok(()) => self.set_status(format!("Opened {}", link_name(link))),
                Err(e) => {
                    warn!("Failed to open {url}: {e:#}");
                    self.set_status(format!("Failed to open {}", link_name(link)));
                }
            },
        }
    }
}

fn link_name(link: Link) -> &'static str {
    match link {
        Link::Commit => "commit",
        Link::File => "file",
        Link::Blame => "blame",
    }
}

fn usage_hint(format: &Format) -> String {
    let mut keys = vec!["j/k move", "m message"];
    if format.has_link(Link::Commit) {
        keys.push("c commit");
    }
    if format.has_link(Link::File) {
        keys.push("f file");
    }
    if format.has_link(Link::Blame) {
        keys.push("b blame");
    }
    keys.push("q quit");
    keys.join("  ")
}

fn short_revision(revision: &str) -> &str {
    revision.get(..8).unwrap_or(revision)
}

/// Runs the interactive viewer while `process` produces the dump on a background thread.
///
/// A failure of `process` closes the viewer and is returned.
pub fn run<F>(format: Format, styles: Styles, process: F) -> Result<()>
where
    F: FnOnce() -> Result<Dump> + Send + 'static,
{
    let (send, recv) = crossbeam_channel::bounded(1);
    std::thread::Builder::new()
        .name("dump".to_string())
        .spawn(move || {
            let _ = send.send(process());
        })
        .context("Failed to start dump processing")?;

    let mut stdout = io::stdout();
    let mut mode = TerminalMode::enable()?;
    mode.enter_alternate_screen(&mut stdout)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let res = terminal
        .size()
        .context("terminal size")
        .and_then(|size| {
            let mut app = App::new(format, styles, renderer::list_height(size.height));
            run_loop(&mut terminal, &mut app, &recv)
        });

    drop(mode);
    terminal.show_cursor().ok();

    res
}

/// Raw mode and the alternate screen, undone on drop however setup or the viewer ends
struct TerminalMode {
    alternate_screen: bool,
}

impl TerminalMode {
    fn enable() -> Result<Self> {
        enable_raw_mode().context("enable raw mode")?;
        Ok(Self {
            alternate_screen: false,
        })
    }

    fn enter_alternate_screen<W: Write>(&mut self, out: &mut W) -> Result<()> {
        execute!(out, EnterAlternateScreen).context("enter alternate screen")?;
        self.alternate_screen = true;
        Ok(())
    }
}

impl Drop for TerminalMode {
    fn drop(&mut self) {
        disable_raw_mode().ok();
        if self.alternate_screen {
            execute!(io::stdout(), LeaveAlternateScreen).ok();
        }
    }
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    dump: &crossbeam_channel::Receiver<Result<Dump>>,
) -> Result<()> {
    let mut last_tick = Instant::now();
    let mut waiting = true;
    loop {
        if waiting {
            match dump.try_recv() {
                Ok(result) => {
                    app.load(result?);
                    waiting = false;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    return Err(anyhow!("Dump processing stopped unexpectedly"));
                }
            }
        }

        terminal
            .draw(|f| renderer::draw(f, app))
            .context("draw")?;
        if app.should_quit() {
            return Ok(());
        }

        if event::poll(Duration::from_millis(50)).context("poll")? {
            match event::read().context("read event")? {
                Event::Key(k) if k.kind == KeyEventKind::Press => {
                    let action = app.handle_key(k);
                    app.perform(action);
                }
                Event::Resize(_, height) => app.resize(renderer::list_height(height)),
                _ => {}
            }
        }

        if last_tick.elapsed() >= TICK {
            app.tick();
            last_tick = Instant::now();
        }
    }
}

fn copy_to_clipboard(text: &str) -> Result<()> {
    let (cmd, args): (&str, Vec<&str>) = if cfg!(target_os = "macos") {
        ("pbcopy", vec![])
    } else if cfg!(target_os = "windows") {
        ("clip", vec![])
    } else if Command::new("which")
        .arg("xclip")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
    {
        ("xclip", vec!["-selection", "clipboard"])
    } else {
        ("xsel", vec!["--clipboard", "--input"])
    };
    debug!("Copying {} bytes with {cmd}", text.len());

    let mut child = Command::new(cmd)
        .args(&args)
        .stdin(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to run {cmd}"))?;
    if let Some(stdin) = child.stdin.as_mut() {
        stdin.write_all(text.as_bytes())?;
    }
    // close stdin so the command sees the end of input
    drop(child.stdin.take());

    let status = child.wait().with_context(|| format!("{cmd} failed"))?;
    if !status.success() {
        return Err(anyhow!("{cmd} exited with {status}"));
    }
    Ok(())
}

fn open_in_browser(url: &str) -> Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else {
        Command::new("xdg-open")
    };
    debug!("Opening {url}");
    command
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("Failed to start the browser")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FormatConfig, Palette};
    use crate::model::{commit_at, CommitStore, SourceLineKey};
    use crate::stack::{bucketize, parse_dump, SAMPLE_DUMP};
    use crossterm::event::KeyModifiers;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn sample_dump() -> Dump {
        let parsed = parse_dump(SAMPLE_DUMP.as_bytes()).unwrap();
        let mut commits = CommitStore::new();
        commits.add(
            SourceLineKey::new("/home/dev/app/main.go", 12, "0123456789ab"),
            commit_at("abcdef12", 1_600_000_000),
        );
        Dump {
            repository: PathBuf::from("/home/dev/app"),
            revision: "0123456789ab".to_string(),
            buckets: bucketize(&parsed.routines),
            commits,
            skipped: parsed.skipped,
        }
    }

    fn app_with(cfg: FormatConfig) -> App {
        let format = Format::compile(&cfg).unwrap();
        let styles = Styles::from_palette(&Palette::default()).unwrap();
        App::new(format, styles, 5)
    }

    fn loaded_app(cfg: FormatConfig) -> App {
        let mut app = app_with(cfg);
        app.load(sample_dump());
        app
    }

    #[test]
    fn starts_on_first_frame_with_source() {
        let app = loaded_app(FormatConfig::default());
        assert_eq!(app.viewport().selected(), Some(5));
        assert_eq!(app.selected_commit().unwrap().id, "abcdef12");
        assert_eq!(app.title(), "/home/dev/app @ 01234567");
    }

    #[test]
    fn usage_hint_is_persistent() {
        let mut app = app_with(FormatConfig {
            blame_url: Some("https://x/{file}".into()),
            ..Default::default()
        });
        assert_eq!(app.messages().text(Side::Right), "j/k move  m message  b blame  q quit");
        for _ in 0..100 {
            app.tick();
        }
        assert_eq!(app.messages().text(Side::Right), "j/k move  m message  b blame  q quit");
    }

    #[test]
    fn navigation_keys_move_the_selection() {
        let mut app = loaded_app(FormatConfig::default());
        let len = app.loaded().unwrap().trace.len();

        app.handle_key(key(KeyCode::Char('j')));
        assert_eq!(app.viewport().selected(), Some(6));
        app.handle_key(key(KeyCode::Up));
        app.handle_key(key(KeyCode::Char('k')));
        assert_eq!(app.viewport().selected(), Some(4));
        app.handle_key(key(KeyCode::Char('G')));
        assert_eq!(app.viewport().selected(), Some(len - 1));
        app.handle_key(key(KeyCode::Home));
        assert_eq!(app.viewport().selected(), Some(0));
        app.handle_key(key(KeyCode::PageDown));
        assert_eq!(app.viewport().selected(), Some(5));
        assert!(!app.should_quit());

        app.handle_key(key(KeyCode::Esc));
        assert!(app.should_quit());
    }

    #[test]
    fn keys_before_loading_only_quit() {
        let mut app = app_with(FormatConfig::default());
        assert_eq!(app.handle_key(key(KeyCode::Char('j'))), Action::None);
        assert_eq!(app.viewport().selected(), None);
        assert_eq!(app.handle_key(key(KeyCode::Char('m'))), Action::None);
        app.handle_key(key(KeyCode::Char('q')));
        assert!(app.should_quit());
    }

    #[test]
    fn message_key_copies_for_blamed_lines() {
        let mut app = loaded_app(FormatConfig {
            custom_message: Some("{author}: {id}".into()),
            ..Default::default()
        });
        assert_eq!(
            app.handle_key(key(KeyCode::Char('m'))),
            Action::Copy("Grace Hopper: abcdef12".to_string())
        );

        app.handle_key(key(KeyCode::Char('j')));
        assert_eq!(app.handle_key(key(KeyCode::Char('m'))), Action::None);
        assert_eq!(app.messages().text(Side::Left), "No commit for this line");
    }

    #[test]
    fn link_keys_need_a_template_and_a_target() {
        let mut app = loaded_app(FormatConfig {
            commit_url: Some("https://git.example.com/commit/{commit}".into()),
            file_url: Some("https://git.example.com/tree/{head}/{file}#L{line}".into()),
            ..Default::default()
        });

        assert_eq!(
            app.handle_key(key(KeyCode::Char('c'))),
            Action::Open(Link::Commit, "https://git.example.com/commit/abcdef12".to_string())
        );
        assert_eq!(
            app.handle_key(key(KeyCode::Char('f'))),
            Action::Open(
                Link::File,
                "https://git.example.com/tree/0123456789ab/main.go#L12".to_string()
            )
        );

        assert_eq!(app.handle_key(key(KeyCode::Char('b'))), Action::None);
        assert_eq!(app.messages().text(Side::Left), "No blame URL configured");

        // main.main was not blamed
        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.handle_key(key(KeyCode::Char('c'))), Action::None);
        assert_eq!(app.messages().text(Side::Left), "No commit for this line");
    }

    #[test]
    fn status_expires() {
        let mut app = loaded_app(FormatConfig::default());
        app.set_status("hello");
        for _ in 1..STATUS_TICKS {
            app.tick();
        }
        assert_eq!(app.messages().text(Side::Left), "hello");
        assert!(app.tick());
        assert_eq!(app.messages().text(Side::Left), "");
    }

    struct BrokenTerminal;

    impl Write for BrokenTerminal {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn failed_setup_leaves_raw_mode() {
        // without a terminal there is no raw mode to leave
        let Ok(mut mode) = TerminalMode::enable() else {
            return;
        };
        assert!(mode.enter_alternate_screen(&mut BrokenTerminal).is_err());
        assert!(!mode.alternate_screen);
        drop(mode);
        assert!(!crossterm::terminal::is_raw_mode_enabled().unwrap());
    }

    #[test]
    fn resize_keeps_the_selection_visible() {
        let mut app = loaded_app(FormatConfig::default());
        app.handle_key(key(KeyCode::Char('G')));
        app.resize(2);
        let vp = app.viewport();
        let sel = vp.selected().unwrap();
        assert!(vp.scroll() <= sel && sel < vp.scroll() + vp.height());
    }
}
