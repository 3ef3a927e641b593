use crate::collection::{ImageId, Rating};
use crate::export::FsCopier;
use crate::filter::FilterPredicate;
use crate::import::{ImportOutcome, ImportPolicy, MergeChoice, MergePrompt};
use crate::session::{Session, SessionOptions, ThumbState};
use crate::thumbnail::{CacheLimits, FastResizeDecoder, SizeClass};
use crate::ui;
use crate::utils::{self, IMAGE_EXTENSIONS};
use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use dialoguer::{theme::ColorfulTheme, Select};
use image::DynamicImage;
use ratatui::{backend::CrosstermBackend, layout::Rect, widgets::ListState, Terminal};
use ratatui_image::{picker::Picker, protocol::StatefulProtocol};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub directory: PathBuf,
    pub recursive: bool,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Carousel thumbnail size in pixels (slider position)
    pub size: u32,
    pub min_size: u32,
    pub max_size: u32,
    /// Slider step for `+`/`-`
    pub size_step: u32,
    /// Rated panel thumbnail size
    pub rated_size: u32,
    pub page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_bytes: usize,
    /// How long a failed decode is remembered
    pub negative_ttl_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FilterConfig {
    pub default: FilterPredicate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// "dark" or "light"
    pub theme: String,
    /// Delay before a thumbnail size change is applied
    pub resize_debounce_ms: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            directory: dirs::picture_dir().unwrap_or_else(|| PathBuf::from("~/Pictures")),
            recursive: false,
            extensions: IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        let session = SessionOptions::default();
        Self {
            size: session.thumbnail_size,
            min_size: session.min_thumbnail_size,
            max_size: session.max_thumbnail_size,
            size_step: 10,
            rated_size: session.rated_size,
            page_size: session.page_size,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let limits = CacheLimits::default();
        Self {
            max_entries: limits.max_entries,
            max_bytes: limits.max_bytes,
            negative_ttl_ms: limits.negative_ttl.as_millis() as u64,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            resize_debounce_ms: 150,
        }
    }
}

impl Config {
    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "starsort", "starsort")
    }

    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Where the TUI writes its log, since it owns the terminal.
    pub fn log_path() -> PathBuf {
        Self::project_dirs()
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(std::env::temp_dir)
            .join("starsort.log")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::from_toml(&data).with_context(|| format!("Invalid config {}", path.display()))
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        fs::write(&path, self.to_toml()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            page_size: self.thumbnails.page_size,
            thumbnail_size: self.thumbnails.size,
            min_thumbnail_size: self.thumbnails.min_size,
            max_thumbnail_size: self.thumbnails.max_size,
            rated_size: self.thumbnails.rated_size,
            filter: self.filter.default,
            cache: CacheLimits {
                max_entries: self.cache.max_entries,
                max_bytes: self.cache.max_bytes,
                negative_ttl: Duration::from_millis(self.cache.negative_ttl_ms),
            },
        }
    }
}

/// A parsed `:` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Import { dir: PathBuf, policy: ImportPolicy },
    Export(PathBuf),
    Filter(FilterPredicate),
    /// 1-based position in the collection
    Go(usize),
    Page(usize),
    Size(u32),
    Cancel,
    Reset,
    Help,
    Quit,
}

/// Parse the command line buffer. `Ok(None)` for a blank line.
pub fn parse_command(input: &str) -> Result<Option<Command>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    let (command, args) = match input.split_once(char::is_whitespace) {
        Some((c, a)) => (c.to_lowercase(), a.trim()),
        None => (input.to_lowercase(), ""),
    };

    let dir = |what: &str| -> Result<PathBuf, String> {
        if args.is_empty() {
            Err(format!("Usage: {} <directory>", what))
        } else {
            Ok(utils::expand_tilde(args))
        }
    };

    let cmd = match command.as_str() {
        "q" | "quit" | "exit" => Command::Quit,
        "h" | "help" => Command::Help,
        "o" | "open" => Command::Import { dir: dir("open")?, policy: ImportPolicy::Ask },
        "a" | "add" => Command::Import { dir: dir("add")?, policy: ImportPolicy::Merge },
        "n" | "new" => Command::Import { dir: dir("new")?, policy: ImportPolicy::Replace },
        "e" | "export" => Command::Export(dir("export")?),
        "f" | "filter" => {
            let text = if args.is_empty() { "all" } else { args };
            Command::Filter(text.parse().map_err(|e| format!("filter: {}", e))?)
        }
        "g" | "go" => match args.parse::<usize>() {
            Ok(n) if n > 0 => Command::Go(n),
            _ => return Err("Usage: go <n> (1-based)".to_string()),
        },
        "page" => match args.parse::<usize>() {
            Ok(n) if n > 0 => Command::Page(n),
            _ => return Err("Usage: page <size>".to_string()),
        },
        "size" => match args.parse::<u32>() {
            Ok(n) => Command::Size(n),
            Err(_) => return Err("Usage: size <px>".to_string()),
        },
        "cancel" => Command::Cancel,
        "reset" => Command::Reset,
        _ => return Err(format!("Unknown command: {}", command)),
    };

    Ok(Some(cmd))
}

/// Asks "add or start a new set" on the plain terminal.
///
/// The TUI is suspended for the duration of the question and the input
/// thread is paused so it does not swallow the answer.
struct DialoguerPrompt {
    input_paused: Arc<AtomicBool>,
    suspended: bool,
}

impl DialoguerPrompt {
    fn new(input_paused: Arc<AtomicBool>) -> Self {
        Self { input_paused, suspended: false }
    }

    fn ask(&mut self, current: usize, incoming: usize) -> Result<MergeChoice> {
        self.input_paused.store(true, Ordering::SeqCst);
        // let an in-flight poll in the input thread run out
        thread::sleep(Duration::from_millis(60));

        disable_raw_mode()?;
        execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture)?;
        self.suspended = true;

        let prompt = format!(
            "{} images are loaded and {} were found. What now?",
            current, incoming
        );
        let choice = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(&["Add to current set", "Start a new set", "Cancel"])
            .default(0)
            .interact_opt()?;

        Ok(match choice {
            Some(0) => MergeChoice::Add,
            Some(1) => MergeChoice::NewSet,
            _ => MergeChoice::Cancel,
        })
    }

    fn restore(&mut self) -> Result<()> {
        if self.suspended {
            enable_raw_mode()?;
            execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture)?;
            self.suspended = false;
        }
        self.input_paused.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl MergePrompt for DialoguerPrompt {
    fn ask_merge_policy(&mut self, current: usize, incoming: usize) -> MergeChoice {
        let choice = self.ask(current, incoming).unwrap_or_else(|e| {
            warn!("merge prompt failed: {}", e);
            MergeChoice::Cancel
        });
        if let Err(e) = self.restore() {
            warn!("failed to restore terminal: {}", e);
        }
        choice
    }
}

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Tick,
}

/// Maximum number of image protocols to keep in memory
/// Kitty graphics protocol can get confused with too many images
const MAX_PROTOCOL_CACHE: usize = 20;

/// Terminal cell size assumed when mapping panes to pixels
pub const CELL_PX: (u32, u32) = (8, 16);

type ProtocolKey = (ImageId, SizeClass);

/// What the renderer can draw for one thumbnail slot.
pub enum Thumb<'a> {
    Image(&'a mut Box<dyn StatefulProtocol>),
    Loading,
    Failed,
    /// No image protocol available
    Text,
}

pub struct App {
    pub session: Session,
    pub config: Config,
    pub should_quit: bool,
    pub image_picker: Option<Picker>,
    protocols: HashMap<ProtocolKey, Box<dyn StatefulProtocol>>,
    /// Order of protocol entries for LRU eviction
    protocol_order: Vec<ProtocolKey>,
    /// Show help popup
    pub show_help: bool,
    /// Command mode (vim-style :)
    pub command_mode: bool,
    pub command_buffer: String,
    /// Last error message (for UI display)
    pub last_error: Option<String>,
    /// Last informational message
    pub status: Option<String>,
    /// Set while a prompt owns the terminal
    input_paused: Arc<AtomicBool>,
    /// Force a full redraw on the next frame
    pub needs_clear: bool,
    /// Slider value not yet applied, with the time of the last change
    pending_size: Option<(u32, Instant)>,
    /// Page list geometry from the last frame, for mouse selection
    pub list_area: Rect,
    pub list_state: ListState,
}

impl App {
    pub fn new(config: Config) -> Self {
        let session = Session::new(Arc::new(FastResizeDecoder), config.session_options());

        // from_termios() queries terminal for font size, guess_protocol()
        // picks the best graphics protocol (Kitty, Sixel, halfblocks)
        let image_picker = Picker::from_termios()
            .ok()
            .map(|mut p| {
                p.guess_protocol();
                p
            })
            .or_else(|| Some(Picker::new((8, 16))));

        Self {
            session,
            config,
            should_quit: false,
            image_picker,
            protocols: HashMap::new(),
            protocol_order: Vec::new(),
            show_help: false,
            command_mode: false,
            command_buffer: String::new(),
            last_error: None,
            status: None,
            input_paused: Arc::new(AtomicBool::new(false)),
            needs_clear: false,
            pending_size: None,
            list_area: Rect::default(),
            list_state: ListState::default(),
        }
    }

    // ===== Collection =====

    pub fn open_dir(&mut self, dir: &Path, policy: ImportPolicy) -> Result<()> {
        let mut prompt = DialoguerPrompt::new(Arc::clone(&self.input_paused));
        let outcome = self.session.import_dir(
            dir,
            self.config.library.recursive,
            &self.config.library.extensions,
            policy,
            &mut prompt,
        );
        if policy == ImportPolicy::Ask {
            self.needs_clear = true;
        }

        let outcome = outcome?;
        if outcome.changed_store() {
            self.config.library.directory = dir.to_path_buf();
        }
        self.status = Some(match outcome {
            ImportOutcome::Replaced { added } => {
                format!("New set: {} images from {}", added, dir.display())
            }
            ImportOutcome::Merged { added } => {
                format!("Added {} images from {}", added, dir.display())
            }
            ImportOutcome::Cancelled => "Import cancelled".to_string(),
            ImportOutcome::Empty => format!("No images in {}", dir.display()),
        });
        Ok(())
    }

    pub fn rate(&mut self, stars: u8) {
        let Some(rating) = Rating::new(stars) else {
            return;
        };
        match self.session.rate(rating) {
            Ok(true) => self.last_error = None,
            Ok(false) => self.status = Some("Nothing selected".to_string()),
            Err(e) => self.last_error = Some(format!("{}", e)),
        }
    }

    pub fn export(&mut self, dir: &Path) {
        let report = self.session.export(dir, &FsCopier);
        if report.is_complete() {
            self.status = Some(format!("Exported {} files to {}", report.copied, dir.display()));
        } else {
            self.last_error = Some(format!(
                "Exported {} of {} files, {} failed (see log)",
                report.copied,
                report.attempted(),
                report.failure_count()
            ));
        }
    }

    pub fn reset(&mut self) {
        self.session.reset();
        self.clear_protocols();
        self.list_state = ListState::default();
        self.status = Some("Collection cleared".to_string());
    }

    pub fn cycle_filter(&mut self) {
        let filter = self.session.cycle_filter();
        self.status = Some(format!("Filter: {}", filter));
    }

    // ===== Thumbnail slider =====

    /// Nudge the slider by `steps`; applied after the debounce delay.
    pub fn nudge_thumbnail_size(&mut self, steps: i32) {
        let (min, max) = self.session.thumbnail_range();
        let base = self
            .pending_size
            .map(|(px, _)| px)
            .unwrap_or_else(|| self.session.thumbnail_size().px());
        let step = self.config.thumbnails.size_step.max(1) as i64;
        let next = (base as i64 + step * steps as i64).clamp(min as i64, max as i64) as u32;
        self.pending_size = Some((next, Instant::now()));
    }

    /// Slider value as displayed, including a pending change.
    pub fn slider_size(&self) -> u32 {
        self.pending_size
            .map(|(px, _)| px)
            .unwrap_or_else(|| self.session.thumbnail_size().px())
    }

    fn apply_pending_size(&mut self, force: bool) {
        let debounce = Duration::from_millis(self.config.ui.resize_debounce_ms);
        if let Some((px, changed)) = self.pending_size {
            if force || changed.elapsed() >= debounce {
                self.pending_size = None;
                let size = self.session.set_thumbnail_size(px);
                self.config.thumbnails.size = size.px();
            }
        }
    }

    // ===== Image protocols =====

    /// Fetch (or build) the protocol for `id` at `size`; also updates LRU order.
    pub fn thumb(&mut self, id: &ImageId, size: SizeClass) -> Thumb<'_> {
        let key = (id.clone(), size);

        if self.protocols.contains_key(&key) {
            // Move to end of LRU order (most recently used)
            if let Some(pos) = self.protocol_order.iter().position(|k| *k == key) {
                let k = self.protocol_order.remove(pos);
                self.protocol_order.push(k);
            }
        } else {
            match self.session.thumbnail(id, size) {
                ThumbState::Ready(entry) => {
                    let Some(picker) = self.image_picker.as_mut() else {
                        return Thumb::Text;
                    };
                    while self.protocols.len() >= MAX_PROTOCOL_CACHE {
                        if self.protocol_order.is_empty() {
                            break;
                        }
                        let oldest = self.protocol_order.remove(0);
                        self.protocols.remove(&oldest);
                    }
                    let image = DynamicImage::ImageRgba8((*entry.raster).clone());
                    self.protocols.insert(key.clone(), picker.new_resize_protocol(image));
                    self.protocol_order.push(key.clone());
                }
                ThumbState::Pending => return Thumb::Loading,
                ThumbState::Failed(_) => return Thumb::Failed,
            }
        }

        match self.protocols.get_mut(&key) {
            Some(protocol) => Thumb::Image(protocol),
            None => Thumb::Loading,
        }
    }

    fn clear_protocols(&mut self) {
        self.protocols.clear();
        self.protocol_order.clear();
    }

    /// Record the preview pane size so decodes target the right class.
    pub fn set_preview_area(&mut self, area: Rect) {
        self.session
            .set_viewport(area.width as u32 * CELL_PX.0, area.height as u32 * CELL_PX.1);
    }

    // ===== Command Mode (vim-style :) =====

    /// Enter command mode
    pub fn enter_command_mode(&mut self) {
        self.command_mode = true;
        self.command_buffer.clear();
    }

    /// Exit command mode without executing
    pub fn exit_command_mode(&mut self) {
        self.command_mode = false;
        self.command_buffer.clear();
    }

    pub fn command_input(&mut self, c: char) {
        self.command_buffer.push(c);
    }

    pub fn command_backspace(&mut self) {
        self.command_buffer.pop();
    }

    /// Execute the current command
    pub fn execute_command(&mut self) {
        let input = std::mem::take(&mut self.command_buffer);
        self.command_mode = false;

        let cmd = match parse_command(&input) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => return,
            Err(e) => {
                self.last_error = Some(e);
                return;
            }
        };

        self.last_error = None;
        match cmd {
            Command::Quit => self.should_quit = true,
            Command::Help => self.show_help = true,
            Command::Import { dir, policy } => {
                if let Err(e) = self.open_dir(&dir, policy) {
                    self.last_error = Some(format!("{:#}", e));
                }
            }
            Command::Export(dir) => self.export(&dir),
            Command::Filter(predicate) => {
                self.session.set_filter(predicate);
                self.config.filter.default = predicate;
                self.status = Some(format!("Filter: {}", predicate));
            }
            Command::Go(n) => self.select(n - 1),
            Command::Page(size) => {
                self.session.set_page_size(size);
                self.config.thumbnails.page_size = size;
            }
            Command::Size(px) => {
                self.pending_size = Some((px, Instant::now()));
                self.apply_pending_size(true);
            }
            Command::Cancel => {
                self.session.cancel_import();
                self.status = Some("Import cancelled".to_string());
            }
            Command::Reset => self.reset(),
        }
    }

    // ===== Input =====

    /// Jump to `index`, reporting an out-of-range target.
    fn select(&mut self, index: usize) {
        match self.session.select(index) {
            Ok(()) => self.last_error = None,
            Err(e) => self.last_error = Some(format!("{}", e)),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        // Handle help popup first (blocks other input)
        if self.show_help {
            if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc | KeyCode::Enter) {
                self.show_help = false;
            }
            return;
        }

        if self.command_mode {
            match key.code {
                KeyCode::Esc => self.exit_command_mode(),
                KeyCode::Enter => self.execute_command(),
                KeyCode::Backspace => self.command_backspace(),
                KeyCode::Char(c) => self.command_input(c),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char(c @ '1'..='5') => self.rate(c as u8 - b'0'),
            KeyCode::Char(' ') => {
                self.session.skip();
            }
            KeyCode::Down | KeyCode::Right | KeyCode::Char('j') | KeyCode::Char('l') => {
                self.session.move_by(1);
            }
            KeyCode::Up | KeyCode::Left | KeyCode::Char('k') | KeyCode::Char('h') => {
                self.session.move_by(-1);
            }
            KeyCode::PageDown => {
                self.session.page_step(1);
            }
            KeyCode::PageUp => {
                self.session.page_step(-1);
            }
            KeyCode::Home if !self.session.is_empty() => self.select(0),
            KeyCode::End if !self.session.is_empty() => self.select(self.session.len() - 1),
            KeyCode::Char('f') => self.cycle_filter(),
            KeyCode::Char('+') | KeyCode::Char('=') => self.nudge_thumbnail_size(1),
            KeyCode::Char('-') => self.nudge_thumbnail_size(-1),
            KeyCode::Char(':') => self.enter_command_mode(),
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Char('x') => self.session.cancel_import(),
            _ => {}
        }
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.show_help || self.command_mode {
            return;
        }
        match mouse.kind {
            MouseEventKind::ScrollDown => {
                self.session.move_by(1);
            }
            MouseEventKind::ScrollUp => {
                self.session.move_by(-1);
            }
            MouseEventKind::Down(MouseButton::Left) => {
                let area = self.list_area;
                let inside = mouse.column >= area.x
                    && mouse.column < area.x + area.width
                    && mouse.row >= area.y
                    && mouse.row < area.y + area.height;
                if inside {
                    let (start, _) = self.session.window();
                    let row = (mouse.row - area.y) as usize;
                    let index = start + self.list_state.offset() + row;
                    self.select(index);
                }
            }
            _ => {}
        }
    }

    /// Periodic work: import progress, finished decodes, slider debounce.
    /// Returns true when something on screen changed.
    pub fn tick(&mut self) -> bool {
        let was_running = self.session.import_status().is_some_and(|s| !s.finished);
        let mut changed = false;

        if let Some(status) = self.session.poll_import() {
            changed |= was_running;
            if was_running
                && status.finished
                && status.progress.soft_failures > 0
                && self.last_error.is_none()
            {
                self.last_error = Some(format!(
                    "{} of {} images could not be decoded",
                    status.progress.soft_failures, status.progress.total
                ));
            }
        }
        changed |= self.session.poll_thumbnails() > 0;

        let pending = self.pending_size.is_some();
        self.apply_pending_size(false);
        changed |= pending;
        changed
    }
}

pub fn run_tui(config: Config, dir: Option<PathBuf>) -> Result<()> {
    let mut app = App::new(config);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (event_tx, event_rx) = mpsc::channel::<AppEvent>();

    // Spawn event polling thread
    let paused = Arc::clone(&app.input_paused);
    thread::spawn(move || {
        input_worker(event_tx, paused);
    });

    if let Some(dir) = dir {
        if let Err(e) = app.open_dir(&dir, ImportPolicy::Ask) {
            app.last_error = Some(format!("{:#}", e));
        }
    }

    let res = run_app(&mut terminal, &mut app, event_rx);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    app.apply_pending_size(true);
    app.config.save()?;
    info!(
        "session closed: {} images, {} rated",
        app.session.len(),
        app.session.store().rated_count()
    );

    res
}

/// Background thread that polls for input events
fn input_worker(tx: Sender<AppEvent>, paused: Arc<AtomicBool>) {
    loop {
        if paused.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(50));
            continue;
        }
        if event::poll(Duration::from_millis(50)).unwrap_or(false) {
            let sent = match event::read() {
                Ok(Event::Key(key)) => tx.send(AppEvent::Key(key)),
                Ok(Event::Mouse(mouse)) => tx.send(AppEvent::Mouse(mouse)),
                Ok(Event::Resize(..)) => tx.send(AppEvent::Tick),
                _ => Ok(()),
            };
            if sent.is_err() {
                break;
            }
        } else if tx.send(AppEvent::Tick).is_err() {
            break;
        }
    }
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    event_rx: Receiver<AppEvent>,
) -> Result<()> {
    let mut needs_redraw = true;

    loop {
        if app.needs_clear {
            terminal.clear()?;
            app.needs_clear = false;
            needs_redraw = true;
        }

        // Only redraw when needed (event received or state changed)
        if needs_redraw {
            app.session.begin_frame();
            terminal.draw(|f| ui::draw(f, app))?;
            app.session.end_frame();
            needs_redraw = false;
        }

        let events: Vec<AppEvent> = match event_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                let mut events = vec![event];
                while let Ok(e) = event_rx.try_recv() {
                    events.push(e);
                }
                events
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        };

        for event in events {
            match event {
                AppEvent::Key(key) => {
                    app.handle_key(key);
                    needs_redraw = true;
                }
                AppEvent::Mouse(mouse) => {
                    app.handle_mouse(mouse);
                    needs_redraw = true;
                }
                AppEvent::Tick => {
                    needs_redraw |= app.tick();
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
