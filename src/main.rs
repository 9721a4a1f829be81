pub mod clock;
pub mod config;
pub mod locator;
pub mod race;
pub mod runtime;
pub mod ui;
pub mod wiki;

use crate::{
    config::{Config, ConfigStore, FileConfigStore},
    locator::PageRef,
    race::{FetchTicket, NavDirective, Race, RaceConfig, TickUpdate, DEFAULT_COUNTDOWN},
    runtime::{
        CrosstermEventSource, FixedTicker, RaceEnd, Runner, RushEvent, RushEventSource, Ticker,
    },
    wiki::{FetchError, PageFetcher, WikiPage, WikipediaClient},
};
use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    error::Error,
    io::{self, stdin},
    sync::{mpsc::Sender, Arc},
    thread,
    time::{Duration, Instant},
};
use webbrowser::Browser;

/// race across wikipedia from a start page to a target page in the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal Wikipedia race: start on one page, reach the target by following only in-page links. The clock starts after a short countdown and stops while pages load."
)]
pub struct Cli {
    /// start page: full URL, /wiki/ path, or a bare article title
    #[clap(short = 'f', long)]
    from: Option<String>,

    /// target page: full URL, /wiki/ path, or a bare article title
    #[clap(short = 't', long)]
    to: Option<String>,

    /// pick a random start page
    #[clap(long)]
    random_from: bool,

    /// pick a random target page
    #[clap(long)]
    random_to: bool,

    /// wiki to race on
    #[clap(short = 'w', long, value_enum)]
    wiki: Option<SupportedWiki>,

    /// countdown seconds before the clock starts
    #[clap(short = 'c', long)]
    countdown_secs: Option<u64>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, strum_macros::Display)]
pub enum SupportedWiki {
    English,
    Simple,
    German,
    French,
    Spanish,
    Italian,
}

impl SupportedWiki {
    pub fn host(&self) -> &'static str {
        match self {
            SupportedWiki::English => "en.wikipedia.org",
            SupportedWiki::Simple => "simple.wikipedia.org",
            SupportedWiki::German => "de.wikipedia.org",
            SupportedWiki::French => "fr.wikipedia.org",
            SupportedWiki::Spanish => "es.wikipedia.org",
            SupportedWiki::Italian => "it.wikipedia.org",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        SupportedWiki::value_variants()
            .iter()
            .copied()
            .find(|w| w.to_string().eq_ignore_ascii_case(name))
    }
}

impl Cli {
    /// Resolves CLI arguments against the saved preferences.
    fn effective_settings(&self, saved: &Config) -> (SupportedWiki, Duration) {
        let wiki = self
            .wiki
            .or_else(|| SupportedWiki::from_name(&saved.wiki))
            .unwrap_or(SupportedWiki::English);
        let countdown = self
            .countdown_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| {
                if saved.countdown_secs > 0 {
                    Duration::from_secs(saved.countdown_secs)
                } else {
                    DEFAULT_COUNTDOWN
                }
            });
        (wiki, countdown)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppState {
    Menu,
    Racing,
    Results,
}

/// Menu screen state: the two locator inputs and their focus.
#[derive(Debug, Default)]
pub struct MenuState {
    pub from_input: String,
    pub to_input: String,
    pub focus_target: bool,
    pub error: Option<String>,
    pub randomizing_from: bool,
    pub randomizing_to: bool,
}

impl MenuState {
    fn focused(&self) -> RaceEnd {
        if self.focus_target {
            RaceEnd::Target
        } else {
            RaceEnd::Start
        }
    }

    fn focused_input_mut(&mut self) -> &mut String {
        if self.focus_target {
            &mut self.to_input
        } else {
            &mut self.from_input
        }
    }
}

/// Link-list selection on the race screen.
#[derive(Debug, Default)]
pub struct LinkList {
    pub filter: String,
    pub selected: usize,
}

impl LinkList {
    fn reset(&mut self) {
        self.filter.clear();
        self.selected = 0;
    }
}

pub struct App {
    pub fetcher: Arc<dyn PageFetcher>,
    pub tx: Sender<RushEvent>,
    pub state: AppState,
    pub menu: MenuState,
    pub race: Option<Race>,
    pub links: LinkList,
    /// Last countdown/elapsed string pushed by a tick; frozen while loading.
    pub timer_text: String,
    pub wiki: SupportedWiki,
    pub countdown: Duration,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        cli: &Cli,
        saved: &Config,
        fetcher: Arc<dyn PageFetcher>,
        tx: Sender<RushEvent>,
    ) -> Self {
        let (wiki, countdown) = cli.effective_settings(saved);
        let mut app = Self {
            fetcher,
            tx,
            state: AppState::Menu,
            menu: MenuState {
                from_input: cli.from.clone().unwrap_or_default(),
                to_input: cli.to.clone().unwrap_or_default(),
                ..MenuState::default()
            },
            race: None,
            links: LinkList::default(),
            timer_text: String::new(),
            wiki,
            countdown,
            should_quit: false,
        };

        if cli.random_from {
            app.spawn_random(RaceEnd::Start);
        }
        if cli.random_to {
            app.spawn_random(RaceEnd::Target);
        }
        app
    }

    pub fn host(&self) -> &'static str {
        self.wiki.host()
    }

    /// Article names on the current page matching the link filter.
    pub fn filtered_links(&self) -> Vec<&str> {
        let Some(page) = self.race.as_ref().and_then(|r| r.current()) else {
            return Vec::new();
        };
        let needle = self.links.filter.to_lowercase();
        page.links
            .iter()
            .filter(|name| needle.is_empty() || name.to_lowercase().contains(&needle))
            .map(String::as_str)
            .collect()
    }

    /// Validates the menu inputs and kicks off a fresh race session.
    pub fn start_race(&mut self, now: Instant) {
        let start = match PageRef::parse(&self.menu.from_input, self.host()) {
            Ok(page) => page,
            Err(e) => {
                self.menu.error = Some(format!("start page: {}", e));
                return;
            }
        };
        let target = match PageRef::parse(&self.menu.to_input, self.host()) {
            Ok(page) => page,
            Err(e) => {
                self.menu.error = Some(format!("target page: {}", e));
                return;
            }
        };

        self.menu.error = None;
        self.links.reset();
        // seed the display so the first frame never shows a blank countdown
        self.timer_text = self.countdown.as_secs().to_string();
        self.race = Some(Race::new(RaceConfig { start, target }, self.countdown, now));
        self.state = AppState::Racing;
    }

    /// Drops the live session and returns to the menu. Any fetch still in
    /// flight resolves into a stale generation and gets discarded.
    pub fn reset_to_menu(&mut self) {
        self.race = None;
        self.links.reset();
        self.timer_text.clear();
        self.state = AppState::Menu;
    }

    /// Rebuilds a fresh race over the same start/target pair.
    pub fn rematch(&mut self, now: Instant) {
        if let Some(race) = &self.race {
            let config = race.config.clone();
            self.links.reset();
            self.timer_text = self.countdown.as_secs().to_string();
            self.race = Some(Race::new(config, self.countdown, now));
            self.state = AppState::Racing;
        }
    }

    fn navigate(&mut self, target: PageRef, now: Instant) {
        let Some(race) = self.race.as_mut() else {
            return;
        };
        match race.follow_link(target, now) {
            NavDirective::Won { elapsed } => {
                self.timer_text = clock::format_duration(elapsed);
                self.state = AppState::Results;
            }
            NavDirective::Fetch(ticket) => self.spawn_fetch(ticket),
            NavDirective::Busy | NavDirective::NotRacing => {}
        }
    }

    fn spawn_fetch(&self, ticket: FetchTicket) {
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = fetcher.fetch_page(&ticket.page, &ticket.host);
            let _ = tx.send(RushEvent::PageFetched {
                generation: ticket.generation,
                result,
            });
        });
    }

    fn spawn_random(&mut self, end: RaceEnd) {
        match end {
            RaceEnd::Start if self.menu.randomizing_from => return,
            RaceEnd::Target if self.menu.randomizing_to => return,
            _ => {}
        }
        match end {
            RaceEnd::Start => self.menu.randomizing_from = true,
            RaceEnd::Target => self.menu.randomizing_to = true,
        }

        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.tx.clone();
        let host = self.host().to_string();
        thread::spawn(move || {
            let result = fetcher.random_page(&host);
            let _ = tx.send(RushEvent::RandomPicked { end, result });
        });
    }

    pub fn handle_event(&mut self, event: RushEvent, now: Instant) {
        match event {
            RushEvent::Tick => self.on_tick(now),
            RushEvent::Resize => {}
            RushEvent::Key(key) => self.on_key(key, now),
            RushEvent::PageFetched { generation, result } => {
                self.on_page_fetched(generation, result, now)
            }
            RushEvent::RandomPicked { end, result } => self.on_random_picked(end, result),
        }
    }

    fn on_tick(&mut self, now: Instant) {
        if self.state != AppState::Racing {
            return;
        }
        let Some(race) = self.race.as_mut() else {
            return;
        };
        match race.tick(now) {
            TickUpdate::Countdown { seconds_left } => {
                self.timer_text = seconds_left.to_string();
            }
            TickUpdate::BeginRace => {
                let start = race.config.start.clone();
                self.navigate(start, now);
            }
            TickUpdate::Elapsed(elapsed) => {
                self.timer_text = clock::format_duration(elapsed);
            }
            // frozen: keep whatever the clock last showed
            TickUpdate::Loading => {}
            TickUpdate::Finished(_) => {}
        }
    }

    fn on_page_fetched(
        &mut self,
        generation: u64,
        result: Result<WikiPage, FetchError>,
        now: Instant,
    ) {
        let Some(race) = self.race.as_mut() else {
            return;
        };
        // a completion from a previous race resolving late; drop it
        if generation != race.generation() {
            return;
        }
        match result {
            Ok(page) => {
                race.page_loaded(page, now);
                self.links.reset();
            }
            Err(e) => race.page_failed(e.to_string(), now),
        }
    }

    fn on_random_picked(&mut self, end: RaceEnd, result: Result<String, FetchError>) {
        match end {
            RaceEnd::Start => self.menu.randomizing_from = false,
            RaceEnd::Target => self.menu.randomizing_to = false,
        }
        match result {
            Ok(title) => {
                let url = PageRef::from_title(&title, self.host()).to_string();
                match end {
                    RaceEnd::Start => self.menu.from_input = url,
                    RaceEnd::Target => self.menu.to_input = url,
                }
            }
            Err(e) => self.menu.error = Some(e.to_string()),
        }
    }

    fn on_key(&mut self, key: KeyEvent, now: Instant) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match self.state {
            AppState::Menu => self.on_menu_key(key, now),
            AppState::Racing => self.on_race_key(key, now),
            AppState::Results => self.on_results_key(key, now),
        }
    }

    fn on_menu_key(&mut self, key: KeyEvent, now: Instant) {
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Down | KeyCode::Up => {
                self.menu.focus_target = !self.menu.focus_target;
            }
            KeyCode::Enter => self.start_race(now),
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.spawn_random(self.menu.focused());
            }
            KeyCode::Char(c) => {
                self.menu.focused_input_mut().push(c);
                self.menu.error = None;
            }
            KeyCode::Backspace => {
                self.menu.focused_input_mut().pop();
                self.menu.error = None;
            }
            _ => {}
        }
    }

    fn on_race_key(&mut self, key: KeyEvent, now: Instant) {
        match key.code {
            KeyCode::Esc => self.reset_to_menu(),
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if let Some(ticket) = self.race.as_mut().and_then(|r| r.retry(now)) {
                    self.spawn_fetch(ticket);
                }
            }
            KeyCode::Up => self.links.selected = self.links.selected.saturating_sub(1),
            KeyCode::Down => self.links.selected += 1,
            KeyCode::PageUp => self.links.selected = self.links.selected.saturating_sub(10),
            KeyCode::PageDown => self.links.selected += 10,
            KeyCode::Home => self.links.selected = 0,
            KeyCode::Enter => {
                let target = {
                    let visible = self.filtered_links();
                    let selected = self.links.selected.min(visible.len().saturating_sub(1));
                    visible
                        .get(selected)
                        .map(|name| PageRef::from_title(name, self.host()))
                };
                if let Some(target) = target {
                    self.navigate(target, now);
                }
            }
            KeyCode::Char(c) => {
                self.links.filter.push(c);
                self.links.selected = 0;
            }
            KeyCode::Backspace => {
                self.links.filter.pop();
                self.links.selected = 0;
            }
            _ => {}
        }
    }

    fn on_results_key(&mut self, key: KeyEvent, now: Instant) {
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('t') => {
                if let Some(race) = &self.race {
                    if Browser::is_available() {
                        let text = format!(
                            "I've made {} on Wikirush! Going from {} to {}",
                            self.timer_text,
                            race.config.start.title(),
                            race.config.target.title(),
                        );
                        webbrowser::open(&format!(
                            "https://twitter.com/intent/tweet?text={}",
                            text.replace(' ', "%20")
                        ))
                        .unwrap_or_default();
                    }
                }
            }
            KeyCode::Char('r') => self.rematch(now),
            KeyCode::Char('n') => self.reset_to_menu(),
            _ => {}
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let store = FileConfigStore::new();
    let saved = store.load();

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let events = CrosstermEventSource::new();
    let tx = events.sender();
    let fetcher: Arc<dyn PageFetcher> = Arc::new(WikipediaClient::new());
    let mut app = App::new(&cli, &saved, fetcher, tx);

    // Both pages on the command line: skip the menu entirely
    if cli.from.is_some() && cli.to.is_some() {
        app.start_race(Instant::now());
    }

    let runner = Runner::new(events, FixedTicker::default());
    let result = run(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    store.save(&Config {
        wiki: app.wiki.to_string().to_lowercase(),
        countdown_secs: app.countdown.as_secs(),
    })?;

    result
}

fn run<E: RushEventSource, T: Ticker>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    runner: &Runner<E, T>,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|f| ui::draw(app, f))?;
        let event = runner.step();
        app.handle_event(event, Instant::now());
        if app.should_quit {
            break;
        }
    }
    Ok(())
}
