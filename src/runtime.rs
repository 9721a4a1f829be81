use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent};

use crate::race::TICK_RATE_MS;
use crate::wiki::{FetchError, WikiPage};

/// Which race endpoint a random-page pick should fill in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaceEnd {
    Start,
    Target,
}

/// Unified event type consumed by the app loop. Fetch workers report back
/// through the same channel as keyboard and tick events, so race state only
/// ever mutates on the loop thread.
#[derive(Debug)]
pub enum RushEvent {
    Key(KeyEvent),
    Resize,
    Tick,
    /// A page fetch finished. `generation` is the race that issued it;
    /// completions from a dead race are dropped by the app.
    PageFetched {
        generation: u64,
        result: Result<WikiPage, FetchError>,
    },
    /// A random-page lookup for the menu finished.
    RandomPicked {
        end: RaceEnd,
        result: Result<String, FetchError>,
    },
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait RushEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<RushEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<RushEvent>,
    tx: Sender<RushEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        let key_tx = tx.clone();
        thread::spawn(move || loop {
            match event::read() {
                Ok(CtEvent::Key(key)) => {
                    if key_tx.send(RushEvent::Key(key)).is_err() {
                        break;
                    }
                }
                Ok(CtEvent::Resize(_, _)) => {
                    if key_tx.send(RushEvent::Resize).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        });

        Self { rx, tx }
    }

    /// Sender half for fetch workers to report completions on.
    pub fn sender(&self) -> Sender<RushEvent> {
        self.tx.clone()
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RushEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<RushEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(Duration::from_millis(TICK_RATE_MS))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<RushEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<RushEvent>) -> Self {
        Self { rx }
    }
}

impl RushEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<RushEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: RushEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: RushEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> RushEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => RushEvent::Tick,
        }
    }
}
