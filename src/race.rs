use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::locator::PageRef;
use crate::wiki::WikiPage;

/// Cadence of the runtime tick driving countdown and timer updates.
pub const TICK_RATE_MS: u64 = 30;

/// Lead time between submitting a race and the clock starting.
pub const DEFAULT_COUNTDOWN: Duration = Duration::from_millis(4000);

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Immutable once a race begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceConfig {
    pub start: PageRef,
    pub target: PageRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RacePhase {
    Countdown,
    Active,
    Finished,
}

/// One line of the visited-pages log. Append-only, chronological.
#[derive(Debug, Clone)]
pub struct VisitedEntry {
    pub page_id: u64,
    pub title: String,
    pub visited_at: Instant,
}

/// What the runtime should do with the clock after a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickUpdate {
    /// Still counting down; whole seconds until the race starts.
    Countdown { seconds_left: u64 },
    /// Countdown just elapsed: the caller must navigate to the start page.
    BeginRace,
    /// A fetch is in flight; the displayed time stays frozen.
    Loading,
    /// Net active race time, excluding countdown and load stalls.
    Elapsed(Duration),
    /// Terminal; the frozen final time.
    Finished(Duration),
}

/// A fetch the runtime must execute on behalf of the session. Stamped with
/// the session generation so completions that outlive the race are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub page: String,
    pub host: String,
    pub generation: u64,
}

/// Outcome of asking the session to follow a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavDirective {
    /// The link is the target page. The race is over; no fetch happens.
    Won { elapsed: Duration },
    /// Fetch this page and report back via `page_loaded`/`page_failed`.
    Fetch(FetchTicket),
    /// A navigation is already in flight; this one is ignored.
    Busy,
    /// The session is not accepting navigation (countdown or finished).
    NotRacing,
}

/// One race's state machine: Countdown -> Active -> Finished, the race
/// clock net of load stalls, and the visited-page log.
///
/// All methods take an explicit `now` so the runtime owns the clock and
/// tests can drive time deterministically. A `Race` is built per race and
/// dropped on reset; nothing is reused across races.
#[derive(Debug)]
pub struct Race {
    pub config: RaceConfig,
    phase: RacePhase,
    deadline: Instant,
    loading_time: Duration,
    load_started: Option<Instant>,
    pending: Option<PageRef>,
    load_error: Option<String>,
    current: Option<WikiPage>,
    visited: Vec<VisitedEntry>,
    generation: u64,
    final_elapsed: Option<Duration>,
}

impl Race {
    pub fn new(config: RaceConfig, countdown: Duration, now: Instant) -> Self {
        Self {
            config,
            phase: RacePhase::Countdown,
            deadline: now + countdown,
            loading_time: Duration::ZERO,
            load_started: None,
            pending: None,
            load_error: None,
            current: None,
            visited: Vec::new(),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            final_elapsed: None,
        }
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.load_started.is_some()
    }

    pub fn visited(&self) -> &[VisitedEntry] {
        &self.visited
    }

    pub fn current(&self) -> Option<&WikiPage> {
        self.current.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Net active race time at `now`: wall time since the deadline minus
    /// accumulated load stalls. Frozen once finished.
    pub fn elapsed(&self, now: Instant) -> Duration {
        if let Some(final_elapsed) = self.final_elapsed {
            return final_elapsed;
        }
        now.saturating_duration_since(self.deadline)
            .saturating_sub(self.loading_time)
    }

    /// Advances the session clock. Reactive only: never performs I/O, but
    /// may direct the caller to kick off the initial navigation.
    pub fn tick(&mut self, now: Instant) -> TickUpdate {
        match self.phase {
            RacePhase::Countdown => {
                if now >= self.deadline {
                    self.phase = RacePhase::Active;
                    TickUpdate::BeginRace
                } else {
                    let remaining = self.deadline.saturating_duration_since(now);
                    TickUpdate::Countdown {
                        seconds_left: remaining.as_secs(),
                    }
                }
            }
            RacePhase::Active => {
                if self.is_loading() {
                    TickUpdate::Loading
                } else {
                    TickUpdate::Elapsed(self.elapsed(now))
                }
            }
            RacePhase::Finished => TickUpdate::Finished(self.elapsed(now)),
        }
    }

    /// Asks the session to navigate to `target` -- the initial start-page
    /// navigation and every followed link go through here.
    ///
    /// Winning is decided by normalized path identity against the race
    /// target, without fetching the target page. Not re-entrant: while a
    /// fetch is in flight any further navigation is ignored.
    pub fn follow_link(&mut self, target: PageRef, now: Instant) -> NavDirective {
        if self.phase != RacePhase::Active {
            return NavDirective::NotRacing;
        }
        if self.is_loading() {
            return NavDirective::Busy;
        }

        if target.path == self.config.target.path {
            let elapsed = self.elapsed(now);
            self.final_elapsed = Some(elapsed);
            self.phase = RacePhase::Finished;
            self.pending = None;
            self.load_error = None;
            return NavDirective::Won { elapsed };
        }

        self.load_started = Some(now);
        self.load_error = None;
        let ticket = FetchTicket {
            page: target.page_name().to_string(),
            host: target.host.clone(),
            generation: self.generation,
        };
        self.pending = Some(target);
        NavDirective::Fetch(ticket)
    }

    /// Completes an in-flight navigation. Returns the inter-visit delta
    /// (zero for the first page), or `None` if no navigation was pending.
    pub fn page_loaded(&mut self, page: WikiPage, now: Instant) -> Option<Duration> {
        if self.phase != RacePhase::Active {
            return None;
        }
        let load_started = self.load_started.take()?;

        self.loading_time += now.saturating_duration_since(load_started);
        self.pending = None;
        self.load_error = None;

        let delta = self
            .visited
            .last()
            .map(|last| now.saturating_duration_since(last.visited_at))
            .unwrap_or(Duration::ZERO);

        self.visited.push(VisitedEntry {
            page_id: page.id,
            title: page.title.clone(),
            visited_at: now,
        });
        self.current = Some(page);
        Some(delta)
    }

    /// Fails an in-flight navigation. The stalled span never counts against
    /// the race clock, and the pending locator is kept so the player can
    /// retry.
    pub fn page_failed(&mut self, error: String, now: Instant) {
        if let Some(load_started) = self.load_started.take() {
            self.loading_time += now.saturating_duration_since(load_started);
            self.load_error = Some(error);
        }
    }

    /// Re-issues the navigation that last failed, if any.
    pub fn retry(&mut self, now: Instant) -> Option<FetchTicket> {
        if self.phase != RacePhase::Active || self.is_loading() || self.load_error.is_none() {
            return None;
        }
        let target = self.pending.clone()?;
        self.load_started = Some(now);
        self.load_error = None;
        Some(FetchTicket {
            page: target.page_name().to_string(),
            host: target.host.clone(),
            generation: self.generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::WikiPage;
    use assert_matches::assert_matches;

    const HOST: &str = "en.wikipedia.org";

    fn config(start: &str, target: &str) -> RaceConfig {
        RaceConfig {
            start: PageRef::from_title(start, HOST),
            target: PageRef::from_title(target, HOST),
        }
    }

    fn page(name: &str, id: u64) -> WikiPage {
        WikiPage::new(
            id,
            name.to_string(),
            PageRef::from_title(name, HOST),
            format!("<p>{}</p>", name),
        )
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_countdown_boundary() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Finland"), ms(4000), t0);
        let deadline = t0 + ms(4000);

        assert_eq!(race.phase(), RacePhase::Countdown);
        assert_eq!(
            race.tick(t0),
            TickUpdate::Countdown { seconds_left: 4 }
        );
        assert_eq!(
            race.tick(deadline - ms(1)),
            TickUpdate::Countdown { seconds_left: 0 }
        );
        assert_eq!(race.phase(), RacePhase::Countdown);

        assert_eq!(race.tick(deadline + ms(1)), TickUpdate::BeginRace);
        assert_eq!(race.phase(), RacePhase::Active);
    }

    #[test]
    fn test_win_by_path_without_fetch() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Finland"), ms(4000), t0);
        race.tick(t0 + ms(4000));

        let directive = race.follow_link(PageRef::parse("/wiki/Finland", HOST).unwrap(), t0 + ms(5000));
        assert_matches!(directive, NavDirective::Won { elapsed } if elapsed == ms(1000));
        assert_eq!(race.phase(), RacePhase::Finished);
        // winning never fetches, so the visited log is untouched
        assert!(race.visited().is_empty());
    }

    #[test]
    fn test_degenerate_start_equals_target() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Pizza"), ms(4000), t0);

        // the countdown still runs, and the race passes through Active
        assert_eq!(race.tick(t0 + ms(4000)), TickUpdate::BeginRace);
        assert_eq!(race.phase(), RacePhase::Active);

        let directive = race.follow_link(race.config.start.clone(), t0 + ms(4000));
        assert_matches!(directive, NavDirective::Won { elapsed } if elapsed == Duration::ZERO);
        assert_eq!(race.phase(), RacePhase::Finished);
    }

    #[test]
    fn test_navigation_rejected_outside_active() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Finland"), ms(4000), t0);
        let target = PageRef::from_title("Italy", HOST);

        assert_eq!(
            race.follow_link(target.clone(), t0),
            NavDirective::NotRacing
        );

        race.tick(t0 + ms(4000));
        race.follow_link(PageRef::from_title("Finland", HOST), t0 + ms(5000));
        assert_eq!(race.follow_link(target, t0 + ms(6000)), NavDirective::NotRacing);
    }

    #[test]
    fn test_follow_link_while_loading_is_noop() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Finland"), ms(4000), t0);
        race.tick(t0 + ms(4000));

        let directive = race.follow_link(race.config.start.clone(), t0 + ms(4000));
        assert_matches!(directive, NavDirective::Fetch(_));
        assert!(race.is_loading());

        // a second navigation while loading changes nothing
        let second = race.follow_link(PageRef::from_title("Italy", HOST), t0 + ms(4100));
        assert_eq!(second, NavDirective::Busy);
        assert!(race.is_loading());
        assert!(race.visited().is_empty());

        // even a winning link is ignored mid-load
        let winning = race.follow_link(PageRef::from_title("Finland", HOST), t0 + ms(4200));
        assert_eq!(winning, NavDirective::Busy);
        assert_eq!(race.phase(), RacePhase::Active);
    }

    #[test]
    fn test_load_accumulator_sums_stalls() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Finland"), Duration::ZERO, t0);
        race.tick(t0);

        // first fetch: issued at +0, resolves at +500
        race.follow_link(race.config.start.clone(), t0);
        race.page_loaded(page("Pizza", 1), t0 + ms(500));

        // second fetch: issued at +600, resolves at +900
        race.follow_link(PageRef::from_title("Italy", HOST), t0 + ms(600));
        race.page_loaded(page("Italy", 2), t0 + ms(900));

        // 500 + 300 of stall excluded from the clock
        assert_eq!(race.elapsed(t0 + ms(900)), ms(100));

        // and the final time honors the same arithmetic
        let directive = race.follow_link(PageRef::from_title("Finland", HOST), t0 + ms(1000));
        assert_matches!(directive, NavDirective::Won { elapsed } if elapsed == ms(200));
    }

    #[test]
    fn test_elapsed_frozen_after_finish() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Finland"), ms(4000), t0);
        race.tick(t0 + ms(4000));
        race.follow_link(PageRef::from_title("Finland", HOST), t0 + ms(7500));

        assert_eq!(race.elapsed(t0 + ms(7500)), ms(3500));
        assert_eq!(race.elapsed(t0 + ms(60_000)), ms(3500));
        assert_eq!(
            race.tick(t0 + ms(60_000)),
            TickUpdate::Finished(ms(3500))
        );
    }

    #[test]
    fn test_tick_is_frozen_while_loading() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Finland"), Duration::ZERO, t0);
        race.tick(t0);
        race.follow_link(race.config.start.clone(), t0 + ms(100));

        assert_eq!(race.tick(t0 + ms(200)), TickUpdate::Loading);
        assert_eq!(race.tick(t0 + ms(900)), TickUpdate::Loading);

        // after resolution the clock continues from where it froze
        race.page_loaded(page("Pizza", 1), t0 + ms(1000));
        assert_eq!(race.tick(t0 + ms(1000)), TickUpdate::Elapsed(ms(100)));
    }

    #[test]
    fn test_elapsed_never_decreases_while_active() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Finland"), ms(1000), t0);
        race.tick(t0 + ms(1000));
        race.follow_link(race.config.start.clone(), t0 + ms(1000));
        race.page_loaded(page("Pizza", 1), t0 + ms(1400));

        let mut last = Duration::ZERO;
        for step in 0..200u64 {
            let now = t0 + ms(1400 + step * TICK_RATE_MS);
            if let TickUpdate::Elapsed(elapsed) = race.tick(now) {
                assert!(elapsed >= last);
                last = elapsed;
            }
        }
    }

    #[test]
    fn test_visited_log_grows_per_successful_navigation() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Finland"), Duration::ZERO, t0);
        race.tick(t0);

        race.follow_link(race.config.start.clone(), t0);
        let first_delta = race.page_loaded(page("Pizza", 1), t0 + ms(300));
        assert_eq!(first_delta, Some(Duration::ZERO));
        assert_eq!(race.visited().len(), 1);
        assert_eq!(race.visited()[0].title, "Pizza");

        race.follow_link(PageRef::from_title("Italy", HOST), t0 + ms(1000));
        let second_delta = race.page_loaded(page("Italy", 2), t0 + ms(1500));
        // delta is measured between resolution times
        assert_eq!(second_delta, Some(ms(1200)));
        assert_eq!(race.visited().len(), 2);

        // winning leaves the log alone
        race.follow_link(PageRef::from_title("Finland", HOST), t0 + ms(2000));
        assert_eq!(race.visited().len(), 2);
    }

    #[test]
    fn test_page_loaded_without_pending_fetch_is_ignored() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Finland"), Duration::ZERO, t0);
        race.tick(t0);

        assert_eq!(race.page_loaded(page("Pizza", 1), t0 + ms(100)), None);
        assert!(race.visited().is_empty());
    }

    #[test]
    fn test_failure_surfaces_error_and_allows_retry() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Finland"), Duration::ZERO, t0);
        race.tick(t0);

        race.follow_link(race.config.start.clone(), t0);
        race.page_failed("network error: timed out".to_string(), t0 + ms(700));

        assert!(!race.is_loading());
        assert_eq!(race.last_error(), Some("network error: timed out"));
        // the failed stall is excluded from the clock
        assert_eq!(race.elapsed(t0 + ms(700)), Duration::ZERO);

        let ticket = race.retry(t0 + ms(900)).unwrap();
        assert_eq!(ticket.page, "Pizza");
        assert!(race.is_loading());
        assert_eq!(race.last_error(), None);

        race.page_loaded(page("Pizza", 1), t0 + ms(1200));
        assert_eq!(race.visited().len(), 1);
        // both stalls (700 + 300) stay off the clock
        assert_eq!(race.elapsed(t0 + ms(1200)), ms(200));
    }

    #[test]
    fn test_retry_without_failure_is_noop() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Finland"), Duration::ZERO, t0);
        race.tick(t0);

        assert_eq!(race.retry(t0), None);
        race.follow_link(race.config.start.clone(), t0);
        // no retry while a fetch is healthy and in flight
        assert_eq!(race.retry(t0 + ms(100)), None);
    }

    #[test]
    fn test_generations_are_unique_per_race() {
        let t0 = Instant::now();
        let a = Race::new(config("Pizza", "Finland"), ms(4000), t0);
        let b = Race::new(config("Pizza", "Finland"), ms(4000), t0);
        assert_ne!(a.generation(), b.generation());
    }

    #[test]
    fn test_fetch_ticket_carries_generation() {
        let t0 = Instant::now();
        let mut race = Race::new(config("Pizza", "Finland"), Duration::ZERO, t0);
        race.tick(t0);

        match race.follow_link(race.config.start.clone(), t0) {
            NavDirective::Fetch(ticket) => {
                assert_eq!(ticket.generation, race.generation());
                assert_eq!(ticket.page, "Pizza");
                assert_eq!(ticket.host, HOST);
            }
            other => panic!("expected Fetch, got {:?}", other),
        }
    }
}
