//! Injectable time source.
//!
//! The queue only needs two things from time: a current instant for metrics
//! and a periodic ticker for the unfinished-work reporter. [`RealClock`] reads
//! the wall clock; [`FakeClock`] is stepped by hand so tests never sleep on
//! the reporter period.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

/// Source of the current time and of periodic tickers.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Start a ticker firing every `period`.
    fn new_ticker(&self, period: Duration) -> Box<dyn Ticker>;
}

/// A periodic tick source.
pub trait Ticker: Send {
    /// Channel that yields the instant of each tick.
    fn c(&self) -> &Receiver<Instant>;

    /// Stop delivering ticks. Ticks already buffered may still be received.
    fn stop(&mut self);
}

// ---------------------------------------------------------------------------
// Real clock
// ---------------------------------------------------------------------------

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn new_ticker(&self, period: Duration) -> Box<dyn Ticker> {
        Box::new(RealTicker {
            rx: crossbeam_channel::tick(period),
        })
    }
}

struct RealTicker {
    rx: Receiver<Instant>,
}

impl Ticker for RealTicker {
    fn c(&self) -> &Receiver<Instant> {
        &self.rx
    }

    fn stop(&mut self) {
        self.rx = crossbeam_channel::never();
    }
}

// ---------------------------------------------------------------------------
// Fake clock
// ---------------------------------------------------------------------------

/// Manually driven clock for tests.
///
/// Time only moves on [`FakeClock::step`], which also fires every live ticker
/// whose deadline has passed. Like a real ticker, each channel buffers at
/// most one tick; ticks a slow reader misses are dropped.
#[derive(Clone)]
pub struct FakeClock {
    state: Arc<Mutex<FakeState>>,
}

struct FakeState {
    now: Instant,
    tickers: Vec<FakeTickerEntry>,
}

struct FakeTickerEntry {
    period: Duration,
    next: Instant,
    tx: Sender<Instant>,
    stopped: Arc<AtomicBool>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                now,
                tickers: Vec::new(),
            })),
        }
    }

    /// Advance time by `by` and fire any tickers that came due.
    pub fn step(&self, by: Duration) {
        let mut state = self.state.lock();
        state.now += by;
        let now = state.now;

        state
            .tickers
            .retain(|entry| !entry.stopped.load(Ordering::Acquire));

        for entry in &mut state.tickers {
            // A zero period would never catch up.
            if entry.period.is_zero() {
                let _ = entry.tx.try_send(now);
                continue;
            }
            while entry.next <= now {
                let _ = entry.tx.try_send(entry.next);
                entry.next += entry.period;
            }
        }
    }

    /// Whether any ticker created from this clock is still running.
    pub fn has_waiters(&self) -> bool {
        self.state
            .lock()
            .tickers
            .iter()
            .any(|entry| !entry.stopped.load(Ordering::Acquire))
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.state.lock().now
    }

    fn new_ticker(&self, period: Duration) -> Box<dyn Ticker> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let stopped = Arc::new(AtomicBool::new(false));

        let mut state = self.state.lock();
        let next = state.now + period;
        state.tickers.push(FakeTickerEntry {
            period,
            next,
            tx,
            stopped: Arc::clone(&stopped),
        });

        Box::new(FakeTicker { rx, stopped })
    }
}

struct FakeTicker {
    rx: Receiver<Instant>,
    stopped: Arc<AtomicBool>,
}

impl Ticker for FakeTicker {
    fn c(&self) -> &Receiver<Instant> {
        &self.rx
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }
}

impl Drop for FakeTicker {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_ticker_fires_only_when_stepped_past_period() {
        let clock = FakeClock::new();
        let ticker = clock.new_ticker(Duration::from_millis(500));

        clock.step(Duration::from_millis(499));
        assert!(ticker.c().try_recv().is_err());

        clock.step(Duration::from_millis(1));
        assert!(ticker.c().try_recv().is_ok());
        assert!(ticker.c().try_recv().is_err());
    }

    #[test]
    fn fake_ticker_buffers_a_single_tick() {
        let clock = FakeClock::new();
        let ticker = clock.new_ticker(Duration::from_millis(10));

        clock.step(Duration::from_millis(100));
        assert!(ticker.c().try_recv().is_ok());
        assert!(ticker.c().try_recv().is_err());
    }

    #[test]
    fn stopped_ticker_is_no_longer_a_waiter() {
        let clock = FakeClock::new();
        let mut ticker = clock.new_ticker(Duration::from_millis(10));
        assert!(clock.has_waiters());

        ticker.stop();
        assert!(!clock.has_waiters());

        clock.step(Duration::from_millis(20));
        assert!(ticker.c().try_recv().is_err());
    }

    #[test]
    fn dropped_ticker_is_no_longer_a_waiter() {
        let clock = FakeClock::new();
        let ticker = clock.new_ticker(Duration::from_millis(10));
        drop(ticker);
        assert!(!clock.has_waiters());
    }

    #[test]
    fn fake_now_advances_with_step() {
        let start = Instant::now();
        let clock = FakeClock::starting_at(start);
        clock.step(Duration::from_secs(3));
        assert_eq!(clock.now(), start + Duration::from_secs(3));
    }
}
