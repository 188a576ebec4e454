//! Integration tests for the metrics hook and the unfinished-work reporter.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use workq::clock::FakeClock;
use workq::telemetry::metrics::OtelQueueMetrics;
use workq::{Queue, QueueConfig, QueueMetrics};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Add(&'static str),
    Get(&'static str),
    Done(&'static str),
    Tick,
}

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn ticks(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| **e == Event::Tick)
            .count()
    }
}

impl QueueMetrics<&'static str> for Recorder {
    fn add(&mut self, key: &&'static str) {
        self.events.lock().push(Event::Add(*key));
    }

    fn get(&mut self, key: &&'static str) {
        self.events.lock().push(Event::Get(*key));
    }

    fn done(&mut self, key: &&'static str) {
        self.events.lock().push(Event::Done(*key));
    }

    fn update_unfinished_work(&mut self) {
        self.events.lock().push(Event::Tick);
    }
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

fn queue_with(clock: &FakeClock, recorder: &Recorder) -> Queue<&'static str> {
    Queue::with_config(
        QueueConfig::named("metrics-test")
            .clock(Arc::new(clock.clone()))
            .metrics(recorder.clone()),
    )
}

// ---------------------------------------------------------------------------
// Hook calls
// ---------------------------------------------------------------------------

#[test]
fn hook_sees_only_effective_adds() {
    let clock = FakeClock::new();
    let recorder = Recorder::default();
    let q = queue_with(&clock, &recorder);

    q.add("a");
    q.add("a");
    let key = q.get().unwrap();
    q.add("a");
    q.add("a");
    q.done(&key);
    let key = q.get().unwrap();
    q.done(&key);

    assert_eq!(
        recorder.events(),
        vec![
            Event::Add("a"),
            Event::Get("a"),
            Event::Add("a"),
            Event::Done("a"),
            Event::Get("a"),
            Event::Done("a"),
        ]
    );
}

#[test]
fn hook_ignores_adds_after_shut_down() {
    let clock = FakeClock::new();
    let recorder = Recorder::default();
    let q = queue_with(&clock, &recorder);

    q.shut_down();
    q.add("late");
    assert!(recorder.events().is_empty());
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

#[test]
fn reporter_ticks_until_shut_down() {
    let clock = FakeClock::new();
    let recorder = Recorder::default();
    let q = queue_with(&clock, &recorder);
    assert!(clock.has_waiters());

    clock.step(Duration::from_millis(499));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(recorder.ticks(), 0);

    clock.step(Duration::from_millis(1));
    wait_until("first tick", || recorder.ticks() == 1);

    clock.step(Duration::from_millis(500));
    wait_until("second tick", || recorder.ticks() == 2);

    q.shut_down();
    clock.step(Duration::from_millis(500));
    wait_until("reporter exit", || !clock.has_waiters());
    assert_eq!(recorder.ticks(), 2);
}

#[test]
fn reporter_exits_when_queue_is_dropped() {
    let clock = FakeClock::new();
    let recorder = Recorder::default();
    let q = queue_with(&clock, &recorder);
    assert!(clock.has_waiters());

    drop(q);
    clock.step(Duration::from_millis(500));
    wait_until("reporter exit", || !clock.has_waiters());
    assert_eq!(recorder.ticks(), 0);
}

#[test]
fn reporter_honours_configured_period() {
    let clock = FakeClock::new();
    let recorder = Recorder::default();
    let _q: Queue<&'static str> = Queue::with_config(
        QueueConfig::named("fast")
            .clock(Arc::new(clock.clone()))
            .metrics(recorder.clone())
            .unfinished_work_period(Duration::from_millis(100)),
    );

    clock.step(Duration::from_millis(100));
    wait_until("tick", || recorder.ticks() == 1);
}

#[test]
fn zero_period_disables_reporter() {
    let clock = FakeClock::new();
    let _q: Queue<u32> = Queue::with_config(
        QueueConfig::named("silent")
            .clock(Arc::new(clock.clone()))
            .unfinished_work_period(Duration::ZERO),
    );
    assert!(!clock.has_waiters());
}

// ---------------------------------------------------------------------------
// OpenTelemetry hook
// ---------------------------------------------------------------------------

#[test]
fn otel_metrics_track_in_flight_keys_through_queue() {
    let clock = FakeClock::new();
    let metrics: Arc<Mutex<Option<usize>>> = Arc::new(Mutex::new(None));

    // Wrap the OTel hook so the test can observe its in-flight count.
    struct Probe {
        inner: OtelQueueMetrics<u32>,
        in_flight: Arc<Mutex<Option<usize>>>,
    }

    impl QueueMetrics<u32> for Probe {
        fn add(&mut self, key: &u32) {
            self.inner.add(key);
        }
        fn get(&mut self, key: &u32) {
            self.inner.get(key);
            *self.in_flight.lock() = Some(self.inner.in_flight());
        }
        fn done(&mut self, key: &u32) {
            self.inner.done(key);
            *self.in_flight.lock() = Some(self.inner.in_flight());
        }
        fn update_unfinished_work(&mut self) {
            self.inner.update_unfinished_work();
        }
    }

    let q: Queue<u32> = Queue::with_config(
        QueueConfig::named("otel")
            .clock(Arc::new(clock.clone()))
            .metrics(Probe {
                inner: OtelQueueMetrics::new("otel", Arc::new(clock.clone())),
                in_flight: Arc::clone(&metrics),
            }),
    );

    q.add(1);
    q.add(2);
    let a = q.get().unwrap();
    let b = q.get().unwrap();
    assert_eq!(*metrics.lock(), Some(2));

    clock.step(Duration::from_millis(500));
    q.done(&a);
    assert_eq!(*metrics.lock(), Some(1));
    q.done(&b);
    assert_eq!(*metrics.lock(), Some(0));
}
