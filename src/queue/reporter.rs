//! Periodic unfinished-work reporter.
//!
//! Runs on its own thread and never touches queue semantics: on each tick it
//! asks the metrics hook to refresh its view of in-flight work.

use std::hash::Hash;
use std::sync::Weak;
use std::time::Duration;

use tracing::{debug, warn};

use super::Shared;
use crate::clock::{Clock, Ticker};

/// Start the reporter for `shared`.
///
/// The ticker is created before the thread starts so a stepped test clock
/// sees it immediately. The thread holds only a weak reference; it exits on
/// the first tick after shutdown or after every queue handle is gone.
pub(super) fn spawn<K>(shared: Weak<Shared<K>>, clock: &dyn Clock, period: Duration)
where
    K: Eq + Hash + Send + 'static,
{
    let ticker = clock.new_ticker(period);
    let name = shared
        .upgrade()
        .map(|s| s.name.clone())
        .unwrap_or_default();

    let thread_name = if name.is_empty() {
        "workq-reporter".to_string()
    } else {
        format!("workq-reporter-{name}")
    };

    let spawned = std::thread::Builder::new()
        .name(thread_name)
        .spawn(move || run(shared, ticker));

    if let Err(e) = spawned {
        warn!(queue = %name, "failed to start unfinished-work reporter: {e}");
    }
}

fn run<K>(shared: Weak<Shared<K>>, mut ticker: Box<dyn Ticker>)
where
    K: Eq + Hash + Send + 'static,
{
    while ticker.c().recv().is_ok() {
        let Some(shared) = shared.upgrade() else {
            break;
        };

        let mut state = shared.state.lock();
        if state.shutting_down {
            debug!(queue = %shared.name, "unfinished-work reporter stopped");
            break;
        }
        state.metrics.update_unfinished_work();
    }
    ticker.stop();
}
