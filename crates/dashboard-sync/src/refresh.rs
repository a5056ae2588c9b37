use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::aggregator::PortfolioAggregator;
use dashboard_store::{MAX_REFRESH_INTERVAL_SECS, MIN_REFRESH_INTERVAL_SECS};

/// Drives background cycles while at least one consumer is attached.
///
/// The first [`attach`](Self::attach) starts the interval task and dropping
/// the last [`ConsumerGuard`] aborts it. Cycles already spawned run to
/// completion.
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    aggregator: Arc<PortfolioAggregator>,
    state: Mutex<SchedulerState>,
}

#[derive(Default)]
struct SchedulerState {
    consumers: usize,
    task: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn new(aggregator: Arc<PortfolioAggregator>) -> Self {
        Self {
            inner: Arc::new(Inner {
                aggregator,
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// Register a consumer. Must be called from within a tokio runtime.
    pub fn attach(&self) -> ConsumerGuard {
        let mut state = self.inner.lock();
        state.consumers += 1;
        if state.task.is_none() {
            tracing::info!("Starting background refresh");
            state.task = Some(tokio::spawn(run(self.inner.aggregator.clone())));
        }
        ConsumerGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn consumers(&self) -> usize {
        self.inner.lock().consumers
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().task.is_some()
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps the scheduler running while held.
pub struct ConsumerGuard {
    inner: Arc<Inner>,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        state.consumers = state.consumers.saturating_sub(1);
        if state.consumers == 0 {
            if let Some(task) = state.task.take() {
                tracing::info!("Last consumer detached, stopping background refresh");
                task.abort();
            }
        }
    }
}

fn cadence(aggregator: &PortfolioAggregator) -> Duration {
    let secs = aggregator
        .store()
        .preferences()
        .refresh_interval
        .clamp(MIN_REFRESH_INTERVAL_SECS, MAX_REFRESH_INTERVAL_SECS);
    Duration::from_secs(secs)
}

fn ticker(start: Instant, period: Duration) -> time::Interval {
    let mut interval = time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn run(aggregator: Arc<PortfolioAggregator>) {
    let mut period = cadence(&aggregator);
    let mut interval = ticker(Instant::now(), period);

    loop {
        interval.tick().await;

        // Cycles are spawned so a slow backend never delays the cadence.
        let cycle = aggregator.clone();
        tokio::spawn(async move {
            cycle.background_cycle().await;
        });

        let next = cadence(&aggregator);
        if next != period {
            tracing::info!(
                from_secs = period.as_secs(),
                to_secs = next.as_secs(),
                "Refresh interval changed"
            );
            period = next;
            interval = ticker(Instant::now() + period, period);
        }
    }
}
