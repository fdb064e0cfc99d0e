use std::{sync::Arc, time::Duration};

use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use tokio::{
    sync::{Semaphore, mpsc, watch},
    time::Instant,
};
use typed_builder::TypedBuilder;

use super::Injector;
use crate::{
    aggregate::{Aggregate, aggregator_task},
    client::ProtocolClient,
    config::SimulationConfig,
    error::Error,
    feeder::Feeder,
    metric::ExecutionMetric,
    profile::Profile,
    scenario::Scenario,
};
use internals::*;

/// What a finished injection reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InjectionReport<A> {
    pub aggregate: A,
    /// Arrivals the profile asked for.
    pub scheduled: u64,
    /// Executions actually spawned.
    pub dispatched: u64,
    /// Arrivals dropped because the feeder failed.
    pub skipped: u64,
    /// Times the dispatcher fell behind and shifted the schedule.
    pub skew_events: u64,
    /// Dispatch ended before the profile did (duration cap or shutdown signal).
    pub stopped_early: bool,
    pub elapsed: Duration,
}

/// Open-workload injector driven by a [`Profile`].
///
/// - One dispatcher walks the profile's schedule and spawns one task per arrival.
/// - Dispatch never waits on executions; with `max_in_flight` set, spawned executions
///   queue on a semaphore but arrivals still happen on time.
/// - `max_duration` caps the dispatch window; the profile may be longer.
///
/// # Tuning Knobs
///
/// - `skew_tolerance`: lateness accepted before the dispatcher counts skew and shifts
///   the schedule. Too small a value turns scheduler jitter into skew events.
/// - `metrics_buffer`: capacity of the metric channel and the aggregator batch size.
/// - `seed`: makes randomized phases reproducible.
#[derive(Debug, Clone, TypedBuilder)]
pub struct OpenInjector {
    pub profile: Profile,
    #[builder(default, setter(strip_option))]
    pub max_in_flight: Option<usize>,
    #[builder(default, setter(strip_option))]
    pub max_duration: Option<Duration>,
    #[builder(default = Duration::from_millis(100))]
    pub skew_tolerance: Duration,
    #[builder(default = 1024)]
    pub metrics_buffer: usize,
    #[builder(default, setter(strip_option))]
    pub seed: Option<u64>,
}

impl OpenInjector {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            profile: config.profile.clone(),
            max_in_flight: config.max_in_flight,
            max_duration: config.max_duration(),
            skew_tolerance: config.skew_tolerance,
            metrics_buffer: 1024,
            seed: None,
        }
    }
}

impl Injector for OpenInjector {
    type Error = Error;

    async fn inject<A, C, F>(
        &self,
        scenario: Arc<Scenario>,
        feeder: Arc<F>,
        client: Arc<C>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<InjectionReport<A>, Self::Error>
    where
        A: Aggregate<Metric = ExecutionMetric> + 'static,
        C: ProtocolClient + 'static,
        F: Feeder + 'static,
    {
        let buffer = self.metrics_buffer.max(1);
        let (metrics, rx) = mpsc::channel(buffer);
        tracing::info!("Spawning aggregator task...");
        let aggregator = tokio::spawn(aggregator_task::<A>(rx, buffer));

        let ctx = DispatchContext {
            scenario,
            feeder,
            client,
            limiter: self.max_in_flight.map(|n| Arc::new(Semaphore::new(n))),
            metrics,
        };
        let schedule = match self.seed {
            Some(seed) => self.profile.schedule_with(StdRng::seed_from_u64(seed)),
            None => self.profile.schedule(),
        };
        let window = DispatchWindow {
            length: self.profile.duration(),
            max_duration: self.max_duration,
            skew_tolerance: self.skew_tolerance,
        };

        tracing::info!(
            "Injecting {} arrivals of scenario {} over {:?}",
            self.profile.expected_arrivals(),
            ctx.scenario.name(),
            window.length
        );
        let started = Instant::now();
        let stats = dispatch(ctx, schedule, window, shutdown).await;

        tracing::info!("Dispatch finished, draining in-flight executions...");
        let aggregate = aggregator.await?;
        let elapsed = started.elapsed();

        tracing::info!(
            "Injection done: {} dispatched, {} skipped, {} skew events in {:?}",
            stats.dispatched,
            stats.skipped,
            stats.skew_events,
            elapsed
        );
        Ok(InjectionReport {
            aggregate,
            scheduled: self.profile.expected_arrivals(),
            dispatched: stats.dispatched,
            skipped: stats.skipped,
            skew_events: stats.skew_events,
            stopped_early: stats.stopped_early,
            elapsed,
        })
    }
}

#[cfg(feature = "internals")]
pub use internals::*;

/// Dispatcher internals of the `OpenInjector`.
/// Encapsulated in a module to allow conditional exposure via `#[cfg(feature = "internals")]`.
mod internals {
    use super::*;
    use crate::{execution::Execution, feeder::Record, profile::Arrival, session::Session};

    /// Shared handles every spawned execution gets a clone of.
    pub struct DispatchContext<C, F> {
        pub scenario: Arc<Scenario>,
        pub feeder: Arc<F>,
        pub client: Arc<C>,
        /// Concurrency ceiling; executions wait here, the dispatcher never does.
        pub limiter: Option<Arc<Semaphore>>,
        pub metrics: mpsc::Sender<ExecutionMetric>,
    }

    impl<C, F> DispatchContext<C, F>
    where
        C: ProtocolClient + 'static,
        F: Feeder + 'static,
    {
        /// Starts one execution without waiting for it.
        pub fn spawn(&self, record: Record) {
            let scenario = self.scenario.clone();
            let client = self.client.clone();
            let limiter = self.limiter.clone();
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                let _permit = match limiter {
                    Some(limiter) => match limiter.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                    None => None,
                };
                let finished = Execution::new(&scenario, client.as_ref(), Session::from(record))
                    .run()
                    .await;
                if metrics.send(finished.metric).await.is_err() {
                    tracing::debug!("Aggregator is gone, dropping execution metric");
                }
            });
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct DispatchWindow {
        /// Total duration of the profile.
        pub length: Duration,
        pub max_duration: Option<Duration>,
        pub skew_tolerance: Duration,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct DispatchStats {
        pub dispatched: u64,
        pub skipped: u64,
        pub skew_events: u64,
        pub stopped_early: bool,
    }

    /// Lag to add to the schedule when the dispatcher is more than `tolerance` late
    /// for `due`.
    pub fn schedule_skew(now: Instant, due: Instant, tolerance: Duration) -> Option<Duration> {
        let late = now.saturating_duration_since(due);
        (late > tolerance).then_some(late)
    }

    /// Resolves once `true` is published on `shutdown`; never if the sender is gone.
    pub async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
        let closed = shutdown.wait_for(|stop| *stop).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    /// Walks the schedule and spawns one execution per arrival.
    ///
    /// Returns once the schedule and the profile's duration are over, the duration
    /// cap is reached, or a stop is requested.
    pub async fn dispatch<C, F, S>(
        ctx: DispatchContext<C, F>,
        schedule: S,
        window: DispatchWindow,
        mut shutdown: watch::Receiver<bool>,
    ) -> DispatchStats
    where
        C: ProtocolClient + 'static,
        F: Feeder + 'static,
        S: Iterator<Item = Arrival>,
    {
        let start = Instant::now();
        let deadline = window.max_duration.map(|d| start + d);
        let mut stats = DispatchStats::default();
        let mut lag = Duration::ZERO;
        let mut phase = None;

        for arrival in schedule {
            if phase != Some(arrival.phase) {
                tracing::info!("Starting phase {}", arrival.phase);
                phase = Some(arrival.phase);
            }

            let due = start + arrival.offset + lag;
            if deadline.is_some_and(|deadline| due >= deadline) {
                tracing::info!("Reached max duration, no more executions will start");
                stats.stopped_early = true;
                break;
            }

            let now = Instant::now();
            if let Some(late) = schedule_skew(now, due, window.skew_tolerance) {
                tracing::warn!(
                    "Dispatcher is {late:?} behind schedule, continuing from now without catching up"
                );
                lag += late;
                stats.skew_events += 1;
            } else if now < due {
                tokio::select! {
                    _ = tokio::time::sleep_until(due) => {}
                    _ = stop_requested(&mut shutdown) => {}
                }
            }

            let stop = *shutdown.borrow();
            if stop {
                tracing::info!("Shutdown requested, no more executions will start");
                stats.stopped_early = true;
                return stats;
            }

            match ctx.feeder.next() {
                Ok(record) => {
                    ctx.spawn(record);
                    stats.dispatched += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping execution: {e}");
                    stats.skipped += 1;
                }
            }
        }

        // Sit out the tail of the profile so a run lasts as long as its profile says,
        // even when the last phases schedule nothing.
        let end = start + window.length + lag;
        let end = deadline.map_or(end, |deadline| end.min(deadline));
        tokio::select! {
            _ = tokio::time::sleep_until(end) => {}
            _ = stop_requested(&mut shutdown) => {
                stats.stopped_early = true;
            }
        }
        stats
    }
}
