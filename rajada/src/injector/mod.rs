//! Injectors turn a workload profile into running executions.
//!
//! An `Injector` decides when virtual users start. Rajada ships the
//! [`OpenInjector`], an open-workload scheduler: arrivals follow the
//! [`Profile`](crate::profile::Profile) alone and never wait for earlier executions
//! to finish, so a slow target sees more concurrent users instead of fewer requests.
//!
//! # High-level flow
//! 1. An aggregator task is spawned. It receives one
//!    [`ExecutionMetric`](crate::metric::ExecutionMetric) per finished execution over
//!    a bounded channel and folds them into an [`Aggregate`].
//! 2. The dispatcher walks the profile's lazy schedule. For each arrival it sleeps
//!    until the arrival's offset, pulls a record from the feeder and spawns one task
//!    running a fresh execution with its own session.
//! 3. When the schedule is exhausted (or a stop condition fires) the dispatcher drops
//!    its metric sender. In-flight executions keep theirs until they finish, so
//!    awaiting the aggregator drains them.
//!
//! # Falling behind
//! If the dispatcher wakes up later than `skew_tolerance` past an arrival, it logs the
//! skew and shifts the rest of the schedule by the lag. It never bursts to catch up.
//!
//! # Stopping
//! `max_duration` and the external shutdown signal only stop new dispatch. Each
//! in-flight execution is bounded by its own request timeouts.
pub mod open;
pub use open::{InjectionReport, OpenInjector};

use std::{future::Future, sync::Arc};

use tokio::sync::watch;

use crate::{
    aggregate::Aggregate, client::ProtocolClient, feeder::Feeder, metric::ExecutionMetric,
    scenario::Scenario,
};

/// Runtime strategy that starts executions of a scenario.
pub trait Injector
where
    Self: Send + Sync + Sized,
{
    type Error;

    /// Runs the scenario until the injector's schedule ends or `shutdown` turns `true`,
    /// then waits for every started execution and returns the merged aggregate.
    fn inject<A, C, F>(
        &self,
        scenario: Arc<Scenario>,
        feeder: Arc<F>,
        client: Arc<C>,
        shutdown: watch::Receiver<bool>,
    ) -> impl Future<Output = Result<InjectionReport<A>, Self::Error>> + Send
    where
        A: Aggregate<Metric = ExecutionMetric> + 'static,
        C: ProtocolClient + 'static,
        F: Feeder + 'static;
}
