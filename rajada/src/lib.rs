//! Rajada is an open-workload load generator for HTTP APIs.
//!
//! You describe what one virtual user does as a [`Scenario`]: requests, pauses and
//! conditional blocks over a per-user [`session::Session`]. A [`profile::Profile`] then says
//! how many users start per second, and the [`OpenInjector`] starts them on schedule
//! whether or not earlier users have finished. A slow target therefore sees more
//! concurrent users, not fewer requests.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`Scenario`]: the ordered steps of one virtual user and the record fields it needs.
//! - [`Feeder`]: hands every new user the record its session starts from.
//! - [`ProtocolClient`]: sends one prepared request. [`client::HttpClient`] wraps a pooled
//!   `reqwest` client; anything else (a scripted fake in tests) works too.
//! - [`execution::Execution`]: the per-user state machine. It walks the steps, resolves
//!   `#{var}` templates, bounds each request by its timeout and ends `Completed`,
//!   `Aborted` or `Failed`.
//! - [`Injector`]: turns a profile into running executions. [`OpenInjector`] is the
//!   open-workload implementation.
//! - [`Metric`] / [`Aggregate`]: every execution yields an
//!   [`metric::ExecutionMetric`]; an aggregator task folds them into an `Aggregate`
//!   such as [`aggregate::RunSummary`].
//! - [`Simulation`]: glue that ties a scenario, a feeder, a client and an injector.
//!
//! # Example
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use rajada::{
//!     OpenInjector, Scenario, Simulation,
//!     aggregate::RunSummary,
//!     client::HttpClient,
//!     config::ProtocolConfig,
//!     feeder::{FnFeeder, Record},
//!     profile::{Phase, Profile},
//!     step::{Condition, Method, Request, SaveRule},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Clients pool connections: build one and share it.
//!     let client = HttpClient::new(&ProtocolConfig::default())?;
//!     let feeder = FnFeeder::new(|| Ok(Record::from_iter([("user", "alice")])));
//!
//!     let scenario = Scenario::new("login")
//!         .requires(["user"])
//!         .exec(
//!             Request::builder()
//!                 .name("login")
//!                 .method(Method::Post)
//!                 .url("/login/#{user}")
//!                 .save(vec![SaveRule::header("Location", "home")])
//!                 .build(),
//!         )
//!         .pause(Duration::from_millis(10), Duration::from_millis(50))
//!         .do_if(
//!             Condition::exists("home"),
//!             vec![Request::builder().name("home").url("#{home}").build().into()],
//!         );
//!
//!     let report = Simulation::builder()
//!         .scenario(scenario)
//!         .feeder(Arc::new(feeder))
//!         .client(Arc::new(client))
//!         .injector(
//!             OpenInjector::builder()
//!                 .profile(Profile::new(vec![
//!                     Phase::constant(10.0, Duration::from_secs(30)),
//!                     Phase::ramp(100.0, Duration::from_secs(60)),
//!                 ])?)
//!                 .build(),
//!         )
//!         .build()
//!         .run::<RunSummary>()
//!         .await?;
//!
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```
//!
//! # Feature flags
//!
//! - `macros`: `#[metric]` and `#[aggregate]` attribute macros that derive the traits a
//!   custom metric or aggregate needs. (Enabled by default)
//! - `builtins`: the `reqwest`-backed [`client::HttpClient`] and the [`pessoas`]
//!   workload. (Enabled by default)
//! - `internals`: exposes the pure schedule math of [`profile`] and the dispatcher of
//!   [`injector::open`] for benchmarks and property tests.
//!
//! # Logging
//!
//! Rajada logs through `tracing` and never installs a subscriber; that is up to the
//! binary (see `examples/pessoas.rs`).

extern crate self as rajada;

/// Metric aggregators
pub mod aggregate;
/// Protocol clients and the responses they classify into outcomes
pub mod client;
/// Declarative settings loaded from JSON
pub mod config;
pub mod error;
/// Per-virtual-user state machine
pub mod execution;
pub mod feeder;
pub mod injector;
/// Per-execution metrics
pub mod metric;
#[cfg(feature = "builtins")]
pub mod pessoas;
/// Workload profiles and their arrival schedules
pub mod profile;
pub mod scenario;
pub mod session;
/// Glue that ties a scenario to its collaborators
pub mod simulation;
pub mod step;
pub mod template;

#[cfg(test)]
mod testing;

pub use aggregate::Aggregate;
pub use client::ProtocolClient;
pub use error::Error;
pub use feeder::Feeder;
pub use injector::{Injector, OpenInjector};
pub use metric::Metric;
pub use scenario::Scenario;
pub use simulation::Simulation;

#[cfg(feature = "macros")]
/// Procedural macros to reduce boilerplate
pub mod macros {
    pub use rajada_macros::*;
}

#[doc(hidden)]
pub mod __private {
    pub use serde;
}
