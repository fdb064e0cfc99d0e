use std::sync::Arc;

use tokio::sync::watch;
use typed_builder::TypedBuilder;

use crate::{
    aggregate::Aggregate,
    client::ProtocolClient,
    feeder::Feeder,
    injector::{InjectionReport, Injector},
    metric::ExecutionMetric,
    scenario::Scenario,
};

/// Ties a scenario to the collaborators that run it.
///
/// Heavy collaborators (clients with connection pools, feeders) are created once
/// here and shared by every execution; never create them per virtual user.
#[derive(TypedBuilder)]
pub struct Simulation<C, F, I> {
    #[builder(setter(into))]
    pub scenario: Arc<Scenario>,
    pub feeder: Arc<F>,
    pub client: Arc<C>,
    pub injector: I,
}

impl<C, F, I> Simulation<C, F, I>
where
    C: ProtocolClient + 'static,
    F: Feeder + 'static,
    I: Injector,
{
    /// Runs the whole profile.
    pub async fn run<A>(&self) -> Result<InjectionReport<A>, I::Error>
    where
        A: Aggregate<Metric = ExecutionMetric> + 'static,
    {
        let (_stop, shutdown) = watch::channel(false);
        self.run_until(shutdown).await
    }

    /// Runs until the profile ends or `true` is sent on the shutdown channel.
    pub async fn run_until<A>(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<InjectionReport<A>, I::Error>
    where
        A: Aggregate<Metric = ExecutionMetric> + 'static,
    {
        tracing::info!("Running simulation: {}!", self.scenario.name());
        let report = self
            .injector
            .inject(
                self.scenario.clone(),
                self.feeder.clone(),
                self.client.clone(),
                shutdown,
            )
            .await;
        tracing::info!("Done running simulation: {}!", self.scenario.name());
        report
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        aggregate::RunSummary,
        client::Response,
        feeder::{IterFeeder, Record},
        injector::OpenInjector,
        profile::{Phase, Profile},
        session::Value,
        step::{Condition, Method, Request, SaveRule},
        testing::{Reply, ScriptedClient},
    };

    #[tokio::test(start_paused = true)]
    async fn runs_scenario_for_every_record() {
        let records = (0..3).map(|i| [("id", Value::Number(i))].into_iter().collect::<Record>());
        let simulation = Simulation::builder()
            .scenario(
                Scenario::new("ids")
                    .requires(["id"])
                    .exec(
                        Request::builder()
                            .name("create")
                            .method(Method::Post)
                            .url("/ids/#{id}")
                            .save(vec![SaveRule::status("status")])
                            .build(),
                    )
                    .do_if(
                        Condition::equals("status", 200u16),
                        vec![Request::builder().name("read").url("/ids/#{id}").build().into()],
                    ),
            )
            .feeder(Arc::new(IterFeeder::new(records)))
            .client(Arc::new(ScriptedClient::new([
                Reply::Respond(Response::new(200)),
                Reply::Respond(Response::new(200)),
                Reply::Respond(Response::new(201)),
            ])))
            .injector(
                OpenInjector::builder()
                    .profile(Profile::new(vec![Phase::constant(1.0, Duration::from_secs(3))]).unwrap())
                    .build(),
            )
            .build();

        let report: InjectionReport<RunSummary> = simulation.run().await.unwrap();

        assert_eq!(report.dispatched, 3);
        assert_eq!(report.aggregate.completed, 3);
        // first user: POST + GET, second user: POST answered 201 → no GET, third: POST + GET
        let urls: Vec<_> = simulation.client.sent().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, ["/ids/0", "/ids/0", "/ids/1", "/ids/2", "/ids/2"]);
    }
}
