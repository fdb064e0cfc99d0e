//! The per-virtual-user state machine.
//!
//! ```text
//! Pending ──► Running ──► Completed
//!    │           ├──────► Failed   (rejected status, transport failure, failed save)
//!    └───────────┴──────► Aborted  (missing record field, unresolvable template)
//! ```
//!
//! An execution owns its [`Session`] for its whole life and walks the scenario's steps
//! strictly in order. Nothing it does is visible to other executions; whatever happens
//! ends up in the [`ExecutionMetric`] it returns.
use std::{slice, time::Duration};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{
    client::{Outcome, PreparedRequest, ProtocolClient, Response},
    error::{ExecutionError, TemplateError, TransportError},
    metric::{ExecutionMetric, RequestSample},
    scenario::Scenario,
    session::{Session, Value},
    step::{Extractor, Request, Step},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Running,
    Completed,
    Aborted,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Aborted | ExecutionState::Failed
        )
    }
}

/// A finished execution: its metric and the session as the last step left it.
#[derive(Debug)]
pub struct Finished {
    pub metric: ExecutionMetric,
    pub session: Session,
}

/// Why the walk stopped before the last step.
struct Halt {
    state: ExecutionState,
    error: ExecutionError,
}

impl Halt {
    fn aborted(error: impl Into<ExecutionError>) -> Self {
        Self {
            state: ExecutionState::Aborted,
            error: error.into(),
        }
    }

    fn failed(error: ExecutionError) -> Self {
        Self {
            state: ExecutionState::Failed,
            error,
        }
    }
}

pub struct Execution<'a, C> {
    scenario: &'a Scenario,
    client: &'a C,
    session: Session,
    state: ExecutionState,
    requests: Vec<RequestSample>,
}

impl<'a, C: ProtocolClient> Execution<'a, C> {
    pub fn new(scenario: &'a Scenario, client: &'a C, session: Session) -> Self {
        Self {
            scenario,
            client,
            session,
            state: ExecutionState::Pending,
            requests: Vec::new(),
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub async fn run(mut self) -> Finished {
        let started = Instant::now();

        let result = match self.check_required() {
            Ok(()) => {
                self.state = ExecutionState::Running;
                self.walk().await
            }
            Err(halt) => Err(halt),
        };

        let failure = match result {
            Ok(()) => {
                self.state = ExecutionState::Completed;
                None
            }
            Err(Halt { state, error }) => {
                self.state = state;
                Some(error.to_string())
            }
        };

        tracing::debug!(
            scenario = self.scenario.name(),
            state = ?self.state,
            failure = failure.as_deref(),
            "Execution finished"
        );

        Finished {
            metric: ExecutionMetric {
                state: self.state,
                duration: started.elapsed(),
                requests: self.requests,
                failure,
            },
            session: self.session,
        }
    }

    fn check_required(&self) -> Result<(), Halt> {
        match self
            .scenario
            .required_fields()
            .find(|field| !self.session.contains(field))
        {
            Some(missing) => Err(Halt::aborted(crate::error::FeederError::MissingField(
                missing.to_owned(),
            ))),
            None => Ok(()),
        }
    }

    async fn walk(&mut self) -> Result<(), Halt> {
        let scenario = self.scenario;
        let mut frames: Vec<slice::Iter<'a, Step>> = vec![scenario.steps().iter()];

        while let Some(frame) = frames.last_mut() {
            let Some(step) = frame.next() else {
                frames.pop();
                continue;
            };

            match step {
                Step::Request(request) => self.request(request).await?,
                Step::Pause { min, max } => tokio::time::sleep(pause_duration(*min, *max)).await,
                Step::Conditional { condition, steps } => {
                    if condition.eval(&self.session) {
                        frames.push(steps.iter());
                    }
                }
            }
        }
        Ok(())
    }

    async fn request(&mut self, request: &Request) -> Result<(), Halt> {
        let prepared = self.prepare(request).map_err(Halt::aborted)?;

        let started = Instant::now();
        let outcome = match tokio::time::timeout(request.timeout, self.client.send(prepared)).await
        {
            Ok(Ok(response)) if request.accepts(response.status) => Outcome::Success(response),
            Ok(Ok(response)) => Outcome::Rejected(response),
            Ok(Err(e)) => Outcome::TransportFailure(e),
            Err(_) => Outcome::TransportFailure(TransportError::Timeout(request.timeout)),
        };

        self.requests.push(RequestSample {
            name: request.name.clone(),
            status: outcome.status(),
            outcome: (&outcome).into(),
            latency: started.elapsed(),
        });

        match outcome {
            Outcome::Success(response) => self.save(request, &response),
            Outcome::Rejected(response) => Err(Halt::failed(ExecutionError::Rejected {
                request: request.name.clone(),
                status: response.status,
            })),
            Outcome::TransportFailure(source) => Err(Halt::failed(ExecutionError::Transport {
                request: request.name.clone(),
                source,
            })),
        }
    }

    fn prepare(&self, request: &Request) -> Result<PreparedRequest, TemplateError> {
        let headers = request
            .headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), value.resolve(&self.session)?)))
            .collect::<Result<Vec<_>, TemplateError>>()?;
        let body = request
            .body
            .as_ref()
            .map(|body| body.resolve(&self.session))
            .transpose()?;

        Ok(PreparedRequest {
            method: request.method,
            url: request.url.resolve(&self.session)?,
            headers,
            body,
            timeout: request.timeout,
        })
    }

    fn save(&mut self, request: &Request, response: &Response) -> Result<(), Halt> {
        for rule in &request.save {
            if rule.when.as_ref().is_some_and(|when| !when.eval(&self.session)) {
                continue;
            }
            let value = extract(&rule.extractor, response).ok_or_else(|| {
                Halt::failed(ExecutionError::Extraction {
                    request: request.name.clone(),
                    key: rule.key.clone(),
                })
            })?;
            self.session.set(rule.key.as_str(), value);
        }
        Ok(())
    }
}

fn extract(extractor: &Extractor, response: &Response) -> Option<Value> {
    match extractor {
        Extractor::Status => Some(Value::from(response.status)),
        Extractor::Header(name) => response.header(name).map(Value::from),
        Extractor::Body => Some(Value::from(response.body.as_str())),
        Extractor::JsonPointer(pointer) => {
            let json: serde_json::Value = serde_json::from_str(&response.body).ok()?;
            json.pointer(pointer).map(json_value)
        }
    }
}

fn json_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Number(i),
            None => Value::Text(n.to_string()),
        },
        serde_json::Value::Array(items) if items.iter().all(|i| i.is_string()) => Value::List(
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_owned))
                .collect(),
        ),
        other => Value::Text(other.to_string()),
    }
}

/// Uniform in `[min, max]`; a reversed range collapses to `min`.
pub fn pause_duration(min: Duration, max: Duration) -> Duration {
    if min >= max {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        error::FeederError,
        step::{Condition, Method, SaveRule},
        testing::{Reply, ScriptedClient},
    };

    fn create() -> Request {
        Request::builder()
            .name("create")
            .method(Method::Post)
            .url("/items")
            .body("{\"id\":\"#{id}\"}")
            .timeout(Duration::from_millis(500))
            .accept(vec![201, 422])
            .save(vec![
                SaveRule::status("status"),
                SaveRule::header("Location", "location")
                    .when(Condition::equals("status", 201u16)),
            ])
            .build()
    }

    fn read() -> Step {
        Request::builder()
            .name("read")
            .url("#{location}")
            .build()
            .into()
    }

    fn scenario() -> Scenario {
        Scenario::new("items")
            .requires(["id"])
            .exec(create())
            .pause(Duration::from_millis(1), Duration::from_millis(30))
            .do_if(Condition::exists("location"), vec![read()])
    }

    fn seeded() -> Session {
        let mut s = Session::new();
        s.set("id", "42");
        s
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_follows_location() {
        let client = ScriptedClient::new([
            Reply::Respond(Response::new(201).with_header("Location", "/items/42")),
            Reply::Respond(Response::new(200)),
        ]);
        let scenario = scenario();

        let finished = Execution::new(&scenario, &client, seeded()).run().await;

        assert_eq!(finished.metric.state, ExecutionState::Completed);
        assert_eq!(
            finished.session.get("location"),
            Some(&Value::from("/items/42"))
        );
        let sent = client.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].body.as_deref(), Some("{\"id\":\"42\"}"));
        assert_eq!(sent[1].method, Method::Get);
        assert_eq!(sent[1].url, "/items/42");
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_non_happy_status_skips_guarded_rules_and_block() {
        let client = ScriptedClient::new([Reply::Respond(Response::new(422))]);
        let scenario = scenario();

        let finished = Execution::new(&scenario, &client, seeded()).run().await;

        assert_eq!(finished.metric.state, ExecutionState::Completed);
        assert_eq!(client.sent().len(), 1);
        assert!(!finished.session.contains("location"));
        assert_eq!(finished.session.get("status"), Some(&Value::Number(422)));
        assert_eq!(finished.session.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_status_fails_without_further_steps() {
        let client = ScriptedClient::new([Reply::Respond(Response::new(500))]);
        let scenario = scenario();

        let finished = Execution::new(&scenario, &client, seeded()).run().await;

        assert_eq!(finished.metric.state, ExecutionState::Failed);
        assert_eq!(client.sent().len(), 1);
        assert!(!finished.session.contains("status"));
        assert!(finished.metric.failure.unwrap().contains("500"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_response_times_out() {
        let client = ScriptedClient::new([Reply::Delay(
            Duration::from_secs(5),
            Response::new(201).with_header("Location", "/items/42"),
        )]);
        let scenario = scenario();

        let finished = Execution::new(&scenario, &client, seeded()).run().await;

        assert_eq!(finished.metric.state, ExecutionState::Failed);
        assert_eq!(client.sent().len(), 1);
        assert_eq!(finished.metric.requests[0].status, None);
        assert_eq!(
            finished.metric.requests[0].outcome,
            crate::metric::OutcomeKind::TransportFailure
        );
        assert!(!finished.session.contains("location"));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_fails() {
        let client = ScriptedClient::new([Reply::Fail(TransportError::Connection(
            "refused".into(),
        ))]);
        let scenario = scenario();

        let finished = Execution::new(&scenario, &client, seeded()).run().await;

        assert_eq!(finished.metric.state, ExecutionState::Failed);
        assert!(finished.metric.failure.unwrap().contains("refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_required_field_aborts_before_any_request() {
        let client = ScriptedClient::new([]);
        let scenario = scenario();

        let finished = Execution::new(&scenario, &client, Session::new()).run().await;

        assert_eq!(finished.metric.state, ExecutionState::Aborted);
        assert!(client.sent().is_empty());
        assert_eq!(
            finished.metric.failure,
            Some(FeederError::MissingField("id".into()).to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_template_aborts() {
        let client = ScriptedClient::new([]);
        let scenario = Scenario::new("broken").exec(
            Request::builder()
                .name("read")
                .url("/items/#{nope}")
                .build(),
        );

        let finished = Execution::new(&scenario, &client, Session::new()).run().await;

        assert_eq!(finished.metric.state, ExecutionState::Aborted);
        assert!(client.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_happy_path_header_fails() {
        let client = ScriptedClient::new([Reply::Respond(Response::new(201))]);
        let scenario = scenario();

        let finished = Execution::new(&scenario, &client, seeded()).run().await;

        assert_eq!(finished.metric.state, ExecutionState::Failed);
        assert_eq!(client.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn later_save_rule_wins() {
        let client = ScriptedClient::new([Reply::Respond(
            Response::new(200)
                .with_header("X-First", "a")
                .with_header("X-Second", "b")
                .with_body(r#"{"user":{"id":7,"tags":["x","y"]}}"#),
        )]);
        let scenario = Scenario::new("saves").exec(
            Request::builder()
                .name("r")
                .url("/")
                .save(vec![
                    SaveRule::header("X-First", "v"),
                    SaveRule::header("X-Second", "v"),
                    SaveRule::new(Extractor::JsonPointer("/user/id".into()), "uid"),
                    SaveRule::new(Extractor::JsonPointer("/user/tags".into()), "tags"),
                ])
                .build(),
        );

        let finished = Execution::new(&scenario, &client, Session::new()).run().await;

        assert_eq!(finished.session.get("v"), Some(&Value::from("b")));
        assert_eq!(finished.session.get("uid"), Some(&Value::Number(7)));
        assert_eq!(
            finished.session.get("tags"),
            Some(&Value::List(vec!["x".into(), "y".into()]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn same_responses_same_path() {
        let replies = || {
            [
                Reply::Respond(Response::new(201).with_header("Location", "/items/42")),
                Reply::Respond(Response::new(200)),
            ]
        };
        let scenario = scenario();

        let first = ScriptedClient::new(replies());
        let a = Execution::new(&scenario, &first, seeded()).run().await;
        let second = ScriptedClient::new(replies());
        let b = Execution::new(&scenario, &second, seeded()).run().await;

        assert_eq!(first.sent(), second.sent());
        assert_eq!(a.session, b.session);
        assert_eq!(a.metric.state, b.metric.state);
    }

    #[tokio::test(start_paused = true)]
    async fn nested_blocks_run_in_order() {
        let client = ScriptedClient::new([]);
        let named = |name: &str| -> Step { Request::builder().name(name).url(name).build().into() };
        let mut session = Session::new();
        session.set("flag", 1i64);
        let scenario = Scenario::new("nested")
            .exec(Request::builder().name("a").url("a").build())
            .do_if(
                Condition::exists("flag"),
                vec![
                    named("b"),
                    Step::Conditional {
                        condition: Condition::exists("missing"),
                        steps: vec![named("skipped")],
                    },
                    named("c"),
                ],
            )
            .exec(Request::builder().name("d").url("d").build());

        let finished = Execution::new(&scenario, &client, session).run().await;

        let urls: Vec<_> = client.sent().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, ["a", "b", "c", "d"]);
        assert_eq!(finished.metric.requests.len(), 4);
    }

    #[test]
    fn pause_duration_stays_in_bounds() {
        let (min, max) = (Duration::from_millis(1), Duration::from_millis(30));
        for _ in 0..1000 {
            let d = pause_duration(min, max);
            assert!(d >= min && d <= max);
        }
        assert_eq!(pause_duration(max, min), max);
    }
}
