use std::time::Duration;

use crate::step::{Condition, Request, Step};

/// The journey of one virtual user.
///
/// Scenarios are assembled with chained calls and hold no runtime state: every
/// execution walks the same steps with its own [`Session`](crate::session::Session).
///
/// ```rust
/// use std::time::Duration;
/// use rajada::{Scenario, step::{Condition, Method, Request, Step}};
///
/// let scenario = Scenario::new("create and read")
///     .requires(["id"])
///     .exec(
///         Request::builder()
///             .name("create")
///             .method(Method::Post)
///             .url("/items/#{id}")
///             .build(),
///     )
///     .pause(Duration::from_millis(1), Duration::from_millis(30))
///     .do_if(
///         Condition::exists("location"),
///         vec![Request::builder().name("read").url("#{location}").build().into()],
///     );
///
/// assert_eq!(scenario.steps().len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scenario {
    name: String,
    requires: Vec<String>,
    steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Record fields that must be fed before an execution may start.
    pub fn requires<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn exec(mut self, request: Request) -> Self {
        self.steps.push(Step::Request(request));
        self
    }

    pub fn pause(mut self, min: Duration, max: Duration) -> Self {
        self.steps.push(Step::pause(min, max));
        self
    }

    pub fn do_if(mut self, condition: Condition, steps: Vec<Step>) -> Self {
        self.steps.push(Step::Conditional { condition, steps });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.requires.iter().map(String::as_str)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}
