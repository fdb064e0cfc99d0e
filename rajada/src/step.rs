//! Steps are plain data: a scenario is built once, with builders, and then only read
//! by the executions that walk it.
use std::{fmt, time::Duration};

use typed_builder::TypedBuilder;

use crate::{
    session::{Session, Value},
    template::Template,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicate over the session, used by conditional blocks and guarded save rules.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists(String),
    Equals(String, Value),
    Not(Box<Condition>),
    All(Vec<Condition>),
}

impl Condition {
    pub fn exists(key: impl Into<String>) -> Self {
        Condition::Exists(key.into())
    }

    pub fn equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Equals(key.into(), value.into())
    }

    pub fn not(inner: Condition) -> Self {
        Condition::Not(Box::new(inner))
    }

    pub fn eval(&self, session: &Session) -> bool {
        match self {
            Condition::Exists(key) => session.contains(key),
            Condition::Equals(key, value) => session.get(key) == Some(value),
            Condition::Not(inner) => !inner.eval(session),
            Condition::All(all) => all.iter().all(|c| c.eval(session)),
        }
    }
}

/// Where a save rule reads its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum Extractor {
    /// The response status, stored as a number.
    Status,
    /// A response header; the name is matched case-insensitively.
    Header(String),
    Body,
    /// A JSON pointer (RFC 6901) into a JSON response body.
    JsonPointer(String),
}

/// Saves part of an accepted response into the session.
///
/// Rules of a request run in order, after the response was accepted. A rule with a
/// guard only runs when the guard holds at that moment, so it can depend on values
/// saved by the rules before it.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRule {
    pub extractor: Extractor,
    pub key: String,
    pub when: Option<Condition>,
}

impl SaveRule {
    pub fn new(extractor: Extractor, key: impl Into<String>) -> Self {
        Self {
            extractor,
            key: key.into(),
            when: None,
        }
    }

    pub fn status(key: impl Into<String>) -> Self {
        Self::new(Extractor::Status, key)
    }

    pub fn header(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(Extractor::Header(name.into()), key)
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.when = Some(condition);
        self
    }
}

/// Statuses accepted when a request does not name its own set.
pub fn default_accepts(status: u16) -> bool {
    (200..300).contains(&status) || status == 304
}

/// Shorthand for a templated header entry of [`Request::headers`].
pub fn header(name: impl Into<String>, value: &str) -> (String, Template) {
    (name.into(), Template::new(value))
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct Request {
    /// Label used in logs and metrics.
    #[builder(setter(into))]
    pub name: String,
    #[builder(default)]
    pub method: Method,
    /// Either a path, joined onto the client's base URL, or an absolute URL.
    #[builder(setter(into))]
    pub url: Template,
    #[builder(default)]
    pub headers: Vec<(String, Template)>,
    #[builder(default, setter(strip_option, into))]
    pub body: Option<Template>,
    #[builder(default = Duration::from_secs(60))]
    pub timeout: Duration,
    /// Accepted statuses; `None` accepts 2xx and 304.
    #[builder(default, setter(strip_option))]
    pub accept: Option<Vec<u16>>,
    #[builder(default)]
    pub save: Vec<SaveRule>,
}

impl Request {
    pub fn accepts(&self, status: u16) -> bool {
        match &self.accept {
            Some(statuses) => statuses.contains(&status),
            None => default_accepts(status),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Request(Request),
    Pause { min: Duration, max: Duration },
    Conditional { condition: Condition, steps: Vec<Step> },
}

impl Step {
    pub fn pause(min: Duration, max: Duration) -> Self {
        Step::Pause { min, max }
    }
}

impl From<Request> for Step {
    fn from(request: Request) -> Self {
        Step::Request(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions() {
        let mut s = Session::new();
        s.set("httpStatus", 201u16);

        assert!(Condition::exists("httpStatus").eval(&s));
        assert!(!Condition::exists("location").eval(&s));
        assert!(Condition::equals("httpStatus", 201u16).eval(&s));
        assert!(Condition::not(Condition::exists("location")).eval(&s));
        assert!(
            Condition::All(vec![
                Condition::exists("httpStatus"),
                Condition::equals("httpStatus", 201i64)
            ])
            .eval(&s)
        );
    }

    #[test]
    fn status_equality_is_numeric() {
        let mut s = Session::new();
        s.set("httpStatus", 201u16);
        assert!(!Condition::equals("httpStatus", "201").eval(&s));
    }

    #[test]
    fn accepted_statuses() {
        let req = Request::builder()
            .name("criando")
            .url("/pessoas")
            .accept(vec![201, 400, 422])
            .build();
        assert!(req.accepts(201));
        assert!(req.accepts(422));
        assert!(!req.accepts(200));
        assert!(!req.accepts(500));

        let req = Request::builder().name("consultando").url("/").build();
        assert!(req.accepts(200));
        assert!(req.accepts(304));
        assert!(!req.accepts(404));
    }
}
