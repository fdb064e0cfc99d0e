//! Feeders produce the [`Record`] that seeds each virtual user's session.
//!
//! A feeder is shared by every execution the injector starts, so `next` takes `&self`
//! and implementations must be `Send + Sync`. Each call hands out a complete record
//! that no other caller can observe.
use std::{
    collections::{BTreeMap, btree_map},
    sync::Mutex,
};

use crate::{error::FeederError, session::Value};

/// Immutable field map fed into a single session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fails with the first of `fields` this record lacks.
    pub fn require<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> Result<(), FeederError> {
        match fields.into_iter().find(|f| !self.contains(f)) {
            Some(missing) => Err(FeederError::MissingField(missing.to_owned())),
            None => Ok(()),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

pub trait Feeder: Send + Sync {
    fn next(&self) -> Result<Record, FeederError>;
}

/// Feeds whatever the wrapped closure produces.
pub struct FnFeeder<F>(F);

impl<F> FnFeeder<F>
where
    F: Fn() -> Result<Record, FeederError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Feeder for FnFeeder<F>
where
    F: Fn() -> Result<Record, FeederError> + Send + Sync,
{
    fn next(&self) -> Result<Record, FeederError> {
        (self.0)()
    }
}

/// Feeds records from an iterator, then reports [`FeederError::Exhausted`].
pub struct IterFeeder<I> {
    inner: Mutex<I>,
}

impl<I> IterFeeder<I>
where
    I: Iterator<Item = Record> + Send,
{
    pub fn new(records: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            inner: Mutex::new(records.into_iter()),
        }
    }
}

impl<I> Feeder for IterFeeder<I>
where
    I: Iterator<Item = Record> + Send,
{
    fn next(&self) -> Result<Record, FeederError> {
        // A poisoned lock only means another caller panicked mid-`next`; the
        // iterator itself is still usable.
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.next().ok_or(FeederError::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    };

    use super::*;

    #[test]
    fn require_reports_first_missing_field() {
        let record: Record = [("id", "1"), ("nome", "Ana")].into_iter().collect();
        assert_eq!(record.require(["id", "nome"]), Ok(()));
        assert_eq!(
            record.require(["id", "stack", "apelido"]),
            Err(FeederError::MissingField("stack".into()))
        );
    }

    #[test]
    fn iter_feeder_exhausts() {
        let feeder = IterFeeder::new(vec![Record::default()]);
        assert!(feeder.next().is_ok());
        assert_eq!(feeder.next(), Err(FeederError::Exhausted));
        assert_eq!(feeder.next(), Err(FeederError::Exhausted));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fn_feeder_is_safe_under_concurrent_calls() {
        let counter = Arc::new(AtomicI64::new(0));
        let c = counter.clone();
        let feeder = Arc::new(FnFeeder::new(move || {
            let id = c.fetch_add(1, Ordering::Relaxed);
            Ok([("id", Value::Number(id))].into_iter().collect())
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let feeder = feeder.clone();
                tokio::spawn(async move {
                    (0..100)
                        .map(|_| feeder.next().map(|r| r.get("id").cloned()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in futures::future::join_all(handles).await {
            for id in handle.unwrap() {
                ids.push(id.unwrap().unwrap());
            }
        }
        let total = ids.len();
        ids.sort_by_key(|v| v.to_string());
        ids.dedup();
        assert_eq!(total, 800);
        assert_eq!(ids.len(), 800);
    }
}
