//! Usage telemetry and error reporting side channels.
//!
//! Nothing here alters control flow: sinks and the error catcher only
//! observe what bindings report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One completed (or cancelled) interaction cycle of a binding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub session: Uuid,
    pub binding: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub cancelled: bool,
}

impl UsageRecord {
    /// Record a cycle that started at `started_at` and ends now.
    pub fn new(session: Uuid, binding: &str, started_at: DateTime<Utc>, cancelled: bool) -> Self {
        let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0);
        Self {
            id: Uuid::new_v4(),
            session,
            binding: binding.to_string(),
            started_at,
            duration_ms,
            cancelled,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Destination of usage records.
pub trait UsageSink {
    fn record(&self, usage: &UsageRecord);
}

/// Emits usage records as `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingUsageSink;

impl UsageSink for TracingUsageSink {
    fn record(&self, usage: &UsageRecord) {
        info!(
            binding = %usage.binding,
            session = %usage.session,
            duration_ms = usage.duration_ms,
            cancelled = usage.cancelled,
            "binding usage"
        );
    }
}

/// Keeps usage records in memory.
#[derive(Debug, Default)]
pub struct RecordingUsageSink {
    records: RefCell<Vec<UsageRecord>>,
}

impl RecordingUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.borrow().clone()
    }
}

impl UsageSink for RecordingUsageSink {
    fn record(&self, usage: &UsageRecord) {
        self.records.borrow_mut().push(usage.clone());
    }
}

/// Sends a JSON body to an endpoint. Injected by the host application.
pub type Transport = Box<dyn Fn(&str, &str) -> Result<(), String>>;

/// Posts every usage record as JSON to a remote endpoint.
///
/// Failures are logged and dropped.
pub struct RemoteUsageSink {
    endpoint: String,
    transport: Transport,
}

impl RemoteUsageSink {
    pub fn new<F>(endpoint: impl Into<String>, transport: F) -> Self
    where
        F: Fn(&str, &str) -> Result<(), String> + 'static,
    {
        Self {
            endpoint: endpoint.into(),
            transport: Box::new(transport),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl UsageSink for RemoteUsageSink {
    fn record(&self, usage: &UsageRecord) {
        let body = match usage.to_json() {
            Ok(body) => body,
            Err(error) => {
                warn!(%error, "cannot serialise usage record");
                return;
            }
        };
        if let Err(error) = (self.transport)(&self.endpoint, &body) {
            warn!(endpoint = %self.endpoint, %error, "usage post failed");
        }
    }
}

impl std::fmt::Debug for RemoteUsageSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteUsageSink")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// An error caught somewhere in the binding layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    /// Binding (or component) that caught the error.
    pub source: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

type ErrorNotifier = Box<dyn Fn(&ReportedError)>;

/// Default number of errors an [`ErrorCatcher`] retains.
pub const DEFAULT_ERROR_CAPACITY: usize = 100;

/// Collects caught errors and forwards them to subscribers.
///
/// Only the most recent errors are retained; subscribers see every one.
pub struct ErrorCatcher {
    errors: RefCell<VecDeque<ReportedError>>,
    capacity: usize,
    notifiers: RefCell<Vec<ErrorNotifier>>,
}

impl ErrorCatcher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ERROR_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            errors: RefCell::new(VecDeque::new()),
            capacity,
            notifiers: RefCell::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe<F>(&self, notifier: F)
    where
        F: Fn(&ReportedError) + 'static,
    {
        self.notifiers.borrow_mut().push(Box::new(notifier));
    }

    pub fn report(&self, source: &str, error: &dyn std::error::Error) {
        let reported = ReportedError {
            source: source.to_string(),
            message: error.to_string(),
            timestamp: Utc::now(),
        };
        debug!(source = %reported.source, message = %reported.message, "error reported");
        for notifier in self.notifiers.borrow().iter() {
            notifier(&reported);
        }
        if self.capacity == 0 {
            return;
        }
        let mut errors = self.errors.borrow_mut();
        while errors.len() >= self.capacity {
            errors.pop_front();
        }
        errors.push_back(reported);
    }

    /// Retained errors, oldest first.
    pub fn errors(&self) -> Vec<ReportedError> {
        self.errors.borrow().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.errors.borrow_mut().clear();
    }
}

impl Default for ErrorCatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ErrorCatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorCatcher")
            .field("errors", &self.errors.borrow().len())
            .field("notifiers", &self.notifiers.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandError;
    use chrono::Duration;
    use std::rc::Rc;

    fn record(cancelled: bool) -> UsageRecord {
        UsageRecord::new(Uuid::new_v4(), "drag", Utc::now() - Duration::milliseconds(40), cancelled)
    }

    #[test]
    fn usage_record_measures_duration() {
        let usage = record(false);
        assert!(usage.duration_ms >= 40);
        assert_eq!(usage.binding, "drag");
    }

    #[test]
    fn usage_record_json_has_every_field() {
        let json: serde_json::Value = serde_json::from_str(&record(true).to_json().unwrap()).unwrap();
        for field in ["id", "session", "binding", "started_at", "duration_ms", "cancelled"] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["cancelled"], serde_json::Value::Bool(true));
    }

    #[test]
    fn remote_sink_posts_json_to_the_endpoint() {
        let posts = Rc::new(RefCell::new(Vec::new()));
        let sent = posts.clone();
        let sink = RemoteUsageSink::new("https://usage.example/api", move |endpoint, body| {
            sent.borrow_mut().push((endpoint.to_string(), body.to_string()));
            Ok(())
        });
        let usage = record(false);

        sink.record(&usage);

        let posts = posts.borrow();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "https://usage.example/api");
        let decoded: UsageRecord = serde_json::from_str(&posts[0].1).unwrap();
        assert_eq!(decoded, usage);
    }

    #[test]
    fn remote_sink_failures_are_swallowed() {
        let sink = RemoteUsageSink::new("https://usage.example/api", |_, _| Err("offline".to_string()));
        sink.record(&record(false));
    }

    #[test]
    fn error_catcher_notifies_subscribers() {
        let catcher = ErrorCatcher::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        catcher.subscribe(move |e| sink.borrow_mut().push(e.message.clone()));

        catcher.report("drag", &CommandError::execution("Move", "locked"));

        assert_eq!(*seen.borrow(), vec!["command 'Move' failed: locked".to_string()]);
        assert_eq!(catcher.errors()[0].source, "drag");
        catcher.clear();
        assert!(catcher.errors().is_empty());
    }

    #[test]
    fn error_catcher_keeps_the_latest_errors() {
        let catcher = ErrorCatcher::with_capacity(2);
        let seen = Rc::new(RefCell::new(0));
        let count = seen.clone();
        catcher.subscribe(move |_| *count.borrow_mut() += 1);

        for reason in ["first", "second", "third"] {
            catcher.report("drag", &CommandError::execution("Move", reason));
        }

        let kept: Vec<_> = catcher.errors().into_iter().map(|e| e.message).collect();
        assert_eq!(
            kept,
            vec![
                "command 'Move' failed: second".to_string(),
                "command 'Move' failed: third".to_string()
            ]
        );
        assert_eq!(*seen.borrow(), 3);
    }
}
