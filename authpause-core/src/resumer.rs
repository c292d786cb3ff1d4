//! Background resumption of threads parked on an authorization interrupt.
//!
//! Graph hosts park a thread when a tool raises a pending interrupt. The
//! [`Resumer`] periodically lists those threads, polls each one's pending
//! authorization, and resumes the thread once the user has answered. A
//! thread is never resumed twice concurrently, and a thread that vanished
//! between listing and resumption is skipped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::authorizer::{AuthorizationPoller, PollOutcome};
use crate::context::ResumeMarker;
use crate::interrupt::{Interrupt, InterruptKind};
use crate::store::AuthStore;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Errors from a [`ThreadStore`]
#[derive(Debug, thiserror::Error)]
pub enum ThreadStoreError {
    /// The thread no longer exists (or is no longer interrupted)
    #[error("thread not found: {0}")]
    NotFound(String),

    #[error("thread store error: {0}")]
    Other(String),
}

/// A thread parked on an authorization interrupt
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptedThread {
    pub thread_id: String,
    pub interrupt: Interrupt,
    /// Key of the pending authorization in the auth store
    pub store_key: String,
    pub metadata: Map<String, Value>,
}

impl InterruptedThread {
    /// A thread keyed by its interrupt's tool call id
    pub fn new(thread_id: impl Into<String>, interrupt: Interrupt) -> Self {
        let store_key = interrupt.tool_call_id().to_string();
        Self {
            thread_id: thread_id.into(),
            interrupt,
            store_key,
            metadata: Map::new(),
        }
    }

    pub fn with_store_key(mut self, key: impl Into<String>) -> Self {
        self.store_key = key.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Selects which interrupted threads a resumer watches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadFilter {
    pub graph_id: Option<String>,
    /// Every pair must match the thread's metadata
    pub metadata: Map<String, Value>,
}

impl ThreadFilter {
    pub fn graph(graph_id: impl Into<String>) -> Self {
        Self {
            graph_id: Some(graph_id.into()),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn matches(&self, thread: &InterruptedThread) -> bool {
        if let Some(graph_id) = &self.graph_id {
            if thread.metadata.get("graph_id").and_then(Value::as_str) != Some(graph_id) {
                return false;
            }
        }
        self.metadata
            .iter()
            .all(|(k, v)| thread.metadata.get(k) == Some(v))
    }
}

/// What a parked thread is resumed with
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeValue {
    /// The user approved; the credential is parked under the thread's key
    Approved { tool_call_id: String },
    /// The user denied; the thread should route to its terminal path
    Denied(Interrupt),
}

impl ResumeValue {
    /// The value handed to the thread: a resume marker, or the denial
    /// interrupt's JSON form
    pub fn to_value(&self) -> Value {
        match self {
            ResumeValue::Approved { tool_call_id } => ResumeMarker::new()
                .with_data("toolCallId", Value::String(tool_call_id.clone()))
                .to_value(),
            ResumeValue::Denied(interrupt) => interrupt.to_value().unwrap_or(Value::Null),
        }
    }
}

/// Host-side storage of graph threads
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Threads currently parked on an interrupt and matching `filter`
    async fn list_interrupted(
        &self,
        filter: &ThreadFilter,
    ) -> Result<Vec<InterruptedThread>, ThreadStoreError>;

    /// Resume a parked thread
    async fn resume(&self, thread_id: &str, value: ResumeValue) -> Result<(), ThreadStoreError>;
}

/// How one thread fared in a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadOutcome {
    Resumed,
    Denied,
    Pending,
    /// Not a pending interrupt, already in flight, or nothing left to poll
    Skipped,
    /// The thread disappeared before it could be resumed
    Vanished,
    Failed,
}

/// Counts of [`ThreadOutcome`]s from one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub resumed: usize,
    pub denied: usize,
    pub pending: usize,
    pub skipped: usize,
    pub vanished: usize,
    pub failed: usize,
}

impl TickReport {
    fn record(&mut self, outcome: ThreadOutcome) {
        match outcome {
            ThreadOutcome::Resumed => self.resumed += 1,
            ThreadOutcome::Denied => self.denied += 1,
            ThreadOutcome::Pending => self.pending += 1,
            ThreadOutcome::Skipped => self.skipped += 1,
            ThreadOutcome::Vanished => self.vanished += 1,
            ThreadOutcome::Failed => self.failed += 1,
        }
    }
}

/// Releases a claimed thread id when dropped
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    thread_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.thread_id);
    }
}

/// Polls pending authorizations for parked threads and resumes them
pub struct Resumer {
    threads: Arc<dyn ThreadStore>,
    poller: Arc<dyn AuthorizationPoller>,
    store: Arc<dyn AuthStore>,
    filter: ThreadFilter,
    interval: Duration,
    in_flight: Mutex<HashSet<String>>,
}

impl Resumer {
    /// `store` receives approved credentials for the resumed call to consume
    pub fn new(
        threads: Arc<dyn ThreadStore>,
        poller: Arc<dyn AuthorizationPoller>,
        store: Arc<dyn AuthStore>,
    ) -> Self {
        Self {
            threads,
            poller,
            store,
            filter: ThreadFilter::default(),
            interval: DEFAULT_TICK_INTERVAL,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_filter(mut self, filter: ThreadFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn claim(&self, thread_id: &str) -> Option<InFlight<'_>> {
        let mut set = self.in_flight.lock();
        if !set.insert(thread_id.to_string()) {
            return None;
        }
        Some(InFlight {
            set: &self.in_flight,
            thread_id: thread_id.to_string(),
        })
    }

    /// Number of threads currently being processed
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// List, poll, and resume once.
    ///
    /// Only a failure to list threads is an error; per-thread failures are
    /// counted in the report.
    pub async fn tick(&self) -> crate::Result<TickReport> {
        let threads = self.threads.list_interrupted(&self.filter).await?;
        let outcomes = join_all(
            threads
                .iter()
                .filter(|thread| self.filter.matches(thread))
                .map(|thread| self.process(thread)),
        )
        .await;

        let mut report = TickReport::default();
        for outcome in outcomes {
            report.record(outcome);
        }
        if report != TickReport::default() {
            log::debug!("resumer tick: {:?}", report);
        }
        Ok(report)
    }

    /// Poll one thread's authorization and resume it if settled
    pub async fn process(&self, thread: &InterruptedThread) -> ThreadOutcome {
        if !thread.interrupt.is_pending() {
            return ThreadOutcome::Skipped;
        }

        let _claim = match self.claim(&thread.thread_id) {
            Some(claim) => claim,
            None => return ThreadOutcome::Skipped,
        };

        let outcome = match self.poller.poll(&thread.store_key).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("polling authorization for {} failed: {}", thread.thread_id, e);
                return ThreadOutcome::Failed;
            }
        };

        match outcome {
            PollOutcome::Pending(_) | PollOutcome::SlowDown(_) => ThreadOutcome::Pending,
            PollOutcome::Unknown => ThreadOutcome::Skipped,
            PollOutcome::Approved(credential) => {
                if let Err(e) = self.store.save_credential(&thread.store_key, credential).await {
                    log::warn!("parking credential for {} failed: {}", thread.thread_id, e);
                    return ThreadOutcome::Failed;
                }
                let value = ResumeValue::Approved {
                    tool_call_id: thread.interrupt.tool_call_id().to_string(),
                };
                match self.resume(thread, value).await {
                    ThreadOutcome::Vanished => {
                        // Nobody will consume it
                        if let Err(e) = self.store.take_credential(&thread.store_key).await {
                            log::warn!("discarding credential for {} failed: {}", thread.thread_id, e);
                        }
                        ThreadOutcome::Vanished
                    }
                    other => other,
                }
            }
            PollOutcome::Denied { reason } => {
                let interrupt = Interrupt::new(
                    thread.interrupt.tool_call_id(),
                    InterruptKind::AccessDenied { reason },
                );
                match self.resume(thread, ResumeValue::Denied(interrupt)).await {
                    ThreadOutcome::Resumed => ThreadOutcome::Denied,
                    other => other,
                }
            }
        }
    }

    async fn resume(&self, thread: &InterruptedThread, value: ResumeValue) -> ThreadOutcome {
        match self.threads.resume(&thread.thread_id, value).await {
            Ok(()) => {
                log::info!("resumed thread {}", thread.thread_id);
                ThreadOutcome::Resumed
            }
            Err(ThreadStoreError::NotFound(_)) => {
                log::debug!("thread {} vanished before resume", thread.thread_id);
                ThreadOutcome::Vanished
            }
            Err(e) => {
                log::warn!("resuming thread {} failed: {}", thread.thread_id, e);
                ThreadOutcome::Failed
            }
        }
    }

    /// Tick on an interval until `cancel` fires
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::debug!("resumer stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.tick().await {
                            log::warn!("resumer tick failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::AuthorizeError;
    use crate::credential::Credential;
    use crate::store::MemoryAuthStore;
    use crate::test_utils::MockThreadStore;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Poller answering from a script, with an optional delay per poll
    #[derive(Default)]
    struct ScriptedPoller {
        outcomes: Mutex<VecDeque<PollOutcome>>,
        delay: Option<Duration>,
        polls: Mutex<usize>,
    }

    impl ScriptedPoller {
        fn with(outcomes: Vec<PollOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl AuthorizationPoller for ScriptedPoller {
        async fn poll(&self, _key: &str) -> Result<PollOutcome, AuthorizeError> {
            *self.polls.lock() += 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self
                .outcomes
                .lock()
                .pop_front()
                .unwrap_or(PollOutcome::Unknown))
        }
    }

    fn pending_thread(thread_id: &str, call_id: &str) -> InterruptedThread {
        InterruptedThread::new(
            thread_id,
            Interrupt::new(
                call_id,
                InterruptKind::CibaPending {
                    auth_req_id: "req".into(),
                    interval: 5,
                    expires_in: None,
                },
            ),
        )
    }

    struct OfflineThreads;

    #[async_trait]
    impl ThreadStore for OfflineThreads {
        async fn list_interrupted(
            &self,
            _filter: &ThreadFilter,
        ) -> Result<Vec<InterruptedThread>, ThreadStoreError> {
            Err(ThreadStoreError::Other("connection refused".into()))
        }

        async fn resume(&self, _thread_id: &str, _value: ResumeValue) -> Result<(), ThreadStoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_tick_reports_listing_failure_as_store_error() {
        let resumer = Resumer::new(
            Arc::new(OfflineThreads),
            Arc::new(ScriptedPoller::default()),
            Arc::new(MemoryAuthStore::new()),
        );
        let err = resumer.tick().await.unwrap_err();
        assert!(err.is_store());
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_approved_thread_resumed_and_credential_parked() {
        let threads = Arc::new(MockThreadStore::new());
        threads.add(pending_thread("t1", "call_1"));
        let store = Arc::new(MemoryAuthStore::new());
        let poller = Arc::new(ScriptedPoller::with(vec![PollOutcome::Approved(
            Credential::new("tok"),
        )]));

        let resumer = Resumer::new(threads.clone(), poller, store.clone());
        let report = resumer.tick().await.unwrap();

        assert_eq!(report.resumed, 1);
        let resumes = threads.resumes();
        assert_eq!(resumes.len(), 1);
        assert_eq!(resumes[0].0, "t1");
        assert_eq!(
            resumes[0].1.to_value(),
            json!({"continueInterruption": true, "toolCallId": "call_1"})
        );
        assert!(store.take_credential("call_1").await.unwrap().is_some());

        // Resumed threads are no longer listed
        assert_eq!(resumer.tick().await.unwrap(), TickReport::default());
    }

    #[tokio::test]
    async fn test_denied_thread_resumed_with_denial() {
        let threads = Arc::new(MockThreadStore::new());
        threads.add(pending_thread("t1", "call_1"));
        let poller = Arc::new(ScriptedPoller::with(vec![PollOutcome::Denied {
            reason: "declined".into(),
        }]));

        let resumer = Resumer::new(threads.clone(), poller, Arc::new(MemoryAuthStore::new()));
        let report = resumer.tick().await.unwrap();

        assert_eq!(report.denied, 1);
        match &threads.resumes()[0].1 {
            ResumeValue::Denied(interrupt) => {
                assert_eq!(interrupt.tool_call_id(), "call_1");
                assert_eq!(interrupt.code(), "ACCESS_DENIED");
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pending_thread_left_parked() {
        let threads = Arc::new(MockThreadStore::new());
        threads.add(pending_thread("t1", "call_1"));
        let poller = Arc::new(ScriptedPoller::with(vec![PollOutcome::Pending(
            InterruptKind::CibaPending {
                auth_req_id: "req".into(),
                interval: 5,
                expires_in: None,
            },
        )]));

        let resumer = Resumer::new(threads.clone(), poller, Arc::new(MemoryAuthStore::new()));
        let report = resumer.tick().await.unwrap();
        assert_eq!(report.pending, 1);
        assert!(threads.resumes().is_empty());
    }

    #[tokio::test]
    async fn test_vanished_thread_is_noop() {
        let threads = Arc::new(MockThreadStore::new());
        threads.add(pending_thread("t1", "call_1"));
        threads.vanish_on_resume("t1");
        let store = Arc::new(MemoryAuthStore::new());
        let poller = Arc::new(ScriptedPoller::with(vec![PollOutcome::Approved(
            Credential::new("tok"),
        )]));

        let resumer = Resumer::new(threads.clone(), poller, store.clone());
        let report = resumer.tick().await.unwrap();

        assert_eq!(report.vanished, 1);
        assert!(threads.resumes().is_empty());
        assert!(store.take_credential("call_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_ticks_resume_once() {
        let threads = Arc::new(MockThreadStore::new());
        threads.add(pending_thread("t1", "call_1"));
        let poller = Arc::new(ScriptedPoller {
            outcomes: Mutex::new(
                vec![
                    PollOutcome::Approved(Credential::new("tok")),
                    PollOutcome::Approved(Credential::new("tok")),
                ]
                .into(),
            ),
            delay: Some(Duration::from_millis(50)),
            polls: Mutex::new(0),
        });

        let resumer = Arc::new(Resumer::new(
            threads.clone(),
            poller.clone(),
            Arc::new(MemoryAuthStore::new()),
        ));

        let (a, b) = tokio::join!(resumer.tick(), resumer.tick());
        let a = a.unwrap();
        let b = b.unwrap();

        assert_eq!(a.resumed + b.resumed, 1);
        assert_eq!(a.skipped + b.skipped, 1);
        assert_eq!(*poller.polls.lock(), 1);
        assert_eq!(threads.resumes().len(), 1);
        assert_eq!(resumer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_non_pending_interrupts_skipped() {
        let threads = Arc::new(MockThreadStore::new());
        threads.add(InterruptedThread::new(
            "t1",
            Interrupt::new(
                "call_1",
                InterruptKind::FederatedConnection {
                    connection: "github".into(),
                    required_scopes: vec![],
                },
            ),
        ));
        let poller = Arc::new(ScriptedPoller::default());

        let resumer = Resumer::new(threads, poller.clone(), Arc::new(MemoryAuthStore::new()));
        let report = resumer.tick().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(*poller.polls.lock(), 0);
    }

    #[test]
    fn test_filter_matches_graph_and_metadata() {
        let thread = pending_thread("t1", "c")
            .with_metadata("graph_id", json!("agent"))
            .with_metadata("tenant", json!("acme"));

        assert!(ThreadFilter::default().matches(&thread));
        assert!(ThreadFilter::graph("agent").matches(&thread));
        assert!(!ThreadFilter::graph("other").matches(&thread));
        assert!(ThreadFilter::graph("agent")
            .with_metadata("tenant", json!("acme"))
            .matches(&thread));
        assert!(!ThreadFilter::default()
            .with_metadata("tenant", json!("globex"))
            .matches(&thread));
    }

    #[tokio::test]
    async fn test_spawn_stops_on_cancel() {
        let threads = Arc::new(MockThreadStore::new());
        threads.add(pending_thread("t1", "call_1"));
        let poller = Arc::new(ScriptedPoller::with(vec![PollOutcome::Approved(
            Credential::new("tok"),
        )]));

        let resumer = Arc::new(
            Resumer::new(threads.clone(), poller, Arc::new(MemoryAuthStore::new()))
                .with_interval(Duration::from_millis(10)),
        );
        let cancel = CancellationToken::new();
        let handle = resumer.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(threads.resumes().len(), 1);
    }
}
