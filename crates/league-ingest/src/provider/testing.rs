//! Scripted transport for orchestrator tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::transport::{ProviderRequest, Transport, TransportResponse};
use crate::errors::IngestError;

#[derive(Clone, Debug)]
pub(crate) enum Step {
    Respond(TransportResponse),
    Fail(IngestError),
}

impl Step {
    pub(crate) fn json(body: serde_json::Value) -> Self {
        Self::Respond(TransportResponse::ok(body.to_string()))
    }

    pub(crate) fn status(status: u16) -> Self {
        Self::Respond(TransportResponse::status(status))
    }
}

struct Route {
    url_contains: String,
    steps: VecDeque<Step>,
    last: Option<Step>,
}

/// Answers requests from per-URL scripts. Once a script runs out its last step
/// repeats; unmatched URLs get a 404.
pub(crate) struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<ProviderRequest>>,
    starts: Mutex<Vec<Instant>>,
    delay: Duration,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            starts: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn route(self, url_contains: &str, steps: Vec<Step>) -> Self {
        self.routes.lock().unwrap().push(Route {
            url_contains: url_contains.to_string(),
            steps: steps.into(),
            last: None,
        });
        self
    }

    /// Every call takes this long, so concurrency can be observed.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> Vec<ProviderRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// When each call reached the transport, in arrival order.
    pub(crate) fn call_starts(&self) -> Vec<Instant> {
        self.starts.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls_to(&self, url_contains: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(url_contains))
            .count()
    }

    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_step(&self, url: &str) -> Step {
        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes.iter_mut().find(|r| url.contains(&r.url_contains)) else {
            return Step::status(404);
        };
        match route.steps.pop_front() {
            Some(step) => {
                route.last = Some(step.clone());
                step
            }
            None => route.last.clone().unwrap_or_else(|| Step::status(404)),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        _provider: &str,
        request: &ProviderRequest,
    ) -> Result<TransportResponse, IngestError> {
        self.calls.lock().unwrap().push(request.clone());
        self.starts.lock().unwrap().push(Instant::now());
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let step = self.next_step(&request.url);

        self.current.fetch_sub(1, Ordering::SeqCst);
        match step {
            Step::Respond(response) => Ok(response),
            Step::Fail(error) => Err(error),
        }
    }
}
