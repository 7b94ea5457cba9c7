//! Pipeline engine and the four protocol pipelines.
//!
//! A pipeline is built by chaining stage builders and consumed by
//! `execute()`, which runs every stage in order on the calling thread.
//!
//! ## Expectations
//!
//! An `expect_*` stage registers a one-shot handler at the callback
//! endpoint. The handler canonicalizes the inbound message, applies the
//! harness manager operation, deregisters itself and fulfils its
//! expectation. `execute()` waits on every expectation after the last
//! stage, bounded by the configured wait.
//!
//! The engine does not reorder anything: an expectation must be registered
//! by a stage that runs before the stage triggering the counter-party.

mod consumer_negotiation;
mod consumer_transfer;
mod provider_negotiation;
mod provider_transfer;

pub use consumer_negotiation::ConsumerNegotiationPipeline;
pub use consumer_transfer::ConsumerTransferPipeline;
pub use provider_negotiation::ProviderNegotiationPipeline;
pub use provider_transfer::ProviderTransferPipeline;

use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tck_core::errors::TckError;
use tck_core::message::{CanonicalMessage, Canonicalizer};
use tracing::{debug, warn};

use crate::config::TckConfig;
use crate::endpoint::CallbackEndpoint;

/// A deferred pipeline step.
pub type Stage = Box<dyn FnOnce() -> Result<(), TckError> + Send>;

/// The entity a protocol pipeline drives, known once the first message
/// has been exchanged.
pub(crate) type Slot<T> = Arc<Mutex<Option<Arc<T>>>>;

pub(crate) fn occupied<T>(slot: &Slot<T>, what: &str) -> Result<Arc<T>, TckError> {
    slot.lock()
        .clone()
        .ok_or_else(|| TckError::Expectation(format!("No {what} established yet")))
}

/// Shared timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct PipelineTiming {
    pub wait: Duration,
    pub poll_interval: Duration,
    pub pause: Duration,
}

impl PipelineTiming {
    pub fn from_config(config: &TckConfig) -> Self {
        Self {
            wait: config.wait(),
            poll_interval: config.poll_interval,
            pause: config.pause,
        }
    }
}

// ── Expectations ────────────────────────────────────────────────────

/// Synchronization point satisfied when an awaited inbound message has
/// been handled.
#[derive(Debug)]
pub struct Expectation {
    pattern: String,
    outcome: Mutex<Option<Result<(), TckError>>>,
    signal: Condvar,
}

impl Expectation {
    fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            outcome: Mutex::new(None),
            signal: Condvar::new(),
        }
    }

    fn complete(&self, outcome: Result<(), TckError>) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
            self.signal.notify_all();
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        self.outcome.lock().is_some()
    }

    /// Blocks until the handler ran or `timeout` elapsed. A handler failure
    /// is returned as the wait's error.
    pub fn wait(&self, timeout: Duration) -> Result<(), TckError> {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.outcome.lock();
        while outcome.is_none() {
            if self.signal.wait_until(&mut outcome, deadline).timed_out() {
                break;
            }
        }
        match outcome.as_ref() {
            Some(result) => result.clone(),
            None => Err(TckError::Timeout(format!(
                "No message received for {} within {:?}",
                self.pattern, timeout
            ))),
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────────

/// Ordered stages plus expectation handles. Single use.
pub struct AsyncPipeline {
    endpoint: Arc<CallbackEndpoint>,
    canonicalizer: Arc<Canonicalizer>,
    timing: PipelineTiming,
    stages: Vec<Stage>,
    expectations: Vec<Arc<Expectation>>,
}

impl AsyncPipeline {
    pub fn new(
        endpoint: Arc<CallbackEndpoint>,
        canonicalizer: Arc<Canonicalizer>,
        timing: PipelineTiming,
    ) -> Self {
        Self {
            endpoint,
            canonicalizer,
            timing,
            stages: Vec::new(),
            expectations: Vec::new(),
        }
    }

    pub fn endpoint(&self) -> &Arc<CallbackEndpoint> {
        &self.endpoint
    }

    pub fn canonicalizer(&self) -> &Arc<Canonicalizer> {
        &self.canonicalizer
    }

    pub fn timing(&self) -> PipelineTiming {
        self.timing
    }

    /// Queues an arbitrary stage.
    pub fn then(mut self, stage: impl FnOnce() -> Result<(), TckError> + Send + 'static) -> Self {
        self.add_stage(stage);
        self
    }

    /// Polls `predicate` until it holds; fails with `Timeout` after the
    /// configured wait.
    pub fn then_wait(
        mut self,
        description: &str,
        predicate: impl Fn() -> bool + Send + 'static,
    ) -> Self {
        self.add_wait(description, move || Ok(predicate()));
        self
    }

    /// Fixed sleep before the next stage.
    pub fn then_pause(mut self) -> Self {
        self.add_pause();
        self
    }

    pub(crate) fn add_stage(&mut self, stage: impl FnOnce() -> Result<(), TckError> + Send + 'static) {
        self.stages.push(Box::new(stage));
    }

    pub(crate) fn add_pause(&mut self) {
        let pause = self.timing.pause;
        self.add_stage(move || {
            thread::sleep(pause);
            Ok(())
        });
    }

    /// Queues a polling wait. A predicate error ends the wait with that error.
    pub(crate) fn add_wait(
        &mut self,
        description: &str,
        predicate: impl Fn() -> Result<bool, TckError> + Send + 'static,
    ) {
        let description = description.to_string();
        let timing = self.timing;
        self.add_stage(move || poll_until(&description, timing, predicate));
    }

    /// Queues a stage registering a one-shot handler for `pattern`. The
    /// handler answers with the serialized result of `action`.
    pub(crate) fn add_expectation<F>(&mut self, pattern: &str, action: F)
    where
        F: Fn(&CanonicalMessage) -> Result<CanonicalMessage, TckError> + Send + Sync + 'static,
    {
        let expectation = Arc::new(Expectation::new(pattern));
        self.expectations.push(expectation.clone());

        let endpoint = self.endpoint.clone();
        let weak: Weak<CallbackEndpoint> = Arc::downgrade(&self.endpoint);
        let canonicalizer = self.canonicalizer.clone();
        let pattern = pattern.to_string();
        self.add_stage(move || {
            let handler_pattern = pattern.clone();
            endpoint.register_handler(&pattern, move |request| {
                let outcome = request
                    .json_body()
                    .and_then(|body| canonicalizer.canonicalize(body))
                    .and_then(|message| action(&message))
                    .and_then(|response| canonicalizer.serialize(&response));
                if let Some(endpoint) = weak.upgrade() {
                    endpoint.deregister_handler(&handler_pattern);
                }
                expectation.complete(outcome.as_ref().map(|_| ()).map_err(Clone::clone));
                outcome.map(Some)
            })
        });
    }

    /// Runs every stage, then waits on every expectation.
    ///
    /// # Contract
    /// - Stages run in declaration order on the calling thread.
    /// - The first failing stage or expectation ends the run with its error.
    /// - Handlers of expectations that never fired are deregistered.
    pub fn execute(self) -> Result<(), TckError> {
        let Self {
            endpoint,
            timing,
            stages,
            expectations,
            ..
        } = self;

        let result = run(stages, &expectations, timing.wait);
        for expectation in expectations.iter().filter(|e| !e.is_fulfilled()) {
            endpoint.deregister_handler(&expectation.pattern);
        }
        if let Err(e) = &result {
            warn!(error = %e, "pipeline failed");
        }
        result
    }
}

fn run(stages: Vec<Stage>, expectations: &[Arc<Expectation>], wait: Duration) -> Result<(), TckError> {
    for (index, stage) in stages.into_iter().enumerate() {
        debug!(stage = index, "running stage");
        stage()?;
    }
    for expectation in expectations {
        expectation.wait(wait)?;
    }
    Ok(())
}

fn poll_until(
    description: &str,
    timing: PipelineTiming,
    predicate: impl Fn() -> Result<bool, TckError>,
) -> Result<(), TckError> {
    let deadline = Instant::now() + timing.wait;
    loop {
        if predicate()? {
            debug!(description, "wait satisfied");
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(TckError::Timeout(format!(
                "Timed out waiting for {description}"
            )));
        }
        thread::sleep(timing.poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::InboundRequest;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tck_core::messages;

    fn timing() -> PipelineTiming {
        PipelineTiming {
            wait: Duration::from_millis(300),
            poll_interval: Duration::from_millis(10),
            pause: Duration::from_millis(1),
        }
    }

    fn pipeline() -> AsyncPipeline {
        AsyncPipeline::new(
            Arc::new(CallbackEndpoint::new("http://localhost:8083")),
            Arc::new(Canonicalizer::dsp().unwrap()),
            timing(),
        )
    }

    #[test]
    fn stages_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (log.clone(), log.clone());
        pipeline()
            .then(move || {
                a.lock().push(1);
                Ok(())
            })
            .then_pause()
            .then(move || {
                b.lock().push(2);
                Ok(())
            })
            .execute()
            .unwrap();
        assert_eq!(*log.lock(), vec![1, 2]);
    }

    #[test]
    fn failing_stage_stops_the_run() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let result = pipeline()
            .then(|| Err(TckError::Expectation("boom".into())))
            .then(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .execute();
        assert!(matches!(result, Err(TckError::Expectation(_))));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn wait_times_out() {
        let result = pipeline().then_wait("never", || false).execute();
        assert!(matches!(result, Err(TckError::Timeout(m)) if m.contains("never")));
    }

    #[test]
    fn unfulfilled_expectation_times_out_and_is_deregistered() {
        let mut engine = pipeline();
        let endpoint = engine.endpoint().clone();
        engine.add_expectation("/negotiations/[^/]+/offers", |m| Ok(m.clone()));
        assert!(matches!(engine.execute(), Err(TckError::Timeout(_))));
        assert!(!endpoint.handles_path("/negotiations/1/offers"));
    }

    #[test]
    fn expectation_timeout_reports_sub_second_waits() {
        let expectation = Expectation::new("/negotiations/[^/]+/offers");
        let Err(TckError::Timeout(message)) = expectation.wait(Duration::from_millis(20)) else {
            panic!("expected a timeout");
        };
        assert!(message.ends_with("within 20ms"), "{message}");
    }

    #[test]
    fn expectation_handler_is_one_shot() {
        let mut engine = pipeline();
        let endpoint = engine.endpoint().clone();
        engine.add_expectation("/negotiations/[^/]+/events", |m| Ok(m.clone()));
        let event = messages::finalized_event("p-1", "c-1");
        let trigger = endpoint.clone();
        engine.add_stage(move || {
            let response = trigger.dispatch(&InboundRequest::post("/negotiations/c-1/events", event));
            assert_eq!(response.code, 200);
            Ok(())
        });
        engine.execute().unwrap();

        let again = endpoint.dispatch(&InboundRequest::post(
            "/negotiations/c-1/events",
            json!({ "@type": "ContractNegotiationEventMessage" }),
        ));
        assert_eq!(again.code, 404);
    }
}
