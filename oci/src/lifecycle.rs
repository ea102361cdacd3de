//! Polling OCI resources until they reach a lifecycle state
//!
//! Mutating OCI calls return before the change is done. [`StateWaiter`]
//! re-reads the resource with a growing delay until its `lifecycleState` is
//! one of the target states, fails on any state that is neither pending nor
//! target, and gives up at the deadline.

use std::future::Future;
use std::time::{Duration, Instant};
use tfplug::Context;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::core::{Instance, Subnet, Vcn};
use crate::api::identity::Compartment;
use crate::api::load_balancer::{LoadBalancer, WorkRequest};
use crate::api::{ApiError, Client};

/// Anything that reports an OCI lifecycle state.
pub trait Lifecycle {
    fn lifecycle_state(&self) -> &str;
}

macro_rules! lifecycle_from_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Lifecycle for $ty {
                fn lifecycle_state(&self) -> &str {
                    &self.lifecycle_state
                }
            }
        )*
    };
}

lifecycle_from_field!(Vcn, Subnet, Instance, Compartment, LoadBalancer, WorkRequest);

/// States that mean "keep waiting" and states that mean "done".
#[derive(Debug, Clone, Copy)]
pub struct LifecycleStates {
    pub pending: &'static [&'static str],
    pub target: &'static [&'static str],
}

impl LifecycleStates {
    pub const fn new(pending: &'static [&'static str], target: &'static [&'static str]) -> Self {
        Self { pending, target }
    }
}

pub const WORK_REQUEST_STATES: LifecycleStates =
    LifecycleStates::new(&["ACCEPTED", "IN_PROGRESS"], &["SUCCEEDED", "FAILED"]);

const INITIAL_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Reads right after a create may 404 until the resource propagates.
const NOT_FOUND_LIMIT: u32 = 20;

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timed out after {elapsed:?} waiting for {resource} to reach {target:?} (last state: {last_state})")]
    Timeout {
        resource: String,
        last_state: String,
        target: Vec<String>,
        elapsed: Duration,
    },

    #[error("{resource} entered unexpected state {state} while waiting for {target:?}")]
    UnexpectedState {
        resource: String,
        state: String,
        target: Vec<String>,
    },

    #[error("{resource} was not found after {attempts} attempts")]
    NotFound { resource: String, attempts: u32 },

    #[error("waiting for {resource} was cancelled")]
    Cancelled { resource: String },

    #[error("work request {id} failed: {message}")]
    WorkRequestFailed { id: String, message: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub struct StateWaiter {
    resource: String,
    states: LifecycleStates,
    timeout: Duration,
    initial_interval: Duration,
    max_interval: Duration,
    deleting: bool,
}

impl StateWaiter {
    pub fn new(resource: impl Into<String>, states: LifecycleStates, timeout: Duration) -> Self {
        Self {
            resource: resource.into(),
            states,
            timeout,
            initial_interval: INITIAL_POLL_INTERVAL,
            max_interval: MAX_POLL_INTERVAL,
            deleting: false,
        }
    }

    /// A resource that disappears counts as deleted.
    pub fn deleting(mut self) -> Self {
        self.deleting = true;
        self
    }

    pub fn with_poll_interval(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_interval = initial;
        self.max_interval = max;
        self
    }

    fn target(&self) -> Vec<String> {
        self.states.target.iter().map(|s| s.to_string()).collect()
    }

    /// Poll `refresh` until the resource reaches a target state. Returns
    /// `None` only when waiting for a deletion and the resource is gone.
    pub async fn wait<T, F, Fut>(&self, ctx: &Context, mut refresh: F) -> Result<Option<T>, WaitError>
    where
        T: Lifecycle,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let started = Instant::now();
        // A timeout too large for an Instant means no deadline of our own.
        let deadline = match (started.checked_add(self.timeout), ctx.deadline()) {
            (Some(own), Some(ctx_deadline)) => Some(own.min(ctx_deadline)),
            (own, ctx_deadline) => own.or(ctx_deadline),
        };

        let mut interval = self.initial_interval;
        let mut not_found = 0;
        let mut last_state = String::from("unknown");

        loop {
            if ctx.is_cancelled() {
                return Err(WaitError::Cancelled {
                    resource: self.resource.clone(),
                });
            }

            match refresh().await {
                Ok(current) => {
                    not_found = 0;
                    let state = current.lifecycle_state();
                    if self.states.target.contains(&state) {
                        info!(resource = %self.resource, state, elapsed = ?started.elapsed(), "reached target state");
                        return Ok(Some(current));
                    }
                    if !self.states.pending.contains(&state) {
                        return Err(WaitError::UnexpectedState {
                            resource: self.resource.clone(),
                            state: state.to_string(),
                            target: self.target(),
                        });
                    }
                    if state != last_state {
                        debug!(resource = %self.resource, state, "still pending");
                        last_state = state.to_string();
                    }
                }
                Err(e) if e.is_not_found() => {
                    if self.deleting {
                        info!(resource = %self.resource, "resource is gone");
                        return Ok(None);
                    }
                    not_found += 1;
                    if not_found > NOT_FOUND_LIMIT {
                        return Err(WaitError::NotFound {
                            resource: self.resource.clone(),
                            attempts: not_found,
                        });
                    }
                    debug!(resource = %self.resource, attempt = not_found, "not visible yet");
                }
                Err(e) => return Err(e.into()),
            }

            let sleep = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(WaitError::Timeout {
                            resource: self.resource.clone(),
                            last_state,
                            target: self.target(),
                            elapsed: started.elapsed(),
                        });
                    }
                    interval.min(deadline - now)
                }
                None => interval,
            };
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = ctx.cancelled() => {
                    return Err(WaitError::Cancelled { resource: self.resource.clone() });
                }
            }
            interval = (interval * 2).min(self.max_interval);
        }
    }
}

impl StateWaiter {
    /// Like [`StateWaiter::wait`] for waits where the resource has to exist
    /// at the end.
    pub async fn wait_for_target<T, F, Fut>(&self, ctx: &Context, refresh: F) -> Result<T, WaitError>
    where
        T: Lifecycle,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.wait(ctx, refresh)
            .await?
            .ok_or_else(|| WaitError::NotFound {
                resource: self.resource.clone(),
                attempts: 1,
            })
    }
}

/// Wait for a load balancer work request to finish. A `FAILED` work request
/// becomes [`WaitError::WorkRequestFailed`] carrying OCI's error details.
pub async fn wait_for_work_request(
    ctx: &Context,
    client: &Client,
    work_request_id: &str,
    timeout: Duration,
) -> Result<WorkRequest, WaitError> {
    let waiter = StateWaiter::new(
        format!("work request {}", work_request_id),
        WORK_REQUEST_STATES,
        timeout,
    );
    wait_for_work_request_with(ctx, client, work_request_id, waiter).await
}

async fn wait_for_work_request_with(
    ctx: &Context,
    client: &Client,
    work_request_id: &str,
    waiter: StateWaiter,
) -> Result<WorkRequest, WaitError> {
    let request = waiter
        .wait_for_target(ctx, || async move {
            client.load_balancer().get_work_request(work_request_id).await
        })
        .await?;

    if request.lifecycle_state == "FAILED" {
        return Err(WaitError::WorkRequestFailed {
            id: request.id.clone(),
            message: request.failure_message(),
        });
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::tests::test_client;
    use mockito::Server;
    use std::collections::VecDeque;

    const STATES: LifecycleStates =
        LifecycleStates::new(&["PROVISIONING"], &["AVAILABLE"]);
    const DELETE_STATES: LifecycleStates =
        LifecycleStates::new(&["TERMINATING"], &["TERMINATED"]);

    #[derive(Debug)]
    struct Fake(&'static str);

    impl Lifecycle for Fake {
        fn lifecycle_state(&self) -> &str {
            self.0
        }
    }

    fn not_found() -> ApiError {
        ApiError::Service {
            status: 404,
            code: "NotAuthorizedOrNotFound".to_string(),
            message: "not found".to_string(),
            request_id: "req".to_string(),
        }
    }

    fn waiter(states: LifecycleStates, timeout: Duration) -> StateWaiter {
        StateWaiter::new("vcn v1", states, timeout)
            .with_poll_interval(Duration::from_millis(1), Duration::from_millis(5))
    }

    async fn run(
        waiter: &StateWaiter,
        ctx: &Context,
        responses: Vec<Result<Fake, ApiError>>,
    ) -> (Result<Option<Fake>, WaitError>, usize) {
        let mut responses = VecDeque::from(responses);
        let mut polls = 0;
        let result = waiter
            .wait(ctx, || {
                polls += 1;
                let next = responses.pop_front().unwrap_or(Ok(Fake("PROVISIONING")));
                async move { next }
            })
            .await;
        (result, polls)
    }

    #[tokio::test]
    async fn waits_through_pending_states() {
        let (result, polls) = run(
            &waiter(STATES, Duration::from_secs(5)),
            &Context::new(),
            vec![Ok(Fake("PROVISIONING")), Ok(Fake("PROVISIONING")), Ok(Fake("AVAILABLE"))],
        )
        .await;

        assert_eq!(result.unwrap().unwrap().0, "AVAILABLE");
        assert_eq!(polls, 3);
    }

    #[tokio::test]
    async fn unexpected_state_fails_immediately() {
        let (result, polls) = run(
            &waiter(STATES, Duration::from_secs(5)),
            &Context::new(),
            vec![Ok(Fake("PROVISIONING")), Ok(Fake("FAILED"))],
        )
        .await;

        match result {
            Err(WaitError::UnexpectedState { state, target, .. }) => {
                assert_eq!(state, "FAILED");
                assert_eq!(target, vec!["AVAILABLE".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(polls, 2);
    }

    #[tokio::test]
    async fn missing_resource_is_tolerated_while_it_propagates() {
        let (result, _) = run(
            &waiter(STATES, Duration::from_secs(5)),
            &Context::new(),
            vec![Err(not_found()), Err(not_found()), Ok(Fake("AVAILABLE"))],
        )
        .await;
        assert!(result.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_resource_eventually_fails() {
        let responses = (0..=NOT_FOUND_LIMIT).map(|_| Err(not_found())).collect();
        let (result, polls) = run(&waiter(STATES, Duration::from_secs(5)), &Context::new(), responses).await;

        assert!(matches!(result, Err(WaitError::NotFound { attempts, .. }) if attempts == NOT_FOUND_LIMIT + 1));
        assert_eq!(polls, NOT_FOUND_LIMIT as usize + 1);
    }

    #[tokio::test]
    async fn missing_resource_completes_a_deletion() {
        let (result, _) = run(
            &waiter(DELETE_STATES, Duration::from_secs(5)).deleting(),
            &Context::new(),
            vec![Ok(Fake("TERMINATING")), Err(not_found())],
        )
        .await;
        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn api_errors_abort_the_wait() {
        let (result, polls) = run(
            &waiter(STATES, Duration::from_secs(5)),
            &Context::new(),
            vec![Err(ApiError::Parse("garbage".to_string()))],
        )
        .await;
        assert!(matches!(result, Err(WaitError::Api(ApiError::Parse(_)))));
        assert_eq!(polls, 1);
    }

    #[tokio::test]
    async fn gives_up_at_the_deadline() {
        let started = Instant::now();
        let (result, polls) = run(
            &waiter(STATES, Duration::from_millis(30)),
            &Context::new(),
            vec![],
        )
        .await;

        match result {
            Err(WaitError::Timeout { last_state, .. }) => assert_eq!(last_state, "PROVISIONING"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(polls > 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn huge_timeouts_do_not_overflow_the_deadline() {
        let (result, polls) = run(
            &waiter(STATES, Duration::from_secs(18_000_000_000_000_000_000)),
            &Context::new(),
            vec![Ok(Fake("PROVISIONING")), Ok(Fake("AVAILABLE"))],
        )
        .await;
        assert_eq!(result.unwrap().unwrap().0, "AVAILABLE");
        assert_eq!(polls, 2);

        let (result, _) = run(&waiter(STATES, Duration::MAX), &Context::new(), vec![Ok(Fake("AVAILABLE"))]).await;
        assert!(result.unwrap().is_some());
    }

    #[tokio::test]
    async fn cancellation_stops_the_wait() {
        let ctx = Context::new();
        let cancel = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let (result, _) = run(&waiter(STATES, Duration::from_secs(30)), &ctx, vec![]).await;
        assert!(matches!(result, Err(WaitError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn failed_work_requests_surface_details() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/20170115/loadBalancerWorkRequests/wr1")
            .with_body(
                r#"{"id":"wr1","loadBalancerId":"lb1","lifecycleState":"FAILED","errorDetails":[{"errorCode":"INVALID","message":"bad port"}]}"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let error = wait_for_work_request(&Context::new(), &client, "wr1", Duration::from_secs(5))
            .await
            .unwrap_err();
        match error {
            WaitError::WorkRequestFailed { id, message } => {
                assert_eq!(id, "wr1");
                assert_eq!(message, "INVALID: bad port");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn work_requests_are_polled_until_done() {
        let mut server = Server::new_async().await;
        let pending = server
            .mock("GET", "/20170115/loadBalancerWorkRequests/wr2")
            .with_body(r#"{"id":"wr2","loadBalancerId":"lb1","lifecycleState":"IN_PROGRESS"}"#)
            .expect(1)
            .create_async()
            .await;
        let done = server
            .mock("GET", "/20170115/loadBalancerWorkRequests/wr2")
            .with_body(r#"{"id":"wr2","loadBalancerId":"lb1","lifecycleState":"SUCCEEDED"}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let waiter = StateWaiter::new("work request wr2", WORK_REQUEST_STATES, Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(1), Duration::from_millis(5));
        let request = wait_for_work_request_with(&Context::new(), &client, "wr2", waiter)
            .await
            .unwrap();

        assert_eq!(request.lifecycle_state, "SUCCEEDED");
        pending.assert_async().await;
        done.assert_async().await;
    }
}
