//! Poller - Long-running operation tracking
//!
//! A mutating request may return before the server-side work finishes. The
//! initiating response then carries a tracking signal telling us where to
//! look for progress; [`OperationHandle::from_response`] recognizes the
//! signal variants in priority order and [`Poller::poll_until_done`] drives
//! the operation to a terminal state.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult, TransportError};
use crate::transport::{Transport, TransportRequest, TransportResponse};

/// Status reported for a long-running operation.
///
/// Only `Succeeded`, `Failed` and `Canceled` are terminal. Servers report
/// transitional states under many names (`InProgress`, `Updating`,
/// `Deleting`, ...); anything not recognized as terminal is treated as
/// in-progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::InProgress)
    }

    fn parse(s: &str) -> Self {
        match s {
            "Succeeded" => OperationStatus::Succeeded,
            "Failed" => OperationStatus::Failed,
            "Canceled" | "Cancelled" => OperationStatus::Canceled,
            _ => OperationStatus::InProgress,
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationStatus::InProgress => "InProgress",
            OperationStatus::Succeeded => "Succeeded",
            OperationStatus::Failed => "Failed",
            OperationStatus::Canceled => "Canceled",
        };
        f.write_str(s)
    }
}

/// How an operation's progress is tracked, in detection priority order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingSignal {
    /// An `Azure-AsyncOperation`/`Operation-Location` style header pointing
    /// at a status document
    AsyncOperation(String),
    /// A `Location` header; 202 means in-progress, 2xx means done
    Location(String),
    /// The body carries a provisioning state; re-read the origin URL
    ProvisioningState(String),
    /// The initiating response already completed the operation
    SynchronousComplete,
}

impl TrackingSignal {
    fn poll_url(&self) -> Option<&str> {
        match self {
            TrackingSignal::AsyncOperation(url)
            | TrackingSignal::Location(url)
            | TrackingSignal::ProvisioningState(url) => Some(url),
            TrackingSignal::SynchronousComplete => None,
        }
    }
}

/// One in-flight long-running operation.
///
/// Once the handle reaches a terminal status it caches its result; polling
/// it again performs no network activity and returns an identical result.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    signal: TrackingSignal,
    status: OperationStatus,
    /// Final resource representation, when the status document embeds one
    final_body: Option<serde_json::Value>,
    /// Server-reported error payload, verbatim, for a failed operation
    failure_payload: Option<serde_json::Value>,
}

impl OperationHandle {
    /// Classify the initiating response.
    ///
    /// Detection strategies are tried in priority order: async-operation
    /// header, `Location` header, provisioning-state body, synchronous
    /// completion. Fails with [`ClientError::UnrecognizedOperation`] when
    /// none applies and the status does not indicate success.
    pub fn from_response(
        response: &TransportResponse,
        origin_url: &str,
    ) -> ClientResult<OperationHandle> {
        if let Some(url) = response
            .header("Azure-AsyncOperation")
            .or_else(|| response.header("Operation-Location"))
        {
            return Ok(Self::in_progress(TrackingSignal::AsyncOperation(
                url.to_string(),
            )));
        }

        if let Some(url) = response.header("Location") {
            return Ok(Self::in_progress(TrackingSignal::Location(url.to_string())));
        }

        if let Some(body) = response.json()
            && let Some(state) = provisioning_state(&body)
        {
            let mut handle = Self::in_progress(TrackingSignal::ProvisioningState(
                origin_url.to_string(),
            ));
            handle.record_state(OperationStatus::parse(state), &body);
            return Ok(handle);
        }

        if matches!(response.status, 200 | 201 | 204) {
            return Ok(OperationHandle {
                signal: TrackingSignal::SynchronousComplete,
                status: OperationStatus::Succeeded,
                final_body: response.json(),
                failure_payload: None,
            });
        }

        Err(ClientError::UnrecognizedOperation {
            status: response.status,
        })
    }

    fn in_progress(signal: TrackingSignal) -> Self {
        OperationHandle {
            signal,
            status: OperationStatus::InProgress,
            final_body: None,
            failure_payload: None,
        }
    }

    pub fn signal(&self) -> &TrackingSignal {
        &self.signal
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The cached terminal result, or `None` while the operation is still
    /// in progress
    pub fn terminal_result(&self) -> Option<ClientResult<Option<serde_json::Value>>> {
        match self.status {
            OperationStatus::Succeeded => Some(Ok(self.final_body.clone())),
            OperationStatus::Failed | OperationStatus::Canceled => {
                Some(Err(ClientError::OperationFailed {
                    status: self.status,
                    payload: self
                        .failure_payload
                        .clone()
                        .unwrap_or(serde_json::Value::Null),
                }))
            }
            OperationStatus::InProgress => None,
        }
    }

    /// Fold one status-check response into the handle
    fn absorb(&mut self, response: &TransportResponse, poll_url: &str) -> ClientResult<()> {
        match &self.signal {
            TrackingSignal::AsyncOperation(_) => {
                if !response.is_success() {
                    self.record_failure(response);
                    return Ok(());
                }
                let body = response.json().ok_or_else(|| ClientError::InvalidResponse {
                    url: poll_url.to_string(),
                    reason: "status document is not JSON".to_string(),
                })?;
                let state = body.get("status").and_then(|v| v.as_str()).ok_or_else(|| {
                    ClientError::InvalidResponse {
                        url: poll_url.to_string(),
                        reason: "status document has no status field".to_string(),
                    }
                })?;
                self.record_state(OperationStatus::parse(state), &body);
            }
            TrackingSignal::Location(_) => {
                if response.status == 202 {
                    self.status = OperationStatus::InProgress;
                } else if response.is_success() {
                    self.status = OperationStatus::Succeeded;
                    self.final_body = response.json();
                } else {
                    self.record_failure(response);
                }
            }
            TrackingSignal::ProvisioningState(_) => {
                if !response.is_success() {
                    self.record_failure(response);
                    return Ok(());
                }
                let body = response.json().ok_or_else(|| ClientError::InvalidResponse {
                    url: poll_url.to_string(),
                    reason: "resource body is not JSON".to_string(),
                })?;
                let state = provisioning_state(&body).ok_or_else(|| {
                    ClientError::InvalidResponse {
                        url: poll_url.to_string(),
                        reason: "resource body has no provisioning state".to_string(),
                    }
                })?;
                self.record_state(OperationStatus::parse(state), &body);
            }
            TrackingSignal::SynchronousComplete => {}
        }
        Ok(())
    }

    fn record_state(&mut self, status: OperationStatus, body: &serde_json::Value) {
        self.status = status;
        match status {
            OperationStatus::Succeeded => {
                // Async-operation status documents embed the resource under
                // "properties" when they embed it at all; provisioning-state
                // polls return the resource itself.
                self.final_body = match &self.signal {
                    TrackingSignal::AsyncOperation(_) => body.get("properties").cloned(),
                    _ => Some(body.clone()),
                };
            }
            OperationStatus::Failed | OperationStatus::Canceled => {
                self.failure_payload =
                    Some(body.get("error").cloned().unwrap_or_else(|| body.clone()));
            }
            OperationStatus::InProgress => {}
        }
    }

    fn record_failure(&mut self, response: &TransportResponse) {
        self.status = OperationStatus::Failed;
        self.failure_payload = Some(
            response
                .json()
                .unwrap_or_else(|| serde_json::json!({ "httpStatus": response.status })),
        );
    }
}

/// Backoff and retry configuration for one poll loop
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Delay before the second status check
    pub initial_interval: Duration,
    /// Growth factor applied after each check
    pub multiplier: f64,
    /// Upper bound on the computed interval
    pub max_interval: Duration,
    /// Overall deadline for the whole poll, measured from the first check
    pub max_elapsed: Option<Duration>,
    /// Consecutive transient failures (transport errors, 5xx, 429)
    /// tolerated before the failure is surfaced
    pub max_transient_retries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(5),
            multiplier: 2.0,
            max_interval: Duration::from_secs(60),
            max_elapsed: None,
            max_transient_retries: 4,
        }
    }
}

impl PollPolicy {
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }
}

/// Drives long-running operations to completion over a [`Transport`]
#[derive(Clone)]
pub struct Poller {
    transport: Arc<dyn Transport>,
}

impl Poller {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Poll `handle` until it reaches a terminal state.
    ///
    /// Status checks are spaced by exponential backoff clamped to
    /// `policy.max_interval`. A 429 carrying `Retry-After` overrides the
    /// computed interval for that one retry. Transient failures are retried
    /// up to `policy.max_transient_retries` consecutive times without
    /// resetting the overall deadline.
    ///
    /// Cancellation is observed before every status check and during every
    /// backoff wait; a token that is already triggered returns
    /// [`ClientError::Canceled`] without issuing any request. Exceeding
    /// `policy.max_elapsed` returns [`ClientError::DeadlineExceeded`].
    ///
    /// Calling this again on an already-terminal handle returns the cached
    /// result with no network activity.
    pub async fn poll_until_done(
        &self,
        handle: &mut OperationHandle,
        policy: &PollPolicy,
        cancel: &CancellationToken,
    ) -> ClientResult<Option<serde_json::Value>> {
        if let Some(result) = handle.terminal_result() {
            return result;
        }
        if cancel.is_cancelled() {
            return Err(ClientError::Canceled);
        }

        let Some(poll_url) = handle.signal().poll_url().map(str::to_string) else {
            // SynchronousComplete handles are always terminal and were
            // returned above.
            return Err(ClientError::InvalidResponse {
                url: String::new(),
                reason: "operation has no poll endpoint".to_string(),
            });
        };

        let deadline = policy.max_elapsed.map(|d| Instant::now() + d);
        let mut interval = policy.initial_interval;
        let mut consecutive_transient: u32 = 0;

        loop {
            let mut retry_after = None;

            match self.transport.send(TransportRequest::get(&poll_url)).await {
                Ok(response) if response.status == 429 || response.status >= 500 => {
                    consecutive_transient += 1;
                    if consecutive_transient > policy.max_transient_retries {
                        return Err(ClientError::Transport {
                            url: poll_url,
                            source: TransportError::ServerStatus(response.status),
                        });
                    }
                    if response.status == 429 {
                        retry_after = parse_retry_after(&response);
                    }
                    warn!(
                        url = %poll_url,
                        status = response.status,
                        attempt = consecutive_transient,
                        "transient status-check failure, will retry"
                    );
                }
                Ok(response) => {
                    consecutive_transient = 0;
                    handle.absorb(&response, &poll_url)?;
                    debug!(url = %poll_url, status = %handle.status(), "operation status");
                    if let Some(result) = handle.terminal_result() {
                        return result;
                    }
                }
                Err(err) => {
                    consecutive_transient += 1;
                    if consecutive_transient > policy.max_transient_retries {
                        return Err(ClientError::Transport {
                            url: poll_url,
                            source: err,
                        });
                    }
                    warn!(
                        url = %poll_url,
                        error = %err,
                        attempt = consecutive_transient,
                        "transport error during status check, will retry"
                    );
                }
            }

            let mut wait = retry_after.unwrap_or(interval);
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(ClientError::DeadlineExceeded);
                }
                wait = wait.min(remaining);
            }
            interval = interval.mul_f64(policy.multiplier).min(policy.max_interval);

            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Canceled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

fn provisioning_state(body: &serde_json::Value) -> Option<&str> {
    body.pointer("/properties/provisioningState")
        .or_else(|| body.get("status"))
        .and_then(|v| v.as_str())
}

fn parse_retry_after(response: &TransportResponse) -> Option<Duration> {
    response
        .header("Retry-After")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
