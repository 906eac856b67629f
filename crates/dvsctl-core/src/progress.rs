//! Progress tracking and polling for asynchronous remote operations
//!
//! Operations such as `CreateDVS_Task` return a handle immediately and finish
//! on the server later. [`OperationWatcher`] polls such a handle until it
//! reaches `success` or `error`, reporting each distinct state it sees through
//! an optional callback, and giving up on a deadline or a cancellation token.

use crate::client::RemoteManagementClient;
use crate::error::{CoreError, Result};
use crate::operation::{OperationHandle, OperationKind, OperationOutcome, OperationState};
use crate::request::OperationRequest;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Default time to wait for an operation (10 minutes)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Default delay between polls (1 second)
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Floor for the polling interval; polling never degenerates into a busy loop
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// How often to poll and for how long
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first refresh
    pub interval: Duration,
    /// Multiplier applied to the interval after every poll (1.0 = fixed)
    pub backoff_factor: f64,
    /// Upper bound for the interval when backing off
    pub max_interval: Duration,
    /// Give up after this long; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            backoff_factor: 1.0,
            max_interval: DEFAULT_MAX_INTERVAL,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl PollPolicy {
    /// Fixed interval, default timeout
    #[must_use]
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, factor: f64, max_interval: Duration) -> Self {
        self.backoff_factor = factor;
        self.max_interval = max_interval;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// First interval, clamped to [`MIN_INTERVAL`]
    pub fn initial_interval(&self) -> Duration {
        self.interval.max(MIN_INTERVAL)
    }

    /// Interval to use after `current`
    pub fn next_interval(&self, current: Duration) -> Duration {
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 1.0 {
            return current;
        }
        current
            .mul_f64(self.backoff_factor)
            .min(self.max_interval.max(MIN_INTERVAL))
    }
}

/// Progress events emitted while watching an operation
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Watching has begun
    Started {
        operation_id: String,
        kind: OperationKind,
    },
    /// The observed state differs from the previous observation
    StateChanged {
        operation_id: String,
        state: OperationState,
        progress: Option<u8>,
        elapsed: Duration,
    },
    /// Operation reached `success`
    Completed { operation_id: String },
    /// Operation reached `error`
    Failed { operation_id: String, error: String },
}

/// Callback type for progress updates
///
/// The CLI uses this to drive its spinner.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Polls one operation at a time until it is terminal
///
/// A watcher remembers the last state it saw for a handle. Watching the same
/// handle again after it was terminal is cheap (no polling), and a server
/// that reports a terminal handle as pending again is rejected with
/// [`CoreError::UnexpectedFault`].
///
/// # Example
///
/// ```rust,ignore
/// use dvsctl_core::{OperationWatcher, PollPolicy, ProgressEvent};
/// use std::time::Duration;
///
/// let handle = session.submit_operation(&request).await?;
/// let outcome = OperationWatcher::new(&session)
///     .with_policy(PollPolicy::fixed(Duration::from_secs(2)))
///     .on_progress(Box::new(|event| {
///         if let ProgressEvent::StateChanged { state, .. } = event {
///             println!("now {}", state);
///         }
///     }))
///     .watch(handle)
///     .await?;
/// ```
pub struct OperationWatcher<'a, C: RemoteManagementClient + ?Sized> {
    client: &'a C,
    policy: PollPolicy,
    on_progress: Option<ProgressCallback>,
    cancel: Option<CancellationToken>,
    last_seen: Option<(String, OperationState)>,
    polls: u32,
}

impl<'a, C: RemoteManagementClient + ?Sized> OperationWatcher<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            policy: PollPolicy::default(),
            on_progress: None,
            cancel: None,
            last_seen: None,
            polls: 0,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Number of refresh calls made so far
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Validate and submit `request`, then watch the returned handle
    pub async fn submit(&mut self, request: &OperationRequest) -> Result<OperationOutcome> {
        request.validate()?;
        debug!("Submitting: {}", request.describe());
        let handle = self.client.submit_operation(request).await?;
        self.watch(handle).await
    }

    /// Poll `handle` until it is terminal, the deadline passes, or the
    /// cancellation token fires
    pub async fn watch(&mut self, handle: OperationHandle) -> Result<OperationOutcome> {
        let start = Instant::now();
        let deadline = self.policy.timeout.map(|t| start + t);
        let mut interval = self.policy.initial_interval();
        let mut current = handle;

        self.emit(ProgressEvent::Started {
            operation_id: current.id.clone(),
            kind: current.kind,
        });

        loop {
            self.observe(&current, start.elapsed())?;
            if let Some(outcome) = self.resolve(&current)? {
                return Ok(outcome);
            }

            let wake = match deadline {
                Some(d) => (Instant::now() + interval).min(d),
                None => Instant::now() + interval,
            };
            self.guard(
                async {
                    tokio::time::sleep_until(wake).await;
                    Ok(())
                },
                deadline,
            )
            .await
            .inspect_err(|e| self.log_abort(&current, e))?;

            let client = self.client;
            let refreshed = self
                .guard(client.refresh(&current), deadline)
                .await
                .map_err(|e| wrap_refresh_error(&current, e))
                .inspect_err(|e| self.log_abort(&current, e))?;
            self.polls += 1;
            trace!(
                "Poll {} of {}: {}",
                self.polls, refreshed.id, refreshed.state
            );

            if refreshed.id != current.id {
                return Err(CoreError::unexpected(
                    current.kind.to_string(),
                    &current.id,
                    format!("refresh returned a different handle '{}'", refreshed.id),
                ));
            }
            current = refreshed;
            interval = self.policy.next_interval(interval);
        }
    }

    /// Record an observation, emitting a state change only when the state differs
    fn observe(&mut self, handle: &OperationHandle, elapsed: Duration) -> Result<()> {
        if let Some((id, previous)) = &self.last_seen
            && *id == handle.id
        {
            if previous.is_terminal() && *previous != handle.state {
                return Err(CoreError::unexpected(
                    handle.kind.to_string(),
                    &handle.id,
                    format!(
                        "state moved from terminal '{}' back to '{}'",
                        previous, handle.state
                    ),
                ));
            }
            if *previous == handle.state {
                return Ok(());
            }
        }

        debug!("Operation {} is now {}", handle.id, handle.state);
        self.last_seen = Some((handle.id.clone(), handle.state));
        self.emit(ProgressEvent::StateChanged {
            operation_id: handle.id.clone(),
            state: handle.state,
            progress: handle.progress,
            elapsed,
        });
        Ok(())
    }

    /// Turn a terminal handle into an outcome; `None` while still pending
    fn resolve(&self, handle: &OperationHandle) -> Result<Option<OperationOutcome>> {
        match handle.state {
            OperationState::Success => {
                let result = handle
                    .result
                    .clone()
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| {
                        CoreError::unexpected(
                            handle.kind.to_string(),
                            &handle.id,
                            "reported success without a result",
                        )
                    })?;
                self.emit(ProgressEvent::Completed {
                    operation_id: handle.id.clone(),
                });
                Ok(Some(OperationOutcome::Success(result)))
            }
            OperationState::Error => {
                let fault = handle.error.clone().ok_or_else(|| {
                    CoreError::unexpected(
                        handle.kind.to_string(),
                        &handle.id,
                        "reported error without fault detail",
                    )
                })?;
                self.emit(ProgressEvent::Failed {
                    operation_id: handle.id.clone(),
                    error: fault.to_string(),
                });
                Ok(Some(OperationOutcome::Failure(fault)))
            }
            OperationState::Queued | OperationState::Running => Ok(None),
        }
    }

    /// Race `fut` against the deadline and the cancellation token
    async fn guard<T>(
        &self,
        fut: impl Future<Output = Result<T>>,
        deadline: Option<Instant>,
    ) -> Result<T> {
        let timeout = self.policy.timeout.unwrap_or_default();
        let expired = async {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(CoreError::Cancelled),
            _ = expired => Err(CoreError::Timeout(timeout)),
            result = fut => result,
        }
    }

    fn log_abort(&self, handle: &OperationHandle, err: &CoreError) {
        match err {
            CoreError::Timeout(t) => warn!("Gave up on {} after {:?}", handle.id, t),
            CoreError::Cancelled => warn!("Stopped watching {}: cancelled", handle.id),
            _ => {}
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(cb) = &self.on_progress {
            cb(event);
        }
    }
}

/// Errors that already carry their meaning pass through; the rest get context
fn wrap_refresh_error(handle: &OperationHandle, err: CoreError) -> CoreError {
    match err {
        CoreError::Connection(_)
        | CoreError::Timeout(_)
        | CoreError::Cancelled
        | CoreError::UnexpectedFault { .. } => err,
        other => CoreError::unexpected(handle.kind.to_string(), &handle.id, other.to_string()),
    }
}

/// Poll an operation until completion
///
/// # Arguments
///
/// * `client` - The remote management client that owns the handle
/// * `handle` - The handle returned when the operation was submitted
/// * `policy` - Interval, backoff and timeout
/// * `on_progress` - Optional callback for progress updates
pub async fn poll_operation<C: RemoteManagementClient + ?Sized>(
    client: &C,
    handle: OperationHandle,
    policy: PollPolicy,
    on_progress: Option<ProgressCallback>,
) -> Result<OperationOutcome> {
    let mut watcher = OperationWatcher::new(client).with_policy(policy);
    if let Some(cb) = on_progress {
        watcher = watcher.on_progress(cb);
    }
    watcher.watch(handle).await
}

/// Submit a request and poll the resulting operation until completion
pub async fn submit_and_watch<C: RemoteManagementClient + ?Sized>(
    client: &C,
    request: &OperationRequest,
    policy: PollPolicy,
    on_progress: Option<ProgressCallback>,
) -> Result<OperationOutcome> {
    let mut watcher = OperationWatcher::new(client).with_policy(policy);
    if let Some(cb) = on_progress {
        watcher = watcher.on_progress(cb);
    }
    watcher.submit(request).await
}
