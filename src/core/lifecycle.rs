//! Request lifecycle state machine.
//!
//! ```text
//! Ready --execute--> Sent --success--> ServerSuccess --> Completed
//!   |                 |  \--failure--> ServerFailed  --> Completed
//!   \----abort-----> Aborted <--abort--/
//! ```
//!
//! Exactly one of the two callbacks runs, at most once. A response arriving
//! after an abort is dropped.
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::request::RequestFailure;

/// Lifecycle states of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Ready,
    Sent,
    ServerSuccess,
    ServerFailed,
    Completed,
    Aborted,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Ready => "ready",
            RequestState::Sent => "sent",
            RequestState::ServerSuccess => "server_success",
            RequestState::ServerFailed => "server_failed",
            RequestState::Completed => "completed",
            RequestState::Aborted => "aborted",
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Aborted)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Illegal lifecycle transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LifecycleError {
    #[error("Cannot {action}: request already {state}")]
    InvalidState {
        state: RequestState,
        action: &'static str,
    },
}

/// Result type for lifecycle transitions
pub type LifecycleResult<T> = Result<T, LifecycleError>;

pub type SuccessCallback<T> = Box<dyn FnOnce(T) + Send>;
pub type FailureCallback = Box<dyn FnOnce(RequestFailure) + Send>;

struct Inner<T> {
    state: RequestState,
    history: Vec<RequestState>,
    on_success: Option<SuccessCallback<T>>,
    on_failure: Option<FailureCallback>,
}

impl<T> Inner<T> {
    fn transition(&mut self, next: RequestState) {
        self.state = next;
        self.history.push(next);
    }
}

/// State and callbacks of one request.
pub struct RequestLifecycle<T> {
    inner: Mutex<Inner<T>>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> RequestLifecycle<T> {
    pub fn new(
        on_success: Option<SuccessCallback<T>>,
        on_failure: Option<FailureCallback>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RequestState::Ready,
                history: vec![RequestState::Ready],
                on_success,
                on_failure,
            }),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> RequestState {
        self.lock().state
    }

    /// Every state visited so far, starting with `Ready`.
    pub fn history(&self) -> Vec<RequestState> {
        self.lock().history.clone()
    }

    /// Token cancelled when the request is aborted after being sent.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `Ready -> Sent`.
    pub fn execute(&self) -> LifecycleResult<()> {
        let mut inner = self.lock();
        match inner.state {
            RequestState::Ready => {
                inner.transition(RequestState::Sent);
                Ok(())
            }
            state => Err(LifecycleError::InvalidState {
                state,
                action: "execute",
            }),
        }
    }

    /// Move to `Aborted` from `Ready` or `Sent`. Returns whether this call
    /// changed the state; aborting a finished request is a no-op.
    pub fn abort(&self) -> bool {
        let mut inner = self.lock();
        let was_sent = match inner.state {
            RequestState::Ready => false,
            RequestState::Sent => true,
            state => {
                tracing::debug!(%state, "Ignoring abort of finished request");
                return false;
            }
        };

        inner.transition(RequestState::Aborted);
        // Callbacks never run after an abort; release whatever they captured.
        inner.on_success.take();
        inner.on_failure.take();
        drop(inner);

        if was_sent {
            self.cancel.cancel();
        }
        tracing::info!(was_sent, "Request aborted");
        true
    }

    /// Deliver the final outcome of a sent request. Runs the matching
    /// callback and completes the request. Dropped silently once aborted.
    pub fn server_response_received(
        &self,
        outcome: Result<T, RequestFailure>,
    ) -> LifecycleResult<()> {
        let mut inner = self.lock();
        match inner.state {
            RequestState::Sent => {}
            RequestState::Aborted => {
                tracing::warn!("Dropping response that arrived after abort");
                return Ok(());
            }
            state => {
                return Err(LifecycleError::InvalidState {
                    state,
                    action: "deliver a response",
                });
            }
        }

        match outcome {
            Ok(value) => {
                inner.transition(RequestState::ServerSuccess);
                inner.transition(RequestState::Completed);
                let callback = inner.on_success.take();
                inner.on_failure.take();
                drop(inner);
                if let Some(callback) = callback {
                    callback(value);
                }
            }
            Err(failure) => {
                inner.transition(RequestState::ServerFailed);
                inner.transition(RequestState::Completed);
                let callback = inner.on_failure.take();
                inner.on_success.take();
                drop(inner);
                match callback {
                    Some(callback) => callback(failure),
                    None => {
                        tracing::warn!(error = %failure, "Request failed with no failure callback")
                    }
                }
            }
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> fmt::Debug for RequestLifecycle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self
            .inner
            .lock()
            .map(|inner| inner.state)
            .unwrap_or_else(|poisoned| poisoned.into_inner().state);
        f.debug_struct("RequestLifecycle")
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

/// Type-erased control over a lifecycle.
trait Control: Send + Sync {
    fn abort(&self) -> bool;
    fn state(&self) -> RequestState;
}

impl<T: Send + 'static> Control for RequestLifecycle<T> {
    fn abort(&self) -> bool {
        RequestLifecycle::abort(self)
    }

    fn state(&self) -> RequestState {
        RequestLifecycle::state(self)
    }
}

/// Cloneable handle that can abort a request from anywhere.
#[derive(Clone)]
pub struct AbortHandle {
    control: Arc<dyn Control>,
}

impl AbortHandle {
    pub(crate) fn new<T: Send + 'static>(lifecycle: Arc<RequestLifecycle<T>>) -> Self {
        Self { control: lifecycle }
    }

    /// See [`RequestLifecycle::abort`].
    pub fn abort(&self) -> bool {
        self.control.abort()
    }

    pub fn state(&self) -> RequestState {
        self.control.state()
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::StatusCode;

    use super::*;
    use crate::ports::transport::TransportError;

    struct Counters {
        successes: Arc<AtomicUsize>,
        failures: Arc<AtomicUsize>,
    }

    fn lifecycle() -> (RequestLifecycle<u32>, Counters) {
        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));
        let (s, f) = (successes.clone(), failures.clone());
        let lifecycle = RequestLifecycle::new(
            Some(Box::new(move |_: u32| {
                s.fetch_add(1, Ordering::SeqCst);
            })),
            Some(Box::new(move |_: RequestFailure| {
                f.fetch_add(1, Ordering::SeqCst);
            })),
        );
        (
            lifecycle,
            Counters {
                successes,
                failures,
            },
        )
    }

    fn server_error() -> RequestFailure {
        RequestFailure::ServerStatus {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            status_text: "Internal Server Error".to_string(),
            headers: Default::default(),
            body: Default::default(),
        }
    }

    #[test]
    fn test_success_path() {
        let (lifecycle, counters) = lifecycle();
        lifecycle.execute().unwrap();
        lifecycle.server_response_received(Ok(7)).unwrap();

        assert_eq!(lifecycle.state(), RequestState::Completed);
        assert_eq!(
            lifecycle.history(),
            [
                RequestState::Ready,
                RequestState::Sent,
                RequestState::ServerSuccess,
                RequestState::Completed
            ]
        );
        assert_eq!(counters.successes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_path() {
        let (lifecycle, counters) = lifecycle();
        lifecycle.execute().unwrap();
        lifecycle
            .server_response_received(Err(server_error()))
            .unwrap();

        assert!(lifecycle.history().contains(&RequestState::ServerFailed));
        assert_eq!(lifecycle.state(), RequestState::Completed);
        assert_eq!(counters.failures.load(Ordering::SeqCst), 1);
        assert_eq!(counters.successes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_execute_twice_is_invalid() {
        let (lifecycle, _) = lifecycle();
        lifecycle.execute().unwrap();
        assert_eq!(
            lifecycle.execute(),
            Err(LifecycleError::InvalidState {
                state: RequestState::Sent,
                action: "execute"
            })
        );
    }

    #[test]
    fn test_completed_rejects_further_events() {
        let (lifecycle, counters) = lifecycle();
        lifecycle.execute().unwrap();
        lifecycle.server_response_received(Ok(1)).unwrap();

        let err = lifecycle.execute().unwrap_err();
        assert!(err.to_string().contains("already completed"));
        assert!(lifecycle.server_response_received(Ok(2)).is_err());
        assert_eq!(counters.successes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_response_before_execute_is_invalid() {
        let (lifecycle, counters) = lifecycle();
        assert!(lifecycle.server_response_received(Ok(1)).is_err());
        assert_eq!(lifecycle.state(), RequestState::Ready);
        assert_eq!(counters.successes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_abort_from_ready_blocks_execute() {
        let (lifecycle, _) = lifecycle();
        assert!(lifecycle.abort());
        assert_eq!(lifecycle.state(), RequestState::Aborted);
        assert!(lifecycle.execute().is_err());
        assert!(!lifecycle.cancellation().is_cancelled());
    }

    #[test]
    fn test_abort_from_sent_cancels_and_drops_late_response() {
        let (lifecycle, counters) = lifecycle();
        lifecycle.execute().unwrap();
        assert!(lifecycle.abort());
        assert!(lifecycle.cancellation().is_cancelled());

        lifecycle.server_response_received(Ok(1)).unwrap();
        lifecycle
            .server_response_received(Err(RequestFailure::Transport(
                TransportError::Cancelled,
            )))
            .unwrap();
        assert_eq!(lifecycle.state(), RequestState::Aborted);
        assert_eq!(counters.successes.load(Ordering::SeqCst), 0);
        assert_eq!(counters.failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_abort_is_idempotent() {
        let (lifecycle, counters) = lifecycle();
        lifecycle.execute().unwrap();
        assert!(lifecycle.abort());
        assert!(!lifecycle.abort());
        assert_eq!(lifecycle.state(), RequestState::Aborted);

        let (completed, completed_counters) = self::lifecycle();
        completed.execute().unwrap();
        completed.server_response_received(Ok(3)).unwrap();
        assert!(!completed.abort());
        assert_eq!(completed.state(), RequestState::Completed);
        assert_eq!(completed_counters.successes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.successes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_abort_handle_is_type_erased() {
        let (lifecycle, _) = lifecycle();
        let handle = AbortHandle::new(Arc::new(lifecycle));
        let clone = handle.clone();
        assert_eq!(handle.state(), RequestState::Ready);
        assert!(clone.abort());
        assert_eq!(handle.state(), RequestState::Aborted);
    }
}
