#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use restplate::{
    RequestFailure, Transport, TransportRequest, TransportResponse,
    core::RequestBuilder,
    ports::{TransportError, TransportResult},
};
use tokio::sync::{Notify, mpsc};

/// What the scripted transport does for one call.
pub enum Step {
    Respond(TransportResponse),
    Fail(TransportError),
    Hang,
}

/// In-memory transport replaying a script. Once the script runs out the
/// last step's kind is repeated by `fallback`.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: fn() -> Step,
    seen: Mutex<Vec<TransportRequest>>,
    pub called: Notify,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Step>) -> Arc<Self> {
        Self::with_fallback(script, || Step::Hang)
    }

    pub fn with_fallback(script: Vec<Step>, fallback: fn() -> Step) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            seen: Mutex::new(Vec::new()),
            called: Notify::new(),
        })
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> TransportResult<TransportResponse> {
        self.seen.lock().unwrap().push(request);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(self.fallback);
        self.called.notify_one();

        match step {
            Step::Respond(response) => Ok(response),
            Step::Fail(err) => Err(err),
            Step::Hang => std::future::pending().await,
        }
    }
}

/// Route both callbacks of `builder` into a channel.
pub fn capture<T: Send + 'static>(
    builder: RequestBuilder<T>,
) -> (
    RequestBuilder<T>,
    mpsc::UnboundedReceiver<Result<T, RequestFailure>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let failure_tx = tx.clone();
    let builder = builder
        .on_success(move |value| {
            let _ = tx.send(Ok(value));
        })
        .on_failure(move |failure| {
            let _ = failure_tx.send(Err(failure));
        });
    (builder, rx)
}
