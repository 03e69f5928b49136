// src/engine/handle.rs

//! Handles returned to callers of the scheduler API.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{oneshot, watch};

use crate::engine::{InvocationId, LeafResults};
use crate::errors::{ModelflowError, Result};

/// Receiving half of an invocation's completion sink.
///
/// Resolves to the invocation's leaf map. Resolves to
/// [`ModelflowError::Stopped`] only if the executor dropped the invocation
/// without delivering, which does not happen for accepted pushes.
#[derive(Debug)]
pub struct Completion {
    invocation_id: InvocationId,
    rx: oneshot::Receiver<LeafResults>,
}

/// Sending half of an invocation's completion sink.
///
/// `oneshot::Sender::send` consumes the sender, so each sink delivers at
/// most once.
pub type CompletionSink = oneshot::Sender<LeafResults>;

/// Create a connected sink / completion pair for one invocation.
pub fn completion_channel(invocation_id: impl Into<InvocationId>) -> (CompletionSink, Completion) {
    let (tx, rx) = oneshot::channel();
    (
        tx,
        Completion {
            invocation_id: invocation_id.into(),
            rx,
        },
    )
}

impl Completion {
    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }
}

impl Future for Completion {
    type Output = Result<LeafResults>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| ModelflowError::Stopped))
    }
}

/// Handle for waiting until every worker of an executor has exited.
#[derive(Debug, Clone)]
pub struct WaitHandle {
    rx: watch::Receiver<bool>,
}

/// Create the flag a supervisor sets once all workers are gone.
pub(crate) fn shutdown_flag() -> (watch::Sender<bool>, WaitHandle) {
    let (tx, rx) = watch::channel(false);
    (tx, WaitHandle { rx })
}

impl WaitHandle {
    /// Wait for full shutdown.
    ///
    /// There is no timeout here; wrap the call in `tokio::time::timeout` to
    /// bound it.
    pub async fn wait(mut self) {
        // A dropped sender also means the supervisor is gone.
        let _ = self.rx.wait_for(|done| *done).await;
    }

    /// Whether shutdown has completed.
    pub fn is_finished(&self) -> bool {
        *self.rx.borrow()
    }
}
