// src/engine/transition.rs

use crate::engine::InvocationId;
use crate::task::Payload;

/// What a message carries along an edge.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The upstream produced a result.
    Data(Payload),
    /// The upstream was skipped or failed; drain without executing.
    Ignore,
    /// Forward and exit.
    Stop,
}

/// Unit of communication between streaming workers.
///
/// Each message is consumed exactly once by the worker reading the queue it
/// was placed on.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMessage {
    pub invocation_id: InvocationId,
    pub transition: Transition,
}

impl TransitionMessage {
    pub fn data(invocation_id: impl Into<InvocationId>, payload: Payload) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            transition: Transition::Data(payload),
        }
    }

    pub fn ignore(invocation_id: impl Into<InvocationId>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            transition: Transition::Ignore,
        }
    }

    /// Stop messages do not belong to any invocation.
    pub fn stop() -> Self {
        Self {
            invocation_id: InvocationId::new(),
            transition: Transition::Stop,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self.transition, Transition::Stop)
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self.transition, Transition::Ignore)
    }
}
