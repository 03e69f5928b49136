// src/engine/streaming/worker.rs

//! One streaming worker per graph node.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::engine::observer::ExecutionObserver;
use crate::engine::streaming::record::InvocationRegistry;
use crate::engine::transition::{Transition, TransitionMessage};
use crate::engine::{InvocationId, TaskName};
use crate::task::{Payload, Task, TaskInputs};

/// An incoming edge: the upstream's name (or the invocation edge for roots)
/// and the queue it delivers on.
pub(crate) type InputEdge = (TaskName, mpsc::Receiver<TransitionMessage>);
/// An outgoing edge: the downstream's name and the queue feeding it.
pub(crate) type OutputEdge = (TaskName, mpsc::Sender<TransitionMessage>);

/// What a worker gathered from all of its inputs for one step.
enum Gathered {
    Stop,
    Ignore(InvocationId),
    Ready(TaskInputs),
}

/// Execution loop state for one node.
///
/// The worker exclusively owns its queues; dropping it closes every output
/// edge, which downstream workers observe as end-of-stream.
pub(crate) struct Worker {
    pub(crate) name: TaskName,
    pub(crate) level: usize,
    pub(crate) task: Arc<dyn Task>,
    pub(crate) inputs: Vec<InputEdge>,
    pub(crate) outputs: Vec<OutputEdge>,
    pub(crate) registry: Arc<InvocationRegistry>,
    pub(crate) observer: Arc<dyn ExecutionObserver>,
}

impl Worker {
    /// Process invocations until a stop signal (or a closed input) arrives.
    pub(crate) async fn run(mut self) {
        debug!(
            node = %self.name,
            level = self.level,
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            "worker started"
        );

        loop {
            match self.gather().await {
                Gathered::Stop => {
                    self.forward_stop().await;
                    break;
                }
                Gathered::Ignore(invocation_id) => {
                    self.observer.node_skipped(&invocation_id, &self.name);
                    self.emit(&invocation_id, None).await;
                }
                Gathered::Ready(inputs) => {
                    let invocation_id = inputs.invocation_id().to_string();
                    let outcome = self.execute(inputs).await;
                    self.emit(&invocation_id, outcome).await;
                }
            }
        }

        self.observer.worker_stopped(&self.name);
    }

    /// Barrier read: one message from every input edge.
    async fn gather(&mut self) -> Gathered {
        let mut invocation_id: Option<InvocationId> = None;
        let mut inputs: Option<TaskInputs> = None;
        let mut stop = false;
        let mut ignore = false;

        for (edge, rx) in self.inputs.iter_mut() {
            let msg = match rx.recv().await {
                Some(msg) => msg,
                None => {
                    trace!(node = %self.name, edge = %edge, "input edge closed");
                    stop = true;
                    continue;
                }
            };

            if msg.is_stop() {
                stop = true;
                continue;
            }

            match &invocation_id {
                None => invocation_id = Some(msg.invocation_id.clone()),
                Some(expected) if *expected != msg.invocation_id => {
                    error!(
                        node = %self.name,
                        edge = %edge,
                        expected = %expected,
                        got = %msg.invocation_id,
                        "edges delivered different invocations; queues out of step"
                    );
                }
                Some(_) => {}
            }

            match msg.transition {
                Transition::Data(payload) => {
                    inputs
                        .get_or_insert_with(|| TaskInputs::new(msg.invocation_id.clone()))
                        .insert(edge.clone(), payload);
                }
                Transition::Ignore => ignore = true,
                Transition::Stop => stop = true,
            }
        }

        if stop {
            return Gathered::Stop;
        }

        let invocation_id = invocation_id.unwrap_or_default();
        if ignore {
            return Gathered::Ignore(invocation_id);
        }

        Gathered::Ready(inputs.unwrap_or_else(|| TaskInputs::new(invocation_id)))
    }

    async fn execute(&self, inputs: TaskInputs) -> Option<Payload> {
        let invocation_id = inputs.invocation_id().to_string();
        self.observer.node_started(&invocation_id, &self.name);

        let started = Instant::now();
        match self.task.execute(inputs).await {
            Ok(payload) => {
                self.observer
                    .node_succeeded(&invocation_id, &self.name, started.elapsed());
                Some(payload)
            }
            Err(err) => {
                self.observer.node_failed(&invocation_id, &self.name, &err);
                None
            }
        }
    }

    /// Fan a node's outcome out to every downstream, or record it if this
    /// node is a leaf. `None` means the node produced nothing for this
    /// invocation and descendants receive the ignore signal.
    async fn emit(&self, invocation_id: &str, outcome: Option<Payload>) {
        if self.outputs.is_empty() {
            self.registry
                .record_leaf(invocation_id, &self.name, outcome, self.observer.as_ref());
            return;
        }

        for (downstream, tx) in &self.outputs {
            let msg = match &outcome {
                Some(payload) => TransitionMessage::data(invocation_id, payload.clone()),
                None => TransitionMessage::ignore(invocation_id),
            };
            if tx.send(msg).await.is_err() {
                warn!(
                    node = %self.name,
                    downstream = %downstream,
                    invocation = %invocation_id,
                    "downstream queue closed; message dropped"
                );
            }
        }
    }

    /// Re-broadcast the stop signal, then close every output edge.
    async fn forward_stop(&mut self) {
        for (downstream, tx) in &self.outputs {
            if tx.send(TransitionMessage::stop()).await.is_err() {
                trace!(node = %self.name, downstream = %downstream, "downstream already gone");
            }
        }
        self.outputs.clear();
        debug!(node = %self.name, "stop forwarded; output edges closed");
    }
}
