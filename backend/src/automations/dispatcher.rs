// Event dispatch boundary
//
// Dispatch is fire-and-forget for the CRUD caller: events are pushed onto a
// bounded channel and drained by a single worker task, so a slow downstream
// action (an email send, a stalled mutation) cannot block the request that
// raised the domain event.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::engine::AutomationEngine;
use super::triggers::AutomationEvent;

/// Events buffered before dispatch starts shedding under burst load.
pub const EVENT_QUEUE_DEPTH: usize = 256;

#[derive(Clone)]
pub struct AutomationDispatcher {
    tx: mpsc::Sender<AutomationEvent>,
}

impl AutomationDispatcher {
    /// Spawn the worker task and return the dispatch handle.
    pub fn start(engine: Arc<AutomationEngine>) -> Self {
        Self::with_queue_depth(engine, EVENT_QUEUE_DEPTH)
    }

    pub fn with_queue_depth(engine: Arc<AutomationEngine>, depth: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AutomationEvent>(depth);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                engine.process_event(&event).await;
            }
            info!("automation event channel closed, worker exiting");
        });

        Self { tx }
    }

    /// Enqueue an event for asynchronous processing. Never blocks; an event
    /// arriving while the queue is full is dropped with a warning.
    pub fn dispatch(&self, event: AutomationEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    trigger = event.trigger_type.as_str(),
                    "automation queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                error!(
                    trigger = event.trigger_type.as_str(),
                    "automation worker is gone, dropping event"
                );
            }
        }
    }
}
