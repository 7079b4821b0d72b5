//! Fire-and-forget delivery of "device ready" notifications
//!
//! The registry pushes onto a bounded queue and returns immediately; a worker
//! task drains the queue into the sink.

use plugsync_core::ComponentKind;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::channel::{DispatchInfo, DispatchSink};

/// Pending notifications before submitters fall back to a spawned send
pub const DISPATCH_QUEUE_DEPTH: usize = 64;

/// One notification for one device channel
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub kind: ComponentKind,
    pub info: DispatchInfo,
}

/// Sending half of the dispatch queue
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<Dispatch>,
}

impl DispatchQueue {
    /// Create the queue and spawn its worker on the current runtime
    pub fn spawn(sink: Arc<dyn DispatchSink>) -> Self {
        let (tx, rx) = mpsc::channel(DISPATCH_QUEUE_DEPTH);
        tokio::spawn(run_worker(rx, sink));
        Self { tx }
    }

    /// Queue a notification without waiting for it to be delivered
    pub fn submit(&self, dispatch: Dispatch) {
        match self.tx.try_send(dispatch) {
            Ok(()) => {}
            Err(TrySendError::Full(dispatch)) => {
                // Deferred sends may overtake one another; per-device
                // ordering is not guaranteed past this point
                debug!(device = %dispatch.info.device_id, "Dispatch queue full, deferring");
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if let Err(mpsc::error::SendError(dispatch)) = tx.send(dispatch).await {
                        warn!(
                            device = %dispatch.info.device_id,
                            kind = %dispatch.kind,
                            "Dispatch worker stopped, dropping deferred registration"
                        );
                    }
                });
            }
            Err(TrySendError::Closed(dispatch)) => {
                warn!(
                    device = %dispatch.info.device_id,
                    kind = %dispatch.kind,
                    "Dispatch worker stopped, dropping registration"
                );
            }
        }
    }
}

async fn run_worker(mut rx: mpsc::Receiver<Dispatch>, sink: Arc<dyn DispatchSink>) {
    while let Some(Dispatch { kind, info }) = rx.recv().await {
        debug!(
            device = %info.device_id,
            kind = %kind,
            channel = ?info.channel,
            "Dispatching device"
        );
        sink.notify(&kind, info);
    }
    debug!("Dispatch worker finished");
}
