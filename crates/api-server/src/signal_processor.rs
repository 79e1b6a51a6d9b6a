//! Signal processor: bridges the ingress channel to the trade path.
//!
//! Consumes swap events, runs them through the signal pipeline, then offers
//! eligible signals to slot admission and the entry service. Also provides
//! the release path for signals that waited in the queue.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use risk_manager::position_slots::{AdmissionOutcome, PositionSlotManager};
use signal_engine::pipeline::{PipelineOutcome, SignalPipeline};
use trading_engine::entry_service::EntryOrderService;
use walltrack_core::stores::SignalLog;
use walltrack_core::types::{ExecutionStatus, GateDecision, QueuedSignal, ScoredSignal, SwapEvent};
use walltrack_core::Result;

/// Payload persisted with a queued signal so it can be executed later.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct QueuedTradePayload {
    scored: ScoredSignal,
    decision: GateDecision,
}

/// Worker that drains the ingress channel.
pub struct SignalProcessor {
    pipeline: Arc<SignalPipeline>,
    slots: Arc<PositionSlotManager>,
    entry_service: Arc<EntryOrderService>,
    signals: Arc<dyn SignalLog>,
}

impl SignalProcessor {
    pub fn new(
        pipeline: Arc<SignalPipeline>,
        slots: Arc<PositionSlotManager>,
        entry_service: Arc<EntryOrderService>,
        signals: Arc<dyn SignalLog>,
    ) -> Self {
        Self {
            pipeline,
            slots,
            entry_service,
            signals,
        }
    }

    /// Register this processor as the slot manager's release callback, so
    /// queued signals re-enter the trade path when a slot frees up.
    pub async fn register_release_callback(self: &Arc<Self>) {
        let processor = Arc::clone(self);
        self.slots
            .register_release_callback(Arc::new(move |queued: QueuedSignal| {
                let processor = Arc::clone(&processor);
                Box::pin(async move {
                    if let Err(e) = processor.execute_released(queued).await {
                        warn!(error = %e, "released signal execution failed");
                    }
                })
            }))
            .await;
    }

    /// Drain events until the channel closes or cancellation fires.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<SwapEvent>,
        cancel: CancellationToken,
    ) {
        info!("signal processor started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    if let Err(e) = self.process_event(&event).await {
                        error!(tx = %event.tx_signature, error = %e, "signal processing failed");
                    }
                }
            }
        }
        info!("signal processor stopped");
    }

    /// Run one event through pipeline, admission, and entry.
    pub async fn process_event(&self, event: &SwapEvent) -> Result<()> {
        let outcome = self.pipeline.process(event).await?;

        let (scored, decision) = match outcome {
            PipelineOutcome::Eligible {
                scored, decision, ..
            } => (scored, decision),
            _ => return Ok(()),
        };

        let payload = serde_json::to_value(QueuedTradePayload {
            scored: scored.clone(),
            decision: decision.clone(),
        })?;

        match self.slots.request(scored.signal_id, payload).await? {
            AdmissionOutcome::Allowed => {
                self.entry_service.process_signal(&scored, &decision).await?;
            }
            AdmissionOutcome::Queued { position } => {
                self.signals
                    .update_execution_status(
                        scored.signal_id,
                        ExecutionStatus::Queued,
                        Some(&format!("queue position {position}")),
                    )
                    .await?;
            }
            AdmissionOutcome::BlockedNoQueue => {
                self.signals
                    .update_execution_status(
                        scored.signal_id,
                        ExecutionStatus::Blocked,
                        Some("position slots full, queue disabled"),
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// Execute a signal released from the queue. Downstream denial (pause,
    /// sizing, concentration) is an allowed outcome and does not requeue.
    async fn execute_released(&self, queued: QueuedSignal) -> Result<()> {
        let payload: QueuedTradePayload = serde_json::from_value(queued.payload)?;
        self.entry_service
            .process_signal(&payload.scored, &payload.decision)
            .await?;
        Ok(())
    }
}
