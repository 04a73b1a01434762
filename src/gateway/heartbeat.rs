use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::events::GatewayFrame;
use super::session::SharedState;

/// What the monitor does about heartbeats the gateway never acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LivenessPolicy {
    /// Send heartbeats and ignore acks. A gateway that stops answering but
    /// keeps the socket open goes unnoticed.
    #[default]
    Disabled,
    /// Tear the connection down after this many heartbeats in a row go
    /// unacknowledged.
    MissedAcks(u32),
}

/// Count of heartbeats sent since the last ack, shared between the monitor
/// and the connection's read loop.
#[derive(Debug, Default)]
pub struct AckTracker {
    unacked: AtomicU32,
}

impl AckTracker {
    pub fn sent(&self) -> u32 {
        self.unacked.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn acked(&self) {
        self.unacked.store(0, Ordering::SeqCst);
    }

    pub fn unacked(&self) -> u32 {
        self.unacked.load(Ordering::SeqCst)
    }
}

/// Keepalive loop for exactly one connection attempt.
pub struct HeartbeatMonitor {
    handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

impl HeartbeatMonitor {
    /// Spawn the loop. Heartbeats go through `outbound`, the connection's
    /// write queue, so the socket keeps a single writer. `dead_tx` fires when
    /// the liveness policy gives up on the connection.
    pub fn spawn(
        interval: Duration,
        state: SharedState,
        outbound: mpsc::UnboundedSender<String>,
        acks: Arc<AckTracker>,
        policy: LivenessPolicy,
        dead_tx: mpsc::UnboundedSender<()>,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                if *stop_rx.borrow() {
                    break;
                }

                if let LivenessPolicy::MissedAcks(limit) = policy {
                    if acks.unacked() >= limit {
                        tracing::warn!(
                            "no heartbeat ack for {limit} intervals, dropping connection"
                        );
                        let _ = dead_tx.send(());
                        break;
                    }
                }

                let sequence = state.read().await.sequence;
                if outbound
                    .send(GatewayFrame::heartbeat(sequence).to_text())
                    .is_err()
                {
                    tracing::debug!("heartbeat queue closed, stopping monitor");
                    break;
                }
                let pending = acks.sent();
                tracing::trace!(?sequence, pending, "heartbeat sent");

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop_rx.changed() => break,
                }
            }
        });

        Self { handle, stop_tx }
    }

    /// Signal the loop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }
}
