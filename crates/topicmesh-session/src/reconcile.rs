//! Static-peer reconciliation.
//!
//! Keeps every operator-configured static peer connected. Each tick
//! reads the live connected set, dials every static peer that is
//! missing from it and waits for all of those dials to settle. A failed
//! dial is logged and simply retried on the next tick; there is no
//! backoff and no attempt cap.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use libp2p::PeerId;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use topicmesh_network::{Overlay, StaticPeer};

/// Lifecycle of the reconciler, fixed when it is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcilerState {
    /// No static peers configured; the loop never runs.
    Idle,
    /// At least one static peer; the loop ticks until shutdown.
    Active,
}

/// Outcome of one reconciliation tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Static peers that were already connected.
    pub already_connected: Vec<PeerId>,
    /// Static peers that were dialed successfully this tick.
    pub redialed: Vec<PeerId>,
    /// Static peers whose dial failed this tick.
    pub failed: Vec<PeerId>,
}

impl ReconcileReport {
    /// Number of dials attempted this tick.
    pub fn attempted(&self) -> usize {
        self.redialed.len() + self.failed.len()
    }
}

/// Periodically re-dials disconnected static peers.
pub struct StaticPeerReconciler {
    overlay: Arc<dyn Overlay>,
    targets: Vec<StaticPeer>,
    interval: Duration,
    span: tracing::Span,
}

impl StaticPeerReconciler {
    /// Creates a reconciler for `targets`, ticking every `interval`.
    pub fn new(overlay: Arc<dyn Overlay>, targets: Vec<StaticPeer>, interval: Duration) -> Self {
        Self {
            overlay,
            targets,
            interval,
            span: tracing::info_span!("topicmesh", scope = "reconcile"),
        }
    }

    /// `Idle` when there is nothing to reconcile.
    pub fn state(&self) -> ReconcilerState {
        if self.targets.is_empty() {
            ReconcilerState::Idle
        } else {
            ReconcilerState::Active
        }
    }

    /// The static peers this reconciler maintains.
    pub fn targets(&self) -> &[StaticPeer] {
        &self.targets
    }

    /// Runs one reconciliation pass.
    ///
    /// Never fails: every dial error is recorded in the report and
    /// logged.
    pub async fn tick(&self) -> ReconcileReport {
        let connected: HashSet<PeerId> = self.overlay.connected_peers().await.into_iter().collect();

        let mut report = ReconcileReport::default();
        let mut candidates = Vec::new();
        for target in &self.targets {
            if connected.contains(&target.peer_id) {
                report.already_connected.push(target.peer_id);
            } else {
                candidates.push(target);
            }
        }

        if candidates.is_empty() {
            tracing::trace!(parent: &self.span, "all static peers connected");
            return report;
        }

        let dials = candidates.iter().map(|target| {
            let overlay = Arc::clone(&self.overlay);
            let addr = target.addr.clone();
            async move { overlay.dial_addr(addr).await }
        });
        let results = join_all(dials).await;

        for (target, result) in candidates.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    tracing::info!(
                        parent: &self.span,
                        peer_id = %target.peer_id,
                        addr = %target.addr,
                        "reconnected to static peer"
                    );
                    report.redialed.push(target.peer_id);
                }
                Err(e) => {
                    tracing::warn!(
                        parent: &self.span,
                        peer_id = %target.peer_id,
                        addr = %target.addr,
                        %e,
                        "failed to reconnect static peer"
                    );
                    report.failed.push(target.peer_id);
                }
            }
        }

        report
    }

    /// Ticks immediately, then every interval, until `shutdown` flips
    /// to `true` or its sender is dropped.
    ///
    /// Returns at once when the reconciler is idle.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.state() == ReconcilerState::Idle {
            tracing::debug!(parent: &self.span, "no static peers; reconciliation idle");
            return;
        }

        tracing::info!(
            parent: &self.span,
            targets = self.targets.len(),
            interval_secs = self.interval.as_secs(),
            "static peer reconciliation started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if report.attempted() > 0 {
                        tracing::debug!(
                            parent: &self.span,
                            redialed = report.redialed.len(),
                            failed = report.failed.len(),
                            "reconciliation tick complete"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(parent: &self.span, "static peer reconciliation stopped");
    }
}
