//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `ledger_transactions_total` - Transactions appended
//! - `ledger_debits_refused_total` - Debits refused for insufficient credit
//! - `ledger_replays_absorbed_total` - Idempotent replays returned unchanged
//! - `ledger_reservations_swept_total` - HELD reservations reclaimed by the sweep

use prometheus::{IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Counters are registered against a per-instance registry rather than the
/// process-global one, so multiple ledgers (tests) can coexist.
#[derive(Clone)]
pub struct Metrics {
    /// Transactions appended
    pub transactions_total: IntCounter,

    /// Debits refused without side effect
    pub debits_refused: IntCounter,

    /// Idempotent replays absorbed
    pub replays_absorbed: IntCounter,

    /// Reservations reclaimed by the timeout sweep
    pub reservations_swept: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_total = IntCounter::new(
            "ledger_transactions_total",
            "Transactions appended",
        )?;
        registry.register(Box::new(transactions_total.clone()))?;

        let debits_refused = IntCounter::new(
            "ledger_debits_refused_total",
            "Debits refused for insufficient credit",
        )?;
        registry.register(Box::new(debits_refused.clone()))?;

        let replays_absorbed = IntCounter::new(
            "ledger_replays_absorbed_total",
            "Idempotent replays returned unchanged",
        )?;
        registry.register(Box::new(replays_absorbed.clone()))?;

        let reservations_swept = IntCounter::new(
            "ledger_reservations_swept_total",
            "HELD reservations reclaimed by the sweep",
        )?;
        registry.register(Box::new(reservations_swept.clone()))?;

        Ok(Self {
            transactions_total,
            debits_refused,
            replays_absorbed,
            reservations_swept,
            registry,
        })
    }

    /// Gather current metric families for export
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("transactions_total", &self.transactions_total.get())
            .field("debits_refused", &self.debits_refused.get())
            .field("replays_absorbed", &self.replays_absorbed.get())
            .field("reservations_swept", &self.reservations_swept.get())
            .finish()
    }
}
