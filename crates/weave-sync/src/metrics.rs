//! Replication counters.

use serde::Serialize;

/// Raw counters kept by the optimizer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncMetrics {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub sync_duration_ms: f64,
    pub conflicts_resolved: u64,
    pub serialization_failures: u64,
    pub deltas_applied: u64,
    pub deltas_rejected: u64,
    pub deltas_collected: u64,
}

/// Snapshot of [`SyncMetrics`] with derived rates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SyncReport {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub success_rate: f64,
    pub avg_sync_duration_ms: f64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub conflicts_resolved: u64,
    pub serialization_failures: u64,
    pub deltas_applied: u64,
    pub deltas_rejected: u64,
    pub deltas_collected: u64,
}

impl SyncMetrics {
    pub fn report(&self) -> SyncReport {
        let (success_rate, avg_sync_duration_ms) = if self.total_syncs > 0 {
            (
                self.successful_syncs as f64 / self.total_syncs as f64,
                self.sync_duration_ms / self.total_syncs as f64,
            )
        } else {
            (0.0, 0.0)
        };

        SyncReport {
            total_syncs: self.total_syncs,
            successful_syncs: self.successful_syncs,
            failed_syncs: self.failed_syncs,
            success_rate,
            avg_sync_duration_ms,
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            conflicts_resolved: self.conflicts_resolved,
            serialization_failures: self.serialization_failures,
            deltas_applied: self.deltas_applied,
            deltas_rejected: self.deltas_rejected,
            deltas_collected: self.deltas_collected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_rates() {
        let metrics = SyncMetrics {
            total_syncs: 4,
            successful_syncs: 3,
            failed_syncs: 1,
            sync_duration_ms: 10.0,
            ..Default::default()
        };
        let report = metrics.report();
        assert_eq!(report.success_rate, 0.75);
        assert_eq!(report.avg_sync_duration_ms, 2.5);

        assert_eq!(SyncMetrics::default().report().success_rate, 0.0);
    }
}
