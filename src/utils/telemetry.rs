//! Telemetry Module
//!
//! In-process counters for underwriting activity:
//! - Applications, approvals and denials
//! - Repayments by timeliness
//! - Request latency
//!
//! Privacy-first: counters only, no user ids or amounts are retained.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::{Decision, RepaymentStatus};

/// Snapshot of the counters
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TelemetryStats {
    pub total_applications: u64,
    pub total_approved: u64,
    pub total_denied: u64,
    /// Approved / applications, 0 when none
    pub approval_rate: f64,
    pub total_repayments: u64,
    pub on_time_repayments: u64,
    pub late_repayments: u64,
    /// Average latency of scored requests (ms)
    pub avg_latency_ms: f64,
    pub period_start: u64,
    pub period_end: u64,
}

/// Lock-free counters shared across handlers
#[derive(Debug)]
pub struct TelemetryCollector {
    applications: AtomicU64,
    approved: AtomicU64,
    denied: AtomicU64,
    repayments_on_time: AtomicU64,
    repayments_late: AtomicU64,
    timed_requests: AtomicU64,
    total_latency_us: AtomicU64,
    session_start: u64,
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            applications: AtomicU64::new(0),
            approved: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            repayments_on_time: AtomicU64::new(0),
            repayments_late: AtomicU64::new(0),
            timed_requests: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            session_start: current_timestamp(),
        }
    }

    pub fn record_application(&self, decision: Decision, latency_us: u64) {
        self.applications.fetch_add(1, Ordering::Relaxed);
        match decision {
            Decision::Approve => self.approved.fetch_add(1, Ordering::Relaxed),
            Decision::Deny => self.denied.fetch_add(1, Ordering::Relaxed),
        };
        self.record_latency(latency_us);
    }

    pub fn record_repayment(&self, status: RepaymentStatus, latency_us: u64) {
        match status {
            RepaymentStatus::OnTime => self.repayments_on_time.fetch_add(1, Ordering::Relaxed),
            RepaymentStatus::Late => self.repayments_late.fetch_add(1, Ordering::Relaxed),
        };
        self.record_latency(latency_us);
    }

    fn record_latency(&self, latency_us: u64) {
        self.timed_requests.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        let applications = self.applications.load(Ordering::Relaxed);
        let approved = self.approved.load(Ordering::Relaxed);
        let on_time = self.repayments_on_time.load(Ordering::Relaxed);
        let late = self.repayments_late.load(Ordering::Relaxed);
        let timed = self.timed_requests.load(Ordering::Relaxed);
        let latency_us = self.total_latency_us.load(Ordering::Relaxed);

        let approval_rate = if applications > 0 {
            approved as f64 / applications as f64
        } else {
            0.0
        };
        let avg_latency_ms = if timed > 0 {
            latency_us as f64 / timed as f64 / 1000.0
        } else {
            0.0
        };

        TelemetryStats {
            total_applications: applications,
            total_approved: approved,
            total_denied: self.denied.load(Ordering::Relaxed),
            approval_rate,
            total_repayments: on_time + late,
            on_time_repayments: on_time,
            late_repayments: late,
            avg_latency_ms,
            period_start: self.session_start,
            period_end: current_timestamp(),
        }
    }

    /// Export current stats to `<dir>/stats_<unix>.json`
    pub fn export_stats_json(&self, dir: &Path) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(dir)?;
        let stats = self.get_stats();
        let path = dir.join(format!("stats_{}.json", stats.period_end));

        let json = serde_json::to_string_pretty(&stats)?;
        fs::write(&path, json)?;

        Ok(path)
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_basic() {
        let collector = TelemetryCollector::new();
        collector.record_application(Decision::Approve, 2_000);
        collector.record_application(Decision::Deny, 4_000);
        collector.record_application(Decision::Approve, 3_000);
        collector.record_repayment(RepaymentStatus::Late, 1_000);

        let stats = collector.get_stats();
        assert_eq!(stats.total_applications, 3);
        assert_eq!(stats.total_approved, 2);
        assert_eq!(stats.total_denied, 1);
        assert!((stats.approval_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.total_repayments, 1);
        assert_eq!(stats.late_repayments, 1);
        assert!((stats.avg_latency_ms - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_stats() {
        let stats = TelemetryCollector::new().get_stats();
        assert_eq!(stats.approval_rate, 0.0);
        assert_eq!(stats.avg_latency_ms, 0.0);
        assert!(stats.period_end >= stats.period_start);
    }

    #[test]
    fn test_stats_json_export() {
        let dir = tempfile::tempdir().unwrap();
        let collector = TelemetryCollector::new();
        collector.record_repayment(RepaymentStatus::OnTime, 500);

        let path = collector.export_stats_json(&dir.path().join("telemetry")).unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        let stats: TelemetryStats = serde_json::from_str(&raw).unwrap();
        assert_eq!(stats.on_time_repayments, 1);
    }
}
