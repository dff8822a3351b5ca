//! Bounded tick history.

use std::collections::VecDeque;

use super::TickReport;
use crate::model::AlertStatus;

/// Fixed-capacity FIFO of the most recent tick reports.
///
/// Owned by a single monitor task; pushing past capacity evicts the oldest
/// report.
#[derive(Debug, Clone)]
pub struct TickHistory {
    capacity: usize,
    reports: VecDeque<TickReport>,
}

impl TickHistory {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            reports: VecDeque::with_capacity(capacity),
        }
    }

    /// Record a report, evicting the oldest one when full.
    pub fn push(&mut self, report: TickReport) {
        if self.reports.len() == self.capacity {
            self.reports.pop_front();
        }
        self.reports.push_back(report);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn latest(&self) -> Option<&TickReport> {
        self.reports.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TickReport> {
        self.reports.iter()
    }

    /// Number of retained reports that evaluated to `Risk`.
    pub fn risk_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.status() == Some(AlertStatus::Risk))
            .count()
    }
}
