use serde::{Deserialize, Serialize};

use crate::domain::JobState;

/// Number of scheduled jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub retry_scheduled: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn record(&mut self, state: JobState) {
        match state {
            JobState::Pending => self.pending += 1,
            JobState::Running => self.running += 1,
            JobState::Succeeded => self.succeeded += 1,
            JobState::RetryScheduled => self.retry_scheduled += 1,
            JobState::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.succeeded + self.retry_scheduled + self.failed
    }
}

impl FromIterator<JobState> for JobCounts {
    fn from_iter<I: IntoIterator<Item = JobState>>(iter: I) -> Self {
        let mut counts = JobCounts::default();
        for state in iter {
            counts.record(state);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_each_state() {
        let counts: JobCounts = [
            JobState::Pending,
            JobState::Pending,
            JobState::Running,
            JobState::Failed,
        ]
        .into_iter()
        .collect();

        assert_eq!(counts.pending, 2);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 4);
    }
}
