//! Interval scheduling for the controller's jobs.
//!
//! Jobs run sequentially in one execution context, so the scheduler
//! itself provides mutual exclusion over the ledger files. Ticks are not
//! wall-clock-exact: a job that overruns (a blocking retraining, say)
//! simply delays everything behind it, and a missed interval collapses
//! into a single catch-up run.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Fetch,
    Reconcile,
    Evaluate,
}

#[derive(Debug, Clone)]
struct Job {
    kind: JobKind,
    interval: Duration,
    next_due: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    jobs: Vec<Job>,
}

impl Scheduler {
    /// Builds the standard job table. The first run of each job is one
    /// full interval after `start`.
    pub fn new(
        start: DateTime<Utc>,
        fetch_interval: Duration,
        reconcile_interval: Duration,
        evaluate_interval: Duration,
    ) -> Self {
        let job = |kind, interval: Duration| Job {
            kind,
            interval,
            next_due: start + interval,
        };
        Self {
            jobs: vec![
                job(JobKind::Fetch, fetch_interval),
                job(JobKind::Reconcile, reconcile_interval),
                job(JobKind::Evaluate, evaluate_interval),
            ],
        }
    }

    /// Jobs due at `now`, in fixed table order. Each returned job is
    /// rescheduled to `now + interval`, so a long stall yields one
    /// catch-up run rather than a burst.
    pub fn due_jobs(&mut self, now: DateTime<Utc>) -> Vec<JobKind> {
        let mut due = Vec::new();
        for job in &mut self.jobs {
            if job.next_due <= now {
                due.push(job.kind);
                job.next_due = now + job.interval;
            }
        }
        due
    }

    /// Earliest upcoming due time across all jobs.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.jobs.iter().map(|j| j.next_due).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(
            start(),
            Duration::hours(1),
            Duration::hours(1),
            Duration::hours(24),
        )
    }

    #[test]
    fn nothing_due_before_first_interval() {
        let mut s = scheduler();
        assert!(s.due_jobs(start() + Duration::minutes(30)).is_empty());
    }

    #[test]
    fn hourly_jobs_come_due_in_table_order() {
        let mut s = scheduler();
        let due = s.due_jobs(start() + Duration::hours(1));
        assert_eq!(due, vec![JobKind::Fetch, JobKind::Reconcile]);
    }

    #[test]
    fn daily_job_joins_after_a_day() {
        let mut s = scheduler();
        let due = s.due_jobs(start() + Duration::hours(24));
        assert_eq!(
            due,
            vec![JobKind::Fetch, JobKind::Reconcile, JobKind::Evaluate]
        );
    }

    #[test]
    fn running_reschedules_relative_to_now() {
        let mut s = scheduler();
        let late = start() + Duration::hours(1) + Duration::minutes(40);
        assert_eq!(s.due_jobs(late).len(), 2);
        // Next fetch is a full hour after the late run, not at the
        // original grid point.
        assert!(s.due_jobs(start() + Duration::hours(2)).is_empty());
        assert_eq!(s.due_jobs(late + Duration::hours(1)).len(), 2);
    }

    #[test]
    fn missed_intervals_collapse_into_one_run() {
        let mut s = scheduler();
        let due = s.due_jobs(start() + Duration::hours(5));
        assert_eq!(due.iter().filter(|k| **k == JobKind::Fetch).count(), 1);
    }

    #[test]
    fn next_due_is_earliest_job() {
        let s = scheduler();
        assert_eq!(s.next_due(), Some(start() + Duration::hours(1)));
    }
}
