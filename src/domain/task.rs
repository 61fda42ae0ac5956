use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one task within a run.
///
/// ```text
/// Pending ──► Running ──► Success
///    │           │
///    │           ├──► UpForRetry ──► Running
///    │           └──► Failed
///    └──► UpstreamFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    UpForRetry,
    Success,
    Failed,
    UpstreamFailed,
}

impl TaskState {
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::{Failed, Pending, Running, Success, UpForRetry, UpstreamFailed};
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, UpstreamFailed)
                | (Running, Success)
                | (Running, Failed)
                | (Running, UpForRetry)
                | (UpForRetry, Running)
                | (UpForRetry, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::UpForRetry => "up_for_retry",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::UpstreamFailed => "upstream_failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid task state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TaskState,
    pub to: TaskState,
}

/// Execution record of one task in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub task_id: String,
    pub state: TaskState,
    /// Number of attempts started so far
    pub try_number: u32,
    pub max_tries: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TaskInstance {
    pub fn new(task_id: impl Into<String>, retries: u32) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Pending,
            try_number: 0,
            max_tries: retries.saturating_add(1),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    fn transition(&mut self, next: TaskState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn start_attempt(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.transition(TaskState::Running)?;
        self.try_number += 1;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        Ok(())
    }

    pub fn succeed(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.transition(TaskState::Success)?;
        self.finished_at = Some(now);
        self.error = None;
        Ok(())
    }

    /// Records a failed attempt. Goes to `UpForRetry` while tries remain and
    /// `retryable` is set, otherwise to `Failed`.
    pub fn fail_attempt(
        &mut self,
        now: DateTime<Utc>,
        error: impl Into<String>,
        retryable: bool,
    ) -> Result<TaskState, InvalidTransition> {
        let next = if retryable && self.try_number < self.max_tries {
            TaskState::UpForRetry
        } else {
            TaskState::Failed
        };
        self.transition(next)?;
        self.error = Some(error.into());
        if next == TaskState::Failed {
            self.finished_at = Some(now);
        }
        Ok(next)
    }

    /// Ends a task that was waiting for its retry.
    pub fn abandon_retry(
        &mut self,
        now: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Result<(), InvalidTransition> {
        self.transition(TaskState::Failed)?;
        self.error = Some(reason.into());
        self.finished_at = Some(now);
        Ok(())
    }

    pub fn mark_upstream_failed(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.transition(TaskState::UpstreamFailed)?;
        self.finished_at = Some(now);
        Ok(())
    }

    pub fn duration_ms(&self) -> Option<i64> {
        Some((self.finished_at? - self.started_at?).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_767_225_600, 0).unwrap()
    }

    mod transitions {
        use super::*;

        #[rstest]
        #[case(TaskState::Pending, TaskState::Running, true)]
        #[case(TaskState::Pending, TaskState::UpstreamFailed, true)]
        #[case(TaskState::Running, TaskState::UpForRetry, true)]
        #[case(TaskState::UpForRetry, TaskState::Running, true)]
        #[case(TaskState::Pending, TaskState::Success, false)]
        #[case(TaskState::Success, TaskState::Running, false)]
        #[case(TaskState::Failed, TaskState::Running, false)]
        #[case(TaskState::UpstreamFailed, TaskState::Running, false)]
        fn allowed(#[case] from: TaskState, #[case] to: TaskState, #[case] expected: bool) {
            assert_eq!(from.can_transition_to(to), expected);
        }
    }

    mod instance {
        use super::*;

        #[test]
        fn success_on_first_try() {
            let mut ti = TaskInstance::new("create_test_table", 1);
            ti.start_attempt(now()).unwrap();
            ti.succeed(now()).unwrap();

            assert_eq!(ti.state, TaskState::Success);
            assert_eq!(ti.try_number, 1);
            assert_eq!(ti.duration_ms(), Some(0));
        }

        #[test]
        fn first_failure_is_retried_when_tries_remain() {
            let mut ti = TaskInstance::new("insert_test_data", 1);
            ti.start_attempt(now()).unwrap();

            let next = ti.fail_attempt(now(), "boom", true).unwrap();

            assert_eq!(next, TaskState::UpForRetry);
            assert!(ti.finished_at.is_none());
        }

        #[test]
        fn second_failure_is_final() {
            let mut ti = TaskInstance::new("insert_test_data", 1);
            ti.start_attempt(now()).unwrap();
            ti.fail_attempt(now(), "boom", true).unwrap();
            ti.start_attempt(now()).unwrap();

            let next = ti.fail_attempt(now(), "boom again", true).unwrap();

            assert_eq!(next, TaskState::Failed);
            assert_eq!(ti.try_number, 2);
            assert_eq!(ti.error.as_deref(), Some("boom again"));
        }

        #[test]
        fn non_retryable_failure_skips_retry() {
            let mut ti = TaskInstance::new("query_test_data", 3);
            ti.start_attempt(now()).unwrap();

            let next = ti.fail_attempt(now(), "cancelled", false).unwrap();

            assert_eq!(next, TaskState::Failed);
        }

        #[test]
        fn abandoned_retry_is_failed() {
            let mut ti = TaskInstance::new("insert_test_data", 1);
            ti.start_attempt(now()).unwrap();
            ti.fail_attempt(now(), "boom", true).unwrap();

            ti.abandon_retry(now(), "cancelled").unwrap();

            assert_eq!(ti.state, TaskState::Failed);
            assert_eq!(ti.error.as_deref(), Some("cancelled"));
        }

        #[test]
        fn max_retries_saturates_instead_of_wrapping() {
            let mut ti = TaskInstance::new("insert_test_data", u32::MAX);
            ti.start_attempt(now()).unwrap();

            let next = ti.fail_attempt(now(), "boom", true).unwrap();

            assert_eq!(ti.max_tries, u32::MAX);
            assert_eq!(next, TaskState::UpForRetry);
        }

        #[test]
        fn succeed_from_pending_is_rejected() {
            let mut ti = TaskInstance::new("cleanup_test_table", 1);
            let err = ti.succeed(now()).unwrap_err();
            assert_eq!(err.from, TaskState::Pending);
            assert_eq!(err.to, TaskState::Success);
        }
    }
}
