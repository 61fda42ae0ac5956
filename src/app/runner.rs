//! Executes a [`Dag`] one task at a time, honouring upstream edges, the
//! retry policy of its default args, and cancellation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::dag::Dag;
use crate::domain::{DagRun, RunId, TaskInstance, TaskState};
use crate::error::{DagError, TaskError};
use crate::ports::{Reporter, ResultStore};
use crate::tasks::{Task, TaskContext};

pub struct DagRunner {
    reporter: Arc<dyn Reporter>,
    result_store: Arc<dyn ResultStore>,
    cancel: CancellationToken,
}

impl DagRunner {
    pub fn new(reporter: Arc<dyn Reporter>, result_store: Arc<dyn ResultStore>) -> Self {
        Self {
            reporter,
            result_store,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Triggers one run of the whole DAG. Task failures end up in the returned
    /// run; `Err` is reserved for broken DAG wiring.
    pub async fn run(&self, dag: &Dag) -> Result<DagRun, DagError> {
        let args = &dag.default_args;
        let mut run = DagRun::new(
            &dag.dag_id,
            dag.task_ids().iter().map(String::as_str),
            args.retries,
            Utc::now(),
        );
        tracing::info!(dag_id = %dag.dag_id, run_id = %run.run_id, "dag run started");

        for task_id in dag.task_ids() {
            let upstream_ok = dag
                .upstream_of(task_id)
                .iter()
                .all(|up| run.task(up).is_some_and(|t| t.state == TaskState::Success));

            if !upstream_ok || self.cancel.is_cancelled() {
                instance_mut(&mut run, task_id)?.mark_upstream_failed(Utc::now())?;
                tracing::warn!(task_id = %task_id, "upstream failed, task skipped");
                continue;
            }

            let task = dag
                .task(task_id)
                .ok_or_else(|| DagError::UnknownTask(task_id.clone()))?;
            let run_id = run.run_id;
            self.attempt_until_done(
                task.as_ref(),
                run_id,
                instance_mut(&mut run, task_id)?,
                args.retry_delay,
            )
            .await?;
        }

        run.finish(Utc::now());
        tracing::info!(
            dag_id = %dag.dag_id,
            run_id = %run.run_id,
            state = %run.state(),
            "dag run finished"
        );
        Ok(run)
    }

    /// Runs a single task once, ignoring upstream state and retries.
    pub async fn run_task(&self, dag: &Dag, task_id: &str) -> Result<DagRun, DagError> {
        let task = dag
            .task(task_id)
            .ok_or_else(|| DagError::UnknownTask(task_id.to_string()))?;
        let mut run = DagRun::new(&dag.dag_id, [task_id], 0, Utc::now());
        let run_id = run.run_id;

        self.attempt_until_done(
            task.as_ref(),
            run_id,
            instance_mut(&mut run, task_id)?,
            Duration::ZERO,
        )
        .await?;

        run.finish(Utc::now());
        Ok(run)
    }

    async fn attempt_until_done(
        &self,
        task: &dyn Task,
        run_id: RunId,
        ti: &mut TaskInstance,
        retry_delay: Duration,
    ) -> Result<(), DagError> {
        loop {
            ti.start_attempt(Utc::now())?;
            tracing::info!(
                task_id = %ti.task_id,
                try_number = ti.try_number,
                max_tries = ti.max_tries,
                "starting attempt"
            );

            let ctx = TaskContext {
                run_id,
                try_number: ti.try_number,
                reporter: Arc::clone(&self.reporter),
                result_store: Arc::clone(&self.result_store),
            };
            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(TaskError::Cancelled),
                result = task.execute(&ctx) => result,
            };

            let error = match outcome {
                Ok(()) => {
                    ti.succeed(Utc::now())?;
                    tracing::info!(task_id = %ti.task_id, "task succeeded");
                    return Ok(());
                }
                Err(e) => e,
            };

            let next = ti.fail_attempt(Utc::now(), error.to_string(), error.is_retryable())?;
            if next == TaskState::Failed {
                tracing::error!(task_id = %ti.task_id, error = %error, "task failed");
                return Ok(());
            }

            tracing::warn!(
                task_id = %ti.task_id,
                error = %error,
                retry_in_secs = retry_delay.as_secs(),
                "attempt failed, will retry"
            );
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    ti.abandon_retry(Utc::now(), TaskError::Cancelled.to_string())?;
                    tracing::error!(task_id = %ti.task_id, "cancelled while waiting for retry");
                    return Ok(());
                }
                () = tokio::time::sleep(retry_delay) => {}
            }
        }
    }
}

fn instance_mut<'a>(run: &'a mut DagRun, task_id: &str) -> Result<&'a mut TaskInstance, DagError> {
    run.task_mut(task_id)
        .ok_or_else(|| DagError::UnknownTask(task_id.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::dag::{DagBuilder, DefaultArgs};
    use crate::domain::RunState;
    use crate::ports::DbError;
    use crate::test_support::{MemoryReporter, MemoryResultStore};

    type Events = Arc<Mutex<Vec<String>>>;

    /// Fails its first `failures` attempts, then succeeds.
    struct Scripted {
        id: &'static str,
        failures: u32,
        calls: AtomicU32,
        events: Events,
    }

    impl Scripted {
        fn new(id: &'static str, failures: u32, events: &Events) -> Self {
            Self {
                id,
                failures,
                calls: AtomicU32::new(0),
                events: Arc::clone(events),
            }
        }
    }

    #[async_trait]
    impl Task for Scripted {
        fn task_id(&self) -> &str {
            self.id
        }

        async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError> {
            self.events
                .lock()
                .unwrap()
                .push(format!("start {} #{}", self.id, ctx.try_number));
            tokio::task::yield_now().await;
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().push(format!("end {}", self.id));
            if call < self.failures {
                return Err(TaskError::Db(DbError::QueryFailed("flaky".into())));
            }
            Ok(())
        }
    }

    struct Hangs {
        started: Arc<Notify>,
    }

    #[async_trait]
    impl Task for Hangs {
        fn task_id(&self) -> &str {
            "hangs"
        }

        async fn execute(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
            self.started.notify_one();
            std::future::pending().await
        }
    }

    /// Fails its only attempt and cancels the run on the way out.
    struct FailsThenCancels {
        cancel: CancellationToken,
    }

    #[async_trait]
    impl Task for FailsThenCancels {
        fn task_id(&self) -> &str {
            "flaky"
        }

        async fn execute(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
            self.cancel.cancel();
            Err(TaskError::Db(DbError::QueryFailed("flaky".into())))
        }
    }

    fn runner() -> DagRunner {
        DagRunner::new(
            Arc::new(MemoryReporter::default()),
            Arc::new(MemoryResultStore::default()),
        )
    }

    fn args(retries: u32) -> DefaultArgs {
        DefaultArgs {
            retries,
            retry_delay: Duration::from_secs(60),
            ..DefaultArgs::default()
        }
    }

    fn chain(failures: [u32; 3], events: &Events) -> Dag {
        DagBuilder::new("chain")
            .default_args(args(1))
            .task(Scripted::new("a", failures[0], events))
            .task(Scripted::new("b", failures[1], events))
            .task(Scripted::new("c", failures[2], events))
            .chain(&["a", "b", "c"])
            .build()
            .unwrap()
    }

    fn states(run: &DagRun) -> Vec<TaskState> {
        run.tasks.iter().map(|t| t.state).collect()
    }

    #[tokio::test]
    async fn tasks_run_strictly_in_chain_order() {
        let events = Events::default();
        let dag = chain([0, 0, 0], &events);

        let run = runner().run(&dag).await.unwrap();

        assert_eq!(run.state(), RunState::Success);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["start a #1", "end a", "start b #1", "end b", "start c #1", "end c"]
        );
        assert!(run.finished_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn single_failure_is_retried_after_delay() {
        let events = Events::default();
        let dag = chain([0, 1, 0], &events);
        let started = tokio::time::Instant::now();

        let run = runner().run(&dag).await.unwrap();

        assert_eq!(run.state(), RunState::Success);
        let b = run.task("b").unwrap();
        assert_eq!(b.state, TaskState::Success);
        assert_eq!(b.try_number, 2);
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert!(events.lock().unwrap().contains(&"start b #2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fail_task_and_skip_downstream() {
        let events = Events::default();
        let dag = chain([0, 2, 0], &events);

        let run = runner().run(&dag).await.unwrap();

        assert_eq!(run.state(), RunState::Failed);
        assert_eq!(
            states(&run),
            vec![
                TaskState::Success,
                TaskState::Failed,
                TaskState::UpstreamFailed
            ]
        );
        assert_eq!(run.task("b").unwrap().try_number, 2);
        assert_eq!(run.task("b").unwrap().error.as_deref(), Some("Query failed: flaky"));
        assert!(!events.lock().unwrap().iter().any(|e| e.contains(" c")));
    }

    #[tokio::test]
    async fn zero_retries_fail_on_first_error() {
        let events = Events::default();
        let dag = DagBuilder::new("d")
            .default_args(args(0))
            .task(Scripted::new("a", 1, &events))
            .build()
            .unwrap();

        let run = runner().run(&dag).await.unwrap();

        assert_eq!(run.task("a").unwrap().state, TaskState::Failed);
        assert_eq!(run.task("a").unwrap().try_number, 1);
    }

    #[tokio::test]
    async fn cancellation_fails_in_flight_task_without_retry() {
        let events = Events::default();
        let started = Arc::new(Notify::new());
        let dag = DagBuilder::new("d")
            .default_args(args(1))
            .task(Hangs {
                started: Arc::clone(&started),
            })
            .task(Scripted::new("after", 0, &events))
            .chain(&["hangs", "after"])
            .build()
            .unwrap();
        let cancel = CancellationToken::new();
        let runner = runner().with_cancellation(cancel.clone());

        let handle = tokio::spawn(async move { runner.run(&dag).await });
        started.notified().await;
        cancel.cancel();
        let run = handle.await.unwrap().unwrap();

        let hangs = run.task("hangs").unwrap();
        assert_eq!(hangs.state, TaskState::Failed);
        assert_eq!(hangs.try_number, 1);
        assert_eq!(hangs.error.as_deref(), Some("Task was cancelled"));
        assert_eq!(run.task("after").unwrap().state, TaskState::UpstreamFailed);
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_retry_wait_fails_task() {
        let events = Events::default();
        let cancel = CancellationToken::new();
        let dag = DagBuilder::new("d")
            .default_args(args(1))
            .task(FailsThenCancels {
                cancel: cancel.clone(),
            })
            .task(Scripted::new("after", 0, &events))
            .chain(&["flaky", "after"])
            .build()
            .unwrap();
        let started = tokio::time::Instant::now();

        let run = runner().with_cancellation(cancel).run(&dag).await.unwrap();

        let flaky = run.task("flaky").unwrap();
        assert_eq!(flaky.state, TaskState::Failed);
        assert_eq!(flaky.try_number, 1);
        assert_eq!(flaky.error.as_deref(), Some("Task was cancelled"));
        assert_eq!(run.task("after").unwrap().state, TaskState::UpstreamFailed);
        assert!(started.elapsed() < Duration::from_secs(60));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_task_ignores_upstream_and_retries() {
        let events = Events::default();
        let dag = chain([0, 5, 0], &events);

        let run = runner().run_task(&dag, "b").await.unwrap();

        assert_eq!(run.tasks.len(), 1);
        assert_eq!(run.task("b").unwrap().state, TaskState::Failed);
        assert_eq!(run.task("b").unwrap().try_number, 1);
        assert_eq!(*events.lock().unwrap(), vec!["start b #1", "end b"]);
    }

    #[tokio::test]
    async fn run_task_rejects_unknown_id() {
        let dag = chain([0, 0, 0], &Events::default());

        let err = runner().run_task(&dag, "nope").await.unwrap_err();

        assert_eq!(err, DagError::UnknownTask("nope".to_string()));
    }
}
