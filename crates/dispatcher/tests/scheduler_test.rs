#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use orchestrator_core::models::Task;
    use orchestrator_core::traits::TaskRepository;
    use orchestrator_core::{OrchestratorError, Result};
    use orchestrator_dispatcher::{RunLauncher, Scheduler};
    use orchestrator_infrastructure::{InMemoryTaskRepository, MetricsCollector};
    use orchestrator_testing_utils::{TaskBuilder, TestEnv};
    use tokio::sync::broadcast;
    use uuid::Uuid;

    /// 记录启动请求的启动器，可以配置为始终失败
    #[derive(Default)]
    struct RecordingLauncher {
        launched: Mutex<Vec<i64>>,
        fail: bool,
    }

    impl RecordingLauncher {
        fn failing() -> Self {
            Self {
                launched: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn launched(&self) -> Vec<i64> {
            self.launched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RunLauncher for RecordingLauncher {
        async fn launch(&self, job_id: i64) -> Result<Uuid> {
            self.launched.lock().unwrap().push(job_id);
            if self.fail {
                return Err(OrchestratorError::JobNotFound { id: job_id });
            }
            Ok(Uuid::new_v4())
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, h, m, s).unwrap()
    }

    fn scheduler_with(
        tasks: Vec<Task>,
        launcher: Arc<RecordingLauncher>,
    ) -> (Scheduler, Arc<InMemoryTaskRepository>) {
        let repo = Arc::new(InMemoryTaskRepository::with_tasks(tasks));
        let scheduler = Scheduler::new(
            repo.clone(),
            launcher,
            Arc::new(MetricsCollector::new().unwrap()),
            Duration::from_millis(10),
        );
        (scheduler, repo)
    }

    async fn task(repo: &InMemoryTaskRepository, id: i64) -> Task {
        repo.get_task(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_due_task_is_dispatched_and_advanced() {
        let launcher = Arc::new(RecordingLauncher::default());
        let (scheduler, repo) = scheduler_with(
            vec![TaskBuilder::new(1, 7)
                .with_start_date(at(10, 0, 0))
                .with_frequency(60)
                .build()],
            launcher.clone(),
        );

        let dispatched = scheduler.tick(at(10, 0, 0)).await.unwrap();

        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].task_id, 1);
        assert_eq!(dispatched[0].job_id, 7);
        assert_eq!(launcher.launched(), vec![7]);
        assert_eq!(task(&repo, 1).await.next_run_time, Some(at(10, 1, 0)));
    }

    #[tokio::test]
    async fn test_periodic_task_fires_once_per_period() {
        let launcher = Arc::new(RecordingLauncher::default());
        let (scheduler, _) = scheduler_with(
            vec![TaskBuilder::new(1, 7)
                .with_start_date(at(10, 0, 0))
                .with_frequency(60)
                .build()],
            launcher.clone(),
        );

        for now in [at(10, 0, 0), at(10, 0, 30), at(10, 0, 59), at(10, 1, 0), at(10, 1, 1)] {
            scheduler.tick(now).await.unwrap();
        }

        assert_eq!(launcher.launched().len(), 2);
    }

    #[tokio::test]
    async fn test_future_task_waits_for_start_date() {
        let launcher = Arc::new(RecordingLauncher::default());
        let (scheduler, repo) = scheduler_with(
            vec![TaskBuilder::new(1, 7)
                .with_start_date(at(12, 0, 0))
                .build()],
            launcher.clone(),
        );

        assert!(scheduler.tick(at(11, 59, 59)).await.unwrap().is_empty());
        assert_eq!(task(&repo, 1).await.next_run_time, Some(at(12, 0, 0)));
        assert!(launcher.launched().is_empty());
    }

    #[tokio::test]
    async fn test_one_off_task_fires_once() {
        let launcher = Arc::new(RecordingLauncher::default());
        let (scheduler, repo) = scheduler_with(
            vec![TaskBuilder::new(1, 7).with_start_date(at(10, 0, 0)).build()],
            launcher.clone(),
        );

        assert_eq!(scheduler.tick(at(10, 0, 5)).await.unwrap().len(), 1);
        assert!(scheduler.tick(at(10, 5, 0)).await.unwrap().is_empty());

        let stored = task(&repo, 1).await;
        assert!(!stored.is_active);
        assert_eq!(stored.next_run_time, None);
        assert_eq!(launcher.launched(), vec![7]);
    }

    #[tokio::test]
    async fn test_missed_periods_coalesce() {
        let launcher = Arc::new(RecordingLauncher::default());
        let (scheduler, repo) = scheduler_with(
            vec![TaskBuilder::new(1, 7)
                .with_start_date(at(10, 0, 0))
                .with_frequency(60)
                .build()],
            launcher.clone(),
        );

        scheduler.tick(at(10, 5, 30)).await.unwrap();

        assert_eq!(launcher.launched().len(), 1);
        assert_eq!(task(&repo, 1).await.next_run_time, Some(at(10, 6, 0)));
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let launcher = Arc::new(RecordingLauncher::default());
        let (scheduler, repo) = scheduler_with(
            vec![TaskBuilder::new(1, 7)
                .with_start_date(at(10, 0, 0))
                .with_frequency(60)
                .build()],
            launcher.clone(),
        );

        scheduler.tick(at(10, 0, 0)).await.unwrap();
        scheduler.pause(1).await.unwrap();
        assert!(!task(&repo, 1).await.is_active);

        // 暂停期间不触发
        for now in [at(10, 1, 0), at(10, 2, 0)] {
            assert!(scheduler.tick(now).await.unwrap().is_empty());
        }

        let next = scheduler.resume(1, at(10, 2, 30)).await.unwrap();
        assert_eq!(next, at(10, 3, 0));
        let stored = task(&repo, 1).await;
        assert!(stored.is_active);
        assert_eq!(stored.next_run_time, Some(at(10, 3, 0)));

        assert!(scheduler.tick(at(10, 2, 45)).await.unwrap().is_empty());
        assert_eq!(scheduler.tick(at(10, 3, 0)).await.unwrap().len(), 1);
        assert_eq!(launcher.launched().len(), 2);
    }

    #[tokio::test]
    async fn test_pause_unknown_task() {
        let launcher = Arc::new(RecordingLauncher::default());
        let (scheduler, _) = scheduler_with(vec![], launcher);

        assert!(matches!(
            scheduler.pause(9).await,
            Err(OrchestratorError::TaskNotFound { id: 9 })
        ));
        assert!(matches!(
            scheduler.resume(9, at(10, 0, 0)).await,
            Err(OrchestratorError::TaskNotFound { id: 9 })
        ));
    }

    #[tokio::test]
    async fn test_dispatch_failure_still_advances() {
        let launcher = Arc::new(RecordingLauncher::failing());
        let (scheduler, repo) = scheduler_with(
            vec![
                TaskBuilder::new(1, 7)
                    .with_start_date(at(10, 0, 0))
                    .with_frequency(60)
                    .build(),
                TaskBuilder::new(2, 8).with_start_date(at(10, 0, 0)).build(),
            ],
            launcher.clone(),
        );

        let dispatched = scheduler.tick(at(10, 0, 0)).await.unwrap();

        assert!(dispatched.is_empty());
        assert_eq!(launcher.launched(), vec![7, 8]);
        let periodic = task(&repo, 1).await;
        assert!(periodic.is_active);
        assert_eq!(periodic.next_run_time, Some(at(10, 1, 0)));
        assert!(!task(&repo, 2).await.is_active);
    }

    #[tokio::test]
    async fn test_invalid_trigger_skipped_without_blocking_others() {
        let launcher = Arc::new(RecordingLauncher::default());
        let (scheduler, repo) = scheduler_with(
            vec![
                TaskBuilder::new(1, 7)
                    .with_start_date(at(10, 0, 0))
                    .with_frequency(0)
                    .build(),
                TaskBuilder::new(2, 8)
                    .with_start_date(at(10, 0, 0))
                    .with_end_date(at(9, 0, 0))
                    .build(),
                TaskBuilder::new(3, 9).with_start_date(at(10, 0, 0)).build(),
            ],
            launcher.clone(),
        );

        let dispatched = scheduler.tick(at(10, 0, 0)).await.unwrap();

        assert_eq!(dispatched.len(), 1);
        assert_eq!(launcher.launched(), vec![9]);
        assert!(task(&repo, 1).await.is_active);
        assert!(task(&repo, 2).await.is_active);
    }

    #[tokio::test]
    async fn test_out_of_range_frequency_logged_and_skipped() {
        let launcher = Arc::new(RecordingLauncher::default());
        let (scheduler, repo) = scheduler_with(
            vec![
                TaskBuilder::new(1, 7)
                    .with_start_date(at(10, 0, 0))
                    .with_frequency(1_000_000_000_000_000)
                    .build(),
                TaskBuilder::new(2, 8)
                    .with_start_date(at(10, 0, 0))
                    .with_frequency(60)
                    .build(),
            ],
            launcher.clone(),
        );

        let dispatched = tokio::spawn(async move { scheduler.tick(at(10, 0, 0)).await })
            .await
            .expect("调度周期不应该panic")
            .unwrap();

        assert_eq!(dispatched.len(), 1);
        assert_eq!(launcher.launched(), vec![8]);
        let skipped = task(&repo, 1).await;
        assert!(skipped.is_active);
        assert_eq!(skipped.next_run_time, None);
        assert_eq!(task(&repo, 2).await.next_run_time, Some(at(10, 1, 0)));
    }

    #[tokio::test]
    async fn test_task_past_end_date_not_fired() {
        let launcher = Arc::new(RecordingLauncher::default());
        let (scheduler, repo) = scheduler_with(
            vec![TaskBuilder::new(1, 7)
                .with_start_date(at(10, 0, 0))
                .with_end_date(at(10, 30, 0))
                .with_frequency(600)
                .build()],
            launcher.clone(),
        );

        scheduler.tick(at(10, 20, 0)).await.unwrap();
        assert_eq!(task(&repo, 1).await.next_run_time, Some(at(10, 30, 0)));
        assert!(scheduler.tick(at(10, 31, 0)).await.unwrap().is_empty());

        assert_eq!(launcher.launched().len(), 1);
    }

    #[tokio::test]
    async fn test_inactive_task_skipped() {
        let launcher = Arc::new(RecordingLauncher::default());
        let (scheduler, _) = scheduler_with(
            vec![TaskBuilder::new(1, 7)
                .with_start_date(at(10, 0, 0))
                .inactive()
                .build()],
            launcher.clone(),
        );

        assert!(scheduler.tick(at(11, 0, 0)).await.unwrap().is_empty());
        assert!(launcher.launched().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_sets_first_run_time() {
        let launcher = Arc::new(RecordingLauncher::default());
        let (scheduler, repo) = scheduler_with(
            vec![
                TaskBuilder::new(1, 7).with_start_date(at(10, 0, 0)).build(),
                TaskBuilder::new(2, 8)
                    .with_start_date(at(10, 0, 0))
                    .with_next_run_time(at(11, 0, 0))
                    .build(),
                TaskBuilder::new(3, 9)
                    .with_start_date(at(10, 0, 0))
                    .inactive()
                    .build(),
            ],
            launcher,
        );

        assert_eq!(scheduler.initialize().await.unwrap(), 1);
        assert_eq!(task(&repo, 1).await.next_run_time, Some(at(10, 0, 0)));
        assert_eq!(task(&repo, 2).await.next_run_time, Some(at(11, 0, 0)));
        assert_eq!(task(&repo, 3).await.next_run_time, None);
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        let launcher = Arc::new(RecordingLauncher::default());
        let (scheduler, _) = scheduler_with(
            vec![TaskBuilder::new(1, 7)
                .with_start_date(TestEnv::timestamp_with_offset(-5))
                .build()],
            launcher.clone(),
        );
        let scheduler = Arc::new(scheduler);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(shutdown_rx).await })
        };

        let fired = TestEnv::wait_for(
            || {
                let launcher = launcher.clone();
                async move { !launcher.launched().is_empty() }
            },
            Duration::from_secs(2),
        )
        .await;
        assert!(fired);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("调度循环未在超时内退出")
            .unwrap();
        assert_eq!(launcher.launched(), vec![7]);
    }
}
