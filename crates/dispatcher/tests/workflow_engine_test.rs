#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use orchestrator_core::models::{Job, NodeResult, NodeState, RunOutcome};
    use orchestrator_core::StrategyRegistry;
    use orchestrator_dispatcher::{TargetResolver, WorkflowEngine};
    use orchestrator_infrastructure::{
        InMemoryInventory, InMemoryJobRepository, InMemoryPoolRepository, MetricsCollector,
    };
    use orchestrator_testing_utils::{
        devices, RecordingDelay, RecordingEventSink, ScriptedStrategy, ServiceBuilder,
        WorkflowBuilder,
    };
    use orchestrator_worker::JobRunner;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    struct Harness {
        engine: WorkflowEngine,
        events: Arc<RecordingEventSink>,
        delay: Arc<RecordingDelay>,
    }

    async fn harness(strategies: &[&ScriptedStrategy], jobs: Vec<Job>) -> Harness {
        let registry = Arc::new(StrategyRegistry::new());
        for strategy in strategies {
            let strategy = (*strategy).clone();
            registry
                .register(strategy_name(&strategy), Arc::new(strategy))
                .await;
        }

        let inventory = Arc::new(InMemoryInventory::with_devices(devices(3)));
        let pools = Arc::new(InMemoryPoolRepository::new());
        let jobs = Arc::new(InMemoryJobRepository::with_jobs(jobs));
        let events = Arc::new(RecordingEventSink::new());
        let delay = Arc::new(RecordingDelay::new());

        let runner = Arc::new(
            JobRunner::new(
                registry,
                inventory.clone(),
                events.clone(),
                Arc::new(MetricsCollector::new().unwrap()),
            )
            .with_retry_delay(delay.clone()),
        );
        let resolver = Arc::new(TargetResolver::new(inventory, pools));

        Harness {
            engine: WorkflowEngine::new(jobs, resolver, runner),
            events,
            delay,
        }
    }

    fn strategy_name(strategy: &ScriptedStrategy) -> String {
        use orchestrator_core::traits::JobStrategy;
        strategy.name().to_string()
    }

    fn step(id: i64, name: &str, service_type: &str) -> Job {
        ServiceBuilder::new(id, name, service_type)
            .with_devices(&["r1"])
            .build()
    }

    async fn run(h: &Harness, workflow: &Job) -> orchestrator_core::models::WorkflowRun {
        h.engine
            .run(Uuid::new_v4(), workflow, None, &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_success_edge_taken_failure_branch_skipped() {
        let a = ScriptedStrategy::passing("svc_a");
        let b = ScriptedStrategy::passing("svc_b");
        let c = ScriptedStrategy::passing("svc_c");
        let workflow = WorkflowBuilder::new(100, "deploy")
            .with_jobs(vec![1, 2, 3])
            .success_edge(1, 2)
            .failure_edge(1, 3)
            .build();
        let h = harness(
            &[&a, &b, &c],
            vec![
                step(1, "A", "svc_a"),
                step(2, "B", "svc_b"),
                step(3, "C", "svc_c"),
                workflow.clone(),
            ],
        )
        .await;

        let run = run(&h, &workflow).await;

        assert_eq!(run.outcome, RunOutcome::Success);
        assert_eq!(run.visit_order, vec![1, 2]);
        assert_eq!(run.state_of(1), Some(NodeState::Success));
        assert_eq!(run.state_of(2), Some(NodeState::Success));
        assert_eq!(run.state_of(3), Some(NodeState::Skipped));
        assert_eq!(c.total_attempts(), 0);
        assert_eq!(h.events.entered_nodes(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failure_edge_handles_failure() {
        let a = ScriptedStrategy::failing("svc_a");
        let b = ScriptedStrategy::passing("svc_b");
        let c = ScriptedStrategy::passing("svc_c");
        let workflow = WorkflowBuilder::new(100, "deploy")
            .with_jobs(vec![1, 2, 3])
            .success_edge(1, 2)
            .failure_edge(1, 3)
            .build();
        let h = harness(
            &[&a, &b, &c],
            vec![
                step(1, "A", "svc_a"),
                step(2, "B", "svc_b"),
                step(3, "C", "svc_c"),
                workflow.clone(),
            ],
        )
        .await;

        let run = run(&h, &workflow).await;

        assert_eq!(run.visit_order, vec![1, 3]);
        assert_eq!(run.state_of(1), Some(NodeState::Failure));
        assert_eq!(run.state_of(2), Some(NodeState::Skipped));
        assert_eq!(run.state_of(3), Some(NodeState::Success));
        // 失败节点的失败分支已执行，视为已处理
        assert_eq!(run.outcome, RunOutcome::Success);
        assert_eq!(b.total_attempts(), 0);
    }

    #[tokio::test]
    async fn test_unhandled_failure_fails_workflow() {
        let a = ScriptedStrategy::failing("svc_a");
        let b = ScriptedStrategy::passing("svc_b");
        let workflow = WorkflowBuilder::new(100, "deploy")
            .with_jobs(vec![1, 2])
            .success_edge(1, 2)
            .build();
        let h = harness(
            &[&a, &b],
            vec![step(1, "A", "svc_a"), step(2, "B", "svc_b"), workflow.clone()],
        )
        .await;

        let run = run(&h, &workflow).await;

        assert_eq!(run.outcome, RunOutcome::Failure);
        assert!(run.failure_reason.is_none());
        assert_eq!(run.state_of(2), Some(NodeState::Skipped));
    }

    #[tokio::test]
    async fn test_diamond_reentry_is_configuration_error() {
        let strategies: Vec<ScriptedStrategy> = ["svc_a", "svc_b", "svc_c", "svc_d"]
            .iter()
            .map(|name| ScriptedStrategy::passing(name))
            .collect();
        let workflow = WorkflowBuilder::new(100, "diamond")
            .with_jobs(vec![1, 2, 3, 4])
            .success_edge(1, 2)
            .success_edge(1, 3)
            .success_edge(2, 4)
            .success_edge(3, 4)
            .build();
        let h = harness(
            &strategies.iter().collect::<Vec<_>>(),
            vec![
                step(1, "A", "svc_a"),
                step(2, "B", "svc_b"),
                step(3, "C", "svc_c"),
                step(4, "D", "svc_d"),
                workflow.clone(),
            ],
        )
        .await;

        let run = run(&h, &workflow).await;

        assert_eq!(run.outcome, RunOutcome::Failure);
        assert!(run.failure_reason.as_deref().unwrap().contains("重复进入"));
        // D 没有被执行，更没有被执行两次
        assert_eq!(strategies[3].total_attempts(), 0);
        assert_eq!(run.state_of(4), Some(NodeState::Skipped));
        assert_eq!(run.visit_order, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_start_job_overrides_roots() {
        let a = ScriptedStrategy::passing("svc_a");
        let b = ScriptedStrategy::passing("svc_b");
        let workflow = WorkflowBuilder::new(100, "partial")
            .with_jobs(vec![1, 2])
            .success_edge(1, 2)
            .with_start_job(2)
            .build();
        let h = harness(
            &[&a, &b],
            vec![step(1, "A", "svc_a"), step(2, "B", "svc_b"), workflow.clone()],
        )
        .await;

        let run = run(&h, &workflow).await;

        assert_eq!(run.visit_order, vec![2]);
        assert_eq!(run.state_of(1), Some(NodeState::Skipped));
        assert!(run.is_success());
    }

    #[tokio::test]
    async fn test_edge_to_non_member_rejected_before_execution() {
        let a = ScriptedStrategy::passing("svc_a");
        let workflow = WorkflowBuilder::new(100, "broken")
            .with_jobs(vec![1])
            .success_edge(1, 42)
            .build();
        let h = harness(&[&a], vec![step(1, "A", "svc_a"), workflow.clone()]).await;

        let run = run(&h, &workflow).await;

        assert_eq!(run.outcome, RunOutcome::Failure);
        assert!(run.failure_reason.as_deref().unwrap().contains("42"));
        assert!(run.visit_order.is_empty());
        assert_eq!(a.total_attempts(), 0);
        assert_eq!(run.state_of(1), Some(NodeState::Skipped));
    }

    #[tokio::test]
    async fn test_cycle_without_start_node() {
        let a = ScriptedStrategy::passing("svc_a");
        let b = ScriptedStrategy::passing("svc_b");
        let workflow = WorkflowBuilder::new(100, "loop")
            .with_jobs(vec![1, 2])
            .success_edge(1, 2)
            .success_edge(2, 1)
            .build();
        let h = harness(
            &[&a, &b],
            vec![step(1, "A", "svc_a"), step(2, "B", "svc_b"), workflow.clone()],
        )
        .await;

        let run = run(&h, &workflow).await;

        assert_eq!(run.outcome, RunOutcome::Failure);
        assert!(run.failure_reason.as_deref().unwrap().contains("起始节点"));
    }

    #[tokio::test]
    async fn test_cycle_reached_from_start_job() {
        let a = ScriptedStrategy::passing("svc_a");
        let b = ScriptedStrategy::passing("svc_b");
        let workflow = WorkflowBuilder::new(100, "loop")
            .with_jobs(vec![1, 2])
            .success_edge(1, 2)
            .success_edge(2, 1)
            .with_start_job(1)
            .build();
        let h = harness(
            &[&a, &b],
            vec![step(1, "A", "svc_a"), step(2, "B", "svc_b"), workflow.clone()],
        )
        .await;

        let run = run(&h, &workflow).await;

        assert_eq!(run.outcome, RunOutcome::Failure);
        assert_eq!(a.total_attempts(), 1);
        assert_eq!(b.total_attempts(), 1);
    }

    #[tokio::test]
    async fn test_nested_workflow_runs_as_node() {
        let a = ScriptedStrategy::passing("svc_a");
        let b = ScriptedStrategy::passing("svc_b");
        let inner = WorkflowBuilder::new(20, "inner").with_jobs(vec![2]).build();
        let outer = WorkflowBuilder::new(10, "outer")
            .with_jobs(vec![1, 20])
            .success_edge(1, 20)
            .build();
        let h = harness(
            &[&a, &b],
            vec![
                step(1, "A", "svc_a"),
                step(2, "B", "svc_b"),
                inner,
                outer.clone(),
            ],
        )
        .await;

        let run = run(&h, &outer).await;

        assert!(run.is_success());
        assert_eq!(b.total_attempts(), 1);
        match run.node_results.get(&20) {
            Some(NodeResult::Workflow(nested)) => {
                assert!(nested.is_success());
                assert_eq!(nested.state_of(2), Some(NodeState::Success));
            }
            other => panic!("unexpected node result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mutual_nesting_is_rejected() {
        let a = ScriptedStrategy::passing("svc_a");
        let first = WorkflowBuilder::new(10, "first").with_jobs(vec![20]).build();
        let second = WorkflowBuilder::new(20, "second")
            .with_jobs(vec![1, 10])
            .success_edge(1, 10)
            .build();
        let h = harness(
            &[&a],
            vec![step(1, "A", "svc_a"), first.clone(), second],
        )
        .await;

        let run = run(&h, &first).await;

        assert_eq!(run.outcome, RunOutcome::Failure);
        assert!(run.failure_reason.as_deref().unwrap().contains("自身"));
        assert_eq!(a.total_attempts(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_service_aborts_run() {
        let a = ScriptedStrategy::passing("svc_a");
        let b = ScriptedStrategy::passing("svc_b");
        let workflow = WorkflowBuilder::new(100, "deploy")
            .with_jobs(vec![1, 2])
            .failure_edge(1, 2)
            .build();
        let h = harness(
            &[&b],
            vec![step(1, "A", "svc_a"), step(2, "B", "svc_b"), workflow.clone()],
        )
        .await;

        let run = run(&h, &workflow).await;

        assert_eq!(run.outcome, RunOutcome::Failure);
        assert!(run.failure_reason.as_deref().unwrap().contains("svc_a"));
        assert_eq!(run.state_of(1), Some(NodeState::Failure));
        // 结构错误终止整个运行，失败分支不会被执行
        assert_eq!(run.state_of(2), Some(NodeState::Skipped));
        assert_eq!(a.total_attempts() + b.total_attempts(), 0);
    }

    #[tokio::test]
    async fn test_target_resolution_failure_fails_only_node() {
        let a = ScriptedStrategy::passing("svc_a");
        let b = ScriptedStrategy::passing("svc_b");
        let broken = ServiceBuilder::new(1, "A", "svc_a").with_pools(vec![99]).build();
        let workflow = WorkflowBuilder::new(100, "deploy")
            .with_jobs(vec![1, 2])
            .failure_edge(1, 2)
            .build();
        let h = harness(
            &[&a, &b],
            vec![broken, step(2, "B", "svc_b"), workflow.clone()],
        )
        .await;

        let run = run(&h, &workflow).await;

        assert!(matches!(
            run.node_results.get(&1),
            Some(NodeResult::Aborted { .. })
        ));
        assert_eq!(run.state_of(1), Some(NodeState::Failure));
        assert_eq!(run.state_of(2), Some(NodeState::Success));
        assert!(run.is_success());
        assert!(run.failure_reason.is_none());
    }

    #[tokio::test]
    async fn test_waiting_time_between_nodes() {
        let a = ScriptedStrategy::passing("svc_a");
        let b = ScriptedStrategy::passing("svc_b");
        let first = ServiceBuilder::new(1, "A", "svc_a")
            .with_devices(&["r1"])
            .with_waiting_time(5)
            .build();
        let workflow = WorkflowBuilder::new(100, "deploy")
            .with_jobs(vec![1, 2])
            .success_edge(1, 2)
            .build();
        let h = harness(
            &[&a, &b],
            vec![first, step(2, "B", "svc_b"), workflow.clone()],
        )
        .await;

        let run = run(&h, &workflow).await;

        assert!(run.is_success());
        assert_eq!(h.delay.waits(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn test_successor_receives_payload() {
        let a = ScriptedStrategy::passing("svc_a");
        let b = ScriptedStrategy::passing("svc_b");
        let workflow = WorkflowBuilder::new(100, "deploy")
            .with_jobs(vec![1, 2])
            .success_edge(1, 2)
            .build();
        let h = harness(
            &[&a, &b],
            vec![step(1, "backup", "svc_a"), step(2, "B", "svc_b"), workflow.clone()],
        )
        .await;

        run(&h, &workflow).await;

        let payloads = b.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["backup"]["success"], true);
        assert_eq!(payloads[0]["backup"]["devices"]["r1"]["output_or_error"], "r1 ok #1");
        assert_eq!(a.payloads()[0], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_workflow_targets_override_members() {
        let a = ScriptedStrategy::passing("svc_a");
        let workflow = WorkflowBuilder::new(100, "deploy")
            .with_jobs(vec![1])
            .with_workflow_targets()
            .build();
        let h = harness(&[&a], vec![step(1, "A", "svc_a"), workflow.clone()]).await;

        let targets = devices(3).into_iter().skip(1).collect::<Vec<_>>();
        let run = h
            .engine
            .run(Uuid::new_v4(), &workflow, Some(targets), &CancellationToken::new())
            .await;

        assert!(run.is_success());
        assert_eq!(a.attempts_for("r1"), 0);
        assert_eq!(a.attempts_for("r2"), 1);
        assert_eq!(a.attempts_for("r3"), 1);
    }

    #[tokio::test]
    async fn test_targets_ignored_without_flag() {
        let a = ScriptedStrategy::passing("svc_a");
        let workflow = WorkflowBuilder::new(100, "deploy").with_jobs(vec![1]).build();
        let h = harness(&[&a], vec![step(1, "A", "svc_a"), workflow.clone()]).await;

        let run = h
            .engine
            .run(Uuid::new_v4(), &workflow, Some(devices(3)), &CancellationToken::new())
            .await;

        assert!(run.is_success());
        assert_eq!(a.total_attempts(), 1);
        assert_eq!(a.attempts_for("r1"), 1);
    }

    #[tokio::test]
    async fn test_own_targets_not_resolved_without_flag() {
        let a = ScriptedStrategy::passing("svc_a");
        let workflow = WorkflowBuilder::new(100, "deploy")
            .with_jobs(vec![1])
            .with_devices(&["ghost"])
            .build();
        let h = harness(&[&a], vec![step(1, "A", "svc_a"), workflow.clone()]).await;

        let run = run(&h, &workflow).await;

        assert!(run.is_success());
        assert_eq!(a.attempts_for("r1"), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_own_targets_with_flag() {
        let a = ScriptedStrategy::passing("svc_a");
        let workflow = WorkflowBuilder::new(100, "deploy")
            .with_jobs(vec![1])
            .with_devices(&["ghost"])
            .with_workflow_targets()
            .build();
        let h = harness(&[&a], vec![step(1, "A", "svc_a"), workflow.clone()]).await;

        let run = run(&h, &workflow).await;

        assert!(!run.is_success());
        assert_eq!(a.total_attempts(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_enters_no_nodes() {
        let a = ScriptedStrategy::passing("svc_a");
        let workflow = WorkflowBuilder::new(100, "deploy").with_jobs(vec![1]).build();
        let h = harness(&[&a], vec![step(1, "A", "svc_a"), workflow.clone()]).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let run = h.engine.run(Uuid::new_v4(), &workflow, None, &cancel).await;

        assert_eq!(run.outcome, RunOutcome::Failure);
        assert_eq!(run.failure_reason.as_deref(), Some("运行已取消"));
        assert_eq!(run.state_of(1), Some(NodeState::Skipped));
        assert!(h.events.entered_nodes().is_empty());
        assert_eq!(a.total_attempts(), 0);
    }

    #[tokio::test]
    async fn test_transition_events_follow_traversal() {
        let a = ScriptedStrategy::passing("svc_a");
        let b = ScriptedStrategy::passing("svc_b");
        let workflow = WorkflowBuilder::new(100, "deploy")
            .with_jobs(vec![1, 2])
            .success_edge(1, 2)
            .build();
        let h = harness(
            &[&a, &b],
            vec![step(1, "A", "svc_a"), step(2, "B", "svc_b"), workflow.clone()],
        )
        .await;

        let run_id = Uuid::new_v4();
        h.engine
            .run(run_id, &workflow, None, &CancellationToken::new())
            .await;

        let transitions = h.events.transitions();
        assert_eq!(transitions.len(), 4);
        assert!(transitions.iter().all(|t| t.run_id == run_id));
        let states: Vec<(i64, NodeState)> = transitions.iter().map(|t| (t.job_id, t.state)).collect();
        assert_eq!(
            states,
            vec![
                (1, NodeState::Running),
                (1, NodeState::Success),
                (2, NodeState::Running),
                (2, NodeState::Success),
            ]
        );
        assert!(h.events.device_events().iter().all(|e| e.run_id == run_id));
    }
}
