//! 工作流引擎
//!
//! 工作流是成员作业加带结果类型的边构成的有向图。引擎从起始节点出发，
//! 逐个执行节点，按节点结果选择可通行的边把后继加入待执行队列。
//! 每个节点在一次运行中最多进入一次，重复进入（环或菱形汇合）视为配置错误。
//!
//! 整体结果：不存在“未处理的失败节点”即为成功。失败节点只要有一条失败边
//! 引导到的节点被实际进入，就视为已处理。

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use orchestrator_core::models::{
    Device, EdgeSubtype, Job, JobKind, NodeResult, NodeState, NodeTransition, RunOutcome,
    WorkflowEdge, WorkflowRun, WorkflowSpec, WorkflowTransitionEvent,
};
use orchestrator_core::traits::{JobRepository, RunEventSink};
use orchestrator_core::{
    AggregationPolicy, OrchestratorError, Result, ResultAggregator,
};
use orchestrator_infrastructure::{MetricsCollector, StructuredLogger};
use orchestrator_worker::{JobRunner, RetryDelay};

use crate::target_resolver::TargetResolver;

const CANCELLED: &str = "运行已取消";

/// 按作业ID索引的工作流图
struct WorkflowGraph {
    nodes: HashMap<i64, Job>,
    successors: HashMap<i64, Vec<WorkflowEdge>>,
    start: Vec<i64>,
}

impl WorkflowGraph {
    fn outgoing(&self, job_id: i64) -> &[WorkflowEdge] {
        self.successors
            .get(&job_id)
            .map(|edges| edges.as_slice())
            .unwrap_or(&[])
    }
}

/// 单次遍历的可变状态
struct Traversal {
    run_id: Uuid,
    workflow_id: i64,
    workflow_name: String,
    states: BTreeMap<i64, NodeState>,
    visit_order: Vec<i64>,
    visited: HashSet<i64>,
    node_results: BTreeMap<i64, NodeResult>,
    cancelled: bool,
    started_at: DateTime<Utc>,
}

impl Traversal {
    fn new(run_id: Uuid, workflow: &Job) -> Self {
        Self {
            run_id,
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            states: BTreeMap::new(),
            visit_order: Vec::new(),
            visited: HashSet::new(),
            node_results: BTreeMap::new(),
            cancelled: false,
            started_at: Utc::now(),
        }
    }

    /// 已完成节点的结果，作为后续节点的负载
    fn payload(&self, graph: &WorkflowGraph) -> Value {
        let mut payload = serde_json::Map::new();
        for (job_id, result) in &self.node_results {
            let key = graph
                .nodes
                .get(job_id)
                .map(|job| job.name.clone())
                .unwrap_or_else(|| job_id.to_string());
            payload.insert(key, result.to_payload());
        }
        Value::Object(payload)
    }

    fn is_handled_failure(&self, graph: &WorkflowGraph, job_id: i64) -> bool {
        graph.outgoing(job_id).iter().any(|edge| {
            edge.subtype == EdgeSubtype::Failure
                && self.visit_order.contains(&edge.destination_job_id)
        })
    }

    fn finish(
        mut self,
        graph: Option<&WorkflowGraph>,
        members: &[i64],
        error: Option<&OrchestratorError>,
    ) -> WorkflowRun {
        for member in members {
            let state = self.states.entry(*member).or_insert(NodeState::Skipped);
            if matches!(state, NodeState::Pending) {
                *state = NodeState::Skipped;
            }
        }

        let failure_reason = match (error, self.cancelled) {
            (Some(e), _) => Some(e.to_string()),
            (None, true) => Some(CANCELLED.to_string()),
            (None, false) => None,
        };

        let outcome = match (failure_reason.is_some(), graph) {
            (false, Some(graph)) => {
                let aggregator = ResultAggregator::new(AggregationPolicy::AllSucceed);
                let (success, _) = aggregator.fold(self.visit_order.iter().map(|job_id| {
                    self.states.get(job_id) != Some(&NodeState::Failure)
                        || self.is_handled_failure(graph, *job_id)
                }));
                RunOutcome::from_success(success)
            }
            _ => RunOutcome::Failure,
        };

        WorkflowRun {
            run_id: self.run_id,
            workflow_id: self.workflow_id,
            workflow_name: self.workflow_name,
            outcome,
            states: self.states,
            visit_order: self.visit_order,
            node_results: self.node_results,
            failure_reason,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

pub struct WorkflowEngine {
    jobs: Arc<dyn JobRepository>,
    resolver: Arc<TargetResolver>,
    runner: Arc<JobRunner>,
    events: Arc<dyn RunEventSink>,
    metrics: Arc<MetricsCollector>,
    delay: Arc<dyn RetryDelay>,
}

impl WorkflowEngine {
    /// 事件出口、指标与延时沿用作业运行器的配置
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        resolver: Arc<TargetResolver>,
        runner: Arc<JobRunner>,
    ) -> Self {
        Self {
            events: runner.events(),
            metrics: runner.metrics(),
            delay: runner.delay(),
            jobs,
            resolver,
            runner,
        }
    }

    /// 执行一次工作流调用
    ///
    /// 结构错误不会以 `Err` 返回，而是体现为结果为失败、带 `failure_reason` 的运行记录。
    /// `target_override` 为空时使用工作流自身选择的设备和设备池（如果有）。
    pub async fn run(
        &self,
        run_id: Uuid,
        workflow: &Job,
        target_override: Option<Vec<Device>>,
        cancel: &CancellationToken,
    ) -> WorkflowRun {
        let mut ancestry = Vec::new();
        let span = info_span!("workflow", run_id = %run_id, workflow = %workflow.name);
        let (run, _) = self
            .run_nested(run_id, workflow, target_override, cancel, &mut ancestry)
            .instrument(span)
            .await;
        run
    }

    fn run_nested<'a>(
        &'a self,
        run_id: Uuid,
        workflow: &'a Job,
        inherited_targets: Option<Vec<Device>>,
        cancel: &'a CancellationToken,
        ancestry: &'a mut Vec<i64>,
    ) -> BoxFuture<'a, (WorkflowRun, Option<OrchestratorError>)> {
        async move {
            let mut traversal = Traversal::new(run_id, workflow);
            let members = workflow
                .workflow()
                .map(|spec| spec.jobs.clone())
                .unwrap_or_default();

            let prepared = self.prepare(workflow, ancestry).await;
            let (graph, spec) = match prepared {
                Ok(prepared) => prepared,
                Err(e) => {
                    let run = traversal.finish(None, &members, Some(&e));
                    self.report(&run);
                    return (run, Some(e));
                }
            };

            // 工作流自身的目标只在下发给成员时才需要解析
            let targets = match inherited_targets {
                Some(targets) => Some(targets),
                None if spec.use_workflow_targets => match self.own_targets(workflow).await {
                    Ok(targets) => targets,
                    Err(e) => {
                        let run = traversal.finish(Some(&graph), &members, Some(&e));
                        self.report(&run);
                        return (run, None);
                    }
                },
                None => None,
            };

            ancestry.push(workflow.id);
            let result = self
                .traverse(&mut traversal, &graph, &spec, targets, cancel, ancestry)
                .await;
            ancestry.pop();

            let error = result.err();
            let run = traversal.finish(Some(&graph), &members, error.as_ref());
            self.report(&run);
            (run, error)
        }
        .boxed()
    }

    /// 结构校验：成员存在、边引用成员、起始节点存在、未嵌套包含自身
    async fn prepare(&self, workflow: &Job, ancestry: &[i64]) -> Result<(WorkflowGraph, WorkflowSpec)> {
        let spec = workflow.workflow().cloned().ok_or_else(|| {
            OrchestratorError::Configuration(format!("作业 {} 不是工作流", workflow.name))
        })?;

        if ancestry.contains(&workflow.id) {
            return Err(OrchestratorError::Configuration(format!(
                "工作流 {} 嵌套包含了自身",
                workflow.name
            )));
        }
        workflow.validate()?;

        let mut nodes = HashMap::new();
        for job_id in &spec.jobs {
            let job = self.jobs.get_job(*job_id).await?.ok_or_else(|| {
                OrchestratorError::Configuration(format!(
                    "工作流 {} 的成员作业 {} 不存在",
                    workflow.name, job_id
                ))
            })?;
            nodes.insert(*job_id, job);
        }

        let mut successors: HashMap<i64, Vec<WorkflowEdge>> = HashMap::new();
        let mut in_degree: HashMap<i64, usize> = spec.jobs.iter().map(|id| (*id, 0)).collect();
        for edge in &spec.edges {
            for endpoint in [edge.source_job_id, edge.destination_job_id] {
                if !nodes.contains_key(&endpoint) {
                    return Err(OrchestratorError::Configuration(format!(
                        "工作流 {} 的边引用了非成员作业 {}",
                        workflow.name, endpoint
                    )));
                }
            }
            successors
                .entry(edge.source_job_id)
                .or_default()
                .push(edge.clone());
            *in_degree.entry(edge.destination_job_id).or_insert(0) += 1;
        }

        let start = match spec.start_job {
            Some(start_job) if nodes.contains_key(&start_job) => vec![start_job],
            Some(start_job) => {
                return Err(OrchestratorError::Configuration(format!(
                    "工作流 {} 的起始作业 {} 不是成员",
                    workflow.name, start_job
                )))
            }
            None => {
                let mut seen = HashSet::new();
                spec.jobs
                    .iter()
                    .filter(|id| in_degree.get(id).copied().unwrap_or(0) == 0 && seen.insert(**id))
                    .copied()
                    .collect()
            }
        };
        if start.is_empty() {
            return Err(OrchestratorError::Configuration(format!(
                "工作流 {} 没有起始节点",
                workflow.name
            )));
        }

        let graph = WorkflowGraph {
            nodes,
            successors,
            start,
        };
        Ok((graph, spec))
    }

    async fn own_targets(&self, job: &Job) -> Result<Option<Vec<Device>>> {
        if job.devices.is_empty() && job.pools.is_empty() {
            return Ok(None);
        }
        self.resolver.resolve_job_targets(job).await.map(Some)
    }

    /// 逐个执行待执行队列中的节点，结构错误立即返回
    async fn traverse(
        &self,
        traversal: &mut Traversal,
        graph: &WorkflowGraph,
        spec: &WorkflowSpec,
        targets: Option<Vec<Device>>,
        cancel: &CancellationToken,
        ancestry: &mut Vec<i64>,
    ) -> Result<()> {
        let mut frontier: VecDeque<i64> = VecDeque::new();
        for start in &graph.start {
            traversal.visited.insert(*start);
            traversal.states.insert(*start, NodeState::Pending);
            frontier.push_back(*start);
        }

        while let Some(job_id) = frontier.pop_front() {
            if cancel.is_cancelled() {
                traversal.cancelled = true;
                break;
            }

            let job = graph.nodes.get(&job_id).ok_or_else(|| {
                OrchestratorError::Internal(format!("工作流图中缺少节点 {job_id}"))
            })?;

            traversal.states.insert(job_id, NodeState::Running);
            traversal.visit_order.push(job_id);
            self.transition(traversal, job, NodeTransition::Entered, NodeState::Running);

            let payload = Arc::new(traversal.payload(graph));
            let node_targets = if spec.use_workflow_targets {
                targets.clone()
            } else {
                None
            };

            let result = match self
                .run_node(traversal.run_id, job, node_targets, payload, cancel, ancestry)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    traversal.states.insert(job_id, NodeState::Failure);
                    self.transition(traversal, job, NodeTransition::Exited, NodeState::Failure);
                    return Err(e);
                }
            };

            let success = result.success();
            let state = NodeState::from_success(success);
            traversal.states.insert(job_id, state);
            traversal.node_results.insert(job_id, result);
            self.transition(traversal, job, NodeTransition::Exited, state);

            if job.waiting_time > 0 {
                self.delay.wait(Duration::from_secs(job.waiting_time)).await;
            }

            for edge in graph.outgoing(job_id) {
                if !edge.subtype.matches(success) {
                    continue;
                }
                let destination = edge.destination_job_id;
                if !traversal.visited.insert(destination) {
                    return Err(OrchestratorError::Configuration(format!(
                        "工作流 {} 中作业 {} 被重复进入",
                        traversal.workflow_name, destination
                    )));
                }
                traversal.states.insert(destination, NodeState::Pending);
                frontier.push_back(destination);
            }
        }

        Ok(())
    }

    /// 执行单个节点
    ///
    /// 目标解析失败或单次作业执行失败只让该节点失败；结构错误向上返回。
    async fn run_node(
        &self,
        run_id: Uuid,
        job: &Job,
        targets: Option<Vec<Device>>,
        payload: Arc<Value>,
        cancel: &CancellationToken,
        ancestry: &mut Vec<i64>,
    ) -> Result<NodeResult> {
        match &job.kind {
            JobKind::Service(_) => {
                let targets = match targets {
                    Some(targets) => targets,
                    None => match self.resolver.resolve_job_targets(job).await {
                        Ok(targets) => targets,
                        Err(e) => {
                            warn!("作业 {} 目标解析失败: {}", job.name, e);
                            return Ok(NodeResult::Aborted {
                                reason: e.to_string(),
                            });
                        }
                    },
                };

                match self.runner.run(run_id, job, targets, payload, cancel).await {
                    Ok(run) => Ok(NodeResult::Job(run)),
                    Err(e) if e.is_structural() => Err(e),
                    Err(e) => Ok(NodeResult::Aborted {
                        reason: e.to_string(),
                    }),
                }
            }
            JobKind::Workflow(_) => {
                let (run, error) = self
                    .run_nested(run_id, job, targets, cancel, ancestry)
                    .await;
                match error {
                    Some(e) if e.is_structural() => Err(e),
                    _ => Ok(NodeResult::Workflow(Box::new(run))),
                }
            }
        }
    }

    fn transition(&self, traversal: &Traversal, job: &Job, transition: NodeTransition, state: NodeState) {
        self.events.workflow_transition(&WorkflowTransitionEvent {
            run_id: traversal.run_id,
            workflow_id: traversal.workflow_id,
            job_id: job.id,
            job_name: job.name.clone(),
            transition,
            state,
            timestamp: Utc::now(),
        });
    }

    fn report(&self, run: &WorkflowRun) {
        self.metrics.record_workflow_run(run.is_success());
        StructuredLogger::log_workflow_completed(
            run.run_id,
            run.workflow_id,
            &run.workflow_name,
            run.is_success(),
            run.failure_reason.as_deref(),
        );
    }
}
