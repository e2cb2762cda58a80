//! 测试数据构造器，字段都有可用的默认值

use chrono::{DateTime, Utc};

use orchestrator_core::models::{
    Device, Job, JobKind, Pool, PropertyFilter, ServiceSpec, Task, WorkflowEdge, WorkflowSpec,
};
use orchestrator_core::AggregationPolicy;

pub struct DeviceBuilder {
    device: Device,
}

impl DeviceBuilder {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            device: Device::new(id, name),
        }
    }

    pub fn with_property(mut self, property: &str, value: &str) -> Self {
        self.device
            .properties
            .insert(property.to_string(), value.to_string());
        self
    }

    pub fn with_vendor(self, vendor: &str) -> Self {
        self.with_property("vendor", vendor)
    }

    pub fn with_os(self, operating_system: &str) -> Self {
        self.with_property("operating_system", operating_system)
    }

    pub fn build(self) -> Device {
        self.device
    }
}

/// 生成 `r1..rN` 共N台设备
pub fn devices(count: usize) -> Vec<Device> {
    (1..=count)
        .map(|i| Device::new(i as i64, format!("r{i}")))
        .collect()
}

pub struct PoolBuilder {
    pool: Pool,
}

impl PoolBuilder {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            pool: Pool::new(id, name),
        }
    }

    pub fn with_regex(mut self, property: &str, pattern: &str) -> Self {
        self.pool.filters.push(PropertyFilter::regex(property, pattern));
        self
    }

    pub fn with_exact(mut self, property: &str, value: &str) -> Self {
        self.pool.filters.push(PropertyFilter::exact(property, value));
        self
    }

    /// 静态设备池
    pub fn with_members(mut self, members: &[&str]) -> Self {
        self.pool.never_update = true;
        self.pool.members = members.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn build(self) -> Pool {
        self.pool
    }
}

fn base_job(id: i64, name: &str, kind: JobKind) -> Job {
    Job {
        id,
        name: name.to_string(),
        description: String::new(),
        number_of_retries: 0,
        time_between_retries: 0,
        max_processes: 5,
        multiprocessing: false,
        devices: Vec::new(),
        pools: Vec::new(),
        aggregation: AggregationPolicy::AllSucceed,
        waiting_time: 0,
        kind,
    }
}

pub struct ServiceBuilder {
    job: Job,
}

impl ServiceBuilder {
    pub fn new(id: i64, name: &str, service_type: &str) -> Self {
        Self {
            job: base_job(
                id,
                name,
                JobKind::Service(ServiceSpec {
                    service_type: service_type.to_string(),
                    parameters: serde_json::json!({}),
                }),
            ),
        }
    }

    pub fn with_retries(mut self, number_of_retries: u32) -> Self {
        self.job.number_of_retries = number_of_retries;
        self
    }

    pub fn with_time_between_retries(mut self, seconds: u64) -> Self {
        self.job.time_between_retries = seconds;
        self
    }

    pub fn with_max_processes(mut self, max_processes: usize) -> Self {
        self.job.max_processes = max_processes;
        self
    }

    pub fn with_multiprocessing(mut self, multiprocessing: bool) -> Self {
        self.job.multiprocessing = multiprocessing;
        self
    }

    pub fn with_devices(mut self, devices: &[&str]) -> Self {
        self.job.devices = devices.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_pools(mut self, pools: Vec<i64>) -> Self {
        self.job.pools = pools;
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        if let JobKind::Service(spec) = &mut self.job.kind {
            spec.parameters = parameters;
        }
        self
    }

    pub fn with_aggregation(mut self, aggregation: AggregationPolicy) -> Self {
        self.job.aggregation = aggregation;
        self
    }

    pub fn with_waiting_time(mut self, seconds: u64) -> Self {
        self.job.waiting_time = seconds;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

pub struct WorkflowBuilder {
    job: Job,
    spec: WorkflowSpec,
}

impl WorkflowBuilder {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            job: base_job(id, name, JobKind::Workflow(WorkflowSpec::default())),
            spec: WorkflowSpec::default(),
        }
    }

    pub fn with_jobs(mut self, jobs: Vec<i64>) -> Self {
        self.spec.jobs = jobs;
        self
    }

    pub fn success_edge(mut self, source: i64, destination: i64) -> Self {
        self.spec.edges.push(WorkflowEdge::success(source, destination));
        self
    }

    pub fn failure_edge(mut self, source: i64, destination: i64) -> Self {
        self.spec.edges.push(WorkflowEdge::failure(source, destination));
        self
    }

    pub fn with_start_job(mut self, start_job: i64) -> Self {
        self.spec.start_job = Some(start_job);
        self
    }

    pub fn with_workflow_targets(mut self) -> Self {
        self.spec.use_workflow_targets = true;
        self
    }

    pub fn with_devices(mut self, devices: &[&str]) -> Self {
        self.job.devices = devices.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_waiting_time(mut self, seconds: u64) -> Self {
        self.job.waiting_time = seconds;
        self
    }

    pub fn build(mut self) -> Job {
        self.job.kind = JobKind::Workflow(self.spec);
        self.job
    }
}

pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(id: i64, job_id: i64) -> Self {
        Self {
            task: Task::new(id, format!("task_{id}"), job_id, Utc::now()),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_start_date(mut self, start_date: DateTime<Utc>) -> Self {
        self.task.start_date = start_date;
        self
    }

    pub fn with_end_date(mut self, end_date: DateTime<Utc>) -> Self {
        self.task.end_date = Some(end_date);
        self
    }

    pub fn with_frequency(mut self, seconds: u64) -> Self {
        self.task.frequency = Some(seconds);
        self
    }

    pub fn with_next_run_time(mut self, next_run_time: DateTime<Utc>) -> Self {
        self.task.next_run_time = Some(next_run_time);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.task.is_active = false;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}
