//! Shared fixtures for engine integration tests: a scripted conversion
//! service with concurrency instrumentation, plan builders, and a
//! manager factory wired to in-memory storage.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use restack_convert::client::ConvertError;
use restack_convert::service::{ConvertRequest, ConvertResponse, ConvertService, ConvertedFile};
use restack_core::job::ConversionJob;
use restack_core::plan::{ConversionPlan, ConversionTask, PlanComplexity, TaskKind};
use restack_core::result::ChangeKind;
use restack_core::retry::RetryConfig;
use restack_core::store::JobStore;
use restack_core::types::JobId;
use restack_engine::{EngineConfig, JobManager, MemoryJobStore};
use restack_events::{EventBus, ProgressHub};

/// How a scripted task behaves when the service is asked to convert it.
/// Tasks with no script succeed immediately.
pub enum Behavior {
    /// Succeed after simulating `delay_ms` of service latency.
    Succeed { delay_ms: u64 },
    /// Fail with a transient error for the first `failures` attempts,
    /// then succeed.
    TransientFailures { failures: u32, delay_ms: u64 },
    /// Always fail with a transient error.
    AlwaysTransient,
    /// Fail permanently on the first attempt.
    FailPermanent,
}

/// A conversion service whose per-task behavior is scripted by test
/// code. Tasks are keyed by their description, which the plan builders
/// below set equal to the task id.
pub struct ScriptedService {
    behaviors: Mutex<HashMap<String, Behavior>>,
    attempts: Mutex<HashMap<String, u32>>,
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
    contexts: Mutex<HashMap<String, serde_json::Value>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            behaviors: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            started: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
            contexts: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn script(&self, task_id: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(task_id.to_string(), behavior);
    }

    /// Task ids in the order their conversion calls began.
    pub fn started_tasks(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    /// Task ids in the order their conversion calls returned.
    pub fn finished_tasks(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }

    /// Number of attempts made for one task.
    pub fn attempts_for(&self, task_id: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }

    /// The context the most recent attempt for a task received.
    pub fn context_for(&self, task_id: &str) -> Option<serde_json::Value> {
        self.contexts.lock().unwrap().get(task_id).cloned()
    }

    /// Highest number of conversion calls observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

enum Outcome {
    Succeed,
    Transient,
    Permanent,
}

#[async_trait]
impl ConvertService for ScriptedService {
    async fn convert(&self, request: &ConvertRequest) -> Result<ConvertResponse, ConvertError> {
        let key = request.description.clone();

        self.started.lock().unwrap().push(key.clone());
        self.contexts
            .lock()
            .unwrap()
            .insert(key.clone(), request.context.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(key.clone()).or_insert(0);
            *n += 1;
            *n
        };

        let (delay_ms, outcome) = {
            let behaviors = self.behaviors.lock().unwrap();
            match behaviors.get(&key) {
                None => (0, Outcome::Succeed),
                Some(Behavior::Succeed { delay_ms }) => (*delay_ms, Outcome::Succeed),
                Some(Behavior::TransientFailures { failures, delay_ms }) => {
                    if attempt <= *failures {
                        (*delay_ms, Outcome::Transient)
                    } else {
                        (*delay_ms, Outcome::Succeed)
                    }
                }
                Some(Behavior::AlwaysTransient) => (0, Outcome::Transient),
                Some(Behavior::FailPermanent) => (0, Outcome::Permanent),
            }
        };

        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push(key.clone());

        match outcome {
            Outcome::Succeed => Ok(ConvertResponse {
                files: vec![ConvertedFile {
                    path: format!("src/{key}.rs"),
                    change: ChangeKind::Create,
                    content: Some(format!("// generated for {key}")),
                    previous: None,
                }],
                confidence: 0.9,
                warnings: vec![],
                suggestions: vec![],
            }),
            Outcome::Transient => Err(ConvertError::Unavailable {
                status: 503,
                body: "service overloaded".to_string(),
            }),
            Outcome::Permanent => Err(ConvertError::MalformedOutput(
                "unconvertible input".to_string(),
            )),
        }
    }
}

/// A task whose description doubles as the scripting key.
pub fn task(id: &str, deps: &[&str], estimated_secs: f64) -> ConversionTask {
    ConversionTask {
        id: id.into(),
        kind: TaskKind::CodeGeneration,
        description: id.into(),
        input_patterns: vec![],
        output_patterns: vec![],
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
        priority: 0,
        estimated_secs,
        context: serde_json::json!({}),
    }
}

pub fn task_with_priority(
    id: &str,
    deps: &[&str],
    estimated_secs: f64,
    priority: i32,
) -> ConversionTask {
    let mut t = task(id, deps, estimated_secs);
    t.priority = priority;
    t
}

pub fn plan(tasks: Vec<ConversionTask>) -> ConversionPlan {
    ConversionPlan {
        id: uuid::Uuid::now_v7(),
        source_stack: "express/javascript".into(),
        target_stack: "axum/rust".into(),
        tasks,
        complexity: PlanComplexity::Moderate,
        feasible: true,
        warnings: vec![],
    }
}

/// Fast retry timings so backoff tests stay quick under the paused clock.
pub fn test_config(max_concurrent: usize, max_retries: u32) -> EngineConfig {
    EngineConfig {
        max_concurrent,
        retry: RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        },
        task_timeout: Duration::from_secs(30),
        hard_cancel_on_pause: false,
    }
}

pub fn manager(service: Arc<ScriptedService>, config: EngineConfig) -> Arc<JobManager> {
    manager_with_store(service, Arc::new(MemoryJobStore::new()), config)
}

pub fn manager_with_store(
    service: Arc<ScriptedService>,
    store: Arc<dyn JobStore>,
    config: EngineConfig,
) -> Arc<JobManager> {
    Arc::new(JobManager::new(
        store,
        service,
        Arc::new(EventBus::default()),
        Arc::new(ProgressHub::new()),
        config,
    ))
}

/// Follow the progress stream until the job reaches a terminal status,
/// then return the final job snapshot.
pub async fn wait_for_terminal(manager: &JobManager, job_id: JobId) -> ConversionJob {
    let wait = async {
        let mut rx = manager
            .subscribe_progress(job_id)
            .await
            .expect("progress subscription");
        loop {
            if rx.borrow_and_update().status.is_terminal() {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    };

    tokio::time::timeout(Duration::from_secs(300), wait)
        .await
        .expect("job did not reach a terminal status in time");

    manager.get_status(job_id).await.expect("job status")
}

/// Poll until the service has begun converting `task_id`.
pub async fn wait_for_task_start(service: &ScriptedService, task_id: &str) {
    let wait = async {
        loop {
            if service.started_tasks().iter().any(|t| t == task_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };

    tokio::time::timeout(Duration::from_secs(60), wait)
        .await
        .expect("task was never dispatched");
}
