use chrono::{DateTime, Utc};
use dashmap::DashMap;
use forecast_core::AnalysisParams;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::runner::RunResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub parameters: AnalysisParams,
    pub status: TaskStatus,
    pub logs: Vec<String>,
    pub result: Option<RunResult>,
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// In-memory task table. Each task is written by a single background routine.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<String, TaskRecord>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_task_id(ticker: &str) -> String {
        format!("{}_{}", ticker.trim(), Uuid::new_v4())
    }

    pub fn register(&self, task_id: &str, parameters: AnalysisParams) -> TaskRecord {
        let record = TaskRecord {
            task_id: task_id.to_string(),
            parameters,
            status: TaskStatus::Running,
            logs: Vec::new(),
            result: None,
            error: None,
            start_time: Utc::now(),
            end_time: None,
        };
        self.tasks.insert(task_id.to_string(), record.clone());
        record
    }

    pub fn append_log(&self, task_id: &str, line: impl Into<String>) {
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            task.logs.push(line.into());
        }
    }

    /// Record the subprocess outcome and close the task.
    pub fn finish(&self, task_id: &str, result: RunResult) {
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            task.status = if result.success {
                TaskStatus::Completed
            } else {
                TaskStatus::Failed
            };
            task.error = result.error.clone();
            task.result = Some(result);
            task.end_time = Some(Utc::now());
        }
    }

    /// Close the task as failed when the run produced no exit status, e.g. the
    /// binary could not be spawned or the background routine panicked. A
    /// failed `RunResult` is recorded so every finished task carries one.
    pub fn fail(&self, task_id: &str, error: impl Into<String>) {
        let error = error.into();
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            task.status = TaskStatus::Failed;
            task.logs.push(format!("ERROR: {}", error));
            if task.result.is_none() {
                task.result = Some(RunResult {
                    success: false,
                    output: String::new(),
                    ticker: task.parameters.ticker.clone(),
                    return_code: None,
                    error: Some(error.clone()),
                });
            }
            task.error = Some(error);
            task.end_time = Some(Utc::now());
        }
    }

    pub fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.get(task_id).map(|t| t.clone())
    }

    pub fn logs(&self, task_id: &str) -> Option<(Vec<String>, TaskStatus)> {
        self.tasks
            .get(task_id)
            .map(|t| (t.logs.clone(), t.status))
    }
}
