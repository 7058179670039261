use anyhow::Context;
use forecast_core::AnalysisParams;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::tasks::TaskRegistry;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How long to keep collecting already-written output once the child exits.
const EXIT_DRAIN: Duration = Duration::from_millis(100);
/// Runs longer than this are reported, never killed.
const SOFT_BUDGET: Duration = Duration::from_secs(600);

/// Outcome of one analysis subprocess.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub success: bool,
    pub output: String,
    pub ticker: String,
    pub return_code: Option<i32>,
    pub error: Option<String>,
}

/// Launches the `stock-model` binary and streams its output line by line.
#[derive(Debug, Clone)]
pub struct AnalysisRunner {
    program: PathBuf,
    base_args: Vec<String>,
    working_dir: Option<PathBuf>,
    poll_interval: Duration,
    soft_budget: Duration,
}

impl AnalysisRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            working_dir: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            soft_budget: SOFT_BUDGET,
        }
    }

    /// Arguments placed before the analysis flags.
    pub fn with_base_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_soft_budget(mut self, budget: Duration) -> Self {
        self.soft_budget = budget;
        self
    }

    fn command(&self, params: &AnalysisParams) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .args(params.to_cli_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run to completion, handing every non-empty output line to `on_line`
    /// as it arrives. Spawn and I/O failures are errors; a non-zero exit is a
    /// failed `RunResult`.
    ///
    /// Dropping the returned future stops the reporting but not the child.
    pub async fn run<F>(&self, params: &AnalysisParams, mut on_line: F) -> anyhow::Result<RunResult>
    where
        F: FnMut(&str) + Send,
    {
        let ticker = params.ticker.clone();
        tracing::info!(
            "Launching {} for {} ({} args)",
            self.program.display(),
            ticker,
            self.base_args.len() + params.to_cli_args().len()
        );

        let mut child = self
            .command(params)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program.display()))?;
        tracing::info!("Analysis subprocess started (PID: {})", child.id().unwrap_or(0));

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx.clone());
        }
        drop(tx);

        let started = Instant::now();
        let mut warned = false;
        let mut output: Vec<String> = Vec::new();

        loop {
            match tokio::time::timeout(self.poll_interval, rx.recv()).await {
                Ok(Some(line)) => {
                    tracing::info!("[{}] {}", ticker, line);
                    on_line(&line);
                    output.push(line);
                }
                // Both pipes closed
                Ok(None) => break,
                Err(_) => {
                    // The child may exit while a descendant still holds the pipes
                    if let Some(status) = child.try_wait()? {
                        tracing::debug!("Subprocess exited with {} while pipes still open", status);
                        while let Ok(Some(line)) = tokio::time::timeout(EXIT_DRAIN, rx.recv()).await {
                            tracing::info!("[{}] {}", ticker, line);
                            on_line(&line);
                            output.push(line);
                        }
                        break;
                    }
                }
            }

            if !warned && started.elapsed() > self.soft_budget {
                warned = true;
                let msg = format!(
                    "WARNING: analysis for {} still running after {} minutes",
                    ticker,
                    self.soft_budget.as_secs() / 60
                );
                tracing::warn!("{}", msg);
                on_line(&msg);
                output.push(msg);
            }
        }

        let status = child.wait().await.context("Failed to wait for subprocess")?;
        let return_code = status.code();
        tracing::info!("Subprocess for {} finished with {:?}", ticker, return_code);

        let error = (!status.success()).then(|| match return_code {
            Some(code) => format!("Process exited with code {}", code),
            None => "Process terminated by signal".to_string(),
        });

        Ok(RunResult {
            success: status.success(),
            output: output.join("\n"),
            ticker,
            return_code,
            error,
        })
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    // Keep reading after the receiver is gone so the child never
                    // sees a closed pipe
                    let line = line.trim();
                    if !line.is_empty() {
                        let _ = tx.send(line.to_string());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read subprocess output: {}", e);
                    break;
                }
            }
        }
    });
}

/// Run an analysis in the background, recording progress in the registry.
///
/// The run happens on its own task so that a panic is caught by the
/// supervisor and recorded as a failure.
pub fn spawn_supervised(
    tasks: TaskRegistry,
    runner: Arc<AnalysisRunner>,
    task_id: String,
    params: AnalysisParams,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let worker = {
            let tasks = tasks.clone();
            let task_id = task_id.clone();
            tokio::spawn(async move {
                tracing::info!("Starting analysis {} for {}", task_id, params.ticker);
                tasks.append_log(&task_id, format!("Starting analysis for {}", params.ticker));

                let result = runner
                    .run(&params, |line| tasks.append_log(&task_id, line))
                    .await;

                match result {
                    Ok(result) => {
                        tracing::info!("Analysis {} finished: success={}", task_id, result.success);
                        tasks.finish(&task_id, result);
                    }
                    Err(e) => {
                        tracing::error!("Analysis {} failed: {:#}", task_id, e);
                        tasks.fail(&task_id, format!("{:#}", e));
                    }
                }
            })
        };

        if let Err(e) = worker.await {
            tracing::error!("Analysis {} aborted: {}", task_id, e);
            tasks.fail(&task_id, format!("background task aborted: {}", e));
        }
    })
}
