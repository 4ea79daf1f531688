//! Process registry and per-task supervisor.
//!
//! Every launched extractor gets a [`TaskHandle`] in the [`TaskRegistry`] and
//! a tokio task that follows its output, waits for it to exit (or be
//! cancelled / time out), and writes the outcome into the task record.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::TaskError;
use crate::progress::parse_progress_line;
use crate::record::{self, Outcome};
use crate::types::{TaskId, TaskStatus};

/// Bytes of stderr kept for diagnostics.
const STDERR_TAIL_BYTES: usize = 2048;
/// Longest error excerpt stored in a task record.
pub const MAX_ERROR_EXCERPT: usize = 400;
/// How long output readers may linger after the child is gone.
const READER_GRACE: Duration = Duration::from_secs(5);

struct TaskHandle {
    pid: Option<u32>,
    /// Latest percentage, stored as `f32` bits.
    percent: Arc<AtomicU32>,
    cancel_tx: watch::Sender<bool>,
}

/// Live side of a registered task, handed to its supervisor.
pub struct LiveTask {
    pub task_id: TaskId,
    percent: Arc<AtomicU32>,
    cancel_rx: watch::Receiver<bool>,
}

/// Tracks running extractor processes, keyed by task id.
pub struct TaskRegistry {
    handles: Mutex<HashMap<String, TaskHandle>>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskRegistry({} running)", self.len())
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self { handles: Mutex::new(HashMap::new()) }
    }

    /// Poisoning is ignored: no holder leaves the map half-updated.
    fn handles(&self) -> MutexGuard<'_, HashMap<String, TaskHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a process for `id`. A task can only ever have one.
    pub fn register(&self, id: &TaskId, pid: Option<u32>) -> Result<LiveTask, TaskError> {
        let mut map = self.handles();
        if map.contains_key(id.as_str()) {
            return Err(TaskError::AlreadyRunning(id.to_string()));
        }
        let percent = Arc::new(AtomicU32::new(0f32.to_bits()));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        map.insert(
            id.as_str().to_owned(),
            TaskHandle { pid, percent: Arc::clone(&percent), cancel_tx },
        );
        Ok(LiveTask { task_id: id.clone(), percent, cancel_rx })
    }

    /// Latest percentage of a running task; `None` when nothing is running.
    pub fn percent(&self, id: &TaskId) -> Option<f32> {
        self.handles()
            .get(id.as_str())
            .map(|h| f32::from_bits(h.percent.load(Ordering::Relaxed)))
    }

    /// OS process id of the running extractor for `id`, if known.
    pub fn pid(&self, id: &TaskId) -> Option<u32> {
        self.handles().get(id.as_str()).and_then(|h| h.pid)
    }

    /// Ask the supervisor of `id` to kill its process. Returns `true` if the
    /// task was running.
    pub fn cancel(&self, id: &TaskId) -> bool {
        match self.handles().get(id.as_str()) {
            Some(h) => h.cancel_tx.send(true).is_ok(),
            None => false,
        }
    }

    pub fn remove(&self, id: &TaskId) {
        self.handles().remove(id.as_str());
    }

    pub fn len(&self) -> usize {
        self.handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why the wait on a child ended.
enum Ended {
    Exited(std::io::Result<std::process::ExitStatus>),
    Cancelled,
    TimedOut(Duration),
}

/// Spawns one watcher per launched process.
#[derive(Debug, Clone)]
pub struct Supervisor {
    registry: Arc<TaskRegistry>,
    timeout: Option<Duration>,
}

impl Supervisor {
    pub fn new(registry: Arc<TaskRegistry>, timeout: Option<Duration>) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Register `child` under `id` and follow it in the background.
    ///
    /// Returns as soon as the watcher is spawned. If `id` already has a
    /// running process the new child is killed and `AlreadyRunning` returned.
    pub fn watch(&self, id: &TaskId, dir: PathBuf, mut child: Child) -> Result<(), TaskError> {
        let live = match self.registry.register(id, child.id()) {
            Ok(live) => live,
            Err(e) => {
                let _ = child.start_kill();
                return Err(e);
            }
        };
        let registry = Arc::clone(&self.registry);
        let timeout = self.timeout;
        tokio::spawn(async move {
            let task_id = live.task_id.clone();
            let outcome = supervise(child, live, timeout).await;
            match record::finish(&dir, outcome).await {
                Ok(rec) => info!(
                    task_id = %task_id,
                    status = %rec.status,
                    exit_code = ?rec.exit_code,
                    "extractor finished"
                ),
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "failed to persist extractor outcome")
                }
            }
            registry.remove(&task_id);
        });
        Ok(())
    }
}

/// Follow a child to completion and describe how it ended.
async fn supervise(mut child: Child, live: LiveTask, timeout: Option<Duration>) -> Outcome {
    let LiveTask { task_id, percent, mut cancel_rx } = live;

    let stdout_reader = child.stdout.take().map(|out| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(out).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(p) = parse_progress_line(&line) {
                    percent.store(p.to_bits(), Ordering::Relaxed);
                }
            }
        })
    });
    let stderr_reader = child.stderr.take().map(|err| tokio::spawn(collect_tail(err)));

    let ended = tokio::select! {
        status = child.wait() => Ended::Exited(status),
        _ = cancelled(&mut cancel_rx) => Ended::Cancelled,
        _ = deadline(timeout) => Ended::TimedOut(timeout.unwrap_or_default()),
    };

    if !matches!(ended, Ended::Exited(_)) {
        if let Err(e) = child.kill().await {
            warn!(task_id = %task_id, error = %e, "failed to kill extractor");
        }
    }

    if let Some(reader) = stdout_reader {
        if tokio::time::timeout(READER_GRACE, reader).await.is_err() {
            warn!(task_id = %task_id, "stdout reader still open after exit");
        }
    }
    let tail = match stderr_reader {
        Some(reader) => match tokio::time::timeout(READER_GRACE, reader).await {
            Ok(Ok(tail)) => tail,
            _ => String::new(),
        },
        None => String::new(),
    };

    match ended {
        Ended::Exited(Ok(status)) if status.success() => Outcome {
            status: TaskStatus::Complete,
            exit_code: status.code(),
            error: None,
        },
        Ended::Exited(Ok(status)) => {
            let message = if tail.trim().is_empty() {
                format!("extractor exited with {status}")
            } else {
                tail_excerpt(&tail, MAX_ERROR_EXCERPT)
            };
            warn!(task_id = %task_id, exit_code = ?status.code(), "extractor failed");
            Outcome { status: TaskStatus::Error, exit_code: status.code(), error: Some(message) }
        }
        Ended::Exited(Err(e)) => Outcome {
            status: TaskStatus::Error,
            exit_code: None,
            error: Some(format!("failed to wait for extractor: {e}")),
        },
        Ended::Cancelled => {
            info!(task_id = %task_id, "extractor cancelled");
            Outcome { status: TaskStatus::Error, exit_code: None, error: Some("cancelled".into()) }
        }
        Ended::TimedOut(after) => {
            warn!(task_id = %task_id, timeout_secs = after.as_secs(), "extractor timed out");
            Outcome {
                status: TaskStatus::Error,
                exit_code: None,
                error: Some(format!("timed out after {}s", after.as_secs())),
            }
        }
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|cancel| *cancel).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending::<()>().await,
    }
}

/// Keep the last [`STDERR_TAIL_BYTES`] worth of lines from `reader`.
async fn collect_tail<R: AsyncRead + Unpin>(reader: R) -> String {
    let mut tail: VecDeque<String> = VecDeque::new();
    let mut size = 0usize;
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        size += line.len() + 1;
        tail.push_back(line);
        while size > STDERR_TAIL_BYTES && tail.len() > 1 {
            if let Some(old) = tail.pop_front() {
                size -= old.len() + 1;
            }
        }
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// Last `max` characters of `text`, trimmed, prefixed with `…` when cut.
pub fn tail_excerpt(text: &str, max: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max {
        return text.to_owned();
    }
    let kept: String = text.chars().skip(count - max).collect();
    format!("…{kept}")
}
