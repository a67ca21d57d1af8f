use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use tokio::process::Child;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use watchmen_core::types::{AsyncTask, TaskStatus, TaskType};

const SIGTERM: i32 = 15;

/// How a child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitOutcome {
	pub code: Option<i32>,
	pub signal: Option<i32>,
}

impl From<ExitStatus> for ExitOutcome {
	fn from(status: ExitStatus) -> Self {
		Self {
			code: status.code(),
			signal: status.signal(),
		}
	}
}

impl ExitOutcome {
	fn stopped_by_signal(&self) -> bool {
		// A shell reports a child killed by SIGTERM as 128 + 15.
		self.signal == Some(SIGTERM) || self.code == Some(128 + SIGTERM)
	}
}

/// Sent by a watcher once its child has exited.
#[derive(Debug, Clone)]
pub struct ExitEvent {
	pub id: u64,
	pub generation: u64,
	pub pid: u32,
	pub outcome: ExitOutcome,
}

/// Wait for `child` on a dedicated task and report the exit over `exits`.
pub fn spawn_watcher(
	mut child: Child,
	id: u64,
	generation: u64,
	pid: u32,
	exits: UnboundedSender<ExitEvent>,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		// `wait` closes a piped stdin; hold it so the child never sees EOF.
		let stdin = child.stdin.take();
		let outcome = match child.wait().await {
			Ok(status) => ExitOutcome::from(status),
			Err(e) => {
				tracing::warn!("task {} (pid {}): wait failed: {}", id, pid, e);
				ExitOutcome::default()
			}
		};
		drop(stdin);
		tracing::debug!("task {} (pid {}) exited: {:?}", id, pid, outcome);
		let event = ExitEvent {
			id,
			generation,
			pid,
			outcome,
		};
		if exits.send(event).is_err() {
			tracing::debug!("task {} exited after the supervisor shut down", id);
		}
	})
}

/// Whether an async task is done for good after this exit.
pub fn async_finished(policy: &AsyncTask, outcome: &ExitOutcome) -> bool {
	let max = match policy.max_restart {
		None | Some(0) => return true,
		Some(max) => max,
	};
	match outcome.code {
		None => true,
		Some(0) => true,
		_ if outcome.stopped_by_signal() => true,
		_ => policy.has_restart >= max,
	}
}

/// Next status after an exit, or `None` when the entry moved on while the
/// process was running and the exit must not touch its status.
pub fn next_status(
	task_type: &TaskType,
	current: Option<TaskStatus>,
	outcome: &ExitOutcome,
) -> Option<TaskStatus> {
	match task_type {
		TaskType::Async(policy) => {
			if current == Some(TaskStatus::Stopped) || async_finished(policy, outcome) {
				Some(TaskStatus::Stopped)
			} else {
				Some(TaskStatus::AutoRestart)
			}
		}
		TaskType::Periodic(_) => {
			(current == Some(TaskStatus::Executing)).then_some(TaskStatus::Interval)
		}
		TaskType::Scheduled(_) => {
			(current == Some(TaskStatus::Processing)).then_some(TaskStatus::Waiting)
		}
	}
}
