use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
	pub id: u64,
	pub name: String,
	#[serde(default)]
	pub group: Option<String>,
	pub command: String,
	#[serde(default)]
	pub args: Vec<String>,
	#[serde(default)]
	pub dir: Option<String>,
	#[serde(default)]
	pub env: HashMap<String, String>,
	#[serde(default)]
	pub stdin: Option<bool>,
	#[serde(default)]
	pub stdout: Option<String>,
	#[serde(default)]
	pub stderr: Option<String>,
	#[serde(default)]
	pub created_at: u64,
	pub task_type: TaskType,
	#[serde(default)]
	pub pid: Option<u32>,
	#[serde(default)]
	pub status: Option<TaskStatus>,
	#[serde(default)]
	pub code: Option<i32>,
}

impl Task {
	/// Status a freshly added task of this type starts in.
	pub fn initial_status(&self) -> TaskStatus {
		match self.task_type {
			TaskType::Async(_) => TaskStatus::Added,
			TaskType::Periodic(_) => TaskStatus::Interval,
			TaskType::Scheduled(_) => TaskStatus::Waiting,
		}
	}

	pub fn is_scheduled(&self) -> bool {
		matches!(self.task_type, TaskType::Scheduled(_))
	}

	pub fn has_status(&self, status: TaskStatus) -> bool {
		self.status == Some(status)
	}

	pub fn to_status(&self) -> Status {
		Status {
			id: self.id,
			group: self.group.clone(),
			name: self.name.clone(),
			command: self.command.clone(),
			args: self.args.clone(),
			dir: self.dir.clone(),
			env: self.env.clone(),
			stdin: self.stdin,
			stdout: self.stdout.clone(),
			stderr: self.stderr.clone(),
			created_at: self.created_at,
			task_type: self.task_type.clone(),
			pid: self.pid,
			status: self.status,
			exit_code: self.code,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskType {
	Async(AsyncTask),
	Periodic(PeriodicTask),
	Scheduled(ScheduledTask),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncTask {
	/// `None` and `Some(0)` both disable automatic restarts.
	#[serde(default)]
	pub max_restart: Option<u32>,
	#[serde(default)]
	pub has_restart: u32,
	#[serde(default)]
	pub started_at: u64,
	#[serde(default)]
	pub stopped_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicTask {
	#[serde(default)]
	pub started_after: u64,
	pub interval: u64,
	#[serde(default)]
	pub last_run: u64,
	/// Allow a new run while the previous one is still alive.
	#[serde(default)]
	pub sync: bool,
}

impl PeriodicTask {
	pub fn is_due(&self, now: u64) -> bool {
		now >= self.started_after && now.saturating_sub(self.last_run) >= self.interval
	}
}

/// Absolute trigger moment. Unset fields take the current wall-clock value
/// when the trigger is evaluated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
	#[serde(default)]
	pub year: Option<i32>,
	#[serde(default)]
	pub month: Option<u32>,
	#[serde(default)]
	pub day: Option<u32>,
	#[serde(default)]
	pub hour: Option<u32>,
	#[serde(default)]
	pub minute: Option<u32>,
	#[serde(default)]
	pub second: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
	Added,
	Waiting,
	Running,
	#[serde(rename = "auto restart")]
	AutoRestart,
	Stopped,
	Interval,
	Executing,
	Processing,
	Paused,
}

impl TaskStatus {
	/// States in which a process is expected to be attached.
	pub fn is_active(&self) -> bool {
		matches!(
			self,
			TaskStatus::Running | TaskStatus::Executing | TaskStatus::Processing
		)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			TaskStatus::Added => "added",
			TaskStatus::Waiting => "waiting",
			TaskStatus::Running => "running",
			TaskStatus::AutoRestart => "auto restart",
			TaskStatus::Stopped => "stopped",
			TaskStatus::Interval => "interval",
			TaskStatus::Executing => "executing",
			TaskStatus::Processing => "processing",
			TaskStatus::Paused => "paused",
		}
	}
}

impl fmt::Display for TaskStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Addresses one or more tasks: by `id` when non-zero, otherwise by name
/// (a regular expression when `mat` is set), otherwise by group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFlag {
	#[serde(default)]
	pub id: u64,
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub group: Option<String>,
	#[serde(default)]
	pub mat: bool,
}

impl TaskFlag {
	pub fn by_id(id: u64) -> Self {
		Self {
			id,
			..Self::default()
		}
	}

	pub fn by_name(name: impl Into<String>) -> Self {
		Self {
			name: Some(name.into()),
			..Self::default()
		}
	}

	pub fn by_group(group: impl Into<String>) -> Self {
		Self {
			group: Some(group.into()),
			..Self::default()
		}
	}
}

/// Read-only reporting view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
	pub id: u64,
	pub group: Option<String>,
	pub name: String,
	pub command: String,
	pub args: Vec<String>,
	pub dir: Option<String>,
	pub env: HashMap<String, String>,
	pub stdin: Option<bool>,
	pub stdout: Option<String>,
	pub stderr: Option<String>,
	pub created_at: u64,
	pub task_type: TaskType,
	pub pid: Option<u32>,
	pub status: Option<TaskStatus>,
	pub exit_code: Option<i32>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> Task {
		Task {
			id: 7,
			name: "sleeper".into(),
			group: Some("batch".into()),
			command: "/bin/sleep".into(),
			args: vec!["5".into()],
			dir: Some("/tmp".into()),
			env: HashMap::from([("FOO".to_string(), "bar".to_string())]),
			stdin: Some(false),
			stdout: Some("/tmp/out.log".into()),
			stderr: None,
			created_at: 1_700_000_000,
			task_type: TaskType::Periodic(PeriodicTask {
				started_after: 10,
				interval: 60,
				last_run: 0,
				sync: true,
			}),
			pid: Some(4242),
			status: Some(TaskStatus::Executing),
			code: Some(3),
		}
	}

	#[test]
	fn task_survives_wire_encoding() {
		let task = sample();
		let json = serde_json::to_string(&task).unwrap();
		let back: Task = serde_json::from_str(&json).unwrap();
		assert_eq!(back, task);
	}

	#[test]
	fn task_type_is_externally_tagged() {
		let value = serde_json::to_value(sample()).unwrap();
		assert_eq!(value["task_type"]["Periodic"]["interval"], 60);
		assert_eq!(value["status"], "executing");
	}

	#[test]
	fn auto_restart_status_uses_spaced_name() {
		let json = serde_json::to_string(&TaskStatus::AutoRestart).unwrap();
		assert_eq!(json, "\"auto restart\"");
		let back: TaskStatus = serde_json::from_str("\"auto restart\"").unwrap();
		assert_eq!(back, TaskStatus::AutoRestart);
	}

	#[test]
	fn minimal_async_task_decodes() {
		let json = r#"{
			"id": 1,
			"name": "s",
			"command": "/bin/sleep",
			"args": ["5"],
			"task_type": {"Async": {"max_restart": 2}}
		}"#;
		let task: Task = serde_json::from_str(json).unwrap();
		assert_eq!(task.initial_status(), TaskStatus::Added);
		match task.task_type {
			TaskType::Async(a) => {
				assert_eq!(a.max_restart, Some(2));
				assert_eq!(a.has_restart, 0);
			}
			other => panic!("expected Async, got {:?}", other),
		}
	}

	#[test]
	fn status_projection_renames_exit_code() {
		let value = serde_json::to_value(sample().to_status()).unwrap();
		assert_eq!(value["exit_code"], 3);
		assert_eq!(value["group"], "batch");
		assert!(value.get("code").is_none());
	}

	#[test]
	fn periodic_due_check() {
		let p = PeriodicTask {
			started_after: 100,
			interval: 10,
			last_run: 95,
			sync: false,
		};
		assert!(!p.is_due(99));
		assert!(!p.is_due(104));
		assert!(p.is_due(105));
	}

	#[test]
	fn active_states() {
		assert!(TaskStatus::Running.is_active());
		assert!(TaskStatus::Executing.is_active());
		assert!(TaskStatus::Processing.is_active());
		assert!(!TaskStatus::AutoRestart.is_active());
		assert!(!TaskStatus::Paused.is_active());
	}
}
