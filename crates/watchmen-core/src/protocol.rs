use crate::types::{Status, Task, TaskFlag};
use serde::{Deserialize, Serialize};

pub const CODE_SUCCESS: u32 = 10000;
pub const CODE_WRONG: u32 = 40000;
pub const CODE_FAILED: u32 = 50000;

/// One client command. Encoded as `{"command": {"<Name>": <payload>}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
	pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
	Run(Task),
	Add(Task),
	Reload(Task),
	Start(TaskFlag),
	Stop(TaskFlag),
	Restart(TaskFlag),
	Remove(TaskFlag),
	Pause(TaskFlag),
	Resume(TaskFlag),
	List(Option<TaskFlag>),
}

impl Command {
	pub fn name(&self) -> &'static str {
		match self {
			Command::Run(_) => "Run",
			Command::Add(_) => "Add",
			Command::Reload(_) => "Reload",
			Command::Start(_) => "Start",
			Command::Stop(_) => "Stop",
			Command::Restart(_) => "Restart",
			Command::Remove(_) => "Remove",
			Command::Pause(_) => "Pause",
			Command::Resume(_) => "Resume",
			Command::List(_) => "List",
		}
	}
}

impl From<Command> for Request {
	fn from(command: Command) -> Self {
		Self { command }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
	pub code: u32,
	pub msg: String,
	pub data: Option<Data>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Data {
	Status(Vec<Status>),
	String(String),
}

impl Response {
	pub fn success(data: Option<Data>) -> Self {
		Self {
			code: CODE_SUCCESS,
			msg: "Success".to_string(),
			data,
		}
	}

	pub fn message(msg: impl Into<String>) -> Self {
		Self::success(Some(Data::String(msg.into())))
	}

	pub fn statuses(statuses: Vec<Status>) -> Self {
		Self::success(Some(Data::Status(statuses)))
	}

	pub fn wrong(reason: impl Into<String>) -> Self {
		Self {
			code: CODE_WRONG,
			msg: "Wrong".to_string(),
			data: Some(Data::String(reason.into())),
		}
	}

	pub fn failed(reason: impl Into<String>) -> Self {
		Self {
			code: CODE_FAILED,
			msg: "Failed".to_string(),
			data: Some(Data::String(reason.into())),
		}
	}

	pub fn is_success(&self) -> bool {
		self.code == CODE_SUCCESS
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{AsyncTask, TaskType};
	use serde_json::json;
	use std::collections::HashMap;

	#[test]
	fn list_without_selector() {
		let req: Request = serde_json::from_str(r#"{"command": {"List": null}}"#).unwrap();
		assert_eq!(req.command, Command::List(None));
		assert_eq!(
			serde_json::to_value(&req).unwrap(),
			json!({"command": {"List": null}})
		);
	}

	#[test]
	fn start_with_selector() {
		let req: Request =
			serde_json::from_str(r#"{"command": {"Start": {"id": 3, "name": null, "mat": false}}}"#)
				.unwrap();
		assert_eq!(req.command, Command::Start(TaskFlag::by_id(3)));
	}

	#[test]
	fn add_carries_full_task() {
		let task = Task {
			id: 1,
			name: "sleep".into(),
			group: None,
			command: "/bin/sleep".into(),
			args: vec!["5".into()],
			dir: None,
			env: HashMap::new(),
			stdin: None,
			stdout: None,
			stderr: None,
			created_at: 0,
			task_type: TaskType::Async(AsyncTask {
				max_restart: Some(2),
				has_restart: 0,
				started_at: 0,
				stopped_at: 0,
			}),
			pid: None,
			status: None,
			code: None,
		};
		let value = serde_json::to_value(Request::from(Command::Add(task.clone()))).unwrap();
		assert_eq!(value["command"]["Add"]["task_type"]["Async"]["max_restart"], 2);
		let back: Request = serde_json::from_value(value).unwrap();
		assert_eq!(back.command, Command::Add(task));
	}

	#[test]
	fn response_shapes() {
		assert_eq!(
			serde_json::to_value(Response::message("ok")).unwrap(),
			json!({"code": 10000, "msg": "Success", "data": {"String": "ok"}})
		);
		assert_eq!(
			serde_json::to_value(Response::statuses(vec![])).unwrap(),
			json!({"code": 10000, "msg": "Success", "data": {"Status": []}})
		);
		assert_eq!(
			serde_json::to_value(Response::success(None)).unwrap(),
			json!({"code": 10000, "msg": "Success", "data": null})
		);
		let failed = Response::failed("boom");
		assert_eq!(failed.code, CODE_FAILED);
		assert!(!failed.is_success());
		assert_eq!(Response::wrong("bad").code, CODE_WRONG);
	}

	#[test]
	fn unknown_command_is_rejected() {
		let result: Result<Request, _> =
			serde_json::from_str(r#"{"command": {"Explode": null}}"#);
		assert!(result.is_err());
	}
}
