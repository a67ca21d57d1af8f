use regex::Regex;
use std::collections::BTreeMap;
use tokio::task::JoinHandle;
use watchmen_core::types::{Task, TaskFlag};

use crate::error::{Result, SupervisorError};

/// A live child bound to a registry entry.
pub struct ProcessHandle {
	pub pid: u32,
	pub watcher: JoinHandle<()>,
}

pub struct Entry {
	pub task: Task,
	pub process: Option<ProcessHandle>,
	/// Bumped on every launch; exit events from older launches are ignored.
	pub generation: u64,
	/// Set once a scheduled task has been launched.
	pub fired: bool,
}

impl Entry {
	pub(crate) fn new(task: Task) -> Self {
		Self {
			task,
			process: None,
			generation: 0,
			fired: false,
		}
	}

	/// Drop the process binding. The watcher keeps running detached so the
	/// child is still reaped.
	pub fn detach(&mut self) -> Option<ProcessHandle> {
		self.task.pid = None;
		self.process.take()
	}
}

/// Authoritative map of supervised tasks, keyed by task id.
///
/// Not synchronized itself; the supervisor holds it behind one lock and
/// never awaits between inspecting and mutating an entry.
#[derive(Default)]
pub struct Registry {
	entries: BTreeMap<u64, Entry>,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&mut self, task: Task) -> Result<&mut Entry> {
		let id = task.id;
		if self.entries.contains_key(&id) {
			return Err(SupervisorError::Conflict(id));
		}
		Ok(self.entries.entry(id).or_insert(Entry::new(task)))
	}

	pub fn get(&self, id: u64) -> Option<&Entry> {
		self.entries.get(&id)
	}

	pub fn get_mut(&mut self, id: u64) -> Option<&mut Entry> {
		self.entries.get_mut(&id)
	}

	pub fn get_by_name(&self, name: &str) -> Option<&Entry> {
		self.entries.values().find(|e| e.task.name == name)
	}

	pub fn remove(&mut self, id: u64) -> Option<Entry> {
		self.entries.remove(&id)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Entry> {
		self.entries.values()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn snapshot(&self) -> Vec<Task> {
		self.entries.values().map(|e| e.task.clone()).collect()
	}

	/// Resolve a selector to task ids: id when non-zero, else the first task
	/// with that exact name (every match when `mat` makes it a pattern),
	/// else every task in the group.
	pub fn select(&self, flag: &TaskFlag) -> Result<Vec<u64>> {
		if flag.id > 0 {
			if !self.entries.contains_key(&flag.id) {
				return Err(SupervisorError::NotFound(flag.id.to_string()));
			}
			return Ok(vec![flag.id]);
		}

		if let Some(name) = flag.name.as_deref().filter(|n| !n.is_empty()) {
			let ids: Vec<u64> = if flag.mat {
				let pattern =
					Regex::new(name).map_err(|e| SupervisorError::BadSelector(e.to_string()))?;
				self.iter()
					.filter(|e| pattern.is_match(&e.task.name))
					.map(|e| e.task.id)
					.collect()
			} else {
				self.get_by_name(name).map(|e| e.task.id).into_iter().collect()
			};
			if ids.is_empty() {
				return Err(SupervisorError::NotFound(name.to_string()));
			}
			return Ok(ids);
		}

		if let Some(group) = flag.group.as_deref().filter(|g| !g.is_empty()) {
			let ids: Vec<u64> = self
				.iter()
				.filter(|e| e.task.group.as_deref() == Some(group))
				.map(|e| e.task.id)
				.collect();
			if ids.is_empty() {
				return Err(SupervisorError::NotFound(group.to_string()));
			}
			return Ok(ids);
		}

		Err(SupervisorError::BadSelector(
			"one of id, name or group is required".to_string(),
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use watchmen_core::types::{AsyncTask, TaskType};

	fn task(id: u64, name: &str, group: Option<&str>) -> Task {
		Task {
			id,
			name: name.to_string(),
			group: group.map(str::to_string),
			command: "/bin/true".to_string(),
			args: vec![],
			dir: None,
			env: HashMap::new(),
			stdin: None,
			stdout: None,
			stderr: None,
			created_at: 0,
			task_type: TaskType::Async(AsyncTask {
				max_restart: None,
				has_restart: 0,
				started_at: 0,
				stopped_at: 0,
			}),
			pid: None,
			status: None,
			code: None,
		}
	}

	fn registry() -> Registry {
		let mut reg = Registry::new();
		reg.add(task(1, "web", Some("front"))).unwrap();
		reg.add(task(2, "worker-a", Some("back"))).unwrap();
		reg.add(task(3, "worker-b", Some("back"))).unwrap();
		reg.add(task(4, "web", None)).unwrap();
		reg
	}

	#[test]
	fn duplicate_id_conflicts() {
		let mut reg = registry();
		match reg.add(task(1, "other", None)) {
			Err(SupervisorError::Conflict(1)) => {}
			Err(other) => panic!("expected Conflict, got {:?}", other),
			Ok(_) => panic!("duplicate add succeeded"),
		}
		assert_eq!(reg.get(1).unwrap().task.name, "web");
		assert_eq!(reg.len(), 4);
	}

	#[test]
	fn select_by_id() {
		let reg = registry();
		assert_eq!(reg.select(&TaskFlag::by_id(3)).unwrap(), vec![3]);
		assert!(matches!(
			reg.select(&TaskFlag::by_id(99)),
			Err(SupervisorError::NotFound(_))
		));
	}

	#[test]
	fn exact_name_takes_first_match() {
		let reg = registry();
		assert_eq!(reg.select(&TaskFlag::by_name("web")).unwrap(), vec![1]);
	}

	#[test]
	fn pattern_name_takes_all_matches() {
		let reg = registry();
		let flag = TaskFlag {
			name: Some("^worker-".into()),
			mat: true,
			..TaskFlag::default()
		};
		assert_eq!(reg.select(&flag).unwrap(), vec![2, 3]);
	}

	#[test]
	fn bad_pattern_is_rejected() {
		let reg = registry();
		let flag = TaskFlag {
			name: Some("(".into()),
			mat: true,
			..TaskFlag::default()
		};
		assert!(matches!(reg.select(&flag), Err(SupervisorError::BadSelector(_))));
	}

	#[test]
	fn select_by_group() {
		let reg = registry();
		assert_eq!(reg.select(&TaskFlag::by_group("back")).unwrap(), vec![2, 3]);
		assert!(matches!(
			reg.select(&TaskFlag::by_group("none")),
			Err(SupervisorError::NotFound(_))
		));
	}

	#[test]
	fn empty_selector() {
		let reg = registry();
		assert!(matches!(
			reg.select(&TaskFlag::default()),
			Err(SupervisorError::BadSelector(_))
		));
	}

	#[test]
	fn remove_and_snapshot() {
		let mut reg = registry();
		assert!(reg.remove(2).is_some());
		assert!(reg.remove(2).is_none());
		let ids: Vec<u64> = reg.snapshot().iter().map(|t| t.id).collect();
		assert_eq!(ids, vec![1, 3, 4]);
	}
}
