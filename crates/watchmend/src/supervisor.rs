use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use watchmen_core::types::*;

use crate::cache::CacheWriter;
use crate::error::{Result, SupervisorError};
use crate::process;
use crate::registry::{ProcessHandle, Registry};
use crate::watcher::{self, ExitEvent};

pub struct Supervisor {
	pub(crate) registry: RwLock<Registry>,
	exits: UnboundedSender<ExitEvent>,
	cache: Option<CacheWriter>,
}

pub(crate) fn now_secs() -> u64 {
	u64::try_from(chrono::Local::now().timestamp()).unwrap_or(0)
}

impl Supervisor {
	/// Build a supervisor with an empty registry and start its exit reactor.
	/// Must be called inside a tokio runtime.
	pub fn new(cache: Option<CacheWriter>) -> Arc<Self> {
		let (exits, rx) = mpsc::unbounded_channel();
		let supervisor = Arc::new(Self {
			registry: RwLock::new(Registry::new()),
			exits,
			cache,
		});
		tokio::spawn(run_exit_reactor(Arc::downgrade(&supervisor), rx));
		supervisor
	}

	pub async fn add(&self, task: Task) -> Result<String> {
		let id = task.id;
		let mut reg = self.registry.write().await;
		insert(&mut reg, task)?;
		self.persist(&reg);
		tracing::info!("task {} added", id);
		Ok(format!("Task [{}] added", id))
	}

	/// Add, then start right away unless the task waits for its schedule.
	pub async fn run(&self, task: Task) -> Result<Vec<Status>> {
		let id = task.id;
		let scheduled = task.is_scheduled();
		let mut reg = self.registry.write().await;
		insert(&mut reg, task)?;
		let launched = if scheduled {
			Ok(())
		} else {
			self.launch(&mut reg, id).map(|_| ())
		};
		self.persist(&reg);
		launched?;
		Ok(statuses(&reg, &[id]))
	}

	/// Replace a task definition. A live process of the old definition gets
	/// the stop signal before the entry is dropped.
	pub async fn reload(&self, task: Task) -> Result<Vec<Status>> {
		let id = task.id;
		let mut reg = self.registry.write().await;
		if let Some(mut old) = reg.remove(id) {
			let active = old.task.status.is_some_and(|s| s.is_active());
			if let Some(handle) = old.detach() {
				if active {
					if let Err(e) = process::terminate(handle.pid) {
						tracing::warn!("task {}: stopping pid {} on reload: {}", id, handle.pid, e);
					}
				}
			}
		}
		insert(&mut reg, task)?;
		self.persist(&reg);
		tracing::info!("task {} reloaded", id);
		Ok(statuses(&reg, &[id]))
	}

	pub async fn start(&self, flag: &TaskFlag) -> Result<String> {
		let mut reg = self.registry.write().await;
		let ids = reg.select(flag)?;
		let mut messages = Vec::with_capacity(ids.len());
		let mut result = Ok(());
		for id in ids {
			match self.launch(&mut reg, id) {
				Ok(_) => messages.push(format!("Task [{}] started", id)),
				Err(e) => {
					result = Err(e);
					break;
				}
			}
		}
		self.persist(&reg);
		result.map(|_| messages.join("\n"))
	}

	pub async fn stop(&self, flag: &TaskFlag) -> Result<String> {
		let mut reg = self.registry.write().await;
		let ids = reg.select(flag)?;
		let mut messages = Vec::with_capacity(ids.len());
		let mut result = Ok(());
		for id in ids {
			match stop_one(&mut reg, id) {
				Ok(()) => messages.push(format!("Task [{}] stopped", id)),
				Err(e) => {
					result = Err(e);
					break;
				}
			}
		}
		self.persist(&reg);
		result.map(|_| messages.join("\n"))
	}

	/// Stop when running, then start again with a fresh restart counter.
	pub async fn restart(&self, flag: &TaskFlag) -> Result<String> {
		let mut reg = self.registry.write().await;
		let ids = reg.select(flag)?;
		let mut messages = Vec::with_capacity(ids.len());
		let mut result = Ok(());
		for id in ids {
			match restart_one(self, &mut reg, id) {
				Ok(()) => messages.push(format!("Task [{}] restarted", id)),
				Err(e) => {
					result = Err(e);
					break;
				}
			}
		}
		self.persist(&reg);
		result.map(|_| messages.join("\n"))
	}

	pub async fn remove(&self, flag: &TaskFlag) -> Result<String> {
		let mut reg = self.registry.write().await;
		let ids = reg.select(flag)?;
		let mut messages = Vec::with_capacity(ids.len());
		let mut result = Ok(());
		for id in ids {
			let running = reg
				.get(id)
				.is_some_and(|e| e.task.has_status(TaskStatus::Running));
			if running {
				result = Err(SupervisorError::InvalidState(format!(
					"Task [{}] is running",
					id
				)));
				break;
			}
			reg.remove(id);
			tracing::info!("task {} removed", id);
			messages.push(format!("Task [{}] removed", id));
		}
		self.persist(&reg);
		result.map(|_| messages.join("\n"))
	}

	pub async fn pause(&self, flag: &TaskFlag) -> Result<String> {
		self.transition(flag, "paused", |task| {
			periodic_only(task, "pause")?;
			match task.status {
				Some(TaskStatus::Interval) | Some(TaskStatus::Executing) => {
					Ok(TaskStatus::Paused)
				}
				_ => Err(SupervisorError::InvalidState(format!(
					"Task [{}] is not idle",
					task.id
				))),
			}
		})
		.await
	}

	pub async fn resume(&self, flag: &TaskFlag) -> Result<String> {
		self.transition(flag, "resumed", |task| {
			periodic_only(task, "resume")?;
			match task.status {
				Some(TaskStatus::Paused) => Ok(TaskStatus::Interval),
				_ => Err(SupervisorError::InvalidState(format!(
					"Task [{}] is not paused",
					task.id
				))),
			}
		})
		.await
	}

	pub async fn list(&self, flag: Option<&TaskFlag>) -> Result<Vec<Status>> {
		let reg = self.registry.read().await;
		match flag {
			None => Ok(reg.iter().map(|e| e.task.to_status()).collect()),
			Some(flag) => {
				let ids = reg.select(flag)?;
				Ok(statuses(&reg, &ids))
			}
		}
	}

	/// Status-only change for every selected task; all are validated before
	/// any is changed.
	async fn transition<F>(&self, flag: &TaskFlag, verb: &str, next: F) -> Result<String>
	where
		F: Fn(&Task) -> Result<TaskStatus>,
	{
		let mut reg = self.registry.write().await;
		let ids = reg.select(flag)?;
		let mut changes = Vec::with_capacity(ids.len());
		for &id in &ids {
			let entry = reg
				.get(id)
				.ok_or_else(|| SupervisorError::NotFound(id.to_string()))?;
			changes.push((id, next(&entry.task)?));
		}
		let mut messages = Vec::with_capacity(changes.len());
		for (id, status) in changes {
			if let Some(entry) = reg.get_mut(id) {
				entry.task.status = Some(status);
				messages.push(format!("Task [{}] {}", id, verb));
			}
		}
		self.persist(&reg);
		Ok(messages.join("\n"))
	}

	/// Spawn the task's process and attach a fresh exit watcher. Only an
	/// async task refuses to start while it is already running.
	pub(crate) fn launch(&self, reg: &mut Registry, id: u64) -> Result<u32> {
		let entry = reg
			.get_mut(id)
			.ok_or_else(|| SupervisorError::NotFound(id.to_string()))?;

		if matches!(entry.task.task_type, TaskType::Async(_))
			&& entry.task.has_status(TaskStatus::Running)
		{
			return Err(SupervisorError::InvalidState(format!(
				"Task [{}] is running",
				id
			)));
		}

		let child = process::spawn(&entry.task)?;
		let pid = child.id().ok_or_else(|| {
			SupervisorError::Io(format!("task {}: child exited before it was tracked", id))
		})?;

		entry.generation += 1;
		let watcher = watcher::spawn_watcher(child, id, entry.generation, pid, self.exits.clone());
		if let Some(previous) = entry.process.replace(ProcessHandle { pid, watcher }) {
			tracing::debug!("task {}: pid {} no longer tracked", id, previous.pid);
		}

		let now = now_secs();
		entry.task.pid = Some(pid);
		entry.task.code = None;
		let status = match &mut entry.task.task_type {
			TaskType::Async(a) => {
				a.started_at = now;
				TaskStatus::Running
			}
			TaskType::Periodic(p) => {
				p.last_run = now;
				TaskStatus::Executing
			}
			TaskType::Scheduled(_) => {
				entry.fired = true;
				TaskStatus::Processing
			}
		};
		entry.task.status = Some(status);
		tracing::info!("task {} started (pid {}, {})", id, pid, status);
		Ok(pid)
	}

	/// Apply an exit reported by a watcher. Exits from an earlier launch of
	/// the same entry only log.
	pub async fn handle_exit(&self, event: ExitEvent) -> Result<()> {
		let mut reg = self.registry.write().await;
		let entry = reg
			.get_mut(event.id)
			.ok_or_else(|| SupervisorError::NotFound(event.id.to_string()))?;

		if entry.generation != event.generation {
			tracing::debug!(
				"task {}: ignoring exit of superseded pid {}",
				event.id,
				event.pid
			);
			return Ok(());
		}

		entry.detach();
		entry.task.code = event.outcome.code;
		if let TaskType::Async(a) = &mut entry.task.task_type {
			a.stopped_at = now_secs();
		}
		match watcher::next_status(&entry.task.task_type, entry.task.status, &event.outcome) {
			Some(status) => {
				entry.task.status = Some(status);
				tracing::info!(
					"task {} (pid {}) exited with {:?}, now {}",
					event.id,
					event.pid,
					event.outcome.code,
					status
				);
			}
			None => tracing::debug!(
				"task {} (pid {}) exited while {:?}, status kept",
				event.id,
				event.pid,
				entry.task.status
			),
		}
		self.persist(&reg);
		Ok(())
	}

	/// Re-register tasks from a cache snapshot. Async tasks recorded as
	/// running get a fresh process; other states that imply a live process
	/// fall back to their idle state. Returns how many were relaunched.
	pub async fn restore(&self, tasks: Vec<Task>) -> usize {
		let mut reg = self.registry.write().await;
		let mut relaunched = 0;
		for mut task in tasks {
			let id = task.id;
			let was_running = task.has_status(TaskStatus::Running);
			task.pid = None;
			task.status = Some(restored_status(&task));
			if let Err(e) = reg.add(task) {
				tracing::warn!("cache: skipping task {}: {}", id, e);
				continue;
			}
			if was_running {
				match self.launch(&mut reg, id) {
					Ok(_) => relaunched += 1,
					Err(e) => tracing::warn!("cache: failed to relaunch task {}: {}", id, e),
				}
			}
		}
		self.persist(&reg);
		tracing::info!("restored {} tasks from cache, {} relaunched", reg.len(), relaunched);
		relaunched
	}

	pub(crate) fn persist(&self, reg: &Registry) {
		if let Some(cache) = &self.cache {
			cache.submit(reg.snapshot());
		}
	}
}

async fn run_exit_reactor(supervisor: Weak<Supervisor>, mut exits: UnboundedReceiver<ExitEvent>) {
	while let Some(event) = exits.recv().await {
		let Some(supervisor) = supervisor.upgrade() else {
			return;
		};
		let id = event.id;
		if let Err(e) = supervisor.handle_exit(event).await {
			tracing::warn!("task {}: exit not applied: {}", id, e);
		}
	}
}

fn insert(reg: &mut Registry, mut task: Task) -> Result<()> {
	task.status = Some(task.initial_status());
	task.pid = None;
	reg.add(task)?;
	Ok(())
}

fn stop_one(reg: &mut Registry, id: u64) -> Result<()> {
	let entry = reg
		.get_mut(id)
		.ok_or_else(|| SupervisorError::NotFound(id.to_string()))?;
	match entry.task.status {
		Some(TaskStatus::Running) => {
			let pid = entry.task.pid.ok_or_else(|| {
				SupervisorError::InvalidState(format!("Task [{}] has no process", id))
			})?;
			process::terminate(pid)?;
			tracing::info!("task {}: sent SIGTERM to pid {}", id, pid);
		}
		Some(TaskStatus::AutoRestart) => {}
		_ => {
			return Err(SupervisorError::InvalidState(format!(
				"Task [{}] is not running",
				id
			)))
		}
	}
	entry.detach();
	entry.task.status = Some(TaskStatus::Stopped);
	Ok(())
}

fn restart_one(supervisor: &Supervisor, reg: &mut Registry, id: u64) -> Result<()> {
	match stop_one(reg, id) {
		Ok(()) | Err(SupervisorError::InvalidState(_)) => {}
		Err(e) => return Err(e),
	}
	if let Some(TaskType::Async(a)) = reg.get_mut(id).map(|e| &mut e.task.task_type) {
		a.has_restart = 0;
	}
	supervisor.launch(reg, id)?;
	Ok(())
}

fn periodic_only(task: &Task, op: &str) -> Result<()> {
	match task.task_type {
		TaskType::Periodic(_) => Ok(()),
		_ => Err(SupervisorError::Unsupported(format!(
			"{} is only available for periodic tasks",
			op
		))),
	}
}

fn restored_status(task: &Task) -> TaskStatus {
	match (&task.task_type, task.status) {
		// Relaunched right after insertion.
		(_, Some(TaskStatus::Running)) => TaskStatus::Stopped,
		(TaskType::Async(a), Some(TaskStatus::AutoRestart)) => {
			if a.max_restart.is_some_and(|max| a.has_restart < max) {
				TaskStatus::AutoRestart
			} else {
				TaskStatus::Stopped
			}
		}
		(_, Some(TaskStatus::Executing)) => TaskStatus::Interval,
		(_, Some(TaskStatus::Processing)) => TaskStatus::Waiting,
		(_, Some(status)) => status,
		(_, None) => task.initial_status(),
	}
}

fn statuses(reg: &Registry, ids: &[u64]) -> Vec<Status> {
	ids.iter()
		.filter_map(|id| reg.get(*id))
		.map(|e| e.task.to_status())
		.collect()
}
