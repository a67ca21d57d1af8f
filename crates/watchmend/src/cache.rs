use std::path::PathBuf;
use tokio::sync::mpsc;
use watchmen_core::types::Task;

use crate::error::{Result, SupervisorError};

/// On-disk snapshot of the registry: a JSON array of tasks.
#[derive(Debug, Clone)]
pub struct Cache {
	path: PathBuf,
}

impl Cache {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub async fn load(&self) -> Result<Vec<Task>> {
		let content = tokio::fs::read(&self.path)
			.await
			.map_err(|e| SupervisorError::Io(format!("{}: {}", self.path.display(), e)))?;
		Ok(serde_json::from_slice(&content)?)
	}

	/// Write the full snapshot to a sibling temp file, then rename it over
	/// the cache so readers never see a partial file.
	pub async fn write(&self, tasks: &[Task]) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		let data = serde_json::to_vec(tasks)?;
		let mut tmp = self.path.clone().into_os_string();
		tmp.push(".tmp");
		tokio::fs::write(&tmp, data).await?;
		tokio::fs::rename(&tmp, &self.path).await?;
		Ok(())
	}

	/// Move the cache onto its own writer task and return the handle used to
	/// queue snapshots.
	pub fn spawn_writer(self) -> CacheWriter {
		let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Task>>();
		tokio::spawn(async move {
			while let Some(mut snapshot) = rx.recv().await {
				// Only the newest queued snapshot matters.
				while let Ok(newer) = rx.try_recv() {
					snapshot = newer;
				}
				if let Err(e) = self.write(&snapshot).await {
					tracing::warn!("cache write to {} failed: {}", self.path.display(), e);
				}
			}
		});
		CacheWriter { tx }
	}
}

/// Fire-and-forget handle to the cache writer task.
#[derive(Debug, Clone)]
pub struct CacheWriter {
	tx: mpsc::UnboundedSender<Vec<Task>>,
}

impl CacheWriter {
	pub fn submit(&self, snapshot: Vec<Task>) {
		if self.tx.send(snapshot).is_err() {
			tracing::warn!("cache writer is gone, snapshot dropped");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use watchmen_core::types::{ScheduledTask, TaskStatus, TaskType};

	fn task(id: u64) -> Task {
		Task {
			id,
			name: format!("t{}", id),
			group: None,
			command: "/bin/true".into(),
			args: vec![],
			dir: None,
			env: HashMap::new(),
			stdin: None,
			stdout: None,
			stderr: None,
			created_at: 0,
			task_type: TaskType::Scheduled(ScheduledTask {
				hour: Some(3),
				..ScheduledTask::default()
			}),
			pid: None,
			status: Some(TaskStatus::Waiting),
			code: None,
		}
	}

	fn temp_path(name: &str) -> PathBuf {
		std::env::temp_dir()
			.join(format!("watchmend-cache-{}-{}", std::process::id(), name))
			.join("cache.json")
	}

	#[tokio::test]
	async fn write_then_load() {
		let path = temp_path("roundtrip");
		let cache = Cache::new(&path);
		cache.write(&[task(1), task(2)]).await.unwrap();
		let loaded = cache.load().await.unwrap();
		assert_eq!(loaded, vec![task(1), task(2)]);
		let _ = std::fs::remove_dir_all(path.parent().unwrap());
	}

	#[tokio::test]
	async fn missing_file_is_an_error() {
		let cache = Cache::new(temp_path("missing"));
		assert!(matches!(cache.load().await, Err(SupervisorError::Io(_))));
	}

	#[tokio::test]
	async fn garbage_is_an_error() {
		let path = temp_path("garbage");
		std::fs::create_dir_all(path.parent().unwrap()).unwrap();
		std::fs::write(&path, "not json").unwrap();
		assert!(Cache::new(&path).load().await.is_err());
		let _ = std::fs::remove_dir_all(path.parent().unwrap());
	}

	#[tokio::test]
	async fn writer_lands_last_snapshot() {
		let path = temp_path("writer");
		let writer = Cache::new(&path).spawn_writer();
		writer.submit(vec![task(1)]);
		writer.submit(vec![task(1), task(2)]);

		let cache = Cache::new(&path);
		let mut loaded = Vec::new();
		for _ in 0..50 {
			tokio::time::sleep(std::time::Duration::from_millis(20)).await;
			if let Ok(tasks) = cache.load().await {
				loaded = tasks;
				if loaded.len() == 2 {
					break;
				}
			}
		}
		assert_eq!(loaded.len(), 2);
		let _ = std::fs::remove_dir_all(path.parent().unwrap());
	}
}
