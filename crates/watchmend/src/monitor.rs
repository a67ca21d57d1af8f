use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use std::sync::Arc;
use std::time::{Duration, Instant};
use watchmen_core::types::{ScheduledTask, TaskStatus, TaskType};

use crate::registry::Entry;
use crate::supervisor::Supervisor;

/// Absolute moment a scheduled task targets, with unset fields taken from
/// `now`. `None` when the fields name no valid local time.
pub fn scheduled_target(schedule: &ScheduledTask, now: DateTime<Local>) -> Option<DateTime<Local>> {
	Local
		.with_ymd_and_hms(
			schedule.year.unwrap_or(now.year()),
			schedule.month.unwrap_or(now.month()),
			schedule.day.unwrap_or(now.day()),
			schedule.hour.unwrap_or(now.hour()),
			schedule.minute.unwrap_or(now.minute()),
			schedule.second.unwrap_or(now.second()),
		)
		.earliest()
}

/// Whether the monitor should launch this entry on the current tick.
pub fn is_due(entry: &Entry, now: DateTime<Local>, window: Duration) -> bool {
	let status = entry.task.status;
	match &entry.task.task_type {
		TaskType::Async(_) => status == Some(TaskStatus::AutoRestart),
		TaskType::Periodic(periodic) => {
			let now_secs = u64::try_from(now.timestamp()).unwrap_or(0);
			if !periodic.is_due(now_secs) {
				return false;
			}
			match status {
				Some(TaskStatus::Interval) => true,
				Some(TaskStatus::Executing) => periodic.sync,
				_ => false,
			}
		}
		TaskType::Scheduled(schedule) => {
			if entry.fired || status != Some(TaskStatus::Waiting) {
				return false;
			}
			let Some(target) = scheduled_target(schedule, now) else {
				tracing::debug!("task {}: schedule names no valid time", entry.task.id);
				return false;
			};
			// Past targets only; the residual wait is therefore zero.
			let late = now.signed_duration_since(target);
			late >= chrono::Duration::zero()
				&& late.to_std().is_ok_and(|late| late < window)
		}
	}
}

impl Supervisor {
	/// One monitor pass: launch every entry that is due. Inspection and
	/// launch happen under one registry lock. Returns the launched ids.
	pub async fn tick(&self, window: Duration) -> Vec<u64> {
		let now = Local::now();
		let mut reg = self.registry.write().await;
		let due: Vec<u64> = reg
			.iter()
			.filter(|e| is_due(e, now, window))
			.map(|e| e.task.id)
			.collect();

		let mut launched = Vec::with_capacity(due.len());
		for id in due {
			let relaunch = reg
				.get(id)
				.is_some_and(|e| e.task.has_status(TaskStatus::AutoRestart));
			if relaunch {
				if let Some(TaskType::Async(a)) = reg.get_mut(id).map(|e| &mut e.task.task_type) {
					a.has_restart += 1;
				}
			}
			match self.launch(&mut reg, id) {
				Ok(_) => launched.push(id),
				Err(e) => {
					tracing::error!("task {}: monitor launch failed: {}", id, e);
					if relaunch {
						if let Some(entry) = reg.get_mut(id) {
							entry.task.status = Some(TaskStatus::Stopped);
						}
					}
				}
			}
		}
		if !launched.is_empty() {
			self.persist(&reg);
		}
		launched
	}
}

const TICK_SLACK: Duration = Duration::from_secs(1);

/// How far back a tick looks for scheduled targets: the time since the
/// previous tick (at least one period) plus slack, so a target that falls
/// between two late ticks is still caught. The `fired` flag keeps the
/// overlap from launching anything twice.
pub fn tick_window(period: Duration, since_last: Option<Duration>) -> Duration {
	since_last.map_or(period, |gap| gap.max(period)) + TICK_SLACK
}

/// Run the monitor forever with a fixed period. A tick that overruns the
/// period is followed immediately by the next one; missed ticks are not
/// replayed.
pub async fn run_monitor(supervisor: Arc<Supervisor>, period: Duration) {
	tracing::info!("monitor running every {:?}", period);
	let mut previous: Option<Instant> = None;
	loop {
		let started = Instant::now();
		let window = tick_window(period, previous.map(|p| started.duration_since(p)));
		previous = Some(started);
		let launched = supervisor.tick(window).await;
		if !launched.is_empty() {
			tracing::debug!("monitor launched {:?}", launched);
		}
		tokio::time::sleep(period.saturating_sub(started.elapsed())).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use watchmen_core::types::{AsyncTask, PeriodicTask, Task};

	const WINDOW: Duration = Duration::from_secs(5);

	fn entry(task_type: TaskType, status: TaskStatus) -> Entry {
		let task = Task {
			id: 1,
			name: "t".into(),
			group: None,
			command: "/bin/true".into(),
			args: vec![],
			dir: None,
			env: HashMap::new(),
			stdin: None,
			stdout: None,
			stderr: None,
			created_at: 0,
			task_type,
			pid: None,
			status: Some(status),
			code: None,
		};
		Entry::new(task)
	}

	fn periodic(sync: bool, last_run: u64) -> TaskType {
		TaskType::Periodic(PeriodicTask {
			started_after: 0,
			interval: 60,
			last_run,
			sync,
		})
	}

	fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
		Local.with_ymd_and_hms(y, mo, d, h, mi, s).earliest().unwrap()
	}

	#[test]
	fn unset_fields_follow_now() {
		let now = at(2026, 3, 14, 15, 9, 26);
		let target = scheduled_target(&ScheduledTask::default(), now).unwrap();
		assert_eq!(target, now);

		let schedule = ScheduledTask {
			hour: Some(1),
			minute: Some(2),
			..ScheduledTask::default()
		};
		assert_eq!(scheduled_target(&schedule, now).unwrap(), at(2026, 3, 14, 1, 2, 26));
	}

	#[test]
	fn impossible_date_has_no_target() {
		let schedule = ScheduledTask {
			month: Some(2),
			day: Some(30),
			..ScheduledTask::default()
		};
		assert!(scheduled_target(&schedule, at(2026, 1, 1, 0, 0, 0)).is_none());
	}

	#[test]
	fn auto_restart_is_due() {
		let tt = TaskType::Async(AsyncTask {
			max_restart: Some(2),
			has_restart: 0,
			started_at: 0,
			stopped_at: 0,
		});
		let now = Local::now();
		assert!(is_due(&entry(tt.clone(), TaskStatus::AutoRestart), now, WINDOW));
		assert!(!is_due(&entry(tt.clone(), TaskStatus::Stopped), now, WINDOW));
		assert!(!is_due(&entry(tt, TaskStatus::Added), now, WINDOW));
	}

	#[test]
	fn periodic_overlap_only_with_sync() {
		let now = Local::now();
		assert!(is_due(&entry(periodic(false, 0), TaskStatus::Interval), now, WINDOW));
		assert!(!is_due(&entry(periodic(false, 0), TaskStatus::Executing), now, WINDOW));
		assert!(is_due(&entry(periodic(true, 0), TaskStatus::Executing), now, WINDOW));
		assert!(!is_due(&entry(periodic(true, 0), TaskStatus::Paused), now, WINDOW));
	}

	#[test]
	fn periodic_waits_for_interval() {
		let now = Local::now();
		let last_run = u64::try_from(now.timestamp()).unwrap() - 10;
		assert!(!is_due(&entry(periodic(false, last_run), TaskStatus::Interval), now, WINDOW));
	}

	#[test]
	fn scheduled_fires_inside_window_only() {
		let now = at(2026, 3, 14, 15, 9, 26);
		let exact = TaskType::Scheduled(ScheduledTask {
			year: Some(2026),
			month: Some(3),
			day: Some(14),
			hour: Some(15),
			minute: Some(9),
			second: Some(23),
		});
		assert!(is_due(&entry(exact.clone(), TaskStatus::Waiting), now, WINDOW));
		assert!(!is_due(&entry(exact.clone(), TaskStatus::Processing), now, WINDOW));

		let later = now + chrono::Duration::seconds(30);
		assert!(!is_due(&entry(exact.clone(), TaskStatus::Waiting), later, WINDOW));

		let earlier = now - chrono::Duration::seconds(10);
		assert!(!is_due(&entry(exact, TaskStatus::Waiting), earlier, WINDOW));
	}

	#[test]
	fn window_covers_late_ticks() {
		let period = Duration::from_secs(5);
		assert_eq!(tick_window(period, None), Duration::from_secs(6));
		assert_eq!(tick_window(period, Some(Duration::from_secs(2))), Duration::from_secs(6));
		let late = Duration::from_millis(5_200);
		assert_eq!(tick_window(period, Some(late)), Duration::from_millis(6_200));

		// Target just missed by the previous tick, next tick arrives late.
		let target = at(2026, 3, 14, 15, 9, 26);
		let exact = TaskType::Scheduled(ScheduledTask {
			year: Some(2026),
			month: Some(3),
			day: Some(14),
			hour: Some(15),
			minute: Some(9),
			second: Some(26),
		});
		let now = target + chrono::Duration::milliseconds(5_195);
		assert!(!is_due(&entry(exact.clone(), TaskStatus::Waiting), now, period));
		assert!(is_due(&entry(exact, TaskStatus::Waiting), now, tick_window(period, Some(late))));
	}

	#[test]
	fn scheduled_fires_once() {
		let tt = TaskType::Scheduled(ScheduledTask::default());
		let mut e = entry(tt, TaskStatus::Waiting);
		assert!(is_due(&e, Local::now(), WINDOW));
		e.fired = true;
		assert!(!is_due(&e, Local::now(), WINDOW));
	}
}
