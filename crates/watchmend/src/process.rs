use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};
use watchmen_core::types::Task;

use crate::error::{Result, SupervisorError};

/// Spawn the task's command in its own process group.
///
/// The environment is the daemon's own, overlaid with `task.env`. Output
/// streams go to the configured files in append mode or are discarded.
pub fn spawn(task: &Task) -> Result<Child> {
	let mut cmd = Command::new(&task.command);
	cmd.args(&task.args)
		.envs(&task.env)
		.process_group(0)
		.stdin(if task.stdin == Some(true) {
			Stdio::piped()
		} else {
			Stdio::null()
		})
		.stdout(redirect(task.stdout.as_deref())?)
		.stderr(redirect(task.stderr.as_deref())?);

	if let Some(dir) = task.dir.as_deref().filter(|d| !d.is_empty()) {
		cmd.current_dir(dir);
	}

	cmd.spawn().map_err(|e| {
		SupervisorError::Io(format!("failed to spawn {}: {}", task.command, e))
	})
}

fn redirect(path: Option<&str>) -> Result<Stdio> {
	match path.filter(|p| !p.is_empty()) {
		Some(path) => Ok(Stdio::from(open_append(Path::new(path))?)),
		None => Ok(Stdio::null()),
	}
}

fn open_append(path: &Path) -> Result<File> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	OpenOptions::new()
		.create(true)
		.append(true)
		.open(path)
		.map_err(|e| SupervisorError::Io(format!("{}: {}", path.display(), e)))
}

/// Send one SIGTERM to the process group led by `pid`. A group that is
/// already gone is not an error.
pub fn terminate(pid: u32) -> Result<()> {
	use nix::errno::Errno;
	use nix::sys::signal::{killpg, Signal};
	use nix::unistd::Pid;

	let pgid = i32::try_from(pid)
		.map_err(|_| SupervisorError::Io(format!("pid {} out of range", pid)))?;
	match killpg(Pid::from_raw(pgid), Signal::SIGTERM) {
		Ok(()) | Err(Errno::ESRCH) => Ok(()),
		Err(e) => Err(e.into()),
	}
}
