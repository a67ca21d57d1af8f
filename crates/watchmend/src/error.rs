use std::io;

/// Failure of a supervisor operation. The dispatcher turns every variant
/// into a `failed` response carrying the `Display` text.
#[derive(Debug)]
pub enum SupervisorError {
	/// A task with this id is already registered.
	Conflict(u64),
	/// No task matches the id, name or group.
	NotFound(String),
	/// The task's current status does not allow the operation.
	InvalidState(String),
	/// The selector is empty or its name pattern does not compile.
	BadSelector(String),
	/// Task type and operation combination that is not implemented.
	Unsupported(String),
	/// Spawn, signal or cache file failure.
	Io(String),
}

impl std::fmt::Display for SupervisorError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SupervisorError::Conflict(id) => write!(f, "Task [{}] already exists", id),
			SupervisorError::NotFound(what) => write!(f, "Task [{}] not exists", what),
			SupervisorError::InvalidState(msg) => write!(f, "{}", msg),
			SupervisorError::BadSelector(msg) => write!(f, "bad selector: {}", msg),
			SupervisorError::Unsupported(msg) => write!(f, "unsupported: {}", msg),
			SupervisorError::Io(msg) => write!(f, "io error: {}", msg),
		}
	}
}

impl std::error::Error for SupervisorError {}

impl From<io::Error> for SupervisorError {
	fn from(e: io::Error) -> Self {
		SupervisorError::Io(e.to_string())
	}
}

impl From<nix::Error> for SupervisorError {
	fn from(e: nix::Error) -> Self {
		SupervisorError::Io(e.to_string())
	}
}

impl From<serde_json::Error> for SupervisorError {
	fn from(e: serde_json::Error) -> Self {
		SupervisorError::Io(e.to_string())
	}
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
