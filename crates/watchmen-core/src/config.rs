use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
	#[serde(default)]
	pub watchmen: WatchmenConfig,
	#[serde(default)]
	pub sock: SockConfig,
	#[serde(default)]
	pub socket: SocketConfig,
	#[serde(default)]
	pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchmenConfig {
	#[serde(default = "default_engines")]
	pub engines: Vec<Engine>,
	pub log_dir: Option<String>,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	#[serde(default = "default_cache")]
	pub cache: String,
	/// Monitor period in seconds.
	#[serde(default = "default_interval")]
	pub interval: u64,
}

impl Default for WatchmenConfig {
	fn default() -> Self {
		Self {
			engines: default_engines(),
			log_dir: None,
			log_level: default_log_level(),
			cache: default_cache(),
			interval: default_interval(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
	Sock,
	Socket,
	Http,
}

fn default_engines() -> Vec<Engine> {
	vec![Engine::Sock]
}
fn default_log_level() -> String {
	"info".to_string()
}
fn default_cache() -> String {
	"~/.watchmen/cache.json".to_string()
}
fn default_interval() -> u64 {
	5
}

#[derive(Debug, Clone, Deserialize)]
pub struct SockConfig {
	#[serde(default = "default_sock_path")]
	pub path: String,
}

impl Default for SockConfig {
	fn default() -> Self {
		Self {
			path: default_sock_path(),
		}
	}
}

fn default_sock_path() -> String {
	"~/.watchmen/watchmen.sock".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
	#[serde(default = "default_host")]
	pub host: String,
	#[serde(default = "default_socket_port")]
	pub port: u16,
}

impl Default for SocketConfig {
	fn default() -> Self {
		Self {
			host: default_host(),
			port: default_socket_port(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
	#[serde(default = "default_host")]
	pub host: String,
	#[serde(default = "default_http_port")]
	pub port: u16,
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self {
			host: default_host(),
			port: default_http_port(),
		}
	}
}

fn default_host() -> String {
	"127.0.0.1".to_string()
}
fn default_socket_port() -> u16 {
	1949
}
fn default_http_port() -> u16 {
	1997
}

impl GlobalConfig {
	pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
		let mut config: GlobalConfig = toml::from_str(content)?;
		let level = config.watchmen.log_level.to_ascii_lowercase();
		config.watchmen.log_level = match level.as_str() {
			"debug" | "info" | "warn" | "error" => level,
			_ => default_log_level(),
		};
		if config.watchmen.interval == 0 {
			config.watchmen.interval = default_interval();
		}
		Ok(config)
	}

	pub fn has_engine(&self, engine: Engine) -> bool {
		self.watchmen.engines.contains(&engine)
	}

	pub fn cache_path(&self) -> PathBuf {
		expand_home(&self.watchmen.cache)
	}

	pub fn sock_path(&self) -> PathBuf {
		expand_home(&self.sock.path)
	}

	pub fn log_dir(&self) -> Option<PathBuf> {
		self.watchmen.log_dir.as_deref().map(expand_home)
	}
}

pub fn default_config_path() -> PathBuf {
	home_dir()
		.unwrap_or_else(|| PathBuf::from("/tmp"))
		.join(".watchmen")
		.join("config.toml")
}

/// Load the daemon config; a missing or broken file falls back to defaults.
pub fn load_global_config(path: Option<&Path>) -> GlobalConfig {
	let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
	if path.exists() {
		match std::fs::read_to_string(&path) {
			Ok(content) => match GlobalConfig::parse(&content) {
				Ok(config) => return config,
				Err(e) => eprintln!("warning: failed to parse {}: {}", path.display(), e),
			},
			Err(e) => eprintln!("warning: failed to read {}: {}", path.display(), e),
		}
	}
	GlobalConfig::default()
}

/// Expand a leading `$HOME` or `~`.
pub fn expand_home(path: &str) -> PathBuf {
	let rest = path
		.strip_prefix("$HOME")
		.or_else(|| path.strip_prefix('~'));
	match (rest, home_dir()) {
		(Some(rest), Some(home)) => home.join(rest.trim_start_matches('/')),
		_ => PathBuf::from(path),
	}
}

fn home_dir() -> Option<PathBuf> {
	std::env::var("HOME").ok().map(PathBuf::from)
}
