use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinSet;
use watchmen_core::config::{self, Engine, GlobalConfig};
use watchmend::{monitor, server, Cache, Supervisor};

#[derive(Debug, Parser)]
#[command(name = "watchmend", version, about = "Watchmen process supervisor daemon")]
struct Args {
	/// Config file (default: $HOME/.watchmen/config.toml)
	#[arg(short, long)]
	config: Option<PathBuf>,
	/// Resume the tasks recorded in the cache file
	#[arg(short, long)]
	load: bool,
}

#[tokio::main]
async fn main() {
	let args = Args::parse();
	let global_config = config::load_global_config(args.config.as_deref());
	init_logging(&global_config);

	let cache = Cache::new(global_config.cache_path());
	let recovered = if args.load {
		match cache.load().await {
			Ok(tasks) => tasks,
			Err(e) => {
				tracing::warn!("cache not loaded, starting empty: {}", e);
				Vec::new()
			}
		}
	} else {
		Vec::new()
	};

	let supervisor = Supervisor::new(Some(cache.spawn_writer()));
	if !recovered.is_empty() {
		supervisor.restore(recovered).await;
	}

	let socket_path = global_config.sock_path();
	let pid_path = socket_path.with_file_name("watchmend.pid");
	if let Some(parent) = pid_path.parent() {
		let _ = std::fs::create_dir_all(parent);
	}
	let _ = std::fs::write(&pid_path, std::process::id().to_string());

	let period = Duration::from_secs(global_config.watchmen.interval);
	tokio::spawn(monitor::run_monitor(supervisor.clone(), period));

	let mut servers = JoinSet::new();
	if global_config.has_engine(Engine::Sock) {
		let sup = supervisor.clone();
		let path = socket_path.clone();
		servers.spawn(async move { server::run_sock_server(sup, &path).await });
	}
	if global_config.has_engine(Engine::Socket) {
		let sup = supervisor.clone();
		let addr = format!("{}:{}", global_config.socket.host, global_config.socket.port);
		servers.spawn(async move { server::run_tcp_server(sup, &addr).await });
	}
	if global_config.has_engine(Engine::Http) {
		let sup = supervisor.clone();
		let addr = format!("{}:{}", global_config.http.host, global_config.http.port);
		servers.spawn(async move { server::run_http_server(sup, &addr).await });
	}

	if servers.is_empty() {
		tracing::error!("no engines configured, nothing to serve");
	} else {
		tracing::info!("daemon started (pid {})", std::process::id());
		tokio::select! {
			_ = servers.join_next() => {
				tracing::error!("a listener stopped, shutting down");
			},
			_ = tokio::signal::ctrl_c() => {
				tracing::info!("shutting down");
			}
		}
	}

	let _ = std::fs::remove_file(&socket_path);
	let _ = std::fs::remove_file(&pid_path);
}

fn init_logging(config: &GlobalConfig) {
	let level: tracing::Level = config
		.watchmen
		.log_level
		.parse()
		.unwrap_or(tracing::Level::INFO);

	let file = config.log_dir().and_then(|dir| {
		let _ = std::fs::create_dir_all(&dir);
		let path = dir.join("watchmen.log");
		match OpenOptions::new().create(true).append(true).open(&path) {
			Ok(f) => Some(f),
			Err(e) => {
				eprintln!("warning: cannot open {}: {}", path.display(), e);
				None
			}
		}
	});

	match file {
		Some(file) => tracing_subscriber::fmt()
			.with_max_level(level)
			.with_ansi(false)
			.with_writer(Mutex::new(file))
			.init(),
		None => tracing_subscriber::fmt().with_max_level(level).init(),
	}
}
