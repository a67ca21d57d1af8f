//! # watchmend
//!
//! Task-supervision engine of the watchmen daemon.
//!
//! A [`Supervisor`] owns the task registry and implements the command set
//! (add, run, reload, start, stop, restart, remove, pause, resume, list).
//! Each launched process gets an exit watcher that reports back over a
//! channel, a monitor loop relaunches tasks whose policy says they are due,
//! and every mutation queues a snapshot for the on-disk cache used to resume
//! after a daemon restart.
//!
//! ```rust,no_run
//! use watchmend::{Cache, Supervisor, TaskFlag};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cache = Cache::new("/tmp/watchmen/cache.json");
//! let sup = Supervisor::new(Some(cache.spawn_writer()));
//! tokio::spawn(watchmend::monitor::run_monitor(
//! 	sup.clone(),
//! 	std::time::Duration::from_secs(5),
//! ));
//! let statuses = sup.list(None).await.unwrap();
//! # let _ = (statuses, TaskFlag::by_id(1));
//! # }
//! ```

pub mod cache;
pub mod dispatch;
pub mod error;
pub mod monitor;
pub mod process;
pub mod registry;
pub mod server;
pub mod supervisor;
pub mod watcher;

pub use cache::{Cache, CacheWriter};
pub use error::SupervisorError;
pub use supervisor::Supervisor;
pub use watchmen_core::types::*;
