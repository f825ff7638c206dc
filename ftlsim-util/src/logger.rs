//! Logger
//!
//! Logs to `stderr`, filtered by `RUST_LOG` (defaults to `info`), and
//! optionally to a file, filtered by `RUST_LOG_FILE` (defaults to `debug`).

// Imports
use {
	std::{fs, io, path::Path, sync::Mutex},
	tracing_subscriber::{fmt, prelude::*, EnvFilter},
};

/// Initializes the global logger.
///
/// Any messages logged through [`pre_init`] are emitted right after.
///
/// # Panics
/// Panics if a global logger was already set.
pub fn init(log_file: Option<&Path>, log_file_append: bool) {
	let term_layer = fmt::layer()
		.with_writer(io::stderr)
		.with_filter(self::env_filter("RUST_LOG", "info"));

	let file_layer = log_file.and_then(|log_file| {
		let file = fs::OpenOptions::new()
			.create(true)
			.write(true)
			.append(log_file_append)
			.truncate(!log_file_append)
			.open(log_file);

		match file {
			Ok(file) => Some(
				fmt::layer()
					.with_ansi(false)
					.with_writer(Mutex::new(file))
					.with_filter(self::env_filter("RUST_LOG_FILE", "debug")),
			),
			Err(err) => {
				pre_init::warn(format!("Unable to open log file {log_file:?}: {err}"));
				None
			},
		}
	});

	tracing_subscriber::registry().with(term_layer).with(file_layer).init();

	pre_init::flush();
}

/// Creates an env filter from `var`, or `default` if unset or invalid
fn env_filter(var: &str, default: &str) -> EnvFilter {
	EnvFilter::try_from_env(var).unwrap_or_else(|_| EnvFilter::new(default))
}

/// Messages logged before the logger is initialized
pub mod pre_init {
	// Imports
	use std::sync::Mutex;

	/// Message level
	#[derive(Clone, Copy, Debug)]
	enum Level {
		Debug,
		Warn,
	}

	/// Pending messages
	static MESSAGES: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());

	/// Queues a debug message
	pub fn debug(msg: impl Into<String>) {
		self::push(Level::Debug, msg.into());
	}

	/// Queues a warning message
	pub fn warn(msg: impl Into<String>) {
		self::push(Level::Warn, msg.into());
	}

	fn push(level: Level, msg: String) {
		// Note: A poisoned lock only means another thread panicked mid-push,
		//       the messages themselves are still fine.
		MESSAGES.lock().unwrap_or_else(|err| err.into_inner()).push((level, msg));
	}

	/// Emits all pending messages through `tracing`
	pub(super) fn flush() {
		let messages = std::mem::take(&mut *MESSAGES.lock().unwrap_or_else(|err| err.into_inner()));
		for (level, msg) in messages {
			match level {
				Level::Debug => tracing::debug!("{msg}"),
				Level::Warn => tracing::warn!("{msg}"),
			}
		}
	}
}
