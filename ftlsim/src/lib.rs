//! SSD flash translation layer simulator (`ftlsim`)

// Modules
pub mod config;
pub mod data;
pub mod error;
pub mod flash;
pub mod ftl;
pub mod gc;
pub mod metrics;
pub mod oob;
pub mod queue;
pub mod request;
pub mod sim;
pub mod ssd;
pub mod trace;

// Exports
pub use self::{
	config::Config,
	error::{ConfigError, FlashError, FtlError, RunError},
	ftl::{Ftl, Location, Strategy},
	metrics::{Metrics, MetricsSnapshot},
	request::{Completion, CompletionSink, Op, Request},
	sim::{Diagnostics, RunOutput, Simulator},
	ssd::Ssd,
	trace::{TraceReader, TraceWriter},
};
