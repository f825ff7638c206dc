//! Output data

// Imports
use {
	crate::{metrics::MetricsSnapshot, request::Completion},
	std::ops::Range,
};

/// Output data
#[derive(Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(bincode::Encode, bincode::Decode)]
pub struct Output {
	/// Time span of the request arrivals
	pub time_span: Option<Range<u64>>,

	/// Metrics
	pub metrics: MetricsSnapshot,

	/// Per-request completions, if recorded
	pub completions: Option<Vec<Completion>>,
}
