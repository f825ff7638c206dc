//! Metrics collector

// Imports
use {
	crate::{flash::Flash, ftl::Strategy},
	itertools::Itertools,
};

/// Event counters.
///
/// All counters only ever increase during a run, so the cost of a single
/// request is the difference between the counters after and before it.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct Counters {
	// Logical pages requested by the host
	pub logical_pages_read:      u64,
	pub logical_pages_written:   u64,
	pub logical_pages_discarded: u64,

	/// Pages written on behalf of host writes
	pub host_pages_written: u64,

	/// Pages copied by garbage collection or merges
	pub pages_moved: u64,

	// Translation pages
	pub translation_pages_read:    u64,
	pub translation_pages_written: u64,

	/// All physical page reads
	pub physical_pages_read: u64,

	/// Block erases
	pub erases: u64,

	/// Garbage collection passes
	pub gc_runs: u64,

	// Translation cache
	pub cache_hits:      u64,
	pub cache_misses:    u64,
	pub cache_evictions: u64,
	pub dirty_evictions: u64,

	// Merges
	pub full_merges:   u64,
	pub switch_merges: u64,

	/// Reads of unmapped logical pages
	pub unmapped_reads: u64,
}

impl Counters {
	/// Returns the total number of physical pages written
	#[must_use]
	pub fn physical_pages_written(&self) -> u64 {
		self.host_pages_written + self.translation_pages_written + self.pages_moved
	}

	/// Returns the counters accumulated since `earlier`
	#[must_use]
	pub fn since(&self, earlier: &Self) -> Self {
		Self {
			logical_pages_read:        self.logical_pages_read - earlier.logical_pages_read,
			logical_pages_written:     self.logical_pages_written - earlier.logical_pages_written,
			logical_pages_discarded:   self.logical_pages_discarded - earlier.logical_pages_discarded,
			host_pages_written:        self.host_pages_written - earlier.host_pages_written,
			pages_moved:               self.pages_moved - earlier.pages_moved,
			translation_pages_read:    self.translation_pages_read - earlier.translation_pages_read,
			translation_pages_written: self.translation_pages_written - earlier.translation_pages_written,
			physical_pages_read:       self.physical_pages_read - earlier.physical_pages_read,
			erases:                    self.erases - earlier.erases,
			gc_runs:                   self.gc_runs - earlier.gc_runs,
			cache_hits:                self.cache_hits - earlier.cache_hits,
			cache_misses:              self.cache_misses - earlier.cache_misses,
			cache_evictions:           self.cache_evictions - earlier.cache_evictions,
			dirty_evictions:           self.dirty_evictions - earlier.dirty_evictions,
			full_merges:               self.full_merges - earlier.full_merges,
			switch_merges:             self.switch_merges - earlier.switch_merges,
			unmapped_reads:            self.unmapped_reads - earlier.unmapped_reads,
		}
	}
}

/// Metrics collector
#[derive(Clone, Debug, Default)]
pub struct Metrics {
	/// Counters
	pub counters: Counters,

	/// Completion latency of every request, in order
	latencies: Vec<u64>,

	/// Number of requests dispatched at each queue depth
	queue_depths: Vec<u64>,
}

impl Metrics {
	/// Creates empty metrics
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a request's completion latency
	pub fn register_latency(&mut self, latency: u64) {
		self.latencies.push(latency);
	}

	/// Registers the queue depth a request was dispatched at
	pub fn register_queue_depth(&mut self, depth: usize) {
		if self.queue_depths.len() <= depth {
			self.queue_depths.resize(depth + 1, 0);
		}
		self.queue_depths[depth] += 1;
	}

	/// Returns all latencies
	pub fn latencies(&self) -> &[u64] {
		&self.latencies
	}

	/// Returns the highest queue depth observed
	pub fn max_queue_depth(&self) -> usize {
		self.queue_depths.iter().rposition(|&count| count != 0).unwrap_or(0)
	}

	/// Returns the write amplification, if anything was written
	pub fn write_amplification(&self) -> Option<f64> {
		let logical = self.counters.logical_pages_written;
		(logical != 0).then(|| self.counters.physical_pages_written() as f64 / logical as f64)
	}

	/// Creates a snapshot of these metrics.
	///
	/// Strategy-specific sections are only filled for `strategy`.
	pub fn snapshot(&self, strategy: Strategy, flash: &Flash) -> MetricsSnapshot {
		let counters = &self.counters;

		let dftl = (strategy == Strategy::PageMapped).then(|| {
			let lookups = counters.cache_hits + counters.cache_misses;
			DftlSnapshot {
				cache_hits:                counters.cache_hits,
				cache_misses:              counters.cache_misses,
				cache_evictions:           counters.cache_evictions,
				dirty_evictions:           counters.dirty_evictions,
				cache_hit_ratio:           (lookups != 0).then(|| counters.cache_hits as f64 / lookups as f64),
				translation_pages_read:    counters.translation_pages_read,
				translation_pages_written: counters.translation_pages_written,
			}
		});
		let hybrid = (strategy == Strategy::Hybrid).then_some(HybridSnapshot {
			full_merges:   counters.full_merges,
			switch_merges: counters.switch_merges,
		});

		MetricsSnapshot {
			strategy,
			requests: self.latencies.len() as u64,
			logical_pages_read: counters.logical_pages_read,
			logical_pages_written: counters.logical_pages_written,
			logical_pages_discarded: counters.logical_pages_discarded,
			host_pages_written: counters.host_pages_written,
			physical_pages_written: counters.physical_pages_written(),
			physical_pages_read: counters.physical_pages_read,
			write_amplification: self.write_amplification(),
			pages_moved: counters.pages_moved,
			erases: counters.erases,
			gc_runs: counters.gc_runs,
			unmapped_reads: counters.unmapped_reads,
			latency: LatencySnapshot::new(&self.latencies),
			queue_depth: QueueDepthSnapshot::new(&self.queue_depths),
			wear: WearSnapshot::new(flash),
			dftl,
			hybrid,
		}
	}
}

/// Metrics snapshot.
///
/// Field names are shared by every strategy, strategy-specific
/// fields live in their own sections.
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(bincode::Encode, bincode::Decode)]
pub struct MetricsSnapshot {
	pub strategy:                Strategy,
	pub requests:                u64,
	pub logical_pages_read:      u64,
	pub logical_pages_written:   u64,
	pub logical_pages_discarded: u64,
	pub host_pages_written:      u64,
	pub physical_pages_written:  u64,
	pub physical_pages_read:     u64,
	pub write_amplification:     Option<f64>,
	pub pages_moved:             u64,
	pub erases:                  u64,
	pub gc_runs:                 u64,
	pub unmapped_reads:          u64,
	pub latency:                 LatencySnapshot,
	pub queue_depth:             QueueDepthSnapshot,
	pub wear:                    WearSnapshot,
	pub dftl:                    Option<DftlSnapshot>,
	pub hybrid:                  Option<HybridSnapshot>,
}

/// Latency summary, in nanoseconds
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(bincode::Encode, bincode::Decode)]
pub struct LatencySnapshot {
	pub mean:  f64,
	pub error: f64,
	pub min:   u64,
	pub max:   u64,
	pub p99:   u64,
}

impl LatencySnapshot {
	fn new(latencies: &[u64]) -> Self {
		let variance = latencies
			.iter()
			.map(|&latency| latency as f64)
			.collect::<average::Variance>();
		let (min, max) = latencies.iter().copied().minmax().into_option().unwrap_or((0, 0));

		let p99 = match latencies.is_empty() {
			true => 0,
			false => {
				let mut sorted = latencies.to_vec();
				sorted.sort_unstable();
				let idx = ((sorted.len() as f64 * 0.99).ceil() as usize).clamp(1, sorted.len()) - 1;
				sorted[idx]
			},
		};

		Self {
			mean: variance.mean(),
			error: variance.error(),
			min,
			max,
			p99,
		}
	}
}

/// Queue depth summary
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(bincode::Encode, bincode::Decode)]
pub struct QueueDepthSnapshot {
	pub max:       u64,
	pub mean:      f64,
	/// Requests dispatched at each depth
	pub histogram: Vec<u64>,
}

impl QueueDepthSnapshot {
	fn new(histogram: &[u64]) -> Self {
		let mean = histogram
			.iter()
			.enumerate()
			.flat_map(|(depth, &count)| std::iter::repeat(depth as f64).take(count as usize))
			.collect::<average::Mean>();
		let max = histogram.iter().rposition(|&count| count != 0).unwrap_or(0);

		Self {
			max:       max as u64,
			mean:      mean.mean(),
			histogram: histogram.to_vec(),
		}
	}
}

/// Wear summary
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(bincode::Encode, bincode::Decode)]
pub struct WearSnapshot {
	/// Erase count, by block
	pub erase_counts: Vec<u64>,
	pub min:          u64,
	pub max:          u64,
	pub mean:         f64,
}

impl WearSnapshot {
	fn new(flash: &Flash) -> Self {
		let erase_counts = flash.blocks().iter().map(|block| block.erase_count()).collect::<Vec<_>>();
		let (min, max) = erase_counts.iter().copied().minmax().into_option().unwrap_or((0, 0));
		let mean = erase_counts.iter().map(|&count| count as f64).collect::<average::Mean>();

		Self {
			erase_counts,
			min,
			max,
			mean: mean.mean(),
		}
	}
}

/// Page-mapped (demand-based) metrics
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(bincode::Encode, bincode::Decode)]
pub struct DftlSnapshot {
	pub cache_hits:                u64,
	pub cache_misses:              u64,
	pub cache_evictions:           u64,
	pub dirty_evictions:           u64,
	pub cache_hit_ratio:           Option<f64>,
	pub translation_pages_read:    u64,
	pub translation_pages_written: u64,
}

/// Hybrid metrics
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(bincode::Encode, bincode::Decode)]
pub struct HybridSnapshot {
	pub full_merges:   u64,
	pub switch_merges: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counters_since() {
		let earlier = Counters {
			host_pages_written: 3,
			pages_moved: 1,
			..Counters::default()
		};
		let later = Counters {
			host_pages_written: 5,
			pages_moved: 4,
			erases: 1,
			..Counters::default()
		};

		let delta = later.since(&earlier);
		assert_eq!(delta.host_pages_written, 2);
		assert_eq!(delta.pages_moved, 3);
		assert_eq!(delta.erases, 1);
		assert_eq!(delta.physical_pages_written(), 5);
	}

	#[test]
	fn write_amplification() {
		let mut metrics = Metrics::new();
		assert_eq!(metrics.write_amplification(), None);

		metrics.counters.logical_pages_written = 4;
		metrics.counters.host_pages_written = 4;
		metrics.counters.pages_moved = 2;
		assert_eq!(metrics.write_amplification(), Some(1.5));
	}

	#[test]
	fn queue_depth_histogram() {
		let mut metrics = Metrics::new();
		for depth in [1, 2, 2, 3, 1] {
			metrics.register_queue_depth(depth);
		}
		assert_eq!(metrics.max_queue_depth(), 3);

		let snapshot = QueueDepthSnapshot::new(&metrics.queue_depths);
		assert_eq!(snapshot.histogram, [0, 2, 2, 1]);
		assert!((snapshot.mean - 1.8).abs() < 1e-9);
	}

	#[test]
	fn latency_summary() {
		let latencies = (1..=100).collect::<Vec<u64>>();
		let snapshot = LatencySnapshot::new(&latencies);
		assert_eq!(snapshot.min, 1);
		assert_eq!(snapshot.max, 100);
		assert_eq!(snapshot.p99, 99);
		assert!((snapshot.mean - 50.5).abs() < 1e-9);
	}
}
