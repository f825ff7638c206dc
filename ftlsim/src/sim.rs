//! Simulator

// Imports
use {
	crate::{
		config::{Config, UnmappedReadPolicy},
		error::{ConfigError, FtlError, RunError},
		flash::{BlockId, Flash, FreeBlockPolicy},
		ftl::{Ftl, MergePolicy},
		gc::VictimPolicy,
		metrics::{Counters, Metrics, MetricsSnapshot},
		oob::PageCounts,
		queue::QueueModel,
		request::{Completion, CompletionSink, Op, Request},
		ssd::Ssd,
	},
	ftlsim_util::{DisplayWrapper, NanoDuration},
	std::{
		fmt,
		ops::Range,
		time::{Duration, Instant},
	},
};

/// Simulator.
///
/// Owns the simulated drive and replays requests against it, in arrival order.
#[derive(Debug)]
pub struct Simulator {
	/// Config
	config: Config,

	/// Drive state
	ssd: Ssd,

	/// Translation layer
	ftl: Ftl,

	/// Queue model
	queue: QueueModel,

	/// Index of the next request
	next_idx: u64,

	/// Arrival time of the latest request
	last_time: Option<u64>,

	/// Debug output period
	///
	/// Interval in which to output debug output during [`Simulator::run`]
	debug_output_period: Duration,
}

impl Simulator {
	/// Creates a new simulator with a fresh, fully erased, drive
	pub fn new(config: Config) -> Result<Self, ConfigError> {
		config.validate()?;

		let flash = Flash::new(config.geometry, config.free_block_policy.build());
		let ssd = Ssd::new(flash, config.logical_pages());
		let ftl = Ftl::new(&config);
		let queue = QueueModel::new(config.queue_depth);
		let debug_output_period =
			Duration::try_from_secs_f64(config.debug_output_period_secs).unwrap_or(Duration::MAX);
		tracing::debug!(
			strategy = ?ftl.strategy(),
			logical_pages = ssd.logical_pages(),
			physical_pages = config.geometry.total_pages(),
			"Created simulator"
		);

		Ok(Self {
			config,
			ssd,
			ftl,
			queue,
			next_idx: 0,
			last_time: None,
			debug_output_period,
		})
	}

	/// Replaces the garbage collection victim policy
	pub fn set_victim_policy(&mut self, policy: Box<dyn VictimPolicy>) {
		self.ftl.set_victim_policy(policy);
	}

	/// Replaces the hybrid merge policy
	pub fn set_merge_policy(&mut self, policy: Box<dyn MergePolicy>) {
		self.ftl.set_merge_policy(policy);
	}

	/// Replaces the free block selection policy
	pub fn set_free_block_policy(&mut self, policy: Box<dyn FreeBlockPolicy>) {
		self.ssd.flash.set_free_block_policy(policy);
	}

	/// Returns the config
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns the drive state
	pub fn ssd(&self) -> &Ssd {
		&self.ssd
	}

	/// Returns the translation layer
	pub fn ftl(&self) -> &Ftl {
		&self.ftl
	}

	/// Returns the metrics
	pub fn metrics(&self) -> &Metrics {
		&self.ssd.metrics
	}

	/// Returns a snapshot of the metrics
	pub fn snapshot(&self) -> MetricsSnapshot {
		self.ssd.metrics.snapshot(self.ftl.strategy(), &self.ssd.flash)
	}

	/// Returns the state of the drive, for diagnosing failures
	pub fn diagnostics(&self) -> Diagnostics {
		let flash = &self.ssd.flash;
		Diagnostics {
			free_blocks: flash.free_blocks(),
			frontier:    flash.frontier(),
			blocks:      flash
				.blocks()
				.iter()
				.map(|block| BlockDiagnostics {
					block:       block.id(),
					counts:      flash.oob().counts(block.id()),
					cursor:      block.cursor(),
					erase_count: block.erase_count(),
					free:        block.is_free(),
				})
				.collect(),
			metrics:     self.snapshot(),
		}
	}

	/// Runs the simulator over all of `events`, sending each completion to `sink`.
	///
	/// Stops at the first failing event or fatal request. Either way, the
	/// metrics accumulated until then remain available.
	pub fn run<S: CompletionSink + ?Sized>(
		&mut self,
		events: impl IntoIterator<Item = Result<Request, anyhow::Error>>,
		sink: &mut S,
	) -> Result<RunOutput, RunError> {
		// Note: We start in the past so that we output right away at the start
		let mut last_debug_time = Instant::now()
			.checked_sub(self.debug_output_period)
			.unwrap_or_else(Instant::now);

		let events = events.into_iter();
		let total_events = events.size_hint().1;

		let mut first_time = None;
		let mut last_time = None;
		let mut requests = 0;
		for (event_idx, event) in events.enumerate() {
			// Note: Indices are shared with completions, so they keep counting across runs
			let idx = self.next_idx;
			let request = event.map_err(|source| RunError::Source { idx, source })?;

			// TODO: Check that requests arrive in order, instead of assuming they do
			first_time.get_or_insert(request.time);
			last_time = Some(request.time);

			let completion = match self.submit(&request) {
				Ok(completion) => completion,
				Err(source) => {
					let diagnostics = Box::new(self.diagnostics());
					tracing::error!(idx, ?request, %source, "Request failed");
					return Err(RunError::Fatal {
						idx,
						request,
						source,
						diagnostics,
					});
				},
			};
			sink.complete(completion);
			requests += 1;

			// Then show debug output, if it's been long enough
			let cur_time = Instant::now();
			if cur_time.duration_since(last_debug_time) >= self.debug_output_period {
				let progress = DisplayWrapper::new(|f| match total_events {
					Some(total) => write!(f, "{:.2}%", 100.0 * (event_idx as f64 / total as f64)),
					None => write!(f, "#{event_idx}"),
				});
				tracing::info!(
					"[{progress}] Debug: {}",
					DisplayWrapper::new(|f| self.fmt_debug(f))
				);
				last_debug_time = cur_time;
			}
		}

		Ok(RunOutput {
			time_span: first_time.zip(last_time).map(|(first, last)| first..(last + 1)),
			requests,
		})
	}

	/// Submits a single request, applying all of its effects before returning.
	///
	/// # Errors
	/// Returns an error if the request failed fatally. The drive is left as
	/// it was at the point of failure.
	pub fn submit(&mut self, request: &Request) -> Result<Completion, FtlError> {
		let idx = self.next_idx;
		self.next_idx += 1;
		self.last_time = Some(request.time);

		let before = self.ssd.metrics.counters;
		self.apply(request)?;
		let delta = self.ssd.metrics.counters.since(&before);

		let service = match request.op {
			Op::Discard => 0,
			Op::Read | Op::Write => self.service_time(&delta),
		};
		let dispatch = self.queue.dispatch(request.time, service);
		let latency = dispatch.latency(request.time);
		self.ssd.metrics.register_latency(latency);
		self.ssd.metrics.register_queue_depth(dispatch.depth);

		let completion = Completion {
			idx,
			op: request.op,
			arrival: request.time,
			time: dispatch.completion,
			latency,
			pages_read: delta.physical_pages_read,
			pages_written: delta.physical_pages_written(),
			erases: delta.erases,
			gc_ran: delta.gc_runs + delta.full_merges + delta.switch_merges != 0,
			queue_depth: dispatch.depth as u64,
		};
		tracing::trace!(?request, ?completion, "Completed request");

		Ok(completion)
	}

	/// Applies all effects of `request`
	fn apply(&mut self, request: &Request) -> Result<(), FtlError> {
		let Self { config, ssd, ftl, .. } = self;
		for lpn in request.lpns() {
			match request.op {
				Op::Read => {
					ssd.metrics.counters.logical_pages_read += 1;
					match ftl.translate(ssd, lpn, request.time) {
						Ok(location) => ssd.read_location(lpn, location)?,
						Err(err @ FtlError::UnmappedRead { .. }) => {
							ssd.metrics.counters.unmapped_reads += 1;
							match config.unmapped_reads {
								UnmappedReadPolicy::Lenient => {
									tracing::warn!(?lpn, time = request.time, "Read of unmapped logical page")
								},
								UnmappedReadPolicy::Strict => return Err(err),
							}
						},
						Err(err) => return Err(err),
					}
				},
				Op::Write => {
					ssd.metrics.counters.logical_pages_written += 1;
					ftl.remap(ssd, lpn, request.time)?;
				},
				Op::Discard => {
					ssd.metrics.counters.logical_pages_discarded += 1;
					ftl.discard(ssd, lpn, request.time)?;
				},
			}
		}

		Ok(())
	}

	/// Returns the service time of the physical operations in `delta`
	fn service_time(&self, delta: &Counters) -> u64 {
		let latency = &self.config.latency;
		delta.physical_pages_read * latency.page_read_ns +
			delta.physical_pages_written() * latency.page_write_ns +
			delta.erases * latency.block_erase_ns
	}

	/// Formats debug output to `f`.
	pub fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
		let metrics = &self.ssd.metrics;
		let counters = &metrics.counters;
		write!(
			f,
			"time: {}, free blocks: {}/{}, ",
			NanoDuration::from_nanos(self.last_time.unwrap_or(0)),
			self.ssd.flash.free_blocks(),
			self.config.geometry.block_count,
		)?;
		match metrics.write_amplification() {
			Some(write_amplification) => write!(f, "WA: {write_amplification:.3}, ")?,
			None => write!(f, "WA: -, ")?,
		}
		write!(
			f,
			"pages moved: {}, erases: {}, gc runs: {}",
			counters.pages_moved, counters.erases, counters.gc_runs
		)?;

		if !matches!(self.ftl, Ftl::Counter(_)) {
			write!(f, ", ")?;
			self.ftl.fmt_debug(&self.ssd, f)?;
		}

		Ok(())
	}
}

/// Output for [`Simulator::run`]
#[derive(Clone, Debug)]
pub struct RunOutput {
	/// Time span of the request arrivals
	pub time_span: Option<Range<u64>>,

	/// Requests completed
	pub requests: u64,
}

/// Drive state at the point of a failure
#[derive(Clone, Debug)]
#[derive(serde::Serialize)]
pub struct Diagnostics {
	/// Free blocks
	pub free_blocks: usize,

	/// Write frontier
	pub frontier: Option<BlockId>,

	/// All blocks
	pub blocks: Vec<BlockDiagnostics>,

	/// Metrics
	pub metrics: MetricsSnapshot,
}

/// Block state
#[derive(Clone, Debug)]
#[derive(serde::Serialize)]
pub struct BlockDiagnostics {
	pub block:       BlockId,
	pub counts:      PageCounts,
	pub cursor:      u64,
	pub erase_count: u64,
	pub free:        bool,
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::{
			config::FtlConfig,
			flash::{Geometry, Lpn},
			ftl::Location,
		},
	};

	fn config(ftl: FtlConfig) -> Config {
		let mut config = Config::new(
			Geometry {
				page_size:       4096,
				pages_per_block: 4,
				block_count:     16,
			},
			ftl,
		);
		config.queue_depth = 2;
		config
	}

	#[test]
	fn simulator_is_send() {
		fn assert_send<T: Send>() {}
		assert_send::<Simulator>();
	}

	#[test]
	fn service_time_follows_latencies() {
		let mut sim = Simulator::new(config(FtlConfig::Counter)).expect("Unable to create simulator");
		let write = sim
			.submit(&Request::new(Op::Write, 0..2, 4096, 0))
			.expect("Unable to write");
		assert_eq!(write.pages_written, 2);
		assert_eq!(write.latency, 2 * 200_000);

		let read = sim.submit(&Request::new(Op::Read, 0..1, 4096, 0)).expect("Unable to read");
		assert_eq!(read.pages_read, 1);
		assert_eq!(read.latency, 25_000);
		assert_eq!(read.queue_depth, 2);

		let discard = sim
			.submit(&Request::new(Op::Discard, 0..2, 4096, 1_000_000))
			.expect("Unable to discard");
		assert_eq!(discard.latency, 0);
		assert_eq!(sim.metrics().counters.logical_pages_discarded, 2);
	}

	#[test]
	fn unmapped_reads_are_lenient_by_default() {
		let mut sim = Simulator::new(config(FtlConfig::PageMapped { cache_entries: 8 }))
			.expect("Unable to create simulator");
		let read = sim.submit(&Request::new(Op::Read, 3..5, 4096, 0)).expect("Unable to read");
		assert_eq!(read.pages_read, 0);
		assert_eq!(sim.metrics().counters.unmapped_reads, 2);
	}

	#[test]
	fn strict_unmapped_reads_abort_the_run() {
		let mut config = config(FtlConfig::Hybrid { log_blocks: 2 });
		config.unmapped_reads = UnmappedReadPolicy::Strict;
		let mut sim = Simulator::new(config).expect("Unable to create simulator");

		let events = [
			Ok(Request::new(Op::Write, 0..1, 4096, 0)),
			Ok(Request::new(Op::Read, 0..1, 4096, 1)),
			Ok(Request::new(Op::Read, 1..2, 4096, 2)),
			Ok(Request::new(Op::Write, 2..3, 4096, 3)),
		];
		let mut completions = vec![];
		let err = sim.run(events, &mut completions).expect_err("Run should fail");
		match err {
			RunError::Fatal {
				idx,
				source,
				diagnostics,
				..
			} => {
				assert_eq!(idx, 2);
				assert_eq!(source, FtlError::UnmappedRead { lpn: Lpn(1) });
				assert_eq!(diagnostics.blocks.len(), 16);
			},
			RunError::Source { .. } => panic!("Unexpected error: {err:?}"),
		}

		// Completed requests and metrics are kept
		assert_eq!(completions.len(), 2);
		assert_eq!(sim.metrics().counters.logical_pages_written, 1);
		let Ftl::Hybrid(hybrid) = sim.ftl() else {
			panic!("Expected the hybrid layer");
		};
		assert!(matches!(hybrid.translate(sim.ssd(), Lpn(0)), Ok(Location::Page(_))));
	}

	#[test]
	fn source_errors_stop_the_run() {
		let mut sim = Simulator::new(config(FtlConfig::Counter)).expect("Unable to create simulator");
		let events = [
			Ok(Request::new(Op::Write, 0..1, 4096, 0)),
			Err(anyhow::anyhow!("Corrupt record")),
		];
		let err = sim.run(events, &mut |_: Completion| ()).expect_err("Run should fail");
		assert!(matches!(err, RunError::Source { idx: 1, .. }));
	}

	#[test]
	fn indices_continue_across_runs() {
		let mut config = config(FtlConfig::PageMapped { cache_entries: 4 });
		config.unmapped_reads = UnmappedReadPolicy::Strict;
		let mut sim = Simulator::new(config).expect("Unable to create simulator");

		let mut completions = vec![];
		let events = (0..3).map(|lpn| Ok(Request::new(Op::Write, lpn..(lpn + 1), 4096, lpn)));
		sim.run(events, &mut completions).expect("Unable to run");

		let events = [
			Ok(Request::new(Op::Read, 0..1, 4096, 3)),
			Ok(Request::new(Op::Read, 5..6, 4096, 4)),
		];
		let err = sim.run(events, &mut completions).expect_err("Run should fail");
		assert_eq!(
			completions.iter().map(|completion| completion.idx).collect::<Vec<_>>(),
			[0, 1, 2, 3]
		);
		assert!(matches!(err, RunError::Fatal { idx: 4, .. }));

		let events = [Err(anyhow::anyhow!("Corrupt record"))];
		let err = sim.run(events, &mut completions).expect_err("Run should fail");
		assert!(matches!(err, RunError::Source { idx: 5, .. }));
	}
}
