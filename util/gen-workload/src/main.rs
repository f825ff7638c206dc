//! Generates synthetic `ftlsim` traces.

// Imports
use {
	anyhow::Context,
	clap::Parser,
	ftlsim::{request::Op, trace::Record, TraceWriter},
	ftlsim_util::logger,
	rand::{rngs::SmallRng, Rng, SeedableRng},
	std::{fs, io::BufWriter, path::PathBuf},
};

/// Arguments
#[derive(Debug)]
#[derive(clap::Parser)]
struct Args {
	/// Output trace file
	#[clap(long = "output", default_value = "output.trace")]
	output: PathBuf,

	/// Access pattern
	#[clap(long = "pattern", value_enum, default_value_t = Pattern::Uniform)]
	pattern: Pattern,

	/// Logical space accessed, in pages
	#[clap(long = "space")]
	space: u64,

	/// Number of requests
	#[clap(long = "requests")]
	requests: u64,

	/// Pages per request
	#[clap(long = "request-pages", default_value_t = 1)]
	request_pages: u64,

	/// Page size, in bytes
	#[clap(long = "page-size", default_value_t = 4096)]
	page_size: u64,

	/// Fraction of requests that are reads
	#[clap(long = "read-ratio", default_value_t = 0.0)]
	read_ratio: f64,

	/// Time between requests, in nanoseconds
	#[clap(long = "interval", default_value_t = 10_000)]
	interval: u64,

	/// Fraction of the space that is hot, for the hot/cold pattern
	#[clap(long = "hot-space", default_value_t = 0.2)]
	hot_space: f64,

	/// Fraction of requests going to the hot space, for the hot/cold pattern
	#[clap(long = "hot-requests", default_value_t = 0.8)]
	hot_requests: f64,

	/// Random seed
	#[clap(long = "seed", default_value_t = 0)]
	seed: u64,
}

/// Access pattern
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(clap::ValueEnum)]
enum Pattern {
	/// Sequential, wrapping around at the end of the space
	Sequential,

	/// Uniformly random
	Uniform,

	/// Skewed towards a hot region at the start of the space
	HotCold,
}

fn main() -> Result<(), anyhow::Error> {
	let args = Args::parse();
	logger::pre_init::debug(format!("Args: {args:?}"));
	logger::init(None, false);

	anyhow::ensure!(args.request_pages > 0, "Requests must have at least 1 page");
	anyhow::ensure!(
		args.space >= args.request_pages,
		"Space must fit at least a single request"
	);
	anyhow::ensure!((0.0..=1.0).contains(&args.read_ratio), "Read ratio must be within `0.0..=1.0`");
	anyhow::ensure!(
		(0.0..=1.0).contains(&args.hot_space) && (0.0..=1.0).contains(&args.hot_requests),
		"Hot/cold fractions must be within `0.0..=1.0`"
	);

	let file = fs::File::create(&args.output).context("Unable to create output file")?;
	let mut writer = TraceWriter::new(BufWriter::new(file), args.page_size).context("Unable to create trace writer")?;

	let mut rng = SmallRng::seed_from_u64(args.seed);
	let slots = args.space - args.request_pages + 1;
	let hot_slots = ((slots as f64 * args.hot_space).ceil() as u64).clamp(1, slots);
	for idx in 0..args.requests {
		let lpn = match args.pattern {
			Pattern::Sequential => (idx * args.request_pages) % slots,
			Pattern::Uniform => rng.gen_range(0..slots),
			Pattern::HotCold => match rng.gen_bool(args.hot_requests) || hot_slots == slots {
				true => rng.gen_range(0..hot_slots),
				false => rng.gen_range(hot_slots..slots),
			},
		};
		let op = match rng.gen_bool(args.read_ratio) {
			true => Op::Read,
			false => Op::Write,
		};

		let record = Record {
			time: idx * args.interval,
			offset: lpn * args.page_size,
			size: args.request_pages * args.page_size,
			op,
		};
		writer.write(&record).context("Unable to write record")?;
	}

	writer.finish().context("Unable to finish writing trace")?;
	tracing::info!(requests = args.requests, pattern = ?args.pattern, "Generated trace");

	Ok(())
}
