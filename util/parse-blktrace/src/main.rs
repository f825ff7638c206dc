//! Parses `blkparse`'s default text output, converting it to an `ftlsim` trace.

// Imports
use {
	anyhow::Context,
	clap::Parser,
	ftlsim::{request::Op, trace::Record, TraceWriter},
	ftlsim_util::logger,
	std::{
		fs,
		io::{self, BufRead, BufWriter},
		path::PathBuf,
	},
};

/// Arguments
#[derive(Debug)]
#[derive(clap::Parser)]
struct Args {
	/// Input file, `stdin` if unspecified
	input: Option<PathBuf>,

	/// Output trace file
	#[clap(long = "output", default_value = "output.trace")]
	output: PathBuf,

	/// Page size to record in the trace
	#[clap(long = "page-size", default_value_t = 4096)]
	page_size: u64,

	/// Action to keep events of
	///
	/// Defaults to `D` (issued to the driver)
	#[clap(long = "action", default_value = "D")]
	action: String,
}

/// Sector size, in bytes
const SECTOR_SIZE: u64 = 512;

fn main() -> Result<(), anyhow::Error> {
	let args = Args::parse();
	logger::pre_init::debug(format!("Args: {args:?}"));
	logger::init(None, false);

	// Create the writer
	let file = fs::File::create(&args.output).context("Unable to create output file")?;
	let mut writer = TraceWriter::new(BufWriter::new(file), args.page_size).context("Unable to create trace writer")?;

	let input: Box<dyn BufRead> = match &args.input {
		Some(input) => Box::new(io::BufReader::new(
			fs::File::open(input).context("Unable to open input file")?,
		)),
		None => Box::new(io::stdin().lock()),
	};

	let mut skipped = 0_usize;
	for (line_idx, line) in input.lines().enumerate() {
		let line = line.context("Unable to read line")?;
		match self::parse_line(&line, &args.action).with_context(|| format!("Unable to parse line {}", line_idx + 1))? {
			Some(record) => writer.write(&record).context("Unable to write record")?,
			None => skipped += 1,
		}
	}

	let records = writer.records_written();
	writer.finish().context("Unable to finish writing trace")?;
	tracing::info!(records, skipped, "Converted trace");

	Ok(())
}

/// Parses a single line.
///
/// Returns `None` for lines that aren't events of `action` on data, such as
/// the summary blkparse prints at the end.
fn parse_line(line: &str, action: &str) -> Result<Option<Record>, anyhow::Error> {
	// Note: Fields are `dev cpu seq time pid action rwbs sector + count [process]`
	let fields = line.split_whitespace().collect::<Vec<_>>();
	let [_dev, _cpu, _seq, time, _pid, event_action, rwbs, sector, "+", count, ..] = fields[..] else {
		return Ok(None);
	};
	if event_action != action {
		return Ok(None);
	}

	let op = match rwbs {
		rwbs if rwbs.contains('D') => Op::Discard,
		rwbs if rwbs.contains('W') => Op::Write,
		rwbs if rwbs.contains('R') => Op::Read,

		// Else it's a flush or barrier without data
		_ => return Ok(None),
	};

	let time = time.parse::<f64>().context("Unable to parse time")?;
	let sector = sector.parse::<u64>().context("Unable to parse sector")?;
	let count = count.parse::<u64>().context("Unable to parse sector count")?;
	if count == 0 {
		return Ok(None);
	}

	Ok(Some(Record {
		time: (time * 1e9).round() as u64,
		offset: sector * SECTOR_SIZE,
		size: count * SECTOR_SIZE,
		op,
	}))
}
