//! SSD flash translation layer simulator (`ftlsim`)

// Modules
mod args;

// Imports
use {
	self::args::{Args, OutputFormat},
	anyhow::Context,
	clap::Parser,
	ftlsim::{data, Completion, Config, Simulator, TraceReader},
	ftlsim_util::logger,
	std::{fs, io},
};

fn main() -> Result<(), anyhow::Error> {
	// Get arguments
	let args = Args::parse();
	logger::pre_init::debug(format!("Args: {args:?}"));

	// Initialize logging
	logger::init(args.log_file.as_deref(), args.log_file_append);

	// Read the trace file
	let trace_file = fs::File::open(&args.trace_file).context("Unable to open trace file")?;
	let trace_reader =
		TraceReader::from_reader(io::BufReader::new(trace_file)).context("Unable to parse trace")?;
	tracing::debug!(
		target: "ftlsim::parse_trace",
		header = ?trace_reader.header(),
		records = trace_reader.records_remaining(),
		"Parsed trace"
	);

	// Read the config file
	let config = {
		let config_file = fs::File::open(&args.config_file).context("Unable to open config file")?;
		serde_json::from_reader::<_, Config>(io::BufReader::new(config_file))
			.context("Unable to parse config file")?
	};
	tracing::debug!(?config, "Parsed config");
	if trace_reader.header().page_size != config.geometry.page_size {
		tracing::warn!(
			trace_page_size = trace_reader.header().page_size,
			page_size = config.geometry.page_size,
			"Trace was recorded with a different page size, requests are split using the trace's"
		);
	}

	// Run the simulator
	let mut sim = Simulator::new(config).context("Invalid config")?;
	let mut completions = vec![];
	let run_output = match args.completions {
		true => sim.run(trace_reader, &mut completions),
		false => sim.run(trace_reader, &mut |_: Completion| ()),
	};
	let run_output = match run_output {
		Ok(run_output) => run_output,
		Err(err) => {
			if let ftlsim::RunError::Fatal { diagnostics, .. } = &err {
				match serde_json::to_string_pretty(diagnostics) {
					Ok(diagnostics) => tracing::error!("Diagnostics: {diagnostics}"),
					Err(err) => tracing::warn!(?err, "Unable to serialize diagnostics"),
				}
			}
			return Err(err).context("Unable to run simulator");
		},
	};

	let metrics = sim.snapshot();
	tracing::info!(
		requests = run_output.requests,
		write_amplification = ?metrics.write_amplification,
		pages_moved = metrics.pages_moved,
		erases = metrics.erases,
		"Finished simulation"
	);

	if let Some(output_path) = &args.output_file {
		let data = data::Output {
			time_span: run_output.time_span,
			metrics,
			completions: args.completions.then_some(completions),
		};

		let output_file = fs::File::create(output_path).context("Unable to create output file")?;
		let mut output_file = io::BufWriter::new(output_file);
		match args.output_format {
			OutputFormat::Json => {
				serde_json::to_writer(&mut output_file, &data).context("Unable to write to output file")?;
			},
			OutputFormat::Bincode => {
				bincode::encode_into_std_write(&data, &mut output_file, bincode::config::standard())
					.context("Unable to write to output file")?;
			},
		}
		io::Write::flush(&mut output_file).context("Unable to flush output file")?;
	}

	Ok(())
}
