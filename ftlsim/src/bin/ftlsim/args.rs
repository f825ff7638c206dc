//! Arguments

// Imports
use std::path::PathBuf;

/// Arguments
#[derive(Debug)]
#[derive(clap::Parser)]
pub struct Args {
	/// Log file
	///
	/// Specifies a file to perform verbose logging to.
	/// You can use `RUST_LOG_FILE` to set filtering options
	#[clap(long = "log-file")]
	pub log_file: Option<PathBuf>,

	/// Whether to append to the log file
	#[clap(long = "log-file-append")]
	pub log_file_append: bool,

	/// Trace file
	pub trace_file: PathBuf,

	/// Config file
	#[clap(long = "config")]
	pub config_file: PathBuf,

	/// Output file
	#[clap(long = "output")]
	pub output_file: Option<PathBuf>,

	/// Output format
	#[clap(long = "output-format", value_enum, default_value_t = OutputFormat::Json)]
	pub output_format: OutputFormat,

	/// Whether to include every request's completion in the output
	#[clap(long = "completions")]
	pub completions: bool,
}

/// Output format
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(clap::ValueEnum)]
pub enum OutputFormat {
	Json,
	Bincode,
}
