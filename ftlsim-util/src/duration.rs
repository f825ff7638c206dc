//! Duration

// Imports
use std::fmt;

/// Simulated duration with nano-second precision
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Default)]
pub struct NanoDuration {
	/// Nano seconds
	nanos: u64,
}

impl NanoDuration {
	/// Number of nano-seconds per micro-second
	pub const NANOS_PER_MICRO: u64 = 1_000;
	/// Number of nano-seconds per milli-second
	pub const NANOS_PER_MILLI: u64 = 1_000_000;
	/// Number of nano-seconds per second
	pub const NANOS_PER_SEC: u64 = 1_000_000_000;

	/// Creates a new duration from nanoseconds
	#[must_use]
	pub const fn from_nanos(nanos: u64) -> Self {
		Self { nanos }
	}

	/// Creates a new duration from floating-point nanoseconds.
	///
	/// Negative and non-finite values saturate to `0` / `u64::MAX`
	#[must_use]
	pub fn from_nanos_f64(nanos: f64) -> Self {
		// Note: `as` casts from `f64` are saturating, and map `NaN` to `0`.
		Self { nanos: nanos.round() as u64 }
	}

	/// Returns the number of nanoseconds
	#[must_use]
	pub const fn as_nanos(self) -> u64 {
		self.nanos
	}
}


impl fmt::Display for NanoDuration {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let nanos = self.nanos;
		let secs = nanos / Self::NANOS_PER_SEC;

		match nanos {
			0 => write!(f, "0ns"),
			..=999 => write!(f, "{nanos}ns"),
			..=999_999 => write!(f, "{:.3}µs", nanos as f64 / Self::NANOS_PER_MICRO as f64),
			..=999_999_999 => write!(f, "{:.3}ms", nanos as f64 / Self::NANOS_PER_MILLI as f64),

			// Else format it with minutes / hours, if any
			_ => {
				let frac_secs = (nanos % (60 * Self::NANOS_PER_SEC)) as f64 / Self::NANOS_PER_SEC as f64;
				let mins = secs / 60 % 60;
				let hours = secs / 60 / 60;
				match (hours, mins) {
					(0, 0) => write!(f, "{frac_secs:.3}s"),
					(0, _) => write!(f, "{mins}m{frac_secs:.3}s"),
					(..) => write!(f, "{hours}h{mins}m{frac_secs:.3}s"),
				}
			},
		}
	}
}
