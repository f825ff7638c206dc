//! Counting translation layer
//!
//! Doesn't model any flash state, every logical page access costs exactly
//! one physical page access.

// Imports
use {
	super::Location,
	crate::{error::FtlError, flash::Lpn, ssd::Ssd},
};

/// Counting translation layer
#[derive(Clone, Copy, Debug, Default)]
pub struct Counter;

impl Counter {
	/// Translates `lpn`.
	///
	/// Every page is readable, as no mapping is kept.
	pub fn translate(&self, ssd: &Ssd, lpn: Lpn) -> Result<Location, FtlError> {
		ssd.check_lpn(lpn)?;
		Ok(Location::Unmodeled)
	}

	/// Writes `lpn`
	pub fn remap(&self, ssd: &mut Ssd, lpn: Lpn) -> Result<Location, FtlError> {
		ssd.check_lpn(lpn)?;
		ssd.metrics.counters.host_pages_written += 1;
		Ok(Location::Unmodeled)
	}

	/// Discards `lpn`
	pub fn discard(&self, ssd: &Ssd, lpn: Lpn) -> Result<(), FtlError> {
		ssd.check_lpn(lpn)
	}
}
