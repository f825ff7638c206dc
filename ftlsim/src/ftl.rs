//! Translation layers

// Modules
pub mod counter;
pub mod dftl;
pub mod hybrid;

// Exports
pub use self::{
	counter::Counter,
	dftl::Dftl,
	hybrid::{Hybrid, MergePolicy, MostLogEntries},
};

// Imports
use {
	crate::{
		config::{Config, FtlConfig},
		error::FtlError,
		flash::{Lpn, Ppa},
		gc::VictimPolicy,
		ssd::Ssd,
	},
	std::fmt,
};

/// Translation strategy
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(bincode::Encode, bincode::Decode)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
	PageMapped,
	Hybrid,
	Counter,
}

/// Location of a logical page's data
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Location {
	/// A physical page
	Page(Ppa),

	/// Not modeled by the translation layer
	Unmodeled,
}

/// Translation layer
#[derive(Debug)]
pub enum Ftl {
	PageMapped(Dftl),
	Hybrid(Hybrid),
	Counter(Counter),
}

impl Ftl {
	/// Creates the translation layer described by `config`
	#[must_use]
	pub fn new(config: &Config) -> Self {
		match config.ftl {
			FtlConfig::PageMapped { cache_entries } => Self::PageMapped(Dftl::new(
				config.geometry,
				config.logical_pages(),
				cache_entries,
				config.gc,
			)),
			FtlConfig::Hybrid { log_blocks } => {
				Self::Hybrid(Hybrid::new(config.geometry, config.logical_pages(), log_blocks))
			},
			FtlConfig::Counter => Self::Counter(Counter),
		}
	}

	/// Returns this layer's strategy
	#[must_use]
	pub fn strategy(&self) -> Strategy {
		match self {
			Self::PageMapped(_) => Strategy::PageMapped,
			Self::Hybrid(_) => Strategy::Hybrid,
			Self::Counter(_) => Strategy::Counter,
		}
	}

	/// Translates a logical page for a read.
	///
	/// # Errors
	/// Returns [`FtlError::UnmappedRead`] if `lpn` has no live mapping.
	pub fn translate(&mut self, ssd: &mut Ssd, lpn: Lpn, time: u64) -> Result<Location, FtlError> {
		match self {
			Self::PageMapped(ftl) => ftl.translate(ssd, lpn, time),
			Self::Hybrid(ftl) => ftl.translate(ssd, lpn),
			Self::Counter(ftl) => ftl.translate(ssd, lpn),
		}
	}

	/// Writes a logical page, mapping it to a new location
	pub fn remap(&mut self, ssd: &mut Ssd, lpn: Lpn, time: u64) -> Result<Location, FtlError> {
		match self {
			Self::PageMapped(ftl) => ftl.remap(ssd, lpn, time),
			Self::Hybrid(ftl) => ftl.remap(ssd, lpn, time),
			Self::Counter(ftl) => ftl.remap(ssd, lpn),
		}
	}

	/// Discards a logical page.
	///
	/// Discarding an unmapped page does nothing.
	pub fn discard(&mut self, ssd: &mut Ssd, lpn: Lpn, time: u64) -> Result<(), FtlError> {
		match self {
			Self::PageMapped(ftl) => ftl.discard(ssd, lpn, time),
			Self::Hybrid(ftl) => ftl.discard(ssd, lpn, time),
			Self::Counter(ftl) => ftl.discard(ssd, lpn),
		}
	}

	/// Replaces the garbage collection victim policy.
	///
	/// Only the page-mapped layer collects garbage, others ignore the policy.
	pub fn set_victim_policy(&mut self, policy: Box<dyn VictimPolicy>) {
		match self {
			Self::PageMapped(ftl) => ftl.set_victim_policy(policy),
			_ => tracing::debug!(strategy = ?self.strategy(), ?policy, "Ignoring victim policy"),
		}
	}

	/// Replaces the merge policy.
	///
	/// Only the hybrid layer merges, others ignore the policy.
	pub fn set_merge_policy(&mut self, policy: Box<dyn MergePolicy>) {
		match self {
			Self::Hybrid(ftl) => ftl.set_merge_policy(policy),
			_ => tracing::debug!(strategy = ?self.strategy(), ?policy, "Ignoring merge policy"),
		}
	}

	/// Formats debug output to `f`
	pub fn fmt_debug(&self, ssd: &Ssd, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
		match self {
			Self::PageMapped(ftl) => ftl.fmt_debug(ssd, f),
			Self::Hybrid(ftl) => ftl.fmt_debug(ssd, f),
			Self::Counter(_) => Ok(()),
		}
	}
}
