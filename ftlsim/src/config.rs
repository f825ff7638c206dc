//! Configuration

// Imports
use crate::{
	error::ConfigError,
	flash::{pool, FreeBlockPolicy, Geometry},
	gc::{CostBenefit, Greedy, VictimPolicy},
};

/// Configuration
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Config {
	/// Flash geometry
	pub geometry: Geometry,

	/// Fraction of the physical pages hidden from the host
	#[serde(default = "Config::default_over_provisioning")]
	pub over_provisioning: f64,

	/// Translation layer
	pub ftl: FtlConfig,

	/// Garbage collection
	#[serde(default)]
	pub gc: GcConfig,

	/// Free block selection policy
	#[serde(default)]
	pub free_block_policy: FreeBlockPolicyKind,

	/// Outstanding request limit
	#[serde(default = "Config::default_queue_depth")]
	pub queue_depth: usize,

	/// Per-operation latencies
	#[serde(default)]
	pub latency: LatencyConfig,

	/// How to handle reads of unmapped pages
	#[serde(default)]
	pub unmapped_reads: UnmappedReadPolicy,

	/// Debug output period (in seconds)
	#[serde(default = "Config::default_debug_output_period_secs")]
	pub debug_output_period_secs: f64,
}

impl Config {
	/// Creates a configuration with defaults for everything but the geometry and translation layer
	#[must_use]
	pub fn new(geometry: Geometry, ftl: FtlConfig) -> Self {
		Self {
			geometry,
			over_provisioning: Self::default_over_provisioning(),
			ftl,
			gc: GcConfig::default(),
			free_block_policy: FreeBlockPolicyKind::default(),
			queue_depth: Self::default_queue_depth(),
			latency: LatencyConfig::default(),
			unmapped_reads: UnmappedReadPolicy::default(),
			debug_output_period_secs: Self::default_debug_output_period_secs(),
		}
	}

	fn default_over_provisioning() -> f64 {
		0.25
	}

	fn default_queue_depth() -> usize {
		32
	}

	fn default_debug_output_period_secs() -> f64 {
		1.0
	}

	/// Returns the number of logical pages exported to the host
	#[must_use]
	pub fn logical_pages(&self) -> u64 {
		let total_pages = self.geometry.total_pages();
		let hidden = (total_pages as f64 * self.over_provisioning).ceil() as u64;
		total_pages.saturating_sub(hidden)
	}

	/// Validates this configuration
	pub fn validate(&self) -> Result<(), ConfigError> {
		let geometry = &self.geometry;
		for (field, value) in [
			("geometry.page_size", geometry.page_size),
			("geometry.pages_per_block", geometry.pages_per_block),
			("geometry.block_count", geometry.block_count),
			("queue_depth", self.queue_depth as u64),
		] {
			if value == 0 {
				return Err(ConfigError::Zero { field });
			}
		}

		if !(0.0..1.0).contains(&self.over_provisioning) {
			return Err(ConfigError::OverProvisioning {
				value: self.over_provisioning,
			});
		}
		if !self.debug_output_period_secs.is_finite() || self.debug_output_period_secs < 0.0 {
			return Err(ConfigError::DebugOutputPeriod {
				value: self.debug_output_period_secs,
			});
		}
		if self.logical_pages() == 0 {
			return Err(ConfigError::TooSmall {
				reason: "no logical pages are exported".to_owned(),
			});
		}

		let data_blocks = self.logical_pages().div_ceil(geometry.pages_per_block);
		match self.ftl {
			FtlConfig::PageMapped { cache_entries } => {
				if cache_entries == 0 {
					return Err(ConfigError::Zero {
						field: "ftl.cache_entries",
					});
				}
				if geometry.page_size < crate::ftl::dftl::ENTRY_SIZE {
					return Err(ConfigError::TooSmall {
						reason: format!(
							"pages must hold at least one {}-byte translation entry",
							crate::ftl::dftl::ENTRY_SIZE
						),
					});
				}
				self.validate_watermarks()?;

				// Note: Translation pages live on flash alongside the data, and one
				//       block is kept spare for garbage collection.
				let logical_pages = self.logical_pages();
				let translation_pages = logical_pages.div_ceil(geometry.page_size / crate::ftl::dftl::ENTRY_SIZE);
				let required = logical_pages + translation_pages + geometry.pages_per_block;
				if required > geometry.total_pages() {
					return Err(ConfigError::TooSmall {
						reason: format!(
							"{logical_pages} data pages, {translation_pages} translation pages and a spare block need \
							 {required} pages, only {} exist",
							geometry.total_pages()
						),
					});
				}
			},
			FtlConfig::Hybrid { log_blocks } => {
				if log_blocks == 0 {
					return Err(ConfigError::Zero { field: "ftl.log_blocks" });
				}

				// Note: One block is kept spare as the destination of merges.
				let required = data_blocks + log_blocks as u64 + 1;
				if required > geometry.block_count {
					return Err(ConfigError::TooSmall {
						reason: format!(
							"{data_blocks} data blocks, {log_blocks} log blocks and a spare block need {required} \
							 blocks, only {} exist",
							geometry.block_count
						),
					});
				}
			},
			FtlConfig::Counter => (),
		}

		Ok(())
	}

	fn validate_watermarks(&self) -> Result<(), ConfigError> {
		let GcConfig {
			low_watermark: low,
			high_watermark: high,
			..
		} = self.gc;
		let block_count = self.geometry.block_count;
		if low == 0 || high < low || high as u64 >= block_count {
			return Err(ConfigError::Watermarks { low, high, block_count });
		}

		Ok(())
	}
}

/// Translation layer configuration
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FtlConfig {
	/// Demand-based page mapping
	PageMapped {
		/// Cached mapping table capacity, in entries
		cache_entries: usize,
	},

	/// Hybrid log-block mapping
	Hybrid {
		/// Maximum number of log blocks
		log_blocks: usize,
	},

	/// Counting only
	Counter,
}

/// Garbage collection configuration
#[derive(Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GcConfig {
	/// Collection starts when fewer than this many blocks are free
	pub low_watermark: usize,

	/// Collection stops once this many blocks are free
	pub high_watermark: usize,

	/// Victim selection policy
	pub victim_policy: VictimPolicyKind,
}

impl Default for GcConfig {
	fn default() -> Self {
		Self {
			low_watermark:  2,
			high_watermark: 3,
			victim_policy:  VictimPolicyKind::default(),
		}
	}
}

/// Victim selection policy
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VictimPolicyKind {
	#[default]
	Greedy,
	CostBenefit,
}

impl VictimPolicyKind {
	/// Creates the policy
	#[must_use]
	pub fn build(self) -> Box<dyn VictimPolicy> {
		match self {
			Self::Greedy => Box::new(Greedy),
			Self::CostBenefit => Box::new(CostBenefit),
		}
	}
}

/// Free block selection policy
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeBlockPolicyKind {
	#[default]
	Fifo,
	LeastErased,
}

impl FreeBlockPolicyKind {
	/// Creates the policy
	#[must_use]
	pub fn build(self) -> Box<dyn FreeBlockPolicy> {
		match self {
			Self::Fifo => Box::new(pool::Fifo),
			Self::LeastErased => Box::new(pool::LeastErased),
		}
	}
}

/// Per-operation latencies, in nanoseconds
#[derive(Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
	pub page_read_ns:   u64,
	pub page_write_ns:  u64,
	pub block_erase_ns: u64,
}

impl Default for LatencyConfig {
	fn default() -> Self {
		Self {
			page_read_ns:   25_000,
			page_write_ns:  200_000,
			block_erase_ns: 1_500_000,
		}
	}
}

/// Unmapped read policy
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedReadPolicy {
	/// Unmapped reads return undefined content and are only counted
	#[default]
	Lenient,

	/// Unmapped reads abort the run
	Strict,
}
