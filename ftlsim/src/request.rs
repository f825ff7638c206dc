//! Requests and completions

// Imports
use {
	crate::flash::Lpn,
	std::ops::Range,
};

/// Request operation
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(bincode::Encode, bincode::Decode)]
pub enum Op {
	Read,
	Write,
	Discard,
}

/// Request event
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Request {
	/// Operation
	pub op: Op,

	/// Logical pages accessed
	pub lpns: Range<u64>,

	/// Size, in bytes
	pub size: u64,

	/// Arrival time, in nanoseconds
	pub time: u64,
}

impl Request {
	/// Creates a request over whole pages
	#[must_use]
	pub fn new(op: Op, lpns: Range<u64>, page_size: u64, time: u64) -> Self {
		let size = lpns.end.saturating_sub(lpns.start).saturating_mul(page_size);
		Self { op, lpns, size, time }
	}

	/// Creates a request from a byte extent.
	///
	/// Every page the extent touches is accessed, even partially.
	/// Returns `None` if the extent ends past `u64::MAX`.
	#[must_use]
	pub fn from_bytes(op: Op, offset: u64, size: u64, page_size: u64, time: u64) -> Option<Self> {
		let start = offset / page_size;
		let end = match size {
			0 => start,
			_ => offset.checked_add(size)?.div_ceil(page_size),
		};

		Some(Self {
			op,
			lpns: start..end,
			size,
			time,
		})
	}

	/// Returns the logical pages accessed
	pub fn lpns(&self) -> impl Iterator<Item = Lpn> {
		self.lpns.clone().map(Lpn)
	}

	/// Returns the number of logical pages accessed
	#[must_use]
	pub fn page_count(&self) -> u64 {
		self.lpns.end.saturating_sub(self.lpns.start)
	}
}

/// Completion record
#[derive(PartialEq, Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(bincode::Encode, bincode::Decode)]
pub struct Completion {
	/// Request index within the run
	pub idx: u64,

	/// Operation
	pub op: Op,

	/// Arrival time
	pub arrival: u64,

	/// Completion time
	pub time: u64,

	/// Latency, from arrival to completion
	pub latency: u64,

	// Physical operations caused by the request
	pub pages_read:    u64,
	pub pages_written: u64,
	pub erases:        u64,

	/// Whether garbage collection (or a merge) ran
	pub gc_ran: bool,

	/// Requests in flight when dispatched, including this one
	pub queue_depth: u64,
}

/// Completion sink
pub trait CompletionSink {
	/// Receives a completion
	fn complete(&mut self, completion: Completion);
}

impl CompletionSink for Vec<Completion> {
	fn complete(&mut self, completion: Completion) {
		self.push(completion);
	}
}

impl<F: FnMut(Completion)> CompletionSink for F {
	fn complete(&mut self, completion: Completion) {
		self(completion);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn from_bytes(op: Op, offset: u64, size: u64) -> Request {
		Request::from_bytes(op, offset, size, 4096, 0).expect("Extent should fit")
	}

	#[test]
	fn from_bytes_covers_touched_pages() {
		let req = from_bytes(Op::Write, 4096, 4096);
		assert_eq!(req.lpns, 1..2);

		let req = from_bytes(Op::Write, 2048, 4096);
		assert_eq!(req.lpns, 0..2);

		let req = from_bytes(Op::Read, 8192, 1);
		assert_eq!(req.lpns, 2..3);
		assert_eq!(req.page_count(), 1);

		let req = from_bytes(Op::Discard, 8192, 0);
		assert_eq!(req.page_count(), 0);
	}

	#[test]
	fn from_bytes_rejects_overflowing_extents() {
		assert_eq!(Request::from_bytes(Op::Write, u64::MAX - 10, 4096, 4096, 0), None);

		// Ending exactly at the last byte still fits
		let req = from_bytes(Op::Read, u64::MAX - 4095, 4095);
		assert_eq!(req.lpns, (u64::MAX / 4096)..(u64::MAX.div_ceil(4096)));
	}

	#[test]
	fn new_sets_size() {
		let req = Request::new(Op::Write, 3..7, 2048, 10);
		assert_eq!(req.size, 4 * 2048);
		assert_eq!(req.lpns().collect::<Vec<_>>(), [Lpn(3), Lpn(4), Lpn(5), Lpn(6)]);
	}

	#[test]
	fn new_with_reversed_range_is_empty() {
		let (start, end) = (7, 3);
		let req = Request::new(Op::Write, start..end, 2048, 10);
		assert_eq!(req.size, 0);
		assert_eq!(req.page_count(), 0);
		assert_eq!(req.lpns().count(), 0);
	}
}
