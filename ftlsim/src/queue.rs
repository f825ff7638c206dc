//! Queue-depth model

// Imports
use std::{cmp::Reverse, collections::BinaryHeap};

/// Dispatch outcome
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Dispatch {
	/// Service start time
	pub start: u64,

	/// Completion time
	pub completion: u64,

	/// Requests in flight, including the dispatched one
	pub depth: usize,
}

impl Dispatch {
	/// Returns the latency of a request that arrived at `arrival`
	#[must_use]
	pub fn latency(&self, arrival: u64) -> u64 {
		self.completion - arrival
	}
}

/// Queue-depth model.
///
/// Tracks the completion times of in-flight requests, with at most `limit`
/// outstanding at once. A request arriving while the queue is full waits for
/// the earliest in-flight request to complete.
#[derive(Clone, Debug)]
pub struct QueueModel {
	/// Outstanding request limit
	limit: usize,

	/// Completion times of in-flight requests
	in_flight: BinaryHeap<Reverse<u64>>,
}

impl QueueModel {
	/// Creates an empty queue.
	///
	/// # Panics
	/// Panics if `limit` is zero.
	#[must_use]
	pub fn new(limit: usize) -> Self {
		assert!(limit > 0, "Queue limit must be non-zero");
		Self {
			limit,
			in_flight: BinaryHeap::with_capacity(limit),
		}
	}

	/// Returns the outstanding request limit
	#[must_use]
	pub fn limit(&self) -> usize {
		self.limit
	}

	/// Returns the number of requests in flight
	#[must_use]
	pub fn len(&self) -> usize {
		self.in_flight.len()
	}

	/// Returns if no requests are in flight
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.in_flight.is_empty()
	}

	/// Dispatches a request arriving at `arrival` that takes `service` to complete
	pub fn dispatch(&mut self, arrival: u64, service: u64) -> Dispatch {
		// Retire everything that completed by now
		while let Some(&Reverse(completion)) = self.in_flight.peek() {
			if completion > arrival {
				break;
			}
			self.in_flight.pop();
		}

		// If we're full, wait for the earliest completion
		let start = match self.in_flight.len() >= self.limit {
			true => match self.in_flight.pop() {
				Some(Reverse(completion)) => completion.max(arrival),
				None => arrival,
			},
			false => arrival,
		};

		let completion = start + service;
		self.in_flight.push(Reverse(completion));

		Dispatch {
			start,
			completion,
			depth: self.in_flight.len(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn waits_when_full() {
		let mut queue = QueueModel::new(2);
		assert_eq!(queue.dispatch(0, 10), Dispatch {
			start:      0,
			completion: 10,
			depth:      1,
		});
		assert_eq!(queue.dispatch(1, 10), Dispatch {
			start:      1,
			completion: 11,
			depth:      2,
		});

		// Full, so it starts once the first one completes
		let dispatch = queue.dispatch(2, 10);
		assert_eq!(dispatch, Dispatch {
			start:      10,
			completion: 20,
			depth:      2,
		});
		assert_eq!(dispatch.latency(2), 18);
	}

	#[test]
	fn retires_completed_requests() {
		let mut queue = QueueModel::new(4);
		queue.dispatch(0, 5);
		queue.dispatch(1, 5);
		assert_eq!(queue.len(), 2);

		// Both completed before this arrival
		assert_eq!(queue.dispatch(100, 5).depth, 1);
	}

	#[test]
	fn depth_never_exceeds_limit() {
		let mut queue = QueueModel::new(3);
		for arrival in 0..50 {
			let dispatch = queue.dispatch(arrival, 100);
			assert!(dispatch.depth <= 3);
			assert!(dispatch.start >= arrival);
		}
	}
}
