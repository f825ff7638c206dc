//! Properties every translation layer must keep, over random workloads

// Imports
use {
	ftlsim::{
		config::FtlConfig,
		flash::{Geometry, Lpn, Ppa},
		oob::PageOwner,
		Config,
		Ftl,
		FtlError,
		Location,
		Op,
		Request,
		Simulator,
	},
	proptest::prelude::*,
	std::collections::HashMap,
};

/// Logical page accesses, as `(op, lpn)`
fn accesses(logical_pages: u64) -> impl Strategy<Value = Vec<(Op, u64)>> {
	let op = prop_oneof![
		1 => Just(Op::Read),
		4 => Just(Op::Write),
		1 => Just(Op::Discard),
	];
	prop::collection::vec((op, 0..logical_pages), 1..400)
}

fn simulator(ftl: FtlConfig, over_provisioning: f64) -> Simulator {
	let geometry = Geometry {
		page_size:       4096,
		pages_per_block: 4,
		block_count:     16,
	};
	let mut config = Config::new(geometry, ftl);
	config.over_provisioning = over_provisioning;
	Simulator::new(config).expect("Unable to create simulator")
}

/// Replays `accesses`, returning which logical pages are live at the end
fn replay(sim: &mut Simulator, accesses: &[(Op, u64)]) -> HashMap<Lpn, bool> {
	let mut live = HashMap::new();
	for (time, &(op, lpn)) in accesses.iter().enumerate() {
		let request = Request::new(op, lpn..(lpn + 1), 4096, time as u64);
		sim.submit(&request).expect("Request failed");

		match op {
			Op::Write => live.insert(Lpn(lpn), true),
			Op::Discard => live.insert(Lpn(lpn), false),
			Op::Read => None,
		};
	}

	live
}

/// Checks the properties shared by all flash-backed layers.
///
/// `lookup` returns the page a logical page is currently mapped to.
fn check_properties(sim: &Simulator, live: &HashMap<Lpn, bool>, lookup: impl Fn(Lpn) -> Option<Ppa>) {
	let flash = &sim.ssd().flash;
	flash.check_invariants().expect("Invariants broken");

	// Every live logical page has exactly one valid page, and dead ones have none
	let mut valid_pages = HashMap::<Lpn, u64>::new();
	for block in flash.geometry().blocks() {
		for (_, owner) in flash.oob().valid_pages(block) {
			if let PageOwner::Data(lpn) = owner {
				*valid_pages.entry(lpn).or_default() += 1;
			}
		}
	}
	for lpn in (0..sim.ssd().logical_pages()).map(Lpn) {
		let is_live = live.get(&lpn).copied().unwrap_or(false);
		let expected = u64::from(is_live);
		assert_eq!(valid_pages.get(&lpn).copied().unwrap_or(0), expected, "{lpn} valid pages");

		// And reading it goes to that page
		match lookup(lpn) {
			Some(ppa) => {
				assert!(is_live, "{lpn} is mapped after being discarded");
				assert_eq!(flash.oob().reverse_lookup(ppa), Some(PageOwner::Data(lpn)));
			},
			None => assert!(!is_live, "{lpn} isn't mapped after being written"),
		}
	}

	// Write amplification is only 1 when nothing but host data was written
	if let Some(write_amplification) = sim.metrics().write_amplification() {
		let counters = &sim.metrics().counters;
		assert!(write_amplification >= 1.0);
		if write_amplification == 1.0 {
			assert_eq!(counters.pages_moved, 0);
			assert_eq!(counters.translation_pages_written, 0);
		}
	}
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(64))]

	#[test]
	fn page_mapped_properties(accesses in accesses(48)) {
		let mut sim = simulator(FtlConfig::PageMapped { cache_entries: 4 }, 0.25);
		let live = replay(&mut sim, &accesses);

		let Ftl::PageMapped(dftl) = sim.ftl() else {
			panic!("Expected the page mapped layer");
		};
		check_properties(&sim, &live, |lpn| dftl.mapping(lpn));
		prop_assert!(dftl.cmt().len() <= 4);
	}

	#[test]
	fn hybrid_properties(accesses in accesses(32)) {
		let mut sim = simulator(FtlConfig::Hybrid { log_blocks: 4 }, 0.5);
		let live = replay(&mut sim, &accesses);

		let Ftl::Hybrid(hybrid) = sim.ftl() else {
			panic!("Expected the hybrid layer");
		};
		prop_assert!(hybrid.log_blocks().len() <= 4);
		check_properties(&sim, &live, |lpn| match hybrid.translate(sim.ssd(), lpn) {
			Ok(Location::Page(ppa)) => Some(ppa),
			Ok(Location::Unmodeled) => panic!("Hybrid layer doesn't map {lpn} to a page"),
			Err(FtlError::UnmappedRead { .. }) => None,
			Err(err) => panic!("Unable to translate {lpn}: {err}"),
		});
	}
}
