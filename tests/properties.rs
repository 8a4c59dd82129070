//! Property-based tests against the two components whose correctness is
//! best expressed as an invariant over arbitrary inputs rather than a
//! handful of fixed cases: SPSC ordering and the region arena's
//! allocate/read round trip.

use proptest::prelude::*;

use seakutils::arena::RegionArena;
use seakutils::ring::spsc;

proptest! {
    // Any sequence of values that fits within one ring's capacity comes
    // back out in exactly the order it went in (spec.md §4.2's FIFO
    // guarantee for a single producer/consumer pair).
    #[test]
    fn spsc_preserves_fifo_order(values in prop::collection::vec(any::<u64>(), 0..200)) {
        let (tx, rx) = spsc::create::<u64>(256).unwrap();
        for &v in &values {
            tx.try_send(v).unwrap();
        }

        let mut out = None;
        for &expected in &values {
            rx.recv(&mut out).unwrap();
            prop_assert_eq!(out.take(), Some(expected));
        }
        prop_assert!(rx.recv(&mut out).is_err());
    }

    // Every value written through `add` reads back unchanged as long as
    // no `reset` has happened in between, regardless of how many regions
    // the allocations spill across.
    #[test]
    fn arena_add_then_get_round_trips(values in prop::collection::vec(any::<u64>(), 1..500)) {
        let arena = RegionArena::<u64>::create(16, 64).unwrap();
        let mut slots = Vec::with_capacity(values.len());
        for &v in &values {
            slots.push(arena.add(v).unwrap());
        }
        for (&slot, &expected) in slots.iter().zip(values.iter()) {
            prop_assert_eq!(arena.get(slot), Some(expected));
        }
    }

    // A `reset` followed by re-allocating exactly as many slots as
    // before always starts back at region 0, regardless of how far
    // across the regions the first round of allocation reached.
    #[test]
    fn arena_reset_rewinds_to_region_zero(first_round in 1usize..200) {
        let arena = RegionArena::<u64>::create(8, 32).unwrap();
        for i in 0..first_round {
            arena.add(i as u64).unwrap();
        }
        arena.reset();
        let slot = arena.add(42).unwrap();
        prop_assert_eq!(arena.region_of(slot), 0);
        prop_assert_eq!(arena.get(slot), Some(42));
    }
}
