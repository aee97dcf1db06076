use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::io::Cursor;

/// Walks the committed array prefix and checks the double-array invariants:
/// every claimed slot back-points to its group offset, interior slots point
/// inside the used prefix, and the terminal slots are a bijection with the
/// emission ids.
fn validate_arrays<V>(t: &BiTrie<V>) {
    assert_eq!(
        t.base.len(),
        t.array_len + TRAIL_HEADROOM,
        "arrays must keep the fixed trailing headroom"
    );
    assert_eq!(t.base.len(), t.check.len());

    if !t.is_empty() {
        assert_eq!(t.base[ROOT], 1, "root base convention");
    }

    let mut seen = vec![false; t.len()];
    for i in 0..t.array_len {
        let b = t.check[i];
        if b == 0 {
            continue;
        }
        assert!(b >= 1, "group offsets start at 1 (slot {i})");
        assert!(
            (b as usize) <= i,
            "slot {i} back-points past itself ({b})"
        );

        let n = t.base[i];
        if n < 0 {
            let id = (-n - 1) as usize;
            assert!(id < t.len(), "emission id {id} out of range");
            assert!(!seen[id], "emission id {id} committed twice");
            seen[id] = true;
        } else {
            assert!(n >= 1, "interior slot {i} has no placement");
            assert!(
                (n as usize) < t.array_len,
                "interior slot {i} points outside the used prefix"
            );
        }
    }

    assert!(
        seen.iter().all(|&s| s),
        "every emission id must be reachable from exactly one slot"
    );
}

fn nested(pairs: &[((u32, u32), u64)]) -> BTreeMap<u32, BTreeMap<u32, u64>> {
    let mut map: BTreeMap<u32, BTreeMap<u32, u64>> = BTreeMap::new();
    for &((outer, inner), value) in pairs {
        map.entry(outer).or_default().insert(inner, value);
    }
    map
}

fn pairs_strategy() -> impl Strategy<Value = Vec<((u32, u32), u64)>> {
    prop::collection::vec(((0u32..64, 0u32..64), any::<u64>()), 0..300)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_oracle_equivalence(pairs in pairs_strategy()) {
        let oracle = nested(&pairs);
        let t = BiTrie::from_map(oracle.clone());

        let count: usize = oracle.values().map(|m| m.len()).sum();
        prop_assert_eq!(t.len(), count);
        validate_arrays(&t);

        // Probe slightly past the key range so absent keys are covered too.
        let mut expected_id = 0usize;
        for outer in 0..66u32 {
            for inner in 0..66u32 {
                let expected = oracle.get(&outer).and_then(|m| m.get(&inner));
                prop_assert_eq!(t.get(&[outer, inner]), expected);
                if expected.is_some() {
                    prop_assert_eq!(t.exact_match(&[outer, inner]), Some(expected_id));
                    expected_id += 1;
                } else {
                    prop_assert_eq!(t.exact_match(&[outer, inner]), None);
                }
            }
        }
        prop_assert_eq!(expected_id, count);
    }

    #[test]
    fn prop_serialize_roundtrip(pairs in pairs_strategy()) {
        let oracle = nested(&pairs);
        let values: Vec<u64> = oracle.values().flat_map(|m| m.values().copied()).collect();
        let t = BiTrie::from_map(oracle.clone());

        let mut buf = Vec::new();
        t.write_to(&mut buf).unwrap();
        let r = BiTrie::read_from(&mut Cursor::new(&buf), values).unwrap();

        prop_assert_eq!(r.len(), t.len());
        prop_assert_eq!(r.array_len(), t.array_len());
        validate_arrays(&r);

        for outer in 0..66u32 {
            for inner in 0..66u32 {
                let key = [outer, inner];
                prop_assert_eq!(r.exact_match(&key), t.exact_match(&key));
                prop_assert_eq!(r.get(&key), t.get(&key));
            }
        }
    }

    #[test]
    fn prop_transition_primitives_agree(pairs in pairs_strategy()) {
        let oracle = nested(&pairs);
        let t = BiTrie::from_map(oracle.clone());

        for outer in 0..66u32 {
            for inner in 0..66u32 {
                let key = [outer, inner];
                let expected = t.exact_match(&key);

                // Base-relative chain plus the terminal decode.
                let stepped = t
                    .transition(t.root_base(), outer)
                    .and_then(|b| t.transition(b, inner))
                    .and_then(|b| t.emission(b));
                prop_assert_eq!(stepped, expected);

                // Index-relative walk with root fallback. A mismatch at the
                // root reports the root itself, so presence shows up as
                // leaving it.
                let s1 = t.transition_with_root(ROOT, outer).unwrap();
                let outer_present = oracle.contains_key(&outer);
                prop_assert_eq!(s1 != ROOT, outer_present);
                if s1 != ROOT {
                    match t.transition_with_root(s1, inner) {
                        Some(s2) => {
                            prop_assert_eq!(t.emission(t.base[s2]), expected);
                            prop_assert!(expected.is_some());
                        }
                        None => prop_assert!(expected.is_none()),
                    }
                }
            }
        }
    }
}

#[test]
fn validate_built_and_reloaded_stress() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(3);
    let mut pairs = Vec::new();
    for _ in 0..20_000 {
        pairs.push((
            (rng.gen_range(0..1024u32), rng.gen_range(0..1024u32)),
            rng.gen::<u64>(),
        ));
    }
    let oracle = nested(&pairs);
    let values: Vec<u64> = oracle.values().flat_map(|m| m.values().copied()).collect();

    let t = BiTrie::from_map(oracle);
    validate_arrays(&t);

    let mut buf = Vec::new();
    t.write_to(&mut buf).unwrap();
    let r = BiTrie::read_from(&mut Cursor::new(&buf), values).unwrap();
    validate_arrays(&r);
}
