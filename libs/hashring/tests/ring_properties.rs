//! Ring routing properties: determinism, minimal disruption and load spread

use hashring::{HashAlgorithm, HashRing};
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Op {
    Add(u8),
    Remove(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..12).prop_map(Op::Add),
        (0u8..12).prop_map(Op::Remove),
    ]
}

fn apply(ring: &HashRing<String>, ops: &[Op]) {
    for op in ops {
        match op {
            Op::Add(n) => ring.add(format!("tcp://10.0.0.{}:7000", n)),
            Op::Remove(n) => {
                ring.remove_key(&format!("tcp://10.0.0.{}:7000", n));
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn independent_rings_agree(ops in proptest::collection::vec(op_strategy(), 1..40),
                               keys in proptest::collection::vec("[a-z0-9:]{1,24}", 1..50)) {
        let left = HashRing::new(40).unwrap();
        let right = HashRing::new(40).unwrap();
        apply(&left, &ops);
        apply(&right, &ops);

        prop_assert_eq!(left.node_count(), right.node_count());
        for key in &keys {
            prop_assert_eq!(left.get(key), right.get(key));
        }
    }

    #[test]
    fn sha3_rings_agree(ops in proptest::collection::vec(op_strategy(), 1..20)) {
        let left = HashRing::with_hasher(20, HashAlgorithm::Sha3.hasher()).unwrap();
        let right = HashRing::with_hasher(20, HashAlgorithm::Sha3.hasher()).unwrap();
        apply(&left, &ops);
        apply(&right, &ops);

        for i in 0..100 {
            let key = format!("actor:{}", i);
            prop_assert_eq!(left.get(&key), right.get(&key));
        }
    }

    #[test]
    fn duplicate_add_keeps_routing(nodes in proptest::collection::btree_set(0u8..50, 1..8),
                                   dup in 0u8..50) {
        let once = HashRing::new(30).unwrap();
        let twice = HashRing::new(30).unwrap();
        for n in &nodes {
            once.add(format!("node-{}", n));
            twice.add(format!("node-{}", n));
        }
        if nodes.contains(&dup) {
            twice.add(format!("node-{}", dup));
        }

        prop_assert_eq!(once.node_count(), twice.node_count());
        for i in 0..200 {
            let key = format!("k{}", i);
            prop_assert_eq!(once.get(&key), twice.get(&key));
        }
    }
}

#[test]
fn adding_a_node_moves_few_keys() {
    let ring = HashRing::new(150).unwrap();
    for n in 0..4 {
        ring.add(format!("node-{}", n));
    }

    let keys: Vec<String> = (0..10_000).map(|i| format!("actor:{}", i)).collect();
    let before: Vec<String> = keys.iter().map(|k| ring.get(k).unwrap()).collect();

    ring.add("node-4".to_string());
    let moved = keys
        .iter()
        .zip(&before)
        .filter(|(key, old)| ring.get(key).as_ref() != Some(*old))
        .count();

    // Ideal share is 1/5 of the keys; allow generous statistical slack
    let ratio = moved as f64 / keys.len() as f64;
    assert!(ratio < 0.30, "moved {:.3} of keys", ratio);

    // Every moved key moved onto the new node
    for (key, old) in keys.iter().zip(&before) {
        let now = ring.get(key).unwrap();
        if &now != old {
            assert_eq!(now, "node-4");
        }
    }
}

#[test]
fn load_spreads_across_members() {
    let ring = HashRing::new(150).unwrap();
    for n in 0..5 {
        ring.add(format!("node-{}", n));
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for i in 0..20_000 {
        *counts.entry(ring.get(&format!("actor:{}", i)).unwrap()).or_default() += 1;
    }

    assert_eq!(counts.len(), 5);
    for (node, count) in counts {
        // Fair share is 4000
        assert!(count > 2000 && count < 6000, "{} owns {}", node, count);
    }
}
