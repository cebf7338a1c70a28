use std::collections::HashSet;
use swarm_emulator::engine::planner::{plan, plan_with_capacity, ANY_HOST};
use swarm_emulator::EmulatorError;

#[test]
fn single_middleware_gets_one_bucket() {
    let plan = plan(1, 14567).unwrap();
    assert_eq!(plan.buckets.len(), 1);
    assert_eq!(plan.buckets[0].ports(), &[14567]);
    assert_eq!(plan.endpoints.len(), 1);
    assert_eq!(plan.endpoints[0].index, 0);
    assert_eq!(plan.endpoints[0].host, ANY_HOST);
    assert_eq!(plan.endpoints[0].port, 14567);
}

#[test]
fn two_hundred_fifty_middlewares_fill_three_buckets() {
    let plan = plan(250, 14567).unwrap();
    let sizes: Vec<usize> = plan.buckets.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![100, 100, 50]);

    let all: Vec<u16> = plan
        .buckets
        .iter()
        .flat_map(|b| b.ports().iter().copied())
        .collect();
    let expected: Vec<u16> = (14567..=14816).collect();
    assert_eq!(all, expected);

    assert_eq!(plan.buckets[1].first_index(), 100);
    assert_eq!(plan.buckets[2].first_index(), 200);
}

#[test]
fn zero_middlewares_yields_one_empty_bucket() {
    let plan = plan(0, 14567).unwrap();
    assert_eq!(plan.buckets.len(), 1);
    assert!(plan.buckets[0].is_empty());
    assert!(plan.endpoints.is_empty());
    assert_eq!(plan.total_ports(), 0);
}

#[test]
fn negative_count_is_invalid_configuration() {
    let err = plan(-5, 14567).unwrap_err();
    assert!(matches!(err, EmulatorError::InvalidConfiguration(_)));
}

#[test]
fn port_range_overflow_is_invalid_configuration() {
    assert!(plan(1, u16::MAX).is_ok());
    let err = plan(2, u16::MAX).unwrap_err();
    assert!(matches!(err, EmulatorError::InvalidConfiguration(_)));
}

#[test]
fn capacity_outside_limits_is_rejected() {
    assert!(plan_with_capacity(10, 20000, 0).is_err());
    assert!(plan_with_capacity(10, 20000, 101).is_err());
}

#[test]
fn buckets_partition_a_contiguous_unique_range() {
    for n in [1usize, 7, 99, 100, 101, 199, 200, 201, 1000] {
        let plan = plan(n as i64, 20000).unwrap();

        assert_eq!(plan.buckets.len(), n.div_ceil(100), "bucket count for n={}", n);
        let (last, full) = plan.buckets.split_last().unwrap();
        assert!(full.iter().all(|b| b.len() == 100), "n={}", n);
        assert!(!last.is_empty() && last.len() <= 100, "n={}", n);

        let ports: Vec<u16> = plan
            .buckets
            .iter()
            .flat_map(|b| b.ports().iter().copied())
            .collect();
        assert_eq!(ports.len(), n);
        let unique: HashSet<u16> = ports.iter().copied().collect();
        assert_eq!(unique.len(), n);
        for (i, port) in ports.iter().enumerate() {
            assert_eq!(*port as usize, 20000 + i);
        }

        for (i, spec) in plan.endpoints.iter().enumerate() {
            assert_eq!(spec.index, i);
            assert_eq!(spec.port as usize, 20000 + i);
        }
    }
}

#[test]
fn bucket_endpoints_carry_global_indices() {
    let plan = plan_with_capacity(5, 30000, 2).unwrap();
    let third: Vec<_> = plan.buckets[2].endpoints().collect();
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].index, 4);
    assert_eq!(third[0].port, 30004);
    assert_eq!(third[0].bind_addr(), "0.0.0.0:30004");
}
