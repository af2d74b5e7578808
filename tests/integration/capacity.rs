//! Capacity algebra integration tests.
//!
//! Property tests for the invariants every capacity operation must keep,
//! plus the machine count planning examples.

use machina::{
    AgentUid, CapacityError, CapacityRequirement, CapacityRequirementType, CapacityRequirements,
    CapacityRequirementsPerAgent, calc_number_of_machines,
};
use proptest::prelude::*;

use crate::common::memory;

fn requirement_type() -> impl Strategy<Value = CapacityRequirementType> {
    prop_oneof![
        Just(CapacityRequirementType::Memory),
        Just(CapacityRequirementType::Cpu),
        Just(CapacityRequirementType::NumberOfMachines),
        Just(CapacityRequirementType::Drive("/data".into())),
        Just(CapacityRequirementType::Drive("/logs".into())),
    ]
}

fn capacity() -> impl Strategy<Value = CapacityRequirements> {
    prop::collection::btree_map(requirement_type(), 0..1_000_000u64, 0..5).prop_map(|amounts| {
        CapacityRequirements::new(
            amounts
                .into_iter()
                .map(|(requirement_type, amount)| CapacityRequirement::new(requirement_type, amount)),
        )
        .unwrap()
    })
}

fn agent() -> impl Strategy<Value = AgentUid> {
    (0..6u8).prop_map(|n| AgentUid::new(format!("agent-{}", n)))
}

proptest! {
    #[test]
    fn absent_type_is_zero(capacity in capacity(), requirement_type in requirement_type()) {
        if !capacity.types().any(|t| t == &requirement_type) {
            prop_assert!(capacity.requirement(&requirement_type).is_zero());
        }
    }

    #[test]
    fn add_then_subtract_restores(a in capacity(), b in capacity()) {
        let sum = a.add(&b).unwrap();
        prop_assert!(sum.greater_or_equals(&a));
        prop_assert_eq!(sum.subtract(&b).unwrap(), a);
    }

    #[test]
    fn no_stored_requirement_is_zero(a in capacity(), b in capacity()) {
        let difference = a.subtract_or_zero(&b);
        prop_assert!(difference.requirements().all(|r| !r.is_zero()));
        prop_assert!(a.max(&b).requirements().all(|r| !r.is_zero()));
        prop_assert!(a.min(&b).requirements().all(|r| !r.is_zero()));
    }

    #[test]
    fn subtract_or_zero_is_idempotent_once_zero(a in capacity(), b in capacity()) {
        let once = a.subtract_or_zero(&b).subtract_or_zero(&a);
        prop_assert!(once.is_zero());
        prop_assert!(once.subtract_or_zero(&b).is_zero());
    }

    #[test]
    fn subtract_fails_unless_greater_or_equal(a in capacity(), b in capacity()) {
        match a.subtract(&b) {
            Ok(_) => prop_assert!(a.greater_or_equals(&b)),
            Err(err) => {
                prop_assert!(!a.greater_or_equals(&b));
                let is_negative = matches!(err, CapacityError::NegativeCapacity { .. });
                prop_assert!(is_negative);
            }
        }
    }

    #[test]
    fn multiply_divides_exactly(a in capacity(), k in 1..50u32) {
        let scaled = a.multiply(k).unwrap();
        if a.is_zero() {
            prop_assert_eq!(scaled.divide_exactly(&a), None);
        } else {
            prop_assert_eq!(scaled.divide_exactly(&a), Some(u64::from(k)));
        }
    }

    #[test]
    fn per_agent_total_is_sum(
        allocations in prop::collection::vec((agent(), capacity()), 0..20),
    ) {
        let mut per_agent = CapacityRequirementsPerAgent::new();
        for (uid, capacity) in &allocations {
            if capacity.is_zero() {
                prop_assert!(per_agent.add(uid.clone(), capacity).is_err());
                continue;
            }
            per_agent = per_agent.add(uid.clone(), capacity).unwrap();
        }

        let mut sum = CapacityRequirements::zero();
        for uid in per_agent.agent_uids() {
            let capacity = per_agent.agent_capacity(uid).unwrap();
            prop_assert!(!capacity.is_zero());
            sum = sum.add(capacity).unwrap();
        }
        prop_assert_eq!(per_agent.total_allocated_capacity(), &sum);
    }

    #[test]
    fn per_agent_release_returns_to_empty(
        allocations in prop::collection::vec((agent(), capacity()), 0..20),
    ) {
        let mut per_agent = CapacityRequirementsPerAgent::new();
        for (uid, capacity) in allocations.iter().filter(|(_, c)| !c.is_zero()) {
            per_agent = per_agent.add(uid.clone(), capacity).unwrap();
        }
        let snapshot = per_agent.clone();

        let released = per_agent.subtract_all(&snapshot).unwrap();

        prop_assert!(released.is_empty());
        prop_assert!(released.total().is_zero());
    }
}

#[test]
fn test_constructor_keeps_requirements() {
    let r1 = CapacityRequirement::memory_mb(1024);
    let r2 = CapacityRequirement::cpu_cores(2);

    let capacity = CapacityRequirements::new([r1.clone(), r2.clone()]).unwrap();

    assert_eq!(capacity.requirement(r1.requirement_type()), r1);
    assert_eq!(capacity.requirement(r2.requirement_type()), r2);
}

#[test]
fn test_memory_addition() {
    let sum = memory(1024).add(&memory(512)).unwrap();

    assert_eq!(sum, memory(1536));
    assert_eq!(sum.to_string(), "1536MB RAM");
}

#[test]
fn test_machine_count_for_memory() {
    let machines = calc_number_of_machines(
        &memory(5000),
        &memory(2048),
        &CapacityRequirements::zero(),
    );

    assert_eq!(machines, Ok(3));
}

#[test]
fn test_per_agent_unknown_key() {
    let per_agent = CapacityRequirementsPerAgent::new()
        .add(AgentUid::new("a"), &memory(100))
        .unwrap();

    let result = per_agent.subtract(&AgentUid::new("b"), &memory(10));

    assert!(matches!(result, Err(CapacityError::KeyNotFound(_))));
    // The receiver is untouched.
    assert_eq!(per_agent.total_allocated_capacity(), &memory(100));
}

#[test]
fn test_divide_exactly_boundaries() {
    let unit = CapacityRequirements::new([
        CapacityRequirement::memory_mb(512),
        CapacityRequirement::cpu_cores(1),
    ])
    .unwrap();
    let uneven = CapacityRequirements::new([
        CapacityRequirement::memory_mb(1024),
        CapacityRequirement::cpu_cores(3),
    ])
    .unwrap();

    assert_eq!(unit.multiply(4).unwrap().divide_exactly(&unit), Some(4));
    assert_eq!(uneven.divide_exactly(&unit), None);
    assert_eq!(unit.divide_exactly(&CapacityRequirements::zero()), None);
    assert_eq!(memory(1024).divide_exactly(&unit), None);
}
