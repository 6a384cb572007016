//! Per-offer resource accounting.
//!
//! A [`ResourceLedger`] is built fresh from one offer for one placement
//! attempt. Each named resource is split into a role-reserved pool and a
//! default pool. Consumption draws from the reserved pool first and returns
//! the fragments it took, tagged by the pool they came from.
//!
//! A failed consume may leave the ledger partially drawn down. Ledgers are
//! thrown away after the attempt, so that state is never observed.

use std::collections::HashMap;

use flex_model::{
    Resource, ResourceOffer, ResourceProfile, ResourceValue, ValueRange, DEFAULT_ROLE,
    RESOURCE_CPUS, RESOURCE_MEM, RESOURCE_PORTS,
};
use rand::rngs::StdRng;
use rand::seq::index;
use thiserror::Error;
use tracing::debug;

/// Tolerance for scalar comparisons.
const EPSILON: f64 = 1e-6;

/// Errors from consuming ledger resources.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("insufficient {name}: requested {requested}, available {available}")]
    Insufficient {
        name: String,
        requested: f64,
        available: f64,
    },

    #[error("invalid amount {value} for {name}")]
    InvalidAmount { name: String, value: f64 },

    #[error("{name} value {value} is not available")]
    ValueUnavailable { name: String, value: u64 },

    #[error("not enough {name}: requested {requested}, available {available}")]
    NotEnoughValues {
        name: String,
        requested: usize,
        available: u64,
    },
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, Copy, Default)]
struct ScalarPool {
    reserved: f64,
    default: f64,
}

impl ScalarPool {
    fn total(&self) -> f64 {
        self.reserved + self.default
    }
}

#[derive(Debug, Clone, Copy)]
struct RangeEntry {
    range: ValueRange,
    reserved: bool,
}

/// One value taken from a range resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignedValue {
    pub value: u64,
    /// True if the value came from a role-reserved range.
    pub reserved: bool,
}

/// Resource accounting for a single offer.
pub struct ResourceLedger {
    role: String,
    scalars: HashMap<String, ScalarPool>,
    ranges: HashMap<String, Vec<RangeEntry>>,
    rng: StdRng,
}

impl ResourceLedger {
    /// Builds a ledger from an offer.
    ///
    /// An entry is role-reserved when its role equals `role` and `role` is
    /// not the default role. Reserved entries accumulate, they never
    /// overwrite. `rng` draws wildcard range values.
    pub fn new(offer: &ResourceOffer, role: &str, rng: StdRng) -> Self {
        let role_is_reserving = role != DEFAULT_ROLE;
        let mut scalars: HashMap<String, ScalarPool> = HashMap::new();
        let mut ranges: HashMap<String, Vec<RangeEntry>> = HashMap::new();

        for resource in &offer.resources {
            let reserved = role_is_reserving && resource.role.as_deref() == Some(role);
            match &resource.value {
                ResourceValue::Scalar(value) => {
                    let pool = scalars.entry(resource.name.clone()).or_default();
                    if reserved {
                        pool.reserved += value;
                    } else {
                        pool.default += value;
                    }
                }
                ResourceValue::Ranges(values) => {
                    ranges.entry(resource.name.clone()).or_default().extend(
                        values
                            .iter()
                            .filter(|r| !r.is_empty())
                            .map(|range| RangeEntry {
                                range: *range,
                                reserved,
                            }),
                    );
                }
            }
        }

        Self {
            role: role.to_string(),
            scalars,
            ranges,
            rng,
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Remaining amount of a scalar resource across both pools.
    pub fn scalar_total(&self, name: &str) -> f64 {
        self.scalars.get(name).map(ScalarPool::total).unwrap_or(0.0)
    }

    pub fn scalar_reserved(&self, name: &str) -> f64 {
        self.scalars.get(name).map(|p| p.reserved).unwrap_or(0.0)
    }

    pub fn scalar_default(&self, name: &str) -> f64 {
        self.scalars.get(name).map(|p| p.default).unwrap_or(0.0)
    }

    /// Number of values left in a range resource across both pools.
    pub fn range_count(&self, name: &str) -> u64 {
        self.ranges
            .get(name)
            .map(|entries| total_len(entries.iter()))
            .unwrap_or(0)
    }

    pub fn contains_value(&self, name: &str, value: u64) -> bool {
        self.ranges
            .get(name)
            .is_some_and(|entries| entries.iter().any(|e| e.range.contains(value)))
    }

    /// Remaining ranges of a resource, in ledger order.
    pub fn ranges(&self, name: &str) -> Vec<ValueRange> {
        self.ranges
            .get(name)
            .map(|entries| entries.iter().map(|e| e.range).collect())
            .unwrap_or_default()
    }

    /// True if the offer can host the profile, executor overhead included.
    pub fn satisfies(&self, profile: &ResourceProfile) -> bool {
        let cpus = self.scalar_total(RESOURCE_CPUS);
        let mem = self.scalar_total(RESOURCE_MEM);

        if cpus + EPSILON < profile.aggregate_cpus() {
            debug!(available = cpus, required = profile.aggregate_cpus(), "Offer short on cpus");
            return false;
        }
        if mem + EPSILON < profile.aggregate_memory() {
            debug!(available = mem, required = profile.aggregate_memory(), "Offer short on mem");
            return false;
        }

        let requested = u64::try_from(profile.ports.len()).unwrap_or(u64::MAX);
        if requested > self.range_count(RESOURCE_PORTS) {
            debug!(requested, "Offer short on ports");
            return false;
        }

        profile
            .ports
            .values()
            .filter(|p| **p != 0)
            .all(|p| self.contains_value(RESOURCE_PORTS, *p))
    }

    /// Consumes `value` of a scalar resource, reserved pool first.
    ///
    /// Returns up to two fragments: the role-tagged share and the untagged
    /// default share. Asking for more than the ledger holds is an error and
    /// consumes nothing.
    pub fn consume_scalar(&mut self, name: &str, value: f64) -> LedgerResult<Vec<Resource>> {
        if !value.is_finite() || value < 0.0 {
            return Err(LedgerError::InvalidAmount {
                name: name.to_string(),
                value,
            });
        }

        let available = self.scalar_total(name);
        if value > available + EPSILON {
            return Err(LedgerError::Insufficient {
                name: name.to_string(),
                requested: value,
                available,
            });
        }
        if value == 0.0 {
            return Ok(Vec::new());
        }

        let Some(pool) = self.scalars.get_mut(name) else {
            return Err(LedgerError::Insufficient {
                name: name.to_string(),
                requested: value,
                available: 0.0,
            });
        };

        let from_reserved = value.min(pool.reserved);
        let from_default = (value - from_reserved).min(pool.default);
        pool.reserved -= from_reserved;
        pool.default -= from_default;

        let mut fragments = Vec::with_capacity(2);
        if from_reserved > 0.0 {
            fragments.push(Resource::scalar(name, from_reserved).with_role(self.role.clone()));
        }
        if from_default > 0.0 {
            fragments.push(Resource::scalar(name, from_default));
        }
        Ok(fragments)
    }

    /// Consumes values from a range resource.
    ///
    /// Explicit non-zero values are removed from whichever range holds them.
    /// Each `0` draws a random unused value from the default pool. Results
    /// are returned in request order.
    pub fn consume_values(
        &mut self,
        name: &str,
        requested: &[u64],
    ) -> LedgerResult<Vec<AssignedValue>> {
        let available = self.range_count(name);
        if u64::try_from(requested.len()).unwrap_or(u64::MAX) > available {
            return Err(LedgerError::NotEnoughValues {
                name: name.to_string(),
                requested: requested.len(),
                available,
            });
        }

        let Self { ranges, rng, .. } = self;
        let entries = ranges.entry(name.to_string()).or_default();
        let mut assigned: Vec<Option<AssignedValue>> = vec![None; requested.len()];

        for (slot, &value) in requested.iter().enumerate().filter(|(_, v)| **v != 0) {
            let reserved =
                remove_value(entries, value).ok_or_else(|| LedgerError::ValueUnavailable {
                    name: name.to_string(),
                    value,
                })?;
            assigned[slot] = Some(AssignedValue { value, reserved });
        }

        let wildcard_slots: Vec<usize> = requested
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == 0)
            .map(|(slot, _)| slot)
            .collect();

        if !wildcard_slots.is_empty() {
            let pool_len = total_len(entries.iter().filter(|e| !e.reserved));
            let pool_len_usize = usize::try_from(pool_len).unwrap_or(usize::MAX);
            if wildcard_slots.len() > pool_len_usize {
                return Err(LedgerError::NotEnoughValues {
                    name: name.to_string(),
                    requested: wildcard_slots.len(),
                    available: pool_len,
                });
            }

            let mut picks = Vec::with_capacity(wildcard_slots.len());
            for position in index::sample(rng, pool_len_usize, wildcard_slots.len()) {
                let position = u64::try_from(position).unwrap_or(u64::MAX);
                let value = nth_default_value(entries, position).ok_or_else(|| {
                    LedgerError::NotEnoughValues {
                        name: name.to_string(),
                        requested: wildcard_slots.len(),
                        available: pool_len,
                    }
                })?;
                picks.push(value);
            }

            for (slot, value) in wildcard_slots.into_iter().zip(picks) {
                let reserved =
                    remove_value(entries, value).ok_or_else(|| LedgerError::ValueUnavailable {
                        name: name.to_string(),
                        value,
                    })?;
                assigned[slot] = Some(AssignedValue { value, reserved });
            }
        }

        Ok(assigned.into_iter().flatten().collect())
    }

    /// Consumes ports. See [`ResourceLedger::consume_values`].
    pub fn consume_ports(&mut self, requested: &[u64]) -> LedgerResult<Vec<AssignedValue>> {
        self.consume_values(RESOURCE_PORTS, requested)
    }

    /// The launch fragment for one assigned range value.
    pub fn value_fragment(&self, name: &str, assigned: AssignedValue) -> Resource {
        let fragment = Resource::ranges(name, vec![ValueRange::single(assigned.value)]);
        if assigned.reserved {
            fragment.with_role(self.role.clone())
        } else {
            fragment
        }
    }
}

/// Removes `value` from `range`, returning what is left of it.
///
/// A range that does not hold `value` comes back unchanged.
pub fn split_range(range: ValueRange, value: u64) -> Vec<ValueRange> {
    let ValueRange { begin, end } = range;
    if !range.contains(value) {
        return vec![range];
    }
    match (value == begin, value == end) {
        (true, true) => Vec::new(),
        (false, true) => vec![ValueRange::new(begin, value - 1)],
        (true, false) => vec![ValueRange::new(value + 1, end)],
        (false, false) => vec![
            ValueRange::new(begin, value - 1),
            ValueRange::new(value + 1, end),
        ],
    }
}

/// Removes a value in place, keeping the containing entry's pool.
fn remove_value(entries: &mut Vec<RangeEntry>, value: u64) -> Option<bool> {
    let idx = entries.iter().position(|e| e.range.contains(value))?;
    let entry = entries[idx];
    let pieces = split_range(entry.range, value)
        .into_iter()
        .map(|range| RangeEntry {
            range,
            reserved: entry.reserved,
        });
    entries.splice(idx..=idx, pieces);
    Some(entry.reserved)
}

/// Values across entries, saturating at `u64::MAX`.
fn total_len<'a>(entries: impl Iterator<Item = &'a RangeEntry>) -> u64 {
    entries.fold(0u64, |acc, e| acc.saturating_add(e.range.len()))
}

fn nth_default_value(entries: &[RangeEntry], mut n: u64) -> Option<u64> {
    for entry in entries.iter().filter(|e| !e.reserved) {
        let len = entry.range.len();
        if n < len {
            return Some(entry.range.begin + n);
        }
        n -= len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rstest::rstest;

    fn offer(resources: Vec<Resource>) -> ResourceOffer {
        ResourceOffer {
            id: "offer-1".parse().unwrap(),
            hostname: "host-1".to_string(),
            agent_id: "agent-1".parse().unwrap(),
            framework_id: "fw-1".parse().unwrap(),
            resources,
            attributes: vec![],
        }
    }

    fn ledger(resources: Vec<Resource>, role: &str) -> ResourceLedger {
        ResourceLedger::new(&offer(resources), role, StdRng::seed_from_u64(7))
    }

    fn standard_offer() -> Vec<Resource> {
        vec![
            Resource::scalar(RESOURCE_CPUS, 4.0),
            Resource::scalar(RESOURCE_MEM, 8000.0),
            Resource::ranges(RESOURCE_PORTS, vec![ValueRange::new(3500, 3600)]),
        ]
    }

    #[test]
    fn test_satisfies_and_consume_unreserved() {
        let mut l = ledger(standard_offer(), "*");
        let profile = ResourceProfile::new("p", 2.0, 6000.0)
            .with_port("a", 0)
            .with_port("b", 3501);
        assert!(l.satisfies(&profile));

        let fragments = l.consume_scalar(RESOURCE_CPUS, 3.0).unwrap();
        assert_eq!(fragments, vec![Resource::scalar(RESOURCE_CPUS, 3.0)]);
        assert!((l.scalar_total(RESOURCE_CPUS) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_role_reserved_consumed_first() {
        let mut l = ledger(
            vec![
                Resource::scalar(RESOURCE_CPUS, 2.0),
                Resource::scalar(RESOURCE_CPUS, 4.0).with_role("yarn"),
            ],
            "yarn",
        );
        assert_eq!(l.scalar_reserved(RESOURCE_CPUS), 4.0);

        let fragments = l.consume_scalar(RESOURCE_CPUS, 4.5).unwrap();
        assert_eq!(
            fragments,
            vec![
                Resource::scalar(RESOURCE_CPUS, 4.0).with_role("yarn"),
                Resource::scalar(RESOURCE_CPUS, 0.5),
            ]
        );
        assert!((l.scalar_total(RESOURCE_CPUS) - 1.5).abs() < EPSILON);
        assert_eq!(l.scalar_reserved(RESOURCE_CPUS), 0.0);
    }

    #[test]
    fn test_reserved_entries_accumulate() {
        let l = ledger(
            vec![
                Resource::scalar(RESOURCE_MEM, 1024.0).with_role("yarn"),
                Resource::scalar(RESOURCE_MEM, 512.0).with_role("yarn"),
                Resource::scalar(RESOURCE_MEM, 256.0),
            ],
            "yarn",
        );
        assert_eq!(l.scalar_reserved(RESOURCE_MEM), 1536.0);
        assert_eq!(l.scalar_default(RESOURCE_MEM), 256.0);
    }

    #[test]
    fn test_default_role_reserves_nothing() {
        let l = ledger(vec![Resource::scalar(RESOURCE_CPUS, 1.0).with_role("*")], "*");
        assert_eq!(l.scalar_reserved(RESOURCE_CPUS), 0.0);
        assert_eq!(l.scalar_default(RESOURCE_CPUS), 1.0);
    }

    #[test]
    fn test_consume_cpus_then_mem() {
        let mut l = ledger(standard_offer(), "*");
        let cpus: f64 = l
            .consume_scalar(RESOURCE_CPUS, 1.25)
            .unwrap()
            .iter()
            .filter_map(Resource::as_scalar)
            .sum();
        let mem: f64 = l
            .consume_scalar(RESOURCE_MEM, 4096.5)
            .unwrap()
            .iter()
            .filter_map(Resource::as_scalar)
            .sum();
        assert!((cpus - 1.25).abs() < EPSILON);
        assert!((mem - 4096.5).abs() < EPSILON);
        assert!((l.scalar_total(RESOURCE_CPUS) - 2.75).abs() < EPSILON);
        assert!((l.scalar_total(RESOURCE_MEM) - 3903.5).abs() < EPSILON);
    }

    #[test]
    fn test_over_consume_fails_without_change() {
        let mut l = ledger(standard_offer(), "*");
        let err = l.consume_scalar(RESOURCE_CPUS, 4.5).unwrap_err();
        assert!(matches!(err, LedgerError::Insufficient { .. }));
        assert_eq!(l.scalar_total(RESOURCE_CPUS), 4.0);

        assert!(matches!(
            l.consume_scalar("gpus", 1.0),
            Err(LedgerError::Insufficient { available, .. }) if available == 0.0
        ));
        assert!(matches!(
            l.consume_scalar(RESOURCE_CPUS, -1.0),
            Err(LedgerError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_zero_consume_yields_nothing() {
        let mut l = ledger(standard_offer(), "*");
        assert!(l.consume_scalar(RESOURCE_CPUS, 0.0).unwrap().is_empty());
    }

    #[rstest]
    #[case(ValueRange::new(5, 5), 5, vec![])]
    #[case(ValueRange::new(1, 5), 5, vec![ValueRange::new(1, 4)])]
    #[case(ValueRange::new(1, 5), 1, vec![ValueRange::new(2, 5)])]
    #[case(ValueRange::new(1, 5), 3, vec![ValueRange::new(1, 2), ValueRange::new(4, 5)])]
    #[case(ValueRange::new(1, 5), 9, vec![ValueRange::new(1, 5)])]
    fn test_split_range(
        #[case] range: ValueRange,
        #[case] value: u64,
        #[case] expected: Vec<ValueRange>,
    ) {
        assert_eq!(split_range(range, value), expected);
    }

    #[test]
    fn test_explicit_port_twice_fails() {
        let mut l = ledger(standard_offer(), "*");
        let first = l.consume_ports(&[3501]).unwrap();
        assert_eq!(first, vec![AssignedValue { value: 3501, reserved: false }]);
        assert_eq!(
            l.ranges(RESOURCE_PORTS),
            vec![ValueRange::new(3500, 3500), ValueRange::new(3502, 3600)]
        );

        assert_eq!(
            l.consume_ports(&[3501]),
            Err(LedgerError::ValueUnavailable {
                name: RESOURCE_PORTS.to_string(),
                value: 3501
            })
        );
    }

    #[test]
    fn test_wildcard_ports_are_distinct_and_removed() {
        let mut l = ledger(standard_offer(), "*");
        let ports = l.consume_ports(&[0, 0, 0, 3550]).unwrap();
        assert_eq!(ports.len(), 4);
        assert_eq!(ports[3].value, 3550);

        let mut values: Vec<u64> = ports.iter().map(|p| p.value).collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), 4);
        for v in values {
            assert!((3500..=3600).contains(&v));
            assert!(!l.contains_value(RESOURCE_PORTS, v));
        }
        assert_eq!(l.range_count(RESOURCE_PORTS), 97);
    }

    #[test]
    fn test_wildcard_ports_seeded_are_reproducible() {
        let mut a = ledger(standard_offer(), "*");
        let mut b = ledger(standard_offer(), "*");
        assert_eq!(
            a.consume_ports(&[0, 0]).unwrap(),
            b.consume_ports(&[0, 0]).unwrap()
        );
    }

    #[test]
    fn test_wildcard_ports_come_from_default_pool() {
        let mut l = ledger(
            vec![
                Resource::ranges(RESOURCE_PORTS, vec![ValueRange::new(100, 110)]).with_role("yarn"),
                Resource::ranges(RESOURCE_PORTS, vec![ValueRange::new(200, 201)]),
            ],
            "yarn",
        );
        let ports = l.consume_ports(&[0, 0]).unwrap();
        assert!(ports.iter().all(|p| (200..=201).contains(&p.value) && !p.reserved));

        // only reserved values remain for wildcards
        assert!(matches!(
            l.consume_ports(&[0]),
            Err(LedgerError::NotEnoughValues { available: 0, .. })
        ));

        let explicit = l.consume_ports(&[105]).unwrap();
        assert!(explicit[0].reserved);
        assert_eq!(
            l.value_fragment(RESOURCE_PORTS, explicit[0]),
            Resource::ranges(RESOURCE_PORTS, vec![ValueRange::single(105)]).with_role("yarn")
        );
    }

    #[test]
    fn test_too_many_ports_requested() {
        let mut l = ledger(
            vec![Resource::ranges(RESOURCE_PORTS, vec![ValueRange::new(1, 2)])],
            "*",
        );
        assert!(matches!(
            l.consume_ports(&[0, 0, 0]),
            Err(LedgerError::NotEnoughValues { requested: 3, available: 2, .. })
        ));
    }

    #[test]
    fn test_full_width_range_does_not_overflow() {
        let mut l = ledger(
            vec![
                Resource::ranges(RESOURCE_PORTS, vec![ValueRange::new(0, u64::MAX)]),
                Resource::ranges(RESOURCE_PORTS, vec![ValueRange::new(5, 9)]),
            ],
            "*",
        );
        assert_eq!(l.range_count(RESOURCE_PORTS), u64::MAX);
        assert!(l.satisfies(&ResourceProfile::new("p", 0.0, 0.0).with_port("a", u64::MAX)));

        let assigned = l.consume_ports(&[u64::MAX, 0]).unwrap();
        assert_eq!(assigned[0].value, u64::MAX);
        assert!(!l.contains_value(RESOURCE_PORTS, u64::MAX));
        assert_ne!(assigned[1].value, u64::MAX);
    }

    #[test]
    fn test_satisfies_rejects() {
        let l = ledger(standard_offer(), "*");
        assert!(!l.satisfies(&ResourceProfile::new("big", 4.5, 1.0)));
        assert!(!l.satisfies(&ResourceProfile::new("fat", 1.0, 9000.0)));
        assert!(!l.satisfies(&ResourceProfile::new("p", 1.0, 1.0).with_port("x", 80)));
        assert!(!l.satisfies(
            &ResourceProfile::new("exec", 3.5, 1.0).with_executor(1.0, 0.0)
        ));

        let few = ledger(
            vec![
                Resource::scalar(RESOURCE_CPUS, 1.0),
                Resource::scalar(RESOURCE_MEM, 1.0),
                Resource::ranges(RESOURCE_PORTS, vec![ValueRange::single(9)]),
            ],
            "*",
        );
        assert!(!few.satisfies(
            &ResourceProfile::new("p", 1.0, 1.0)
                .with_port("a", 0)
                .with_port("b", 0)
        ));
    }
}
