//! Zone demand derivation and fleet allocation
//!
//! EV and ICE fleets are sized independently from the same zone demand; they
//! are not a split of one pool.

use crate::models::{ForecastPoint, ZoneAllocation};

/// Trips one vehicle is expected to cover per hour, used for capacity
pub const CAPACITY_FACTOR: f64 = 2.1;

/// Demand units served per allocated EV
pub const DEMAND_PER_EV: f64 = 5.0;

/// Demand units served per allocated ICE vehicle
pub const DEMAND_PER_ICE: f64 = 3.0;

/// How a zone's demand is derived from a forecast trajectory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandRule {
    /// Latest point scaled by `0.8 + 0.4 * (zone_index % 3)`
    ZoneMultiplier,
    /// Zone `i` takes the point estimate of step `i % len`
    ForecastCycle,
}

impl DemandRule {
    pub fn zone_demand(self, trajectory: &[ForecastPoint], zone_index: usize) -> Option<f64> {
        match self {
            DemandRule::ZoneMultiplier => trajectory
                .last()
                .map(|p| p.point_estimate * zone_multiplier(zone_index)),
            DemandRule::ForecastCycle => {
                if trajectory.is_empty() {
                    None
                } else {
                    Some(trajectory[zone_index % trajectory.len()].point_estimate)
                }
            }
        }
    }
}

fn zone_multiplier(zone_index: usize) -> f64 {
    0.8 + 0.4 * (zone_index % 3) as f64
}

/// Deterministic zone allocation heuristic
#[derive(Debug, Clone)]
pub struct ZoneAllocator {
    capacity_factor: f64,
}

impl Default for ZoneAllocator {
    fn default() -> Self {
        Self {
            capacity_factor: CAPACITY_FACTOR,
        }
    }
}

impl ZoneAllocator {
    /// Allocation for one zone from a single forecast point (zone multiplier rule)
    pub fn allocate(&self, point: &ForecastPoint, zone_index: usize, zone_name: &str) -> ZoneAllocation {
        self.from_demand(zone_name, point.point_estimate * zone_multiplier(zone_index))
    }

    /// Allocations for every zone, in catalog order
    pub fn allocate_all<S: AsRef<str>>(
        &self,
        rule: DemandRule,
        trajectory: &[ForecastPoint],
        zones: &[S],
    ) -> Vec<ZoneAllocation> {
        zones
            .iter()
            .enumerate()
            .filter_map(|(i, zone)| {
                rule.zone_demand(trajectory, i)
                    .map(|demand| self.from_demand(zone.as_ref(), demand))
            })
            .collect()
    }

    pub fn from_demand(&self, zone_name: &str, demand: f64) -> ZoneAllocation {
        let alloc_ev = fleet_size(demand, DEMAND_PER_EV);
        let alloc_ice = fleet_size(demand, DEMAND_PER_ICE);
        let alloc_total = alloc_ev + alloc_ice;
        let capacity_est = alloc_total as f64 * self.capacity_factor;

        ZoneAllocation {
            zone: zone_name.to_string(),
            demand,
            alloc_ev,
            alloc_ice,
            alloc_total,
            capacity_est,
            unserved: (demand - capacity_est).max(0.0),
        }
    }
}

/// Floor of `demand / per_vehicle`; negative or non-finite demand allocates nothing
fn fleet_size(demand: f64, per_vehicle: f64) -> u32 {
    let n = (demand / per_vehicle).floor();
    if n.is_finite() && n > 0.0 {
        n as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn point(p50: f64) -> ForecastPoint {
        ForecastPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
            point_estimate: p50,
            interval_lower: (p50 - 12.0).max(0.0),
            interval_upper: p50 + 12.0,
        }
    }

    fn assert_invariants(a: &ZoneAllocation) {
        assert_eq!(a.alloc_total, a.alloc_ev + a.alloc_ice);
        assert_eq!(a.capacity_est, a.alloc_total as f64 * CAPACITY_FACTOR);
        assert_eq!(a.unserved, (a.demand - a.capacity_est).max(0.0));
    }

    #[test]
    fn test_reference_allocation_zone_zero() {
        let a = ZoneAllocator::default().allocate(&point(50.0), 0, "Downtown");
        assert_eq!(a.demand, 40.0);
        assert_eq!(a.alloc_ev, 8);
        assert_eq!(a.alloc_ice, 13);
        assert_eq!(a.alloc_total, 21);
        assert!((a.capacity_est - 44.1).abs() < 1e-9);
        assert_eq!(a.unserved, 0.0);
    }

    #[test]
    fn test_multiplier_cycles_every_three_zones() {
        let allocator = ZoneAllocator::default();
        let demands: Vec<f64> = (0..6)
            .map(|i| allocator.allocate(&point(100.0), i, "z").demand)
            .collect();
        let expected = [80.0, 120.0, 160.0, 80.0, 120.0, 160.0];
        for (got, want) in demands.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "got {} want {}", got, want);
        }
    }

    #[test]
    fn test_unserved_when_capacity_short() {
        // 4 demand: 0 EV, 1 ICE, capacity 2.1
        let a = ZoneAllocator::default().from_demand("Mall", 4.0);
        assert_eq!(a.alloc_total, 1);
        assert!((a.unserved - 1.9).abs() < 1e-9);
        assert_invariants(&a);
    }

    #[test]
    fn test_invariants_hold_across_demands() {
        let allocator = ZoneAllocator::default();
        for demand in [0.0, 0.4, 2.99, 3.0, 14.9, 15.0, 57.3, 1000.0] {
            assert_invariants(&allocator.from_demand("z", demand));
        }
    }

    #[test]
    fn test_forecast_cycle_rule() {
        let trajectory = vec![point(10.0), point(20.0)];
        let zones = ["A", "B", "C"];
        let allocs = ZoneAllocator::default().allocate_all(DemandRule::ForecastCycle, &trajectory, &zones);
        let demands: Vec<f64> = allocs.iter().map(|a| a.demand).collect();
        assert_eq!(demands, vec![10.0, 20.0, 10.0]);
        assert_eq!(allocs[2].zone, "C");
    }

    #[test]
    fn test_empty_trajectory_allocates_nothing() {
        let zones = ["A", "B"];
        for rule in [DemandRule::ForecastCycle, DemandRule::ZoneMultiplier] {
            assert!(ZoneAllocator::default().allocate_all(rule, &[], &zones).is_empty());
        }
    }

    #[test]
    fn test_negative_demand_allocates_zero() {
        let a = ZoneAllocator::default().from_demand("z", -7.0);
        assert_eq!(a.alloc_total, 0);
        assert_eq!(a.unserved, 0.0);
    }
}
