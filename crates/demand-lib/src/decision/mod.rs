//! Decision layer: turns forecasts into zone allocations and reposition moves

mod allocator;
mod planner;
mod zones;

pub use allocator::{
    DemandRule, ZoneAllocator, CAPACITY_FACTOR, DEMAND_PER_EV, DEMAND_PER_ICE,
};
pub use planner::{
    RepositionPlan, RepositionPlanner, RotatingPlanner, RotatingRoute, StaticPlanner,
};
pub use zones::{demo_zone_forecast, ZoneCatalog, DEFAULT_ZONES};

use crate::models::{DecisionPayload, ForecastPoint};
use std::sync::Arc;

/// Allocation rule plus reposition strategy for one access pattern
#[derive(Clone)]
pub struct DecisionPolicy {
    pub rule: DemandRule,
    pub planner: Arc<dyn RepositionPlanner>,
}

impl DecisionPolicy {
    pub fn new(rule: DemandRule, planner: Arc<dyn RepositionPlanner>) -> Self {
        Self { rule, planner }
    }

    /// Forecast-cycling demand with fixed moves
    pub fn batch_default() -> Self {
        Self::new(DemandRule::ForecastCycle, Arc::new(StaticPlanner::default()))
    }

    /// Zone-multiplier demand with step-indexed moves
    pub fn stream_default() -> Self {
        Self::new(DemandRule::ZoneMultiplier, Arc::new(RotatingPlanner::default()))
    }
}

/// Combines the allocator, the zone catalog and a policy into a payload
#[derive(Clone)]
pub struct DecisionLayer {
    allocator: ZoneAllocator,
    zones: ZoneCatalog,
}

impl DecisionLayer {
    pub fn new(allocator: ZoneAllocator, zones: ZoneCatalog) -> Self {
        Self { allocator, zones }
    }

    pub fn zones(&self) -> &ZoneCatalog {
        &self.zones
    }

    pub fn decide(
        &self,
        policy: &DecisionPolicy,
        trajectory: &[ForecastPoint],
        step_index: u32,
    ) -> DecisionPayload {
        let plan = policy.planner.plan(step_index);
        DecisionPayload {
            zone_alloc: self
                .allocator
                .allocate_all(policy.rule, trajectory, self.zones.names()),
            reposition_ev: plan.ev,
            reposition_ice: plan.ice,
        }
    }
}

impl Default for DecisionLayer {
    fn default() -> Self {
        Self::new(ZoneAllocator::default(), ZoneCatalog::default())
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
            interval_lower: 0.0,
            interval_upper: p50 + 12.0,
        }
    }

    #[test]
    fn test_stream_decision_payload() {
        let layer = DecisionLayer::default();
        let payload = layer.decide(&DecisionPolicy::stream_default(), &[point(50.0)], 4);

        assert_eq!(payload.zone_alloc.len(), 6);
        assert_eq!(payload.zone_alloc[0].zone, "Downtown");
        assert_eq!(payload.zone_alloc[0].demand, 40.0);
        assert_eq!(payload.reposition_ev[0].count, 5);
        assert_eq!(payload.reposition_ice[0].count, 3);
    }

    #[test]
    fn test_batch_decision_payload() {
        let layer = DecisionLayer::default();
        let trajectory: Vec<_> = [11.0, 12.0, 13.0, 14.0].into_iter().map(point).collect();
        let payload = layer.decide(&DecisionPolicy::batch_default(), &trajectory, 0);

        let demands: Vec<f64> = payload.zone_alloc.iter().map(|a| a.demand).collect();
        assert_eq!(demands, vec![11.0, 12.0, 13.0, 14.0, 11.0, 12.0]);
        assert_eq!(payload.reposition_ev.len(), 2);
        assert_eq!(payload.reposition_ice.len(), 2);
    }

    #[test]
    fn test_payload_wire_keys() {
        let payload = DecisionLayer::default().decide(&DecisionPolicy::stream_default(), &[point(50.0)], 1);
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["zone_alloc"].is_array());
        assert_eq!(json["reposition_ev"][0]["from"], "Downtown");
        assert_eq!(json["reposition_ev"][0]["to"], "IT Park");
        assert_eq!(json["zone_alloc"][0]["capacity_est"], 44.1);
    }
}
