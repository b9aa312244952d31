//! Reposition strategies
//!
//! The current planners are placeholders for a transportation-problem solver;
//! anything implementing [`RepositionPlanner`] can be swapped in.

use crate::models::RepositionMove;

/// EV and ICE transfer lists for one decision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositionPlan {
    pub ev: Vec<RepositionMove>,
    pub ice: Vec<RepositionMove>,
}

/// Produces inter-zone vehicle transfers for a decision step
pub trait RepositionPlanner: Send + Sync {
    /// `step_index` is 1-based for streams and 0 for batch decisions
    fn plan(&self, step_index: u32) -> RepositionPlan;
}

/// Fixed move lists, independent of the step
#[derive(Debug, Clone)]
pub struct StaticPlanner {
    plan: RepositionPlan,
}

impl StaticPlanner {
    pub fn new(ev: Vec<RepositionMove>, ice: Vec<RepositionMove>) -> Self {
        Self {
            plan: RepositionPlan { ev, ice },
        }
    }
}

impl Default for StaticPlanner {
    fn default() -> Self {
        Self::new(
            vec![
                RepositionMove::new("Downtown", "IT Park", 3),
                RepositionMove::new("University", "Mall", 2),
            ],
            vec![
                RepositionMove::new("Hospital", "Downtown", 4),
                RepositionMove::new("Mall", "Residential Area", 1),
            ],
        )
    }
}

impl RepositionPlanner for StaticPlanner {
    fn plan(&self, _step_index: u32) -> RepositionPlan {
        self.plan.clone()
    }
}

/// One route whose count cycles with the step: `(step % cycle) + base`
#[derive(Debug, Clone)]
pub struct RotatingRoute {
    pub from: String,
    pub to: String,
    pub cycle: u32,
    pub base: u32,
}

impl RotatingRoute {
    pub fn new(from: impl Into<String>, to: impl Into<String>, cycle: u32, base: u32) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            cycle,
            base,
        }
    }

    fn at(&self, step_index: u32) -> RepositionMove {
        let offset = step_index.checked_rem(self.cycle).unwrap_or(0);
        RepositionMove::new(self.from.clone(), self.to.clone(), offset + self.base)
    }
}

/// Step-indexed move lists used by the live decision stream
#[derive(Debug, Clone)]
pub struct RotatingPlanner {
    ev: Vec<RotatingRoute>,
    ice: Vec<RotatingRoute>,
}

impl RotatingPlanner {
    pub fn new(ev: Vec<RotatingRoute>, ice: Vec<RotatingRoute>) -> Self {
        Self { ev, ice }
    }
}

impl Default for RotatingPlanner {
    fn default() -> Self {
        Self::new(
            vec![RotatingRoute::new("Downtown", "IT Park", 5, 1)],
            vec![RotatingRoute::new("Hospital", "Mall", 3, 2)],
        )
    }
}

impl RepositionPlanner for RotatingPlanner {
    fn plan(&self, step_index: u32) -> RepositionPlan {
        RepositionPlan {
            ev: self.ev.iter().map(|r| r.at(step_index)).collect(),
            ice: self.ice.iter().map(|r| r.at(step_index)).collect(),
        }
    }
}
