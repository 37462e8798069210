//! Per-tick adjustments and the knowns set that curbs them.

use super::types::{PointId, ScalarRef, System, VarId};
use crate::geometry::Vector2;
use std::collections::HashSet;

/// Per-tick record of which point-axes and variables have been exactly
/// determined by propagation. Relaxation deltas touching these axes are
/// zeroed so that iteration never fights an exact value.
///
/// X and Y of a point are independently knowable: `Horizontal` pins only y.
#[derive(Debug, Default, Clone)]
pub struct Knowns {
    pub x: HashSet<PointId>,
    pub y: HashSet<PointId>,
    pub vars: HashSet<VarId>,
}

impl Knowns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both axes of the point are pinned.
    pub fn knows_point(&self, id: PointId) -> bool {
        self.x.contains(&id) && self.y.contains(&id)
    }

    pub fn mark_point(&mut self, id: PointId) -> bool {
        let nx = self.x.insert(id);
        let ny = self.y.insert(id);
        nx || ny
    }

    pub fn knows_scalar(&self, r: ScalarRef) -> bool {
        match r {
            ScalarRef::Var(v) => self.vars.contains(&v),
            ScalarRef::PointX(p) => self.x.contains(&p),
            ScalarRef::PointY(p) => self.y.contains(&p),
        }
    }
}

/// A constraint-produced adjustment waiting to be applied. `source` is the
/// index of the originating constraint, kept for diagnostics; it is only
/// meaningful within the tick that produced the delta.
#[derive(Debug, Clone)]
pub enum Delta {
    Point {
        target: PointId,
        amount: Vector2,
        source: usize,
    },
    Var {
        target: VarId,
        amount: f64,
        source: usize,
    },
}

impl Delta {
    /// Zero the components along axes already pinned by propagation.
    pub fn curb(&mut self, knowns: &Knowns) {
        match self {
            Delta::Point { target, amount, .. } => {
                if knowns.x.contains(target) {
                    amount.x = 0.0;
                }
                if knowns.y.contains(target) {
                    amount.y = 0.0;
                }
            }
            Delta::Var { target, amount, .. } => {
                if knowns.vars.contains(target) {
                    *amount = 0.0;
                }
            }
        }
    }

    /// Whether this delta exceeds the noise threshold.
    pub fn is_significant(&self, epsilon: f64) -> bool {
        match self {
            Delta::Point { amount, .. } => amount.norm() > epsilon,
            Delta::Var { amount, .. } => amount.abs() > epsilon,
        }
    }

    /// Apply the delta damped by `rho`.
    pub fn apply(&self, system: &mut System, rho: f64) {
        match self {
            Delta::Point { target, amount, .. } => {
                let p = system.point_mut(*target);
                p.x += amount.x * rho;
                p.y += amount.y * rho;
            }
            Delta::Var { target, amount, .. } => {
                system.vars[target.0].value += amount * rho;
            }
        }
    }
}
