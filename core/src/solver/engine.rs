//! The relaxation engine: propagate-then-relax, one tick at a time.
//!
//! Each tick first lets exactly-determining constraints write concrete values
//! (propagation), then collects damped adjustment deltas from every remaining
//! constraint and applies them under a single damping factor. This is a
//! Gauss-Seidel style relaxation, not a linear solve: constraints are
//! non-linear (distances, angles) and the constraint set changes every frame,
//! so rebuilding a Newton system each frame would buy little.

use super::delta::{Delta, Knowns};
use super::formula;
use super::types::{Axis, Constraint, System, VarId};
use crate::geometry::{self, angle_of, normalize_angle, rotate_about, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Fraction of the angular error each segment of an Orientation constraint
/// rotates per tick. Literally halving the error per side is known to
/// oscillate, so each side takes a smaller bite.
const ORIENTATION_STEP: f64 = 0.3;

/// Iteration cap for the bounded `solve` driver.
const MAX_SOLVE_ITERATIONS: usize = 100;

/// Summary of a bounded solve, serializable for external callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveReport {
    /// Whether an iteration reported no change before the cap was hit.
    pub converged: bool,
    /// Iterations performed, including the final unproductive one.
    pub iterations: usize,
    /// Iterations in which something actually moved.
    pub productive_iterations: usize,
    pub point_count: usize,
    pub var_count: usize,
    pub constraint_count: usize,
}

/// The relaxation engine. Owns tuning, not state; the state lives in the
/// [`System`] so a caller can run several engines over one system or rebuild
/// the constraint set between ticks.
#[derive(Debug, Clone)]
pub struct Relax {
    /// Damping factor applied to every delta.
    pub rho: f64,
    /// Noise threshold: deltas at or below this are considered converged.
    pub epsilon: f64,
    /// Enables the exact-propagation phase before relaxation.
    pub propagate: bool,
}

impl Default for Relax {
    fn default() -> Self {
        Self {
            rho: 0.25,
            epsilon: 0.001,
            propagate: true,
        }
    }
}

impl Relax {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a single tick. Returns whether anything changed: a delta was
    /// applied, propagation moved a value by more than epsilon, or an
    /// after-tick hook reported activity.
    pub fn run_one_iteration(&self, system: &mut System) -> bool {
        // before-tick: Length splits its residual differently when its
        // length var is separately pinned.
        let pinned_vars = Self::collect_pinned_vars(system);

        let mut knowns = Knowns::new();
        let mut moved_by_propagation = false;
        if self.propagate {
            self.propagate_knowns(system, &mut knowns, &mut moved_by_propagation);
        }

        let deltas = self.collect_deltas(system, &knowns, &pinned_vars);
        let applied = !deltas.is_empty();
        for delta in &deltas {
            delta.apply(system, self.rho);
        }
        trace!(
            deltas = deltas.len(),
            propagated = moved_by_propagation,
            "relaxation tick"
        );

        let mut changed = applied || moved_by_propagation;
        for idx in 0..system.constraints.len() {
            if system.constraints[idx].suppressed {
                continue;
            }
            let constraint = system.constraints[idx].constraint.clone();
            if self.after_tick(system, &constraint) {
                changed = true;
            }
        }
        changed
    }

    /// Run iterations until the wall-clock budget is spent or an iteration
    /// reports no change. Returns the number of productive iterations; the
    /// caller re-runs every frame, so partial convergence is fine.
    pub fn iterate_for_up_to_millis(&self, system: &mut System, budget_ms: u64) -> usize {
        let deadline = Instant::now() + Duration::from_millis(budget_ms);
        let mut productive = 0;
        loop {
            if !self.run_one_iteration(system) {
                break;
            }
            productive += 1;
            if Instant::now() >= deadline {
                break;
            }
        }
        productive
    }

    /// Bounded-iteration driver for non-interactive callers.
    pub fn solve(&self, system: &mut System) -> bool {
        self.solve_with_report(system).converged
    }

    pub fn solve_with_report(&self, system: &mut System) -> SolveReport {
        let mut converged = false;
        let mut iterations = 0;
        let mut productive = 0;
        for _ in 0..MAX_SOLVE_ITERATIONS {
            iterations += 1;
            if self.run_one_iteration(system) {
                productive += 1;
            } else {
                converged = true;
                break;
            }
        }
        debug!(converged, iterations, productive, "solve finished");
        SolveReport {
            converged,
            iterations,
            productive_iterations: productive,
            point_count: system.points.len(),
            var_count: system.vars.len(),
            constraint_count: system.constraints.len(),
        }
    }

    fn collect_pinned_vars(system: &System) -> HashSet<VarId> {
        system
            .active_constraints()
            .filter_map(|(_, c)| match c {
                Constraint::FixedVar { var, .. } => Some(*var),
                _ => None,
            })
            .collect()
    }

    // =========================================================================
    // Propagation
    // =========================================================================

    /// Repeatedly scan the constraint list; any constraint that can exactly
    /// determine a value writes it and marks the axis/var known. The scan
    /// restarts from the first constraint after every successful propagation
    /// so earlier (non-interactive) constraints always get first claim.
    fn propagate_knowns(&self, system: &mut System, knowns: &mut Knowns, moved: &mut bool) {
        'scan: loop {
            for idx in 0..system.constraints.len() {
                if system.constraints[idx].suppressed {
                    continue;
                }
                let constraint = system.constraints[idx].constraint.clone();
                if self.propagate_one(system, &constraint, knowns, moved) {
                    continue 'scan;
                }
            }
            break;
        }
    }

    /// Returns whether anything was newly marked known.
    fn propagate_one(
        &self,
        system: &mut System,
        constraint: &Constraint,
        knowns: &mut Knowns,
        moved: &mut bool,
    ) -> bool {
        match constraint {
            Constraint::FixedVar { var, wanted } => {
                self.set_var_known(system, knowns, moved, *var, *wanted)
            }
            Constraint::VarEquals { vars } => {
                let [a, b] = *vars;
                if knowns.vars.contains(&a) && !knowns.vars.contains(&b) {
                    let v = system.var_value(a);
                    self.set_var_known(system, knowns, moved, b, v)
                } else if knowns.vars.contains(&b) && !knowns.vars.contains(&a) {
                    let v = system.var_value(b);
                    self.set_var_known(system, knowns, moved, a, v)
                } else {
                    false
                }
            }
            Constraint::FixedPoint { point, wanted } => {
                let mut marked = self.set_x_known(system, knowns, moved, *point, wanted.x);
                marked |= self.set_y_known(system, knowns, moved, *point, wanted.y);
                marked
            }
            Constraint::Horizontal { points } => {
                let known_y = points
                    .iter()
                    .copied()
                    .find(|p| knowns.y.contains(p))
                    .map(|p| system.point(p).y);
                match known_y {
                    Some(y) => {
                        let mut marked = false;
                        for p in points {
                            marked |= self.set_y_known(system, knowns, moved, *p, y);
                        }
                        marked
                    }
                    None => false,
                }
            }
            Constraint::Vertical { points } => {
                let known_x = points
                    .iter()
                    .copied()
                    .find(|p| knowns.x.contains(p))
                    .map(|p| system.point(p).x);
                match known_x {
                    Some(x) => {
                        let mut marked = false;
                        for p in points {
                            marked |= self.set_x_known(system, knowns, moved, *p, x);
                        }
                        marked
                    }
                    None => false,
                }
            }
            Constraint::Length { p1, p2, length } => {
                if knowns.knows_point(*p1)
                    && knowns.knows_point(*p2)
                    && !knowns.vars.contains(length)
                {
                    let d = (system.point(*p2) - system.point(*p1)).norm();
                    self.set_var_known(system, knowns, moved, *length, d)
                } else {
                    false
                }
            }
            Constraint::PointEquals { points } => {
                let [a, b] = *points;
                let mut marked = false;
                if knowns.x.contains(&a) && !knowns.x.contains(&b) {
                    let v = system.point(a).x;
                    marked |= self.set_x_known(system, knowns, moved, b, v);
                } else if knowns.x.contains(&b) && !knowns.x.contains(&a) {
                    let v = system.point(b).x;
                    marked |= self.set_x_known(system, knowns, moved, a, v);
                }
                if knowns.y.contains(&a) && !knowns.y.contains(&b) {
                    let v = system.point(a).y;
                    marked |= self.set_y_known(system, knowns, moved, b, v);
                } else if knowns.y.contains(&b) && !knowns.y.contains(&a) {
                    let v = system.point(b).y;
                    marked |= self.set_y_known(system, knowns, moved, a, v);
                }
                marked
            }
            Constraint::PointPlus { p1, p2, sum } => {
                let mut marked = false;
                for axis in [Axis::X, Axis::Y] {
                    let (k1, k2, ks) = match axis {
                        Axis::X => (
                            knowns.x.contains(p1),
                            knowns.x.contains(p2),
                            knowns.x.contains(sum),
                        ),
                        Axis::Y => (
                            knowns.y.contains(p1),
                            knowns.y.contains(p2),
                            knowns.y.contains(sum),
                        ),
                    };
                    let get = |system: &System, p| match axis {
                        Axis::X => system.point(p).x,
                        Axis::Y => system.point(p).y,
                    };
                    if k1 && k2 && !ks {
                        let v = get(system, *p1) + get(system, *p2);
                        marked |= self.set_axis_known(system, knowns, moved, *sum, axis, v);
                    } else if k1 && ks && !k2 {
                        let v = get(system, *sum) - get(system, *p1);
                        marked |= self.set_axis_known(system, knowns, moved, *p2, axis, v);
                    } else if k2 && ks && !k1 {
                        let v = get(system, *sum) - get(system, *p2);
                        marked |= self.set_axis_known(system, knowns, moved, *p1, axis, v);
                    }
                }
                marked
            }
            Constraint::PointTimes { p1, factor, p2 } => {
                let mut marked = false;
                for axis in [Axis::X, Axis::Y] {
                    let (k1, k2) = match axis {
                        Axis::X => (knowns.x.contains(p1), knowns.x.contains(p2)),
                        Axis::Y => (knowns.y.contains(p1), knowns.y.contains(p2)),
                    };
                    let get = |system: &System, p| match axis {
                        Axis::X => system.point(p).x,
                        Axis::Y => system.point(p).y,
                    };
                    if k1 && !k2 {
                        let v = get(system, *p1) * factor;
                        marked |= self.set_axis_known(system, knowns, moved, *p2, axis, v);
                    } else if k2 && !k1 && factor.abs() > geometry::EPSILON {
                        let v = get(system, *p2) / factor;
                        marked |= self.set_axis_known(system, knowns, moved, *p1, axis, v);
                    }
                }
                marked
            }
            Constraint::Clock {
                center,
                hand,
                length,
                now,
                ..
            } => {
                if knowns.vars.contains(now) && knowns.knows_point(*center) {
                    let angle = system.var_value(*now);
                    let c = system.point(*center);
                    let target_x = c.x + length * angle.cos();
                    let target_y = c.y + length * angle.sin();
                    let mut marked = self.set_x_known(system, knowns, moved, *hand, target_x);
                    marked |= self.set_y_known(system, knowns, moved, *hand, target_y);
                    marked
                } else {
                    false
                }
            }
            Constraint::PropertyPicker { point, axis, var } => {
                let axis_known = match axis {
                    Axis::X => knowns.x.contains(point),
                    Axis::Y => knowns.y.contains(point),
                };
                if axis_known && !knowns.vars.contains(var) {
                    let v = match axis {
                        Axis::X => system.point(*point).x,
                        Axis::Y => system.point(*point).y,
                    };
                    self.set_var_known(system, knowns, moved, *var, v)
                } else if knowns.vars.contains(var) && !axis_known {
                    let v = system.var_value(*var);
                    self.set_axis_known(system, knowns, moved, *point, *axis, v)
                } else {
                    false
                }
            }
            Constraint::Formula {
                output,
                inputs,
                compute,
            } => {
                if !knowns.vars.contains(output)
                    && inputs.iter().all(|r| knowns.knows_scalar(*r))
                {
                    let vals: Vec<f64> = inputs.iter().map(|r| system.scalar(*r)).collect();
                    let v = compute.eval(&vals);
                    self.set_var_known(system, knowns, moved, *output, v)
                } else {
                    false
                }
            }
            // Inequalities and purely relaxed constraints never determine
            // values exactly.
            Constraint::Above { .. }
            | Constraint::MinLength { .. }
            | Constraint::Orientation { .. } => false,
        }
    }

    fn set_var_known(
        &self,
        system: &mut System,
        knowns: &mut Knowns,
        moved: &mut bool,
        var: VarId,
        value: f64,
    ) -> bool {
        if knowns.vars.contains(&var) {
            return false;
        }
        if (system.var_value(var) - value).abs() > self.epsilon {
            *moved = true;
        }
        system.set_var(var, value);
        knowns.vars.insert(var);
        true
    }

    fn set_axis_known(
        &self,
        system: &mut System,
        knowns: &mut Knowns,
        moved: &mut bool,
        point: super::types::PointId,
        axis: Axis,
        value: f64,
    ) -> bool {
        match axis {
            Axis::X => self.set_x_known(system, knowns, moved, point, value),
            Axis::Y => self.set_y_known(system, knowns, moved, point, value),
        }
    }

    fn set_x_known(
        &self,
        system: &mut System,
        knowns: &mut Knowns,
        moved: &mut bool,
        point: super::types::PointId,
        value: f64,
    ) -> bool {
        if knowns.x.contains(&point) {
            return false;
        }
        if (system.point(point).x - value).abs() > self.epsilon {
            *moved = true;
        }
        system.point_mut(point).x = value;
        knowns.x.insert(point);
        true
    }

    fn set_y_known(
        &self,
        system: &mut System,
        knowns: &mut Knowns,
        moved: &mut bool,
        point: super::types::PointId,
        value: f64,
    ) -> bool {
        if knowns.y.contains(&point) {
            return false;
        }
        if (system.point(point).y - value).abs() > self.epsilon {
            *moved = true;
        }
        system.point_mut(point).y = value;
        knowns.y.insert(point);
        true
    }

    // =========================================================================
    // Relaxation deltas
    // =========================================================================

    fn collect_deltas(
        &self,
        system: &System,
        knowns: &Knowns,
        pinned_vars: &HashSet<VarId>,
    ) -> Vec<Delta> {
        let mut all = Vec::new();
        for (idx, constraint) in system.active_constraints() {
            let mut deltas = self.constraint_deltas(system, knowns, pinned_vars, idx, constraint);
            for d in deltas.iter_mut() {
                d.curb(knowns);
            }
            // If any delta of a constraint is significant, keep all of them;
            // otherwise the constraint is at rest this tick.
            if deltas.iter().any(|d| d.is_significant(self.epsilon)) {
                all.extend(deltas);
            }
        }
        all
    }

    fn constraint_deltas(
        &self,
        system: &System,
        knowns: &Knowns,
        pinned_vars: &HashSet<VarId>,
        idx: usize,
        constraint: &Constraint,
    ) -> Vec<Delta> {
        match constraint {
            Constraint::FixedVar { var, wanted } => vec![Delta::Var {
                target: *var,
                amount: wanted - system.var_value(*var),
                source: idx,
            }],
            Constraint::VarEquals { vars } => {
                let diff = system.var_value(vars[1]) - system.var_value(vars[0]);
                vec![
                    Delta::Var {
                        target: vars[0],
                        amount: diff * 0.5,
                        source: idx,
                    },
                    Delta::Var {
                        target: vars[1],
                        amount: -diff * 0.5,
                        source: idx,
                    },
                ]
            }
            Constraint::FixedPoint { point, wanted } => vec![Delta::Point {
                target: *point,
                amount: wanted - system.point(*point),
                source: idx,
            }],
            Constraint::Horizontal { points } => {
                if points.is_empty() {
                    return Vec::new();
                }
                let mean = points.iter().map(|p| system.point(*p).y).sum::<f64>()
                    / points.len() as f64;
                points
                    .iter()
                    .map(|p| Delta::Point {
                        target: *p,
                        amount: Vector2::new(0.0, mean - system.point(*p).y),
                        source: idx,
                    })
                    .collect()
            }
            Constraint::Vertical { points } => {
                if points.is_empty() {
                    return Vec::new();
                }
                let mean = points.iter().map(|p| system.point(*p).x).sum::<f64>()
                    / points.len() as f64;
                points
                    .iter()
                    .map(|p| Delta::Point {
                        target: *p,
                        amount: Vector2::new(mean - system.point(*p).x, 0.0),
                        source: idx,
                    })
                    .collect()
            }
            Constraint::Above { p1, p2, min_amount } => {
                let y1 = system.point(*p1).y;
                let y2 = system.point(*p2).y;
                if y1 - min_amount > y2 {
                    return Vec::new();
                }
                let needed = (y2 + min_amount) - y1;
                vec![
                    Delta::Point {
                        target: *p1,
                        amount: Vector2::new(0.0, needed * 0.5),
                        source: idx,
                    },
                    Delta::Point {
                        target: *p2,
                        amount: Vector2::new(0.0, -needed * 0.5),
                        source: idx,
                    },
                ]
            }
            Constraint::Length { p1, p2, length } => {
                let a = system.point(*p1);
                let b = system.point(*p2);
                let chord = b - a;
                let d = chord.norm();
                let wanted = system.var_value(*length);
                if d < geometry::EPSILON {
                    // Coincident endpoints with a nonzero length wanted:
                    // separate arbitrarily along X.
                    if wanted.abs() < geometry::EPSILON {
                        return Vec::new();
                    }
                    let half = wanted * 0.5;
                    return vec![
                        Delta::Point {
                            target: *p1,
                            amount: Vector2::new(-half, 0.0),
                            source: idx,
                        },
                        Delta::Point {
                            target: *p2,
                            amount: Vector2::new(half, 0.0),
                            source: idx,
                        },
                    ];
                }
                let u = chord / d;
                let error = d - wanted;
                if pinned_vars.contains(length) {
                    // The var is spoken for; the endpoints absorb everything.
                    vec![
                        Delta::Point {
                            target: *p1,
                            amount: u * (error * 0.5),
                            source: idx,
                        },
                        Delta::Point {
                            target: *p2,
                            amount: -u * (error * 0.5),
                            source: idx,
                        },
                    ]
                } else {
                    // Split the residual a third each: var toward the actual
                    // distance, endpoints toward the var's length.
                    vec![
                        Delta::Var {
                            target: *length,
                            amount: error / 3.0,
                            source: idx,
                        },
                        Delta::Point {
                            target: *p1,
                            amount: u * (error / 3.0),
                            source: idx,
                        },
                        Delta::Point {
                            target: *p2,
                            amount: -u * (error / 3.0),
                            source: idx,
                        },
                    ]
                }
            }
            Constraint::MinLength { p1, p2, min } => {
                let a = system.point(*p1);
                let b = system.point(*p2);
                let chord = b - a;
                let d = chord.norm();
                if d >= *min {
                    return Vec::new();
                }
                if d < geometry::EPSILON {
                    let half = min * 0.5;
                    return vec![
                        Delta::Point {
                            target: *p1,
                            amount: Vector2::new(-half, 0.0),
                            source: idx,
                        },
                        Delta::Point {
                            target: *p2,
                            amount: Vector2::new(half, 0.0),
                            source: idx,
                        },
                    ];
                }
                let u = chord / d;
                let short = min - d;
                vec![
                    Delta::Point {
                        target: *p1,
                        amount: -u * (short * 0.5),
                        source: idx,
                    },
                    Delta::Point {
                        target: *p2,
                        amount: u * (short * 0.5),
                        source: idx,
                    },
                ]
            }
            Constraint::PointEquals { points } => {
                let diff = system.point(points[1]) - system.point(points[0]);
                vec![
                    Delta::Point {
                        target: points[0],
                        amount: diff * 0.5,
                        source: idx,
                    },
                    Delta::Point {
                        target: points[1],
                        amount: -diff * 0.5,
                        source: idx,
                    },
                ]
            }
            Constraint::Orientation { l1, l2, theta } => {
                let a1 = system.point(l1[0]);
                let a2 = system.point(l1[1]);
                let b1 = system.point(l2[0]);
                let b2 = system.point(l2[1]);
                let v1 = a2 - a1;
                let v2 = b2 - b1;
                if v1.norm() < geometry::EPSILON || v2.norm() < geometry::EPSILON {
                    return Vec::new();
                }
                let current = normalize_angle(angle_of([v2.x, v2.y]) - angle_of([v1.x, v1.y]));
                let error = normalize_angle(theta - current);
                if error.abs() < geometry::EPSILON {
                    return Vec::new();
                }
                let mut deltas = Vec::with_capacity(4);
                let m1 = [(a1.x + a2.x) * 0.5, (a1.y + a2.y) * 0.5];
                let m2 = [(b1.x + b2.x) * 0.5, (b1.y + b2.y) * 0.5];
                for (p, pos) in [(l1[0], a1), (l1[1], a2)] {
                    let r = rotate_about([pos.x, pos.y], m1, -error * ORIENTATION_STEP);
                    deltas.push(Delta::Point {
                        target: p,
                        amount: Vector2::new(r[0] - pos.x, r[1] - pos.y),
                        source: idx,
                    });
                }
                for (p, pos) in [(l2[0], b1), (l2[1], b2)] {
                    let r = rotate_about([pos.x, pos.y], m2, error * ORIENTATION_STEP);
                    deltas.push(Delta::Point {
                        target: p,
                        amount: Vector2::new(r[0] - pos.x, r[1] - pos.y),
                        source: idx,
                    });
                }
                deltas
            }
            Constraint::PointPlus { p1, p2, sum } => {
                let residual =
                    system.point(*sum) - (system.point(*p1).coords + system.point(*p2).coords);
                let share = residual.coords / 3.0;
                vec![
                    Delta::Point {
                        target: *p1,
                        amount: share,
                        source: idx,
                    },
                    Delta::Point {
                        target: *p2,
                        amount: share,
                        source: idx,
                    },
                    Delta::Point {
                        target: *sum,
                        amount: -share,
                        source: idx,
                    },
                ]
            }
            Constraint::PointTimes { p1, factor, p2 } => {
                let residual = system.point(*p2).coords - system.point(*p1).coords * *factor;
                if factor.abs() < geometry::EPSILON {
                    // p2 must sit at the origin-scaled image; p1 is free.
                    return vec![Delta::Point {
                        target: *p2,
                        amount: -residual,
                        source: idx,
                    }];
                }
                vec![
                    Delta::Point {
                        target: *p1,
                        amount: residual * 0.5 / *factor,
                        source: idx,
                    },
                    Delta::Point {
                        target: *p2,
                        amount: -residual * 0.5,
                        source: idx,
                    },
                ]
            }
            Constraint::Clock {
                center,
                hand,
                length,
                now,
                ..
            } => {
                let angle = system.var_value(*now);
                let c = system.point(*center);
                let target = Vector2::new(c.x + length * angle.cos(), c.y + length * angle.sin());
                vec![Delta::Point {
                    target: *hand,
                    amount: target - system.point(*hand).coords,
                    source: idx,
                }]
            }
            Constraint::PropertyPicker { point, axis, var } => {
                let axis_val = match axis {
                    Axis::X => system.point(*point).x,
                    Axis::Y => system.point(*point).y,
                };
                let diff = system.var_value(*var) - axis_val;
                let amount = match axis {
                    Axis::X => Vector2::new(diff * 0.5, 0.0),
                    Axis::Y => Vector2::new(0.0, diff * 0.5),
                };
                vec![
                    Delta::Point {
                        target: *point,
                        amount,
                        source: idx,
                    },
                    Delta::Var {
                        target: *var,
                        amount: -diff * 0.5,
                        source: idx,
                    },
                ]
            }
            Constraint::Formula {
                output,
                inputs,
                compute,
            } => formula::calculate_deltas(system, knowns, idx, *output, inputs, compute, self.epsilon),
        }
    }

    // =========================================================================
    // After-tick
    // =========================================================================

    fn after_tick(&self, system: &mut System, constraint: &Constraint) -> bool {
        match constraint {
            Constraint::Clock { speed, now, .. } => {
                let v = system.var_value(*now);
                system.set_var(*now, v + speed);
                speed.abs() > 0.0
            }
            _ => false,
        }
    }
}
