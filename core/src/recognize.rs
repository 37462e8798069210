//! Post-fit normalization and hand-off to the constraint system.
//!
//! The ink tool calls [`recognize_stroke`] with raw pen samples; the fitted
//! primitive is snapped (near-axis lines become exactly axis-aligned, arc
//! angles land on quarter turns) and described as a [`RecognizedGuide`]. A
//! guide can then be installed into a [`System`], which creates its solver
//! points and the derived constraints that keep the geometry formal while
//! the user keeps dragging.

use crate::fit::{best_fit, Fitted};
use crate::geometry::{distance, midpoint};
use crate::solver::{Constraint, PointId, System, VarId};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Identifier for a recognized stroke handed to external callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuideId(pub Uuid);

impl GuideId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Deterministic id from a string seed, for replayable sessions.
    pub fn new_deterministic(seed: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()))
    }
}

impl Default for GuideId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GuideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for post-fit snapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapConfig {
    /// Angular tolerance (radians) for hard-snapping near-vertical and
    /// near-horizontal lines.
    pub axis_tolerance: f64,
    /// Angular tolerance (radians) for snapping arc start/end angles to
    /// multiples of a quarter turn.
    pub quarter_turn_tolerance: f64,
    pub enable_axis_snap: bool,
    pub enable_quarter_turn_snap: bool,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            axis_tolerance: 0.1,
            quarter_turn_tolerance: 0.15,
            enable_axis_snap: true,
            enable_quarter_turn_snap: true,
        }
    }
}

/// A fitted, normalized stroke ready to be installed or rendered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedGuide {
    pub id: GuideId,
    pub geometry: Fitted,
}

/// Snap a fitted primitive per the configuration.
pub fn normalize(fitted: Fitted, config: &SnapConfig) -> Fitted {
    match fitted {
        Fitted::Line(mut line) => {
            if config.enable_axis_snap {
                let dx = line.end[0] - line.start[0];
                let dy = line.end[1] - line.start[1];
                let angle = dy.atan2(dx);
                let mid = midpoint(line.start, line.end);
                let half = distance(line.start, line.end) * 0.5;

                // Distance to the horizontal axis family (0 or PI)...
                let to_horizontal = angle.sin().asin().abs();
                // ...and to the vertical family (+-PI/2).
                let to_vertical = (angle.abs() - FRAC_PI_2).abs();

                if to_horizontal <= config.axis_tolerance {
                    let dir = if dx >= 0.0 { 1.0 } else { -1.0 };
                    line.start = [mid[0] - dir * half, mid[1]];
                    line.end = [mid[0] + dir * half, mid[1]];
                    debug!(id = "line", "snapped to horizontal");
                } else if to_vertical <= config.axis_tolerance {
                    let dir = if dy >= 0.0 { 1.0 } else { -1.0 };
                    line.start = [mid[0], mid[1] - dir * half];
                    line.end = [mid[0], mid[1] + dir * half];
                    debug!(id = "line", "snapped to vertical");
                }
            }
            Fitted::Line(line)
        }
        Fitted::Arc(mut arc) => {
            if config.enable_quarter_turn_snap {
                arc.start_angle = snap_angle(arc.start_angle, config.quarter_turn_tolerance);
                arc.end_angle = snap_angle(arc.end_angle, config.quarter_turn_tolerance);
            }
            Fitted::Arc(arc)
        }
        circle @ Fitted::Circle(_) => circle,
    }
}

/// Snap an angle to the nearest multiple of a quarter turn when within
/// tolerance; otherwise leave it alone.
fn snap_angle(angle: f64, tolerance: f64) -> f64 {
    let nearest = (angle / FRAC_PI_2).round() * FRAC_PI_2;
    if (angle - nearest).abs() <= tolerance {
        nearest
    } else {
        angle
    }
}

/// Fit, snap, and describe a raw stroke.
pub fn recognize_stroke(
    samples: &[[f64; 2]],
    config: &SnapConfig,
) -> Result<RecognizedGuide, crate::fit::FitError> {
    let fitted = best_fit(samples)?;
    Ok(RecognizedGuide {
        id: GuideId::new(),
        geometry: normalize(fitted, config),
    })
}

/// Solver handles created for an installed guide, so a UI can attach
/// hand-of-god pins to the points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledGuide {
    pub id: GuideId,
    pub points: Vec<PointId>,
    pub vars: Vec<VarId>,
    pub constraints: Vec<usize>,
}

/// Create the solver points/vars for a guide plus the derived constraints
/// that keep it formal: a pinned length for lines (with Horizontal/Vertical
/// when axis-aligned), a fixed center and pinned radius for arcs/circles.
pub fn install_guide(
    system: &mut System,
    guide: &RecognizedGuide,
) -> Result<InstalledGuide, crate::solver::SolverError> {
    let mut points = Vec::new();
    let mut vars = Vec::new();
    let mut constraints = Vec::new();

    match &guide.geometry {
        Fitted::Line(line) => {
            let p1 = system.add_point(line.start[0], line.start[1]);
            let p2 = system.add_point(line.end[0], line.end[1]);
            let len = system.add_labeled_var(distance(line.start, line.end), "length");
            constraints.push(system.add_constraint(Constraint::Length {
                p1,
                p2,
                length: len,
            })?);
            constraints.push(system.add_constraint(Constraint::FixedVar {
                var: len,
                wanted: system.var_value(len),
            })?);
            if (line.start[1] - line.end[1]).abs() < crate::geometry::EPSILON {
                constraints
                    .push(system.add_constraint(Constraint::Horizontal {
                        points: vec![p1, p2],
                    })?);
            } else if (line.start[0] - line.end[0]).abs() < crate::geometry::EPSILON {
                constraints.push(system.add_constraint(Constraint::Vertical {
                    points: vec![p1, p2],
                })?);
            }
            points.extend([p1, p2]);
            vars.push(len);
        }
        Fitted::Arc(arc) => {
            let center = system.add_point(arc.center[0], arc.center[1]);
            let start = system.add_point(
                arc.center[0] + arc.radius * arc.start_angle.cos(),
                arc.center[1] + arc.radius * arc.start_angle.sin(),
            );
            let end = system.add_point(
                arc.center[0] + arc.radius * arc.end_angle.cos(),
                arc.center[1] + arc.radius * arc.end_angle.sin(),
            );
            let radius = system.add_labeled_var(arc.radius, "radius");
            constraints.push(system.add_constraint(Constraint::FixedPoint {
                point: center,
                wanted: system.point(center),
            })?);
            constraints.push(system.add_constraint(Constraint::Length {
                p1: center,
                p2: start,
                length: radius,
            })?);
            constraints.push(system.add_constraint(Constraint::Length {
                p1: center,
                p2: end,
                length: radius,
            })?);
            constraints.push(system.add_constraint(Constraint::FixedVar {
                var: radius,
                wanted: arc.radius,
            })?);
            points.extend([center, start, end]);
            vars.push(radius);
        }
        Fitted::Circle(circle) => {
            let center = system.add_point(circle.center[0], circle.center[1]);
            let rim = system.add_point(circle.center[0] + circle.radius, circle.center[1]);
            let radius = system.add_labeled_var(circle.radius, "radius");
            constraints.push(system.add_constraint(Constraint::FixedPoint {
                point: center,
                wanted: system.point(center),
            })?);
            constraints.push(system.add_constraint(Constraint::Length {
                p1: center,
                p2: rim,
                length: radius,
            })?);
            constraints.push(system.add_constraint(Constraint::FixedVar {
                var: radius,
                wanted: circle.radius,
            })?);
            points.extend([center, rim]);
            vars.push(radius);
        }
    }

    Ok(InstalledGuide {
        id: guide.id,
        points,
        vars,
        constraints,
    })
}
