use crate::geometry::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Handle to a point stored in a [`System`].
/// Indices are only minted by `System::add_point`, so a handle is valid for
/// the lifetime of the system that produced it (points are never removed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId(pub usize);

/// Handle to a scalar variable stored in a [`System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub usize);

/// A named mutable scalar: lengths, angles, time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Var {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

/// A readable/writable scalar slot: either a free-standing variable or one
/// axis of a point. Formula cells and property pickers address state through
/// these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarRef {
    Var(VarId),
    PointX(PointId),
    PointY(PointId),
}

/// Opaque scalar formula over declared inputs, in declaration order.
///
/// Wrapping the closure keeps the constraint enum `Clone`/`Debug` while still
/// accepting arbitrary caller-supplied arithmetic.
#[derive(Clone)]
pub struct FormulaFn(Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>);

impl FormulaFn {
    pub fn new(f: impl Fn(&[f64]) -> f64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[inline]
    pub fn eval(&self, inputs: &[f64]) -> f64 {
        (self.0)(inputs)
    }
}

impl fmt::Debug for FormulaFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FormulaFn(..)")
    }
}

/// The constraint catalog. Every variant participates in the same
/// propagate-then-relax protocol driven by [`super::Relax`].
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Pin a variable to a wanted value.
    FixedVar { var: VarId, wanted: f64 },
    /// Two variables hold the same value.
    VarEquals { vars: [VarId; 2] },
    /// Pin a point to a wanted position.
    FixedPoint { point: PointId, wanted: Point2 },
    /// All points share one y.
    Horizontal { points: Vec<PointId> },
    /// All points share one x.
    Vertical { points: Vec<PointId> },
    /// Inequality: `p1.y - min_amount > p2.y`. Pushes apart only when violated.
    Above {
        p1: PointId,
        p2: PointId,
        min_amount: f64,
    },
    /// distance(p1, p2) == length variable.
    Length {
        p1: PointId,
        p2: PointId,
        length: VarId,
    },
    /// Inequality: distance(p1, p2) >= min.
    MinLength { p1: PointId, p2: PointId, min: f64 },
    /// Two points coincide.
    PointEquals { points: [PointId; 2] },
    /// The angle from segment l1 to segment l2 equals theta (radians).
    Orientation {
        l1: [PointId; 2],
        l2: [PointId; 2],
        theta: f64,
    },
    /// p1 + p2 == sum, component-wise.
    PointPlus {
        p1: PointId,
        p2: PointId,
        sum: PointId,
    },
    /// p1 * factor == p2, component-wise.
    PointTimes {
        p1: PointId,
        factor: f64,
        p2: PointId,
    },
    /// `hand` sits at polar offset (`length`, angle = `now`) from `center`.
    /// The after-tick hook advances `now` by `speed`, so a clock never rests.
    Clock {
        center: PointId,
        hand: PointId,
        length: f64,
        speed: f64,
        now: VarId,
    },
    /// Tie one axis of a point to a variable.
    PropertyPicker {
        point: PointId,
        axis: Axis,
        var: VarId,
    },
    /// output == compute(inputs), for an arbitrary pure scalar formula.
    Formula {
        output: VarId,
        inputs: Vec<ScalarRef>,
        compute: FormulaFn,
    },
}

/// Wrapper for constraints with suppression state.
#[derive(Debug, Clone)]
pub struct ConstraintEntry {
    pub constraint: Constraint,
    pub suppressed: bool,
}

impl ConstraintEntry {
    pub fn new(constraint: Constraint) -> Self {
        Self {
            constraint,
            suppressed: false,
        }
    }
}

impl From<Constraint> for ConstraintEntry {
    fn from(constraint: Constraint) -> Self {
        Self::new(constraint)
    }
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("constraint references unknown point {0:?}")]
    UnknownPoint(PointId),
    #[error("constraint references unknown var {0:?}")]
    UnknownVar(VarId),
    #[error("formula cell declares no inputs")]
    EmptyFormula,
}

/// The mutable state the solver operates on: point and variable arenas plus
/// the active constraint set. Callers add and remove constraints per frame
/// (hand-of-god pins for whatever is being dragged); the solver itself never
/// removes anything.
#[derive(Debug, Default)]
pub struct System {
    pub points: Vec<Point2>,
    pub vars: Vec<Var>,
    pub constraints: Vec<ConstraintEntry>,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, x: f64, y: f64) -> PointId {
        self.points.push(Point2::new(x, y));
        PointId(self.points.len() - 1)
    }

    pub fn add_var(&mut self, value: f64) -> VarId {
        self.vars.push(Var { value, label: None });
        VarId(self.vars.len() - 1)
    }

    pub fn add_labeled_var(&mut self, value: f64, label: &str) -> VarId {
        self.vars.push(Var {
            value,
            label: Some(label.to_string()),
        });
        VarId(self.vars.len() - 1)
    }

    #[inline]
    pub fn point(&self, id: PointId) -> Point2 {
        self.points[id.0]
    }

    #[inline]
    pub fn point_mut(&mut self, id: PointId) -> &mut Point2 {
        &mut self.points[id.0]
    }

    #[inline]
    pub fn var_value(&self, id: VarId) -> f64 {
        self.vars[id.0].value
    }

    #[inline]
    pub fn set_var(&mut self, id: VarId, value: f64) {
        self.vars[id.0].value = value;
    }

    /// Read a scalar slot.
    pub fn scalar(&self, r: ScalarRef) -> f64 {
        match r {
            ScalarRef::Var(v) => self.var_value(v),
            ScalarRef::PointX(p) => self.point(p).x,
            ScalarRef::PointY(p) => self.point(p).y,
        }
    }

    /// Write a scalar slot.
    pub fn set_scalar(&mut self, r: ScalarRef, value: f64) {
        match r {
            ScalarRef::Var(v) => self.set_var(v, value),
            ScalarRef::PointX(p) => self.point_mut(p).x = value,
            ScalarRef::PointY(p) => self.point_mut(p).y = value,
        }
    }

    /// Add a constraint after validating every handle it references.
    /// Returns the constraint's index, usable for `remove_constraint`.
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<usize, SolverError> {
        self.validate(&constraint)?;
        self.constraints.push(ConstraintEntry::new(constraint));
        Ok(self.constraints.len() - 1)
    }

    /// Remove a constraint by index, compacting the list.
    /// Indices of later constraints shift down by one.
    pub fn remove_constraint(&mut self, index: usize) {
        if index < self.constraints.len() {
            self.constraints.remove(index);
        }
    }

    /// Drop every constraint the predicate rejects. Useful for clearing
    /// per-frame hand-of-god pins.
    pub fn retain_constraints(&mut self, keep: impl FnMut(&ConstraintEntry) -> bool) {
        self.constraints.retain(keep);
    }

    pub fn set_constraint_suppression(&mut self, index: usize, suppressed: bool) {
        if let Some(entry) = self.constraints.get_mut(index) {
            entry.suppressed = suppressed;
        }
    }

    /// Active (non-suppressed) constraints with their indices.
    pub fn active_constraints(&self) -> impl Iterator<Item = (usize, &Constraint)> {
        self.constraints
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.suppressed)
            .map(|(i, e)| (i, &e.constraint))
    }

    /// Install the mid-point composite: `pm` sits at `fract` of the way from
    /// `p1` to `p3`. Built from two formula cells (one per axis) tied to the
    /// mid point through property pickers.
    pub fn add_midpoint(
        &mut self,
        p1: PointId,
        pm: PointId,
        p3: PointId,
        fract: f64,
    ) -> Result<Vec<usize>, SolverError> {
        let mut indices = Vec::with_capacity(4);
        for axis in [Axis::X, Axis::Y] {
            let (a, b, m) = match axis {
                Axis::X => (ScalarRef::PointX(p1), ScalarRef::PointX(p3), pm),
                Axis::Y => (ScalarRef::PointY(p1), ScalarRef::PointY(p3), pm),
            };
            let cell = self.add_var(self.scalar(a) + fract * (self.scalar(b) - self.scalar(a)));
            indices.push(self.add_constraint(Constraint::Formula {
                output: cell,
                inputs: vec![a, b],
                compute: FormulaFn::new(move |vals| vals[0] + fract * (vals[1] - vals[0])),
            })?);
            indices.push(self.add_constraint(Constraint::PropertyPicker {
                point: m,
                axis,
                var: cell,
            })?);
        }
        Ok(indices)
    }

    fn check_point(&self, id: PointId) -> Result<(), SolverError> {
        if id.0 < self.points.len() {
            Ok(())
        } else {
            Err(SolverError::UnknownPoint(id))
        }
    }

    fn check_var(&self, id: VarId) -> Result<(), SolverError> {
        if id.0 < self.vars.len() {
            Ok(())
        } else {
            Err(SolverError::UnknownVar(id))
        }
    }

    fn check_scalar(&self, r: ScalarRef) -> Result<(), SolverError> {
        match r {
            ScalarRef::Var(v) => self.check_var(v),
            ScalarRef::PointX(p) | ScalarRef::PointY(p) => self.check_point(p),
        }
    }

    fn validate(&self, constraint: &Constraint) -> Result<(), SolverError> {
        match constraint {
            Constraint::FixedVar { var, .. } => self.check_var(*var),
            Constraint::VarEquals { vars } => {
                self.check_var(vars[0])?;
                self.check_var(vars[1])
            }
            Constraint::FixedPoint { point, .. } => self.check_point(*point),
            Constraint::Horizontal { points } | Constraint::Vertical { points } => {
                points.iter().try_for_each(|p| self.check_point(*p))
            }
            Constraint::Above { p1, p2, .. } | Constraint::MinLength { p1, p2, .. } => {
                self.check_point(*p1)?;
                self.check_point(*p2)
            }
            Constraint::Length { p1, p2, length } => {
                self.check_point(*p1)?;
                self.check_point(*p2)?;
                self.check_var(*length)
            }
            Constraint::PointEquals { points } => {
                self.check_point(points[0])?;
                self.check_point(points[1])
            }
            Constraint::Orientation { l1, l2, .. } => {
                for p in l1.iter().chain(l2.iter()) {
                    self.check_point(*p)?;
                }
                Ok(())
            }
            Constraint::PointPlus { p1, p2, sum } => {
                self.check_point(*p1)?;
                self.check_point(*p2)?;
                self.check_point(*sum)
            }
            Constraint::PointTimes { p1, p2, .. } => {
                self.check_point(*p1)?;
                self.check_point(*p2)
            }
            Constraint::Clock {
                center, hand, now, ..
            } => {
                self.check_point(*center)?;
                self.check_point(*hand)?;
                self.check_var(*now)
            }
            Constraint::PropertyPicker { point, var, .. } => {
                self.check_point(*point)?;
                self.check_var(*var)
            }
            Constraint::Formula { output, inputs, .. } => {
                if inputs.is_empty() {
                    return Err(SolverError::EmptyFormula);
                }
                self.check_var(*output)?;
                inputs.iter().try_for_each(|r| self.check_scalar(*r))
            }
        }
    }
}
