pub mod delta;
pub mod engine;
pub mod formula;
pub mod types;

pub use delta::{Delta, Knowns};
pub use engine::{Relax, SolveReport};
pub use types::{
    Axis, Constraint, ConstraintEntry, FormulaFn, PointId, ScalarRef, SolverError, System, Var,
    VarId,
};


#[cfg(test)]
mod tests_constraints;
