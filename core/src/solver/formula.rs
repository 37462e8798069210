//! Numeric solving for formula cells.
//!
//! A formula cell relates an output variable to an arbitrary pure closure
//! over its declared inputs. There is no symbolic differentiator: partial
//! derivatives are estimated by finite differences and the inputs are walked
//! toward a root of `compute(inputs) - output` with Newton steps. The scratch
//! values never leak; the caller receives ordinary deltas and applies the
//! whole adjustment atomically under the shared damping factor.

use super::delta::{Delta, Knowns};
use super::types::{FormulaFn, ScalarRef, System, VarId};
use crate::geometry::Vector2;
use tracing::trace;

/// Cap on internal Newton steps per tick.
const MAX_ITERATIONS: usize = 100;

/// When the symmetric finite-difference gradient is this flat, retry
/// one-sided before declaring the input useless.
const DEGENERATE_GRADIENT: f64 = 1e-12;

pub(crate) fn calculate_deltas(
    system: &System,
    knowns: &Knowns,
    source: usize,
    output: VarId,
    inputs: &[ScalarRef],
    compute: &FormulaFn,
    epsilon: f64,
) -> Vec<Delta> {
    let original: Vec<f64> = inputs.iter().map(|r| system.scalar(*r)).collect();
    // Inputs pinned by propagation are off limits; the Newton walk only
    // adjusts the free ones.
    let free: Vec<bool> = inputs.iter().map(|r| !knowns.knows_scalar(*r)).collect();
    let target = system.var_value(output);

    if !free.iter().any(|f| *f) {
        // Nothing adjustable: nudge the output toward the computed value.
        return output_nudge(source, output, compute.eval(&original) - target);
    }

    let mut scratch = original.clone();
    let mut solved = false;
    for step in 0..MAX_ITERATIONS {
        let error = compute.eval(&scratch) - target;
        if error.abs() <= epsilon {
            solved = true;
            break;
        }

        let mut grads = vec![0.0; scratch.len()];
        let mut sum_sq = 0.0;
        for i in 0..scratch.len() {
            if !free[i] {
                continue;
            }
            let g = partial(compute, &mut scratch, i);
            grads[i] = g;
            sum_sq += g * g;
        }

        if sum_sq < DEGENERATE_GRADIENT {
            // Flat in every adjustable direction: no solution reachable from
            // here. Back off and only nudge the output variable.
            trace!(source, step, "formula cell has no reachable solution");
            return output_nudge(source, output, compute.eval(&original) - target);
        }

        // Gauss-Newton step for a single scalar equation.
        for i in 0..scratch.len() {
            if free[i] {
                scratch[i] -= error * grads[i] / sum_sq;
            }
        }
    }

    if !solved && (compute.eval(&scratch) - target).abs() > epsilon {
        return output_nudge(source, output, compute.eval(&original) - target);
    }

    let mut deltas = Vec::new();
    for (i, r) in inputs.iter().enumerate() {
        if !free[i] {
            continue;
        }
        let amount = scratch[i] - original[i];
        if amount == 0.0 {
            continue;
        }
        deltas.push(match r {
            ScalarRef::Var(v) => Delta::Var {
                target: *v,
                amount,
                source,
            },
            ScalarRef::PointX(p) => Delta::Point {
                target: *p,
                amount: Vector2::new(amount, 0.0),
                source,
            },
            ScalarRef::PointY(p) => Delta::Point {
                target: *p,
                amount: Vector2::new(0.0, amount),
                source,
            },
        });
    }
    deltas
}

fn output_nudge(source: usize, output: VarId, amount: f64) -> Vec<Delta> {
    vec![Delta::Var {
        target: output,
        amount,
        source,
    }]
}

/// Finite-difference partial of the formula w.r.t. input `i`, symmetric with
/// a one-sided fallback. Restores the scratch slot before returning.
fn partial(compute: &FormulaFn, scratch: &mut [f64], i: usize) -> f64 {
    let x = scratch[i];
    let h = (x.abs() * 1e-6).max(1e-6);

    scratch[i] = x + h;
    let plus = compute.eval(scratch);
    scratch[i] = x - h;
    let minus = compute.eval(scratch);
    scratch[i] = x;

    let symmetric = (plus - minus) / (2.0 * h);
    if symmetric.abs() >= DEGENERATE_GRADIENT {
        return symmetric;
    }

    let here = compute.eval(scratch);
    (plus - here) / h
}
