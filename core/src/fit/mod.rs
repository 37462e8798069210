//! Curve fitting for freehand pen strokes.
//!
//! Given the raw samples of a stroke, produce candidate primitives (line,
//! arc, circle) with a lower-is-better fitness each, and pick the best
//! candidate under the ink tool's selection policy.

use crate::geometry::{distance, distance_point_to_line, EPSILON};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;
use tracing::debug;

pub mod arc;
pub use arc::{circumcenter, fit_arc, fit_circle, ArcFit, CircleFit};

/// Minimum swept angle before an arc is preferred over a line. Below this,
/// the stroke does not curve enough to not be better explained as a line.
pub const MIN_ARC_ANGLE: f64 = 0.4 * PI;

/// Swept angle beyond which an arc escalates to a full circle.
pub const FULL_CIRCLE_ANGLE: f64 = 1.5 * PI;

/// Sanity cap on circle radius: nearly straight strokes produce noise-driven
/// near-infinite radii.
pub const MAX_CIRCLE_RADIUS: f64 = 500.0;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("stroke has {got} samples, need at least {needed}")]
    TooFewSamples { needed: usize, got: usize },
    #[error("stroke is degenerate (zero-length chord or collinear samples)")]
    DegenerateStroke,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineFit {
    pub start: [f64; 2],
    pub end: [f64; 2],
    /// Lower is straighter: summed perpendicular deviation of the interior
    /// samples from the chord, over chord length.
    pub fitness: f64,
}

/// The primitive chosen for a stroke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Fitted {
    Line(LineFit),
    Arc(ArcFit),
    Circle(CircleFit),
}

pub fn fit_line(samples: &[[f64; 2]]) -> Result<LineFit, FitError> {
    if samples.len() < 2 {
        return Err(FitError::TooFewSamples {
            needed: 2,
            got: samples.len(),
        });
    }
    let start = samples[0];
    let end = samples[samples.len() - 1];
    let chord = distance(start, end);
    if chord < EPSILON {
        return Err(FitError::DegenerateStroke);
    }
    let deviation: f64 = samples[1..samples.len() - 1]
        .iter()
        .map(|s| distance_point_to_line(start, end, *s))
        .sum();
    Ok(LineFit {
        start,
        end,
        fitness: deviation / chord,
    })
}

/// Selection policy: prefer the line; take the arc when it fits better AND
/// the stroke curves enough; escalate to a full circle for near-closed
/// sweeps with a sane radius.
pub fn best_fit(samples: &[[f64; 2]]) -> Result<Fitted, FitError> {
    let line = fit_line(samples)?;

    let arc = match fit_arc(samples) {
        Ok(arc) => arc,
        Err(_) => {
            debug!(fitness = line.fitness, "no arc candidate, stroke is a line");
            return Ok(Fitted::Line(line));
        }
    };

    if arc.fitness >= line.fitness || arc.sweep.abs() <= MIN_ARC_ANGLE {
        debug!(
            line_fitness = line.fitness,
            arc_fitness = arc.fitness,
            sweep = arc.sweep,
            "stroke fitted as line"
        );
        return Ok(Fitted::Line(line));
    }

    if arc.sweep.abs() > FULL_CIRCLE_ANGLE {
        if let Ok(circle) = fit_circle(samples) {
            if circle.fitness < arc.fitness && circle.radius < MAX_CIRCLE_RADIUS {
                debug!(
                    radius = circle.radius,
                    fitness = circle.fitness,
                    "stroke fitted as circle"
                );
                return Ok(Fitted::Circle(circle));
            }
        }
    }

    debug!(
        fitness = arc.fitness,
        sweep = arc.sweep,
        "stroke fitted as arc"
    );
    Ok(Fitted::Arc(arc))
}
