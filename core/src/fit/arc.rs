//! Arc and circle fitting for freehand strokes.
//!
//! Three samples pin the candidate circle: the stroke's first and last points
//! plus the interior sample furthest from the chord. The circumcenter comes
//! from the standard determinant formula; fitness is total radial deviation
//! over the swept arc length.

use super::FitError;
use crate::geometry::{angle_of, distance, distance_point_to_line, EPSILON};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcFit {
    pub center: [f64; 2],
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    /// Signed swept angle; positive is counter-clockwise. The sweep always
    /// passes through the stroke's middle sample.
    pub sweep: f64,
    /// Lower is better: total radial deviation over arc length.
    pub fitness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircleFit {
    pub center: [f64; 2],
    pub radius: f64,
    /// Lower is better: total radial deviation over circumference.
    pub fitness: f64,
}

/// Circumcenter of the circle through three points, or None when the points
/// are (nearly) collinear.
pub fn circumcenter(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> Option<[f64; 2]> {
    let d = 2.0 * (a[0] * (b[1] - c[1]) + b[0] * (c[1] - a[1]) + c[0] * (a[1] - b[1]));
    if d.abs() < EPSILON {
        return None;
    }
    let a_sq = a[0] * a[0] + a[1] * a[1];
    let b_sq = b[0] * b[0] + b[1] * b[1];
    let c_sq = c[0] * c[0] + c[1] * c[1];
    let ux = (a_sq * (b[1] - c[1]) + b_sq * (c[1] - a[1]) + c_sq * (a[1] - b[1])) / d;
    let uy = (a_sq * (c[0] - b[0]) + b_sq * (a[0] - c[0]) + c_sq * (b[0] - a[0])) / d;
    Some([ux, uy])
}

/// The interior sample furthest from the first-to-last chord.
fn furthest_from_chord(samples: &[[f64; 2]]) -> [f64; 2] {
    let first = samples[0];
    let last = samples[samples.len() - 1];
    let mut best = samples[1];
    let mut best_d = -1.0;
    for s in &samples[1..samples.len() - 1] {
        let d = distance_point_to_line(first, last, *s);
        if d > best_d {
            best_d = d;
            best = *s;
        }
    }
    best
}

pub fn fit_arc(samples: &[[f64; 2]]) -> Result<ArcFit, FitError> {
    if samples.len() < 3 {
        return Err(FitError::TooFewSamples {
            needed: 3,
            got: samples.len(),
        });
    }
    let first = samples[0];
    let last = samples[samples.len() - 1];
    let mid = furthest_from_chord(samples);

    let center = circumcenter(first, mid, last).ok_or(FitError::DegenerateStroke)?;
    let radius = distance(center, first);
    if radius < EPSILON {
        return Err(FitError::DegenerateStroke);
    }

    let start_angle = angle_of([first[0] - center[0], first[1] - center[1]]);
    let end_angle = angle_of([last[0] - center[0], last[1] - center[1]]);
    let mid_angle = angle_of([mid[0] - center[0], mid[1] - center[1]]);

    // Pick the sweep direction that passes through the middle sample.
    let ccw_sweep = (end_angle - start_angle).rem_euclid(2.0 * PI);
    let ccw_mid = (mid_angle - start_angle).rem_euclid(2.0 * PI);
    let sweep = if ccw_mid <= ccw_sweep {
        ccw_sweep
    } else {
        ccw_sweep - 2.0 * PI
    };

    let arc_length = radius * sweep.abs();
    if arc_length < EPSILON {
        return Err(FitError::DegenerateStroke);
    }

    let deviation: f64 = samples
        .iter()
        .map(|s| (distance(center, *s) - radius).abs())
        .sum();

    Ok(ArcFit {
        center,
        radius,
        start_angle,
        end_angle,
        sweep,
        fitness: deviation / arc_length,
    })
}

pub fn fit_circle(samples: &[[f64; 2]]) -> Result<CircleFit, FitError> {
    let arc = fit_arc(samples)?;
    let circumference = 2.0 * PI * arc.radius;
    let deviation: f64 = samples
        .iter()
        .map(|s| (distance(arc.center, *s) - arc.radius).abs())
        .sum();
    Ok(CircleFit {
        center: arc.center,
        radius: arc.radius,
        fitness: deviation / circumference,
    })
}
