//! 2D geometry utilities shared by the solver and the stroke fitter.
//!
//! Pure functions over `[f64; 2]` points, which is the representation used at
//! the serialized API surface (raw pen samples, fitted primitives).

use super::EPSILON;

// =============================================================================
// Point Operations
// =============================================================================

/// Compute squared distance between two 2D points.
#[inline]
pub fn distance_squared(p1: [f64; 2], p2: [f64; 2]) -> f64 {
    let dx = p2[0] - p1[0];
    let dy = p2[1] - p1[1];
    dx * dx + dy * dy
}

/// Compute distance between two 2D points.
#[inline]
pub fn distance(p1: [f64; 2], p2: [f64; 2]) -> f64 {
    distance_squared(p1, p2).sqrt()
}

/// Linear interpolation between two 2D points.
#[inline]
pub fn lerp(p1: [f64; 2], p2: [f64; 2], t: f64) -> [f64; 2] {
    [p1[0] + t * (p2[0] - p1[0]), p1[1] + t * (p2[1] - p1[1])]
}

/// Midpoint between two 2D points.
#[inline]
pub fn midpoint(p1: [f64; 2], p2: [f64; 2]) -> [f64; 2] {
    lerp(p1, p2, 0.5)
}

// =============================================================================
// Vector Operations
// =============================================================================

/// Rotate a 2D vector counter-clockwise by `angle` radians.
#[inline]
pub fn rotate_2d(v: [f64; 2], angle: f64) -> [f64; 2] {
    let (s, c) = angle.sin_cos();
    [v[0] * c - v[1] * s, v[0] * s + v[1] * c]
}

/// Rotate `p` about `center` counter-clockwise by `angle` radians.
#[inline]
pub fn rotate_about(p: [f64; 2], center: [f64; 2], angle: f64) -> [f64; 2] {
    let r = rotate_2d([p[0] - center[0], p[1] - center[1]], angle);
    [center[0] + r[0], center[1] + r[1]]
}

/// Angle of a vector, via atan2, in (-PI, PI].
#[inline]
pub fn angle_of(v: [f64; 2]) -> f64 {
    v[1].atan2(v[0])
}

/// Wrap an angle difference into (-PI, PI].
pub fn normalize_angle(mut a: f64) -> f64 {
    use std::f64::consts::PI;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a <= -PI {
        a += 2.0 * PI;
    }
    a
}

// =============================================================================
// Line Segment Operations
// =============================================================================

/// Compute perpendicular distance from point to the infinite line through
/// `line_start` and `line_end`.
pub fn distance_point_to_line(line_start: [f64; 2], line_end: [f64; 2], point: [f64; 2]) -> f64 {
    let dx = line_end[0] - line_start[0];
    let dy = line_end[1] - line_start[1];
    let len = (dx * dx + dy * dy).sqrt();

    if len < EPSILON {
        return distance(line_start, point);
    }

    let vx = point[0] - line_start[0];
    let vy = point[1] - line_start[1];
    (vx * dy - vy * dx).abs() / len
}
