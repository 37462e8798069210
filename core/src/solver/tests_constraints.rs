use crate::geometry::{ApproxEq, Point2};
use crate::solver::{Axis, Constraint, Relax, System};
use std::f64::consts::FRAC_PI_2;

#[test]
fn test_horizontal_converges_to_mean() {
    let mut system = System::new();
    let p1 = system.add_point(0.0, 0.0);
    let p2 = system.add_point(10.0, 6.0);
    let p3 = system.add_point(20.0, 12.0);
    system
        .add_constraint(Constraint::Horizontal {
            points: vec![p1, p2, p3],
        })
        .unwrap();

    let relax = Relax::new();
    assert!(relax.solve(&mut system));

    // No individual y is pinned, so the mean is the fixed point of the rule.
    for p in [p1, p2, p3] {
        assert!((system.point(p).y - 6.0).abs() < 0.01);
    }
    // x untouched.
    assert_eq!(system.point(p3).x, 20.0);
}

#[test]
fn test_horizontal_broadcasts_known_y() {
    let mut system = System::new();
    let p1 = system.add_point(0.0, 7.0);
    let p2 = system.add_point(10.0, 0.0);
    let p3 = system.add_point(20.0, 99.0);
    system
        .add_constraint(Constraint::FixedPoint {
            point: p1,
            wanted: Point2::new(0.0, 7.0),
        })
        .unwrap();
    system
        .add_constraint(Constraint::Horizontal {
            points: vec![p1, p2, p3],
        })
        .unwrap();

    let relax = Relax::new();
    relax.run_one_iteration(&mut system);

    // One pinned y propagates exactly to the whole group in a single tick.
    assert_eq!(system.point(p2).y, 7.0);
    assert_eq!(system.point(p3).y, 7.0);
    assert_eq!(system.point(p2).x, 10.0);
}

#[test]
fn test_vertical_converges_to_mean() {
    let mut system = System::new();
    let p1 = system.add_point(3.0, 0.0);
    let p2 = system.add_point(9.0, 5.0);
    system
        .add_constraint(Constraint::Vertical {
            points: vec![p1, p2],
        })
        .unwrap();

    let relax = Relax::new();
    assert!(relax.solve(&mut system));

    assert!((system.point(p1).x - 6.0).abs() < 0.01);
    assert!((system.point(p2).x - 6.0).abs() < 0.01);
}

#[test]
fn test_length_free_equilibrium() {
    // Nothing is pinned: the triple drifts to some self-consistent state,
    // not a particular one. Assert the invariant, not a number.
    let mut system = System::new();
    let p1 = system.add_point(0.0, 0.0);
    let p2 = system.add_point(10.0, 0.0);
    let len = system.add_var(4.0);
    system
        .add_constraint(Constraint::Length {
            p1,
            p2,
            length: len,
        })
        .unwrap();

    let relax = Relax::new();
    assert!(relax.solve(&mut system));

    let d = (system.point(p2) - system.point(p1)).norm();
    assert!((d - system.var_value(len)).abs() < 0.01);
}

#[test]
fn test_length_with_pinned_var_moves_points_only() {
    let mut system = System::new();
    let p1 = system.add_point(0.0, 0.0);
    let p2 = system.add_point(10.0, 0.0);
    let len = system.add_var(4.0);
    system
        .add_constraint(Constraint::FixedVar {
            var: len,
            wanted: 4.0,
        })
        .unwrap();
    system
        .add_constraint(Constraint::Length {
            p1,
            p2,
            length: len,
        })
        .unwrap();

    let relax = Relax::new();
    assert!(relax.solve(&mut system));

    assert_eq!(system.var_value(len), 4.0);
    let d = (system.point(p2) - system.point(p1)).norm();
    assert!((d - 4.0).abs() < 0.01);
}

#[test]
fn test_length_coincident_points_separate() {
    let mut system = System::new();
    let p1 = system.add_point(5.0, 5.0);
    let p2 = system.add_point(5.0, 5.0);
    let len = system.add_var(8.0);
    system
        .add_constraint(Constraint::Length {
            p1,
            p2,
            length: len,
        })
        .unwrap();

    let relax = Relax::new();
    assert!(relax.solve(&mut system));

    let d = (system.point(p2) - system.point(p1)).norm();
    assert!((d - system.var_value(len)).abs() < 0.01);
    assert!(d > 1.0, "points must have separated, d = {d}");
}

#[test]
fn test_min_length_rests_when_satisfied() {
    let mut system = System::new();
    let p1 = system.add_point(0.0, 0.0);
    let p2 = system.add_point(10.0, 0.0);
    system
        .add_constraint(Constraint::MinLength { p1, p2, min: 5.0 })
        .unwrap();

    let relax = Relax::new();
    assert!(!relax.run_one_iteration(&mut system));
    assert_eq!(system.point(p1), Point2::new(0.0, 0.0));
    assert_eq!(system.point(p2), Point2::new(10.0, 0.0));
}

#[test]
fn test_min_length_pushes_apart_when_violated() {
    let mut system = System::new();
    let p1 = system.add_point(0.0, 0.0);
    let p2 = system.add_point(2.0, 0.0);
    system
        .add_constraint(Constraint::MinLength { p1, p2, min: 5.0 })
        .unwrap();

    let relax = Relax::new();
    assert!(relax.solve(&mut system));

    let d = (system.point(p2) - system.point(p1)).norm();
    assert!((d - 5.0).abs() < 0.01);
}

#[test]
fn test_min_length_coincident_points_separate() {
    // Coincident endpoints have no chord direction; the pair still reports
    // change and splits apart along x instead of resting (or dividing by a
    // zero norm).
    let mut system = System::new();
    let p1 = system.add_point(2.0, 2.0);
    let p2 = system.add_point(2.0, 2.0);
    system
        .add_constraint(Constraint::MinLength { p1, p2, min: 5.0 })
        .unwrap();

    let relax = Relax::new();
    assert!(relax.run_one_iteration(&mut system), "coincident pair must move");
    assert!(relax.solve(&mut system));

    let d = (system.point(p2) - system.point(p1)).norm();
    assert!((d - 5.0).abs() < 0.01);
    assert!(system.point(p2).x > system.point(p1).x + 1.0);
    // The separation is purely horizontal.
    assert_eq!(system.point(p1).y, 2.0);
    assert_eq!(system.point(p2).y, 2.0);
}

#[test]
fn test_orientation_zero_length_segment_rests() {
    // A segment whose endpoints coincide has no direction to rotate toward;
    // the constraint produces no delta at all.
    let mut system = System::new();
    let a = system.add_point(1.0, 1.0);
    let b1 = system.add_point(5.0, 0.0);
    let b2 = system.add_point(9.0, 0.0);
    system
        .add_constraint(Constraint::Orientation {
            l1: [a, a],
            l2: [b1, b2],
            theta: FRAC_PI_2,
        })
        .unwrap();

    let relax = Relax::new();
    assert!(!relax.run_one_iteration(&mut system));
    assert_eq!(system.point(a), Point2::new(1.0, 1.0));
    assert_eq!(system.point(b1), Point2::new(5.0, 0.0));
    assert_eq!(system.point(b2), Point2::new(9.0, 0.0));
}

#[test]
fn test_above_rests_when_satisfied() {
    let mut system = System::new();
    let p1 = system.add_point(0.0, 20.0);
    let p2 = system.add_point(0.0, 0.0);
    system
        .add_constraint(Constraint::Above {
            p1,
            p2,
            min_amount: 10.0,
        })
        .unwrap();

    let relax = Relax::new();
    assert!(!relax.run_one_iteration(&mut system));
}

#[test]
fn test_above_pushes_apart_when_violated() {
    let mut system = System::new();
    let p1 = system.add_point(0.0, 3.0);
    let p2 = system.add_point(0.0, 0.0);
    system
        .add_constraint(Constraint::Above {
            p1,
            p2,
            min_amount: 10.0,
        })
        .unwrap();

    let relax = Relax::new();
    assert!(relax.solve(&mut system));

    let gap = system.point(p1).y - system.point(p2).y;
    assert!(gap >= 10.0 - 0.01, "gap = {gap}");
    // The push splits evenly around the initial midpoint.
    assert!((system.point(p1).y + system.point(p2).y - 3.0).abs() < 0.01);
}

#[test]
fn test_var_equals_splits_difference() {
    let mut system = System::new();
    let a = system.add_var(0.0);
    let b = system.add_var(10.0);
    system.add_constraint(Constraint::VarEquals { vars: [a, b] }).unwrap();

    let relax = Relax::new();
    assert!(relax.solve(&mut system));

    assert!((system.var_value(a) - 5.0).abs() < 0.01);
    assert!((system.var_value(b) - 5.0).abs() < 0.01);
}

#[test]
fn test_var_equals_propagates_from_fixed() {
    let mut system = System::new();
    let a = system.add_var(3.0);
    let b = system.add_var(77.0);
    system
        .add_constraint(Constraint::FixedVar { var: a, wanted: 3.0 })
        .unwrap();
    system.add_constraint(Constraint::VarEquals { vars: [a, b] }).unwrap();

    let relax = Relax::new();
    relax.run_one_iteration(&mut system);

    assert_eq!(system.var_value(b), 3.0);
}

#[test]
fn test_point_plus_converges() {
    let mut system = System::new();
    let p1 = system.add_point(1.0, 1.0);
    let p2 = system.add_point(2.0, 3.0);
    let sum = system.add_point(10.0, 10.0);
    system
        .add_constraint(Constraint::PointPlus { p1, p2, sum })
        .unwrap();

    let relax = Relax::new();
    assert!(relax.solve(&mut system));

    let residual = system.point(sum).coords - (system.point(p1).coords + system.point(p2).coords);
    assert!(residual.norm() < 0.01);
}

#[test]
fn test_point_plus_propagates_axis_algebra() {
    let mut system = System::new();
    let p1 = system.add_point(1.0, 2.0);
    let p2 = system.add_point(0.0, 0.0);
    let sum = system.add_point(10.0, 10.0);
    system
        .add_constraint(Constraint::FixedPoint {
            point: p1,
            wanted: Point2::new(1.0, 2.0),
        })
        .unwrap();
    system
        .add_constraint(Constraint::FixedPoint {
            point: sum,
            wanted: Point2::new(10.0, 10.0),
        })
        .unwrap();
    system
        .add_constraint(Constraint::PointPlus { p1, p2, sum })
        .unwrap();

    let relax = Relax::new();
    relax.run_one_iteration(&mut system);

    // Two of three known: the third is exact algebra, not relaxation.
    assert_eq!(system.point(p2), Point2::new(9.0, 8.0));
}

#[test]
fn test_point_times_converges() {
    let mut system = System::new();
    let p1 = system.add_point(3.0, 4.0);
    let p2 = system.add_point(0.0, 0.0);
    system
        .add_constraint(Constraint::PointTimes {
            p1,
            factor: 2.0,
            p2,
        })
        .unwrap();

    let relax = Relax::new();
    assert!(relax.solve(&mut system));

    let residual = system.point(p2).coords - system.point(p1).coords * 2.0;
    assert!(residual.norm() < 0.01);
}

#[test]
fn test_point_times_propagates_scaling() {
    let mut system = System::new();
    let p1 = system.add_point(3.0, 4.0);
    let p2 = system.add_point(0.0, 0.0);
    system
        .add_constraint(Constraint::FixedPoint {
            point: p1,
            wanted: Point2::new(3.0, 4.0),
        })
        .unwrap();
    system
        .add_constraint(Constraint::PointTimes {
            p1,
            factor: 2.0,
            p2,
        })
        .unwrap();

    let relax = Relax::new();
    relax.run_one_iteration(&mut system);

    assert_eq!(system.point(p2), Point2::new(6.0, 8.0));
}

#[test]
fn test_orientation_converges_to_angle() {
    let mut system = System::new();
    let a1 = system.add_point(0.0, 0.0);
    let a2 = system.add_point(10.0, 0.0);
    let b1 = system.add_point(20.0, 0.0);
    let b2 = system.add_point(30.0, 0.0);
    system
        .add_constraint(Constraint::Orientation {
            l1: [a1, a2],
            l2: [b1, b2],
            theta: FRAC_PI_2,
        })
        .unwrap();

    let relax = Relax::new();
    assert!(relax.solve(&mut system));

    let v1 = system.point(a2) - system.point(a1);
    let v2 = system.point(b2) - system.point(b1);
    let angle = crate::geometry::normalize_angle(v2.y.atan2(v2.x) - v1.y.atan2(v1.x));
    assert!((angle - FRAC_PI_2).abs() < 0.01, "angle = {angle}");
}

#[test]
fn test_orientation_rotates_about_midpoints() {
    let mut system = System::new();
    let a1 = system.add_point(0.0, 0.0);
    let a2 = system.add_point(10.0, 0.0);
    let b1 = system.add_point(20.0, 0.0);
    let b2 = system.add_point(30.0, 0.0);
    system
        .add_constraint(Constraint::Orientation {
            l1: [a1, a2],
            l2: [b1, b2],
            theta: FRAC_PI_2,
        })
        .unwrap();

    let relax = Relax::new();
    relax.solve(&mut system);

    // Each segment spun in place: midpoints stay put.
    let m1 = (system.point(a1).coords + system.point(a2).coords) * 0.5;
    let m2 = (system.point(b1).coords + system.point(b2).coords) * 0.5;
    assert!((m1 - nalgebra::Vector2::new(5.0, 0.0)).norm() < 0.01);
    assert!((m2 - nalgebra::Vector2::new(25.0, 0.0)).norm() < 0.01);
}

#[test]
fn test_property_picker_meets_in_middle() {
    let mut system = System::new();
    let p = system.add_point(0.0, 2.0);
    let v = system.add_var(10.0);
    system
        .add_constraint(Constraint::PropertyPicker {
            point: p,
            axis: Axis::X,
            var: v,
        })
        .unwrap();

    let relax = Relax::new();
    assert!(relax.solve(&mut system));

    assert!((system.point(p).x - system.var_value(v)).abs() < 0.01);
    assert!((system.point(p).x - 5.0).abs() < 0.01);
    // The other axis is untouched.
    assert_eq!(system.point(p).y, 2.0);
}

#[test]
fn test_property_picker_propagates_var_to_axis() {
    let mut system = System::new();
    let p = system.add_point(0.0, 2.0);
    let v = system.add_var(0.0);
    system
        .add_constraint(Constraint::FixedVar { var: v, wanted: 42.0 })
        .unwrap();
    system
        .add_constraint(Constraint::PropertyPicker {
            point: p,
            axis: Axis::Y,
            var: v,
        })
        .unwrap();

    let relax = Relax::new();
    relax.run_one_iteration(&mut system);

    assert_eq!(system.point(p).y, 42.0);
}

#[test]
fn test_clock_advances_time_each_tick() {
    let mut system = System::new();
    let center = system.add_point(0.0, 0.0);
    let hand = system.add_point(5.0, 0.0);
    let now = system.add_var(0.0);
    system
        .add_constraint(Constraint::Clock {
            center,
            hand,
            length: 5.0,
            speed: 0.1,
            now,
        })
        .unwrap();

    let relax = Relax::new();
    // A clock never rests: every tick reports change.
    assert!(relax.run_one_iteration(&mut system));
    assert!(relax.run_one_iteration(&mut system));
    assert!((system.var_value(now) - 0.2).abs() < 1e-12);
}

#[test]
fn test_clock_propagates_hand_position() {
    let mut system = System::new();
    let center = system.add_point(1.0, 2.0);
    let hand = system.add_point(0.0, 0.0);
    let now = system.add_var(0.0);
    system
        .add_constraint(Constraint::FixedPoint {
            point: center,
            wanted: Point2::new(1.0, 2.0),
        })
        .unwrap();
    system
        .add_constraint(Constraint::FixedVar {
            var: now,
            wanted: FRAC_PI_2,
        })
        .unwrap();
    system
        .add_constraint(Constraint::Clock {
            center,
            hand,
            length: 5.0,
            speed: 0.0,
            now,
        })
        .unwrap();

    let relax = Relax::new();
    relax.run_one_iteration(&mut system);

    // now and center known: the hand lands exactly at the polar offset.
    assert!(system.point(hand).approx_eq(&Point2::new(1.0, 7.0)));
}
