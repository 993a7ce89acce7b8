use approx::assert_relative_eq;
use weldpath_math::Point2;
use weldpath_program::{
    assemble, build_program, AssemblyOptions, ElementKind, MotionPolicy, WeldCommand, WeldState,
};
use weldpath_slicer::{BeadSettings, Contour, Layer, Polygon};
use weldpath_strategy::{plan_layers, LayerPlan, PlanContext, SelectionPolicy};

fn two_islands() -> Vec<LayerPlan> {
    let mut layer = Layer::new(0.0, 0);
    layer.contours.push(Contour::from_polygon(
        &Polygon::rectangle(Point2::origin(), Point2::new(20.0, 20.0)),
        0.0,
    ));
    layer.contours.push(Contour::from_polygon(
        &Polygon::rectangle(Point2::new(60.0, 0.0), Point2::new(80.0, 20.0)),
        0.0,
    ));
    let ctx = PlanContext::new(BeadSettings::default(), SelectionPolicy::default());
    plan_layers(&[layer], &ctx).unwrap()
}

#[test]
fn distant_islands_are_joined_by_a_lifted_transit() {
    let plans = two_islands();
    let bead = BeadSettings::default();
    let path = assemble(
        &plans,
        AssemblyOptions {
            bead: &bead,
            motion: None,
        },
    )
    .unwrap();

    assert!(path.transits() >= 1);
    let lift = 5.0 * bead.height;
    for element in path.elements().filter(|e| e.kind == ElementKind::Transit) {
        assert_eq!(element.points.len(), 2);
        for p in &element.points {
            assert!(!p.weld_active);
            assert_eq!(p.state, WeldState::WeldOffTransit);
            assert_relative_eq!(p.position.z, lift, epsilon = 1e-9);
        }
    }
}

#[test]
fn assembled_path_has_no_repeated_points() {
    let plans = two_islands();
    let bead = BeadSettings::default();
    let motion = MotionPolicy::default();
    let path = assemble(
        &plans,
        AssemblyOptions {
            bead: &bead,
            motion: Some(&motion),
        },
    )
    .unwrap();

    let points: Vec<_> = path.points().map(|p| p.position).collect();
    assert!(points.len() > 2);
    for w in points.windows(2) {
        assert_ne!(w[0], w[1]);
    }
    assert_eq!(path.points().next().unwrap().state, WeldState::Start);
    assert_eq!(path.points().last().unwrap().state, WeldState::End);
}

#[test]
fn transit_adds_travel_length() {
    let plans = two_islands();
    let bead = BeadSettings::default();
    let path = assemble(
        &plans,
        AssemblyOptions {
            bead: &bead,
            motion: None,
        },
    )
    .unwrap();

    // The same beads joined end to start by straight moves.
    let welds: Vec<_> = path
        .elements()
        .filter(|e| e.kind != ElementKind::Transit)
        .flat_map(|e| e.points.iter().map(|p| p.position))
        .collect();
    let direct: f64 = welds.windows(2).map(|w| (w[1] - w[0]).norm()).sum();

    let lift = 5.0 * bead.height;
    assert!(path.transits() >= 1);
    assert!(
        path.length() > direct + lift,
        "{} vs {direct}",
        path.length()
    );
}

#[test]
fn program_balances_arc_commands() {
    let plans = two_islands();
    let bead = BeadSettings::default();
    let motion = MotionPolicy::default();
    let path = assemble(
        &plans,
        AssemblyOptions {
            bead: &bead,
            motion: Some(&motion),
        },
    )
    .unwrap();
    let program = build_program(&path, motion.curve_speed_factor);

    let on = program.iter().filter(|c| **c == WeldCommand::ArcOn).count();
    let off = program.iter().filter(|c| **c == WeldCommand::ArcOff).count();
    assert!(on >= 2);
    assert_eq!(on, off);
    assert_eq!(program.last(), Some(&WeldCommand::ArcOff));
}
