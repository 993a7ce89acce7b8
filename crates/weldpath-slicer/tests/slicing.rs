use weldpath_math::{Descriptor, PartFrame, PartKind, Point2, Point3};
use weldpath_slicer::{
    slice, slice_part, BeadSettings, CurveId, CurveTree, Polygon, SliceSettings, TriangleMesh,
};

/// Vertical walls extruded from closed rings between `z0` and `z1`.
fn extrude(rings: &[Vec<Point2>], z0: f64, z1: f64) -> TriangleMesh {
    let mut points = Vec::new();
    let mut triangles = Vec::new();
    for ring in rings {
        let base = points.len() as u32;
        let n = ring.len() as u32;
        for p in ring {
            points.push(Point3::new(p.x, p.y, z0));
            points.push(Point3::new(p.x, p.y, z1));
        }
        for i in 0..n {
            let j = (i + 1) % n;
            let (a0, a1) = (base + 2 * i, base + 2 * i + 1);
            let (b0, b1) = (base + 2 * j, base + 2 * j + 1);
            triangles.push([a0, b0, b1]);
            triangles.push([a0, b1, a1]);
        }
    }
    TriangleMesh::from_parts(&points, &triangles)
}

fn square_ring(min: f64, max: f64) -> Vec<Point2> {
    Polygon::rectangle(Point2::new(min, min), Point2::new(max, max)).points
}

#[test]
fn annulus_gives_exterior_and_interior_contours() {
    let mesh = extrude(&[square_ring(0.0, 40.0), square_ring(12.0, 28.0)], 0.0, 5.0);
    let layers = slice(&mesh, &BeadSettings::default(), &SliceSettings::default()).unwrap();

    let mid = &layers[layers.len() / 2];
    assert_eq!(mid.contours.len(), 2);
    let outer = &mid.contours[0];
    let inner = &mid.contours[1];
    assert!(!outer.is_hole);
    assert!(inner.is_hole);
    assert_eq!(inner.parent, Some(0));
    assert!((outer.area() - 1600.0).abs() < 5.0);
    assert!((inner.area() - 256.0).abs() < 5.0);
}

#[test]
fn narrow_slot_is_filtered() {
    // 40 x 3 slot cannot hold a 5mm bead.
    let slot = Polygon::rectangle(Point2::origin(), Point2::new(40.0, 3.0)).points;
    let mesh = extrude(&[slot], 0.0, 5.0);
    let layers = slice(&mesh, &BeadSettings::default(), &SliceSettings::default()).unwrap();
    assert!(layers.iter().all(|l| l.is_empty()));
}

#[test]
fn tapered_pit_hierarchy() {
    // Two pits merging into one wide opening near the top.
    let mut mesh = extrude(
        &[
            Polygon::rectangle(Point2::new(0.0, 0.0), Point2::new(14.0, 14.0)).points,
            Polygon::rectangle(Point2::new(20.0, 0.0), Point2::new(34.0, 14.0)).points,
        ],
        0.0,
        2.0,
    );
    let top = extrude(
        &[Polygon::rectangle(Point2::new(-2.0, -2.0), Point2::new(36.0, 16.0)).points],
        2.0,
        4.0,
    );
    let offset = mesh.num_vertices() as u32;
    mesh.vertices.extend_from_slice(&top.vertices);
    mesh.indices.extend(top.indices.iter().map(|i| i + offset));

    let settings = SliceSettings {
        extra_top_layer: false,
        ..Default::default()
    };
    let layers = slice(&mesh, &BeadSettings::default(), &settings).unwrap();
    let tree = CurveTree::build(&layers);

    let split = layers
        .iter()
        .rposition(|l| l.contours.len() == 2)
        .expect("a layer cutting both pits below the merge");
    let above = split + 1;
    assert_eq!(layers[above].contours.len(), 1);
    assert_eq!(
        tree.parent(CurveId::new(split, 0)),
        Some(CurveId::new(above, 0))
    );
    assert!(tree.relevant_curves().contains(&CurveId::new(above, 0)));
}

#[test]
fn cylinder_frame_unrolls_before_slicing() {
    let frame = PartFrame::new(
        PartKind::Cylinder,
        Descriptor {
            base_radius: 50.0,
            half_angle_deg: 0.0,
        },
    )
    .unwrap();
    // A box sitting on the unrolled surface maps out to the cylinder and back.
    let flat = extrude(&[square_ring(0.0, 20.0)], 50.0, 54.0);
    let curved = flat.try_map_points(|p| frame.to_cartesian(p)).unwrap();
    let layers = slice_part(&curved, &frame, &BeadSettings::default(), &SliceSettings::default())
        .unwrap();
    let mid = &layers[layers.len() / 2];
    assert_eq!(mid.contours.len(), 1);
    assert!((mid.contours[0].area() - 400.0).abs() < 5.0);
}
