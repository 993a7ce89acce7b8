//! End-to-end repair planning.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use weldpath_math::{PartFrame, Point3, RemapError, Transform, Vec3};
use weldpath_program::{assemble, build_program, AssembledPath, AssemblyOptions, WeldCommand};
use weldpath_slicer::{
    build_n_layers, layer_thickness, slice::alignment, slice_part, CurveId, CurveTree, PointCloud,
    TriangleMesh,
};
use weldpath_strategy::{
    plan_layers, CancelToken, ContourFailure, ContourOutcome, LayerPlan, PlanContext,
};

use crate::error::{PlanError, Result};
use crate::settings::PlannerSettings;

/// Result of planning one damage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairPlan {
    /// Per-layer strategy decisions, in the planning frame.
    pub layers: Vec<LayerPlan>,
    /// Weld path in the part frame.
    pub path: AssembledPath,
    /// Abstract robot program for `path`.
    pub program: Vec<WeldCommand>,
}

impl RepairPlan {
    /// Contours that could not be planned, with the reason.
    pub fn unprocessed(&self) -> impl Iterator<Item = (usize, usize, &ContourFailure)> + '_ {
        self.layers
            .iter()
            .flat_map(|l| l.outcomes.iter())
            .filter_map(|o| match o {
                ContourOutcome::Unprocessed {
                    layer,
                    contour,
                    failure,
                } => Some((*layer, *contour, failure)),
                ContourOutcome::Planned(_) => None,
            })
    }

    /// Number of planned contours.
    pub fn planned_contours(&self) -> usize {
        self.layers.iter().map(|l| l.planned().count()).sum()
    }
}

/// Maps planning-frame points back to the part frame.
struct Unmap<'a> {
    frame: &'a PartFrame,
    unalign: Option<Transform>,
}

impl Unmap<'_> {
    fn is_identity(&self) -> bool {
        self.frame.is_identity() && self.unalign.is_none()
    }

    fn apply(&self, p: &Point3) -> std::result::Result<Point3, RemapError> {
        let p = match &self.unalign {
            Some(t) => t.apply_point(p),
            None => *p,
        };
        self.frame.to_cartesian(&p)
    }
}

/// Plan a weld repair for a damage mesh.
///
/// The mesh is expressed in the part frame. `deletions` name contours (by
/// layer and index after slicing) the operator excluded; each takes its
/// ancestors with it. Contours that cannot be planned are reported in
/// [`RepairPlan::unprocessed`] rather than failing the run.
pub fn plan_repair(
    mesh: &TriangleMesh,
    settings: &PlannerSettings,
    deletions: &[CurveId],
    cancel: Option<&CancelToken>,
) -> Result<RepairPlan> {
    settings.validate()?;
    let frame = settings.part.frame()?;

    let mut layers = slice_part(mesh, &frame, &settings.bead, &settings.slice)?;
    if !deletions.is_empty() {
        let mut tree = CurveTree::build(&layers);
        let mut removed = 0;
        for id in deletions {
            removed += tree.remove_cascade(*id)?;
        }
        layers = tree.compact(&layers);
        info!(requested = deletions.len(), removed, "removed curves");
    }

    let mut ctx = PlanContext::new(settings.bead, settings.policy);
    if let Some(token) = cancel {
        ctx = ctx.with_cancel(token.clone());
    }
    let plans = plan_layers(&layers, &ctx)?;

    let mut path = assemble(
        &plans,
        AssemblyOptions {
            bead: &settings.bead,
            motion: Some(&settings.motion),
        },
    )?;

    let axis = settings.slice.axis_dir();
    let unalign = if (axis.into_inner() - Vec3::z()).norm() < 1e-12 {
        None
    } else {
        Some(
            alignment(&axis)
                .inverse()
                .ok_or_else(|| PlanError::InvalidSettings("slicing axis not invertible".into()))?,
        )
    };
    let unmap = Unmap {
        frame: &frame,
        unalign,
    };
    if !unmap.is_identity() {
        let mut failure = None;
        path.map_positions(|p| match unmap.apply(p) {
            Ok(q) => q,
            Err(e) => {
                failure.get_or_insert(e);
                *p
            }
        });
        if let Some(e) = failure {
            return Err(e.into());
        }
    }

    let program = build_program(&path, settings.motion.curve_speed_factor);
    let plan = RepairPlan {
        layers: plans,
        path,
        program,
    };
    let skipped = plan.unprocessed().count();
    if skipped > 0 {
        warn!(skipped, "some contours were not planned");
    }
    info!(
        layers = plan.layers.len(),
        contours = plan.planned_contours(),
        points = plan.path.len(),
        commands = plan.program.len(),
        "repair planned"
    );
    Ok(plan)
}

/// Offset surface layers above a damage mesh.
///
/// Each layer is displaced one bead layer thickness from the one below it,
/// so `n` layers span the same heights the slicer would cut.
pub fn build_surface_layers(
    mesh: &TriangleMesh,
    settings: &PlannerSettings,
    n: usize,
) -> Result<Vec<PointCloud>> {
    settings.validate()?;
    mesh.validate()?;
    let bead = &settings.bead;
    let height = layer_thickness(bead.height, bead.width, bead.step_over);
    let cloud = PointCloud::from_mesh(mesh);
    let layers = build_n_layers(&cloud, height, n, &settings.surface)?;
    info!(
        layers = layers.len(),
        points = layers.iter().map(PointCloud::len).sum::<usize>(),
        "surface layers built"
    );
    Ok(layers)
}
