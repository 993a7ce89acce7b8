//! Strategy evaluation and per-layer planning.
//!
//! Each contour gets a raster angle sweep, then all five strategies at the
//! winning angle. The best score wins. Poorly covered contours are split once
//! and re-evaluated piecewise; the split is kept only if it helps.
//!
//! Contours that repeat across layers (centroid inside an earlier footprint,
//! same role) are claimed once in an [`ExclusionSet`]. Later copies reuse the owner's decision on
//! their own geometry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use geo::{Contains, MultiPolygon, Point as GeoPoint};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use weldpath_math::{Point2, Point3};
use weldpath_slicer::{BeadSettings, Contour, Layer, Polygon};

use crate::error::{Result, StrategyError};
use crate::fill::{generate, FillInput, FillPath, HeightField, StrategyKind, WeldLine};
use crate::metrics::{self, StrategyMetrics};
use crate::partition::partition;
use crate::raster::{self, RasterStitch};
use crate::settings::SelectionPolicy;

/// Relative slack allowed between a polygon and the sum of its pieces.
const PARTITION_AREA_SLACK: f64 = 1e-3;

/// Outcome of running one strategy during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    /// Strategy.
    pub kind: StrategyKind,
    /// Raster angle in degrees.
    pub angle: f64,
    /// Metrics when the strategy produced a path.
    pub metrics: Option<StrategyMetrics>,
    /// Failure message otherwise.
    pub error: Option<String>,
}

/// The winning strategy for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Strategy.
    pub kind: StrategyKind,
    /// Raster angle in degrees.
    pub angle: f64,
    /// Its metrics.
    pub metrics: StrategyMetrics,
    /// Its path.
    pub path: FillPath,
}

/// A (sub-)polygon and the strategy chosen for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionPlan {
    /// Region footprint.
    pub polygon: Polygon,
    /// Chosen strategy.
    pub selection: Selection,
}

/// Record of a partition pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartitionAttempt {
    /// Pieces produced by the split.
    pub pieces: usize,
    /// Best coverage before splitting.
    pub unsplit_coverage: f64,
    /// Mean best coverage across the pieces.
    pub mean_piece_coverage: f64,
    /// Whether the split replaced the unsplit plan.
    pub accepted: bool,
}

/// Result of selecting strategies for one polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSelection {
    /// One region, or several after an accepted partition.
    pub regions: Vec<RegionPlan>,
    /// Records of the final evaluation.
    pub records: Vec<StrategyRecord>,
    /// Partition pass, if one ran.
    pub partition: Option<PartitionAttempt>,
}

impl RegionSelection {
    /// Area-weighted coverage across the regions.
    pub fn coverage(&self) -> f64 {
        area_weighted_coverage(&self.regions)
    }
}

fn area_weighted_coverage(regions: &[RegionPlan]) -> f64 {
    let total: f64 = regions.iter().map(|r| r.polygon.area()).sum();
    if total <= 0.0 {
        return 0.0;
    }
    regions
        .iter()
        .map(|r| r.polygon.area() * r.selection.metrics.area_covered_pct)
        .sum::<f64>()
        / total
}

/// Planned contour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourPlan {
    /// Layer index.
    pub layer: usize,
    /// Contour index within the layer.
    pub contour: usize,
    /// Interior ring of a section with holes.
    pub is_hole: bool,
    /// Regions in weld order.
    pub regions: Vec<RegionPlan>,
    /// Strategy records of the final evaluation.
    pub records: Vec<StrategyRecord>,
    /// Partition pass, if one ran.
    pub partition: Option<PartitionAttempt>,
    /// Decision taken from a matching contour on another layer.
    pub reused: bool,
}

impl ContourPlan {
    /// Weld lines of every region in order.
    pub fn lines(&self) -> impl Iterator<Item = &WeldLine> + '_ {
        self.regions
            .iter()
            .flat_map(|r| r.selection.path.lines.iter())
    }

    /// Area-weighted coverage across the regions.
    pub fn coverage(&self) -> f64 {
        area_weighted_coverage(&self.regions)
    }
}

/// Why a contour was left unplanned.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContourFailure {
    /// Too few points or no area.
    #[error("degenerate contour: {0}")]
    Degenerate(String),
    /// Every strategy failed.
    #[error("no strategy found")]
    NoStrategy,
}

/// Per-contour result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContourOutcome {
    /// Contour planned.
    Planned(ContourPlan),
    /// Contour skipped.
    Unprocessed {
        /// Layer index.
        layer: usize,
        /// Contour index within the layer.
        contour: usize,
        /// Reason.
        failure: ContourFailure,
    },
}

impl ContourOutcome {
    /// The plan, if the contour was planned.
    pub fn plan(&self) -> Option<&ContourPlan> {
        match self {
            ContourOutcome::Planned(plan) => Some(plan),
            ContourOutcome::Unprocessed { .. } => None,
        }
    }
}

/// Outcomes of one layer in contour order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerPlan {
    /// Layer index.
    pub index: usize,
    /// Cutting height.
    pub z: f64,
    /// One outcome per contour.
    pub outcomes: Vec<ContourOutcome>,
}

impl LayerPlan {
    /// True when the layer had no contours.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Planned contours in order.
    pub fn planned(&self) -> impl Iterator<Item = &ContourPlan> + '_ {
        self.outcomes.iter().filter_map(ContourOutcome::plan)
    }
}

/// A contour already claimed by an earlier layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    /// Footprint centroid.
    pub centroid: Point2,
    /// Planar footprint.
    pub footprint: Polygon,
    /// Owning layer.
    pub layer: usize,
    /// Owning contour.
    pub contour: usize,
    /// Role of the owner.
    pub is_hole: bool,
}

impl Claim {
    /// Claim on `footprint` for contour `contour` of layer `layer`.
    pub fn new(footprint: Polygon, layer: usize, contour: usize, is_hole: bool) -> Self {
        Self {
            centroid: footprint.centroid(),
            footprint,
            layer,
            contour,
            is_hole,
        }
    }
}

#[derive(Debug)]
struct HeldClaim {
    claim: Claim,
    zone: MultiPolygon<f64>,
}

/// Footprints of contours that have been planned.
#[derive(Debug, Default)]
pub struct ExclusionSet {
    claims: Mutex<Vec<HeldClaim>>,
}

impl ExclusionSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `candidate` unless a matching claim exists.
    ///
    /// A claim matches when it is on another layer, has the same role and its
    /// footprint grown by `radius` contains the candidate's centroid. Returns
    /// the matching claim, or `None` after inserting `candidate`. Check and
    /// insert happen under one lock.
    pub fn claim(&self, candidate: Claim, radius: f64) -> Option<Claim> {
        let centroid = GeoPoint::new(candidate.centroid.x, candidate.centroid.y);
        let zone = MultiPolygon::new(
            candidate
                .footprint
                .offset(-radius)
                .iter()
                .map(Polygon::to_geo)
                .collect(),
        );
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        let existing = claims.iter().find(|held| {
            held.claim.layer != candidate.layer
                && held.claim.is_hole == candidate.is_hole
                && held.zone.contains(&centroid)
        });
        match existing {
            Some(owner) => Some(owner.claim.clone()),
            None => {
                claims.push(HeldClaim {
                    claim: candidate,
                    zone,
                });
                None
            }
        }
    }

    /// Number of claims.
    pub fn len(&self) -> usize {
        self.claims.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True when nothing has been claimed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared cancellation flag, checked between contours.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// True once cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything threaded through one planning run.
#[derive(Debug)]
pub struct PlanContext {
    /// Bead geometry.
    pub bead: BeadSettings,
    /// Selection policy.
    pub policy: SelectionPolicy,
    /// Contours claimed so far.
    pub exclusions: ExclusionSet,
    /// Cancellation flag.
    pub cancel: CancelToken,
}

impl PlanContext {
    /// Context with an empty exclusion set and a fresh token.
    pub fn new(bead: BeadSettings, policy: SelectionPolicy) -> Self {
        Self {
            bead,
            policy,
            exclusions: ExclusionSet::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Raster angle whose discrete fill covers the most, fewest beads on ties.
///
/// Returns `None` when no sweep angle yields a raster.
pub fn best_angle(input: &FillInput<'_>) -> Option<(f64, StrategyMetrics)> {
    let angles = input.policy.sweep_angles();
    let sweep: Vec<Option<(f64, StrategyMetrics)>> = angles
        .par_iter()
        .map(|&angle| {
            let path = raster::generate(input, angle, RasterStitch::Discrete).ok()?;
            Some((angle, metrics::evaluate(input.polygon, &path, input.bead, input.policy)))
        })
        .collect();

    sweep.into_iter().flatten().fold(None, |best, (angle, m)| match best {
        Some((_, b)) if !better_sweep(&m, &b) => best,
        _ => Some((angle, m)),
    })
}

fn better_sweep(candidate: &StrategyMetrics, best: &StrategyMetrics) -> bool {
    if (candidate.area_covered_pct - best.area_covered_pct).abs() > 1e-9 {
        return candidate.area_covered_pct > best.area_covered_pct;
    }
    candidate.elements < best.elements
}

/// Run all five strategies at the best raster angle.
///
/// Returns the winner (highest score, declaration order on ties) and one
/// record per strategy.
pub fn evaluate_region(
    input: &FillInput<'_>,
    entry: Option<&Point3>,
) -> (Option<Selection>, Vec<StrategyRecord>) {
    let angle = best_angle(input).map_or(0.0, |(a, _)| a);
    let mut best: Option<Selection> = None;
    let mut records = Vec::with_capacity(StrategyKind::ALL.len());

    for kind in StrategyKind::ALL {
        match generate(kind, input, angle, entry) {
            Ok(path) => {
                let m = metrics::evaluate(input.polygon, &path, input.bead, input.policy);
                debug!(%kind, angle, coverage = m.area_covered_pct, score = m.score, "strategy");
                records.push(StrategyRecord {
                    kind,
                    angle,
                    metrics: Some(m),
                    error: None,
                });
                if best.as_ref().map_or(true, |b| m.score > b.metrics.score) {
                    best = Some(Selection {
                        kind,
                        angle,
                        metrics: m,
                        path,
                    });
                }
            }
            Err(e) => {
                debug!(%kind, error = %e, "strategy failed");
                records.push(StrategyRecord {
                    kind,
                    angle,
                    metrics: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }
    (best, records)
}

/// Choose strategies for `polygon`, partitioning when coverage is poor.
pub fn select_strategy(
    polygon: &Polygon,
    heights: &HeightField,
    bead: &BeadSettings,
    policy: &SelectionPolicy,
) -> std::result::Result<RegionSelection, ContourFailure> {
    select_at_depth(polygon, heights, bead, policy, 0)
}

fn select_at_depth(
    polygon: &Polygon,
    heights: &HeightField,
    bead: &BeadSettings,
    policy: &SelectionPolicy,
    depth: usize,
) -> std::result::Result<RegionSelection, ContourFailure> {
    let input = FillInput {
        polygon,
        heights,
        bead,
        policy,
    };
    let (best, records) = evaluate_region(&input, None);
    let best = best.ok_or(ContourFailure::NoStrategy)?;
    let unsplit_coverage = best.metrics.area_covered_pct;
    let unsplit = RegionSelection {
        regions: vec![RegionPlan {
            polygon: polygon.clone(),
            selection: best,
        }],
        records,
        partition: None,
    };

    if unsplit_coverage >= policy.min_area_covered || depth >= policy.max_partition_depth {
        return Ok(unsplit);
    }

    let pieces = partition(polygon, policy.partition_cuts);
    let piece_area: f64 = pieces.iter().map(Polygon::area).sum();
    let area_ok = (piece_area - polygon.area()).abs() <= PARTITION_AREA_SLACK * polygon.area();
    let evaluated: Vec<std::result::Result<RegionSelection, ContourFailure>> = pieces
        .iter()
        .map(|piece| select_at_depth(piece, heights, bead, policy, depth + 1))
        .collect();
    let all_ok = evaluated.iter().all(|r| r.is_ok());
    let selections: Vec<RegionSelection> = evaluated.into_iter().filter_map(|r| r.ok()).collect();
    let mean_piece_coverage = if selections.is_empty() {
        0.0
    } else {
        selections.iter().map(RegionSelection::coverage).sum::<f64>() / selections.len() as f64
    };

    let accepted = pieces.len() >= 2 && area_ok && all_ok && mean_piece_coverage > unsplit_coverage;
    let attempt = PartitionAttempt {
        pieces: pieces.len(),
        unsplit_coverage,
        mean_piece_coverage,
        accepted,
    };

    if !accepted {
        warn!(
            pieces = pieces.len(),
            unsplit_coverage, mean_piece_coverage, "partition did not improve coverage"
        );
        return Ok(RegionSelection {
            partition: Some(attempt),
            ..unsplit
        });
    }

    debug!(pieces = pieces.len(), mean_piece_coverage, "partition accepted");
    let mut regions = Vec::new();
    let mut records = Vec::new();
    for selection in selections {
        regions.extend(selection.regions);
        records.extend(selection.records);
    }
    Ok(RegionSelection {
        regions,
        records,
        partition: Some(attempt),
    })
}

/// Planar footprint and height field of a contour.
pub fn contour_region(contour: &Contour) -> Result<(Polygon, HeightField)> {
    let polygon = contour.polygon().to_ccw();
    if polygon.len() < 3 {
        return Err(StrategyError::GeometryDegenerate(format!(
            "{} points",
            polygon.len()
        )));
    }
    if polygon.area() < 1e-9 {
        return Err(StrategyError::GeometryDegenerate("zero area".into()));
    }
    Ok((polygon, HeightField::new(&contour.points)))
}

fn tag_regions(regions: &mut [RegionPlan]) {
    for (i, region) in regions.iter_mut().enumerate() {
        region.selection.path.set_region(i);
    }
}

fn unprocessed(layer: usize, contour: usize, failure: ContourFailure) -> ContourOutcome {
    warn!(layer, contour, %failure, "contour left unprocessed");
    ContourOutcome::Unprocessed {
        layer,
        contour,
        failure,
    }
}

/// Plan one contour from scratch.
pub fn plan_contour(layer: &Layer, index: usize, ctx: &PlanContext) -> Result<ContourOutcome> {
    if ctx.cancel.is_cancelled() {
        return Err(StrategyError::Cancelled);
    }
    let contour = &layer.contours[index];
    let (polygon, heights) = match contour_region(contour) {
        Ok(region) => region,
        Err(e) => {
            return Ok(unprocessed(
                layer.index,
                index,
                ContourFailure::Degenerate(e.to_string()),
            ))
        }
    };

    match select_strategy(&polygon, &heights, &ctx.bead, &ctx.policy) {
        Ok(mut selection) => {
            tag_regions(&mut selection.regions);
            debug!(
                layer = layer.index,
                contour = index,
                regions = selection.regions.len(),
                coverage = selection.coverage(),
                "contour planned"
            );
            Ok(ContourOutcome::Planned(ContourPlan {
                layer: layer.index,
                contour: index,
                is_hole: contour.is_hole,
                regions: selection.regions,
                records: selection.records,
                partition: selection.partition,
                reused: false,
            }))
        }
        Err(failure) => Ok(unprocessed(layer.index, index, failure)),
    }
}

/// Apply the owner's single-region decision to a repeated contour.
fn reuse_decision(
    owner: &ContourOutcome,
    layer: &Layer,
    index: usize,
    ctx: &PlanContext,
) -> Option<ContourPlan> {
    let plan = owner.plan()?;
    let [region] = plan.regions.as_slice() else {
        return None;
    };
    let (kind, angle) = (region.selection.kind, region.selection.angle);
    let contour = &layer.contours[index];
    let (polygon, heights) = contour_region(contour).ok()?;
    let input = FillInput {
        polygon: &polygon,
        heights: &heights,
        bead: &ctx.bead,
        policy: &ctx.policy,
    };
    let path = generate(kind, &input, angle, None).ok()?;
    let m = metrics::evaluate(&polygon, &path, &ctx.bead, &ctx.policy);
    Some(ContourPlan {
        layer: layer.index,
        contour: index,
        is_hole: contour.is_hole,
        regions: vec![RegionPlan {
            polygon,
            selection: Selection {
                kind,
                angle,
                metrics: m,
                path,
            },
        }],
        records: vec![StrategyRecord {
            kind,
            angle,
            metrics: Some(m),
            error: None,
        }],
        partition: None,
        reused: true,
    })
}

#[derive(Debug, Clone, Copy)]
struct Job {
    layer: usize,
    contour: usize,
    owner: Option<(usize, usize)>,
}

fn run_jobs<F>(jobs: &[Job], parallel: bool, f: F) -> Result<Vec<((usize, usize), ContourOutcome)>>
where
    F: Fn(&Job) -> Result<ContourOutcome> + Sync + Send,
{
    let run = |job: &Job| f(job).map(|o| ((job.layer, job.contour), o));
    if parallel {
        jobs.par_iter().map(run).collect()
    } else {
        jobs.iter().map(run).collect()
    }
}

/// Plan every contour of every layer.
///
/// Layers are indexed by position in `layers`. Claims are made in layer and
/// contour order, so the result does not depend on thread scheduling.
pub fn plan_layers(layers: &[Layer], ctx: &PlanContext) -> Result<Vec<LayerPlan>> {
    ctx.bead.validate()?;
    ctx.policy.validate()?;

    let mut jobs = Vec::new();
    for (li, layer) in layers.iter().enumerate() {
        for (ci, contour) in layer.contours.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                return Err(StrategyError::Cancelled);
            }
            let owner = if contour.len() >= 3 {
                ctx.exclusions
                    .claim(
                        Claim::new(contour.polygon(), li, ci, contour.is_hole),
                        ctx.policy.dedup_radius,
                    )
                    .map(|c| (c.layer, c.contour))
            } else {
                None
            };
            jobs.push(Job {
                layer: li,
                contour: ci,
                owner,
            });
        }
    }

    let (primary, repeated): (Vec<Job>, Vec<Job>) = jobs.into_iter().partition(|j| j.owner.is_none());
    info!(
        layers = layers.len(),
        contours = primary.len(),
        repeated = repeated.len(),
        "planning layers"
    );

    let mut outcomes: BTreeMap<(usize, usize), ContourOutcome> = run_jobs(&primary, ctx.policy.parallel, |job| {
        plan_contour(&layers[job.layer], job.contour, ctx)
    })?
    .into_iter()
    .collect();

    let reused = run_jobs(&repeated, ctx.policy.parallel, |job| {
        if ctx.cancel.is_cancelled() {
            return Err(StrategyError::Cancelled);
        }
        let layer = &layers[job.layer];
        let owner = job.owner.and_then(|key| outcomes.get(&key));
        match owner.and_then(|o| reuse_decision(o, layer, job.contour, ctx)) {
            Some(plan) => Ok(ContourOutcome::Planned(plan)),
            None => plan_contour(layer, job.contour, ctx),
        }
    })?;
    outcomes.extend(reused);

    let mut plans: Vec<LayerPlan> = layers
        .iter()
        .enumerate()
        .map(|(li, layer)| LayerPlan {
            index: layer.index,
            z: layer.z,
            outcomes: (0..layer.contours.len())
                .filter_map(|ci| outcomes.remove(&(li, ci)))
                .collect(),
        })
        .collect();

    chain_entries(&mut plans, layers, ctx);

    let planned: usize = plans.iter().map(|p| p.planned().count()).sum();
    info!(planned, "layers planned");
    Ok(plans)
}

/// Regenerate contour-offset paths with the previous path end as entry so
/// seams do not land on the point just welded.
fn chain_entries(plans: &mut [LayerPlan], layers: &[Layer], ctx: &PlanContext) {
    let mut entry: Option<Point3> = None;
    for (plan, layer) in plans.iter_mut().zip(layers) {
        for outcome in &mut plan.outcomes {
            let ContourOutcome::Planned(contour_plan) = outcome else {
                continue;
            };
            let heights = HeightField::new(&layer.contours[contour_plan.contour].points);
            for (i, region) in contour_plan.regions.iter_mut().enumerate() {
                let selection = &mut region.selection;
                if let (false, Some(prev)) = (selection.kind.is_raster(), entry.as_ref()) {
                    let input = FillInput {
                        polygon: &region.polygon,
                        heights: &heights,
                        bead: &ctx.bead,
                        policy: &ctx.policy,
                    };
                    if let Ok(mut path) = generate(selection.kind, &input, selection.angle, Some(prev)) {
                        path.set_region(i);
                        selection.metrics =
                            metrics::evaluate(&region.polygon, &path, &ctx.bead, &ctx.policy);
                        selection.path = path;
                    }
                }
                if let Some(end) = selection.path.end_point() {
                    entry = Some(end);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Polygon {
        Polygon::rectangle(Point2::origin(), Point2::new(size, size))
    }

    fn square_layer(index: usize, offset: f64) -> Layer {
        let mut layer = Layer::new(index as f64 * 2.0, index);
        let poly = Polygon::rectangle(
            Point2::new(offset, offset),
            Point2::new(offset + 20.0, offset + 20.0),
        );
        layer.contours.push(Contour::from_polygon(&poly, layer.z));
        layer
    }

    #[test]
    fn test_best_angle_square() {
        let sq = square(20.0);
        let heights = HeightField::flat(0.0);
        let bead = BeadSettings::default();
        let policy = SelectionPolicy::default();
        let input = FillInput {
            polygon: &sq,
            heights: &heights,
            bead: &bead,
            policy: &policy,
        };
        let (angle, m) = best_angle(&input).unwrap();
        assert!(angle == 0.0 || angle == 90.0);
        assert!(m.area_covered_pct > 90.0);
    }

    #[test]
    fn test_evaluate_region_records_all_kinds() {
        let sq = square(20.0);
        let heights = HeightField::flat(0.0);
        let bead = BeadSettings::default();
        let policy = SelectionPolicy::default();
        let input = FillInput {
            polygon: &sq,
            heights: &heights,
            bead: &bead,
            policy: &policy,
        };
        let (best, records) = evaluate_region(&input, None);
        assert_eq!(records.len(), 5);
        let best = best.unwrap();
        let top = records
            .iter()
            .filter_map(|r| r.metrics.map(|m| m.score))
            .fold(f64::MIN, f64::max);
        assert_eq!(best.metrics.score, top);
    }

    #[test]
    fn test_no_strategy_for_tiny_square() {
        let tiny = square(2.0);
        let heights = HeightField::flat(0.0);
        let result = select_strategy(
            &tiny,
            &heights,
            &BeadSettings::default(),
            &SelectionPolicy::default(),
        );
        assert_eq!(result.unwrap_err(), ContourFailure::NoStrategy);
    }

    #[test]
    fn test_exclusion_claim() {
        let set = ExclusionSet::new();
        let claim = |layer, x| {
            Claim::new(
                Polygon::rectangle(Point2::new(x, 0.0), Point2::new(x + 4.0, 4.0)),
                layer,
                0,
                false,
            )
        };
        assert!(set.claim(claim(0, 0.0), 3.0).is_none());
        // Same layer never matches.
        assert!(set.claim(claim(0, 1.0), 3.0).is_none());
        assert_eq!(set.claim(claim(1, 2.0), 3.0).map(|c| c.layer), Some(0));
        assert!(set.claim(claim(1, 20.0), 3.0).is_none());
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_claim_matches_inside_large_footprint() {
        let set = ExclusionSet::new();
        let plate = Polygon::rectangle(Point2::origin(), Point2::new(100.0, 20.0));
        assert!(set.claim(Claim::new(plate, 0, 0, false), 3.0).is_none());

        // Far from the plate's centroid but on the plate.
        let patch = Polygon::rectangle(Point2::new(80.0, 5.0), Point2::new(90.0, 15.0));
        let owner = set.claim(Claim::new(patch, 1, 0, false), 3.0);
        assert_eq!(owner.map(|c| (c.layer, c.contour)), Some((0, 0)));

        // Within the grown margin of the plate.
        let edge = Polygon::rectangle(Point2::new(101.0, 5.0), Point2::new(103.0, 15.0));
        assert!(set.claim(Claim::new(edge, 2, 0, false), 3.0).is_some());

        let beyond = Polygon::rectangle(Point2::new(110.0, 5.0), Point2::new(120.0, 15.0));
        assert!(set.claim(Claim::new(beyond, 2, 1, false), 3.0).is_none());
    }

    #[test]
    fn test_hole_does_not_match_outer() {
        let set = ExclusionSet::new();
        set.claim(Claim::new(square(10.0), 0, 0, false), 3.0);
        assert!(set.claim(Claim::new(square(10.0), 1, 0, true), 3.0).is_none());
    }

    #[test]
    fn test_repeated_contour_reuses_decision() {
        let layers = vec![square_layer(0, 0.0), square_layer(1, 0.5)];
        let ctx = PlanContext::new(BeadSettings::default(), SelectionPolicy::default());
        let plans = plan_layers(&layers, &ctx).unwrap();
        let first = plans[0].planned().next().unwrap();
        let second = plans[1].planned().next().unwrap();
        assert!(!first.reused);
        assert!(second.reused);
        assert_eq!(second.records.len(), 1);
        assert_eq!(first.regions[0].selection.kind, second.regions[0].selection.kind);
    }

    #[test]
    fn test_cancelled_run() {
        let layers = vec![square_layer(0, 0.0)];
        let ctx = PlanContext::new(BeadSettings::default(), SelectionPolicy::default());
        ctx.cancel.cancel();
        assert!(matches!(plan_layers(&layers, &ctx), Err(StrategyError::Cancelled)));
    }

    #[test]
    fn test_degenerate_contour_is_reported() {
        let mut layer = Layer::new(0.0, 0);
        layer.contours.push(Contour {
            points: vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            is_hole: false,
            parent: None,
        });
        let ctx = PlanContext::new(BeadSettings::default(), SelectionPolicy::default());
        let plans = plan_layers(&[layer], &ctx).unwrap();
        assert!(matches!(
            plans[0].outcomes[0],
            ContourOutcome::Unprocessed {
                failure: ContourFailure::Degenerate(_),
                ..
            }
        ));
    }

    #[test]
    fn test_empty_layer() {
        let ctx = PlanContext::new(BeadSettings::default(), SelectionPolicy::default());
        let plans = plan_layers(&[Layer::new(0.0, 0)], &ctx).unwrap();
        assert!(plans[0].is_empty());
    }
}
