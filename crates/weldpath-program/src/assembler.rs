//! Stitching planned weld lines into one ordered path.
//!
//! Lines are visited layer by layer, contour by contour. When the tool would
//! have to travel more than `2.5 * step_over` to the next bead, the arc goes
//! off and two lifted transit points are inserted so the torch clears the
//! deposit. Consecutive duplicate points are removed from the final sequence.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use weldpath_math::{Point3, Vec3};
use weldpath_slicer::BeadSettings;
use weldpath_strategy::{LayerPlan, StrategyKind};

use crate::error::{ProgramError, Result};
use crate::motion::{classify, MotionKind, MotionPoint, MotionPolicy};

/// Gap (in step-overs) above which the tool lifts between beads.
pub const TRANSIT_GAP_FACTOR: f64 = 2.5;

/// Lift height (in bead heights) of transit moves.
pub const TRANSIT_LIFT_FACTOR: f64 = 5.0;

/// Weld state carried by every emitted point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeldState {
    /// First point of the whole path.
    Start,
    /// Depositing.
    WeldOn,
    /// Arc off, travelling to the next bead.
    WeldOffTransit,
    /// Last point of the whole path.
    End,
}

/// One emitted point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    /// Position in the planning frame.
    pub position: Point3,
    /// State machine position.
    pub state: WeldState,
    /// Arc on while moving to this point.
    pub weld_active: bool,
    /// Weld at reduced speed.
    pub is_curve_point: bool,
    /// A circular segment must end here.
    pub repeat_for_arc: bool,
}

/// What a path element does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// A bead laid by the given strategy.
    Weld(StrategyKind),
    /// A lifted move between beads.
    Transit,
}

/// A run of points sharing one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathElement {
    /// Bead or transit.
    pub kind: ElementKind,
    /// How the robot drives this element.
    pub motion: MotionKind,
    /// Points in order.
    pub points: Vec<PathPoint>,
}

/// Elements of one planned contour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathContour {
    /// Layer index.
    pub layer: usize,
    /// Contour index within the layer.
    pub contour: usize,
    /// Elements in weld order. A transit into this contour comes first.
    pub elements: Vec<PathElement>,
}

/// Contours of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathLayer {
    /// Layer index.
    pub index: usize,
    /// Cutting height.
    pub z: f64,
    /// Contours in weld order.
    pub contours: Vec<PathContour>,
}

/// The whole repair path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledPath {
    /// Layers bottom to top.
    pub layers: Vec<PathLayer>,
}

impl AssembledPath {
    /// Every element in order.
    pub fn elements(&self) -> impl Iterator<Item = &PathElement> + '_ {
        self.layers
            .iter()
            .flat_map(|l| l.contours.iter())
            .flat_map(|c| c.elements.iter())
    }

    /// Every point in order.
    pub fn points(&self) -> impl Iterator<Item = &PathPoint> + '_ {
        self.elements().flat_map(|e| e.points.iter())
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points().count()
    }

    /// True when nothing is welded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total travelled length, welding and transit.
    pub fn length(&self) -> f64 {
        let pts: Vec<&PathPoint> = self.points().collect();
        pts.windows(2)
            .map(|w| (w[1].position - w[0].position).norm())
            .sum()
    }

    /// Number of transit elements.
    pub fn transits(&self) -> usize {
        self.elements()
            .filter(|e| e.kind == ElementKind::Transit)
            .count()
    }

    /// Apply `f` to every position.
    pub fn map_positions<F>(&mut self, mut f: F)
    where
        F: FnMut(&Point3) -> Point3,
    {
        for layer in &mut self.layers {
            for contour in &mut layer.contours {
                for element in &mut contour.elements {
                    for point in &mut element.points {
                        point.position = f(&point.position);
                    }
                }
            }
        }
    }
}

/// Assembly options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblyOptions<'a> {
    /// Bead geometry (step-over for the gap test, height for the lift).
    pub bead: &'a BeadSettings,
    /// Point thinning; `None` keeps every generated point.
    pub motion: Option<&'a MotionPolicy>,
}

/// Builds the path while tracking the last emitted point.
struct Builder<'a> {
    options: AssemblyOptions<'a>,
    last: Option<Point3>,
}

impl Builder<'_> {
    fn transit_to(&self, start: &Point3) -> Option<PathElement> {
        let from = self.last?;
        let gap = (start - from).norm();
        if gap <= TRANSIT_GAP_FACTOR * self.options.bead.step_over {
            return None;
        }
        let lift = Vec3::new(0.0, 0.0, TRANSIT_LIFT_FACTOR * self.options.bead.height);
        let point = |position: Point3| PathPoint {
            position,
            state: WeldState::WeldOffTransit,
            weld_active: false,
            is_curve_point: false,
            repeat_for_arc: false,
        };
        Some(PathElement {
            kind: ElementKind::Transit,
            motion: MotionKind::Linear,
            points: vec![point(from + lift), point(start + lift)],
        })
    }

    fn weld(&mut self, kind: StrategyKind, points: &[Point3]) -> PathElement {
        let (motion, thinned) = match self.options.motion {
            Some(policy) => {
                let plan = classify(points, policy);
                (plan.kind, plan.points)
            }
            None => (
                MotionKind::Linear,
                points
                    .iter()
                    .map(|p| MotionPoint {
                        position: *p,
                        is_curve_point: false,
                        repeat_for_arc: false,
                    })
                    .collect(),
            ),
        };
        let mut out: Vec<PathPoint> = Vec::with_capacity(thinned.len());
        for p in thinned {
            if self.last == Some(p.position) {
                continue;
            }
            out.push(PathPoint {
                position: p.position,
                state: WeldState::WeldOn,
                weld_active: true,
                is_curve_point: p.is_curve_point,
                repeat_for_arc: p.repeat_for_arc,
            });
            self.last = Some(p.position);
        }
        PathElement {
            kind: ElementKind::Weld(kind),
            motion,
            points: out,
        }
    }
}

/// Assemble every planned contour of `plans` into one path.
pub fn assemble(plans: &[LayerPlan], options: AssemblyOptions<'_>) -> Result<AssembledPath> {
    options.bead.validate()?;
    if let Some(motion) = options.motion {
        motion.validate()?;
    }

    let mut builder = Builder {
        options,
        last: None,
    };
    let mut layers = Vec::with_capacity(plans.len());
    for plan in plans {
        let mut contours = Vec::new();
        for contour in plan.planned() {
            let mut elements = Vec::new();
            for line in contour.lines() {
                let Some(start) = line.start() else {
                    return Err(ProgramError::EmptyElement {
                        layer: contour.layer,
                        contour: contour.contour,
                    });
                };
                if let Some(transit) = builder.transit_to(start) {
                    builder.last = transit.points.last().map(|p| p.position);
                    elements.push(transit);
                }
                let weld = builder.weld(line.kind, &line.points);
                if !weld.points.is_empty() {
                    elements.push(weld);
                }
            }
            debug!(
                layer = contour.layer,
                contour = contour.contour,
                elements = elements.len(),
                "contour assembled"
            );
            contours.push(PathContour {
                layer: contour.layer,
                contour: contour.contour,
                elements,
            });
        }
        layers.push(PathLayer {
            index: plan.index,
            z: plan.z,
            contours,
        });
    }

    let mut path = AssembledPath { layers };
    mark_endpoints(&mut path);
    info!(
        points = path.len(),
        transits = path.transits(),
        "path assembled"
    );
    Ok(path)
}

fn mark_endpoints(path: &mut AssembledPath) {
    let mut elements = path
        .layers
        .iter_mut()
        .flat_map(|l| l.contours.iter_mut())
        .flat_map(|c| c.elements.iter_mut())
        .filter(|e| !e.points.is_empty());
    let Some(first) = elements.next() else {
        return;
    };
    if let Some(p) = first.points.first_mut() {
        p.state = WeldState::Start;
    }
    let last = elements.last().unwrap_or(first);
    if let Some(p) = last.points.last_mut() {
        p.state = WeldState::End;
    }
}
