//! Parent/child relation between contours of consecutive layers.
//!
//! Nodes live in an arena indexed by `(layer, index)`. A contour's parent is
//! the tightest contour in the layer above that fully contains it; removing a
//! curve marks it and every ancestor, and [`CurveTree::compact`] drops marked
//! contours from the layer stack.

use geo::{Area, BooleanOps};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contour::Layer;
use crate::error::{Result, SlicerError};

/// Relative leftover area below which containment holds.
const CONTAINMENT_SLACK: f64 = 1e-6;

/// Address of a contour in the layer stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurveId {
    /// Layer index.
    pub layer: usize,
    /// Contour index within the layer.
    pub index: usize,
}

impl CurveId {
    /// Create an id.
    pub fn new(layer: usize, index: usize) -> Self {
        Self { layer, index }
    }
}

/// One arena entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveNode {
    /// This node's address.
    pub id: CurveId,
    /// Tightest containing contour in the layer above.
    pub parent: Option<CurveId>,
    /// Contours in the layer below contained by this one.
    pub children: Vec<CurveId>,
    /// Marked for deletion.
    pub removed: bool,
}

/// Arena of curve nodes for a whole damage stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurveTree {
    layers: Vec<Vec<CurveNode>>,
}

impl CurveTree {
    /// Build the hierarchy for a layer stack (bottom to top).
    pub fn build(layers: &[Layer]) -> Self {
        let mut nodes: Vec<Vec<CurveNode>> = layers
            .iter()
            .enumerate()
            .map(|(l, layer)| {
                (0..layer.contours.len())
                    .map(|i| CurveNode {
                        id: CurveId::new(l, i),
                        parent: None,
                        children: Vec::new(),
                        removed: false,
                    })
                    .collect()
            })
            .collect();

        for l in 0..layers.len().saturating_sub(1) {
            let upper: Vec<(geo::Polygon<f64>, f64)> = layers[l + 1]
                .contours
                .iter()
                .map(|c| {
                    let p = c.polygon();
                    (p.to_geo(), p.area())
                })
                .collect();

            for (i, contour) in layers[l].contours.iter().enumerate() {
                let child = contour.polygon();
                let child_area = child.area();
                let child_geo = child.to_geo();
                let parent = upper
                    .iter()
                    .enumerate()
                    .filter(|(_, (candidate, area))| {
                        *area >= child_area && contains(candidate, &child_geo, child_area)
                    })
                    .min_by(|a, b| a.1 .1.total_cmp(&b.1 .1))
                    .map(|(j, _)| CurveId::new(l + 1, j));

                if let Some(parent) = parent {
                    nodes[l][i].parent = Some(parent);
                    nodes[parent.layer][parent.index]
                        .children
                        .push(CurveId::new(l, i));
                }
            }
        }

        debug!(layers = nodes.len(), "built curve hierarchy");
        Self { layers: nodes }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    /// True when the tree holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a node.
    pub fn node(&self, id: CurveId) -> Option<&CurveNode> {
        self.layers.get(id.layer)?.get(id.index)
    }

    /// Parent of a node.
    pub fn parent(&self, id: CurveId) -> Option<CurveId> {
        self.node(id)?.parent
    }

    /// Children of a node.
    pub fn children(&self, id: CurveId) -> &[CurveId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Mark a curve and all of its ancestors as removed.
    ///
    /// Returns the number of nodes newly marked.
    pub fn remove_cascade(&mut self, id: CurveId) -> Result<usize> {
        if self.node(id).is_none() {
            return Err(SlicerError::GeometryDegenerate(format!(
                "no curve at layer {} index {}",
                id.layer, id.index
            )));
        }
        let mut marked = 0;
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &mut self.layers[current.layer][current.index];
            if !node.removed {
                node.removed = true;
                marked += 1;
            }
            cursor = node.parent;
        }
        Ok(marked)
    }

    /// Whether a curve was marked for removal.
    pub fn is_removed(&self, id: CurveId) -> bool {
        self.node(id).is_some_and(|n| n.removed)
    }

    /// Copy of `layers` without the removed contours.
    ///
    /// Layer indices are kept; parent indices inside each layer are remapped
    /// and cleared when the parent itself was removed.
    pub fn compact(&self, layers: &[Layer]) -> Vec<Layer> {
        layers
            .iter()
            .enumerate()
            .map(|(l, layer)| {
                let mut remap = vec![None; layer.contours.len()];
                let mut next = 0;
                for (i, slot) in remap.iter_mut().enumerate() {
                    if !self.is_removed(CurveId::new(l, i)) {
                        *slot = Some(next);
                        next += 1;
                    }
                }
                let contours = layer
                    .contours
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| remap[*i].is_some())
                    .map(|(_, c)| {
                        let mut c = c.clone();
                        c.parent = c.parent.and_then(|p| remap.get(p).copied().flatten());
                        c
                    })
                    .collect();
                Layer {
                    z: layer.z,
                    index: layer.index,
                    contours,
                }
            })
            .collect()
    }

    /// Curves with more than one child.
    ///
    /// These mark where one damage region above splits into several below.
    pub fn relevant_curves(&self) -> Vec<CurveId> {
        self.layers
            .iter()
            .flatten()
            .filter(|n| !n.removed && n.children.len() > 1)
            .map(|n| n.id)
            .collect()
    }
}

/// `candidate` contains `child` when the difference leaves no area.
fn contains(candidate: &geo::Polygon<f64>, child: &geo::Polygon<f64>, child_area: f64) -> bool {
    let leftover = child.difference(candidate).unsigned_area();
    leftover <= CONTAINMENT_SLACK * child_area.max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::Contour;
    use crate::path::Polygon;
    use weldpath_math::Point2;

    fn square_contour(cx: f64, cy: f64, half: f64, z: f64) -> Contour {
        Contour::from_polygon(
            &Polygon::rectangle(
                Point2::new(cx - half, cy - half),
                Point2::new(cx + half, cy + half),
            ),
            z,
        )
    }

    /// Pit narrowing downwards: two small pits at the bottom under one wide top.
    fn pit_stack() -> Vec<Layer> {
        vec![
            Layer {
                z: 0.0,
                index: 0,
                contours: vec![square_contour(10.0, 10.0, 3.0, 0.0), square_contour(30.0, 10.0, 3.0, 0.0)],
            },
            Layer {
                z: 1.0,
                index: 1,
                contours: vec![square_contour(20.0, 10.0, 16.0, 1.0)],
            },
            Layer {
                z: 2.0,
                index: 2,
                contours: vec![square_contour(20.0, 10.0, 20.0, 2.0)],
            },
        ]
    }

    #[test]
    fn test_parents_in_layer_above() {
        let tree = CurveTree::build(&pit_stack());
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.parent(CurveId::new(0, 0)), Some(CurveId::new(1, 0)));
        assert_eq!(tree.parent(CurveId::new(0, 1)), Some(CurveId::new(1, 0)));
        assert_eq!(tree.parent(CurveId::new(1, 0)), Some(CurveId::new(2, 0)));
        assert_eq!(tree.parent(CurveId::new(2, 0)), None);
        assert_eq!(tree.children(CurveId::new(1, 0)).len(), 2);
    }

    #[test]
    fn test_relevant_curves() {
        let tree = CurveTree::build(&pit_stack());
        assert_eq!(tree.relevant_curves(), vec![CurveId::new(1, 0)]);
    }

    #[test]
    fn test_remove_cascade_marks_ancestors() {
        let layers = pit_stack();
        let mut tree = CurveTree::build(&layers);
        let marked = tree.remove_cascade(CurveId::new(0, 1)).unwrap();
        assert_eq!(marked, 3);
        assert!(!tree.is_removed(CurveId::new(0, 0)));

        let compacted = tree.compact(&layers);
        assert_eq!(compacted[0].contours.len(), 1);
        assert!(compacted[1].contours.is_empty());
        assert!(compacted[2].contours.is_empty());

        // Second removal through the same ancestors marks only the leaf.
        assert_eq!(tree.remove_cascade(CurveId::new(0, 0)).unwrap(), 1);
    }

    #[test]
    fn test_remove_unknown_curve() {
        let mut tree = CurveTree::build(&pit_stack());
        assert!(tree.remove_cascade(CurveId::new(7, 0)).is_err());
    }

    #[test]
    fn test_disjoint_contour_has_no_parent() {
        let layers = vec![
            Layer {
                z: 0.0,
                index: 0,
                contours: vec![square_contour(100.0, 100.0, 3.0, 0.0)],
            },
            Layer {
                z: 1.0,
                index: 1,
                contours: vec![square_contour(0.0, 0.0, 10.0, 1.0)],
            },
        ];
        let tree = CurveTree::build(&layers);
        assert_eq!(tree.parent(CurveId::new(0, 0)), None);
    }
}
