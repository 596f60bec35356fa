//! Nearest-feature queries and alignment guides
//!
//! [`find_closest`] resolves a controller position to the vertex, edge or
//! face it hovers, in that order of priority. Each [`Selection`] then offers
//! alignment guides, affine subspaces that interactive tools snap dragged
//! points onto.

use serde::{Deserialize, Serialize};

use crate::config::SelectionConfig;
use crate::constants::MARGINAL_INCREASE;
use crate::geometry::{Axis, Line, Plane, SelectionDistance, SinglePoint, Subspace, Vector3};
use crate::model::{EdgeId, FaceId, GroupId, Model};

// ============== Guide colors ==============

pub const COLOR_AXIS_X: u32 = 0xFF0000;
pub const COLOR_AXIS_Y: u32 = 0x00C000;
pub const COLOR_AXIS_Z: u32 = 0x0000FF;
pub const COLOR_EDGE: u32 = 0x00D0D0;
pub const COLOR_FACE: u32 = 0xC0C0C0;
pub const COLOR_DIAGONAL: u32 = 0x808080;

/// An affine subspace offered as a snapping target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Guide {
    pub subspace: Subspace,
    /// RGB color used when the guide is shown
    pub color: u32,
}

impl Guide {
    pub fn new(subspace: impl Into<Subspace>, color: u32) -> Self {
        Self {
            subspace: subspace.into(),
            color,
        }
    }
}

fn axis_color(axis: Axis) -> u32 {
    match axis {
        Axis::X => COLOR_AXIS_X,
        Axis::Y => COLOR_AXIS_Y,
        Axis::Z => COLOR_AXIS_Z,
    }
}

fn axis_guides(position: Vector3) -> Vec<Guide> {
    Axis::ALL
        .iter()
        .map(|axis| Guide::new(Line::new(position, Vector3::from_axis(*axis, 1.0)), axis_color(*axis)))
        .collect()
}

/// What a controller position resolves to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Selection {
    /// An edge endpoint
    Vertex { position: Vector3 },
    /// A point strictly inside an edge; `fraction` is exactly 0.5 when
    /// snapped to the midpoint
    AlongEdge {
        edge: EdgeId,
        fraction: f64,
        v1: Vector3,
        v2: Vector3,
    },
    /// A point of a face, projected onto its plane
    OnFace {
        face: FaceId,
        position: Vector3,
        plane: Plane,
    },
    /// Nothing nearby
    Void { position: Vector3 },
}

impl Selection {
    /// The selected position
    pub fn point(&self) -> Vector3 {
        match self {
            Selection::Vertex { position }
            | Selection::OnFace { position, .. }
            | Selection::Void { position } => *position,
            Selection::AlongEdge {
                fraction, v1, v2, ..
            } => v1.lerp(*v2, *fraction),
        }
    }

    /// The subspace a point moving along this selection is confined to
    pub fn subspace(&self) -> Subspace {
        match self {
            Selection::Vertex { position } => SinglePoint::new(*position).into(),
            Selection::AlongEdge { fraction, .. } if *fraction == 0.5 => {
                SinglePoint::new(self.point()).into()
            }
            Selection::AlongEdge { v1, v2, .. } => Line::new(*v1, *v2 - *v1).into(),
            Selection::OnFace { plane, .. } => (*plane).into(),
            Selection::Void { .. } => Subspace::WholeSpace,
        }
    }

    /// Bring `position` onto this selection's subspace
    pub fn adjust(&self, position: Vector3) -> Vector3 {
        self.subspace().project_point_inside(position)
    }

    /// Guides aligned with this selection, through its point
    pub fn alignment_guides(&self) -> Vec<Guide> {
        let point = self.point();
        match self {
            Selection::Vertex { .. } | Selection::Void { .. } => axis_guides(point),
            Selection::AlongEdge { v1, v2, .. } => {
                let direction = *v2 - *v1;
                let mut guides = vec![
                    Guide::new(Line::new(point, direction), COLOR_EDGE),
                    Guide::new(Plane::from_point_and_normal(point, direction.normalized()), COLOR_EDGE),
                ];
                if self.subspace().dimension() == 0 {
                    guides.extend(axis_guides(point));
                }
                guides
            }
            Selection::OnFace { plane, .. } => vec![
                Guide::new(*plane, COLOR_FACE),
                Guide::new(Line::new(point, plane.normal), COLOR_FACE),
            ],
        }
    }
}

/// Restrictions on [`find_closest`]
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Only consider entities of this group and its subgroups
    pub only_group: Option<GroupId>,
    pub skip_vertices: bool,
    pub skip_edges: bool,
    pub skip_faces: bool,
    /// Never select a vertex at this position (the one being dragged)
    pub ignore_vertex: Option<Vector3>,
}

/// Resolve `position` to the closest vertex, else edge, else face.
///
/// `scale` converts the configured radii to the controller's world scale.
/// Within each pass, a later candidate replaces the current one when it is
/// closer than `marginal_increase` times the current distance.
pub fn find_closest(
    model: &Model,
    config: &SelectionConfig,
    scale: impl Fn(f64) -> f64,
    position: Vector3,
    options: &FindOptions,
) -> Selection {
    let groups = model.get_subgroups(options.only_group.unwrap_or(model.root()));

    if !options.skip_vertices {
        let mut closest = None;
        let mut distance_min = scale(config.vertex_distance);
        for group in &groups {
            for vertex in model.get_edges(*group).flat_map(|e| [e.v1, e.v2]) {
                if options.ignore_vertex.is_some_and(|ignored| ignored == vertex) {
                    continue;
                }
                let distance = position.distance(vertex);
                if distance < distance_min {
                    distance_min = distance * config.marginal_increase;
                    closest = Some(Selection::Vertex { position: vertex });
                }
            }
        }
        if let Some(selection) = closest {
            return selection;
        }
    }

    if !options.skip_edges {
        let mut closest = None;
        let mut distance_min = scale(config.edge_distance);
        for group in &groups {
            for edge in model.get_edges(*group) {
                let (mut fraction, distance) = edge.measure_distance(position);
                if 0.0 < fraction && fraction < 1.0 && distance < distance_min {
                    distance_min = distance * config.marginal_increase;
                    if config.snap_midpoint
                        && position.distance(edge.midpoint()) < scale(config.vertex_distance)
                    {
                        fraction = 0.5;
                    }
                    closest = Some(Selection::AlongEdge {
                        edge: edge.id,
                        fraction,
                        v1: edge.v1,
                        v2: edge.v2,
                    });
                }
            }
        }
        if let Some(selection) = closest {
            return selection;
        }
    }

    if !options.skip_faces {
        let mut closest = None;
        let mut distance_min = scale(config.face_distance);
        for group in &groups {
            for face in model.get_faces(*group) {
                let distance = face.plane.distance_to_point(position);
                if distance < distance_min && face.point_is_inside(position) {
                    distance_min = distance * config.marginal_increase;
                    closest = Some(Selection::OnFace {
                        face: face.id,
                        position: face.plane.project_point_inside(position),
                        plane: face.plane,
                    });
                }
            }
        }
        if let Some(selection) = closest {
            return selection;
        }
    }

    Selection::Void { position }
}

/// The six lines at 45 degrees between two axes, through `position`
pub fn all_45degree_guides(position: Vector3) -> Vec<Guide> {
    [
        Vector3::new(1.0, 1.0, 0.0),
        Vector3::new(1.0, -1.0, 0.0),
        Vector3::new(1.0, 0.0, 1.0),
        Vector3::new(1.0, 0.0, -1.0),
        Vector3::new(0.0, 1.0, 1.0),
        Vector3::new(0.0, 1.0, -1.0),
    ]
    .into_iter()
    .map(|axis| Guide::new(Line::new(position, axis), COLOR_DIAGONAL))
    .collect()
}

/// Loosen a best-so-far distance so that near ties go to later candidates
pub fn marginal_increase(distance: SelectionDistance) -> SelectionDistance {
    SelectionDistance::new(distance.dimension, distance.distance * MARGINAL_INCREASE)
}

/// The guide `point` is best aligned with, if any is within reach
pub fn best_guide<'a>(
    guides: &'a [Guide],
    scale: impl Fn(f64) -> f64,
    point: Vector3,
) -> Option<&'a Guide> {
    let mut best = None;
    let mut best_distance = SelectionDistance::UNSELECTED;
    for guide in guides {
        let distance = guide.subspace.selection_distance(&scale, point);
        if !distance.is_selectable() {
            continue;
        }
        if distance < best_distance {
            best_distance = marginal_increase(distance);
            best = Some(guide);
        }
    }
    best
}

/// Snap the point of `selection` onto the best of `guides`.
///
/// The selection's own subspace is intersected with the best guide; when
/// they do not meet the guide is ignored. Returns the snapped point and the
/// guide used.
pub fn snap_to_guides(
    selection: &Selection,
    guides: &[Guide],
    scale: impl Fn(f64) -> f64,
) -> (Vector3, Option<Guide>) {
    let point = selection.point();
    let subspace = selection.subspace();
    let Some(guide) = best_guide(guides, &scale, point) else {
        return (point, None);
    };
    match subspace.intersect(&guide.subspace) {
        Ok(snapped) => (snapped.project_point_inside(point), Some(*guide)),
        Err(_) => {
            tracing::trace!("Guide {:?} does not meet {:?}", guide.subspace, subspace);
            (subspace.project_point_inside(point), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::NullDisplay;
    use crate::step::ModelStep;
    use crate::step::tests::{unit_square_model, v};
    use approx::assert_relative_eq;

    fn closest(model: &Model, position: Vector3, options: &FindOptions) -> Selection {
        find_closest(model, &SelectionConfig::default(), |d| d, position, options)
    }

    #[test]
    fn test_find_closest_vertex() {
        let (model, _, _) = unit_square_model();
        let selection = closest(&model, v(1.01, 1.0, 1.02), &FindOptions::default());
        assert_eq!(selection, Selection::Vertex { position: v(1.0, 1.0, 1.0) });
        assert_eq!(selection.subspace().dimension(), 0);
    }

    #[test]
    fn test_find_closest_edge() {
        let (model, edges, _) = unit_square_model();
        let selection = closest(&model, v(0.2, -0.01, 1.0), &FindOptions::default());
        match selection {
            Selection::AlongEdge { edge, fraction, .. } => {
                assert_eq!(edge, edges[0]);
                assert_relative_eq!(fraction, 0.2, epsilon = 1e-9);
            }
            other => panic!("Expected an edge, got {:?}", other),
        }
        assert!(selection.point() == v(0.2, 0.0, 1.0));
        assert_eq!(selection.subspace().dimension(), 1);
    }

    #[test]
    fn test_find_closest_edge_snaps_to_midpoint() {
        let (model, edges, _) = unit_square_model();
        let selection = closest(&model, v(0.52, -0.01, 1.0), &FindOptions::default());
        assert!(matches!(
            selection,
            Selection::AlongEdge { edge, fraction, .. } if edge == edges[0] && fraction == 0.5
        ));
        assert_eq!(selection.subspace(), Subspace::from(SinglePoint::new(v(0.5, 0.0, 1.0))));

        let config = SelectionConfig {
            snap_midpoint: false,
            ..SelectionConfig::default()
        };
        let selection = find_closest(&model, &config, |d| d, v(0.52, -0.01, 1.0), &FindOptions::default());
        assert!(matches!(selection, Selection::AlongEdge { fraction, .. } if fraction != 0.5));
    }

    #[test]
    fn test_find_closest_face_and_void() {
        let (model, _, face) = unit_square_model();
        let selection = closest(&model, v(0.3, 0.6, 1.02), &FindOptions::default());
        match selection {
            Selection::OnFace { face: id, position, .. } => {
                assert_eq!(id, face);
                assert!(position == v(0.3, 0.6, 1.0));
            }
            other => panic!("Expected a face, got {:?}", other),
        }
        assert_eq!(selection.subspace().dimension(), 2);

        // Near the plane but outside the polygon
        let selection = closest(&model, v(1.5, 0.5, 1.01), &FindOptions::default());
        assert!(matches!(selection, Selection::Void { .. }));
        assert_eq!(selection.subspace(), Subspace::WholeSpace);
    }

    #[test]
    fn test_find_closest_scale() {
        let (model, _, _) = unit_square_model();
        let position = v(1.1, 1.0, 1.0);
        assert!(matches!(
            closest(&model, position, &FindOptions::default()),
            Selection::Void { .. }
        ));
        let selection = find_closest(
            &model,
            &SelectionConfig::default(),
            |d| d * 4.0,
            position,
            &FindOptions::default(),
        );
        assert!(matches!(selection, Selection::Vertex { .. }));
    }

    #[test]
    fn test_find_closest_options() {
        let (mut model, _, _) = unit_square_model();
        let corner = v(0.001, 0.002, 1.0);

        let options = FindOptions {
            skip_vertices: true,
            ..FindOptions::default()
        };
        assert!(matches!(closest(&model, corner, &options), Selection::AlongEdge { .. }));

        let options = FindOptions {
            ignore_vertex: Some(v(0.0, 0.0, 1.0)),
            ..FindOptions::default()
        };
        assert!(!matches!(closest(&model, corner, &options), Selection::Vertex { .. }));

        let options = FindOptions {
            skip_vertices: true,
            skip_edges: true,
            skip_faces: true,
            ..FindOptions::default()
        };
        assert!(matches!(closest(&model, corner, &options), Selection::Void { .. }));

        let mut step = ModelStep::new("Group");
        let group = step.new_group(&model, model.root()).unwrap();
        step.add_polygon(&model, group, &[v(0.0, 0.0, 5.0), v(1.0, 0.0, 5.0), v(0.0, 1.0, 5.0)])
            .unwrap();
        step.consolidate(&model).unwrap();
        step.apply(&mut model, &mut NullDisplay).unwrap();

        let options = FindOptions {
            only_group: Some(group),
            ..FindOptions::default()
        };
        assert!(matches!(closest(&model, corner, &options), Selection::Void { .. }));
        assert!(matches!(
            closest(&model, v(0.0, 0.0, 5.01), &options),
            Selection::Vertex { .. }
        ));
        // The root's search covers its subgroups
        assert!(matches!(
            closest(&model, v(0.0, 0.0, 5.01), &FindOptions::default()),
            Selection::Vertex { .. }
        ));
    }

    #[test]
    fn test_marginal_increase_prefers_later_near_tie() {
        let mut model = Model::new();
        let root = model.root();
        let p = v(0.5, 0.5, 5.0);
        let first = p + v(0.01, 0.0, 0.0);
        let second = p + v(0.0, 0.01005, 0.0);
        let mut step = ModelStep::new("Two edges");
        step.add_edge(&model, root, first, v(3.0, 0.0, 0.0), None);
        step.add_edge(&model, root, second, v(0.0, 3.0, 0.0), None);
        step.apply(&mut model, &mut NullDisplay).unwrap();

        let selection = closest(&model, p, &FindOptions::default());
        assert_eq!(selection, Selection::Vertex { position: second });

        let strict = SelectionConfig {
            marginal_increase: 1.0,
            ..SelectionConfig::default()
        };
        let selection = find_closest(&model, &strict, |d| d, p, &FindOptions::default());
        assert_eq!(selection, Selection::Vertex { position: first });
    }

    #[test]
    fn test_alignment_guides_pass_through_point() {
        let selections = [
            Selection::Vertex { position: v(1.0, 2.0, 3.0) },
            Selection::AlongEdge {
                edge: EdgeId(1),
                fraction: 0.25,
                v1: v(0.0, 0.0, 0.0),
                v2: v(2.0, 0.0, 0.0),
            },
            Selection::AlongEdge {
                edge: EdgeId(1),
                fraction: 0.5,
                v1: v(0.0, 0.0, 0.0),
                v2: v(2.0, 0.0, 0.0),
            },
            Selection::OnFace {
                face: FaceId(1),
                position: v(0.5, 0.5, 1.0),
                plane: Plane::from_point_and_normal(v(0.0, 0.0, 1.0), v(0.0, 0.0, 1.0)),
            },
            Selection::Void { position: v(-1.0, 0.0, 4.0) },
        ];
        let counts: Vec<usize> = selections.iter().map(|s| s.alignment_guides().len()).collect();
        assert_eq!(counts, vec![3, 2, 5, 2, 3]);
        for selection in &selections {
            for guide in selection.alignment_guides() {
                assert!(guide.subspace.contains_point(selection.point()));
            }
        }
    }

    #[test]
    fn test_adjust_projects_onto_selection() {
        let selection = Selection::AlongEdge {
            edge: EdgeId(1),
            fraction: 0.25,
            v1: v(0.0, 0.0, 0.0),
            v2: v(2.0, 0.0, 0.0),
        };
        assert!(selection.adjust(v(3.0, 1.0, -1.0)) == v(3.0, 0.0, 0.0));
        let selection = Selection::Void { position: v(0.0, 0.0, 0.0) };
        assert!(selection.adjust(v(3.0, 1.0, -1.0)) == v(3.0, 1.0, -1.0));
    }

    #[test]
    fn test_45degree_guides() {
        let position = v(1.0, 1.0, 1.0);
        let guides = all_45degree_guides(position);
        assert_eq!(guides.len(), 6);
        assert!(guides.iter().all(|g| g.subspace.contains_point(position)));
        assert!(guides.iter().any(|g| g.subspace.contains_point(v(2.0, 0.0, 1.0))));
        assert!(!guides.iter().any(|g| g.subspace.contains_point(v(2.0, 1.0, 1.0))));
    }

    #[test]
    fn test_best_guide_and_snap() {
        let origin = Selection::Vertex { position: v(0.0, 0.0, 0.0) };
        let guides = origin.alignment_guides();

        let best = best_guide(&guides, |d| d, v(0.5, 0.01, 0.0));
        assert_eq!(best.map(|g| g.color), Some(COLOR_AXIS_X));
        assert!(best_guide(&guides, |d| d, v(0.5, 0.5, 0.5)).is_none());

        let hover = Selection::Void { position: v(0.5, 0.01, 0.0) };
        let (point, guide) = snap_to_guides(&hover, &guides, |d| d);
        assert!(point == v(0.5, 0.0, 0.0));
        assert_eq!(guide.map(|g| g.color), Some(COLOR_AXIS_X));

        // A vertex hover does not lie on the guide: the guide is ignored
        let hover = Selection::Vertex { position: v(0.5, 0.01, 0.0) };
        let (point, guide) = snap_to_guides(&hover, &guides, |d| d);
        assert!(point == v(0.5, 0.01, 0.0));
        assert!(guide.is_none());
    }

    #[test]
    fn test_marginal_increase_keeps_dimension() {
        let d = marginal_increase(SelectionDistance::new(1, 0.5));
        assert_eq!(d.dimension, 1);
        assert_relative_eq!(d.distance, 0.505);
    }
}
