//! Finding faces to create from existing edges
//!
//! Used by tools that fill a closed loop of edges with a face: given a point
//! near some edges, find a plane spanned by the group's edges and a closed
//! loop in that plane that goes around the point.

use crate::constants::{EPSILON, MARGINAL_INCREASE};
use crate::geometry::{GeometryDict, Plane, Vector3};
use crate::model::{Edge, GroupId, Model};

/// Default search radius of [`potential_new_face`]
pub const POTENTIAL_FACE_DISTANCE: f64 = EPSILON;

/// Planes spanned by two edges of `group` meeting at a vertex.
///
/// Cached per group until a step touching the group is applied.
pub fn all_potential_planes(model: &Model, group: GroupId) -> Vec<Plane> {
    if let Some(planes) = model.with_group_cache(group, |cache| cache.potential_planes.clone()) {
        return planes;
    }

    let edges: Vec<&Edge> = model.get_edges(group).collect();
    let mut planes: GeometryDict<Plane, ()> = GeometryDict::new();
    for edge1 in &edges {
        for edge2 in &edges {
            if edge1.v2 != edge2.v1 && edge1.v2 != edge2.v2 {
                continue;
            }
            if let Some(normal) = edge1.direction().cross(edge2.direction()).try_normalized() {
                planes.insert(Plane::from_point_and_normal(edge1.v2, normal), ());
            }
        }
    }

    let planes: Vec<Plane> = planes.keys().copied().collect();
    tracing::trace!("{} potential planes in {}", planes.len(), group);
    model.with_group_cache(group, |cache| cache.potential_planes = Some(planes.clone()));
    planes
}

/// Vertices of a new face around `point`, on the closest potential plane of
/// `group` within `max_distance`
pub fn potential_new_face(
    model: &Model,
    group: GroupId,
    point: Vector3,
    max_distance: f64,
) -> Option<Vec<Vector3>> {
    let mut best_vertices = None;
    let mut best_distance = max_distance;
    for plane in all_potential_planes(model, group) {
        let distance = plane.distance_to_point(point);
        if distance > best_distance {
            continue;
        }
        if let Some(vertices) = closed_loop_around(model, group, point, &plane) {
            best_distance = distance * MARGINAL_INCREASE;
            best_vertices = Some(vertices);
        }
    }
    best_vertices
}

/// Closed loop of edges of `plane` turning around `point`.
///
/// Starts from the edge closest to `point` and keeps extending with the
/// closest edge that continues in the same rotational direction. This is a
/// heuristic: loops with edges crossing inside are not detected.
fn closed_loop_around(
    model: &Model,
    group: GroupId,
    point: Vector3,
    plane: &Plane,
) -> Option<Vec<Vector3>> {
    let mut planar: Vec<&Edge> = model
        .get_edges(group)
        .filter(|e| plane.distance_to_point(e.v1) < EPSILON && plane.distance_to_point(e.v2) < EPSILON)
        .collect();
    planar.sort_by(|a, b| a.distance_to_point(point).total_cmp(&b.distance_to_point(point)));

    let clockwise = |edge: &Edge| edge.direction().cross(point - edge.v1).dot(plane.normal) < 0.0;

    if planar.is_empty() {
        return None;
    }
    let first = planar.remove(0);
    let direction = clockwise(first);
    let source = first.v1;
    let mut vertices = vec![first.v2];

    while vertices[vertices.len() - 1] != source {
        let from = vertices[vertices.len() - 1];
        let (index, to) = planar.iter().enumerate().find_map(|(index, edge)| {
            let (a, b) = if clockwise(*edge) == direction {
                (edge.v1, edge.v2)
            } else {
                (edge.v2, edge.v1)
            };
            (a == from).then_some((index, b))
        })?;
        planar.remove(index);
        vertices.push(to);
    }
    Some(vertices)
}
