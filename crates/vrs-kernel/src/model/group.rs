//! Group tree nodes, id allocation and per-group caches

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{EdgeId, FaceId};
use crate::geometry::Plane;

/// Identifier of a group, never reused within a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Node of the group tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    /// `None` only for the root
    pub parent: Option<GroupId>,
}

impl Group {
    pub fn new(id: GroupId, parent: Option<GroupId>) -> Self {
        Self { id, parent }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Monotonic per-kind id counters
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    edges: Cell<u64>,
    faces: Cell<u64>,
    groups: Cell<u64>,
}

impl IdAllocator {
    fn bump(counter: &Cell<u64>) -> u64 {
        let id = counter.get() + 1;
        counter.set(id);
        id
    }

    pub fn next_edge(&self) -> EdgeId {
        EdgeId(Self::bump(&self.edges))
    }

    pub fn next_face(&self) -> FaceId {
        FaceId(Self::bump(&self.faces))
    }

    pub fn next_group(&self) -> GroupId {
        GroupId(Self::bump(&self.groups))
    }

    fn observe(counter: &Cell<u64>, id: u64) {
        counter.set(counter.get().max(id));
    }

    /// Keep later edge ids above `id`
    pub fn observe_edge(&self, id: EdgeId) {
        Self::observe(&self.edges, id.0);
    }

    pub fn observe_face(&self, id: FaceId) {
        Self::observe(&self.faces, id.0);
    }

    pub fn observe_group(&self, id: GroupId) {
        Self::observe(&self.groups, id.0);
    }
}

/// Lazily computed data for one group, dropped whenever the group's content
/// or the hierarchy below it changes
#[derive(Debug, Clone, Default)]
pub(crate) struct GroupCache {
    pub subgroups: Option<Vec<GroupId>>,
    pub potential_planes: Option<Vec<Plane>>,
}
