//! Topology elements - the records exchanged with the editing engine
//!
//! Identifiers that may be absent are `Option<ElemId>`:
//! - `node_id` / `edge_id` / `face_id`: `None` means "assign on insert"
//! - `containing_face` / `face_left` / `face_right`: `None` means "no face"
//!
//! Next-edge identifiers are signed; the sign records the traversal
//! direction relative to the referenced edge.

use crate::geometry::{Envelope, LineString, Point};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node, edge, face or topogeometry
pub type ElemId = i64;

/// Placeholder decoded from a NULL linkage column that has no safe "none"
pub const INVALID_ID: ElemId = -1;

/// Identifier of the unbounded face
pub const UNIVERSE_FACE: ElemId = 0;

/// A 0-dimensional topology element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: Option<ElemId>,
    /// Face an isolated node lies in
    pub containing_face: Option<ElemId>,
    pub geom: Option<Point>,
}

impl Node {
    /// A node that will receive its identifier on insert
    pub fn new(geom: Point) -> Self {
        Self { node_id: None, containing_face: None, geom: Some(geom) }
    }

    pub fn with_id(mut self, id: ElemId) -> Self {
        self.node_id = Some(id);
        self
    }

    pub fn isolated_in(mut self, face: ElemId) -> Self {
        self.containing_face = Some(face);
        self
    }
}

/// A 1-dimensional topology element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: Option<ElemId>,
    pub start_node: ElemId,
    pub end_node: ElemId,
    pub face_left: Option<ElemId>,
    pub face_right: Option<ElemId>,
    /// Signed id of the edge following this one on its left side
    pub next_left: ElemId,
    /// Signed id of the edge following this one on its right side
    pub next_right: ElemId,
    pub geom: Option<LineString>,
}

impl Default for Edge {
    fn default() -> Self {
        Self {
            edge_id: None,
            start_node: INVALID_ID,
            end_node: INVALID_ID,
            face_left: None,
            face_right: None,
            next_left: INVALID_ID,
            next_right: INVALID_ID,
            geom: None,
        }
    }
}

impl Edge {
    /// An edge linking two nodes, identifier assigned on insert
    pub fn new(start_node: ElemId, end_node: ElemId, geom: LineString) -> Self {
        Self { start_node, end_node, geom: Some(geom), ..Self::default() }
    }

    pub fn with_id(mut self, id: ElemId) -> Self {
        self.edge_id = Some(id);
        self
    }

    pub fn with_faces(mut self, left: ElemId, right: ElemId) -> Self {
        self.face_left = Some(left);
        self.face_right = Some(right);
        self
    }

    pub fn with_next(mut self, next_left: ElemId, next_right: ElemId) -> Self {
        self.next_left = next_left;
        self.next_right = next_right;
        self
    }
}

/// A 2-dimensional topology element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub face_id: Option<ElemId>,
    /// Bounding rectangle; only the universe face has none
    pub mbr: Option<Envelope>,
}

impl Face {
    pub fn new(mbr: Envelope) -> Self {
        Self { face_id: None, mbr: Some(mbr) }
    }

    pub fn with_id(mut self, id: ElemId) -> Self {
        self.face_id = Some(id);
        self
    }
}

/// Kind of element a relation row points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Node,
    Edge,
    Face,
}

impl ElementType {
    /// Code stored in `relation.element_type`
    pub fn code(&self) -> i64 {
        match self {
            ElementType::Node => 1,
            ElementType::Edge => 2,
            ElementType::Face => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ElementType::Node),
            2 => Some(ElementType::Edge),
            3 => Some(ElementType::Face),
            _ => None,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Node => "node",
            ElementType::Edge => "edge",
            ElementType::Face => "face",
        };
        write!(f, "{}", name)
    }
}

/// Membership of a topology element in a topogeometry.
///
/// The sign of `element_id` records orientation-dependent membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationRow {
    pub topogeo_id: ElemId,
    pub layer_id: ElemId,
    pub element_id: ElemId,
    pub element_type: ElementType,
}

impl RelationRow {
    pub fn new(topogeo_id: ElemId, layer_id: ElemId, element_id: ElemId, element_type: ElementType) -> Self {
        Self { topogeo_id, layer_id, element_id, element_type }
    }

    /// Same membership, pointing at `target` with this row's orientation
    pub fn repointed(&self, target: ElemId) -> Self {
        let element_id = if self.element_id < 0 { -target.abs() } else { target.abs() };
        Self { element_id, ..*self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_codes() {
        for ty in [ElementType::Node, ElementType::Edge, ElementType::Face] {
            assert_eq!(ElementType::from_code(ty.code()), Some(ty));
        }
        assert_eq!(ElementType::from_code(0), None);
    }

    #[test]
    fn test_repointed_keeps_sign() {
        let row = RelationRow::new(7, 1, -12, ElementType::Edge);
        assert_eq!(row.repointed(30).element_id, -30);
        let row = RelationRow::new(7, 1, 12, ElementType::Edge);
        assert_eq!(row.repointed(30).element_id, 30);
        assert_eq!(row.repointed(30).topogeo_id, 7);
    }
}
