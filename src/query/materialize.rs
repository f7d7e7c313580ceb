//! Row Materializer - decodes result rows back into element records
//!
//! Columns are read positionally in the order [`ElementRecord::columns`]
//! renders them, so a row must be decoded with the same field set and
//! mode that produced its projection.

use rusqlite::Row;

use super::builder::ElementRecord;
use crate::element::{Edge, ElemId, Face, Node, INVALID_ID};
use crate::fields::{EdgeDataMode, EdgeFields, FaceFields, NodeFields};
use crate::geometry::Geometry;
use crate::Result;

/// Position within a result row
pub struct ColumnCursor<'r, 's> {
    row: &'r Row<'s>,
    pos: usize,
}

impl<'r, 's> ColumnCursor<'r, 's> {
    pub fn new(row: &'r Row<'s>) -> Self {
        Self { row, pos: 0 }
    }

    /// Start at an arbitrary column, e.g. after a leading key column
    pub fn at(row: &'r Row<'s>, pos: usize) -> Self {
        Self { row, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn skip(&mut self) {
        self.pos += 1;
    }

    pub fn next_i64(&mut self) -> Result<Option<i64>> {
        let value: Option<i64> = self.row.get(self.pos)?;
        self.pos += 1;
        Ok(value)
    }

    pub fn next_geometry(&mut self) -> Result<Option<Geometry>> {
        let text: Option<String> = self.row.get(self.pos)?;
        self.pos += 1;
        text.map(|t| Geometry::from_hex_ewkb(&t)).transpose()
    }

    /// Identifier column; NULL is a corruption warning, decoded as unassigned
    fn next_key(&mut self, column: &str) -> Result<Option<ElemId>> {
        let value = self.next_i64()?;
        if value.is_none() {
            tracing::warn!("Found edge/node/face with null {}", column);
        }
        Ok(value)
    }

    /// Linkage column with no "none" value of its own
    fn next_link(&mut self, column: &str) -> Result<ElemId> {
        match self.next_i64()? {
            Some(v) => Ok(v),
            None => {
                tracing::warn!("Found edge with null {}", column);
                Ok(INVALID_ID)
            }
        }
    }
}

/// An element kind that can be filled from a result row
pub trait FromRow: ElementRecord + Sized {
    fn from_row(cursor: &mut ColumnCursor<'_, '_>, fields: Self::Fields, mode: EdgeDataMode) -> Result<Self>;

    /// Decode a whole row starting at its first column
    fn decode(row: &Row<'_>, fields: Self::Fields, mode: EdgeDataMode) -> Result<Self> {
        Self::from_row(&mut ColumnCursor::new(row), fields, mode)
    }
}

impl FromRow for Node {
    fn from_row(cursor: &mut ColumnCursor<'_, '_>, fields: NodeFields, _mode: EdgeDataMode) -> Result<Self> {
        let mut node = Node::default();
        if fields.contains(NodeFields::NODE_ID) {
            node.node_id = cursor.next_key("node_id")?;
        }
        if fields.contains(NodeFields::CONTAINING_FACE) {
            node.containing_face = cursor.next_i64()?;
        }
        if fields.contains(NodeFields::GEOM) {
            node.geom = match cursor.next_geometry()? {
                Some(g) => Some(g.into_point()?),
                None => {
                    tracing::debug!("Found node with no geometry (node_id {:?})", node.node_id);
                    None
                }
            };
        }
        Ok(node)
    }
}

impl FromRow for Edge {
    fn from_row(cursor: &mut ColumnCursor<'_, '_>, fields: EdgeFields, mode: EdgeDataMode) -> Result<Self> {
        let mut edge = Edge::default();
        if fields.contains(EdgeFields::EDGE_ID) {
            edge.edge_id = cursor.next_key("edge_id")?;
        }
        if fields.contains(EdgeFields::START_NODE) {
            edge.start_node = cursor.next_link("start_node")?;
        }
        if fields.contains(EdgeFields::END_NODE) {
            edge.end_node = cursor.next_link("end_node")?;
        }
        if fields.contains(EdgeFields::FACE_LEFT) {
            edge.face_left = cursor.next_i64()?;
        }
        if fields.contains(EdgeFields::FACE_RIGHT) {
            edge.face_right = cursor.next_i64()?;
        }
        if fields.contains(EdgeFields::NEXT_LEFT) {
            edge.next_left = cursor.next_link("next_left_edge")?;
            if mode.includes_shadows() {
                cursor.skip();
            }
        }
        if fields.contains(EdgeFields::NEXT_RIGHT) {
            edge.next_right = cursor.next_link("next_right_edge")?;
            if mode.includes_shadows() {
                cursor.skip();
            }
        }
        if fields.contains(EdgeFields::GEOM) {
            edge.geom = match cursor.next_geometry()? {
                Some(g) => Some(g.into_line_string()?),
                None => {
                    tracing::warn!("Found edge with NULL geometry (edge_id {:?})", edge.edge_id);
                    None
                }
            };
        }
        Ok(edge)
    }
}

impl FromRow for Face {
    fn from_row(cursor: &mut ColumnCursor<'_, '_>, fields: FaceFields, _mode: EdgeDataMode) -> Result<Self> {
        let mut face = Face::default();
        if fields.contains(FaceFields::FACE_ID) {
            face.face_id = cursor.next_key("face_id")?;
        }
        if fields.contains(FaceFields::MBR) {
            face.mbr = match cursor.next_geometry()? {
                Some(g) => {
                    let env = g.envelope();
                    if env.is_none() {
                        tracing::warn!("Found face (face_id {:?}) with empty MBR", face.face_id);
                    }
                    env
                }
                None => {
                    tracing::debug!("Found face (face_id {:?}) with no MBR", face.face_id);
                    None
                }
            };
        }
        Ok(face)
    }
}
