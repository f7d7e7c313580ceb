//! Element Store - the CRUD surface a topology editing engine drives
//!
//! [`TopologyBackend`] is the engine-facing contract. [`TopoStore`]
//! implements it over a borrowed SQLite connection; pass a
//! `rusqlite::Transaction` (which derefs to a connection) to run a whole
//! editing operation atomically.
//!
//! Every failing call records its message in the store's [`Session`], so
//! the host can report it through [`TopologyBackend::last_error_message`].
//! Three outcomes stay distinct: `Ok` with rows, `Ok` with nothing, `Err`.

mod fetch;
mod split;
mod write;

use rusqlite::{Connection, Row, Statement};

use crate::element::{Edge, ElemId, Face, Node};
use crate::fields::{EdgeFields, FaceFields, NodeFields};
use crate::geometry::{Envelope, Point};
use crate::query::{ElementRecord, QueryBuilder, SqlText};
use crate::session::Session;
use crate::topology::Topology;
use crate::{Error, Result};

/// How many rows a spatial fetch should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchLimit {
    /// Every matching row
    #[default]
    All,
    /// At most `n` rows; `First(0)` is the same as `All`
    First(usize),
    /// Only report whether any row matches, without materializing rows
    ExistsOnly,
}

/// Result of a fetch that may have run in existence-only mode
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Rows(Vec<T>),
    Exists(bool),
}

impl<T> Fetched<T> {
    /// Number of rows, or 0/1 for an existence check
    pub fn count(&self) -> usize {
        match self {
            Fetched::Rows(rows) => rows.len(),
            Fetched::Exists(found) => usize::from(*found),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Materialized rows; empty for an existence check
    pub fn into_rows(self) -> Vec<T> {
        match self {
            Fetched::Rows(rows) => rows,
            Fetched::Exists(_) => Vec::new(),
        }
    }
}

/// A record paired with the fields of it that take part in a match
#[derive(Debug)]
pub struct FieldMatch<'a, R: ElementRecord> {
    pub record: &'a R,
    pub fields: R::Fields,
}

impl<'a, R: ElementRecord> FieldMatch<'a, R> {
    pub fn new(record: &'a R, fields: R::Fields) -> Self {
        Self { record, fields }
    }
}

/// Storage operations required by a topology editing engine
pub trait TopologyBackend {
    /// Most recent failure recorded by any operation
    fn last_error_message(&self) -> Option<&str>;

    /// Mark the start of a top-level editing operation
    fn begin_operation(&mut self);

    // ========== Node Operations ==========

    fn get_nodes_by_id(&mut self, ids: &[ElemId], fields: NodeFields) -> Result<Vec<Node>>;

    /// Nodes whose containing face is one of `faces`
    fn get_nodes_by_face(&mut self, faces: &[ElemId], fields: NodeFields) -> Result<Vec<Node>>;

    /// Nodes within `dist` of `pt`; with `dist == 0`, nodes located at `pt`
    fn get_node_within_distance(
        &mut self,
        pt: &Point,
        dist: f64,
        fields: NodeFields,
        limit: FetchLimit,
    ) -> Result<Fetched<Node>>;

    fn get_node_within_box(&mut self, bbox: &Envelope, fields: NodeFields, limit: FetchLimit) -> Result<Fetched<Node>>;

    /// Insert all nodes at once, writing assigned identifiers back
    fn insert_nodes(&mut self, nodes: &mut [Node]) -> Result<()>;

    /// Set `upd` on nodes matching `sel` and differing from `exc`
    fn update_nodes(
        &mut self,
        sel: Option<FieldMatch<'_, Node>>,
        upd: FieldMatch<'_, Node>,
        exc: Option<FieldMatch<'_, Node>>,
    ) -> Result<usize>;

    fn update_nodes_by_id(&mut self, nodes: &[Node], fields: NodeFields) -> Result<usize>;

    // ========== Edge Operations ==========

    fn get_edges_by_id(&mut self, ids: &[ElemId], fields: EdgeFields) -> Result<Vec<Edge>>;

    /// Edges starting or ending at one of `nodes`
    fn get_edges_by_node(&mut self, nodes: &[ElemId], fields: EdgeFields) -> Result<Vec<Edge>>;

    /// Edges with one of `faces` on their left or right
    fn get_edges_by_face(&mut self, faces: &[ElemId], fields: EdgeFields) -> Result<Vec<Edge>>;

    /// Edges within `dist` of `pt`; with `dist == 0`, edges whose interior holds `pt`
    fn get_edge_within_distance(
        &mut self,
        pt: &Point,
        dist: f64,
        fields: EdgeFields,
        limit: FetchLimit,
    ) -> Result<Fetched<Edge>>;

    fn get_edge_within_box(&mut self, bbox: &Envelope, fields: EdgeFields, limit: FetchLimit) -> Result<Fetched<Edge>>;

    /// Signed edge identifiers of the ring `edge` belongs to, in traversal order.
    ///
    /// Fails with [`Error::LimitExceeded`] when more than `limit` edges are
    /// visited without closing the ring. `Some(0)` is the same as `None`.
    fn get_ring_edges(&mut self, edge: ElemId, limit: Option<usize>) -> Result<Vec<ElemId>>;

    /// Allocate a fresh edge identifier; the value is consumed
    fn next_edge_id(&mut self) -> Result<ElemId>;

    fn insert_edges(&mut self, edges: &mut [Edge]) -> Result<()>;

    fn update_edges(
        &mut self,
        sel: Option<FieldMatch<'_, Edge>>,
        upd: FieldMatch<'_, Edge>,
        exc: Option<FieldMatch<'_, Edge>>,
    ) -> Result<usize>;

    fn update_edges_by_id(&mut self, edges: &[Edge], fields: EdgeFields) -> Result<usize>;

    fn delete_edges(&mut self, sel: FieldMatch<'_, Edge>) -> Result<usize>;

    // ========== Face Operations ==========

    fn get_faces_by_id(&mut self, ids: &[ElemId], fields: FaceFields) -> Result<Vec<Face>>;

    /// Face whose interior holds `pt`, `None` when no face does
    fn get_face_containing_point(&mut self, pt: &Point) -> Result<Option<ElemId>>;

    fn insert_faces(&mut self, faces: &mut [Face]) -> Result<()>;

    fn update_faces_by_id(&mut self, faces: &[Face], fields: FaceFields) -> Result<usize>;

    fn delete_faces_by_id(&mut self, ids: &[ElemId]) -> Result<usize>;

    // ========== Split Propagation ==========

    /// Move feature references of `split_edge` to the edge(s) replacing it
    fn update_topogeom_edge_split(&mut self, split_edge: ElemId, new_edge1: ElemId, new_edge2: Option<ElemId>) -> Result<()>;

    /// Move feature references of `split_face` to the face(s) replacing it
    fn update_topogeom_face_split(&mut self, split_face: ElemId, new_face1: ElemId, new_face2: Option<ElemId>) -> Result<()>;
}

/// SQLite-backed element store for one topology
pub struct TopoStore<'c> {
    conn: &'c Connection,
    topo: Topology,
    session: Session,
}

impl<'c> TopoStore<'c> {
    pub fn new(conn: &'c Connection, topo: Topology) -> Self {
        Self { conn, topo, session: Session::new() }
    }

    pub fn topology(&self) -> &Topology {
        &self.topo
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.topo)
    }

    fn table<R: ElementRecord>(&self) -> String {
        self.topo.table(R::TABLE)
    }

    /// Record the failure of an operation before handing it back
    fn tracked<T>(&mut self, op: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::debug!("{} failed: {}", op, e);
            self.session.record_error(e);
        }
        result
    }

    fn mark_changed(&mut self) {
        if self.session.mark_changed() {
            // Reads from here on must not reuse statements prepared before the write
            self.conn.flush_prepared_statement_cache();
        }
    }

    // ========== Execution ==========

    /// Run `body` under a savepoint, rolling everything it wrote back on failure
    fn atomically<T>(&mut self, savepoint: &str, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.conn.execute_batch(&format!("SAVEPOINT {}", savepoint))?;
        match body(self) {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {}", savepoint))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", savepoint)) {
                    tracing::error!("Rolling back {} failed: {}", savepoint, rollback);
                }
                Err(e)
            }
        }
    }

    /// Run a read, decoding every row
    fn fetch_rows<T>(&self, sql: &SqlText, mut decode: impl FnMut(&Row<'_>) -> Result<T>) -> Result<Vec<T>> {
        tracing::debug!("query: {}", sql.sql);
        let rows = if self.session.data_changed() {
            let mut stmt = self.conn.prepare(&sql.sql).map_err(|e| Error::execution(&sql.sql, e))?;
            collect_rows(&mut stmt, sql, &mut decode)?
        } else {
            let mut stmt = self.conn.prepare_cached(&sql.sql).map_err(|e| Error::execution(&sql.sql, e))?;
            collect_rows(&mut stmt, sql, &mut decode)?
        };
        tracing::debug!("query returned {} rows", rows.len());
        Ok(rows)
    }

    /// Run a write that returns rows; marks the store changed when it touched any
    fn write_returning<T>(&mut self, sql: &SqlText, mut decode: impl FnMut(&Row<'_>) -> Result<T>) -> Result<Vec<T>> {
        tracing::debug!("write: {}", sql.sql);
        let mut stmt = self.conn.prepare(&sql.sql).map_err(|e| Error::execution(&sql.sql, e))?;
        let rows = collect_rows(&mut stmt, sql, &mut decode)?;
        drop(stmt);
        if !rows.is_empty() {
            self.mark_changed();
        }
        Ok(rows)
    }

    /// Run a write, returning the number of rows it touched
    fn execute(&mut self, sql: &SqlText) -> Result<usize> {
        tracing::debug!("write: {}", sql.sql);
        let processed = self
            .conn
            .execute(&sql.sql, sql.params())
            .map_err(|e| Error::execution(&sql.sql, e))?;
        tracing::debug!("write processed {} rows", processed);
        if processed > 0 {
            self.mark_changed();
        }
        Ok(processed)
    }
}

fn collect_rows<T>(
    stmt: &mut Statement<'_>,
    sql: &SqlText,
    decode: &mut impl FnMut(&Row<'_>) -> Result<T>,
) -> Result<Vec<T>> {
    let mut rows = stmt.query(sql.params()).map_err(|e| Error::execution(&sql.sql, e))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| Error::execution(&sql.sql, e))? {
        out.push(decode(row)?);
    }
    Ok(out)
}

impl TopologyBackend for TopoStore<'_> {
    fn last_error_message(&self) -> Option<&str> {
        self.session.last_error()
    }

    fn begin_operation(&mut self) {
        self.session.begin_operation();
    }

    fn get_nodes_by_id(&mut self, ids: &[ElemId], fields: NodeFields) -> Result<Vec<Node>> {
        let result = self.fetch_by_column::<Node>(&["node_id"], ids, fields);
        self.tracked("get_nodes_by_id", result)
    }

    fn get_nodes_by_face(&mut self, faces: &[ElemId], fields: NodeFields) -> Result<Vec<Node>> {
        let result = self.fetch_by_column::<Node>(&["containing_face"], faces, fields);
        self.tracked("get_nodes_by_face", result)
    }

    fn get_node_within_distance(
        &mut self,
        pt: &Point,
        dist: f64,
        fields: NodeFields,
        limit: FetchLimit,
    ) -> Result<Fetched<Node>> {
        let result = self.fetch_within_distance::<Node>(pt, dist, fields, limit);
        self.tracked("get_node_within_distance", result)
    }

    fn get_node_within_box(&mut self, bbox: &Envelope, fields: NodeFields, limit: FetchLimit) -> Result<Fetched<Node>> {
        let result = self.fetch_within_box::<Node>(bbox, fields, limit);
        self.tracked("get_node_within_box", result)
    }

    fn insert_nodes(&mut self, nodes: &mut [Node]) -> Result<()> {
        let result = self.insert_records(nodes);
        self.tracked("insert_nodes", result)
    }

    fn update_nodes(
        &mut self,
        sel: Option<FieldMatch<'_, Node>>,
        upd: FieldMatch<'_, Node>,
        exc: Option<FieldMatch<'_, Node>>,
    ) -> Result<usize> {
        let result = self.update_matching(sel, upd, exc);
        self.tracked("update_nodes", result)
    }

    fn update_nodes_by_id(&mut self, nodes: &[Node], fields: NodeFields) -> Result<usize> {
        let result = self.update_records_by_id(nodes, fields);
        self.tracked("update_nodes_by_id", result)
    }

    fn get_edges_by_id(&mut self, ids: &[ElemId], fields: EdgeFields) -> Result<Vec<Edge>> {
        let result = self.fetch_by_column::<Edge>(&["edge_id"], ids, fields);
        self.tracked("get_edges_by_id", result)
    }

    fn get_edges_by_node(&mut self, nodes: &[ElemId], fields: EdgeFields) -> Result<Vec<Edge>> {
        let result = self.fetch_by_column::<Edge>(&["start_node", "end_node"], nodes, fields);
        self.tracked("get_edges_by_node", result)
    }

    fn get_edges_by_face(&mut self, faces: &[ElemId], fields: EdgeFields) -> Result<Vec<Edge>> {
        let result = self.fetch_by_column::<Edge>(&["left_face", "right_face"], faces, fields);
        self.tracked("get_edges_by_face", result)
    }

    fn get_edge_within_distance(
        &mut self,
        pt: &Point,
        dist: f64,
        fields: EdgeFields,
        limit: FetchLimit,
    ) -> Result<Fetched<Edge>> {
        let result = self.fetch_within_distance::<Edge>(pt, dist, fields, limit);
        self.tracked("get_edge_within_distance", result)
    }

    fn get_edge_within_box(&mut self, bbox: &Envelope, fields: EdgeFields, limit: FetchLimit) -> Result<Fetched<Edge>> {
        let result = self.fetch_within_box::<Edge>(bbox, fields, limit);
        self.tracked("get_edge_within_box", result)
    }

    fn get_ring_edges(&mut self, edge: ElemId, limit: Option<usize>) -> Result<Vec<ElemId>> {
        let result = self.fetch_ring(edge, limit);
        self.tracked("get_ring_edges", result)
    }

    fn next_edge_id(&mut self) -> Result<ElemId> {
        let result = self.allocate_edge_id();
        self.tracked("next_edge_id", result)
    }

    fn insert_edges(&mut self, edges: &mut [Edge]) -> Result<()> {
        let result = self.insert_records(edges);
        self.tracked("insert_edges", result)
    }

    fn update_edges(
        &mut self,
        sel: Option<FieldMatch<'_, Edge>>,
        upd: FieldMatch<'_, Edge>,
        exc: Option<FieldMatch<'_, Edge>>,
    ) -> Result<usize> {
        let result = self.update_matching(sel, upd, exc);
        self.tracked("update_edges", result)
    }

    fn update_edges_by_id(&mut self, edges: &[Edge], fields: EdgeFields) -> Result<usize> {
        let result = self.update_records_by_id(edges, fields);
        self.tracked("update_edges_by_id", result)
    }

    fn delete_edges(&mut self, sel: FieldMatch<'_, Edge>) -> Result<usize> {
        let result = self.delete_matching(sel);
        self.tracked("delete_edges", result)
    }

    fn get_faces_by_id(&mut self, ids: &[ElemId], fields: FaceFields) -> Result<Vec<Face>> {
        let result = self.fetch_by_column::<Face>(&["face_id"], ids, fields);
        self.tracked("get_faces_by_id", result)
    }

    fn get_face_containing_point(&mut self, pt: &Point) -> Result<Option<ElemId>> {
        let result = self.fetch_containing_face(pt);
        self.tracked("get_face_containing_point", result)
    }

    fn insert_faces(&mut self, faces: &mut [Face]) -> Result<()> {
        let result = self.insert_records(faces);
        self.tracked("insert_faces", result)
    }

    fn update_faces_by_id(&mut self, faces: &[Face], fields: FaceFields) -> Result<usize> {
        let result = self.update_records_by_id(faces, fields);
        self.tracked("update_faces_by_id", result)
    }

    fn delete_faces_by_id(&mut self, ids: &[ElemId]) -> Result<usize> {
        let result = self.delete_by_id::<Face>(ids);
        self.tracked("delete_faces_by_id", result)
    }

    fn update_topogeom_edge_split(&mut self, split_edge: ElemId, new_edge1: ElemId, new_edge2: Option<ElemId>) -> Result<()> {
        let result = self.propagate_split(crate::element::ElementType::Edge, split_edge, new_edge1, new_edge2);
        self.tracked("update_topogeom_edge_split", result)
    }

    fn update_topogeom_face_split(&mut self, split_face: ElemId, new_face1: ElemId, new_face2: Option<ElemId>) -> Result<()> {
        let result = self.propagate_split(crate::element::ElementType::Face, split_face, new_face1, new_face2);
        self.tracked("update_topogeom_face_split", result)
    }
}
