//! Query Builder - renders SQL fragments from element records and field sets
//!
//! Every element kind lists its columns through [`ElementRecord::columns`],
//! always in the same canonical order (identifier, linkage, geometry last).
//! Projections, insert rows and update clauses are all rendered from that
//! one list, so the Row Materializer can decode results positionally.
//!
//! Values are never spliced into the SQL text: they are bound as positional
//! `?` parameters collected alongside the text in a [`SqlText`].

use rusqlite::types::Value;

use crate::element::{ElemId, Edge, Face, Node};
use crate::fields::{EdgeDataMode, EdgeFields, FaceFields, NodeFields};
use crate::geometry::{Envelope, Geometry, Srid, SRID_UNKNOWN};
use crate::topology::Topology;

/// Quote an SQL identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQL text and the values bound to its `?` placeholders, in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlText {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlText {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), params: Vec::new() }
    }

    pub fn push(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    /// Append a placeholder bound to `value`
    pub fn bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.sql.push('?');
        self.params.push(value.into());
        self
    }

    /// Append `?,?,...` bound to each identifier
    pub fn bind_list(&mut self, ids: &[ElemId]) -> &mut Self {
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                self.sql.push(',');
            }
            self.bind(*id);
        }
        self
    }

    pub fn params(&self) -> rusqlite::ParamsFromIter<std::slice::Iter<'_, Value>> {
        rusqlite::params_from_iter(self.params.iter())
    }
}

/// Which kind of clause an update rendering produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// `col = v, col = v` for a SET list
    Set,
    /// `col = v AND col = v` for a selector
    Match,
    /// `col IS NOT v AND col IS NOT v` for an excluder
    Exclude,
}

impl UpdateMode {
    fn separator(self) -> &'static str {
        match self {
            UpdateMode::Set => ",",
            UpdateMode::Match | UpdateMode::Exclude => " AND ",
        }
    }
}

/// A value held by one column of a record
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// Primary key; `None` asks the store to assign one
    Key(Option<ElemId>),
    Int(Option<i64>),
    Geom(Option<Geometry>),
    Envelope(Option<Envelope>),
}

/// One column of a record, named as in the table
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: &'static str,
    pub value: ColumnValue,
    /// Signed column this one mirrors as an absolute value
    pub shadow_of: Option<&'static str>,
}

impl Column {
    fn new(name: &'static str, value: ColumnValue) -> Self {
        Self { name, value, shadow_of: None }
    }

    fn shadow(name: &'static str, of: &'static str, value: ElemId) -> Self {
        Self { name, value: ColumnValue::Int(Some(value.abs())), shadow_of: Some(of) }
    }

    pub fn is_null(&self) -> bool {
        matches!(
            &self.value,
            ColumnValue::Key(None) | ColumnValue::Int(None) | ColumnValue::Geom(None) | ColumnValue::Envelope(None)
        )
    }
}

/// An element kind that maps onto one topology table
pub trait ElementRecord: Default {
    type Fields: bitflags::Flags + Copy + std::fmt::Debug;

    /// Table holding this element kind
    const TABLE: &'static str;
    /// Primary key column
    const KEY: &'static str;
    /// Field set naming only the primary key
    const KEY_FIELD: Self::Fields;

    fn key(&self) -> Option<ElemId>;

    fn set_key(&mut self, id: ElemId);

    /// Columns selected by `fields`, in canonical order
    fn columns(&self, fields: Self::Fields, mode: EdgeDataMode) -> Vec<Column>;

    fn column_names(fields: Self::Fields, mode: EdgeDataMode) -> Vec<&'static str> {
        Self::default().columns(fields, mode).into_iter().map(|c| c.name).collect()
    }
}

impl ElementRecord for Node {
    type Fields = NodeFields;
    const TABLE: &'static str = "node";
    const KEY: &'static str = "node_id";
    const KEY_FIELD: NodeFields = NodeFields::NODE_ID;

    fn key(&self) -> Option<ElemId> {
        self.node_id
    }

    fn set_key(&mut self, id: ElemId) {
        self.node_id = Some(id);
    }

    fn columns(&self, fields: NodeFields, _mode: EdgeDataMode) -> Vec<Column> {
        let mut cols = Vec::with_capacity(3);
        if fields.contains(NodeFields::NODE_ID) {
            cols.push(Column::new("node_id", ColumnValue::Key(self.node_id)));
        }
        if fields.contains(NodeFields::CONTAINING_FACE) {
            cols.push(Column::new("containing_face", ColumnValue::Int(self.containing_face)));
        }
        if fields.contains(NodeFields::GEOM) {
            cols.push(Column::new("geom", ColumnValue::Geom(self.geom.map(Geometry::Point))));
        }
        cols
    }
}

impl ElementRecord for Edge {
    type Fields = EdgeFields;
    const TABLE: &'static str = "edge_data";
    const KEY: &'static str = "edge_id";
    const KEY_FIELD: EdgeFields = EdgeFields::EDGE_ID;

    fn key(&self) -> Option<ElemId> {
        self.edge_id
    }

    fn set_key(&mut self, id: ElemId) {
        self.edge_id = Some(id);
    }

    fn columns(&self, fields: EdgeFields, mode: EdgeDataMode) -> Vec<Column> {
        let mut cols = Vec::with_capacity(10);
        if fields.contains(EdgeFields::EDGE_ID) {
            cols.push(Column::new("edge_id", ColumnValue::Key(self.edge_id)));
        }
        if fields.contains(EdgeFields::START_NODE) {
            cols.push(Column::new("start_node", ColumnValue::Int(Some(self.start_node))));
        }
        if fields.contains(EdgeFields::END_NODE) {
            cols.push(Column::new("end_node", ColumnValue::Int(Some(self.end_node))));
        }
        if fields.contains(EdgeFields::FACE_LEFT) {
            cols.push(Column::new("left_face", ColumnValue::Int(self.face_left)));
        }
        if fields.contains(EdgeFields::FACE_RIGHT) {
            cols.push(Column::new("right_face", ColumnValue::Int(self.face_right)));
        }
        if fields.contains(EdgeFields::NEXT_LEFT) {
            cols.push(Column::new("next_left_edge", ColumnValue::Int(Some(self.next_left))));
            if mode.includes_shadows() {
                cols.push(Column::shadow("abs_next_left_edge", "next_left_edge", self.next_left));
            }
        }
        if fields.contains(EdgeFields::NEXT_RIGHT) {
            cols.push(Column::new("next_right_edge", ColumnValue::Int(Some(self.next_right))));
            if mode.includes_shadows() {
                cols.push(Column::shadow("abs_next_right_edge", "next_right_edge", self.next_right));
            }
        }
        if fields.contains(EdgeFields::GEOM) {
            cols.push(Column::new(
                "geom",
                ColumnValue::Geom(self.geom.clone().map(Geometry::LineString)),
            ));
        }
        cols
    }
}

impl ElementRecord for Face {
    type Fields = FaceFields;
    const TABLE: &'static str = "face";
    const KEY: &'static str = "face_id";
    const KEY_FIELD: FaceFields = FaceFields::FACE_ID;

    fn key(&self) -> Option<ElemId> {
        self.face_id
    }

    fn set_key(&mut self, id: ElemId) {
        self.face_id = Some(id);
    }

    fn columns(&self, fields: FaceFields, _mode: EdgeDataMode) -> Vec<Column> {
        let mut cols = Vec::with_capacity(2);
        if fields.contains(FaceFields::FACE_ID) {
            cols.push(Column::new("face_id", ColumnValue::Key(self.face_id)));
        }
        if fields.contains(FaceFields::MBR) {
            cols.push(Column::new("mbr", ColumnValue::Envelope(self.mbr)));
        }
        cols
    }
}

/// Renders SQL fragments for one topology
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'t> {
    topo: &'t Topology,
}

impl<'t> QueryBuilder<'t> {
    pub fn new(topo: &'t Topology) -> Self {
        Self { topo }
    }

    pub fn topology(&self) -> &Topology {
        self.topo
    }

    /// Quoted schema-qualified table of element kind `R`
    pub fn table<R: ElementRecord>(&self) -> String {
        self.topo.table(R::TABLE)
    }

    /// Comma-separated column list, e.g. `edge_id,start_node,geom`
    pub fn render_projection<R: ElementRecord>(&self, fields: R::Fields, mode: EdgeDataMode) -> String {
        R::column_names(fields, mode).join(",")
    }

    /// Append one parenthesised VALUES row
    pub fn render_insert_values<R: ElementRecord>(
        &self,
        sql: &mut SqlText,
        record: &R,
        fields: R::Fields,
        mode: EdgeDataMode,
    ) {
        sql.push("(");
        for (i, col) in record.columns(fields, mode).into_iter().enumerate() {
            if i > 0 {
                sql.push(",");
            }
            self.push_value(sql, col.value);
        }
        sql.push(")");
    }

    /// Append a SET list, a selector or an excluder for `record`
    pub fn render_update_clause<R: ElementRecord>(
        &self,
        sql: &mut SqlText,
        record: &R,
        fields: R::Fields,
        mode: EdgeDataMode,
        update: UpdateMode,
    ) {
        for (i, col) in record.columns(fields, mode).into_iter().enumerate() {
            if i > 0 {
                sql.push(update.separator());
            }
            sql.push(col.name);
            match (update, col.is_null()) {
                (UpdateMode::Match, true) => {
                    sql.push(" IS NULL");
                }
                (UpdateMode::Exclude, true) => {
                    sql.push(" IS NOT NULL");
                }
                (UpdateMode::Exclude, false) => {
                    // NULL-safe so rows holding NULL still count as not matching
                    sql.push(" IS NOT ");
                    self.push_value(sql, col.value);
                }
                _ => {
                    sql.push(" = ");
                    self.push_value(sql, col.value);
                }
            }
        }
    }

    /// Append an envelope constructor tagged with the topology srid
    pub fn push_envelope(&self, sql: &mut SqlText, env: &Envelope) {
        sql.push("ST_MakeEnvelope(");
        sql.bind(env.xmin).push(",");
        sql.bind(env.ymin).push(",");
        sql.bind(env.xmax).push(",");
        sql.bind(env.ymax).push(",");
        sql.bind(i64::from(self.topo.srid)).push(")");
    }

    /// Append a geometry bound as hex EWKB tagged with a spatial reference
    pub fn push_geometry(&self, sql: &mut SqlText, geom: Geometry) {
        sql.bind(self.tagged_hex(geom));
    }

    fn tagged_hex(&self, geom: Geometry) -> String {
        let srid: Srid = if geom.srid() == SRID_UNKNOWN { self.topo.srid } else { geom.srid() };
        let tagged = match geom {
            Geometry::Point(p) => Geometry::Point(p.with_srid(srid)),
            Geometry::LineString(l) => Geometry::LineString(l.with_srid(srid)),
            Geometry::Polygon(mut p) => {
                p.srid = srid;
                Geometry::Polygon(p)
            }
        };
        tagged.to_hex_ewkb()
    }

    fn push_value(&self, sql: &mut SqlText, value: ColumnValue) {
        match value {
            // NULL into an AUTOINCREMENT key draws the next identifier
            ColumnValue::Key(None) => {
                sql.push("NULL");
            }
            ColumnValue::Key(Some(v)) | ColumnValue::Int(Some(v)) => {
                sql.bind(v);
            }
            ColumnValue::Geom(Some(g)) => self.push_geometry(sql, g),
            ColumnValue::Envelope(Some(env)) => self.push_envelope(sql, &env),
            ColumnValue::Int(None) | ColumnValue::Geom(None) | ColumnValue::Envelope(None) => {
                sql.push("NULL");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{LineString, Point};

    fn topo() -> Topology {
        Topology { id: 1, name: "tp".to_string(), srid: 4326, precision: 0.0 }
    }

    fn sample_edge() -> Edge {
        Edge::new(1, 2, LineString::from_xy(&[(0.0, 0.0), (1.0, 0.0)]))
            .with_id(5)
            .with_faces(0, 1)
            .with_next(-3, 4)
    }

    #[test]
    fn test_projection_order_is_canonical() {
        let topo = topo();
        let qb = QueryBuilder::new(&topo);
        let fields = EdgeFields::GEOM | EdgeFields::NEXT_LEFT | EdgeFields::EDGE_ID;
        assert_eq!(qb.render_projection::<Edge>(fields, EdgeDataMode::Plain), "edge_id,next_left_edge,geom");
        assert_eq!(
            qb.render_projection::<Edge>(fields, EdgeDataMode::Full),
            "edge_id,next_left_edge,abs_next_left_edge,geom"
        );
        assert_eq!(
            qb.render_projection::<Node>(NodeFields::all(), EdgeDataMode::Plain),
            "node_id,containing_face,geom"
        );
        assert_eq!(qb.render_projection::<Face>(FaceFields::MBR, EdgeDataMode::Plain), "mbr");
        assert_eq!(qb.render_projection::<Face>(FaceFields::empty(), EdgeDataMode::Plain), "");
    }

    #[test]
    fn test_unassigned_id_renders_as_auto_assign() {
        let topo = topo();
        let qb = QueryBuilder::new(&topo);
        let mut sql = SqlText::default();
        qb.render_insert_values(&mut sql, &Node::new(Point::new(1.0, 2.0)), NodeFields::all(), EdgeDataMode::Plain);
        assert_eq!(sql.sql, "(NULL,NULL,?)");
        assert_eq!(sql.params.len(), 1);
        assert!(!sql.sql.contains("-1"));
    }

    #[test]
    fn test_geometry_is_tagged_with_topology_srid() {
        let topo = topo();
        let qb = QueryBuilder::new(&topo);
        let mut sql = SqlText::default();
        qb.render_insert_values(&mut sql, &Node::new(Point::new(0.0, 0.0)).with_id(3), NodeFields::GEOM, EdgeDataMode::Plain);
        match &sql.params[0] {
            Value::Text(hex) => {
                let geom = Geometry::from_hex_ewkb(hex).unwrap();
                assert_eq!(geom.srid(), 4326);
            }
            other => panic!("unexpected param {:?}", other),
        }
    }

    #[test]
    fn test_full_edge_insert_values() {
        let topo = topo();
        let qb = QueryBuilder::new(&topo);
        let mut sql = SqlText::default();
        qb.render_insert_values(&mut sql, &sample_edge(), EdgeFields::all(), EdgeDataMode::Full);
        assert_eq!(sql.sql, "(?,?,?,?,?,?,?,?,?,?)");
        assert_eq!(
            &sql.params[..9],
            &[
                Value::Integer(5),
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(0),
                Value::Integer(1),
                Value::Integer(-3),
                Value::Integer(3),
                Value::Integer(4),
                Value::Integer(4),
            ]
        );
    }

    #[test]
    fn test_update_modes() {
        let topo = topo();
        let qb = QueryBuilder::new(&topo);
        let edge = sample_edge();
        let fields = EdgeFields::START_NODE | EdgeFields::NEXT_LEFT;

        let mut set = SqlText::default();
        qb.render_update_clause(&mut set, &edge, fields, EdgeDataMode::Full, UpdateMode::Set);
        assert_eq!(set.sql, "start_node = ?,next_left_edge = ?,abs_next_left_edge = ?");
        assert_eq!(set.params, vec![Value::Integer(1), Value::Integer(-3), Value::Integer(3)]);

        let mut sel = SqlText::default();
        qb.render_update_clause(&mut sel, &edge, fields, EdgeDataMode::Plain, UpdateMode::Match);
        assert_eq!(sel.sql, "start_node = ? AND next_left_edge = ?");

        let mut exc = SqlText::default();
        qb.render_update_clause(&mut exc, &edge, fields, EdgeDataMode::Plain, UpdateMode::Exclude);
        assert_eq!(exc.sql, "start_node IS NOT ? AND next_left_edge IS NOT ?");
    }

    #[test]
    fn test_absent_values_in_update_clauses() {
        let topo = topo();
        let qb = QueryBuilder::new(&topo);
        let node = Node::default();
        let fields = NodeFields::CONTAINING_FACE | NodeFields::GEOM;

        let mut set = SqlText::default();
        qb.render_update_clause(&mut set, &node, fields, EdgeDataMode::Plain, UpdateMode::Set);
        assert_eq!(set.sql, "containing_face = NULL,geom = NULL");

        let mut sel = SqlText::default();
        qb.render_update_clause(&mut sel, &node, fields, EdgeDataMode::Plain, UpdateMode::Match);
        assert_eq!(sel.sql, "containing_face IS NULL AND geom IS NULL");

        let mut exc = SqlText::default();
        qb.render_update_clause(&mut exc, &node, NodeFields::CONTAINING_FACE, EdgeDataMode::Plain, UpdateMode::Exclude);
        assert_eq!(exc.sql, "containing_face IS NOT NULL");
    }

    #[test]
    fn test_face_mbr_renders_envelope_constructor() {
        let topo = topo();
        let qb = QueryBuilder::new(&topo);
        let mut sql = SqlText::default();
        qb.render_insert_values(&mut sql, &Face::new(Envelope::new(0.0, 1.0, 2.0, 3.0)), FaceFields::all(), EdgeDataMode::Plain);
        assert_eq!(sql.sql, "(NULL,ST_MakeEnvelope(?,?,?,?,?))");
        assert_eq!(sql.params[4], Value::Integer(4326));

        let mut universe = SqlText::default();
        qb.render_insert_values(&mut universe, &Face::default().with_id(0), FaceFields::all(), EdgeDataMode::Plain);
        assert_eq!(universe.sql, "(?,NULL)");
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("tp"), "\"tp\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
