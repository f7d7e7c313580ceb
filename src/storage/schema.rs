//! Database schema definitions
//!
//! The main database holds the registry: `topology` and `layer`. Each
//! topology lives in its own attached database whose schema name is the
//! topology name, holding `face`, `node`, `edge_data`, the `edge` view and
//! `relation`.

use crate::topology::Topology;

/// SQL to create the topology registry table
pub const CREATE_TOPOLOGY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS main.topology (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    srid INTEGER,
    precision REAL NOT NULL DEFAULT 0,
    hasz INTEGER NOT NULL DEFAULT 0,
    store_path TEXT NOT NULL
)
"#;

/// SQL to create the layer registry table
/// Maps feature layers to the topology their relation rows belong to
pub const CREATE_LAYER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS main.layer (
    topology_id INTEGER NOT NULL REFERENCES topology(id),
    layer_id INTEGER NOT NULL,
    schema_name TEXT NOT NULL,
    table_name TEXT NOT NULL,
    feature_column TEXT NOT NULL,
    feature_type INTEGER NOT NULL,
    level INTEGER NOT NULL DEFAULT 0,
    child_id INTEGER,
    PRIMARY KEY (topology_id, layer_id),
    UNIQUE (schema_name, table_name, feature_column)
)
"#;

/// SQL to create registry indexes
pub const CREATE_REGISTRY_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS main.idx_topology_name ON topology(name)",
    "CREATE INDEX IF NOT EXISTS main.idx_layer_level ON layer(topology_id, level)",
];

/// All registry creation statements
pub fn registry_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_TOPOLOGY_TABLE, CREATE_LAYER_TABLE];
    stmts.extend(CREATE_REGISTRY_INDEXES.iter().copied());
    stmts
}

/// Statements creating the tables of a freshly attached topology schema.
///
/// Linkage columns reference `node` and `face` with constraints deferred
/// to commit time, so an operation may write rows in any order.
pub fn topology_statements(topo: &Topology) -> Vec<String> {
    let schema = crate::query::quote_ident(&topo.name);
    vec![
        format!(
            r#"
CREATE TABLE {schema}.face (
    face_id INTEGER PRIMARY KEY AUTOINCREMENT,
    mbr TEXT
)"#
        ),
        format!(
            r#"
CREATE TABLE {schema}.node (
    node_id INTEGER PRIMARY KEY AUTOINCREMENT,
    containing_face INTEGER REFERENCES face(face_id) DEFERRABLE INITIALLY DEFERRED,
    geom TEXT
)"#
        ),
        format!(
            r#"
CREATE TABLE {schema}.edge_data (
    edge_id INTEGER PRIMARY KEY AUTOINCREMENT,
    start_node INTEGER NOT NULL REFERENCES node(node_id) DEFERRABLE INITIALLY DEFERRED,
    end_node INTEGER NOT NULL REFERENCES node(node_id) DEFERRABLE INITIALLY DEFERRED,
    next_left_edge INTEGER NOT NULL,
    abs_next_left_edge INTEGER NOT NULL,
    next_right_edge INTEGER NOT NULL,
    abs_next_right_edge INTEGER NOT NULL,
    left_face INTEGER NOT NULL REFERENCES face(face_id) DEFERRABLE INITIALLY DEFERRED,
    right_face INTEGER NOT NULL REFERENCES face(face_id) DEFERRABLE INITIALLY DEFERRED,
    geom TEXT
)"#
        ),
        format!(
            r#"
CREATE VIEW {schema}.edge AS
SELECT edge_id, start_node, end_node, next_left_edge, next_right_edge,
       left_face, right_face, geom
FROM edge_data"#
        ),
        format!(
            r#"
CREATE TABLE {schema}.relation (
    topogeo_id INTEGER NOT NULL,
    layer_id INTEGER NOT NULL,
    element_id INTEGER NOT NULL,
    element_type INTEGER NOT NULL CHECK (element_type BETWEEN 1 AND 3),
    UNIQUE (layer_id, topogeo_id, element_id, element_type)
)"#
        ),
        format!("CREATE INDEX {schema}.idx_node_face ON node(containing_face)"),
        format!("CREATE INDEX {schema}.idx_edge_start ON edge_data(start_node)"),
        format!("CREATE INDEX {schema}.idx_edge_end ON edge_data(end_node)"),
        format!("CREATE INDEX {schema}.idx_edge_left ON edge_data(left_face)"),
        format!("CREATE INDEX {schema}.idx_edge_right ON edge_data(right_face)"),
        format!("CREATE INDEX {schema}.idx_edge_abs_next_left ON edge_data(abs_next_left_edge)"),
        format!("CREATE INDEX {schema}.idx_edge_abs_next_right ON edge_data(abs_next_right_edge)"),
        format!("CREATE INDEX {schema}.idx_relation_element ON relation(element_id)"),
        // Universe face and the edge identifier counter
        format!("INSERT INTO {schema}.face (face_id, mbr) VALUES (0, NULL)"),
        format!("INSERT INTO {schema}.sqlite_sequence (name, seq) VALUES ('edge_data', 0)"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_statements_are_schema_qualified() {
        let topo = Topology { id: 1, name: "tp".to_string(), srid: 0, precision: 0.0 };
        let stmts = topology_statements(&topo);
        assert!(stmts.iter().all(|s| s.contains("\"tp\".")));
        assert!(stmts.iter().any(|s| s.contains("abs_next_right_edge INTEGER NOT NULL")));
    }
}
