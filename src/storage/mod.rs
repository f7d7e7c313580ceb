//! Storage Layer - SQLite-backed persistence
//!
//! The main database holds the registry:
//! - topology(id, name, srid, precision, hasz, store_path)
//! - layer(topology_id, layer_id, schema_name, table_name, feature_column, feature_type, level, child_id)
//!
//! Each topology is an attached database named after it, with tables
//! node, edge_data (plus the edge view), face and relation.

pub mod functions;
pub mod schema;
pub mod sqlite;

pub use sqlite::{Layer, LayerSpec, SqliteBackend, TopologyStats};
