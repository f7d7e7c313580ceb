//! # Topostore - Relational storage for editable planar topologies
//!
//! Stores the nodes, edges and faces of a planar topology, and the
//! relations tying them to feature layers, in SQLite.
//!
//! Topostore provides:
//! - Field sets naming which columns of an element a request touches
//! - A query builder rendering projections, insert rows and update clauses
//! - A row materializer decoding result rows back into elements
//! - The element store operations used by a topology editing engine
//! - Split propagation keeping feature relations valid when elements split

pub mod element;
pub mod fields;
pub mod geometry;
pub mod topology;
pub mod session;
pub mod query;
pub mod storage;
pub mod backend;
pub mod output;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use backend::{FetchLimit, Fetched, TopoStore, TopologyBackend};
pub use element::{Edge, ElemId, ElementType, Face, Node, RelationRow};
pub use fields::{EdgeDataMode, EdgeFields, FaceFields, NodeFields};
pub use geometry::{Envelope, Geometry, LineString, Point};
pub use session::Session;
pub use storage::SqliteBackend;
pub use topology::Topology;

/// Result type alias for Topostore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Topostore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Error executing query: {sql}: {source}")]
    Execution {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("processed {processed} rows, expected {expected}")]
    Cardinality { processed: usize, expected: usize },

    #[error("Corrupted topology: {0}")]
    Integrity(String),

    #[error("Max traversing limit hit: {0}")]
    LimitExceeded(usize),

    #[error("SQL/MM Spatial exception - invalid topology name")]
    TopologyNotFound(String),

    #[error("multiple topologies named '{0}' were found")]
    AmbiguousTopology(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a driver failure with the statement that caused it
    pub fn execution(sql: &str, source: rusqlite::Error) -> Self {
        Error::Execution { sql: sql.to_string(), source }
    }
}
