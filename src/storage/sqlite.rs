//! SQLite storage implementation

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::{functions, schema};
use crate::backend::TopoStore;
use crate::geometry::Srid;
use crate::query::quote_ident;
use crate::topology::Topology;
use crate::{Error, Result};

/// Path recorded for topologies living in memory
const IN_MEMORY: &str = ":memory:";

/// SQLite database holding the topology registry and attached topologies
pub struct SqliteBackend {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteBackend {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let backend = Self { conn, path: Some(path.to_path_buf()) };
        backend.initialize()?;
        Ok(backend)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let backend = Self { conn, path: None };
        backend.initialize()?;
        Ok(backend)
    }

    /// Configure the connection, create the registry and attach known topologies
    fn initialize(&self) -> Result<()> {
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        functions::register(&self.conn)?;
        for stmt in schema::registry_statements() {
            self.conn.execute(stmt, [])?;
        }
        for (name, store_path) in self.registered_paths()? {
            if let Err(e) = self.attach(&name, &store_path) {
                tracing::warn!("Could not attach topology '{}' from {}: {}", name, store_path, e);
            }
        }
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Mutable access, e.g. to open a transaction around an editing operation
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ========== Topology Operations ==========

    /// Register a new topology and create its tables in a fresh attached database
    pub fn create_topology(&self, name: &str, srid: Srid, precision: f64) -> Result<Topology> {
        validate_name(name)?;
        if self.find_topologies(name)?.next().is_some() {
            return Err(Error::InvalidInput(format!("topology '{}' already exists", name)));
        }
        let store_path = self.store_path_for(name);
        self.attach(name, &store_path)?;

        match self.populate_topology(name, srid, precision, &store_path) {
            Ok(topo) => {
                tracing::info!("Created topology '{}' (id {}, srid {})", topo.name, topo.id, topo.srid);
                Ok(topo)
            }
            Err(e) => {
                if let Err(detach) = self.conn.execute(&format!("DETACH DATABASE {}", quote_ident(name)), []) {
                    tracing::warn!("Could not detach topology '{}': {}", name, detach);
                }
                Err(e)
            }
        }
    }

    fn populate_topology(&self, name: &str, srid: Srid, precision: f64, store_path: &str) -> Result<Topology> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO main.topology (name, srid, precision, store_path) VALUES (?1, ?2, ?3, ?4)",
            params![name, srid, precision, store_path],
        )?;
        let topo = Topology { id: tx.last_insert_rowid(), name: name.to_string(), srid, precision };
        for stmt in schema::topology_statements(&topo) {
            tx.execute(&stmt, []).map_err(|e| Error::execution(&stmt, e))?;
        }
        tx.commit()?;
        Ok(topo)
    }

    /// Look a topology up by name
    pub fn load_topology(&self, name: &str) -> Result<Topology> {
        let mut rows: Vec<(Option<i64>, Option<Srid>, f64, String)> = self.find_topologies(name)?.collect();
        let (id, srid, precision, store_path) = match rows.len() {
            0 => return Err(Error::TopologyNotFound(name.to_string())),
            1 => rows.remove(0),
            _ => return Err(Error::AmbiguousTopology(name.to_string())),
        };
        let id = id.ok_or_else(|| Error::Integrity(format!("Topology '{}' has null identifier", name)))?;
        let srid = srid.ok_or_else(|| Error::Integrity(format!("Topology '{}' has null SRID", name)))?;
        if !self.is_attached(name)? {
            self.attach(name, &store_path)?;
        }
        Ok(Topology { id, name: name.to_string(), srid, precision })
    }

    /// Element store over the named topology
    pub fn open_topology(&self, name: &str) -> Result<TopoStore<'_>> {
        Ok(TopoStore::new(&self.conn, self.load_topology(name)?))
    }

    /// All registered topologies, by identifier
    pub fn list_topologies(&self) -> Result<Vec<Topology>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, srid, precision FROM main.topology ORDER BY id")?;
        let topologies = stmt
            .query_map([], |row| self.row_to_topology(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(topologies)
    }

    fn row_to_topology(&self, row: &rusqlite::Row) -> rusqlite::Result<Topology> {
        Ok(Topology {
            id: row.get(0)?,
            name: row.get(1)?,
            srid: row.get::<_, Option<Srid>>(2)?.unwrap_or(crate::geometry::SRID_UNKNOWN),
            precision: row.get(3)?,
        })
    }

    fn find_topologies(&self, name: &str) -> Result<std::vec::IntoIter<(Option<i64>, Option<Srid>, f64, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, srid, precision, store_path FROM main.topology WHERE name = ?1")?;
        let rows = stmt
            .query_map([name], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows.into_iter())
    }

    fn registered_paths(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare("SELECT name, store_path FROM main.topology ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Where a topology's own database lives, next to the main database
    fn store_path_for(&self, name: &str) -> String {
        match &self.path {
            Some(path) => {
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("topostore");
                let safe: String = name
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
                    .collect();
                path.with_file_name(format!("{}.{}.topo.db", stem, safe))
                    .to_string_lossy()
                    .into_owned()
            }
            None => IN_MEMORY.to_string(),
        }
    }

    fn attach(&self, name: &str, store_path: &str) -> Result<()> {
        let sql = format!("ATTACH DATABASE ?1 AS {}", quote_ident(name));
        self.conn.execute(&sql, [store_path]).map_err(|e| Error::execution(&sql, e))?;
        tracing::debug!("Attached topology '{}' from {}", name, store_path);
        Ok(())
    }

    fn is_attached(&self, name: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM pragma_database_list WHERE name = ?1", [name], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    // ========== Layer Operations ==========

    /// Register a feature layer whose relation rows live in `topo`
    pub fn add_layer(&self, topo: &Topology, spec: &LayerSpec) -> Result<Layer> {
        if !(1..=4).contains(&spec.feature_type) {
            return Err(Error::InvalidInput(format!("invalid feature type {}", spec.feature_type)));
        }
        let level = match spec.child_id {
            None => 0,
            Some(child) => {
                let child_level: Option<i64> = self
                    .conn
                    .query_row(
                        "SELECT level FROM main.layer WHERE topology_id = ?1 AND layer_id = ?2",
                        params![topo.id, child],
                        |row| row.get(0),
                    )
                    .optional()?;
                child_level.ok_or_else(|| Error::InvalidInput(format!("child layer {} does not exist", child)))? + 1
            }
        };
        let layer_id: i64 = self.conn.query_row(
            "SELECT coalesce(max(layer_id), 0) + 1 FROM main.layer WHERE topology_id = ?1",
            [topo.id],
            |row| row.get(0),
        )?;
        self.conn.execute(
            r#"
            INSERT INTO main.layer (topology_id, layer_id, schema_name, table_name, feature_column, feature_type, level, child_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                topo.id,
                layer_id,
                spec.schema_name,
                spec.table_name,
                spec.feature_column,
                spec.feature_type,
                level,
                spec.child_id,
            ],
        )?;
        Ok(Layer {
            topology_id: topo.id,
            layer_id,
            schema_name: spec.schema_name.clone(),
            table_name: spec.table_name.clone(),
            feature_column: spec.feature_column.clone(),
            feature_type: spec.feature_type,
            level,
            child_id: spec.child_id,
        })
    }

    /// Layers registered for a topology
    pub fn layers(&self, topo: &Topology) -> Result<Vec<Layer>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT topology_id, layer_id, schema_name, table_name, feature_column, feature_type, level, child_id
            FROM main.layer WHERE topology_id = ?1 ORDER BY layer_id
            "#,
        )?;
        let layers = stmt
            .query_map([topo.id], |row| self.row_to_layer(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(layers)
    }

    fn row_to_layer(&self, row: &rusqlite::Row) -> rusqlite::Result<Layer> {
        Ok(Layer {
            topology_id: row.get(0)?,
            layer_id: row.get(1)?,
            schema_name: row.get(2)?,
            table_name: row.get(3)?,
            feature_column: row.get(4)?,
            feature_type: row.get(5)?,
            level: row.get(6)?,
            child_id: row.get(7)?,
        })
    }

    // ========== Statistics ==========

    fn count(&self, topo: &Topology, table: &str, filter: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}{}", topo.table(table), filter);
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Element counts of a topology
    pub fn stats(&self, topo: &Topology) -> Result<TopologyStats> {
        Ok(TopologyStats {
            topology: topo.name.clone(),
            nodes: self.count(topo, "node", "")?,
            edges: self.count(topo, "edge_data", "")?,
            faces: self.count(topo, "face", " WHERE face_id <> 0")?,
            relations: self.count(topo, "relation", "")?,
            layers: self.layers(topo)?.len(),
        })
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("topology name must not be empty".to_string()));
    }
    if name.eq_ignore_ascii_case("main") || name.eq_ignore_ascii_case("temp") {
        return Err(Error::InvalidInput(format!("'{}' is a reserved schema name", name)));
    }
    Ok(())
}

/// Description of a feature layer to register
#[derive(Debug, Clone)]
pub struct LayerSpec {
    pub schema_name: String,
    pub table_name: String,
    pub feature_column: String,
    /// 1 puntal, 2 lineal, 3 areal, 4 collection
    pub feature_type: i64,
    /// Layer this one is built from; `None` for a base layer
    pub child_id: Option<i64>,
}

impl LayerSpec {
    pub fn new(schema_name: &str, table_name: &str, feature_column: &str, feature_type: i64) -> Self {
        Self {
            schema_name: schema_name.to_string(),
            table_name: table_name.to_string(),
            feature_column: feature_column.to_string(),
            feature_type,
            child_id: None,
        }
    }

    pub fn with_child(mut self, child_id: i64) -> Self {
        self.child_id = Some(child_id);
        self
    }
}

/// A registered feature layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    pub topology_id: i64,
    pub layer_id: i64,
    pub schema_name: String,
    pub table_name: String,
    pub feature_column: String,
    pub feature_type: i64,
    /// 0 for layers built directly from topology elements
    pub level: i64,
    pub child_id: Option<i64>,
}

/// Element counts of one topology
#[derive(Debug, Clone, Serialize)]
pub struct TopologyStats {
    pub topology: String,
    pub nodes: usize,
    pub edges: usize,
    /// Bounded faces; the universe face is not counted
    pub faces: usize,
    pub relations: usize,
    pub layers: usize,
}

impl std::fmt::Display for TopologyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Topology '{}':", self.topology)?;
        writeln!(f, "  Nodes: {}", self.nodes)?;
        writeln!(f, "  Edges: {}", self.edges)?;
        writeln!(f, "  Faces: {}", self.faces)?;
        writeln!(f, "  Relations: {}", self.relations)?;
        write!(f, "  Layers: {}", self.layers)
    }
}
