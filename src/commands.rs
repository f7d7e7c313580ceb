use crate::{OutputMode, emit_success};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use topostore::backend::{FetchLimit, TopologyBackend};
use topostore::config::{self, TopoConfig};
use topostore::storage::{LayerSpec, SqliteBackend};
use topostore::ui::{self, banner, edge_table, info, layer_table, section, stats_table, success, topology_table, Icons};
use topostore::{EdgeFields, Point};

/// Resolved settings shared by every command
pub struct Context {
    pub output: OutputMode,
    pub database: PathBuf,
    pub topology: Option<String>,
    pub config: TopoConfig,
}

impl Context {
    fn open(&self) -> anyhow::Result<SqliteBackend> {
        config::ensure_db_dir(&self.database)?;
        Ok(SqliteBackend::open(&self.database)?)
    }

    fn topology_name(&self) -> anyhow::Result<&str> {
        self.topology
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no topology given (use --topology or set it in topostore.toml)"))
    }
}

pub fn run_version(output_mode: OutputMode) -> anyhow::Result<()> {
    if output_mode.is_human() {
        banner(
            &format!("{}", "Topostore".bold().style(ui::theme().info.clone())),
            &format!("Version {}", env!("CARGO_PKG_VERSION").bold()),
        );
    } else {
        let data = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
        });
        emit_success(output_mode, "version", data)?;
    }
    Ok(())
}

pub fn run_init(output_mode: OutputMode, config_path: &Path, database: Option<PathBuf>, topology: Option<String>, force: bool) -> anyhow::Result<()> {
    let base = std::env::current_dir()?;
    let database = database.unwrap_or_else(|| config::default_database_path_in(&base));
    let cfg = TopoConfig {
        database: Some(database.to_string_lossy().into_owned()),
        topology,
        ..TopoConfig::default()
    };
    config::write_config(config_path, &cfg, force)?;
    config::ensure_db_dir(&database)?;
    SqliteBackend::open(&database)?;

    if output_mode.is_human() {
        success(&format!("Wrote {}", config_path.display()));
        info("Database", &database.display().to_string());
    } else {
        emit_success(output_mode, "init", serde_json::json!({
            "config": config_path,
            "database": database,
        }))?;
    }
    Ok(())
}

pub fn run_create(ctx: &Context, name: &str, srid: Option<i32>, precision: f64) -> anyhow::Result<()> {
    let backend = ctx.open()?;
    let srid = srid.or(ctx.config.srid).unwrap_or(topostore::geometry::SRID_UNKNOWN);
    let topo = backend.create_topology(name, srid, precision)?;
    if ctx.output.is_human() {
        success(&format!("Created topology '{}' (id {}, srid {})", topo.name, topo.id, topo.srid));
    } else {
        emit_success(ctx.output, "create", serde_json::to_value(&topo)?)?;
    }
    Ok(())
}

pub fn run_list(ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.open()?;
    let topologies = backend.list_topologies()?;
    if !ctx.output.is_human() {
        return emit_success(ctx.output, "list", serde_json::to_value(&topologies)?);
    }
    if topologies.is_empty() {
        ui::warn("No topologies registered");
    } else {
        println!("{}", topology_table(&topologies));
    }
    Ok(())
}

pub fn run_stats(ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.open()?;
    let topo = backend.load_topology(ctx.topology_name()?)?;
    let stats = backend.stats(&topo)?;
    if ctx.output.is_human() {
        section(&format!(" {} {} ", Icons::STATS, topo.name));
        println!("{}", stats_table(&stats));
    } else {
        emit_success(ctx.output, "stats", serde_json::to_value(&stats)?)?;
    }
    Ok(())
}

pub fn run_layers(ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.open()?;
    let topo = backend.load_topology(ctx.topology_name()?)?;
    let layers = backend.layers(&topo)?;
    if !ctx.output.is_human() {
        return emit_success(ctx.output, "layers", serde_json::to_value(&layers)?);
    }
    if layers.is_empty() {
        ui::warn(&format!("No layers registered for '{}'", topo.name));
    } else {
        println!("{}", layer_table(&layers));
    }
    Ok(())
}

/// `target` is `schema.table.column`
pub fn run_add_layer(ctx: &Context, target: &str, feature_type: i64, child: Option<i64>) -> anyhow::Result<()> {
    let parts: Vec<&str> = target.split('.').collect();
    let [schema, table, column] = parts.as_slice() else {
        anyhow::bail!("layer target must be schema.table.column, got '{}'", target);
    };
    let mut spec = LayerSpec::new(schema, table, column, feature_type);
    if let Some(child) = child {
        spec = spec.with_child(child);
    }

    let backend = ctx.open()?;
    let topo = backend.load_topology(ctx.topology_name()?)?;
    let layer = backend.add_layer(&topo, &spec)?;
    if ctx.output.is_human() {
        success(&format!("{} Layer {} registered at level {}", Icons::LAYER, layer.layer_id, layer.level));
    } else {
        emit_success(ctx.output, "add-layer", serde_json::to_value(&layer)?)?;
    }
    Ok(())
}

pub fn run_edges(ctx: &Context, ids: &[i64]) -> anyhow::Result<()> {
    let backend = ctx.open()?;
    let mut store = backend.open_topology(ctx.topology_name()?)?;
    let edges = store.get_edges_by_id(ids, EdgeFields::all())?;
    if ctx.output.is_human() {
        println!("{}", edge_table(&edges));
    } else {
        emit_success(ctx.output, "edges", serde_json::to_value(&edges)?)?;
    }
    Ok(())
}

pub fn run_ring(ctx: &Context, edge: i64, limit: Option<usize>) -> anyhow::Result<()> {
    let backend = ctx.open()?;
    let mut store = backend.open_topology(ctx.topology_name()?)?;
    let ring = store.get_ring_edges(edge, limit.or(ctx.config.ring_limit))?;
    if ctx.output.is_human() {
        let path: Vec<String> = ring.iter().map(|id| id.style(ui::theme().id.clone()).to_string()).collect();
        info(&format!("{} Ring of {}", Icons::RING, edge), &path.join(" → "));
    } else {
        emit_success(ctx.output, "ring", serde_json::json!({ "edge": edge, "ring": ring }))?;
    }
    Ok(())
}

pub fn run_face_at(ctx: &Context, x: f64, y: f64) -> anyhow::Result<()> {
    let backend = ctx.open()?;
    let mut store = backend.open_topology(ctx.topology_name()?)?;
    let point = Point::new(x, y).with_srid(store.topology().srid);
    let face = store.get_face_containing_point(&point)?;
    if ctx.output.is_human() {
        match face {
            Some(id) => info(&format!("{} Face at ({}, {})", Icons::FACE, x, y), &id.to_string()),
            None => ui::warn(&format!("({}, {}) lies on an edge or node, or in no face", x, y)),
        }
    } else {
        emit_success(ctx.output, "face-at", serde_json::json!({ "x": x, "y": y, "face": face }))?;
    }
    Ok(())
}

pub fn run_edges_near(ctx: &Context, x: f64, y: f64, distance: f64, limit: usize) -> anyhow::Result<()> {
    let backend = ctx.open()?;
    let mut store = backend.open_topology(ctx.topology_name()?)?;
    let point = Point::new(x, y).with_srid(store.topology().srid);
    let edges = store
        .get_edge_within_distance(&point, distance, EdgeFields::all(), FetchLimit::First(limit))?
        .into_rows();
    if ctx.output.is_human() {
        section(&format!(" {} Edges within {} of ({}, {}) ", Icons::PIN, distance, x, y));
        println!("{}", edge_table(&edges));
    } else {
        emit_success(ctx.output, "edges-near", serde_json::to_value(&edges)?)?;
    }
    Ok(())
}
