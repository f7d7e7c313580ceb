//! Topostore CLI - inspect and maintain topologies stored in SQLite

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use topostore::config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "topostore")]
#[command(version)]
#[command(about = "Relational storage for editable planar topologies")]
#[command(long_about = r#"
Topostore keeps the nodes, edges and faces of planar topologies in SQLite,
together with the feature layers referencing them.

Example usage:
  topostore init --topology city
  topostore create city --srid 3857
  topostore ring 12 --limit 100
  topostore face-at 10.5 3.25
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Topology to operate on (overrides the config)
    #[arg(short, long, global = true)]
    topology: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a topostore.toml and create the database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Create a new topology
    Create {
        /// Topology name
        name: String,

        /// Spatial reference id of the topology's geometries
        #[arg(long)]
        srid: Option<i32>,

        /// Snapping tolerance
        #[arg(long, default_value = "0")]
        precision: f64,
    },

    /// List registered topologies
    List,

    /// Show element counts of a topology
    Stats,

    /// List the feature layers of a topology
    Layers,

    /// Register a feature layer
    AddLayer {
        /// Feature column as schema.table.column
        target: String,

        /// 1 puntal, 2 lineal, 3 areal, 4 collection
        #[arg(long = "type", default_value = "2")]
        feature_type: i64,

        /// Layer this hierarchical layer is built from
        #[arg(long)]
        child: Option<i64>,
    },

    /// Show edges by identifier
    Edges {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Walk the ring a signed edge belongs to
    Ring {
        /// Signed edge id; negative walks the right side
        #[arg(allow_hyphen_values = true)]
        edge: i64,

        /// Maximum number of edges to visit
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Find the face containing a point
    FaceAt {
        #[arg(allow_hyphen_values = true)]
        x: f64,
        #[arg(allow_hyphen_values = true)]
        y: f64,
    },

    /// Find edges close to a point
    EdgesNear {
        #[arg(allow_hyphen_values = true)]
        x: f64,
        #[arg(allow_hyphen_values = true)]
        y: f64,

        /// Search radius; 0 finds edges passing through the point
        #[arg(long, default_value = "0")]
        distance: f64,

        /// Maximum number of results (0 for all)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Print version information
    Version,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(self) -> bool {
        self == OutputMode::Human
    }
}

pub fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if output_mode.is_human() {
        return Ok(());
    }
    let envelope = serde_json::json!({
        "ok": true,
        "command": command,
        "data": data,
    });
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn emit_error(output_mode: OutputMode, command: &str, err: &anyhow::Error) {
    if output_mode.is_human() {
        topostore::ui::error(&format!("{:#}", err));
        return;
    }
    let envelope = serde_json::json!({
        "ok": false,
        "command": command,
        "error": format!("{:#}", err),
    });
    println!("{}", envelope);
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Init { .. } => "init",
        Commands::Create { .. } => "create",
        Commands::List => "list",
        Commands::Stats => "stats",
        Commands::Layers => "layers",
        Commands::AddLayer { .. } => "add-layer",
        Commands::Edges { .. } => "edges",
        Commands::Ring { .. } => "ring",
        Commands::FaceAt { .. } => "face-at",
        Commands::EdgesNear { .. } => "edges-near",
        Commands::Version => "version",
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over the verbosity flag
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = if cli.json { OutputMode::Json } else { OutputMode::Human };
    let name = command_name(&cli.command);
    if let Err(err) = run(cli, output_mode) {
        emit_error(output_mode, name, &err);
        std::process::exit(1);
    }
}

fn run(cli: Cli, output_mode: OutputMode) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);

    if let Commands::Init { force } = cli.command {
        return commands::run_init(output_mode, &config_path, cli.database, cli.topology, force);
    }
    if let Commands::Version = cli.command {
        return commands::run_version(output_mode);
    }

    let cfg = config::load_config(Some(&config_path))?.unwrap_or_default();
    let database = cli
        .database
        .or_else(|| cfg.database.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("topostore.db"));
    tracing::debug!("Using database {}", database.display());
    let ctx = commands::Context {
        output: output_mode,
        database,
        topology: cli.topology.or_else(|| cfg.topology.clone()),
        config: cfg,
    };

    match cli.command {
        Commands::Create { name, srid, precision } => commands::run_create(&ctx, &name, srid, precision),
        Commands::List => commands::run_list(&ctx),
        Commands::Stats => commands::run_stats(&ctx),
        Commands::Layers => commands::run_layers(&ctx),
        Commands::AddLayer { target, feature_type, child } => commands::run_add_layer(&ctx, &target, feature_type, child),
        Commands::Edges { ids } => commands::run_edges(&ctx, &ids),
        Commands::Ring { edge, limit } => commands::run_ring(&ctx, edge, limit),
        Commands::FaceAt { x, y } => commands::run_face_at(&ctx, x, y),
        Commands::EdgesNear { x, y, distance, limit } => commands::run_edges_near(&ctx, x, y, distance, limit),
        Commands::Init { .. } | Commands::Version => Ok(()),
    }
}
