use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings read from `topostore.toml`; command-line flags take precedence
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TopoConfig {
    pub database: Option<String>,
    /// Topology used when a command does not name one
    pub topology: Option<String>,
    /// SRID given to topologies created without an explicit one
    pub srid: Option<i32>,
    /// Upper bound on edges walked by `ring` when none is given
    pub ring_limit: Option<usize>,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("topostore.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".topostore").join("topostore.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<TopoConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: TopoConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &TopoConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_write_then_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topostore.toml");
        let config = TopoConfig {
            database: Some("maps.db".to_string()),
            topology: Some("city".to_string()),
            srid: Some(3857),
            ring_limit: None,
        };
        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.topology.as_deref(), Some("city"));
        assert_eq!(loaded.srid, Some(3857));
        assert_eq!(loaded.ring_limit, None);
    }

    #[test]
    fn test_ensure_db_dir_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let db = default_database_path_in(dir.path());
        ensure_db_dir(&db).unwrap();
        assert!(dir.path().join(".topostore").is_dir());
    }
}
