/**
 * CONFIG KERNEL - Chargement de kernel.yaml
 *
 * RÔLE :
 * Adresse d'écoute, répertoire des snapshots d'inventaire et sources déclarées.
 * Chaque source reprend les clés camelCase de SourceConfig.
 *
 * FONCTIONNEMENT :
 * - Chemin via SYMBION_INVENTORY_CONFIG (défaut : kernel.yaml)
 * - Fichier absent ou vide → config par défaut (warning)
 * - YAML invalide → erreur remontée au démarrage
 */

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use symbion_inventory::config::SourceConfig;
use tokio::fs;
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "SYMBION_INVENTORY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "kernel.yaml";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub bind: String,
    pub snapshot_dir: PathBuf,
    pub sources: BTreeMap<String, SourceConfig>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            snapshot_dir: PathBuf::from("./inventory"),
            sources: BTreeMap::new(),
        }
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    serde_yaml::from_str(txt).context("invalid kernel configuration")
}

pub async fn load_config() -> Result<KernelConfig> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    load_config_from(Path::new(&path)).await
}

pub async fn load_config_from(path: &Path) -> Result<KernelConfig> {
    if !path.exists() {
        warn!(path = %path.display(), "no kernel configuration, using defaults");
        return Ok(KernelConfig::default());
    }
    let txt = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let config = parse_config(&txt).with_context(|| format!("parsing {}", path.display()))?;
    info!(path = %path.display(), sources = config.sources.len(), "kernel configuration loaded");
    Ok(config)
}
