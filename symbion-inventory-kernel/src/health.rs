/**
 * HEALTH KERNEL - Uptime, sources et mémoire
 *
 * RÔLE :
 * Alimente GET /system/health. Garde aussi la dernière erreur de fetch par
 * source, remontée par les handlers HTTP.
 */

use crate::sources::SourceRegistry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub started_at: String,
    pub sources_started: u32,
    pub sources_rejected: u32,
    pub nodes_cached: u64,
    pub memory_usage_mb: f32,
    pub last_errors: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    started_at: OffsetDateTime,
    last_errors: Arc<Mutex<BTreeMap<String, String>>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            started_at: OffsetDateTime::now_utc(),
            last_errors: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn record_error(&self, source: &str, message: String) {
        self.last_errors.lock().insert(source.to_string(), message);
    }

    pub fn clear_error(&self, source: &str) {
        self.last_errors.lock().remove(source);
    }

    pub fn get_health(&self, registry: &SourceRegistry) -> KernelHealth {
        let mut nodes_cached = 0u64;
        for source in registry.iter() {
            nodes_cached += source.status().node_count as u64;
        }

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            started_at: self.started_at.format(&Rfc3339).unwrap_or_default(),
            sources_started: registry.len() as u32,
            sources_rejected: registry.rejected().len() as u32,
            nodes_cached,
            memory_usage_mb: get_memory_usage_mb(),
            last_errors: self.last_errors.lock().clone(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }
    0.0
}
