//! Reference data for the Usage Metrics model
//!
//! Two static inputs feed every run: the workspace catalogue
//! (`workspaces.json`, name → workspace/dataset ids) and the system context
//! describing the tables, measures and relationships of the dataset
//! (`context.txt`). Both are loaded once, shared read-only across runs and
//! reloaded when older than the configured TTL.

use crate::error::{InsightError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Workspace entry as it appears in the catalogue file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub workspace_id: String,
    pub dataset_id: String,
}

/// Identifiers scoping a query to one Power BI dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub workspace_id: String,
    pub dataset_id: String,
}

impl DatasetMetadata {
    pub fn new(workspace_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            dataset_id: dataset_id.into(),
        }
    }
}

impl From<&WorkspaceInfo> for DatasetMetadata {
    fn from(info: &WorkspaceInfo) -> Self {
        Self::new(info.workspace_id.clone(), info.dataset_id.clone())
    }
}

/// Where reference data is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSource {
    pub workspaces_file: PathBuf,
    pub context_file: PathBuf,
}

impl ReferenceSource {
    pub fn new(workspaces_file: impl Into<PathBuf>, context_file: impl Into<PathBuf>) -> Self {
        Self {
            workspaces_file: workspaces_file.into(),
            context_file: context_file.into(),
        }
    }
}

/// A loaded snapshot of the reference files
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub workspaces: BTreeMap<String, WorkspaceInfo>,
    pub system_context: String,
    loaded_at: Instant,
}

impl ReferenceData {
    pub fn load(source: &ReferenceSource) -> Result<Self> {
        let workspaces = load_workspaces(&source.workspaces_file)?;
        let system_context = load_system_context(&source.context_file)?;
        info!(
            "Loaded {} workspaces and {} bytes of system context",
            workspaces.len(),
            system_context.len()
        );

        Ok(Self {
            workspaces,
            system_context,
            loaded_at: Instant::now(),
        })
    }

    pub fn workspace_names(&self) -> Vec<&str> {
        self.workspaces.keys().map(|k| k.as_str()).collect()
    }

    pub fn dataset(&self, workspace_name: &str) -> Result<DatasetMetadata> {
        self.workspaces
            .get(workspace_name)
            .map(DatasetMetadata::from)
            .ok_or_else(|| {
                InsightError::Metadata(format!(
                    "Unknown workspace '{}'. Known workspaces: {}",
                    workspace_name,
                    self.workspace_names().join(", ")
                ))
            })
    }

    pub fn age(&self) -> Duration {
        self.loaded_at.elapsed()
    }
}

fn load_workspaces(path: &Path) -> Result<BTreeMap<String, WorkspaceInfo>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        InsightError::Metadata(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let workspaces: BTreeMap<String, WorkspaceInfo> = serde_json::from_str(&content)
        .map_err(|e| InsightError::Metadata(format!("Failed to parse {}: {}", path.display(), e)))?;

    if workspaces.is_empty() {
        return Err(InsightError::Metadata(format!(
            "{} does not list any workspaces",
            path.display()
        )));
    }
    Ok(workspaces)
}

fn load_system_context(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| InsightError::Metadata(format!("Failed to read {}: {}", path.display(), e)))
}

/// Time-bounded cache over [`ReferenceData`]
///
/// Runs only ever receive an `Arc` snapshot; a reload swaps the snapshot and
/// never touches one that a run already holds.
pub struct ReferenceCache {
    source: ReferenceSource,
    ttl: Duration,
    current: RwLock<Option<Arc<ReferenceData>>>,
}

impl ReferenceCache {
    pub fn new(source: ReferenceSource, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            current: RwLock::new(None),
        }
    }

    pub fn source(&self) -> &ReferenceSource {
        &self.source
    }

    /// Current snapshot, loading it first if absent or stale
    pub fn get(&self) -> Result<Arc<ReferenceData>> {
        {
            let guard = self
                .current
                .read()
                .map_err(|_| InsightError::Metadata("reference cache lock poisoned".to_string()))?;
            if let Some(ref data) = *guard {
                if data.age() < self.ttl {
                    return Ok(Arc::clone(data));
                }
                debug!("Reference data is {:?} old, reloading", data.age());
            }
        }
        self.reload()
    }

    /// Unconditionally re-read the reference files
    pub fn reload(&self) -> Result<Arc<ReferenceData>> {
        let fresh = Arc::new(ReferenceData::load(&self.source)?);
        let mut guard = self
            .current
            .write()
            .map_err(|_| InsightError::Metadata("reference cache lock poisoned".to_string()))?;
        *guard = Some(Arc::clone(&fresh));
        Ok(fresh)
    }
}

lazy_static::lazy_static! {
    static ref SHARED_CACHES: RwLock<Vec<Arc<ReferenceCache>>> = RwLock::new(Vec::new());
}

/// Process-wide cache for the given source, created on first use.
pub fn shared_cache(source: &ReferenceSource, ttl: Duration) -> Arc<ReferenceCache> {
    if let Ok(caches) = SHARED_CACHES.read() {
        if let Some(cache) = caches.iter().find(|c| c.source() == source && c.ttl == ttl) {
            return Arc::clone(cache);
        }
    }

    let cache = Arc::new(ReferenceCache::new(source.clone(), ttl));
    if let Ok(mut caches) = SHARED_CACHES.write() {
        // Another caller may have raced us here
        if let Some(existing) = caches.iter().find(|c| c.source() == source && c.ttl == ttl) {
            return Arc::clone(existing);
        }
        caches.push(Arc::clone(&cache));
    }
    cache
}
