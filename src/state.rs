use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{ProgressCallback, Realization, RealizedResource, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// Resources realized for one stack, persisted between runs
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RealizedState {
    /// Stack the resources belong to
    pub stack: String,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,

    /// Descriptors whose last realization failed (id, error message)
    #[serde(default)]
    pub failed: Vec<(String, String)>,

    /// Realized resources keyed by descriptor id
    #[serde(default)]
    pub resources: BTreeMap<String, RealizedResource>,
}

// ============================================================================
// RealizedState Implementation
// ============================================================================

impl RealizedState {
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            last_updated: Utc::now(),
            failed: Vec::new(),
            resources: BTreeMap::new(),
        }
    }

    /// Default state file of `stack`
    pub fn default_path(stack: &str) -> Result<PathBuf> {
        crate::paths::state_file(stack)
    }

    /// Load state from `path`, or return empty state if the file doesn't exist
    pub fn load(path: &Path, stack: &str) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using empty state");
            return Ok(Self::new(stack));
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: RealizedState = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize state to TOML")?;

        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Record a realized resource, clearing any earlier failure
    pub fn mark_realized(&mut self, resource: &RealizedResource) {
        self.failed.retain(|(id, _)| id != &resource.id);
        self.resources.insert(resource.id.clone(), resource.clone());
        self.last_updated = Utc::now();
    }

    /// Record a failed realization
    pub fn mark_failed(&mut self, id: &str, error: &str) {
        self.failed.retain(|(failed, _)| failed != id);
        self.failed.push((id.to_string(), error.to_string()));
        self.last_updated = Utc::now();
    }

    pub fn get(&self, id: &str) -> Option<&RealizedResource> {
        self.resources.get(id)
    }

    /// Recorded resources as a [`Realization`], e.g. to re-collect outputs
    pub fn realization(&self) -> Realization {
        self.resources.values().cloned().collect()
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// [`ProgressCallback`] that persists state after every realized resource
///
/// Resources realized before a failure or interruption stay recorded.
/// Write errors do not abort the run; the first one is returned by
/// [`StateRecorder::finish`].
pub struct StateRecorder {
    path: PathBuf,
    state: RealizedState,
    save_error: Option<anyhow::Error>,
}

impl StateRecorder {
    /// Start recording into `path`, keeping whatever it already holds
    pub fn open(path: impl Into<PathBuf>, stack: &str) -> Result<Self> {
        let path = path.into();
        let state = RealizedState::load(&path, stack)?;
        Ok(Self {
            path,
            state,
            save_error: None,
        })
    }

    pub fn state(&self) -> &RealizedState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop recording and return the final state
    pub fn finish(self) -> Result<RealizedState> {
        match self.save_error {
            Some(e) => Err(e),
            None => Ok(self.state),
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.state.save(&self.path) {
            log::warn!("Could not record state: {e:#}");
            self.save_error.get_or_insert(e);
        }
    }
}

impl ProgressCallback for StateRecorder {
    fn on_start(&mut self, total: usize) {
        log::debug!(
            "Recording {total} resources of '{}' to {}",
            self.state.stack,
            self.path.display()
        );
    }

    fn on_realizing(&mut self, _id: &str, _kind: ResourceKind) {}

    fn on_realized(&mut self, resource: &RealizedResource) {
        self.state.mark_realized(resource);
        self.persist();
    }

    fn on_failed(&mut self, id: &str, error: &str) {
        self.state.mark_failed(id, error);
        self.persist();
    }
}
