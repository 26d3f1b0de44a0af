use std::path::{Path, PathBuf};

use async_trait::async_trait;
use swarmboard_core::{CoreResult, ScenarioDefinition, ScenarioPublisher};
use tracing::info;

/// Publishes scenario definitions as a JSON file read by the engine at launch.
#[derive(Debug, Clone)]
pub struct ScenarioFile {
    path: PathBuf,
}

impl ScenarioFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ScenarioPublisher for ScenarioFile {
    async fn publish(&self, definition: &ScenarioDefinition) -> CoreResult<()> {
        let contents = definition.to_json_pretty()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so the engine never reads a half-written file.
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, contents).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        info!(
            path = %self.path.display(),
            steps = definition.scenarios.len(),
            "scenario definition published"
        );
        Ok(())
    }
}
