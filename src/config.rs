//! Agency Configuration
//!
//! A JSON file on disk (written with defaults on first run), overlaid with
//! `DEV_AGENCY_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const CONFIG_PATH_ENV: &str = "DEV_AGENCY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "orchestrator.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Ollama,
    #[serde(alias = "openai")]
    OpenAiCompatible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Ollama host URL, or the OpenAI-compatible base URL (e.g. vLLM)
    pub base_url: String,
    /// Only used by Ollama
    pub port: u16,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub cache_responses: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Ollama,
            base_url: "http://localhost".to_string(),
            port: 11434,
            api_key: None,
            temperature: 0.2,
            cache_responses: true,
        }
    }
}

/// Who the agents work for; folded into every system prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamProfile {
    pub name: String,
    pub mission: String,
    pub conventions: Vec<String>,
}

impl Default for TeamProfile {
    fn default() -> Self {
        Self {
            name: "Dev Agency".to_string(),
            mission: "Resolve incoming bug tickets with minimal, reviewable changes.".to_string(),
            conventions: vec![
                "keep patches small".to_string(),
                "do not touch files outside the ticket".to_string(),
                "add a regression test for every fix".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub provider: ProviderConfig,
    pub profile: TeamProfile,
    pub developer_model: Option<String>,
    pub reviewer_model: Option<String>,
    /// Root the ticket's affected_files are resolved against
    pub workspace_root: PathBuf,
    pub inbox_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub queue_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub max_concurrency: usize,
    pub max_attempts: u32,
    pub max_revisions: u32,
    pub review_enabled: bool,
    /// Per-file byte budget for source excerpts in developer prompts
    pub file_context_bytes: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            profile: TeamProfile::default(),
            developer_model: None,
            reviewer_model: None,
            workspace_root: PathBuf::from("."),
            inbox_dir: PathBuf::from("tickets/inbox"),
            reports_dir: PathBuf::from("tickets/reports"),
            queue_path: PathBuf::from("orchestrator.db"),
            log_dir: None,
            poll_interval_ms: 2000,
            max_concurrency: 2,
            max_attempts: 3,
            max_revisions: 2,
            review_enabled: true,
            file_context_bytes: 16 * 1024,
            shutdown_grace_secs: 30,
        }
    }
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Overlay `DEV_AGENCY_*` values from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(kind) = lookup("DEV_AGENCY_PROVIDER") {
            match kind.to_lowercase().as_str() {
                "ollama" => self.provider.kind = ProviderKind::Ollama,
                "openai" | "open_ai_compatible" => self.provider.kind = ProviderKind::OpenAiCompatible,
                other => tracing::warn!("Ignoring unknown DEV_AGENCY_PROVIDER '{}'", other),
            }
        }
        if let Some(url) = lookup("DEV_AGENCY_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(key) = lookup("DEV_AGENCY_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = lookup("DEV_AGENCY_DEVELOPER_MODEL") {
            self.developer_model = Some(model);
        }
        if let Some(model) = lookup("DEV_AGENCY_REVIEWER_MODEL") {
            self.reviewer_model = Some(model);
        }
        if let Some(n) = lookup("DEV_AGENCY_MAX_CONCURRENCY") {
            match n.parse::<usize>() {
                Ok(n) if n > 0 => self.max_concurrency = n,
                _ => tracing::warn!("Ignoring invalid DEV_AGENCY_MAX_CONCURRENCY '{}'", n),
            }
        }
        if let Some(dir) = lookup("DEV_AGENCY_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
    }
}

pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses `DEV_AGENCY_CONFIG` when set, `orchestrator.json` otherwise
    pub fn from_env() -> Self {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<OrchestratorConfig> {
        if !self.path.exists() {
            let default = OrchestratorConfig::default();
            self.save(&default).await?;
            return Ok(default);
        }
        let content = fs::read_to_string(&self.path).await
            .with_context(|| format!("Failed to read config file {}", self.path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", self.path.display()))?;
        Ok(config)
    }

    pub async fn save(&self, config: &OrchestratorConfig) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content).await
            .context("Failed to write config file")?;
        Ok(())
    }

    /// Load the file, then overlay the environment
    pub async fn load_with_env(&self) -> Result<OrchestratorConfig> {
        let mut config = self.load().await?;
        config.apply_env();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("orchestrator.json"));

        let mut config = OrchestratorConfig::default();
        config.max_revisions = 5;
        config.provider.kind = ProviderKind::OpenAiCompatible;
        manager.save(&config).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_config_load_writes_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("orchestrator.json");
        let manager = ConfigManager::new(path.clone());

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded, OrchestratorConfig::default());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_partial_config_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orchestrator.json");
        tokio::fs::write(&path, r#"{"max_concurrency": 7, "provider": {"kind": "openai"}}"#).await.unwrap();

        let loaded = ConfigManager::new(path).load().await.unwrap();
        assert_eq!(loaded.max_concurrency, 7);
        assert_eq!(loaded.provider.kind, ProviderKind::OpenAiCompatible);
        assert_eq!(loaded.provider.port, 11434);
        assert_eq!(loaded.max_revisions, 2);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DEV_AGENCY_PROVIDER", "openai"),
            ("DEV_AGENCY_BASE_URL", "http://127.0.0.1:8000/v1"),
            ("DEV_AGENCY_DEVELOPER_MODEL", "qwen2.5-coder:14b"),
            ("DEV_AGENCY_MAX_CONCURRENCY", "zero"),
        ]);
        let mut config = OrchestratorConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.provider.kind, ProviderKind::OpenAiCompatible);
        assert_eq!(config.provider.base_url, "http://127.0.0.1:8000/v1");
        assert_eq!(config.developer_model.as_deref(), Some("qwen2.5-coder:14b"));
        // invalid values are ignored
        assert_eq!(config.max_concurrency, 2);
    }
}
