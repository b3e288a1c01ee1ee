//! Configuration system for the swarm coordination and workflow engine.
//!
//! Every tunable named in the external interface (voting thresholds, retry
//! policy, pattern store TTL, scheduler timezone, ...) lives on `HiveConfig`
//! and loads from TOML the way the rest of this codebase loads its settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::voting::types::TieBreaker;
use crate::{CoreError, Result};

/// Top-level configuration for the coordination and workflow core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiveConfig {
    #[serde(default)]
    pub voting: VotingConfig,

    #[serde(default)]
    pub queen: QueenConfig,

    #[serde(default)]
    pub swarm: SwarmConfig,

    #[serde(default)]
    pub pattern_store: PatternStoreConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Default voting rules applied when a topic doesn't override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingConfig {
    /// Fraction of cast weight an option needs to win (0.0-1.0).
    pub majority_threshold: f64,

    /// Whether a quorum of eligible voters is required before a result is legitimate.
    pub quorum_required: bool,

    /// Fraction of eligible voters that must cast a vote to meet quorum.
    pub quorum_fraction: f64,

    /// Policy used to resolve a tie between leading options.
    pub tie_breaker: TieBreaker,

    /// How long a voting round stays open before `sweep_timeouts` may close it.
    #[serde(with = "crate::utils::serde_duration")]
    pub voting_timeout: Duration,

    /// Whether votes are weighted by the voter's capability proficiency.
    pub weighted_voting: bool,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            majority_threshold: 0.5,
            quorum_required: true,
            quorum_fraction: 0.5,
            tie_breaker: TieBreaker::Queen,
            voting_timeout: Duration::from_secs(30),
            weighted_voting: false,
        }
    }
}

/// Knobs controlling the Queen Coordinator's decision-making.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueenConfig {
    /// Minimum agreement strength above which a decision executes without human review.
    pub auto_execution_threshold: f64,

    /// How long the Queen waits for agent recommendations before tallying.
    #[serde(with = "crate::utils::serde_duration")]
    pub fan_out_timeout: Duration,
}

impl Default for QueenConfig {
    fn default() -> Self {
        Self {
            auto_execution_threshold: 0.7,
            fan_out_timeout: Duration::from_secs(30),
        }
    }
}

/// Limits on a swarm's composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Maximum number of agents a single swarm/group may contain.
    pub max_agents_per_swarm: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_agents_per_swarm: 10,
        }
    }
}

/// Pattern store retention and matching knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternStoreConfig {
    /// Days after which an unused pattern becomes eligible for pruning.
    pub pattern_ttl_days: i64,

    /// Minimum similarity score (0.0-1.0) for a stored pattern to be considered a match.
    pub similarity_threshold: f64,

    /// Half-life, in days, used by the recency term of the confidence formula.
    pub recency_half_life_days: i64,
}

impl Default for PatternStoreConfig {
    fn default() -> Self {
        Self {
            pattern_ttl_days: 90,
            similarity_threshold: 0.7,
            recency_half_life_days: 30,
        }
    }
}

/// Workflow interpreter retry and compensation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Default maximum retry attempts for a step whose policy doesn't override it.
    pub max_retries: u32,

    /// Delay between retry attempts.
    #[serde(with = "crate::utils::serde_duration")]
    pub retry_delay: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1_000),
        }
    }
}

/// Scheduler defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA timezone name used to interpret cron expressions (e.g. "UTC", "America/New_York").
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            voting: VotingConfig::default(),
            queen: QueenConfig::default(),
            swarm: SwarmConfig::default(),
            pattern_store: PatternStoreConfig::default(),
            workflow: WorkflowConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Load configuration from a TOML file.
pub async fn load_config(path: &Path) -> Result<HiveConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::configuration_error("file", e.to_string()))?;

    let config: HiveConfig = toml::from_str(&content)
        .map_err(|e| CoreError::configuration_error("content", e.to_string()))?;

    Ok(config)
}

/// Save configuration to a TOML file, creating parent directories as needed.
pub async fn save_config(config: &HiveConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::configuration_error("directory", e.to_string()))?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| CoreError::configuration_error("serialization", e.to_string()))?;

    tokio::fs::write(path, content)
        .await
        .map_err(|e| CoreError::configuration_error("file", e.to_string()))?;

    Ok(())
}

/// Standard config file locations, checked in order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("hive.toml"));

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("hive").join("config.toml"));
    }

    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".hive").join("config.toml"));
    }

    paths
}

/// Load configuration from the first standard location that exists, or defaults.
pub async fn load_config_from_standard_locations() -> Result<HiveConfig> {
    for path in config_paths() {
        if path.exists() {
            return load_config(&path).await;
        }
    }

    Ok(HiveConfig::default())
}

impl HiveConfig {
    pub async fn load() -> Result<Self> {
        load_config_from_standard_locations().await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        load_config(path).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        save_config(self, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = HiveConfig::default();
        assert_eq!(config.voting.majority_threshold, 0.5);
        assert!(config.voting.quorum_required);
        assert_eq!(config.queen.auto_execution_threshold, 0.7);
        assert_eq!(config.swarm.max_agents_per_swarm, 10);
        assert_eq!(config.pattern_store.pattern_ttl_days, 90);
        assert_eq!(config.pattern_store.similarity_threshold, 0.7);
        assert_eq!(config.voting.voting_timeout, std::time::Duration::from_secs(30));
        assert_eq!(config.scheduler.timezone, "UTC");
    }

    #[test]
    fn round_trips_through_toml() {
        let config = HiveConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[voting]"));
        assert!(toml.contains("[queen]"));
        assert!(toml.contains("[scheduler]"));

        let parsed: HiveConfig = toml::from_str(&toml).unwrap();
        assert_eq!(
            parsed.voting.majority_threshold,
            config.voting.majority_threshold
        );
    }

    #[tokio::test]
    async fn loads_and_saves_roundtrip() {
        let dir = std::env::temp_dir().join(format!("hive-config-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("hive.toml");

        let mut config = HiveConfig::default();
        config.scheduler.timezone = "America/New_York".to_string();
        config.save_to(&path).await.unwrap();

        let loaded = HiveConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded.scheduler.timezone, "America/New_York");

        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
