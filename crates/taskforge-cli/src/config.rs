//! `taskforge.toml` configuration schema, following the per-section
//! `#[serde(default)]` convention the gateway config uses.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct TaskforgeConfig {
    pub project: ProjectConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub guardrail: GuardrailConfig,
    #[serde(default)]
    pub pool: PoolConfigSection,
    #[serde(default)]
    pub cache: CacheConfigSection,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub shadow: ShadowConfig,
    #[serde(default, rename = "loop")]
    pub loop_config: LoopConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_tasks_file")]
    pub tasks_file: String,
    #[serde(default = "default_memory_file")]
    pub memory_file: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_tasks_file() -> String {
    "tasks.json".to_string()
}
fn default_memory_file() -> String {
    "memory.sqlite".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_enforce")]
    pub enforce: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enforce: default_enforce(),
        }
    }
}

fn default_enforce() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardrailConfig {
    #[serde(default)]
    pub human_override: bool,
    #[serde(default = "default_true")]
    pub adaptive_threshold: bool,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            human_override: false,
            adaptive_threshold: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfigSection {
    #[serde(default = "default_min_pool")]
    pub min_size: usize,
    #[serde(default = "default_max_pool")]
    pub max_size: usize,
    #[serde(default = "default_checkout_timeout_ms")]
    pub checkout_timeout_ms: u64,
    #[serde(default = "default_recycle_after_uses")]
    pub recycle_after_uses: u32,
    #[serde(default = "default_agent_program")]
    pub agent_program: String,
}

impl Default for PoolConfigSection {
    fn default() -> Self {
        Self {
            min_size: default_min_pool(),
            max_size: default_max_pool(),
            checkout_timeout_ms: default_checkout_timeout_ms(),
            recycle_after_uses: default_recycle_after_uses(),
            agent_program: default_agent_program(),
        }
    }
}

fn default_min_pool() -> usize {
    1
}
fn default_max_pool() -> usize {
    8
}
fn default_checkout_timeout_ms() -> u64 {
    30_000
}
fn default_recycle_after_uses() -> u32 {
    50
}
fn default_agent_program() -> String {
    "true".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfigSection {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: u64,
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,
}

impl Default for CacheConfigSection {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_memory_bytes: default_max_memory_bytes(),
            default_ttl_ms: default_ttl_ms(),
        }
    }
}

fn default_max_entries() -> usize {
    1_000
}
fn default_max_memory_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_ttl_ms() -> u64 {
    5 * 60 * 1_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./data/state")
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ShadowConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_shadow_file")]
    pub sqlite_file: String,
}

fn default_shadow_file() -> String {
    "shadow.sqlite".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    #[serde(default = "default_iterations")]
    pub max_iterations: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            idle_interval_ms: default_idle_interval_ms(),
            max_iterations: default_iterations(),
        }
    }
}

fn default_idle_interval_ms() -> u64 {
    2_000
}
fn default_iterations() -> Option<u64> {
    None
}

impl TaskforgeConfig {
    pub fn tasks_path(&self) -> PathBuf {
        self.project.data_dir.join(&self.project.tasks_file)
    }

    pub fn memory_path(&self) -> PathBuf {
        self.project.data_dir.join(&self.project.memory_file)
    }

    pub fn shadow_path(&self) -> PathBuf {
        self.project.data_dir.join(&self.shadow.sqlite_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_in_every_default() {
        let toml = r#"
            [project]
            name = "demo"
        "#;
        let config: TaskforgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.pool.min_size, 1);
        assert_eq!(config.pool.max_size, 8);
        assert!(config.validator.enforce);
        assert_eq!(config.cache.max_entries, 1_000);
        assert_eq!(config.loop_config.idle_interval_ms, 2_000);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let toml = r#"
            [project]
            name = "demo"

            [pool]
            max_size = 4
            checkout_timeout_ms = 500
        "#;
        let config: TaskforgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.pool.max_size, 4);
        assert_eq!(config.pool.checkout_timeout_ms, 500);
    }
}
