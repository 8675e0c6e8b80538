use serde::{Deserialize, Serialize};

/// Configuration from cadence/config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub project: ProjectInfo,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Resolution slower than this logs a performance warning
    #[serde(default = "default_soft_latency_ms")]
    pub soft_latency_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            soft_latency_ms: default_soft_latency_ms(),
        }
    }
}

fn default_soft_latency_ms() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_engine_defaults() {
        let config: LibraryConfig = toml::from_str(
            r#"
[project]
name = "morning"
"#,
        )
        .unwrap();
        assert_eq!(config.project.name, "morning");
        assert_eq!(config.engine.soft_latency_ms, 10);
    }

    #[test]
    fn engine_section_overrides_latency_budget() {
        let config: LibraryConfig = toml::from_str(
            r#"
[project]
name = "morning"

[engine]
soft_latency_ms = 25
"#,
        )
        .unwrap();
        assert_eq!(config.engine.soft_latency_ms, 25);
    }
}
