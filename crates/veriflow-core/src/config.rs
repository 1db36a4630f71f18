use crate::error::{Result, VeriflowError};
use crate::paths::ProjectPaths;
use crate::types::{AgentRole, GatingMode, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// StageConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub gating: GatingMode,
    /// Extra agent attempts after the first one fails.
    /// `0` means one attempt total.
    #[serde(default)]
    pub max_retries: u32,
}

fn default_enabled() -> bool {
    true
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gating: GatingMode::default(),
            max_retries: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// GatingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatingConfig {
    /// Minimum unit test coverage, in percent.
    #[serde(default = "default_coverage_threshold")]
    pub coverage_threshold: f64,
}

fn default_coverage_threshold() -> f64 {
    80.0
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: default_coverage_threshold(),
        }
    }
}

// ---------------------------------------------------------------------------
// AgentSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Program and arguments of the agent process. Empty means unconfigured.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default = "default_agent_timeout")]
    pub timeout_seconds: u64,
}

fn default_model() -> String {
    "claude-sonnet-4".to_string()
}

fn default_max_tokens() -> u32 {
    8000
}

fn default_agent_timeout() -> u64 {
    600
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            command: Vec::new(),
            timeout_seconds: default_agent_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// CheckpointConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Write a `sprint-<n>-start` checkpoint before every sprint.
    #[serde(default)]
    pub auto: bool,
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    /// Keyed by stage name. Stages without an entry use `StageConfig::default()`.
    #[serde(default)]
    pub stages: BTreeMap<String, StageConfig>,
    #[serde(default)]
    pub gating: GatingConfig,
    /// Keyed by agent role name.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentSettings>,
    #[serde(default)]
    pub checkpoints: CheckpointConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        let stages = Stage::all()
            .iter()
            .map(|s| (s.as_str().to_string(), StageConfig::default()))
            .collect();
        let agents = AgentRole::all()
            .iter()
            .map(|r| (r.as_str().to_string(), AgentSettings::default()))
            .collect();
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            stages,
            gating: GatingConfig::default(),
            agents,
            checkpoints: CheckpointConfig::default(),
        }
    }

    pub fn stage(&self, stage: Stage) -> StageConfig {
        self.stages
            .get(stage.as_str())
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_enabled(&self, stage: Stage) -> bool {
        self.stage(stage).enabled
    }

    pub fn gating_mode(&self, stage: Stage) -> GatingMode {
        self.stage(stage).gating
    }

    pub fn set_stage(&mut self, stage: Stage, cfg: StageConfig) {
        self.stages.insert(stage.as_str().to_string(), cfg);
    }

    pub fn agent(&self, role: AgentRole) -> AgentSettings {
        self.agents
            .get(role.as_str())
            .cloned()
            .unwrap_or_default()
    }

    pub fn load(paths: &ProjectPaths) -> Result<Self> {
        let path = paths.config_file();
        if !path.exists() {
            return Err(VeriflowError::NotInitialized);
        }
        Self::load_file(&path)
    }

    /// Parse a config file outside the project layout, e.g. a template
    /// passed to `veriflow init --config`.
    pub fn load_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, paths: &ProjectPaths) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&paths.config_file(), data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for (key, stage_cfg) in &self.stages {
            if !Stage::is_valid(key) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("unknown stage '{key}' in stages"),
                });
            }
            if stage_cfg.max_retries > 10 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "stage '{key}' has max_retries={} (>10 is unusual)",
                        stage_cfg.max_retries
                    ),
                });
            }
        }

        if !(0.0..=100.0).contains(&self.gating.coverage_threshold) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "gating.coverage_threshold={} is outside 0..=100",
                    self.gating.coverage_threshold
                ),
            });
        }

        for (key, agent) in &self.agents {
            if !AgentRole::is_valid(key) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("unknown agent '{key}' in agents"),
                });
            }
            if let Some(program) = agent.command.first() {
                if which::which(program).is_err() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "agent '{key}' command '{program}' was not found on PATH"
                        ),
                    });
                }
            }
            if agent.timeout_seconds == 0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("agent '{key}' has timeout_seconds=0"),
                });
            }
        }

        // Enabled stages whose agent has nothing to run will fail every sprint.
        for stage in Stage::all() {
            let Some(role) = stage.agent_role() else {
                continue;
            };
            if self.is_enabled(*stage) && self.agent(role).command.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "stage '{stage}' is enabled but agent '{role}' has no command"
                    ),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn with_commands(mut cfg: Config) -> Config {
        for agent in cfg.agents.values_mut() {
            agent.command = vec!["sh".to_string()];
        }
        cfg
    }

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::new("test-project");
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.project.name, "test-project");
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.stages.len(), 8);
        assert_eq!(parsed.agents.len(), 5);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let yaml = "version: 1\nproject:\n  name: my-project\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.stages.is_empty());
        assert!(cfg.is_enabled(Stage::Design));
        assert_eq!(cfg.gating_mode(Stage::Design), GatingMode::Soft);
        assert_eq!(cfg.gating.coverage_threshold, 80.0);
        assert!(!cfg.checkpoints.auto);
        assert!(cfg.agent(AgentRole::Developer).command.is_empty());
    }

    #[test]
    fn stage_overrides_parse() {
        let yaml = r#"
version: 1
project:
  name: my-project
stages:
  requirements:
    gating: hard
    max_retries: 2
  coding:
    enabled: false
gating:
  coverage_threshold: 90
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        let req = cfg.stage(Stage::Requirements);
        assert!(req.enabled);
        assert_eq!(req.gating, GatingMode::Hard);
        assert_eq!(req.max_retries, 2);
        assert!(!cfg.is_enabled(Stage::Coding));
        assert_eq!(cfg.gating.coverage_threshold, 90.0);
    }

    #[test]
    fn stage_config_rejects_unknown_fields() {
        let yaml = "version: 1\nproject:\n  name: p\nstages:\n  design:\n    gate: hard\n";
        let result = serde_yaml::from_str::<Config>(yaml);
        assert!(result.is_err(), "typo in field name should be rejected");
    }

    #[test]
    fn invalid_gating_mode_rejected() {
        let yaml = "version: 1\nproject:\n  name: p\nstages:\n  design:\n    gating: strict\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn agent_settings_parse() {
        let yaml = r#"
version: 1
project:
  name: my-project
agents:
  developer:
    model: claude-opus-4
    command: ["dev-agent", "--fast"]
    timeout_seconds: 30
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        let dev = cfg.agent(AgentRole::Developer);
        assert_eq!(dev.model, "claude-opus-4");
        assert_eq!(dev.max_tokens, 8000);
        assert_eq!(dev.command, vec!["dev-agent", "--fast"]);
        assert_eq!(dev.timeout_seconds, 30);
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());
        assert!(matches!(
            Config::load(&paths),
            Err(VeriflowError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());
        let mut cfg = Config::new("demo");
        cfg.set_stage(
            Stage::UnitTesting,
            StageConfig {
                enabled: true,
                gating: GatingMode::Hard,
                max_retries: 1,
            },
        );
        cfg.save(&paths).unwrap();
        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.gating_mode(Stage::UnitTesting), GatingMode::Hard);
    }

    #[test]
    fn load_file_reads_a_template_outside_the_layout() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("team.yaml");
        std::fs::write(
            &template,
            "project:\n  name: shared\nstages:\n  design: { gating: hard }\n",
        )
        .unwrap();
        let cfg = Config::load_file(&template).unwrap();
        assert_eq!(cfg.project.name, "shared");
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.gating_mode(Stage::Design), GatingMode::Hard);
        assert!(Config::load_file(&dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn validate_configured_project_no_warnings() {
        let cfg = with_commands(Config::new("test-project"));
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn validate_unconfigured_agents_warn() {
        let cfg = Config::new("test-project");
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("agent 'architect' has no command")));
    }

    #[test]
    fn validate_unknown_keys() {
        let mut cfg = with_commands(Config::new("test-project"));
        cfg.stages.insert("deploy".to_string(), StageConfig::default());
        cfg.agents.insert(
            "reviewer".to_string(),
            AgentSettings {
                command: vec!["sh".to_string()],
                ..AgentSettings::default()
            },
        );
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("unknown stage 'deploy'")));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("unknown agent 'reviewer'")));
    }

    #[test]
    fn validate_threshold_and_retries() {
        let mut cfg = with_commands(Config::new("test-project"));
        cfg.gating.coverage_threshold = 120.0;
        cfg.set_stage(
            Stage::Coding,
            StageConfig {
                enabled: true,
                gating: GatingMode::Soft,
                max_retries: 15,
            },
        );
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("coverage_threshold")));
        assert!(warnings.iter().any(|w| w.message.contains("max_retries=15")));
    }

    #[test]
    fn validate_missing_program() {
        let mut cfg = with_commands(Config::new("test-project"));
        if let Some(agent) = cfg.agents.get_mut("developer") {
            agent.command = vec!["definitely-not-a-real-binary-xyz".to_string()];
        }
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("was not found on PATH")));
    }
}
