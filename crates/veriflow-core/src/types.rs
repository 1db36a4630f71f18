use crate::error::VeriflowError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A V-Model stage. Declaration order is the canonical execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    Requirements,
    Design,
    Coding,
    UnitTesting,
    IntegrationTesting,
    SystemTesting,
    Validation,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[
            Stage::Planning,
            Stage::Requirements,
            Stage::Design,
            Stage::Coding,
            Stage::UnitTesting,
            Stage::IntegrationTesting,
            Stage::SystemTesting,
            Stage::Validation,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Stage> {
        Stage::all().get(self.index() + 1).copied()
    }

    pub fn side(self) -> Side {
        if self <= Stage::Coding {
            Side::Left
        } else {
            Side::Right
        }
    }

    /// The role that executes this stage. Planning runs without an agent.
    pub fn agent_role(self) -> Option<AgentRole> {
        match self {
            Stage::Planning => None,
            Stage::Requirements => Some(AgentRole::RequirementsAnalyst),
            Stage::Design => Some(AgentRole::Architect),
            Stage::Coding => Some(AgentRole::Developer),
            Stage::UnitTesting | Stage::IntegrationTesting | Stage::SystemTesting => {
                Some(AgentRole::QaTester)
            }
            Stage::Validation => Some(AgentRole::Integration),
        }
    }

    pub fn is_testing(self) -> bool {
        matches!(
            self,
            Stage::UnitTesting | Stage::IntegrationTesting | Stage::SystemTesting
        )
    }

    pub fn is_valid(s: &str) -> bool {
        s.parse::<Stage>().is_ok()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::Requirements => "requirements",
            Stage::Design => "design",
            Stage::Coding => "coding",
            Stage::UnitTesting => "unit_testing",
            Stage::IntegrationTesting => "integration_testing",
            Stage::SystemTesting => "system_testing",
            Stage::Validation => "validation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = VeriflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Stage::all()
            .iter()
            .copied()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| VeriflowError::InvalidStage(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// The two arms of the V. Left decomposes, right verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn stages(self) -> &'static [Stage] {
        let all = Stage::all();
        match self {
            Side::Left => &all[..=Stage::Coding.index()],
            Side::Right => &all[Stage::UnitTesting.index()..],
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

// ---------------------------------------------------------------------------
// GatingMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatingMode {
    /// A failed gate halts the rest of the sprint side.
    Hard,
    /// A failed gate is reported and the stage still counts as passed.
    #[default]
    Soft,
    Off,
}

impl GatingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GatingMode::Hard => "hard",
            GatingMode::Soft => "soft",
            GatingMode::Off => "off",
        }
    }
}

impl fmt::Display for GatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GatingMode {
    type Err = VeriflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hard" => Ok(GatingMode::Hard),
            "soft" => Ok(GatingMode::Soft),
            "off" => Ok(GatingMode::Off),
            _ => Err(VeriflowError::InvalidGatingMode(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// AgentRole
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    RequirementsAnalyst,
    Architect,
    Developer,
    QaTester,
    Integration,
}

impl AgentRole {
    pub fn all() -> &'static [AgentRole] {
        &[
            AgentRole::RequirementsAnalyst,
            AgentRole::Architect,
            AgentRole::Developer,
            AgentRole::QaTester,
            AgentRole::Integration,
        ]
    }

    pub fn is_valid(s: &str) -> bool {
        Self::all().iter().any(|r| r.as_str() == s)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::RequirementsAnalyst => "requirements_analyst",
            AgentRole::Architect => "architect",
            AgentRole::Developer => "developer",
            AgentRole::QaTester => "qa_tester",
            AgentRole::Integration => "integration",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn stage_ordering_is_v_model_order() {
        assert!(Stage::Planning < Stage::Requirements);
        assert!(Stage::Coding < Stage::UnitTesting);
        assert!(Stage::Validation > Stage::SystemTesting);
        assert_eq!(Stage::all().len(), 8);
    }

    #[test]
    fn stage_next() {
        assert_eq!(Stage::Planning.next(), Some(Stage::Requirements));
        assert_eq!(Stage::Coding.next(), Some(Stage::UnitTesting));
        assert_eq!(Stage::Validation.next(), None);
    }

    #[test]
    fn stage_parse_accepts_common_spellings() {
        for stage in Stage::all() {
            assert_eq!(Stage::from_str(stage.as_str()).unwrap(), *stage);
        }
        assert_eq!(Stage::from_str("UNIT_TESTING").unwrap(), Stage::UnitTesting);
        assert_eq!(
            Stage::from_str("integration-testing").unwrap(),
            Stage::IntegrationTesting
        );
        assert!(Stage::from_str("deploy").is_err());
    }

    #[test]
    fn sides_partition_stages() {
        assert_eq!(
            Side::Left.stages(),
            &[
                Stage::Planning,
                Stage::Requirements,
                Stage::Design,
                Stage::Coding
            ]
        );
        assert_eq!(
            Side::Right.stages(),
            &[
                Stage::UnitTesting,
                Stage::IntegrationTesting,
                Stage::SystemTesting,
                Stage::Validation
            ]
        );
        for stage in Stage::all() {
            assert!(stage.side().stages().contains(stage));
        }
    }

    #[test]
    fn stage_agent_mapping() {
        assert_eq!(Stage::Planning.agent_role(), None);
        assert_eq!(
            Stage::Requirements.agent_role(),
            Some(AgentRole::RequirementsAnalyst)
        );
        assert_eq!(Stage::Design.agent_role(), Some(AgentRole::Architect));
        assert_eq!(Stage::Coding.agent_role(), Some(AgentRole::Developer));
        for stage in [
            Stage::UnitTesting,
            Stage::IntegrationTesting,
            Stage::SystemTesting,
        ] {
            assert_eq!(stage.agent_role(), Some(AgentRole::QaTester));
        }
        assert_eq!(Stage::Validation.agent_role(), Some(AgentRole::Integration));
    }

    #[test]
    fn stage_serializes_snake_case() {
        let json = serde_json::to_string(&Stage::SystemTesting).unwrap();
        assert_eq!(json, "\"system_testing\"");
    }

    #[test]
    fn gating_mode_parse_and_default() {
        assert_eq!(GatingMode::from_str("hard").unwrap(), GatingMode::Hard);
        assert_eq!(GatingMode::default(), GatingMode::Soft);
        assert!(GatingMode::from_str("strict").is_err());
    }

    #[test]
    fn agent_role_is_valid() {
        assert!(AgentRole::is_valid("qa_tester"));
        assert!(!AgentRole::is_valid("tester"));
    }
}
