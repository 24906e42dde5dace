//! The YAML plan document: stages of steps plus shared variables.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

/// One stage: an ordered list of step command templates.
///
/// Stage order is significant and never reordered by the engine.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StageConfig {
    pub steps: Vec<String>,
}

/// The parsed plan document.
///
/// Two recognized top-level keys: `play`, an ordered sequence of stages,
/// and `vars`, a flat string mapping available to every step template
/// across the whole run. `vars` is supplied once and never mutated during
/// execution.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PlanFile {
    pub play: Vec<StageConfig>,
    #[serde(default)]
    pub vars: HashMap<String, String>,
}

impl PlanFile {
    pub fn validate(&self) -> Result<()> {
        if self.play.is_empty() {
            return Err(anyhow!("plan has no stages"));
        }
        for (idx, stage) in self.play.iter().enumerate() {
            if stage.steps.is_empty() {
                return Err(anyhow!("stage {idx} has no steps"));
            }
            if stage.steps.iter().any(|step| step.trim().is_empty()) {
                return Err(anyhow!("stage {idx} contains an empty step"));
            }
        }
        Ok(())
    }
}

/// Load and validate a plan from a YAML file.
pub fn load_plan(path: &Path) -> Result<PlanFile> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let plan: PlanFile =
        serde_yaml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    plan.validate()?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "\
play:
  - steps:
      - echo build {{target}}
      - cargo check
  - steps:
      - echo deploy
vars:
  target: world
";

    #[test]
    fn parses_stages_and_vars() {
        let plan: PlanFile = serde_yaml::from_str(PLAN).expect("parse");
        assert_eq!(plan.play.len(), 2);
        assert_eq!(plan.play[0].steps.len(), 2);
        assert_eq!(plan.play[1].steps, vec!["echo deploy".to_string()]);
        assert_eq!(plan.vars.get("target"), Some(&"world".to_string()));
    }

    #[test]
    fn missing_vars_defaults_to_empty() {
        let plan: PlanFile =
            serde_yaml::from_str("play:\n  - steps:\n      - echo hi\n").expect("parse");
        assert!(plan.vars.is_empty());
        plan.validate().expect("valid");
    }

    #[test]
    fn empty_play_is_invalid() {
        let plan = PlanFile {
            play: Vec::new(),
            vars: HashMap::new(),
        };
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("no stages"));
    }

    #[test]
    fn stage_without_steps_is_invalid() {
        let plan = PlanFile {
            play: vec![StageConfig { steps: Vec::new() }],
            vars: HashMap::new(),
        };
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("stage 0 has no steps"));
    }

    #[test]
    fn blank_step_is_invalid() {
        let plan = PlanFile {
            play: vec![StageConfig {
                steps: vec!["  ".to_string()],
            }],
            vars: HashMap::new(),
        };
        assert!(plan.validate().is_err());
    }

    #[test]
    fn load_reads_and_validates_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("play.yaml");
        fs::write(&path, PLAN).expect("write");
        let plan = load_plan(&path).expect("load");
        assert_eq!(plan.play.len(), 2);
    }

    #[test]
    fn load_missing_file_errors_with_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("absent.yaml");
        let err = load_plan(&path).unwrap_err();
        assert!(format!("{err:#}").contains("absent.yaml"));
    }
}
