//! Coordinated pipeline: explicit roles driving the workflow stages.
//!
//! The coordinator plans which roles run; each role owns a fixed slice of
//! stages and records one [`AgentInteraction`] when its stages finish. The
//! verify-before-publish gate is the same one the plain pipeline uses.

use tracing::{debug, instrument};

use crate::core::types::{AgentInteraction, AgentRole, PipelineStage, Stage, WorkflowRun};
use crate::error::WorkflowError;
use crate::workflow::{StageFlow, WorkflowManager, WorkflowOptions};

/// Roles that execute, in order, for `options`.
pub fn plan(options: WorkflowOptions) -> Vec<AgentRole> {
    let mut roles = vec![AgentRole::Analyzer, AgentRole::Fixer];
    if !options.dry_run {
        roles.push(AgentRole::Tester);
        if options.publish {
            roles.push(AgentRole::Publisher);
        }
    }
    roles
}

/// Stages a role is responsible for.
pub fn role_stages(role: AgentRole) -> &'static [PipelineStage] {
    match role {
        AgentRole::Coordinator => &[],
        AgentRole::Analyzer => &[PipelineStage::Analyze],
        AgentRole::Fixer => &[PipelineStage::GenerateFixes, PipelineStage::Apply],
        AgentRole::Tester => &[PipelineStage::Verify],
        AgentRole::Publisher => &[PipelineStage::Publish],
    }
}

fn role_action(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Coordinator => "plan",
        AgentRole::Analyzer => "analyze",
        AgentRole::Fixer => "fix",
        AgentRole::Tester => "test",
        AgentRole::Publisher => "publish",
    }
}

pub struct CoordinatedPipeline<'m, 'a> {
    manager: &'m WorkflowManager<'a>,
}

impl<'m, 'a> CoordinatedPipeline<'m, 'a> {
    pub fn new(manager: &'m WorkflowManager<'a>) -> Self {
        Self { manager }
    }

    #[instrument(skip_all, fields(path = %run.file_path.display()))]
    pub fn run(&self, run: &mut WorkflowRun, options: WorkflowOptions) -> Result<(), WorkflowError> {
        let roles = plan(options);
        let planned: Vec<&str> = roles.iter().map(AgentRole::as_str).collect();
        interact(run, AgentRole::Coordinator, "plan", planned.join(" -> "));

        for role in roles {
            let mut flow = StageFlow::Continue;
            for &stage in role_stages(role) {
                flow = self.manager.step(run, stage, options)?;
                if flow == StageFlow::Stop {
                    break;
                }
            }
            let summary = role_summary(run, role);
            debug!(role = role.as_str(), summary = %summary, "role finished");
            interact(run, role, role_action(role), summary);
            if flow == StageFlow::Stop {
                break;
            }
        }

        let conclusion = match run.failure() {
            Some(failure) => format!(
                "halted at {}: {}",
                failure.stage,
                failure.error.as_deref().unwrap_or("unknown error")
            ),
            None => match run.stages().last() {
                Some(last) => format!("finished after {}", last.stage),
                None => "nothing ran".to_string(),
            },
        };
        interact(run, AgentRole::Coordinator, "conclude", conclusion);
        Ok(())
    }
}

fn interact(run: &mut WorkflowRun, role: AgentRole, action: &str, summary: String) {
    run.interactions.push(AgentInteraction {
        role,
        action: action.to_string(),
        summary,
    });
}

/// Detail (or error) of the last stage the role recorded.
fn role_summary(run: &WorkflowRun, role: AgentRole) -> String {
    let stages = role_stages(role);
    run.stages()
        .iter()
        .rev()
        .find(|outcome| stages.iter().any(|&s| Stage::from(s) == outcome.stage))
        .and_then(|outcome| outcome.error.clone().or_else(|| outcome.detail.clone()))
        .unwrap_or_else(|| "no stage recorded".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{StageStatus, WorkflowType};
    use crate::io::checks::CheckOutcome;
    use crate::io::config::AutofixConfig;
    use crate::test_support::{
        ScriptedAnalyzer, ScriptedChecker, ScriptedLlm, ScriptedParts, analysis_result, fix_response,
    };
    use std::fs;

    fn roles(run: &WorkflowRun) -> Vec<(AgentRole, String)> {
        run.interactions
            .iter()
            .map(|i| (i.role, i.action.clone()))
            .collect()
    }

    #[test]
    fn plan_follows_options() {
        assert_eq!(
            plan(WorkflowOptions::default()),
            vec![
                AgentRole::Analyzer,
                AgentRole::Fixer,
                AgentRole::Tester,
                AgentRole::Publisher
            ]
        );
        assert_eq!(
            plan(WorkflowOptions {
                publish: false,
                dry_run: false
            }),
            vec![AgentRole::Analyzer, AgentRole::Fixer, AgentRole::Tester]
        );
        assert_eq!(
            plan(WorkflowOptions {
                publish: true,
                dry_run: true
            }),
            vec![AgentRole::Analyzer, AgentRole::Fixer]
        );
    }

    #[test]
    fn roles_own_each_pipeline_stage_once() {
        let owned: Vec<PipelineStage> = [
            AgentRole::Coordinator,
            AgentRole::Analyzer,
            AgentRole::Fixer,
            AgentRole::Tester,
            AgentRole::Publisher,
        ]
        .into_iter()
        .flat_map(|role| role_stages(role).iter().copied())
        .collect();
        assert_eq!(owned, PipelineStage::ALL.to_vec());
    }

    #[test]
    fn every_role_records_an_interaction() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("app.py");
        fs::write(&path, "x=1\n").expect("write");
        let config = AutofixConfig::default();
        let parts = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 5, 1))]),
            ScriptedLlm::new([fix_response("x=1", "x = 1")]),
        );

        let run = WorkflowManager::new(&config, parts.collaborators())
            .execute(&path, WorkflowType::Coordinated, WorkflowOptions::default())
            .expect("run");

        assert!(run.success, "stages: {:?}", run.stages());
        assert_eq!(
            roles(&run),
            vec![
                (AgentRole::Coordinator, "plan".to_string()),
                (AgentRole::Analyzer, "analyze".to_string()),
                (AgentRole::Fixer, "fix".to_string()),
                (AgentRole::Tester, "test".to_string()),
                (AgentRole::Publisher, "publish".to_string()),
                (AgentRole::Coordinator, "conclude".to_string()),
            ]
        );
        assert_eq!(run.interactions[0].summary, "analyzer -> fixer -> tester -> publisher");
        assert!(run.interactions[4].summary.contains("https://example.test/pr/3"));
        assert!(run.change_reference().is_some());
    }

    #[test]
    fn tester_failure_stops_before_publisher() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("app.py");
        fs::write(&path, "x=1\n").expect("write");
        let config = AutofixConfig::default();
        let mut parts = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 5, 1))]),
            ScriptedLlm::new([fix_response("x=1", "x = 1")]),
        );
        parts.checker = ScriptedChecker::passing().with_load(CheckOutcome::Fail {
            message: "ImportError: no module named foo".to_string(),
            line: None,
            column: None,
        });

        let run = WorkflowManager::new(&config, parts.collaborators())
            .execute(&path, WorkflowType::Coordinated, WorkflowOptions::default())
            .expect("run");

        assert!(!run.success);
        let last_role = run.interactions.iter().rev().nth(1).map(|i| i.role);
        assert_eq!(last_role, Some(AgentRole::Tester));
        let conclusion = &run.interactions.last().expect("conclusion").summary;
        assert!(conclusion.starts_with("halted at verify"));
        assert!(parts.vcs.calls().is_empty());
        assert!(
            run.stages()
                .iter()
                .all(|o| o.stage != Stage::Publish || o.status != StageStatus::Completed)
        );
    }

    #[test]
    fn clean_file_ends_after_analyzer() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("app.py");
        fs::write(&path, "x = 1\n").expect("write");
        let config = AutofixConfig::default();
        let parts = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 9, 0))]),
            ScriptedLlm::new(Vec::<&str>::new()),
        );

        let run = WorkflowManager::new(&config, parts.collaborators())
            .execute(&path, WorkflowType::Coordinated, WorkflowOptions::default())
            .expect("run");

        assert!(run.success);
        assert_eq!(run.interactions.len(), 3);
        assert_eq!(run.interactions[2].summary, "finished after analyze");
    }
}
