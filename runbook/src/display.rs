//! Markdown rendering of engine results for the external decision-maker
//!
//! Everything rendered here is deterministic: no timestamps, no host-specific
//! detail beyond what the steps themselves captured. Replay compares these
//! strings byte for byte.

use crate::executor::{ExecutedStep, Pending, RunResult, StepKind};

/// Render a full run result: the executed trail plus what comes next
pub fn render_run_result(result: &RunResult) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !result.executed.is_empty() {
        parts.push(render_executed_steps(&result.executed));
    }

    match &result.pending {
        None => parts.push(
            "## All Steps Completed\n\nThe runbook has finished execution.".to_string(),
        ),
        Some(pending) => parts.push(render_pending(pending)),
    }

    parts.join("\n\n")
}

/// Render the executed-step trail as a markdown list
pub fn render_executed_steps(steps: &[ExecutedStep]) -> String {
    let mut lines = vec!["### Steps executed:".to_string()];

    for step in steps {
        let prefix = format!("{}[{}]", step.frame_name, step.step_index);
        match step.kind {
            StepKind::InvokeEntry => {
                lines.push(format!("- `{prefix}`: -> Calling `{}`", step.description));
            }
            StepKind::InvokeExit => {
                let status = if step.succeeded { "ok" } else { "failed" };
                lines.push(format!(
                    "- `{prefix}`: <- Returned from `{}` ({status})",
                    step.description
                ));
            }
            StepKind::ManualCompletion => {
                lines.push(format!(
                    "- `{prefix}`: ok Completed manually: `{}`",
                    step.description
                ));
                push_block(&mut lines, "summary", &step.captured_output);
            }
            StepKind::Action => {
                let status = if step.succeeded { "ok" } else { "failed" };
                lines.push(format!("- `{prefix}`: {status} `{}`", step.description));
                push_block(&mut lines, "output", &step.captured_output);
            }
        }
    }

    lines.join("\n")
}

/// Indented tagged block under a step line; skipped when empty
fn push_block(lines: &mut Vec<String>, tag: &str, content: &str) {
    if content.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push(format!("  <{tag}>"));
    for line in content.split('\n') {
        lines.push(format!("  {line}"));
    }
    lines.push(format!("  </{tag}>"));
}

/// Render the suspension the engine stopped on
pub fn render_pending(pending: &Pending) -> String {
    match pending {
        Pending::Judgment(p) => {
            let mut lines: Vec<String> = Vec::new();

            if let Some(context) = &p.context {
                lines.push(context.clone());
            }

            if p.stack_path.contains(" > ") {
                lines.push(format!(
                    "## Judgment in `{}` (step {})\n\n**Stack:** `{}`",
                    p.frame_name, p.step_index, p.stack_path
                ));
            } else {
                lines.push(format!(
                    "## Judgment {} in `{}`",
                    p.step_index, p.frame_name
                ));
            }

            lines.push(String::new());
            lines.push(p.judgment.prompt.clone());

            if !p.judgment.expects.is_empty() {
                lines.push(String::new());
                lines.push("### Expected outputs:".to_string());
                for (key, description) in &p.judgment.expects {
                    lines.push(format!("- `{key}`: {description}"));
                }
                lines.push(String::new());
                lines.push(
                    "When you have completed this step, call `resume_after_judgment` \
                     with the outputs."
                        .to_string(),
                );
            } else {
                lines.push(String::new());
                lines.push(
                    "When you have completed this step, call `resume_after_judgment` \
                     (no outputs needed)."
                        .to_string(),
                );
            }

            lines.join("\n")
        }
        Pending::Manual(p) => format!(
            "## Manual Runbook: `{}`\n\n{}\n\n---\n\n\
             When you have completed this runbook, call `complete_manual` to mark it complete.",
            p.name, p.body
        ),
        Pending::Fallback(p) => {
            let mut lines = vec![format!("## Failure in Runbook: `{}`", p.frame_name)];

            if p.stack_path.contains(" > ") {
                lines.push(format!("**Stack:** `{}`", p.stack_path));
            }

            lines.push(format!(
                "**Step {} failed.** Falling back to manual execution of the runbook.",
                p.step_index
            ));
            lines.push(String::new());
            lines.push("### Failed Step".to_string());
            lines.push(String::new());
            lines.push(format!("`{}`", p.description));
            lines.push(String::new());
            lines.push("### Error".to_string());
            lines.push(String::new());
            lines.push(format!("```\n{}\n```", p.error));

            if !p.output.is_empty() {
                lines.push(String::new());
                lines.push("### Captured Output".to_string());
                lines.push(String::new());
                lines.push(format!("```\n{}\n```", p.output));
            }

            if !p.source.is_empty() {
                lines.push(String::new());
                lines.push("### Original Runbook Instructions".to_string());
                lines.push(String::new());
                lines.push(p.source.clone());
            }

            lines.push(String::new());
            lines.push("---".to_string());
            lines.push(String::new());
            lines.push(
                "Complete the remaining work by hand, then call `complete_manual`.".to_string(),
            );

            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Judgment;
    use crate::executor::{PendingFallback, PendingJudgment, PendingManual};

    fn action_step(output: &str) -> ExecutedStep {
        ExecutedStep {
            frame_name: "release".to_string(),
            step_index: 0,
            kind: StepKind::Action,
            description: "echo 1".to_string(),
            succeeded: true,
            captured_output: output.to_string(),
        }
    }

    #[test]
    fn test_executed_steps_show_output_blocks() {
        let rendered = render_executed_steps(&[action_step("1\n")]);
        assert!(rendered.starts_with("### Steps executed:"));
        assert!(rendered.contains("- `release[0]`: ok `echo 1`"));
        assert!(rendered.contains("  <output>"));
        assert!(rendered.contains("  1"));
    }

    #[test]
    fn test_empty_output_skips_block() {
        let rendered = render_executed_steps(&[action_step("")]);
        assert!(!rendered.contains("<output>"));
    }

    #[test]
    fn test_judgment_rendering_lists_expected_outputs() {
        let pending = Pending::Judgment(PendingJudgment {
            judgment: Judgment::new("Pick a name").expecting("name", "the chosen name"),
            frame_name: "release".to_string(),
            step_index: 2,
            stack_path: "release[2]".to_string(),
            context: None,
        });
        let rendered = render_pending(&pending);
        assert!(rendered.contains("## Judgment 2 in `release`"));
        assert!(rendered.contains("- `name`: the chosen name"));
        assert!(rendered.contains("resume_after_judgment"));
        assert!(!rendered.contains("**Stack:**"));
    }

    #[test]
    fn test_nested_judgment_shows_stack() {
        let pending = Pending::Judgment(PendingJudgment {
            judgment: Judgment::new("Deep question"),
            frame_name: "inner".to_string(),
            step_index: 0,
            stack_path: "outer[1] > inner[0]".to_string(),
            context: None,
        });
        let rendered = render_pending(&pending);
        assert!(rendered.contains("**Stack:** `outer[1] > inner[0]`"));
    }

    #[test]
    fn test_judgment_context_renders_before_heading() {
        let pending = Pending::Judgment(PendingJudgment {
            judgment: Judgment::new("Pick a name"),
            frame_name: "release".to_string(),
            step_index: 0,
            stack_path: "release[0]".to_string(),
            context: Some("Release the service to production".to_string()),
        });
        let rendered = render_pending(&pending);
        assert!(rendered.starts_with("Release the service to production\n## Judgment"));
    }

    #[test]
    fn test_fallback_rendering_includes_source() {
        let pending = Pending::Fallback(PendingFallback {
            frame_name: "flaky".to_string(),
            step_index: 0,
            stack_path: "flaky[0]".to_string(),
            context: "Fail on purpose".to_string(),
            description: "exit 1".to_string(),
            error: "exit code 1".to_string(),
            output: String::new(),
            source: "A runbook whose only step fails".to_string(),
        });
        let rendered = render_pending(&pending);
        assert!(rendered.contains("## Failure in Runbook: `flaky`"));
        assert!(rendered.contains("### Original Runbook Instructions"));
        assert!(rendered.contains("complete_manual"));
    }

    #[test]
    fn test_completed_result() {
        let result = RunResult {
            executed: vec![],
            pending: None,
        };
        assert_eq!(
            render_run_result(&result),
            "## All Steps Completed\n\nThe runbook has finished execution."
        );
    }

    #[test]
    fn test_manual_rendering() {
        let pending = Pending::Manual(PendingManual {
            name: "triage".to_string(),
            body: "Investigate the incident".to_string(),
        });
        let rendered = render_pending(&pending);
        assert!(rendered.contains("## Manual Runbook: `triage`"));
        assert!(rendered.contains("Investigate the incident"));
    }
}
