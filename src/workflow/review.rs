//! Review gate.
//!
//! Tracks review findings per ticket and computes whether the ticket may
//! advance past AI review. Findings are append-only; fixing one flips its
//! status and the rows remain as the audit trail. Generating a demo script
//! is the sole trigger that moves a ticket to human review, and it refuses
//! while any critical or major finding is still open.

use super::{WorkflowEngine, WorkflowStore};
use crate::models::{
    FindingSeverity, FixStatus, ReviewFinding, Ticket, TicketStatus, TicketWorkflowState,
    WorkflowPhase,
};
use crate::storage::generate_id;
use crate::{Error, Result};
use serde::Serialize;

/// Minimum number of manual verification steps in a demo script.
const DEMO_STEPS_MIN: usize = 3;

/// Result of `review submit`.
#[derive(Debug, Serialize)]
pub struct SubmitFindingReport {
    /// The recorded finding
    pub finding: ReviewFinding,
    /// Secondary failures that did not abort the operation
    pub warnings: Vec<String>,
}

/// Result of `review fix`.
#[derive(Debug, Serialize)]
pub struct MarkFixedReport {
    /// The finding after the update
    pub finding: ReviewFinding,
    /// True when the finding was already fixed and nothing was mutated
    pub already_fixed: bool,
    /// Secondary failures that did not abort the operation
    pub warnings: Vec<String>,
}

/// Result of `review check`.
#[derive(Debug, Serialize)]
pub struct GateReport {
    /// True iff no critical or major finding is still open
    pub can_proceed_to_human_review: bool,
    pub open_critical: usize,
    pub open_major: usize,
    pub open_minor: usize,
    pub open_suggestion: usize,
    /// All findings ever recorded for the ticket
    pub total_findings: usize,
}

/// Result of `review demo`.
#[derive(Debug, Serialize)]
pub struct DemoScriptReport {
    /// Ticket snapshot after the transition
    pub ticket: Ticket,
    /// The recorded manual verification steps
    pub steps: Vec<String>,
    /// Secondary failures that did not abort the operation
    pub warnings: Vec<String>,
}

impl<S: WorkflowStore> WorkflowEngine<'_, S> {
    /// Record a review finding against a ticket.
    pub fn submit_finding(
        &self,
        ticket_id: &str,
        reviewer: &str,
        severity: FindingSeverity,
        category: &str,
        description: &str,
    ) -> Result<SubmitFindingReport> {
        let ticket = self.store().ticket(ticket_id)?;
        let mut warnings = Vec::new();

        let finding = ReviewFinding::new(
            generate_id(description),
            ticket.id.clone(),
            reviewer.to_string(),
            severity,
            category.to_string(),
            description.to_string(),
        );
        self.store().insert_finding(&finding)?;

        if let Err(e) = self.bump_counters(&ticket.id, 1, 0) {
            warnings.push(format!("Failed to update finding counters: {}", e));
        }

        Ok(SubmitFindingReport { finding, warnings })
    }

    /// Flip a finding to fixed. Fixing an already-fixed finding is an
    /// idempotent no-op.
    pub fn mark_fixed(
        &self,
        finding_id: &str,
        fix_description: Option<&str>,
    ) -> Result<MarkFixedReport> {
        let finding = self.store().finding(finding_id)?;
        if finding.fix_status == FixStatus::Fixed {
            return Ok(MarkFixedReport {
                finding,
                already_fixed: true,
                warnings: Vec::new(),
            });
        }

        let mut warnings = Vec::new();
        self.store().mark_finding_fixed(finding_id, fix_description)?;
        if let Err(e) = self.bump_counters(&finding.ticket_id, 0, 1) {
            warnings.push(format!("Failed to update finding counters: {}", e));
        }

        let finding = self.store().finding(finding_id)?;
        Ok(MarkFixedReport {
            finding,
            already_fixed: false,
            warnings,
        })
    }

    /// Compute whether a ticket may advance past AI review.
    ///
    /// Open critical/major findings block; minor and suggestion findings
    /// never do, no matter how many remain open.
    pub fn check_complete(&self, ticket_id: &str) -> Result<GateReport> {
        let ticket = self.store().ticket(ticket_id)?;
        let findings = self.store().findings(&ticket.id)?;

        let mut report = GateReport {
            can_proceed_to_human_review: false,
            open_critical: 0,
            open_major: 0,
            open_minor: 0,
            open_suggestion: 0,
            total_findings: findings.len(),
        };
        for finding in &findings {
            if finding.fix_status != FixStatus::Open {
                continue;
            }
            match finding.severity {
                FindingSeverity::Critical => report.open_critical += 1,
                FindingSeverity::Major => report.open_major += 1,
                FindingSeverity::Minor => report.open_minor += 1,
                FindingSeverity::Suggestion => report.open_suggestion += 1,
            }
        }
        report.can_proceed_to_human_review = report.open_critical == 0 && report.open_major == 0;
        Ok(report)
    }

    /// Record a manual demo script and advance the ticket to human review.
    ///
    /// This is the only operation that sets `human_review`. It re-checks the
    /// gate itself and refuses, naming the open blocking findings, when the
    /// gate is not satisfied.
    pub fn generate_demo_script(
        &self,
        ticket_id: &str,
        steps: Vec<String>,
    ) -> Result<DemoScriptReport> {
        let mut ticket = self.store().ticket(ticket_id)?;
        let mut warnings = Vec::new();

        if steps.len() < DEMO_STEPS_MIN {
            return Err(Error::Precondition(format!(
                "Demo script requires at least {} manual verification steps, got {}",
                DEMO_STEPS_MIN,
                steps.len()
            )));
        }
        if ticket.status != TicketStatus::AiReview {
            return Err(Error::Precondition(format!(
                "Cannot generate a demo script for ticket {} in status '{}'; \
                 it must be in ai_review",
                ticket.id, ticket.status
            )));
        }

        let gate = self.check_complete(&ticket.id)?;
        if !gate.can_proceed_to_human_review {
            let open: Vec<String> = self
                .store()
                .findings(&ticket.id)?
                .into_iter()
                .filter(|f| f.blocks_gate())
                .map(|f| format!("[{}] {}: {}", f.severity, f.id, f.description))
                .collect();
            return Err(Error::Precondition(format!(
                "Review gate not satisfied: {} critical and {} major finding(s) still open:\n{}",
                gate.open_critical,
                gate.open_major,
                open.join("\n")
            )));
        }

        self.store().replace_demo_steps(&ticket.id, &steps)?;
        self.store().persist_human_review_transition(&ticket.id)?;

        match self.store().ticket_state(&ticket.id) {
            Ok(Some(mut state)) => {
                state.phase = WorkflowPhase::HumanReview;
                if let Err(e) = self.store().upsert_ticket_state(&state) {
                    warnings.push(format!("Failed to update workflow state: {}", e));
                }
            }
            Ok(None) => {
                let mut state = TicketWorkflowState::new(ticket.id.clone());
                state.phase = WorkflowPhase::HumanReview;
                if let Err(e) = self.store().upsert_ticket_state(&state) {
                    warnings.push(format!("Failed to update workflow state: {}", e));
                }
            }
            Err(e) => warnings.push(format!("Failed to read workflow state: {}", e)),
        }

        ticket.status = TicketStatus::HumanReview;
        Ok(DemoScriptReport {
            ticket,
            steps,
            warnings,
        })
    }

    fn bump_counters(&self, ticket_id: &str, raised: i64, fixed: i64) -> Result<()> {
        let mut state = self
            .store()
            .ticket_state(ticket_id)?
            .unwrap_or_else(|| TicketWorkflowState::new(ticket_id.to_string()));
        state.findings_raised += raised;
        state.findings_fixed += fixed;
        self.store().upsert_ticket_state(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ticket;
    use crate::storage::generate_id;
    use crate::workflow::test_support::WorkflowEnv;

    fn reviewed_ticket(env: &WorkflowEnv) -> Ticket {
        let ticket = Ticket::new(
            generate_id("Add login form"),
            "Add login form".to_string(),
            env.project.id.clone(),
        );
        env.storage.insert_ticket(&ticket).unwrap();
        let engine = WorkflowEngine::new(&env.storage);
        engine.start_work(&ticket.id).unwrap();
        engine.complete_work(&ticket.id, None).unwrap();
        ticket
    }

    fn steps() -> Vec<String> {
        vec![
            "Open the login page".to_string(),
            "Submit valid credentials".to_string(),
            "Verify redirect to dashboard".to_string(),
        ]
    }

    #[test]
    fn test_gate_open_with_no_findings() {
        let env = WorkflowEnv::new();
        let ticket = reviewed_ticket(&env);
        let engine = WorkflowEngine::new(&env.storage);

        let gate = engine.check_complete(&ticket.id).unwrap();
        assert!(gate.can_proceed_to_human_review);
        assert_eq!(gate.total_findings, 0);
    }

    #[test]
    fn test_blocking_finding_closes_gate() {
        let env = WorkflowEnv::new();
        let ticket = reviewed_ticket(&env);
        let engine = WorkflowEngine::new(&env.storage);

        let submitted = engine
            .submit_finding(
                &ticket.id,
                "reviewer-agent",
                FindingSeverity::Major,
                "correctness",
                "missing CSRF token",
            )
            .unwrap();

        let gate = engine.check_complete(&ticket.id).unwrap();
        assert!(!gate.can_proceed_to_human_review);
        assert_eq!(gate.open_major, 1);

        engine.mark_fixed(&submitted.finding.id, Some("token added")).unwrap();
        let gate = engine.check_complete(&ticket.id).unwrap();
        assert!(gate.can_proceed_to_human_review);
        assert_eq!(gate.open_major, 0);
        // The finding is still on record.
        assert_eq!(gate.total_findings, 1);
    }

    #[test]
    fn test_minor_and_suggestion_findings_never_block() {
        let env = WorkflowEnv::new();
        let ticket = reviewed_ticket(&env);
        let engine = WorkflowEngine::new(&env.storage);

        engine
            .submit_finding(
                &ticket.id,
                "reviewer-agent",
                FindingSeverity::Minor,
                "style",
                "inconsistent naming",
            )
            .unwrap();
        engine
            .submit_finding(
                &ticket.id,
                "reviewer-agent",
                FindingSeverity::Suggestion,
                "style",
                "could use a helper",
            )
            .unwrap();

        let gate = engine.check_complete(&ticket.id).unwrap();
        assert!(gate.can_proceed_to_human_review);
        assert_eq!(gate.open_minor, 1);
        assert_eq!(gate.open_suggestion, 1);
    }

    #[test]
    fn test_mark_fixed_is_idempotent() {
        let env = WorkflowEnv::new();
        let ticket = reviewed_ticket(&env);
        let engine = WorkflowEngine::new(&env.storage);

        let submitted = engine
            .submit_finding(
                &ticket.id,
                "reviewer-agent",
                FindingSeverity::Critical,
                "security",
                "plaintext password",
            )
            .unwrap();

        let first = engine.mark_fixed(&submitted.finding.id, Some("hashed")).unwrap();
        assert!(!first.already_fixed);
        let second = engine.mark_fixed(&submitted.finding.id, Some("again")).unwrap();
        assert!(second.already_fixed);
        // First fix description wins; the no-op did not overwrite it.
        assert_eq!(second.finding.fix_description.as_deref(), Some("hashed"));

        let state = env.storage.get_ticket_state(&ticket.id).unwrap().unwrap();
        assert_eq!(state.findings_raised, 1);
        assert_eq!(state.findings_fixed, 1);
    }

    #[test]
    fn test_demo_script_requires_three_steps() {
        let env = WorkflowEnv::new();
        let ticket = reviewed_ticket(&env);
        let engine = WorkflowEngine::new(&env.storage);

        let err = engine
            .generate_demo_script(&ticket.id, vec!["only one".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));

        let loaded = env.storage.get_ticket(&ticket.id).unwrap();
        assert_eq!(loaded.status, TicketStatus::AiReview);
    }

    #[test]
    fn test_demo_script_refuses_while_gate_blocked() {
        let env = WorkflowEnv::new();
        let ticket = reviewed_ticket(&env);
        let engine = WorkflowEngine::new(&env.storage);

        let submitted = engine
            .submit_finding(
                &ticket.id,
                "reviewer-agent",
                FindingSeverity::Critical,
                "security",
                "plaintext password",
            )
            .unwrap();

        let err = engine
            .generate_demo_script(&ticket.id, steps())
            .unwrap_err();
        match err {
            Error::Precondition(message) => {
                assert!(message.contains("plaintext password"));
                assert!(message.contains("1 critical"));
            }
            other => panic!("Expected Precondition, got {:?}", other),
        }

        engine.mark_fixed(&submitted.finding.id, None).unwrap();
        let report = engine.generate_demo_script(&ticket.id, steps()).unwrap();
        assert_eq!(report.ticket.status, TicketStatus::HumanReview);
        assert_eq!(report.steps.len(), 3);
        assert_eq!(
            env.storage.list_demo_steps(&ticket.id).unwrap().len(),
            3
        );
    }

    #[test]
    fn test_demo_script_requires_ai_review_status() {
        let env = WorkflowEnv::new();
        let ticket = Ticket::new(
            generate_id("Fresh"),
            "Fresh".to_string(),
            env.project.id.clone(),
        );
        env.storage.insert_ticket(&ticket).unwrap();
        let engine = WorkflowEngine::new(&env.storage);

        let err = engine.generate_demo_script(&ticket.id, steps()).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn test_full_review_scenario() {
        // StartWork -> CompleteWork -> finding blocks -> fix unblocks ->
        // demo script lands the ticket in human_review.
        let env = WorkflowEnv::new();
        let ticket = reviewed_ticket(&env);
        let engine = WorkflowEngine::new(&env.storage);

        let state = env.storage.get_ticket_state(&ticket.id).unwrap().unwrap();
        assert_eq!(state.review_iteration, 1);

        let submitted = engine
            .submit_finding(
                &ticket.id,
                "review-agent-1",
                FindingSeverity::Major,
                "correctness",
                "form does not validate email",
            )
            .unwrap();
        assert!(!engine.check_complete(&ticket.id).unwrap().can_proceed_to_human_review);

        engine
            .mark_fixed(&submitted.finding.id, Some("validation added"))
            .unwrap();
        assert!(engine.check_complete(&ticket.id).unwrap().can_proceed_to_human_review);

        let report = engine.generate_demo_script(&ticket.id, steps()).unwrap();
        assert_eq!(report.ticket.status, TicketStatus::HumanReview);

        let state = env.storage.get_ticket_state(&ticket.id).unwrap().unwrap();
        assert_eq!(state.phase, WorkflowPhase::HumanReview);
    }
}
