//! Workflow engine
//!
//! Runs the steps of one workflow strictly sequentially against a fresh
//! incident context, records every result as a finding, then hands the
//! context to the diagnosis reasoner.
//!
//! Failure semantics:
//! - unknown step id → warning + failure finding, workflow continues;
//! - step returns `proceed = false` → remaining steps skipped, reasoner runs;
//! - step returns `Err` → incident marked failed, reasoner does not run.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::types::{Event, IncidentReport};
use crate::workflow::steps::{handler_table, StepHandler, StepToolkit};
use crate::workflow::{reasoner, IncidentContext, WorkflowKind};

/// Executes investigation workflows. Object-safe so the dispatcher (and
/// tests) can swap in alternative engines.
#[async_trait]
pub trait InvestigationEngine: Send + Sync {
    async fn execute_workflow(
        &self,
        workflow: WorkflowKind,
        incident_id: &str,
        event: Event,
    ) -> IncidentReport;
}

pub struct WorkflowEngine {
    toolkit: Arc<StepToolkit>,
    handlers: HashMap<&'static str, StepHandler>,
}

impl WorkflowEngine {
    pub fn new(toolkit: Arc<StepToolkit>) -> Self {
        let handlers = handler_table();
        info!(
            workflows = WorkflowKind::all().len(),
            steps = handlers.len(),
            "Workflow engine initialized"
        );
        Self { toolkit, handlers }
    }

    #[cfg(test)]
    fn with_handlers(
        toolkit: Arc<StepToolkit>,
        handlers: HashMap<&'static str, StepHandler>,
    ) -> Self {
        Self { toolkit, handlers }
    }
}

#[async_trait]
impl InvestigationEngine for WorkflowEngine {
    async fn execute_workflow(
        &self,
        workflow: WorkflowKind,
        incident_id: &str,
        event: Event,
    ) -> IncidentReport {
        info!(
            incident = incident_id,
            workflow = %workflow,
            "Executing workflow '{}'",
            workflow.title()
        );

        let mut ctx = IncidentContext::new(incident_id, workflow, event);

        for step in workflow.steps() {
            info!(incident = incident_id, step, "Executing step");

            let Some(handler) = self.handlers.get(step) else {
                warn!(step, "No handler for step");
                ctx.record_finding(
                    step,
                    crate::types::StepReport::failed(format!("No handler for step: {step}"))
                        .into_value(),
                );
                continue;
            };

            match handler(self.toolkit.as_ref(), &mut ctx).await {
                Ok(report) => {
                    let proceed = report.proceed;
                    ctx.record_finding(step, report.into_value());
                    if !proceed {
                        info!(incident = incident_id, step, "Step requested early stop");
                        break;
                    }
                }
                Err(e) => {
                    error!(incident = incident_id, step, "Workflow execution failed: {e}");
                    return IncidentReport {
                        success: false,
                        incident_id: incident_id.to_string(),
                        workflow: workflow.as_str().to_string(),
                        root_cause: None,
                        recommendations: Vec::new(),
                        duration_secs: (Utc::now() - ctx.started_at).num_milliseconds() as f64
                            / 1000.0,
                        findings: ctx.findings,
                        error: Some(e.to_string()),
                    };
                }
            }
        }

        let root_cause = reasoner::determine_root_cause(&ctx);
        let recommendations = reasoner::recommendations(workflow);
        let duration_secs = (Utc::now() - ctx.started_at).num_milliseconds() as f64 / 1000.0;

        info!(
            incident = incident_id,
            root_cause = %root_cause,
            duration = duration_secs,
            "Workflow complete"
        );

        IncidentReport {
            success: true,
            incident_id: incident_id.to_string(),
            workflow: workflow.as_str().to_string(),
            root_cause: Some(root_cause),
            recommendations,
            duration_secs,
            findings: ctx.findings,
            error: None,
        }
    }
}
