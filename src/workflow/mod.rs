//! Investigation workflows
//!
//! Declarative step lists per workflow, a sequential step executor threading
//! a mutable per-incident context, and a rule-based diagnosis reasoner.

pub mod context;
pub mod engine;
pub mod reasoner;
pub mod registry;
pub mod steps;

pub use context::IncidentContext;
pub use engine::{InvestigationEngine, WorkflowEngine};
pub use registry::WorkflowKind;
pub use steps::{StepHandler, StepToolkit};
