pub mod executor;
pub mod graph;
pub mod schema;

pub use executor::{
    PlannedInvocation, StepDescription, StepRecord, StepState, WorkflowExecutor, WorkflowRun,
};
pub use graph::{dependency_closure, step_dependencies, validate};
pub use schema::{OnFailure, WorkflowDefinition, WorkflowStep};
