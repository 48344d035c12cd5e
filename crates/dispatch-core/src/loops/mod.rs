pub mod controller;
pub mod plan;

pub use controller::{
    IterationLog, IterationOutcome, IterationRecord, LoopController, LoopOptions, LoopReport,
    StopReason,
};
pub use plan::{count_checkboxes, read_status, PlanStatus};
