//! Install planning and execution.
//!
//! [`plan::plan`] turns a resolution into an ordered [`plan::InstallPlan`]
//! without touching the filesystem; [`execute::execute`] consumes the plan
//! and hands each step to a [`execute::PlanExecutor`].

pub mod execute;
pub mod plan;
