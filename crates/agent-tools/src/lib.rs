//! # agent-tools
//!
//! The tools the agent ships with:
//!
//! - `calculator`: arithmetic on two operands
//! - `datetime`: the current date and time
//! - `scheduler`: add, remove and list recurring jobs that call other tools
//! - `delegate`: run a self-contained task as a nested agent turn
//!
//! Tools are registered explicitly; [`standard_registry`] is the set the
//! binary uses.

mod calculator;
mod datetime;
mod delegate;
mod scheduler;

use std::sync::Arc;

pub use calculator::CalculatorTool;
pub use datetime::DateTimeTool;
pub use delegate::{DELEGATE_ITERATION_LIMIT, DelegateTool};
pub use scheduler::SchedulerTool;

use agent_core::{DecisionProducer, ToolRegistry};
use agent_runtime::Scheduler;

/// Tools that act on nothing but their arguments
pub fn leaf_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CalculatorTool);
    registry.register(DateTimeTool);
    registry
}

/// Registry holding every bundled tool, with the scheduler tool driving
/// `scheduler`. Delegated turns are decided by `producer` and may only use
/// the [`leaf_registry`] tools.
pub fn standard_registry(scheduler: &Scheduler, producer: Arc<dyn DecisionProducer>) -> ToolRegistry {
    let mut registry = leaf_registry();
    registry.register(SchedulerTool::new(scheduler.clone()));
    registry.register(DelegateTool::new(
        producer,
        Arc::new(leaf_registry()),
        DELEGATE_ITERATION_LIMIT,
    ));
    registry
}

#[cfg(test)]
mod tests {
    use agent_core::{Decision, TurnContext};
    use async_trait::async_trait;

    use super::*;

    struct Silent;

    #[async_trait]
    impl DecisionProducer for Silent {
        async fn decide(&self, _context: &TurnContext) -> Decision {
            Decision::reply("")
        }
    }

    #[test]
    fn standard_registry_has_all_tools() {
        let registry = standard_registry(&Scheduler::new(), Arc::new(Silent));
        assert_eq!(registry.names(), vec!["calculator", "datetime", "delegate", "scheduler"]);
        assert_eq!(leaf_registry().names(), vec!["calculator", "datetime"]);
    }
}
