//! Composite agents: combine independent agents into larger ones.
//!
//! Four composites are provided, each of which is itself an [`Agent`]:
//!
//! 1. **[`SequentialAgent`]**: pipe one value through children in order
//! 2. **[`ParallelAgent`]**: run children concurrently on the same input
//! 3. **[`LoopAgent`]**: re-run one child on its own output until a
//!    condition holds or the iteration ceiling is reached
//! 4. **[`SupervisorAgent`]**: let a strategy pick which agent handles each
//!    round, chaining outputs until the strategy stops or rounds run out
//!
//! Because composites satisfy the same trait as leaves, they nest freely:
//! a pipeline can contain a fan-out whose branches are refinement loops.
//!
//! [`Agent`]: tandem_core::Agent

pub mod hooks;
pub mod loop_agent;
pub mod parallel;
pub mod sequential;
pub mod supervisor;
pub mod tree;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use hooks::Hooks;
pub use loop_agent::{LoopAgent, LoopAgentBuilder, LoopCondition};
pub use parallel::{ParallelAgent, ParallelAgentBuilder};
pub use sequential::{SequentialAgent, SequentialAgentBuilder};
pub use supervisor::{
    SupervisorAgent, SupervisorAgentBuilder, SupervisorStrategy, load_balanced, round_robin,
};
