//! Error types for agent composition.
//!
//! Uses `thiserror` for ergonomic error definitions. Composites never invent
//! failures of their own: they wrap what a child (or the call context)
//! reported with enough identity to trace it back through a nested tree.

use std::fmt;
use thiserror::Error;

/// Why a [`Context`](crate::context::Context) is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// The composite flavour that wrapped an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    Sequential,
    Parallel,
    Loop,
    Supervisor,
}

impl fmt::Display for CompositeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Loop => "loop",
            Self::Supervisor => "supervisor",
        })
    }
}

/// The top-level error type for all agent calls.
#[derive(Debug, Error)]
pub enum AgentError {
    // --- Call context ---
    #[error(transparent)]
    Context(#[from] ContextError),

    // --- Composite wrapping ---
    #[error("{kind} agent \"{composite}\": child \"{child}\": {source}")]
    Child {
        kind: CompositeKind,
        composite: String,
        child: String,
        #[source]
        source: Box<AgentError>,
    },

    #[error("loop agent \"{composite}\": iteration {iteration}: child \"{child}\": {source}")]
    Iteration {
        composite: String,
        child: String,
        iteration: usize,
        #[source]
        source: Box<AgentError>,
    },

    /// The loop stopped at an iteration boundary because its context was
    /// done. `partial` holds the last value produced before the stop.
    #[error(
        "loop agent \"{composite}\": child \"{child}\": interrupted before iteration {iteration}: {source}"
    )]
    Interrupted {
        composite: String,
        child: String,
        iteration: usize,
        partial: String,
        #[source]
        source: ContextError,
    },

    #[error("supervisor agent \"{composite}\": strategy failed in round {round}: {source}")]
    Strategy {
        composite: String,
        round: usize,
        #[source]
        source: Box<AgentError>,
    },

    #[error("supervisor agent \"{composite}\" has no agents to delegate to")]
    NoAgents { composite: String },

    #[error("parallel agent \"{composite}\": worker for child \"{child}\" panicked: {message}")]
    WorkerPanicked {
        composite: String,
        child: String,
        message: String,
    },

    // --- Lifecycle hooks ---
    #[error("hook rejected {stage} of agent \"{agent}\": {reason}")]
    Hook {
        agent: String,
        stage: &'static str,
        reason: String,
    },

    // --- Leaf failures ---
    #[error("agent \"{agent}\" failed: {message}")]
    Execution { agent: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using [`AgentError`].
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Shorthand for a leaf failure.
    pub fn execution(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            agent: agent.into(),
            message: message.into(),
        }
    }

    /// Wrap `source` as the failure of `child` inside a composite.
    pub fn child(
        kind: CompositeKind,
        composite: impl Into<String>,
        child: impl Into<String>,
        source: AgentError,
    ) -> Self {
        Self::Child {
            kind,
            composite: composite.into(),
            child: child.into(),
            source: Box::new(source),
        }
    }

    /// Wrap `source` as the failure of `child` during loop iteration `iteration`.
    pub fn iteration(
        composite: impl Into<String>,
        child: impl Into<String>,
        iteration: usize,
        source: AgentError,
    ) -> Self {
        Self::Iteration {
            composite: composite.into(),
            child: child.into(),
            iteration,
            source: Box::new(source),
        }
    }

    /// Wrap `source` as a supervisor strategy failure in `round`.
    pub fn strategy(composite: impl Into<String>, round: usize, source: AgentError) -> Self {
        Self::Strategy {
            composite: composite.into(),
            round,
            source: Box::new(source),
        }
    }

    /// The innermost error, following composite wrapping.
    pub fn root_cause(&self) -> &AgentError {
        match self {
            Self::Child { source, .. }
            | Self::Iteration { source, .. }
            | Self::Strategy { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Output preserved by a cancelled loop, if this error carries one.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            Self::Interrupted { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// Whether this failure was caused by the call context being cancelled
    /// or timing out, at any depth of wrapping.
    pub fn is_cancelled(&self) -> bool {
        match self.root_cause() {
            Self::Context(_) | Self::Interrupted { .. } => true,
            _ => false,
        }
    }
}
