//! Loop composition: feed one child its own output until told to stop.
//!
//! ```text
//! input ─▶ child ─▶ condition? ──no──▶ child ─▶ … (max_iterations)
//!                       │
//!                      yes ─▶ output
//! ```
//!
//! Cancellation is checked at each iteration boundary and keeps the last good
//! value (`AgentError::partial_output`). A child failure keeps nothing.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tandem_config::{DEFAULT_LOOP_MAX_ITERATIONS, LoopConfig};
use tandem_core::{
    Agent, AgentError, AgentRef, CallOptions, Context, ContextError, Event, EventStream, Persona,
    Result,
};
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::hooks::Hooks;

/// Stop predicate: `(iteration, latest_output) -> stop?`. Iterations count from 0.
pub type LoopCondition = Arc<dyn Fn(usize, &str) -> bool + Send + Sync>;

/// Repeatedly drives a single child, chaining each output into the next call.
pub struct LoopAgent {
    id: String,
    persona: Persona,
    child: [AgentRef; 1],
    max_iterations: usize,
    condition: Option<LoopCondition>,
    hooks: Hooks,
}

impl LoopAgent {
    /// A loop over `child` with the default ceiling and no condition.
    pub fn new(id: impl Into<String>, child: AgentRef) -> Self {
        Self::builder(id, child).build()
    }

    pub fn builder(id: impl Into<String>, child: AgentRef) -> LoopAgentBuilder {
        LoopAgentBuilder {
            id: id.into(),
            persona: Persona::default(),
            child,
            max_iterations: DEFAULT_LOOP_MAX_ITERATIONS as usize,
            condition: None,
            hooks: Hooks::default(),
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    async fn run_loop(&self, ctx: &Context, input: &str, options: &CallOptions) -> Result<String> {
        self.hooks.run_start(ctx, input)?;

        let child = &self.child[0];
        let mut current = input.to_string();
        for i in 0..self.max_iterations {
            if let Some(source) = ctx.err() {
                warn!(iteration = i, "Loop: context done, stopping");
                return Err(interrupted(&self.id, child.id(), i, current, source));
            }
            self.hooks
                .run_iteration(ctx, i)
                .map_err(|e| AgentError::iteration(&self.id, child.id(), i, e))?;

            debug!(iteration = i, input_len = current.len(), "Loop: invoking child");
            current = child.invoke(ctx, &current, options).await.map_err(|e| {
                warn!(iteration = i, error = %e, "Loop: child failed");
                AgentError::iteration(&self.id, child.id(), i, e)
            })?;

            if self.condition.as_ref().is_some_and(|stop| stop(i, &current)) {
                debug!(iteration = i, "Loop: condition satisfied");
                break;
            }
        }

        Ok(current)
    }
}

fn interrupted(
    composite: &str,
    child: &str,
    iteration: usize,
    partial: String,
    source: ContextError,
) -> AgentError {
    AgentError::Interrupted {
        composite: composite.to_string(),
        child: child.to_string(),
        iteration,
        partial,
        source,
    }
}

#[async_trait]
impl Agent for LoopAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn persona(&self) -> &Persona {
        &self.persona
    }

    fn children(&self) -> &[AgentRef] {
        &self.child
    }

    async fn invoke(&self, ctx: &Context, input: &str, options: &CallOptions) -> Result<String> {
        let span = info_span!(
            "loop",
            agent_id = %self.id,
            run_id = %Uuid::new_v4(),
            max_iterations = self.max_iterations
        );

        async {
            let outcome = self.run_loop(ctx, input, options).await;
            self.hooks.finish(ctx, outcome)
        }
        .instrument(span)
        .await
    }

    fn stream(&self, ctx: &Context, input: &str, options: &CallOptions) -> EventStream {
        let id = self.id.clone();
        let child = Arc::clone(&self.child[0]);
        let max_iterations = self.max_iterations;
        let condition = self.condition.clone();
        let hooks = self.hooks.clone();
        let ctx = ctx.clone();
        let options = options.clone();
        let input = input.to_string();

        stream! {
            let span = info_span!(
                "loop",
                agent_id = %id,
                run_id = %Uuid::new_v4(),
                max_iterations
            );
            if let Err(e) = hooks.run_start(&ctx, &input) {
                yield Err(hooks.fail(&ctx, e));
                return;
            }

            let mut current = input;
            for i in 0..max_iterations {
                if let Some(source) = ctx.err() {
                    warn!(parent: &span, iteration = i, "Loop: context done, stopping");
                    yield Err(hooks.fail(&ctx, interrupted(&id, child.id(), i, current, source)));
                    return;
                }
                if let Err(e) = hooks.run_iteration(&ctx, i) {
                    yield Err(hooks.fail(&ctx, AgentError::iteration(&id, child.id(), i, e)));
                    return;
                }

                debug!(parent: &span, iteration = i, "Loop: streaming child");
                let mut events = child.stream(&ctx, &current, &options);
                let mut accumulated = String::new();

                while let Some(item) = events.next().instrument(span.clone()).await {
                    match item {
                        Ok(event) => {
                            if event.is_text() {
                                accumulated.push_str(&event.text);
                            }
                            yield Ok(event);
                        }
                        Err(e) => {
                            warn!(parent: &span, iteration = i, error = %e, "Loop: child stream failed");
                            let wrapped = AgentError::iteration(&id, child.id(), i, e);
                            yield Err(hooks.fail(&ctx, wrapped));
                            return;
                        }
                    }
                }

                current = accumulated;
                if condition.as_ref().is_some_and(|stop| stop(i, &current)) {
                    debug!(parent: &span, iteration = i, "Loop: condition satisfied");
                    break;
                }
            }

            hooks.run_end(&ctx, &current, None);
            yield Ok(Event::done(id.as_str(), current));
        }
        .boxed()
    }
}

impl fmt::Debug for LoopAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopAgent")
            .field("id", &self.id)
            .field("child", &self.child[0].id())
            .field("max_iterations", &self.max_iterations)
            .field("has_condition", &self.condition.is_some())
            .finish()
    }
}

/// Builder for [`LoopAgent`].
pub struct LoopAgentBuilder {
    id: String,
    persona: Persona,
    child: AgentRef,
    max_iterations: usize,
    condition: Option<LoopCondition>,
    hooks: Hooks,
}

impl LoopAgentBuilder {
    /// Set the iteration ceiling. Zero and negative values are ignored and
    /// the previous ceiling is kept.
    pub fn with_max_iterations(mut self, n: i64) -> Self {
        match usize::try_from(n) {
            Ok(n) if n > 0 => self.max_iterations = n,
            _ => warn!(
                agent_id = %self.id,
                requested = n,
                kept = self.max_iterations,
                "Loop: ignoring non-positive max_iterations"
            ),
        }
        self
    }

    /// Stop as soon as `condition(iteration, output)` returns true.
    pub fn with_condition(
        mut self,
        condition: impl Fn(usize, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn with_config(self, config: &LoopConfig) -> Self {
        self.with_max_iterations(config.max_iterations)
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> LoopAgent {
        LoopAgent {
            id: self.id,
            persona: self.persona,
            child: [self.child],
            max_iterations: self.max_iterations,
            condition: self.condition,
            hooks: self.hooks,
        }
    }
}
