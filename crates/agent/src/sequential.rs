//! Sequential composition: thread one value through N children in order.
//!
//! ```text
//! input ─▶ child[0] ─▶ child[1] ─▶ … ─▶ child[n-1] ─▶ output
//! ```
//!
//! Failure is all-or-nothing: the first failing child ends the chain and no
//! partial output is returned. With no children the agent is the identity.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tandem_core::{
    Agent, AgentError, AgentRef, CallOptions, CompositeKind, Context, Event, EventStream, Persona,
    Result,
};
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::hooks::Hooks;

/// Chains children so each one's output becomes the next one's input.
pub struct SequentialAgent {
    id: String,
    persona: Persona,
    children: Arc<[AgentRef]>,
    hooks: Hooks,
}

impl SequentialAgent {
    /// Create a sequential agent over `children`, run in the given order.
    pub fn new(id: impl Into<String>, children: Vec<AgentRef>) -> Self {
        Self::builder(id).children(children).build()
    }

    pub fn builder(id: impl Into<String>) -> SequentialAgentBuilder {
        SequentialAgentBuilder {
            id: id.into(),
            persona: Persona::default(),
            children: Vec::new(),
            hooks: Hooks::default(),
        }
    }

    async fn run_chain(&self, ctx: &Context, input: &str, options: &CallOptions) -> Result<String> {
        self.hooks.run_start(ctx, input)?;

        let mut current = input.to_string();
        for child in self.children.iter() {
            debug!(child = child.id(), input_len = current.len(), "Sequential: invoking child");
            current = child.invoke(ctx, &current, options).await.map_err(|e| {
                warn!(child = child.id(), error = %e, "Sequential: child failed");
                AgentError::child(CompositeKind::Sequential, &self.id, child.id(), e)
            })?;
        }

        Ok(current)
    }
}

#[async_trait]
impl Agent for SequentialAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn persona(&self) -> &Persona {
        &self.persona
    }

    fn children(&self) -> &[AgentRef] {
        &self.children
    }

    async fn invoke(&self, ctx: &Context, input: &str, options: &CallOptions) -> Result<String> {
        let span = info_span!(
            "sequential",
            agent_id = %self.id,
            run_id = %Uuid::new_v4(),
            children = self.children.len()
        );

        async {
            let outcome = self.run_chain(ctx, input, options).await;
            self.hooks.finish(ctx, outcome)
        }
        .instrument(span)
        .await
    }

    fn stream(&self, ctx: &Context, input: &str, options: &CallOptions) -> EventStream {
        let id = self.id.clone();
        let children = Arc::clone(&self.children);
        let hooks = self.hooks.clone();
        let ctx = ctx.clone();
        let options = options.clone();
        let input = input.to_string();

        stream! {
            let span = info_span!(
                "sequential",
                agent_id = %id,
                run_id = %Uuid::new_v4(),
                children = children.len()
            );
            if let Err(e) = hooks.run_start(&ctx, &input) {
                yield Err(hooks.fail(&ctx, e));
                return;
            }

            let mut current = input;
            for child in children.iter() {
                debug!(parent: &span, child = child.id(), "Sequential: streaming child");
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
                            warn!(parent: &span, child = child.id(), error = %e, "Sequential: child stream failed");
                            let wrapped = AgentError::child(CompositeKind::Sequential, &id, child.id(), e);
                            yield Err(hooks.fail(&ctx, wrapped));
                            return;
                        }
                    }
                }

                current = accumulated;
            }

            hooks.run_end(&ctx, &current, None);
            yield Ok(Event::done(id.as_str(), current));
        }
        .boxed()
    }
}

/// Builder for [`SequentialAgent`].
pub struct SequentialAgentBuilder {
    id: String,
    persona: Persona,
    children: Vec<AgentRef>,
    hooks: Hooks,
}

impl SequentialAgentBuilder {
    /// Append one child to the chain.
    pub fn child(mut self, child: AgentRef) -> Self {
        self.children.push(child);
        self
    }

    /// Append several children, keeping their order.
    pub fn children(mut self, children: impl IntoIterator<Item = AgentRef>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> SequentialAgent {
        SequentialAgent {
            id: self.id,
            persona: self.persona,
            children: self.children.into(),
            hooks: self.hooks,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
