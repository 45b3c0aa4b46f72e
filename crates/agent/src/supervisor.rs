//! Supervisor composition: a strategy picks which agent handles each round.
//!
//! ```text
//!                  ┌─▶ agent[0]
//! input ─▶ strategy┼─▶ agent[1] ─▶ output ─▶ strategy ─▶ … (max_rounds)
//!                  └─▶ agent[n]
//! ```
//!
//! Each round's output is the next round's input. The strategy ends the run
//! early by returning `None`. When streaming, every round but the last is
//! invoked and only the final round's agent is streamed.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tandem_config::{DEFAULT_SUPERVISOR_MAX_ROUNDS, SupervisorConfig};
use tandem_core::{
    Agent, AgentError, AgentRef, CallOptions, CompositeKind, Context, Event, EventStream, Persona,
    Result,
};
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::hooks::Hooks;

/// Delegation policy: `(ctx, input, agents) -> agent to run`, or `None` to stop.
pub type SupervisorStrategy =
    Arc<dyn Fn(&Context, &str, &[AgentRef]) -> Result<Option<AgentRef>> + Send + Sync>;

/// Delegates each round to the agent its strategy selects.
pub struct SupervisorAgent {
    id: String,
    persona: Persona,
    agents: Arc<[AgentRef]>,
    strategy: SupervisorStrategy,
    max_rounds: usize,
    hooks: Hooks,
}

impl SupervisorAgent {
    pub fn new(
        id: impl Into<String>,
        strategy: impl Fn(&Context, &str, &[AgentRef]) -> Result<Option<AgentRef>>
        + Send
        + Sync
        + 'static,
        agents: Vec<AgentRef>,
    ) -> Self {
        Self::builder(id, strategy).agents(agents).build()
    }

    pub fn builder(
        id: impl Into<String>,
        strategy: impl Fn(&Context, &str, &[AgentRef]) -> Result<Option<AgentRef>>
        + Send
        + Sync
        + 'static,
    ) -> SupervisorAgentBuilder {
        SupervisorAgentBuilder {
            id: id.into(),
            persona: Persona::default(),
            agents: Vec::new(),
            strategy: Arc::new(strategy),
            max_rounds: DEFAULT_SUPERVISOR_MAX_ROUNDS as usize,
            hooks: Hooks::default(),
        }
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    async fn run_rounds(&self, ctx: &Context, input: &str, options: &CallOptions) -> Result<String> {
        self.hooks.run_start(ctx, input)?;
        if self.agents.is_empty() {
            warn!("Supervisor: no agents to delegate to");
            return Err(AgentError::NoAgents {
                composite: self.id.clone(),
            });
        }

        let mut current = input.to_string();
        for round in 0..self.max_rounds {
            if let Some(source) = ctx.err() {
                warn!(round, "Supervisor: context done, stopping");
                return Err(source.into());
            }
            self.hooks.run_iteration(ctx, round)?;

            let chosen = (self.strategy)(ctx, &current, &self.agents[..]).map_err(|e| {
                warn!(round, error = %e, "Supervisor: strategy failed");
                AgentError::strategy(&self.id, round, e)
            })?;
            let Some(agent) = chosen else {
                debug!(round, "Supervisor: strategy ended delegation");
                break;
            };

            debug!(round, agent = agent.id(), "Supervisor: delegating");
            current = agent.invoke(ctx, &current, options).await.map_err(|e| {
                warn!(round, agent = agent.id(), error = %e, "Supervisor: agent failed");
                AgentError::child(CompositeKind::Supervisor, &self.id, agent.id(), e)
            })?;
        }

        Ok(current)
    }
}

#[async_trait]
impl Agent for SupervisorAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn persona(&self) -> &Persona {
        &self.persona
    }

    fn children(&self) -> &[AgentRef] {
        &self.agents
    }

    async fn invoke(&self, ctx: &Context, input: &str, options: &CallOptions) -> Result<String> {
        let span = info_span!(
            "supervisor",
            agent_id = %self.id,
            run_id = %Uuid::new_v4(),
            agents = self.agents.len(),
            max_rounds = self.max_rounds
        );

        async {
            let outcome = self.run_rounds(ctx, input, options).await;
            self.hooks.finish(ctx, outcome)
        }
        .instrument(span)
        .await
    }

    fn stream(&self, ctx: &Context, input: &str, options: &CallOptions) -> EventStream {
        let id = self.id.clone();
        let agents = Arc::clone(&self.agents);
        let strategy = Arc::clone(&self.strategy);
        let max_rounds = self.max_rounds;
        let hooks = self.hooks.clone();
        let ctx = ctx.clone();
        let options = options.clone();
        let input = input.to_string();

        stream! {
            let span = info_span!(
                "supervisor",
                agent_id = %id,
                run_id = %Uuid::new_v4(),
                agents = agents.len(),
                max_rounds
            );
            if let Err(e) = hooks.run_start(&ctx, &input) {
                yield Err(hooks.fail(&ctx, e));
                return;
            }
            if agents.is_empty() {
                warn!(parent: &span, "Supervisor: no agents to delegate to");
                yield Err(hooks.fail(&ctx, AgentError::NoAgents { composite: id.clone() }));
                return;
            }

            let mut current = input;
            for round in 0..max_rounds {
                if let Some(source) = ctx.err() {
                    warn!(parent: &span, round, "Supervisor: context done, stopping");
                    yield Err(hooks.fail(&ctx, source.into()));
                    return;
                }
                if let Err(e) = hooks.run_iteration(&ctx, round) {
                    yield Err(hooks.fail(&ctx, e));
                    return;
                }

                let agent = match strategy(&ctx, &current, &agents[..]) {
                    Ok(Some(agent)) => agent,
                    Ok(None) => {
                        debug!(parent: &span, round, "Supervisor: strategy ended delegation");
                        break;
                    }
                    Err(e) => {
                        warn!(parent: &span, round, error = %e, "Supervisor: strategy failed");
                        yield Err(hooks.fail(&ctx, AgentError::strategy(&id, round, e)));
                        return;
                    }
                };

                if round + 1 < max_rounds {
                    debug!(parent: &span, round, agent = agent.id(), "Supervisor: delegating");
                    match agent.invoke(&ctx, &current, &options).instrument(span.clone()).await {
                        Ok(output) => current = output,
                        Err(e) => {
                            warn!(parent: &span, round, agent = agent.id(), error = %e, "Supervisor: agent failed");
                            let wrapped = AgentError::child(CompositeKind::Supervisor, &id, agent.id(), e);
                            yield Err(hooks.fail(&ctx, wrapped));
                            return;
                        }
                    }
                    continue;
                }

                debug!(parent: &span, round, agent = agent.id(), "Supervisor: streaming agent");
                let mut events = agent.stream(&ctx, &current, &options);
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
                            warn!(parent: &span, round, agent = agent.id(), error = %e, "Supervisor: agent stream failed");
                            let wrapped = AgentError::child(CompositeKind::Supervisor, &id, agent.id(), e);
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

impl fmt::Debug for SupervisorAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorAgent")
            .field("id", &self.id)
            .field("agents", &self.agents.iter().map(|a| a.id()).collect::<Vec<_>>())
            .field("max_rounds", &self.max_rounds)
            .finish()
    }
}

/// Cycle through the agents in order, wrapping around.
pub fn round_robin()
-> impl Fn(&Context, &str, &[AgentRef]) -> Result<Option<AgentRef>> + Send + Sync + 'static {
    let next = AtomicUsize::new(0);
    move |_, _, agents| {
        if agents.is_empty() {
            return Ok(None);
        }
        let index = next.fetch_add(1, Ordering::Relaxed) % agents.len();
        Ok(Some(Arc::clone(&agents[index])))
    }
}

/// Pick the agent that has been delegated to least often. Ties go to the
/// earliest agent.
pub fn load_balanced()
-> impl Fn(&Context, &str, &[AgentRef]) -> Result<Option<AgentRef>> + Send + Sync + 'static {
    let load: Mutex<HashMap<String, usize>> = Mutex::default();
    move |_, _, agents| {
        let mut load = load.lock().unwrap_or_else(PoisonError::into_inner);
        let chosen = agents
            .iter()
            .min_by_key(|agent| load.get(agent.id()).copied().unwrap_or(0))
            .cloned();
        if let Some(agent) = &chosen {
            *load.entry(agent.id().to_string()).or_default() += 1;
        }
        Ok(chosen)
    }
}

/// Builder for [`SupervisorAgent`].
pub struct SupervisorAgentBuilder {
    id: String,
    persona: Persona,
    agents: Vec<AgentRef>,
    strategy: SupervisorStrategy,
    max_rounds: usize,
    hooks: Hooks,
}

impl SupervisorAgentBuilder {
    pub fn agent(mut self, agent: AgentRef) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn agents(mut self, agents: impl IntoIterator<Item = AgentRef>) -> Self {
        self.agents.extend(agents);
        self
    }

    /// Set the round ceiling. Zero and negative values are ignored and the
    /// previous ceiling is kept.
    pub fn with_max_rounds(mut self, n: i64) -> Self {
        match usize::try_from(n) {
            Ok(n) if n > 0 => self.max_rounds = n,
            _ => warn!(
                agent_id = %self.id,
                requested = n,
                kept = self.max_rounds,
                "Supervisor: ignoring non-positive max_rounds"
            ),
        }
        self
    }

    pub fn with_config(self, config: &SupervisorConfig) -> Self {
        self.with_max_rounds(config.max_rounds)
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> SupervisorAgent {
        SupervisorAgent {
            id: self.id,
            persona: self.persona,
            agents: self.agents.into(),
            strategy: self.strategy,
            max_rounds: self.max_rounds,
            hooks: self.hooks,
        }
    }
}
