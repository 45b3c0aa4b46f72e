//! Parallel composition: run every child on the same input concurrently.
//!
//! ```text
//!          ┌─▶ child[0] ─┐
//! input ───┼─▶ child[1] ─┼─▶ barrier ─▶ results joined with "\n"
//!          └─▶ child[n] ─┘
//! ```
//!
//! `invoke` always lets every child finish before reporting; the first error
//! by declaration order wins. `stream` fans all child events into one bounded
//! channel. Worker tasks live in a `JoinSet` owned by the stream, so dropping
//! the stream (or ending it on an error) aborts whatever is still running.

use async_stream::stream;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tandem_config::{DEFAULT_PARALLEL_BUFFER_PER_CHILD, ParallelConfig};
use tandem_core::{
    Agent, AgentError, AgentRef, CallOptions, CompositeKind, Context, Event, EventStream, Persona,
    Result,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::hooks::Hooks;

/// Fans one input out to every child and joins their outputs.
pub struct ParallelAgent {
    id: String,
    persona: Persona,
    children: Arc<[AgentRef]>,
    buffer_per_child: usize,
    hooks: Hooks,
}

impl ParallelAgent {
    pub fn new(id: impl Into<String>, children: Vec<AgentRef>) -> Self {
        Self::builder(id).children(children).build()
    }

    pub fn builder(id: impl Into<String>) -> ParallelAgentBuilder {
        ParallelAgentBuilder {
            id: id.into(),
            persona: Persona::default(),
            children: Vec::new(),
            buffer_per_child: DEFAULT_PARALLEL_BUFFER_PER_CHILD,
            hooks: Hooks::default(),
        }
    }

    /// Fan-in channel slots reserved per child when streaming.
    pub fn buffer_per_child(&self) -> usize {
        self.buffer_per_child
    }

    async fn run_all(&self, ctx: &Context, input: &str, options: &CallOptions) -> Result<String> {
        self.hooks.run_start(ctx, input)?;

        let mut workers = JoinSet::new();
        for (index, child) in self.children.iter().enumerate() {
            let child = Arc::clone(child);
            let ctx = ctx.clone();
            let input = input.to_string();
            let options = options.clone();

            workers.spawn(
                async move {
                    debug!(child = child.id(), "Parallel: invoking child");
                    let outcome = AssertUnwindSafe(child.invoke(&ctx, &input, &options))
                        .catch_unwind()
                        .await
                        .map_err(|payload| panic_message(&*payload));
                    (index, outcome)
                }
                .in_current_span(),
            );
        }

        // Barrier: every child reports before anything is returned.
        let (outcomes, join_failure) = join_workers(&mut workers, self.children.len()).await;

        let mut results = Vec::with_capacity(outcomes.len());
        for (child, outcome) in self.children.iter().zip(outcomes) {
            match outcome {
                Some(Ok(Ok(text))) => results.push(text),
                Some(Ok(Err(e))) => {
                    warn!(child = child.id(), error = %e, "Parallel: child failed");
                    return Err(AgentError::child(
                        CompositeKind::Parallel,
                        &self.id,
                        child.id(),
                        e,
                    ));
                }
                Some(Err(message)) => {
                    warn!(child = child.id(), %message, "Parallel: worker panicked");
                    return Err(AgentError::WorkerPanicked {
                        composite: self.id.clone(),
                        child: child.id().to_string(),
                        message,
                    });
                }
                None => {
                    let message = join_failure
                        .clone()
                        .unwrap_or_else(|| "worker did not report".to_string());
                    warn!(child = child.id(), %message, "Parallel: worker lost");
                    return Err(AgentError::WorkerPanicked {
                        composite: self.id.clone(),
                        child: child.id().to_string(),
                        message,
                    });
                }
            }
        }

        Ok(results.join("\n"))
    }
}

type Outcome = std::result::Result<Result<String>, String>;

/// Drain every worker into its slot. A task that fails to join leaves its
/// slot empty; the first such failure is returned alongside the slots.
async fn join_workers(
    workers: &mut JoinSet<(usize, Outcome)>,
    slots: usize,
) -> (Vec<Option<Outcome>>, Option<String>) {
    let mut outcomes: Vec<Option<Outcome>> = (0..slots).map(|_| None).collect();
    let mut failure = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = Some(outcome),
            Err(e) => {
                let message = if e.is_panic() {
                    panic_message(&*e.into_panic())
                } else {
                    e.to_string()
                };
                warn!(error = %message, "Parallel: worker failed to join");
                failure.get_or_insert(message);
            }
        }
    }
    (outcomes, failure)
}

#[async_trait]
impl Agent for ParallelAgent {
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
            "parallel",
            agent_id = %self.id,
            run_id = %Uuid::new_v4(),
            children = self.children.len()
        );

        async {
            let outcome = self.run_all(ctx, input, options).await;
            self.hooks.finish(ctx, outcome)
        }
        .instrument(span)
        .await
    }

    fn stream(&self, ctx: &Context, input: &str, options: &CallOptions) -> EventStream {
        let id = self.id.clone();
        let children = Arc::clone(&self.children);
        let buffer_per_child = self.buffer_per_child;
        let hooks = self.hooks.clone();
        let ctx = ctx.clone();
        let options = options.clone();
        let input = input.to_string();

        stream! {
            let span = info_span!(
                "parallel",
                agent_id = %id,
                run_id = %Uuid::new_v4(),
                children = children.len()
            );
            if let Err(e) = hooks.run_start(&ctx, &input) {
                yield Err(hooks.fail(&ctx, e));
                return;
            }

            let capacity = buffer_per_child.saturating_mul(children.len()).max(1);
            let (tx, mut rx) = mpsc::channel(capacity);
            let mut workers = JoinSet::new();
            for child in children.iter() {
                workers.spawn(
                    pump(
                        id.clone(),
                        Arc::clone(child),
                        ctx.clone(),
                        input.clone(),
                        options.clone(),
                        tx.clone(),
                    )
                    .instrument(span.clone()),
                );
            }
            drop(tx);
            debug!(parent: &span, workers = workers.len(), capacity, "Parallel: streaming children");

            // The channel closes once every worker has dropped its sender.
            while let Some(item) = rx.recv().instrument(span.clone()).await {
                match item {
                    Ok(event) => yield Ok(event),
                    Err(e) => {
                        warn!(parent: &span, error = %e, "Parallel: child stream failed");
                        workers.abort_all();
                        yield Err(hooks.fail(&ctx, e));
                        return;
                    }
                }
            }

            hooks.run_end(&ctx, "", None);
            yield Ok(Event::done(id.as_str(), ""));
        }
        .boxed()
    }
}

/// Forward one child's stream into the shared channel.
///
/// The branch stops after the child's first error or once the receiver is
/// gone. A panic in the child becomes a `WorkerPanicked` item.
async fn pump(
    composite: String,
    child: AgentRef,
    ctx: Context,
    input: String,
    options: CallOptions,
    tx: mpsc::Sender<Result<Event>>,
) {
    let child_id = child.id().to_string();

    let forward = async {
        let mut events = child.stream(&ctx, &input, &options);
        while let Some(item) = events.next().await {
            let item = item.map_err(|e| {
                AgentError::child(CompositeKind::Parallel, &composite, &child_id, e)
            });
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
        debug!(child = %child_id, "Parallel: child stream finished");
    };

    if let Err(payload) = AssertUnwindSafe(forward).catch_unwind().await {
        let _ = tx
            .send(Err(AgentError::WorkerPanicked {
                composite,
                child: child_id,
                message: panic_message(&*payload),
            }))
            .await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Builder for [`ParallelAgent`].
pub struct ParallelAgentBuilder {
    id: String,
    persona: Persona,
    children: Vec<AgentRef>,
    buffer_per_child: usize,
    hooks: Hooks,
}

impl ParallelAgentBuilder {
    pub fn child(mut self, child: AgentRef) -> Self {
        self.children.push(child);
        self
    }

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

    /// Zero is ignored.
    pub fn with_buffer_per_child(mut self, slots: usize) -> Self {
        if slots == 0 {
            warn!(
                agent_id = %self.id,
                kept = self.buffer_per_child,
                "Parallel: ignoring zero buffer_per_child"
            );
        } else {
            self.buffer_per_child = slots;
        }
        self
    }

    pub fn with_config(self, config: &ParallelConfig) -> Self {
        self.with_buffer_per_child(config.buffer_per_child)
    }

    pub fn build(self) -> ParallelAgent {
        ParallelAgent {
            id: self.id,
            persona: self.persona,
            children: self.children.into(),
            buffer_per_child: self.buffer_per_child,
            hooks: self.hooks,
        }
    }
}
