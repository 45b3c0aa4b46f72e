//! Shared test helpers for composite tests.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tandem_core::{
    Agent, AgentError, CallOptions, Context, ContextError, Event, EventStream, Persona, Result,
};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{self, Layer, SubscriberExt};
use tracing_subscriber::registry::{LookupSpan, Registry};

/// What a [`MockAgent`] does with its input.
#[derive(Debug, Clone)]
enum Behavior {
    /// Always produce this text.
    Reply(String),
    /// Produce the input with a suffix appended.
    Append(String),
    /// Fail before producing anything.
    Fail(String),
    /// Stream one chunk, then fail. `invoke` just fails.
    FailMidStream { partial: String, message: String },
    /// Stream text forever; `invoke` waits for the context.
    Endless,
    /// Panic when run.
    Panic(String),
}

#[derive(Default)]
struct Stats {
    invocations: AtomicUsize,
    completions: AtomicUsize,
    streams_started: AtomicUsize,
    released: AtomicBool,
    inputs: Mutex<Vec<String>>,
    last_options: Mutex<Option<CallOptions>>,
}

impl Stats {
    fn record(&self, input: &str, options: &CallOptions) {
        self.inputs.lock().unwrap().push(input.to_string());
        *self.last_options.lock().unwrap() = Some(options.clone());
    }
}

/// Sets `released` when the stream that owns it is dropped.
struct ReleaseOnDrop(Arc<Stats>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.released.store(true, Ordering::SeqCst);
    }
}

/// A scripted leaf agent that records how it was called.
///
/// `stream` splits its output into two `Text` chunks followed by `Done`.
pub struct MockAgent {
    id: String,
    persona: Persona,
    behavior: Behavior,
    delay: Option<Duration>,
    stats: Arc<Stats>,
}

impl MockAgent {
    fn with_behavior(id: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            id: id.into(),
            persona: Persona::new("mock", "scripted output"),
            behavior,
            delay: None,
            stats: Arc::default(),
        }
    }

    pub fn reply(id: impl Into<String>, text: &str) -> Self {
        Self::with_behavior(id, Behavior::Reply(text.into()))
    }

    pub fn append(id: impl Into<String>, suffix: &str) -> Self {
        Self::with_behavior(id, Behavior::Append(suffix.into()))
    }

    pub fn failing(id: impl Into<String>, message: &str) -> Self {
        Self::with_behavior(id, Behavior::Fail(message.into()))
    }

    pub fn fail_mid_stream(id: impl Into<String>, partial: &str, message: &str) -> Self {
        Self::with_behavior(
            id,
            Behavior::FailMidStream {
                partial: partial.into(),
                message: message.into(),
            },
        )
    }

    pub fn endless(id: impl Into<String>) -> Self {
        Self::with_behavior(id, Behavior::Endless)
    }

    pub fn panicking(id: impl Into<String>, message: &str) -> Self {
        Self::with_behavior(id, Behavior::Panic(message.into()))
    }

    /// Wait this long (or until the context is done) before producing output.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn invocations(&self) -> usize {
        self.stats.invocations.load(Ordering::SeqCst)
    }

    /// Calls (invoke or stream) that produced their full output.
    pub fn completions(&self) -> usize {
        self.stats.completions.load(Ordering::SeqCst)
    }

    pub fn streams_started(&self) -> usize {
        self.stats.streams_started.load(Ordering::SeqCst)
    }

    /// Whether a stream from this agent has been dropped.
    pub fn released(&self) -> bool {
        self.stats.released.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.stats.inputs.lock().unwrap().clone()
    }

    pub fn last_options(&self) -> Option<CallOptions> {
        self.stats.last_options.lock().unwrap().clone()
    }
}

impl Behavior {
    fn output(&self, input: &str) -> String {
        match self {
            Self::Reply(text) => text.clone(),
            Self::Append(suffix) => format!("{input}{suffix}"),
            _ => String::new(),
        }
    }
}

/// Sleep for `delay` unless the context finishes first. On a tie the sleep
/// wins, so a deadline equal to the delay still lets the call complete.
async fn pause(ctx: &Context, delay: Option<Duration>) -> Result<()> {
    let Some(delay) = delay else {
        return Ok(());
    };
    tokio::select! {
        biased;
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = ctx.done() => Err(ctx.err().unwrap_or(ContextError::Cancelled).into()),
    }
}

/// Split into two roughly equal chunks on a char boundary, dropping empties.
fn halves(text: &str) -> Vec<String> {
    let mid = text
        .char_indices()
        .map(|(i, _)| i)
        .nth(text.chars().count() / 2)
        .unwrap_or(text.len());
    let (a, b) = text.split_at(mid);
    [a, b]
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[async_trait]
impl Agent for MockAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn persona(&self) -> &Persona {
        &self.persona
    }

    async fn invoke(&self, ctx: &Context, input: &str, options: &CallOptions) -> Result<String> {
        self.stats.invocations.fetch_add(1, Ordering::SeqCst);
        self.stats.record(input, options);
        pause(ctx, self.delay).await?;

        match &self.behavior {
            Behavior::Fail(message) | Behavior::FailMidStream { message, .. } => {
                Err(AgentError::execution(self.id.as_str(), message.as_str()))
            }
            Behavior::Endless => {
                ctx.done().await;
                Err(ctx.err().unwrap_or(ContextError::Cancelled).into())
            }
            Behavior::Panic(message) => panic!("{message}"),
            other => {
                let output = other.output(input);
                self.stats.completions.fetch_add(1, Ordering::SeqCst);
                Ok(output)
            }
        }
    }

    fn stream(&self, ctx: &Context, input: &str, options: &CallOptions) -> EventStream {
        let id = self.id.clone();
        let behavior = self.behavior.clone();
        let delay = self.delay;
        let stats = Arc::clone(&self.stats);
        let ctx = ctx.clone();
        let input = input.to_string();
        let options = options.clone();

        stream! {
            let _release = ReleaseOnDrop(Arc::clone(&stats));
            stats.streams_started.fetch_add(1, Ordering::SeqCst);
            stats.record(&input, &options);

            if let Err(e) = pause(&ctx, delay).await {
                yield Err(e);
                return;
            }

            match behavior {
                Behavior::Fail(message) => {
                    yield Err(AgentError::execution(id.as_str(), message));
                }
                Behavior::FailMidStream { partial, message } => {
                    yield Ok(Event::text(id.as_str(), partial));
                    yield Err(AgentError::execution(id.as_str(), message));
                }
                Behavior::Endless => loop {
                    yield Ok(Event::text(id.as_str(), "tick"));
                    tokio::time::sleep(Duration::from_millis(1)).await;
                },
                Behavior::Panic(message) => panic!("{message}"),
                other => {
                    let output = other.output(&input);
                    for chunk in halves(&output) {
                        yield Ok(Event::text(id.as_str(), chunk));
                    }
                    stats.completions.fetch_add(1, Ordering::SeqCst);
                    yield Ok(Event::done(id.as_str(), output));
                }
            }
        }
        .boxed()
    }
}

/// Drain a stream into a vector.
pub async fn collect(stream: EventStream) -> Vec<Result<Event>> {
    stream.collect().await
}

/// Concatenated text events from one agent, in order.
pub fn text_from(events: &[Event], agent_id: &str) -> String {
    events
        .iter()
        .filter(|e| e.agent_id == agent_id && e.is_text())
        .map(|e| e.text.as_str())
        .collect()
}

/// One `tracing` event captured by [`LogRecorder`].
#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub level: Level,
    pub message: String,
    /// Name of the span the event was recorded in, if any.
    pub span: Option<String>,
}

/// Records `tracing` events while installed as the thread's default subscriber.
#[derive(Clone, Default)]
pub struct LogRecorder {
    events: Arc<Mutex<Vec<LoggedEvent>>>,
}

impl LogRecorder {
    pub fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(Registry::default().with(self.clone()))
    }

    /// Captured events whose message starts with `prefix`.
    pub fn matching(&self, prefix: &str) -> Vec<LoggedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.message.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl<S> Layer<S> for LogRecorder
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: layer::Context<'_, S>) {
        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));
        let span = ctx.event_span(event).map(|s| s.name().to_string());
        self.events.lock().unwrap().push(LoggedEvent {
            level: *event.metadata().level(),
            message,
            span,
        });
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{value:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_split_on_char_boundary() {
        assert_eq!(halves("abcd"), vec!["ab", "cd"]);
        assert_eq!(halves("a"), vec!["a"]);
        assert!(halves("").is_empty());
        assert_eq!(halves("héé").concat(), "héé");
    }

    #[test]
    fn recorder_captures_span_and_level() {
        let recorder = LogRecorder::default();
        let _guard = recorder.install();

        let span = tracing::info_span!("outer");
        tracing::warn!(parent: &span, "Sample: inside");
        tracing::debug!("Sample: outside");

        let events = recorder.matching("Sample:");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].span.as_deref(), Some("outer"));
        assert_eq!(events[0].level, Level::WARN);
        assert_eq!(events[1].span, None);
    }
}
