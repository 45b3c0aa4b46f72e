//! Lifecycle hooks for composite agents.
//!
//! Hooks observe (and can veto or rewrite) a composite call without being
//! part of the composition logic. A composite with no hooks attached behaves
//! exactly as if this module did not exist.

use std::fmt;
use std::sync::Arc;

use tandem_core::{AgentError, Context, Result};

pub type StartHook = Arc<dyn Fn(&Context, &str) -> Result<()> + Send + Sync>;
pub type EndHook = Arc<dyn Fn(&Context, &str, Option<&AgentError>) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&Context, &AgentError) -> Option<AgentError> + Send + Sync>;
pub type IterationHook = Arc<dyn Fn(&Context, usize) -> Result<()> + Send + Sync>;

/// Optional callbacks run around a composite call.
///
/// - `on_start` runs before any child; an `Err` vetoes the call.
/// - `on_end` runs once when the call finishes with a result or an error.
///   It is not run when a stream consumer stops early.
/// - `on_error` may replace the error surfaced to the caller.
/// - `on_iteration` runs at each loop iteration boundary (loop agents only);
///   an `Err` aborts the loop.
#[derive(Clone, Default)]
pub struct Hooks {
    on_start: Option<StartHook>,
    on_end: Option<EndHook>,
    on_error: Option<ErrorHook>,
    on_iteration: Option<IterationHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, f: impl Fn(&Context, &str) -> Result<()> + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    pub fn on_end(
        mut self,
        f: impl Fn(&Context, &str, Option<&AgentError>) + Send + Sync + 'static,
    ) -> Self {
        self.on_end = Some(Arc::new(f));
        self
    }

    pub fn on_error(
        mut self,
        f: impl Fn(&Context, &AgentError) -> Option<AgentError> + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_iteration(mut self, f: impl Fn(&Context, usize) -> Result<()> + Send + Sync + 'static) -> Self {
        self.on_iteration = Some(Arc::new(f));
        self
    }

    /// Merge several hook sets into one.
    ///
    /// `on_start` and `on_iteration` run in order and stop at the first
    /// `Err`. `on_end` runs every callback. `on_error` returns the first
    /// replacement offered. Unset callbacks are skipped.
    pub fn compose(hooks: impl IntoIterator<Item = Hooks>) -> Self {
        let hooks: Arc<[Hooks]> = hooks.into_iter().collect();
        let mut composed = Hooks::default();

        if hooks.iter().any(|h| h.on_start.is_some()) {
            let all = Arc::clone(&hooks);
            composed.on_start = Some(Arc::new(move |ctx: &Context, input: &str| -> Result<()> {
                for f in all.iter().filter_map(|h| h.on_start.as_ref()) {
                    f(ctx, input)?;
                }
                Ok(())
            }));
        }

        if hooks.iter().any(|h| h.on_end.is_some()) {
            let all = Arc::clone(&hooks);
            composed.on_end = Some(Arc::new(
                move |ctx: &Context, result: &str, err: Option<&AgentError>| {
                    for f in all.iter().filter_map(|h| h.on_end.as_ref()) {
                        f(ctx, result, err);
                    }
                },
            ));
        }

        if hooks.iter().any(|h| h.on_error.is_some()) {
            let all = Arc::clone(&hooks);
            composed.on_error = Some(Arc::new(
                move |ctx: &Context, err: &AgentError| -> Option<AgentError> {
                    all.iter()
                        .filter_map(|h| h.on_error.as_ref())
                        .find_map(|f| f(ctx, err))
                },
            ));
        }

        if hooks.iter().any(|h| h.on_iteration.is_some()) {
            let all = Arc::clone(&hooks);
            composed.on_iteration = Some(Arc::new(
                move |ctx: &Context, iteration: usize| -> Result<()> {
                    for f in all.iter().filter_map(|h| h.on_iteration.as_ref()) {
                        f(ctx, iteration)?;
                    }
                    Ok(())
                },
            ));
        }

        composed
    }

    pub fn is_empty(&self) -> bool {
        self.on_start.is_none()
            && self.on_end.is_none()
            && self.on_error.is_none()
            && self.on_iteration.is_none()
    }

    pub(crate) fn run_start(&self, ctx: &Context, input: &str) -> Result<()> {
        match &self.on_start {
            Some(f) => f(ctx, input),
            None => Ok(()),
        }
    }

    pub(crate) fn run_iteration(&self, ctx: &Context, iteration: usize) -> Result<()> {
        match &self.on_iteration {
            Some(f) => f(ctx, iteration),
            None => Ok(()),
        }
    }

    pub(crate) fn run_end(&self, ctx: &Context, result: &str, err: Option<&AgentError>) {
        if let Some(f) = &self.on_end {
            f(ctx, result, err);
        }
    }

    /// Apply `on_error`, then `on_end`, and hand back the error to surface.
    pub(crate) fn fail(&self, ctx: &Context, err: AgentError) -> AgentError {
        let err = match &self.on_error {
            Some(f) => f(ctx, &err).unwrap_or(err),
            None => err,
        };
        self.run_end(ctx, err.partial_output().unwrap_or_default(), Some(&err));
        err
    }

    /// Route a finished `invoke` outcome through `on_error`/`on_end`.
    pub(crate) fn finish(&self, ctx: &Context, outcome: Result<String>) -> Result<String> {
        match outcome {
            Ok(text) => {
                self.run_end(ctx, &text, None);
                Ok(text)
            }
            Err(err) => Err(self.fail(ctx, err)),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_end", &self.on_end.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_iteration", &self.on_iteration.is_some())
            .finish()
    }
}
