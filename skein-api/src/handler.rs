//! # Task Handlers
//!
//! A [`TaskHandler`] is the code that runs on an execution unit thread. The
//! pool shares one handler between all units through an `Arc`, so handlers
//! must be `Send + Sync` and should keep any state they need immutable or
//! internally synchronized. Units never see orchestrator state.
//!
//! [`HandlerRegistry`] routes by [`TaskInput::task_type`], which is the usual
//! way to give a pool several kinds of work.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::task::TaskInput;

/// Executes tasks on an execution unit thread.
pub trait TaskHandler: Send + Sync + 'static {
    /// Execute one attempt of a task.
    ///
    /// An `Err` is reported to the caller as a task execution failure and is
    /// retried under the task's retry policy. A panic is caught by the unit
    /// and treated as a unit crash.
    fn handle(&self, input: TaskInput<'_>) -> Result<Value, String>;

    /// Called once on each freshly created unit when preheating is enabled,
    /// before the unit serves real tasks.
    fn warm_up(&self) {}
}

/// Adapts a closure into a [`TaskHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> TaskHandler for FnHandler<F>
where
    F: Fn(TaskInput<'_>) -> Result<Value, String> + Send + Sync + 'static,
{
    fn handle(&self, input: TaskInput<'_>) -> Result<Value, String> {
        (self.f)(input)
    }
}

/// Wrap a closure as a handler.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(TaskInput<'_>) -> Result<Value, String> + Send + Sync + 'static,
{
    FnHandler { f }
}

/// Routes tasks to handlers by task type.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn TaskHandler>>,
    fallback: Option<Box<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure for a task type, replacing any previous handler.
    pub fn register<F>(self, task_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(TaskInput<'_>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register_handler(task_type, handler_fn(f))
    }

    /// Register a handler value for a task type, replacing any previous handler.
    pub fn register_handler(mut self, task_type: impl Into<String>, handler: impl TaskHandler) -> Self {
        self.handlers.insert(task_type.into(), Box::new(handler));
        self
    }

    /// Handler used for task types with no registered handler.
    pub fn with_fallback(mut self, handler: impl TaskHandler) -> Self {
        self.fallback = Some(Box::new(handler));
        self
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl TaskHandler for HandlerRegistry {
    fn handle(&self, input: TaskInput<'_>) -> Result<Value, String> {
        match self.handlers.get(input.task_type).or(self.fallback.as_ref()) {
            Some(handler) => handler.handle(input),
            None => Err(format!("no handler registered for task type '{}'", input.task_type)),
        }
    }

    fn warm_up(&self) {
        for handler in self.handlers.values() {
            handler.warm_up();
        }
        if let Some(fallback) = &self.fallback {
            fallback.warm_up();
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("HandlerRegistry")
            .field("task_types", &types)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}
