//! Describable context for warnings and aborts.
//!
//! Anything that can say where an error happened implements
//! [`AbortContext`]. Strings describe themselves; closures are evaluated
//! lazily through [`Lazy`]; any other `Display` value can be wrapped in
//! [`Plain`].

use std::fmt;

pub trait AbortContext {
    fn abort_context(&self) -> String;
}

impl AbortContext for str {
    fn abort_context(&self) -> String {
        self.to_string()
    }
}

impl AbortContext for String {
    fn abort_context(&self) -> String {
        self.clone()
    }
}

impl<T: AbortContext + ?Sized> AbortContext for &T {
    fn abort_context(&self) -> String {
        (**self).abort_context()
    }
}

/// Context computed on demand.
pub struct Lazy<F>(pub F);

impl<F: Fn() -> String> AbortContext for Lazy<F> {
    fn abort_context(&self) -> String {
        (self.0)()
    }
}

/// Context rendered through `Display`.
#[derive(Debug, Clone)]
pub struct Plain<T>(pub T);

impl<T: fmt::Display> AbortContext for Plain<T> {
    fn abort_context(&self) -> String {
        self.0.to_string()
    }
}

/// Prefix `msg` with the rendered context, if any.
pub fn with_context(msg: &str, context: Option<&dyn AbortContext>) -> String {
    match context {
        Some(ctx) => format!("{}:\n{}", ctx.abort_context(), msg),
        None => msg.to_string(),
    }
}
