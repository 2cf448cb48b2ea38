//! Message handlers and the ordered chain that dispatches to them.
//!
//! A handler receives either a decoded message or `None`, the termination
//! signal sent once on shutdown, and returns the message to pass on. Returning
//! `None` stops propagation for that message.

use std::sync::Arc;

use crate::message::Message;

/// A stage of the handler chain.
///
/// Implementations must treat a `None` input as the termination signal:
/// release resources and return `None`.
pub trait Handler: Send + Sync {
    fn handle(&self, message: Option<Message>) -> Option<Message>;
}

impl<F> Handler for F
where
    F: Fn(Option<Message>) -> Option<Message> + Send + Sync,
{
    fn handle(&self, message: Option<Message>) -> Option<Message> {
        self(message)
    }
}

/// Ordered sequence of handlers.
#[derive(Clone, Default)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn Handler>>,
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerChain")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the end of the chain.
    pub fn push(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Feed `message` through the handlers in order.
    ///
    /// Each handler gets the previous one's output. Dispatch stops as soon as
    /// a handler returns `None`; the first handler is always called, even
    /// with a `None` input.
    pub fn dispatch(&self, message: Option<Message>) -> Option<Message> {
        let mut current = message;
        for handler in &self.handlers {
            current = handler.handle(current);
            if current.is_none() {
                break;
            }
        }
        current
    }
}

impl FromIterator<Arc<dyn Handler>> for HandlerChain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Handler>>>(iter: I) -> Self {
        Self {
            handlers: iter.into_iter().collect(),
        }
    }
}
