use super::ForwardEvent;
use tokio::sync::mpsc;

/// Sink for exchange and health events feeding the metrics collector.
///
/// A disabled emitter never builds an event. Once the collector is gone,
/// events are dropped silently; the query path never waits on it.
#[derive(Clone)]
pub struct ForwardEventEmitter {
    sender: Option<mpsc::UnboundedSender<ForwardEvent>>,
}

impl ForwardEventEmitter {
    pub fn new_disabled() -> Self {
        Self { sender: None }
    }

    pub fn new_enabled() -> (Self, mpsc::UnboundedReceiver<ForwardEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: Some(tx) }, rx)
    }

    /// Builds the event only when someone is listening. Returns whether it
    /// was handed to the collector.
    pub fn emit_with(&self, build: impl FnOnce() -> ForwardEvent) -> bool {
        match &self.sender {
            Some(tx) if !tx.is_closed() => tx.send(build()).is_ok(),
            _ => false,
        }
    }

    pub fn emit(&self, event: ForwardEvent) -> bool {
        self.emit_with(|| event)
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

impl Default for ForwardEventEmitter {
    fn default() -> Self {
        Self::new_disabled()
    }
}

impl std::fmt::Debug for ForwardEventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardEventEmitter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
