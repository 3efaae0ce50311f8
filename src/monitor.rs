//! Flow monitor: a small publish/subscribe bus for engine messages.
//!
//! Collaborators announce what they are about to do (an *intention*) and
//! report what happened. Observers see every message; any observer may veto
//! an intention, which is how dry-run mode keeps the system untouched.
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, Mutex, PoisonError};

use crate::logging::Log;

/// What a [`Message`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// About to change something; observers may veto.
    Intention,
    /// Something changed or a notable fact.
    Info,
    /// An operation failed.
    Exception,
    /// Detail for `-v -v`.
    Verbose,
    /// Detail for `-v -v -v`.
    Debug,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Intention => "intention",
            Self::Info => "info",
            Self::Exception => "exception",
            Self::Verbose => "verbose",
            Self::Debug => "debug",
        })
    }
}

/// One message on the bus.
#[derive(Debug, Clone)]
pub struct Message {
    /// Kind of message.
    pub kind: MessageKind,
    /// Human-readable text.
    pub text: String,
    /// Free-form tags, e.g. `attempt` or `warning`.
    pub tags: Vec<String>,
    /// Where the message was raised.
    pub location: &'static Location<'static>,
}

impl Message {
    /// Whether the message carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Receives every message sent through a [`FlowMonitor`].
pub trait Observer: Send + Sync {
    /// Handle `message`. Returning `false` for an intention vetoes it;
    /// the return value is ignored for other kinds.
    fn handle(&self, message: &Message) -> bool;
}

/// The message bus.
#[derive(Default)]
pub struct FlowMonitor {
    observers: Mutex<Vec<Arc<dyn Observer>>>,
}

impl fmt::Debug for FlowMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowMonitor")
            .field("observers", &self.snapshot().len())
            .finish()
    }
}

impl FlowMonitor {
    /// Monitor with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer. Observers are notified in registration order.
    pub fn register(&self, observer: Arc<dyn Observer>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Remove a previously registered observer.
    pub fn unregister(&self, observer: &Arc<dyn Observer>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|o| !Arc::ptr_eq(o, observer));
    }

    fn snapshot(&self) -> Vec<Arc<dyn Observer>> {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Deliver `message`; returns `false` if any observer vetoed it.
    fn dispatch(&self, message: &Message) -> bool {
        // Dispatch outside the lock so observers may send messages too.
        self.snapshot()
            .iter()
            .fold(true, |allowed, observer| observer.handle(message) && allowed)
    }

    #[track_caller]
    fn message(kind: MessageKind, text: String, tags: &[&str]) -> Message {
        Message {
            kind,
            text,
            tags: tags.iter().map(ToString::to_string).collect(),
            location: Location::caller(),
        }
    }

    /// Send a message of `kind`.
    #[track_caller]
    pub fn inform(&self, kind: MessageKind, text: impl Into<String>, tags: &[&str]) {
        self.dispatch(&Self::message(kind, text.into(), tags));
    }

    /// Report a failure.
    #[track_caller]
    pub fn exception(&self, text: impl Into<String>, tags: &[&str]) {
        self.inform(MessageKind::Exception, text, tags);
    }

    /// Announce `intention`, then run `action` unless an observer vetoes.
    ///
    /// Returns `Ok(None)` when vetoed. Failures are reported as exceptions
    /// and returned unchanged; success is reported as `<intention> - done`.
    ///
    /// # Errors
    ///
    /// Propagates the error of `action`.
    #[track_caller]
    pub fn attempt<T, E, F>(&self, intention: impl Into<String>, tags: &[&str], action: F) -> Result<Option<T>, E>
    where
        E: fmt::Display,
        F: FnOnce() -> Result<T, E>,
    {
        let intention = intention.into();
        let mut attempt_tags = tags.to_vec();
        attempt_tags.push("attempt");

        if !self.dispatch(&Self::message(MessageKind::Intention, intention.clone(), &attempt_tags)) {
            self.inform(MessageKind::Verbose, format!("{intention} - pre-empted"), &attempt_tags);
            return Ok(None);
        }

        match action() {
            Ok(value) => {
                attempt_tags.push("attemptdone");
                self.inform(MessageKind::Info, format!("{intention} - done"), &attempt_tags);
                Ok(Some(value))
            }
            Err(e) => {
                self.exception(format!("{intention} - failed: {e}"), &attempt_tags);
                Err(e)
            }
        }
    }
}

/// Forwards messages to a [`Log`], filtered by verbosity.
///
/// Infos show from verbosity 1, intentions and verbose messages from 2,
/// debug messages from 3. Exceptions always show.
pub struct LogObserver {
    log: Arc<dyn Log>,
    verbosity: u8,
}

impl LogObserver {
    /// Observer writing to `log` at `verbosity`.
    #[must_use]
    pub fn new(log: Arc<dyn Log>, verbosity: u8) -> Self {
        Self { log, verbosity }
    }
}

impl fmt::Debug for LogObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogObserver")
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}

impl Observer for LogObserver {
    fn handle(&self, message: &Message) -> bool {
        let text = message.text.as_str();
        match message.kind {
            MessageKind::Exception => self.log.error(text),
            MessageKind::Info if self.verbosity >= 1 => self.log.info(text),
            MessageKind::Intention | MessageKind::Verbose if self.verbosity >= 2 => {
                if message.has_tag("warning") {
                    self.log.warn(text);
                } else {
                    self.log.info(text);
                }
            }
            MessageKind::Debug if self.verbosity >= 3 => self.log.debug(text),
            _ => self.log.debug(text),
        }
        true
    }
}

/// Vetoes every intention and logs it as a dry-run action.
pub struct DryRunObserver {
    log: Arc<dyn Log>,
}

impl DryRunObserver {
    /// Observer reporting vetoed intentions to `log`.
    #[must_use]
    pub fn new(log: Arc<dyn Log>) -> Self {
        Self { log }
    }
}

impl fmt::Debug for DryRunObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DryRunObserver").finish_non_exhaustive()
    }
}

impl Observer for DryRunObserver {
    fn handle(&self, message: &Message) -> bool {
        if message.kind == MessageKind::Intention {
            self.log.dry_run(&message.text);
            return false;
        }
        true
    }
}

/// Observers for unit tests.
#[cfg(test)]
pub mod test_helpers {
    use std::sync::{Mutex, PoisonError};

    use super::{Message, MessageKind, Observer};

    /// Keeps every message; used by tests to inspect traffic.
    #[derive(Debug, Default)]
    pub struct RecordingObserver {
        messages: Mutex<Vec<Message>>,
        veto: bool,
    }

    impl RecordingObserver {
        /// Recorder that also vetoes every intention.
        #[must_use]
        pub fn vetoing() -> Self {
            Self {
                messages: Mutex::default(),
                veto: true,
            }
        }

        /// Messages received so far.
        #[must_use]
        pub fn messages(&self) -> Vec<Message> {
            self.messages
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Texts of messages of `kind`.
        #[must_use]
        pub fn texts(&self, kind: MessageKind) -> Vec<String> {
            self.messages()
                .into_iter()
                .filter(|m| m.kind == kind)
                .map(|m| m.text)
                .collect()
        }
    }

    impl Observer for RecordingObserver {
        fn handle(&self, message: &Message) -> bool {
            self.messages
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message.clone());
            !(self.veto && message.kind == MessageKind::Intention)
        }
    }
}
