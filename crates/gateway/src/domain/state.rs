use std::fmt;

/// Listener lifecycle state. There is no terminal state; the listener runs
/// until cancelled and then rests in `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerState {
    #[default]
    Disconnected,
    Connecting,
    Subscribing,
    Listening,
    /// Waiting out the fixed reconnect delay
    Backoff,
}

impl ListenerState {
    /// Check if a transport session is open
    pub fn is_connected(&self) -> bool {
        matches!(self, ListenerState::Subscribing | ListenerState::Listening)
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerState::Disconnected => "disconnected",
            ListenerState::Connecting => "connecting",
            ListenerState::Subscribing => "subscribing",
            ListenerState::Listening => "listening",
            ListenerState::Backoff => "backoff",
        };
        f.write_str(name)
    }
}
