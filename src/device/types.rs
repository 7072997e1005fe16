use futures::channel::mpsc::Sender;

/// What the GUI shows about the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    Initial,
    Disconnected,
    Scanning,
    Connecting,
    Connected,
}

impl DeviceState {
    pub fn is_connected(&self) -> bool {
        *self == DeviceState::Connected
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, DeviceState::Scanning | DeviceState::Connecting)
    }
}

/// Requests from the GUI to the session worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Connect,
    Disconnect,
    SendRpm(u16),
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The session worker accepts commands on this sender.
    Ready(Sender<SessionCommand>),
    /// The bluetooth stack could not be opened at all.
    Unavailable(String),
    StateChange(DeviceState),
    Message(String),
    Rpm(u16),
}
