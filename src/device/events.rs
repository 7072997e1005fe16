//! Structured events about the session lifecycle.
//!
//! The controller reports what it does to a [`SessionObserver`]. The default observer,
//! [`LogObserver`], writes them to the log; tests record them instead.

use log::{debug, info, warn};

/// Why the link went down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Explicit teardown requested by the user.
    UserRequested,
    /// The peripheral or the link dropped the connection.
    Peripheral,
    /// The link was found to be down when checking its status.
    AlreadyDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PermissionResolved { granted: bool },
    ScanStarted,
    ScanRejected { state: &'static str },
    ScanFailed { reason: String },
    ScanMatched { name: String },
    ScanStopped { matched: bool },
    ConnectAttempt { reconnect: bool },
    Connected,
    ConnectFailed { reason: String },
    ReadFailed { characteristic: &'static str, reason: String },
    MessageUpdated { message: String },
    Disconnected { reason: DisconnectReason },
    DisconnectUnconfirmed,
    DisconnectFailed { reason: String },
    RpmWritten { value: u16 },
    RpmWriteFailed { value: u16, reason: String },
}

pub trait SessionObserver: Send + Sync {
    fn record(&self, event: &SessionEvent);
}

/// Writes session events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl SessionObserver for LogObserver {
    fn record(&self, event: &SessionEvent) {
        match event {
            SessionEvent::PermissionResolved { granted: true } => info!("Permissions Granted"),
            SessionEvent::PermissionResolved { granted: false } => warn!("Permissions Revoked"),
            SessionEvent::ScanStarted => info!("Scanning"),
            SessionEvent::ScanRejected { state } => warn!("Scan requested while {}; ignoring", state),
            SessionEvent::ScanFailed { reason } => warn!("Scanning failed: {}", reason),
            SessionEvent::ScanMatched { name } => info!("Found peripheral {}", name),
            SessionEvent::ScanStopped { matched } => info!("Scan stopped (matched: {})", matched),
            SessionEvent::ConnectAttempt { reconnect } => info!("Connecting to device (reconnect: {})", reconnect),
            SessionEvent::Connected => info!("Connection established"),
            SessionEvent::ConnectFailed { reason } => warn!("Failed to connect: {}", reason),
            SessionEvent::ReadFailed { characteristic, reason } => warn!("Failed to read {} characteristic: {}", characteristic, reason),
            SessionEvent::MessageUpdated { message } => debug!("Message update received: {}", message),
            SessionEvent::Disconnected { reason } => info!("Disconnected ({:?})", reason),
            SessionEvent::DisconnectUnconfirmed => warn!("Device still connected"),
            SessionEvent::DisconnectFailed { reason } => warn!("Error during disconnection: {}", reason),
            SessionEvent::RpmWritten { value } => info!("RPM changed to: {}", value),
            SessionEvent::RpmWriteFailed { value, reason } => warn!("Failed to change RPM to {}: {}", value, reason),
        }
    }
}
