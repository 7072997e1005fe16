//! The session controller for the fan controller peripheral.
//!
//! [`SessionController`] owns the whole scan → connect → discover → monitor → read/write →
//! disconnect lifecycle. All of its state lives in one [`SessionState`] value that only changes
//! through [`SessionState::apply`]. Background tasks (the disconnect watcher and the notification
//! monitor) never touch the controller; they send [`SessionInput`]s into its inbox, which the
//! owner feeds back through [`SessionController::handle_input`].

use std::collections::HashMap;
use std::sync::Arc;
use futures::channel::mpsc::{unbounded, Sender, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::types::DeviceProfile;
use crate::device::codec::{decode_message, decode_rpm, encode_rpm};
use crate::device::constants::{INITIAL_MESSAGE, MESSAGE_TRANSACTION};
use crate::device::events::{DisconnectReason, SessionEvent, SessionObserver};
use crate::device::link::BleLink;
use crate::device::types::{DeviceEvent, DeviceState, SessionCommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState<H> {
    /// No link. `known` is the peripheral of the previous session, if it has not reported its
    /// disconnect yet; scanning reconnects to it directly.
    Idle { known: Option<H> },
    Scanning,
    Connecting { handle: H },
    Connected { handle: H },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<H> {
    ScanStarted,
    ScanEnded,
    LinkOpening(H),
    LinkOpened,
    ConnectFailed,
    PeripheralDisconnected,
    DisconnectConfirmed,
}

impl<H: Clone> SessionState<H> {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle { .. } => "idle",
            SessionState::Scanning => "scanning",
            SessionState::Connecting { .. } => "connecting",
            SessionState::Connected { .. } => "connected",
        }
    }

    /// The peripheral with a (possibly half-open) link.
    pub fn handle(&self) -> Option<&H> {
        match self {
            SessionState::Connecting { handle } | SessionState::Connected { handle } => Some(handle),
            _ => None,
        }
    }

    pub fn device_state(&self) -> DeviceState {
        match self {
            SessionState::Idle { .. } => DeviceState::Disconnected,
            SessionState::Scanning => DeviceState::Scanning,
            SessionState::Connecting { .. } => DeviceState::Connecting,
            SessionState::Connected { .. } => DeviceState::Connected,
        }
    }

    pub fn apply(self, transition: Transition<H>) -> SessionState<H> {
        match (self, transition) {
            (SessionState::Idle { .. }, Transition::ScanStarted) => SessionState::Scanning,
            (SessionState::Scanning, Transition::ScanEnded) => SessionState::Idle { known: None },
            (SessionState::Idle { .. } | SessionState::Scanning, Transition::LinkOpening(handle)) => {
                SessionState::Connecting { handle }
            },
            (SessionState::Connecting { handle }, Transition::LinkOpened) => SessionState::Connected { handle },
            (SessionState::Connecting { .. } | SessionState::Connected { .. }, Transition::ConnectFailed) => {
                SessionState::Idle { known: None }
            },
            (_, Transition::PeripheralDisconnected) => SessionState::Idle { known: None },
            (SessionState::Connected { handle }, Transition::DisconnectConfirmed) => {
                SessionState::Idle { known: Some(handle) }
            },
            (state, transition) => {
                debug!("Ignoring transition {} while {}", transition_name(&transition), state.name());
                state
            },
        }
    }
}

fn transition_name<H>(transition: &Transition<H>) -> &'static str {
    match transition {
        Transition::ScanStarted => "ScanStarted",
        Transition::ScanEnded => "ScanEnded",
        Transition::LinkOpening(_) => "LinkOpening",
        Transition::LinkOpened => "LinkOpened",
        Transition::ConnectFailed => "ConnectFailed",
        Transition::PeripheralDisconnected => "PeripheralDisconnected",
        Transition::DisconnectConfirmed => "DisconnectConfirmed",
    }
}

/// Events from background tasks. `generation` identifies the connection that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    PeripheralDisconnected { generation: u64 },
    Notification { generation: u64, payload: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    PermissionDenied,
    /// Another scan or a connection is in progress.
    Rejected,
    NotFound,
    Connected,
    ConnectFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    NotConnected,
    AlreadyDisconnected,
    Disconnected,
    StillConnected,
    Failed,
}

struct Transaction {
    token: CancellationToken,
    characteristic: Uuid,
}

pub struct SessionController<L: BleLink> {
    link: Arc<L>,
    profile: DeviceProfile,
    state: SessionState<L::Handle>,
    // bumped for every connection attempt, so that events of an older link are ignored
    generation: u64,
    permitted: bool,
    message: String,
    rpm: u16,
    transactions: HashMap<&'static str, Transaction>,
    disconnect_watcher: Option<CancellationToken>,
    inbox: UnboundedSender<SessionInput>,
    senders: Vec<Sender<DeviceEvent>>,
    observer: Box<dyn SessionObserver>,
}

impl<L: BleLink> SessionController<L> {
    pub fn new(
        link: Arc<L>,
        profile: DeviceProfile,
        senders: Vec<Sender<DeviceEvent>>,
        observer: Box<dyn SessionObserver>,
    ) -> (Self, UnboundedReceiver<SessionInput>) {
        let (inbox, inbox_receiver) = unbounded();

        let controller = SessionController {
            link,
            profile,
            state: SessionState::Idle { known: None },
            generation: 0,
            permitted: false,
            message: INITIAL_MESSAGE.to_string(),
            rpm: 0,
            transactions: HashMap::new(),
            disconnect_watcher: None,
            inbox,
            senders,
            observer,
        };

        (controller, inbox_receiver)
    }

    pub fn state(&self) -> &SessionState<L::Handle> {
        &self.state
    }

    pub fn device_state(&self) -> DeviceState {
        self.state.device_state()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn rpm(&self) -> u16 {
        self.rpm
    }

    pub fn is_permitted(&self) -> bool {
        self.permitted
    }

    async fn emit(&mut self, event: DeviceEvent) {
        for sender in &mut self.senders {
            if let Err(err) = sender.send(event.clone()).await {
                debug!("Failed to send DeviceEvent: {}", err);
            }
        }
    }

    fn record(&self, event: SessionEvent) {
        self.observer.record(&event);
    }

    async fn transition(&mut self, transition: Transition<L::Handle>) {
        let previous = self.state.device_state();
        let state = std::mem::replace(&mut self.state, SessionState::Idle { known: None });
        self.state = state.apply(transition);

        let current = self.state.device_state();
        if previous != current {
            self.emit(DeviceEvent::StateChange(current)).await;
        }
    }

    async fn set_message(&mut self, message: String) {
        self.message = message.clone();
        self.emit(DeviceEvent::Message(message)).await;
    }

    async fn set_rpm(&mut self, rpm: u16) {
        self.rpm = rpm;
        self.emit(DeviceEvent::Rpm(rpm)).await;
    }

    /// Sends the current state, message and RPM to every listener.
    pub async fn publish_snapshot(&mut self) {
        self.emit(DeviceEvent::StateChange(self.state.device_state())).await;
        self.emit(DeviceEvent::Message(self.message.clone())).await;
        self.emit(DeviceEvent::Rpm(self.rpm)).await;
    }

    /// Asks for the access scanning needs. Never fails; any error counts as a denial.
    pub async fn request_permission(&mut self) -> bool {
        let granted = match self.link.request_permission().await {
            Ok(granted) => granted,
            Err(err) => {
                warn!("Permission request failed: {}", err);
                false
            },
        };

        self.record(SessionEvent::PermissionResolved { granted });
        granted
    }

    /// Finds the fan controller and connects to it.
    pub async fn scan(&mut self) -> ScanOutcome {
        if !self.permitted {
            self.permitted = self.request_permission().await;

            if !self.permitted {
                return ScanOutcome::PermissionDenied;
            }
        }

        let known = match &self.state {
            SessionState::Idle { known } => known.clone(),
            state => {
                self.record(SessionEvent::ScanRejected { state: state.name() });
                return ScanOutcome::Rejected;
            },
        };

        let handle = match known {
            Some(handle) => handle,
            None => {
                self.transition(Transition::ScanStarted).await;
                self.record(SessionEvent::ScanStarted);

                match self.find_target().await {
                    Some(handle) => handle,
                    None => {
                        self.transition(Transition::ScanEnded).await;
                        return ScanOutcome::NotFound;
                    },
                }
            },
        };

        if self.connect(handle).await {
            ScanOutcome::Connected
        } else {
            ScanOutcome::ConnectFailed
        }
    }

    async fn find_target(&mut self) -> Option<L::Handle> {
        let deadline = Instant::now() + self.profile.scan_timeout;

        let mut advertisements = match self.link.start_scan().await {
            Ok(v) => v,
            Err(err) => {
                self.record(SessionEvent::ScanFailed { reason: err.to_string() });
                self.stop_scan(false).await;
                return None;
            },
        };

        let found = loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    debug!("Scan timed out");
                    break None;
                }
                advertisement = advertisements.next() => match advertisement {
                    None => break None,
                    Some(Err(err)) => {
                        self.record(SessionEvent::ScanFailed { reason: err.to_string() });
                    },
                    Some(Ok(advertisement)) => {
                        if advertisement.local_name.as_deref() == Some(self.profile.target_name.as_str()) {
                            self.record(SessionEvent::ScanMatched { name: self.profile.target_name.clone() });
                            break Some(advertisement.handle);
                        }
                    },
                },
            }
        };

        // results that are still queued are dropped with the stream
        drop(advertisements);
        self.stop_scan(found.is_some()).await;
        found
    }

    async fn stop_scan(&mut self, matched: bool) {
        if let Err(err) = self.link.stop_scan().await {
            warn!("Failed to stop scanning: {}", err);
        }
        self.record(SessionEvent::ScanStopped { matched });
    }

    /// Opens a link to `handle`, discovers its services, seeds the display values and starts
    /// monitoring the message characteristic. Returns false if the link could not be set up, in
    /// which case the session is idle again.
    pub async fn connect(&mut self, handle: L::Handle) -> bool {
        let reconnect = match &self.state {
            SessionState::Idle { known } => known.is_some(),
            SessionState::Scanning => false,
            state => {
                warn!("Connect requested while {}; ignoring", state.name());
                return false;
            },
        };

        self.record(SessionEvent::ConnectAttempt { reconnect });
        self.cancel_background();
        self.generation += 1;
        self.transition(Transition::LinkOpening(handle.clone())).await;

        if let Err(err) = self.link.connect(&handle).await {
            self.fail_connect(&handle, err.to_string(), false).await;
            return false;
        }

        self.transition(Transition::LinkOpened).await;

        if let Err(err) = self.link.discover(&handle).await {
            self.fail_connect(&handle, err.to_string(), true).await;
            return false;
        }

        self.watch_disconnections(&handle).await;
        self.seed_values(&handle).await;
        self.monitor_message(&handle).await;

        self.record(SessionEvent::Connected);
        true
    }

    async fn fail_connect(&mut self, handle: &L::Handle, reason: String, teardown: bool) {
        self.record(SessionEvent::ConnectFailed { reason });
        self.cancel_background();

        if teardown {
            if let Err(err) = self.link.disconnect(handle).await {
                warn!("Failed to tear down half-open link: {}", err);
            }
        }

        self.transition(Transition::ConnectFailed).await;
    }

    async fn watch_disconnections(&mut self, handle: &L::Handle) {
        let mut disconnections = match self.link.disconnections(handle).await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to watch for disconnects, link loss will go unnoticed: {}", err);
                return;
            },
        };

        let cancel = CancellationToken::new();
        self.disconnect_watcher = Some(cancel.clone());

        let inbox = self.inbox.clone();
        let generation = self.generation;

        spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {},
                Some(()) = disconnections.next() => {
                    debug!("Device DC");
                    let _ = inbox.unbounded_send(SessionInput::PeripheralDisconnected { generation });
                },
            }
        });
    }

    async fn seed_values(&mut self, handle: &L::Handle) {
        let service = self.profile.service;
        let encoding = self.profile.encoding;

        match self.link.read(handle, service, self.profile.message_characteristic).await {
            Ok(payload) => match decode_message(&payload, encoding) {
                Ok(message) => self.set_message(message).await,
                Err(err) => self.record(SessionEvent::ReadFailed { characteristic: "message", reason: err.to_string() }),
            },
            Err(err) => self.record(SessionEvent::ReadFailed { characteristic: "message", reason: err.to_string() }),
        }

        match self.link.read(handle, service, self.profile.rpm_characteristic).await {
            Ok(payload) => match decode_rpm(&payload, encoding) {
                Some(rpm) => self.set_rpm(rpm).await,
                None => debug!("Ignoring RPM payload that is not an RPM value"),
            },
            Err(err) => self.record(SessionEvent::ReadFailed { characteristic: "rpm", reason: err.to_string() }),
        }
    }

    async fn monitor_message(&mut self, handle: &L::Handle) {
        let characteristic = self.profile.message_characteristic;

        let mut notifications = match self.link.monitor(handle, self.profile.service, characteristic).await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to monitor message characteristic: {}", err);
                return;
            },
        };

        let cancel = CancellationToken::new();
        self.transactions.insert(MESSAGE_TRANSACTION, Transaction { token: cancel.clone(), characteristic });

        let inbox = self.inbox.clone();
        let generation = self.generation;

        spawn(async move {
            'mainloop: loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        break 'mainloop;
                    },
                    payload = notifications.next() => match payload {
                        None => break 'mainloop,
                        Some(payload) => {
                            if inbox.unbounded_send(SessionInput::Notification { generation, payload }).is_err() {
                                break 'mainloop;
                            }
                        },
                    },
                }
            }
        });
    }

    // stops all background tasks without talking to the link
    fn cancel_background(&mut self) {
        for (name, transaction) in self.transactions.drain() {
            debug!("Cancelling transaction {}", name);
            transaction.token.cancel();
        }

        if let Some(watcher) = self.disconnect_watcher.take() {
            watcher.cancel();
        }
    }

    async fn cancel_transactions(&mut self, handle: &L::Handle) {
        let transactions: Vec<(&'static str, Transaction)> = self.transactions.drain().collect();

        for (name, transaction) in transactions {
            debug!("Cancelling transaction {}", name);
            transaction.token.cancel();

            if let Err(err) = self.link.unmonitor(handle, self.profile.service, transaction.characteristic).await {
                warn!("Failed to unsubscribe {}: {}", name, err);
            }
        }
    }

    /// Tears the link down. The disconnect watcher stays active, so the remembered peripheral is
    /// forgotten once the link reports the disconnect.
    pub async fn disconnect(&mut self) -> DisconnectOutcome {
        info!("Disconnecting start");

        let handle = match &self.state {
            SessionState::Connected { handle } => handle.clone(),
            _ => {
                info!("Device is already disconnected");
                return DisconnectOutcome::NotConnected;
            },
        };

        match self.link.is_connected(&handle).await {
            Ok(true) => {},
            Ok(false) => {
                info!("Device is already disconnected");
                self.cancel_background();
                self.transition(Transition::PeripheralDisconnected).await;
                self.record(SessionEvent::Disconnected { reason: DisconnectReason::AlreadyDown });
                return DisconnectOutcome::AlreadyDisconnected;
            },
            Err(err) => {
                self.record(SessionEvent::DisconnectFailed { reason: err.to_string() });
                return DisconnectOutcome::Failed;
            },
        }

        self.cancel_transactions(&handle).await;

        if let Err(err) = self.link.disconnect(&handle).await {
            self.record(SessionEvent::DisconnectFailed { reason: err.to_string() });
            return DisconnectOutcome::Failed;
        }

        match self.link.is_connected(&handle).await {
            Ok(false) => {
                self.transition(Transition::DisconnectConfirmed).await;
                self.record(SessionEvent::Disconnected { reason: DisconnectReason::UserRequested });
                DisconnectOutcome::Disconnected
            },
            Ok(true) => {
                self.record(SessionEvent::DisconnectUnconfirmed);
                DisconnectOutcome::StillConnected
            },
            Err(err) => {
                self.record(SessionEvent::DisconnectFailed { reason: err.to_string() });
                DisconnectOutcome::Failed
            },
        }
    }

    /// Writes a committed RPM value. The value is not range checked; the peripheral clamps or
    /// rejects it.
    pub async fn send_rpm(&mut self, value: u16) -> bool {
        let handle = match &self.state {
            SessionState::Connected { handle } => handle.clone(),
            _ => {
                warn!("Not connected, RPM {} is not sent", value);
                return false;
            },
        };

        self.set_rpm(value).await;

        let payload = encode_rpm(value, self.profile.encoding);
        let result = self.link
            .write_with_response(&handle, self.profile.service, self.profile.rpm_characteristic, &payload)
            .await;

        match result {
            Ok(()) => {
                self.record(SessionEvent::RpmWritten { value });
                true
            },
            Err(err) => {
                self.record(SessionEvent::RpmWriteFailed { value, reason: err.to_string() });
                false
            },
        }
    }

    pub async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect => {
                let outcome = self.scan().await;
                debug!("Scan finished: {:?}", outcome);
            },
            SessionCommand::Disconnect => {
                let outcome = self.disconnect().await;
                debug!("Disconnect finished: {:?}", outcome);
            },
            SessionCommand::SendRpm(value) => {
                self.send_rpm(value).await;
            },
        }
    }

    pub async fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::PeripheralDisconnected { generation } if generation == self.generation => {
                if self.state.handle().is_some() {
                    self.cancel_background();
                    self.transition(Transition::PeripheralDisconnected).await;
                    self.record(SessionEvent::Disconnected { reason: DisconnectReason::Peripheral });
                } else if let SessionState::Idle { known: Some(_) } = self.state {
                    // already torn down by the user, forget the peripheral
                    self.cancel_background();
                    self.transition(Transition::PeripheralDisconnected).await;
                }
            },
            SessionInput::Notification { generation, payload } if generation == self.generation => {
                if !matches!(self.state, SessionState::Connected { .. }) {
                    return;
                }

                match decode_message(&payload, self.profile.encoding) {
                    Ok(message) => {
                        self.record(SessionEvent::MessageUpdated { message: message.clone() });
                        self.set_message(message).await;
                    },
                    Err(err) => debug!("Ignoring message notification: {}", err),
                }
            },
            input => debug!("Ignoring input of an earlier connection: {:?}", input),
        }
    }
}
