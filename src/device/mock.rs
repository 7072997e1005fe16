//! Scripted [`BleLink`] for tests.
//!
//! Every call is recorded by name. Advertisements, read payloads and failures are configured up
//! front; notifications and link loss are pushed from the test.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use uuid::Uuid;

use crate::config::types::DeviceProfile;
use crate::device::events::{SessionEvent, SessionObserver};
use crate::device::link::{Advertisement, BleLink};
use crate::error::DeviceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPeripheral {
    pub name: Option<String>,
}

impl MockPeripheral {
    pub fn named(name: &str) -> Self {
        MockPeripheral { name: Some(name.to_string()) }
    }
}

enum Scripted {
    Now(Option<String>),
    After(Duration, String),
    Error,
}

fn injected(operation: &str) -> DeviceError {
    DeviceError::Decode { reason: format!("injected {} failure", operation) }
}

pub struct MockLink {
    profile: DeviceProfile,
    calls: Mutex<Vec<String>>,
    permission: Mutex<Result<bool, ()>>,
    advertisements: Mutex<Vec<Scripted>>,
    failing: Mutex<HashSet<&'static str>>,
    connected: AtomicBool,
    keep_link_on_disconnect: AtomicBool,
    message_payload: Mutex<Option<Vec<u8>>>,
    rpm_payload: Mutex<Option<Vec<u8>>>,
    written: Mutex<Vec<Vec<u8>>>,
    notifiers: Mutex<Vec<UnboundedSender<Vec<u8>>>>,
    disconnect_watchers: Mutex<Vec<UnboundedSender<()>>>,
}

impl MockLink {
    pub fn new() -> Self {
        MockLink {
            profile: DeviceProfile::default(),
            calls: Mutex::new(Vec::new()),
            permission: Mutex::new(Ok(true)),
            advertisements: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            connected: AtomicBool::new(false),
            keep_link_on_disconnect: AtomicBool::new(false),
            message_payload: Mutex::new(None),
            rpm_payload: Mutex::new(None),
            written: Mutex::new(Vec::new()),
            notifiers: Mutex::new(Vec::new()),
            disconnect_watchers: Mutex::new(Vec::new()),
        }
    }

    pub fn advertise(&self, names: &[Option<&str>]) {
        let mut advertisements = self.advertisements.lock().unwrap();
        advertisements.extend(names.iter().map(|name| Scripted::Now(name.map(str::to_string))));
    }

    /// Makes the scan stream yield an error item at this position.
    pub fn advertise_error(&self) {
        self.advertisements.lock().unwrap().push(Scripted::Error);
    }

    pub fn advertise_after(&self, delay: Duration, name: &str) {
        self.advertisements.lock().unwrap().push(Scripted::After(delay, name.to_string()));
    }

    pub fn set_permission(&self, permission: Result<bool, ()>) {
        *self.permission.lock().unwrap() = permission;
    }

    pub fn set_message_payload(&self, payload: Option<Vec<u8>>) {
        *self.message_payload.lock().unwrap() = payload;
    }

    pub fn set_rpm_payload(&self, payload: Option<Vec<u8>>) {
        *self.rpm_payload.lock().unwrap() = payload;
    }

    /// Makes the named operation fail until [`MockLink::succeed`] is called.
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn succeed(&self, operation: &'static str) {
        self.failing.lock().unwrap().remove(operation);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// While set, `disconnect` succeeds but the link stays up.
    pub fn keep_link_on_disconnect(&self, keep: bool) {
        self.keep_link_on_disconnect.store(keep, Ordering::SeqCst);
    }

    pub fn notify(&self, payload: Vec<u8>) {
        for notifier in self.notifiers.lock().unwrap().iter() {
            let _ = notifier.unbounded_send(payload.clone());
        }
    }

    /// Simulates link loss.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        for watcher in self.disconnect_watchers.lock().unwrap().iter() {
            let _ = watcher.unbounded_send(());
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| call.as_str() == operation).count()
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    fn call(&self, operation: &'static str) -> Result<(), DeviceError> {
        self.calls.lock().unwrap().push(operation.to_string());

        if self.failing.lock().unwrap().contains(operation) {
            return Err(injected(operation));
        }
        Ok(())
    }
}

#[async_trait]
impl BleLink for MockLink {
    type Handle = MockPeripheral;

    async fn request_permission(&self) -> Result<bool, DeviceError> {
        self.call("request_permission")?;
        let permission = *self.permission.lock().unwrap();
        permission.map_err(|_| injected("permission"))
    }

    async fn start_scan(&self) -> Result<BoxStream<'static, Result<Advertisement<MockPeripheral>, DeviceError>>, DeviceError> {
        self.call("start_scan")?;

        let advertisement = |name: Option<String>| Advertisement {
            handle: MockPeripheral { name: name.clone() },
            local_name: name,
        };

        let mut now: Vec<Result<Advertisement<MockPeripheral>, DeviceError>> = Vec::new();
        let mut later = Vec::new();
        for scripted in self.advertisements.lock().unwrap().iter() {
            match scripted {
                Scripted::Now(name) => now.push(Ok(advertisement(name.clone()))),
                Scripted::After(delay, name) => later.push((*delay, advertisement(Some(name.clone())))),
                Scripted::Error => now.push(Err(injected("scan"))),
            }
        }

        let later = stream::iter(later).then(|(delay, advertisement)| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, DeviceError>(advertisement)
        });

        // a real scan does not end by itself
        Ok(stream::iter(now).chain(later).chain(stream::pending()).boxed())
    }

    async fn stop_scan(&self) -> Result<(), DeviceError> {
        self.call("stop_scan")
    }

    async fn connect(&self, _handle: &MockPeripheral) -> Result<(), DeviceError> {
        self.call("connect")?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn discover(&self, _handle: &MockPeripheral) -> Result<(), DeviceError> {
        self.call("discover")
    }

    async fn is_connected(&self, _handle: &MockPeripheral) -> Result<bool, DeviceError> {
        self.call("is_connected")?;
        Ok(self.connected.load(Ordering::SeqCst))
    }

    async fn disconnect(&self, _handle: &MockPeripheral) -> Result<(), DeviceError> {
        self.call("disconnect")?;

        if !self.keep_link_on_disconnect.load(Ordering::SeqCst) {
            self.drop_link();
        }
        Ok(())
    }

    async fn disconnections(&self, _handle: &MockPeripheral) -> Result<BoxStream<'static, ()>, DeviceError> {
        self.call("disconnections")?;
        let (sender, receiver) = unbounded();
        self.disconnect_watchers.lock().unwrap().push(sender);
        Ok(receiver.boxed())
    }

    async fn read(&self, _handle: &MockPeripheral, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, DeviceError> {
        self.call("read")?;
        assert_eq!(service, self.profile.service);

        let payload = if characteristic == self.profile.message_characteristic {
            self.message_payload.lock().unwrap().clone()
        } else if characteristic == self.profile.rpm_characteristic {
            self.rpm_payload.lock().unwrap().clone()
        } else {
            None
        };

        payload.ok_or(DeviceError::MissingCharacteristic)
    }

    async fn write_with_response(&self, _handle: &MockPeripheral, service: Uuid, characteristic: Uuid, value: &[u8]) -> Result<(), DeviceError> {
        self.call("write")?;
        assert_eq!(service, self.profile.service);
        assert_eq!(characteristic, self.profile.rpm_characteristic);
        self.written.lock().unwrap().push(value.to_vec());
        Ok(())
    }

    async fn monitor(&self, _handle: &MockPeripheral, _service: Uuid, characteristic: Uuid) -> Result<BoxStream<'static, Vec<u8>>, DeviceError> {
        self.call("monitor")?;
        assert_eq!(characteristic, self.profile.message_characteristic);
        let (sender, receiver) = unbounded();
        self.notifiers.lock().unwrap().push(sender);
        Ok(receiver.boxed())
    }

    async fn unmonitor(&self, _handle: &MockPeripheral, _service: Uuid, _characteristic: Uuid) -> Result<(), DeviceError> {
        self.call("unmonitor")?;
        self.notifiers.lock().unwrap().clear();
        Ok(())
    }
}

/// Keeps every session event for inspection.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn record(&self, event: &SessionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
