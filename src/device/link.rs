//! The BLE operations the session controller depends on.

use std::fmt::Debug;
use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::DeviceError;

/// A single advertisement seen while scanning.
#[derive(Debug, Clone)]
pub struct Advertisement<H> {
    pub handle: H,
    pub local_name: Option<String>,
}

/// A BLE client library as seen by the session controller.
///
/// Streams returned from this trait end when the underlying library stops producing items; they
/// are dropped by the controller to unsubscribe.
#[async_trait]
pub trait BleLink: Send + Sync + 'static {
    type Handle: Clone + Debug + Send + Sync + 'static;

    /// Asks the platform for the access scanning requires. `Ok(false)` is an explicit denial.
    async fn request_permission(&self) -> Result<bool, DeviceError>;

    /// Starts an unfiltered scan. Scan failures reported by the library are yielded as `Err`
    /// items.
    async fn start_scan(&self) -> Result<BoxStream<'static, Result<Advertisement<Self::Handle>, DeviceError>>, DeviceError>;

    async fn stop_scan(&self) -> Result<(), DeviceError>;

    async fn connect(&self, handle: &Self::Handle) -> Result<(), DeviceError>;

    async fn discover(&self, handle: &Self::Handle) -> Result<(), DeviceError>;

    async fn is_connected(&self, handle: &Self::Handle) -> Result<bool, DeviceError>;

    async fn disconnect(&self, handle: &Self::Handle) -> Result<(), DeviceError>;

    /// Yields once for every time the peripheral disconnects, whatever the cause.
    async fn disconnections(&self, handle: &Self::Handle) -> Result<BoxStream<'static, ()>, DeviceError>;

    async fn read(&self, handle: &Self::Handle, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, DeviceError>;

    async fn write_with_response(&self, handle: &Self::Handle, service: Uuid, characteristic: Uuid, value: &[u8]) -> Result<(), DeviceError>;

    /// Subscribes to value changes of a characteristic.
    async fn monitor(&self, handle: &Self::Handle, service: Uuid, characteristic: Uuid) -> Result<BoxStream<'static, Vec<u8>>, DeviceError>;

    async fn unmonitor(&self, handle: &Self::Handle, service: Uuid, characteristic: Uuid) -> Result<(), DeviceError>;
}
