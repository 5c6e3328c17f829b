// ── Device source seam ──
//
// The coordinator talks to the tablet only through `DeviceSource`, so
// tests can script poll outcomes without a network.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use multitek_api::{RawDevice, RelayAck, TabletClient};

use crate::error::CoreError;

/// Read and write access to one tablet's relays.
pub trait DeviceSource: Send + Sync + 'static {
    /// Fetch every relay with its current state.
    fn list_devices(&self) -> BoxFuture<'_, Result<Vec<RawDevice>, CoreError>>;

    /// Drive a relay on or off.
    fn set_device_state<'a>(
        &'a self,
        id: &'a str,
        on: bool,
    ) -> BoxFuture<'a, Result<RelayAck, CoreError>>;

    /// Flip a relay.
    fn toggle_device<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<RelayAck, CoreError>>;
}

impl DeviceSource for TabletClient {
    fn list_devices(&self) -> BoxFuture<'_, Result<Vec<RawDevice>, CoreError>> {
        async move { Ok(TabletClient::list_devices(self).await?) }.boxed()
    }

    fn set_device_state<'a>(
        &'a self,
        id: &'a str,
        on: bool,
    ) -> BoxFuture<'a, Result<RelayAck, CoreError>> {
        async move { Ok(self.set_relay_state(id, on).await?) }.boxed()
    }

    fn toggle_device<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<RelayAck, CoreError>> {
        async move { Ok(self.toggle_relay(id).await?) }.boxed()
    }
}
