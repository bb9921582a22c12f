pub mod controller;
pub mod device;
pub mod dummy;
pub mod save;

use std::time::Duration;

/// Notifications broadcast by the controller to all subscribers.
///
/// Delivery is fire-and-forget: every event is sent at least once per state
/// change to each live subscriber, and `DataUpdated` is an invitation to read
/// the current trace snapshot from the controller handle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CorrelationEvent {
    /// The measurement started (`true`) or is no longer running (`false`)
    StatusChanged(bool),
    /// A new trace snapshot is available
    DataUpdated,
    CountLengthChanged(u32),
    BinWidthChanged(u64),
    RefreshIntervalChanged(Duration),
}
