// SPDX-License-Identifier: Apache-2.0

//! Downstream sinks and the loop that delivers events to them.

pub mod collector;
pub mod delivery;
pub mod error;
pub mod queue;

pub use delivery::{DeliveryConfig, DeliveryLoop, DeliveryStats, connect_with_timeout};
pub use error::SinkError;

use crate::event::Event;
use std::future::Future;

/// A downstream destination for events.
///
/// The sink itself only holds configuration. Live state is kept in the
/// `Connection` value, which the delivery loop owns exclusively and drops on
/// the first failure.
pub trait Sink: Send + Sync + 'static {
    type Connection: Send;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Where the sink connects to, for logs.
    fn endpoint(&self) -> String;

    fn connect(&self) -> impl Future<Output = Result<Self::Connection, SinkError>> + Send;

    fn send(
        &self,
        conn: &mut Self::Connection,
        event: &Event,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Best-effort teardown.
    fn close(&self, conn: Self::Connection) -> impl Future<Output = ()> + Send;
}
