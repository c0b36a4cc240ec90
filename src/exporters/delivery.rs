// SPDX-License-Identifier: Apache-2.0

//! Delivery loop
//!
//! Pulls events off the fan-in channel and hands them to a [`Sink`] over a
//! single connection. The loop has two states: connected and disconnected.
//! A failed connect or send drops the event in hand and leaves the loop
//! disconnected; the next event triggers a fresh connect. Events are never
//! retried or requeued.

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bounded_channel::BoundedReceiver;
use crate::event::Event;
use crate::exporters::Sink;
use crate::exporters::error::SinkError;
use crate::telemetry::MetricsReporter;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Events accepted by the sink
    pub delivered: u64,
    /// Events lost to connect or send failures, or abandoned mid-delivery on shutdown
    pub dropped: u64,
    /// Connections established by the loop itself
    pub reconnects: u64,
}

/// Connect to `sink`, failing with [`SinkError::Timeout`] after `timeout`.
pub async fn connect_with_timeout<S: Sink>(
    sink: &S,
    timeout: Duration,
) -> Result<S::Connection, SinkError> {
    match tokio::time::timeout(timeout, sink.connect()).await {
        Ok(res) => res,
        Err(_) => Err(SinkError::Timeout {
            operation: "connect",
            after: timeout,
        }),
    }
}

enum Delivery {
    Continue,
    Cancelled,
}

pub struct DeliveryLoop<S: Sink> {
    sink: S,
    rx: BoundedReceiver<Event>,
    metrics: Arc<dyn MetricsReporter>,
    config: DeliveryConfig,
    conn: Option<S::Connection>,
    stats: DeliveryStats,
}

impl<S: Sink> DeliveryLoop<S> {
    /// Starts disconnected; the first event triggers a connect.
    pub fn new(
        sink: S,
        rx: BoundedReceiver<Event>,
        metrics: Arc<dyn MetricsReporter>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            sink,
            rx,
            metrics,
            config,
            conn: None,
            stats: DeliveryStats::default(),
        }
    }

    /// Start connected, reusing a connection made at startup.
    pub fn with_connection(mut self, conn: S::Connection) -> Self {
        self.conn = Some(conn);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }

    /// Run until cancelled or until every sender is gone and the channel is
    /// drained.
    pub async fn start(&mut self, cancel_token: CancellationToken) -> DeliveryStats {
        info!(
            sink = self.sink.name(),
            endpoint = %self.sink.endpoint(),
            connected = self.is_connected(),
            "Starting delivery loop"
        );

        loop {
            let event = select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Delivery loop received cancellation signal");
                    break;
                }

                event = self.rx.next() => match event {
                    Some(event) => event,
                    None => {
                        debug!("Event queue closed");
                        break;
                    }
                },
            };

            if let Delivery::Cancelled = self.deliver(event, &cancel_token).await {
                info!("Delivery loop cancelled while delivering");
                break;
            }
        }

        if let Some(conn) = self.conn.take() {
            close_connection(&self.sink, self.config.send_timeout, conn).await;
        }

        let abandoned = self.rx.len();
        if abandoned > 0 {
            warn!(abandoned, "Abandoning queued events on shutdown");
        }

        info!(
            delivered = self.stats.delivered,
            dropped = self.stats.dropped,
            reconnects = self.stats.reconnects,
            "Delivery loop stopped"
        );
        self.stats
    }

    async fn deliver(&mut self, event: Event, cancel: &CancellationToken) -> Delivery {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                let connected = select! {
                    biased;

                    _ = cancel.cancelled() => None,
                    res = connect_with_timeout(&self.sink, self.config.connect_timeout) => Some(res),
                };

                match connected {
                    None => {
                        self.stats.dropped += 1;
                        return Delivery::Cancelled;
                    }
                    Some(Err(e)) => {
                        error!(
                            sink = self.sink.name(),
                            endpoint = %self.sink.endpoint(),
                            entity = %event.entity,
                            check = %event.check,
                            error = %e,
                            "Failed to connect to sink, dropping event"
                        );
                        self.stats.dropped += 1;
                        return Delivery::Continue;
                    }
                    Some(Ok(conn)) => {
                        self.stats.reconnects += 1;
                        info!(
                            sink = self.sink.name(),
                            endpoint = %self.sink.endpoint(),
                            "Reconnected to sink"
                        );
                        conn
                    }
                }
            }
        };

        let send_timeout = self.config.send_timeout;
        let sent = select! {
            biased;

            _ = cancel.cancelled() => None,
            res = tokio::time::timeout(send_timeout, self.sink.send(&mut conn, &event)) => Some(
                res.unwrap_or(Err(SinkError::Timeout {
                    operation: "send",
                    after: send_timeout,
                })),
            ),
        };

        match sent {
            None => {
                // A half-written request leaves the connection unusable
                close_connection(&self.sink, self.config.send_timeout, conn).await;
                self.stats.dropped += 1;
                Delivery::Cancelled
            }
            Some(Ok(())) => {
                self.metrics.delivered();
                self.stats.delivered += 1;
                self.conn = Some(conn);
                Delivery::Continue
            }
            Some(Err(e)) => {
                error!(
                    sink = self.sink.name(),
                    endpoint = %self.sink.endpoint(),
                    entity = %event.entity,
                    check = %event.check,
                    error = %e,
                    "Failed to deliver event, dropping it and disconnecting"
                );
                close_connection(&self.sink, self.config.send_timeout, conn).await;
                self.stats.dropped += 1;
                Delivery::Continue
            }
        }
    }
}

/// Close `conn`, giving up after `timeout`. Borrows only the sink, so the
/// loop's future stays `Send` for connections that are not `Sync`.
async fn close_connection<S: Sink>(sink: &S, timeout: Duration, conn: S::Connection) {
    if tokio::time::timeout(timeout, sink.close(conn)).await.is_err() {
        debug!(sink = sink.name(), "Timed out closing sink connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded_channel::bounded;
    use crate::event::{CheckKind, CheckState};
    use crate::telemetry::CountingReporter;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockState {
        /// Outcomes for successive connects; success once exhausted
        connect_script: VecDeque<bool>,
        /// Outcomes for successive sends; success once exhausted
        send_script: VecDeque<bool>,
        send_delay: Option<Duration>,
        connects: u64,
        closes: u64,
        accepted: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct MockSink {
        state: Arc<Mutex<MockState>>,
    }

    impl MockSink {
        fn with_sends(script: &[bool]) -> Self {
            let sink = MockSink::default();
            sink.state.lock().unwrap().send_script = script.iter().copied().collect();
            sink
        }

        fn with_connects(script: &[bool]) -> Self {
            let sink = MockSink::default();
            sink.state.lock().unwrap().connect_script = script.iter().copied().collect();
            sink
        }

        fn accepted(&self) -> Vec<String> {
            self.state.lock().unwrap().accepted.clone()
        }

        fn connects(&self) -> u64 {
            self.state.lock().unwrap().connects
        }

        fn closes(&self) -> u64 {
            self.state.lock().unwrap().closes
        }
    }

    impl Sink for MockSink {
        type Connection = u64;

        fn name(&self) -> &'static str {
            "mock"
        }

        fn endpoint(&self) -> String {
            "mock:0".to_string()
        }

        async fn connect(&self) -> Result<u64, SinkError> {
            let mut state = self.state.lock().unwrap();
            if !state.connect_script.pop_front().unwrap_or(true) {
                return Err(SinkError::Protocol("connection refused".to_string()));
            }
            state.connects += 1;
            Ok(state.connects)
        }

        async fn send(&self, _conn: &mut u64, event: &Event) -> Result<(), SinkError> {
            let delay = self.state.lock().unwrap().send_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.state.lock().unwrap();
            if !state.send_script.pop_front().unwrap_or(true) {
                return Err(SinkError::Rejected("broken pipe".to_string()));
            }
            state.accepted.push(event.check.clone());
            Ok(())
        }

        async fn close(&self, _conn: u64) {
            self.state.lock().unwrap().closes += 1;
        }
    }

    fn event(n: usize) -> Event {
        Event {
            kind: CheckKind::Service,
            state: CheckState::Ok,
            entity: "host1".to_string(),
            check: format!("check-{}", n),
            summary: "OK".to_string(),
            details: None,
            time: 1700000000 + n as i64,
            perfdata: None,
            execution_time: None,
            latency: None,
            ttl: None,
        }
    }

    fn checks(range: impl IntoIterator<Item = usize>) -> Vec<String> {
        range.into_iter().map(|n| format!("check-{}", n)).collect()
    }

    async fn run_to_completion(sink: MockSink, events: usize) -> (DeliveryStats, Arc<CountingReporter>) {
        let (tx, rx) = bounded(events.max(1));
        for n in 0..events {
            tx.send(event(n)).await.unwrap();
        }
        drop(tx);

        let metrics = Arc::new(CountingReporter::default());
        let mut delivery = DeliveryLoop::new(sink, rx, metrics.clone(), DeliveryConfig::default());
        let stats = delivery.start(CancellationToken::new()).await;
        (stats, metrics)
    }

    #[tokio::test]
    async fn test_delivers_in_order() {
        let sink = MockSink::default();
        let (stats, metrics) = run_to_completion(sink.clone(), 3).await;

        assert_eq!(sink.accepted(), checks(0..3));
        assert_eq!(
            stats,
            DeliveryStats {
                delivered: 3,
                dropped: 0,
                reconnects: 1
            }
        );
        assert_eq!(metrics.delivered_events(), 3);
        assert_eq!(sink.connects(), 1);
        // Closed once on shutdown
        assert_eq!(sink.closes(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_drops_event_and_reconnects_once() {
        let sink = MockSink::with_sends(&[true, true, false, true, true]);
        let (stats, metrics) = run_to_completion(sink.clone(), 5).await;

        // The failed event is neither retried nor duplicated
        assert_eq!(sink.accepted(), checks([0, 1, 3, 4]));
        assert_eq!(stats.delivered, 4);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.reconnects, 2);
        assert_eq!(sink.connects(), 2);
        assert_eq!(metrics.delivered_events(), 4);
        // Torn down after the failure, then again on shutdown
        assert_eq!(sink.closes(), 2);
    }

    #[tokio::test]
    async fn test_connect_failure_drops_event() {
        let sink = MockSink::with_connects(&[false, true]);
        let (stats, metrics) = run_to_completion(sink.clone(), 3).await;

        assert_eq!(sink.accepted(), checks(1..3));
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.reconnects, 1);
        assert_eq!(metrics.delivered_events(), 2);
    }

    #[tokio::test]
    async fn test_existing_connection_is_used() {
        let sink = MockSink::default();
        let (tx, rx) = bounded(2);
        tx.send(event(0)).await.unwrap();
        drop(tx);

        let mut delivery = DeliveryLoop::new(
            sink.clone(),
            rx,
            Arc::new(CountingReporter::default()),
            DeliveryConfig::default(),
        )
        .with_connection(42);
        assert!(delivery.is_connected());

        let stats = delivery.start(CancellationToken::new()).await;
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.reconnects, 0);
        assert_eq!(sink.connects(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_while_idle() {
        let sink = MockSink::default();
        let (_tx, rx) = bounded::<Event>(2);
        let cancel = CancellationToken::new();

        let mut delivery = DeliveryLoop::new(
            sink.clone(),
            rx,
            Arc::new(CountingReporter::default()),
            DeliveryConfig::default(),
        )
        .with_connection(1);

        let shut = cancel.clone();
        let handle = tokio::spawn(async move { delivery.start(shut).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats, DeliveryStats::default());
        assert_eq!(sink.closes(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_while_sending() {
        let sink = MockSink::default();
        sink.state.lock().unwrap().send_delay = Some(Duration::from_secs(10));

        let (tx, rx) = bounded(2);
        tx.send(event(0)).await.unwrap();
        let cancel = CancellationToken::new();

        let mut delivery = DeliveryLoop::new(
            sink.clone(),
            rx,
            Arc::new(CountingReporter::default()),
            DeliveryConfig {
                connect_timeout: Duration::from_secs(30),
                send_timeout: Duration::from_secs(30),
            },
        );

        let shut = cancel.clone();
        let handle = tokio::spawn(async move { delivery.start(shut).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.dropped, 1);
        assert!(sink.accepted().is_empty());
        drop(tx);
    }

    /// Connection that can move between threads but not be shared.
    struct UnsharedConnection(std::cell::Cell<u64>);

    #[derive(Clone, Default)]
    struct UnsharedSink {
        inner: MockSink,
    }

    impl Sink for UnsharedSink {
        type Connection = UnsharedConnection;

        fn name(&self) -> &'static str {
            "unshared"
        }

        fn endpoint(&self) -> String {
            self.inner.endpoint()
        }

        async fn connect(&self) -> Result<UnsharedConnection, SinkError> {
            let id = self.inner.connect().await?;
            Ok(UnsharedConnection(std::cell::Cell::new(id)))
        }

        async fn send(&self, conn: &mut UnsharedConnection, event: &Event) -> Result<(), SinkError> {
            let mut id = conn.0.get();
            self.inner.send(&mut id, event).await
        }

        async fn close(&self, conn: UnsharedConnection) {
            self.inner.close(conn.0.get()).await
        }
    }

    fn spawn_delivery<S: Sink>(
        mut delivery: DeliveryLoop<S>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<DeliveryStats> {
        tokio::spawn(async move { delivery.start(cancel).await })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawned_loop_with_unshared_connection() {
        let sink = UnsharedSink::default();
        let (tx, rx) = bounded(4);
        let delivery = DeliveryLoop::new(
            sink.clone(),
            rx,
            Arc::new(CountingReporter::default()),
            DeliveryConfig::default(),
        );
        let handle = spawn_delivery(delivery, CancellationToken::new());

        for n in 0..3 {
            tx.send(event(n)).await.unwrap();
        }
        drop(tx);

        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.delivered, 3);
        assert_eq!(sink.inner.accepted(), checks(0..3));
        assert_eq!(sink.inner.closes(), 1);
    }

    #[tokio::test]
    async fn test_send_timeout_counts_as_failure() {
        let sink = MockSink::default();
        sink.state.lock().unwrap().send_delay = Some(Duration::from_millis(200));

        let (tx, rx) = bounded(2);
        tx.send(event(0)).await.unwrap();
        drop(tx);

        let mut delivery = DeliveryLoop::new(
            sink.clone(),
            rx,
            Arc::new(CountingReporter::default()),
            DeliveryConfig {
                connect_timeout: Duration::from_secs(1),
                send_timeout: Duration::from_millis(20),
            },
        );

        let stats = delivery.start(CancellationToken::new()).await;
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.dropped, 1);
        assert!(!delivery.is_connected());
    }
}
