// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, info, warn};

use crate::bounded_channel::bounded;
use crate::event::Event;
use crate::exporters::collector::CollectorSink;
use crate::exporters::queue::QueueSink;
use crate::exporters::{DeliveryLoop, Sink, connect_with_timeout};
use crate::init::args::{AgentRun, SinkConfig};
use crate::init::wait;
use crate::receivers::file::PerfdataFileReceiver;
use crate::receivers::perfdata::PerfdataParser;
use crate::telemetry::{self, MetricsReporter};

pub struct Agent {
    config: Box<AgentRun>,
    metrics: Option<Arc<dyn MetricsReporter>>,
}

impl Agent {
    pub fn new(config: Box<AgentRun>) -> Agent {
        Agent {
            config,
            metrics: None,
        }
    }

    /// Use `metrics` instead of building a reporter from the statsd settings.
    pub fn with_metrics_reporter(mut self, metrics: Arc<dyn MetricsReporter>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run until `agent_cancel` fires or a task fails. Configuration errors,
    /// unopenable files and an unreachable sink are returned before anything
    /// is spawned.
    pub async fn run(self, agent_cancel: CancellationToken) -> Result<(), BoxError> {
        info!(
            sink = ?self.config.sink,
            files = self.config.file_receiver.files.len(),
            "Starting perftail agent."
        );

        self.config.validate()?;
        let parser = PerfdataParser::new(self.config.build_parser_config()?);
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => telemetry::build_reporter(self.config.build_statsd_config())?,
        };

        match self.config.build_sink_config() {
            SinkConfig::Queue(config) => {
                run_with_sink(&self.config, QueueSink::new(config), parser, metrics, agent_cancel)
                    .await
            }
            SinkConfig::Collector(config) => {
                run_with_sink(
                    &self.config,
                    CollectorSink::new(config),
                    parser,
                    metrics,
                    agent_cancel,
                )
                .await
            }
        }
    }
}

async fn run_with_sink<S: Sink>(
    config: &AgentRun,
    sink: S,
    parser: PerfdataParser,
    metrics: Arc<dyn MetricsReporter>,
    agent_cancel: CancellationToken,
) -> Result<(), BoxError> {
    let mut receivers_task_set = JoinSet::new();
    let mut exporters_task_set = JoinSet::new();

    let receivers_cancel = CancellationToken::new();
    let exporters_cancel = CancellationToken::new();

    let (events_tx, events_rx) = bounded::<Event>(config.queue_size);

    let receiver = PerfdataFileReceiver::new(
        config.file_receiver.build_config(),
        parser,
        events_tx,
        metrics.clone(),
    )?;

    let delivery_config = config.build_delivery_config();
    let conn = connect_with_timeout(&sink, delivery_config.connect_timeout)
        .await
        .map_err(|e| format!("unable to connect to {} sink: {}", sink.name(), e))?;
    info!(
        sink = sink.name(),
        endpoint = %sink.endpoint(),
        "Connected to sink."
    );

    let mut delivery = DeliveryLoop::new(sink, events_rx, metrics, delivery_config)
        .with_connection(conn);
    let token = exporters_cancel.clone();
    exporters_task_set.spawn(async move {
        let stats = delivery.start(token).await;
        debug!(
            delivered = stats.delivered,
            dropped = stats.dropped,
            reconnects = stats.reconnects,
            "Delivery loop finished."
        );
        Ok(())
    });

    // Moves the last sender into the follower tasks, so the channel closes
    // once they have all exited.
    receiver
        .start(&mut receivers_task_set, &receivers_cancel)
        .await?;

    let mut result = Ok(());
    select! {
        _ = agent_cancel.cancelled() => {
            info!("Shutdown signal received.");
        },
        e = wait::wait_for_any_task(&mut receivers_task_set) => {
            match e {
                Ok(()) => warn!("Unexpected early exit of receiver."),
                Err(e) => result = Err(e),
            }
        },
        e = wait::wait_for_any_task(&mut exporters_task_set) => {
            match e {
                Ok(()) => warn!("Unexpected early exit of delivery loop."),
                Err(e) => result = Err(e),
            }
        }
    }
    result?;

    // Step one, cancel the receivers and wait for their termination.
    receivers_cancel.cancel();

    let res =
        wait::wait_for_tasks_with_timeout(&mut receivers_task_set, Duration::from_secs(1)).await;
    if let Err(e) = res {
        return Err(format!("timed out waiting for receiver exit: {}", e).into());
    }

    // The followers held the only senders, so the delivery loop now sees the
    // channel close once it has drained what is queued.
    let exporters_hard_stop = Instant::now() + Duration::from_secs(3);

    let res =
        wait::wait_for_tasks_with_timeout(&mut exporters_task_set, Duration::from_millis(500))
            .await;
    if res.is_err() {
        warn!("Delivery loop did not exit on channel close, cancelling.");

        // force cancel
        exporters_cancel.cancel();

        let res =
            wait::wait_for_tasks_with_deadline(&mut exporters_task_set, exporters_hard_stop).await;
        if let Err(e) = res {
            return Err(format!("timed out waiting for delivery loop to exit: {}", e).into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::args::SinkArg;
    use crate::telemetry::CountingReporter;
    use std::io::Write;
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn agent_args(host_port: Option<u16>, files: Vec<PathBuf>) -> Box<AgentRun> {
        let mut args = AgentRun {
            host: "127.0.0.1".to_string(),
            port: host_port,
            ..Default::default()
        };
        args.file_receiver.files = files;
        args.file_receiver.poll_interval = Duration::from_millis(20);
        args.connect_timeout = Duration::from_secs(1);
        Box::new(args)
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    /// Answers every RESP command with an integer reply.
    async fn accepting_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    while let Ok(n) = socket.read(&mut buf).await {
                        if n == 0 {
                            return;
                        }
                        if socket.write_all(b":1\r\n").await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn test_missing_file_is_fatal() {
        let port = accepting_server().await;
        let dir = tempfile::tempdir().unwrap();
        let args = agent_args(Some(port), vec![dir.path().join("missing")]);

        let res = Agent::new(args).run(CancellationToken::new()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_sink_is_fatal() {
        let port = closed_port().await;
        let file = tempfile::NamedTempFile::new().unwrap();
        let args = agent_args(Some(port), vec![file.path().to_path_buf()]);

        let err = Agent::new(args)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unable to connect to queue sink"));
    }

    #[tokio::test]
    async fn test_config_error_is_fatal() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut args = agent_args(None, vec![file.path().to_path_buf()]);
        args.sink = SinkArg::Queue;
        args.ttl = Some(60.0);

        let err = Agent::new(args)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("collector sink"));
    }

    #[tokio::test]
    async fn test_runs_until_cancelled() {
        let port = accepting_server().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let args = agent_args(Some(port), vec![file.path().to_path_buf()]);
        let metrics = Arc::new(CountingReporter::default());

        let cancel = CancellationToken::new();
        let agent = Agent::new(args).with_metrics_reporter(metrics.clone());
        let handle = tokio::spawn(agent.run(cancel.clone()));

        // Give the follower time to settle at the end of the file
        tokio::time::sleep(Duration::from_millis(100)).await;
        writeln!(
            file,
            "[SERVICEPERFDATA]\t1700000000\thost1\tPING\tOK\t0.1\t0.2\tPING OK\trta=0.1ms\t"
        )
        .unwrap();
        file.flush().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while metrics.delivered_events() < 1 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(metrics.delivered_events(), 1);

        cancel.cancel();
        let res = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(res.is_ok());
    }
}
