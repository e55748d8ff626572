//! One `ListAndWatch` stream: an initial snapshot, then a fresh snapshot
//! after every health event until something ends the stream.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tonic::Status;
use tracing::{debug, info, warn};

use dummydev_api::v1beta1::{self, ListAndWatchResponse};

use crate::health::HealthEvent;
use crate::inventory::DeviceRegistry;
use crate::process::shutdown_requested;

use super::SERVICE_TARGET;

/// Messages buffered between the stream task and tonic.
pub(crate) const STREAM_BUFFER: usize = 8;

/// Where a stream currently is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Opened, nothing sent yet.
    Started,
    /// Sending the first snapshot.
    StreamingInitialSnapshot,
    /// Idle until a health event arrives.
    AwaitingHealthEvent,
    /// Sending a snapshot after a health event.
    StreamingUpdatedSnapshot,
    /// Finished; no further messages.
    Terminated,
}

/// Why a stream finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The node agent dropped the stream.
    ClientGone,
    /// Writing a snapshot failed.
    SendFailed,
    /// The health event channel closed.
    EventsClosed,
    /// The plugin is shutting down.
    Shutdown,
}

pub(crate) type StreamSender = mpsc::Sender<Result<ListAndWatchResponse, Status>>;

/// State owned by a single stream task.
pub(crate) struct StreamSession {
    stream_id: u64,
    phase: StreamPhase,
    registry: Arc<DeviceRegistry>,
    events: broadcast::Receiver<HealthEvent>,
    shutdown: watch::Receiver<bool>,
    tx: StreamSender,
}

impl StreamSession {
    pub(crate) fn new(
        stream_id: u64,
        registry: Arc<DeviceRegistry>,
        events: broadcast::Receiver<HealthEvent>,
        shutdown: watch::Receiver<bool>,
        tx: StreamSender,
    ) -> Self {
        Self {
            stream_id,
            phase: StreamPhase::Started,
            registry,
            events,
            shutdown,
            tx,
        }
    }

    /// Drives the stream until it ends.
    pub(crate) async fn run(mut self) -> StreamEnd {
        info!(
            target: SERVICE_TARGET,
            stream = self.stream_id,
            "inventory stream opened"
        );
        self.enter(StreamPhase::StreamingInitialSnapshot);
        if let Err(end) = self.send_snapshot().await {
            return self.finish(end);
        }

        loop {
            self.enter(StreamPhase::AwaitingHealthEvent);
            let ended = tokio::select! {
                () = self.tx.closed() => Some(StreamEnd::ClientGone),
                () = shutdown_requested(&mut self.shutdown) => Some(StreamEnd::Shutdown),
                received = self.events.recv() => match received {
                    Ok(event) => {
                        debug!(
                            target: SERVICE_TARGET,
                            stream = self.stream_id,
                            device = event.device.id(),
                            health = %event.device.health(),
                            "health event received"
                        );
                        None
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            target: SERVICE_TARGET,
                            stream = self.stream_id,
                            skipped,
                            "stream lagged behind health events; resending snapshot"
                        );
                        None
                    }
                    Err(RecvError::Closed) => Some(StreamEnd::EventsClosed),
                },
            };
            if let Some(end) = ended {
                return self.finish(end);
            }

            self.enter(StreamPhase::StreamingUpdatedSnapshot);
            if let Err(end) = self.send_snapshot().await {
                return self.finish(end);
            }
        }
    }

    async fn send_snapshot(&self) -> Result<(), StreamEnd> {
        let devices: Vec<v1beta1::Device> = self
            .registry
            .snapshot()
            .iter()
            .map(v1beta1::Device::from)
            .collect();
        let count = devices.len();
        if let Err(error) = self.tx.send(Ok(ListAndWatchResponse { devices })).await {
            warn!(
                target: SERVICE_TARGET,
                stream = self.stream_id,
                error = %error,
                "failed to send inventory snapshot"
            );
            return Err(StreamEnd::SendFailed);
        }
        debug!(
            target: SERVICE_TARGET,
            stream = self.stream_id,
            devices = count,
            "inventory snapshot sent"
        );
        Ok(())
    }

    fn enter(&mut self, phase: StreamPhase) {
        self.phase = phase;
    }

    fn finish(&mut self, end: StreamEnd) -> StreamEnd {
        let previous = self.phase;
        self.enter(StreamPhase::Terminated);
        info!(
            target: SERVICE_TARGET,
            stream = self.stream_id,
            reason = ?end,
            last_phase = ?previous,
            "inventory stream closed"
        );
        end
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::health::{AlwaysHealthy, HealthMonitor};
    use crate::inventory::Health;

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        monitor: HealthMonitor,
        shutdown: watch::Sender<bool>,
        rx: Inbox,
        task: tokio::task::JoinHandle<StreamEnd>,
    }

    fn open(ids: &str) -> Harness {
        let registry = Arc::new(DeviceRegistry::from_json(ids).expect("registry"));
        let monitor = HealthMonitor::new(registry.clone(), Arc::new(AlwaysHealthy));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let session = StreamSession::new(1, registry, monitor.subscribe(), shutdown_rx, tx);
        let task = tokio::spawn(session.run());
        Harness {
            monitor,
            shutdown,
            rx,
            task,
        }
    }

    type Inbox = mpsc::Receiver<Result<ListAndWatchResponse, Status>>;

    async fn next(rx: &mut Inbox) -> Vec<(String, String)> {
        let message = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("message within timeout")
            .expect("stream open")
            .expect("ok message");
        message
            .devices
            .into_iter()
            .map(|device| (device.id, device.health))
            .collect()
    }

    fn pairs(values: &[(&str, &str)]) -> Vec<(String, String)> {
        values
            .iter()
            .map(|(id, health)| ((*id).to_owned(), (*health).to_owned()))
            .collect()
    }

    #[tokio::test]
    async fn first_message_is_the_current_snapshot() {
        let mut harness = open(r#"[{"name":"a"},{"name":"b"}]"#);
        assert_eq!(
            next(&mut harness.rx).await,
            pairs(&[("a", "Healthy"), ("b", "Healthy")])
        );
    }

    #[tokio::test]
    async fn health_event_triggers_full_snapshot() {
        let mut harness = open(r#"[{"name":"a"},{"name":"b"}]"#);
        next(&mut harness.rx).await;

        harness.monitor.report("b", Health::Unhealthy);
        assert_eq!(
            next(&mut harness.rx).await,
            pairs(&[("a", "Healthy"), ("b", "Unhealthy")])
        );
    }

    #[tokio::test]
    async fn every_open_stream_sees_the_transition() {
        let mut first = open(r#"[{"name":"a"},{"name":"b"}]"#);
        next(&mut first.rx).await;
        let (tx, mut second_rx) = mpsc::channel(STREAM_BUFFER);
        let second = StreamSession::new(
            2,
            Arc::clone(first.monitor.registry()),
            first.monitor.subscribe(),
            first.shutdown.subscribe(),
            tx,
        );
        tokio::spawn(second.run());
        next(&mut second_rx).await;

        first.monitor.report("a", Health::Unhealthy);
        let expected = pairs(&[("a", "Unhealthy"), ("b", "Healthy")]);
        assert_eq!(next(&mut first.rx).await, expected);
        assert_eq!(next(&mut second_rx).await, expected);
    }

    #[tokio::test]
    async fn dropping_the_receiver_ends_the_stream() {
        let mut harness = open(r#"[{"name":"a"}]"#);
        next(&mut harness.rx).await;
        drop(harness.rx);

        let end = tokio::time::timeout(WAIT, harness.task)
            .await
            .expect("task ends")
            .expect("task completes");
        assert_eq!(end, StreamEnd::ClientGone);
    }

    #[tokio::test]
    async fn shutdown_ends_the_stream() {
        let mut harness = open(r#"[{"name":"a"}]"#);
        next(&mut harness.rx).await;
        harness.shutdown.send_replace(true);

        let end = tokio::time::timeout(WAIT, harness.task)
            .await
            .expect("task ends")
            .expect("task completes");
        assert_eq!(end, StreamEnd::Shutdown);
    }

    #[tokio::test]
    async fn closed_event_channel_ends_the_stream() {
        let mut harness = open(r#"[{"name":"a"}]"#);
        next(&mut harness.rx).await;
        drop(harness.monitor);

        let end = tokio::time::timeout(WAIT, harness.task)
            .await
            .expect("task ends")
            .expect("task completes");
        assert_eq!(end, StreamEnd::EventsClosed);
    }
}
