//! Poll cycle and poller lifecycle
//!
//! Each tick fetches every active board once, in order. Failures are
//! board-scoped: a transport error or bad status skips the board for this
//! tick, a malformed document disables it until the plugin restarts.

use crate::board::{Board, BoardRegistry};
use crate::catalog::{CatalogError, TelemetryDocument};
use crate::resolver::SensorResolver;
use std::time::Duration;
use symbion_plugin_common::http::{HttpClient, TransportError};
use symbion_plugin_common::shutdown::Shutdown;
use symbion_plugin_common::sink::EventSink;
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("invalid status URL: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error(transparent)]
    Protocol(#[from] CatalogError),
}

impl PollError {
    /// Errors after which the board is not polled again.
    pub fn disables_board(&self) -> bool {
        matches!(self, PollError::Url(_) | PollError::Protocol(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardStatus {
    Active,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Stopped,
    Running,
}

/// What one tick did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub polled: usize,
    pub failed: usize,
    pub skipped: usize,
    pub readings: usize,
}

#[derive(Debug, Default)]
struct BoardPass {
    readings: usize,
}

pub struct Poller<H, S> {
    registry: BoardRegistry,
    status: Vec<BoardStatus>,
    resolver: SensorResolver,
    sink: S,
    client: Option<H>,
}

impl<H: HttpClient, S: EventSink> Poller<H, S> {
    pub fn new(registry: BoardRegistry, resolver: SensorResolver, sink: S) -> Self {
        let status = vec![BoardStatus::Active; registry.len()];
        Self {
            registry,
            status,
            resolver,
            sink,
            client: None,
        }
    }

    pub fn state(&self) -> PollerState {
        if self.client.is_some() {
            PollerState::Running
        } else {
            PollerState::Stopped
        }
    }

    #[cfg(test)]
    pub fn board_status(&self, board: usize) -> Option<BoardStatus> {
        self.status.get(board).copied()
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn start(&mut self, client: H) {
        info!("Starting Resol DL2 poller ({} board(s))", self.registry.len());
        self.client = Some(client);
    }

    /// Releases the HTTP client. Board statuses survive a restart of the
    /// scheduler, not of the plugin.
    pub fn stop(&mut self) {
        if self.client.take().is_some() {
            info!("Resol DL2 poller stopped");
        }
    }

    /// One polling pass over every board.
    pub async fn tick(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let Some(client) = self.client.as_ref() else {
            debug!("poller not started, tick ignored");
            return report;
        };

        for (index, board) in self.registry.boards().iter().enumerate() {
            if self.status[index] == BoardStatus::Disabled {
                report.skipped += 1;
                continue;
            }

            report.polled += 1;
            match poll_board(client, &self.resolver, &self.sink, board).await {
                Ok(pass) => report.readings += pass.readings,
                Err(e) if e.disables_board() => {
                    report.failed += 1;
                    error!("{}: {}, board disabled", board.address(), e);
                    self.status[index] = BoardStatus::Disabled;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("{}: {}, skipped this cycle", board.address(), e);
                }
            }
        }
        report
    }

    /// Polls every `every` until `shutdown` fires. A tick still running when
    /// the next one is due delays it instead of overlapping.
    pub async fn run(&mut self, client: H, every: Duration, mut shutdown: Shutdown) {
        self.start(client);

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.requested() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = shutdown.requested() => break,
                report = self.tick() => debug!(
                    "poll cycle: {} polled, {} failed, {} skipped, {} reading(s)",
                    report.polled, report.failed, report.skipped, report.readings
                ),
            }
        }

        self.stop();
    }
}

async fn poll_board<H: HttpClient, S: EventSink>(
    client: &H,
    resolver: &SensorResolver,
    sink: &S,
    board: &Board,
) -> Result<BoardPass, PollError> {
    let url = board.status_url()?;
    debug!("Fetching {}", url);

    let response = client.get(&url).await?;
    if !response.is_ok() {
        return Err(PollError::Status(response.status));
    }
    if board.log_source_data() {
        info!("{} source data: {}", board.address(), response.body);
    }

    let doc = TelemetryDocument::decode(response.body.as_bytes())?;
    let at = OffsetDateTime::now_utc();
    let mut pass = BoardPass::default();

    for device in 0..doc.device_count() {
        let resolved = match resolver.resolve(board, &doc, device, at) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("{}: device {}: {}", board.address(), device, e);
                continue;
            }
        };
        if let Ok(header) = doc.header(device) {
            let configured = u32::try_from(device).ok().and_then(|d| board.device(d));
            debug!(
                "{}: device {} '{}' [{:?} ch {:?} {:?} -> {:?} {:?}] as {:?} (id {:?}): {:?}",
                board.address(),
                device,
                doc.device_name(device).unwrap_or_default(),
                header.id,
                header.channel,
                header.source_address,
                header.destination_address,
                header.destination_name,
                configured.and_then(|c| c.name.as_deref()),
                configured.and_then(|c| c.id),
                resolved.mode
            );
        }

        for reading in &resolved.readings {
            debug!("{} = {}", reading.address(), reading.formatted_value());
            match sink.emit(reading).await {
                Ok(()) => pass.readings += 1,
                Err(e) => warn!("cannot emit {}: {}", reading.address(), e),
            }
        }
    }
    Ok(pass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbion_devkit::{dl2_document, wait_for_readings, DeviceFixture, MockHttpClient, MockMqttClient, Scripted};
    use symbion_plugin_common::config::ConfigTuple;

    fn solar() -> DeviceFixture {
        DeviceFixture::new("DeltaSol BX")
            .field("Temperature sensor 1", 61.5)
            .field("Temperature sensor 2", 23.0)
            .field("Pump speed relay 1", 100.0)
    }

    fn document(devices: &[DeviceFixture]) -> String {
        dl2_document(devices).to_string()
    }

    fn registry(ports: &[i64]) -> BoardRegistry {
        let tuples: Vec<ConfigTuple> = ports
            .iter()
            .map(|&port| ConfigTuple::new().with("ip-to-query", "10.0.0.1").with("port-to-query", port))
            .collect();
        BoardRegistry::from_tuples(&tuples).unwrap()
    }

    fn poller(ports: &[i64]) -> Poller<MockHttpClient, MockMqttClient> {
        Poller::new(registry(ports), SensorResolver::default(), MockMqttClient::new())
    }

    #[tokio::test]
    async fn test_tick_emits_one_event_per_reading() {
        let http = MockHttpClient::new();
        http.route("10.0.0.1:8081", 200, document(&[solar()]));

        let mut poller = poller(&[8081]);
        poller.start(http.clone());
        let report = poller.tick().await;

        assert_eq!(report, CycleReport { polled: 1, failed: 0, skipped: 0, readings: 3 });
        let events = poller.sink().readings();
        let names: Vec<_> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["temp1", "temp2", "relay1"]);
        assert_eq!(events[0].object, "10.0.0.1:8081:temp1");
        assert_eq!(events[0].value, "61.5");
        assert_eq!(events[2].value, "100.0");

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].as_str(),
            "http://10.0.0.1:8081/dl2/download/download?source=current&output_type=json"
        );
    }

    #[tokio::test]
    async fn test_unreachable_board_does_not_block_others() {
        let http = MockHttpClient::new();
        http.refuse("10.0.0.1:8081");
        http.route("10.0.0.1:8082", 200, document(&[solar()]));

        let mut poller = poller(&[8081, 8082]);
        poller.start(http.clone());
        let report = poller.tick().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.readings, 3);
        // transport failures are retried next tick
        assert_eq!(poller.board_status(0), Some(BoardStatus::Active));

        poller.tick().await;
        assert_eq!(http.requests_to("10.0.0.1:8081"), 2);
    }

    #[tokio::test]
    async fn test_malformed_document_disables_only_that_board() {
        let http = MockHttpClient::new();
        http.route("10.0.0.1:8081", 200, "<html>maintenance</html>");
        http.route("10.0.0.1:8082", 200, document(&[solar()]));

        let mut poller = poller(&[8081, 8082]);
        poller.start(http.clone());

        let first = poller.tick().await;
        assert_eq!(first.failed, 1);
        assert_eq!(poller.board_status(0), Some(BoardStatus::Disabled));
        assert_eq!(poller.board_status(1), Some(BoardStatus::Active));

        let second = poller.tick().await;
        assert_eq!(second, CycleReport { polled: 1, failed: 0, skipped: 1, readings: 3 });
        assert_eq!(http.requests_to("10.0.0.1:8081"), 1);
        assert_eq!(http.requests_to("10.0.0.1:8082"), 2);
    }

    #[tokio::test]
    async fn test_bad_status_skips_board_for_one_tick() {
        let http = MockHttpClient::new();
        http.enqueue(Scripted::Respond { status: 503, body: String::new() });
        http.route("10.0.0.1:8081", 200, document(&[solar()]));

        let mut poller = poller(&[8081]);
        poller.start(http.clone());

        let first = poller.tick().await;
        assert_eq!(first.failed, 1);
        assert_eq!(first.readings, 0);

        let second = poller.tick().await;
        assert_eq!(second.readings, 3);
    }

    #[tokio::test]
    async fn test_broken_device_does_not_drop_siblings() {
        let http = MockHttpClient::new();
        http.route(
            "10.0.0.1:8081",
            200,
            document(&[solar(), DeviceFixture::new("WMZ").field("Temperature 1", 40.0)]),
        );

        let tuple = ConfigTuple::new()
            .with("ip-to-query", "10.0.0.1")
            .with("port-to-query", 8081_i64)
            .with("device0.sensor1.name", "collector");
        let registry = BoardRegistry::from_tuples(&[tuple]).unwrap();
        let mut poller = Poller::new(registry, SensorResolver::default(), MockMqttClient::new());
        poller.start(http);

        let report = poller.tick().await;
        assert_eq!(report.failed, 0);
        let names: Vec<_> = poller.sink().readings().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["temp1"]);
    }

    #[tokio::test]
    async fn test_stopped_poller_does_nothing() {
        let http = MockHttpClient::new();
        http.route("10.0.0.1:8081", 200, document(&[solar()]));

        let mut poller = poller(&[8081]);
        assert_eq!(poller.state(), PollerState::Stopped);
        assert_eq!(poller.tick().await, CycleReport::default());

        poller.start(http.clone());
        assert_eq!(poller.state(), PollerState::Running);
        poller.stop();
        assert_eq!(poller.state(), PollerState::Stopped);
        assert_eq!(poller.tick().await, CycleReport::default());
        assert!(http.requests().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let http = MockHttpClient::new();
        http.route("10.0.0.1:8081", 200, document(&[solar()]));
        let sink = MockMqttClient::new();
        let (trigger, shutdown) = Shutdown::channel();

        let mut poller = Poller::new(registry(&[8081]), SensorResolver::default(), sink.clone());
        let task = {
            let http = http.clone();
            tokio::spawn(async move {
                poller.run(http, Duration::from_millis(10), shutdown).await;
                poller
            })
        };

        // two full cycles of three readings each
        wait_for_readings(&sink, 6, 2000).await.unwrap();
        trigger.trigger();
        let poller = task.await.unwrap();

        assert_eq!(poller.state(), PollerState::Stopped);
        assert!(http.requests_to("10.0.0.1:8081") >= 2);
    }
}
