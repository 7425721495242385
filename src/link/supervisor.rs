//! # Connection Supervisor
//!
//! Owns the transport and keeps one logical link alive across an
//! unreliable connection.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected --(endpoint selected)--> Connecting --(open ok)--> Connected
//!      ^                                     |                        |
//!      +----------(open failed)--------------+                        |
//!      +----------(read error | hangup | shutdown)---------------------+
//! ```
//!
//! Every pass of the outer loop ends with a fixed wait, so a link that
//! keeps failing is retried at most once per reconnect interval. Bad
//! records are dropped one at a time and never end a session. Neither does
//! a quiet link: each receive is time-boxed only so the loop re-checks the
//! transport between records. The transport is closed on every path out of
//! a session.

use std::io;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

use super::transport::{Connector, Transport};
use super::{
    connected_detail, EndpointSelection, LinkState, LinkStatus, StatusReporter, NOT_CONNECTED,
    STATUS_TITLE,
};
use crate::config::LinkConfig;
use crate::frame::parse_record;
use crate::gauge::Gauges;

/// Timing knobs for the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Wait between passes of the outer loop
    pub reconnect_interval: Duration,
    /// Longest a single receive waits before the transport is re-checked
    pub receive_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(1),
            receive_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&LinkConfig> for SupervisorSettings {
    fn from(config: &LinkConfig) -> Self {
        Self {
            reconnect_interval: config.reconnect_interval(),
            receive_timeout: config.receive_timeout(),
        }
    }
}

/// How a session ended
#[derive(Debug)]
enum SessionEnd {
    /// Transport reported not-connected
    LinkClosed,
    /// Receive failed
    Failed(io::Error),
    /// Shutdown was requested
    Shutdown,
}

/// Drives the receive loop and reconnects on failure
pub struct ConnectionSupervisor<C: Connector> {
    connector: C,
    gauges: Arc<Gauges>,
    reporter: Arc<dyn StatusReporter>,
    selection: EndpointSelection,
    settings: SupervisorSettings,
    status: watch::Sender<LinkStatus>,
}

impl<C: Connector> std::fmt::Debug for ConnectionSupervisor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("settings", &self.settings)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ConnectionSupervisor<C> {
    pub fn new(
        connector: C,
        gauges: Arc<Gauges>,
        reporter: Arc<dyn StatusReporter>,
        selection: EndpointSelection,
        settings: SupervisorSettings,
    ) -> Self {
        let (status, _) = watch::channel(LinkStatus::default());
        Self {
            connector,
            gauges,
            reporter,
            selection,
            settings,
            status,
        }
    }

    /// Follow link status changes
    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    /// Current link status
    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    /// Run until `shutdown` turns true (or its sender is dropped)
    ///
    /// Link failures never end this loop. Hands the supervisor back so the
    /// next session reuses it.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Self {
        info!("Connection supervisor started");

        while !*shutdown.borrow() {
            self.reporter.set_status(STATUS_TITLE, NOT_CONNECTED);

            match self.selection.current() {
                Some(endpoint) => self.connect_and_receive(&endpoint, &mut shutdown).await,
                None => {
                    debug!("No endpoint selected");
                    self.status.send_modify(|status| {
                        status.state = LinkState::Disconnected;
                        status.endpoint = None;
                    });
                }
            }

            if wait_or_shutdown(&mut shutdown, self.settings.reconnect_interval).await {
                break;
            }
        }

        self.set_state(LinkState::Disconnected);
        info!("Connection supervisor stopped");
        self
    }

    /// One session: open, receive until it ends, close
    async fn connect_and_receive(&self, endpoint: &str, shutdown: &mut watch::Receiver<bool>) {
        self.status.send_replace(LinkStatus {
            state: LinkState::Connecting,
            endpoint: Some(endpoint.to_string()),
            ..LinkStatus::default()
        });
        debug!(endpoint, "Opening link");

        let opened = tokio::select! {
            opened = self.connector.open(endpoint) => opened,
            _ = wait_for_shutdown(shutdown) => {
                self.set_state(LinkState::Disconnected);
                return;
            }
        };

        let mut transport = match opened {
            Ok(transport) => transport,
            Err(e) => {
                warn!(endpoint, "Failed to open link: {}", e);
                self.set_state(LinkState::Disconnected);
                return;
            }
        };

        info!(endpoint, "Link connected");
        self.set_state(LinkState::Connected);

        let end = self.receive_loop(endpoint, &mut transport, shutdown).await;
        transport.close().await;

        self.set_state(LinkState::Disconnected);
        self.reporter.set_status(STATUS_TITLE, NOT_CONNECTED);

        let status = self.status();
        match end {
            SessionEnd::LinkClosed => info!(endpoint, "Link closed by remote"),
            SessionEnd::Failed(e) => warn!(endpoint, "Link lost: {}", e),
            SessionEnd::Shutdown => info!(endpoint, "Link closed for shutdown"),
        }
        debug!(
            endpoint,
            accepted = status.samples_accepted,
            rejected = status.records_rejected,
            "Session ended"
        );
    }

    async fn receive_loop(
        &self,
        endpoint: &str,
        transport: &mut C::Transport,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let mut announced = false;

        loop {
            if !transport.is_connected() {
                return SessionEnd::LinkClosed;
            }

            let received = tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown) => return SessionEnd::Shutdown,
                received = timeout(self.settings.receive_timeout, transport.receive()) => received,
            };

            let record = match received {
                Ok(Ok(record)) => record,
                Ok(Err(e)) => return SessionEnd::Failed(e),
                Err(_) => {
                    // Quiet, not broken
                    debug!(endpoint, "No record within {:?}", self.settings.receive_timeout);
                    continue;
                }
            };

            match parse_record(&record) {
                Ok(sample) => {
                    if !announced {
                        let parameters = sample.link_parameters();
                        info!(endpoint, "Module reports {}", parameters);
                        self.reporter
                            .set_status(STATUS_TITLE, &connected_detail(endpoint, &parameters));
                        self.status.send_modify(|status| status.parameters = Some(parameters));
                        announced = true;
                    }

                    self.gauges.apply_sample(&sample);
                    self.status.send_modify(|status| status.samples_accepted += 1);
                }
                Err(rejection) => {
                    debug!(record = %record, "Dropped telemetry record: {}", rejection);
                    self.status.send_modify(|status| status.records_rejected += 1);
                }
            }
        }
    }

    fn set_state(&self, state: LinkState) {
        self.status.send_if_modified(|status| {
            let changed = status.state != state;
            status.state = state;
            changed
        });
    }
}

/// Resolve once shutdown is requested or the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Sleep for `period`; returns true if shutdown came first
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, period: Duration) -> bool {
    tokio::select! {
        _ = sleep(period) => false,
        _ = wait_for_shutdown(shutdown) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::transport::mocks::{record, MockConnector, Step};
    use crate::link::MockStatusReporter;
    use std::sync::Mutex;
    use tokio::task::JoinHandle;
    use tokio::time::Instant;

    const FIRST_RECORD: &str = "false,true,60.0,15.0,2.0,3.0,50.0";

    #[derive(Default)]
    struct RecordingReporter {
        updates: Mutex<Vec<(String, String)>>,
    }

    impl RecordingReporter {
        fn details(&self) -> Vec<String> {
            self.updates.lock().unwrap().iter().map(|(_, d)| d.clone()).collect()
        }

        fn last(&self) -> Option<(String, String)> {
            self.updates.lock().unwrap().last().cloned()
        }
    }

    impl StatusReporter for RecordingReporter {
        fn set_status(&self, title: &str, detail: &str) {
            self.updates.lock().unwrap().push((title.to_string(), detail.to_string()));
        }
    }

    struct Harness {
        connector: MockConnector,
        gauges: Arc<Gauges>,
        reporter: Arc<RecordingReporter>,
        selection: EndpointSelection,
        status: watch::Receiver<LinkStatus>,
        shutdown: watch::Sender<bool>,
        handle: JoinHandle<ConnectionSupervisor<MockConnector>>,
    }

    impl Harness {
        fn start(connector: MockConnector, endpoint: Option<&str>) -> Self {
            let gauges = Arc::new(Gauges::default());
            let reporter = Arc::new(RecordingReporter::default());
            let selection = EndpointSelection::new(endpoint.map(str::to_string));
            let supervisor = ConnectionSupervisor::new(
                connector.clone(),
                gauges.clone(),
                reporter.clone(),
                selection.clone(),
                SupervisorSettings {
                    reconnect_interval: Duration::from_secs(1),
                    receive_timeout: Duration::from_secs(2),
                },
            );
            let status = supervisor.subscribe();
            let (shutdown, shutdown_rx) = watch::channel(false);
            let handle = tokio::spawn(supervisor.run(shutdown_rx));

            Self {
                connector,
                gauges,
                reporter,
                selection,
                status,
                shutdown,
                handle,
            }
        }

        fn status(&self) -> LinkStatus {
            self.status.borrow().clone()
        }

        async fn stop(self) -> ConnectionSupervisor<MockConnector> {
            self.shutdown.send(true).unwrap();
            self.handle.await.unwrap()
        }
    }

    /// Let the supervisor task drain whatever it can do without time passing
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_session() {
        let connector = MockConnector::new();
        let feed = connector.push_live();
        let harness = Harness::start(connector, Some("OBDLink"));

        settle().await;
        assert_eq!(harness.status().state, LinkState::Connected);
        assert_eq!(harness.status().endpoint.as_deref(), Some("OBDLink"));
        assert_eq!(
            harness.reporter.last(),
            Some((STATUS_TITLE.to_string(), NOT_CONNECTED.to_string()))
        );

        feed.push(record(FIRST_RECORD));
        settle().await;
        assert_eq!(
            harness.reporter.last(),
            Some(("Main".to_string(), "OBDLink, 500 kbps, extended ids".to_string()))
        );
        assert_eq!(harness.gauges.speed.target(), 60.0);
        assert_eq!(harness.gauges.rpm.target(), 15.0);
        assert_eq!(harness.gauges.load.target(), 2.0);
        assert_eq!(harness.gauges.temp.target(), 3.0);
        assert_eq!(harness.gauges.fuel.target(), 50.0);

        feed.push(record("x,y"));
        settle().await;
        let status = harness.status();
        assert_eq!(status.state, LinkState::Connected);
        assert_eq!(status.samples_accepted, 1);
        assert_eq!(status.records_rejected, 1);
        assert_eq!(harness.connector.close_count(), 0);

        feed.push(Step::Fail(io::ErrorKind::BrokenPipe));
        settle().await;
        assert_eq!(harness.status().state, LinkState::Disconnected);
        assert_eq!(harness.connector.close_count(), 1);
        assert_eq!(harness.connector.open_attempts().len(), 1);
        // Stalled link keeps the last target
        assert_eq!(harness.gauges.speed.target(), 60.0);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let attempts = harness.connector.open_attempts();
        assert_eq!(attempts.len(), 2, "Expected one retry after the interval");
        assert!(attempts[1].1 - attempts[0].1 >= Duration::from_secs(1));

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_parameters_announced_once_per_session() {
        let connector = MockConnector::new();
        connector.push_scripted(vec![
            record("true,false,1,1,1,1,1"),
            record("false,true,2,2,2,2,2"),
            Step::Hangup,
        ]);
        connector.push_scripted(vec![record("false,true,3,3,3,3,3")]);
        let harness = Harness::start(connector, Some("OBDLink"));

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let announcements: Vec<_> = harness
            .reporter
            .details()
            .into_iter()
            .filter(|d| d != NOT_CONNECTED)
            .collect();
        assert_eq!(
            announcements,
            ["OBDLink, 250 kbps, standard ids", "OBDLink, 500 kbps, extended ids"]
        );
        assert_eq!(harness.gauges.speed.target(), 3.0);

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_attempts_are_spaced_by_interval() {
        let connector = MockConnector::new();
        let harness = Harness::start(connector, Some("OBDLink"));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        let connector = harness.connector.clone();
        harness.stop().await;

        let attempts = connector.open_attempts();
        assert!(attempts.len() >= 10, "Only {} attempts", attempts.len());
        assert!(attempts.len() <= 11, "Too many attempts: {}", attempts.len());
        for pair in attempts.windows(2) {
            assert!(
                pair[1].1 - pair[0].1 >= Duration::from_secs(1),
                "Retried after {:?}",
                pair[1].1 - pair[0].1
            );
        }
        assert!(attempts.iter().all(|(endpoint, _)| endpoint == "OBDLink"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_records_never_close_the_link() {
        let connector = MockConnector::new();
        let steps = (0..9)
            .map(|i| {
                if i % 3 == 2 {
                    record("false,false,60.0,oops,2.0,3.0")
                } else {
                    record(&format!("false,false,{}.0,0,0,0,0", i))
                }
            })
            .collect();
        connector.push_scripted(steps);
        let harness = Harness::start(connector, Some("OBDLink"));

        settle().await;
        let status = harness.status();
        assert_eq!(status.state, LinkState::Connected);
        assert_eq!(status.samples_accepted, 6);
        assert_eq!(status.records_rejected, 3);
        assert_eq!(harness.connector.close_count(), 0);
        assert_eq!(harness.connector.open_attempts().len(), 1);
        // Last well-formed record was index 7
        assert_eq!(harness.gauges.speed.target(), 7.0);

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_link_keeps_session() {
        let connector = MockConnector::new();
        let feed = connector.push_live();
        let harness = Harness::start(connector, Some("OBDLink"));

        feed.push(record(FIRST_RECORD));
        settle().await;
        assert_eq!(harness.status().state, LinkState::Connected);

        // Three receive timeouts pass without a record
        tokio::time::sleep(Duration::from_secs(6)).await;
        let status = harness.status();
        assert_eq!(status.state, LinkState::Connected);
        assert_eq!(harness.connector.close_count(), 0);
        assert_eq!(harness.connector.open_attempts().len(), 1);
        assert_eq!(
            harness.reporter.last().map(|(_, d)| d),
            Some("OBDLink, 500 kbps, extended ids".to_string())
        );

        feed.push(record("false,true,70.0,15.0,2.0,3.0,50.0"));
        settle().await;
        assert_eq!(harness.gauges.speed.target(), 70.0);
        assert_eq!(harness.status().samples_accepted, 2);

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_link_notices_hangup() {
        let connector = MockConnector::new();
        let feed = connector.push_live();
        let harness = Harness::start(connector, Some("OBDLink"));

        settle().await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(harness.status().state, LinkState::Connected);

        feed.push(Step::Hangup);
        settle().await;
        assert_eq!(harness.status().state, LinkState::Disconnected);
        assert_eq!(harness.connector.close_count(), 1);

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_blocking_receive() {
        let connector = MockConnector::new();
        let _feed = connector.push_live();
        let harness = Harness::start(connector, Some("OBDLink"));

        settle().await;
        assert_eq!(harness.status().state, LinkState::Connected);

        let connector = harness.connector.clone();
        let before = Instant::now();
        let supervisor = harness.stop().await;

        assert!(before.elapsed() < Duration::from_millis(100));
        assert_eq!(connector.close_count(), 1, "Transport must be closed on shutdown");
        assert_eq!(supervisor.status().state, LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hangup_ends_session() {
        let connector = MockConnector::new();
        connector.push_scripted(vec![record(FIRST_RECORD), Step::Hangup]);
        let harness = Harness::start(connector, Some("OBDLink"));

        settle().await;
        assert_eq!(harness.status().state, LinkState::Disconnected);
        assert_eq!(harness.connector.close_count(), 1);
        assert_eq!(harness.reporter.last().map(|(_, d)| d), Some(NOT_CONNECTED.to_string()));

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_change_waits_for_session_end() {
        let connector = MockConnector::new();
        let feed = connector.push_live();
        let harness = Harness::start(connector, Some("OBDLink"));

        settle().await;
        harness.selection.select("/dev/rfcomm1");
        feed.push(record(FIRST_RECORD));
        settle().await;

        let status = harness.status();
        assert_eq!(status.state, LinkState::Connected);
        assert_eq!(status.endpoint.as_deref(), Some("OBDLink"));
        assert_eq!(harness.connector.open_attempts().len(), 1);

        feed.push(Step::Fail(io::ErrorKind::ConnectionReset));
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let attempts = harness.connector.open_attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1].0, "/dev/rfcomm1");

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_without_endpoint() {
        let connector = MockConnector::new();
        let harness = Harness::start(connector, None);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(harness.connector.open_attempts().is_empty());
        assert_eq!(harness.status().state, LinkState::Disconnected);

        // Picked up on the next pass
        harness.selection.select("OBDLink");
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(harness.connector.open_attempts().len(), 1);

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_not_connected_each_pass() {
        let mut reporter = MockStatusReporter::new();
        reporter
            .expect_set_status()
            .withf(|title, detail| title == STATUS_TITLE && detail == NOT_CONNECTED)
            .times(3)
            .return_const(());

        let supervisor = ConnectionSupervisor::new(
            MockConnector::new(),
            Arc::new(Gauges::default()),
            Arc::new(reporter),
            EndpointSelection::default(),
            SupervisorSettings::default(),
        );
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(supervisor.run(shutdown_rx));

        // Passes at 0s, 1s and 2s
        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown.send(true).unwrap();
        let supervisor = handle.await.unwrap();

        // Dropping the supervisor drops the mock and checks the call count
        drop(supervisor);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_reusable_after_stop() {
        let connector = MockConnector::new();
        connector.push_scripted(vec![record(FIRST_RECORD)]);
        let harness = Harness::start(connector.clone(), Some("OBDLink"));
        settle().await;
        let supervisor = harness.stop().await;

        connector.push_scripted(vec![record("true,true,9,9,9,9,9")]);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(supervisor.run(shutdown_rx));
        settle().await;
        shutdown.send(true).unwrap();
        let supervisor = handle.await.unwrap();

        assert_eq!(connector.open_attempts().len(), 2);
        assert_eq!(connector.close_count(), 2);
        assert_eq!(supervisor.status().state, LinkState::Disconnected);
    }
}
