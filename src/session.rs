//! # Session Module
//!
//! Starts and stops the two activities of a live session: the connection
//! supervisor (ingestion) and the gauge animator.
//!
//! Both tasks share one shutdown signal. Stopping a session waits for both
//! to finish and takes back the supervisor and animator they owned, so a
//! new session can only start once the previous one has fully ended and
//! two supervisors can never drive the same transport.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::Result;
use crate::gauge::animator::AnimationScheduler;
use crate::link::{ConnectionSupervisor, Connector, LinkStatus};

/// A running session
pub struct Session<C: Connector + 'static> {
    shutdown: watch::Sender<bool>,
    ingestion: JoinHandle<ConnectionSupervisor<C>>,
    animation: JoinHandle<AnimationScheduler>,
}

impl<C: Connector + 'static> Session<C> {
    /// Spawn both activities
    pub fn start(supervisor: ConnectionSupervisor<C>, animator: AnimationScheduler) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let ingestion = tokio::spawn(supervisor.run(shutdown_rx.clone()));
        let animation = tokio::spawn(animator.run(shutdown_rx));

        info!("Session started");
        Self {
            shutdown,
            ingestion,
            animation,
        }
    }

    /// Signal both activities and wait for them to finish
    ///
    /// # Errors
    ///
    /// Returns error if either task panicked
    pub async fn stop(self) -> Result<(ConnectionSupervisor<C>, AnimationScheduler)> {
        // Receivers may already be gone if a task died; joining reports that
        let _ = self.shutdown.send(true);

        let supervisor = self.ingestion.await?;
        let animator = self.animation.await?;

        info!("Session stopped");
        Ok((supervisor, animator))
    }
}

enum Phase<C: Connector + 'static> {
    Paused {
        supervisor: ConnectionSupervisor<C>,
        animator: AnimationScheduler,
    },
    Running(Session<C>),
    /// A previous stop failed; the activities are gone for good
    Failed,
}

/// Pause/resume control over the live session
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use mechanic::gauge::{animator::AnimationScheduler, Gauges};
/// use mechanic::link::{ConnectionSupervisor, EndpointSelection, SupervisorSettings};
/// use mechanic::display::ConsoleStatus;
/// use mechanic::serial::SerialConnector;
/// use mechanic::session::SessionController;
///
/// # async fn demo() -> mechanic::error::Result<()> {
/// let gauges = Arc::new(Gauges::default());
/// let supervisor = ConnectionSupervisor::new(
///     SerialConnector::default(),
///     gauges.clone(),
///     Arc::new(ConsoleStatus::new()),
///     EndpointSelection::new(Some("/dev/rfcomm0".to_string())),
///     SupervisorSettings::default(),
/// );
/// let animator = AnimationScheduler::new(gauges, Duration::from_millis(20));
///
/// let mut controller = SessionController::new(supervisor, animator);
/// controller.resume();
/// controller.pause().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionController<C: Connector + 'static> {
    phase: Phase<C>,
    status: watch::Receiver<LinkStatus>,
}

impl<C: Connector + 'static> SessionController<C> {
    pub fn new(supervisor: ConnectionSupervisor<C>, animator: AnimationScheduler) -> Self {
        let status = supervisor.subscribe();
        Self {
            phase: Phase::Paused {
                supervisor,
                animator,
            },
            status,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running(_))
    }

    /// Follow the link status across sessions
    pub fn link_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    /// Start a session. Does nothing if one is already running.
    ///
    /// Returns whether a new session was started.
    pub fn resume(&mut self) -> bool {
        match std::mem::replace(&mut self.phase, Phase::Failed) {
            Phase::Paused {
                supervisor,
                animator,
            } => {
                self.phase = Phase::Running(Session::start(supervisor, animator));
                true
            }
            other => {
                self.phase = other;
                false
            }
        }
    }

    /// Stop the running session and wait until both activities have ended
    ///
    /// # Errors
    ///
    /// Returns error if a session task panicked; the controller cannot be
    /// resumed afterwards.
    pub async fn pause(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.phase, Phase::Failed) {
            Phase::Running(session) => {
                let (supervisor, animator) = session.stop().await?;
                self.phase = Phase::Paused {
                    supervisor,
                    animator,
                };
                Ok(())
            }
            other => {
                self.phase = other;
                Ok(())
            }
        }
    }
}
