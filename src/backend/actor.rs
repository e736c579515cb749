use super::messages::{BackendCommand, BackendEvent};
use crate::filer::Filer;
use crate::queue::{Drain, FilingQueue};
use crate::session::{MediaKind, SessionId, SessionTracker, StopOutcome};
use crate::title::{CaptureHost, SourceId, TitleResolver};
use crate::utils::bindings::SourceBindings;
use crate::utils::config::AppSettings;
use crate::utils::error::RecorderError;
use crate::utils::organizer::Placement;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Capacity of the command channel into the actor
const COMMAND_BUFFER: usize = 256;

/// A session whose filing worker has finished
#[derive(Debug)]
struct Drained {
    session_id: SessionId,
    forced: bool,
}

enum Wake {
    Command(Option<BackendCommand>),
    Drained(Drained),
    Sweep,
}

/// Event dispatcher
///
/// Owns the session table outright; host events are applied one at a time
/// in the order they were sent. Filing runs on per-session workers so a slow
/// move never holds up other sessions.
pub struct BackendActor {
    receiver: mpsc::Receiver<BackendCommand>,
    events: mpsc::UnboundedSender<BackendEvent>,

    settings: AppSettings,
    tracker: SessionTracker,
    queue: FilingQueue,

    drained_tx: mpsc::UnboundedSender<Drained>,
    drained_rx: mpsc::UnboundedReceiver<Drained>,
    drains: Vec<JoinHandle<()>>,
}

impl BackendActor {
    pub fn new(
        settings: AppSettings,
        host: Arc<dyn CaptureHost>,
        bindings: Arc<SourceBindings>,
        receiver: mpsc::Receiver<BackendCommand>,
        events: mpsc::UnboundedSender<BackendEvent>,
    ) -> Self {
        let settings = settings.validated();

        let resolver = Arc::new(TitleResolver::new(
            host,
            bindings,
            settings.sessions.title_query_timeout(),
            settings.sessions.title_query_attempts,
        ));
        let tracker = SessionTracker::new(resolver, settings.sessions.title_resolve_attempts);

        let filer = Arc::new(Filer::new(settings.filer.clone()));
        let queue = FilingQueue::new(filer, events.clone());

        let (drained_tx, drained_rx) = mpsc::unbounded_channel();

        Self {
            receiver,
            events,
            settings,
            tracker,
            queue,
            drained_tx,
            drained_rx,
            drains: Vec::new(),
        }
    }

    pub async fn run(mut self) {
        info!("Dispatcher started");

        let mut sweep = tokio::time::interval(self.settings.sessions.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        sweep.tick().await;

        loop {
            let wake = tokio::select! {
                cmd = self.receiver.recv() => Wake::Command(cmd),
                Some(drained) = self.drained_rx.recv() => Wake::Drained(drained),
                _ = sweep.tick() => Wake::Sweep,
            };

            match wake {
                Wake::Command(Some(BackendCommand::Shutdown { ack })) => {
                    self.shutdown().await;
                    let _ = ack.send(());
                    break;
                }
                Wake::Command(Some(cmd)) => self.handle_command(cmd).await,
                Wake::Command(None) => {
                    info!("All dispatcher handles dropped");
                    self.shutdown().await;
                    break;
                }
                Wake::Drained(drained) => self.on_drained(drained),
                Wake::Sweep => self.sweep(),
            }
        }

        info!("Dispatcher stopped");
    }

    async fn handle_command(&mut self, cmd: BackendCommand) {
        match cmd {
            BackendCommand::CaptureStarted {
                session_id,
                source,
                media_kind,
                at,
            } => {
                let session = self
                    .tracker
                    .on_started(session_id, source, media_kind, at)
                    .await;
                let event = BackendEvent::SessionStarted {
                    session_id: session.id.clone(),
                    title: session.resolved_title().map(str::to_string),
                };
                self.emit(event);
            }
            BackendCommand::FileSplit {
                session_id,
                path,
                at,
            } => {
                // Splits only come from recording outputs
                let media_kind = self
                    .tracker
                    .get(&session_id)
                    .map(|s| s.media_kind)
                    .unwrap_or(MediaKind::Recording);
                self.handle_file(session_id, path, media_kind, at).await;
            }
            BackendCommand::FileSaved {
                session_id,
                path,
                media_kind,
                at,
            } => {
                self.handle_file(session_id, path, media_kind, at).await;
            }
            BackendCommand::CaptureStopped { session_id, at } => {
                debug!("Session {} stopped at {}", session_id, at);
                match self.tracker.on_stopped(&session_id) {
                    StopOutcome::Closing => self.begin_close(session_id, false),
                    StopOutcome::AlreadyClosing => {
                        debug!("Session {} is already stopping", session_id)
                    }
                    StopOutcome::Unknown => {}
                }
            }
            BackendCommand::WindowHooked { source } => {
                debug!("Source {} hooked a window", source);
                self.tracker.on_window_hooked(&source).await;
            }
            BackendCommand::SceneCollectionChanged => {
                let closing = self.tracker.close_all();
                info!(
                    "Scene collection changed, closing {} session(s)",
                    closing.len()
                );
                for id in closing {
                    self.begin_close(id, true);
                }
            }
            BackendCommand::Barrier { ack } => {
                let _ = ack.send(());
            }
            BackendCommand::Shutdown { .. } => {
                // Handled by the run loop
            }
        }
    }

    async fn handle_file(
        &mut self,
        session_id: SessionId,
        path: PathBuf,
        media_kind: MediaKind,
        at: DateTime<Local>,
    ) {
        let arrival = self
            .tracker
            .on_file(session_id, &path, media_kind, at, &self.settings.policy)
            .await;

        match arrival.placement {
            Placement::File(request) => self.queue.enqueue(&arrival.session_id, request),
            Placement::LeaveInPlace { path, reason } => {
                info!("Leaving {:?} in place: {}", path, reason);
                self.emit(BackendEvent::FileLeftInPlace {
                    session_id: arrival.session_id.clone(),
                    path,
                    reason: reason.to_string(),
                });
            }
        }

        if arrival.closed {
            self.begin_close(arrival.session_id, false);
        }
    }

    /// Close the session's queue and report once its backlog is filed
    fn begin_close(&mut self, session_id: SessionId, forced: bool) {
        let Some(drain) = self.queue.close(&session_id) else {
            self.on_drained(Drained { session_id, forced });
            return;
        };
        self.watch_drain(session_id, drain, forced);
    }

    fn watch_drain(&mut self, session_id: SessionId, drain: Drain, forced: bool) {
        let drained_tx = self.drained_tx.clone();
        self.drains.retain(|handle| !handle.is_finished());
        self.drains.push(tokio::spawn(async move {
            drain.await;
            let _ = drained_tx.send(Drained { session_id, forced });
        }));
    }

    fn on_drained(&mut self, drained: Drained) {
        let Drained { session_id, forced } = drained;
        if let Some(session) = self.tracker.finish(&session_id) {
            info!(
                "Session {} closed, {} file(s) handled",
                session_id,
                session.split_sequence.len()
            );
        }
        self.emit(BackendEvent::SessionClosed { session_id, forced });
    }

    fn sweep(&mut self) {
        let stale = self
            .tracker
            .evict_stale(Instant::now(), self.settings.sessions.idle_timeout());
        for session in stale {
            self.begin_close(session.id, true);
        }
    }

    async fn shutdown(&mut self) {
        self.receiver.close();

        let closing = self.tracker.close_all();
        info!("Dispatcher shutting down, closing {} session(s)", closing.len());
        for id in closing {
            self.begin_close(id, true);
        }
        // Workers whose sessions are already gone from the table
        for (session_id, drain) in self.queue.close_all() {
            self.watch_drain(session_id, drain, true);
        }

        for result in futures::future::join_all(self.drains.drain(..)).await {
            if let Err(e) = result {
                warn!("Drain task failed: {}", e);
            }
        }
        while let Ok(drained) = self.drained_rx.try_recv() {
            self.on_drained(drained);
        }
    }

    fn emit(&self, event: BackendEvent) {
        if self.events.send(event).is_err() {
            debug!("Status event receiver dropped");
        }
    }
}

/// Cloneable handle used by host adapters to feed the dispatcher
#[derive(Clone)]
pub struct Dispatcher {
    sender: mpsc::Sender<BackendCommand>,
}

impl Dispatcher {
    pub fn new(sender: mpsc::Sender<BackendCommand>) -> Self {
        Self { sender }
    }

    pub async fn capture_started(
        &self,
        session_id: SessionId,
        source: SourceId,
        media_kind: MediaKind,
    ) -> Result<(), RecorderError> {
        self.dispatch(BackendCommand::CaptureStarted {
            session_id,
            source,
            media_kind,
            at: Local::now(),
        })
        .await
    }

    pub async fn file_split(
        &self,
        session_id: SessionId,
        path: impl Into<PathBuf>,
    ) -> Result<(), RecorderError> {
        self.dispatch(BackendCommand::FileSplit {
            session_id,
            path: path.into(),
            at: Local::now(),
        })
        .await
    }

    pub async fn file_saved(
        &self,
        session_id: SessionId,
        path: impl Into<PathBuf>,
        media_kind: MediaKind,
    ) -> Result<(), RecorderError> {
        self.dispatch(BackendCommand::FileSaved {
            session_id,
            path: path.into(),
            media_kind,
            at: Local::now(),
        })
        .await
    }

    pub async fn capture_stopped(&self, session_id: SessionId) -> Result<(), RecorderError> {
        self.dispatch(BackendCommand::CaptureStopped {
            session_id,
            at: Local::now(),
        })
        .await
    }

    pub async fn window_hooked(&self, source: SourceId) -> Result<(), RecorderError> {
        self.dispatch(BackendCommand::WindowHooked { source }).await
    }

    pub async fn scene_collection_changed(&self) -> Result<(), RecorderError> {
        self.dispatch(BackendCommand::SceneCollectionChanged).await
    }

    /// Send a command with caller-supplied timestamps
    pub async fn dispatch(&self, cmd: BackendCommand) -> Result<(), RecorderError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RecorderError::DispatcherClosed)
    }

    /// Wait until the dispatcher has applied everything sent so far
    ///
    /// Filing itself may still be in flight.
    pub async fn barrier(&self) -> Result<(), RecorderError> {
        let (ack, done) = oneshot::channel();
        self.dispatch(BackendCommand::Barrier { ack }).await?;
        done.await.map_err(|_| RecorderError::DispatcherClosed)
    }

    /// Close every session, wait for queued files to be filed, then stop
    pub async fn shutdown(&self) -> Result<(), RecorderError> {
        let (ack, done) = oneshot::channel();
        self.dispatch(BackendCommand::Shutdown { ack }).await?;
        done.await.map_err(|_| RecorderError::DispatcherClosed)
    }
}

/// Start a dispatcher actor on the current runtime
pub fn spawn_dispatcher(
    settings: AppSettings,
    host: Arc<dyn CaptureHost>,
    bindings: Arc<SourceBindings>,
) -> (Dispatcher, mpsc::UnboundedReceiver<BackendEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let actor = BackendActor::new(settings, host, bindings, cmd_rx, event_tx);
    tokio::spawn(actor.run());

    (Dispatcher::new(cmd_tx), event_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::title::StaticHost;
    use std::path::Path;
    use tempfile::TempDir;

    async fn setup(root: &Path) -> (Dispatcher, mpsc::UnboundedReceiver<BackendEvent>, Arc<StaticHost>) {
        let host = Arc::new(StaticHost::new());
        host.set_title("gc", Some("Game A".into())).await;

        let mut settings = AppSettings::default();
        settings.policy.capture_root = Some(root.to_path_buf());
        settings.filer.retry_attempts = 0;

        let (dispatcher, events) =
            spawn_dispatcher(settings, host.clone(), Arc::new(SourceBindings::new()));
        (dispatcher, events, host)
    }

    fn collect(events: &mut mpsc::UnboundedReceiver<BackendEvent>) -> Vec<BackendEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_start_split_stop() {
        let temp_dir = TempDir::new().unwrap();
        let (dispatcher, mut events, _host) = setup(temp_dir.path()).await;
        let id = SessionId::from(1u64);
        let file = temp_dir.path().join("rec1.mp4");
        std::fs::write(&file, b"data").unwrap();

        dispatcher
            .capture_started(id.clone(), SourceId::from("gc"), MediaKind::Recording)
            .await
            .unwrap();
        dispatcher.file_split(id.clone(), &file).await.unwrap();
        dispatcher.capture_stopped(id.clone()).await.unwrap();
        dispatcher.shutdown().await.unwrap();

        let target = temp_dir.path().join("Game A/Recordings/rec1.mp4");
        assert!(target.exists());
        assert!(!file.exists());

        let events = collect(&mut events);
        assert_eq!(
            events,
            vec![
                BackendEvent::SessionStarted {
                    session_id: id.clone(),
                    title: Some("Game A".into()),
                },
                BackendEvent::FileFiled {
                    session_id: id.clone(),
                    from: file,
                    to: target,
                },
                BackendEvent::SessionClosed {
                    session_id: id,
                    forced: false,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_force_closes_live_sessions() {
        let temp_dir = TempDir::new().unwrap();
        let (dispatcher, mut events, _host) = setup(temp_dir.path()).await;
        let id = SessionId::from(7u64);

        dispatcher
            .capture_started(id.clone(), SourceId::from("gc"), MediaKind::ReplayBuffer)
            .await
            .unwrap();
        dispatcher.shutdown().await.unwrap();

        let events = collect(&mut events);
        assert_eq!(
            events.last(),
            Some(&BackendEvent::SessionClosed {
                session_id: id,
                forced: true,
            })
        );
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_fails() {
        let temp_dir = TempDir::new().unwrap();
        let (dispatcher, _events, _host) = setup(temp_dir.path()).await;

        dispatcher.shutdown().await.unwrap();
        let result = dispatcher.capture_stopped(SessionId::from(1u64)).await;
        assert!(matches!(result, Err(RecorderError::DispatcherClosed)));
    }

    #[tokio::test]
    async fn test_missing_file_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let (dispatcher, mut events, _host) = setup(temp_dir.path()).await;
        let id = SessionId::from(1u64);
        let missing = temp_dir.path().join("gone.mp4");

        dispatcher
            .capture_started(id.clone(), SourceId::from("gc"), MediaKind::Recording)
            .await
            .unwrap();
        dispatcher.file_split(id.clone(), &missing).await.unwrap();
        dispatcher.shutdown().await.unwrap();

        assert!(collect(&mut events).iter().any(|event| matches!(
            event,
            BackendEvent::FilingFailed { path, .. } if *path == missing
        )));
    }

    #[tokio::test]
    async fn test_restarted_session_files_after_previous_backlog() {
        let temp_dir = TempDir::new().unwrap();
        let (dispatcher, mut events, _host) = setup(temp_dir.path()).await;
        let id = SessionId::from(1u64);
        let out = temp_dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();

        dispatcher
            .capture_started(id.clone(), SourceId::from("gc"), MediaKind::Recording)
            .await
            .unwrap();
        for i in 0..30 {
            let file = out.join(format!("old{:02}.mp4", i));
            std::fs::write(&file, b"old").unwrap();
            dispatcher.file_split(id.clone(), file).await.unwrap();
        }
        dispatcher.capture_stopped(id.clone()).await.unwrap();

        // The host reuses the id before the first backlog is filed
        let fresh = out.join("new.mp4");
        std::fs::write(&fresh, b"new").unwrap();
        dispatcher
            .capture_started(id.clone(), SourceId::from("gc"), MediaKind::Recording)
            .await
            .unwrap();
        dispatcher.file_split(id.clone(), &fresh).await.unwrap();
        dispatcher.shutdown().await.unwrap();

        let sources: Vec<PathBuf> = collect(&mut events)
            .into_iter()
            .filter_map(|event| match event {
                BackendEvent::FileFiled { from, .. } => Some(from),
                _ => None,
            })
            .collect();
        assert_eq!(sources.len(), 31);
        assert_eq!(sources.last(), Some(&fresh));
    }
}
