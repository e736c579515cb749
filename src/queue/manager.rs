//! Per-session filing queues
//!
//! Every session gets one worker task that files its requests strictly in
//! arrival order. Workers of different sessions run concurrently. A worker
//! started for an id whose previous worker is still draining waits for it
//! before filing anything.

use crate::backend::messages::BackendEvent;
use crate::filer::Filer;
use crate::session::SessionId;
use crate::utils::organizer::FilingRequest;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Completes once a closed worker has filed its backlog
pub type Drain = Shared<BoxFuture<'static, ()>>;

/// Filing queue manager, owned by the dispatcher
pub struct FilingQueue {
    filer: Arc<Filer>,
    workers: HashMap<SessionId, SessionWorker>,
    draining: HashMap<SessionId, Drain>,
    events: mpsc::UnboundedSender<BackendEvent>,
}

/// Worker handle for one session
struct SessionWorker {
    jobs: mpsc::UnboundedSender<FilingRequest>,
    join_handle: JoinHandle<()>,
}

impl FilingQueue {
    pub fn new(filer: Arc<Filer>, events: mpsc::UnboundedSender<BackendEvent>) -> Self {
        Self {
            filer,
            workers: HashMap::new(),
            draining: HashMap::new(),
            events,
        }
    }

    /// Queue a request behind the session's earlier ones
    pub fn enqueue(&mut self, session_id: &SessionId, request: FilingRequest) {
        let request = match self.workers.get(session_id) {
            Some(worker) => match worker.jobs.send(request) {
                Ok(()) => return,
                // Worker died; start a fresh one below
                Err(mpsc::error::SendError(request)) => request,
            },
            None => request,
        };

        let previous = self.take_draining(session_id);
        let worker = self.spawn_worker(session_id.clone(), previous);
        if worker.jobs.send(request).is_err() {
            error!("Filing worker for session {} exited immediately", session_id);
        }
        self.workers.insert(session_id.clone(), worker);
    }

    /// Stop accepting requests for a session
    ///
    /// The returned future completes once everything already queued for the
    /// id is filed. `None` when nothing is queued or still being filed.
    pub fn close(&mut self, session_id: &SessionId) -> Option<Drain> {
        self.draining.retain(|_, drain| drain.peek().is_none());

        match self.workers.remove(session_id) {
            Some(worker) => {
                debug!("Closing filing queue for session {}", session_id);
                let drain = worker.finish(session_id.clone());
                self.draining.insert(session_id.clone(), drain.clone());
                Some(drain)
            }
            None => self.draining.get(session_id).cloned(),
        }
    }

    /// Close every queue
    pub fn close_all(&mut self) -> Vec<(SessionId, Drain)> {
        let ids: Vec<SessionId> = self.workers.keys().cloned().collect();
        ids.into_iter()
            .filter_map(|id| self.close(&id).map(|drain| (id, drain)))
            .collect()
    }

    pub fn active_sessions(&self) -> usize {
        self.workers.len()
    }

    fn take_draining(&mut self, session_id: &SessionId) -> Option<Drain> {
        self.draining
            .remove(session_id)
            .filter(|drain| drain.peek().is_none())
    }

    fn spawn_worker(&self, session_id: SessionId, previous: Option<Drain>) -> SessionWorker {
        let (jobs, mut rx) = mpsc::unbounded_channel::<FilingRequest>();
        let filer = Arc::clone(&self.filer);
        let events = self.events.clone();

        info!("Started filing worker for session {}", session_id);

        let join_handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                debug!("Session {} waits for its previous worker", session_id);
                previous.await;
            }

            while let Some(request) = rx.recv().await {
                let event = match filer.file(&request).await {
                    Ok(to) => BackendEvent::FileFiled {
                        session_id: session_id.clone(),
                        from: request.source_path.clone(),
                        to,
                    },
                    Err(e) => {
                        error!(
                            "Session {}: {:?} stays where it is: {}",
                            session_id, request.source_path, e
                        );
                        BackendEvent::FilingFailed {
                            session_id: session_id.clone(),
                            path: request.source_path.clone(),
                            error: e.to_string(),
                        }
                    }
                };
                let _ = events.send(event);
            }
            debug!("Filing worker for session {} drained", session_id);
        });

        SessionWorker { jobs, join_handle }
    }
}

impl SessionWorker {
    fn finish(self, session_id: SessionId) -> Drain {
        // Dropping the sender ends the worker loop after the backlog
        drop(self.jobs);
        let join_handle = self.join_handle;
        async move {
            if let Err(e) = join_handle.await {
                error!("Filing worker for session {} panicked: {}", session_id, e);
            }
        }
        .boxed()
        .shared()
    }
}
