//! Session registry: named (cookie jar, transport) pairs with TTL eviction.
//!
//! Each registered session is a worker task that owns its mutable state and
//! is driven through a bounded command inbox. The inbox is the session's
//! mutual-exclusion token: the worker handles one call at a time, so
//! requests on a session serialize without any lock held across network I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use crate::fingerprint::ImpersonationProfile;
use crate::redirect::{self, InitialRequest, RedirectOutcome};
use crate::transport::pool::SessionTransport;

/// Queued calls per session before senders back off.
const SESSION_INBOX_CAPACITY: usize = 32;

/// Mutable per-session state, owned exclusively by the session worker (or,
/// for ephemeral sessions, by the single orchestrated call).
pub struct SessionState {
    pub jar: CookieJar,
    pub transport: SessionTransport,
    pub request_count: u64,
}

impl SessionState {
    pub fn new(profile: ImpersonationProfile) -> Self {
        Self {
            jar: CookieJar::new(),
            transport: SessionTransport::new(profile),
            request_count: 0,
        }
    }
}

enum SessionCommand {
    Execute {
        request: InitialRequest,
        hop_timeout: Duration,
        /// Carries the instant the worker dequeued the call, so elapsed
        /// time excludes queue wait.
        reply: oneshot::Sender<(Result<RedirectOutcome>, Instant)>,
    },
    Cookies {
        reply: oneshot::Sender<HashMap<String, String>>,
    },
}

/// A registered session, addressed through its worker inbox.
#[derive(Debug)]
pub struct Session {
    id: String,
    created_at: Instant,
    last_access: StdMutex<Instant>,
    inbox: mpsc::Sender<SessionCommand>,
    /// Commands sent but not yet finished; nonzero means in use.
    pending: Arc<AtomicUsize>,
}

impl Session {
    fn new(id: String, profile: ImpersonationProfile) -> Self {
        let now = Instant::now();
        let (inbox, commands) = mpsc::channel(SESSION_INBOX_CAPACITY);
        let pending = Arc::new(AtomicUsize::new(0));
        tokio::spawn(run_session_worker(
            SessionState::new(profile),
            profile,
            commands,
            Arc::clone(&pending),
            id.clone(),
        ));
        Self {
            id,
            created_at: now,
            last_access: StdMutex::new(now),
            inbox,
            pending,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Refresh the idle clock.
    pub fn touch(&self) {
        *self.last_access.lock().expect("last_access lock poisoned") = Instant::now();
    }

    /// Whether the worker is processing or has queued calls.
    pub fn in_use(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    /// Run one orchestrated call on this session's worker.
    ///
    /// Returns the terminal outcome and the instant the worker began the
    /// call (after any queue wait).
    pub async fn execute(
        &self,
        request: InitialRequest,
        hop_timeout: Duration,
    ) -> Result<(RedirectOutcome, Instant)> {
        let (reply, response) = oneshot::channel();
        self.pending.fetch_add(1, Ordering::SeqCst);
        let command = SessionCommand::Execute {
            request,
            hop_timeout,
            reply,
        };
        if self.inbox.send(command).await.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::protocol("session worker unavailable"));
        }
        let (result, started) = response
            .await
            .map_err(|_| Error::protocol("session worker dropped the call"))?;
        Ok((result?, started))
    }

    /// Flat cookie snapshot, read by the worker between calls.
    pub async fn cookies(&self) -> Result<HashMap<String, String>> {
        let (reply, response) = oneshot::channel();
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.inbox.send(SessionCommand::Cookies { reply }).await.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::protocol("session worker unavailable"));
        }
        response
            .await
            .map_err(|_| Error::protocol("session worker dropped the call"))
    }

    fn idle_for(&self) -> Duration {
        self.last_access
            .lock()
            .expect("last_access lock poisoned")
            .elapsed()
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.idle_for() >= ttl
    }
}

/// Worker loop owning one session's jar and transport. Ends, releasing the
/// transport's connections, once every handle to the session is dropped.
async fn run_session_worker(
    mut state: SessionState,
    profile: ImpersonationProfile,
    mut commands: mpsc::Receiver<SessionCommand>,
    pending: Arc<AtomicUsize>,
    id: String,
) {
    while let Some(command) = commands.recv().await {
        match command {
            SessionCommand::Execute {
                request,
                hop_timeout,
                reply,
            } => {
                let started = Instant::now();
                state.request_count += 1;
                tracing::debug!(
                    session = %id,
                    method = %request.method,
                    url = %request.url,
                    request_count = state.request_count,
                    "executing request"
                );
                let result = redirect::resolve(
                    &mut state.transport,
                    &mut state.jar,
                    profile,
                    request,
                    hop_timeout,
                )
                .await;
                let _ = reply.send((result, started));
            }
            SessionCommand::Cookies { reply } => {
                let _ = reply.send(state.jar.snapshot());
            }
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
    tracing::debug!(session = %id, "session worker stopped");
}

/// Bounded, TTL-driven table of sessions.
///
/// The map lock is held only for map mutation, never across network I/O;
/// callers clone the `Arc<Session>` out and talk to its worker afterwards.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    ttl: Duration,
    max_sessions: usize,
    profile: ImpersonationProfile,
}

impl SessionRegistry {
    pub fn new(ttl: Duration, max_sessions: usize, profile: ImpersonationProfile) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_sessions,
            profile,
        }
    }

    /// Create a session under a generated UUIDv4 handle.
    pub fn create(&self) -> Result<String> {
        let handle = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().expect("sessions lock poisoned");
        Self::sweep_locked(&mut sessions, self.ttl);
        if sessions.len() >= self.max_sessions {
            return Err(Error::CapacityExhausted {
                max: self.max_sessions,
            });
        }
        sessions.insert(
            handle.clone(),
            Arc::new(Session::new(handle.clone(), self.profile)),
        );
        tracing::info!(session = %handle, "created session");
        Ok(handle)
    }

    /// Return the session under `handle`, creating it if absent and capacity
    /// permits. Expired entries count as absent.
    pub fn get_or_create(&self, handle: &str) -> Result<Arc<Session>> {
        {
            let sessions = self.sessions.read().expect("sessions lock poisoned");
            if let Some(session) = sessions.get(handle) {
                if !session.is_expired(self.ttl) {
                    session.touch();
                    return Ok(Arc::clone(session));
                }
            }
        }

        let mut sessions = self.sessions.write().expect("sessions lock poisoned");
        // Re-check under the exclusive lock; another task may have won.
        if let Some(session) = sessions.get(handle) {
            if !session.is_expired(self.ttl) {
                session.touch();
                return Ok(Arc::clone(session));
            }
            sessions.remove(handle);
        }
        Self::sweep_locked(&mut sessions, self.ttl);
        if sessions.len() >= self.max_sessions {
            return Err(Error::CapacityExhausted {
                max: self.max_sessions,
            });
        }
        let session = Arc::new(Session::new(handle.to_string(), self.profile));
        sessions.insert(handle.to_string(), Arc::clone(&session));
        tracing::info!(session = %handle, "created session under caller handle");
        Ok(session)
    }

    /// Look up a live session without creating one.
    pub fn get(&self, handle: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().expect("sessions lock poisoned");
        sessions
            .get(handle)
            .filter(|s| !s.is_expired(self.ttl))
            .cloned()
    }

    /// Remove a session. Idempotent; returns whether an entry existed.
    /// The worker (and its pooled connections) winds down once the last
    /// reference drops.
    pub fn delete(&self, handle: &str) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().expect("sessions lock poisoned");
            Self::sweep_locked(&mut sessions, self.ttl);
            sessions.remove(handle)
        };
        match removed {
            Some(_) => {
                tracing::info!(session = %handle, "deleted session");
                true
            }
            None => false,
        }
    }

    /// Flat cookie snapshot of a session.
    pub async fn cookies(&self, handle: &str) -> Result<HashMap<String, String>> {
        let session = self
            .get(handle)
            .ok_or_else(|| Error::SessionNotFound(handle.to_string()))?;
        session.cookies().await
    }

    /// Evict every expired session. Sessions with in-flight or queued calls
    /// are in use and skipped until the next pass.
    pub fn sweep(&self) {
        let mut sessions = self.sessions.write().expect("sessions lock poisoned");
        Self::sweep_locked(&mut sessions, self.ttl);
    }

    fn sweep_locked(sessions: &mut HashMap<String, Arc<Session>>, ttl: Duration) {
        let before = sessions.len();
        sessions.retain(|_, session| {
            if !session.is_expired(ttl) {
                return true;
            }
            // In-use sessions are skipped and re-examined next sweep.
            if session.in_use() {
                return true;
            }
            tracing::info!(session = %session.id(), idle = ?session.idle_for(), "evicting expired session");
            false
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = sessions.len(), "sweep complete");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().expect("sessions lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the periodic sweeper. The task holds only a weak reference and
    /// exits once the registry is dropped.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let registry: Weak<SessionRegistry> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match registry.upgrade() {
                    Some(registry) => registry.sweep(),
                    None => break,
                }
            }
        })
    }
}
