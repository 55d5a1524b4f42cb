//! Fixed-size pool of automation sessions.
//!
//! Every session is opened up front. A fair semaphore gates checkout so at
//! most `size` fetches run at once and waiters are served in FIFO order. A
//! checked-out session is returned by dropping its [`PooledSession`] guard,
//! which also happens when the owning task errors or is aborted. Sessions
//! returned after [`SessionPool::shutdown`] are closed as they come back.

use std::sync::Arc;
use std::time::Duration;

use chesscom_extractor::PgnSource;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// A session plus whether it has been used yet.
#[derive(Debug)]
pub struct SessionHandle<S> {
    pub session: S,
    /// Never used for a fetch. Fresh tabs need a longer settle delay.
    pub first_launch: bool,
}

type Closer<S> = Box<dyn Fn(S) + Send + Sync>;

struct PoolInner<S> {
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<SessionHandle<S>>>,
    /// Set by `shutdown`. Lock before `idle`.
    closer: Mutex<Option<Closer<S>>>,
    size: usize,
}

/// Shared pool of sessions. Cloning shares the same pool.
pub struct SessionPool<S> {
    inner: Arc<PoolInner<S>>,
}

impl<S> Clone for SessionPool<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Send + 'static> SessionPool<S> {
    /// Open `size` sessions from `source`. If any fails to open, the ones
    /// already opened are closed before the error is returned.
    pub async fn open<P>(source: &P, size: usize) -> Result<Self>
    where
        P: PgnSource<Session = S>,
    {
        if size == 0 {
            return Err(Error::session_pool("pool size must be at least 1"));
        }

        let mut sessions = Vec::with_capacity(size);
        for index in 0..size {
            match source.open_session().await {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!(index, error = %e, "failed to open session; closing opened sessions");
                    for session in sessions {
                        if let Err(close_err) = source.close_session(session).await {
                            warn!(error = %close_err, "failed to close session");
                        }
                    }
                    return Err(e.into());
                }
            }
        }

        info!(size, "session pool initialized");
        Self::from_sessions(sessions)
    }

    /// Build a pool over already-open sessions, all marked first-launch.
    pub fn from_sessions(sessions: Vec<S>) -> Result<Self> {
        if sessions.is_empty() {
            return Err(Error::session_pool("pool size must be at least 1"));
        }

        let size = sessions.len();
        let idle = sessions
            .into_iter()
            .map(|session| SessionHandle {
                session,
                first_launch: true,
            })
            .collect();

        Ok(Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(size)),
                idle: Mutex::new(idle),
                closer: Mutex::new(None),
                size,
            }),
        })
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Sessions not currently checked out.
    pub fn available(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Wait for a free session and take exclusive ownership of it.
    pub async fn acquire(&self) -> Result<PooledSession<S>> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::session_pool("session pool is closed"))?;

        // One idle handle exists for every available permit.
        let handle = self
            .inner
            .idle
            .lock()
            .pop()
            .ok_or_else(|| Error::session_pool("permit granted with no idle session"))?;

        Ok(PooledSession {
            handle: Some(handle),
            inner: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Close the pool and every session in it.
    ///
    /// Waits up to `timeout` for checked-out sessions to come back and closes
    /// every idle session. Sessions still out after that are closed on a
    /// background task when their guard drops. Returns the number of sessions
    /// closed before returning.
    pub async fn shutdown<P>(&self, source: Arc<P>, timeout: Duration) -> usize
    where
        P: PgnSource<Session = S>,
    {
        let size = u32::try_from(self.inner.size).unwrap_or(u32::MAX);
        let all = tokio::time::timeout(
            timeout,
            Arc::clone(&self.inner.semaphore).acquire_many_owned(size),
        )
        .await;
        let _permits = match all {
            Ok(Ok(permits)) => Some(permits),
            Ok(Err(_)) => None,
            Err(_) => {
                warn!(
                    ?timeout,
                    outstanding = self.inner.size - self.available(),
                    "timed out waiting for sessions to be released"
                );
                None
            }
        };
        self.inner.semaphore.close();

        let handles: Vec<_> = {
            let mut closer = self.inner.closer.lock();
            *closer = Some(late_closer(Arc::clone(&source)));
            std::mem::take(&mut *self.inner.idle.lock())
        };
        let mut closed = 0;
        for handle in handles {
            match source.close_session(handle.session).await {
                Ok(()) => closed += 1,
                Err(e) => warn!(error = %e, "failed to close session"),
            }
        }

        info!(closed, size = self.inner.size, "session pool closed");
        closed
    }
}

/// Closes sessions handed back after shutdown.
fn late_closer<P: PgnSource>(source: Arc<P>) -> Closer<P::Session> {
    let runtime = tokio::runtime::Handle::current();
    Box::new(move |session: P::Session| {
        let source = Arc::clone(&source);
        runtime.spawn(async move {
            match source.close_session(session).await {
                Ok(()) => debug!("late session closed"),
                Err(e) => warn!(error = %e, "failed to close late session"),
            }
        });
    })
}

/// Exclusive checkout of one session. Dropping it returns the session to
/// the pool with `first_launch` cleared.
pub struct PooledSession<S> {
    handle: Option<SessionHandle<S>>,
    inner: Arc<PoolInner<S>>,
    // Released after `Drop::drop` has put the handle back.
    _permit: OwnedSemaphorePermit,
}

impl<S> PooledSession<S> {
    pub fn first_launch(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.first_launch)
    }

    pub fn session_mut(&mut self) -> &mut S {
        match self.handle.as_mut() {
            Some(handle) => &mut handle.session,
            None => unreachable!("handle is only taken on drop"),
        }
    }

    /// Return the session to the pool.
    pub fn release(self) {
        drop(self);
    }
}

impl<S> Drop for PooledSession<S> {
    fn drop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        handle.first_launch = false;

        let closer = self.inner.closer.lock();
        match closer.as_ref() {
            Some(close) => {
                debug!("session returned after shutdown; closing");
                close(handle.session);
            }
            None => {
                self.inner.idle.lock().push(handle);
                debug!("session returned to pool");
            }
        }
    }
}
