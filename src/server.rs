//! SMSC server: accepts transport connections and runs an SMPP session
//! over each one.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::session::{Session, SessionConf, SessionType};

/// Default listen address from the SMPP registered port.
pub const DEFAULT_ADDR: &str = "0.0.0.0:2775";

/// Initial sleep after a transient accept failure; doubled up to
/// [`ACCEPT_BACKOFF_MAX`].
const ACCEPT_BACKOFF_START: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

struct ServerInner {
    conf: SessionConf,
    cancel: CancellationToken,
    sessions: Mutex<HashMap<String, Session>>,
    tracker: TaskTracker,
}

/// SMPP SMSC server.
///
/// Every accepted connection gets a session built from the configured
/// [`SessionConf`] template with the type forced to SMSC. The server keeps
/// track of live sessions so [`Server::close`] and [`Server::unbind`] can
/// dispose of them.
#[derive(Clone)]
pub struct Server {
    addr: String,
    inner: Arc<ServerInner>,
}

impl Server {
    /// Creates a server that will listen on `addr` ([`DEFAULT_ADDR`] when
    /// empty) and use `conf` as the session template.
    pub fn new(addr: impl Into<String>, conf: SessionConf) -> Server {
        Server {
            addr: addr.into(),
            inner: Arc::new(ServerInner {
                conf,
                cancel: CancellationToken::new(),
                sessions: Mutex::new(HashMap::new()),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Binds the configured address and serves until closed. Blocking.
    pub async fn listen_and_serve(&self) -> io::Result<()> {
        let addr = if self.addr.is_empty() {
            DEFAULT_ADDR
        } else {
            &self.addr
        };
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Accepts connections from `listener` and starts SMSC sessions over
    /// them. Returns when the server is closed or on a fatal accept error.
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        let mut backoff = Duration::ZERO;
        loop {
            let accepted = tokio::select! {
                _ = self.inner.cancel.cancelled() => return Ok(()),
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    backoff = Duration::ZERO;
                    info!(%peer, "accepted connection");
                    let mut conf = self.inner.conf.clone();
                    conf.session_type = SessionType::Smsc;
                    self.track(Session::new(stream, conf));
                }
                Err(err) => {
                    // Out of descriptors and friends clear up on their own;
                    // back off and retry rather than dying.
                    backoff = if backoff.is_zero() {
                        ACCEPT_BACKOFF_START
                    } else {
                        (backoff * 2).min(ACCEPT_BACKOFF_MAX)
                    };
                    warn!(error = %err, ?backoff, "accept failed");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Watches one session for its lifetime: removes it from the registry
    /// when it closes, or closes it when the server shuts down.
    fn track(&self, sess: Session) {
        let inner = self.inner.clone();
        self.inner.tracker.spawn(async move {
            let id = sess.id().to_owned();
            inner.sessions.lock().await.insert(id.clone(), sess.clone());
            tokio::select! {
                _ = sess.closed() => {}
                _ = inner.cancel.cancelled() => {
                    let _ = sess.close().await;
                }
            }
            inner.sessions.lock().await.remove(&id);
        });
    }

    /// Gracefully shuts the server down by sending `unbind` to every
    /// connected peer before closing.
    pub async fn unbind(&self) -> io::Result<()> {
        let sessions: Vec<Session> = self
            .inner
            .sessions
            .lock()
            .await
            .values()
            .cloned()
            .collect();
        for sess in sessions {
            if let Err(err) = crate::unbind(&sess).await {
                warn!(session = %sess, error = %err, "unbind failed");
            }
        }
        self.close().await
    }

    /// Stops accepting, closes every live session and waits for their
    /// tasks to finish.
    pub async fn close(&self) -> io::Result<()> {
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        Ok(())
    }
}
