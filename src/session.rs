//! The session engine coordinating SMPP traffic between bound peers.
//!
//! A [`Session`] owns a duplex byte stream and drives everything the
//! protocol mandates on top of it: the bind state machine, sequence-number
//! matching of responses to requests, the outbound send window, the inbound
//! request window with throttling, handler dispatch and graceful shutdown.
//! The same engine serves both roles; [`SessionType`] decides which side of
//! the transition rules applies.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{CodecError, Decoded, Decoder, Encoder, Sequencer};
use crate::pdu::{CommandId, CommandStatus, Pdu};

type BoxRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Callback fired on every session state change.
pub type StateHook = dyn Fn(&str, &str, SessionState) + Send + Sync;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state, transport connected but nothing bound.
    Open,
    /// Bind in flight; all other traffic is rejected until it settles.
    Binding,
    /// Bound as transmitter.
    BoundTx,
    /// Bound as receiver.
    BoundRx,
    /// Bound as transceiver.
    BoundTRx,
    /// Unbind in flight.
    Unbinding,
    /// Shutdown started, draining handlers.
    Closing,
    /// Fully closed.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Open => "Open",
            SessionState::Binding => "Binding",
            SessionState::BoundTx => "BoundTx",
            SessionState::BoundRx => "BoundRx",
            SessionState::BoundTRx => "BoundTRx",
            SessionState::Unbinding => "Unbinding",
            SessionState::Closing => "Closing",
            SessionState::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// Which side of the protocol this session plays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionType {
    /// Client role.
    #[default]
    Esme,
    /// Server role.
    Smsc,
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionType::Esme => "ESME",
            SessionType::Smsc => "SMSC",
        })
    }
}

/// Error surfaced when a response comes back with a non-OK status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    status: CommandStatus,
}

impl StatusError {
    pub fn new(status: CommandStatus) -> Self {
        StatusError { status }
    }

    /// The status code carried by the response.
    pub fn status(&self) -> CommandStatus {
        self.status
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{:#X}'", self.status.message(), u32::from(self.status))
    }
}

impl std::error::Error for StatusError {}

/// Errors produced by session operations.
#[derive(Debug, Error)]
pub enum SmppError {
    /// The command is not allowed in the current session state. Temporary:
    /// the state may change.
    #[error("processing '{command}' in invalid session state '{state}'")]
    InvalidState {
        command: CommandId,
        state: SessionState,
    },

    /// The outbound window is full. Temporary: slots free up as responses
    /// arrive.
    #[error("sending window closed")]
    WindowClosed,

    /// The session closed before the response arrived.
    #[error("session closed before receiving response")]
    SessionClosed,

    /// `close` was called more than once.
    #[error("session already closed")]
    AlreadyClosed,

    /// A bounded operation ran out of time.
    #[error("operation timed out")]
    Timeout,

    /// The peer answered with a non-OK status; the response PDU rides
    /// along.
    #[error("{error}")]
    Status {
        response: Box<Pdu>,
        error: StatusError,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl SmppError {
    /// True for conditions that may clear on retry.
    pub fn is_temporary(&self) -> bool {
        matches!(self, SmppError::InvalidState { .. } | SmppError::WindowClosed)
    }

    /// The response PDU for status errors.
    pub fn response(&self) -> Option<&Pdu> {
        match self {
            SmppError::Status { response, .. } => Some(response),
            _ => None,
        }
    }
}

/// Serves inbound requests dispatched by the session.
///
/// Implementations run in their own task under the session's window
/// timeout; panics are contained and logged without tearing the session
/// down.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, ctx: &mut Context);
}

/// Answers every request with `generic_nack`/`SysErr`. Installed when no
/// handler is configured.
struct DefaultHandler;

#[async_trait]
impl Handler for DefaultHandler {
    async fn serve(&self, ctx: &mut Context) {
        if let Err(err) = ctx.respond(Pdu::GenericNack, CommandStatus::SysErr).await {
            warn!(error = %err, "default handler failed to respond");
        }
    }
}

/// Session configuration. Zero values fall back to the documented
/// defaults when the session is created.
#[derive(Clone, Default)]
pub struct SessionConf {
    /// ESME or SMSC behavior. Defaults to ESME.
    pub session_type: SessionType,
    /// Maximum outstanding outbound requests. Defaults to 10.
    pub send_win_size: usize,
    /// Maximum concurrent inbound requests. Defaults to 10.
    pub req_win_size: usize,
    /// Handler and inbound-request lifetime. Defaults to 10 seconds.
    pub window_timeout: Duration,
    /// This side's identifier, used for logging when set.
    pub system_id: String,
    /// Session identifier; a random one is generated when empty.
    pub id: String,
    /// Inbound request callback.
    pub handler: Option<Arc<dyn Handler>>,
    /// Custom sequence-number source, shareable between sessions.
    pub sequencer: Option<Arc<dyn Sequencer>>,
    /// Fired on every state change with (session id, system id, state).
    pub state_hook: Option<Arc<StateHook>>,
}

const DEFAULT_WIN_SIZE: usize = 10;
const DEFAULT_WINDOW_TIMEOUT: Duration = Duration::from_secs(10);

fn gen_session_id() -> String {
    let b: [u8; 12] = rand::random();
    format!(
        "{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}",
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
    )
}

/// Response rendezvous delivered to a waiting `send`.
type ReplySlot = oneshot::Sender<(Pdu, CommandStatus)>;

/// State guarded by the single per-session mutex.
struct Shared {
    state: SessionState,
    sent: HashMap<u32, ReplySlot>,
    req_count: usize,
    enc: Encoder<BoxWrite>,
}

struct Inner {
    conf: SessionConf,
    handler: Arc<dyn Handler>,
    shared: Mutex<Shared>,
    /// Peer identity learned from bind traffic; kept outside the main lock
    /// so `Display` stays synchronous.
    peer_system_id: std::sync::Mutex<Option<String>>,
    cancel: CancellationToken,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
    done_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

/// The engine that coordinates the SMPP protocol for bound peers.
///
/// `Session` is a cheap handle; clones share the underlying connection.
/// Creating one takes ownership of the stream and spawns the receive loop,
/// so [`Session::close`] must be called to dispose of it cleanly.
///
/// Callers bound a `send` in time by wrapping it in `tokio::time::timeout`;
/// abandoning the future leaves the request slot in place until the
/// response arrives or the session closes.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Creates a session over an already-connected duplex stream and starts
    /// serving inbound PDUs.
    pub fn new<S>(stream: S, mut conf: SessionConf) -> Session
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        if conf.send_win_size == 0 {
            conf.send_win_size = DEFAULT_WIN_SIZE;
        }
        if conf.req_win_size == 0 {
            conf.req_win_size = DEFAULT_WIN_SIZE;
        }
        if conf.window_timeout.is_zero() {
            conf.window_timeout = DEFAULT_WINDOW_TIMEOUT;
        }
        if conf.id.is_empty() {
            conf.id = gen_session_id();
        }
        let handler = conf
            .handler
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultHandler));

        let (read, write) = tokio::io::split(stream);
        let enc = Encoder::new(Box::new(write) as BoxWrite, conf.sequencer.clone());
        let dec = Decoder::new(Box::new(read) as BoxRead);

        let (closed_tx, closed_rx) = watch::channel(false);
        let (done_tx, done_rx) = mpsc::channel::<()>(1);
        let sess = Session {
            inner: Arc::new(Inner {
                conf,
                handler,
                shared: Mutex::new(Shared {
                    state: SessionState::Open,
                    sent: HashMap::new(),
                    req_count: 0,
                    enc,
                }),
                peer_system_id: std::sync::Mutex::new(None),
                cancel: CancellationToken::new(),
                closed_tx,
                closed_rx,
                done_rx: Mutex::new(Some(done_rx)),
            }),
        };
        tokio::spawn(serve(sess.clone(), dec, done_tx));
        sess
    }

    /// Uniquely identifies the session.
    pub fn id(&self) -> &str {
        &self.inner.conf.id
    }

    /// Identifies this side when configured, otherwise the peer identity
    /// learned from bind traffic, otherwise `-`.
    pub fn system_id(&self) -> String {
        if !self.inner.conf.system_id.is_empty() {
            return self.inner.conf.system_id.clone();
        }
        if let Ok(guard) = self.inner.peer_system_id.lock() {
            if let Some(sid) = guard.as_ref() {
                return sid.clone();
            }
        }
        "-".to_owned()
    }

    /// The configured window timeout, after defaulting.
    pub fn window_timeout(&self) -> Duration {
        self.inner.conf.window_timeout
    }

    /// Sends a request and suspends until the matched response arrives, the
    /// session closes, or the caller's timeout cancels the wait.
    ///
    /// A response with status OK resolves to the response PDU; a non-OK
    /// status resolves to [`SmppError::Status`] carrying both the status
    /// and the PDU. A full send window fails fast with
    /// [`SmppError::WindowClosed`].
    pub async fn send(&self, req: Pdu) -> Result<Pdu, SmppError> {
        let (rx, transitioned) = {
            let mut sh = self.inner.shared.lock().await;
            if sh.sent.len() == self.inner.conf.send_win_size {
                return Err(SmppError::WindowClosed);
            }
            let transitioned = make_transition(
                &mut sh.state,
                self.inner.conf.session_type,
                req.command_id(),
                Direction::Sent,
            )
            .map_err(|err| {
                warn!(session = %self, error = %err, "transition before send");
                err
            })?;
            let sequence = sh.enc.encode(&req).await?;
            let (tx, rx) = oneshot::channel();
            sh.sent.insert(sequence, tx);
            debug!(session = %self, command = %req.command_id(), sequence, "request sent");
            (rx, transitioned)
        };
        self.fire_hook(transitioned);

        match rx.await {
            Ok((resp, CommandStatus::Ok)) => Ok(resp),
            Ok((resp, status)) => Err(SmppError::Status {
                response: Box::new(resp),
                error: StatusError::new(status),
            }),
            Err(_) => Err(SmppError::SessionClosed),
        }
    }

    /// Closes the session: fails outstanding requests with
    /// [`SmppError::SessionClosed`], shuts the stream down, waits for
    /// handler tasks to drain and signals [`Session::closed`]. Calling it
    /// again returns [`SmppError::AlreadyClosed`].
    pub async fn close(&self) -> Result<(), SmppError> {
        {
            let mut sh = self.inner.shared.lock().await;
            if matches!(sh.state, SessionState::Closing | SessionState::Closed) {
                return Err(SmppError::AlreadyClosed);
            }
            sh.state = SessionState::Closing;
            for (_, slot) in sh.sent.drain() {
                drop(slot);
            }
            sh.enc.shutdown().await;
        }
        self.fire_hook(Some(SessionState::Closing));
        self.inner.cancel.cancel();

        let rx = self.inner.done_rx.lock().await.take();
        if let Some(mut rx) = rx {
            // Resolves to None once the receive loop and every handler task
            // have dropped their sender.
            let _ = rx.recv().await;
        }

        self.inner.shared.lock().await.state = SessionState::Closed;
        self.fire_hook(Some(SessionState::Closed));
        info!(session = %self, "session closed");
        let _ = self.inner.closed_tx.send(true);
        Ok(())
    }

    /// Resolves once the session has reached the closed state. Signalled
    /// exactly once, after [`Session::close`] completes.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed_rx.clone();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Spawns a close in the background, used on receive-loop termination
    /// and handler-requested shutdown.
    fn shutdown(&self) {
        let sess = self.clone();
        tokio::spawn(async move {
            let _ = sess.close().await;
        });
    }

    fn fire_hook(&self, state: Option<SessionState>) {
        if let (Some(hook), Some(state)) = (&self.inner.conf.state_hook, state) {
            hook(&self.inner.conf.id, &self.system_id(), state);
        }
    }

    fn learn_system_id(&self, pdu: &Pdu) {
        if let Some(sid) = pdu.system_id() {
            if let Ok(mut guard) = self.inner.peer_system_id.lock() {
                *guard = Some(sid.to_owned());
            }
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}:{}:{})",
            self.inner.conf.session_type,
            self.system_id(),
            self.inner.conf.id
        )
    }
}

/// Container for one inbound request handed to the [`Handler`].
pub struct Context {
    session: Session,
    sequence: u32,
    req: Pdu,
    status: CommandStatus,
    close: bool,
}

impl Context {
    /// The decoded request PDU.
    pub fn pdu(&self) -> &Pdu {
        &self.req
    }

    pub fn command_id(&self) -> CommandId {
        self.req.command_id()
    }

    /// Sequence number of the request; responses echo it.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// The session this request arrived on.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    pub fn system_id(&self) -> String {
        self.session.system_id()
    }

    /// Status set by the last `respond` call.
    pub fn status(&self) -> CommandStatus {
        self.status
    }

    /// Sends `resp` to the peer with the request's sequence number. The
    /// response command runs through the same state machine as any other
    /// outbound PDU.
    pub async fn respond(&mut self, resp: Pdu, status: CommandStatus) -> Result<(), SmppError> {
        self.status = status;
        let inner = &self.session.inner;
        let transitioned = {
            let mut sh = inner.shared.lock().await;
            let transitioned = make_transition(
                &mut sh.state,
                inner.conf.session_type,
                resp.command_id(),
                Direction::Sent,
            )
            .map_err(|err| {
                warn!(session = %self.session, error = %err, "transition before response");
                err
            })?;
            sh.enc
                .encode_with(&resp, Some(self.sequence), status)
                .await?;
            debug!(session = %self.session, command = %resp.command_id(), sequence = self.sequence, "response sent");
            transitioned
        };
        self.session.fire_hook(transitioned);
        Ok(())
    }

    /// Requests session shutdown once the handler returns.
    pub fn close_session(&mut self) {
        self.close = true;
    }
}

/// Direction of a PDU relative to this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Sent,
    Received,
}

/// Validates that processing `id` is legal in the current state and applies
/// the transition it triggers. Returns the new state when one was entered.
///
/// Sending from an ESME follows the same rules as receiving on an SMSC and
/// vice versa, so the table is keyed on that normalization.
fn make_transition(
    state: &mut SessionState,
    session_type: SessionType,
    id: CommandId,
    direction: Direction,
) -> Result<Option<SessionState>, SmppError> {
    use CommandId::*;
    use SessionState::*;

    let client_to_server = (session_type == SessionType::Esme && direction == Direction::Sent)
        || (session_type == SessionType::Smsc && direction == Direction::Received);

    // `Some(Some(s))` transitions to s, `Some(None)` is allowed without a
    // state change, `None` is rejected.
    let outcome: Option<Option<SessionState>> = if client_to_server {
        match (*state, id) {
            (Open, BindTransceiver | BindTransmitter | BindReceiver) => Some(Some(Binding)),
            (Binding, GenericNack) => Some(Some(Open)),
            (BoundTx, Unbind) => Some(Some(Unbinding)),
            (
                BoundTx,
                UnbindResp | DeliverSmResp | DataSm | SubmitSm | SubmitMulti | DataSmResp
                | EnquireLink | EnquireLinkResp | ReplaceSm | QuerySm | CancelSm | GenericNack,
            ) => Some(None),
            (BoundRx, Unbind) => Some(Some(Unbinding)),
            (
                BoundRx,
                UnbindResp | DeliverSmResp | DataSm | DataSmResp | EnquireLink | EnquireLinkResp
                | GenericNack,
            ) => Some(None),
            (BoundTRx, Unbind) => Some(Some(Unbinding)),
            (
                BoundTRx,
                UnbindResp | SubmitSm | SubmitSmResp | SubmitMulti | SubmitMultiResp
                | DeliverSmResp | DataSm | DataSmResp | EnquireLink | EnquireLinkResp | ReplaceSm
                | QuerySm | CancelSm | GenericNack,
            ) => Some(None),
            (Unbinding, UnbindResp) => Some(None),
            _ => None,
        }
    } else {
        match (*state, id) {
            (Open, Outbind) => Some(None),
            (Binding, BindTransceiverResp) => Some(Some(BoundTRx)),
            (Binding, BindTransmitterResp) => Some(Some(BoundTx)),
            (Binding, BindReceiverResp) => Some(Some(BoundRx)),
            (Binding, GenericNack) => Some(Some(Open)),
            (BoundTx, Unbind) => Some(Some(Unbinding)),
            (
                BoundTx,
                SubmitSmResp | SubmitMultiResp | DataSm | DataSmResp | QuerySmResp | CancelSmResp
                | ReplaceSmResp | EnquireLink | EnquireLinkResp | GenericNack,
            ) => Some(None),
            (BoundRx, Unbind) => Some(Some(Unbinding)),
            (
                BoundRx,
                DeliverSm | DataSm | DataSmResp | EnquireLink | EnquireLinkResp
                | AlertNotification | GenericNack,
            ) => Some(None),
            (BoundTRx, Unbind) => Some(Some(Unbinding)),
            (
                BoundTRx,
                SubmitSmResp | SubmitMultiResp | DataSm | DataSmResp | DeliverSm | QuerySmResp
                | CancelSmResp | AlertNotification | ReplaceSmResp | EnquireLink
                | EnquireLinkResp | GenericNack,
            ) => Some(None),
            (Unbinding, UnbindResp) => Some(None),
            _ => None,
        }
    };

    match outcome {
        Some(Some(to)) => {
            *state = to;
            Ok(Some(to))
        }
        Some(None) => Ok(None),
        None => Err(SmppError::InvalidState { command: id, state: *state }),
    }
}

enum Action {
    None,
    Dispatch(Pdu),
    Deliver(ReplySlot, Pdu, CommandStatus),
}

/// Receive loop: decodes inbound frames, drives the state machine and
/// routes requests to handler tasks and responses to their reply slots.
async fn serve(sess: Session, mut dec: Decoder<BoxRead>, done: mpsc::Sender<()>) {
    let inner = sess.inner.clone();
    loop {
        let decoded = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            decoded = dec.decode() => decoded,
        };
        match decoded {
            Ok(Some(Decoded::Pdu(header, pdu))) => {
                process(&sess, header.command_id, header.status, header.sequence, pdu, &done).await;
            }
            Ok(Some(Decoded::Unknown { id, sequence })) => {
                warn!(session = %sess, id = %format_args!("{id:#010x}"), sequence, "unknown command id");
                let mut sh = inner.shared.lock().await;
                if let Err(err) = sh
                    .enc
                    .encode_with(&Pdu::GenericNack, Some(sequence), CommandStatus::InvCmdId)
                    .await
                {
                    error!(session = %sess, error = %err, "error encoding nack");
                }
            }
            Ok(Some(Decoded::Malformed(header, err))) => {
                // The frame was consumed; the stream is still usable.
                error!(session = %sess, command = %header.command_id, error = %err, "decoding pdu body");
            }
            Ok(None) => {
                info!(session = %sess, "peer closed the connection");
                break;
            }
            Err(err) => {
                error!(session = %sess, error = %err, "decoding pdu");
                break;
            }
        }
    }
    drop(done);
    sess.shutdown();
}

async fn process(
    sess: &Session,
    command: CommandId,
    status: CommandStatus,
    sequence: u32,
    pdu: Pdu,
    done: &mpsc::Sender<()>,
) {
    let inner = &sess.inner;
    sess.learn_system_id(&pdu);

    let (action, transitioned) = {
        let mut sh = inner.shared.lock().await;
        let transitioned = match make_transition(
            &mut sh.state,
            inner.conf.session_type,
            command,
            Direction::Received,
        ) {
            Ok(t) => t,
            Err(err) => {
                warn!(session = %sess, error = %err, "transitioning upon receive");
                return;
            }
        };
        let action = if command.is_request() {
            debug!(session = %sess, command = %command, sequence, "received request");
            if sh.req_count == inner.conf.req_win_size {
                if let Err(err) = sh
                    .enc
                    .encode_with(&Pdu::GenericNack, Some(sequence), CommandStatus::Throttled)
                    .await
                {
                    error!(session = %sess, error = %err, "error encoding nack");
                }
                Action::None
            } else {
                sh.req_count += 1;
                Action::Dispatch(pdu)
            }
        } else if let Some(slot) = sh.sent.remove(&sequence) {
            debug!(session = %sess, command = %command, sequence, "received response");
            Action::Deliver(slot, pdu, status)
        } else {
            warn!(session = %sess, command = %command, sequence, "unexpected response");
            Action::None
        };
        (action, transitioned)
    };
    sess.fire_hook(transitioned);

    match action {
        Action::None => {}
        Action::Deliver(slot, pdu, status) => {
            // The waiter may have abandoned its slot; that must not block
            // the loop.
            let _ = slot.send((pdu, status));
        }
        Action::Dispatch(pdu) => {
            spawn_handler(sess.clone(), sequence, pdu, done.clone());
        }
    }
}

/// Runs one inbound request: the user handler executes in a nested task so
/// a panic is contained there, while this task owns the bookkeeping that
/// must always happen.
fn spawn_handler(sess: Session, sequence: u32, req: Pdu, done: mpsc::Sender<()>) {
    tokio::spawn(async move {
        let _done = done;
        let inner = sess.inner.clone();
        let mut ctx = Context {
            session: sess.clone(),
            sequence,
            req,
            status: CommandStatus::Ok,
            close: false,
        };
        let handler = inner.handler.clone();
        let mut task = tokio::spawn(async move {
            handler.serve(&mut ctx).await;
            ctx
        });
        let close = match tokio::time::timeout(inner.conf.window_timeout, &mut task).await {
            Ok(Ok(ctx)) => ctx.close,
            Ok(Err(err)) => {
                error!(session = %sess, sequence, error = %err, "handler task failed");
                false
            }
            Err(_) => {
                task.abort();
                error!(session = %sess, sequence, "handler timed out");
                false
            }
        };
        inner.shared.lock().await.req_count -= 1;
        if close {
            sess.shutdown();
        }
    });
}
