//! SMPP v3.4 protocol engine.
//!
//! The crate provides the two halves an SMPP application needs: a binary
//! codec for the protocol's PDUs and a [`Session`] engine that drives the
//! mandated state machine over any reliable duplex byte stream, matching
//! responses to requests by sequence number and enforcing send and receive
//! windows. A process can act as an ESME (client) or an SMSC (server); the
//! same session engine serves both roles.
//!
//! The bind helpers cover the common client setup:
//!
//! ```rust,no_run
//! use smpp34::{bind_trx, BindConf, Pdu, SessionConf, SubmitSm};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sess = bind_trx(
//!         SessionConf::default(),
//!         BindConf {
//!             addr: "localhost:2775".into(),
//!             system_id: "system_id".into(),
//!             password: "password".into(),
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//!
//!     let resp = sess
//!         .send(Pdu::SubmitSm(SubmitSm {
//!             source_addr: "11111111".into(),
//!             destination_addr: "22222222".into(),
//!             short_message: "Hello from SMPP!".into(),
//!             ..Default::default()
//!         }))
//!         .await?;
//!     println!("submitted: {resp:?}");
//!
//!     smpp34::unbind(&sess).await?;
//!     Ok(())
//! }
//! ```
//!
//! Serving the SMSC side means giving the session a [`Handler`] for
//! inbound requests and letting [`Server`] accept connections:
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use smpp34::{CommandStatus, Context, Handler, Pdu, Server, SessionConf};
//! use std::sync::Arc;
//!
//! struct Smsc;
//!
//! #[async_trait]
//! impl Handler for Smsc {
//!     async fn serve(&self, ctx: &mut Context) {
//!         let resp = match ctx.pdu() {
//!             Pdu::BindTransceiver(b) => Pdu::BindTransceiverResp(b.response("SMSC")),
//!             Pdu::SubmitSm(sm) => Pdu::SubmitSmResp(sm.response("msg-1")),
//!             Pdu::Unbind => Pdu::UnbindResp,
//!             _ => Pdu::GenericNack,
//!         };
//!         let _ = ctx.respond(resp, CommandStatus::Ok).await;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conf = SessionConf {
//!         handler: Some(Arc::new(Smsc)),
//!         ..Default::default()
//!     };
//!     Server::new("0.0.0.0:2775", conf).listen_and_serve().await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod datetime;
pub mod pdu;
mod server;
mod session;


use std::time::Duration;

use tokio::net::TcpStream;

pub use codec::{
    frame, CodecError, Decoded, Decoder, DefaultSequencer, Encoder, Header, Sequencer,
    HEADER_LEN, MAX_PDU_LEN, SEQUENCE_END, SEQUENCE_START,
};
pub use pdu::{
    separate_udh, stat, tags, Bind, BindResp, CommandId, CommandStatus, DeliverSm, DeliverSmResp,
    DeliveryReceipt, EsmClass, Options, Pdu, QuerySm, QuerySmResp, RegisteredDelivery, SubmitSm,
    SubmitSmResp,
};
pub use server::{Server, DEFAULT_ADDR};
pub use session::{
    Context, Handler, Session, SessionConf, SessionState, SessionType, SmppError, StateHook,
    StatusError,
};

/// Version of the supported SMPP protocol.
pub const VERSION: u8 = 0x34;

/// Fallback bind deadline when the session has no window timeout.
const DEFAULT_BIND_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for binding to an SMSC.
#[derive(Debug, Clone, Default)]
pub struct BindConf {
    /// Address the bind will be attempted against.
    pub addr: String,
    pub system_id: String,
    pub password: String,
    pub system_type: String,
    pub addr_ton: u8,
    pub addr_npi: u8,
    pub addr_range: String,
}

impl BindConf {
    fn to_bind(&self) -> Bind {
        Bind {
            system_id: self.system_id.clone(),
            password: self.password.clone(),
            system_type: self.system_type.clone(),
            interface_version: VERSION,
            addr_ton: self.addr_ton,
            addr_npi: self.addr_npi,
            address_range: self.addr_range.clone(),
        }
    }
}

/// Binds a transmitter session.
pub async fn bind_tx(sc: SessionConf, bc: BindConf) -> Result<Session, SmppError> {
    bind(Pdu::BindTransmitter(bc.to_bind()), sc, &bc).await
}

/// Binds a receiver session.
pub async fn bind_rx(sc: SessionConf, bc: BindConf) -> Result<Session, SmppError> {
    bind(Pdu::BindReceiver(bc.to_bind()), sc, &bc).await
}

/// Binds a transceiver session.
pub async fn bind_trx(sc: SessionConf, bc: BindConf) -> Result<Session, SmppError> {
    bind(Pdu::BindTransceiver(bc.to_bind()), sc, &bc).await
}

async fn bind(req: Pdu, sc: SessionConf, bc: &BindConf) -> Result<Session, SmppError> {
    let conn = TcpStream::connect(&bc.addr)
        .await
        .map_err(CodecError::from)?;
    let timeout = if sc.window_timeout.is_zero() {
        DEFAULT_BIND_TIMEOUT
    } else {
        sc.window_timeout
    };
    let sess = Session::new(conn, sc);
    let sent = tokio::time::timeout(timeout, sess.send(req)).await;
    match sent {
        Ok(Ok(_)) => Ok(sess),
        Ok(Err(err)) => {
            let _ = sess.close().await;
            Err(err)
        }
        Err(_) => {
            let _ = sess.close().await;
            Err(SmppError::Timeout)
        }
    }
}

/// Initiates session unbinding and closes the session.
///
/// The peer is notified with an `unbind` request bounded by the session's
/// window timeout; the session is closed even when that request fails, and
/// the first error encountered is returned.
pub async fn unbind(sess: &Session) -> Result<(), SmppError> {
    let result = tokio::time::timeout(sess.window_timeout(), sess.send(Pdu::Unbind)).await;
    let _ = sess.close().await;
    match result {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(SmppError::Timeout),
    }
}
