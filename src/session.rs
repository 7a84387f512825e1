//! Client session — bridges one connection to the hub.
//!
//! LIFECYCLE
//! =========
//! 1. Connecting: the first frame must be `register` with a non-empty name.
//!    Anything else gets one `error` envelope (when there is something to
//!    say) and the connection is closed without ever touching the registry.
//! 2. Registered: the inbound pump reads frames and feeds `Hub::dispatch`;
//!    the outbound pump, a separate task, drains the client's queue onto the
//!    socket.
//! 3. Closing: whichever pump stops first ends the registered phase. The
//!    session then unregisters (only this side ever does), which closes the
//!    queue, and gives the outbound pump `close_grace` to drain before it is
//!    aborted.
//! 4. Closed: both halves of the connection are dropped.
//!
//! The two pumps share nothing but the queue and the hub registry. The
//! outbound pump never unregisters; it only observes the queue closing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::envelope::{self, CodecError, Envelope, Kind};
use crate::hub::{Client, Hub, HubError};
use crate::transport::{FrameSink, FrameSource, TransportError};

/// Why a session never reached the registered phase.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connection lost before registration: {0}")]
    Transport(#[from] TransportError),
    #[error("first frame was not an envelope: {0}")]
    MalformedFirstFrame(#[from] CodecError),
    #[error("first frame was not a register envelope with a name")]
    UnregisteredFirstMessage,
    #[error("name taken: {0}")]
    NameTaken(String),
}

impl SessionError {
    /// Text of the `error` envelope owed to the peer, if any.
    #[must_use]
    pub fn wire_message(&self) -> Option<&'static str> {
        match self {
            Self::UnregisteredFirstMessage => Some("Must register first"),
            Self::NameTaken(_) => Some("Name taken"),
            Self::Transport(_) | Self::MalformedFirstFrame(_) => None,
        }
    }
}

/// Drive one connection from handshake to close.
///
/// Returns the client the session was registered as once it has fully
/// closed.
///
/// # Errors
///
/// Returns a `SessionError` if the handshake was rejected. The connection has
/// been closed by then.
pub async fn run<S, K>(hub: Arc<Hub>, mut source: S, mut sink: K, close_grace: Duration) -> Result<Client, SessionError>
where
    S: FrameSource,
    K: FrameSink + 'static,
{
    let (client, rx) = match handshake(&hub, &mut source).await {
        Ok(registered) => registered,
        Err(e) => {
            warn!(error = %e, "session: handshake rejected");
            if let Some(message) = e.wire_message() {
                if let Ok(text) = envelope::encode(&Envelope::error(message)) {
                    let _ = sink.send(text).await;
                }
            }
            sink.close().await;
            return Err(e);
        }
    };

    info!(name = %client.name, session_id = %client.session_id, "session: registered");

    let mut outbound = tokio::spawn(outbound_pump(client.name.clone(), rx, sink));

    tokio::select! {
        () = inbound_pump(&hub, &client, &mut source) => {}
        _ = &mut outbound => {
            debug!(name = %client.name, "session: outbound pump stopped first");
        }
    }

    hub.unregister(&client).await;

    if !outbound.is_finished() && timeout(close_grace, &mut outbound).await.is_err() {
        warn!(name = %client.name, "session: outbound pump did not drain in time");
        outbound.abort();
    }

    info!(name = %client.name, session_id = %client.session_id, "session: closed");
    Ok(client)
}

async fn handshake<S: FrameSource>(
    hub: &Hub,
    source: &mut S,
) -> Result<(Client, mpsc::Receiver<Envelope>), SessionError> {
    let raw = source.receive().await?;
    let first = envelope::decode(&raw)?;

    let Some(name) = first.content().filter(|_| first.kind == Kind::Register) else {
        return Err(SessionError::UnregisteredFirstMessage);
    };

    match hub.register(name).await {
        Ok(registered) => Ok(registered),
        Err(HubError::NameTaken(name)) => Err(SessionError::NameTaken(name)),
    }
}

/// Read frames until the peer goes away.
async fn inbound_pump<S: FrameSource>(hub: &Hub, client: &Client, source: &mut S) {
    loop {
        match source.receive().await {
            Ok(raw) => hub.dispatch(client, &raw).await,
            Err(TransportError::Closed) => {
                debug!(name = %client.name, "session: peer closed");
                return;
            }
            Err(e) => {
                debug!(name = %client.name, error = %e, "session: read failed");
                return;
            }
        }
    }
}

/// Write queued envelopes until the queue closes or a write fails.
async fn outbound_pump<K: FrameSink>(name: String, mut rx: mpsc::Receiver<Envelope>, mut sink: K) {
    while let Some(envelope) = rx.recv().await {
        let text = match envelope::encode(&envelope) {
            Ok(text) => text,
            Err(e) => {
                warn!(%name, error = %e, "session: failed to encode envelope");
                continue;
            }
        };
        if let Err(e) = sink.send(text).await {
            debug!(%name, error = %e, "session: write failed");
            break;
        }
    }
    sink.close().await;
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
