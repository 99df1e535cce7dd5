use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web_actors::ws;
use tokio::sync::mpsc::UnboundedReceiver;

use super::hub::{ConnectionHub, ConnectionId};
use super::messages::{AuthData, Envelope, AUTH_FRAME};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// A frame on its way out to the client, forwarded from the hub.
#[derive(ActixMessage)]
#[rtype(result = "()")]
pub struct OutboundFrame(pub String);

/// One actor per WebSocket connection. The actor owns the read side; writes
/// arrive as `OutboundFrame` messages from the hub's per-connection channel.
/// Registration happens in the upgrade handler; teardown runs exactly once in
/// `stopped`, whichever way the connection dies.
pub struct WsSession {
    conn_id: ConnectionId,
    hub: ConnectionHub,
    last_heartbeat: Instant,
}

impl WsSession {
    pub fn new(conn_id: ConnectionId, hub: ConnectionHub) -> Self {
        Self {
            conn_id,
            hub,
            last_heartbeat: Instant::now(),
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                tracing::warn!("websocket heartbeat timed out, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Dispatch one inbound frame: identity announcements update the registry,
    /// anything else well-formed is relayed to all connections. Malformed
    /// frames are logged and ignored; they never tear down the connection.
    fn handle_frame(&self, text: &str) {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed frame");
                return;
            }
        };

        if envelope.kind == AUTH_FRAME {
            match serde_json::from_value::<AuthData>(envelope.data) {
                Ok(auth) => {
                    let hub = self.hub.clone();
                    let conn_id = self.conn_id;
                    actix::spawn(async move {
                        hub.authenticate(conn_id, auth.user_id).await;
                    });
                }
                Err(e) => tracing::warn!(error = %e, "ignoring malformed auth frame"),
            }
            return;
        }

        self.hub.queue_broadcast(text.to_owned());
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let hub = self.hub.clone();
        let conn_id = self.conn_id;
        actix::spawn(async move {
            hub.deregister(conn_id).await;
        });
    }
}

impl Handler<OutboundFrame> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => self.handle_frame(&text),
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("binary frames not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(?reason, "client closed connection");
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(error = %e, "websocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// Bridge the hub's per-connection channel into the session actor's mailbox.
/// The task ends when the hub drops the sender (eviction) or the actor dies.
pub fn spawn_forwarder(mut rx: UnboundedReceiver<String>, addr: Addr<WsSession>) {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if addr.try_send(OutboundFrame(frame)).is_err() {
                break;
            }
        }
    });
}
