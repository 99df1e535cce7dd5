use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde_json::json;
use tokio::sync::mpsc::unbounded_channel;

use crate::websocket::session::spawn_forwarder;
use crate::websocket::{ConnectionHub, WsSession};

/// GET /ws
///
/// Upgrade the request, register the connection with the hub and start its
/// session actor. The realtime channel carries its own identity announcement;
/// it is not guarded by the API's JWT layer.
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    hub: web::Data<ConnectionHub>,
) -> Result<HttpResponse, Error> {
    let (tx, rx) = unbounded_channel();
    let conn_id = hub.register(tx).await;

    let session = WsSession::new(conn_id, hub.get_ref().clone());
    let (addr, response) = match ws::WsResponseBuilder::new(session, &req, stream).start_with_addr()
    {
        Ok(started) => started,
        Err(e) => {
            // The actor never started, so its teardown will not run.
            hub.deregister(conn_id).await;
            return Err(e);
        }
    };

    spawn_forwarder(rx, addr);
    Ok(response)
}

/// GET /api/v1/ws/status
pub async fn ws_status(hub: web::Data<ConnectionHub>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "connections": hub.connection_count().await,
        "identifiedUsers": hub.identified_count().await,
    }))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws").route(web::get().to(ws_connect)))
        .service(web::resource("/api/v1/ws/status").route(web::get().to(ws_status)));
}
