//! Realtime upgrade endpoint and per-connection driver.

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        rejection::QueryRejection,
        ws::{Message, rejection::WebSocketUpgradeRejection},
    },
    http::{
        HeaderMap,
        header::{AUTHORIZATION, ORIGIN},
    },
    response::{IntoResponse, Response},
};
use futures::{Sink, Stream, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use crate::api::{ApiError, AppState};
use crate::auth::{AuthError, bearer_token_from_header};

use super::client::{Client, run_reader, run_writer};
use super::hub::Hub;
use super::types::ServerEvent;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Access token. Browsers cannot set headers on WebSocket requests.
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// GET /v1/ws?token=<jwt>
///
/// The token is checked before anything else so that unauthenticated
/// requests get 401 whether or not they are valid upgrade requests.
pub async fn ws_handler(
    State(state): State<AppState>,
    params: Result<Query<WsParams>, QueryRejection>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let query_token = params.ok().and_then(|Query(p)| p.token);
    let user_id = authenticate(&state, query_token.as_deref(), &headers)?;

    let origin = headers.get(ORIGIN).and_then(|h| h.to_str().ok());
    if !state.auth.is_origin_allowed(origin) {
        warn!(
            "Rejecting realtime connection for user {} from origin {:?}",
            user_id, origin
        );
        return Err(ApiError::forbidden("origin not allowed"));
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(
                "Realtime upgrade for user {} not negotiated: {}",
                user_id, rejection
            );
            return Ok(rejection.into_response());
        }
    };

    info!("Realtime upgrade request from user {}", user_id);
    let hub = state.hub.clone();
    let failed_user = user_id.clone();

    Ok(ws
        .on_failed_upgrade(move |e| {
            debug!("Realtime upgrade for user {} failed: {}", failed_user, e);
        })
        .on_upgrade(move |socket| {
            let (sink, stream) = socket.split();
            serve_connection(sink, stream, hub, user_id)
        }))
}

/// Resolve the user from the `token` query parameter, falling back to an
/// `Authorization: Bearer` header.
fn authenticate(
    state: &AppState,
    query_token: Option<&str>,
    headers: &HeaderMap,
) -> Result<String, AuthError> {
    let token = match query_token.filter(|t| !t.is_empty()) {
        Some(token) => token,
        None => {
            let header = headers
                .get(AUTHORIZATION)
                .ok_or(AuthError::MissingToken)?
                .to_str()
                .map_err(|_| AuthError::InvalidAuthHeader)?;
            bearer_token_from_header(header)?
        }
    };

    state.validator.validate(token).inspect_err(|e| {
        debug!("Realtime token rejected: {}", e);
    })
}

/// Drive one authenticated connection until it terminates.
///
/// Registers a [`Client`] for `user_id`, queues the welcome notice, runs the
/// writer as its own task and the reader inline. Whichever side finishes
/// first ends the connection: a closed or failed read removes the client and
/// waits for the writer, a failed write or closed queue removes the client
/// and drops the reader.
pub async fn serve_connection<Si, St, E>(sink: Si, stream: St, hub: Arc<Hub>, user_id: String)
where
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: fmt::Display + Send,
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let (client, outbound) = Client::new(user_id);
    hub.add(&client);

    match ServerEvent::connected().to_payload() {
        Ok(payload) => {
            if let Err(e) = client.try_enqueue(payload) {
                warn!(
                    "Could not queue welcome for connection {}: {:?}",
                    client.id(),
                    e
                );
            }
        }
        Err(e) => warn!("Failed to encode welcome notice: {}", e),
    }

    let mut writer = tokio::spawn(run_writer(sink, outbound));

    tokio::select! {
        () = run_reader(stream, &hub, &client) => {
            if let Err(e) = writer.await {
                warn!("Writer for connection {} panicked: {}", client.id(), e);
            }
        }
        res = &mut writer => {
            if let Err(e) = res {
                warn!("Writer for connection {} panicked: {}", client.id(), e);
            }
            // The sink is gone, so nothing more can be delivered.
            hub.remove(&client);
        }
    }

    info!(
        "Realtime connection {} for user {} closed",
        client.id(),
        client.user_id()
    );
}
