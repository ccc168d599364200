//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use percent_encoding::NON_ALPHANUMERIC;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};

use campus_core::config::HubsConfig;
use campus_core::{AppError, AppResult, ErrorKind};

use crate::hub::HubHandle;
use crate::message::serializer::{decode_server, encode_client};
use crate::message::{ClientFrame, ServerFrame};

use super::{HubTransport, TransportLink};

/// Connects hubs over WebSocket text frames carrying JSON.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    hubs: HubsConfig,
    buffer_size: usize,
}

impl WebSocketTransport {
    /// Create a transport for the configured hub endpoints.
    pub fn new(hubs: HubsConfig, buffer_size: usize) -> Self {
        Self {
            hubs,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Endpoint URL for a hub, including the `access_token` query parameter.
    pub fn endpoint(&self, hub: &HubHandle, bearer: Option<&str>) -> String {
        let path = match hub.name() {
            HubHandle::NOTIFICATIONS => self.hubs.notifications_path.clone(),
            HubHandle::OFFICE_HOURS => self.hubs.office_hours_path.clone(),
            other => format!("/hubs/{other}"),
        };
        let url = self.hubs.url_for(&path);
        match bearer {
            Some(token) => {
                let sep = if url.contains('?') { '&' } else { '?' };
                let token = percent_encoding::utf8_percent_encode(token, NON_ALPHANUMERIC);
                format!("{url}{sep}access_token={token}")
            }
            None => url,
        }
    }
}

#[async_trait]
impl HubTransport for WebSocketTransport {
    async fn connect(&self, hub: &HubHandle, bearer: Option<String>) -> AppResult<TransportLink> {
        let url = self.endpoint(hub, bearer.as_deref());
        let mut request = url.into_client_request().map_err(|e| {
            AppError::with_source(
                ErrorKind::Transport,
                format!("Failed to build WebSocket request for hub '{hub}': {e}"),
                e,
            )
        })?;

        if let Some(token) = &bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| AppError::authentication("Bearer token is not a valid header value"))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(ok) => ok,
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                let status = response.status();
                return Err(if status.as_u16() == 401 || status.as_u16() == 403 {
                    AppError::authentication(format!("Hub '{hub}' refused the handshake: {status}"))
                } else {
                    AppError::transport(format!("Hub '{hub}' handshake failed: {status}"))
                });
            }
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorKind::Transport,
                    format!("Hub '{hub}' connection failed: {e}"),
                    e,
                ));
            }
        };

        debug!(hub = %hub, "WebSocket established");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientFrame>(self.buffer_size);
        let (inbound_tx, inbound_rx) = mpsc::channel::<ServerFrame>(self.buffer_size);

        let writer_hub = hub.clone();
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let text = match encode_client(&frame) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(hub = %writer_hub, error = %e, "Dropping unencodable frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!(hub = %writer_hub, error = %e, "WebSocket write failed");
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
            debug!(hub = %writer_hub, "WebSocket writer stopped");
        });

        let reader_hub = hub.clone();
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(frame)) => {
                        debug!(hub = %reader_hub, ?frame, "WebSocket closed by server");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(hub = %reader_hub, error = %e, "WebSocket read failed");
                        break;
                    }
                };
                match decode_server(text.as_str()) {
                    Ok(frame) => {
                        if inbound_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(hub = %reader_hub, error = %e, "Ignoring malformed hub frame"),
                }
            }
            debug!(hub = %reader_hub, "WebSocket reader stopped");
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
