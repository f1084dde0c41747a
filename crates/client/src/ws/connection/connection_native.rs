//! Native WebSocket transport using tokio-tungstenite.

use std::sync::Arc;
use std::time::Duration;

use aeiouly_shared::{ws_to_http, CLOSE_ABNORMAL, CLOSE_NORMAL, CLOSE_NO_STATUS};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header::COOKIE, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Transport, TransportConnection, TransportError, TransportSink};

/// Source of the session cookies attached to the handshake request.
pub trait SessionCookies: Send + Sync {
    /// `Cookie` header value for a request to the http(s) `url`.
    fn cookie_header(&self, url: &str) -> Option<String>;
}

/// Frames queued from the manager to the socket task
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Opens one tokio task per attempt. Each task owns its socket and reports
/// through the attempt's sink until it has emitted exactly one close event.
#[derive(Clone, Default)]
pub struct NativeTransport {
    cookies: Option<Arc<dyn SessionCookies>>,
}

impl NativeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach session cookies to every handshake
    pub fn with_cookies(mut self, cookies: Arc<dyn SessionCookies>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    fn build_request(&self, url: &str) -> Result<Request, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;

        let cookie = self
            .cookies
            .as_ref()
            .zip(ws_to_http(url))
            .and_then(|(cookies, http_url)| cookies.cookie_header(&http_url));
        if let Some(cookie) = cookie {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| TransportError::Handshake(format!("bad cookie header: {e}")))?;
            request.headers_mut().insert(COOKIE, value);
        }
        Ok(request)
    }
}

impl Transport for NativeTransport {
    type Connection = NativeConnection;

    fn open(&mut self, url: &str, sink: TransportSink) -> NativeConnection {
        let (sender, receiver) = unbounded();
        let request = self.build_request(url);
        tokio::spawn(run_socket(request, receiver, sink));
        NativeConnection { sender }
    }
}

/// Manager-side handle of a running socket task.
///
/// Dropping it closes the socket with a normal closure.
#[derive(Debug)]
pub struct NativeConnection {
    sender: UnboundedSender<Outbound>,
}

impl TransportConnection for NativeConnection {
    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.sender
            .unbounded_send(Outbound::Text(text.to_string()))
            .map_err(|_| TransportError::NotRunning)
    }

    fn close(&mut self, code: u16, reason: &str) {
        let _ = self.sender.unbounded_send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
        self.sender.close_channel();
    }
}

const CLOSE_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

fn close_frame(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_string().into(),
    }))
}

/// Drive one attempt: handshake, then pump frames both ways until either
/// side closes.
async fn run_socket(
    request: Result<Request, TransportError>,
    mut outbound: UnboundedReceiver<Outbound>,
    sink: TransportSink,
) {
    let generation = sink.generation();
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            sink.error(e.to_string());
            sink.closed(CLOSE_ABNORMAL, e.to_string());
            return;
        }
    };

    // A close requested while the handshake is in flight wins over the handshake.
    let connect = connect_async(request);
    tokio::pin!(connect);
    let ws_stream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((ws_stream, _response)) => break ws_stream,
                Err(e) => {
                    let reason = TransportError::Handshake(e.to_string()).to_string();
                    crate::log_debug!("attempt {} failed: {}", generation, reason);
                    sink.error(reason.clone());
                    sink.closed(CLOSE_ABNORMAL, reason);
                    return;
                }
            },
            cmd = outbound.next() => match cmd {
                Some(Outbound::Close { code, reason }) => {
                    sink.closed(code, reason);
                    return;
                }
                Some(Outbound::Text(_)) => {
                    crate::log_warn!("attempt {}: dropping frame queued before open", generation);
                }
                None => {
                    sink.closed(CLOSE_NORMAL, "connection handle dropped");
                    return;
                }
            },
        }
    };

    sink.opened();
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => sink.message(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    // Flush the queued close reply to finish the handshake.
                    let _ = tokio::time::timeout(CLOSE_REPLY_TIMEOUT, write.close()).await;
                    sink.closed(code, reason);
                    return;
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite; binary frames are not part of the stream.
                }
                Some(Err(e)) => {
                    sink.error(e.to_string());
                    sink.closed(CLOSE_ABNORMAL, e.to_string());
                    return;
                }
                None => {
                    sink.closed(CLOSE_ABNORMAL, "connection dropped");
                    return;
                }
            },
            cmd = outbound.next() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        sink.error(format!("send failed: {e}"));
                        sink.closed(CLOSE_ABNORMAL, e.to_string());
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let _ = write.send(close_frame(code, &reason)).await;
                    let _ = write.close().await;
                    sink.closed(code, reason);
                    return;
                }
                None => {
                    let _ = write.send(close_frame(CLOSE_NORMAL, "")).await;
                    let _ = write.close().await;
                    sink.closed(CLOSE_NORMAL, "connection handle dropped");
                    return;
                }
            },
        }
    }
}
