//! HTTP listener carrying protocol messages
//!
//! Every `POST /` body is one request envelope; the reply body is the
//! matching response. Events are fetched with `Inspector.drainEvents`.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::Incoming;
use hyper::header::{ALLOW, CONTENT_TYPE, HeaderValue};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::error::{InspectorError, InspectorResult};
use crate::session::{RuntimeHost, SharedSession};

/// Default listener port
pub const DEFAULT_PORT: u16 = 9922;

/// Response body type used by the listener.
pub type InspectorBody = BoxBody<Bytes, Infallible>;

fn full_body(data: impl Into<Bytes>) -> InspectorBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn plain(status: StatusCode, text: &'static str) -> Response<InspectorBody> {
    let mut response = Response::new(full_body(text));
    *response.status_mut() = status;
    response
}

/// Where the listener binds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectorConfig {
    pub host: String,
    /// 0 picks a free port
    pub port: u16,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// A running inspector listener.
pub struct InspectorServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl InspectorServer {
    /// Bind the listener and start serving `session` in the background.
    pub async fn start<H>(config: InspectorConfig, session: SharedSession<H>) -> InspectorResult<Self>
    where
        H: RuntimeHost + Send + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::debug!(addr = %local_addr, "inspector shutdown signal received");
                        break;
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                let service = InspectorService {
                                    session: session.clone(),
                                };
                                tokio::spawn(async move {
                                    if let Err(e) = serve_connection(stream, service).await {
                                        tracing::warn!(
                                            peer = %peer_addr,
                                            error = %e,
                                            "inspector connection error"
                                        );
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "inspector accept error");
                            }
                        }
                    }
                }
            }
        });

        tracing::info!(addr = %local_addr, "inspector listening");

        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Address actually bound, with the real port when 0 was requested
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Stop accepting connections.
    pub fn stop(&mut self) -> InspectorResult<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!(addr = %self.local_addr, "inspector stopped");
            Ok(())
        } else {
            Err(InspectorError::AlreadyStopped)
        }
    }
}

impl Drop for InspectorServer {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

async fn serve_connection<H>(stream: TcpStream, service: InspectorService<H>) -> InspectorResult<()>
where
    H: RuntimeHost + Send + 'static,
{
    HttpBuilder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(stream), service)
        .await
        .map_err(|e| InspectorError::Io(std::io::Error::other(e)))
}

/// Hyper service answering protocol requests against one session.
struct InspectorService<H> {
    session: SharedSession<H>,
}

impl<H> Clone for InspectorService<H> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}

impl<H> Service<Request<Incoming>> for InspectorService<H>
where
    H: RuntimeHost + Send + 'static,
{
    type Response = Response<InspectorBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let session = self.session.clone();

        Box::pin(async move {
            if req.uri().path() != "/" {
                return Ok(plain(StatusCode::NOT_FOUND, "Not Found"));
            }
            if req.method() != Method::POST {
                let mut response = plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
                response
                    .headers_mut()
                    .insert(ALLOW, HeaderValue::from_static("POST"));
                return Ok(response);
            }

            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read inspector request body");
                    return Ok(plain(StatusCode::BAD_REQUEST, "Bad Request"));
                }
            };

            let reply = session.lock().handle_message(&body);
            match serde_json::to_vec(&reply) {
                Ok(json) => {
                    let mut response = Response::new(full_body(json));
                    response
                        .headers_mut()
                        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    Ok(response)
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode inspector response");
                    Ok(plain(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error",
                    ))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{DebugSession, DetachedHost};

    #[tokio::test]
    async fn test_start_and_stop() {
        let session = DebugSession::new(DetachedHost).shared();
        let config = InspectorConfig {
            port: 0,
            ..InspectorConfig::default()
        };
        let mut server = InspectorServer::start(config, session).await.unwrap();
        assert!(server.local_addr().port() > 0);
        assert!(server.is_running());

        server.stop().unwrap();
        assert!(!server.is_running());
        assert!(matches!(server.stop(), Err(InspectorError::AlreadyStopped)));
    }

    #[tokio::test]
    async fn test_rejects_bad_host() {
        let session = DebugSession::new(DetachedHost).shared();
        let config = InspectorConfig {
            host: "not a host".to_string(),
            port: 0,
        };
        let result = InspectorServer::start(config, session).await;
        assert!(matches!(result, Err(InspectorError::AddrParse(_))));
    }
}
