//! HTTP front of the callback server.

use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE, RETRY_AFTER};
use http::{HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::{Mutex, RwLock};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use updraft_api::CallbackApi;
use updraft_config::CallbackSettings;
use updraft_events::{CallbackEvent, CallbackKind, EventEmitter};

use crate::config::{WebhookConfig, validate_path};
use crate::dispatcher::{Dispatcher, RETRY_COUNTER_HEADER, Reply};
use crate::error::{WebhookError, WebhookResult};
use crate::secrets::GroupStrings;
use crate::shutdown::ConnectionTracker;

/// Callback server.
///
/// Accepts `POST` notifications on one path and hands each to the
/// [`Dispatcher`]. Every connection runs on its own task. `run` and `stop`
/// may be called from different tasks; `stop` returns once in-flight
/// requests are answered (or the drain timeout passes) and the listener is
/// closed.
pub struct WebhookServer {
    pub(crate) api: Arc<dyn CallbackApi>,
    dispatcher: Arc<Dispatcher>,
    address: SocketAddr,
    path: RwLock<String>,
    drain_timeout: Duration,
    max_body_size: usize,
    running: AtomicBool,
    /// Mirrors `running` so `stop` can wait for the loop to finish
    state: watch::Sender<bool>,
    shutdown: Mutex<Option<CancellationToken>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl WebhookServer {
    pub fn new(api: Arc<dyn CallbackApi>, config: WebhookConfig) -> WebhookResult<Self> {
        Self::with_emitter(api, config, Arc::new(EventEmitter::new()))
    }

    /// Create a server that emits into an existing emitter.
    pub fn with_emitter(
        api: Arc<dyn CallbackApi>,
        config: WebhookConfig,
        emitter: Arc<EventEmitter<CallbackKind, CallbackEvent>>,
    ) -> WebhookResult<Self> {
        config.validate()?;

        let dispatcher = Dispatcher::with_registries(
            emitter,
            GroupStrings::new(config.secret, config.group_secrets),
            GroupStrings::new(config.confirmation, config.group_confirmations),
        );

        Ok(Self {
            api,
            dispatcher: Arc::new(dispatcher),
            address: config.address,
            path: RwLock::new(config.path),
            drain_timeout: config.drain_timeout,
            max_body_size: config.max_body_size,
            running: AtomicBool::new(false),
            state: watch::Sender::new(false),
            shutdown: Mutex::new(None),
            local_addr: Mutex::new(None),
        })
    }

    pub fn from_settings(
        api: Arc<dyn CallbackApi>,
        settings: &CallbackSettings,
    ) -> WebhookResult<Self> {
        Self::new(api, WebhookConfig::try_from(settings)?)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn emitter(&self) -> &Arc<EventEmitter<CallbackKind, CallbackEvent>> {
        self.dispatcher.emitter()
    }

    pub fn path(&self) -> String {
        self.path.read().clone()
    }

    /// Change the notification path. Refused while the server runs.
    pub fn set_path(&self, path: impl Into<String>) -> WebhookResult<()> {
        let path = path.into();
        validate_path(&path)?;

        let _shutdown = self.shutdown.lock();
        if self.is_running() {
            return Err(WebhookError::AlreadyRunning);
        }
        *self.path.write() = path;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Address the running server listens on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Bind the configured address and serve until `stop` is called.
    pub async fn run(&self) -> WebhookResult<()> {
        if self.is_running() {
            return Err(WebhookError::AlreadyRunning);
        }

        let listener = TcpListener::bind(self.address)
            .await
            .map_err(|source| WebhookError::Bind {
                address: self.address,
                source,
            })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until `stop` is called.
    pub async fn serve(&self, listener: TcpListener) -> WebhookResult<()> {
        let token = self.begin()?;
        let _running = RunningGuard { server: self };

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock() = Some(local_addr);
        let path: Arc<str> = Arc::from(self.path());
        info!(address = %local_addr, path = %path, "Callback server listening");

        let tracker = ConnectionTracker::new();
        loop {
            let (stream, peer) = tokio::select! {
                _ = token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        error!(error = %err, "Failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(%peer, "Accepted connection");
            let connection = Connection {
                dispatcher: Arc::clone(&self.dispatcher),
                path: Arc::clone(&path),
                max_body_size: self.max_body_size,
            };
            let guard = tracker.track();
            let token = token.clone();
            tokio::spawn(async move {
                connection.serve(stream, peer, token).await;
                drop(guard);
            });
        }

        info!(
            active = tracker.active_count(),
            "Callback server stopping, draining connections"
        );
        tracker.drain(self.drain_timeout).await;
        drop(listener);
        info!(address = %local_addr, "Callback server stopped");
        Ok(())
    }

    /// Stop accepting, wait for in-flight requests, then release the listener.
    pub async fn stop(&self) -> WebhookResult<()> {
        let mut state = self.state.subscribe();
        {
            let shutdown = self.shutdown.lock();
            let token = shutdown.as_ref().ok_or(WebhookError::NotRunning)?;
            token.cancel();
        }

        let _ = state.wait_for(|running| !*running).await;
        Ok(())
    }

    fn begin(&self) -> WebhookResult<CancellationToken> {
        let mut shutdown = self.shutdown.lock();
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(WebhookError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        *shutdown = Some(token.clone());
        self.state.send_replace(true);
        Ok(token)
    }
}

/// Resets the running state when `serve` returns.
struct RunningGuard<'a> {
    server: &'a WebhookServer,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut shutdown = self.server.shutdown.lock();
        *shutdown = None;
        *self.server.local_addr.lock() = None;
        self.server.running.store(false, Ordering::Release);
        self.server.state.send_replace(false);
    }
}

/// Per-connection state.
#[derive(Clone)]
struct Connection {
    dispatcher: Arc<Dispatcher>,
    path: Arc<str>,
    max_body_size: usize,
}

impl Connection {
    async fn serve(self, stream: TcpStream, peer: SocketAddr, token: CancellationToken) {
        let service = service_fn(move |req: Request<Incoming>| {
            let connection = self.clone();
            async move { Ok::<_, Infallible>(connection.route(req).await) }
        });

        let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
        tokio::pin!(conn);

        let mut closing = false;
        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(err) = result {
                        debug!(%peer, error = %err, "Connection closed with error");
                    }
                    break;
                }
                _ = token.cancelled(), if !closing => {
                    closing = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }

    async fn route(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        if req.uri().path() != &*self.path {
            return into_response(Reply::status_text(StatusCode::NOT_FOUND));
        }

        if req.method() != Method::POST {
            let mut response = into_response(Reply::status_text(StatusCode::METHOD_NOT_ALLOWED));
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("POST"));
            return response;
        }

        let retry_counter = req
            .headers()
            .get(RETRY_COUNTER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let body = match Limited::new(req.into_body(), self.max_body_size)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.is::<LengthLimitError>() => {
                warn!(limit = self.max_body_size, "Notification body too large");
                return into_response(Reply::status_text(StatusCode::PAYLOAD_TOO_LARGE));
            }
            Err(err) => {
                warn!(error = %err, "Failed to read notification body");
                return into_response(Reply::status_text(StatusCode::BAD_REQUEST));
            }
        };

        into_response(self.dispatcher.handle(&body, retry_counter.as_deref()))
    }
}

fn into_response(reply: Reply) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(reply.body)));
    *response.status_mut() = reply.status;

    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if let Some(retry_after) = reply.retry_after {
        match HeaderValue::from_str(&retry_after) {
            Ok(value) => {
                headers.insert(RETRY_AFTER, value);
            }
            Err(err) => warn!(error = %err, "Dropping invalid Retry-After value"),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use updraft_api::models::CallbackServer;

    struct NoApi;

    #[async_trait]
    impl CallbackApi for NoApi {
        async fn get_callback_servers(&self, _: i64) -> updraft_api::Result<Vec<CallbackServer>> {
            Ok(Vec::new())
        }

        async fn add_callback_server(
            &self,
            _: i64,
            _: &str,
            _: &str,
            _: &str,
        ) -> updraft_api::Result<i64> {
            Ok(0)
        }

        async fn delete_callback_server(&self, _: i64, _: i64) -> updraft_api::Result<bool> {
            Ok(true)
        }

        async fn get_callback_confirmation_code(&self, _: i64) -> updraft_api::Result<String> {
            Ok(String::new())
        }

        async fn set_callback_settings(
            &self,
            _: i64,
            _: i64,
            _: &[String],
        ) -> updraft_api::Result<bool> {
            Ok(true)
        }
    }

    fn server() -> WebhookServer {
        WebhookServer::new(Arc::new(NoApi), WebhookConfig::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_path() {
        let config = WebhookConfig::builder().path("no-slash").build();
        assert!(WebhookServer::new(Arc::new(NoApi), config).is_err());
    }

    #[test]
    fn test_config_seeds_registries() {
        let config = WebhookConfig::builder()
            .secret("s")
            .group_confirmation(4, "abc")
            .build();
        let server = WebhookServer::new(Arc::new(NoApi), config).unwrap();

        assert_eq!(server.dispatcher().secrets().resolve(1), "s");
        assert_eq!(server.dispatcher().confirmations().resolve(4), "abc");
        assert_eq!(server.dispatcher().confirmations().resolve(5), "");
    }

    #[test]
    fn test_set_path_validates() {
        let server = server();
        assert!(server.set_path("hook").is_err());
        server.set_path("/hook").unwrap();
        assert_eq!(server.path(), "/hook");
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let server = server();
        assert!(!server.is_running());
        assert!(matches!(server.stop().await, Err(WebhookError::NotRunning)));
    }

    #[test]
    fn test_into_response_sets_retry_after() {
        let mut reply = Reply::status_text(StatusCode::SERVICE_UNAVAILABLE);
        reply.retry_after = Some("Tue, 02 Jan 2024 03:04:05 GMT".to_string());

        let response = into_response(reply);

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(RETRY_AFTER).unwrap(),
            "Tue, 02 Jan 2024 03:04:05 GMT"
        );
    }
}
