//! The long poll session and its polling loop.

use crate::config::{
    ErrorPolicy, LongPollConfig, QUEUE_CAPACITY, parse_mode, validate_version, validate_wait,
};
use crate::error::{LongPollError, LongPollResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use updraft_api::{LongPollApi, LongPollServer, PollRequest, PollResponse};
use updraft_events::{DeliveryMode, EventEmitter, UserEvent, UserEventKind};

/// Server coordinates and request parameters of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub server: String,
    pub key: String,
    /// Cursor; unset until the first server refresh
    pub ts: Option<i64>,
    /// Last `pts` the server reported; only sent with [`DeliveryMode::PTS`]
    pub pts: Option<i64>,
    pub wait: u32,
    pub version: u32,
    pub mode: DeliveryMode,
}

impl Session {
    fn is_defined(&self) -> bool {
        !self.server.is_empty() && !self.key.is_empty()
    }

    fn request(&self) -> PollRequest {
        PollRequest {
            server: self.server.clone(),
            key: self.key.clone(),
            ts: self.ts.unwrap_or_default(),
            wait: self.wait,
            mode: self.mode.bits(),
            version: self.version,
        }
    }
}

/// Resets the running flag when `run` returns, however it returns.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// User long poll session.
///
/// The session state sits behind a mutex, so the setters and
/// [`update_server`](Self::update_server) may be called from any task, also
/// while [`run`](Self::run) is polling; a change applies from the next poll.
///
/// Decoded updates go to a queue holding [`QUEUE_CAPACITY`] events. Take the
/// receiver with [`take_updates`](Self::take_updates) and drain it: while the
/// queue is full the loop waits instead of polling, so a consumer that stops
/// draining stops the poll as well.
pub struct LongPoll {
    api: Arc<dyn LongPollApi>,
    session: Mutex<Session>,
    error_policy: ErrorPolicy,
    running: AtomicBool,
    stop: Mutex<Option<CancellationToken>>,
    sender: mpsc::Sender<UserEvent>,
    receiver: Mutex<Option<mpsc::Receiver<UserEvent>>>,
}

impl LongPoll {
    /// Create a session with default settings and the given delivery mode.
    pub fn new(api: Arc<dyn LongPollApi>, mode: DeliveryMode) -> Self {
        let config = LongPollConfig {
            mode,
            ..LongPollConfig::default()
        };
        Self::build(api, config)
    }

    /// Create a session from a validated configuration.
    pub fn with_config(api: Arc<dyn LongPollApi>, config: LongPollConfig) -> LongPollResult<Self> {
        config.validate()?;
        Ok(Self::build(api, config))
    }

    /// Create a session for coordinates obtained earlier.
    pub fn with_server(
        api: Arc<dyn LongPollApi>,
        mode: DeliveryMode,
        server: LongPollServer,
    ) -> LongPollResult<Self> {
        let long_poll = Self::new(api, mode);
        long_poll.set_server(server)?;
        Ok(long_poll)
    }

    fn build(api: Arc<dyn LongPollApi>, config: LongPollConfig) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            api,
            session: Mutex::new(Session {
                server: String::new(),
                key: String::new(),
                ts: None,
                pts: None,
                wait: config.wait,
                version: config.version,
                mode: config.mode,
            }),
            error_policy: config.error_policy,
            running: AtomicBool::new(false),
            stop: Mutex::new(None),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Fetch fresh coordinates and cursor from the API.
    pub async fn connect(&self) -> LongPollResult<()> {
        self.update_server(true).await
    }

    /// Fetch a fresh key and server; the cursor too if `refresh_cursor`.
    pub async fn update_server(&self, refresh_cursor: bool) -> LongPollResult<()> {
        let version = self.session.lock().version;
        let fresh = self.api.get_long_poll_server(version).await?;

        if fresh.key.is_empty() || fresh.server.is_empty() {
            return Err(LongPollError::ServerUndefined);
        }

        let mut session = self.session.lock();
        session.key = fresh.key;
        session.server = fresh.server;
        if refresh_cursor {
            session.ts = Some(fresh.ts);
        }
        debug!(refresh_cursor, ts = ?session.ts, "Long poll server updated");
        Ok(())
    }

    /// Use known coordinates.
    pub fn set_server(&self, server: LongPollServer) -> LongPollResult<()> {
        if server.key.is_empty() || server.server.is_empty() {
            return Err(LongPollError::validation(
                "server",
                "key and server must not be empty",
            ));
        }

        let mut session = self.session.lock();
        session.server = server.server;
        session.key = server.key;
        session.ts = Some(server.ts);
        Ok(())
    }

    /// Seconds the server holds a poll open, 1 to 90.
    pub fn set_wait(&self, wait: u32) -> LongPollResult<()> {
        validate_wait(wait)?;
        self.session.lock().wait = wait;
        Ok(())
    }

    /// Delivery mode bitmask; unknown bits are rejected.
    pub fn set_mode(&self, bits: u32) -> LongPollResult<()> {
        let mode = parse_mode(bits)?;
        self.session.lock().mode = mode;
        Ok(())
    }

    /// Protocol version, 1 to 3.
    pub fn set_version(&self, version: u32) -> LongPollResult<()> {
        validate_version(version)?;
        self.session.lock().version = version;
        Ok(())
    }

    /// Snapshot of the session state.
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }

    pub fn cursor(&self) -> Option<i64> {
        self.session.lock().ts
    }

    /// Message sequence number from the latest poll that carried one.
    pub fn pts(&self) -> Option<i64> {
        self.session.lock().pts
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Take the receiving end of the update queue. Returns `None` after the
    /// first call.
    pub fn take_updates(&self) -> Option<mpsc::Receiver<UserEvent>> {
        self.receiver.lock().take()
    }

    /// Ask a running loop to return before its next poll.
    ///
    /// A poll already in flight is not interrupted; it ends when the server
    /// answers or the API client times out. If the loop is waiting on a full
    /// queue it returns without moving the cursor, so the next `run` polls
    /// the same batch again.
    pub fn stop(&self) {
        if let Some(token) = self.stop.lock().take() {
            info!("Stopping long poll");
            token.cancel();
        }
    }

    /// Poll until `cancel` fires, [`stop`](Self::stop) is called, or a fatal
    /// error occurs.
    ///
    /// Cancellation is checked between polls. Fails with
    /// [`LongPollError::AlreadyRunning`] if another `run` is in progress.
    pub async fn run(&self, cancel: CancellationToken) -> LongPollResult<()> {
        if !self.session.lock().is_defined() {
            return Err(LongPollError::ServerUndefined);
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LongPollError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        let token = cancel.child_token();
        *self.stop.lock() = Some(token.clone());

        info!("Long poll started");
        let result = self.poll_loop(&token).await;
        self.stop.lock().take();

        match &result {
            Ok(()) => info!("Long poll stopped"),
            Err(err) => error!(error = %err, "Long poll failed"),
        }
        result
    }

    async fn poll_loop(&self, token: &CancellationToken) -> LongPollResult<()> {
        while !token.is_cancelled() {
            let err = match self.cycle(token).await {
                Ok(()) => continue,
                Err(err) => err,
            };

            match self.error_policy {
                ErrorPolicy::LogAndContinue { backoff } if err.is_transport() => {
                    warn!(error = %err, ?backoff, "Long poll request failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = token.cancelled() => {}
                    }
                }
                _ => return Err(err),
            }
        }
        Ok(())
    }

    /// One poll plus the recovery action for its failure code.
    async fn cycle(&self, token: &CancellationToken) -> LongPollResult<()> {
        let request = self.session.lock().request();
        let response = self.api.long_poll(&request).await?;

        match response.failure_code() {
            0 => {}
            1 => {
                self.advance(&response);
                return Ok(());
            }
            2 => {
                debug!("Long poll key expired");
                return self.update_server(false).await;
            }
            3 => {
                debug!("Long poll history lost");
                return self.update_server(true).await;
            }
            4 => return Err(LongPollError::InvalidVersion),
            code => return Err(LongPollError::Failed(code)),
        }

        let mode = DeliveryMode::from_bits_truncate(request.mode);
        let events = response
            .updates
            .iter()
            .map(|raw| UserEvent::decode(raw, mode))
            .collect::<Result<Vec<_>, _>>()?;

        // The cursor moves only once the whole batch is queued.
        for event in events {
            tokio::select! {
                sent = self.sender.send(event) => {
                    sent.map_err(|_| LongPollError::QueueClosed)?;
                }
                _ = token.cancelled() => {
                    warn!(ts = request.ts, "Long poll stopped while the update queue was full");
                    return Ok(());
                }
            }
        }
        self.advance(&response);
        Ok(())
    }

    fn advance(&self, response: &PollResponse) {
        let mut session = self.session.lock();
        if let Some(ts) = response.ts {
            debug!(from = ?session.ts, to = ts, updates = response.updates.len(), "Advancing cursor");
            session.ts = Some(ts);
        }
        if response.pts.is_some() {
            session.pts = response.pts;
        }
    }

    /// Emit every update from `updates` on `emitter` until the queue closes.
    ///
    /// Returns the number of events forwarded.
    pub async fn forward(
        mut updates: mpsc::Receiver<UserEvent>,
        emitter: &EventEmitter<UserEventKind, UserEvent>,
    ) -> usize {
        let mut forwarded = 0;
        while let Some(event) = updates.recv().await {
            let outcome = emitter.emit(&event.kind(), &event);
            if let Some(err) = outcome.error {
                warn!(kind = ?event.kind(), error = %err, "Listener failed on long poll event");
            }
            forwarded += 1;
        }
        forwarded
    }
}
