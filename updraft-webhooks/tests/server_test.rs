//! Callback server over real sockets.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use updraft_api::{ApiError, CallbackApi, CallbackServer, RemoteError};
use updraft_events::CallbackPayload;
use updraft_webhooks::{
    CallbackKind, Directive, WebhookConfig, WebhookError, WebhookResult, WebhookServer,
};

#[derive(Default)]
struct RecordingApi {
    settings: Mutex<Vec<(i64, i64, Vec<String>)>>,
}

#[async_trait]
impl CallbackApi for RecordingApi {
    async fn get_callback_servers(&self, _group_id: i64) -> updraft_api::Result<Vec<CallbackServer>> {
        Ok(Vec::new())
    }

    async fn add_callback_server(
        &self,
        _group_id: i64,
        _title: &str,
        _url: &str,
        _secret: &str,
    ) -> updraft_api::Result<i64> {
        Ok(17)
    }

    async fn delete_callback_server(&self, _group_id: i64, _server_id: i64) -> updraft_api::Result<bool> {
        Err(ApiError::Application(RemoteError {
            error_code: 15,
            error_msg: "Access denied".to_string(),
        }))
    }

    async fn get_callback_confirmation_code(&self, _group_id: i64) -> updraft_api::Result<String> {
        Ok("f00d".to_string())
    }

    async fn set_callback_settings(
        &self,
        group_id: i64,
        server_id: i64,
        events: &[String],
    ) -> updraft_api::Result<bool> {
        self.settings
            .lock()
            .push((group_id, server_id, events.to_vec()));
        Ok(true)
    }
}

fn server_with(config: WebhookConfig) -> (Arc<WebhookServer>, Arc<RecordingApi>) {
    let api = Arc::new(RecordingApi::default());
    let server = WebhookServer::new(api.clone(), config).unwrap();
    (Arc::new(server), api)
}

async fn start(server: &Arc<WebhookServer>) -> (String, JoinHandle<WebhookResult<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serving = Arc::clone(server);
    let handle = tokio::spawn(async move { serving.serve(listener).await });

    while !server.is_running() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    (format!("http://{addr}"), handle)
}

fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn post(url: String, body: serde_json::Value) -> (u16, String) {
    let response = http()
        .post(url)
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}

#[tokio::test]
async fn test_confirmation_answered_by_listener() {
    let (server, _) = server_with(WebhookConfig::builder().secret("s").build());
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    server.emitter().on(CallbackKind::Confirmation, move |_| {
        *counter.lock() += 1;
        Ok(Directive::Confirm("xyz".to_string()))
    });
    let (base, handle) = start(&server).await;

    let reply = post(
        format!("{base}/callback"),
        json!({"type": "confirmation", "group_id": 1, "secret": "s"}),
    )
    .await;

    assert_eq!(reply, (200, "xyz".to_string()));
    assert_eq!(*calls.lock(), 1);

    server.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_wrong_secret_forbidden_before_confirmation() {
    let config = WebhookConfig::builder()
        .secret("s")
        .group_confirmation(1, "abc123")
        .build();
    let (server, _) = server_with(config);
    let (base, handle) = start(&server).await;
    let url = format!("{base}/callback");

    let forbidden = post(url.clone(), json!({"type": "confirmation", "group_id": 1, "secret": "nope"})).await;
    let confirmed = post(url, json!({"type": "confirmation", "group_id": 1, "secret": "s"})).await;

    assert_eq!(forbidden.0, 403);
    assert_eq!(confirmed, (200, "abc123".to_string()));

    server.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_message_new_routed_with_retry_counter() {
    let (server, _) = server_with(WebhookConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    server.emitter().on(CallbackKind::MessageNew, move |event| {
        if let CallbackPayload::MessageNew(new) = &event.payload {
            record
                .lock()
                .push((new.message.text.clone(), event.retry_counter));
        }
        Ok(Directive::Continue)
    });
    let (base, handle) = start(&server).await;

    let response = http()
        .post(format!("{base}/callback"))
        .header("X-Retry-Counter", "2")
        .body(
            json!({
                "type": "message_new",
                "group_id": 1,
                "object": {"message": {
                    "id": 10, "date": 1700000000, "peer_id": 2000000001,
                    "from_id": 5, "text": "hello"
                }}
            })
            .to_string(),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
    assert_eq!(*seen.lock(), vec![("hello".to_string(), 2)]);

    server.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_listener_status_sets_retry_after() {
    let (server, _) = server_with(WebhookConfig::default());
    let at = Utc.with_ymd_and_hms(2030, 5, 6, 7, 8, 9).unwrap();
    server
        .emitter()
        .on(CallbackKind::GroupJoin, move |_| Ok(Directive::retry_at(503, at)));
    let (base, handle) = start(&server).await;

    let response = http()
        .post(format!("{base}/callback"))
        .body(json!({"type": "group_join", "group_id": 1, "object": {"user_id": 5}}).to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 503);
    assert_eq!(
        response.headers().get("retry-after").unwrap(),
        "Mon, 06 May 2030 07:08:09 GMT"
    );

    server.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_remove_answer() {
    let (server, _) = server_with(WebhookConfig::default());
    let removed = Arc::new(Mutex::new(0));
    let counter = removed.clone();
    server
        .emitter()
        .on(CallbackKind::GroupLeave, |_| Ok(Directive::Remove));
    server
        .emitter()
        .on(CallbackKind::GroupServerRemoved, move |_| {
            *counter.lock() += 1;
            Ok(Directive::Continue)
        });
    let (base, handle) = start(&server).await;

    let reply = post(
        format!("{base}/callback"),
        json!({"type": "group_leave", "group_id": 1, "object": {"user_id": 5, "self": 1}}),
    )
    .await;

    assert_eq!(reply, (200, "remove".to_string()));
    assert_eq!(*removed.lock(), 1);

    server.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_other_paths_and_methods() {
    let (server, _) = server_with(WebhookConfig::default());
    let (base, handle) = start(&server).await;

    let wrong_path = http().post(format!("{base}/other")).body("{}").send().await.unwrap();
    let wrong_method = http().get(format!("{base}/callback")).send().await.unwrap();
    let bad_body = http()
        .post(format!("{base}/callback"))
        .body("not json")
        .send()
        .await
        .unwrap();

    assert_eq!(wrong_path.status().as_u16(), 404);
    assert_eq!(wrong_method.status().as_u16(), 405);
    assert_eq!(wrong_method.headers().get("allow").unwrap(), "POST");
    assert_eq!(bad_body.status().as_u16(), 400);

    server.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_lifecycle_guards() {
    let (server, _) = server_with(WebhookConfig::default());
    assert!(matches!(server.stop().await, Err(WebhookError::NotRunning)));

    let (base, handle) = start(&server).await;
    assert!(server.local_addr().is_some());

    let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
    assert!(matches!(
        server.serve(second).await,
        Err(WebhookError::AlreadyRunning)
    ));
    assert!(matches!(server.run().await, Err(WebhookError::AlreadyRunning)));
    assert!(matches!(
        server.set_path("/elsewhere"),
        Err(WebhookError::AlreadyRunning)
    ));

    server.stop().await.unwrap();
    handle.await.unwrap().unwrap();

    assert!(!server.is_running());
    assert!(server.local_addr().is_none());
    assert!(http().post(format!("{base}/callback")).send().await.is_err());

    server.set_path("/elsewhere").unwrap();
    assert_eq!(server.path(), "/elsewhere");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_drains_in_flight_request() {
    let (server, _) = server_with(WebhookConfig::default());
    let entered = Arc::new(Notify::new());
    let signal = entered.clone();
    server.emitter().on(CallbackKind::GroupJoin, move |_| {
        signal.notify_one();
        std::thread::sleep(Duration::from_millis(300));
        Ok(Directive::Continue)
    });
    let (base, handle) = start(&server).await;

    let request = tokio::spawn(post(
        format!("{base}/callback"),
        json!({"type": "group_join", "group_id": 1, "object": {"user_id": 5}}),
    ));
    entered.notified().await;

    server.stop().await.unwrap();

    assert!(!server.is_running());
    assert_eq!(request.await.unwrap(), (200, "ok".to_string()));
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_set_settings_pushes_registered_kinds() {
    let (server, api) = server_with(WebhookConfig::default());
    server
        .emitter()
        .on(CallbackKind::MessageNew, |_| Ok(Directive::Continue));
    server
        .emitter()
        .on(CallbackKind::GroupJoin, |_| Ok(Directive::Continue));
    server
        .emitter()
        .on(CallbackKind::Confirmation, |_| Ok(Directive::Continue));

    assert!(server.set_settings(1, 17).await.unwrap());
    assert!(
        server
            .set_settings_events(1, 17, &[CallbackKind::LikeAdd, CallbackKind::GroupServerRemoved])
            .await
            .unwrap()
    );

    let settings = api.settings.lock().clone();
    assert_eq!(
        settings,
        vec![
            (1, 17, vec!["message_new".to_string(), "group_join".to_string()]),
            (1, 17, vec!["like_add".to_string()]),
        ]
    );
}

#[tokio::test]
async fn test_admin_forwarding() {
    let (server, _) = server_with(WebhookConfig::default());

    assert_eq!(
        server
            .add_server(1, "bot", "https://bot.example.com/callback", "s")
            .await
            .unwrap(),
        17
    );
    assert!(server.get_servers(1).await.unwrap().is_empty());

    let err = server.delete_server(1, 17).await.unwrap_err();
    assert!(matches!(err, WebhookError::Api(ApiError::Application(_))));

    assert_eq!(server.load_confirmation_code(3).await.unwrap(), "f00d");
    assert_eq!(server.dispatcher().confirmations().resolve(3), "f00d");
}
