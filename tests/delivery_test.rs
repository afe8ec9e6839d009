//! Both transports wired from one configuration, against a mock API.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use updraft::ConfigManager;
use updraft::api::{CallbackApi, LongPollApi};
use updraft::longpoll::{LongPoll, LongPollConfig};
use updraft::prelude::*;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn load_config(mock: &MockServer) -> UpdraftConfig {
    let manager = ConfigManager::new();
    manager
        .merge(json!({
            "api": {"base_url": mock.uri(), "access_token": "token", "timeout_secs": 5},
            "long_poll": {"wait": 1, "mode": 0},
            "callback": {"address": "127.0.0.1:0", "path": "/vk", "secret": "s"}
        }))
        .unwrap();
    manager.load_validated().unwrap()
}

fn api_client(config: &UpdraftConfig) -> Arc<ApiClient> {
    Arc::new(ApiClient::new(ApiClientConfig::from(&config.api)).unwrap())
}

#[tokio::test]
async fn test_long_poll_into_emitter() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/method/messages.getLongPollServer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"key": "k1", "server": format!("{}/nim1", mock.uri()), "ts": 100}
        })))
        .expect(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/nim1"))
        .and(query_param("ts", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ts": 105, "updates": [[6, 7, 100], [7, 7, 99]]
        })))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/nim1"))
        .and(query_param("ts", "105"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ts": 105, "updates": []}))
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&mock)
        .await;

    let config = load_config(&mock);
    let api: Arc<dyn LongPollApi> = api_client(&config);
    let long_poll = LongPoll::with_config(
        api,
        LongPollConfig::try_from(&config.long_poll).unwrap(),
    )
    .unwrap();
    long_poll.connect().await.unwrap();
    let updates = long_poll.take_updates().unwrap();

    let token = CancellationToken::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let emitter = Arc::new(EventEmitter::<UserEventKind, UserEvent>::new());
    for kind in [UserEventKind::InboxRead, UserEventKind::OutboxRead] {
        let seen = seen.clone();
        let token = token.clone();
        emitter.on(kind, move |event| {
            let mut seen = seen.lock();
            seen.push(event.kind());
            if seen.len() == 2 {
                token.cancel();
            }
            Ok(Directive::Continue)
        });
    }

    let forwarder = {
        let emitter = Arc::clone(&emitter);
        tokio::spawn(async move { LongPoll::forward(updates, &emitter).await })
    };

    long_poll.run(token).await.unwrap();
    assert_eq!(long_poll.cursor(), Some(105));
    drop(long_poll);

    assert_eq!(forwarder.await.unwrap(), 2);
    assert_eq!(
        *seen.lock(),
        vec![UserEventKind::InboxRead, UserEventKind::OutboxRead]
    );
}

#[tokio::test]
async fn test_callback_server_from_config() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/method/groups.setCallbackSettings"))
        .and(body_string_contains("message_new=1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": 1})))
        .expect(1)
        .mount(&mock)
        .await;

    let config = load_config(&mock);
    let api: Arc<dyn CallbackApi> = api_client(&config);
    let server = Arc::new(WebhookServer::from_settings(api, &config.callback).unwrap());

    let texts = Arc::new(Mutex::new(Vec::new()));
    let record = texts.clone();
    server.emitter().on(CallbackKind::MessageNew, move |event| {
        if let updraft::events::CallbackPayload::MessageNew(new) = &event.payload {
            record.lock().push(new.message.text.clone());
        }
        Ok(Directive::Continue)
    });
    server
        .emitter()
        .on(CallbackKind::Confirmation, |_| Ok(Directive::Confirm("c0ffee".to_string())));

    let running = Arc::clone(&server);
    let handle = tokio::spawn(async move { running.run().await });
    let address = loop {
        if let Some(address) = server.local_addr() {
            break address;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };

    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    let url = format!("http://{address}/vk");

    let confirmation = http
        .post(&url)
        .body(json!({"type": "confirmation", "group_id": 9, "secret": "s"}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(confirmation.status().as_u16(), 200);
    assert_eq!(confirmation.text().await.unwrap(), "c0ffee");

    let message = http
        .post(&url)
        .body(
            json!({
                "type": "message_new",
                "group_id": 9,
                "secret": "s",
                "object": {"message": {"date": 1700000000, "peer_id": 3, "from_id": 3, "text": "hi"}}
            })
            .to_string(),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(message.text().await.unwrap(), "ok");
    assert_eq!(*texts.lock(), vec!["hi".to_string()]);

    assert!(server.set_settings(9, 1).await.unwrap());

    server.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}
