//! End-to-end bot scenarios
//!
//! `EchoBot` with real identity files in a temp directory and the fake
//! voice client standing in for the server.

mod common;

use std::time::Duration;

use common::{FakeVoiceClient, fast_policy, test_config, wait_until};
use echobot::bot::EchoBot;
use echobot::config::{BotOptions, EchoConfig, IdentityPaths, ReconnectPolicy};
use echobot::error::BotError;
use tempfile::TempDir;
use tokio::sync::oneshot;

fn options(dir: &TempDir, reconnect: ReconnectPolicy) -> BotOptions {
    BotOptions {
        session: test_config("echotest"),
        echo: EchoConfig::default(),
        reconnect,
        identity: Some(IdentityPaths {
            key: dir.path().join("echo-bot_key.pem"),
            cert: dir.path().join("echo-bot_cert.pem"),
        }),
    }
}

#[tokio::test]
async fn test_first_start_provisions_joins_and_echoes() {
    let dir = TempDir::new().unwrap();
    let client = FakeVoiceClient::new(&[(0, "Root"), (1, "echotest")]);

    let bot = EchoBot::new(client.clone(), options(&dir, fast_policy())).unwrap();

    assert!(dir.path().join("echo-bot_key.pem").exists());
    assert!(dir.path().join("echo-bot_cert.pem").exists());

    let session = bot.start().await.unwrap();
    assert_eq!(session.channel().map(|c| c.name.as_str()), Some("echotest"));

    // The provisioned certificate is what the client presents
    let fingerprint = bot.identity().unwrap().fingerprint().to_string();
    assert_eq!(client.identities(), vec![Some(fingerprint)]);

    let connection = client.latest();
    let samples = vec![0x11, 0x22, 0x33, 0x44];
    connection.deliver_audio(2, "bob", &samples);

    assert!(wait_until(Duration::from_secs(1), || !connection.sent().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connection.sent(), vec![samples]);
}

#[tokio::test]
async fn test_restart_reuses_identity() {
    let dir = TempDir::new().unwrap();
    let client = FakeVoiceClient::new(&[(0, "Root"), (1, "echotest")]);

    let first = EchoBot::new(client.clone(), options(&dir, fast_policy())).unwrap();
    let cert_before = std::fs::read(dir.path().join("echo-bot_cert.pem")).unwrap();
    let key_before = std::fs::read(dir.path().join("echo-bot_key.pem")).unwrap();

    let second = EchoBot::new(client.clone(), options(&dir, fast_policy())).unwrap();

    assert_eq!(
        first.identity().unwrap().fingerprint(),
        second.identity().unwrap().fingerprint()
    );
    assert_eq!(std::fs::read(dir.path().join("echo-bot_cert.pem")).unwrap(), cert_before);
    assert_eq!(std::fs::read(dir.path().join("echo-bot_key.pem")).unwrap(), key_before);
}

#[tokio::test]
async fn test_without_identity_connects_anonymously() {
    let dir = TempDir::new().unwrap();
    let client = FakeVoiceClient::new(&[(0, "Root"), (1, "echotest")]);
    let options = BotOptions {
        identity: None,
        ..options(&dir, fast_policy())
    };

    let bot = EchoBot::new(client.clone(), options).unwrap();
    bot.start().await.unwrap();

    assert!(bot.identity().is_none());
    assert_eq!(client.identities(), vec![None]);
    assert!(!dir.path().join("echo-bot_cert.pem").exists());
}

#[tokio::test]
async fn test_run_until_shutdown() {
    let dir = TempDir::new().unwrap();
    let client = FakeVoiceClient::new(&[(0, "Root"), (1, "echotest")]);
    let bot = EchoBot::new(client.clone(), options(&dir, fast_policy())).unwrap();
    let handle = bot.handle();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(bot.run_until(async {
        let _ = shutdown_rx.await;
    }));

    assert!(wait_until(Duration::from_secs(1), || handle.is_alive()).await);

    // A dropped link is healed while running
    client.latest().drop_link();
    assert!(wait_until(Duration::from_secs(2), || handle.is_alive()
        && client.connect_count() == 2)
    .await);

    let connection = client.latest();
    connection.deliver_audio(2, "bob", &[5, 6, 7]);
    assert!(wait_until(Duration::from_secs(1), || connection.sent() == vec![vec![5, 6, 7]]).await);

    shutdown_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("bot should stop promptly")
        .unwrap();

    assert!(result.is_ok());
    assert!(connection.is_closed());
    assert!(handle.current().is_none());
}

#[tokio::test]
async fn test_initial_connect_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let client = FakeVoiceClient::new(&[(0, "Root"), (1, "echotest")]);
    client.fail_always(true);
    let bot = EchoBot::new(client.clone(), options(&dir, fast_policy())).unwrap();

    let result = bot.run_until(std::future::pending()).await;

    assert!(matches!(result, Err(BotError::Connect(_))));
    assert_eq!(client.connect_count(), 1);
}

#[tokio::test]
async fn test_missing_channel_is_fatal_at_startup() {
    let dir = TempDir::new().unwrap();
    let client = FakeVoiceClient::new(&[(0, "Root")]);
    let bot = EchoBot::new(client.clone(), options(&dir, fast_policy())).unwrap();

    let result = bot.run_until(std::future::pending()).await;

    assert!(matches!(
        result,
        Err(BotError::Connect(echobot::error::ConnectError::ChannelNotFound(_)))
    ));
}

#[tokio::test]
async fn test_exhausted_reconnects_end_the_run() {
    let dir = TempDir::new().unwrap();
    let client = FakeVoiceClient::new(&[(0, "Root"), (1, "echotest")]);
    let reconnect = ReconnectPolicy {
        max_attempts: Some(2),
        ..fast_policy()
    };
    let bot = EchoBot::new(client.clone(), options(&dir, reconnect)).unwrap();
    let handle = bot.handle();

    let task = tokio::spawn(bot.run_until(std::future::pending()));
    assert!(wait_until(Duration::from_secs(1), || handle.is_alive()).await);

    client.fail_always(true);
    client.latest().drop_link();

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("bot should give up")
        .unwrap();

    assert!(matches!(result, Err(BotError::ReconnectExhausted(2))));
    assert!(handle.current().is_none());
}
