use std::{fs, time::Duration};

use anyhow::Result;
use coopmarket_config::AppConfig;
use coopmarket_marketplace::{RegisterCooperativeRequest, SignInRequest};
use coopmarket_remote::{AuthUser, MemoryDataService, Session};
use coopmarket_runtime::{self, session_store::SessionStore, ClientServices};
use serde_json::Map;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

fn stored_session() -> Session {
    let mut metadata = Map::new();
    metadata.insert("role".into(), "admin".into());
    Session {
        access_token: "token-1".into(),
        refresh_token: None,
        user: AuthUser {
            id: "user-1".into(),
            email: Some("a@coop.test".into()),
            metadata,
        },
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_adopts_restored_session() -> Result<()> {
    let config = AppConfig::default();

    let services = ClientServices::initialise(&config, Some(stored_session())).await?;
    assert_eq!(services.session.current().await, Some(stored_session()));
    assert!(services.session.is_admin().await);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_without_session_is_anonymous() -> Result<()> {
    let services = ClientServices::initialise(&AppConfig::default(), None).await?;
    assert!(services.session.current().await.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_rejects_blank_remote_url() {
    let mut config = AppConfig::default();
    config.remote.url = "  ".into();

    let error = match ClientServices::initialise(&config, None).await {
        Ok(_) => panic!("expected a blank url to be rejected"),
        Err(error) => error,
    };
    assert!(error.to_string().contains("remote.url must be configured"));
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_services_share_one_session() -> Result<()> {
    let services = ClientServices::offline(MemoryDataService::new()).await;

    services
        .auth
        .register_cooperative(&RegisterCooperativeRequest {
            name: "Kivu Miners".into(),
            registration_number: "RC-42".into(),
            email: "a@coop.test".into(),
            password: "secret1".into(),
            ..Default::default()
        })
        .await?;
    services
        .auth
        .sign_in(&SignInRequest {
            email: "a@coop.test".into(),
            password: "secret1".into(),
        })
        .await?;

    let cooperative = services.cooperatives.current_cooperative().await?;
    assert_eq!(cooperative.name, "Kivu Miners");
    assert!(services.cooperatives.has_profile().await?);
    assert!(services.members.current_member().await.is_err());
    Ok(())
}

#[test]
fn session_store_round_trips_and_clears() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = SessionStore::new(temp_dir.path().join("nested/session.json"));

    assert!(store.load()?.is_none());
    store.save(&stored_session())?;
    assert!(store.path().exists());
    assert_eq!(store.load()?, Some(stored_session()));

    store.clear()?;
    assert!(store.load()?.is_none());
    store.clear()?;
    Ok(())
}

#[test]
fn session_store_reports_corrupt_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("session.json");
    fs::write(&path, "not json")?;

    let error = SessionStore::new(&path).load().unwrap_err();
    assert!(error.to_string().contains("is corrupt"));
    Ok(())
}

#[test]
fn telemetry_init_tracing_sets_global_subscriber() {
    coopmarket_runtime::telemetry::init_tracing().expect("first initialisation should succeed");

    let second = coopmarket_runtime::telemetry::init_tracing();
    assert!(
        second.is_err(),
        "initialising telemetry twice should fail with global subscriber already set"
    );
}

#[tokio::test(flavor = "multi_thread")]
#[cfg_attr(not(unix), ignore = "requires Unix signal handling")]
async fn shutdown_signal_completes_on_ctrl_c_notification() -> Result<()> {
    let shutdown_task = tokio::spawn(async { coopmarket_runtime::shutdown_signal().await });

    sleep(Duration::from_millis(50)).await;
    #[cfg(unix)]
    unsafe {
        libc::raise(libc::SIGINT);
    }

    timeout(Duration::from_secs(2), shutdown_task).await??;
    Ok(())
}
