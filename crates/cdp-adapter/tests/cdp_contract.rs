//! Contract tests that drive a real Chromium binary through `CdpSession`.
//! Ignored by default because they need Chrome/Chromium on the host.

use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cdp_adapter::{BrowserSession, CdpConfig, CdpSession, SessionEvent};
use tempfile::TempDir;
use tokio::time::timeout;

fn contract_enabled() -> bool {
    env::var("THREADKEEPER_CDP_CONTRACT")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn contract_config() -> (CdpConfig, TempDir) {
    let profile = tempfile::tempdir().expect("temporary chrome profile");
    let cfg = CdpConfig {
        headless: true,
        user_data_dir: profile.path().to_path_buf(),
        ..CdpConfig::default()
    };
    (cfg, profile)
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set THREADKEEPER_CDP_CONTRACT=1"]
async fn contract_navigation_emits_responses() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (THREADKEEPER_CDP_CONTRACT not enabled)");
        return;
    }

    let (cfg, _profile) = contract_config();
    let session = Arc::new(CdpSession::new(cfg));
    Arc::clone(&session).start().await.expect("session start");
    let mut events = session.subscribe();

    session
        .goto("https://example.com")
        .await
        .expect("navigate succeeds");

    let started = Instant::now();
    let mut response = None;
    while started.elapsed() < Duration::from_secs(15) {
        match timeout(Duration::from_secs(1), events.recv()).await {
            Ok(Ok(SessionEvent::Response(resp))) if resp.url.contains("example.com") => {
                response = Some(resp);
                break;
            }
            _ => continue,
        }
    }
    let response = response.expect("document response observed");
    assert_eq!(response.method, "GET");
    let body = session.response_body(&response).await.expect("body");
    assert!(body.contains("Example Domain"));

    session.close().await;
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set THREADKEEPER_CDP_CONTRACT=1"]
async fn contract_evaluate_returns_values() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (THREADKEEPER_CDP_CONTRACT not enabled)");
        return;
    }

    let (cfg, _profile) = contract_config();
    let session = Arc::new(CdpSession::new(cfg));
    Arc::clone(&session).start().await.expect("session start");
    let value = session.evaluate("21 * 2").await.expect("evaluate");
    assert_eq!(value, serde_json::json!(42));
    session.close().await;
}
