mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tokio::time::sleep;

use droidhub::Inventory;
use support::{
    FakeDevice, emulator_record, http_create_session, make_hub, spawn_hub, test_settings,
    testapp, webview_app,
};

#[tokio::test]
async fn session_lifecycle_round_trip() {
    let hub = make_hub(
        test_settings(39600),
        vec![testapp()],
        vec![(emulator_record("dev-a"), Arc::new(FakeDevice::online()))],
    );
    let t = spawn_hub(hub).await;

    // Create.
    let created = http_create_session(&t, "io.selendroid.testapp").await;
    assert_eq!(created["status"], 0);
    let session_id = created["sessionId"].as_str().unwrap().to_owned();
    assert_eq!(created["value"]["aut"], "io.selendroid.testapp");

    // List: exactly one entry, matching id and capabilities.
    let listed: Value = t
        .client
        .get(t.url("/wd/hub/sessions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["status"], 0);
    let sessions = listed["value"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["id"], session_id.as_str());
    assert_eq!(sessions[0]["capabilities"]["aut"], "io.selendroid.testapp");

    // Capabilities by id.
    let caps: Value = t
        .client
        .get(t.url(&format!("/wd/hub/session/{session_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(caps["status"], 0);
    assert_eq!(caps["value"]["aut"], "io.selendroid.testapp");

    // Stop: session gone, device free, and a new session can reuse it.
    let stopped: Value = t
        .client
        .delete(t.url(&format!("/wd/hub/session/{session_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stopped["status"], 0);
    assert!(t.hub.sessions().is_empty());
    assert!(!t.hub.devices().snapshot()[0].in_use);

    let recreated = http_create_session(&t, "io.selendroid.testapp").await;
    assert_eq!(recreated["status"], 0);
}

#[tokio::test]
async fn status_is_success_independent_of_sessions() {
    let hub = make_hub(
        test_settings(39610),
        vec![testapp()],
        vec![(emulator_record("dev-a"), Arc::new(FakeDevice::online()))],
    );
    let t = spawn_hub(hub).await;

    let status: Value = t
        .client
        .get(t.url("/wd/hub/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], 0);
    assert_eq!(
        status["value"]["build"]["version"],
        t.hub.settings().server_version.as_str()
    );
    let apps = status["value"]["supportedApps"].as_array().unwrap();
    assert_eq!(apps[0]["appId"], "io.selendroid.testapp");
    let devices = status["value"]["supportedDevices"].as_array().unwrap();
    assert_eq!(devices[0]["avdName"], "dev-a");

    // Still success with a session up.
    http_create_session(&t, "io.selendroid.testapp").await;
    let again: Value = t
        .client
        .get(t.url("/wd/hub/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["status"], 0);
}

#[tokio::test]
async fn unrouted_paths_get_a_bare_404() {
    let hub = make_hub(test_settings(39620), vec![testapp()], vec![]);
    let t = spawn_hub(hub).await;

    let missing = t
        .client
        .get(t.url("/definitely/not/a/route"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 404);

    // Route tables are independent per method.
    let wrong_method = t
        .client
        .get(t.url("/wd/hub/session"))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_method.status().as_u16(), 404);
}

#[tokio::test]
async fn bad_session_requests_answer_session_not_created() {
    let hub = make_hub(test_settings(39630), vec![testapp()], vec![]);
    let t = spawn_hub(hub).await;

    let malformed = t
        .client
        .post(t.url("/wd/hub/session"))
        .header("content-type", "application/json")
        .body("{definitely not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status().as_u16(), 200);
    let body: Value = malformed.json().await.unwrap();
    assert_eq!(body["status"], 33);

    let missing_caps = t
        .client
        .post(t.url("/wd/hub/session"))
        .json(&json!({ "foo": 1 }))
        .send()
        .await
        .unwrap();
    let body: Value = missing_caps.json().await.unwrap();
    assert_eq!(body["status"], 33);
}

#[tokio::test]
async fn webview_sessions_switch_context_before_returning() {
    let device = Arc::new(FakeDevice::online());
    let hub = make_hub(
        test_settings(39640),
        vec![webview_app()],
        vec![(emulator_record("dev-a"), device.clone())],
    );
    let t = spawn_hub(hub).await;

    let created = http_create_session(&t, "android").await;
    assert_eq!(created["status"], 0);

    let requests = device.state().stub.requests.lock().clone();
    assert!(
        requests
            .iter()
            .any(|(method, path)| method == "POST" && path.ends_with("/element"))
    );
    assert!(
        requests
            .iter()
            .any(|(method, path)| method == "POST" && path.ends_with("/window"))
    );
}

#[tokio::test]
async fn failed_webview_switch_is_terminal_and_releases_the_device() {
    let device = Arc::new(FakeDevice::online());
    device.state().stub.element_found.store(false, Ordering::SeqCst);

    let mut settings = test_settings(39650);
    settings.webview_switch_timeout = Duration::from_millis(600);
    let hub = make_hub(
        settings,
        vec![webview_app()],
        vec![(emulator_record("dev-a"), device.clone())],
    );
    let t = spawn_hub(hub).await;

    let created = http_create_session(&t, "android").await;
    assert_eq!(created["status"], 33);
    assert!(t.hub.sessions().is_empty());
    assert!(!t.hub.devices().snapshot()[0].in_use);
}

#[tokio::test]
async fn screenshot_comes_back_base64_encoded() {
    let hub = make_hub(
        test_settings(39660),
        vec![testapp()],
        vec![(emulator_record("dev-a"), Arc::new(FakeDevice::online()))],
    );
    let t = spawn_hub(hub).await;

    let created = http_create_session(&t, "io.selendroid.testapp").await;
    let session_id = created["sessionId"].as_str().unwrap();

    let shot: Value = t
        .client
        .get(t.url(&format!("/wd/hub/session/{session_id}/screenshot")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(shot["status"], 0);
    assert_eq!(shot["value"], BASE64.encode(b"PNG").as_str());
}

#[tokio::test]
async fn sessions_stop_after_the_configured_timeout() {
    let mut settings = test_settings(39670);
    settings.session_timeout = Duration::from_millis(300);
    let hub = make_hub(
        settings,
        vec![testapp()],
        vec![(emulator_record("dev-a"), Arc::new(FakeDevice::online()))],
    );

    let session_id = hub
        .create_session(&support::session_caps("io.selendroid.testapp"))
        .await
        .unwrap();
    assert!(hub.sessions().contains(&session_id));

    sleep(Duration::from_millis(900)).await;
    assert!(hub.sessions().is_empty());
    assert!(!hub.devices().snapshot()[0].in_use);
}

#[tokio::test]
async fn inventory_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("droidhub.toml");
    tokio::fs::write(
        &path,
        r#"
            [hub]
            instrumentation_apk = "apks/droidhub-server.apk"

            [[apps]]
            app_id = "io.selendroid.testapp"
            base_package = "io.selendroid.testapp"
            main_activity = ".HomeScreenActivity"
            apk = "apks/selendroid-test-app.apk"

            [[devices]]
            id = "test-avd-19"
            platform = "19"
            screen_size = "320x480"
            emulator = true
        "#,
    )
    .await
    .unwrap();

    let inventory = Inventory::load(&path).await.unwrap();
    assert_eq!(inventory.apps.len(), 1);
    assert_eq!(inventory.devices[0].platform, "19");
}
