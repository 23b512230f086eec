//! Integration tests for the coming episodes feed, its settings and the
//! iCalendar export.

mod common;

use common::TestApp;
use serde_json::json;

const UNAIRED: i64 = 1;
const WANTED: i64 = 3;
const DOWNLOADED: i64 = 4;
const SKIPPED: i64 = 5;

/// The Office airs this week, Archer only after it, Bones was missed three
/// days ago and Hiatus belongs to a paused show.
async fn seed_library(app: &TestApp) {
    app.create_show(1, "The Office", "NBC", "Thursday 9:00 PM").await;
    app.create_episode(1, 1, 1, 2, UNAIRED).await;
    app.create_episode(1, 1, 2, 9, UNAIRED).await;
    app.create_episode(1, 0, 1, 1, UNAIRED).await;

    app.create_show(2, "Archer", "BBC One", "20:00").await;
    app.create_episode(2, 1, 1, 3, DOWNLOADED).await;
    app.create_episode(2, 1, 2, 20, SKIPPED).await;

    app.execute("INSERT INTO tv_shows (id, name, status) VALUES (3, 'Bones', 'Continuing')")
        .await;
    app.create_episode(3, 1, 1, -3, WANTED).await;

    app.create_show(4, "Hiatus", "NBC", "Friday 10:00 PM").await;
    app.execute("UPDATE tv_shows SET paused = 1 WHERE id = 4").await;
    app.create_episode(4, 1, 1, 1, UNAIRED).await;
}

fn show_names(body: &serde_json::Value) -> Vec<String> {
    body["episodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["show_name"].as_str().unwrap().to_string())
        .collect()
}

// =============================================================================
// Feed Tests
// =============================================================================

#[tokio::test]
async fn test_coming_episodes_by_date() {
    let app = TestApp::new().await;
    seed_library(&app).await;

    let response = app.server().get("/api/coming").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["sort"], "date");
    assert_eq!(body["display_paused"], false);
    assert_eq!(body["today"], app.today().format("%Y-%m-%d").to_string());
    assert_eq!(show_names(&body), vec!["Bones", "The Office", "Archer"]);

    let office = &body["episodes"][1];
    assert_eq!(office["season"], 1);
    assert_eq!(office["episode"], 1);
    assert_eq!(office["network"], "NBC");
    assert_eq!(office["status_name"], "Unaired");

    let archer = &body["episodes"][2];
    assert_eq!(archer["episode"], 2);
}

#[tokio::test]
async fn test_missed_episode_without_network_uses_midnight() {
    let app = TestApp::new().await;
    seed_library(&app).await;

    let body: serde_json::Value = app.server().get("/api/coming").await.json();
    let bones = &body["episodes"][0];
    assert_eq!(bones["show_name"], "Bones");
    assert!(bones["local_time_label"]
        .as_str()
        .unwrap()
        .ends_with("12:00 AM"));
}

#[tokio::test]
async fn test_coming_episodes_sort_override() {
    let app = TestApp::new().await;
    seed_library(&app).await;

    let body: serde_json::Value = app.server().get("/api/coming?sort=show").await.json();
    assert_eq!(body["sort"], "show");
    assert_eq!(show_names(&body), vec!["Archer", "Bones", "The Office"]);

    let body: serde_json::Value = app.server().get("/api/coming?sort=network").await.json();
    assert_eq!(show_names(&body), vec!["Bones", "Archer", "The Office"]);

    let body: serde_json::Value = app.server().get("/api/coming?sort=bogus").await.json();
    assert_eq!(body["sort"], "date");
}

#[tokio::test]
async fn test_missed_range_override() {
    let app = TestApp::new().await;
    seed_library(&app).await;

    let body: serde_json::Value = app.server().get("/api/coming?missed_range=1").await.json();
    assert_eq!(show_names(&body), vec!["The Office", "Archer"]);
}

#[tokio::test]
async fn test_paused_shows_included_on_request() {
    let app = TestApp::new().await;
    seed_library(&app).await;

    let body: serde_json::Value = app.server().get("/api/coming?paused=on").await.json();
    assert_eq!(body["display_paused"], true);
    let names = show_names(&body);
    assert!(names.contains(&"Hiatus".to_string()));
    assert_eq!(names.len(), 4);
}

#[tokio::test]
async fn test_empty_library() {
    let app = TestApp::new().await;

    let response = app.server().get("/api/coming").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["episodes"], json!([]));
}

// =============================================================================
// Settings Tests
// =============================================================================

#[tokio::test]
async fn test_toggle_paused_persists() {
    let app = TestApp::new().await;
    seed_library(&app).await;

    let response = app.server().post("/api/coming/toggle-paused").await;
    response.assert_status_ok();
    let settings: serde_json::Value = response.json();
    assert_eq!(settings["display_paused"], true);

    let body: serde_json::Value = app.server().get("/api/coming").await.json();
    assert_eq!(show_names(&body).len(), 4);

    let settings: serde_json::Value = app
        .server()
        .post("/api/coming/toggle-paused")
        .await
        .json();
    assert_eq!(settings["display_paused"], false);
}

#[tokio::test]
async fn test_set_sort_persists() {
    let app = TestApp::new().await;
    seed_library(&app).await;

    let response = app
        .server()
        .post("/api/coming/sort")
        .json(&json!({ "sort": "network" }))
        .await;
    response.assert_status_ok();

    let settings: serde_json::Value = app.server().get("/api/coming/settings").await.json();
    assert_eq!(settings["sort"], "network");
    assert_eq!(settings["missed_range_days"], 7);

    let body: serde_json::Value = app.server().get("/api/coming").await.json();
    assert_eq!(body["sort"], "network");

    let activity: serde_json::Value = app.server().get("/api/activity?limit=1").await.json();
    assert_eq!(activity[0]["event_type"], "settings_changed");
}

// =============================================================================
// Calendar Tests
// =============================================================================

#[tokio::test]
async fn test_calendar_feed() {
    let app = TestApp::new().await;
    seed_library(&app).await;

    let response = app.server().get("/calendar").await;

    response.assert_status_ok();
    assert_eq!(
        response.header("content-type"),
        "text/calendar; charset=utf-8"
    );
    let body = response.text();
    assert!(body.starts_with("BEGIN:VCALENDAR\r\n"));
    assert!(body.trim_end().ends_with("END:VCALENDAR"));
    assert!(body.contains("UID:1-1-1@airdate"));
    assert!(body.contains("SUMMARY:The Office: Episode 1x1"));
    // paused shows are left out of the feed
    assert!(!body.contains("Hiatus"));
}

// =============================================================================
// Health Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;

    let response = app.server().get("/health").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Airdate is running");
}
