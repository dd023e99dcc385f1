use chrono::NaiveDate;
use reqwest::{RequestBuilder, Response, header};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use orchard_timesheet::{
    TimesheetConfig, TimesheetService,
    config::PayRates,
    helpers::{
        email::{MailError, Mailer, PayEmail},
        geocode::Geocoder,
        store::{Collection, MemoryStore},
    },
    models::{calendar::Calendar, location::PlaceCandidate},
};

struct NoGeocoder;

impl Geocoder for NoGeocoder {
    async fn reverse(&self, _lat: f64, _lon: f64) -> Option<String> {
        None
    }

    async fn search(&self, _query: &str) -> Vec<PlaceCandidate> {
        Vec::new()
    }
}

struct NoMailer;

impl Mailer for NoMailer {
    async fn send(&self, _email: &PayEmail) -> Result<String, MailError> {
        Ok("ok".to_string())
    }
}

async fn spawn_app(store: MemoryStore) -> String {
    let start = NaiveDate::from_ymd_opt(2026, 1, 19).unwrap();
    let end = NaiveDate::from_ymd_opt(2026, 1, 25).unwrap();
    let config = TimesheetConfig::new(
        vec!["A".to_string(), "B".to_string()],
        Calendar::new(start, end).unwrap(),
        PayRates::default(),
    );

    let service = TimesheetService::new(config, store, NoGeocoder, NoMailer);
    service.connect();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, service.router()).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn send_json(request: RequestBuilder, body: Value) -> Response {
    request
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

async fn read_json(response: Response) -> Value {
    serde_json::from_str(&response.text().await.unwrap()).unwrap()
}

#[tokio::test]
async fn cell_edit_returns_member_totals() {
    let store = MemoryStore::new();
    let base = spawn_app(store.clone()).await;
    let client = reqwest::Client::new();

    let response = send_json(
        client.put(format!("{}/hours/A/19%20ene", base)),
        json!({ "value": "7:45" }),
    )
    .await;
    assert_eq!(response.status(), 200);

    let body = read_json(response).await;
    assert_eq!(body["member"], "A");
    assert_eq!(body["grand_total"], "7.75");
}

#[tokio::test]
async fn set_all_needs_confirmation() {
    let base = spawn_app(MemoryStore::new()).await;
    let client = reqwest::Client::new();
    let url = format!("{}/days/20%20ene/set-all", base);

    let response = send_json(client.post(&url), json!({ "choice": "rain" })).await;
    assert_eq!(response.status(), 428);
    let body = read_json(response).await;
    assert_eq!(body["preview"]["members"], json!(["A", "B"]));

    let response = send_json(
        client.post(&url),
        json!({ "choice": "8", "confirm": true }),
    )
    .await;
    assert_eq!(response.status(), 200);
    let body = read_json(response).await;
    assert_eq!(body[1]["grand_total"], "8.00");
}

#[tokio::test]
async fn errors_map_to_statuses() {
    let base = spawn_app(MemoryStore::new()).await;
    let client = reqwest::Client::new();

    let unknown = send_json(
        client.put(format!("{}/hours/Zed/19%20ene", base)),
        json!({ "value": "8" }),
    )
    .await;
    assert_eq!(unknown.status(), 404);

    let bad_choice = send_json(
        client.post(format!("{}/hours/A/19%20ene/pick", base)),
        json!({ "choice": "13" }),
    )
    .await;
    assert_eq!(bad_choice.status(), 400);

    let no_recipient = client
        .post(format!("{}/members/B/email", base))
        .send()
        .await
        .unwrap();
    assert_eq!(no_recipient.status(), 400);
}

#[tokio::test]
async fn report_and_export_are_served() {
    let store = MemoryStore::with_value(Collection::Hours, json!({ "A": { "19 ene": "8" } }));
    let base = spawn_app(store).await;
    let client = reqwest::Client::new();

    let report = read_json(
        client
            .get(format!("{}/report?mode=export", base))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(report["title"], "Orchard TEAM");
    assert_eq!(report["layout_width"], 1200);
    assert_eq!(report["weeks"][0]["rows"][0]["week_total"], "8.00");

    let export = client.get(format!("{}/export", base)).send().await.unwrap();
    assert_eq!(export.status(), 200);
    assert_eq!(export.headers()["content-type"], "application/pdf");
    let disposition = export.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("Orchard_Report_"));
    assert!(export.bytes().await.unwrap().starts_with(b"%PDF"));
}
