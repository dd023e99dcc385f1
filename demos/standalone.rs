use anyhow::Context;
use resend_rs::Resend;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use orchard_timesheet::{
    TimesheetConfig, TimesheetService,
    helpers::{
        email::{EmailJsMailer, MailError, Mailer, PayEmail, ResendMailer},
        firebase::{FirebaseStore, firebase_client_init},
        geocode::{NominatimClient, nominatim_client_init},
        store::{Collection, MemoryStore, SnapshotSink, StateStore, StoreError, Subscription},
    },
};

/// Firebase when a database URL is configured, otherwise an in-process store.
enum Store {
    Firebase(FirebaseStore),
    Memory(MemoryStore),
}

impl StateStore for Store {
    fn subscribe(&self, collection: Collection, sink: SnapshotSink) -> Subscription {
        match self {
            Store::Firebase(store) => store.subscribe(collection, sink),
            Store::Memory(store) => store.subscribe(collection, sink),
        }
    }

    async fn write(&self, collection: Collection, value: Value) -> Result<(), StoreError> {
        match self {
            Store::Firebase(store) => store.write(collection, value).await,
            Store::Memory(store) => store.write(collection, value).await,
        }
    }
}

enum Mail {
    Resend(ResendMailer),
    EmailJs(EmailJsMailer),
}

impl Mailer for Mail {
    async fn send(&self, email: &PayEmail) -> Result<String, MailError> {
        match self {
            Mail::Resend(mailer) => mailer.send(email).await,
            Mail::EmailJs(mailer) => mailer.send(email).await,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting Orchard TEAM timesheet service");

    let config = TimesheetConfig::from_env().context("loading configuration")?;

    // Initialize services
    let store = match &config.store_url {
        Some(url) => {
            let client = firebase_client_init()?;
            Store::Firebase(FirebaseStore::new(client, url, config.store_auth.clone()))
        }
        None => {
            warn!("ORCHARD_STORE_URL is not set, hours will only live in memory");
            Store::Memory(MemoryStore::new())
        }
    };

    let geocoder = NominatimClient::new(
        nominatim_client_init("orchard-timesheet/0.1")?,
        config.nominatim_url.clone(),
    );

    let mailer = match &config.resend_api_key {
        Some(key) => Mail::Resend(ResendMailer::new(
            Resend::new(key),
            config.mail_from.clone(),
            config.rates.clone(),
        )),
        None => Mail::EmailJs(EmailJsMailer::new(
            reqwest::Client::new(),
            config.emailjs.clone(),
        )),
    };

    let bind_addr = config.bind_addr.clone();

    // Create the timesheet service
    let service = TimesheetService::new(config, store, geocoder, mailer);
    service.connect();

    let app = service.router();

    // Start server
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    info!("Server running on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/*
Example usage of the service:

1. GET /report?mode=interactive|export
   - The board as rendered: weeks, cells, totals, pay cards

2. PUT /hours/{member}/{day}            {"value": "7,5"}
   POST /hours/{member}/{day}/pick      {"choice": "rain"}
   POST /days/{day}/set-all             {"choice": "8", "confirm": true}

3. PUT /locations/{day}                 {"lat": -39.64, "lng": 176.84}
   GET /locations/search?q=Hastings

4. POST /members/{member}/email
   - Starts the 5 second countdown, then emails the pay summary

5. GET /export?profile=desktop|mobile
   - Downloads Orchard_Report_<dd-mm-yyyy>.pdf
*/
