use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tracing::{error, info, warn};

use crate::{
    config::TimesheetConfig,
    engine::{MemberTotals, TimesheetEngine},
    errors::{TimesheetError, TimesheetResult},
    helpers::{
        email::{Mailer, PayEmail},
        geocode::Geocoder,
        pdf::{CaptureOptions, PdfRenderer, ReportRenderer},
        store::{Collection, OrderedWrites, SnapshotSink, StateStore, StoreUpdate, Subscription},
        timers::{CountdownPhase, Countdowns, Notices},
    },
    models::{
        hours::{CellChoice, ConfirmedSetAll, HoursGrid, SetAllPreview, SetAllRequest},
        location::{Location, LocationMap, PlaceCandidate},
        report::{MemberActivity, PickerOptions, ReportView, ViewMode},
        snapshot::RemoteState,
    },
};

pub const NOTICE_EMAIL_SENT: &str = "✉️ Email enviado con éxito!";
pub const NOTICE_EMAIL_FAILED: &str = "⚠️ Error al enviar email";

const MOBILE_SETTLE_DELAY: Duration = Duration::from_millis(350);

/// Local mirror of the two shared collections.
#[derive(Debug, Default)]
struct Board {
    hours: RemoteState<HoursGrid>,
    locations: RemoteState<LocationMap>,
    online: bool,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EmailStart {
    Started { seconds: u32 },
    AlreadyRunning,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MemberStatus {
    pub member: String,
    pub countdown: CountdownPhase,
    pub notice: Option<String>,
    pub email_configured: bool,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportProfile {
    #[default]
    Desktop,
    /// Small screens: capture the expanded export view after a settle delay.
    Mobile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Owns the board state and its collaborators: the shared store, the
/// geocoder, the mailer and the report renderer.
pub struct TimesheetService<S, G, M> {
    engine: TimesheetEngine,
    board: Arc<RwLock<Board>>,
    store: Arc<S>,
    writes: OrderedWrites<S>,
    geocoder: G,
    mailer: Arc<M>,
    renderer: Arc<dyn ReportRenderer>,
    countdowns: Countdowns,
    notices: Arc<Notices>,
    subscriptions: Mutex<Vec<Subscription>>,
    exporting: AtomicBool,
}

impl<S, G, M> TimesheetService<S, G, M>
where
    S: StateStore,
    G: Geocoder,
    M: Mailer,
{
    pub fn new(config: TimesheetConfig, store: S, geocoder: G, mailer: M) -> Self {
        info!(
            "Creating new TimesheetService for {} members",
            config.roster.len()
        );
        let store = Arc::new(store);
        Self {
            engine: TimesheetEngine::new(Arc::new(config)),
            board: Arc::new(RwLock::new(Board::default())),
            writes: OrderedWrites::new(Arc::clone(&store)),
            store,
            geocoder,
            mailer: Arc::new(mailer),
            renderer: Arc::new(PdfRenderer),
            countdowns: Countdowns::default(),
            notices: Arc::new(Notices::default()),
            subscriptions: Mutex::new(Vec::new()),
            exporting: AtomicBool::new(false),
        }
    }

    pub fn with_renderer(mut self, renderer: impl ReportRenderer) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn engine(&self) -> &TimesheetEngine {
        &self.engine
    }

    pub fn config(&self) -> &TimesheetConfig {
        self.engine.config()
    }

    /// Subscribes to both collections. Every snapshot replaces local state.
    /// Does nothing when already connected.
    pub fn connect(&self) {
        let mut subscriptions = lock(&self.subscriptions);
        if !subscriptions.is_empty() {
            warn!("TimesheetService is already connected");
            return;
        }

        let roster = self.config().roster.clone();
        let board = Arc::clone(&self.board);
        let hours_sink: SnapshotSink = Arc::new(move |update: StoreUpdate| match update {
            StoreUpdate::Snapshot(Some(value)) => {
                let grid = HoursGrid::from_snapshot(value);
                info!("Received hours snapshot for {} members", grid.0.len());
                let mut board = write_board(&board);
                board.hours = RemoteState::Loaded(grid);
                board.online = true;
            }
            StoreUpdate::Snapshot(None) => {
                info!(
                    "Hours collection is empty, starting with a blank grid for {} members",
                    roster.len()
                );
                write_board(&board).hours = RemoteState::Empty;
            }
            StoreUpdate::Error(e) => {
                warn!("Lost connection to hours collection: {}", e);
                write_board(&board).online = false;
            }
        });

        let board = Arc::clone(&self.board);
        let locations_sink: SnapshotSink = Arc::new(move |update: StoreUpdate| match update {
            StoreUpdate::Snapshot(Some(value)) => {
                let locations = LocationMap::from_snapshot(value);
                info!("Received {} tagged locations", locations.0.len());
                write_board(&board).locations = RemoteState::Loaded(locations);
            }
            StoreUpdate::Snapshot(None) => {
                write_board(&board).locations = RemoteState::Empty;
            }
            StoreUpdate::Error(e) => {
                warn!("Lost connection to locations collection: {}", e);
            }
        });

        subscriptions.push(self.store.subscribe(Collection::Hours, hours_sink));
        subscriptions.push(self.store.subscribe(Collection::Locations, locations_sink));
        info!("Subscribed to {} and {}", Collection::Hours, Collection::Locations);
    }

    /// Unsubscribes and cancels every outstanding countdown and notice.
    pub fn shutdown(&self) {
        info!("Shutting down TimesheetService");
        lock(&self.subscriptions).clear();
        self.countdowns.cancel_all();
        self.notices.cancel_all();
    }

    pub fn is_online(&self) -> bool {
        read_board(&self.board).online
    }

    pub fn hours_state(&self) -> RemoteState<HoursGrid> {
        read_board(&self.board).hours.clone()
    }

    pub fn locations_state(&self) -> RemoteState<LocationMap> {
        read_board(&self.board).locations.clone()
    }

    /// The grid as currently shown; a blank map per member until the store
    /// delivers something.
    pub fn hours(&self) -> HoursGrid {
        let board = read_board(&self.board);
        match &board.hours {
            RemoteState::Loaded(grid) => grid.clone(),
            _ => HoursGrid::empty_for(&self.config().roster),
        }
    }

    pub fn locations(&self) -> LocationMap {
        read_board(&self.board).locations.current()
    }

    pub fn totals(&self) -> Vec<MemberTotals> {
        self.engine.member_totals(&self.hours())
    }

    pub fn report(&self, mode: ViewMode) -> ReportView {
        let grid = self.hours();
        let locations = self.locations();
        ReportView::build(
            &self.engine,
            &grid,
            &locations,
            self.is_online(),
            mode,
            |member| MemberActivity {
                phase: self.countdowns.phase(member),
                notice: self.notices.get(member),
            },
        )
    }

    /// Stores the literal text typed into a cell.
    pub fn set_cell(&self, member: &str, day: &str, value: &str) -> TimesheetResult<MemberTotals> {
        self.ensure_member(member)?;
        self.ensure_day(day)?;

        let grid = self.update_hours(|grid| grid.set(member, day, value.to_string()));
        Ok(self.engine.member_total(&grid, member))
    }

    /// Applies a picker choice to one cell.
    pub fn pick_cell(
        &self,
        member: &str,
        day: &str,
        choice: &CellChoice,
    ) -> TimesheetResult<MemberTotals> {
        self.ensure_member(member)?;
        self.ensure_day(day)?;

        let grid = self.update_hours(|grid| grid.set(member, day, choice.cell_value()));
        Ok(self.engine.member_total(&grid, member))
    }

    pub fn preview_set_all(&self, request: &SetAllRequest) -> TimesheetResult<SetAllPreview> {
        self.ensure_day(&request.day)?;
        Ok(request.preview(&self.config().roster))
    }

    /// Writes one value for every member on one day.
    pub fn set_all(&self, confirmed: ConfirmedSetAll) -> TimesheetResult<Vec<MemberTotals>> {
        let request = confirmed.request();
        self.ensure_day(&request.day)?;

        info!(
            "Setting '{}' for every member on {}",
            request.choice.cell_value(),
            request.day
        );

        let grid = self.update_hours(|grid| *grid = self.engine.apply_set_all(grid, &confirmed));
        Ok(self.engine.member_totals(&grid))
    }

    /// Tags `day` with a point, named by reverse geocoding when possible.
    pub async fn set_location(&self, day: &str, lat: f64, lng: f64) -> TimesheetResult<Location> {
        self.ensure_day(day)?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(TimesheetError::InvalidCoordinates { lat, lng });
        }

        let name = match self.geocoder.reverse(lat, lng).await {
            Some(name) => name,
            None => {
                warn!("Reverse geocoding failed for {}, {}, using coordinates", lat, lng);
                Location::fallback_name(lat, lng)
            }
        };
        let location = Location { lat, lng, name };

        let snapshot = {
            let mut board = write_board(&self.board);
            let mut locations = board.locations.current();
            locations.set(day, location.clone());
            let snapshot = locations.to_snapshot();
            board.locations = RemoteState::Loaded(locations);
            snapshot
        };
        self.push(Collection::Locations, snapshot);

        info!("Tagged {} with '{}'", day, location.name);
        Ok(location)
    }

    pub async fn search_places(&self, query: &str) -> Vec<PlaceCandidate> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        self.geocoder.search(query).await
    }

    /// Starts the countdown that emails `member` their pay summary.
    ///
    /// The figures are taken now; edits made during the countdown are not
    /// included.
    pub fn start_email(&self, member: &str) -> TimesheetResult<EmailStart> {
        self.ensure_member(member)?;

        let Some(recipient) = self.config().recipient(member) else {
            warn!("No email configured for {}", member);
            return Err(TimesheetError::MissingRecipient(member.to_string()));
        };

        let summary = self.engine.pay_summary(&self.hours(), member);
        let email = PayEmail::new(recipient, &summary);
        let mailer = Arc::clone(&self.mailer);
        let notices = Arc::clone(&self.notices);
        let subject = member.to_string();

        let started = self.countdowns.start(member, move || async move {
            match mailer.send(&email).await {
                Ok(id) => {
                    info!("Pay summary for {} sent, id {}", subject, id);
                    notices.post(&subject, NOTICE_EMAIL_SENT);
                }
                Err(e) => {
                    error!("Error sending pay summary to {}: {}", subject, e);
                    notices.post(&subject, NOTICE_EMAIL_FAILED);
                }
            }
        });

        Ok(match self.countdowns.phase(member) {
            CountdownPhase::Counting(seconds) if started => EmailStart::Started { seconds },
            _ if started => EmailStart::Started { seconds: 0 },
            _ => EmailStart::AlreadyRunning,
        })
    }

    pub fn member_status(&self, member: &str) -> TimesheetResult<MemberStatus> {
        self.ensure_member(member)?;
        Ok(MemberStatus {
            member: member.to_string(),
            countdown: self.countdowns.phase(member),
            notice: self.notices.get(member),
            email_configured: self.config().recipient(member).is_some(),
        })
    }

    /// Renders the report to a downloadable file. Only one export runs at a
    /// time.
    pub async fn export(&self, profile: ExportProfile) -> TimesheetResult<ExportFile> {
        if self
            .exporting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TimesheetError::ExportInProgress);
        }
        let _guard = ExportGuard(&self.exporting);

        info!("Exporting report ({:?})", profile);

        let view = match profile {
            ExportProfile::Desktop => self.report(ViewMode::Interactive),
            ExportProfile::Mobile => {
                tokio::time::sleep(MOBILE_SETTLE_DELAY).await;
                self.report(ViewMode::Export)
            }
        };

        let renderer = Arc::clone(&self.renderer);
        let options = CaptureOptions::default();
        let bytes = tokio::task::spawn_blocking(move || renderer.render(&view, &options))
            .await
            .map_err(|e| TimesheetError::Render(e.to_string()))??;

        let extension = self.renderer.file_extension();
        Ok(ExportFile {
            filename: format!(
                "Orchard_Report_{}.{}",
                Local::now().format("%d-%m-%Y"),
                extension
            ),
            content_type: content_type_for(extension),
            bytes,
        })
    }

    /// Read-modify-write of the whole grid, then a full push to the store.
    fn update_hours<F>(&self, edit: F) -> HoursGrid
    where
        F: FnOnce(&mut HoursGrid),
    {
        let grid = {
            let mut board = write_board(&self.board);
            let mut grid = match &board.hours {
                RemoteState::Loaded(grid) => grid.clone(),
                _ => HoursGrid::empty_for(&self.config().roster),
            };
            edit(&mut grid);
            board.hours = RemoteState::Loaded(grid.clone());
            grid
        };

        self.push(Collection::Hours, grid.to_snapshot());
        grid
    }

    /// Fire-and-forget write; failures are only logged. Writes of one
    /// collection reach the store in the order they were made.
    fn push(&self, collection: Collection, value: serde_json::Value) {
        self.writes.enqueue(collection, value);
    }

    fn ensure_member(&self, member: &str) -> TimesheetResult<()> {
        if self.config().is_member(member) {
            Ok(())
        } else {
            Err(TimesheetError::UnknownMember(member.to_string()))
        }
    }

    fn ensure_day(&self, day: &str) -> TimesheetResult<()> {
        if self.config().calendar.contains(day) {
            Ok(())
        } else {
            Err(TimesheetError::UnknownDay(day.to_string()))
        }
    }

    /// Create an Axum router for the timesheet service
    pub fn router(self) -> Router {
        info!("Creating timesheet service router");
        let shared_state = Arc::new(self);

        Router::new()
            .route("/health", get(|| async { "OK" }))
            .route("/report", get(report::<S, G, M>))
            .route("/totals", get(totals::<S, G, M>))
            .route("/options", get(options))
            .route("/hours/{member}/{day}", put(set_cell::<S, G, M>))
            .route("/hours/{member}/{day}/pick", post(pick_cell::<S, G, M>))
            .route("/days/{day}/set-all", post(set_all::<S, G, M>))
            .route("/locations/search", get(search_places::<S, G, M>))
            .route("/locations/{day}", put(set_location::<S, G, M>))
            .route("/members/{member}/email", post(start_email::<S, G, M>))
            .route("/members/{member}/status", get(member_status::<S, G, M>))
            .route("/export", get(export::<S, G, M>))
            .with_state(shared_state)
    }
}

struct ExportGuard<'a>(&'a AtomicBool);

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "pdf" => "application/pdf",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_board(board: &RwLock<Board>) -> RwLockReadGuard<'_, Board> {
    board.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_board(board: &RwLock<Board>) -> RwLockWriteGuard<'_, Board> {
    board.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// Route handlers
type Shared<S, G, M> = State<Arc<TimesheetService<S, G, M>>>;

#[derive(Deserialize, Default)]
struct ReportQuery {
    #[serde(default)]
    mode: ViewMode,
}

#[derive(Deserialize)]
struct CellInput {
    value: String,
}

#[derive(Deserialize)]
struct ChoiceInput {
    choice: String,
    #[serde(default)]
    confirm: bool,
}

#[derive(Deserialize)]
struct PointInput {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Deserialize, Default)]
struct ExportQuery {
    #[serde(default)]
    profile: ExportProfile,
}

async fn report<S: StateStore, G: Geocoder, M: Mailer>(
    State(service): Shared<S, G, M>,
    Query(query): Query<ReportQuery>,
) -> Json<ReportView> {
    Json(service.report(query.mode))
}

async fn totals<S: StateStore, G: Geocoder, M: Mailer>(
    State(service): Shared<S, G, M>,
) -> Json<Vec<MemberTotals>> {
    Json(service.totals())
}

async fn options() -> Json<PickerOptions> {
    Json(PickerOptions::standard())
}

async fn set_cell<S: StateStore, G: Geocoder, M: Mailer>(
    State(service): Shared<S, G, M>,
    Path((member, day)): Path<(String, String)>,
    Json(input): Json<CellInput>,
) -> TimesheetResult<Json<MemberTotals>> {
    info!("Cell edit for {} on {}", member, day);
    service.set_cell(&member, &day, &input.value).map(Json)
}

async fn pick_cell<S: StateStore, G: Geocoder, M: Mailer>(
    State(service): Shared<S, G, M>,
    Path((member, day)): Path<(String, String)>,
    Json(input): Json<ChoiceInput>,
) -> TimesheetResult<Json<MemberTotals>> {
    let choice: CellChoice = input.choice.parse()?;
    service.pick_cell(&member, &day, &choice).map(Json)
}

async fn set_all<S: StateStore, G: Geocoder, M: Mailer>(
    State(service): Shared<S, G, M>,
    Path(day): Path<String>,
    Json(input): Json<ChoiceInput>,
) -> TimesheetResult<Json<Vec<MemberTotals>>> {
    let request = SetAllRequest::new(day, input.choice.parse()?);
    let preview = service.preview_set_all(&request)?;

    if !input.confirm {
        info!("Set-all for {} awaiting confirmation", preview.day);
        return Err(TimesheetError::ConfirmationRequired(preview));
    }

    service.set_all(request.confirm()).map(Json)
}

async fn set_location<S: StateStore, G: Geocoder, M: Mailer>(
    State(service): Shared<S, G, M>,
    Path(day): Path<String>,
    Json(point): Json<PointInput>,
) -> TimesheetResult<Json<Location>> {
    service.set_location(&day, point.lat, point.lng).await.map(Json)
}

async fn search_places<S: StateStore, G: Geocoder, M: Mailer>(
    State(service): Shared<S, G, M>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<PlaceCandidate>> {
    Json(service.search_places(&query.q).await)
}

async fn start_email<S: StateStore, G: Geocoder, M: Mailer>(
    State(service): Shared<S, G, M>,
    Path(member): Path<String>,
) -> TimesheetResult<(StatusCode, Json<EmailStart>)> {
    let outcome = service.start_email(&member)?;
    let status = match outcome {
        EmailStart::Started { .. } => StatusCode::ACCEPTED,
        EmailStart::AlreadyRunning => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

async fn member_status<S: StateStore, G: Geocoder, M: Mailer>(
    State(service): Shared<S, G, M>,
    Path(member): Path<String>,
) -> TimesheetResult<Json<MemberStatus>> {
    service.member_status(&member).map(Json)
}

async fn export<S: StateStore, G: Geocoder, M: Mailer>(
    State(service): Shared<S, G, M>,
    Query(query): Query<ExportQuery>,
) -> TimesheetResult<Response> {
    let file = service.export(query.profile).await?;
    info!("Serving export {} ({} bytes)", file.filename, file.bytes.len());

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.bytes,
    )
        .into_response())
}
