use std::{
    collections::HashSet,
    fmt,
    fs::File,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::{NaiveDate, TimeZone, Utc};
use cucumber::{given, then, when, World as _};
use plann::{
    config::{AppConfig, MailTransport},
    db::{init_pool, run_migrations, DbPool},
    error::AppError,
    models::{participant::Participant, trip::Trip},
    routes::create_router,
    services::{
        mail::{MailReceipt, Mailer, OutgoingEmail},
        trips::{SqliteTripStore, TripStore},
    },
    state::AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    trip: Option<Trip>,
    guests: Vec<Participant>,
    response: Option<CapturedResponse>,
}

#[derive(Debug)]
struct CapturedResponse {
    status: StatusCode,
    location: Option<String>,
    body: serde_json::Value,
}

impl AppWorld {
    fn test_state(&self) -> &TestState {
        self.state.as_ref().expect("state must be initialised first")
    }

    fn trip(&self) -> &Trip {
        self.trip.as_ref().expect("a trip must be created first")
    }

    fn response(&self) -> &CapturedResponse {
        self.response
            .as_ref()
            .expect("a request must be sent first")
    }

    async fn add_participant(&mut self, email: String, is_owner: bool) {
        let participant = Participant {
            id: Uuid::new_v4(),
            name: None,
            email,
            is_confirmed: is_owner,
            is_owner,
            trip_id: self.trip().id,
        };
        sqlx::query(
            "INSERT INTO participants (id, name, email, is_confirmed, is_owner, trip_id) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(participant.id.to_string())
        .bind(&participant.name)
        .bind(&participant.email)
        .bind(participant.is_confirmed)
        .bind(participant.is_owner)
        .bind(participant.trip_id.to_string())
        .execute(&self.test_state().db)
        .await
        .expect("insert participant");
        if !is_owner {
            self.guests.push(participant);
        }
    }

    async fn request(&mut self, uri: String) {
        let router = create_router(self.test_state().app.clone());
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .expect("router call");

        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };

        self.response = Some(CapturedResponse {
            status,
            location,
            body,
        });
    }
}

/// Mail transport that remembers what it delivered.
#[derive(Default)]
struct RecordingMailer {
    delivered: Mutex<Vec<OutgoingEmail>>,
    rejected: Mutex<HashSet<String>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<MailReceipt, AppError> {
        if self.rejected.lock().unwrap().contains(&email.to) {
            return Err(AppError::Mail(format!("mailbox {} unavailable", email.to)));
        }
        let mut delivered = self.delivered.lock().unwrap();
        delivered.push(email.clone());
        Ok(MailReceipt {
            message_id: format!("<{}@bdd>", delivered.len()),
        })
    }
}

/// Counts successful confirmation writes on top of the real store.
struct CountingStore {
    inner: SqliteTripStore,
    writes: AtomicUsize,
}

#[async_trait]
impl TripStore for CountingStore {
    async fn find_with_guests(&self, trip_id: Uuid) -> Result<Option<Trip>, AppError> {
        self.inner.find_with_guests(trip_id).await
    }

    async fn mark_confirmed(&self, trip_id: Uuid) -> Result<bool, AppError> {
        let written = self.inner.mark_confirmed(trip_id).await?;
        if written {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(written)
    }
}

struct TestState {
    app: AppState,
    db: DbPool,
    store: Arc<CountingStore>,
    mailer: Arc<RecordingMailer>,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let db_path = root.path().join("bdd.sqlite");
        File::create(&db_path)?;
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            api_base_url: "http://localhost:3333".into(),
            web_base_url: "http://localhost:3000".into(),
            mail_transport: MailTransport::Log,
            mail_from_name: "Equipe plann.er".into(),
            mail_from_address: "oi@plann.er".into(),
        };

        let db = init_pool(&config.database_url).await?;
        run_migrations(&db).await?;

        let store = Arc::new(CountingStore {
            inner: SqliteTripStore::new(db.clone()),
            writes: AtomicUsize::new(0),
        });
        let mailer = Arc::new(RecordingMailer::default());
        let app = AppState::with_store(config, store.clone(), mailer.clone());

        Ok(Self {
            app,
            db,
            store,
            mailer,
            _root: root,
        })
    }

    fn delivered(&self) -> Vec<OutgoingEmail> {
        self.mailer.delivered.lock().unwrap().clone()
    }
}

fn midnight(date: &str) -> chrono::DateTime<Utc> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("date as YYYY-MM-DD");
    Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap())
}

#[given("a fresh application state")]
async fn given_fresh_state(world: &mut AppWorld) {
    world.state = Some(TestState::new().await.expect("state"));
    world.trip = None;
    world.guests.clear();
    world.response = None;
}

#[given(regex = r#"^a trip to "([^"]+)" from "([^"]+)" to "([^"]+)"$"#)]
async fn given_trip(world: &mut AppWorld, destination: String, starts: String, ends: String) {
    let trip = Trip {
        id: Uuid::new_v4(),
        destination,
        starts_at: midnight(&starts),
        ends_at: midnight(&ends),
        is_confirmed: false,
        participants: Vec::new(),
    };
    sqlx::query(
        "INSERT INTO trips (id, destination, starts_at, ends_at, is_confirmed) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(trip.id.to_string())
    .bind(&trip.destination)
    .bind(trip.starts_at)
    .bind(trip.ends_at)
    .bind(trip.is_confirmed)
    .execute(&world.test_state().db)
    .await
    .expect("insert trip");
    world.trip = Some(trip);
}

#[given(regex = r#"^a guest "([^"]+)"$"#)]
async fn given_guest(world: &mut AppWorld, email: String) {
    world.add_participant(email, false).await;
}

#[given(regex = r#"^the owner "([^"]+)"$"#)]
async fn given_owner(world: &mut AppWorld, email: String) {
    world.add_participant(email, true).await;
}

#[given("the trip is already confirmed")]
async fn given_confirmed(world: &mut AppWorld) {
    let trip_id = world.trip().id;
    let written = world
        .test_state()
        .store
        .inner
        .mark_confirmed(trip_id)
        .await
        .expect("confirm trip");
    assert!(written);
}

#[given(regex = r#"^the mail transport rejects "([^"]+)"$"#)]
async fn given_rejecting_mailer(world: &mut AppWorld, email: String) {
    world
        .test_state()
        .mailer
        .rejected
        .lock()
        .unwrap()
        .insert(email);
}

#[when("I confirm the trip")]
async fn when_confirm_trip(world: &mut AppWorld) {
    let trip_id = world.trip().id;
    let participant_id = world
        .guests
        .first()
        .map(|guest| guest.id)
        .unwrap_or_else(Uuid::new_v4);
    world
        .request(format!("/trips/{trip_id}/confirm/{participant_id}"))
        .await;
}

#[when("I confirm an unknown trip")]
async fn when_confirm_unknown(world: &mut AppWorld) {
    world
        .request(format!(
            "/trips/{}/confirm/{}",
            Uuid::new_v4(),
            Uuid::new_v4()
        ))
        .await;
}

#[when(regex = r#"^I request "([^"]+)"$"#)]
async fn when_request(world: &mut AppWorld, uri: String) {
    world.request(uri).await;
}

#[then("I am redirected to the trip page")]
async fn then_redirected(world: &mut AppWorld) {
    let expected = format!("http://localhost:3000/trips/{}", world.trip().id);
    let response = world.response();
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.location.as_deref(), Some(expected.as_str()));
}

#[then(regex = r"^the response status is (\d+)$")]
async fn then_status(world: &mut AppWorld, status: u16) {
    assert_eq!(world.response().status.as_u16(), status);
}

#[then(regex = r#"^the response message is "([^"]+)"$"#)]
async fn then_message(world: &mut AppWorld, message: String) {
    assert_eq!(world.response().body["message"], message.as_str());
}

#[then(regex = r#"^the response lists a field error for "([^"]+)"$"#)]
async fn then_field_error(world: &mut AppWorld, field: String) {
    let errors = &world.response().body["erro"][field.as_str()];
    assert!(
        errors.as_array().is_some_and(|items| !items.is_empty()),
        "expected field errors for {field}, got {errors}"
    );
}

#[then("the trip is confirmed")]
async fn then_trip_confirmed(world: &mut AppWorld) {
    let trip = world
        .test_state()
        .store
        .inner
        .find_with_guests(world.trip().id)
        .await
        .expect("load trip")
        .expect("trip exists");
    assert!(trip.is_confirmed);
}

#[then(regex = r"^(\d+) emails? (?:was|were) sent$")]
async fn then_email_count(world: &mut AppWorld, count: usize) {
    assert_eq!(world.test_state().delivered().len(), count);
}

#[then(regex = r#"^an email was sent to "([^"]+)"$"#)]
async fn then_email_to(world: &mut AppWorld, email: String) {
    let delivered = world.test_state().delivered();
    assert_eq!(
        delivered.iter().filter(|message| message.to == email).count(),
        1
    );
}

#[then(regex = r#"^no email was sent to "([^"]+)"$"#)]
async fn then_no_email_to(world: &mut AppWorld, email: String) {
    let delivered = world.test_state().delivered();
    assert!(delivered.iter().all(|message| message.to != email));
}

#[then("each email links to its own confirmation page")]
async fn then_links(world: &mut AppWorld) {
    let delivered = world.test_state().delivered();
    let trip_id = world.trip().id;
    for guest in &world.guests {
        let link = format!("http://localhost:3333/trips/{trip_id}/confirm/{}", guest.id);
        let message = delivered
            .iter()
            .find(|message| message.to == guest.email)
            .expect("guest received an email");
        assert!(message.html.contains(&link));
    }
}

#[then(regex = r"^the store recorded (\d+) confirmation writes?$")]
async fn then_writes(world: &mut AppWorld, count: usize) {
    assert_eq!(
        world.test_state().store.writes.load(Ordering::SeqCst),
        count
    );
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}
