//! HTTP surface: attendance endpoints, class roster reads, permission
//! administration and the live dashboard socket.
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::attendance::{
    AdjustState, AttendanceService, Clock, CreateSession, DashboardSummary, RecordView,
    SessionView,
};
use crate::authz::catalog::{
    self, ACT_MANAGE_INSTRUCTORS, ACT_MANAGE_LEARNERS, ACT_TAKE_ATTENDANCE, ACT_VIEW, ACT_VIEW_ALL,
    OBJ_ATTENDANCE, OBJ_CLASS,
};
use crate::authz::web::{authenticate, require, require_gate, resolve_user, CurrentUser};
use crate::authz::{gates, Enforcer};
use crate::dashboard::{DashboardHub, Subscription};
use crate::entities::class;
use crate::errors::AppError;
use crate::report::PdfReportRenderer;
use crate::settings::Settings;
use crate::storage;
use crate::token::TokenVerifier;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: DatabaseConnection,
    pub enforcer: Enforcer,
    pub tokens: TokenVerifier,
    pub attendance: AttendanceService,
    pub hub: Arc<DashboardHub>,
}

impl AppState {
    /// Wires the services around an initialized database.
    pub async fn build(
        settings: Settings,
        db: DatabaseConnection,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let offset = settings
            .utc_offset()
            .map_err(|e| AppError::validation("attendance.utc_offset_minutes", e.to_string()))?;
        let enforcer = Enforcer::load(db.clone()).await?;
        if settings.authz.seed_defaults {
            catalog::seed_role_permissions(&enforcer).await?;
        }
        let tokens = TokenVerifier::new(&settings.auth)?;
        let hub = Arc::new(DashboardHub::new(settings.attendance.subscriber_queue));
        let renderer = Arc::new(PdfReportRenderer::new(
            settings.attendance.reports_dir.clone(),
        ));
        let attendance =
            AttendanceService::new(db.clone(), Arc::clone(&hub), renderer, clock, offset);

        Ok(Self {
            settings: Arc::new(settings),
            db,
            enforcer,
            tokens,
            attendance,
            hub,
        })
    }
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );

    response
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/attendances", post(create_session))
        .route("/attendances/enter", post(enter_session))
        .route("/attendances/dashboard", get(dashboard))
        .route("/attendances/pending-review", get(pending_review))
        .route("/attendances/ingress", post(ingress))
        .route("/attendances/ingress-by-document", post(ingress_by_document))
        .route("/attendances/binding/{id}", get(list_by_binding))
        .route("/attendances/class/{id}", get(list_by_class))
        .route("/attendances/record/{id}/egress", put(egress))
        .route("/attendances/record/{id}/notes", put(set_record_notes))
        .route("/attendances/record/{id}/state", put(adjust_state))
        .route("/attendances/{id}", get(get_session))
        .route("/attendances/{id}/finalize", put(finalize))
        .route("/attendances/{id}/records", get(session_records))
        .route(
            "/attendances/{id}/learner/{learner_id}/notes",
            put(set_learner_notes),
        )
        .route("/classes", get(list_classes))
        .route("/classes/{id}/instructors", get(class_instructors))
        .route("/classes/{id}/learners", get(class_learners))
        .merge(crate::authz::web::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    // browsers cannot attach headers to a socket, so the credential travels in the query
    let public = Router::new()
        .route("/attendances/dashboard/ws", get(dashboard_ws))
        .route("/healthz", get(health));

    protected
        .merge(public)
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> miette::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    )
    .parse()
    .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let router = router(state);
    tracing::info!(%addr, "Attendance API listening");
    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    axum::serve(listener, router).await.into_diagnostic()?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// ============================================================================
// Attendance
// ============================================================================

async fn create_session(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateSession>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    require(&state.enforcer, &user, OBJ_ATTENDANCE, ACT_TAKE_ATTENDANCE)?;
    let session = state.attendance.create_session(req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize)]
struct EnterBody {
    class_id: i32,
}

/// Any authenticated user; assignment to the class is checked by the service.
async fn enter_session(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<EnterBody>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.attendance.enter(user.person_id, body.class_id).await?;
    Ok(Json(session))
}

async fn get_session(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<SessionView>, AppError> {
    require(&state.enforcer, &user, OBJ_ATTENDANCE, ACT_VIEW)?;
    Ok(Json(state.attendance.get_session(id).await?))
}

async fn list_by_binding(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<SessionView>>, AppError> {
    require(&state.enforcer, &user, OBJ_ATTENDANCE, ACT_VIEW)?;
    Ok(Json(state.attendance.list_by_binding(id).await?))
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
}

async fn list_by_class(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<Vec<SessionView>>, AppError> {
    require(&state.enforcer, &user, OBJ_ATTENDANCE, ACT_VIEW)?;
    let from = range.from.as_deref().filter(|s| !s.is_empty());
    let to = range.to.as_deref().filter(|s| !s.is_empty());
    Ok(Json(state.attendance.list_by_class(id, from, to).await?))
}

async fn finalize(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<SessionView>, AppError> {
    require(&state.enforcer, &user, OBJ_ATTENDANCE, ACT_TAKE_ATTENDANCE)?;
    Ok(Json(state.attendance.finalize(id).await?))
}

async fn session_records(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<RecordView>>, AppError> {
    require(&state.enforcer, &user, OBJ_ATTENDANCE, ACT_VIEW)?;
    Ok(Json(state.attendance.records(id).await?))
}

#[derive(Debug, Deserialize)]
struct NotesBody {
    #[serde(default)]
    notes: String,
}

async fn set_learner_notes(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((id, learner_id)): Path<(i32, i32)>,
    Json(body): Json<NotesBody>,
) -> Result<Json<RecordView>, AppError> {
    require(&state.enforcer, &user, OBJ_ATTENDANCE, ACT_TAKE_ATTENDANCE)?;
    Ok(Json(
        state
            .attendance
            .set_learner_notes(id, learner_id, body.notes)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct IngressBody {
    session_id: i32,
    learner_id: i32,
}

async fn ingress(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<IngressBody>,
) -> Result<Json<RecordView>, AppError> {
    require(&state.enforcer, &user, OBJ_ATTENDANCE, ACT_TAKE_ATTENDANCE)?;
    Ok(Json(
        state
            .attendance
            .ingress(body.session_id, body.learner_id)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct DocumentBody {
    session_id: i32,
    document: String,
}

async fn ingress_by_document(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<DocumentBody>,
) -> Result<Json<RecordView>, AppError> {
    require(&state.enforcer, &user, OBJ_ATTENDANCE, ACT_TAKE_ATTENDANCE)?;
    Ok(Json(
        state
            .attendance
            .ingress_by_document(body.session_id, &body.document)
            .await?,
    ))
}

async fn egress(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<RecordView>, AppError> {
    require(&state.enforcer, &user, OBJ_ATTENDANCE, ACT_TAKE_ATTENDANCE)?;
    Ok(Json(state.attendance.egress(id).await?))
}

async fn set_record_notes(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(body): Json<NotesBody>,
) -> Result<Json<RecordView>, AppError> {
    require(&state.enforcer, &user, OBJ_ATTENDANCE, ACT_TAKE_ATTENDANCE)?;
    Ok(Json(state.attendance.set_notes(id, body.notes).await?))
}

async fn adjust_state(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(body): Json<AdjustState>,
) -> Result<Json<RecordView>, AppError> {
    require(&state.enforcer, &user, OBJ_ATTENDANCE, ACT_TAKE_ATTENDANCE)?;
    Ok(Json(state.attendance.adjust_state(id, body).await?))
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

async fn pending_review(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<DateQuery>,
) -> Result<Json<Vec<RecordView>>, AppError> {
    let date = q.date.as_deref().filter(|s| !s.is_empty());
    Ok(Json(
        state.attendance.pending_review(user.person_id, date).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct DashboardQuery {
    date: Option<String>,
    site_id: Option<String>,
}

async fn dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<DashboardQuery>,
) -> Result<Json<DashboardSummary>, AppError> {
    require_gate(
        gates::super_admin(&state.enforcer, &user.subject()),
        OBJ_ATTENDANCE,
        ACT_VIEW,
    )?;
    let site_id = match q.site_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            raw.parse::<i32>()
                .map_err(|_| AppError::validation("site_id", "expected an integer"))?,
        ),
        None => None,
    };
    Ok(Json(
        state
            .attendance
            .dashboard(q.date.as_deref(), site_id)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct SocketQuery {
    token: Option<String>,
}

async fn dashboard_ws(
    State(state): State<AppState>,
    Query(q): Query<SocketQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let token = q
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::Unauthorized("token query parameter required".to_string()))?;
    let user = resolve_user(&state, token.trim()).await?;
    require_gate(
        gates::super_admin(&state.enforcer, &user.subject()),
        OBJ_ATTENDANCE,
        ACT_VIEW,
    )?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };
    let hub = Arc::clone(&state.hub);
    Ok(ws.on_upgrade(move |socket| run_subscriber(socket, hub, user.id)))
}

/// Pushes refresh pulses until either side goes away; inbound frames are ignored.
async fn run_subscriber(socket: WebSocket, hub: Arc<DashboardHub>, user_id: i32) {
    let Subscription { id, mut events } = hub.register();
    tracing::debug!(subscriber = id, user_id, "Dashboard socket upgraded");
    let (mut sink, mut stream) = socket.split();

    let mut sender = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Err(e) = sink.send(Message::Text(event.to_json().into())).await {
                tracing::debug!(subscriber = id, error = %e, "Dashboard socket write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });
    let mut reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut sender => reader.abort(),
        _ = &mut reader => sender.abort(),
    }
    hub.unregister(id);
}

// ============================================================================
// Classes
// ============================================================================

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ClassView {
    pub id: i32,
    pub code: String,
    pub site_id: Option<i32>,
    pub shift_id: Option<i32>,
    pub venue: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
}

impl From<class::Model> for ClassView {
    fn from(c: class::Model) -> Self {
        Self {
            id: c.id,
            code: c.code,
            site_id: c.site_id,
            shift_id: c.shift_id,
            venue: c.venue,
            start_date: c.start_date,
            end_date: c.end_date,
            active: c.active,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClassesQuery {
    mine: Option<String>,
}

async fn list_classes(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<ClassesQuery>,
) -> Result<Json<Vec<ClassView>>, AppError> {
    let mine = matches!(q.mine.as_deref(), Some("1") | Some("true"));
    require_gate(
        gates::list_classes(&state.enforcer, &user.subject(), mine),
        OBJ_CLASS,
        ACT_VIEW_ALL,
    )?;

    let classes = if mine {
        let instructor = match user.person_id {
            Some(pid) => storage::get_instructor_by_person(&state.db, pid).await?,
            None => None,
        };
        match instructor {
            Some(instructor) => {
                let ids: Vec<i32> = storage::bindings_for_instructor(&state.db, instructor.id)
                    .await?
                    .into_iter()
                    .map(|b| b.class_id)
                    .collect();
                storage::get_classes(&state.db, &ids).await?
            }
            None => Vec::new(),
        }
    } else {
        storage::list_classes(&state.db).await?
    };
    Ok(Json(classes.into_iter().map(ClassView::from).collect()))
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RosterEntry {
    pub binding_id: i32,
    pub person_id: i32,
    pub document: String,
    pub name: String,
}

async fn class_instructors(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    method: Method,
    Path(id): Path<i32>,
) -> Result<Json<Vec<RosterEntry>>, AppError> {
    require_gate(
        gates::class_instructors(&state.enforcer, &user.subject(), method == Method::GET),
        OBJ_CLASS,
        ACT_MANAGE_INSTRUCTORS,
    )?;
    ensure_class(&state, id).await?;
    let entries = storage::instructors_of_class(&state.db, id)
        .await?
        .into_iter()
        .map(|(binding, person)| RosterEntry {
            binding_id: binding.id,
            person_id: person.id,
            name: person.full_name(),
            document: person.document_number,
        })
        .collect();
    Ok(Json(entries))
}

async fn class_learners(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    method: Method,
    Path(id): Path<i32>,
) -> Result<Json<Vec<RosterEntry>>, AppError> {
    require_gate(
        gates::class_learners(&state.enforcer, &user.subject(), method == Method::GET),
        OBJ_CLASS,
        ACT_MANAGE_LEARNERS,
    )?;
    ensure_class(&state, id).await?;
    let entries = storage::active_learners_of_class(&state.db, id)
        .await?
        .into_iter()
        .map(|(binding, person)| RosterEntry {
            binding_id: binding.id,
            person_id: person.id,
            name: person.full_name(),
            document: person.document_number,
        })
        .collect();
    Ok(Json(entries))
}

async fn ensure_class(state: &AppState, id: i32) -> Result<(), AppError> {
    storage::get_class(&state.db, id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("class {id}")))
}
