//! Attendance workflow: sessions, learner ingress/egress, classification,
//! finalization and the live dashboard aggregate.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use sea_orm::{DatabaseConnection, DatabaseTransaction, IntoActiveModel, Set, TransactionTrait};
use serde::{Deserialize, Serialize};

use crate::dashboard::DashboardHub;
use crate::entities::learner_attendance::{self, AttendanceState};
use crate::entities::{attendance_session, class};
use crate::errors::{AppError, ConflictKind};
use crate::report::{AttendanceReport, ReportLearner, ReportRecord, ReportRenderer};
use crate::shift;
use crate::storage::{self, ClassPresence, NewSession};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock.
#[derive(Debug)]
pub struct FixedClock(parking_lot::Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(parking_lot::Mutex::new(at))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

// ============================================================================
// Representations
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionView {
    pub id: i32,
    pub instructor_binding_id: i32,
    pub class_id: i32,
    pub class_code: String,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub finished: bool,
    pub notes: String,
    pub learner_count: u64,
}

/// What a record-returning operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Ingress,
    Egress,
    Complete,
    Update,
}

impl RecordKind {
    fn message(&self) -> &'static str {
        match self {
            RecordKind::Ingress => "ingress registered",
            RecordKind::Egress => "egress registered",
            RecordKind::Complete => "attendance already complete for today",
            RecordKind::Update => "record updated",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordView {
    pub id: i32,
    pub session_id: i32,
    pub learner_id: i32,
    pub learner_name: String,
    pub document: String,
    pub ingress_time: Option<DateTime<Utc>>,
    pub egress_time: Option<DateTime<Utc>>,
    pub notes: String,
    pub class_id: i32,
    pub class_code: String,
    pub state: AttendanceState,
    pub requires_review: bool,
    pub adjustment_reason: String,
    #[serde(rename = "type")]
    pub kind: Option<RecordKind>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DashboardSummary {
    pub date: NaiveDate,
    pub total_learners_in_training: u64,
    pub per_class: Vec<ClassPresence>,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSession {
    pub instructor_binding_id: i32,
    pub date: String,
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdjustState {
    pub state: String,
    pub reason: Option<String>,
}

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(field, "expected a YYYY-MM-DD date"))
}

/// Accepts RFC3339, or a wall-clock `HH:MM[:SS]` on `day` in `offset`.
pub fn parse_start_time(
    value: &str,
    day: NaiveDate,
    offset: FixedOffset,
) -> Result<DateTime<Utc>, AppError> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    let time = NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| AppError::validation("start_time", "expected RFC3339 or HH:MM"))?;
    offset
        .from_local_datetime(&day.and_time(time))
        .single()
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| AppError::validation("start_time", "ambiguous local time"))
}

/// Classification states a caller may set; `UNSET` is not one of them.
pub fn parse_state(value: &str) -> Result<AttendanceState, AppError> {
    match value.trim().to_ascii_uppercase().as_str() {
        "COMPLETE" => Ok(AttendanceState::Complete),
        "PARTIAL" => Ok(AttendanceState::Partial),
        "ABANDONED" => Ok(AttendanceState::Abandoned),
        "REVIEW" => Ok(AttendanceState::Review),
        _ => Err(AppError::validation(
            "state",
            "expected one of COMPLETE, PARTIAL, ABANDONED, REVIEW",
        )),
    }
}

// ============================================================================
// Service
// ============================================================================

#[derive(Clone)]
pub struct AttendanceService {
    db: DatabaseConnection,
    hub: Arc<DashboardHub>,
    renderer: Arc<dyn ReportRenderer>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl AttendanceService {
    pub fn new(
        db: DatabaseConnection,
        hub: Arc<DashboardHub>,
        renderer: Arc<dyn ReportRenderer>,
        clock: Arc<dyn Clock>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            db,
            hub,
            renderer,
            clock,
            offset,
        }
    }

    /// Local calendar day of the training center.
    pub fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.offset).date_naive()
    }

    fn refresh(&self) {
        let delivered = self.hub.broadcast_refresh();
        tracing::debug!(delivered, "Dashboard refresh broadcast");
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub async fn create_session(&self, req: CreateSession) -> Result<SessionView, AppError> {
        let day = parse_date("date", &req.date)?;
        let start_time = match req.start_time.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(value) => Some(parse_start_time(value, day, self.offset)?),
            None => None,
        };
        let binding = storage::get_instructor_binding(&self.db, req.instructor_binding_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("instructor binding {}", req.instructor_binding_id))
            })?;
        let session = self.open_session(binding.id, binding.class_id, day, start_time).await?;
        self.session_view(session).await
    }

    async fn open_session(
        &self,
        instructor_binding_id: i32,
        class_id: i32,
        day: NaiveDate,
        start_time: Option<DateTime<Utc>>,
    ) -> Result<attendance_session::Model, AppError> {
        let class = self.class(class_id).await?;
        let session = storage::create_session(
            &self.db,
            NewSession {
                instructor_binding_id,
                class_id,
                day,
                start_time: start_time.unwrap_or_else(|| self.clock.now()),
                evidence_code: format!("ATT-{}-{}", class.code, day.format("%Y%m%d")),
                evidence_name: format!("Attendance {} {}", class.code, day.format("%Y-%m-%d")),
            },
        )
        .await?;
        tracing::info!(
            session_id = session.id,
            class_id,
            instructor_binding_id,
            %day,
            "Attendance session opened"
        );
        self.refresh();
        Ok(session)
    }

    /// Returns the session the calling instructor should work on for `class_id`,
    /// opening one for today when none is open.
    pub async fn enter(&self, person_id: Option<i32>, class_id: i32) -> Result<SessionView, AppError> {
        let person_id = person_id.ok_or(AppError::Conflict(ConflictKind::NotInstructor))?;
        let instructor = storage::get_instructor_by_person(&self.db, person_id)
            .await?
            .ok_or(AppError::Conflict(ConflictKind::NotInstructor))?;
        let binding = storage::get_instructor_binding_for(&self.db, instructor.id, class_id)
            .await?
            .ok_or(AppError::Conflict(ConflictKind::NotAssignedToClass))?;
        let class = self.class(class_id).await?;

        if let Some(shift_id) = class.shift_id {
            let shift = storage::get_shift(&self.db, shift_id).await?;
            let local = self.clock.now().with_timezone(&self.offset).time();
            if !shift::is_within_shift(shift.as_ref(), local) {
                tracing::info!(class_id, %local, "Attendance entry outside shift window");
                return Err(AppError::Conflict(ConflictKind::OutsideShiftWindow));
            }
        }

        if let Some(own) = storage::get_open_session_for_binding(&self.db, binding.id).await? {
            return self.session_view(own).await;
        }
        if let Some(shared) = storage::get_open_session_for_class(&self.db, class_id).await? {
            return self.session_view(shared).await;
        }

        match self.open_session(binding.id, class_id, self.today(), None).await {
            Ok(session) => self.session_view(session).await,
            // a co-instructor opened one in between
            Err(AppError::Conflict(ConflictKind::SessionAlreadyOpen)) => {
                let shared = storage::get_open_session_for_class(&self.db, class_id)
                    .await?
                    .ok_or(AppError::Conflict(ConflictKind::SessionAlreadyOpen))?;
                self.session_view(shared).await
            }
            Err(err) => Err(err),
        }
    }

    pub async fn get_session(&self, id: i32) -> Result<SessionView, AppError> {
        let session = self.session(id).await?;
        self.session_view(session).await
    }

    pub async fn list_by_binding(&self, binding_id: i32) -> Result<Vec<SessionView>, AppError> {
        storage::get_instructor_binding(&self.db, binding_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("instructor binding {binding_id}")))?;
        let sessions = storage::list_sessions_by_binding(&self.db, binding_id).await?;
        self.session_views(sessions).await
    }

    pub async fn list_by_class(
        &self,
        class_id: i32,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Vec<SessionView>, AppError> {
        let from = from.map(|v| parse_date("from", v)).transpose()?;
        let to = to.map(|v| parse_date("to", v)).transpose()?;
        if let (Some(from), Some(to)) = (from, to) {
            if to < from {
                return Err(AppError::validation("to", "must not be before `from`"));
            }
        }
        self.class(class_id).await?;
        let sessions = storage::list_sessions_by_class(&self.db, class_id, from, to).await?;
        self.session_views(sessions).await
    }

    /// Closes the session and writes its report. A report failure is logged only.
    pub async fn finalize(&self, id: i32) -> Result<SessionView, AppError> {
        let session = self.session(id).await?;
        if session.finished {
            return Err(AppError::Conflict(ConflictKind::SessionFinished));
        }
        let end_time = self.clock.now().max(session.start_time);
        let session = storage::finish_session(&self.db, id, end_time).await?;
        tracing::info!(session_id = id, "Attendance session finalized");

        match self.emit_report(&session).await {
            Ok(path) => tracing::info!(session_id = id, path = %path.display(), "Attendance report written"),
            Err(err) => tracing::warn!(session_id = id, error = %err, "Attendance report failed"),
        }

        self.refresh();
        self.session_view(session).await
    }

    async fn emit_report(&self, session: &attendance_session::Model) -> Result<PathBuf, AppError> {
        let class = self.class(session.class_id).await?;
        let records = storage::records_for_session(&self.db, session.id).await?;
        let learners = storage::learners_by_binding(
            &self.db,
            records.iter().map(|r| r.learner_binding_id).collect(),
        )
        .await?;
        let report_records: Vec<ReportRecord> = records
            .iter()
            .filter_map(|r| {
                let (binding, person) = learners.get(&r.learner_binding_id)?;
                Some(ReportRecord {
                    learner: ReportLearner {
                        learner_binding_id: binding.id,
                        document: person.document_number.clone(),
                        name: person.full_name(),
                    },
                    ingress_time: r.ingress_time,
                    egress_time: r.egress_time,
                })
            })
            .collect();
        let roster: Vec<ReportLearner> = storage::active_learners_of_class(&self.db, class.id)
            .await?
            .into_iter()
            .map(|(binding, person)| ReportLearner {
                learner_binding_id: binding.id,
                document: person.document_number.clone(),
                name: person.full_name(),
            })
            .collect();

        let report = AttendanceReport::build(
            &class.code,
            session.session_date.date_naive(),
            session.id,
            session.start_time,
            session.end_time,
            &report_records,
            &roster,
            self.offset,
        );
        let renderer = Arc::clone(&self.renderer);
        tokio::task::spawn_blocking(move || renderer.render(&report))
            .await
            .map_err(|e| AppError::Report(e.to_string()))?
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    pub async fn ingress(
        &self,
        session_id: i32,
        learner_binding_id: i32,
    ) -> Result<RecordView, AppError> {
        let session = self.open_session_for_mutation(session_id).await?;
        let binding = storage::get_learner_binding(&self.db, learner_binding_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("learner {learner_binding_id}")))?;
        if binding.class_id != session.class_id || !binding.active {
            return Err(AppError::Conflict(ConflictKind::NotLearnerOfClass));
        }

        let txn = self.db.begin().await?;
        let record = self.register_ingress(&txn, &session, learner_binding_id).await?;
        txn.commit().await?;

        tracing::info!(session_id, learner_binding_id, record_id = record.id, "Ingress registered");
        self.refresh();
        self.record_view(record, Some(RecordKind::Ingress)).await
    }

    /// One scan toggles the learner through ingress, egress, then complete.
    pub async fn ingress_by_document(
        &self,
        session_id: i32,
        document: &str,
    ) -> Result<RecordView, AppError> {
        let document = document.trim();
        if document.is_empty() {
            return Err(AppError::validation("document", "must not be empty"));
        }
        let session = self.open_session_for_mutation(session_id).await?;
        let person = storage::get_person_by_document(&self.db, document)
            .await?
            .ok_or(AppError::Conflict(ConflictKind::PersonNotFound))?;
        let binding = storage::get_active_learner_binding(&self.db, person.id, session.class_id)
            .await?
            .ok_or(AppError::Conflict(ConflictKind::NotLearnerOfClass))?;

        let txn = self.db.begin().await?;
        let today_ids = self.day_session_ids(&txn, &session).await?;
        let records = storage::learner_records_in(&txn, binding.id, &today_ids).await?;

        let (record, kind) = if let Some(open) = records.iter().find(|r| r.is_open()).cloned() {
            (self.register_egress(&txn, open).await?, RecordKind::Egress)
        } else if let Some(done) = records.iter().find(|r| r.is_complete()).cloned() {
            (done, RecordKind::Complete)
        } else {
            (
                self.register_ingress(&txn, &session, binding.id).await?,
                RecordKind::Ingress,
            )
        };
        txn.commit().await?;

        tracing::info!(
            session_id,
            learner_binding_id = binding.id,
            record_id = record.id,
            kind = ?kind,
            "Document scan handled"
        );
        if kind != RecordKind::Complete {
            self.refresh();
        }
        self.record_view(record, Some(kind)).await
    }

    pub async fn egress(&self, record_id: i32) -> Result<RecordView, AppError> {
        let record = self.record(record_id).await?;
        self.open_session_for_mutation(record.session_id).await?;

        let record = self.register_egress(&self.db, record).await?;
        tracing::info!(record_id, "Egress registered");
        self.refresh();
        self.record_view(record, Some(RecordKind::Egress)).await
    }

    pub async fn set_notes(&self, record_id: i32, notes: String) -> Result<RecordView, AppError> {
        let record = self.record(record_id).await?;
        self.open_session_for_mutation(record.session_id).await?;

        let mut model = record.into_active_model();
        model.notes = Set(notes);
        let record = storage::update_record(&self.db, model).await?;
        self.refresh();
        self.record_view(record, Some(RecordKind::Update)).await
    }

    /// Creates the `(session, learner)` record if needed, without registering ingress.
    pub async fn set_learner_notes(
        &self,
        session_id: i32,
        learner_binding_id: i32,
        notes: String,
    ) -> Result<RecordView, AppError> {
        let session = self.open_session_for_mutation(session_id).await?;
        let binding = storage::get_learner_binding(&self.db, learner_binding_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("learner {learner_binding_id}")))?;
        if binding.class_id != session.class_id || !binding.active {
            return Err(AppError::Conflict(ConflictKind::NotLearnerOfClass));
        }

        let record = match storage::get_session_record(&self.db, session_id, learner_binding_id)
            .await?
        {
            Some(existing) => {
                let mut model = existing.into_active_model();
                model.notes = Set(notes);
                storage::update_record(&self.db, model).await?
            }
            None => {
                let mut model = blank_record(&session, learner_binding_id);
                model.notes = Set(notes);
                storage::insert_record(&self.db, model).await?
            }
        };
        self.refresh();
        self.record_view(record, Some(RecordKind::Update)).await
    }

    /// Allowed on finalized sessions.
    pub async fn adjust_state(&self, record_id: i32, req: AdjustState) -> Result<RecordView, AppError> {
        let state = parse_state(&req.state)?;
        let record = self.record(record_id).await?;

        let mut model = record.into_active_model();
        model.state = Set(state);
        model.requires_review = Set(state == AttendanceState::Review);
        model.adjustment_reason = Set(req.reason.unwrap_or_default());
        let record = storage::update_record(&self.db, model).await?;

        tracing::info!(record_id, state = ?state, "Attendance classification adjusted");
        self.refresh();
        self.record_view(record, Some(RecordKind::Update)).await
    }

    pub async fn records(&self, session_id: i32) -> Result<Vec<RecordView>, AppError> {
        self.session(session_id).await?;
        let records = storage::records_for_session(&self.db, session_id).await?;
        self.record_views(records).await
    }

    /// Records awaiting review in the caller's sessions of `date` (default today).
    pub async fn pending_review(
        &self,
        person_id: Option<i32>,
        date: Option<&str>,
    ) -> Result<Vec<RecordView>, AppError> {
        let day = match date {
            Some(value) => parse_date("date", value)?,
            None => self.today(),
        };
        let person_id = person_id.ok_or(AppError::Conflict(ConflictKind::NotInstructor))?;
        let instructor = storage::get_instructor_by_person(&self.db, person_id)
            .await?
            .ok_or(AppError::Conflict(ConflictKind::NotInstructor))?;
        let bindings: HashSet<i32> = storage::bindings_for_instructor(&self.db, instructor.id)
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect();
        let session_ids: Vec<i32> = storage::sessions_on_day(&self.db, day)
            .await?
            .into_iter()
            .filter(|s| bindings.contains(&s.instructor_binding_id))
            .map(|s| s.id)
            .collect();
        let records = storage::review_records_in(&self.db, &session_ids).await?;
        self.record_views(records).await
    }

    pub async fn dashboard(
        &self,
        date: Option<&str>,
        site_id: Option<i32>,
    ) -> Result<DashboardSummary, AppError> {
        let day = match date.filter(|d| !d.trim().is_empty()) {
            Some(value) => parse_date("date", value)?,
            None => self.today(),
        };
        let presence = storage::presence_on(&self.db, day, site_id).await?;
        Ok(DashboardSummary {
            date: day,
            total_learners_in_training: presence.total_learners_in_training,
            per_class: presence.per_class,
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn session(&self, id: i32) -> Result<attendance_session::Model, AppError> {
        storage::get_session(&self.db, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("attendance session {id}")))
    }

    async fn open_session_for_mutation(
        &self,
        id: i32,
    ) -> Result<attendance_session::Model, AppError> {
        let session = self.session(id).await?;
        if session.finished {
            return Err(AppError::Conflict(ConflictKind::SessionFinished));
        }
        Ok(session)
    }

    async fn record(&self, id: i32) -> Result<learner_attendance::Model, AppError> {
        storage::get_record(&self.db, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("attendance record {id}")))
    }

    async fn class(&self, id: i32) -> Result<class::Model, AppError> {
        storage::get_class(&self.db, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("class {id}")))
    }

    /// Sessions of the class held on `session`'s own day or today, always
    /// including `session` itself.
    async fn day_session_ids(
        &self,
        txn: &DatabaseTransaction,
        session: &attendance_session::Model,
    ) -> Result<Vec<i32>, AppError> {
        let session_day = session.session_date.date_naive();
        let today = self.today();
        let mut ids = storage::session_ids_for_class_on(txn, session.class_id, session_day).await?;
        if today != session_day {
            for id in storage::session_ids_for_class_on(txn, session.class_id, today).await? {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        if !ids.contains(&session.id) {
            ids.push(session.id);
        }
        Ok(ids)
    }

    async fn register_ingress(
        &self,
        txn: &DatabaseTransaction,
        session: &attendance_session::Model,
        learner_binding_id: i32,
    ) -> Result<learner_attendance::Model, AppError> {
        let ids = self.day_session_ids(txn, session).await?;
        let records = storage::learner_records_in(txn, learner_binding_id, &ids).await?;

        if records
            .iter()
            .any(|r| r.is_open() && r.session_id != session.id)
        {
            return Err(AppError::Conflict(ConflictKind::OpenIngressElsewhere));
        }

        let now = self.clock.now();
        match records.into_iter().find(|r| r.session_id == session.id) {
            Some(existing) if existing.ingress_time.is_some() => {
                Err(AppError::Conflict(ConflictKind::AlreadyIngressed))
            }
            Some(existing) => {
                let mut model = existing.into_active_model();
                model.ingress_time = Set(Some(now));
                storage::update_record(txn, model).await
            }
            None => {
                let mut model = blank_record(session, learner_binding_id);
                model.ingress_time = Set(Some(now));
                storage::insert_record(txn, model).await.map_err(|err| match err {
                    AppError::Db(db) if storage::is_unique_violation(&db) => {
                        AppError::Conflict(ConflictKind::AlreadyIngressed)
                    }
                    other => other,
                })
            }
        }
    }

    async fn register_egress<C: sea_orm::ConnectionTrait>(
        &self,
        db: &C,
        record: learner_attendance::Model,
    ) -> Result<learner_attendance::Model, AppError> {
        let Some(ingress) = record.ingress_time else {
            return Err(AppError::Conflict(ConflictKind::NoIngress));
        };
        if record.egress_time.is_some() {
            return Err(AppError::Conflict(ConflictKind::AlreadyEgressed));
        }
        let mut model = record.into_active_model();
        model.egress_time = Set(Some(self.clock.now().max(ingress)));
        storage::update_record(db, model).await
    }

    async fn session_view(&self, session: attendance_session::Model) -> Result<SessionView, AppError> {
        let mut views = self.session_views(vec![session]).await?;
        views
            .pop()
            .ok_or_else(|| AppError::NotFound("attendance session".to_string()))
    }

    async fn session_views(
        &self,
        sessions: Vec<attendance_session::Model>,
    ) -> Result<Vec<SessionView>, AppError> {
        let class_ids: Vec<i32> = sessions.iter().map(|s| s.class_id).collect();
        let codes = self.class_codes(&class_ids).await?;
        let ids: Vec<i32> = sessions.iter().map(|s| s.id).collect();
        let counts = storage::record_counts(&self.db, &ids).await?;

        Ok(sessions
            .into_iter()
            .map(|s| SessionView {
                id: s.id,
                instructor_binding_id: s.instructor_binding_id,
                class_id: s.class_id,
                class_code: codes.get(&s.class_id).cloned().unwrap_or_default(),
                date: s.session_date.date_naive(),
                start_time: s.start_time,
                end_time: s.end_time,
                finished: s.finished,
                notes: s.notes,
                learner_count: counts.get(&s.id).copied().unwrap_or(0),
            })
            .collect())
    }

    async fn record_view(
        &self,
        record: learner_attendance::Model,
        kind: Option<RecordKind>,
    ) -> Result<RecordView, AppError> {
        let mut views = self.record_views(vec![record]).await?;
        let mut view = views
            .pop()
            .ok_or_else(|| AppError::NotFound("attendance record".to_string()))?;
        view.kind = kind;
        view.message = kind.map(|k| k.message().to_string());
        Ok(view)
    }

    async fn record_views(
        &self,
        records: Vec<learner_attendance::Model>,
    ) -> Result<Vec<RecordView>, AppError> {
        let learners = storage::learners_by_binding(
            &self.db,
            records.iter().map(|r| r.learner_binding_id).collect(),
        )
        .await?;

        let session_ids: Vec<i32> = records
            .iter()
            .map(|r| r.session_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let session_class: HashMap<i32, i32> = storage::get_sessions(&self.db, &session_ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s.class_id))
            .collect();
        let class_ids: Vec<i32> = session_class.values().copied().collect();
        let codes = self.class_codes(&class_ids).await?;

        Ok(records
            .into_iter()
            .map(|r| {
                let (name, document) = learners
                    .get(&r.learner_binding_id)
                    .map(|(_, p)| (p.full_name(), p.document_number.clone()))
                    .unwrap_or_default();
                let class_id = session_class.get(&r.session_id).copied().unwrap_or_default();
                RecordView {
                    id: r.id,
                    session_id: r.session_id,
                    learner_id: r.learner_binding_id,
                    learner_name: name,
                    document,
                    ingress_time: r.ingress_time,
                    egress_time: r.egress_time,
                    notes: r.notes,
                    class_id,
                    class_code: codes.get(&class_id).cloned().unwrap_or_default(),
                    state: r.state,
                    requires_review: r.requires_review,
                    adjustment_reason: r.adjustment_reason,
                    kind: None,
                    message: None,
                }
            })
            .collect())
    }

    async fn class_codes(&self, ids: &[i32]) -> Result<HashMap<i32, String>, AppError> {
        let mut unique: Vec<i32> = ids.to_vec();
        unique.sort_unstable();
        unique.dedup();
        Ok(storage::get_classes(&self.db, &unique)
            .await?
            .into_iter()
            .map(|c| (c.id, c.code))
            .collect())
    }
}

fn blank_record(
    session: &attendance_session::Model,
    learner_binding_id: i32,
) -> learner_attendance::ActiveModel {
    learner_attendance::ActiveModel {
        session_id: Set(session.id),
        learner_binding_id: Set(learner_binding_id),
        instructor_binding_id: Set(Some(session.instructor_binding_id)),
        ingress_time: Set(None),
        egress_time: Set(None),
        state: Set(AttendanceState::Unset),
        requires_review: Set(false),
        adjustment_reason: Set(String::new()),
        notes: Set(String::new()),
        ..Default::default()
    }
}
