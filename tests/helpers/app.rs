use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use cdattg::attendance::{AttendanceService, FixedClock};
use cdattg::authz::subject;
use cdattg::settings::Settings;
use cdattg::web::{self, AppState};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use sea_orm::DatabaseConnection;
use tempfile::TempDir;

use super::db::TestDb;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

/// Wall-clock instant at the default training center offset (UTC-5).
pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    FixedOffset::west_opt(5 * 3600)
        .expect("valid offset")
        .with_ymd_and_hms(y, m, d, h, min, s)
        .single()
        .expect("valid local time")
        .with_timezone(&Utc)
}

/// Fully wired application over a temporary database and reports directory.
pub struct TestApp {
    pub state: AppState,
    pub clock: Arc<FixedClock>,
    pub reports: TempDir,
    db: TestDb,
}

impl TestApp {
    pub async fn new(at: DateTime<Utc>) -> Self {
        let db = TestDb::new().await;
        let reports = tempfile::tempdir().expect("Failed to create reports dir");

        let mut settings = Settings::default();
        settings.auth.token_secret = TEST_SECRET.to_string();
        settings.attendance.reports_dir = reports.path().join("attendance_pdfs");

        let clock = Arc::new(FixedClock::new(at));
        let state = AppState::build(settings, db.connection().clone(), clock.clone())
            .await
            .expect("Failed to build app state");

        Self {
            state,
            clock,
            reports,
            db,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.db.connection()
    }

    pub fn service(&self) -> &AttendanceService {
        &self.state.attendance
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(web::router(self.state.clone())).expect("Failed to start test server")
    }

    pub fn token(&self, user_id: i32) -> String {
        self.state
            .tokens
            .issue(user_id, Duration::from_secs(3600))
            .expect("Failed to issue token")
    }

    pub async fn grant(&self, user_id: i32, role: &str) {
        self.state
            .enforcer
            .add_role_for_user(&subject(user_id), role)
            .await
            .expect("Failed to grant role");
    }
}
