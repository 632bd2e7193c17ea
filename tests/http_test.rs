mod helpers;

use axum::http::StatusCode;
use cdattg::authz::catalog::{ROLE_COORDINATOR, ROLE_INSTRUCTOR, ROLE_SUPER_ADMIN};
use helpers::app::local;
use helpers::builders::{bind_instructor, create_instructor, enroll_learner};
use helpers::{ClassBuilder, PersonBuilder, TestApp, UserBuilder};
use serde_json::{json, Value};

/// Instructor account bound to a fresh class with one learner.
struct Setup {
    app: TestApp,
    instructor_token: String,
    instructor_user: i32,
    class_id: i32,
    binding_id: i32,
    learner_document: String,
}

async fn setup() -> Setup {
    let app = TestApp::new(local(2024, 5, 10, 8, 0, 0)).await;
    let db = app.db();

    let class = ClassBuilder::new("FC-9001").create(db).await;
    let person = PersonBuilder::new("INS-9001").create(db).await;
    let instructor = create_instructor(db, person.id).await;
    let binding = bind_instructor(db, instructor.id, class.id).await;
    let user = UserBuilder::new("instructor@example.com")
        .for_person(person.id)
        .create(db)
        .await;
    app.grant(user.id, ROLE_INSTRUCTOR).await;

    let learner = PersonBuilder::new("CC-12345").create(db).await;
    enroll_learner(db, learner.id, class.id).await;

    Setup {
        instructor_token: app.token(user.id),
        instructor_user: user.id,
        class_id: class.id,
        binding_id: binding.id,
        learner_document: learner.document_number,
        app,
    }
}

#[tokio::test]
async fn test_healthz_is_public() {
    let s = setup().await;
    let response = s.app.server().get("/healthz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "ok");
    assert_eq!(response.header("x-frame-options"), "DENY");
}

#[tokio::test]
async fn test_missing_or_bad_credentials_are_rejected() {
    let s = setup().await;
    let server = s.app.server();

    let missing = server.get("/attendances/1").await;
    assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(missing.json::<Value>()["error"], "UNAUTHORIZED");

    let garbage = server
        .get("/attendances/1")
        .authorization_bearer("not-a-token")
        .await;
    assert_eq!(garbage.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_inactive_user_is_blocked() {
    let s = setup().await;
    let user = UserBuilder::new("gone@example.com")
        .inactive()
        .create(s.app.db())
        .await;
    s.app.grant(user.id, ROLE_SUPER_ADMIN).await;

    let response = s
        .app
        .server()
        .get("/classes")
        .authorization_bearer(s.app.token(user.id))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_session_then_conflict() {
    let s = setup().await;
    let server = s.app.server();
    let body = json!({ "instructor_binding_id": s.binding_id, "date": "2024-05-10" });

    let created = server
        .post("/attendances")
        .authorization_bearer(&s.instructor_token)
        .json(&body)
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let session: Value = created.json();
    assert_eq!(session["class_code"], "FC-9001");
    assert_eq!(session["date"], "2024-05-10");
    assert_eq!(session["finished"], false);
    assert_eq!(session["learner_count"], 0);

    let second = server
        .post("/attendances")
        .authorization_bearer(&s.instructor_token)
        .json(&body)
        .await;
    assert_eq!(second.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(second.json::<Value>()["error"], "SESSION_ALREADY_OPEN");
}

#[tokio::test]
async fn test_invalid_date_reports_field() {
    let s = setup().await;
    let response = s
        .app
        .server()
        .post("/attendances")
        .authorization_bearer(&s.instructor_token)
        .json(&json!({ "instructor_binding_id": s.binding_id, "date": "May 10" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "VALIDATION");
    assert_eq!(body["field"], "date");
}

#[tokio::test]
async fn test_scan_cycle_over_http() {
    let s = setup().await;
    let server = s.app.server();

    let session: Value = server
        .post("/attendances/enter")
        .authorization_bearer(&s.instructor_token)
        .json(&json!({ "class_id": s.class_id }))
        .await
        .json();
    let session_id = session["id"].as_i64().unwrap();

    let mut kinds = Vec::new();
    for _ in 0..3 {
        let response = server
            .post("/attendances/ingress-by-document")
            .authorization_bearer(&s.instructor_token)
            .json(&json!({ "session_id": session_id, "document": s.learner_document }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let record: Value = response.json();
        assert_eq!(record["document"], "CC-12345");
        assert_eq!(record["class_code"], "FC-9001");
        kinds.push(record["type"].as_str().unwrap().to_string());
    }
    assert_eq!(kinds, vec!["ingress", "egress", "complete"]);

    let records: Value = server
        .get(&format!("/attendances/{session_id}/records"))
        .authorization_bearer(&s.instructor_token)
        .await
        .json();
    assert_eq!(records.as_array().unwrap().len(), 1);
    assert_eq!(records[0]["state"], "UNSET");
}

#[tokio::test]
async fn test_missing_permission_names_obj_and_act() {
    let s = setup().await;
    let learner_user = UserBuilder::new("learner@example.com")
        .create(s.app.db())
        .await;
    let token = s.app.token(learner_user.id);

    let response = s
        .app
        .server()
        .post("/attendances")
        .authorization_bearer(&token)
        .json(&json!({ "instructor_binding_id": s.binding_id, "date": "2024-05-10" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["obj"], "attendance");
    assert_eq!(body["act"], "TAKE_ATTENDANCE");
}

#[tokio::test]
async fn test_class_list_gate() {
    let s = setup().await;
    let server = s.app.server();

    let all = server
        .get("/classes")
        .authorization_bearer(&s.instructor_token)
        .await;
    assert_eq!(all.status_code(), StatusCode::FORBIDDEN);

    let mine = server
        .get("/classes?mine=1")
        .authorization_bearer(&s.instructor_token)
        .await;
    assert_eq!(mine.status_code(), StatusCode::OK);
    let classes: Value = mine.json();
    assert_eq!(classes.as_array().unwrap().len(), 1);
    assert_eq!(classes[0]["code"], "FC-9001");

    let learners = server
        .get(&format!("/classes/{}/learners", s.class_id))
        .authorization_bearer(&s.instructor_token)
        .await;
    assert_eq!(learners.status_code(), StatusCode::OK);
    assert_eq!(learners.json::<Value>()[0]["document"], "CC-12345");

    let coordinator = UserBuilder::new("coord@example.com").create(s.app.db()).await;
    s.app.grant(coordinator.id, ROLE_COORDINATOR).await;
    let everything = server
        .get("/classes")
        .authorization_bearer(s.app.token(coordinator.id))
        .await;
    assert_eq!(everything.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_dashboard_is_super_admin_only() {
    let s = setup().await;
    let server = s.app.server();

    let denied = server
        .get("/attendances/dashboard?date=2024-05-10")
        .authorization_bearer(&s.instructor_token)
        .await;
    assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);

    let admin = UserBuilder::new("root@example.com").create(s.app.db()).await;
    s.app.grant(admin.id, ROLE_SUPER_ADMIN).await;
    let allowed = server
        .get("/attendances/dashboard?date=2024-05-10")
        .authorization_bearer(s.app.token(admin.id))
        .await;
    assert_eq!(allowed.status_code(), StatusCode::OK);
    let body: Value = allowed.json();
    assert_eq!(body["total_learners_in_training"], 0);
    assert_eq!(body["date"], "2024-05-10");

    let bad_site = server
        .get("/attendances/dashboard?site_id=north")
        .authorization_bearer(s.app.token(admin.id))
        .await;
    assert_eq!(bad_site.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dashboard_socket_requires_token() {
    let s = setup().await;
    let server = s.app.server();

    let missing = server
        .get("/attendances/dashboard/ws")
        .await;
    assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);

    let not_admin = server
        .get(&format!("/attendances/dashboard/ws?token={}", s.instructor_token))
        .await;
    assert_eq!(not_admin.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_direct_permission_assignment() {
    let s = setup().await;
    let server = s.app.server();
    let admin = UserBuilder::new("root@example.com").create(s.app.db()).await;
    s.app.grant(admin.id, ROLE_SUPER_ADMIN).await;
    let admin_token = s.app.token(admin.id);

    let added = server
        .post(&format!("/users/{}/permissions", s.instructor_user))
        .authorization_bearer(&admin_token)
        .json(&json!({ "obj": "class", "act": "VIEW_ALL" }))
        .await;
    assert_eq!(added.status_code(), StatusCode::OK);
    let body: Value = added.json();
    assert_eq!(body["roles"], json!([ROLE_INSTRUCTOR]));
    assert_eq!(
        body["direct_permissions"],
        json!([{ "obj": "class", "act": "VIEW_ALL" }])
    );

    // the instructor may now list every class
    let all = server
        .get("/classes")
        .authorization_bearer(&s.instructor_token)
        .await;
    assert_eq!(all.status_code(), StatusCode::OK);

    let unknown = server
        .post(&format!("/users/{}/permissions", s.instructor_user))
        .authorization_bearer(&admin_token)
        .json(&json!({ "obj": "class", "act": "LAUNCH" }))
        .await;
    assert_eq!(unknown.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(unknown.json::<Value>()["error"], "VALIDATION");

    let own = server
        .post(&format!("/users/{}/permissions", admin.id))
        .authorization_bearer(&admin_token)
        .json(&json!({ "obj": "class", "act": "VIEW" }))
        .await;
    assert_eq!(own.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(own.json::<Value>()["error"], "SELF_MODIFICATION");

    let removed = server
        .delete(&format!(
            "/users/{}/permissions/class/VIEW_ALL",
            s.instructor_user
        ))
        .authorization_bearer(&admin_token)
        .await;
    assert_eq!(removed.status_code(), StatusCode::OK);
    assert_eq!(removed.json::<Value>()["direct_permissions"], json!([]));
}

#[tokio::test]
async fn test_role_replacement_needs_super_admin() {
    let s = setup().await;
    let server = s.app.server();
    let coordinator = UserBuilder::new("coord@example.com").create(s.app.db()).await;
    s.app.grant(coordinator.id, ROLE_COORDINATOR).await;

    let denied = server
        .put(&format!("/users/{}/roles", s.instructor_user))
        .authorization_bearer(s.app.token(coordinator.id))
        .json(&json!({ "roles": [ROLE_COORDINATOR] }))
        .await;
    assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);

    let admin = UserBuilder::new("root@example.com").create(s.app.db()).await;
    s.app.grant(admin.id, ROLE_SUPER_ADMIN).await;
    let admin_token = s.app.token(admin.id);

    let unknown = server
        .put(&format!("/users/{}/roles", s.instructor_user))
        .authorization_bearer(&admin_token)
        .json(&json!({ "roles": ["WIZARD"] }))
        .await;
    assert_eq!(unknown.status_code(), StatusCode::BAD_REQUEST);

    let replaced = server
        .put(&format!("/users/{}/roles", s.instructor_user))
        .authorization_bearer(&admin_token)
        .json(&json!({ "roles": [ROLE_COORDINATOR] }))
        .await;
    assert_eq!(replaced.status_code(), StatusCode::OK);
    assert_eq!(replaced.json::<Value>()["roles"], json!([ROLE_COORDINATOR]));
}

#[tokio::test]
async fn test_status_toggle_blocks_user() {
    let s = setup().await;
    let server = s.app.server();
    let admin = UserBuilder::new("root@example.com").create(s.app.db()).await;
    s.app.grant(admin.id, ROLE_SUPER_ADMIN).await;
    let admin_token = s.app.token(admin.id);

    let deactivated = server
        .patch(&format!("/users/{}/status", s.instructor_user))
        .authorization_bearer(&admin_token)
        .json(&json!({ "active": false }))
        .await;
    assert_eq!(deactivated.status_code(), StatusCode::OK);
    assert_eq!(deactivated.json::<Value>()["active"], false);

    let blocked = server
        .get("/classes?mine=1")
        .authorization_bearer(&s.instructor_token)
        .await;
    assert_eq!(blocked.status_code(), StatusCode::UNAUTHORIZED);

    let own = server
        .patch(&format!("/users/{}/status", admin.id))
        .authorization_bearer(&admin_token)
        .json(&json!({ "active": false }))
        .await;
    assert_eq!(own.status_code(), StatusCode::BAD_REQUEST);
}
