mod support;

use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;
use taskflow_core::auth;
use taskflow_core::error::{GENERIC_FAILURE_MESSAGE, SESSION_EXPIRED_MESSAGE, SyncError};
use taskflow_core::lifecycle::{Operations, Phase, SubmitError, Timings};
use taskflow_core::session::{Route, Session, SessionFile};
use taskflow_core::store::EntityStore;
use taskflow_core::transport::Method;
use taskflow_core::validate::{CONFIRM, LoginDraft, PasswordDraft, TaskDraft};
use tempfile::tempdir;
use tokio::time::Instant;

use support::{ScriptedTransport, gateway, seed_lists, seed_tasks, signed_in_session};

#[tokio::test]
async fn password_mismatch_never_reaches_the_server() {
    let transport = ScriptedTransport::new();
    let gateway = gateway(&transport, signed_in_session());
    let mut ops = Operations::default();

    ops.change_password.open_with(PasswordDraft {
        old_password: "old-secret".to_string(),
        new_password: "BrandNew#2025".to_string(),
        confirm: "BrandNew#2024".to_string(),
    });
    let prepared = ops.change_password.prepare(PasswordDraft::validate);
    if let Some(change) = &prepared {
        let _ = ops
            .change_password
            .submit(auth::change_password(&gateway, change))
            .await;
    }

    assert!(prepared.is_none());
    assert_eq!(
        ops.change_password.field_errors().get(CONFIRM),
        Some("Passwords do not match")
    );
    assert_eq!(ops.change_password.phase(), &Phase::Idle);
    assert!(ops.change_password.inputs_enabled());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn change_password_posts_both_passwords() {
    let transport = ScriptedTransport::new();
    transport.json(
        Method::Post,
        "/auth/changepassword",
        200,
        json!({ "message": "Password updated" }),
    );
    let gateway = gateway(&transport, signed_in_session());
    let mut ops = Operations::default();

    ops.change_password.open_with(PasswordDraft {
        old_password: "old-secret".to_string(),
        new_password: "BrandNew#2025".to_string(),
        confirm: "BrandNew#2025".to_string(),
    });
    let change = ops
        .change_password
        .prepare(PasswordDraft::validate)
        .expect("valid form");
    ops.change_password
        .submit(auth::change_password(&gateway, &change))
        .await
        .expect("changed");

    assert_eq!(ops.change_password.phase(), &Phase::Succeeded);
    assert_eq!(
        transport.calls()[0].body,
        Some(json!({ "oldPassword": "old-secret", "newPassword": "BrandNew#2025" }))
    );
}

#[tokio::test(start_paused = true)]
async fn add_task_runs_the_full_lifecycle() {
    let transport = ScriptedTransport::new();
    transport.json(Method::Get, "/api/tasks", 200, seed_tasks());
    transport.json(Method::Get, "/api/lists", 200, seed_lists());
    let mut store = EntityStore::new(gateway(&transport, signed_in_session()));
    store.load_all().await.expect("load");

    let mut ops = Operations::new(Timings::default());
    let today = NaiveDate::from_ymd_opt(2025, 8, 20).expect("date");
    let mut draft = TaskDraft::for_categories(store.categories());
    draft.title = "Get a birthday gift for Sarah".to_string();
    draft.due_date = "2025-08-28".to_string();
    ops.add_task.open_with(draft);
    let task = ops
        .add_task
        .prepare(|draft| draft.validate_new(today))
        .expect("valid");
    assert_eq!(task.category_id, "l1");

    transport.json(Method::Post, "/api/tasks", 201, json!({}));
    transport.json(Method::Get, "/api/tasks", 200, seed_tasks());
    let started = Instant::now();
    ops.add_task
        .submit(store.create_task(&task))
        .await
        .expect("created");

    assert_eq!(ops.add_task.phase(), &Phase::Succeeded);
    assert!(!ops.add_task.inputs_enabled());
    assert_eq!(
        ops.add_task.next_deadline(),
        Some(started + Duration::from_millis(2000))
    );

    let again = ops.add_task.submit(store.create_task(&task)).await;
    assert_eq!(again, Err(SubmitError::Busy));
    assert_eq!(transport.call_count(), 4);

    ops.add_task.settle().await;
    assert!(!ops.add_task.is_open());
    assert_eq!(ops.add_task.phase(), &Phase::Idle);
    assert_eq!(ops.add_task.draft(), &TaskDraft::default());
    assert_eq!(ops.edit_task.phase(), &Phase::Idle);
}

#[tokio::test]
async fn failed_delete_surfaces_the_generic_notice_and_keeps_the_task() {
    let transport = ScriptedTransport::new();
    transport.json(Method::Get, "/api/tasks", 200, seed_tasks());
    transport.json(Method::Get, "/api/lists", 200, seed_lists());
    let mut store = EntityStore::new(gateway(&transport, signed_in_session()));
    store.load_all().await.expect("load");

    transport.json(Method::Delete, "/api/tasks/t3", 500, json!({ "message": "boom" }));
    let mut ops = Operations::default();
    ops.delete_task.open_with(Some("t3".to_string()));
    let result = ops.delete_task.submit(store.delete_task("t3")).await;

    assert!(matches!(
        result,
        Err(SubmitError::Failed(SyncError::Remote { status: 500, .. }))
    ));
    assert_eq!(ops.delete_task.error_message(), Some(GENERIC_FAILURE_MESSAGE));
    assert!(store.task("t3").is_some());
}

#[tokio::test]
async fn expired_session_during_edit_asks_for_login() {
    let transport = ScriptedTransport::new();
    transport.json(Method::Get, "/api/tasks", 200, seed_tasks());
    transport.json(Method::Get, "/api/lists", 200, seed_lists());
    let session = signed_in_session();
    let mut store = EntityStore::new(gateway(&transport, session.clone()));
    store.load_all().await.expect("load");

    transport.empty(Method::Put, "/api/tasks/t1", 401);
    let mut ops = Operations::default();
    let mut draft = TaskDraft::from_task(store.task("t1").expect("t1"));
    draft.title = "Finish Q3 financial report".to_string();
    ops.edit_task.open_with(draft);
    let today = NaiveDate::from_ymd_opt(2025, 8, 20).expect("date");
    let task = ops
        .edit_task
        .prepare(|draft| draft.validate_edit(today))
        .expect("valid");

    let _ = ops.edit_task.submit(store.update_task(&task)).await;
    assert_eq!(ops.edit_task.error_message(), Some(SESSION_EXPIRED_MESSAGE));
    assert!(ops.edit_task.requires_login());
    assert_eq!(session.initial_route(), Route::Login);
    assert_eq!(
        store.task("t1").map(|task| task.title.as_str()),
        Some("Finish Q2 financial report")
    );
}

#[tokio::test]
async fn login_persists_the_session_and_shows_server_messages() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("session.json");
    let session = Session::restore(SessionFile::new(&path)).expect("restore");
    assert_eq!(session.initial_route(), Route::Login);

    let transport = ScriptedTransport::new();
    transport.json(
        Method::Post,
        "/auth/login",
        400,
        json!({ "message": "Invalid credentials" }),
    );
    transport.json(
        Method::Post,
        "/auth/login",
        200,
        json!({
            "token": "fresh-token",
            "user": { "_id": "u1", "name": "Ada", "email": "ada@example.com" }
        }),
    );
    let gateway = gateway(&transport, session.clone());
    let mut ops = Operations::default();

    ops.login.open_with(LoginDraft {
        email: "ada@example.com".to_string(),
        password: "not-it-at-all".to_string(),
    });
    let credentials = ops.login.prepare(LoginDraft::validate).expect("valid");
    let _ = ops.login.submit(auth::login(&gateway, &credentials)).await;
    assert_eq!(ops.login.error_message(), Some("Invalid credentials"));
    assert!(!path.exists());

    let user = ops
        .login
        .submit(auth::login(&gateway, &credentials))
        .await
        .expect("second attempt");
    assert_eq!(user.name, "Ada");
    assert!(path.exists());

    let reopened = Session::restore(SessionFile::new(&path)).expect("restore again");
    assert_eq!(reopened.initial_route(), Route::Tasks);
    assert_eq!(reopened.get().as_deref(), Some("fresh-token"));

    auth::logout(&session).expect("logout");
    assert!(!path.exists());
    assert_eq!(transport.call_count(), 2);
}
