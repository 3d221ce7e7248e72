//! End-to-end batch-edit reconciliation: an edit session saving through
//! the real record service against the database.

mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use uuid::Uuid;

use stockbook_api::auth::AuthUser;
use stockbook_api::edit_session::{CellEdit, EditSession, RecordRow, SessionState};
use stockbook_api::services::RecordQuery;

fn date(y: i32, m: u32, d: u32) -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn signed_in() -> SessionState {
    SessionState::Authenticated(AuthUser {
        user_id: Uuid::new_v4(),
        name: "Test User".to_string(),
        email: "edit@example.com".to_string(),
    })
}

async fn load_page(app: &TestApp, session: &mut EditSession, topic: Uuid, page: u64) {
    let result = app
        .state
        .services
        .records
        .list(RecordQuery {
            topic_id: topic,
            search: None,
            start_date: None,
            end_date: None,
            page,
            page_size: 10,
        })
        .await
        .expect("listing failed");
    let rows: Vec<RecordRow> = result.rows.into_iter().map(Into::into).collect();
    session.load_page(page, rows, result.total);
}

#[tokio::test]
async fn batch_save_applies_edits_and_deletions() {
    let app = TestApp::new().await;
    let topic = app.seed_topic("Widgets").await;
    let keep = app
        .seed_record(topic, date(2024, 3, 2), "Keep", dec!(10), dec!(3))
        .await;
    let doomed = app
        .seed_record(topic, date(2024, 3, 1), "Drop", dec!(1), dec!(1))
        .await;

    let mut session = EditSession::new(10);
    load_page(&app, &mut session, topic, 1).await;
    session.begin_editing(&signed_in()).unwrap();

    session
        .edit_cell(1, keep.id, CellEdit::Amount(dec!(42)))
        .unwrap();
    session.mark_deleted(1, doomed.id).unwrap();
    assert_eq!(session.displayed_total(), 1);

    let outcome = session
        .save(&app.state.services.records)
        .await
        .expect("save failed");
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.deleted, 1);

    // Re-fetch: the edit landed and the deleted row is gone.
    let result = app
        .state
        .services
        .records
        .list(RecordQuery {
            topic_id: topic,
            search: None,
            start_date: None,
            end_date: None,
            page: 1,
            page_size: 10,
        })
        .await
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.rows[0].id, keep.id);
    assert_eq!(result.rows[0].amount, dec!(42));
}

#[tokio::test]
async fn delete_then_undo_then_save_touches_nothing() {
    let app = TestApp::new().await;
    let topic = app.seed_topic("Widgets").await;
    let record = app
        .seed_record(topic, date(2024, 3, 1), "Widget", dec!(5), dec!(2))
        .await;

    let mut session = EditSession::new(10);
    load_page(&app, &mut session, topic, 1).await;
    session.begin_editing(&signed_in()).unwrap();
    session.mark_deleted(1, record.id).unwrap();
    session.undo_delete(1, record.id).unwrap();

    let outcome = session
        .save(&app.state.services.records)
        .await
        .expect("save failed");
    assert_eq!(outcome.updated, 0);
    assert_eq!(outcome.deleted, 0);

    let result = app
        .state
        .services
        .records
        .list(RecordQuery {
            topic_id: topic,
            search: None,
            start_date: None,
            end_date: None,
            page: 1,
            page_size: 10,
        })
        .await
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.rows[0].amount, dec!(5));
}

#[tokio::test]
async fn save_fails_when_a_buffered_row_vanished_server_side() {
    let app = TestApp::new().await;
    let topic = app.seed_topic("Widgets").await;
    let record = app
        .seed_record(topic, date(2024, 3, 1), "Widget", dec!(5), dec!(2))
        .await;

    let mut session = EditSession::new(10);
    load_page(&app, &mut session, topic, 1).await;
    session.begin_editing(&signed_in()).unwrap();
    session
        .edit_cell(1, record.id, CellEdit::Amount(dec!(7)))
        .unwrap();

    // Another client deletes the row out from under the session.
    app.state.services.records.delete(record.id).await.unwrap();

    assert!(session.save(&app.state.services.records).await.is_err());
    // The session stays editable so the user can retry or cancel.
    assert!(session.is_editing());
}
