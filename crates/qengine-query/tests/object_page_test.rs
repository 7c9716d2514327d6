//! Reads through configured objects, defaults and the app listing.

mod common;

use common::{config, query_engine, FakeEngine, APP_ID, APP_NAME, STAFF_OBJECT};
use qengine_common::protocol::ErrorKind;
use qengine_query::{CellValue, Filter, TablePageRequest};
use serde_json::json;

#[tokio::test]
async fn test_configured_object_is_read_as_is() {
    let fake = FakeEngine::new();
    let engine = query_engine(fake.clone(), config());

    let page = engine
        .fetch_table_page(TablePageRequest::new(APP_NAME, "Staff").with_page(2, 10))
        .await
        .unwrap();

    assert_eq!(page.columns, vec!["EmployeeID", "Name"]);
    assert_eq!(page.total_rows, 45);
    assert_eq!(page.rows.len(), 10);
    assert_eq!(page.rows[0], vec![CellValue::Number(11.0), CellValue::Text("Employee 11".into())]);

    let journal = fake.journal();
    // No metadata session: the object carries its own shape.
    assert_eq!(journal.connects, 1);
    assert_eq!(journal.params_of("GetObject"), vec![json!([STAFF_OBJECT])]);
    assert_eq!(journal.count("CreateSessionObject"), 0);
    assert_eq!(journal.windows, vec![(10, 10)]);
    assert_eq!(engine.connections().open_sessions(), 0);
}

#[tokio::test]
async fn test_missing_object_falls_back_to_model_table() {
    let fake = FakeEngine::new();
    let engine = query_engine(fake.clone(), config());

    let page = engine
        .fetch_table_page(TablePageRequest::new(APP_NAME, "Roster").with_page(1, 5))
        .await
        .unwrap();

    assert_eq!(page.columns, vec!["EmployeeID", "Name", "Department", "Salary"]);
    assert_eq!(page.total_rows, 45);
    assert_eq!(page.rows.len(), 5);

    let journal = fake.journal();
    assert_eq!(journal.count("GetObject"), 1);
    assert_eq!(journal.count("CreateSessionObject"), 1);
    assert!(journal.live_objects.is_empty());
    assert_eq!(engine.connections().open_sessions(), 0);
}

#[tokio::test]
async fn test_object_without_hypercube_falls_back_to_model_table() {
    let fake = FakeEngine::new();
    let engine = query_engine(fake.clone(), config());

    let page = engine
        .fetch_table_page(TablePageRequest::new(APP_NAME, "Notes").with_page(9, 5))
        .await
        .unwrap();

    assert_eq!(page.columns.len(), 4);
    assert_eq!(page.rows.len(), 5);
    assert!(!page.has_next);
    assert_eq!(fake.journal().count("CreateSessionObject"), 1);
}

#[tokio::test]
async fn test_filtered_read_skips_configured_object() {
    let fake = FakeEngine::new();
    let engine = query_engine(fake.clone(), config());

    let page = engine
        .fetch_table_page(
            TablePageRequest::new(APP_NAME, "Staff").with_filter(Filter::eq("Department", "Sales")),
        )
        .await
        .unwrap();

    assert_eq!(page.total_rows, 15);
    let journal = fake.journal();
    assert_eq!(journal.count("GetObject"), 0);
    assert_eq!(journal.created_states.len(), 1);
    assert!(journal.live_states.is_empty());
}

#[tokio::test]
async fn test_default_table_and_app_listing() {
    let engine = query_engine(FakeEngine::new(), config());

    assert_eq!(engine.default_table(APP_NAME).unwrap(), "Staff");
    assert_eq!(engine.default_table(APP_ID).unwrap(), "Staff");
    assert_eq!(
        engine.default_table("Payroll").unwrap_err().kind(),
        ErrorKind::NotFound
    );

    let apps = engine.list_apps();
    assert_eq!(apps.len(), 1);
    assert_eq!((apps[0].name.as_str(), apps[0].id.as_str()), (APP_NAME, APP_ID));
}
