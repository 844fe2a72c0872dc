//! Expenses and tasks.

mod common;

use common::{token_for, TestApp, OWNER_USER_ID};
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn expenses_only_accept_outlets_of_the_org() {
    let app = TestApp::spawn().await;
    let org_id = app.create_org("Matatu Stage Kiosk").await;
    let other_org = app.create_org("Neighbour Kiosk").await;
    let own_outlet = app.main_outlet(org_id).await;
    let foreign_outlet = app.main_outlet(other_org).await;
    let path = format!("/api/orgs/{}/expenses", org_id);

    let foreign = app
        .post(
            &path,
            &app.owner_token,
            &json!({ "category": "Rent", "amount_cents": 500_000, "outlet_id": foreign_outlet }),
        )
        .await;
    assert_eq!(foreign.status(), 404);

    let unknown = app
        .post(
            &path,
            &app.owner_token,
            &json!({ "category": "Rent", "amount_cents": 500_000, "outlet_id": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(unknown.status(), 404);

    let created = app
        .post(
            &path,
            &app.owner_token,
            &json!({ "category": "Rent", "amount_cents": 500_000, "outlet_id": own_outlet }),
        )
        .await;
    assert_eq!(created.status(), 201);
    let created: Value = created.json().await.unwrap();
    assert_eq!(created["data"]["outlet_id"], own_outlet.to_string());
    assert_eq!(created["data"]["created_by"], OWNER_USER_ID);

    let unassigned = app
        .post(
            &path,
            &app.owner_token,
            &json!({ "category": "Transport", "amount_cents": 20_000 }),
        )
        .await;
    assert_eq!(unassigned.status(), 201);

    let by_outlet: Value = app
        .get(&format!("{}?outlet={}", path, own_outlet), &app.owner_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(by_outlet["data"].as_array().unwrap().len(), 1);

    let by_category: Value = app
        .get(&format!("{}?category=Transport", path), &app.owner_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(by_category["data"].as_array().unwrap().len(), 1);
    assert_eq!(by_category["data"][0]["amount_cents"], 20_000);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn tasks_are_created_listed_and_completed() {
    let app = TestApp::spawn().await;
    let org_id = app.create_org("Bakery").await;
    let path = format!("/api/orgs/{}/tasks", org_id);

    let ghost = app
        .post(
            &path,
            &app.owner_token,
            &json!({ "title": "Count stock", "assigned_to": "user_ghost" }),
        )
        .await;
    assert_eq!(ghost.status(), 400);

    let stranger = token_for("user_stranger", None);
    let forbidden = app
        .post(&path, &stranger, &json!({ "title": "Count stock" }))
        .await;
    assert_eq!(forbidden.status(), 403);

    let created = app
        .post(
            &path,
            &app.owner_token,
            &json!({
                "title": "Count stock",
                "assigned_to": OWNER_USER_ID,
                "due_date": "2030-06-30"
            }),
        )
        .await;
    assert_eq!(created.status(), 201);
    let created: Value = created.json().await.unwrap();
    let task_id = created["data"]["task_id"].as_str().unwrap().to_string();
    assert!(created["data"]["completed_utc"].is_null());

    let open: Value = app
        .get(&format!("{}?assigned_to={}", path, OWNER_USER_ID), &app.owner_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(open["data"].as_array().unwrap().len(), 1);

    let complete_path = format!("{}/{}/complete", path, task_id);
    let completed = app.post(&complete_path, &app.owner_token, &json!({})).await;
    assert_eq!(completed.status(), 200);
    let completed: Value = completed.json().await.unwrap();
    assert!(!completed["data"]["completed_utc"].is_null());

    let open: Value = app
        .get(&path, &app.owner_token)
        .await
        .json()
        .await
        .unwrap();
    assert!(open["data"].as_array().unwrap().is_empty());

    let all: Value = app
        .get(&format!("{}?include_completed=true", path), &app.owner_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(all["data"].as_array().unwrap().len(), 1);

    let missing = app
        .post(
            &format!("{}/{}/complete", path, Uuid::new_v4()),
            &app.owner_token,
            &json!({}),
        )
        .await;
    assert_eq!(missing.status(), 404);

    app.cleanup().await;
}
