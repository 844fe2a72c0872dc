//! Catalog, orders, invoices and the daily summary against a real database.

mod common;

use common::TestApp;
use serde_json::{json, Value};
use uuid::Uuid;

fn decimal(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        other => other.as_f64().expect("decimal number"),
    }
}

async fn create_product(app: &TestApp, org_id: Uuid, name: &str, price_cents: i64) -> Uuid {
    let response = app
        .post(
            &format!("/api/orgs/{}/products", org_id),
            &app.owner_token,
            &json!({ "name": name, "price_cents": price_cents, "unit": "piece" }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    Uuid::parse_str(body["data"]["product_id"].as_str().unwrap()).unwrap()
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn order_on_credit_moves_stock_and_customer_balance() {
    let app = TestApp::spawn().await;
    let org_id = app.create_org("Duka La Mama").await;
    let product_id = create_product(&app, org_id, "Sugar 1kg", 15_000).await;

    let restock = app
        .post(
            &format!("/api/orgs/{}/products/{}/inventory", org_id, product_id),
            &app.owner_token,
            &json!({ "movement_type": "PURCHASE", "quantity": 10 }),
        )
        .await;
    assert_eq!(restock.status(), 201);

    let customer: Value = app
        .post(
            &format!("/api/orgs/{}/customers", org_id),
            &app.owner_token,
            &json!({ "name": "Wanjiku", "phone": "0712345678" }),
        )
        .await
        .json()
        .await
        .unwrap();
    let customer_id = customer["data"]["customer_id"].as_str().unwrap().to_string();

    let response = app
        .post(
            &format!("/api/orgs/{}/orders", org_id),
            &app.owner_token,
            &json!({
                "customer_id": customer_id,
                "items": [
                    { "product_id": product_id, "name": "Sugar 1kg", "unit_price_cents": 15_000, "quantity": 3 }
                ],
                "discount_cents": 5_000,
                "tender": "CASH",
                "paid_amount_cents": 20_000
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let order: Value = response.json().await.unwrap();
    assert_eq!(order["data"]["subtotal_cents"], 45_000);
    assert_eq!(order["data"]["total_cents"], 40_000);
    assert_eq!(order["data"]["paid_cents"], 20_000);
    assert_eq!(order["data"]["balance_cents"], 20_000);
    assert_eq!(order["data"]["items"].as_array().unwrap().len(), 1);

    let product: Value = app
        .get(
            &format!("/api/orgs/{}/products/{}", org_id, product_id),
            &app.owner_token,
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(decimal(&product["data"]["stock_quantity"]), 7.0);

    let customers: Value = app
        .get(&format!("/api/orgs/{}/customers", org_id), &app.owner_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(customers["data"][0]["balance_cents"], 20_000);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn order_validation_errors() {
    let app = TestApp::spawn().await;
    let org_id = app.create_org("Strict Shop").await;

    let overpaid = app
        .post(
            &format!("/api/orgs/{}/orders", org_id),
            &app.owner_token,
            &json!({
                "items": [{ "name": "Airtime", "unit_price_cents": 10_000, "quantity": 1 }],
                "tender": "CASH",
                "paid_amount_cents": 10_001
            }),
        )
        .await;
    assert_eq!(overpaid.status(), 422);

    let no_tender = app
        .post(
            &format!("/api/orgs/{}/orders", org_id),
            &app.owner_token,
            &json!({
                "items": [{ "name": "Airtime", "unit_price_cents": 10_000, "quantity": 1 }],
                "paid_amount_cents": 500
            }),
        )
        .await;
    assert_eq!(no_tender.status(), 422);

    let unknown_product = app
        .post(
            &format!("/api/orgs/{}/orders", org_id),
            &app.owner_token,
            &json!({
                "items": [{
                    "product_id": Uuid::new_v4(),
                    "name": "Ghost",
                    "unit_price_cents": 100,
                    "quantity": 1
                }]
            }),
        )
        .await;
    assert_eq!(unknown_product.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn invoice_is_numbered_and_settled_by_payments() {
    let app = TestApp::spawn().await;
    let org_id = app.create_org("Fundi Services").await;

    let response = app
        .post(
            &format!("/api/orgs/{}/invoices", org_id),
            &app.owner_token,
            &json!({
                "items": [{ "name": "Plumbing repair", "unit_price_cents": 250_000, "quantity": 1 }]
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let invoice: Value = response.json().await.unwrap();
    assert_eq!(invoice["data"]["number"], "INV-0001");
    assert_eq!(invoice["data"]["status"], "UNPAID");
    let invoice_id = invoice["data"]["invoice_id"].as_str().unwrap().to_string();

    let second: Value = app
        .post(
            &format!("/api/orgs/{}/invoices", org_id),
            &app.owner_token,
            &json!({ "items": [{ "name": "Callout", "unit_price_cents": 50_000, "quantity": 1 }] }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(second["data"]["number"], "INV-0002");

    let payments_path = format!("/api/orgs/{}/invoices/{}/payments", org_id, invoice_id);
    let partial: Value = app
        .post(
            &payments_path,
            &app.owner_token,
            &json!({ "tender": "CASH", "amount_cents": 100_000 }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(partial["data"]["invoice"]["status"], "UNPAID");
    assert_eq!(partial["data"]["invoice"]["paid_cents"], 100_000);

    let rest = app
        .post(
            &payments_path,
            &app.owner_token,
            &json!({ "tender": "MPESA", "amount_cents": 150_000, "mpesa_ref": "QKL1234XYZ" }),
        )
        .await;
    assert_eq!(rest.status(), 201);
    let rest: Value = rest.json().await.unwrap();
    assert_eq!(rest["data"]["invoice"]["status"], "PAID");

    let closed = app
        .post(
            &payments_path,
            &app.owner_token,
            &json!({ "tender": "CASH", "amount_cents": 1 }),
        )
        .await;
    assert_eq!(closed.status(), 400);

    let cancel = app
        .post(
            &format!("/api/orgs/{}/invoices/{}/cancel", org_id, invoice_id),
            &app.owner_token,
            &json!({}),
        )
        .await;
    assert_eq!(cancel.status(), 400);

    let detail: Value = app
        .get(
            &format!("/api/orgs/{}/invoices/{}", org_id, invoice_id),
            &app.owner_token,
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(detail["data"]["payments"].as_array().unwrap().len(), 2);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn daily_summary_nets_expenses_against_sales() {
    let app = TestApp::spawn().await;
    let org_id = app.create_org("Summary Shop").await;

    let order = app
        .post(
            &format!("/api/orgs/{}/orders", org_id),
            &app.owner_token,
            &json!({
                "items": [{ "name": "Chapati", "unit_price_cents": 3_000, "quantity": 10 }],
                "tender": "CASH",
                "paid_amount_cents": 30_000
            }),
        )
        .await;
    assert_eq!(order.status(), 201);

    let expense = app
        .post(
            &format!("/api/orgs/{}/expenses", org_id),
            &app.owner_token,
            &json!({ "category": "Supplies", "amount_cents": 12_000, "payee": "Unga Ltd" }),
        )
        .await;
    assert_eq!(expense.status(), 201);

    let summary: Value = app
        .get(
            &format!("/api/orgs/{}/reports/summary", org_id),
            &app.owner_token,
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(summary["data"]["sales"]["total_cents"], 30_000);
    assert_eq!(summary["data"]["sales"]["order_count"], 1);
    assert_eq!(summary["data"]["expenses"]["total_cents"], 12_000);
    assert_eq!(summary["data"]["profit"]["amount_cents"], 18_000);

    let bad_range = app
        .get(
            &format!(
                "/api/orgs/{}/reports/summary?from=2024-02-01T00:00:00Z&to=2024-01-01T00:00:00Z",
                org_id
            ),
            &app.owner_token,
        )
        .await;
    assert_eq!(bad_range.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn invalid_line_items_are_rejected() {
    let app = TestApp::spawn().await;
    let org_id = app.create_org("Line Check").await;
    let bad_items = json!({
        "items": [{ "name": "", "unit_price_cents": 100, "quantity": 0 }]
    });

    let order = app
        .post(&format!("/api/orgs/{}/orders", org_id), &app.owner_token, &bad_items)
        .await;
    assert_eq!(order.status(), 422);

    let invoice = app
        .post(&format!("/api/orgs/{}/invoices", org_id), &app.owner_token, &bad_items)
        .await;
    assert_eq!(invoice.status(), 422);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn invoice_numbering_follows_highest_number() {
    let app = TestApp::spawn().await;
    let org_id = app.create_org("Numbering Shop").await;
    let path = format!("/api/orgs/{}/invoices", org_id);
    let body = json!({ "items": [{ "name": "Service", "unit_price_cents": 1_000, "quantity": 1 }] });

    for _ in 0..2 {
        assert_eq!(app.post(&path, &app.owner_token, &body).await.status(), 201);
    }

    // A later number can carry an earlier timestamp when transactions interleave.
    app.execute_sql(
        "UPDATE invoices SET created_utc = NOW() - INTERVAL '1 day' WHERE number = 'INV-0002'",
    )
    .await;

    let third = app.post(&path, &app.owner_token, &body).await;
    assert_eq!(third.status(), 201);
    let third: Value = third.json().await.unwrap();
    assert_eq!(third["data"]["number"], "INV-0003");

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn listing_marks_past_due_invoices_overdue() {
    let app = TestApp::spawn().await;
    let org_id = app.create_org("Late Payers").await;
    let path = format!("/api/orgs/{}/invoices", org_id);

    let late = app
        .post(
            &path,
            &app.owner_token,
            &json!({
                "due_date": "2020-01-31",
                "items": [{ "name": "Old job", "unit_price_cents": 5_000, "quantity": 1 }]
            }),
        )
        .await;
    assert_eq!(late.status(), 201);
    let late: Value = late.json().await.unwrap();
    assert_eq!(late["data"]["status"], "UNPAID");

    let current = app
        .post(
            &path,
            &app.owner_token,
            &json!({ "items": [{ "name": "New job", "unit_price_cents": 5_000, "quantity": 1 }] }),
        )
        .await;
    assert_eq!(current.status(), 201);

    let overdue: Value = app
        .get(&format!("{}?status=OVERDUE", path), &app.owner_token)
        .await
        .json()
        .await
        .unwrap();
    let overdue = overdue["data"].as_array().unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0]["invoice_id"], late["data"]["invoice_id"]);

    let unpaid: Value = app
        .get(&format!("{}?status=UNPAID", path), &app.owner_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(unpaid["data"].as_array().unwrap().len(), 1);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn product_changes_are_scoped_to_the_owning_org() {
    let app = TestApp::spawn().await;
    let home = app.create_org("Home Shop").await;
    let other = app.create_org("Other Shop").await;
    let product_id = create_product(&app, home, "Maize flour", 18_000).await;

    let foreign_path = format!("/api/orgs/{}/products/{}", other, product_id);
    let home_path = format!("/api/orgs/{}/products/{}", home, product_id);

    let foreign_patch = app
        .patch(&foreign_path, &app.owner_token, &json!({ "price_cents": 1 }))
        .await;
    assert_eq!(foreign_patch.status(), 404);
    assert_eq!(app.delete(&foreign_path, &app.owner_token).await.status(), 404);

    let stranger = common::token_for("user_stranger", None);
    let stranger_patch = app
        .patch(&home_path, &stranger, &json!({ "price_cents": 1 }))
        .await;
    assert_eq!(stranger_patch.status(), 403);

    let patched = app
        .patch(&home_path, &app.owner_token, &json!({ "price_cents": 20_000 }))
        .await;
    assert_eq!(patched.status(), 200);
    let patched: Value = patched.json().await.unwrap();
    assert_eq!(patched["data"]["price_cents"], 20_000);
    assert_eq!(patched["data"]["name"], "Maize flour");

    assert_eq!(app.delete(&home_path, &app.owner_token).await.status(), 204);
    assert_eq!(app.get(&home_path, &app.owner_token).await.status(), 404);

    app.cleanup().await;
}
