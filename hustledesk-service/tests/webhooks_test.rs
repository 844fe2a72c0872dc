//! Public M-Pesa and Stripe callbacks.

mod common;

use chrono::Utc;
use common::{TestApp, TEST_WEBHOOK_SECRET};
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::utils::hmac_sha256_hex;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn open_invoice(app: &TestApp, org_id: Uuid, amount_cents: i64) -> (String, String) {
    let invoice: Value = app
        .post(
            &format!("/api/orgs/{}/invoices", org_id),
            &app.owner_token,
            &json!({ "items": [{ "name": "Tailoring", "unit_price_cents": amount_cents, "quantity": 1 }] }),
        )
        .await
        .json()
        .await
        .unwrap();
    (
        invoice["data"]["invoice_id"].as_str().unwrap().to_string(),
        invoice["data"]["number"].as_str().unwrap().to_string(),
    )
}

async fn post_public(app: &TestApp, path: &str, body: &Value) -> reqwest::Response {
    app.client
        .post(app.url(path))
        .json(body)
        .send()
        .await
        .expect("Failed to execute request")
}

fn stripe_signature(body: &str, timestamp: i64) -> String {
    let signed = format!("{}.{}", timestamp, body);
    let v1 = hmac_sha256_hex(TEST_WEBHOOK_SECRET.as_bytes(), signed.as_bytes()).unwrap();
    format!("t={},v1={}", timestamp, v1)
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn c2b_payment_settles_invoice_once() {
    let app = TestApp::spawn().await;
    let org_id = app.create_org("Tailor Shop").await;
    let (invoice_id, number) = open_invoice(&app, org_id, 250_000).await;

    let callback = json!({
        "TransactionType": "Pay Bill",
        "TransID": "RKT7ABCD12",
        "TransAmount": "2500.00",
        "BusinessShortCode": "600000",
        "BillRefNumber": number,
        "MSISDN": "0712345678",
        "FirstName": "Achieng"
    });

    let response = post_public(&app, "/api/mpesa/c2b/webhook", &callback).await;
    assert_eq!(response.status(), 200);
    let ack: Value = response.json().await.unwrap();
    assert_eq!(ack, json!({ "ResultCode": 0, "ResultDesc": "Accepted" }));

    // Safaricom retries must not pay twice.
    let replay = post_public(&app, "/api/mpesa/c2b/webhook", &callback).await;
    assert_eq!(replay.status(), 200);

    let detail: Value = app
        .get(
            &format!("/api/orgs/{}/invoices/{}", org_id, invoice_id),
            &app.owner_token,
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(detail["data"]["status"], "PAID");
    assert_eq!(detail["data"]["paid_cents"], 250_000);
    assert_eq!(detail["data"]["payments"].as_array().unwrap().len(), 1);
    assert_eq!(detail["data"]["payments"][0]["tender"], "MPESA");

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn c2b_receipt_already_recorded_manually_is_acknowledged() {
    let app = TestApp::spawn().await;
    let org_id = app.create_org("Cyber Cafe").await;
    let (invoice_id, number) = open_invoice(&app, org_id, 250_000).await;

    let manual = app
        .post(
            &format!("/api/orgs/{}/invoices/{}/payments", org_id, invoice_id),
            &app.owner_token,
            &json!({ "tender": "MPESA", "amount_cents": 100_000, "mpesa_ref": "RKT7DUPL01" }),
        )
        .await;
    assert_eq!(manual.status(), 201);

    let callback = json!({
        "TransID": "RKT7DUPL01",
        "TransAmount": "1000.00",
        "BillRefNumber": number,
        "MSISDN": "254712345678"
    });
    let response = post_public(&app, "/api/mpesa/c2b/webhook", &callback).await;
    assert_eq!(response.status(), 200);
    let ack: Value = response.json().await.unwrap();
    assert_eq!(ack["ResultCode"], 0);

    let detail: Value = app
        .get(
            &format!("/api/orgs/{}/invoices/{}", org_id, invoice_id),
            &app.owner_token,
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(detail["data"]["paid_cents"], 100_000);
    assert_eq!(detail["data"]["status"], "UNPAID");
    assert_eq!(detail["data"]["payments"].as_array().unwrap().len(), 1);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn c2b_without_matching_invoice_is_acknowledged() {
    let app = TestApp::spawn().await;

    let response = post_public(
        &app,
        "/api/mpesa/c2b/webhook",
        &json!({ "TransID": "RKT7NOMATCH", "TransAmount": "100", "BillRefNumber": "INV-9999" }),
    )
    .await;
    assert_eq!(response.status(), 200);

    let malformed = post_public(&app, "/api/mpesa/c2b/webhook", &json!({ "TransAmount": "100" })).await;
    assert_eq!(malformed.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn stk_callback_requires_body_and_tolerates_unknown_checkout() {
    let app = TestApp::spawn().await;

    let missing = post_public(&app, "/api/mpesa/stk/webhook", &json!({ "foo": "bar" })).await;
    assert_eq!(missing.status(), 400);

    let unknown = post_public(
        &app,
        "/api/mpesa/stk/webhook",
        &json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_UNKNOWN",
                    "ResultCode": 1032,
                    "ResultDesc": "Request cancelled by user"
                }
            }
        }),
    )
    .await;
    assert_eq!(unknown.status(), 200);

    app.cleanup().await;
}

async fn daraja_mock(checkout_request_id: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "tok_test", "expires_in": "3599" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": checkout_request_id,
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        })))
        .expect(1)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn stk_success_settles_invoice_through_pending_request() {
    let checkout_request_id = "ws_CO_191220191020363925";
    let daraja = daraja_mock(checkout_request_id).await;
    let app = TestApp::spawn_with(|config| {
        config.mpesa.consumer_key = Some(Secret::new("key".to_string()));
        config.mpesa.consumer_secret = Some(Secret::new("secret".to_string()));
        config.mpesa.shortcode = Some("174379".to_string());
        config.mpesa.passkey = Some(Secret::new("passkey".to_string()));
        config.mpesa.base_url = daraja.uri();
    })
    .await;
    let org_id = app.create_org("Salon").await;
    let (invoice_id, _) = open_invoice(&app, org_id, 150_000).await;

    let push = app
        .post(
            &format!("/api/orgs/{}/invoices/{}/stk", org_id, invoice_id),
            &app.owner_token,
            &json!({ "phone": "254712345678" }),
        )
        .await;
    assert_eq!(push.status(), 200);
    let push: Value = push.json().await.unwrap();
    assert_eq!(push["data"]["checkout_request_id"], checkout_request_id);
    assert_eq!(push["data"]["amount_kes"], 1500);

    let callback = json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": checkout_request_id,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        { "Name": "Amount", "Value": 1500 },
                        { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                        { "Name": "PhoneNumber", "Value": 254712345678u64 }
                    ]
                }
            }
        }
    });
    for _ in 0..2 {
        let response = post_public(&app, "/api/mpesa/stk/webhook", &callback).await;
        assert_eq!(response.status(), 200);
    }

    let detail: Value = app
        .get(
            &format!("/api/orgs/{}/invoices/{}", org_id, invoice_id),
            &app.owner_token,
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(detail["data"]["status"], "PAID");
    assert_eq!(detail["data"]["paid_cents"], 150_000);
    let payments = detail["data"]["payments"].as_array().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["mpesa_ref"], "NLJ7RT61SV");

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn stk_push_is_unavailable_without_credentials() {
    let app = TestApp::spawn().await;
    let org_id = app.create_org("No Daraja").await;
    let (invoice_id, _) = open_invoice(&app, org_id, 10_000).await;

    let response = app
        .post(
            &format!("/api/orgs/{}/invoices/{}/stk", org_id, invoice_id),
            &app.owner_token,
            &json!({ "phone": "254712345678" }),
        )
        .await;
    assert_eq!(response.status(), 503);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL at TEST_DATABASE_URL"]
async fn stripe_webhook_checks_signature_and_deduplicates() {
    let app = TestApp::spawn().await;
    let body = json!({
        "id": "evt_test_deleted",
        "type": "customer.subscription.deleted",
        "data": { "object": { "id": "sub_123", "customer": "cus_unknown" } }
    })
    .to_string();

    let unsigned = app
        .client
        .post(app.url("/api/billing/webhook"))
        .header("content-type", "application/json")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(unsigned.status(), 400);

    let forged = app
        .client
        .post(app.url("/api/billing/webhook"))
        .header("stripe-signature", format!("t={},v1=deadbeef", Utc::now().timestamp()))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), 400);

    for _ in 0..2 {
        let response = app
            .client
            .post(app.url("/api/billing/webhook"))
            .header("stripe-signature", stripe_signature(&body, Utc::now().timestamp()))
            .body(body.clone())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let ack: Value = response.json().await.unwrap();
        assert_eq!(ack["received"], true);
    }

    let stale = app
        .client
        .post(app.url("/api/billing/webhook"))
        .header(
            "stripe-signature",
            stripe_signature(&body, Utc::now().timestamp() - 3600),
        )
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(stale.status(), 400);

    app.cleanup().await;
}
