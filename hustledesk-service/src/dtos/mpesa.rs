//! Daraja callback payloads.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Body every M-Pesa callback must be answered with.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl WebhookAck {
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Accepted".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub token: Option<String>,
}

/// Customer-to-business confirmation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct C2bCallback {
    pub transaction_type: Option<String>,
    #[serde(rename = "TransID")]
    pub trans_id: String,
    pub trans_time: Option<String>,
    pub trans_amount: Decimal,
    pub business_short_code: Option<String>,
    pub bill_ref_number: Option<String>,
    pub invoice_number: Option<String>,
    #[serde(rename = "MSISDN")]
    pub msisdn: Option<String>,
    pub first_name: Option<String>,
}

impl C2bCallback {
    /// Account reference the customer typed: bill ref, else invoice number.
    pub fn account_reference(&self) -> Option<&str> {
        [&self.bill_ref_number, &self.invoice_number]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: Option<StkCallbackBody>,
}

#[derive(Debug, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: serde_json::Value,
    pub result_desc: Option<String>,
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub item: Vec<CallbackItem>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: Option<serde_json::Value>,
}

/// `CallbackMetadata.Item` flattened into the fields we store.
#[derive(Debug, Default, PartialEq)]
pub struct StkMetadata {
    pub amount: Option<Decimal>,
    pub receipt_number: Option<String>,
    pub phone_number: Option<String>,
}

fn value_as_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl StkCallback {
    /// Daraja sends the result code as a number, some gateways as a string.
    pub fn succeeded(&self) -> bool {
        value_as_string(&self.result_code).as_deref() == Some("0")
    }

    pub fn metadata(&self) -> StkMetadata {
        let mut meta = StkMetadata::default();
        let items = self
            .callback_metadata
            .as_ref()
            .map(|m| m.item.as_slice())
            .unwrap_or_default();
        for item in items {
            let Some(value) = item.value.as_ref().and_then(value_as_string) else {
                continue;
            };
            match item.name.as_str() {
                "Amount" => meta.amount = value.parse().ok(),
                "MpesaReceiptNumber" => meta.receipt_number = Some(value),
                "PhoneNumber" => meta.phone_number = Some(value),
                _ => {}
            }
        }
        meta
    }
}
