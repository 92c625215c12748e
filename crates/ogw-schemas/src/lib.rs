//! ogw-schemas
//!
//! Entity records and wire payload types shared by every ordergate crate.
//! Pure data: serde derives only, no IO and no business logic.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request context
// ---------------------------------------------------------------------------

/// Identity resolved from a validated bearer token.
///
/// Passed explicitly into every downstream call for the remainder of the
/// request. There is no ambient "current user" anywhere in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub uid: i64,
    pub company_id: i64,
}

// ---------------------------------------------------------------------------
// Users and tokens
// ---------------------------------------------------------------------------

/// A gateway user as stored in the entity store.
///
/// Company/contact fields are denormalized onto the user row because the
/// login profile payload needs them in one read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub login: String,
    pub active: bool,
    pub company_id: i64,
    pub company_ids: Vec<i64>,
    pub partner_id: i64,
    pub company_name: String,
    pub country: String,
    pub contact_address: String,
    pub lang: String,
    pub tz: String,
}

/// One issued access token row. The newest row (highest id) per user is the
/// only valid one; older rows fail validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Partner / geography / product
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerRecord {
    pub id: i64,
    /// External unique key. Unique across all partners.
    pub uuid: String,
    pub name: String,
    pub street: Option<String>,
    pub city: Option<String>,
}

/// Reference data: states are seeded by operators, never auto-created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRecord {
    pub id: i64,
    pub name: String,
}

/// Cities are auto-created under their state on first reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityRecord {
    pub id: i64,
    pub name: String,
    pub state_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: i64,
    /// External unique key.
    pub uuid: String,
    pub name: String,
    pub list_price: f64,
    pub standard_price: f64,
    pub size: Option<f64>,
    /// Always "order" for gateway-created products.
    pub invoice_policy: String,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Order lifecycle. Every completed workflow step is recorded here, so a
/// request that dies mid-walk leaves a resumable order behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Draft,
    Confirmed,
    Invoiced,
    Posted,
    Paid,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Draft => "draft",
            OrderState::Confirmed => "confirmed",
            OrderState::Invoiced => "invoiced",
            OrderState::Posted => "posted",
            OrderState::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(OrderState::Draft),
            "confirmed" => Ok(OrderState::Confirmed),
            "invoiced" => Ok(OrderState::Invoiced),
            "posted" => Ok(OrderState::Posted),
            "paid" => Ok(OrderState::Paid),
            other => Err(anyhow!("invalid order state: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineRecord {
    pub id: i64,
    pub product_id: i64,
    /// External product key, denormalized for response building.
    pub product_uuid: String,
    pub qty: f64,
    pub price_unit: f64,
    pub subtotal: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: i64,
    pub name: String,
    pub partner_id: i64,
    pub company_id: i64,
    pub state: OrderState,
    pub lines: Vec<OrderLineRecord>,
    /// Invariant: equals the sum of line subtotals.
    pub amount_total: f64,
}

// ---------------------------------------------------------------------------
// Invoices / journals / payments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceKind {
    CustomerInvoice,
    CustomerRefund,
}

impl InvoiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceKind::CustomerInvoice => "out_invoice",
            InvoiceKind::CustomerRefund => "out_refund",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "out_invoice" => Ok(InvoiceKind::CustomerInvoice),
            "out_refund" => Ok(InvoiceKind::CustomerRefund),
            other => Err(anyhow!("invalid invoice kind: {}", other)),
        }
    }

    /// Customer-facing kinds participate in the post/pay walk.
    pub fn is_customer_kind(&self) -> bool {
        matches!(self, InvoiceKind::CustomerInvoice | InvoiceKind::CustomerRefund)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceState {
    Draft,
    Posted,
}

impl InvoiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceState::Draft => "draft",
            InvoiceState::Posted => "posted",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(InvoiceState::Draft),
            "posted" => Ok(InvoiceState::Posted),
            other => Err(anyhow!("invalid invoice state: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: i64,
    pub order_id: i64,
    pub company_id: i64,
    pub kind: InvoiceKind,
    pub state: InvoiceState,
    pub display_name: String,
    pub amount_total: f64,
    pub amount_residual: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalKind {
    Bank,
    Cash,
}

impl JournalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalKind::Bank => "bank",
            JournalKind::Cash => "cash",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "bank" => Ok(JournalKind::Bank),
            "cash" => Ok(JournalKind::Cash),
            other => Err(anyhow!("invalid journal kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    pub id: i64,
    pub company_id: i64,
    pub kind: JournalKind,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub invoice_id: i64,
    pub journal_id: i64,
    pub amount: f64,
    pub memo: String,
    pub method: String,
    pub date: NaiveDate,
}

// ---------------------------------------------------------------------------
// Wire payloads — create-order request
// ---------------------------------------------------------------------------

/// Partner payload nested under `partner_id` in the create-order body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartnerPayload {
    pub uuid: Option<String>,
    pub name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
}

/// Product payload nested under `product_id` in an order line.
///
/// A product line implicitly encodes a geography claim: `area_provinsi` is
/// the state name (must pre-exist), `area_kota` an optional city name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductPayload {
    pub uuid: Option<String>,
    /// Product display name.
    pub komoditas: Option<String>,
    pub area_provinsi: Option<String>,
    pub area_kota: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderLinePayload {
    pub product_id: Option<ProductPayload>,
    pub qty: f64,
    pub price_unit: f64,
    /// Mirrored into list/standard price on product creation. Falls back to
    /// `price_unit` when absent.
    pub price: Option<f64>,
    pub size: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderRequest {
    pub partner_id: Option<PartnerPayload>,
    #[serde(default)]
    pub order_line: Vec<OrderLinePayload>,
}

// ---------------------------------------------------------------------------
// Wire payloads — responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSummary {
    pub uuid: String,
    pub qty: f64,
    pub price: f64,
    pub subtotal: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: i64,
    pub lines: Vec<LineSummary>,
    pub total: f64,
}

/// Successful login payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginProfile {
    pub uid: i64,
    pub user_context: serde_json::Value,
    pub company_id: i64,
    pub company_ids: Vec<i64>,
    pub partner_id: i64,
    pub access_token: String,
    pub company_name: String,
    pub country: String,
    pub contact_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_state_round_trips_through_strings() {
        for st in [
            OrderState::Draft,
            OrderState::Confirmed,
            OrderState::Invoiced,
            OrderState::Posted,
            OrderState::Paid,
        ] {
            assert_eq!(OrderState::parse(st.as_str()).unwrap(), st);
        }
        assert!(OrderState::parse("cancelled").is_err());
    }

    #[test]
    fn create_order_request_rejects_unknown_fields() {
        let raw = r#"{"partner_id":{"uuid":"p1"},"order_line":[],"evil":1}"#;
        assert!(serde_json::from_str::<CreateOrderRequest>(raw).is_err());
    }

    #[test]
    fn create_order_request_parses_nested_line() {
        let raw = r#"{
            "partner_id": {"uuid": "p1", "name": "Alice"},
            "order_line": [{
                "product_id": {"uuid": "sku1", "komoditas": "Rice", "area_provinsi": "Jakarta"},
                "price": 10, "qty": 2, "price_unit": 10
            }]
        }"#;
        let req: CreateOrderRequest = serde_json::from_str(raw).unwrap();
        let line = &req.order_line[0];
        assert_eq!(line.qty, 2.0);
        assert_eq!(line.price, Some(10.0));
        let product = line.product_id.as_ref().unwrap();
        assert_eq!(product.area_provinsi.as_deref(), Some("Jakarta"));
    }
}
