//! ogw-store
//!
//! The entity-store boundary: a transactional collection store for the
//! sales/ordering entity graph (users, tokens, partners, geography, products,
//! orders, invoices, payments).
//!
//! The rest of the system only sees the [`EntityStore`] trait. `PgStore` is
//! the production Postgres implementation; `ogw-testkit` ships a
//! deterministic in-memory one for tests.
//!
//! Find-or-create races on external keys are closed HERE, not in callers:
//! every `upsert_*` is a conditional insert backed by a unique index, so two
//! concurrent requests resolving the same key converge on one row.

pub mod pg;

pub use pg::PgStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use ogw_schemas::{
    CityRecord, InvoiceRecord, JournalRecord, OrderRecord, OrderState, PartnerRecord,
    PaymentRecord, ProductRecord, StateRecord, TokenRecord, UserRecord,
};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    /// The tenant identifier does not name a database this gateway serves.
    #[error("unknown database '{0}'")]
    UnknownDatabase(String),

    /// Login, password or db invalid.
    #[error("login, password or db invalid")]
    AccessDenied,

    /// Authenticated but not authorized (e.g. archived user).
    #[error("access error: {0}")]
    AccessError(String),

    /// A unique-key constraint was violated on create/update.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error(transparent)]
    Backend(#[from] sqlx::Error),
}

// ---------------------------------------------------------------------------
// New-row inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewPartner {
    pub uuid: String,
    pub name: String,
    pub street: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub uuid: String,
    pub name: String,
    pub list_price: f64,
    pub standard_price: f64,
    pub size: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub product_id: i64,
    pub product_uuid: String,
    pub qty: f64,
    pub price_unit: f64,
}

/// An order plus its full line set; created atomically.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub partner_id: i64,
    pub company_id: i64,
    pub lines: Vec<NewOrderLine>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub invoice_id: i64,
    pub journal_id: i64,
    pub amount: f64,
    pub memo: String,
    pub method: String,
    pub date: NaiveDate,
}

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

/// Transactional collection store for the ordergate entity graph.
///
/// All lookups that feed "most-recent-wins" logic (tokens) order by id
/// descending; all first-match lookups (journals) use natural id order.
#[async_trait]
pub trait EntityStore: Send + Sync {
    // --- users / auth ---

    /// Authenticate `login`/`password` against tenant `db`.
    ///
    /// Errors: [`StoreError::UnknownDatabase`] when `db` is not served here,
    /// [`StoreError::AccessDenied`] on bad credentials,
    /// [`StoreError::AccessError`] for an archived user.
    async fn authenticate(&self, db: &str, login: &str, password: &str)
        -> Result<UserRecord, StoreError>;

    async fn user(&self, user_id: i64) -> Result<UserRecord, StoreError>;

    // --- tokens ---

    /// Newest token row for `user_id`, if any.
    async fn latest_token_for_user(&self, user_id: i64) -> Result<Option<TokenRecord>, StoreError>;

    /// Newest token row whose stored value equals `value`, if any.
    async fn latest_token_by_value(&self, value: &str) -> Result<Option<TokenRecord>, StoreError>;

    async fn insert_token(&self, user_id: i64, value: &str) -> Result<TokenRecord, StoreError>;

    // --- partners / geography / products ---

    async fn find_partner_by_uuid(&self, uuid: &str) -> Result<Option<PartnerRecord>, StoreError>;

    /// Conditional insert keyed on `uuid`; returns the surviving row.
    async fn upsert_partner(&self, partner: &NewPartner) -> Result<PartnerRecord, StoreError>;

    /// Case-insensitive substring match on state name. States are reference
    /// data and are never created here.
    async fn find_state(&self, name: &str) -> Result<Option<StateRecord>, StoreError>;

    /// Case-insensitive substring match scoped to `state_id`, creating the
    /// city when absent.
    async fn upsert_city(&self, name: &str, state_id: i64) -> Result<CityRecord, StoreError>;

    async fn find_product_by_uuid(&self, uuid: &str) -> Result<Option<ProductRecord>, StoreError>;

    /// Conditional insert keyed on `uuid`; returns the surviving row.
    /// Gateway-created products always carry invoice policy "order".
    async fn upsert_product(&self, product: &NewProduct) -> Result<ProductRecord, StoreError>;

    // --- orders ---

    /// Create an order and its full line set in one transaction. The order
    /// starts in [`OrderState::Draft`] with `amount_total` equal to the sum
    /// of line subtotals.
    async fn create_order(&self, order: &NewOrder) -> Result<OrderRecord, StoreError>;

    async fn order(&self, order_id: i64) -> Result<OrderRecord, StoreError>;

    async fn set_order_state(&self, order_id: i64, state: OrderState) -> Result<(), StoreError>;

    // --- invoices / payments ---

    /// Generate the customer invoice covering the order.
    ///
    /// Idempotent: when invoices already exist for the order they are
    /// returned unchanged, so a resumed workflow never double-bills.
    async fn create_invoices_for_order(&self, order_id: i64)
        -> Result<Vec<InvoiceRecord>, StoreError>;

    async fn invoices_for_order(&self, order_id: i64) -> Result<Vec<InvoiceRecord>, StoreError>;

    /// Draft -> Posted. Posting an already-posted invoice is a no-op.
    async fn post_invoice(&self, invoice_id: i64) -> Result<InvoiceRecord, StoreError>;

    /// First bank-or-cash journal for the company in natural id order.
    async fn first_payment_journal(&self, company_id: i64)
        -> Result<Option<JournalRecord>, StoreError>;

    /// Register a payment and clear the invoice residual by `amount`.
    async fn register_payment(&self, payment: &NewPayment) -> Result<PaymentRecord, StoreError>;
}
