//! In-memory entity store.
//!
//! Mirrors the observable semantics of `PgStore`: conditional upserts keyed
//! on external ids, substring-case-insensitive geography lookups, newest-row
//! token lookups, idempotent invoice generation.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use ogw_schemas::{
    CityRecord, InvoiceKind, InvoiceRecord, InvoiceState, JournalKind, JournalRecord,
    OrderLineRecord, OrderRecord, OrderState, PartnerRecord, PaymentRecord, ProductRecord,
    StateRecord, TokenRecord, UserRecord,
};
use ogw_store::{
    EntityStore, NewOrder, NewPartner, NewPayment, NewProduct, StoreError,
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: Vec<StoredUser>,
    tokens: Vec<TokenRecord>,
    partners: Vec<PartnerRecord>,
    states: Vec<StateRecord>,
    cities: Vec<CityRecord>,
    products: Vec<ProductRecord>,
    orders: Vec<OrderRecord>,
    invoices: Vec<InvoiceRecord>,
    journals: Vec<JournalRecord>,
    payments: Vec<PaymentRecord>,
}

struct StoredUser {
    record: UserRecord,
    password: String,
}

impl Inner {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Deterministic in-memory [`EntityStore`].
pub struct MemStore {
    db_name: String,
    inner: Mutex<Inner>,
}

impl MemStore {
    /// Empty store answering for tenant `db_name`.
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Store pre-seeded with the fixtures most tests need: one company,
    /// one bank journal, an `admin`/`admin` user, and a few states.
    pub fn seeded() -> Self {
        let store = Self::new(crate::TEST_DB);
        store.add_user(crate::TEST_LOGIN, crate::TEST_PASSWORD, 1);
        store.add_journal(1, JournalKind::Bank, "Bank");
        for name in ["Jakarta", "Jawa Barat", "Jawa Timur", "Bali"] {
            store.add_state(name);
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_user(&self, login: &str, password: &str, company_id: i64) -> i64 {
        let mut inner = self.lock();
        let id = inner.next();
        inner.users.push(StoredUser {
            record: UserRecord {
                id,
                login: login.to_string(),
                active: true,
                company_id,
                company_ids: vec![company_id],
                partner_id: id,
                company_name: "Ordergate Test Co".to_string(),
                country: "Indonesia".to_string(),
                contact_address: "Jl. Test 1, Jakarta".to_string(),
                lang: "en_US".to_string(),
                tz: "UTC".to_string(),
            },
            password: password.to_string(),
        });
        id
    }

    /// Archive a user so `authenticate` answers with an access error.
    pub fn deactivate_user(&self, user_id: i64) {
        let mut inner = self.lock();
        if let Some(u) = inner.users.iter_mut().find(|u| u.record.id == user_id) {
            u.record.active = false;
        }
    }

    pub fn add_state(&self, name: &str) -> i64 {
        let mut inner = self.lock();
        let id = inner.next();
        inner.states.push(StateRecord {
            id,
            name: name.to_string(),
        });
        id
    }

    pub fn add_journal(&self, company_id: i64, kind: JournalKind, name: &str) -> i64 {
        let mut inner = self.lock();
        let id = inner.next();
        inner.journals.push(JournalRecord {
            id,
            company_id,
            kind,
            name: name.to_string(),
        });
        id
    }

    pub fn partner_count(&self) -> usize {
        self.lock().partners.len()
    }

    pub fn product_count(&self) -> usize {
        self.lock().products.len()
    }

    pub fn city_count(&self) -> usize {
        self.lock().cities.len()
    }

    pub fn payment_count(&self) -> usize {
        self.lock().payments.len()
    }

    pub fn payments(&self) -> Vec<PaymentRecord> {
        self.lock().payments.clone()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl EntityStore for MemStore {
    async fn authenticate(
        &self,
        db: &str,
        login: &str,
        password: &str,
    ) -> Result<UserRecord, StoreError> {
        if db != self.db_name {
            return Err(StoreError::UnknownDatabase(db.to_string()));
        }

        let inner = self.lock();
        let Some(user) = inner.users.iter().find(|u| u.record.login == login) else {
            return Err(StoreError::AccessDenied);
        };
        if user.password != password {
            return Err(StoreError::AccessDenied);
        }
        if !user.record.active {
            return Err(StoreError::AccessError(format!(
                "user '{}' is archived",
                login
            )));
        }
        Ok(user.record.clone())
    }

    async fn user(&self, user_id: i64) -> Result<UserRecord, StoreError> {
        self.lock()
            .users
            .iter()
            .find(|u| u.record.id == user_id)
            .map(|u| u.record.clone())
            .ok_or(StoreError::NotFound {
                entity: "user",
                id: user_id,
            })
    }

    async fn latest_token_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<TokenRecord>, StoreError> {
        Ok(self
            .lock()
            .tokens
            .iter()
            .rev()
            .find(|t| t.user_id == user_id)
            .cloned())
    }

    async fn latest_token_by_value(&self, value: &str) -> Result<Option<TokenRecord>, StoreError> {
        Ok(self
            .lock()
            .tokens
            .iter()
            .rev()
            .find(|t| t.token == value)
            .cloned())
    }

    async fn insert_token(&self, user_id: i64, value: &str) -> Result<TokenRecord, StoreError> {
        let mut inner = self.lock();
        let id = inner.next();
        let record = TokenRecord {
            id,
            user_id,
            token: value.to_string(),
            created_at: Utc::now(),
        };
        inner.tokens.push(record.clone());
        Ok(record)
    }

    async fn find_partner_by_uuid(&self, uuid: &str) -> Result<Option<PartnerRecord>, StoreError> {
        Ok(self
            .lock()
            .partners
            .iter()
            .find(|p| p.uuid == uuid)
            .cloned())
    }

    async fn upsert_partner(&self, partner: &NewPartner) -> Result<PartnerRecord, StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner.partners.iter().find(|p| p.uuid == partner.uuid) {
            return Ok(existing.clone());
        }
        let id = inner.next();
        let record = PartnerRecord {
            id,
            uuid: partner.uuid.clone(),
            name: partner.name.clone(),
            street: partner.street.clone(),
            city: partner.city.clone(),
        };
        inner.partners.push(record.clone());
        Ok(record)
    }

    async fn find_state(&self, name: &str) -> Result<Option<StateRecord>, StoreError> {
        Ok(self
            .lock()
            .states
            .iter()
            .find(|s| contains_ci(&s.name, name))
            .cloned())
    }

    async fn upsert_city(&self, name: &str, state_id: i64) -> Result<CityRecord, StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .cities
            .iter()
            .find(|c| c.state_id == state_id && contains_ci(&c.name, name))
        {
            return Ok(existing.clone());
        }
        let id = inner.next();
        let record = CityRecord {
            id,
            name: name.to_string(),
            state_id,
        };
        inner.cities.push(record.clone());
        Ok(record)
    }

    async fn find_product_by_uuid(&self, uuid: &str) -> Result<Option<ProductRecord>, StoreError> {
        Ok(self
            .lock()
            .products
            .iter()
            .find(|p| p.uuid == uuid)
            .cloned())
    }

    async fn upsert_product(&self, product: &NewProduct) -> Result<ProductRecord, StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner.products.iter().find(|p| p.uuid == product.uuid) {
            return Ok(existing.clone());
        }
        let id = inner.next();
        let record = ProductRecord {
            id,
            uuid: product.uuid.clone(),
            name: product.name.clone(),
            list_price: product.list_price,
            standard_price: product.standard_price,
            size: product.size,
            invoice_policy: "order".to_string(),
        };
        inner.products.push(record.clone());
        Ok(record)
    }

    async fn create_order(&self, order: &NewOrder) -> Result<OrderRecord, StoreError> {
        let mut inner = self.lock();
        let order_id = inner.next();

        let mut lines = Vec::with_capacity(order.lines.len());
        let mut total = 0.0;
        for line in &order.lines {
            let line_id = inner.next();
            let subtotal = line.qty * line.price_unit;
            total += subtotal;
            lines.push(OrderLineRecord {
                id: line_id,
                product_id: line.product_id,
                product_uuid: line.product_uuid.clone(),
                qty: line.qty,
                price_unit: line.price_unit,
                subtotal,
            });
        }

        let record = OrderRecord {
            id: order_id,
            name: format!("SO{order_id:05}"),
            partner_id: order.partner_id,
            company_id: order.company_id,
            state: OrderState::Draft,
            lines,
            amount_total: total,
        };
        inner.orders.push(record.clone());
        Ok(record)
    }

    async fn order(&self, order_id: i64) -> Result<OrderRecord, StoreError> {
        self.lock()
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "order",
                id: order_id,
            })
    }

    async fn set_order_state(&self, order_id: i64, state: OrderState) -> Result<(), StoreError> {
        let mut inner = self.lock();
        match inner.orders.iter_mut().find(|o| o.id == order_id) {
            Some(order) => {
                order.state = state;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "order",
                id: order_id,
            }),
        }
    }

    async fn create_invoices_for_order(
        &self,
        order_id: i64,
    ) -> Result<Vec<InvoiceRecord>, StoreError> {
        let mut inner = self.lock();

        let existing: Vec<InvoiceRecord> = inner
            .invoices
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect();
        if !existing.is_empty() {
            return Ok(existing);
        }

        let (company_id, amount_total) = match inner.orders.iter().find(|o| o.id == order_id) {
            Some(order) => (order.company_id, order.amount_total),
            None => {
                return Err(StoreError::NotFound {
                    entity: "order",
                    id: order_id,
                })
            }
        };

        let id = inner.next();
        let record = InvoiceRecord {
            id,
            order_id,
            company_id,
            kind: InvoiceKind::CustomerInvoice,
            state: InvoiceState::Draft,
            display_name: format!("INV{id:05}"),
            amount_total,
            amount_residual: amount_total,
        };
        inner.invoices.push(record.clone());
        Ok(vec![record])
    }

    async fn invoices_for_order(&self, order_id: i64) -> Result<Vec<InvoiceRecord>, StoreError> {
        Ok(self
            .lock()
            .invoices
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn post_invoice(&self, invoice_id: i64) -> Result<InvoiceRecord, StoreError> {
        let mut inner = self.lock();
        match inner.invoices.iter_mut().find(|i| i.id == invoice_id) {
            Some(invoice) => {
                invoice.state = InvoiceState::Posted;
                Ok(invoice.clone())
            }
            None => Err(StoreError::NotFound {
                entity: "invoice",
                id: invoice_id,
            }),
        }
    }

    async fn first_payment_journal(
        &self,
        company_id: i64,
    ) -> Result<Option<JournalRecord>, StoreError> {
        Ok(self
            .lock()
            .journals
            .iter()
            .find(|j| {
                j.company_id == company_id
                    && matches!(j.kind, JournalKind::Bank | JournalKind::Cash)
            })
            .cloned())
    }

    async fn register_payment(&self, payment: &NewPayment) -> Result<PaymentRecord, StoreError> {
        let mut inner = self.lock();

        match inner
            .invoices
            .iter_mut()
            .find(|i| i.id == payment.invoice_id)
        {
            Some(invoice) => {
                invoice.amount_residual = (invoice.amount_residual - payment.amount).max(0.0);
            }
            None => {
                return Err(StoreError::NotFound {
                    entity: "invoice",
                    id: payment.invoice_id,
                })
            }
        }

        let id = inner.next();
        let record = PaymentRecord {
            id,
            invoice_id: payment.invoice_id,
            journal_id: payment.journal_id,
            amount: payment.amount,
            memo: payment.memo.clone(),
            method: payment.method.clone(),
            date: payment.date,
        };
        inner.payments.push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_partner_is_idempotent() {
        let store = MemStore::new("t");
        let p = NewPartner {
            uuid: "p1".into(),
            name: "Alice".into(),
            street: None,
            city: None,
        };
        let a = store.upsert_partner(&p).await.unwrap();
        let b = store.upsert_partner(&p).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.partner_count(), 1);
    }

    #[tokio::test]
    async fn state_lookup_is_case_insensitive_substring() {
        let store = MemStore::seeded();
        assert!(store.find_state("jakarta").await.unwrap().is_some());
        assert!(store.find_state("awa bar").await.unwrap().is_some());
        assert!(store.find_state("Sumatra").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invoice_generation_is_idempotent() {
        let store = MemStore::seeded();
        let product = store
            .upsert_product(&NewProduct {
                uuid: "sku1".into(),
                name: "Rice".into(),
                list_price: 10.0,
                standard_price: 10.0,
                size: None,
            })
            .await
            .unwrap();
        let partner = store
            .upsert_partner(&NewPartner {
                uuid: "p1".into(),
                name: "Alice".into(),
                street: None,
                city: None,
            })
            .await
            .unwrap();
        let order = store
            .create_order(&NewOrder {
                partner_id: partner.id,
                company_id: 1,
                lines: vec![ogw_store::NewOrderLine {
                    product_id: product.id,
                    product_uuid: product.uuid.clone(),
                    qty: 2.0,
                    price_unit: 10.0,
                }],
            })
            .await
            .unwrap();

        let first = store.create_invoices_for_order(order.id).await.unwrap();
        let second = store.create_invoices_for_order(order.id).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].amount_total, 20.0);
    }
}
