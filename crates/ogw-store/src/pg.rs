//! Postgres-backed [`EntityStore`].
//!
//! All queries are runtime `sqlx::query` + `try_get` — no compile-time
//! checked macros, so the crate builds without a live database. Schema is
//! applied through embedded migrations (`./migrations`).

use async_trait::async_trait;
use chrono::Utc;
use ogw_schemas::{
    CityRecord, InvoiceKind, InvoiceRecord, InvoiceState, JournalKind, JournalRecord,
    OrderLineRecord, OrderRecord, OrderState, PartnerRecord, PaymentRecord, ProductRecord,
    StateRecord, TokenRecord, UserRecord,
};
use sha2::{Digest, Sha256};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};

use crate::{
    EntityStore, NewOrder, NewPartner, NewPayment, NewProduct, StoreError,
};

pub const ENV_DB_URL: &str = "OGW_DATABASE_URL";
pub const ENV_DB_NAME: &str = "OGW_DB_NAME";

/// Tenant name answered when `OGW_DB_NAME` is unset.
const DEFAULT_DB_NAME: &str = "ordergate";

/// Postgres entity store for one tenant database.
///
/// Multi-tenant routing is out of scope: the gateway passes the tenant
/// identifier through and this store accepts exactly one.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    db_name: String,
}

/// Stored password digest: sha256 over `login ":" password`, hex-encoded.
/// The login acts as a per-user salt so equal passwords hash differently.
pub fn hash_password(login: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(login.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl PgStore {
    /// Connect using `OGW_DATABASE_URL` / `OGW_DB_NAME`.
    pub async fn connect_from_env() -> anyhow::Result<Self> {
        use anyhow::Context;

        let url = std::env::var(ENV_DB_URL)
            .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
        let db_name =
            std::env::var(ENV_DB_NAME).unwrap_or_else(|_| DEFAULT_DB_NAME.to_string());

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&url)
            .await
            .context("failed to connect to Postgres")?;

        Ok(Self { pool, db_name })
    }

    pub fn new(pool: PgPool, db_name: impl Into<String>) -> Self {
        Self {
            pool,
            db_name: db_name.into(),
        }
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        use anyhow::Context;
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("db migrate failed")?;
        Ok(())
    }

    /// Connectivity + schema presence (used by `ogw db status`).
    pub async fn status(&self) -> anyhow::Result<PgStatus> {
        use anyhow::Context;

        let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
            .fetch_one(&self.pool)
            .await
            .context("status connectivity query failed")?;

        let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
            r#"
            select exists (
                select 1
                from information_schema.tables
                where table_schema='public' and table_name='orders'
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("status table-exists query failed")?;

        Ok(PgStatus {
            ok: one == 1,
            has_schema: exists,
        })
    }

    // --- operator inserts (CLI surface, not part of the EntityStore trait) ---

    pub async fn insert_user(&self, user: &NewUser) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            insert into users (
              login, password_digest, active, company_id, company_ids, partner_id,
              company_name, country, contact_address, lang, tz
            ) values ($1, $2, true, $3, $4, $5, $6, $7, $8, $9, $10)
            returning id
            "#,
        )
        .bind(&user.login)
        .bind(hash_password(&user.login, &user.password))
        .bind(user.company_id)
        .bind(sqlx::types::Json(user.company_ids.clone()))
        .bind(user.partner_id)
        .bind(&user.company_name)
        .bind(&user.country)
        .bind(&user.contact_address)
        .bind(&user.lang)
        .bind(&user.tz)
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate_or_backend("users.login"))?;

        Ok(row.try_get("id")?)
    }

    pub async fn insert_state(&self, name: &str) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            insert into states (name) values ($1)
            on conflict (lower(name)) do update set name = excluded.name
            returning id
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    pub async fn insert_journal(
        &self,
        company_id: i64,
        kind: JournalKind,
        name: &str,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            insert into journals (company_id, kind, name) values ($1, $2, $3)
            returning id
            "#,
        )
        .bind(company_id)
        .bind(kind.as_str())
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }
}

#[derive(Debug, Clone)]
pub struct PgStatus {
    pub ok: bool,
    pub has_schema: bool,
}

/// Operator-created user row. Password is hashed on insert.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub login: String,
    pub password: String,
    pub company_id: i64,
    pub company_ids: Vec<i64>,
    pub partner_id: i64,
    pub company_name: String,
    pub country: String,
    pub contact_address: String,
    pub lang: String,
    pub tz: String,
}

/// Map unique-violation Postgres errors onto [`StoreError::DuplicateKey`].
fn duplicate_or_backend(key: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::DuplicateKey(key.to_string())
        }
        _ => StoreError::Backend(e),
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn user_from_row(row: &PgRow) -> Result<UserRecord, StoreError> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        login: row.try_get("login")?,
        active: row.try_get("active")?,
        company_id: row.try_get("company_id")?,
        company_ids: row
            .try_get::<sqlx::types::Json<Vec<i64>>, _>("company_ids")?
            .0,
        partner_id: row.try_get("partner_id")?,
        company_name: row.try_get("company_name")?,
        country: row.try_get("country")?,
        contact_address: row.try_get("contact_address")?,
        lang: row.try_get("lang")?,
        tz: row.try_get("tz")?,
    })
}

fn token_from_row(row: &PgRow) -> Result<TokenRecord, StoreError> {
    Ok(TokenRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        token: row.try_get("token")?,
        created_at: row.try_get("created_at")?,
    })
}

fn partner_from_row(row: &PgRow) -> Result<PartnerRecord, StoreError> {
    Ok(PartnerRecord {
        id: row.try_get("id")?,
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        street: row.try_get("street")?,
        city: row.try_get("city")?,
    })
}

fn product_from_row(row: &PgRow) -> Result<ProductRecord, StoreError> {
    Ok(ProductRecord {
        id: row.try_get("id")?,
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        list_price: row.try_get("list_price")?,
        standard_price: row.try_get("standard_price")?,
        size: row.try_get("size")?,
        invoice_policy: row.try_get("invoice_policy")?,
    })
}

fn invoice_from_row(row: &PgRow) -> Result<InvoiceRecord, StoreError> {
    Ok(InvoiceRecord {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        company_id: row.try_get("company_id")?,
        kind: InvoiceKind::parse(&row.try_get::<String, _>("kind")?)
            .map_err(|e| StoreError::AccessError(e.to_string()))?,
        state: InvoiceState::parse(&row.try_get::<String, _>("state")?)
            .map_err(|e| StoreError::AccessError(e.to_string()))?,
        display_name: row.try_get("display_name")?,
        amount_total: row.try_get("amount_total")?,
        amount_residual: row.try_get("amount_residual")?,
    })
}

// ---------------------------------------------------------------------------
// EntityStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl EntityStore for PgStore {
    async fn authenticate(
        &self,
        db: &str,
        login: &str,
        password: &str,
    ) -> Result<UserRecord, StoreError> {
        if db != self.db_name {
            return Err(StoreError::UnknownDatabase(db.to_string()));
        }

        let row = sqlx::query(
            r#"
            select id, login, password_digest, active, company_id, company_ids,
                   partner_id, company_name, country, contact_address, lang, tz
            from users
            where login = $1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(StoreError::AccessDenied);
        };

        let stored: String = row.try_get("password_digest")?;
        if stored != hash_password(login, password) {
            return Err(StoreError::AccessDenied);
        }

        let user = user_from_row(&row)?;
        if !user.active {
            return Err(StoreError::AccessError(format!(
                "user '{}' is archived",
                user.login
            )));
        }
        Ok(user)
    }

    async fn user(&self, user_id: i64) -> Result<UserRecord, StoreError> {
        let row = sqlx::query(
            r#"
            select id, login, active, company_id, company_ids, partner_id,
                   company_name, country, contact_address, lang, tz
            from users
            where id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => user_from_row(&row),
            None => Err(StoreError::NotFound {
                entity: "user",
                id: user_id,
            }),
        }
    }

    async fn latest_token_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<TokenRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            select id, user_id, token, created_at
            from access_tokens
            where user_id = $1
            order by id desc
            limit 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(token_from_row).transpose()
    }

    async fn latest_token_by_value(&self, value: &str) -> Result<Option<TokenRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            select id, user_id, token, created_at
            from access_tokens
            where token = $1
            order by id desc
            limit 1
            "#,
        )
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(token_from_row).transpose()
    }

    async fn insert_token(&self, user_id: i64, value: &str) -> Result<TokenRecord, StoreError> {
        let row = sqlx::query(
            r#"
            insert into access_tokens (user_id, token, created_at)
            values ($1, $2, $3)
            returning id, user_id, token, created_at
            "#,
        )
        .bind(user_id)
        .bind(value)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        token_from_row(&row)
    }

    async fn find_partner_by_uuid(&self, uuid: &str) -> Result<Option<PartnerRecord>, StoreError> {
        let row = sqlx::query(
            r#"select id, uuid, name, street, city from partners where uuid = $1"#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(partner_from_row).transpose()
    }

    async fn upsert_partner(&self, partner: &NewPartner) -> Result<PartnerRecord, StoreError> {
        // Conditional insert: the unique index on uuid makes concurrent
        // resolutions of the same key converge on a single row.
        sqlx::query(
            r#"
            insert into partners (uuid, name, street, city)
            values ($1, $2, $3, $4)
            on conflict (uuid) do nothing
            "#,
        )
        .bind(&partner.uuid)
        .bind(&partner.name)
        .bind(&partner.street)
        .bind(&partner.city)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            r#"select id, uuid, name, street, city from partners where uuid = $1"#,
        )
        .bind(&partner.uuid)
        .fetch_one(&self.pool)
        .await?;

        partner_from_row(&row)
    }

    async fn find_state(&self, name: &str) -> Result<Option<StateRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            select id, name from states
            where name ilike '%' || $1 || '%'
            order by id
            limit 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => Some(StateRecord {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            }),
            None => None,
        })
    }

    async fn upsert_city(&self, name: &str, state_id: i64) -> Result<CityRecord, StoreError> {
        let found = sqlx::query(
            r#"
            select id, name, state_id from cities
            where state_id = $2 and name ilike '%' || $1 || '%'
            order by id
            limit 1
            "#,
        )
        .bind(name)
        .bind(state_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match found {
            Some(row) => row,
            None => {
                sqlx::query(
                    r#"
                    insert into cities (name, state_id) values ($1, $2)
                    on conflict (state_id, lower(name)) do nothing
                    "#,
                )
                .bind(name)
                .bind(state_id)
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    select id, name, state_id from cities
                    where state_id = $2 and lower(name) = lower($1)
                    "#,
                )
                .bind(name)
                .bind(state_id)
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(CityRecord {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            state_id: row.try_get("state_id")?,
        })
    }

    async fn find_product_by_uuid(&self, uuid: &str) -> Result<Option<ProductRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            select id, uuid, name, list_price, standard_price, size, invoice_policy
            from products
            where uuid = $1
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn upsert_product(&self, product: &NewProduct) -> Result<ProductRecord, StoreError> {
        sqlx::query(
            r#"
            insert into products (uuid, name, list_price, standard_price, size, invoice_policy)
            values ($1, $2, $3, $4, $5, 'order')
            on conflict (uuid) do nothing
            "#,
        )
        .bind(&product.uuid)
        .bind(&product.name)
        .bind(product.list_price)
        .bind(product.standard_price)
        .bind(product.size)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            r#"
            select id, uuid, name, list_price, standard_price, size, invoice_policy
            from products
            where uuid = $1
            "#,
        )
        .bind(&product.uuid)
        .fetch_one(&self.pool)
        .await?;

        product_from_row(&row)
    }

    async fn create_order(&self, order: &NewOrder) -> Result<OrderRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let total: f64 = order.lines.iter().map(|l| l.qty * l.price_unit).sum();

        let row = sqlx::query(
            r#"
            insert into orders (partner_id, company_id, state, amount_total, name)
            values ($1, $2, 'draft', $3, '')
            returning id
            "#,
        )
        .bind(order.partner_id)
        .bind(order.company_id)
        .bind(total)
        .fetch_one(&mut *tx)
        .await?;
        let order_id: i64 = row.try_get("id")?;

        sqlx::query(r#"update orders set name = $2 where id = $1"#)
            .bind(order_id)
            .bind(format!("SO{order_id:05}"))
            .execute(&mut *tx)
            .await?;

        for line in &order.lines {
            sqlx::query(
                r#"
                insert into order_lines (order_id, product_id, product_uuid, qty, price_unit, subtotal)
                values ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order_id)
            .bind(line.product_id)
            .bind(&line.product_uuid)
            .bind(line.qty)
            .bind(line.price_unit)
            .bind(line.qty * line.price_unit)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.order(order_id).await
    }

    async fn order(&self, order_id: i64) -> Result<OrderRecord, StoreError> {
        let row = sqlx::query(
            r#"
            select id, name, partner_id, company_id, state, amount_total
            from orders
            where id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(StoreError::NotFound {
                entity: "order",
                id: order_id,
            });
        };

        let line_rows = sqlx::query(
            r#"
            select id, product_id, product_uuid, qty, price_unit, subtotal
            from order_lines
            where order_id = $1
            order by id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let mut lines = Vec::with_capacity(line_rows.len());
        for lr in &line_rows {
            lines.push(OrderLineRecord {
                id: lr.try_get("id")?,
                product_id: lr.try_get("product_id")?,
                product_uuid: lr.try_get("product_uuid")?,
                qty: lr.try_get("qty")?,
                price_unit: lr.try_get("price_unit")?,
                subtotal: lr.try_get("subtotal")?,
            });
        }

        Ok(OrderRecord {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            partner_id: row.try_get("partner_id")?,
            company_id: row.try_get("company_id")?,
            state: OrderState::parse(&row.try_get::<String, _>("state")?)
                .map_err(|e| StoreError::AccessError(e.to_string()))?,
            lines,
            amount_total: row.try_get("amount_total")?,
        })
    }

    async fn set_order_state(&self, order_id: i64, state: OrderState) -> Result<(), StoreError> {
        let res = sqlx::query(r#"update orders set state = $2 where id = $1"#)
            .bind(order_id)
            .bind(state.as_str())
            .execute(&self.pool)
            .await?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "order",
                id: order_id,
            });
        }
        Ok(())
    }

    async fn create_invoices_for_order(
        &self,
        order_id: i64,
    ) -> Result<Vec<InvoiceRecord>, StoreError> {
        let existing = self.invoices_for_order(order_id).await?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        let order = self.order(order_id).await?;

        let row = sqlx::query(
            r#"
            insert into invoices (order_id, company_id, kind, state, display_name, amount_total, amount_residual)
            values ($1, $2, 'out_invoice', 'draft', '', $3, $3)
            returning id
            "#,
        )
        .bind(order_id)
        .bind(order.company_id)
        .bind(order.amount_total)
        .fetch_one(&self.pool)
        .await?;
        let invoice_id: i64 = row.try_get("id")?;

        sqlx::query(r#"update invoices set display_name = $2 where id = $1"#)
            .bind(invoice_id)
            .bind(format!("INV{invoice_id:05}"))
            .execute(&self.pool)
            .await?;

        self.invoices_for_order(order_id).await
    }

    async fn invoices_for_order(&self, order_id: i64) -> Result<Vec<InvoiceRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            select id, order_id, company_id, kind, state, display_name,
                   amount_total, amount_residual
            from invoices
            where order_id = $1
            order by id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(invoice_from_row).collect()
    }

    async fn post_invoice(&self, invoice_id: i64) -> Result<InvoiceRecord, StoreError> {
        sqlx::query(r#"update invoices set state = 'posted' where id = $1"#)
            .bind(invoice_id)
            .execute(&self.pool)
            .await?;

        let row = sqlx::query(
            r#"
            select id, order_id, company_id, kind, state, display_name,
                   amount_total, amount_residual
            from invoices
            where id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => invoice_from_row(&row),
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
        let row = sqlx::query(
            r#"
            select id, company_id, kind, name
            from journals
            where company_id = $1 and kind in ('bank', 'cash')
            order by id
            limit 1
            "#,
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => Some(JournalRecord {
                id: row.try_get("id")?,
                company_id: row.try_get("company_id")?,
                kind: JournalKind::parse(&row.try_get::<String, _>("kind")?)
                    .map_err(|e| StoreError::AccessError(e.to_string()))?,
                name: row.try_get("name")?,
            }),
            None => None,
        })
    }

    async fn register_payment(&self, payment: &NewPayment) -> Result<PaymentRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            insert into payments (invoice_id, journal_id, amount, memo, method, date)
            values ($1, $2, $3, $4, $5, $6)
            returning id
            "#,
        )
        .bind(payment.invoice_id)
        .bind(payment.journal_id)
        .bind(payment.amount)
        .bind(&payment.memo)
        .bind(&payment.method)
        .bind(payment.date)
        .fetch_one(&mut *tx)
        .await?;
        let payment_id: i64 = row.try_get("id")?;

        sqlx::query(
            r#"
            update invoices
            set amount_residual = greatest(amount_residual - $2, 0)
            where id = $1
            "#,
        )
        .bind(payment.invoice_id)
        .bind(payment.amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(PaymentRecord {
            id: payment_id,
            invoice_id: payment.invoice_id,
            journal_id: payment.journal_id,
            amount: payment.amount,
            memo: payment.memo.clone(),
            method: payment.method.clone(),
            date: payment.date,
        })
    }
}
