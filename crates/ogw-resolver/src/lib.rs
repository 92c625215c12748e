//! ogw-resolver
//!
//! Idempotent find-or-create resolution for the entities a create-order
//! request references by external key: partner (uuid), state (name, must
//! pre-exist), city (name under state, auto-created), product (uuid,
//! auto-created with mirrored prices).
//!
//! The state/city asymmetry is intentional: states are a fixed reference
//! list maintained by operators, cities are free-form.

use std::sync::Arc;

use ogw_schemas::{
    CityRecord, OrderLinePayload, PartnerPayload, PartnerRecord, ProductRecord, StateRecord,
};
use ogw_store::{EntityStore, NewOrderLine, NewPartner, NewProduct, StoreError};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid partner: {0}")]
    InvalidPartner(String),

    /// The referenced state is not in the reference list.
    #[error("invalid area: {0}")]
    InvalidArea(String),

    #[error("invalid product: {0}")]
    InvalidProduct(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolves external-keyed payloads to entity-store rows.
#[derive(Clone)]
pub struct EntityResolver {
    store: Arc<dyn EntityStore>,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Exact uuid match, creating the partner from the payload when absent.
    /// The store's unique index makes the create conditional, so concurrent
    /// resolutions of one uuid converge on a single row.
    pub async fn resolve_partner(
        &self,
        payload: Option<&PartnerPayload>,
    ) -> Result<PartnerRecord, ResolveError> {
        let Some(payload) = payload else {
            error!("partner resolution failed: payload missing");
            return Err(ResolveError::InvalidPartner("partner payload is empty".into()));
        };

        let uuid = match payload.uuid.as_deref() {
            Some(uuid) if !uuid.is_empty() => uuid,
            _ => {
                error!("partner resolution failed: uuid missing");
                return Err(ResolveError::InvalidPartner("partner uuid is missing".into()));
            }
        };

        let partner = self
            .store
            .upsert_partner(&NewPartner {
                uuid: uuid.to_string(),
                name: payload.name.clone().unwrap_or_else(|| uuid.to_string()),
                street: payload.street.clone(),
                city: payload.city.clone(),
            })
            .await?;

        Ok(partner)
    }

    /// Case-insensitive substring match. States are never created here.
    pub async fn resolve_state(&self, name: &str) -> Result<StateRecord, ResolveError> {
        match self.store.find_state(name).await? {
            Some(state) => Ok(state),
            None => {
                error!(state = %name, "state resolution failed: not in reference list");
                Err(ResolveError::InvalidArea(format!(
                    "state '{name}' not found"
                )))
            }
        }
    }

    /// Case-insensitive substring match under `state_id`, creating when
    /// absent.
    pub async fn resolve_city(
        &self,
        name: &str,
        state_id: i64,
    ) -> Result<CityRecord, ResolveError> {
        Ok(self.store.upsert_city(name, state_id).await?)
    }

    /// Resolve an order line's product, cascading through its geography
    /// claim: the state must resolve (or the line fails with the state's
    /// error), the city is optional and auto-created.
    pub async fn resolve_product(
        &self,
        line: &OrderLinePayload,
    ) -> Result<ProductRecord, ResolveError> {
        let Some(product) = line.product_id.as_ref() else {
            error!("product resolution failed: payload missing");
            return Err(ResolveError::InvalidProduct("product payload is empty".into()));
        };

        let state_name = match product.area_provinsi.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => {
                error!("product resolution failed: area_provinsi missing");
                return Err(ResolveError::InvalidArea("area_provinsi is missing".into()));
            }
        };
        let state = self.resolve_state(state_name).await?;

        if let Some(city) = product.area_kota.as_deref() {
            if !city.is_empty() {
                self.resolve_city(city, state.id).await?;
            }
        }

        let uuid = match product.uuid.as_deref() {
            Some(uuid) if !uuid.is_empty() => uuid,
            _ => {
                error!("product resolution failed: uuid missing");
                return Err(ResolveError::InvalidProduct("product uuid is missing".into()));
            }
        };

        if let Some(existing) = self.store.find_product_by_uuid(uuid).await? {
            return Ok(existing);
        }

        let price = line.price.unwrap_or(line.price_unit);
        let created = self
            .store
            .upsert_product(&NewProduct {
                uuid: uuid.to_string(),
                name: product
                    .komoditas
                    .clone()
                    .unwrap_or_else(|| uuid.to_string()),
                list_price: price,
                standard_price: price,
                size: line.size,
            })
            .await?;

        info!(product = %created.uuid, "product created from order line");
        Ok(created)
    }

    /// Resolve every line of a request into order-line inputs.
    ///
    /// Short-circuits on the first failure: later lines are not attempted
    /// and nothing partial is returned.
    pub async fn prepare_order_lines(
        &self,
        lines: &[OrderLinePayload],
    ) -> Result<Vec<NewOrderLine>, ResolveError> {
        let mut out = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self.resolve_product(line).await?;
            out.push(NewOrderLine {
                product_id: product.id,
                product_uuid: product.uuid,
                qty: line.qty,
                price_unit: line.price_unit,
            });
        }
        Ok(out)
    }
}
