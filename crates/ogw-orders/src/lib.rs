//! ogw-orders
//!
//! End-to-end order workflow: resolve entities, create the order atomically,
//! then walk it draft → confirmed → invoiced → posted → paid.
//!
//! The walk is an explicit state machine with recorded step completion: the
//! order's stored state advances only after the step's side effects are
//! durable, so a request that dies mid-walk can be picked up again with
//! [`OrderOrchestrator::resume`]. Steps are idempotent at the store boundary
//! (invoice generation returns existing invoices, posting a posted invoice
//! is a no-op, payments skip zero residuals), which makes re-running a step
//! safe.

use std::sync::Arc;

use chrono::Utc;
use ogw_resolver::{EntityResolver, ResolveError};
use ogw_schemas::{
    LineSummary, OrderLinePayload, OrderRecord, OrderState, OrderSummary, PartnerPayload,
    RequestContext,
};
use ogw_store::{EntityStore, NewOrder, NewPayment, StoreError};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A store call failed after the order existed. `stage` is the last
    /// recorded state; `resume` can continue from there.
    #[error("workflow failed at stage '{}': {source}", stage.as_str())]
    Store {
        stage: OrderState,
        #[source]
        source: StoreError,
    },

    /// No bank or cash journal exists for the invoice's company.
    #[error("no bank/cash journal configured for company {company_id}")]
    MissingJournal { company_id: i64 },
}

/// Drives an order from a wire payload to the paid state.
#[derive(Clone)]
pub struct OrderOrchestrator {
    store: Arc<dyn EntityStore>,
    resolver: EntityResolver,
}

impl OrderOrchestrator {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        let resolver = EntityResolver::new(Arc::clone(&store));
        Self { store, resolver }
    }

    /// The whole workflow in one call.
    ///
    /// Resolution failures abort before anything is written. Once the order
    /// row exists, every completed step is recorded on it; a failure later
    /// in the walk surfaces the stage it died at.
    pub async fn create_order(
        &self,
        ctx: RequestContext,
        partner: Option<&PartnerPayload>,
        lines: &[OrderLinePayload],
    ) -> Result<OrderSummary, WorkflowError> {
        let partner = self.resolver.resolve_partner(partner).await?;
        let line_inputs = self.resolver.prepare_order_lines(lines).await?;

        let order = self
            .store
            .create_order(&NewOrder {
                partner_id: partner.id,
                company_id: ctx.company_id,
                lines: line_inputs,
            })
            .await
            .map_err(|source| WorkflowError::Store {
                stage: OrderState::Draft,
                source,
            })?;

        info!(order_id = order.id, uid = ctx.uid, "order created");

        let order = self.run_to_paid(order.id).await?;
        Ok(summarize(&order))
    }

    /// Continue an order's walk from its recorded state to paid.
    ///
    /// Also the recovery entry point for orders left mid-workflow.
    pub async fn resume(&self, order_id: i64) -> Result<OrderRecord, WorkflowError> {
        self.run_to_paid(order_id).await
    }

    async fn run_to_paid(&self, order_id: i64) -> Result<OrderRecord, WorkflowError> {
        loop {
            let order = self
                .store
                .order(order_id)
                .await
                .map_err(|source| WorkflowError::Store {
                    stage: OrderState::Draft,
                    source,
                })?;

            if order.state == OrderState::Paid {
                return Ok(order);
            }
            self.advance(&order).await.map_err(|e| {
                error!(order_id, stage = order.state.as_str(), "workflow step failed");
                e
            })?;
        }
    }

    /// Execute exactly one step from the order's recorded state.
    async fn advance(&self, order: &OrderRecord) -> Result<(), WorkflowError> {
        let stage = order.state;
        let wrap = |source: StoreError| WorkflowError::Store { stage, source };

        let next = match stage {
            // Auto-confirm policy: unconditional, regardless of payment or
            // stock state.
            OrderState::Draft => OrderState::Confirmed,

            OrderState::Confirmed => {
                self.store
                    .create_invoices_for_order(order.id)
                    .await
                    .map_err(wrap)?;
                OrderState::Invoiced
            }

            OrderState::Invoiced => {
                let invoices = self
                    .store
                    .invoices_for_order(order.id)
                    .await
                    .map_err(wrap)?;
                for invoice in invoices.iter().filter(|i| i.kind.is_customer_kind()) {
                    self.store.post_invoice(invoice.id).await.map_err(wrap)?;
                }
                OrderState::Posted
            }

            OrderState::Posted => {
                self.register_payments(order).await?;
                OrderState::Paid
            }

            OrderState::Paid => return Ok(()),
        };

        self.store
            .set_order_state(order.id, next)
            .await
            .map_err(wrap)?;

        info!(
            order_id = order.id,
            from = stage.as_str(),
            to = next.as_str(),
            "order advanced"
        );
        Ok(())
    }

    /// Pay every posted customer move with an open residual: first bank-or-
    /// cash journal of the move's company, amount = residual, memo = the
    /// move's display name, method from the journal kind.
    async fn register_payments(&self, order: &OrderRecord) -> Result<(), WorkflowError> {
        let wrap = |source: StoreError| WorkflowError::Store {
            stage: OrderState::Posted,
            source,
        };

        let invoices = self
            .store
            .invoices_for_order(order.id)
            .await
            .map_err(wrap)?;

        for invoice in invoices
            .iter()
            .filter(|i| i.kind.is_customer_kind() && i.amount_residual > 0.0)
        {
            let journal = self
                .store
                .first_payment_journal(invoice.company_id)
                .await
                .map_err(wrap)?
                .ok_or(WorkflowError::MissingJournal {
                    company_id: invoice.company_id,
                })?;

            self.store
                .register_payment(&NewPayment {
                    invoice_id: invoice.id,
                    journal_id: journal.id,
                    amount: invoice.amount_residual,
                    memo: invoice.display_name.clone(),
                    method: journal.kind.as_str().to_string(),
                    date: Utc::now().date_naive(),
                })
                .await
                .map_err(wrap)?;

            info!(
                invoice = %invoice.display_name,
                journal = %journal.name,
                amount = invoice.amount_residual,
                "payment registered"
            );
        }
        Ok(())
    }
}

fn summarize(order: &OrderRecord) -> OrderSummary {
    OrderSummary {
        order_id: order.id,
        lines: order
            .lines
            .iter()
            .map(|l| LineSummary {
                uuid: l.product_uuid.clone(),
                qty: l.qty,
                price: l.price_unit,
                subtotal: l.subtotal,
            })
            .collect(),
        total: order.amount_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogw_schemas::{InvoiceState, ProductPayload};
    use ogw_testkit::MemStore;

    fn setup() -> (Arc<MemStore>, OrderOrchestrator) {
        let store = Arc::new(MemStore::seeded());
        let orchestrator = OrderOrchestrator::new(Arc::clone(&store) as Arc<dyn EntityStore>);
        (store, orchestrator)
    }

    fn ctx() -> RequestContext {
        RequestContext {
            uid: 1,
            company_id: 1,
        }
    }

    fn partner() -> PartnerPayload {
        PartnerPayload {
            uuid: Some("p1".into()),
            name: Some("Alice".into()),
            ..Default::default()
        }
    }

    fn line(uuid: &str, qty: f64, price: f64) -> OrderLinePayload {
        OrderLinePayload {
            product_id: Some(ProductPayload {
                uuid: Some(uuid.into()),
                komoditas: Some("Rice".into()),
                area_provinsi: Some("Jakarta".into()),
                area_kota: None,
            }),
            qty,
            price_unit: price,
            price: Some(price),
            size: None,
        }
    }

    #[tokio::test]
    async fn full_walk_leaves_order_paid() {
        let (store, orchestrator) = setup();
        let summary = orchestrator
            .create_order(ctx(), Some(&partner()), &[line("sku1", 2.0, 10.0)])
            .await
            .unwrap();

        assert_eq!(summary.total, 20.0);
        assert_eq!(summary.lines.len(), 1);
        assert_eq!(summary.lines[0].uuid, "sku1");
        assert_eq!(summary.lines[0].subtotal, 20.0);

        let order = store.order(summary.order_id).await.unwrap();
        assert_eq!(order.state, OrderState::Paid);

        let invoices = store.invoices_for_order(order.id).await.unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].state, InvoiceState::Posted);
        assert_eq!(invoices[0].amount_residual, 0.0);
        assert_eq!(store.payment_count(), 1);
    }

    #[tokio::test]
    async fn order_total_equals_sum_of_line_subtotals() {
        let (store, orchestrator) = setup();
        let summary = orchestrator
            .create_order(
                ctx(),
                Some(&partner()),
                &[line("sku1", 2.0, 10.0), line("sku2", 3.0, 7.5)],
            )
            .await
            .unwrap();

        let expected: f64 = summary.lines.iter().map(|l| l.subtotal).sum();
        assert_eq!(summary.total, expected);
        assert_eq!(summary.total, 42.5);

        let order = store.order(summary.order_id).await.unwrap();
        let stored: f64 = order.lines.iter().map(|l| l.subtotal).sum();
        assert_eq!(order.amount_total, stored);
    }

    #[tokio::test]
    async fn unresolved_partner_fails_fast_without_order() {
        let (store, orchestrator) = setup();
        let err = orchestrator
            .create_order(ctx(), None, &[line("sku1", 1.0, 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Resolve(ResolveError::InvalidPartner(_))
        ));
        assert_eq!(store.product_count(), 0);
    }

    #[tokio::test]
    async fn resolver_failure_aborts_whole_batch() {
        let (_store, orchestrator) = setup();
        let mut bad = line("sku2", 1.0, 5.0);
        if let Some(p) = bad.product_id.as_mut() {
            p.area_provinsi = Some("Atlantis".into());
        }
        let err = orchestrator
            .create_order(ctx(), Some(&partner()), &[line("sku1", 1.0, 5.0), bad])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Resolve(ResolveError::InvalidArea(_))
        ));
    }

    #[tokio::test]
    async fn resume_continues_from_each_recorded_stage() {
        for stage in [
            OrderState::Draft,
            OrderState::Confirmed,
            OrderState::Invoiced,
            OrderState::Posted,
        ] {
            let (store, orchestrator) = setup();
            let summary = orchestrator
                .create_order(ctx(), Some(&partner()), &[line("sku1", 2.0, 10.0)])
                .await
                .unwrap();

            // Wind the order back to an intermediate stage, as if the
            // original request had died there.
            store
                .set_order_state(summary.order_id, stage)
                .await
                .unwrap();

            let order = orchestrator.resume(summary.order_id).await.unwrap();
            assert_eq!(order.state, OrderState::Paid);

            // Idempotent steps: re-walking must not double-bill or double-pay.
            let invoices = store.invoices_for_order(order.id).await.unwrap();
            assert_eq!(invoices.len(), 1);
            assert_eq!(store.payment_count(), 1);
        }
    }

    #[tokio::test]
    async fn missing_journal_fails_at_posted_stage() {
        let store = Arc::new(MemStore::new(ogw_testkit::TEST_DB));
        store.add_user("admin", "admin", 7);
        store.add_state("Jakarta");
        // No journal for company 7.
        let orchestrator = OrderOrchestrator::new(Arc::clone(&store) as Arc<dyn EntityStore>);

        let err = orchestrator
            .create_order(
                RequestContext {
                    uid: 1,
                    company_id: 7,
                },
                Some(&partner()),
                &[line("sku1", 1.0, 5.0)],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::MissingJournal { company_id: 7 }
        ));

        // The order survived to its last recorded stage and is resumable
        // once a journal exists.
        let mut stranded = None;
        for id in 1..30 {
            if let Ok(o) = store.order(id).await {
                stranded = Some(o);
                break;
            }
        }
        let stranded = stranded.expect("order row must exist");
        assert_eq!(stranded.state, OrderState::Posted);

        store.add_journal(7, ogw_schemas::JournalKind::Cash, "Cash");
        let order = orchestrator.resume(stranded.id).await.unwrap();
        assert_eq!(order.state, OrderState::Paid);
        assert_eq!(order.lines[0].subtotal, 5.0);
        assert_eq!(store.payments()[0].method, "cash");
    }
}
