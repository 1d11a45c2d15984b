//! Order workflow: placement, reversal, item mutation and administration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use common::{Money, OrderId, OrderItemId, OrderState, UserId};
use store::{
    Cancellation, ItemRemoval, Model, NewOrder, Order, OrderDetail, OrderPatch, Store,
    items_subtotal,
};

use crate::error::DomainError;
use crate::payment::{PaymentEvent, PaymentStatus};
use crate::services::{ConfirmationLine, Mailer, order_confirmation_email};

use super::{OrderError, PlaceOrder, Requirement, price_requirements, priced_total};

/// Service driving every order operation that moves stock.
///
/// Stock checks made here are advisory. The store's guarded decrement at
/// commit time is what keeps quantities from going negative.
#[derive(Clone)]
pub struct OrderWorkflow<S: Store> {
    store: S,
    mailer: Arc<dyn Mailer>,
}

impl<S: Store> OrderWorkflow<S> {
    /// Creates a new order workflow over the given store.
    pub fn new(store: S, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order: validates and prices the lines, checks stock, then
    /// commits the order and the stock decrements atomically.
    #[tracing::instrument(skip(self, request), fields(kind = request.lines.kind().as_str(), user_id = ?request.user_id))]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<OrderDetail, DomainError> {
        let started = Instant::now();
        let kind = request.lines.kind();
        let requirements = request.lines.requirements()?;

        let role = match request.user_id {
            Some(user_id) => Some(
                self.store
                    .get_user(user_id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("User", user_id))?
                    .role,
            ),
            None => None,
        };

        let models = self.load_models(&requirements).await?;
        if let Err(e) = self.check_stock(&requirements).await {
            if e.is_stock_conflict() {
                metrics::counter!("stock_conflicts_total", "stage" => "precheck").increment(1);
            }
            return Err(e);
        }

        let items = price_requirements(&requirements, &models, role)?;
        let total = priced_total(&items);
        if let Some(client_total) = request.client_total
            && client_total != total
        {
            tracing::debug!(%client_total, %total, "client total differs from computed total");
        }

        let new = NewOrder {
            id: OrderId::new(),
            user_id: request.user_id,
            kind,
            comments: request.comments,
            items,
        };

        let detail = match self.store.place_order(new).await {
            Ok(detail) => detail,
            Err(e) => {
                let err = DomainError::from(e);
                if err.is_stock_conflict() {
                    metrics::counter!("stock_conflicts_total", "stage" => "commit").increment(1);
                    tracing::info!(error = %err, "order rejected by stock guard");
                }
                return Err(err);
            }
        };

        metrics::counter!("orders_placed_total", "kind" => kind.as_str()).increment(1);
        metrics::histogram!("order_placement_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(order_id = %detail.order.id, total = %detail.order.total, "order placed");

        self.send_confirmation(&detail, &models).await;
        Ok(detail)
    }

    async fn load_models(
        &self,
        requirements: &[Requirement],
    ) -> Result<HashMap<common::ModelId, Model>, DomainError> {
        let mut models = HashMap::new();
        for req in requirements {
            if models.contains_key(&req.model_id) {
                continue;
            }
            let model = self
                .store
                .get_model(req.model_id)
                .await?
                .ok_or(OrderError::ModelNotFound {
                    model_id: req.model_id,
                })?;
            models.insert(model.id, model);
        }
        Ok(models)
    }

    async fn check_stock(&self, requirements: &[Requirement]) -> Result<(), DomainError> {
        for req in requirements {
            let stock = self
                .store
                .find_stock(req.model_id, req.size)
                .await?
                .ok_or(OrderError::StockNotFound {
                    model_id: req.model_id,
                    size: req.size,
                })?;
            if stock.quantity < req.quantity {
                return Err(OrderError::InsufficientStock {
                    model_id: req.model_id,
                    size: req.size,
                    requested: req.quantity,
                    available: stock.quantity,
                }
                .into());
            }
        }
        Ok(())
    }

    async fn send_confirmation(&self, detail: &OrderDetail, models: &HashMap<common::ModelId, Model>) {
        let lines: Vec<ConfirmationLine> = detail
            .items
            .iter()
            .map(|item| ConfirmationLine {
                model_name: models
                    .get(&item.model_id)
                    .map(|m| m.name.clone())
                    .unwrap_or_else(|| item.model_id.to_string()),
                size: item.size,
                quantity: item.quantity,
            })
            .collect();

        let email = match order_confirmation_email(detail, &lines) {
            Ok(Some(email)) => email,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "failed to render order confirmation");
                return;
            }
        };
        if let Err(e) = self.mailer.send(email).await {
            tracing::warn!(order_id = %detail.order.id, error = %e, "failed to send order confirmation");
        }
    }

    /// Loads an order with its items and owner.
    pub async fn get_order(&self, id: OrderId) -> Result<OrderDetail, DomainError> {
        self.store
            .get_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))
    }

    /// Lists orders newest first, optionally only those of one user.
    pub async fn list_orders(&self, owner: Option<UserId>) -> Result<Vec<Order>, DomainError> {
        Ok(self.store.list_orders(owner).await?)
    }

    /// Deletes an order and returns every unit to stock.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, id: OrderId) -> Result<OrderDetail, DomainError> {
        let detail = self
            .store
            .cancel_order(id, Cancellation::requested())
            .await?;
        metrics::counter!("orders_cancelled_total", "reason" => "request").increment(1);
        tracing::info!(units = detail.units(), "order cancelled");
        Ok(detail)
    }

    /// Cancels an order that sat unpaid too long, optionally penalizing its owner.
    ///
    /// Fails with `StateChanged` if the order left `Created` in the meantime.
    #[tracing::instrument(skip(self))]
    pub async fn expire_order(
        &self,
        id: OrderId,
        penalize_owner: bool,
    ) -> Result<OrderDetail, DomainError> {
        let detail = self
            .store
            .cancel_order(id, Cancellation::expiry(penalize_owner))
            .await?;
        metrics::counter!("orders_cancelled_total", "reason" => "expired").increment(1);
        tracing::info!(units = detail.units(), "stale order expired");
        Ok(detail)
    }

    /// Removes an item and returns all of its units to stock.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        order_id: OrderId,
        item_id: OrderItemId,
    ) -> Result<OrderDetail, DomainError> {
        Ok(self
            .store
            .remove_item(order_id, item_id, ItemRemoval::Whole)
            .await?)
    }

    /// Returns one unit of an item to stock, deleting the item at its last unit.
    #[tracing::instrument(skip(self))]
    pub async fn remove_one_unit(
        &self,
        order_id: OrderId,
        item_id: OrderItemId,
    ) -> Result<OrderDetail, DomainError> {
        Ok(self
            .store
            .remove_item(order_id, item_id, ItemRemoval::OneUnit)
            .await?)
    }

    /// Sets the order discount. It may not exceed the items subtotal.
    #[tracing::instrument(skip(self))]
    pub async fn apply_discount(
        &self,
        order_id: OrderId,
        discount: Money,
    ) -> Result<OrderDetail, DomainError> {
        let detail = self.get_order(order_id).await?;
        let subtotal = items_subtotal(&detail.items);
        if discount.is_negative() || discount > subtotal {
            return Err(OrderError::InvalidDiscount { discount, subtotal }.into());
        }
        Ok(self.store.apply_discount(order_id, discount).await?)
    }

    /// Updates administrative fields. Attaching a payment link to a freshly
    /// created order marks it as sent for payment.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_order(
        &self,
        order_id: OrderId,
        mut patch: OrderPatch,
    ) -> Result<OrderDetail, DomainError> {
        if patch.payment_link.is_some() && patch.state.is_none() {
            let current = self.get_order(order_id).await?;
            if current.order.state == OrderState::Created {
                patch.state = Some(OrderState::PaymentSent);
            }
        }
        Ok(self.store.update_order(order_id, patch).await?)
    }

    /// Applies a payment provider notification to the order it references.
    #[tracing::instrument(skip(self))]
    pub async fn apply_payment_event(
        &self,
        event: PaymentEvent,
    ) -> Result<OrderDetail, DomainError> {
        let order = self
            .store
            .find_order_by_payment_link(&event.reference)
            .await?
            .ok_or_else(|| OrderError::UnknownPaymentReference {
                reference: event.reference.clone(),
            })?;

        // A settled order never moves back; providers may deliver events late.
        let settled = order.paid || order.state.counts_as_sale();
        let patch = match event.status {
            PaymentStatus::Approved => OrderPatch {
                state: (order.state != OrderState::Delivered).then_some(OrderState::Confirmed),
                paid: Some(true),
                ..Default::default()
            },
            _ if settled => {
                metrics::counter!(
                    "payment_events_ignored_total",
                    "status" => event.status.as_str()
                )
                .increment(1);
                tracing::info!(
                    order_id = %order.id,
                    state = %order.state,
                    "late payment event ignored"
                );
                return self.get_order(order.id).await;
            }
            PaymentStatus::Pending => OrderPatch {
                state: Some(OrderState::PaymentSent),
                ..Default::default()
            },
            PaymentStatus::Rejected | PaymentStatus::Cancelled => OrderPatch {
                paid: Some(false),
                ..Default::default()
            },
        };

        let detail = self.store.update_order(order.id, patch).await?;
        metrics::counter!("payment_events_total", "status" => event.status.as_str()).increment(1);
        tracing::info!(order_id = %order.id, state = %detail.order.state, "payment event applied");
        Ok(detail)
    }
}
