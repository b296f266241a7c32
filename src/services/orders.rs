use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::cart::CartItem;
use crate::db::DbPool;
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::PaymentProvider;

/// One order line ready for persistence: effective prices already resolved.
#[derive(Clone, Debug)]
pub struct OrderItemDraft {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub selected_size: Option<String>,
    pub selected_material: Option<String>,
}

impl From<&CartItem> for OrderItemDraft {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.id.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            unit_price: item.effective_unit_price(),
            total_price: item.line_total(),
            selected_size: item.selected_size.clone(),
            selected_material: item.selected_material.clone(),
        }
    }
}

/// Everything needed to persist an order for a captured payment, regardless
/// of whether the capture endpoint or a provider webhook got there first.
#[derive(Clone, Debug)]
pub struct PaidOrderDraft {
    pub provider: PaymentProvider,
    /// Provider-side payment/capture id; the dedup key together with the provider.
    pub payment_id: String,
    pub customer_email: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub shipping_street: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_state: Option<String>,
    pub shipping_postal_code: Option<String>,
    pub shipping_country: Option<String>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_cost: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub items: Vec<OrderItemDraft>,
    /// Raw provider payload, stored for later reconciliation.
    pub metadata: Option<serde_json::Value>,
}

/// Result of the idempotent upsert: the persisted order plus whether this
/// call created it or found it already reconciled.
#[derive(Clone, Debug)]
pub struct UpsertOutcome {
    pub order: order::Model,
    pub created: bool,
}

/// Order representation returned by the HTTP surface.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_email: String,
    pub customer_name: String,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_cost: Decimal,
    pub tax: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub payment_id: String,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<order::Model> for OrderResponse {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            order_number: model.order_number,
            customer_email: model.customer_email,
            customer_name: model.customer_name,
            subtotal: model.subtotal,
            discount: model.discount,
            shipping_cost: model.shipping_cost,
            tax: model.tax,
            total_amount: model.total_amount,
            currency: model.currency,
            status: model.status,
            payment_status: model.payment_status,
            payment_method: model.payment_method,
            payment_id: model.payment_id,
            created_at: model.created_at,
        }
    }
}

/// Generates a human-readable order number: provider prefix, date, random
/// suffix, e.g. `PP-20250826-4821`.
pub fn generate_order_number(provider: PaymentProvider) -> String {
    let prefix = match provider {
        PaymentProvider::PayPal => "PP",
        PaymentProvider::MercadoPago => "MP",
    };
    let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
    format!("{}-{}-{}", prefix, Utc::now().format("%Y%m%d"), suffix)
}

/// Order persistence and reads. All writes for a captured payment funnel
/// through [`OrderService::upsert_paid_order`].
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Persists an order for a captured payment, exactly once per
    /// `(provider, payment_id)` pair.
    ///
    /// The order row and its items are inserted in a single transaction. The
    /// unique index on the payment key turns a concurrent double-submit
    /// (capture endpoint racing the provider webhook) into a constraint
    /// violation, which is mapped back to fetching the row the winner wrote.
    #[instrument(skip(self, draft), fields(provider = %draft.provider, payment_id = %draft.payment_id))]
    pub async fn upsert_paid_order(
        &self,
        draft: PaidOrderDraft,
    ) -> Result<UpsertOutcome, ServiceError> {
        if draft.payment_id.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Payment id is required".to_string(),
            ));
        }
        if draft.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order must contain at least one item".to_string(),
            ));
        }

        // Cheap short-circuit before paying for a transaction.
        if let Some(existing) = self
            .find_by_payment(draft.provider, &draft.payment_id)
            .await?
        {
            info!(
                order_id = %existing.id,
                "Payment already reconciled; returning existing order"
            );
            return Ok(UpsertOutcome {
                order: existing,
                created: false,
            });
        }

        let provider = draft.provider;
        let payment_id = draft.payment_id.clone();

        match self.insert_order_with_items(draft).await {
            Ok(order) => {
                if let Some(sender) = &self.event_sender {
                    sender.send(Event::OrderPlaced {
                        order_id: order.id,
                        order_number: order.order_number.clone(),
                    });
                }
                Ok(UpsertOutcome {
                    order,
                    created: true,
                })
            }
            Err(ServiceError::DatabaseError(db_err))
                if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
            {
                // Lost the race: the other path inserted first.
                warn!("Concurrent order insert detected; fetching existing row");
                let existing = self
                    .find_by_payment(provider, &payment_id)
                    .await?
                    .ok_or(ServiceError::DatabaseError(db_err))?;
                Ok(UpsertOutcome {
                    order: existing,
                    created: false,
                })
            }
            Err(e) => {
                // The customer has paid at this point. Losing the order must
                // be loud, never silent.
                error!(
                    provider = %provider,
                    payment_id = %payment_id,
                    "Failed to persist order for captured payment: {}",
                    e
                );
                Err(e)
            }
        }
    }

    async fn insert_order_with_items(
        &self,
        draft: PaidOrderDraft,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order_id = Uuid::new_v4();
        let metadata = draft
            .metadata
            .as_ref()
            .map(|value| {
                serde_json::to_string(value)
                    .map_err(|e| ServiceError::SerializationError(e.to_string()))
            })
            .transpose()?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number(draft.provider)),
            customer_email: Set(draft.customer_email),
            customer_name: Set(draft.customer_name),
            customer_phone: Set(draft.customer_phone),
            shipping_street: Set(draft.shipping_street),
            shipping_city: Set(draft.shipping_city),
            shipping_state: Set(draft.shipping_state),
            shipping_postal_code: Set(draft.shipping_postal_code),
            shipping_country: Set(draft.shipping_country),
            subtotal: Set(draft.subtotal),
            discount: Set(draft.discount),
            shipping_cost: Set(draft.shipping_cost),
            tax: Set(draft.tax),
            total_amount: Set(draft.total),
            currency: Set(draft.currency),
            status: Set("confirmed".to_string()),
            payment_status: Set("paid".to_string()),
            payment_method: Set(draft.provider.as_str().to_string()),
            payment_id: Set(draft.payment_id),
            metadata: Set(metadata),
            ..Default::default()
        };

        let inserted = order_model
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        for item in &draft.items {
            let item_model = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id.clone()),
                name: Set(item.name.clone()),
                quantity: Set(item.quantity as i32),
                unit_price: Set(item.unit_price),
                total_price: Set(item.total_price),
                selected_size: Set(item.selected_size.clone()),
                selected_material: Set(item.selected_material.clone()),
                ..Default::default()
            };
            item_model
                .insert(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            order_id = %inserted.id,
            order_number = %inserted.order_number,
            "Order persisted"
        );

        Ok(inserted)
    }

    #[instrument(skip(self))]
    pub async fn find_by_payment(
        &self,
        provider: PaymentProvider,
        payment_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        order::Entity::find()
            .filter(order::Column::PaymentMethod.eq(provider.as_str()))
            .filter(order::Column::PaymentId.eq(payment_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order with ID {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<order::Model, ServiceError> {
        order::Entity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))
    }

    #[instrument(skip(self))]
    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        // 404 rather than an empty list when the order itself is unknown.
        self.get_order(order_id).await?;

        order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Lists orders newest-first. `page` is 1-based.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let per_page = per_page.clamp(1, 100);
        let page = page.max(1);

        let paginator = order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let orders = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((orders, total))
    }
}
