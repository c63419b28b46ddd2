use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::order::{self, ActiveModel as OrderActiveModel, Entity as OrderEntity};
use crate::entities::order_item::{self, ActiveModel as OrderItemActiveModel, Entity as OrderItem};
use crate::errors::ServiceError;
use crate::models::{NewOrder, Order};
use crate::repositories::{BaseRepository, OrderStore, Repository};

/// Repository for order operations
#[derive(Debug, Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    async fn with_lines(&self, model: order::Model) -> Result<Order, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(model.id))
            .order_by_asc(order_item::Column::LineNo)
            .all(self.base.get_db())
            .await?;
        Ok(Order::from_models(model, items))
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[async_trait]
impl OrderStore for OrderRepository {
    #[instrument(skip(self))]
    async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<Order>, ServiceError> {
        let Some(model) = OrderEntity::find()
            .filter(order::Column::PaymentReference.eq(payment_reference))
            .one(self.base.get_db())
            .await?
        else {
            return Ok(None);
        };
        self.with_lines(model).await.map(Some)
    }

    #[instrument(skip(self, new_order), fields(payment_reference = %new_order.payment_reference))]
    async fn insert(&self, new_order: NewOrder) -> Result<Order, ServiceError> {
        let order_id = Uuid::new_v4();
        let created_at = Utc::now();

        let order_model = order::Model {
            id: order_id,
            user_id: new_order.user_id,
            total_minor_units: new_order.total_minor_units,
            currency: new_order.currency.clone(),
            payment_reference: new_order.payment_reference.clone(),
            coupon_code: new_order.coupon_code.clone(),
            created_at,
        };

        let item_models: Vec<order_item::Model> = new_order
            .lines
            .iter()
            .enumerate()
            .map(|(idx, line)| order_item::Model {
                id: Uuid::new_v4(),
                order_id,
                line_no: i32::try_from(idx + 1).unwrap_or(i32::MAX),
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price_minor_units: line.unit_price_minor_units,
            })
            .collect();

        let txn = self.base.get_db().begin().await?;

        let order_active = OrderActiveModel {
            id: Set(order_model.id),
            user_id: Set(order_model.user_id),
            total_minor_units: Set(order_model.total_minor_units),
            currency: Set(order_model.currency.clone()),
            payment_reference: Set(order_model.payment_reference.clone()),
            coupon_code: Set(order_model.coupon_code.clone()),
            created_at: Set(order_model.created_at),
        };

        if let Err(err) = OrderEntity::insert(order_active)
            .exec_without_returning(&txn)
            .await
        {
            // dropping the transaction rolls it back
            if is_unique_violation(&err) {
                warn!("order already recorded for payment reference");
                return Err(ServiceError::DuplicateConfirmation(
                    new_order.payment_reference,
                ));
            }
            return Err(err.into());
        }

        if !item_models.is_empty() {
            let items = item_models.iter().map(|item| OrderItemActiveModel {
                id: Set(item.id),
                order_id: Set(item.order_id),
                line_no: Set(item.line_no),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                unit_price_minor_units: Set(item.unit_price_minor_units),
            });
            OrderItem::insert_many(items)
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await.map_err(|err| {
            if is_unique_violation(&err) {
                ServiceError::DuplicateConfirmation(new_order.payment_reference.clone())
            } else {
                ServiceError::PersistenceFailure(err)
            }
        })?;

        info!(order_id = %order_id, lines = item_models.len(), "order persisted");
        Ok(Order::from_models(order_model, item_models))
    }
}
