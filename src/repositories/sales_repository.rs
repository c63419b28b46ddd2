use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Alias, Expr, Func},
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
};
use std::sync::Arc;
use tracing::instrument;

use crate::entities::{order, product};
use crate::errors::ServiceError;
use crate::repositories::{BaseRepository, Repository, SalesStore, SalesTotals};

/// Aggregate queries backing the analytics endpoint
#[derive(Debug, Clone)]
pub struct SalesRepository {
    base: BaseRepository,
}

impl SalesRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl SalesStore for SalesRepository {
    #[instrument(skip(self))]
    async fn totals(&self) -> Result<SalesTotals, ServiceError> {
        let db = self.base.get_db();

        let users = order::Entity::find()
            .select_only()
            .column(order::Column::UserId)
            .distinct()
            .count(db)
            .await?;

        let products = product::Entity::find().count(db).await?;
        let total_sales = order::Entity::find().count(db).await?;

        // SUM over BIGINT is NUMERIC on Postgres, cast back so both backends decode i64
        let revenue: Option<Option<i64>> = order::Entity::find()
            .select_only()
            .column_as(
                Expr::expr(Func::sum(Expr::col(order::Column::TotalMinorUnits)))
                    .cast_as(Alias::new("BIGINT")),
                "revenue",
            )
            .into_tuple()
            .one(db)
            .await?;

        Ok(SalesTotals {
            users,
            products,
            total_sales,
            total_revenue_minor_units: revenue.flatten().unwrap_or(0),
        })
    }

    #[instrument(skip(self))]
    async fn orders_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, i64)>, ServiceError> {
        let rows = order::Entity::find()
            .select_only()
            .column(order::Column::CreatedAt)
            .column(order::Column::TotalMinorUnits)
            .filter(order::Column::CreatedAt.gte(since))
            .into_tuple::<(DateTime<Utc>, i64)>()
            .all(self.base.get_db())
            .await?;

        Ok(rows)
    }
}
