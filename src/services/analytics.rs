use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::repositories::SalesStore;

pub const DEFAULT_DAYS: u32 = 7;
pub const MAX_DAYS: u32 = 365;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    /// Distinct purchasing users
    pub users: u64,
    pub products: u64,
    /// Number of orders
    pub total_sales: u64,
    /// Sum of order totals in minor units
    pub total_revenue: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DailySales {
    #[schema(example = "2025-03-01")]
    pub date: String,
    pub sales: u64,
    pub revenue: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub summary: AnalyticsSummary,
    pub daily_sales: Vec<DailySales>,
}

/// Buckets `(created_at, total)` rows into every UTC day of `[start, end]`,
/// zero-filling days without orders.
pub fn bucket_daily(rows: &[(DateTime<Utc>, i64)], start: NaiveDate, end: NaiveDate) -> Vec<DailySales> {
    let mut buckets: BTreeMap<NaiveDate, (u64, i64)> = BTreeMap::new();
    let mut day = start;
    while day <= end {
        buckets.insert(day, (0, 0));
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    for (created_at, total) in rows {
        if let Some((sales, revenue)) = buckets.get_mut(&created_at.date_naive()) {
            *sales += 1;
            *revenue = revenue.saturating_add(*total);
        }
    }

    buckets
        .into_iter()
        .map(|(date, (sales, revenue))| DailySales {
            date: date.format("%Y-%m-%d").to_string(),
            sales,
            revenue,
        })
        .collect()
}

#[derive(Clone)]
pub struct AnalyticsService {
    sales: Arc<dyn SalesStore>,
}

impl AnalyticsService {
    pub fn new(sales: Arc<dyn SalesStore>) -> Self {
        Self { sales }
    }

    #[instrument(skip(self))]
    pub async fn report(&self, days: u32) -> Result<AnalyticsReport, ServiceError> {
        self.report_at(days, Utc::now()).await
    }

    pub async fn report_at(&self, days: u32, now: DateTime<Utc>) -> Result<AnalyticsReport, ServiceError> {
        if !(1..=MAX_DAYS).contains(&days) {
            return Err(ServiceError::InvalidRequest(format!(
                "days must be between 1 and {}",
                MAX_DAYS
            )));
        }

        let end = now.date_naive();
        let start = end - Duration::days(i64::from(days - 1));
        let since = start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| ServiceError::Internal("invalid analytics window".into()))?;

        let totals = self.sales.totals().await?;
        let rows = self.sales.orders_since(since).await?;

        Ok(AnalyticsReport {
            summary: AnalyticsSummary {
                users: totals.users,
                products: totals.products,
                total_sales: totals.total_sales,
                total_revenue: totals.total_revenue_minor_units,
            },
            daily_sales: bucket_daily(&rows, start, end),
        })
    }
}
