use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::product::{
    ActiveModel as ProductActiveModel, Entity as Product, Model as ProductModel,
};
use crate::errors::ServiceError;
use crate::repositories::{BaseRepository, CatalogStore, Repository};

/// Repository for catalog products
#[derive(Debug, Clone)]
pub struct ProductRepository {
    base: BaseRepository,
}

impl ProductRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Insert a product. The catalog is maintained elsewhere; this is used for seeding.
    pub async fn create(&self, product: ProductActiveModel) -> Result<ProductModel, ServiceError> {
        Ok(product.insert(self.base.get_db()).await?)
    }
}

#[async_trait]
impl CatalogStore for ProductRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ProductModel>, ServiceError> {
        Ok(Product::find_by_id(id).one(self.base.get_db()).await?)
    }
}
