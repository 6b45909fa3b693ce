use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::listing::PageRequest;
use crate::products::repo_types::{NewProduct, Product, ProductChanges, ProductFilter};

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn create(&self, product: NewProduct) -> Result<Product, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Product>, StoreError>;

    /// Returns the requested page ordered by id, plus the total number of matches.
    async fn list(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> Result<(Vec<Product>, u64), StoreError>;

    async fn update(&self, id: i64, changes: ProductChanges)
        -> Result<Option<Product>, StoreError>;

    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

#[derive(Default)]
pub struct MemoryProductStore {
    inner: RwLock<ProductRows>,
}

#[derive(Default)]
struct ProductRows {
    last_id: i64,
    rows: BTreeMap<i64, Product>,
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn create(&self, product: NewProduct) -> Result<Product, StoreError> {
        let mut inner = self.inner.write();
        inner.last_id += 1;
        let now = OffsetDateTime::now_utc();
        let record = Product {
            id: inner.last_id,
            name: product.name,
            description: product.description,
            price: product.price,
            category: product.category,
            stock: product.stock,
            status: product.status,
            created_at: now,
            updated_at: now,
        };
        inner.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Product>, StoreError> {
        Ok(self.inner.read().rows.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> Result<(Vec<Product>, u64), StoreError> {
        let inner = self.inner.read();
        let matching: Vec<&Product> = inner.rows.values().filter(|p| filter.matches(p)).collect();
        let total = matching.len() as u64;
        let data = page.slice(matching).into_iter().cloned().collect();
        Ok((data, total))
    }

    async fn update(
        &self,
        id: i64,
        changes: ProductChanges,
    ) -> Result<Option<Product>, StoreError> {
        let mut inner = self.inner.write();
        let Some(product) = inner.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            product.name = name;
        }
        if let Some(description) = changes.description {
            product.description = description;
        }
        if let Some(price) = changes.price {
            product.price = price;
        }
        if let Some(category) = changes.category {
            product.category = category;
        }
        if let Some(stock) = changes.stock {
            product.stock = stock;
        }
        if let Some(status) = changes.status {
            product.status = status;
        }
        product.updated_at = OffsetDateTime::now_utc();
        Ok(Some(product.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.write().rows.remove(&id).is_some())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.read().rows.len() as u64)
    }
}
