use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::listing::{like_pattern, PageRequest};
use crate::products::repo::ProductStore;
use crate::products::repo_types::{NewProduct, Product, ProductChanges, ProductFilter};

#[derive(Clone)]
pub struct PgProductStore {
    db: PgPool,
}

impl PgProductStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn create(&self, product: NewProduct) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (name, description, price, category, stock, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, description, price, category, stock, status, created_at, updated_at
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.category)
        .bind(product.stock)
        .bind(product.status)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, description, price, category, stock, status, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn list(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> Result<(Vec<Product>, u64), StoreError> {
        let name = filter.name.as_deref().map(like_pattern);
        let category = filter.category.as_deref().map(like_pattern);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM products
            WHERE ($1::text IS NULL OR name ILIKE $1)
              AND ($2::text IS NULL OR category ILIKE $2)
              AND ($3::record_status IS NULL OR status = $3)
              AND ($4::float8 IS NULL OR price >= $4)
              AND ($5::float8 IS NULL OR price <= $5)
            "#,
        )
        .bind(&name)
        .bind(&category)
        .bind(filter.status)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, description, price, category, stock, status, created_at, updated_at
            FROM products
            WHERE ($1::text IS NULL OR name ILIKE $1)
              AND ($2::text IS NULL OR category ILIKE $2)
              AND ($3::record_status IS NULL OR status = $3)
              AND ($4::float8 IS NULL OR price >= $4)
              AND ($5::float8 IS NULL OR price <= $5)
            ORDER BY id
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(&name)
        .bind(&category)
        .bind(filter.status)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.db)
        .await?;

        Ok((rows, total.max(0) as u64))
    }

    async fn update(
        &self,
        id: i64,
        changes: ProductChanges,
    ) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                category = COALESCE($5, category),
                stock = COALESCE($6, stock),
                status = COALESCE($7, status),
                updated_at = now()
            WHERE id = $1
            RETURNING id, name, description, price, category, stock, status, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(changes.price)
        .bind(&changes.category)
        .bind(changes.stock)
        .bind(changes.status)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.db)
            .await?;
        Ok(total.max(0) as u64)
    }
}
