use std::sync::Arc;

use axum::extract::FromRef;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::listing::{Page, PageRequest};
use crate::products::dto::{CreateProductRequest, ProductQuery, UpdateProductRequest};
use crate::products::repo::ProductStore;
use crate::products::repo_types::{NewProduct, Product, ProductChanges, ProductFilter};
use crate::state::AppState;

fn product_not_found(id: i64) -> AppError {
    AppError::not_found(format!("Product {id} not found"))
}

fn check_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Product name must not be empty"));
    }
    Ok(name.to_string())
}

fn check_price(price: f64) -> AppResult<f64> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::bad_request("Price must be a non-negative number"));
    }
    Ok(price)
}

fn check_stock(stock: i64) -> AppResult<i64> {
    if stock < 0 {
        return Err(AppError::bad_request("Stock must not be negative"));
    }
    Ok(stock)
}

#[derive(Clone)]
pub struct ProductService {
    products: Arc<dyn ProductStore>,
}

impl FromRef<AppState> for ProductService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.products.clone())
    }
}

impl ProductService {
    pub fn new(products: Arc<dyn ProductStore>) -> Self {
        Self { products }
    }

    pub async fn create(&self, req: CreateProductRequest) -> AppResult<Product> {
        let product = NewProduct {
            name: check_name(&req.name)?,
            description: req.description.trim().to_string(),
            price: check_price(req.price)?,
            category: req.category.trim().to_string(),
            stock: check_stock(req.stock)?,
            status: req.status,
        };
        let product = self.products.create(product).await?;
        info!(product_id = product.id, name = %product.name, "product created");
        Ok(product)
    }

    pub async fn list(&self, query: ProductQuery) -> AppResult<Page<Product>> {
        let page = PageRequest::new(query.page, query.limit)?;
        let filter = ProductFilter {
            name: query.name,
            category: query.category,
            status: query.status,
            min_price: query.min_price,
            max_price: query.max_price,
        };
        let (rows, total) = self.products.list(&filter, page).await?;
        Ok(Page::new(rows, total, page))
    }

    pub async fn get(&self, id: i64) -> AppResult<Product> {
        self.products
            .find_by_id(id)
            .await?
            .ok_or_else(|| product_not_found(id))
    }

    pub async fn update(&self, id: i64, req: UpdateProductRequest) -> AppResult<Product> {
        let changes = ProductChanges {
            name: req.name.as_deref().map(check_name).transpose()?,
            description: req.description.map(|d| d.trim().to_string()),
            price: req.price.map(check_price).transpose()?,
            category: req.category.map(|c| c.trim().to_string()),
            stock: req.stock.map(check_stock).transpose()?,
            status: req.status,
        };
        let product = self
            .products
            .update(id, changes)
            .await?
            .ok_or_else(|| product_not_found(id))?;
        info!(product_id = id, "product updated");
        Ok(product)
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        if !self.products.delete(id).await? {
            return Err(product_not_found(id));
        }
        info!(product_id = id, "product deleted");
        Ok(())
    }
}
