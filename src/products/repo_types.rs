use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::listing::{contains_ci, Status};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub stock: i64,
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub stock: i64,
    pub status: Status,
}

/// Partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub stock: Option<i64>,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub name: Option<String>,
    pub category: Option<String>,
    pub status: Option<Status>,
    pub min_price: Option<f64>, // inclusive
    pub max_price: Option<f64>, // inclusive
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        contains_ci(&product.name, self.name.as_deref())
            && contains_ci(&product.category, self.category.as_deref())
            && self.status.map_or(true, |s| s == product.status)
            && self.min_price.map_or(true, |min| product.price >= min)
            && self.max_price.map_or(true, |max| product.price <= max)
    }
}
