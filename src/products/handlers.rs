use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    error::AppResult,
    listing::Page,
    products::{
        dto::{CreateProductRequest, ProductQuery, UpdateProductRequest},
        repo_types::Product,
        services::ProductService,
    },
    state::AppState,
};

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product).get(list_products))
        .route(
            "/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}

#[instrument(skip(products, payload))]
pub async fn create_product(
    State(products): State<ProductService>,
    Json(payload): Json<CreateProductRequest>,
) -> AppResult<(StatusCode, Json<Product>)> {
    let product = products.create(payload).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[instrument(skip(products))]
pub async fn list_products(
    State(products): State<ProductService>,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<Page<Product>>> {
    Ok(Json(products.list(query).await?))
}

#[instrument(skip(products))]
pub async fn get_product(
    State(products): State<ProductService>,
    Path(id): Path<i64>,
) -> AppResult<Json<Product>> {
    Ok(Json(products.get(id).await?))
}

#[instrument(skip(products, payload))]
pub async fn update_product(
    State(products): State<ProductService>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateProductRequest>,
) -> AppResult<Json<Product>> {
    Ok(Json(products.update(id, payload).await?))
}

#[instrument(skip(products))]
pub async fn delete_product(
    State(products): State<ProductService>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    products.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
