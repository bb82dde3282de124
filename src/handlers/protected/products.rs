// handlers/protected/products.rs

use axum::extract::{rejection::JsonRejection, rejection::QueryRejection, Query};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::Product;
use crate::database::pagination::{Page, PageQuery};
use crate::handlers::ApiPath;
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::product_service::{ProductDetail, ProductInput};
use crate::services::{MediaService, ProductService};

#[derive(Debug, Default, Deserialize)]
pub struct ProductSearch {
    pub q: Option<String>,
}

/// GET /api/products - List products (admin, sales); search `q`
pub async fn products_get(
    Extension(user): Extension<ValidatedUser>,
    page: Result<Query<PageQuery>, QueryRejection>,
    search: Result<Query<ProductSearch>, QueryRejection>,
) -> ApiResult<Page<Product>> {
    let Query(page) = page?;
    let Query(search) = search?;
    let products = ProductService::connect().await?;
    Ok(ApiResponse::success(
        products.list(&user.actor(), search.q.as_deref(), &page).await?,
    ))
}

/// POST /api/products - Create a product (admin)
pub async fn products_post(
    Extension(user): Extension<ValidatedUser>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> ApiResult<Product> {
    let Json(input) = payload?;
    let products = ProductService::connect().await?;
    Ok(ApiResponse::created(products.create(&user.actor(), input).await?))
}

/// GET /api/products/:id - Product with its demo counts
pub async fn product_get(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<ProductDetail> {
    let products = ProductService::connect().await?;
    Ok(ApiResponse::success(products.get(&user.actor(), id).await?))
}

/// PATCH /api/products/:id - Update name or branding (admin)
pub async fn product_patch(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> ApiResult<Product> {
    let Json(input) = payload?;
    let products = ProductService::connect().await?;
    Ok(ApiResponse::success(products.update(&user.actor(), id, input).await?))
}

/// DELETE /api/products/:id - Delete a product and everything under it (admin)
pub async fn product_delete(Extension(user): Extension<ValidatedUser>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Value> {
    let products = ProductService::connect().await?;
    let media = MediaService::connect().await?;
    products.delete(&user.actor(), id, &media).await?;
    Ok(ApiResponse::deleted(id))
}
