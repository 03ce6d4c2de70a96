//! Product catalog: products, categories, product types
//!
//! Read-mostly. Unpublished products are invisible to every endpoint.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::{Result, ShopError};
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub slug: String,
    pub price_cents: i64,
    pub currency: String,
    pub stock_quantity: i32,
    pub is_published: bool,
    pub is_featured: bool,
    pub product_type_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductType {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub slug: String,
}

/// Fetch one published product by slug, as cart and checkout need it.
pub async fn published_product_by_slug<'e, E: PgExecutor<'e>>(
    executor: E,
    slug: &str,
) -> Result<Product> {
    sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE slug = $1 AND is_published = TRUE",
    )
    .bind(slug)
    .fetch_optional(executor)
    .await?
    .ok_or(ShopError::NotFound("product"))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Product>>> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).min(100);
    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE is_published = TRUE ORDER BY name LIMIT $1 OFFSET $2",
    )
    .bind(i64::from(per_page))
    .bind(i64::from((page - 1) * per_page))
    .fetch_all(&state.db)
    .await?;
    let total: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM products WHERE is_published = TRUE")
            .fetch_one(&state.db)
            .await?;
    Ok(Json(PaginatedResponse { data: products, total: total.0, page }))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Product>> {
    Ok(Json(published_product_by_slug(&state.db, &slug).await?))
}

/// Tea of the month and friends.
pub async fn featured_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE is_published = TRUE AND is_featured = TRUE ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(products))
}

pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    let categories =
        sqlx::query_as::<_, Category>("SELECT id, name, description, slug FROM categories ORDER BY name")
            .fetch_all(&state.db)
            .await?;
    Ok(Json(categories))
}

#[derive(Debug, Serialize)]
pub struct CategoryDetail {
    pub category: Category,
    pub products: Vec<Product>,
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<CategoryDetail>> {
    let category = sqlx::query_as::<_, Category>(
        "SELECT id, name, description, slug FROM categories WHERE slug = $1",
    )
    .bind(&slug)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ShopError::NotFound("category"))?;
    let products = sqlx::query_as::<_, Product>(
        "SELECT p.* FROM products p \
         JOIN product_categories pc ON pc.product_id = p.id \
         WHERE pc.category_id = $1 AND p.is_published = TRUE ORDER BY p.name",
    )
    .bind(category.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(CategoryDetail { category, products }))
}

pub async fn list_product_types(State(state): State<AppState>) -> Result<Json<Vec<ProductType>>> {
    let types = sqlx::query_as::<_, ProductType>(
        "SELECT id, name, description, slug FROM product_types ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(types))
}

#[derive(Debug, Serialize)]
pub struct ProductTypeDetail {
    pub product_type: ProductType,
    pub products: Vec<Product>,
}

pub async fn get_product_type(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductTypeDetail>> {
    let product_type = sqlx::query_as::<_, ProductType>(
        "SELECT id, name, description, slug FROM product_types WHERE slug = $1",
    )
    .bind(&slug)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ShopError::NotFound("product type"))?;
    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE product_type_id = $1 AND is_published = TRUE ORDER BY name",
    )
    .bind(product_type.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ProductTypeDetail { product_type, products }))
}
