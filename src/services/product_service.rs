use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use super::{conflict_on_unique, ensure, ServiceError};
use crate::auth::permissions::{self, Actor};
use crate::database::manager::DatabaseManager;
use crate::database::models::Product;
use crate::database::pagination::{Page, PageQuery, SortDirection, SortSpec};
use crate::validation::{contains_pattern, patch_optional, Validator};

const PRODUCT_SORT: SortSpec = SortSpec {
    fields: &[("name", "name"), ("created_at", "created_at"), ("updated_at", "updated_at")],
    default_column: "name",
    default_direction: SortDirection::Asc,
};

pub(crate) const PRODUCT_COLUMNS: &str =
    "id, name, description, logo_url, primary_color, secondary_color, website_url, created_at, updated_at";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub website_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub demo_count: i64,
    pub active_demo_count: i64,
}

pub struct ProductService {
    pool: PgPool,
}

impl ProductService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect() -> Result<Self, ServiceError> {
        Ok(Self::new(DatabaseManager::pool().await?))
    }

    pub async fn list(&self, actor: &Actor, q: Option<&str>, page: &PageQuery) -> Result<Page<Product>, ServiceError> {
        ensure(permissions::can_view_products(actor), "view products")?;
        let pagination = page.resolve(&PRODUCT_SORT)?;
        let search = q.map(str::trim).filter(|q| !q.is_empty()).map(contains_pattern);

        let push_filters = |builder: &mut QueryBuilder<'_, Postgres>| {
            if let Some(pattern) = &search {
                builder.push(" WHERE name ILIKE ").push_bind(pattern.clone());
            }
        };

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_filters(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM products", PRODUCT_COLUMNS));
        push_filters(&mut select);
        pagination.push_to(&mut select);
        let products = select.build_query_as::<Product>().fetch_all(&self.pool).await?;

        Ok(Page::new(products, total, &pagination))
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Product>, ServiceError> {
        let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
        Ok(sqlx::query_as::<_, Product>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<ProductDetail, ServiceError> {
        ensure(permissions::can_view_products(actor), "view products")?;
        let product = self.find(id).await?.ok_or_else(|| ServiceError::not_found("Product"))?;

        let (demo_count, active_demo_count): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'active') FROM demos WHERE product_id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ProductDetail {
            product,
            demo_count,
            active_demo_count,
        })
    }

    pub async fn create(&self, actor: &Actor, input: ProductInput) -> Result<Product, ServiceError> {
        ensure(permissions::can_manage_products(actor), "create products")?;

        let mut product = Product {
            id: Uuid::new_v4(),
            name: input.name.clone().unwrap_or_default().trim().to_string(),
            description: None,
            logo_url: None,
            primary_color: None,
            secondary_color: None,
            website_url: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        apply_input(&mut product, input)?;

        let sql = format!(
            "INSERT INTO products (id, name, description, logo_url, primary_color, secondary_color, website_url)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            PRODUCT_COLUMNS
        );
        let created = sqlx::query_as::<_, Product>(&sql)
            .bind(product.id)
            .bind(&product.name)
            .bind(&product.description)
            .bind(&product.logo_url)
            .bind(&product.primary_color)
            .bind(&product.secondary_color)
            .bind(&product.website_url)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "A product with this name already exists"))?;

        info!("User {} created product {}", actor.id, created.name);
        Ok(created)
    }

    pub async fn update(&self, actor: &Actor, id: Uuid, input: ProductInput) -> Result<Product, ServiceError> {
        ensure(permissions::can_manage_products(actor), "update products")?;
        let mut product = self.find(id).await?.ok_or_else(|| ServiceError::not_found("Product"))?;
        apply_input(&mut product, input)?;

        let sql = format!(
            "UPDATE products
             SET name = $2, description = $3, logo_url = $4, primary_color = $5, secondary_color = $6,
                 website_url = $7, updated_at = now()
             WHERE id = $1
             RETURNING {}",
            PRODUCT_COLUMNS
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(product.id)
            .bind(&product.name)
            .bind(&product.description)
            .bind(&product.logo_url)
            .bind(&product.primary_color)
            .bind(&product.secondary_color)
            .bind(&product.website_url)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "A product with this name already exists"))
    }

    /// Deleting a product cascades to its demos; stored media bytes are released first
    pub async fn delete(&self, actor: &Actor, id: Uuid, media: &super::MediaService) -> Result<(), ServiceError> {
        ensure(permissions::can_manage_products(actor), "delete products")?;

        let mut tx = self.pool.begin().await?;
        // the product lock keeps new demos out, the demo locks wait out in-flight uploads
        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(ServiceError::not_found("Product"));
        }
        let demo_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM demos WHERE product_id = $1 ORDER BY id FOR UPDATE")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        let mut released_keys = Vec::new();
        for demo_id in &demo_ids {
            released_keys.extend(media.release_demo_media(&mut *tx, *demo_id).await?);
        }
        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        media.remove_files(&released_keys).await;
        info!("User {} deleted product {} ({} demos)", actor.id, id, demo_ids.len());
        Ok(())
    }
}

fn apply_input(product: &mut Product, input: ProductInput) -> Result<(), ServiceError> {
    if let Some(name) = input.name {
        product.name = name.trim().to_string();
    }
    patch_optional(&mut product.description, input.description);
    patch_optional(&mut product.logo_url, input.logo_url);
    patch_optional(&mut product.primary_color, input.primary_color);
    patch_optional(&mut product.secondary_color, input.secondary_color);
    patch_optional(&mut product.website_url, input.website_url);

    Validator::new()
        .required("name", &product.name)
        .max_len("name", &product.name, 200)
        .optional_url("logo_url", product.logo_url.as_deref())
        .optional_url("website_url", product.website_url.as_deref())
        .optional_color("primary_color", product.primary_color.as_deref())
        .optional_color("secondary_color", product.secondary_color.as_deref())
        .finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> Product {
        Product {
            id: Uuid::new_v4(),
            name: String::new(),
            description: None,
            logo_url: None,
            primary_color: None,
            secondary_color: None,
            website_url: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn apply_input_validates_branding() {
        let mut product = blank();
        let input = ProductInput {
            name: Some("Acme CRM".into()),
            primary_color: Some("blue".into()),
            website_url: Some("ftp://acme".into()),
            ..Default::default()
        };
        match apply_input(&mut product, input) {
            Err(ServiceError::Validation(err)) => {
                assert!(err.fields.contains_key("primary_color"));
                assert!(err.fields.contains_key("website_url"));
                assert!(!err.fields.contains_key("name"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn apply_input_trims_and_clears() {
        let mut product = blank();
        product.logo_url = Some("https://cdn.example.com/logo.png".into());
        let input = ProductInput {
            name: Some("  Acme CRM ".into()),
            logo_url: Some("".into()),
            primary_color: Some("#112233".into()),
            ..Default::default()
        };
        apply_input(&mut product, input).unwrap();
        assert_eq!(product.name, "Acme CRM");
        assert_eq!(product.logo_url, None);
        assert_eq!(product.primary_color.as_deref(), Some("#112233"));
    }

    #[test]
    fn name_is_required() {
        let mut product = blank();
        assert!(apply_input(&mut product, ProductInput::default()).is_err());
    }
}
