pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod types;
pub mod validation;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    middleware::from_fn,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    set_header::{SetResponseHeader, SetResponseHeaderLayer},
    trace::TraceLayer,
};

use crate::middleware::{jwt_auth_middleware, validate_user_middleware};

/// Assemble the full HTTP application
pub fn app() -> Router {
    let config = config::config();

    Router::new()
        // Public
        .merge(public_routes())
        .nest_service("/uploads", uploads_service(&config.storage.upload_dir))
        // Protected API
        .merge(protected_routes())
        // Global middleware
        .layer(DefaultBodyLimit::max(config.storage.max_upload_bytes))
        .layer(cors_layer(&config.security.cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn public_routes() -> Router {
    use handlers::public::{auth, share, system};

    Router::new()
        .route("/", get(system::root_get))
        .route("/health", get(system::health_get))
        // Token acquisition
        .route("/auth/register", post(auth::register_post))
        .route("/auth/login", post(auth::login_post))
        .route("/auth/refresh", post(auth::refresh_post))
        // Prospects
        .route("/share/:token", get(share::share_get))
        .route("/share/:token/leads", post(share::share_leads_post))
        .route("/share/:token/feedback", post(share::share_feedback_post))
}

fn protected_routes() -> Router {
    use handlers::protected::{
        assignments, auth, dashboard, demos, feedback, leads, media, products, share_links, storage, users,
    };

    Router::new()
        // Own account
        .route("/api/auth/whoami", get(auth::whoami_get))
        .route("/api/auth/profile", put(auth::profile_put))
        .route("/api/auth/password", put(auth::password_put))
        // Users
        .route("/api/users", get(users::users_get).post(users::users_post))
        .route(
            "/api/users/:id",
            get(users::user_get).patch(users::user_patch).delete(users::user_delete),
        )
        // Products
        .route("/api/products", get(products::products_get).post(products::products_post))
        .route(
            "/api/products/:id",
            get(products::product_get)
                .patch(products::product_patch)
                .delete(products::product_delete),
        )
        // Demos
        .route("/api/demos", get(demos::demos_get).post(demos::demos_post))
        .route(
            "/api/demos/:id",
            get(demos::demo_get).patch(demos::demo_patch).delete(demos::demo_delete),
        )
        .route("/api/demos/:id/status", put(demos::demo_status_put))
        .route("/api/demos/:id/feedback", get(feedback::demo_feedback_get))
        // Media
        .route(
            "/api/demos/:id/media",
            get(media::demo_media_get).post(media::demo_media_post),
        )
        .route("/api/demos/:id/media/link", post(media::demo_media_link_post))
        .route("/api/media/:id", delete(media::media_delete))
        // Assignments
        .route(
            "/api/demos/:id/assignments",
            get(assignments::assignments_get).post(assignments::assignments_post),
        )
        .route("/api/demos/:id/assignments/:user_id", delete(assignments::assignment_delete))
        // Share links
        .route(
            "/api/demos/:id/share-links",
            get(share_links::share_links_get).post(share_links::share_links_post),
        )
        .route("/api/share-links/:id", delete(share_links::share_link_delete))
        // Leads
        .route("/api/leads", get(leads::leads_get).post(leads::leads_post))
        .route(
            "/api/leads/:id",
            get(leads::lead_get).patch(leads::lead_patch).delete(leads::lead_delete),
        )
        .route("/api/leads/:id/feedback", get(leads::lead_feedback_get))
        // Feedback
        .route("/api/feedback", get(feedback::feedback_get).post(feedback::feedback_post))
        .route("/api/feedback/:id", delete(feedback::feedback_delete))
        // Storage
        .route("/api/storage", get(storage::storage_get))
        .route("/api/storage/:user_id", get(storage::user_storage_get))
        .route("/api/storage/:user_id/limit", put(storage::user_storage_limit_put))
        // Dashboard
        .route("/api/dashboard", get(dashboard::dashboard_get))
        // Last layer added runs first: token check, then user re-validation
        .route_layer(from_fn(validate_user_middleware))
        .route_layer(from_fn(jwt_auth_middleware))
}

/// Uploaded files are served as inert content: no sniffing, no scripts
fn uploads_service(
    upload_dir: &str,
) -> SetResponseHeader<SetResponseHeader<ServeDir, HeaderValue>, HeaderValue> {
    ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; sandbox"),
        ))
        .service(ServeDir::new(upload_dir))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}
