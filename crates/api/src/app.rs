use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use domain::models::{
    ApplicationRole, ApplicationUser, Client, ClientStats, ContentBlock, Job, JobItem, Project,
};
use domain::ports::{DataContext, Mailer};
use domain::services::{ManagedEntity, PasswordResetSettings};
use shared::jwt::{JwtConfig, JwtError};

use crate::config::{Config, QueryConfig};
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{account, content, entities, health};

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<dyn DataContext>,
    pub jwt: Arc<JwtConfig>,
    pub query: QueryConfig,
    pub mailer: Arc<dyn Mailer>,
    pub password_reset: PasswordResetSettings,
}

/// The list, read and write endpoints of one entity under
/// `/api/{resource}`.
pub fn entity_routes<E: ManagedEntity>() -> Router<AppState> {
    let resource = E::schema().resource;

    Router::new()
        .route(
            &format!("/api/{}", resource),
            get(entities::list::<E>).post(entities::create::<E>),
        )
        .route(
            &format!("/api/{}/:id", resource),
            get(entities::get_one::<E>)
                .put(entities::update::<E>)
                .patch(entities::patch::<E>)
                .delete(entities::delete::<E>),
        )
}

pub fn create_app(
    config: &Config,
    ctx: Arc<dyn DataContext>,
    mailer: Arc<dyn Mailer>,
) -> Result<Router, JwtError> {
    let state = AppState {
        ctx,
        jwt: Arc::new(config.jwt.signer()?),
        query: config.query.clone(),
        mailer,
        password_reset: config.account.password_reset(),
    };

    // Build CORS layer based on configuration
    let cors = if config.security.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let entity_api = Router::new()
        .merge(entity_routes::<Client>())
        .merge(entity_routes::<Project>())
        .merge(entity_routes::<ClientStats>())
        .merge(entity_routes::<ContentBlock>())
        .merge(entity_routes::<Job>())
        .merge(entity_routes::<JobItem>())
        .merge(entity_routes::<ApplicationUser>())
        .merge(entity_routes::<ApplicationRole>());

    let account_routes = Router::new()
        .route("/api/account/login", post(account::login))
        .route(
            "/api/account/loginExternalCredential",
            post(account::login_external_credential),
        )
        .route("/api/account/register", post(account::register))
        .route("/api/account/refresh", post(account::refresh))
        .route("/api/account/changePassword", post(account::change_password))
        .route(
            "/api/account/requestPasswordReset",
            post(account::request_password_reset),
        )
        .route("/api/account/resetPassword", post(account::reset_password))
        .route(
            "/api/account/users/:id/password",
            put(account::set_user_password),
        );

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route(
            "/api/contentBlocks/slug/:slug",
            get(content::content_by_slug),
        )
        .route("/metrics", get(metrics_handler));

    let router = Router::new()
        .merge(public_routes)
        .merge(account_routes)
        .merge(entity_api)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state);

    Ok(router)
}
