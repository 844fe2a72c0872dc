//! Application startup and lifecycle management.

use crate::config::HustleDeskConfig;
use crate::handlers::{
    self, billing, catalog, expenses, invoices, mpesa, orders, orgs, reports, tasks,
};
use crate::services::{init_metrics, Database, MpesaClient, StripeClient, TokenVerifier};
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HustleDeskConfig>,
    pub db: Arc<Database>,
    pub verifier: Arc<TokenVerifier>,
    pub mpesa: MpesaClient,
    pub stripe: StripeClient,
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    listener: TcpListener,
    state: AppState,
    webhook_limiter: IpRateLimiter,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: HustleDeskConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: HustleDeskConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: HustleDeskConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let verifier = TokenVerifier::new(&config.auth)?;

        let mpesa = MpesaClient::new(config.mpesa.clone());
        if mpesa.is_configured() {
            tracing::info!(
                environment = ?config.mpesa.environment,
                "M-Pesa Daraja client configured"
            );
        } else {
            tracing::warn!("M-Pesa credentials not set, STK push is disabled");
        }

        let stripe = StripeClient::new(config.stripe.clone());
        if stripe.is_configured() {
            tracing::info!("Stripe client configured");
        } else {
            tracing::warn!("Stripe secret key not set, billing checkout is disabled");
        }

        let webhook_limiter = create_ip_rate_limiter(config.rate_limit.webhook_per_minute);

        let addr = format!("{}:{}", config.common.host, config.common.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::InternalError(anyhow::anyhow!("Failed to bind HTTP listener: {}", e))
        })?;
        let http_port = listener
            .local_addr()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?
            .port();

        tracing::info!(http_port, "HTTP listener bound");

        let state = AppState {
            config: Arc::new(config),
            db: Arc::new(db),
            verifier: Arc::new(verifier),
            mpesa,
            stripe,
        };

        Ok(Self {
            http_port,
            listener,
            state,
            webhook_limiter,
        })
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Serve until the listener fails or the future is dropped.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        let app = router(self.state, self.webhook_limiter);

        tracing::info!(port = self.http_port, "hustledesk-service listening");

        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }
}

/// Unauthenticated provider callbacks, rate limited per client IP.
fn webhook_routes(limiter: IpRateLimiter) -> Router<AppState> {
    Router::new()
        .route("/api/billing/webhook", post(billing::stripe_webhook))
        .route("/api/mpesa/c2b/webhook", post(mpesa::c2b_webhook))
        .route("/api/mpesa/stk/webhook", post(mpesa::stk_webhook))
        .route_layer(middleware::from_fn_with_state(
            limiter,
            ip_rate_limit_middleware,
        ))
}

fn org_routes() -> Router<AppState> {
    Router::new()
        .route("/api/orgs", get(orgs::list_orgs).post(orgs::create_org))
        .route("/api/orgs/:org_id", get(orgs::get_org))
        .route(
            "/api/orgs/:org_id/outlets",
            get(orgs::list_outlets).post(orgs::create_outlet),
        )
        .route(
            "/api/orgs/:org_id/members",
            get(orgs::list_members).post(orgs::add_member),
        )
        .route(
            "/api/orgs/:org_id/customers",
            get(catalog::list_customers).post(catalog::create_customer),
        )
        .route(
            "/api/orgs/:org_id/products",
            get(catalog::list_products).post(catalog::create_product),
        )
        .route(
            "/api/orgs/:org_id/products/:product_id",
            get(catalog::get_product)
                .patch(catalog::update_product)
                .delete(catalog::delete_product),
        )
        .route(
            "/api/orgs/:org_id/products/:product_id/inventory",
            post(catalog::record_inventory_movement),
        )
        .route(
            "/api/orgs/:org_id/orders",
            get(orders::list_orders).post(orders::create_order),
        )
        .route(
            "/api/orgs/:org_id/invoices",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route(
            "/api/orgs/:org_id/invoices/:invoice_id",
            get(invoices::get_invoice),
        )
        .route(
            "/api/orgs/:org_id/invoices/:invoice_id/payments",
            post(invoices::record_invoice_payment),
        )
        .route(
            "/api/orgs/:org_id/invoices/:invoice_id/cancel",
            post(invoices::cancel_invoice),
        )
        .route(
            "/api/orgs/:org_id/invoices/:invoice_id/stk",
            post(invoices::initiate_stk_push),
        )
        .route(
            "/api/orgs/:org_id/mpesa/stk/:checkout_request_id",
            get(invoices::stk_status),
        )
        .route(
            "/api/orgs/:org_id/expenses",
            get(expenses::list_expenses).post(expenses::create_expense),
        )
        .route("/api/orgs/:org_id/reports/summary", get(reports::summary))
        .route(
            "/api/orgs/:org_id/tasks",
            get(tasks::list_tasks).post(tasks::create_task),
        )
        .route(
            "/api/orgs/:org_id/tasks/:task_id/complete",
            post(tasks::complete_task),
        )
        .route("/api/orgs/:org_id/subscription", get(billing::get_subscription))
        .route("/api/orgs/:org_id/usage", get(billing::get_usage))
        .route("/api/billing/checkout", post(billing::create_checkout))
        .route("/api/billing/portal", post(billing::create_portal))
}

/// The web client is served from `APP_URL`; only that origin may call the API.
fn cors_layer(app_url: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = match app_url.parse::<HeaderValue>() {
        Ok(origin) => vec![origin],
        Err(e) => {
            tracing::error!(app_url, error = %e, "Invalid APP_URL for CORS; no origins allowed");
            Vec::new()
        }
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Full HTTP surface. Layers run outermost last.
pub fn router(state: AppState, webhook_limiter: IpRateLimiter) -> Router {
    let cors = cors_layer(&state.config.app_url);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .merge(org_routes())
        .merge(webhook_routes(webhook_limiter))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(middleware::from_fn(security_headers_middleware))
}
