use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use crate::metrics::Metrics;
use crate::reader::OrderReader;
use crate::storage::StoreError;

/// Shared by every worker of the HTTP server.
pub struct AppState {
    pub reader: OrderReader,
    pub metrics: Arc<Metrics>,
}

/// Wire the routes onto an `App`. Split out so tests can mount the same routes.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/order/{order_uid}", web::get().to(order_handler))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/health", web::get().to(health_handler));
}

/// Bind the order API. The returned server must be awaited on an actix
/// system; callers keep its handle for graceful shutdown.
pub fn build_server(state: Arc<AppState>, addr: &str) -> std::io::Result<Server> {
    tracing::info!("🌐 Starting order API on http://{}", addr);

    let state = web::Data::from(state);
    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
        .bind(addr)?
        .run();
    Ok(server)
}

async fn order_handler(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let order_uid = path.into_inner();

    match state.reader.lookup(&order_uid).await {
        Ok(order) => HttpResponse::Ok().json(order.as_ref()),
        Err(e) => {
            // Store failures are answered like unknown ids; only the log tells them apart.
            if !matches!(e, StoreError::NotFound(_)) {
                tracing::error!(order_uid = %order_uid, error = %e, "Order lookup failed");
            }
            HttpResponse::NotFound().json(serde_json::json!({ "error": "not found" }))
        }
    }
}

async fn metrics_handler(state: web::Data<AppState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order-pipeline"
    }))
}
