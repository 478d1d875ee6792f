//! Health check endpoint

use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ServiceDescriptor {
    pub service: String,
    pub status: String,
    pub version: String,
    pub usage: UsageDescriptor,
}

/// Documented request shape for the analysis endpoint.
#[derive(Serialize, ToSchema)]
pub struct UsageDescriptor {
    pub method: String,
    pub path: String,
    #[schema(value_type = Object)]
    pub body: serde_json::Value,
}

/// Service health and usage descriptor
///
/// Always returns 200 OK with a static descriptor while the service is
/// running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is alive", body = ServiceDescriptor)
    ),
    tag = "health"
)]
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(ServiceDescriptor {
        service: env!("CARGO_PKG_NAME").to_string(),
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        usage: UsageDescriptor {
            method: "POST".to_string(),
            path: "/v1/analyze".to_string(),
            body: serde_json::json!({
                "idea": "string (required)",
                "quickPreview": "boolean (optional)",
            }),
        },
    })
}

/// Configure health check routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_health_descriptor() {
        let app = test::init_service(App::new().configure(configure)).await;
        let request = test::TestRequest::get().uri("/health").to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "premortem-intel");
        assert_eq!(body["usage"]["path"], "/v1/analyze");
    }
}
