//! OpenAPI specification endpoint

use actix_web::{get, HttpResponse, Responder};
use utoipa::OpenApi;

use crate::api::{analyze, health};
use crate::model;

#[derive(OpenApi)]
#[openapi(
    paths(analyze::analyze, health::health),
    components(schemas(
        analyze::AnalyzeRequest,
        analyze::AnalyzeResponse,
        analyze::QuickPreviewResponse,
        health::ServiceDescriptor,
        health::UsageDescriptor,
        model::PremortemReport,
        model::IdeaDecomposition,
        model::Citation,
        model::Risk,
        model::FailureMode,
        model::Challenge,
        model::ChallengeKind,
        model::Comparable,
        model::ComparableOutcome,
        model::RiskScore,
        model::RiskBreakdown,
        model::RiskLevel,
        model::Lever,
        model::LeverWeight,
        model::LeverCategory,
        model::Warning,
        model::ReportStatus,
    )),
    tags(
        (name = "analysis", description = "Premortem analysis pipeline"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

/// Serve OpenAPI JSON specification
#[get("/openapi.json")]
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

/// Configure OpenAPI routes
pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(openapi_json);
}
