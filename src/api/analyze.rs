//! Analysis submission endpoint

use actix_web::{post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiError;
use crate::app::AppState;
use crate::model::{IdeaDecomposition, PremortemReport, ReportStatus};

/// Analysis submission body.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    /// The startup idea to analyze. Required, non-empty after trim.
    #[serde(default)]
    pub idea: String,
    /// When true, only the decomposition stage runs.
    #[serde(default)]
    pub quick_preview: bool,
}

/// Full-pipeline response.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub report: Option<PremortemReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Quick-preview response: decomposition only.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuickPreviewResponse {
    pub decomposition: IdeaDecomposition,
}

/// Submit a startup idea for premortem analysis
#[utoipa::path(
    post,
    path = "/v1/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Analysis complete", body = AnalyzeResponse),
        (status = 400, description = "Missing or empty idea"),
        (status = 500, description = "Analysis failed", body = AnalyzeResponse)
    ),
    tag = "analysis"
)]
#[post("/v1/analyze")]
pub async fn analyze(
    state: web::Data<AppState>,
    request: web::Json<AnalyzeRequest>,
) -> Result<HttpResponse, ApiError> {
    let idea = request.idea.trim();
    if idea.is_empty() {
        return Err(ApiError::BadRequest("Idea is required".to_string()));
    }

    if request.quick_preview {
        tracing::info!(idea_length = idea.len(), "Quick preview requested");
        let decomposition = state.pipeline.quick_preview(idea).await;
        return Ok(HttpResponse::Ok().json(QuickPreviewResponse { decomposition }));
    }

    tracing::info!(idea_length = idea.len(), "Full analysis requested");
    let report = state.pipeline.run(idea, None).await;

    let success = report.status == ReportStatus::Complete;
    let error = report.error.clone();

    // A halted pipeline still returns its partial report so the caller
    // can display whatever stages completed.
    Ok(HttpResponse::Ok().json(AnalyzeResponse {
        success,
        report: Some(report),
        error,
    }))
}

/// Configure analysis routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(analyze);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    fn offline_state() -> web::Data<AppState> {
        let config = crate::model::Config {
            evidence: crate::model::EvidenceConfig {
                api_keys: vec![],
                base_url: Some("http://127.0.0.1:1/chat/completions".to_string()),
                model: None,
            },
            graveyard: crate::model::GraveyardConfig {
                base_url: Some("http://127.0.0.1:1".to_string()),
                api_key: None,
            },
            ..crate::model::Config::default()
        };
        web::Data::new(AppState::new(&config))
    }

    #[actix_web::test]
    async fn test_empty_idea_is_rejected() {
        let app = test::init_service(
            App::new().app_data(offline_state()).configure(configure),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/v1/analyze")
            .set_json(serde_json::json!({ "idea": "   " }))
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), 400);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert!(body.get("error").is_some());
    }

    #[actix_web::test]
    async fn test_missing_idea_is_rejected() {
        let app = test::init_service(
            App::new().app_data(offline_state()).configure(configure),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/v1/analyze")
            .set_json(serde_json::json!({}))
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), 400);
    }

    #[actix_web::test]
    async fn test_quick_preview_returns_decomposition_only() {
        let app = test::init_service(
            App::new().app_data(offline_state()).configure(configure),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/v1/analyze")
            .set_json(serde_json::json!({
                "idea": "AI code reviewer",
                "quickPreview": true,
            }))
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert!(body.get("decomposition").is_some());
        assert!(body.get("report").is_none());
        assert!(body.get("riskScore").is_none());
    }

    #[actix_web::test]
    async fn test_full_analysis_returns_report() {
        let app = test::init_service(
            App::new().app_data(offline_state()).configure(configure),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/v1/analyze")
            .set_json(serde_json::json!({
                "idea": "A monthly subscription tool for freelancers to send invoices",
            }))
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["success"], true);
        let report = &body["report"];
        assert_eq!(
            report["decomposition"]["businessModel"],
            "Subscription-based SaaS"
        );
        assert!(report["riskScore"]["confidence"].as_u64().unwrap() >= 40);
        assert!(report["failureModes"].as_array().unwrap().len() >= 3);
    }
}
