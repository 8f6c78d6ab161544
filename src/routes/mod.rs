use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::state::AppState;

pub mod cases;
pub mod documents;
pub mod health;
pub mod updates;

// Transport-level cap; real file validation happens in the ingestion layer.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let cases_routes = Router::new()
        .route("/", post(cases::create_case).get(cases::list_cases))
        .route(
            "/:id",
            get(cases::get_case).put(cases::update_case_details),
        )
        .route("/:id/status", put(cases::update_case_status))
        .route(
            "/:id/documents",
            post(documents::upload_document).get(documents::list_case_documents),
        )
        .route(
            "/:id/updates",
            post(updates::create_update).get(updates::list_case_updates),
        );

    let documents_routes = Router::new().route(
        "/:id",
        get(documents::get_document)
            .put(documents::update_document)
            .delete(documents::delete_document),
    );

    let updates_routes = Router::new().route("/:id", delete(updates::delete_update));

    Router::new()
        .nest("/api/cases", cases_routes)
        .nest("/api/documents", documents_routes)
        .nest("/api/updates", updates_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
