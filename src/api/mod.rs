use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use validator::Validate;

use crate::config::MODEL_OPTIONS;
use crate::session::{ChatSession, SessionError, Settings, QUICK_QUESTIONS};

const MAX_CONCURRENT_REQUESTS: usize = 64;

#[derive(Clone)]
pub struct AppState {
    session: Arc<Mutex<ChatSession>>,
}

#[derive(Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 4000))]
    question: String,
    stream: Option<bool>,
    use_memory: Option<bool>,
}

#[derive(Serialize)]
pub struct AskResponse {
    answer: String,
    model: String,
    response_time: f64,
}

#[derive(Serialize)]
struct ModelsResponse {
    current: String,
    models: Vec<&'static str>,
    quick_questions: Vec<&'static str>,
}

#[derive(Serialize)]
struct ApiResponse {
    status: String,
}

type ApiError = (StatusCode, Json<ApiResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiResponse { status: message.into() }))
}

fn session_error(e: SessionError) -> ApiError {
    let status = match &e {
        SessionError::NoDocument => StatusCode::CONFLICT,
        SessionError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        SessionError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        SessionError::InvalidSettings(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::Document(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    log::error!("Request failed: {}", e);
    api_error(status, e.to_string())
}

/// Create and configure the API router
pub fn create_api(session: ChatSession) -> Router {
    let body_limit = session.config().max_file_size as usize + 1024 * 1024;
    let state = AppState {
        session: Arc::new(Mutex::new(session)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_check))
        .route("/models", get(list_models))
        .route("/documents", post(upload_document))
        .route("/ask", post(ask_handler))
        .route("/settings", get(get_settings).put(put_settings))
        .route("/history", get(get_history).delete(clear_history))
        .route("/metrics", get(get_metrics))
        .route("/report", get(get_report))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(cors)
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(serde_json::json!({
        "status": "ok",
        "document_loaded": session.has_document(),
        "model": session.settings().model,
    }))
}

async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(ModelsResponse {
        current: session.settings().model.clone(),
        models: MODEL_OPTIONS.to_vec(),
        quick_questions: QUICK_QUESTIONS.to_vec(),
    })
}

async fn upload_document(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.file_name().is_some() => break field,
            Ok(Some(_)) => continue,
            Ok(None) => return api_error(StatusCode::BAD_REQUEST, "No file in upload").into_response(),
            Err(e) => return api_error(StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    };

    let filename = field.file_name().unwrap_or("upload.pdf").to_string();
    let bytes = match field.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let temp = tempfile::Builder::new()
        .prefix("upload_")
        .suffix(".pdf")
        .tempfile()
        .and_then(|mut file| file.write_all(&bytes).map(|_| file));
    let temp = match temp {
        Ok(temp) => temp,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    log::info!("Processing upload {} ({} bytes)", filename, bytes.len());
    let mut session = state.session.lock().await;
    let result = session
        .process_document(temp.path(), &filename, |stage| {
            log::debug!("{} {}%", stage.label(), stage.percent())
        })
        .await;

    match result {
        Ok(info) => Json(serde_json::json!({
            "status": "processed",
            "document": info,
            "store": session.store_info(),
        }))
        .into_response(),
        Err(e) => session_error(e).into_response(),
    }
}

async fn ask_handler(State(state): State<AppState>, Json(request): Json<AskRequest>) -> Response {
    if let Err(e) = request.validate() {
        return api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response();
    }

    let mut session = state.session.lock().await;
    let mut settings = session.settings().clone();
    let streaming = request.stream.unwrap_or(settings.use_streaming);
    let previous_memory = settings.use_memory;
    if let Some(use_memory) = request.use_memory {
        settings.use_memory = use_memory;
        if let Err(e) = session.update_settings(settings) {
            return session_error(e).into_response();
        }
    }

    let response = if streaming {
        match session.ask_stream(&request.question) {
            Ok(tokens) => stream_answer(state.clone(), request.question.clone(), tokens),
            Err(e) => session_error(e).into_response(),
        }
    } else {
        let start = std::time::Instant::now();
        match session.ask(&request.question).await {
            Ok(answer) => Json(AskResponse {
                answer,
                model: session.settings().model.clone(),
                response_time: start.elapsed().as_secs_f64(),
            })
            .into_response(),
            Err(e) => session_error(e).into_response(),
        }
    };

    if request.use_memory.is_some() {
        let mut settings = session.settings().clone();
        settings.use_memory = previous_memory;
        if let Err(e) = session.update_settings(settings) {
            log::warn!("Failed to restore memory setting: {}", e);
        }
    }
    response
}

/// Server-sent events of `{"token": ..}` objects, then `{"done": true}`.
/// The exchange is recorded once the answer is complete.
fn stream_answer(
    state: AppState,
    question: String,
    mut tokens: futures::stream::BoxStream<'static, String>,
) -> Response {
    let events = async_stream::stream! {
        let mut answer = String::new();
        while let Some(token) = tokens.next().await {
            answer.push_str(&token);
            if let Ok(event) = Event::default().json_data(serde_json::json!({ "token": token })) {
                yield Ok::<Event, Infallible>(event);
            }
        }
        state.session.lock().await.record_exchange(&question, &answer);
        if let Ok(event) = Event::default().json_data(serde_json::json!({ "done": true })) {
            yield Ok(event);
        }
    };
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.session.lock().await.settings().clone())
}

async fn put_settings(State(state): State<AppState>, Json(settings): Json<Settings>) -> Response {
    let mut session = state.session.lock().await;
    match session.update_settings(settings) {
        Ok(()) => Json(session.settings().clone()).into_response(),
        Err(e) => session_error(e).into_response(),
    }
}

async fn get_history(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session.lock().await.chat_history().to_vec())
}

async fn clear_history(State(state): State<AppState>) -> impl IntoResponse {
    state.session.lock().await.clear_history();
    Json(ApiResponse {
        status: "cleared".to_string(),
    })
}

async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session.lock().await.metrics())
}

async fn get_report(State(state): State<AppState>) -> Response {
    let report = state.session.lock().await.report();
    let filename = format!("rag_report_{}.json", report.generated_at.timestamp());
    match serde_json::to_string_pretty(&report) {
        Ok(body) => (
            [
                (header::CONTENT_TYPE, "application/json".to_string()),
                (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
            ],
            body,
        )
            .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
