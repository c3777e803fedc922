//! HTTP surface: request/response shapes and handlers. Wire field names are
//! camelCase; failures all pass through `ApiError`.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, patch, post, put};
use serde::Deserialize;
use serde_json::json;

use crate::auth;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{BookPayload, ContentKind};
use crate::services::composer::{ComposeRequest, Composer};
use crate::services::export::{self, ExportFormat};
use crate::services::library::Library;
use crate::services::llm::{GenerationBackend, GenerationRequest, LlmClient};
use crate::services::share::{ShareLookup, ShareStore};

#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<LlmClient>,
    pub share: Arc<ShareStore>,
    pub library: Arc<Library>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/api/login", post(login))
        .route("/api/generate", post(generate))
        .route("/api/compose", post(compose))
        .route("/api/quality-check", post(quality_check))
        .route("/api/share", post(publish_share).get(fetch_share))
        .route("/api/export/:format", post(export_book))
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/:id",
            patch(update_project).delete(delete_project),
        )
        .route("/api/projects/:id/conversations", post(record_conversation))
        .route("/api/projects/:id/context", get(project_context))
        .route("/api/credits", get(credits))
        .route("/api/books", get(list_books).post(create_book))
        .route("/api/books/:id/chapters", post(add_chapter))
        .route(
            "/api/books/:book_id/chapters/:chapter_id",
            put(update_chapter).delete(delete_chapter),
        )
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Scriptor</title>
    <meta charset="utf-8">
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        .endpoint { background-color: #f5f5f5; padding: 10px; margin: 10px 0; border-radius: 4px; font-family: monospace; }
    </style>
</head>
<body>
    <h1>Scriptor</h1>
    <p>Writing-studio backend: guided text generation, quality analysis, book export and share links.</p>

    <h2>Available Endpoints:</h2>
    <div class="endpoint">GET / - This information page</div>
    <div class="endpoint">GET /health - Health check</div>
    <div class="endpoint">POST /api/login - Credential check</div>
    <div class="endpoint">POST /api/generate - Free-form text generation</div>
    <div class="endpoint">POST /api/compose - Guided generation with completion retries</div>
    <div class="endpoint">POST /api/quality-check - Coherence/syntax/readability analysis</div>
    <div class="endpoint">POST /api/share - Publish a book, GET /api/share?id=... to read it</div>
    <div class="endpoint">POST /api/export/{pdf|docx|html|epub|txt} - Download a book</div>
    <div class="endpoint">GET/POST /api/projects, /api/books - Per-user library (?user=...)</div>
    <div class="endpoint">GET /api/credits?user=... - Token/cost usage</div>
</body>
</html>
"#,
    )
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

async fn login(Json(body): Json<LoginBody>) -> Result<Json<serde_json::Value>, ApiError> {
    if !auth::verify_credentials(&body.username, &body.password) {
        return Err(ApiError::Unauthorized);
    }
    Ok(Json(json!({ "success": true, "user": body.username })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    prompt: String,
    context: Option<String>,
    max_tokens: Option<u32>,
    user: Option<String>,
    project_id: Option<String>,
}

async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let prompt = body.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("prompt is required".to_string()));
    }

    // An explicit context wins; otherwise fall back to the project memory.
    let context = match (&body.context, &body.user, &body.project_id) {
        (Some(context), _, _) if !context.trim().is_empty() => Some(context.clone()),
        (_, Some(user), Some(project_id)) => {
            let stored = state.library.project_context(user, project_id).await;
            (!stored.is_empty()).then_some(stored)
        }
        _ => None,
    };

    let reply = state
        .llm
        .generate(&GenerationRequest {
            prompt: prompt.to_string(),
            context,
            max_tokens: body.max_tokens,
        })
        .await?;

    if let (Some(user), Some(project_id)) = (&body.user, &body.project_id) {
        state
            .library
            .record_conversation(
                user,
                project_id,
                prompt,
                &reply.content,
                reply.usage.total_tokens,
                reply.usage.cost,
            )
            .await?;
        state
            .library
            .add_credit_usage(user, reply.usage.total_tokens, reply.usage.cost)
            .await?;
    }

    Ok(Json(json!({ "content": reply.content, "usage": reply.usage })))
}

fn default_target_words() -> u32 {
    1000
}

fn default_content_kind() -> ContentKind {
    ContentKind::Article
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComposeBody {
    topic: String,
    #[serde(default = "default_target_words")]
    target_words: u32,
    #[serde(default = "default_content_kind")]
    kind: ContentKind,
    #[serde(default)]
    max_retries: u32,
    user: Option<String>,
    project_id: Option<String>,
}

async fn compose(
    State(state): State<AppState>,
    Json(body): Json<ComposeBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let topic = body.topic.trim();
    if topic.is_empty() {
        return Err(ApiError::BadRequest("topic is required".to_string()));
    }

    let composer = Composer::new(state.llm.as_ref());
    let outcome = composer
        .compose(&ComposeRequest {
            topic: topic.to_string(),
            target_words: body.target_words,
            kind: body.kind,
            max_retries: body.max_retries,
        })
        .await?;

    if let (Some(user), Some(project_id)) = (&body.user, &body.project_id) {
        state
            .library
            .record_conversation(
                user,
                project_id,
                topic,
                &outcome.text,
                outcome.usage.total_tokens,
                outcome.usage.cost,
            )
            .await?;
        state
            .library
            .add_credit_usage(user, outcome.usage.total_tokens, outcome.usage.cost)
            .await?;
    }

    Ok(Json(json!({ "content": outcome.text, "usage": outcome.usage })))
}

#[derive(Deserialize)]
struct QualityBody {
    content: String,
}

async fn quality_check(
    State(state): State<AppState>,
    Json(body): Json<QualityBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content is required".to_string()));
    }

    let (report, usage) = state.llm.quality_check(&body.content).await?;
    Ok(Json(json!({
        "coherence": report.coherence,
        "syntax": report.syntax,
        "readability": report.readability,
        "suggestions": report.suggestions,
        "usage": usage,
    })))
}

async fn publish_share(
    State(state): State<AppState>,
    Json(book): Json<BookPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if book.title.trim().is_empty() {
        return Err(ApiError::BadRequest("book title is required".to_string()));
    }
    if book.chapters.is_empty() {
        return Err(ApiError::BadRequest(
            "a shared book needs at least one chapter".to_string(),
        ));
    }

    let entry = state.share.publish(book).await;
    Ok(Json(json!({
        "shareId": entry.id,
        "shareUrl": format!("{}/api/share?id={}", state.config.public_url, entry.id),
        "expiresAt": entry.expires_at,
    })))
}

#[derive(Deserialize)]
struct ShareQuery {
    id: String,
}

async fn fetch_share(
    State(state): State<AppState>,
    Query(query): Query<ShareQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.share.fetch(&query.id).await {
        ShareLookup::Found(book) => Ok(Json(json!(book))),
        ShareLookup::Missing => Err(ApiError::NotFound("shared book not found".to_string())),
        ShareLookup::Expired => Err(ApiError::Gone("this share link has expired".to_string())),
    }
}

async fn export_book(
    Path(format): Path<String>,
    Json(book): Json<BookPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(format) = ExportFormat::parse(&format) else {
        return Err(ApiError::BadRequest(format!(
            "unsupported export format: {format}"
        )));
    };

    let file = export::render(format, &book).map_err(|err| match err {
        export::ExportError::NothingToExport => ApiError::Unprocessable(err.to_string()),
        export::ExportError::Render { .. } => ApiError::Internal(anyhow::Error::new(err)),
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.bytes,
    ))
}

#[derive(Deserialize)]
struct UserQuery {
    user: String,
}

async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Json<serde_json::Value> {
    Json(json!(state.library.list_projects(&query.user).await))
}

#[derive(Deserialize)]
struct CreateProjectBody {
    title: String,
}

async fn create_project(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
    Json(body): Json<CreateProjectBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }
    let project = state
        .library
        .create_project(&query.user, body.title.trim())
        .await?;
    Ok(Json(json!(project)))
}

#[derive(Deserialize)]
struct UpdateProjectBody {
    title: Option<String>,
    content: Option<String>,
}

async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UserQuery>,
    Json(body): Json<UpdateProjectBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state
        .library
        .update_project(&query.user, &id, body.title, body.content)
        .await?
    {
        Some(project) => Ok(Json(json!(project))),
        None => Err(ApiError::NotFound("project not found".to_string())),
    }
}

async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.library.delete_project(&query.user, &id).await? {
        return Err(ApiError::NotFound("project not found".to_string()));
    }
    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
struct ConversationBody {
    prompt: String,
    response: String,
    #[serde(default)]
    tokens: u64,
    #[serde(default)]
    cost: f64,
}

async fn record_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UserQuery>,
    Json(body): Json<ConversationBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt is required".to_string()));
    }
    let conversation = state
        .library
        .record_conversation(
            &query.user,
            &id,
            &body.prompt,
            &body.response,
            body.tokens,
            body.cost,
        )
        .await?;
    Ok(Json(json!(conversation)))
}

#[derive(Deserialize)]
struct ContextQuery {
    user: String,
    limit: Option<usize>,
}

async fn project_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ContextQuery>,
) -> Json<serde_json::Value> {
    let context = state.library.project_context(&query.user, &id).await;
    let conversations = state
        .library
        .conversation_history(&query.user, &id, query.limit.unwrap_or(10))
        .await;
    Json(json!({ "context": context, "conversations": conversations }))
}

async fn credits(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Json<serde_json::Value> {
    Json(json!(state.library.credit_summary(&query.user).await))
}

async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Json<serde_json::Value> {
    Json(json!(state.library.list_books(&query.user).await))
}

#[derive(Deserialize)]
struct CreateBookBody {
    title: String,
    description: Option<String>,
}

async fn create_book(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
    Json(body): Json<CreateBookBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }
    let book = state
        .library
        .create_book(&query.user, body.title.trim(), body.description)
        .await?;
    Ok(Json(json!(book)))
}

#[derive(Deserialize)]
struct ChapterBody {
    title: String,
    #[serde(default)]
    content: String,
}

async fn add_chapter(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UserQuery>,
    Json(body): Json<ChapterBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }
    match state
        .library
        .add_chapter(&query.user, &id, body.title.trim(), &body.content)
        .await?
    {
        Some(chapter) => Ok(Json(json!(chapter))),
        None => Err(ApiError::NotFound("book not found".to_string())),
    }
}

#[derive(Deserialize)]
struct UpdateChapterBody {
    title: Option<String>,
    content: Option<String>,
}

async fn update_chapter(
    State(state): State<AppState>,
    Path((book_id, chapter_id)): Path<(String, String)>,
    Query(query): Query<UserQuery>,
    Json(body): Json<UpdateChapterBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state
        .library
        .update_chapter(
            &query.user,
            &book_id,
            &chapter_id,
            body.title,
            body.content,
        )
        .await?
    {
        Some(chapter) => Ok(Json(json!(chapter))),
        None => Err(ApiError::NotFound("chapter not found".to_string())),
    }
}

async fn delete_chapter(
    State(state): State<AppState>,
    Path((book_id, chapter_id)): Path<(String, String)>,
    Query(query): Query<UserQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state
        .library
        .delete_chapter(&query.user, &book_id, &chapter_id)
        .await?
    {
        return Err(ApiError::NotFound("chapter not found".to_string()));
    }
    Ok(Json(json!({ "success": true })))
}
