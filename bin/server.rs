// Voter Registry - Web Server
// REST API over the embedded store. Session handling and role gating live in
// the reverse proxy / auth layer in front of this service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use voter_registry::entities::{area, user, voter};
use voter_registry::normalizer::AreaSeed;
use voter_registry::{
    dashboard_stats, default_db_path, open_database, run_import, ImportPayload, NewVoter,
    Pagination, VoterFilter, VoterUpdate,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Listing response with a pagination envelope
#[derive(Serialize)]
struct ListResponse<T> {
    success: bool,
    data: Vec<T>,
    pagination: Pagination,
}

fn failure(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, Json(ApiResponse::<()>::fail(message))).into_response()
}

fn internal(context: &str, err: anyhow::Error) -> axum::response::Response {
    eprintln!("Error {}: {}", context, err);
    failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to {}", context))
}

// ============================================================================
// Query / body DTOs
// ============================================================================

fn default_page() -> i64 {
    1
}

fn default_voter_limit() -> i64 {
    20
}

fn default_area_limit() -> i64 {
    10
}

#[derive(Deserialize)]
struct VoterListQuery {
    #[serde(default = "default_page")]
    page: i64,

    #[serde(default = "default_voter_limit")]
    limit: i64,

    search: Option<String>,
    occupation: Option<String>,
    area_code: Option<String>,
    status: Option<String>,

    #[serde(rename = "minAge")]
    min_age: Option<u32>,

    #[serde(rename = "maxAge")]
    max_age: Option<u32>,
}

impl VoterListQuery {
    fn filter(&self) -> VoterFilter {
        VoterFilter {
            search: self.search.clone(),
            occupation: self.occupation.clone(),
            area_code: self.area_code.clone(),
            status: self.status.clone(),
            min_age: self.min_age,
            max_age: self.max_age,
        }
    }
}

#[derive(Deserialize)]
struct StatsQuery {
    occupation: Option<String>,
    area_code: Option<String>,
    status: Option<String>,

    #[serde(rename = "minAge")]
    min_age: Option<u32>,

    #[serde(rename = "maxAge")]
    max_age: Option<u32>,
}

#[derive(Deserialize)]
struct AreaListQuery {
    #[serde(default = "default_page")]
    page: i64,

    #[serde(default = "default_area_limit")]
    limit: i64,

    search: Option<String>,
}

/// Area creation body; counters and postal fields are optional on the wire
#[derive(Deserialize)]
struct AreaInput {
    voter_area_code: String,
    #[serde(default)]
    district: String,
    #[serde(default)]
    upazila_thana: String,
    #[serde(default)]
    union_paurashava: String,
    #[serde(default)]
    ward_number: String,
    #[serde(default)]
    voter_area_name: String,
    #[serde(default)]
    post_office: String,
    #[serde(default)]
    post_code: String,
    #[serde(default)]
    total_voters: i64,
    #[serde(default)]
    total_male_voters: i64,
    #[serde(default)]
    publication_date: Option<NaiveDate>,
}

impl AreaInput {
    fn into_seed(self) -> AreaSeed {
        AreaSeed {
            voter_area_code: self.voter_area_code,
            district: self.district,
            upazila_thana: self.upazila_thana,
            union_paurashava: self.union_paurashava,
            ward_number: self.ward_number,
            voter_area_name: self.voter_area_name,
            post_office: self.post_office,
            post_code: self.post_code,
            total_voters: self.total_voters,
            total_male_voters: self.total_male_voters,
            publication_date: self.publication_date,
        }
    }
}

#[derive(Deserialize)]
struct CreateUserInput {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    role: String,
}

#[derive(Deserialize)]
struct UpdateUserInput {
    id: String,
    password: Option<String>,
    role: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
struct IdQuery {
    id: Option<String>,
}

// ============================================================================
// API Handlers - health & stats
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/stats - Dashboard statistics
async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    let filter = VoterFilter {
        search: None,
        occupation: query.occupation,
        area_code: query.area_code,
        status: query.status,
        min_age: query.min_age,
        max_age: query.max_age,
    };

    match dashboard_stats(&conn, &filter) {
        Ok(stats) => (StatusCode::OK, Json(ApiResponse::ok(stats))).into_response(),
        Err(e) => internal("fetch statistics", e),
    }
}

// ============================================================================
// API Handlers - voters
// ============================================================================

/// GET /api/voters - Filtered, paginated listing
async fn list_voters(
    State(state): State<AppState>,
    Query(query): Query<VoterListQuery>,
) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match voter::list_voters(&conn, &query.filter(), query.page, query.limit) {
        Ok((voters, pagination)) => (
            StatusCode::OK,
            Json(ListResponse {
                success: true,
                data: voters,
                pagination,
            }),
        )
            .into_response(),
        Err(e) => internal("fetch voters", e),
    }
}

/// POST /api/voters - Manual entry
async fn create_voter(
    State(state): State<AppState>,
    Json(body): Json<NewVoter>,
) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match voter::create_voter(&conn, &body) {
        Ok(created) => (StatusCode::CREATED, Json(ApiResponse::ok(created))).into_response(),
        Err(e) => internal("create voter", e),
    }
}

/// GET /api/voters/:id
async fn get_voter(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match voter::get_voter(&conn, &id) {
        Ok(Some(found)) => (StatusCode::OK, Json(ApiResponse::ok(found))).into_response(),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Voter not found"),
        Err(e) => internal("fetch voter", e),
    }
}

/// PUT /api/voters/:id - Partial update
async fn update_voter(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<VoterUpdate>,
) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match voter::update_voter(&conn, &id, &body) {
        Ok(Some(updated)) => (StatusCode::OK, Json(ApiResponse::ok(updated))).into_response(),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Voter not found"),
        Err(e) => internal("update voter", e),
    }
}

/// DELETE /api/voters/:id - Soft delete
async fn delete_voter(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match voter::soft_delete_voter(&conn, &id) {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::ok("Voter deleted"))).into_response(),
        Ok(false) => failure(StatusCode::NOT_FOUND, "Voter not found"),
        Err(e) => internal("delete voter", e),
    }
}

// ============================================================================
// API Handlers - voter areas
// ============================================================================

/// GET /api/areas
async fn list_areas(
    State(state): State<AppState>,
    Query(query): Query<AreaListQuery>,
) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match area::list_areas(&conn, query.search.as_deref(), query.page, query.limit) {
        Ok((areas, pagination)) => (
            StatusCode::OK,
            Json(ListResponse {
                success: true,
                data: areas,
                pagination,
            }),
        )
            .into_response(),
        Err(e) => internal("fetch voter areas", e),
    }
}

/// POST /api/areas
async fn create_area(
    State(state): State<AppState>,
    Json(body): Json<AreaInput>,
) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match area::create_area(&conn, &body.into_seed()) {
        Ok(created) => (StatusCode::CREATED, Json(ApiResponse::ok(created))).into_response(),
        Err(e) => match e.downcast_ref::<rusqlite::Error>() {
            Some(sql_err) if voter_registry::is_constraint_violation(sql_err) => {
                failure(StatusCode::BAD_REQUEST, "Voter area code already exists")
            }
            _ => internal("create voter area", e),
        },
    }
}

/// GET /api/areas/:code
async fn get_area(State(state): State<AppState>, Path(code): Path<String>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    let code = decode_code(&code);

    match area::get_area(&conn, &code) {
        Ok(Some(found)) => (StatusCode::OK, Json(ApiResponse::ok(found))).into_response(),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Voter area not found"),
        Err(e) => internal("fetch voter area", e),
    }
}

/// PUT /api/areas/:code - Partial update
async fn update_area(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<area::AreaUpdate>,
) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    let code = decode_code(&code);

    match area::update_area(&conn, &code, &body) {
        Ok(Some(updated)) => (StatusCode::OK, Json(ApiResponse::ok(updated))).into_response(),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Voter area not found"),
        Err(e) => internal("update voter area", e),
    }
}

/// DELETE /api/areas/:code - Hard delete, no cascade
async fn delete_area(State(state): State<AppState>, Path(code): Path<String>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    let code = decode_code(&code);

    match area::delete_area(&conn, &code) {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::ok("Voter area deleted"))).into_response(),
        Ok(false) => failure(StatusCode::NOT_FOUND, "Voter area not found"),
        Err(e) => internal("delete voter area", e),
    }
}

/// Area codes arrive URL-encoded when the roll uses non-ASCII codes
fn decode_code(raw: &str) -> String {
    urlencoding::decode(raw)
        .unwrap_or_else(|_| raw.into())
        .into_owned()
}

// ============================================================================
// API Handlers - import
// ============================================================================

/// POST /api/import - One chunk (or whole payload) of voter records
async fn import_voters(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let payload = match ImportPayload::from_value(body) {
        Ok(payload) => payload,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };

    if payload.record_count() == 0 {
        return failure(StatusCode::BAD_REQUEST, "Empty voter array provided.");
    }

    let conn = state.db.lock().unwrap();

    match run_import(&conn, payload) {
        Ok(summary) => (StatusCode::OK, Json(ApiResponse::ok(summary))).into_response(),
        Err(e) => internal("import data", e),
    }
}

// ============================================================================
// API Handlers - users
// ============================================================================

/// GET /api/users - Listing for the admin screen
async fn list_users(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match user::list_users(&conn) {
        Ok(users) => (StatusCode::OK, Json(ApiResponse::ok(users))).into_response(),
        Err(e) => internal("fetch users", e),
    }
}

/// POST /api/users
async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserInput>,
) -> impl IntoResponse {
    if body.username.is_empty() || body.password.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Missing fields");
    }

    let conn = state.db.lock().unwrap();

    match user::create_user(&conn, &body.username, &body.password, &body.role) {
        Ok(created) => (StatusCode::OK, Json(ApiResponse::ok(created))).into_response(),
        Err(e) if e.to_string() == "User already exists" => {
            failure(StatusCode::BAD_REQUEST, "User already exists")
        }
        Err(e) => internal("create user", e),
    }
}

/// PUT /api/users
async fn update_user(
    State(state): State<AppState>,
    Json(body): Json<UpdateUserInput>,
) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match user::update_user(
        &conn,
        &body.id,
        body.password.as_deref(),
        body.role.as_deref(),
        body.status.as_deref(),
    ) {
        Ok(Some(updated)) => (StatusCode::OK, Json(ApiResponse::ok(updated))).into_response(),
        Ok(None) => failure(StatusCode::NOT_FOUND, "User not found"),
        Err(e) => internal("update user", e),
    }
}

/// DELETE /api/users?id=... - Refused for the bootstrap admin
async fn delete_user(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> impl IntoResponse {
    let Some(id) = query.id.filter(|id| !id.is_empty()) else {
        return failure(StatusCode::BAD_REQUEST, "Missing ID");
    };

    let conn = state.db.lock().unwrap();

    match user::delete_user(&conn, &id) {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::ok("User deleted"))).into_response(),
        Ok(false) => failure(StatusCode::NOT_FOUND, "User not found"),
        Err(e) if e.to_string() == "Cannot delete main admin" => {
            failure(StatusCode::FORBIDDEN, "Cannot delete main admin")
        }
        Err(e) => internal("delete user", e),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    println!("🌐 Voter Registry - Web Server v{}", voter_registry::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Open database (schema is created on first run)
    let db_path = std::path::PathBuf::from(default_db_path());
    let conn = open_database(&db_path).expect("Failed to open database");
    println!("✓ Database opened: {:?}", db_path);

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/voters", get(list_voters).post(create_voter))
        .route(
            "/voters/:id",
            get(get_voter).put(update_voter).delete(delete_voter),
        )
        .route("/areas", get(list_areas).post(create_area))
        .route(
            "/areas/:code",
            get(get_area).put(update_area).delete(delete_area),
        )
        .route("/import", post(import_voters))
        .route(
            "/users",
            get(list_users)
                .post(create_user)
                .put(update_user)
                .delete(delete_user),
        )
        .with_state(state);

    // Build main router
    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   API: http://localhost:3000/api/voters");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
