// UniID - API Server
// JSON surface over the tap engine; state is one shared SQLite handle

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use uniid::{
    attendance::AttendanceFilter, find_student_by_identifier, list_attendance, list_policies,
    list_students, list_transactions, open_database, process_tap, reset_demo_data,
    seed_demo_data, setup_database, AttendanceRecord, Policy, Student, TransactionRecord,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

/// API Response wrapper for the list endpoints
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

#[derive(Deserialize)]
struct TapRequest {
    rfid_uid: String,
    service: String,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Deserialize)]
struct AttendanceRequest {
    rfid_uid: String,
    #[serde(default)]
    service_context: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

fn internal_error() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            success: false,
            error: "Internal server error".to_string(),
        }),
    )
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/tap - Process a card tap
async fn handle_tap(
    State(state): State<AppState>,
    Json(request): Json<TapRequest>,
) -> impl IntoResponse {
    let mut conn = state.db.lock().unwrap();

    match process_tap(
        &mut conn,
        &request.rfid_uid,
        &request.service,
        request.context.as_deref(),
    ) {
        Ok(outcome) => {
            let response = outcome.to_response(&request.service);
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            eprintln!("Tap processing error: {}", e);
            internal_error().into_response()
        }
    }
}

/// GET /api/students - Get all students
async fn get_students(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match list_students(&conn) {
        Ok(students) => (StatusCode::OK, Json(ApiResponse::ok(students))).into_response(),
        Err(e) => {
            eprintln!("Error listing students: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::ok(Vec::<Student>::new())),
            )
                .into_response()
        }
    }
}

/// GET /api/students/:rfid_uid - Get student by card identifier
async fn get_student(
    State(state): State<AppState>,
    Path(rfid_uid): Path<String>,
) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    // Decode URL-encoded identifier
    let decoded = urlencoding::decode(&rfid_uid)
        .unwrap_or_else(|_| rfid_uid.clone().into())
        .into_owned();

    match find_student_by_identifier(&conn, &decoded) {
        Ok(Some(student)) => (StatusCode::OK, Json(ApiResponse::ok(student))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                success: false,
                error: "Student not found".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            eprintln!("Error looking up student {}: {}", decoded, e);
            internal_error().into_response()
        }
    }
}

/// GET /api/transactions - Latest journal entries with student names
async fn get_transactions(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match list_transactions(&conn, 100) {
        Ok(records) => (StatusCode::OK, Json(ApiResponse::ok(records))).into_response(),
        Err(e) => {
            eprintln!("Error listing transactions: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::ok(Vec::<TransactionRecord>::new())),
            )
                .into_response()
        }
    }
}

/// GET /api/policies - Service policies (stored rows or built-in defaults)
async fn get_policies(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    let policies: Vec<Policy> = list_policies(&conn);
    (StatusCode::OK, Json(ApiResponse::ok(policies)))
}

/// GET /api/attendance - Attendance records with academic filters
async fn get_attendance(
    State(state): State<AppState>,
    Query(filter): Query<AttendanceFilter>,
) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match list_attendance(&conn, &filter) {
        Ok(records) => (StatusCode::OK, Json(ApiResponse::ok(records))).into_response(),
        Err(e) => {
            eprintln!("Error listing attendance: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::ok(Vec::<AttendanceRecord>::new())),
            )
                .into_response()
        }
    }
}

/// POST /api/attendance - Mark attendance via card tap
async fn post_attendance(
    State(state): State<AppState>,
    Json(request): Json<AttendanceRequest>,
) -> impl IntoResponse {
    let mut conn = state.db.lock().unwrap();

    match process_tap(
        &mut conn,
        &request.rfid_uid,
        "attendance",
        request.service_context.as_deref(),
    ) {
        Ok(outcome) => {
            let response = outcome.to_response("attendance");
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            eprintln!("Attendance tap error: {}", e);
            internal_error().into_response()
        }
    }
}

/// POST /api/reset-demo - Restore demo balances and clear the journal
async fn post_reset_demo(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match reset_demo_data(&conn) {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok("Demo data reset successfully")),
        )
            .into_response(),
        Err(e) => {
            eprintln!("Error resetting demo data: {}", e);
            internal_error().into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    println!("🎓 UniID - Smart Campus Identity & Access System");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = std::env::var("UNIID_DB").unwrap_or_else(|_| "uniid.db".to_string());

    // Explicit one-time initialization; the handle is passed by state
    let conn = open_database(std::path::Path::new(&db_path)).expect("Failed to open database");
    setup_database(&conn).expect("Failed to set up schema");
    seed_demo_data(&conn).expect("Failed to seed demo data");
    println!("✓ Database ready: {}", db_path);

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/tap", post(handle_tap))
        .route("/students", get(get_students))
        .route("/students/:rfid_uid", get(get_student))
        .route("/transactions", get(get_transactions))
        .route("/policies", get(get_policies))
        .route("/attendance", get(get_attendance).post(post_attendance))
        .route("/reset-demo", post(post_reset_demo))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = "0.0.0.0:8000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:8000");
    println!("   Tap endpoint: POST http://localhost:8000/api/tap");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
