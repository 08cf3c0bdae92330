//! The HTTP surface: routing, request bodies, and error-to-status mapping.
//!
//! Handlers stay thin. They resolve the authenticated identity, lock the
//! database handle, and hand everything to [`crate::service`]; the response is
//! either the returned expense as JSON or the service's error kind mapped to a
//! status code.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{self, Claims},
    config::AppConfig,
    models::{DatabaseID, Expense},
    service::{self, CreateExpense, ExpenseError, UpdateExpense},
};

/// Return a router with all the app's routes.
pub fn build_router() -> Router<AppConfig> {
    Router::new()
        .route("/", get(|| async { StatusCode::IM_A_TEAPOT }))
        .route("/api/v1/signup", post(auth::register))
        .route("/api/v1/login", post(auth::sign_in))
        .route("/api/v1/create-expense", post(create_expense))
        .route("/api/v1/update-expense", put(update_expense))
        .route("/api/v1/delete-expense", delete(delete_expense))
        .route("/api/v1/filter-expense", get(filter_expenses))
}

/// Wraps [ExpenseError] so each kind can be rendered as a status code and a
/// JSON error body.
pub(crate) struct AppError(ExpenseError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ExpenseError::Validation(_)
            | ExpenseError::InvalidAmount
            | ExpenseError::InvalidFilterInput(_) => StatusCode::BAD_REQUEST,
            ExpenseError::OwnerNotFound | ExpenseError::ExpenseNotFound => StatusCode::NOT_FOUND,
            ExpenseError::OperationFailed(e) | ExpenseError::QueryFailed(e) => {
                tracing::error!("{e:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.0.to_string(),
        }));

        (status, body).into_response()
    }
}

/// A route handler for creating a new expense owned by the authenticated user.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
async fn create_expense(
    State(state): State<AppConfig>,
    claims: Claims,
    Json(mut request): Json<CreateExpense>,
) -> Result<Json<Expense>, AppError> {
    // The owner comes from the token, never from the request body.
    request.owner_email = claims.email.to_string();

    let mut connection = state.db_connection().lock().unwrap();

    service::create_expense(request, Utc::now(), &mut connection)
        .map(Json)
        .map_err(AppError)
}

#[derive(Deserialize)]
pub(crate) struct UpdateExpenseBody {
    expense_id: DatabaseID,
    #[serde(flatten)]
    changes: UpdateExpense,
}

/// A route handler for partially updating an expense.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
async fn update_expense(
    State(state): State<AppConfig>,
    _claims: Claims,
    Json(body): Json<UpdateExpenseBody>,
) -> Result<Json<Expense>, AppError> {
    let mut connection = state.db_connection().lock().unwrap();

    service::update_expense(body.expense_id, body.changes, Utc::now(), &mut connection)
        .map(Json)
        .map_err(AppError)
}

#[derive(Deserialize)]
pub(crate) struct DeleteExpenseBody {
    expense_id: DatabaseID,
}

/// A route handler for deleting an expense.
///
/// Responds with the state of the expense as it was just before deletion.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
async fn delete_expense(
    State(state): State<AppConfig>,
    _claims: Claims,
    Json(body): Json<DeleteExpenseBody>,
) -> Result<Json<Expense>, AppError> {
    let mut connection = state.db_connection().lock().unwrap();

    service::delete_expense(body.expense_id, &mut connection)
        .map(Json)
        .map_err(AppError)
}

#[derive(Deserialize)]
pub(crate) struct FilterQuery {
    filter: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
}

/// A route handler for listing the authenticated user's expenses within a
/// time window, newest first.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
async fn filter_expenses(
    State(state): State<AppConfig>,
    claims: Claims,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<Expense>>, AppError> {
    let owner_email = claims.email.to_string();
    let connection = state.db_connection().lock().unwrap();

    service::filter_expenses(
        &owner_email,
        query.filter.as_deref(),
        query.from_date.as_deref(),
        query.to_date.as_deref(),
        Utc::now(),
        &connection,
    )
    .map(Json)
    .map_err(AppError)
}
