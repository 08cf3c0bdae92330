//! The expense lifecycle service.
//!
//! Each operation is a single atomic step: validate, look up, mutate, commit.
//! Mutations run inside one `rusqlite` transaction; dropping the transaction
//! on the error path rolls every change back, so a fault can never leave a
//! half-applied expense behind.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use rusqlite::Connection;
use serde::Deserialize;

use crate::{
    db::{select_expenses_in_window, DbError, Delete, Insert, SelectBy, Update},
    models::{Category, DatabaseID, Expense, NewExpense, User},
    window::{DateWindow, WindowError},
};

/// The failures an expense lifecycle operation can surface.
///
/// The route layer maps each kind to an HTTP status code; the service only
/// guarantees a stable kind plus a human-readable detail string.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ExpenseError {
    /// Required input was missing or malformed. Always detected before any
    /// database work, so nothing needs to be rolled back.
    #[error("{0}")]
    Validation(String),

    /// An update left the expense with a negative amount.
    #[error("amount cannot be negative")]
    InvalidAmount,

    /// The email does not belong to a registered user.
    #[error("no user found for the given email")]
    OwnerNotFound,

    /// The id does not refer to an expense.
    #[error("no expense found for the given id")]
    ExpenseNotFound,

    /// The custom filter window was missing a bound or had an unparseable date.
    #[error("invalid filter input: {0}")]
    InvalidFilterInput(#[from] WindowError),

    /// A database fault during a mutation. The transaction was rolled back.
    #[error("the expense operation failed: {0}")]
    OperationFailed(DbError),

    /// A database fault during a read-only query.
    #[error("the expense query failed: {0}")]
    QueryFailed(DbError),
}

fn validation(message: &str) -> ExpenseError {
    ExpenseError::Validation(message.to_string())
}

/// The input for [create_expense]. All fields are required.
///
/// `owner_email` is filled in from the authenticated identity, never from the
/// request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateExpense {
    #[serde(default)]
    pub title: String,
    pub amount: Option<f64>,
    #[serde(default)]
    pub category: String,
    pub description: Option<String>,
    #[serde(skip)]
    pub owner_email: String,
}

/// The input for [update_expense]. Absent fields keep their current values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateExpense {
    pub title: Option<String>,
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Validate and persist a new expense owned by `request.owner_email`.
///
/// The category is normalized onto the fixed set, a fresh id is assigned, and
/// both timestamps are set to `now`.
///
/// # Errors
///
/// Returns [ExpenseError::Validation] for missing or malformed input (checked
/// field by field, first failure wins), [ExpenseError::OwnerNotFound] if the
/// email does not resolve to a user, and [ExpenseError::OperationFailed] if
/// the database faults, in which case the transaction is rolled back.
pub fn create_expense(
    request: CreateExpense,
    now: DateTime<Utc>,
    connection: &mut Connection,
) -> Result<Expense, ExpenseError> {
    if request.title.is_empty() {
        return Err(validation("title is missing"));
    }

    let amount = request.amount.ok_or_else(|| validation("amount is missing"))?;

    if amount < 0.0 {
        return Err(validation("amount cannot be negative"));
    }

    if request.category.is_empty() {
        return Err(validation("category is missing"));
    }

    let description = match request.description {
        Some(description) if !description.is_empty() => description,
        _ => return Err(validation("description is missing")),
    };

    if request.owner_email.is_empty() {
        return Err(validation("email is missing"));
    }

    let email =
        EmailAddress::from_str(&request.owner_email).map_err(|_| ExpenseError::OwnerNotFound)?;

    let transaction = connection
        .transaction()
        .map_err(|e| ExpenseError::OperationFailed(e.into()))?;

    let owner = User::select(&email, &transaction).map_err(|e| match e {
        DbError::NotFound => ExpenseError::OwnerNotFound,
        e => ExpenseError::OperationFailed(e),
    })?;

    let expense = NewExpense {
        title: request.title,
        amount,
        category: Category::normalize(&request.category),
        description: Some(description),
        user_id: owner.id(),
        created_at: now,
    }
    .insert(&transaction)
    .map_err(ExpenseError::OperationFailed)?;

    transaction
        .commit()
        .map_err(|e| ExpenseError::OperationFailed(e.into()))?;

    Ok(expense)
}

/// Apply a partial update to the expense with `id`.
///
/// Only the supplied fields change; a supplied category is normalized onto the
/// fixed set, and `updated_at` is refreshed. The amount is re-validated
/// against the final in-memory value whether or not the request supplied one,
/// so a stored invariant violation can never survive an update.
///
/// # Errors
///
/// Returns [ExpenseError::ExpenseNotFound] if `id` does not resolve to an
/// expense, [ExpenseError::InvalidAmount] if the post-update amount is
/// negative, and [ExpenseError::OperationFailed] if the database faults, in
/// which case the transaction is rolled back.
pub fn update_expense(
    id: DatabaseID,
    changes: UpdateExpense,
    now: DateTime<Utc>,
    connection: &mut Connection,
) -> Result<Expense, ExpenseError> {
    let transaction = connection
        .transaction()
        .map_err(|e| ExpenseError::OperationFailed(e.into()))?;

    let mut expense = Expense::select(id, &transaction).map_err(|e| match e {
        DbError::NotFound => ExpenseError::ExpenseNotFound,
        e => ExpenseError::OperationFailed(e),
    })?;

    if let Some(title) = changes.title {
        expense.set_title(title);
    }

    if let Some(amount) = changes.amount {
        expense.set_amount(amount);
    }

    if let Some(description) = changes.description {
        expense.set_description(description);
    }

    if let Some(category) = changes.category {
        expense.set_category(Category::normalize(&category));
    }

    if expense.amount() < 0.0 {
        return Err(ExpenseError::InvalidAmount);
    }

    expense.touch(now);

    let expense = expense
        .update(&transaction)
        .map_err(ExpenseError::OperationFailed)?;

    transaction
        .commit()
        .map_err(|e| ExpenseError::OperationFailed(e.into()))?;

    Ok(expense)
}

/// Delete the expense with `id` and return its pre-deletion state.
///
/// The returned value is a snapshot taken before the row is removed; it does
/// not reflect anything that happens afterwards.
///
/// # Errors
///
/// Returns [ExpenseError::ExpenseNotFound] if `id` does not resolve to an
/// expense, and [ExpenseError::OperationFailed] if the database faults, in
/// which case the transaction is rolled back.
pub fn delete_expense(
    id: DatabaseID,
    connection: &mut Connection,
) -> Result<Expense, ExpenseError> {
    let transaction = connection
        .transaction()
        .map_err(|e| ExpenseError::OperationFailed(e.into()))?;

    let expense = Expense::select(id, &transaction).map_err(|e| match e {
        DbError::NotFound => ExpenseError::ExpenseNotFound,
        e => ExpenseError::OperationFailed(e),
    })?;

    expense
        .delete(&transaction)
        .map_err(ExpenseError::OperationFailed)?;

    transaction
        .commit()
        .map_err(|e| ExpenseError::OperationFailed(e.into()))?;

    Ok(expense)
}

/// List the expenses owned by `owner_email` within the requested time window,
/// newest first.
///
/// The window comes from [DateWindow::resolve]: a named preset ending at
/// `now`, or explicit bounds for the `custom` filter. Never mutates state.
///
/// # Errors
///
/// Returns [ExpenseError::OwnerNotFound] if the email does not resolve to a
/// user, [ExpenseError::InvalidFilterInput] if the custom window input is
/// incomplete or unparseable, and [ExpenseError::QueryFailed] if the database
/// faults.
pub fn filter_expenses(
    owner_email: &str,
    filter: Option<&str>,
    from_date: Option<&str>,
    to_date: Option<&str>,
    now: DateTime<Utc>,
    connection: &Connection,
) -> Result<Vec<Expense>, ExpenseError> {
    let email = EmailAddress::from_str(owner_email).map_err(|_| ExpenseError::OwnerNotFound)?;

    let owner = User::select(&email, connection).map_err(|e| match e {
        DbError::NotFound => ExpenseError::OwnerNotFound,
        e => ExpenseError::QueryFailed(e),
    })?;

    let window = DateWindow::resolve(filter, from_date, to_date, now)?;

    select_expenses_in_window(owner.id(), &window, connection).map_err(ExpenseError::QueryFailed)
}

#[cfg(test)]
mod create_expense_tests {
    use std::str::FromStr;

    use chrono::Utc;
    use email_address::EmailAddress;
    use rusqlite::Connection;

    use crate::{
        db::{initialize, Insert},
        models::{Category, NewUser, PasswordHash, User},
        service::{create_expense, CreateExpense, ExpenseError},
    };

    fn init_db_with_user(email: &str) -> (Connection, User) {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let user = NewUser {
            username: "test".to_string(),
            email: EmailAddress::from_str(email).unwrap(),
            password_hash: unsafe { PasswordHash::new_unchecked("hunter2".to_string()) },
            created_at: Utc::now(),
        }
        .insert(&conn)
        .unwrap();

        (conn, user)
    }

    fn coffee_request(owner_email: &str) -> CreateExpense {
        CreateExpense {
            title: "Coffee".to_string(),
            amount: Some(4.5),
            category: "leisure".to_string(),
            description: Some("latte".to_string()),
            owner_email: owner_email.to_string(),
        }
    }

    #[test]
    fn create_expense_succeeds_and_normalizes_category() {
        let (mut conn, user) = init_db_with_user("a@x.com");
        let now = Utc::now();

        let expense = create_expense(coffee_request("a@x.com"), now, &mut conn).unwrap();

        assert_eq!(expense.title(), "Coffee");
        assert_eq!(expense.amount(), 4.5);
        assert_eq!(expense.category(), Category::Leisure);
        assert_eq!(expense.description(), Some("latte"));
        assert_eq!(expense.user_id(), user.id());
        assert_eq!(expense.created_at(), expense.updated_at());
    }

    #[test]
    fn create_expense_accepts_zero_amount() {
        let (mut conn, _) = init_db_with_user("a@x.com");

        let request = CreateExpense {
            amount: Some(0.0),
            ..coffee_request("a@x.com")
        };

        assert!(create_expense(request, Utc::now(), &mut conn).is_ok());
    }

    #[test]
    fn create_expense_rejects_negative_amount() {
        let (mut conn, _) = init_db_with_user("a@x.com");

        let request = CreateExpense {
            amount: Some(-1.0),
            ..coffee_request("a@x.com")
        };

        assert!(matches!(
            create_expense(request, Utc::now(), &mut conn),
            Err(ExpenseError::Validation(_))
        ));
    }

    #[test]
    fn create_expense_validates_fields_in_order() {
        let (mut conn, _) = init_db_with_user("a@x.com");

        let missing_everything = CreateExpense::default();
        assert_eq!(
            create_expense(missing_everything, Utc::now(), &mut conn),
            Err(ExpenseError::Validation("title is missing".to_string()))
        );

        let missing_amount = CreateExpense {
            amount: None,
            ..coffee_request("a@x.com")
        };
        assert_eq!(
            create_expense(missing_amount, Utc::now(), &mut conn),
            Err(ExpenseError::Validation("amount is missing".to_string()))
        );

        let missing_category = CreateExpense {
            category: String::new(),
            ..coffee_request("a@x.com")
        };
        assert_eq!(
            create_expense(missing_category, Utc::now(), &mut conn),
            Err(ExpenseError::Validation("category is missing".to_string()))
        );

        let missing_description = CreateExpense {
            description: None,
            ..coffee_request("a@x.com")
        };
        assert_eq!(
            create_expense(missing_description, Utc::now(), &mut conn),
            Err(ExpenseError::Validation(
                "description is missing".to_string()
            ))
        );

        let missing_email = coffee_request("");
        assert_eq!(
            create_expense(missing_email, Utc::now(), &mut conn),
            Err(ExpenseError::Validation("email is missing".to_string()))
        );
    }

    #[test]
    fn create_expense_fails_for_unknown_owner() {
        let (mut conn, _) = init_db_with_user("a@x.com");

        let result = create_expense(coffee_request("b@x.com"), Utc::now(), &mut conn);

        assert_eq!(result, Err(ExpenseError::OwnerNotFound));
    }
}
