//! The SQLite persistence layer for users and expenses.
//!
//! Everything here takes a borrowed connection so that callers can run the
//! operations inside their own transaction. The store never commits or rolls
//! back on its own; it surfaces faults as [`DbError`] and leaves the decision
//! to the lifecycle service.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use rusqlite::{Connection, Error, Row, Transaction as SqlTransaction};
use uuid::Uuid;

use crate::{
    models::{DatabaseID, Expense, NewExpense, NewUser, PasswordHash, User},
    window::DateWindow,
};

/// Errors originating from operations on the app's database.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DbError {
    /// The user's email already exists in the database. The client should try again with a different email address.
    DuplicateEmail,
    /// A query was given an invalid foreign key. The client should check that the ids are valid.
    InvalidForeignKey,
    /// The row could not be found with the provided info (e.g., id). The client should try again with different parameters.
    NotFound,
    /// Wrapper for Sqlite errors not handled by the other enum entries.
    SqlError(Error),
}

impl Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SqlError(inner_error) => write!(f, "{:?}: {}", self, inner_error),
            other => write!(f, "{:?}", other),
        }
    }
}

impl From<Error> for DbError {
    fn from(error: Error) -> Self {
        match error {
            // Code 787 occurs when a FOREIGN KEY constraint failed.
            Error::SqliteFailure(sql_error, Some(_)) if sql_error.extended_code == 787 => {
                DbError::InvalidForeignKey
            }
            // Code 2067 occurs when a UNIQUE constraint failed.
            Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("email") =>
            {
                DbError::DuplicateEmail
            }
            Error::QueryReturnedNoRows => DbError::NotFound,
            e => DbError::SqlError(e),
        }
    }
}

/// A trait for adding an object schema to a database.
pub trait CreateTable {
    /// Create a table for the model.
    ///
    /// # Errors
    /// Returns an error if there is an SQL error.
    fn create_table(connection: &Connection) -> Result<(), DbError>;
}

/// A trait for mapping a `rusqlite::Row` from a SQLite database to a concrete rust type.
pub trait MapRow {
    type ReturnType;

    /// Convert a row into a concrete type.
    ///
    /// **Note:** This function expects that the row object contains all the table columns in the order they were defined.
    ///
    /// # Errors
    /// Returns an error if a row item cannot be converted into the corresponding rust type, or if an invalid column index was used.
    fn map_row(row: &Row) -> Result<Self::ReturnType, Error> {
        Self::map_row_with_offset(row, 0)
    }

    /// Convert a row into a concrete type, reading from the column at `offset`.
    ///
    /// # Errors
    /// Returns an error if a row item cannot be converted into the corresponding rust type, or if an invalid column index was used.
    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self::ReturnType, Error>;
}

/// A trait for inserting a record into the application database.
pub trait Insert {
    type ResultType;

    /// Insert the object into the application database.
    ///
    /// # Errors
    ///
    /// This function will return an error if the insertion failed.
    fn insert(self, connection: &Connection) -> Result<Self::ResultType, DbError>;
}

/// A trait for writing the current state of a record back to the application database.
pub trait Update {
    type ResultType;

    /// Update the matching row with the object's current field values.
    ///
    /// # Errors
    ///
    /// This function will return an error if the row does not exist or the update failed.
    fn update(self, connection: &Connection) -> Result<Self::ResultType, DbError>;
}

/// A trait for removing a record from the application database.
pub trait Delete {
    /// Delete the matching row.
    ///
    /// # Errors
    ///
    /// This function will return an error if the row does not exist or the deletion failed.
    fn delete(&self, connection: &Connection) -> Result<(), DbError>;
}

/// A trait for retrieving records from the application database by a field of type `T`.
pub trait SelectBy<T> {
    type ResultType;

    /// Select records from the application database that match `field`.
    fn select(field: T, connection: &Connection) -> Result<Self::ResultType, DbError>;
}

/// Read a UUID stored in its hyphenated text form.
fn id_from_column(row: &Row, index: usize) -> Result<DatabaseID, Error> {
    let raw: String = row.get(index)?;

    Uuid::parse_str(&raw).map_err(|e| {
        Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl CreateTable for User {
    fn create_table(connection: &Connection) -> Result<(), DbError> {
        connection.execute(
            "CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    username TEXT NOT NULL,
                    email TEXT UNIQUE NOT NULL,
                    password TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                    )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for User {
    type ReturnType = Self;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self, Error> {
        let id = id_from_column(row, offset)?;
        let username = row.get(offset + 1)?;
        let raw_email: String = row.get(offset + 2)?;
        let raw_password_hash: String = row.get(offset + 3)?;
        let created_at = row.get(offset + 4)?;
        let updated_at = row.get(offset + 5)?;

        let email = EmailAddress::new_unchecked(raw_email);
        // The hash came out of the database, which only ever stores hashes
        // produced by `PasswordHash::new`.
        let password_hash = unsafe { PasswordHash::new_unchecked(raw_password_hash) };

        Ok(Self::new(
            id,
            username,
            email,
            password_hash,
            created_at,
            updated_at,
        ))
    }
}

impl Insert for NewUser {
    type ResultType = User;

    /// Create a new user in the database.
    ///
    /// # Errors
    /// This function will return an error if the email is already in use or
    /// there is some other SQL error.
    fn insert(self, connection: &Connection) -> Result<Self::ResultType, DbError> {
        let id = Uuid::new_v4();

        connection.execute(
            "INSERT INTO users (id, username, email, password, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                id.to_string(),
                &self.username,
                self.email.to_string(),
                self.password_hash.to_string(),
                self.created_at,
                self.created_at,
            ),
        )?;

        Ok(User::new(
            id,
            self.username,
            self.email,
            self.password_hash,
            self.created_at,
            self.created_at,
        ))
    }
}

impl SelectBy<&EmailAddress> for User {
    type ResultType = User;

    /// Get the user from the database that has the specified `email` address.
    ///
    /// # Errors
    /// This function will return [DbError::NotFound] if there is no user with
    /// the specified email, or an error if there is some other SQL error.
    fn select(email: &EmailAddress, connection: &Connection) -> Result<Self::ResultType, DbError> {
        connection
            .prepare(
                "SELECT id, username, email, password, created_at, updated_at
                    FROM users WHERE email = :email",
            )?
            .query_row(&[(":email", &email.to_string())], User::map_row)
            .map_err(|e| e.into())
    }
}

/// Set a user's `updated_at` to `now`.
///
/// Used when the user signs in again.
///
/// # Errors
/// This function will return [DbError::NotFound] if `user_id` does not refer
/// to a user, or an error if there is some other SQL error.
pub fn refresh_user_updated_at(
    user_id: DatabaseID,
    now: DateTime<Utc>,
    connection: &Connection,
) -> Result<(), DbError> {
    let rows_updated = connection.execute(
        "UPDATE users SET updated_at = ?1 WHERE id = ?2",
        (now, user_id.to_string()),
    )?;

    if rows_updated == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

impl CreateTable for Expense {
    fn create_table(connection: &Connection) -> Result<(), DbError> {
        connection.execute(
            "CREATE TABLE IF NOT EXISTS expenses (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    amount REAL NOT NULL,
                    category TEXT NOT NULL,
                    description TEXT,
                    user_id TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    FOREIGN KEY(user_id) REFERENCES users(id) ON UPDATE CASCADE ON DELETE CASCADE
                    )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for Expense {
    type ReturnType = Self;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self, Error> {
        Ok(Self::new(
            id_from_column(row, offset)?,
            row.get(offset + 1)?,
            row.get(offset + 2)?,
            row.get(offset + 3)?,
            row.get(offset + 4)?,
            id_from_column(row, offset + 5)?,
            row.get(offset + 6)?,
            row.get(offset + 7)?,
        ))
    }
}

impl Insert for NewExpense {
    type ResultType = Expense;

    /// Create a new expense in the database.
    ///
    /// Both timestamps are set to the `created_at` carried by the new expense.
    ///
    /// # Errors
    /// This function will return an error if `user_id` does not refer to a
    /// valid user, or there is some other SQL error.
    fn insert(self, connection: &Connection) -> Result<Self::ResultType, DbError> {
        let id = Uuid::new_v4();

        connection.execute(
            "INSERT INTO expenses (id, title, amount, category, description, user_id, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            (
                id.to_string(),
                &self.title,
                self.amount,
                self.category,
                &self.description,
                self.user_id.to_string(),
                self.created_at,
                self.created_at,
            ),
        )?;

        Ok(Expense::new(
            id,
            self.title,
            self.amount,
            self.category,
            self.description,
            self.user_id,
            self.created_at,
            self.created_at,
        ))
    }
}

impl SelectBy<DatabaseID> for Expense {
    type ResultType = Self;

    /// Retrieve an expense in the database by its `id`.
    ///
    /// # Errors
    /// This function will return [DbError::NotFound] if `id` does not refer to
    /// an expense, or an error if there is some other SQL error.
    fn select(id: DatabaseID, connection: &Connection) -> Result<Self::ResultType, DbError> {
        connection
            .prepare(
                "SELECT id, title, amount, category, description, user_id, created_at, updated_at
                    FROM expenses WHERE id = :id",
            )?
            .query_row(&[(":id", &id.to_string())], Expense::map_row)
            .map_err(|e| e.into())
    }
}

impl Update for Expense {
    type ResultType = Self;

    /// Write the expense's current field values back to its row.
    ///
    /// The id, owner, and `created_at` are immutable and not written.
    ///
    /// # Errors
    /// This function will return [DbError::NotFound] if the row no longer
    /// exists, or an error if there is some other SQL error.
    fn update(self, connection: &Connection) -> Result<Self::ResultType, DbError> {
        let rows_updated = connection.execute(
            "UPDATE expenses SET title = ?1, amount = ?2, category = ?3, description = ?4, updated_at = ?5
                WHERE id = ?6",
            (
                self.title(),
                self.amount(),
                self.category(),
                self.description(),
                self.updated_at(),
                self.id().to_string(),
            ),
        )?;

        if rows_updated == 0 {
            return Err(DbError::NotFound);
        }

        Ok(self)
    }
}

impl Delete for Expense {
    /// Remove the expense's row from the database.
    ///
    /// # Errors
    /// This function will return [DbError::NotFound] if the row no longer
    /// exists, or an error if there is some other SQL error.
    fn delete(&self, connection: &Connection) -> Result<(), DbError> {
        let rows_deleted = connection.execute(
            "DELETE FROM expenses WHERE id = ?1",
            (self.id().to_string(),),
        )?;

        if rows_deleted == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }
}

/// Retrieve the expenses owned by `user_id` whose creation date falls within
/// `window`, newest first.
///
/// Both window bounds are inclusive. Ordering by `created_at` descending is
/// the only supported sort.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn select_expenses_in_window(
    user_id: DatabaseID,
    window: &DateWindow,
    connection: &Connection,
) -> Result<Vec<Expense>, DbError> {
    connection
        .prepare(
            "SELECT id, title, amount, category, description, user_id, created_at, updated_at
                FROM expenses
                WHERE user_id = ?1 AND created_at >= ?2 AND created_at <= ?3
                ORDER BY created_at DESC",
        )?
        .query_map(
            (user_id.to_string(), window.start, window.end),
            Expense::map_row,
        )?
        .map(|maybe_expense| maybe_expense.map_err(DbError::SqlError))
        .collect()
}

/// Create the application schema.
///
/// Also enables foreign key enforcement, which SQLite scopes to the
/// connection, so every connection must pass through here before use.
pub fn initialize(connection: &Connection) -> Result<(), DbError> {
    connection.pragma_update(None, "foreign_keys", true)?;

    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    User::create_table(&transaction)?;
    Expense::create_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}


#[cfg(test)]
mod expense_tests {
    use std::str::FromStr;

    use chrono::{DateTime, Duration, Utc};
    use email_address::EmailAddress;
    use rusqlite::Connection;
    use uuid::Uuid;

    use crate::{
        db::{
            initialize, select_expenses_in_window, DbError, Delete, Insert, SelectBy, Update,
        },
        models::{Category, Expense, NewExpense, NewUser, PasswordHash, User},
        window::DateWindow,
    };

    fn init_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn create_database_and_insert_test_user() -> (Connection, User) {
        let conn = init_db();

        let test_user = NewUser {
            username: "foo".to_string(),
            email: EmailAddress::from_str("foo@bar.baz").unwrap(),
            password_hash: unsafe { PasswordHash::new_unchecked("hunter2".to_string()) },
            created_at: Utc::now(),
        }
        .insert(&conn)
        .unwrap();

        (conn, test_user)
    }

    fn new_expense(user_id: Uuid, created_at: DateTime<Utc>) -> NewExpense {
        NewExpense {
            title: "Coffee".to_string(),
            amount: 4.5,
            category: Category::Leisure,
            description: Some("latte".to_string()),
            user_id,
            created_at,
        }
    }

    #[test]
    fn insert_expense_succeeds() {
        let (conn, test_user) = create_database_and_insert_test_user();
        let now = Utc::now();

        let expense = new_expense(test_user.id(), now).insert(&conn).unwrap();

        assert_eq!(expense.title(), "Coffee");
        assert_eq!(expense.amount(), 4.5);
        assert_eq!(expense.category(), Category::Leisure);
        assert_eq!(expense.description(), Some("latte"));
        assert_eq!(expense.user_id(), test_user.id());
        assert_eq!(expense.created_at(), now);
        assert_eq!(expense.updated_at(), now);
    }

    #[test]
    fn insert_expense_fails_with_invalid_user_id() {
        let conn = init_db();

        let maybe_expense = new_expense(Uuid::new_v4(), Utc::now()).insert(&conn);

        assert_eq!(maybe_expense, Err(DbError::InvalidForeignKey));
    }

    #[test]
    fn select_expense_by_id_succeeds() {
        let (conn, test_user) = create_database_and_insert_test_user();

        let inserted_expense = new_expense(test_user.id(), Utc::now())
            .insert(&conn)
            .unwrap();

        let selected_expense = Expense::select(inserted_expense.id(), &conn).unwrap();

        assert_eq!(inserted_expense, selected_expense);
    }

    #[test]
    fn select_expense_fails_on_unknown_id() {
        let conn = init_db();

        assert_eq!(
            Expense::select(Uuid::new_v4(), &conn),
            Err(DbError::NotFound)
        );
    }

    #[test]
    fn update_expense_writes_new_field_values() {
        let (conn, test_user) = create_database_and_insert_test_user();

        let mut expense = new_expense(test_user.id(), Utc::now())
            .insert(&conn)
            .unwrap();

        expense.set_title("Espresso".to_string());
        expense.set_amount(3.0);
        expense.set_category(Category::Groceries);
        expense.touch(Utc::now() + Duration::minutes(1));

        let updated_expense = expense.update(&conn).unwrap();
        let selected_expense = Expense::select(updated_expense.id(), &conn).unwrap();

        assert_eq!(selected_expense, updated_expense);
        assert_eq!(selected_expense.title(), "Espresso");
        assert_eq!(selected_expense.amount(), 3.0);
        assert_eq!(selected_expense.category(), Category::Groceries);
    }

    #[test]
    fn update_expense_fails_on_missing_row() {
        let (conn, test_user) = create_database_and_insert_test_user();

        let expense = new_expense(test_user.id(), Utc::now())
            .insert(&conn)
            .unwrap();
        expense.delete(&conn).unwrap();

        assert_eq!(expense.update(&conn), Err(DbError::NotFound));
    }

    #[test]
    fn delete_expense_removes_row() {
        let (conn, test_user) = create_database_and_insert_test_user();

        let expense = new_expense(test_user.id(), Utc::now())
            .insert(&conn)
            .unwrap();

        expense.delete(&conn).unwrap();

        assert_eq!(
            Expense::select(expense.id(), &conn),
            Err(DbError::NotFound)
        );
    }

    #[test]
    fn delete_expense_fails_on_missing_row() {
        let (conn, test_user) = create_database_and_insert_test_user();

        let expense = new_expense(test_user.id(), Utc::now())
            .insert(&conn)
            .unwrap();
        expense.delete(&conn).unwrap();

        assert_eq!(expense.delete(&conn), Err(DbError::NotFound));
    }

    #[test]
    fn deleting_user_cascades_to_expenses() {
        let (conn, test_user) = create_database_and_insert_test_user();

        let expense = new_expense(test_user.id(), Utc::now())
            .insert(&conn)
            .unwrap();

        conn.execute(
            "DELETE FROM users WHERE id = ?1",
            (test_user.id().to_string(),),
        )
        .unwrap();

        assert_eq!(
            Expense::select(expense.id(), &conn),
            Err(DbError::NotFound)
        );
    }

    #[test]
    fn select_expenses_in_window_returns_newest_first() {
        let (conn, test_user) = create_database_and_insert_test_user();
        let now = Utc::now();

        let oldest = new_expense(test_user.id(), now - Duration::days(3))
            .insert(&conn)
            .unwrap();
        let newest = new_expense(test_user.id(), now - Duration::days(1))
            .insert(&conn)
            .unwrap();
        let middle = new_expense(test_user.id(), now - Duration::days(2))
            .insert(&conn)
            .unwrap();

        let window = DateWindow {
            start: now - Duration::days(7),
            end: now,
        };
        let expenses = select_expenses_in_window(test_user.id(), &window, &conn).unwrap();

        assert_eq!(expenses, vec![newest, middle, oldest]);
    }

    #[test]
    fn select_expenses_in_window_includes_both_bounds() {
        let (conn, test_user) = create_database_and_insert_test_user();
        let now = Utc::now();

        let window = DateWindow {
            start: now - Duration::days(7),
            end: now,
        };

        let at_start = new_expense(test_user.id(), window.start)
            .insert(&conn)
            .unwrap();
        let at_end = new_expense(test_user.id(), window.end)
            .insert(&conn)
            .unwrap();
        // Just outside either bound.
        new_expense(test_user.id(), window.start - Duration::seconds(1))
            .insert(&conn)
            .unwrap();
        new_expense(test_user.id(), window.end + Duration::seconds(1))
            .insert(&conn)
            .unwrap();

        let expenses = select_expenses_in_window(test_user.id(), &window, &conn).unwrap();

        assert_eq!(expenses, vec![at_end, at_start]);
    }

    #[test]
    fn select_expenses_in_window_excludes_other_users() {
        let (conn, test_user) = create_database_and_insert_test_user();

        let other_user = NewUser {
            username: "bar".to_string(),
            email: EmailAddress::from_str("bar@baz.qux").unwrap(),
            password_hash: unsafe { PasswordHash::new_unchecked("hunter3".to_string()) },
            created_at: Utc::now(),
        }
        .insert(&conn)
        .unwrap();

        let now = Utc::now();
        new_expense(other_user.id(), now).insert(&conn).unwrap();

        let window = DateWindow {
            start: now - Duration::days(7),
            end: now,
        };
        let expenses = select_expenses_in_window(test_user.id(), &window, &conn).unwrap();

        assert_eq!(expenses, vec![]);
    }
}
