use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Category, DatabaseID};

/// An expense record owned by exactly one user.
///
/// Rows are only ever created, mutated, and removed through the lifecycle
/// operations in [`crate::service`]; the invariant `amount >= 0` is enforced
/// there on every create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    id: DatabaseID,
    title: String,
    amount: f64,
    category: Category,
    description: Option<String>,
    user_id: DatabaseID,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
}

impl Expense {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: DatabaseID,
        title: String,
        amount: f64,
        category: Category,
        description: Option<String>,
        user_id: DatabaseID,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            amount,
            category,
            description,
            user_id,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> DatabaseID {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The id of the user that owns the expense. Immutable after creation.
    pub fn user_id(&self) -> DatabaseID {
        self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn set_title(&mut self, title: String) {
        self.title = title;
    }

    pub(crate) fn set_amount(&mut self, amount: f64) {
        self.amount = amount;
    }

    pub(crate) fn set_category(&mut self, category: Category) {
        self.category = category;
    }

    pub(crate) fn set_description(&mut self, description: String) {
        self.description = Some(description);
    }

    /// Refresh `updated_at`. Called on every mutation.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// The data for creating a new expense.
///
/// The id is assigned at insertion time, and both timestamps start out as
/// `created_at`.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub title: String,
    pub amount: f64,
    pub category: Category,
    pub description: Option<String>,
    pub user_id: DatabaseID,
    pub created_at: DateTime<Utc>,
}
