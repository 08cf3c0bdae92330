use std::fmt::Display;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// The fixed set of expense categories.
///
/// Clients send free text which is mapped onto this set with [`Category::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Groceries,
    Leisure,
    Electronics,
    Utilities,
    Clothing,
    Health,
    Others,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 7] = [
        Category::Groceries,
        Category::Leisure,
        Category::Electronics,
        Category::Utilities,
        Category::Clothing,
        Category::Health,
        Category::Others,
    ];

    /// The canonical name, as stored in the database and returned to clients.
    pub fn name(self) -> &'static str {
        match self {
            Category::Groceries => "Groceries",
            Category::Leisure => "Leisure",
            Category::Electronics => "Electronics",
            Category::Utilities => "Utilities",
            Category::Clothing => "Clothing",
            Category::Health => "Health",
            Category::Others => "Others",
        }
    }

    /// Map free-text input onto a category.
    ///
    /// Matching is case-insensitive against the canonical names and the first
    /// match wins. Input that matches nothing, including the empty string,
    /// falls back to [`Category::Others`]. This function cannot fail.
    pub fn normalize(input: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|category| category.name().eq_ignore_ascii_case(input))
            .unwrap_or(Self::Others)
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl ToSql for Category {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.name()))
    }
}

impl FromSql for Category {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(Category::normalize)
    }
}
