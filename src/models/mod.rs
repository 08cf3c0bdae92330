//! Domain types shared by the store, the lifecycle service, and the routes.

mod category;
mod expense;
mod password;
mod user;

pub use category::Category;
pub use expense::{Expense, NewExpense};
pub use password::{PasswordError, PasswordHash, RawPassword};
pub use user::{NewUser, User};

/// The type of row ids in the application database.
///
/// Ids are generated by the application at insertion time, never reused, and
/// stored as their canonical hyphenated text form.
pub type DatabaseID = uuid::Uuid;
