use async_trait::async_trait;
use serde_json::Value;

use crate::database::manager::DatabaseError;
use crate::resources::{Record, ResourceDef};

/// Data access used by the handlers. Every operation is a single statement
/// against one table; there are no cross-entity transactions.
#[async_trait]
pub trait Store: Send + Sync {
    /// All rows of the table, ordered by id.
    async fn list(&self, def: &ResourceDef) -> Result<Vec<Record>, DatabaseError>;

    /// First row whose `column` equals `value`.
    async fn find_by(
        &self,
        def: &ResourceDef,
        column: &str,
        value: &str,
    ) -> Result<Option<Record>, DatabaseError>;

    /// Insert `fields` and return the stored row.
    async fn insert(&self, def: &ResourceDef, fields: &Record) -> Result<Record, DatabaseError>;

    /// Update the row with `id`; `None` when no such row exists.
    async fn update(
        &self,
        def: &ResourceDef,
        id: i64,
        fields: &Record,
    ) -> Result<Option<Record>, DatabaseError>;

    /// Delete rows whose `column` equals `value`, returning how many were removed.
    async fn delete_by(
        &self,
        def: &ResourceDef,
        column: &str,
        value: &str,
    ) -> Result<u64, DatabaseError>;

    /// Name of the role referenced by user `user_id`; `None` when the user does not exist.
    async fn role_of(&self, user_id: i64) -> Result<Option<String>, DatabaseError>;

    /// Round-trip to the database.
    async fn ping(&self) -> Result<(), DatabaseError>;
}

/// Text form of a JSON value for binding as a query parameter. `None` binds NULL.
pub fn value_to_text(column: &str, value: &Value) -> Result<Option<String>, DatabaseError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(DatabaseError::InvalidValue {
            column: column.to_string(),
            reason: "expected a scalar value".to_string(),
        }),
    }
}
