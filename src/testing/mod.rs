//! Test utilities: an in-memory [`Store`] and helpers for driving the router.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::app::AppState;
use crate::config::AppConfig;
use crate::database::store::value_to_text;
use crate::database::{DatabaseError, Store};
use crate::middleware::TOKEN_HEADER;
use crate::resources::{Column, Record, ResourceDef, SqlType, INVOICES, ROLES, USERS};

#[derive(Default)]
struct Table {
    last_id: i64,
    rows: Vec<Record>,
}

/// In-memory tables with the constraints the bootstrap migration declares:
/// unique natural keys, `users.role_id` referencing `roles`, typed columns.
pub struct MemoryStore {
    tables: Mutex<HashMap<&'static str, Table>>,
    available: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            available: true,
        }
    }

    /// Seeded with the `admin` (id 1) and `user` (id 2) roles.
    pub fn with_default_roles() -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.lock().unwrap();
            let roles = tables.entry(ROLES.table).or_default();
            for name in ["admin", "user"] {
                roles.last_id += 1;
                let row = json!({"id": roles.last_id, "role_name": name});
                roles.rows.push(row.as_object().unwrap().clone());
            }
        }
        store
    }

    /// Every call fails as if the database were unreachable.
    pub fn unavailable() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            available: false,
        }
    }

    fn check_available(&self) -> Result<(), DatabaseError> {
        if self.available {
            Ok(())
        } else {
            Err(DatabaseError::Unavailable("connection refused".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Columns the bootstrap migration declares NOT NULL, besides `id`.
const NOT_NULL: &[(&str, &str)] = &[
    ("roles", "role_name"),
    ("users", "user_email"),
    ("users", "user_password"),
    ("invoices", "invoice_paid"),
];

fn column_default(def: &ResourceDef, column: &str) -> Value {
    if def.table == INVOICES.table && column == "invoice_paid" {
        return json!(false);
    }
    Value::Null
}

/// Text cast to the column type, as `$n::TYPE` does in SQL.
fn cast(column: &Column, text: String) -> Result<Value, DatabaseError> {
    let invalid = || {
        DatabaseError::InvalidInput(format!("invalid input for {}: \"{}\"", column.name, text))
    };

    Ok(match column.sql_type {
        SqlType::Text | SqlType::Date => Value::String(text.clone()),
        SqlType::BigInt => json!(text.trim().parse::<i64>().map_err(|_| invalid())?),
        SqlType::Numeric => json!(text.trim().parse::<f64>().map_err(|_| invalid())?),
        SqlType::Boolean => json!(text.trim().parse::<bool>().map_err(|_| invalid())?),
    })
}

/// Coerce a payload value into a writable column.
fn coerce(def: &ResourceDef, name: &str, value: &Value) -> Result<Value, DatabaseError> {
    let Some(column) = def.columns.iter().find(|c| c.name == name) else {
        return Err(DatabaseError::UnknownColumn(name.to_string()));
    };
    match value_to_text(name, value)? {
        Some(text) => cast(column, text),
        None => Ok(Value::Null),
    }
}

/// The typed value a `WHERE column = $1::TYPE` lookup compares against.
fn lookup_value(def: &ResourceDef, column: &str, value: &str) -> Result<Value, DatabaseError> {
    let column = def
        .column(column)
        .ok_or_else(|| DatabaseError::UnknownColumn(column.to_string()))?;
    cast(column, value.to_string())
}

fn check_constraints(
    tables: &HashMap<&'static str, Table>,
    def: &ResourceDef,
    row: &Record,
) -> Result<(), DatabaseError> {
    for (_, column) in NOT_NULL.iter().filter(|(table, _)| *table == def.table) {
        if row.get(*column).map_or(true, Value::is_null) {
            return Err(DatabaseError::InvalidInput(format!(
                "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                column, def.table
            )));
        }
    }

    if let Some(key) = def.key {
        let value = row.get(key).filter(|v| !v.is_null());
        let id = row.get("id");
        let duplicate = value.is_some()
            && tables.get(def.table).is_some_and(|t| {
                t.rows
                    .iter()
                    .any(|other| other.get("id") != id && other.get(key) == value)
            });
        if duplicate {
            return Err(DatabaseError::Conflict(format!("{}_{}_key already exists", def.table, key)));
        }
    }

    if def.table == USERS.table {
        if let Some(role_id) = row.get("role_id").filter(|v| !v.is_null()) {
            let exists = tables
                .get(ROLES.table)
                .is_some_and(|t| t.rows.iter().any(|r| r.get("id") == Some(role_id)));
            if !exists {
                return Err(DatabaseError::InvalidReference("users_role_id_fkey".to_string()));
            }
        }
    }

    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn list(&self, def: &ResourceDef) -> Result<Vec<Record>, DatabaseError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.get(def.table).map(|t| t.rows.clone()).unwrap_or_default())
    }

    async fn find_by(
        &self,
        def: &ResourceDef,
        column: &str,
        value: &str,
    ) -> Result<Option<Record>, DatabaseError> {
        self.check_available()?;
        let target = lookup_value(def, column, value)?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.get(def.table).and_then(|t| {
            t.rows
                .iter()
                .find(|row| row.get(column) == Some(&target))
                .cloned()
        }))
    }

    async fn insert(&self, def: &ResourceDef, fields: &Record) -> Result<Record, DatabaseError> {
        self.check_available()?;
        let mut row = Record::new();
        for column in def.columns {
            row.insert(column.name.to_string(), column_default(def, column.name));
        }
        for (name, value) in fields {
            row.insert(name.clone(), coerce(def, name, value)?);
        }

        let mut tables = self.tables.lock().unwrap();
        check_constraints(&tables, def, &row)?;

        let table = tables.entry(def.table).or_default();
        table.last_id += 1;
        row.insert("id".to_string(), json!(table.last_id));
        row.insert("created_at".to_string(), json!(chrono::Utc::now().to_rfc3339()));
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        def: &ResourceDef,
        id: i64,
        fields: &Record,
    ) -> Result<Option<Record>, DatabaseError> {
        self.check_available()?;
        let mut changes = Record::new();
        for (name, value) in fields {
            changes.insert(name.clone(), coerce(def, name, value)?);
        }

        let mut tables = self.tables.lock().unwrap();
        let Some(mut row) = tables
            .get(def.table)
            .and_then(|t| t.rows.iter().find(|r| r.get("id") == Some(&json!(id))).cloned())
        else {
            return Ok(None);
        };
        row.extend(changes);
        check_constraints(&tables, def, &row)?;

        if let Some(table) = tables.get_mut(def.table) {
            if let Some(slot) = table.rows.iter_mut().find(|r| r.get("id") == Some(&json!(id))) {
                *slot = row.clone();
            }
        }
        Ok(Some(row))
    }

    async fn delete_by(
        &self,
        def: &ResourceDef,
        column: &str,
        value: &str,
    ) -> Result<u64, DatabaseError> {
        self.check_available()?;
        let target = lookup_value(def, column, value)?;
        let mut tables = self.tables.lock().unwrap();
        let Some(table) = tables.get_mut(def.table) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table.rows.retain(|row| row.get(column) != Some(&target));
        Ok((before - table.rows.len()) as u64)
    }

    async fn role_of(&self, user_id: i64) -> Result<Option<String>, DatabaseError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        let role_id = tables
            .get(USERS.table)
            .and_then(|t| t.rows.iter().find(|r| r.get("id") == Some(&json!(user_id))))
            .and_then(|user| user.get("role_id"))
            .filter(|v| !v.is_null());

        Ok(role_id.and_then(|role_id| {
            tables
                .get(ROLES.table)?
                .rows
                .iter()
                .find(|r| r.get("id") == Some(role_id))?
                .get("role_name")?
                .as_str()
                .map(str::to_string)
        }))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        self.check_available()
    }
}

/// Development preset with a fixed secret and the cheapest bcrypt cost.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.database.url = "postgres://localhost/backoffice_test".to_string();
    config.security.jwt_secret = "test-secret".to_string();
    config.security.bcrypt_cost = 4;
    config.api.enable_request_logging = false;
    config
}

pub fn test_state() -> AppState {
    AppState::new(test_config(), std::sync::Arc::new(MemoryStore::with_default_roles()))
}

/// Send one request through the router and decode the JSON body (`Null` when empty).
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(TOKEN_HEADER, token);
    }
    let request = match body {
        Some(body) => request
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    (status, json)
}

/// Sign up a user and return the issued token.
pub async fn signup_token(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/users/signup/",
        None,
        Some(json!({"user_email": email, "user_password": password})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "signup failed: {}", body);
    body["token"].as_str().unwrap().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::CLIENTS;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn enforces_unique_keys_on_update() {
        let store = MemoryStore::new();
        store.insert(&CLIENTS, &record(json!({"client_email": "a@x"}))).await.unwrap();
        store.insert(&CLIENTS, &record(json!({"client_email": "b@x"}))).await.unwrap();

        let err = store
            .update(&CLIENTS, 2, &record(json!({"client_email": "a@x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));

        // Re-saving the same key on the same row is fine
        assert!(store
            .update(&CLIENTS, 1, &record(json!({"client_email": "a@x"})))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn lookups_compare_typed_values() {
        let store = MemoryStore::new();
        store.insert(&CLIENTS, &record(json!({"client_email": "a@x"}))).await.unwrap();

        assert!(store.find_by(&CLIENTS, "id", "001").await.unwrap().is_some());
        assert_eq!(store.delete_by(&CLIENTS, "id", "01").await.unwrap(), 1);
        assert!(store.find_by(&CLIENTS, "id", "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn not_null_columns_reject_null() {
        let store = MemoryStore::new();
        let invoice = store
            .insert(&INVOICES, &record(json!({"invoice_number": "INV-1"})))
            .await
            .unwrap();
        assert_eq!(invoice["invoice_paid"], false);

        let err = store
            .update(&INVOICES, 1, &record(json!({"invoice_paid": null})))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn casts_like_postgres() {
        let store = MemoryStore::new();
        let err = store
            .insert(&crate::resources::PRODUCTS, &record(json!({"product_stock": "many"})))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidInput(_)));
    }
}
