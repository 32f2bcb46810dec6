//! PostgreSQL implementation of [`Store`].
//!
//! Identifiers come from the static resource catalog and are quoted; values are
//! always bound as text parameters and cast to the column type in SQL.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::database::manager::{quote_identifier, DatabaseError};
use crate::database::store::{value_to_text, Store};
use crate::resources::{Column, Record, ResourceDef, ID_COLUMN};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ROLE_OF_SQL: &str = r#"
    SELECT roles.role_name
    FROM users
    JOIN roles ON users.role_id = roles.id
    WHERE users.id = $1
"#;

#[async_trait]
impl Store for PgStore {
    async fn list(&self, def: &ResourceDef) -> Result<Vec<Record>, DatabaseError> {
        let sql = select_sql(def, None);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn find_by(
        &self,
        def: &ResourceDef,
        column: &str,
        value: &str,
    ) -> Result<Option<Record>, DatabaseError> {
        let column = lookup_column(def, column)?;
        let sql = select_sql(def, Some(column));
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn insert(&self, def: &ResourceDef, fields: &Record) -> Result<Record, DatabaseError> {
        let (columns, params) = writable_params(def, fields)?;
        let sql = insert_sql(def, &columns);

        let mut query = sqlx::query(&sql);
        for param in params {
            query = query.bind(param);
        }
        let row = query.fetch_one(&self.pool).await?;
        row_to_record(&row)
    }

    async fn update(
        &self,
        def: &ResourceDef,
        id: i64,
        fields: &Record,
    ) -> Result<Option<Record>, DatabaseError> {
        let (columns, params) = writable_params(def, fields)?;
        let sql = update_sql(def, &columns);

        let mut query = sqlx::query(&sql);
        for param in params {
            query = query.bind(param);
        }
        let row = query.bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn delete_by(
        &self,
        def: &ResourceDef,
        column: &str,
        value: &str,
    ) -> Result<u64, DatabaseError> {
        let column = lookup_column(def, column)?;
        let sql = delete_sql(def, column);
        let result = sqlx::query(&sql).bind(value).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn role_of(&self, user_id: i64) -> Result<Option<String>, DatabaseError> {
        let row = sqlx::query(ROLE_OF_SQL)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("role_name")?),
            None => None,
        })
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn lookup_column<'a>(def: &'a ResourceDef, name: &str) -> Result<&'a Column, DatabaseError> {
    def.column(name)
        .ok_or_else(|| DatabaseError::UnknownColumn(name.to_string()))
}

/// Split a payload into its writable columns and their text parameters, in payload order.
fn writable_params<'a>(
    def: &'a ResourceDef,
    fields: &Record,
) -> Result<(Vec<&'a Column>, Vec<Option<String>>), DatabaseError> {
    let mut columns = Vec::with_capacity(fields.len());
    let mut params = Vec::with_capacity(fields.len());

    for (name, value) in fields {
        let column = def
            .columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DatabaseError::UnknownColumn(name.clone()))?;
        columns.push(column);
        params.push(value_to_text(name, value)?);
    }

    Ok((columns, params))
}

fn row_to_record(row: &PgRow) -> Result<Record, DatabaseError> {
    match row.try_get::<Value, _>("row")? {
        Value::Object(map) => Ok(map),
        _ => Err(DatabaseError::Sqlx(sqlx::Error::Decode(
            "expected row_to_json to produce an object".into(),
        ))),
    }
}

fn cast_param(index: usize, column: &Column) -> String {
    format!("${}::{}", index, column.sql_type.as_sql())
}

fn select_sql(def: &ResourceDef, filter: Option<&Column>) -> String {
    let table = quote_identifier(def.table);
    match filter {
        Some(column) => format!(
            "SELECT row_to_json(t) AS row FROM (SELECT * FROM {} WHERE {} = {} ORDER BY \"id\" LIMIT 1) t",
            table,
            quote_identifier(column.name),
            cast_param(1, column)
        ),
        None => format!(
            "SELECT row_to_json(t) AS row FROM (SELECT * FROM {} ORDER BY \"id\") t",
            table
        ),
    }
}

fn insert_sql(def: &ResourceDef, columns: &[&Column]) -> String {
    let table = quote_identifier(def.table);
    let insert = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table)
    } else {
        let names: Vec<String> = columns.iter().map(|c| quote_identifier(c.name)).collect();
        let values: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| cast_param(i + 1, c))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            table,
            names.join(", "),
            values.join(", ")
        )
    };
    format!(
        "WITH changed AS ({}) SELECT row_to_json(changed) AS row FROM changed",
        insert
    )
}

/// The id is bound last, after the column values.
fn update_sql(def: &ResourceDef, columns: &[&Column]) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = {}", quote_identifier(c.name), cast_param(i + 1, c)))
        .collect();
    format!(
        "WITH changed AS (UPDATE {} SET {} WHERE \"id\" = {} RETURNING *) SELECT row_to_json(changed) AS row FROM changed",
        quote_identifier(def.table),
        assignments.join(", "),
        cast_param(columns.len() + 1, &ID_COLUMN)
    )
}

fn delete_sql(def: &ResourceDef, column: &Column) -> String {
    format!(
        "DELETE FROM {} WHERE {} = {}",
        quote_identifier(def.table),
        quote_identifier(column.name),
        cast_param(1, column)
    )
}
