//! PostgreSQL driver on sqlx
//!
//! One `PgConnection` per session, no pool. Parameters bind by JSON type;
//! columns decode by Postgres type name, falling back to text.

use async_trait::async_trait;
use node_engine::{Closeable, NodeEngineError, Result};
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Postgres, Row, TypeInfo};

use super::{QueryRows, RelationalConnector, RelationalSession};

#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl RelationalConnector for PgConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn RelationalSession>> {
        let conn = PgConnection::connect(url)
            .await
            .map_err(|e| NodeEngineError::connection(format!("Failed to connect to PostgreSQL: {}", e)))?;
        Ok(Box::new(PgSession { conn: Some(conn) }))
    }
}

struct PgSession {
    conn: Option<PgConnection>,
}

#[async_trait]
impl Closeable for PgSession {
    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .await
                .map_err(|e| NodeEngineError::connection(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl RelationalSession for PgSession {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryRows> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| NodeEngineError::connection("session already closed"))?;

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_json(query, param);
        }

        let rows = query.fetch_all(&mut *conn).await.map_err(map_sqlx_error)?;

        let fields = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows.iter().map(decode_row).collect();
        Ok(QueryRows { fields, rows })
    }
}

fn map_sqlx_error(e: sqlx::Error) -> NodeEngineError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            NodeEngineError::connection(e.to_string())
        }
        other => NodeEngineError::operation(other.to_string()),
    }
}

fn bind_json<'q>(query: Query<'q, Postgres, PgArguments>, value: &Value) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(sqlx::types::Json(other.clone())),
    }
}

fn decode_row(row: &PgRow) -> Map<String, Value> {
    row.columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            let value = decode_column(row, index, column.type_info().name());
            (column.name().to_string(), value)
        })
        .collect()
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Value {
    let decoded = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index).map(|v| v.map(Value::from)),
        "INT2" => row.try_get::<Option<i16>, _>(index).map(|v| v.map(Value::from)),
        "INT4" => row.try_get::<Option<i32>, _>(index).map(|v| v.map(Value::from)),
        "INT8" => row.try_get::<Option<i64>, _>(index).map(|v| v.map(Value::from)),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index).map(|v| v.map(Value::from)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).map(|v| v.map(Value::from)),
        "JSON" | "JSONB" => row
            .try_get::<Option<sqlx::types::Json<Value>>, _>(index)
            .map(|v| v.map(|j| j.0)),
        _ => row.try_get::<Option<String>, _>(index).map(|v| v.map(Value::from)),
    };

    match decoded {
        Ok(value) => value.unwrap_or(Value::Null),
        Err(e) => {
            log::debug!("Cannot decode column {} ({}): {}", index, type_name, e);
            Value::Null
        }
    }
}
