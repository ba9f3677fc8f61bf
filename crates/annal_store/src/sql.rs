//! Statement plumbing shared by the access engine: dialect dispatch, value
//! binding and row reading.

use sea_orm::sea_query::{
    MysqlQueryBuilder, PostgresQueryBuilder, QueryStatementWriter, SqliteQueryBuilder,
    Value as SeaValue,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, ExecResult, QueryResult, Statement};

use aideon_annal_core::{AnnalError, AnnalResult, Row, Value, ValueType};

pub(crate) fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

pub(crate) async fn exec<C, S>(conn: &C, stmt: &S) -> AnnalResult<ExecResult>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    log::debug!("annal: {sql}");
    let result = conn
        .execute_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(result)
}

pub(crate) async fn query_one<C, S>(conn: &C, stmt: &S) -> AnnalResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    log::debug!("annal: {sql}");
    let row = conn
        .query_one_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}

/// Statement from `?`-placeholder SQL, rewritten for the connection's dialect.
pub(crate) fn raw_statement(
    backend: DatabaseBackend,
    sql: &str,
    params: Vec<Value>,
) -> AnnalResult<Statement> {
    let values = params
        .into_iter()
        .map(value_to_sea)
        .collect::<AnnalResult<Vec<_>>>()?;
    let sql = bind_placeholders(backend, sql);
    log::debug!("annal: {sql}");
    Ok(Statement::from_sql_and_values(backend, sql, values))
}

pub(crate) async fn exec_sql<C: ConnectionTrait>(
    conn: &C,
    sql: &str,
    params: Vec<Value>,
) -> AnnalResult<ExecResult> {
    let stmt = raw_statement(conn.get_database_backend(), sql, params)?;
    Ok(conn.execute_raw(stmt).await?)
}

pub(crate) async fn query_all_sql<C: ConnectionTrait>(
    conn: &C,
    sql: &str,
    params: Vec<Value>,
) -> AnnalResult<Vec<QueryResult>> {
    let stmt = raw_statement(conn.get_database_backend(), sql, params)?;
    Ok(conn.query_all_raw(stmt).await?)
}

pub(crate) async fn query_one_sql<C: ConnectionTrait>(
    conn: &C,
    sql: &str,
    params: Vec<Value>,
) -> AnnalResult<Option<QueryResult>> {
    let stmt = raw_statement(conn.get_database_backend(), sql, params)?;
    Ok(conn.query_one_raw(stmt).await?)
}

/// Rewrites `?` to `$1, $2, ...` on Postgres. Quoted text is left alone.
pub fn bind_placeholders(backend: DatabaseBackend, sql: &str) -> String {
    if backend != DatabaseBackend::Postgres {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut index = 0;
    for ch in sql.chars() {
        match (quote, ch) {
            (Some(open), _) if ch == open => {
                quote = None;
                out.push(ch);
            }
            (Some(_), _) => out.push(ch),
            (None, '\'' | '"') => {
                quote = Some(ch);
                out.push(ch);
            }
            (None, '?') => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            (None, _) => out.push(ch),
        }
    }
    out
}

/// Largest number of bound parameters one statement may carry.
pub fn max_bind_params(backend: DatabaseBackend) -> usize {
    match backend {
        DatabaseBackend::Sqlite => 32_766,
        DatabaseBackend::Postgres | DatabaseBackend::MySql => 65_535,
        _ => 32_766,
    }
}

/// Rows per multi-row statement: the configured size, capped by the bind limit.
pub fn chunk_rows(backend: DatabaseBackend, configured: usize, columns: usize) -> usize {
    let by_params = max_bind_params(backend) / columns.max(1);
    configured.min(by_params).max(1)
}

pub(crate) fn value_to_sea(value: Value) -> AnnalResult<SeaValue> {
    Ok(match value {
        Value::Null => SeaValue::String(None),
        Value::Bool(value) => value.into(),
        Value::I32(value) => value.into(),
        Value::I64(value) => value.into(),
        Value::F64(value) => value.into(),
        Value::Str(value) => value.into(),
        Value::Bytes(value) => value.into(),
        Value::Json(value) => value.into(),
        Value::List(_) => {
            return Err(AnnalError::encoding(
                "list values only bind inside in / not in rules",
            ));
        }
    })
}

/// Typed null, so strict backends accept it for a column of `value_type`.
pub(crate) fn null_of(value_type: ValueType) -> SeaValue {
    match value_type {
        ValueType::Bool => SeaValue::Bool(None),
        ValueType::I32 => SeaValue::Int(None),
        ValueType::I64 => SeaValue::BigInt(None),
        ValueType::F64 => SeaValue::Double(None),
        ValueType::Str => SeaValue::String(None),
        ValueType::Bytes => SeaValue::Bytes(None),
        ValueType::Json => SeaValue::String(None),
    }
}

pub(crate) fn bind_typed(value: Value, value_type: ValueType) -> AnnalResult<SeaValue> {
    if value.is_null() {
        Ok(null_of(value_type))
    } else {
        value_to_sea(value)
    }
}

/// Reads every column; `typed` supplies the declared type where one is known.
pub(crate) fn read_row(
    row: &QueryResult,
    typed: impl Fn(&str) -> Option<ValueType>,
) -> AnnalResult<Row> {
    let mut out = Row::new();
    for column in row.column_names() {
        let value = match typed(&column) {
            Some(value_type) => read_typed(row, &column, value_type)?,
            None => read_any(row, &column),
        };
        out.push(column, value);
    }
    Ok(out)
}

pub(crate) fn read_typed(
    row: &QueryResult,
    column: &str,
    value_type: ValueType,
) -> AnnalResult<Value> {
    let value = match value_type {
        ValueType::Bool => match row.try_get::<Option<bool>>("", column) {
            Ok(value) => value.map(Value::Bool),
            Err(_) => read_int(row, column)?.map(|value| Value::Bool(value != 0)),
        },
        ValueType::I32 => read_int(row, column)?
            .map(|value| {
                i32::try_from(value)
                    .map(Value::I32)
                    .map_err(|_| AnnalError::encoding(format!("{column} does not fit in i32")))
            })
            .transpose()?,
        ValueType::I64 => read_int(row, column)?.map(Value::I64),
        ValueType::F64 => read_float(row, column)?.map(Value::F64),
        ValueType::Str => row
            .try_get::<Option<String>>("", column)
            .map_err(|err| AnnalError::storage(format!("read {column}: {err}")))?
            .map(Value::Str),
        ValueType::Bytes => row
            .try_get::<Option<Vec<u8>>>("", column)
            .map_err(|err| AnnalError::storage(format!("read {column}: {err}")))?
            .map(Value::Bytes),
        ValueType::Json => {
            if let Ok(value) = row.try_get::<Option<serde_json::Value>>("", column) {
                value.map(Value::Json)
            } else {
                row.try_get::<Option<String>>("", column)
                    .map_err(|err| AnnalError::storage(format!("read {column}: {err}")))?
                    .map(|raw| Value::Str(raw).into_json().map(Value::Json))
                    .transpose()?
            }
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

fn read_int(row: &QueryResult, column: &str) -> AnnalResult<Option<i64>> {
    if let Ok(value) = row.try_get::<Option<i64>>("", column) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<Option<i32>>("", column) {
        return Ok(value.map(i64::from));
    }
    Err(AnnalError::storage(format!(
        "column {column} is not an integer"
    )))
}

fn read_float(row: &QueryResult, column: &str) -> AnnalResult<Option<f64>> {
    if let Ok(value) = row.try_get::<Option<f64>>("", column) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<Option<f32>>("", column) {
        return Ok(value.map(f64::from));
    }
    read_int(row, column).map(|value| value.map(|value| value as f64))
}

/// Best-effort read for columns without a declared type.
pub(crate) fn read_any(row: &QueryResult, column: &str) -> Value {
    if let Ok(value) = row.try_get::<Option<i64>>("", column) {
        return value.into();
    }
    if let Ok(value) = row.try_get::<Option<i32>>("", column) {
        return value.into();
    }
    if let Ok(value) = row.try_get::<Option<f64>>("", column) {
        return value.into();
    }
    if let Ok(value) = row.try_get::<Option<String>>("", column) {
        return value.into();
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>>("", column) {
        return value.into();
    }
    if let Ok(value) = row.try_get::<Option<bool>>("", column) {
        return value.into();
    }
    if let Ok(value) = row.try_get::<Option<serde_json::Value>>("", column) {
        return value.into();
    }
    log::warn!("annal: column {column} has an unreadable type");
    Value::Null
}

/// First column of a single-row result, as a count.
pub(crate) fn read_count(row: &QueryResult) -> AnnalResult<u64> {
    let column = row
        .column_names()
        .into_iter()
        .next()
        .ok_or_else(|| AnnalError::storage("count query returned no columns"))?;
    let count = read_int(row, &column)?.unwrap_or(0);
    u64::try_from(count).map_err(|_| AnnalError::storage(format!("negative count {count}")))
}
