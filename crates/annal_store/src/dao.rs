//! Generic access engine over one record type.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Expr, ExprTrait, InsertStatement, OnConflict, Query};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, QueryResult};
use time::OffsetDateTime;

use crate::config::BatchLimits;
use crate::router::{self, ShardRouter};
use crate::sql::{self, bind_typed, chunk_rows, value_to_sea};
use aideon_annal_core::{
    AnnalError, AnnalResult, BatchWriteApi, ColumnMap, CompiledRules, Entity, GeneratedKey,
    Mapping, NamedParams, Page, RawSqlApi, RecordReadApi, RecordWriteApi, Row, RuleSet, ShardKey,
    Sharded, Value, compile, expand_named,
};

pub struct EntityDao<T: Entity> {
    mapping: Arc<Mapping<T>>,
    write: DatabaseConnection,
    read: DatabaseConnection,
    router: Arc<ShardRouter>,
    batch: BatchLimits,
    table: String,
}

impl<T: Entity> Clone for EntityDao<T> {
    fn clone(&self) -> Self {
        Self {
            mapping: self.mapping.clone(),
            write: self.write.clone(),
            read: self.read.clone(),
            router: self.router.clone(),
            batch: self.batch,
            table: self.table.clone(),
        }
    }
}

impl<T: Entity> EntityDao<T> {
    pub(crate) fn new(
        mapping: Arc<Mapping<T>>,
        write: DatabaseConnection,
        read: DatabaseConnection,
        router: Arc<ShardRouter>,
        batch: BatchLimits,
    ) -> Self {
        let table = mapping.table().to_string();
        Self {
            mapping,
            write,
            read,
            router,
            batch,
            table,
        }
    }

    pub fn mapping(&self) -> &Mapping<T> {
        &self.mapping
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Points every following statement at `table`, e.g. an archive copy.
    pub fn with_table(&mut self, table: impl Into<String>) -> AnnalResult<&mut Self> {
        let table = table.into();
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.');
        if !valid {
            return Err(AnnalError::validation(format!(
                "'{table}' is not a valid table name"
            )));
        }
        self.table = table;
        Ok(self)
    }

    pub fn restore_table(&mut self) -> &mut Self {
        self.table = self.mapping.table().to_string();
        self
    }

    pub fn batch_limits(&self) -> BatchLimits {
        self.batch
    }

    /// Routed store when a routing key is in scope, the default write store otherwise.
    fn write_conn(&self) -> AnnalResult<DatabaseConnection> {
        Ok(self
            .router
            .resolve_scoped()?
            .unwrap_or_else(|| self.write.clone()))
    }

    fn compile(&self, rules: &RuleSet) -> AnnalResult<CompiledRules> {
        let mapping = &self.mapping;
        let rules =
            rules.map_properties(|name| mapping.column_of(name).unwrap_or(name).to_string());
        compile(&rules)
    }

    fn column_list(&self) -> String {
        self.mapping.all_columns().collect::<Vec<_>>().join(", ")
    }

    fn decode_rows(&self, rows: &[QueryResult]) -> AnnalResult<Vec<T>> {
        rows.iter()
            .map(|row| {
                let row = sql::read_row(row, |column| {
                    self.mapping.property(column).map(|mapping| mapping.value_type)
                })?;
                self.mapping.decode_row(&row)
            })
            .collect()
    }

    async fn select_compiled(
        &self,
        compiled: CompiledRules,
        window: Option<(u64, u64)>,
    ) -> AnnalResult<Vec<T>> {
        let mut statement = format!(
            "select {} from {}{}{}",
            self.column_list(),
            self.table,
            compiled.where_clause(),
            compiled.order_clause()
        );
        let mut params = compiled.values;
        if let Some((limit, offset)) = window {
            statement.push_str(" limit ? offset ?");
            params.push(Value::I64(to_i64(limit)?));
            params.push(Value::I64(to_i64(offset)?));
        }
        let rows = sql::query_all_sql(&self.read, &statement, params).await?;
        self.decode_rows(&rows)
    }

    async fn count_compiled(&self, compiled: &CompiledRules) -> AnnalResult<u64> {
        let statement = format!(
            "select count(1) from {}{}",
            self.table,
            compiled.where_clause()
        );
        let row = sql::query_one_sql(&self.read, &statement, compiled.values.clone()).await?;
        match row {
            Some(row) => sql::read_count(&row),
            None => Ok(0),
        }
    }

    fn unique(mut rows: Vec<T>) -> AnnalResult<Option<T>> {
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            count => Err(AnnalError::ambiguous(count)),
        }
    }

    fn identity_column(&self) -> AnnalResult<String> {
        Ok(self.mapping.identity()?.column.clone())
    }

    fn identity_param(&self, id: Value) -> AnnalResult<Value> {
        if id.is_null() {
            let identity = self.mapping.identity()?;
            return Err(AnnalError::validation(format!(
                "{}.{} lookup with a null value",
                self.mapping.entity_name(),
                identity.property
            )));
        }
        Ok(id)
    }

    fn insert_statement(&self, columns: ColumnMap) -> AnnalResult<InsertStatement> {
        if columns.is_empty() {
            return Err(AnnalError::configuration(format!(
                "{} has no non-null insertable properties",
                self.mapping.entity_name()
            )));
        }
        let mut names = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());
        for (column, value) in columns {
            names.push(Alias::new(column));
            values.push(value_to_sea(value)?);
        }
        let mut insert = Query::insert();
        insert.into_table(Alias::new(self.table.as_str())).columns(names);
        insert
            .values(values.into_iter().map(Into::into))
            .map_err(|err| AnnalError::encoding(err.to_string()))?;
        Ok(insert)
    }

    /// Turns an insert into an upsert keyed on the identity column.
    fn make_replace(
        &self,
        insert: &mut InsertStatement,
        backend: DatabaseBackend,
        columns: &[String],
    ) -> AnnalResult<()> {
        match backend {
            DatabaseBackend::Postgres => {
                let identity = self.identity_column()?;
                let updates: Vec<Alias> = columns
                    .iter()
                    .filter(|column| **column != identity)
                    .map(|column| Alias::new(column.as_str()))
                    .collect();
                let mut conflict = OnConflict::column(Alias::new(identity.as_str()));
                if updates.is_empty() {
                    conflict.do_nothing();
                } else {
                    conflict.update_columns(updates);
                }
                insert.on_conflict(conflict);
            }
            _ => {
                insert.replace();
            }
        }
        Ok(())
    }

    /// Multi-row insert or replace. Each chunk issues one statement per
    /// row batch: rows carrying an identity, then rows left to the store.
    async fn batch_write(&self, records: &[T], replace: bool) -> AnnalResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let width = self.mapping.insertable_columns().len();
        if width == 0 {
            return Err(AnnalError::configuration(format!(
                "{} has no insertable columns",
                self.mapping.entity_name()
            )));
        }
        let conn = self.write_conn()?;
        let backend = conn.get_database_backend();
        let size = chunk_rows(backend, self.batch.insert_chunk_rows, width);
        let mut affected = 0;
        for chunk in records.chunks(size) {
            for batch in self.mapping.encode_batches(chunk) {
                let mut insert = Query::insert();
                insert
                    .into_table(Alias::new(self.table.as_str()))
                    .columns(batch.columns.iter().map(|column| Alias::new(column.as_str())));
                for row in batch.rows {
                    let row = row
                        .into_iter()
                        .zip(batch.types.iter().copied())
                        .map(|(value, value_type)| bind_typed(value, value_type))
                        .collect::<AnnalResult<Vec<_>>>()?;
                    insert
                        .values(row.into_iter().map(Into::into))
                        .map_err(|err| AnnalError::encoding(err.to_string()))?;
                }
                if replace {
                    self.make_replace(&mut insert, backend, &batch.columns)?;
                }
                affected += sql::exec(&conn, &insert).await?.rows_affected();
            }
        }
        Ok(affected)
    }

    /// Syncs `persisted` against `incoming` by the `id_property` key.
    ///
    /// Persisted records whose key is absent from `incoming` are deleted from
    /// the store and dropped from the list. Matching records take the
    /// incoming values: every field when `copy_null` is set, otherwise only
    /// the non-null mapped properties. Incoming records without a key are
    /// appended for the caller to insert. Persisted records without a key are
    /// left untouched. Returns the number of deleted rows.
    pub async fn merge_list(
        &self,
        incoming: &[T],
        persisted: &mut Vec<T>,
        id_property: &str,
        copy_null: bool,
    ) -> AnnalResult<u64>
    where
        T: Clone,
    {
        let key = self
            .mapping
            .column_of(id_property)
            .and_then(|column| self.mapping.property(column))
            .ok_or_else(|| {
                AnnalError::configuration(format!(
                    "{} has no property named '{id_property}'",
                    self.mapping.entity_name()
                ))
            })?;
        let incoming_keys: Vec<Value> = incoming.iter().map(|record| key.read(record)).collect();

        let mut deleted = 0;
        let mut kept = Vec::with_capacity(persisted.len());
        for record in persisted.iter() {
            let id = key.read(record);
            if id.is_null() {
                kept.push(record.clone());
                continue;
            }
            match incoming_keys.iter().position(|candidate| *candidate == id) {
                Some(index) => {
                    let source = &incoming[index];
                    let merged = if copy_null {
                        source.clone()
                    } else {
                        let mut merged = record.clone();
                        for (column, value) in self.mapping.encode_record(source) {
                            if let Some(mapping) = self.mapping.property(&column) {
                                mapping.write(&mut merged, value)?;
                            }
                        }
                        merged
                    };
                    kept.push(merged);
                }
                None => {
                    if self.delete(record).await? {
                        deleted += 1;
                    }
                }
            }
        }
        kept.extend(
            incoming
                .iter()
                .zip(&incoming_keys)
                .filter(|(_, id)| id.is_null())
                .map(|(record, _)| record.clone()),
        );
        *persisted = kept;
        Ok(deleted)
    }

    /// Inserts through the shard of the record's year, stamping `now` when
    /// the record carries no timestamp.
    pub async fn insert_routed_at(
        &self,
        record: &mut T,
        now: OffsetDateTime,
    ) -> AnnalResult<Option<GeneratedKey>>
    where
        T: Sharded,
    {
        let key = ShardKey::for_record(record, now);
        if !self.router.contains(key) {
            return Err(AnnalError::configuration(format!(
                "no store registered for shard {key}"
            )));
        }
        let record: &T = record;
        router::scope(key, self.insert_returning_key(record)).await
    }

    pub async fn insert_routed(&self, record: &mut T) -> AnnalResult<Option<GeneratedKey>>
    where
        T: Sharded,
    {
        self.insert_routed_at(record, OffsetDateTime::now_utc())
            .await
    }
}

fn to_i64(value: u64) -> AnnalResult<i64> {
    i64::try_from(value).map_err(|_| AnnalError::validation(format!("{value} is out of range")))
}

fn generated_key(value: Value) -> Option<GeneratedKey> {
    match value {
        Value::I32(value) => Some(GeneratedKey::Int(value)),
        Value::I64(value) => Some(GeneratedKey::from_i64(value)),
        Value::Str(value) => Some(GeneratedKey::Text(value)),
        _ => None,
    }
}

#[async_trait]
impl<T: Entity> RecordReadApi<T> for EntityDao<T> {
    async fn get(&self, id: Value) -> AnnalResult<Option<T>> {
        let id = self.identity_param(id)?;
        let rules = RuleSet::new().and_eq(self.identity_column()?, id);
        self.select_unique(&rules).await
    }

    async fn get_all(&self) -> AnnalResult<Vec<T>> {
        self.select_compiled(CompiledRules::default(), None).await
    }

    async fn exists(&self, id: Value) -> AnnalResult<bool> {
        Ok(self.get(id).await?.is_some())
    }

    async fn select(&self, rules: &RuleSet) -> AnnalResult<Vec<T>> {
        let compiled = self.compile(rules)?;
        self.select_compiled(compiled, None).await
    }

    async fn select_page(
        &self,
        rules: &RuleSet,
        page_no: u64,
        page_size: u64,
    ) -> AnnalResult<Page<T>> {
        let page_size = Ord::max(page_size, 1);
        let compiled = self.compile(rules)?;
        let total = self.count_compiled(&compiled).await?;
        if total == 0 {
            return Ok(Page::empty(page_size));
        }
        let start = Page::<T>::start_of(page_no, page_size);
        let rows = self
            .select_compiled(compiled, Some((page_size, start)))
            .await?;
        Ok(Page::new(page_size, start, rows, total))
    }

    async fn select_unique(&self, rules: &RuleSet) -> AnnalResult<Option<T>> {
        let rows = self.select(rules).await?;
        Self::unique(rows)
    }

    async fn select_unique_by(&self, property: &str, value: Value) -> AnnalResult<Option<T>> {
        self.select_unique(&RuleSet::new().and_eq(property, value))
            .await
    }

    async fn select_unique_by_map(&self, criteria: ColumnMap) -> AnnalResult<Option<T>> {
        let rules = criteria
            .into_iter()
            .fold(RuleSet::new(), |rules, (property, value)| {
                rules.and_eq(property, value)
            });
        self.select_unique(&rules).await
    }

    async fn count(&self, rules: &RuleSet) -> AnnalResult<u64> {
        let compiled = self.compile(rules)?;
        self.count_compiled(&compiled).await
    }

    async fn max_by(&self, property: &str, rules: &RuleSet) -> AnnalResult<Option<T>> {
        let compiled = self.compile(&rules.clone().desc(property))?;
        let mut rows = self.select_compiled(compiled, Some((1, 0))).await?;
        Ok(rows.pop())
    }
}

#[async_trait]
impl<T: Entity> RecordWriteApi<T> for EntityDao<T> {
    async fn insert(&self, record: &T) -> AnnalResult<bool> {
        let insert = self.insert_statement(self.mapping.encode_insertable(record))?;
        let conn = self.write_conn()?;
        Ok(sql::exec(&conn, &insert).await?.rows_affected() > 0)
    }

    async fn insert_returning_key(&self, record: &T) -> AnnalResult<Option<GeneratedKey>> {
        let mut insert = self.insert_statement(self.mapping.encode_insertable(record))?;
        let conn = self.write_conn()?;
        let identity = self.mapping.identity().ok();
        let supplied = identity.is_some_and(|identity| !identity.read(record).is_null());
        let key = match (conn.get_database_backend(), identity) {
            (_, _) if supplied => {
                sql::exec(&conn, &insert).await?;
                None
            }
            (DatabaseBackend::Postgres | DatabaseBackend::Sqlite, Some(identity)) => {
                let column = identity.column.as_str();
                insert.returning_col(Alias::new(column));
                sql::query_one(&conn, &insert)
                    .await?
                    .and_then(|row| generated_key(sql::read_any(&row, column)))
            }
            (DatabaseBackend::MySql, _) => {
                let result = sql::exec(&conn, &insert).await?;
                match result.last_insert_id() {
                    0 => None,
                    id => i64::try_from(id).ok().map(GeneratedKey::from_i64),
                }
            }
            _ => {
                sql::exec(&conn, &insert).await?;
                None
            }
        };
        if key.is_none() {
            log::warn!(
                "annal: insert into {} reported no generated key",
                self.table
            );
        }
        Ok(key)
    }

    async fn update(&self, record: &T) -> AnnalResult<bool> {
        let identity = self.identity_column()?;
        let id = value_to_sea(self.mapping.identity_value(record)?)?;
        let columns = self.mapping.encode_updatable(record);
        if columns.is_empty() {
            return Err(AnnalError::validation(format!(
                "{} update has no non-null columns to set",
                self.mapping.entity_name()
            )));
        }
        let mut assignments = Vec::with_capacity(columns.len());
        for (column, value) in columns {
            assignments.push((Alias::new(column), value_to_sea(value)?));
        }
        let update = Query::update()
            .table(Alias::new(self.table.as_str()))
            .values(
                assignments
                    .into_iter()
                    .map(|(column, value)| (column, value.into())),
            )
            .and_where(Expr::col(Alias::new(identity)).eq(id))
            .to_owned();
        let conn = self.write_conn()?;
        Ok(sql::exec(&conn, &update).await?.rows_affected() > 0)
    }

    async fn delete(&self, record: &T) -> AnnalResult<bool> {
        let id = self.mapping.identity_value(record)?;
        self.delete_by_id(id).await
    }

    async fn delete_by_id(&self, id: Value) -> AnnalResult<bool> {
        let id = value_to_sea(self.identity_param(id)?)?;
        let delete = Query::delete()
            .from_table(Alias::new(self.table.as_str()))
            .and_where(Expr::col(Alias::new(self.identity_column()?)).eq(id))
            .to_owned();
        let conn = self.write_conn()?;
        Ok(sql::exec(&conn, &delete).await?.rows_affected() > 0)
    }

    async fn replace_one(&self, record: &T) -> AnnalResult<bool> {
        let columns = self.mapping.encode_insertable(record);
        let names: Vec<String> = columns.keys().cloned().collect();
        let mut insert = self.insert_statement(columns)?;
        let conn = self.write_conn()?;
        self.make_replace(&mut insert, conn.get_database_backend(), &names)?;
        Ok(sql::exec(&conn, &insert).await?.rows_affected() > 0)
    }

    async fn save(&self, record: &T) -> AnnalResult<bool> {
        let id = self.mapping.identity()?.read(record);
        if !id.is_null() && self.exists(id).await? {
            self.update(record).await
        } else {
            self.insert(record).await
        }
    }

    async fn save_returning_key(&self, record: &T) -> AnnalResult<Option<GeneratedKey>> {
        let id = self.mapping.identity()?.read(record);
        if !id.is_null() && self.exists(id.clone()).await? {
            self.update(record).await?;
            return Ok(generated_key(id));
        }
        self.insert_returning_key(record).await
    }
}

#[async_trait]
impl<T: Entity> BatchWriteApi<T> for EntityDao<T> {
    async fn batch_insert(&self, records: &[T]) -> AnnalResult<u64> {
        self.batch_write(records, false).await
    }

    async fn batch_replace(&self, records: &[T]) -> AnnalResult<u64> {
        self.batch_write(records, true).await
    }

    async fn batch_delete(&self, records: &[T]) -> AnnalResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let identity = self.identity_column()?;
        let ids = records
            .iter()
            .map(|record| value_to_sea(self.mapping.identity_value(record)?))
            .collect::<AnnalResult<Vec<_>>>()?;
        let conn = self.write_conn()?;
        let size = chunk_rows(
            conn.get_database_backend(),
            self.batch.delete_chunk_rows,
            1,
        );
        let mut affected = 0;
        for chunk in ids.chunks(size) {
            let delete = Query::delete()
                .from_table(Alias::new(self.table.as_str()))
                .and_where(Expr::col(Alias::new(identity.as_str())).is_in(chunk.iter().cloned()))
                .to_owned();
            affected += sql::exec(&conn, &delete).await?.rows_affected();
        }
        Ok(affected)
    }
}

#[async_trait]
impl<T: Entity> RawSqlApi for EntityDao<T> {
    async fn select_by_sql(&self, statement: &str, params: Vec<Value>) -> AnnalResult<Vec<Row>> {
        let rows = sql::query_all_sql(&self.read, statement, params).await?;
        rows.iter().map(|row| sql::read_row(row, |_| None)).collect()
    }

    async fn select_unique_by_sql(
        &self,
        statement: &str,
        params: Vec<Value>,
    ) -> AnnalResult<Option<Row>> {
        let mut rows = self.select_by_sql(statement, params).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            count => Err(AnnalError::ambiguous(count)),
        }
    }

    async fn select_by_sql_to_page(
        &self,
        statement: &str,
        params: Vec<Value>,
        page_no: u64,
        page_size: u64,
    ) -> AnnalResult<Page<Row>> {
        let page_size = Ord::max(page_size, 1);
        let count_sql = format!("select count(1) from ({statement}) a");
        let total = match sql::query_one_sql(&self.read, &count_sql, params.clone()).await? {
            Some(row) => sql::read_count(&row)?,
            None => 0,
        };
        if total == 0 {
            return Ok(Page::empty(page_size));
        }
        let start = Page::<Row>::start_of(page_no, page_size);
        let mut params = params;
        params.push(Value::I64(to_i64(page_size)?));
        params.push(Value::I64(to_i64(start)?));
        let paged = format!("{statement} limit ? offset ?");
        let rows = self.select_by_sql(&paged, params).await?;
        Ok(Page::new(page_size, start, rows, total))
    }

    async fn execute_sql(&self, statement: &str, params: Vec<Value>) -> AnnalResult<u64> {
        let conn = self.write_conn()?;
        Ok(sql::exec_sql(&conn, statement, params).await?.rows_affected())
    }

    async fn select_by_sql_named(
        &self,
        statement: &str,
        params: &NamedParams,
    ) -> AnnalResult<Vec<Row>> {
        let (statement, values) = expand_named(statement, params)?;
        self.select_by_sql(&statement, values).await
    }

    async fn select_unique_by_sql_named(
        &self,
        statement: &str,
        params: &NamedParams,
    ) -> AnnalResult<Option<Row>> {
        let (statement, values) = expand_named(statement, params)?;
        self.select_unique_by_sql(&statement, values).await
    }

    async fn select_by_sql_to_page_named(
        &self,
        statement: &str,
        params: &NamedParams,
        page_no: u64,
        page_size: u64,
    ) -> AnnalResult<Page<Row>> {
        let (statement, values) = expand_named(statement, params)?;
        self.select_by_sql_to_page(&statement, values, page_no, page_size)
            .await
    }

    async fn execute_sql_named(&self, statement: &str, params: &NamedParams) -> AnnalResult<u64> {
        let (statement, values) = expand_named(statement, params)?;
        self.execute_sql(&statement, values).await
    }
}
