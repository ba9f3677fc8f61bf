use async_trait::async_trait;

use crate::{
    AnnalResult, ColumnMap, Entity, GeneratedKey, NamedParams, Page, Row, RuleSet, Value,
};

#[async_trait]
pub trait RecordReadApi<T: Entity> {
    async fn get(&self, id: Value) -> AnnalResult<Option<T>>;
    /// Unpaginated; callers own the result size.
    async fn get_all(&self) -> AnnalResult<Vec<T>>;
    async fn exists(&self, id: Value) -> AnnalResult<bool>;
    async fn select(&self, rules: &RuleSet) -> AnnalResult<Vec<T>>;
    async fn select_page(
        &self,
        rules: &RuleSet,
        page_no: u64,
        page_size: u64,
    ) -> AnnalResult<Page<T>>;
    /// Fails with `AmbiguousResult` when more than one row matches.
    async fn select_unique(&self, rules: &RuleSet) -> AnnalResult<Option<T>>;
    async fn select_unique_by(&self, property: &str, value: Value) -> AnnalResult<Option<T>>;
    async fn select_unique_by_map(&self, criteria: ColumnMap) -> AnnalResult<Option<T>>;
    async fn count(&self, rules: &RuleSet) -> AnnalResult<u64>;
    async fn max_by(&self, property: &str, rules: &RuleSet) -> AnnalResult<Option<T>>;
}

#[async_trait]
pub trait RecordWriteApi<T: Entity> {
    async fn insert(&self, record: &T) -> AnnalResult<bool>;
    /// `Ok(None)` means the store reported no key; the row may still exist.
    async fn insert_returning_key(&self, record: &T) -> AnnalResult<Option<GeneratedKey>>;
    async fn update(&self, record: &T) -> AnnalResult<bool>;
    async fn delete(&self, record: &T) -> AnnalResult<bool>;
    async fn delete_by_id(&self, id: Value) -> AnnalResult<bool>;
    async fn replace_one(&self, record: &T) -> AnnalResult<bool>;
    async fn save(&self, record: &T) -> AnnalResult<bool>;
    async fn save_returning_key(&self, record: &T) -> AnnalResult<Option<GeneratedKey>>;
}

#[async_trait]
pub trait BatchWriteApi<T: Entity> {
    async fn batch_insert(&self, records: &[T]) -> AnnalResult<u64>;
    async fn batch_replace(&self, records: &[T]) -> AnnalResult<u64>;
    async fn batch_delete(&self, records: &[T]) -> AnnalResult<u64>;
}

/// Statements the rule compiler cannot express. Parameters bind to `?`.
#[async_trait]
pub trait RawSqlApi {
    async fn select_by_sql(&self, sql: &str, params: Vec<Value>) -> AnnalResult<Vec<Row>>;
    async fn select_unique_by_sql(&self, sql: &str, params: Vec<Value>)
    -> AnnalResult<Option<Row>>;
    async fn select_by_sql_to_page(
        &self,
        sql: &str,
        params: Vec<Value>,
        page_no: u64,
        page_size: u64,
    ) -> AnnalResult<Page<Row>>;
    async fn execute_sql(&self, sql: &str, params: Vec<Value>) -> AnnalResult<u64>;

    /// The `_named` variants bind `:name` placeholders from `params`.
    async fn select_by_sql_named(&self, sql: &str, params: &NamedParams)
    -> AnnalResult<Vec<Row>>;
    async fn select_unique_by_sql_named(
        &self,
        sql: &str,
        params: &NamedParams,
    ) -> AnnalResult<Option<Row>>;
    async fn select_by_sql_to_page_named(
        &self,
        sql: &str,
        params: &NamedParams,
        page_no: u64,
        page_size: u64,
    ) -> AnnalResult<Page<Row>>;
    async fn execute_sql_named(&self, sql: &str, params: &NamedParams) -> AnnalResult<u64>;
}
