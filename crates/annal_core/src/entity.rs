//! Declarative record metadata and the column/property mapper built from it.
//!
//! A record type describes its persistable properties once through
//! [`Entity::entity`]. [`Mapping`] turns that description into the
//! column map used for both row decoding and statement generation, so the two
//! always agree on the column set.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::{AnnalError, AnnalResult, Row, Value, ValueType};

pub type Getter<T> = fn(&T) -> Value;
pub type Setter<T> = fn(&mut T, Value) -> AnnalResult<()>;

/// Column name to non-null value, in column order.
pub type ColumnMap = BTreeMap<String, Value>;

pub trait Entity: Default + Send + Sync + 'static {
    fn entity() -> EntityDef<Self>;
}

pub struct EntityDef<T> {
    pub name: &'static str,
    pub table: Option<&'static str>,
    pub properties: Vec<PropertyDef<T>>,
}

impl<T> EntityDef<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            table: None,
            properties: Vec::new(),
        }
    }

    pub fn table(mut self, table: &'static str) -> Self {
        self.table = Some(table);
        self
    }

    pub fn property(mut self, property: PropertyDef<T>) -> Self {
        self.properties.push(property);
        self
    }
}

pub struct PropertyDef<T> {
    pub name: &'static str,
    pub column: Option<&'static str>,
    pub value_type: ValueType,
    pub identity: bool,
    pub transient: bool,
    pub insertable: bool,
    pub updatable: bool,
    pub enumerants: Option<&'static [&'static str]>,
    pub getter: Option<Getter<T>>,
    pub setter: Option<Setter<T>>,
}

impl<T> PropertyDef<T> {
    pub fn new(name: &'static str, value_type: ValueType) -> Self {
        Self {
            name,
            column: None,
            value_type,
            identity: false,
            transient: false,
            insertable: true,
            updatable: true,
            enumerants: None,
            getter: None,
            setter: None,
        }
    }

    pub fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn insertable(mut self, insertable: bool) -> Self {
        self.insertable = insertable;
        self
    }

    pub fn updatable(mut self, updatable: bool) -> Self {
        self.updatable = updatable;
        self
    }

    /// Stored as a name; decoding rejects names outside `names`.
    pub fn enumerated(mut self, names: &'static [&'static str]) -> Self {
        self.value_type = ValueType::Str;
        self.enumerants = Some(names);
        self
    }

    pub fn get(mut self, getter: Getter<T>) -> Self {
        self.getter = Some(getter);
        self
    }

    pub fn set(mut self, setter: Setter<T>) -> Self {
        self.setter = Some(setter);
        self
    }
}

pub struct PropertyMapping<T> {
    pub property: &'static str,
    pub column: String,
    pub value_type: ValueType,
    pub insertable: bool,
    pub updatable: bool,
    pub enumerants: Option<&'static [&'static str]>,
    getter: Getter<T>,
    setter: Setter<T>,
}

impl<T> PropertyMapping<T> {
    pub fn read(&self, record: &T) -> Value {
        (self.getter)(record)
    }

    pub fn write(&self, record: &mut T, value: Value) -> AnnalResult<()> {
        let value = self.coerce(value)?;
        (self.setter)(record, value)
    }

    fn coerce(&self, value: Value) -> AnnalResult<Value> {
        let Some(names) = self.enumerants else {
            return Ok(value);
        };
        match &value {
            Value::Str(name) if names.contains(&name.as_str()) => Ok(value),
            Value::Str(name) => Err(AnnalError::encoding(format!(
                "column {} holds unknown enumerant '{name}'",
                self.column
            ))),
            other => Err(AnnalError::encoding(format!(
                "column {} expects an enumerant name, got {other:?}",
                self.column
            ))),
        }
    }
}

pub struct Mapping<T> {
    entity: &'static str,
    table: String,
    columns: BTreeMap<String, PropertyMapping<T>>,
    by_lower: HashMap<String, String>,
    identity: Option<String>,
}

impl<T: Entity> Mapping<T> {
    pub fn build(explicit_key: Option<&str>) -> AnnalResult<Self> {
        let def = T::entity();
        if def.properties.is_empty() {
            return Err(AnnalError::configuration(format!(
                "{} declares no persistable properties",
                def.name
            )));
        }
        let table = def.table.unwrap_or(def.name).to_string();
        let explicit_key = explicit_key.filter(|key| !key.trim().is_empty());

        let mut columns = BTreeMap::new();
        let mut identity = None;
        let mut marked_identity = None;
        for property in def.properties {
            if property.transient {
                continue;
            }
            let (Some(getter), Some(setter)) = (property.getter, property.setter) else {
                continue;
            };
            let column = property.column.unwrap_or(property.name).to_string();
            if let Some(key) = explicit_key
                && (key == property.name || key.eq_ignore_ascii_case(&column))
            {
                identity = Some(column.clone());
            }
            if property.identity && marked_identity.is_none() {
                marked_identity = Some(column.clone());
            }
            columns.insert(
                column.clone(),
                PropertyMapping {
                    property: property.name,
                    column,
                    value_type: property.value_type,
                    insertable: property.insertable,
                    updatable: property.updatable,
                    enumerants: property.enumerants,
                    getter,
                    setter,
                },
            );
        }

        if columns.is_empty() {
            return Err(AnnalError::configuration(format!(
                "{} has no persistable properties",
                def.name
            )));
        }
        if let Some(key) = explicit_key
            && identity.is_none()
        {
            log::warn!("annal: {} has no property named '{key}' for its key", def.name);
        }
        let identity = if explicit_key.is_some() {
            identity
        } else {
            marked_identity
        };
        let by_lower = columns
            .keys()
            .map(|column| (column.to_ascii_lowercase(), column.clone()))
            .collect();
        Ok(Self {
            entity: def.name,
            table,
            columns,
            by_lower,
            identity,
        })
    }

    pub fn entity_name(&self) -> &'static str {
        self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn all_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn property(&self, column: &str) -> Option<&PropertyMapping<T>> {
        self.by_lower
            .get(&column.to_ascii_lowercase())
            .and_then(|column| self.columns.get(column))
    }

    /// Resolves a property name or column name to its column.
    pub fn column_of(&self, name: &str) -> Option<&str> {
        if let Some(mapping) = self.property(name) {
            return Some(mapping.column.as_str());
        }
        self.columns
            .values()
            .find(|mapping| mapping.property == name)
            .map(|mapping| mapping.column.as_str())
    }

    pub fn identity(&self) -> AnnalResult<&PropertyMapping<T>> {
        self.identity
            .as_ref()
            .and_then(|column| self.columns.get(column))
            .ok_or_else(|| {
                AnnalError::configuration(format!("{} has no identity property", self.entity))
            })
    }

    pub fn identity_value(&self, record: &T) -> AnnalResult<Value> {
        let identity = self.identity()?;
        let value = identity.read(record);
        if value.is_null() {
            return Err(AnnalError::validation(format!(
                "{}.{} is null",
                self.entity, identity.property
            )));
        }
        Ok(value)
    }

    pub fn decode_row(&self, row: &Row) -> AnnalResult<T> {
        let mut record = T::default();
        self.decode_into(&mut record, row)?;
        Ok(record)
    }

    /// Sets every property with a matching non-null column; leaves the rest alone.
    pub fn decode_into(&self, record: &mut T, row: &Row) -> AnnalResult<()> {
        for (column, value) in row.columns() {
            if value.is_null() {
                continue;
            }
            if let Some(mapping) = self.property(column) {
                mapping.write(record, value.clone())?;
            }
        }
        Ok(())
    }

    pub fn encode_record(&self, record: &T) -> ColumnMap {
        self.encode_where(record, |_| true)
    }

    pub fn encode_insertable(&self, record: &T) -> ColumnMap {
        self.encode_where(record, |mapping| mapping.insertable)
    }

    /// Non-null updatable columns, identity excluded.
    pub fn encode_updatable(&self, record: &T) -> ColumnMap {
        let identity = self.identity.as_deref();
        self.encode_where(record, |mapping| {
            mapping.updatable && Some(mapping.column.as_str()) != identity
        })
    }

    pub fn insertable_columns(&self) -> Vec<&str> {
        self.columns
            .values()
            .filter(|mapping| mapping.insertable)
            .map(|mapping| mapping.column.as_str())
            .collect()
    }

    /// One value per insertable column, `Null` where the record has none.
    pub fn encode_row_full(&self, record: &T) -> Vec<Value> {
        self.columns
            .values()
            .filter(|mapping| mapping.insertable)
            .map(|mapping| mapping.read(record))
            .collect()
    }

    /// Positional rows for a multi-row insert. Rows whose identity is null
    /// go into a separate batch that omits the identity column, so the store
    /// can generate it.
    pub fn encode_batches(&self, records: &[T]) -> Vec<RowBatch> {
        let insertable: Vec<&PropertyMapping<T>> = self
            .columns
            .values()
            .filter(|mapping| mapping.insertable)
            .collect();
        let identity = self
            .identity
            .as_deref()
            .and_then(|column| insertable.iter().position(|m| m.column == column));
        let mut keyed = RowBatch::new(insertable.iter().copied());
        let mut keyless = RowBatch::new(
            insertable
                .iter()
                .enumerate()
                .filter(|(index, _)| Some(*index) != identity)
                .map(|(_, mapping)| *mapping),
        );
        for record in records {
            let mut row = self.encode_row_full(record);
            match identity {
                Some(index) if row[index].is_null() => {
                    row.remove(index);
                    keyless.rows.push(row);
                }
                _ => keyed.rows.push(row),
            }
        }
        [keyed, keyless]
            .into_iter()
            .filter(|batch| !batch.rows.is_empty())
            .collect()
    }

    fn encode_where(&self, record: &T, keep: impl Fn(&PropertyMapping<T>) -> bool) -> ColumnMap {
        self.columns
            .values()
            .filter(|mapping| keep(mapping))
            .filter_map(|mapping| {
                let value = mapping.read(record);
                (!value.is_null()).then(|| (mapping.column.clone(), value))
            })
            .collect()
    }
}

/// Column list, declared types and positional rows of one multi-row statement.
#[derive(Clone, Debug, PartialEq)]
pub struct RowBatch {
    pub columns: Vec<String>,
    pub types: Vec<ValueType>,
    pub rows: Vec<Vec<Value>>,
}

impl RowBatch {
    fn new<'a, T: 'a>(mappings: impl Iterator<Item = &'a PropertyMapping<T>>) -> Self {
        let (columns, types) = mappings
            .map(|mapping| (mapping.column.clone(), mapping.value_type))
            .unzip();
        Self {
            columns,
            types,
            rows: Vec::new(),
        }
    }
}

type MappingKey = (TypeId, Option<String>);

static MAPPINGS: Lazy<RwLock<HashMap<MappingKey, Arc<dyn Any + Send + Sync>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Returns the process-wide mapping for `T`, building it on first use.
pub fn mapping_for<T: Entity>(explicit_key: Option<&str>) -> AnnalResult<Arc<Mapping<T>>> {
    let key = (TypeId::of::<T>(), explicit_key.map(str::to_string));
    {
        let cache = MAPPINGS
            .read()
            .map_err(|_| AnnalError::configuration("mapping cache poisoned"))?;
        if let Some(mapping) = cache.get(&key).cloned() {
            return downcast(mapping);
        }
    }
    let built: Arc<dyn Any + Send + Sync> = Arc::new(Mapping::<T>::build(explicit_key)?);
    let mut cache = MAPPINGS
        .write()
        .map_err(|_| AnnalError::configuration("mapping cache poisoned"))?;
    let mapping = cache.entry(key).or_insert(built).clone();
    downcast(mapping)
}

fn downcast<T: Entity>(mapping: Arc<dyn Any + Send + Sync>) -> AnnalResult<Arc<Mapping<T>>> {
    mapping
        .downcast::<Mapping<T>>()
        .map_err(|_| AnnalError::configuration("mapping cache holds a foreign type"))
}
