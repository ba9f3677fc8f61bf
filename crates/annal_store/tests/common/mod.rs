#![allow(dead_code)]

use std::path::Path;

use aideon_annal_store::{
    AnnalConfig, AnnalError, AnnalResult, AnnalStore, Entity, EntityDef, Enumerant, PropertyDef,
    RawSqlApi, Sharded, ValueType,
};
use time::OffsetDateTime;

pub const ORDER_DDL: &str = "create table t_order (\
    id integer primary key autoincrement, \
    member_id bigint, \
    status varchar(16), \
    amount double, \
    detail text, \
    create_time bigint)";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderStatus {
    Open,
    Paid,
    Cancelled,
}

impl Enumerant for OrderStatus {
    fn name(&self) -> &'static str {
        match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "OPEN" => Some(OrderStatus::Open),
            "PAID" => Some(OrderStatus::Paid),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Order {
    pub id: Option<i64>,
    pub member_id: Option<i64>,
    pub status: Option<OrderStatus>,
    pub amount: Option<f64>,
    pub detail: Option<String>,
    pub created_at: Option<OffsetDateTime>,
}

impl Order {
    pub fn new(member_id: i64, status: OrderStatus, amount: f64) -> Self {
        Self {
            member_id: Some(member_id),
            status: Some(status),
            amount: Some(amount),
            ..Self::default()
        }
    }
}

impl Entity for Order {
    fn entity() -> EntityDef<Self> {
        EntityDef::new("Order")
            .table("t_order")
            .property(
                PropertyDef::<Self>::new("id", ValueType::I64)
                    .identity()
                    .get(|o| o.id.into())
                    .set(|o, v| {
                        o.id = Some(v.into_i64()?);
                        Ok(())
                    }),
            )
            .property(
                PropertyDef::<Self>::new("memberId", ValueType::I64)
                    .column("member_id")
                    .get(|o| o.member_id.into())
                    .set(|o, v| {
                        o.member_id = Some(v.into_i64()?);
                        Ok(())
                    }),
            )
            .property(
                PropertyDef::<Self>::new("status", ValueType::Str)
                    .enumerated(&["OPEN", "PAID", "CANCELLED"])
                    .get(|o| o.status.map(|s| s.name()).into())
                    .set(|o, v| {
                        o.status = Some(v.into_enumerant()?);
                        Ok(())
                    }),
            )
            .property(
                PropertyDef::<Self>::new("amount", ValueType::F64)
                    .get(|o| o.amount.into())
                    .set(|o, v| {
                        o.amount = Some(v.into_f64()?);
                        Ok(())
                    }),
            )
            .property(
                PropertyDef::<Self>::new("detail", ValueType::Str)
                    .get(|o| o.detail.clone().into())
                    .set(|o, v| {
                        o.detail = Some(v.into_string()?);
                        Ok(())
                    }),
            )
            .property(
                PropertyDef::<Self>::new("createdAt", ValueType::I64)
                    .column("create_time")
                    .get(|o| o.created_at.map(|at| at.unix_timestamp()).into())
                    .set(|o, v| {
                        let at = OffsetDateTime::from_unix_timestamp(v.into_i64()?)
                            .map_err(|err| AnnalError::encoding(err.to_string()))?;
                        o.created_at = Some(at);
                        Ok(())
                    }),
            )
    }
}

impl Sharded for Order {
    fn effective_timestamp(&self) -> Option<OffsetDateTime> {
        self.created_at
    }

    fn stamp_timestamp(&mut self, at: OffsetDateTime) {
        self.created_at = Some(at);
    }
}

pub async fn open(base: &Path) -> AnnalResult<AnnalStore> {
    let config = AnnalConfig::default_sqlite(base.join("annal.sqlite").to_string_lossy());
    open_with(&config, base).await
}

/// Connects and creates `t_order` on the default store.
pub async fn open_with(config: &AnnalConfig, base: &Path) -> AnnalResult<AnnalStore> {
    let store = AnnalStore::connect(config, base).await?;
    store.dao::<Order>()?.execute_sql(ORDER_DDL, Vec::new()).await?;
    Ok(store)
}
