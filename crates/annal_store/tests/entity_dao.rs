mod common;

use aideon_annal_store::{
    AnnalError, AnnalResult, ColumnMap, GeneratedKey, RawSqlApi, RecordReadApi, RecordWriteApi,
    RuleSet, Value,
};
use common::{Order, OrderStatus, open};
use tempfile::tempdir;

#[tokio::test]
async fn insert_then_get_round_trips() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;

    let mut order = Order::new(7, OrderStatus::Open, 12.5);
    order.detail = Some("first".to_string());
    let key = dao.insert_returning_key(&order).await?;
    assert_eq!(key, Some(GeneratedKey::Int(1)));

    let fetched = dao.get(Value::I64(1)).await?.expect("row");
    assert_eq!(fetched.id, Some(1));
    assert_eq!(fetched.member_id, Some(7));
    assert_eq!(fetched.status, Some(OrderStatus::Open));
    assert_eq!(fetched.amount, Some(12.5));
    assert_eq!(fetched.detail.as_deref(), Some("first"));
    assert_eq!(fetched.created_at, None);

    assert!(dao.exists(Value::I64(1)).await?);
    assert!(!dao.exists(Value::I64(2)).await?);
    assert!(dao.get(Value::I64(2)).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn inserting_an_all_null_record_is_a_configuration_error() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;
    let err = dao.insert(&Order::default()).await.unwrap_err();
    assert!(matches!(err, AnnalError::Configuration { .. }));
    assert_eq!(dao.get_all().await?.len(), 0);
    Ok(())
}

#[tokio::test]
async fn update_sets_only_non_null_properties() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;
    let mut order = Order::new(3, OrderStatus::Open, 40.0);
    order.detail = Some("keep me".to_string());
    assert!(dao.insert(&order).await?);

    let patch = Order {
        id: Some(1),
        status: Some(OrderStatus::Paid),
        ..Order::default()
    };
    assert!(dao.update(&patch).await?);
    let stored = dao.get(Value::I64(1)).await?.expect("row");
    assert_eq!(stored.status, Some(OrderStatus::Paid));
    assert_eq!(stored.detail.as_deref(), Some("keep me"));
    assert_eq!(stored.amount, Some(40.0));

    let err = dao
        .update(&Order::new(3, OrderStatus::Paid, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, AnnalError::Validation { .. }));
    Ok(())
}

#[tokio::test]
async fn delete_is_idempotent() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;
    dao.insert(&Order::new(1, OrderStatus::Open, 1.0)).await?;
    let order = dao.get(Value::I64(1)).await?.expect("row");
    assert!(dao.delete(&order).await?);
    assert!(!dao.delete(&order).await?);
    assert!(!dao.delete_by_id(Value::I64(99)).await?);
    let err = dao.delete_by_id(Value::Null).await.unwrap_err();
    assert!(matches!(err, AnnalError::Validation { .. }));
    Ok(())
}

#[tokio::test]
async fn select_translates_property_names_and_orders() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;
    for (member, status, amount) in [
        (1, OrderStatus::Open, 10.0),
        (2, OrderStatus::Paid, 30.0),
        (1, OrderStatus::Paid, 20.0),
        (3, OrderStatus::Cancelled, 5.0),
    ] {
        dao.insert(&Order::new(member, status, amount)).await?;
    }

    let rules = RuleSet::new().and_eq("memberId", 1i64).desc("amount");
    let rows = dao.select(&rules).await?;
    let amounts: Vec<_> = rows.iter().filter_map(|o| o.amount).collect();
    assert_eq!(amounts, vec![20.0, 10.0]);

    let rules = RuleSet::new()
        .and_in("status", ["OPEN", "CANCELLED"])
        .asc("id");
    let ids: Vec<_> = dao.select(&rules).await?.iter().filter_map(|o| o.id).collect();
    assert_eq!(ids, vec![1, 4]);

    let rules = RuleSet::new().and_between("amount", 10.0, 25.0);
    assert_eq!(dao.count(&rules).await?, 2);
    assert_eq!(dao.count(&RuleSet::new()).await?, 4);

    let richest = dao.max_by("amount", &RuleSet::new()).await?.expect("max");
    assert_eq!(richest.member_id, Some(2));
    let paid_max = dao
        .max_by("amount", &RuleSet::new().and_eq("status", "PAID"))
        .await?
        .expect("max");
    assert_eq!(paid_max.amount, Some(30.0));
    Ok(())
}

#[tokio::test]
async fn select_unique_fails_loudly_on_many_rows() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;
    dao.insert(&Order::new(1, OrderStatus::Open, 1.0)).await?;
    dao.insert(&Order::new(2, OrderStatus::Open, 2.0)).await?;

    let err = dao
        .select_unique(&RuleSet::new().and_eq("status", "OPEN"))
        .await
        .unwrap_err();
    assert!(matches!(err, AnnalError::AmbiguousResult { rows: 2 }));

    let one = dao.select_unique_by("memberId", Value::I64(2)).await?;
    assert_eq!(one.and_then(|o| o.amount), Some(2.0));
    let none = dao.select_unique_by("memberId", Value::I64(9)).await?;
    assert!(none.is_none());

    let mut criteria = ColumnMap::new();
    criteria.insert("status".to_string(), Value::from("OPEN"));
    criteria.insert("member_id".to_string(), Value::I64(1));
    let matched = dao.select_unique_by_map(criteria).await?.expect("row");
    assert_eq!(matched.id, Some(1));
    Ok(())
}

#[tokio::test]
async fn paginating_an_empty_table_returns_an_empty_page() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;
    let page = dao.select_page(&RuleSet::new(), 1, 10).await?;
    assert_eq!(page.total, 0);
    assert!(page.rows.is_empty());
    assert_eq!(page.total_page_count(), 0);
    assert!(!page.has_next_page());
    Ok(())
}

#[tokio::test]
async fn pages_use_offset_from_page_number() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;
    for member in 1..=7 {
        dao.insert(&Order::new(member, OrderStatus::Open, member as f64))
            .await?;
    }
    let page = dao.select_page(&RuleSet::new().asc("id"), 2, 3).await?;
    assert_eq!(page.total, 7);
    assert_eq!(page.start, 3);
    assert_eq!(page.page_no(), 2);
    assert_eq!(page.total_page_count(), 3);
    assert!(page.has_next_page());
    assert!(page.has_previous_page());
    let ids: Vec<_> = page.rows.iter().filter_map(|o| o.id).collect();
    assert_eq!(ids, vec![4, 5, 6]);
    Ok(())
}

#[tokio::test]
async fn save_inserts_new_and_updates_existing() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;

    assert!(dao.save(&Order::new(1, OrderStatus::Open, 5.0)).await?);
    let mut stored = dao.get(Value::I64(1)).await?.expect("row");
    stored.status = Some(OrderStatus::Paid);
    assert!(dao.save(&stored).await?);
    assert_eq!(dao.count(&RuleSet::new()).await?, 1);
    let reread = dao.get(Value::I64(1)).await?.expect("row");
    assert_eq!(reread.status, Some(OrderStatus::Paid));

    let key = dao.save_returning_key(&reread).await?;
    assert_eq!(key, Some(GeneratedKey::Int(1)));
    let key = dao
        .save_returning_key(&Order::new(2, OrderStatus::Open, 1.0))
        .await?;
    assert_eq!(key, Some(GeneratedKey::Int(2)));
    Ok(())
}

#[tokio::test]
async fn replace_one_overwrites_by_identity() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;
    dao.insert(&Order::new(1, OrderStatus::Open, 5.0)).await?;

    let replacement = Order {
        id: Some(1),
        member_id: Some(8),
        status: Some(OrderStatus::Cancelled),
        ..Order::default()
    };
    assert!(dao.replace_one(&replacement).await?);
    let stored = dao.get(Value::I64(1)).await?.expect("row");
    assert_eq!(stored.member_id, Some(8));
    assert_eq!(stored.status, Some(OrderStatus::Cancelled));
    assert_eq!(dao.count(&RuleSet::new()).await?, 1);
    Ok(())
}

#[tokio::test]
async fn unknown_enumerant_in_storage_is_an_encoding_error() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;
    dao.execute_sql(
        "insert into t_order (member_id, status) values (?, ?)",
        vec![Value::I64(1), Value::from("REFUNDED")],
    )
    .await?;
    let err = dao.get(Value::I64(1)).await.err().expect("error");
    assert!(matches!(err, AnnalError::Encoding { .. }));
    Ok(())
}

#[tokio::test]
async fn table_switch_targets_a_sibling_table() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let mut dao = store.dao::<Order>()?;
    dao.execute_sql(
        &common::ORDER_DDL.replace("t_order", "t_order_archive"),
        Vec::new(),
    )
    .await?;

    dao.with_table("t_order_archive")?;
    assert_eq!(dao.table(), "t_order_archive");
    dao.insert(&Order::new(1, OrderStatus::Paid, 9.0)).await?;
    dao.insert(&Order::new(2, OrderStatus::Paid, 9.0)).await?;
    assert_eq!(dao.count(&RuleSet::new()).await?, 2);

    dao.restore_table();
    assert_eq!(dao.table(), "t_order");
    assert_eq!(dao.count(&RuleSet::new()).await?, 0);

    let err = dao.with_table("t_order; drop table t_order").err().expect("error");
    assert!(matches!(err, AnnalError::Validation { .. }));
    Ok(())
}

#[tokio::test]
async fn explicit_key_overrides_declared_identity() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;
    dao.insert(&Order::new(42, OrderStatus::Open, 3.0)).await?;

    let by_member = store.dao_with_key::<Order>(Some("memberId"))?;
    let found = by_member.get(Value::I64(42)).await?.expect("row");
    assert_eq!(found.id, Some(1));
    assert!(by_member.delete_by_id(Value::I64(42)).await?);
    assert_eq!(dao.count(&RuleSet::new()).await?, 0);
    Ok(())
}

#[tokio::test]
async fn merge_list_syncs_persisted_records_by_key() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;
    for member in 1..=3 {
        let mut order = Order::new(member, OrderStatus::Open, 10.0);
        order.detail = Some(format!("stored {member}"));
        dao.insert(&order).await?;
    }
    let mut persisted = dao.select(&RuleSet::new().asc("id")).await?;

    let kept = Order {
        id: Some(2),
        status: Some(OrderStatus::Paid),
        ..Order::default()
    };
    let also_kept = Order {
        id: Some(3),
        amount: Some(99.0),
        ..Order::default()
    };
    let fresh = Order::new(9, OrderStatus::Open, 1.0);
    let incoming = vec![kept, also_kept, fresh];

    let deleted = dao
        .merge_list(&incoming, &mut persisted, "id", false)
        .await?;
    assert_eq!(deleted, 1);
    assert!(dao.get(Value::I64(1)).await?.is_none());

    assert_eq!(persisted.len(), 3);
    assert_eq!(persisted[0].id, Some(2));
    assert_eq!(persisted[0].status, Some(OrderStatus::Paid));
    assert_eq!(persisted[0].detail.as_deref(), Some("stored 2"));
    assert_eq!(persisted[1].amount, Some(99.0));
    assert_eq!(persisted[1].member_id, Some(3));
    assert_eq!(persisted[2].id, None);
    assert_eq!(persisted[2].member_id, Some(9));
    Ok(())
}

#[tokio::test]
async fn merge_list_with_copy_null_takes_incoming_wholesale() -> AnnalResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let dao = store.dao::<Order>()?;
    let mut order = Order::new(1, OrderStatus::Open, 10.0);
    order.detail = Some("stored".to_string());
    dao.insert(&order).await?;
    let mut persisted = dao.get_all().await?;

    let incoming = vec![Order {
        id: Some(1),
        status: Some(OrderStatus::Cancelled),
        ..Order::default()
    }];
    let deleted = dao
        .merge_list(&incoming, &mut persisted, "id", true)
        .await?;
    assert_eq!(deleted, 0);
    assert_eq!(persisted, incoming);

    let err = dao
        .merge_list(&incoming, &mut persisted, "missing", false)
        .await
        .unwrap_err();
    assert!(matches!(err, AnnalError::Configuration { .. }));
    Ok(())
}
