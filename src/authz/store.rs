//! Persistence of policy tuples in the `policy_rules` table.

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use crate::authz::errors::AuthzError;
use crate::authz::types::{PolicyKind, PolicyRule};
use crate::entities::policy_rule::{self, Column, Entity};

pub async fn load_rules<C: ConnectionTrait>(db: &C) -> Result<Vec<PolicyRule>, AuthzError> {
    let rows = Entity::find().order_by_asc(Column::Id).all(db).await?;
    rows.into_iter()
        .map(|row| {
            let kind = PolicyKind::parse(&row.ptype).ok_or_else(|| AuthzError::CorruptRule {
                id: row.id,
                ptype: row.ptype.clone(),
            })?;
            Ok(PolicyRule {
                kind,
                v0: row.v0,
                v1: row.v1,
                v2: row.v2,
            })
        })
        .collect()
}

fn active_model(rule: &PolicyRule) -> policy_rule::ActiveModel {
    policy_rule::ActiveModel {
        ptype: Set(rule.kind.as_str().to_string()),
        v0: Set(rule.v0.clone()),
        v1: Set(rule.v1.clone()),
        v2: Set(rule.v2.clone()),
        ..Default::default()
    }
}

/// Inserts the tuple unless an identical one is stored.
pub async fn insert_rule<C: ConnectionTrait>(db: &C, rule: &PolicyRule) -> Result<(), AuthzError> {
    Entity::insert(active_model(rule))
        .on_conflict(
            OnConflict::columns([Column::Ptype, Column::V0, Column::V1, Column::V2])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

pub async fn delete_rules<C: ConnectionTrait>(
    db: &C,
    rules: &[PolicyRule],
) -> Result<u64, AuthzError> {
    let mut removed = 0;
    for rule in rules {
        let res = Entity::delete_many()
            .filter(Column::Ptype.eq(rule.kind.as_str()))
            .filter(Column::V0.eq(rule.v0.as_str()))
            .filter(Column::V1.eq(rule.v1.as_str()))
            .filter(Column::V2.eq(rule.v2.as_str()))
            .exec(db)
            .await?;
        removed += res.rows_affected;
    }
    Ok(removed)
}

/// Replaces the stored tuples with `rules` in one transaction.
pub async fn replace_all(db: &DatabaseConnection, rules: &[PolicyRule]) -> Result<(), AuthzError> {
    let txn = db.begin().await?;
    Entity::delete_many().exec(&txn).await?;
    for rule in rules {
        insert_rule(&txn, rule).await?;
    }
    txn.commit().await?;
    Ok(())
}

/// Applies removals then additions atomically.
pub async fn apply_changes(
    db: &DatabaseConnection,
    removed: &[PolicyRule],
    added: &[PolicyRule],
) -> Result<(), AuthzError> {
    let txn = db.begin().await?;
    delete_rules(&txn, removed).await?;
    for rule in added {
        insert_rule(&txn, rule).await?;
    }
    txn.commit().await?;
    Ok(())
}
