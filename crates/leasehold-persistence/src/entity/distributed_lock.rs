//! Distributed Lock entity

use leasehold_consistency::LockRecord;
use sea_orm::entity::prelude::*;
use sea_orm::{NotSet, Set};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "distributed_lock")]
pub struct Model {
    #[sea_orm(
        primary_key,
        auto_increment = false,
        column_type = "String(StringLen::N(50))"
    )]
    pub name: String,
    #[sea_orm(column_type = "String(StringLen::N(50))")]
    pub hostname: String,
    #[sea_orm(column_type = "String(StringLen::N(45))")]
    pub address: String,
    pub thread_id: i64,
    #[sea_orm(column_type = "String(StringLen::N(50))")]
    pub thread_name: String,
    #[sea_orm(column_type = "String(StringLen::N(50))")]
    pub thread_group_name: String,
    pub maintenance: bool,
    pub locked: bool,
    pub updated_time: i64,
    pub expires_at: i64,
    pub version: i64,
    pub fence_token: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for LockRecord {
    fn from(value: Model) -> Self {
        Self {
            name: value.name,
            hostname: value.hostname,
            address: value.address,
            thread_id: value.thread_id,
            thread_name: value.thread_name,
            thread_group_name: value.thread_group_name,
            maintenance: value.maintenance,
            locked: value.locked,
            updated_time: value.updated_time,
            expires_at: value.expires_at,
            version: value.version,
            fence_token: value.fence_token,
        }
    }
}

impl ActiveModel {
    /// Active model for inserting `record` as a new row
    pub fn for_insert(record: &LockRecord) -> Self {
        Self {
            name: Set(record.name.clone()),
            ..Self::for_update(record)
        }
    }

    /// Active model carrying every mutable column of `record`
    pub fn for_update(record: &LockRecord) -> Self {
        Self {
            name: NotSet,
            hostname: Set(record.hostname.clone()),
            address: Set(record.address.clone()),
            thread_id: Set(record.thread_id),
            thread_name: Set(record.thread_name.clone()),
            thread_group_name: Set(record.thread_group_name.clone()),
            maintenance: Set(record.maintenance),
            locked: Set(record.locked),
            updated_time: Set(record.updated_time),
            expires_at: Set(record.expires_at),
            version: Set(record.version),
            fence_token: Set(record.fence_token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_into_record() {
        let model = Model {
            name: "orders".to_string(),
            hostname: "node-1".to_string(),
            address: "10.0.0.1".to_string(),
            thread_id: 7,
            thread_name: "task-7".to_string(),
            thread_group_name: "tokio-runtime".to_string(),
            maintenance: false,
            locked: true,
            updated_time: 1_000,
            expires_at: 61_000,
            version: 3,
            fence_token: 2,
        };

        let record = LockRecord::from(model);
        assert_eq!(record.name, "orders");
        assert_eq!(record.thread_id, 7);
        assert!(record.is_held_at(60_999));
        assert_eq!(record.version, 3);
        assert_eq!(record.fence_token, 2);
    }

    #[test]
    fn test_update_model_leaves_key_alone() {
        let record = LockRecord::new("orders");
        let update = ActiveModel::for_update(&record);
        assert!(update.name.is_not_set());
        assert_eq!(update.version, Set(0));

        let insert = ActiveModel::for_insert(&record);
        assert_eq!(insert.name, Set("orders".to_string()));
        assert_eq!(insert.thread_id, Set(-1));
    }
}
