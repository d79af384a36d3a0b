//! SQL lock store (MySQL/PostgreSQL via SeaORM)
//!
//! Row locking uses `SELECT ... FOR UPDATE`; updates are guarded by the
//! `version` column so a stale writer affects no rows.

use std::time::Duration;

use async_trait::async_trait;
use leasehold_common::{Configuration, StoreError};
use leasehold_consistency::{Isolation, LockRecord, LockStore, LockTransaction};
use sea_orm::{sea_query::OnConflict, *};
use tracing::{debug, info, log::LevelFilter};

use crate::entity::distributed_lock;

/// Lock store backed by a relational database
#[derive(Clone)]
pub struct SqlLockStore {
    db: DatabaseConnection,
}

impl SqlLockStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create the `distributed_lock` table if it does not exist.
    pub async fn create_schema(&self) -> Result<(), StoreError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);
        let mut stmt = schema.create_table_from_entity(distributed_lock::Entity);
        stmt.if_not_exists();

        self.db
            .execute(backend.build(&stmt))
            .await
            .map_err(store_err)?;
        info!(?backend, "Lock table ready");
        Ok(())
    }
}

#[async_trait]
impl LockStore for SqlLockStore {
    async fn begin(&self, isolation: Isolation) -> Result<Box<dyn LockTransaction>, StoreError> {
        let level = match isolation {
            Isolation::ReadUncommitted => IsolationLevel::ReadUncommitted,
            Isolation::ReadCommitted => IsolationLevel::ReadCommitted,
        };
        let tx = self
            .db
            .begin_with_config(Some(level), None)
            .await
            .map_err(store_err)?;
        Ok(Box::new(SqlTransaction { tx }))
    }

    fn backend(&self) -> &'static str {
        match self.db.get_database_backend() {
            DbBackend::MySql => "mysql",
            DbBackend::Postgres => "postgres",
            DbBackend::Sqlite => "sqlite",
        }
    }
}

struct SqlTransaction {
    tx: DatabaseTransaction,
}

#[async_trait]
impl LockTransaction for SqlTransaction {
    async fn find(&mut self, name: &str) -> Result<Option<LockRecord>, StoreError> {
        let model = distributed_lock::Entity::find_by_id(name.to_string())
            .one(&self.tx)
            .await
            .map_err(store_err)?;
        Ok(model.map(LockRecord::from))
    }

    async fn find_for_update(&mut self, name: &str) -> Result<Option<LockRecord>, StoreError> {
        let model = distributed_lock::Entity::find_by_id(name.to_string())
            .lock_exclusive()
            .one(&self.tx)
            .await
            .map_err(store_err)?;
        Ok(model.map(LockRecord::from))
    }

    async fn insert_if_absent(&mut self, record: &LockRecord) -> Result<bool, StoreError> {
        let inserted = distributed_lock::Entity::insert(distributed_lock::ActiveModel::for_insert(
            record,
        ))
        .on_conflict(
            OnConflict::column(distributed_lock::Column::Name)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.tx)
        .await
        .map_err(store_err)?;
        Ok(inserted == 1)
    }

    async fn update(
        &mut self,
        record: &LockRecord,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let result = distributed_lock::Entity::update_many()
            .set(distributed_lock::ActiveModel::for_update(record))
            .filter(distributed_lock::Column::Name.eq(record.name.as_str()))
            .filter(distributed_lock::Column::Version.eq(expected_version))
            .exec(&self.tx)
            .await
            .map_err(store_err)?;

        if result.rows_affected != 1 {
            debug!(
                lock = %record.name,
                expected_version,
                "Guarded update matched no row"
            );
        }
        Ok(result.rows_affected == 1)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(store_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(store_err)
    }
}

fn store_err(err: DbErr) -> StoreError {
    match err {
        DbErr::ConnectionAcquire(e) => StoreError::Unavailable(e.to_string()),
        DbErr::Conn(e) => StoreError::Unavailable(e.to_string()),
        other => StoreError::Database(other.to_string()),
    }
}

/// Open a pooled database connection using the `db.*` settings.
pub async fn database_connection(config: &Configuration) -> anyhow::Result<DatabaseConnection> {
    let url = config
        .database_url()
        .ok_or_else(|| anyhow::anyhow!("db.url is not configured"))?;

    let mut opt = ConnectOptions::new(url);
    opt.max_connections(config.db_max_connections())
        .min_connections(config.db_min_connections())
        .connect_timeout(Duration::from_secs(config.db_connect_timeout_seconds()))
        .sqlx_logging(config.db_sqlx_logging())
        .sqlx_logging_level(LevelFilter::Debug);

    let db = Database::connect(opt).await?;
    info!(backend = ?db.get_database_backend(), "Connected to lock database");
    Ok(db)
}
