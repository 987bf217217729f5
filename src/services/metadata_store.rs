use crate::entities::{prelude::*, *};
use crate::models::{FileRecord, RecordStatus};
use crate::services::error::IngestError;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, sea_query::Expr,
};

/// Durable record of which files exist.
///
/// Rows are written as `pending` and only become visible to `find_by_id` and
/// `list_all` once committed, after their object has been stored.
#[derive(Clone)]
pub struct MetadataStore {
    db: DatabaseConnection,
}

impl MetadataStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn create_pending(
        &self,
        name: &str,
        storage_key: &str,
        content_type: Option<&str>,
        size: i64,
    ) -> Result<file_records::Model, IngestError> {
        let now = Utc::now();
        let record = file_records::ActiveModel {
            name: Set(name.to_string()),
            storage_key: Set(storage_key.to_string()),
            content_type: Set(content_type.map(str::to_string)),
            size: Set(size),
            status: Set(RecordStatus::Pending.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = record.insert(&self.db).await?;
        tracing::debug!("Created pending record {} for '{}'", model.id, model.name);
        Ok(model)
    }

    /// Flip a pending record to committed. Fails if the row is gone or no
    /// longer pending (e.g. purged by the reconciler in the meantime).
    pub async fn mark_committed(
        &self,
        record: file_records::Model,
    ) -> Result<FileRecord, IngestError> {
        let now = Utc::now();
        let res = FileRecords::update_many()
            .col_expr(
                file_records::Column::Status,
                Expr::value(RecordStatus::Committed.as_str()),
            )
            .col_expr(file_records::Column::UpdatedAt, Expr::value(now))
            .filter(file_records::Column::Id.eq(record.id))
            .filter(file_records::Column::Status.eq(RecordStatus::Pending.as_str()))
            .exec(&self.db)
            .await?;

        if res.rows_affected != 1 {
            return Err(IngestError::StoreUnavailable(DbErr::RecordNotUpdated));
        }

        Ok(FileRecord::from(file_records::Model {
            status: RecordStatus::Committed.as_str().to_string(),
            updated_at: now,
            ..record
        }))
    }

    /// Delete a record that never got committed.
    pub async fn purge(&self, id: i32) -> Result<(), IngestError> {
        FileRecords::delete_many()
            .filter(file_records::Column::Id.eq(id))
            .filter(file_records::Column::Status.eq(RecordStatus::Pending.as_str()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: i32) -> Result<FileRecord, IngestError> {
        FileRecords::find_by_id(id)
            .filter(file_records::Column::Status.eq(RecordStatus::Committed.as_str()))
            .one(&self.db)
            .await?
            .map(FileRecord::from)
            .ok_or(IngestError::RecordNotFound(id))
    }

    /// All committed records, oldest first
    pub async fn list_all(&self) -> Result<Vec<FileRecord>, IngestError> {
        let records = FileRecords::find()
            .filter(file_records::Column::Status.eq(RecordStatus::Committed.as_str()))
            .order_by_asc(file_records::Column::Id)
            .all(&self.db)
            .await?;

        Ok(records.into_iter().map(FileRecord::from).collect())
    }

    /// Remove pending rows created before `cutoff`. Returns how many went.
    pub async fn purge_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<u64, IngestError> {
        let res = FileRecords::delete_many()
            .filter(file_records::Column::Status.eq(RecordStatus::Pending.as_str()))
            .filter(file_records::Column::CreatedAt.lt(cutoff))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }
}
