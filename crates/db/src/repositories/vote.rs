//! Vote repository.

use std::path::Path;
use std::sync::Arc;

use crate::entities::{Choice, Vote, vote};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseBackend,
    DatabaseConnection, DbErr, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter,
    QueryOrder, SqlErr, Statement, TransactionTrait,
};
use tally_common::{AppError, AppResult};

/// Rows per statement when bulk inserting.
const INSERT_CHUNK: usize = 500;

/// Result of an insert guarded by the fingerprint unique index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row was created.
    Inserted(vote::Model),
    /// A vote with the same fingerprint already exists; nothing was written.
    Duplicate,
}

fn db_err(e: DbErr) -> AppError {
    AppError::Database(e.to_string())
}

/// Vote repository for database operations.
#[derive(Clone)]
pub struct VoteRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert a vote, relying on the unique index to reject a repeated fingerprint.
    ///
    /// There is no prior lookup: two concurrent inserts for one fingerprint
    /// race inside the database and exactly one of them succeeds.
    pub async fn insert_if_absent(&self, model: vote::ActiveModel) -> AppResult<InsertOutcome> {
        match model.insert(self.db.as_ref()).await {
            Ok(inserted) => Ok(InsertOutcome::Inserted(inserted)),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(db_err(e)),
        }
    }

    /// Count votes for one choice.
    pub async fn count_by_choice(&self, choice: Choice) -> AppResult<u64> {
        Vote::find()
            .filter(vote::Column::Choice.eq(choice))
            .count(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// All votes, newest first.
    pub async fn find_all_recent(&self) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .order_by_desc(vote::Column::CreatedAt)
            .order_by_desc(vote::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Delete every vote. Returns the number of rows removed.
    pub async fn delete_all(&self) -> AppResult<u64> {
        let result = Vote::delete_many()
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }

    /// Atomically replace the whole table with `votes`.
    pub async fn replace_all(&self, votes: Vec<vote::Model>) -> AppResult<u64> {
        let txn = self.db.begin().await.map_err(db_err)?;

        Vote::delete_many().exec(&txn).await.map_err(db_err)?;

        let total = votes.len() as u64;
        for chunk in votes.chunks(INSERT_CHUNK) {
            let models = chunk
                .iter()
                .cloned()
                .map(IntoActiveModel::into_active_model);
            Vote::insert_many(models)
                .exec_without_returning(&txn)
                .await
                .map_err(db_err)?;
        }

        txn.commit().await.map_err(db_err)?;
        Ok(total)
    }

    /// Write a consistent copy of the database to `target`.
    ///
    /// `target` must not exist yet.
    pub async fn snapshot_to(&self, target: &Path) -> AppResult<()> {
        let target = target.to_string_lossy().into_owned();
        self.db
            .execute(Statement::from_sql_and_values(
                DatabaseBackend::Sqlite,
                "VACUUM INTO ?",
                [target.into()],
            ))
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Read all votes out of a database file other than the live one.
    pub async fn load_snapshot(path: &Path) -> AppResult<Vec<vote::Model>> {
        let url = format!("sqlite://{}?mode=ro", path.display());
        let conn = Database::connect(&url).await.map_err(db_err)?;

        let votes = Vote::find()
            .order_by_asc(vote::Column::Id)
            .all(&conn)
            .await
            .map_err(db_err);

        conn.close().await.map_err(db_err)?;
        votes
    }
}
