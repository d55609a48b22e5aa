//! Create votes table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Votes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Votes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Votes::Choice).string_len(8).not_null())
                    .col(ColumnDef::new(Votes::Fingerprint).string_len(64).not_null())
                    .col(ColumnDef::new(Votes::UserAgent).text())
                    .col(ColumnDef::new(Votes::Ip).text())
                    .col(
                        ColumnDef::new(Votes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: fingerprint - one vote per client
        manager
            .create_index(
                Index::create()
                    .name("idx_votes_fingerprint")
                    .table(Votes::Table)
                    .col(Votes::Fingerprint)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Index: created_at (for listing newest first)
        manager
            .create_index(
                Index::create()
                    .name("idx_votes_created_at")
                    .table(Votes::Table)
                    .col(Votes::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Votes::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Votes {
    Table,
    Id,
    Choice,
    Fingerprint,
    UserAgent,
    Ip,
    CreatedAt,
}
