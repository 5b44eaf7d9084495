use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 auth_user 表 - 与旧身份库的用户表结构保持一致
        manager
            .create_table(
                Table::create()
                    .table(AuthUser::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthUser::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AuthUser::Username)
                            .string_len(150)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(AuthUser::Email).string_len(254).not_null())
                    .col(ColumnDef::new(AuthUser::Password).string_len(128).not_null())
                    .col(
                        ColumnDef::new(AuthUser::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(AuthUser::LastLogin).timestamp())
                    .col(
                        ColumnDef::new(AuthUser::DateJoined)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_auth_user_email")
                    .table(AuthUser::Table)
                    .col(AuthUser::Email)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuthUser::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AuthUser {
    Table,
    Id,
    Username,
    Email,
    Password,
    IsActive,
    LastLogin,
    DateJoined,
}
