//! Postgres adapters for the collaborators the ledger consumes:
//! accounts, catalog items and the notification inbox.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::parse_stored;
use crate::domain::{Account, CatalogItem, Notification};
use crate::ports::{AccountDirectory, NotificationStore, ProductCatalog, RepositoryResult};

#[derive(Clone)]
pub struct PostgresAccountDirectory {
    pool: PgPool,
}

impl PostgresAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountDirectory for PostgresAccountDirectory {
    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, name, role FROM users WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AccountRow::into_domain).transpose()
    }

    async fn list_admins(&self) -> RepositoryResult<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, name, role FROM users WHERE role = 'ADMIN' AND is_deleted = FALSE",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AccountRow::into_domain).collect()
    }
}

#[derive(Clone)]
pub struct PostgresProductCatalog {
    pool: PgPool,
}

impl PostgresProductCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductCatalog for PostgresProductCatalog {
    async fn get_item(&self, id: Uuid) -> RepositoryResult<Option<CatalogItem>> {
        let row = sqlx::query_as::<_, CatalogRow>(
            "SELECT id, title, price FROM workflows WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| CatalogItem {
            id: r.id,
            title: r.title,
            price: r.price,
        }))
    }
}

#[derive(Clone)]
pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    async fn create(&self, notification: &Notification) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, message, type, is_unread, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.severity.as_str())
        .bind(notification.is_unread)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, title, message, type, is_unread, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NotificationRow::into_domain).collect()
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_unread = FALSE WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, user_id: Uuid) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    email: Option<String>,
    name: Option<String>,
    role: String,
}

impl AccountRow {
    fn into_domain(self) -> RepositoryResult<Account> {
        Ok(Account {
            id: self.id,
            email: self.email,
            name: self.name,
            role: parse_stored(&self.role)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CatalogRow {
    id: Uuid,
    title: String,
    price: BigDecimal,
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    message: String,
    #[sqlx(rename = "type")]
    kind: String,
    is_unread: bool,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    fn into_domain(self) -> RepositoryResult<Notification> {
        Ok(Notification {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            message: self.message,
            severity: parse_stored(&self.kind)?,
            is_unread: self.is_unread,
            created_at: self.created_at,
        })
    }
}
