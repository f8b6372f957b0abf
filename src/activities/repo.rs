use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::activities::repo_types::{Activity, ActivityChanges, ActivityFilter, NewActivity};
use crate::db::{PgStore, RepoResult};
use crate::pagination::Paginated;

const ACTIVITY_COLUMNS: &str = "id, activity_type AS kind, subject, description, due_date, \
                                completed, deal_id, user_id, created_at, updated_at";

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Fails with `Constraint` when the deal or user does not exist.
    async fn create(&self, new: NewActivity) -> RepoResult<Activity>;

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Activity>>;

    /// Newest first.
    async fn list(&self, filter: &ActivityFilter) -> RepoResult<Paginated<Activity>>;

    async fn list_for_deal(&self, deal_id: Uuid) -> RepoResult<Vec<Activity>>;

    async fn update(&self, id: Uuid, changes: ActivityChanges) -> RepoResult<Option<Activity>>;

    /// The `limit` most recently created activities across all users.
    async fn recent(&self, limit: i64) -> RepoResult<Vec<Activity>>;
}

fn push_activity_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ActivityFilter) {
    if let Some(user) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user);
    }
    if let Some(deal) = filter.deal_id {
        qb.push(" AND deal_id = ").push_bind(deal);
    }
    if let Some(completed) = filter.completed {
        qb.push(" AND completed = ").push_bind(completed);
    }
}

#[async_trait]
impl ActivityRepository for PgStore {
    async fn create(&self, new: NewActivity) -> RepoResult<Activity> {
        let activity = sqlx::query_as::<_, Activity>(&format!(
            r#"
            INSERT INTO activities (activity_type, subject, description, due_date, deal_id, user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ACTIVITY_COLUMNS}
            "#
        ))
        .bind(new.kind)
        .bind(new.subject)
        .bind(new.description)
        .bind(new.due_date)
        .bind(new.deal_id)
        .bind(new.user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(activity)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Activity>> {
        let activity = sqlx::query_as::<_, Activity>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(activity)
    }

    async fn list(&self, filter: &ActivityFilter) -> RepoResult<Paginated<Activity>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM activities WHERE TRUE");
        push_activity_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *tx).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE TRUE"
        ));
        push_activity_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.page.limit())
            .push(" OFFSET ")
            .push_bind(filter.page.offset());
        let rows: Vec<Activity> = select.build_query_as().fetch_all(&mut *tx).await?;

        tx.commit().await?;
        Ok(Paginated::new(rows, total, filter.page))
    }

    async fn list_for_deal(&self, deal_id: Uuid) -> RepoResult<Vec<Activity>> {
        let rows = sqlx::query_as::<_, Activity>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE deal_id = $1 ORDER BY created_at DESC"
        ))
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update(&self, id: Uuid, changes: ActivityChanges) -> RepoResult<Option<Activity>> {
        let activity = sqlx::query_as::<_, Activity>(&format!(
            r#"
            UPDATE activities SET
                subject     = COALESCE($2, subject),
                description = COALESCE($3, description),
                due_date    = COALESCE($4, due_date),
                completed   = COALESCE($5, completed),
                updated_at  = now()
            WHERE id = $1
            RETURNING {ACTIVITY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.subject)
        .bind(changes.description)
        .bind(changes.due_date)
        .bind(changes.completed)
        .fetch_optional(&self.pool)
        .await?;
        Ok(activity)
    }

    async fn recent(&self, limit: i64) -> RepoResult<Vec<Activity>> {
        let rows = sqlx::query_as::<_, Activity>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
