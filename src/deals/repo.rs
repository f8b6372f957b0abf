use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Postgres, QueryBuilder};
use time::{OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use crate::db::{PgStore, RepoResult};
use crate::deals::repo_types::{
    Deal, DealChanges, DealFilter, DealStage, MonthlyRevenue, NewDeal, NewNote, Note,
    StageSummary,
};
use crate::pagination::Paginated;

const DEAL_COLUMNS: &str = "id, title, value, currency, stage, probability, customer_id, \
                            assigned_to, expected_close_date, closed_at, created_at, \
                            updated_at";

#[async_trait]
pub trait DealRepository: Send + Sync {
    /// Fails with `Constraint` when the customer or assignee does not exist.
    async fn create(&self, new: NewDeal) -> RepoResult<Deal>;

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Deal>>;

    /// Newest first.
    async fn list(&self, filter: &DealFilter) -> RepoResult<Paginated<Deal>>;

    async fn list_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Deal>>;

    async fn update(&self, id: Uuid, changes: DealChanges) -> RepoResult<Option<Deal>>;

    /// Notes go with the deal; activities are detached.
    async fn delete(&self, id: Uuid) -> RepoResult<bool>;

    async fn closed_won_total_for_customer(&self, customer_id: Uuid) -> RepoResult<Decimal>;

    /// One entry per stage that has deals.
    async fn stage_summary(&self) -> RepoResult<Vec<StageSummary>>;

    /// Closed-won revenue per UTC calendar month of the last update, from `since` on.
    async fn won_revenue_by_month(&self, since: OffsetDateTime)
        -> RepoResult<Vec<MonthlyRevenue>>;

    async fn count_created_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> RepoResult<i64>;

    /// `(won, lost)` among deals last updated in `[from, to)`.
    async fn closed_counts_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> RepoResult<(i64, i64)>;
}

#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn create(&self, new: NewNote) -> RepoResult<Note>;

    /// Oldest first.
    async fn list_for_deal(&self, deal_id: Uuid) -> RepoResult<Vec<Note>>;
}

fn push_deal_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &DealFilter) {
    if let Some(stage) = filter.stage {
        qb.push(" AND stage = ").push_bind(stage);
    }
    if let Some(assignee) = filter.assigned_to {
        qb.push(" AND assigned_to = ").push_bind(assignee);
    }
    if let Some(customer) = filter.customer_id {
        qb.push(" AND customer_id = ").push_bind(customer);
    }
    if let Some(min) = filter.min_value {
        qb.push(" AND value >= ").push_bind(min);
    }
    if let Some(max) = filter.max_value {
        qb.push(" AND value <= ").push_bind(max);
    }
}

#[async_trait]
impl DealRepository for PgStore {
    async fn create(&self, new: NewDeal) -> RepoResult<Deal> {
        let deal = sqlx::query_as::<_, Deal>(&format!(
            r#"
            INSERT INTO deals (title, value, currency, stage, probability, customer_id,
                               assigned_to, expected_close_date, closed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
                    CASE WHEN $4::deal_stage IN ('CLOSED_WON', 'CLOSED_LOST') THEN now() END)
            RETURNING {DEAL_COLUMNS}
            "#
        ))
        .bind(new.title)
        .bind(new.value)
        .bind(new.currency)
        .bind(new.stage)
        .bind(new.probability)
        .bind(new.customer_id)
        .bind(new.assigned_to)
        .bind(new.expected_close_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(deal)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Deal>> {
        let deal = sqlx::query_as::<_, Deal>(&format!(
            "SELECT {DEAL_COLUMNS} FROM deals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(deal)
    }

    async fn list(&self, filter: &DealFilter) -> RepoResult<Paginated<Deal>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM deals WHERE TRUE");
        push_deal_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *tx).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {DEAL_COLUMNS} FROM deals WHERE TRUE"));
        push_deal_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.page.limit())
            .push(" OFFSET ")
            .push_bind(filter.page.offset());
        let rows: Vec<Deal> = select.build_query_as().fetch_all(&mut *tx).await?;

        tx.commit().await?;
        Ok(Paginated::new(rows, total, filter.page))
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Deal>> {
        let rows = sqlx::query_as::<_, Deal>(&format!(
            "SELECT {DEAL_COLUMNS} FROM deals WHERE customer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update(&self, id: Uuid, changes: DealChanges) -> RepoResult<Option<Deal>> {
        let deal = sqlx::query_as::<_, Deal>(&format!(
            r#"
            UPDATE deals SET
                title               = COALESCE($2, title),
                value               = COALESCE($3, value),
                currency            = COALESCE($4, currency),
                stage               = COALESCE($5, stage),
                probability         = COALESCE($6, probability),
                assigned_to         = COALESCE($7, assigned_to),
                expected_close_date = COALESCE($8, expected_close_date),
                closed_at           = CASE
                    WHEN $5::deal_stage IS NULL OR $5::deal_stage = stage THEN closed_at
                    WHEN $5::deal_stage IN ('CLOSED_WON', 'CLOSED_LOST') THEN now()
                    ELSE NULL
                END,
                updated_at          = now()
            WHERE id = $1
            RETURNING {DEAL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.title)
        .bind(changes.value)
        .bind(changes.currency)
        .bind(changes.stage)
        .bind(changes.probability)
        .bind(changes.assigned_to)
        .bind(changes.expected_close_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(deal)
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM deals WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn closed_won_total_for_customer(&self, customer_id: Uuid) -> RepoResult<Decimal> {
        let total = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(value), 0)
            FROM deals
            WHERE customer_id = $1 AND stage = 'CLOSED_WON'
            "#,
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn stage_summary(&self) -> RepoResult<Vec<StageSummary>> {
        let rows = sqlx::query_as::<_, (DealStage, i64, Decimal)>(
            "SELECT stage, COUNT(*), COALESCE(SUM(value), 0) FROM deals GROUP BY stage",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(stage, count, value)| StageSummary {
                stage,
                count,
                value,
            })
            .collect())
    }

    async fn won_revenue_by_month(
        &self,
        since: OffsetDateTime,
    ) -> RepoResult<Vec<MonthlyRevenue>> {
        let rows = sqlx::query_as::<_, (PrimitiveDateTime, Decimal)>(
            r#"
            SELECT date_trunc('month', closed_at AT TIME ZONE 'UTC') AS month,
                   COALESCE(SUM(value), 0)
            FROM deals
            WHERE stage = 'CLOSED_WON' AND closed_at >= $1
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(month, revenue)| MonthlyRevenue {
                month: month.date(),
                revenue,
            })
            .collect())
    }

    async fn count_created_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> RepoResult<i64> {
        let n = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM deals WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }

    async fn closed_counts_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> RepoResult<(i64, i64)> {
        let counts = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*) FILTER (WHERE stage = 'CLOSED_WON'),
                   COUNT(*) FILTER (WHERE stage = 'CLOSED_LOST')
            FROM deals
            WHERE closed_at >= $1 AND closed_at < $2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }
}

#[async_trait]
impl NoteRepository for PgStore {
    async fn create(&self, new: NewNote) -> RepoResult<Note> {
        let note = sqlx::query_as::<_, Note>(
            r#"
            INSERT INTO notes (deal_id, author_id, content)
            VALUES ($1, $2, $3)
            RETURNING id, deal_id, author_id, content, created_at
            "#,
        )
        .bind(new.deal_id)
        .bind(new.author_id)
        .bind(new.content)
        .fetch_one(&self.pool)
        .await?;
        Ok(note)
    }

    async fn list_for_deal(&self, deal_id: Uuid) -> RepoResult<Vec<Note>> {
        let rows = sqlx::query_as::<_, Note>(
            r#"
            SELECT id, deal_id, author_id, content, created_at
            FROM notes
            WHERE deal_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(filter: &DealFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM deals WHERE TRUE");
        push_deal_filters(&mut qb, filter);
        qb.sql().to_string()
    }

    #[test]
    fn no_filter_adds_no_clause() {
        assert_eq!(
            render(&DealFilter::default()),
            "SELECT COUNT(*) FROM deals WHERE TRUE"
        );
    }

    #[test]
    fn filters_bind_in_clause_order() {
        let filter = DealFilter {
            stage: Some(DealStage::Proposal),
            assigned_to: Some(Uuid::new_v4()),
            customer_id: Some(Uuid::new_v4()),
            min_value: Some(Decimal::from(100)),
            max_value: Some(Decimal::from(500)),
            ..Default::default()
        };
        assert_eq!(
            render(&filter),
            "SELECT COUNT(*) FROM deals WHERE TRUE AND stage = $1 AND assigned_to = $2 \
             AND customer_id = $3 AND value >= $4 AND value <= $5"
        );

        let only_value = DealFilter {
            max_value: Some(Decimal::from(500)),
            ..Default::default()
        };
        assert_eq!(
            render(&only_value),
            "SELECT COUNT(*) FROM deals WHERE TRUE AND value <= $1"
        );
    }
}
