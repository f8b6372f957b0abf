use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{types::Json, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::customers::repo_types::{
    Customer, CustomerChanges, CustomerFilter, CustomerRow, CustomerStats, Interaction,
    NewCustomer, NewInteraction,
};
use crate::db::{contains_pattern, PgStore, RepoResult};
use crate::pagination::Paginated;

const CUSTOMER_COLUMNS: &str = "id, email, first_name, last_name, company, phone, address, \
                                tags, score, lifetime_value, created_at, updated_at";

const INTERACTION_COLUMNS: &str = "id, customer_id, user_id, interaction_type AS kind, channel, \
                                   subject, content, sentiment, created_at";

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Fails with `Duplicate` when the email is taken.
    async fn create(&self, new: NewCustomer) -> RepoResult<Customer>;

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Customer>>;

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Customer>>;

    /// Filtered page plus the total of the same filtered set.
    async fn list(&self, filter: &CustomerFilter) -> RepoResult<Paginated<Customer>>;

    /// Returns `None` when the id does not exist.
    async fn update(&self, id: Uuid, changes: CustomerChanges) -> RepoResult<Option<Customer>>;

    /// Returns `false` when nothing was deleted; `Constraint` while deals still
    /// reference the customer.
    async fn delete(&self, id: Uuid) -> RepoResult<bool>;

    async fn set_lifetime_value(&self, id: Uuid, value: Decimal) -> RepoResult<bool>;

    /// `new_this_month` counts customers created at or after `month_start`.
    async fn stats(&self, month_start: OffsetDateTime) -> RepoResult<CustomerStats>;

    async fn count_created_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> RepoResult<i64>;
}

#[async_trait]
pub trait InteractionRepository: Send + Sync {
    async fn create(&self, new: NewInteraction) -> RepoResult<Interaction>;

    /// Newest first.
    async fn list_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Interaction>>;
}

fn push_customer_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &CustomerFilter) {
    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = contains_pattern(search);
        qb.push(" AND (email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR first_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR last_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR company ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if !filter.tags.is_empty() {
        qb.push(" AND tags @> ").push_bind(filter.tags.clone());
    }
    if let Some(min) = filter.min_score {
        qb.push(" AND score >= ").push_bind(min);
    }
    if let Some(max) = filter.max_score {
        qb.push(" AND score <= ").push_bind(max);
    }
    if let Some(company) = filter.company.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND company ILIKE ").push_bind(contains_pattern(company));
    }
}

fn push_customer_order(qb: &mut QueryBuilder<'_, Postgres>, filter: &CustomerFilter) {
    let order = filter.sort_order.as_sql();
    qb.push(format!(
        " ORDER BY {} {order}, id {order}",
        filter.sort_by.column()
    ));
}

#[async_trait]
impl CustomerRepository for PgStore {
    async fn create(&self, new: NewCustomer) -> RepoResult<Customer> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            r#"
            INSERT INTO customers (email, first_name, last_name, company, phone, address, tags)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CUSTOMER_COLUMNS}
            "#
        ))
        .bind(new.email)
        .bind(new.first_name)
        .bind(new.last_name)
        .bind(new.company)
        .bind(new.phone)
        .bind(new.address.map(Json))
        .bind(new.tags)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list(&self, filter: &CustomerFilter) -> RepoResult<Paginated<Customer>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM customers WHERE TRUE");
        push_customer_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *tx).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE TRUE"
        ));
        push_customer_filters(&mut select, filter);
        push_customer_order(&mut select, filter);
        select
            .push(" LIMIT ")
            .push_bind(filter.page.limit())
            .push(" OFFSET ")
            .push_bind(filter.page.offset());
        let rows: Vec<CustomerRow> = select.build_query_as().fetch_all(&mut *tx).await?;

        tx.commit().await?;
        Ok(Paginated::new(
            rows.into_iter().map(Into::into).collect(),
            total,
            filter.page,
        ))
    }

    async fn update(&self, id: Uuid, changes: CustomerChanges) -> RepoResult<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            r#"
            UPDATE customers SET
                email      = COALESCE($2, email),
                first_name = COALESCE($3, first_name),
                last_name  = COALESCE($4, last_name),
                company    = COALESCE($5, company),
                phone      = COALESCE($6, phone),
                address    = COALESCE($7, address),
                tags       = COALESCE($8, tags),
                score      = COALESCE($9, score),
                updated_at = now()
            WHERE id = $1
            RETURNING {CUSTOMER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.email)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.company)
        .bind(changes.phone)
        .bind(changes.address.map(Json))
        .bind(changes.tags)
        .bind(changes.score)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_lifetime_value(&self, id: Uuid, value: Decimal) -> RepoResult<bool> {
        let res = sqlx::query(
            "UPDATE customers SET lifetime_value = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn stats(&self, month_start: OffsetDateTime) -> RepoResult<CustomerStats> {
        let (total, new_this_month, average_score, total_lifetime_value) =
            sqlx::query_as::<_, (i64, i64, f64, Decimal)>(
                r#"
                SELECT COUNT(*),
                       COUNT(*) FILTER (WHERE created_at >= $1),
                       COALESCE(AVG(score), 0)::FLOAT8,
                       COALESCE(SUM(lifetime_value), 0)
                FROM customers
                "#,
            )
            .bind(month_start)
            .fetch_one(&self.pool)
            .await?;
        Ok(CustomerStats {
            total,
            new_this_month,
            average_score,
            total_lifetime_value,
        })
    }

    async fn count_created_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> RepoResult<i64> {
        let n = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM customers WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }
}

#[async_trait]
impl InteractionRepository for PgStore {
    async fn create(&self, new: NewInteraction) -> RepoResult<Interaction> {
        let interaction = sqlx::query_as::<_, Interaction>(&format!(
            r#"
            INSERT INTO interactions
                (customer_id, user_id, interaction_type, channel, subject, content, sentiment)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {INTERACTION_COLUMNS}
            "#
        ))
        .bind(new.customer_id)
        .bind(new.user_id)
        .bind(new.kind)
        .bind(new.channel)
        .bind(new.subject)
        .bind(new.content)
        .bind(new.sentiment)
        .fetch_one(&self.pool)
        .await?;
        Ok(interaction)
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Interaction>> {
        let rows = sqlx::query_as::<_, Interaction>(&format!(
            r#"
            SELECT {INTERACTION_COLUMNS}
            FROM interactions
            WHERE customer_id = $1
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
