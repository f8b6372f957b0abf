//! In-process store used by `AppState::fake()`. Enforces the same unique and
//! foreign key rules as the Postgres schema.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::activities::{
    repo::ActivityRepository,
    repo_types::{Activity, ActivityChanges, ActivityFilter, NewActivity},
};
use crate::auth::{
    repo::UserRepository,
    repo_types::{NewUser, User},
};
use crate::calendar;
use crate::customers::{
    repo::{CustomerRepository, InteractionRepository},
    repo_types::{
        Customer, CustomerChanges, CustomerFilter, CustomerSortBy, CustomerStats, Interaction,
        NewCustomer, NewInteraction,
    },
};
use crate::db::{RepoError, RepoResult};
use crate::deals::{
    repo::{DealRepository, NoteRepository},
    repo_types::{
        Deal, DealChanges, DealFilter, DealStage, MonthlyRevenue, NewDeal, NewNote, Note,
        StageSummary,
    },
};
use crate::pagination::{Paginated, PageRequest, SortOrder};

#[derive(Default)]
struct Tables {
    clock: Option<OffsetDateTime>,
    users: Vec<User>,
    customers: Vec<Customer>,
    deals: Vec<Deal>,
    activities: Vec<Activity>,
    interactions: Vec<Interaction>,
    notes: Vec<Note>,
}

impl Tables {
    /// Strictly increasing timestamps so insertion order is observable.
    fn tick(&mut self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let next = match self.clock {
            Some(last) if now <= last => last + time::Duration::microseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("memory store poisoned")
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn set_user_active(&self, id: Uuid, active: bool) {
        if let Some(u) = self.lock().users.iter_mut().find(|u| u.id == id) {
            u.is_active = active;
        }
    }

    pub fn set_customer_created_at(&self, id: Uuid, at: OffsetDateTime) {
        if let Some(c) = self.lock().customers.iter_mut().find(|c| c.id == id) {
            c.created_at = at;
        }
    }

    /// Backdates a deal; `closed_at` only moves for deals in a closed stage.
    pub fn set_deal_timestamps(&self, id: Uuid, created_at: OffsetDateTime, closed_at: OffsetDateTime) {
        if let Some(d) = self.lock().deals.iter_mut().find(|d| d.id == id) {
            d.created_at = created_at;
            d.updated_at = closed_at;
            if d.stage.is_closed() {
                d.closed_at = Some(closed_at);
            }
        }
    }
}

fn paginate<T: Clone>(items: Vec<T>, page: PageRequest) -> Paginated<T> {
    let total = items.len() as i64;
    let data = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    Paginated::new(data, total, page)
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn create(&self, new: NewUser) -> RepoResult<User> {
        let mut t = self.lock();
        if t.users.iter().any(|u| u.email == new.email) {
            return Err(RepoError::Duplicate("email already exists".into()));
        }
        let now = t.tick();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            role: new.role,
            avatar: None,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn record_login(&self, id: Uuid, at: OffsetDateTime) -> RepoResult<()> {
        if let Some(u) = self.lock().users.iter_mut().find(|u| u.id == id) {
            u.last_login = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl CustomerRepository for MemoryStore {
    async fn create(&self, new: NewCustomer) -> RepoResult<Customer> {
        let mut t = self.lock();
        if t.customers.iter().any(|c| c.email == new.email) {
            return Err(RepoError::Duplicate("email already exists".into()));
        }
        let now = t.tick();
        let customer = Customer {
            id: Uuid::new_v4(),
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            company: new.company,
            phone: new.phone,
            address: new.address,
            tags: new.tags,
            score: 0,
            lifetime_value: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        t.customers.push(customer.clone());
        Ok(customer)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Customer>> {
        Ok(self.lock().customers.iter().find(|c| c.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Customer>> {
        Ok(self.lock().customers.iter().find(|c| c.email == email).cloned())
    }

    async fn list(&self, filter: &CustomerFilter) -> RepoResult<Paginated<Customer>> {
        let t = self.lock();
        let mut rows: Vec<Customer> = t
            .customers
            .iter()
            .filter(|c| match filter.search.as_deref().filter(|s| !s.is_empty()) {
                Some(s) => {
                    contains_ci(Some(&c.email), s)
                        || contains_ci(Some(&c.first_name), s)
                        || contains_ci(Some(&c.last_name), s)
                        || contains_ci(c.company.as_deref(), s)
                }
                None => true,
            })
            .filter(|c| filter.tags.iter().all(|tag| c.tags.contains(tag)))
            .filter(|c| filter.min_score.map_or(true, |min| c.score >= min))
            .filter(|c| filter.max_score.map_or(true, |max| c.score <= max))
            .filter(|c| match filter.company.as_deref().filter(|s| !s.is_empty()) {
                Some(s) => contains_ci(c.company.as_deref(), s),
                None => true,
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let ord = match filter.sort_by {
                CustomerSortBy::CreatedAt => a.created_at.cmp(&b.created_at),
                CustomerSortBy::Score => a.score.cmp(&b.score),
                CustomerSortBy::LifetimeValue => a.lifetime_value.cmp(&b.lifetime_value),
            }
            .then_with(|| a.id.cmp(&b.id));
            match filter.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        Ok(paginate(rows, filter.page))
    }

    async fn update(&self, id: Uuid, changes: CustomerChanges) -> RepoResult<Option<Customer>> {
        let mut t = self.lock();
        if let Some(email) = changes.email.as_deref() {
            if t.customers.iter().any(|c| c.email == email && c.id != id) {
                return Err(RepoError::Duplicate("email already exists".into()));
            }
        }
        let now = t.tick();
        let Some(c) = t.customers.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if let Some(v) = changes.email {
            c.email = v;
        }
        if let Some(v) = changes.first_name {
            c.first_name = v;
        }
        if let Some(v) = changes.last_name {
            c.last_name = v;
        }
        if let Some(v) = changes.company {
            c.company = Some(v);
        }
        if let Some(v) = changes.phone {
            c.phone = Some(v);
        }
        if let Some(v) = changes.address {
            c.address = Some(v);
        }
        if let Some(v) = changes.tags {
            c.tags = v;
        }
        if let Some(v) = changes.score {
            c.score = v;
        }
        c.updated_at = now;
        Ok(Some(c.clone()))
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let mut t = self.lock();
        if !t.customers.iter().any(|c| c.id == id) {
            return Ok(false);
        }
        if t.deals.iter().any(|d| d.customer_id == id) {
            return Err(RepoError::Constraint(
                "record is still referenced (deals_customer_id_fkey)".into(),
            ));
        }
        t.interactions.retain(|i| i.customer_id != id);
        t.customers.retain(|c| c.id != id);
        Ok(true)
    }

    async fn set_lifetime_value(&self, id: Uuid, value: Decimal) -> RepoResult<bool> {
        let mut t = self.lock();
        let now = t.tick();
        match t.customers.iter_mut().find(|c| c.id == id) {
            Some(c) => {
                c.lifetime_value = value;
                c.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn stats(&self, month_start: OffsetDateTime) -> RepoResult<CustomerStats> {
        let t = self.lock();
        let total = t.customers.len() as i64;
        let new_this_month = t
            .customers
            .iter()
            .filter(|c| c.created_at >= month_start)
            .count() as i64;
        let average_score = if total == 0 {
            0.0
        } else {
            t.customers.iter().map(|c| f64::from(c.score)).sum::<f64>() / total as f64
        };
        let total_lifetime_value = t.customers.iter().map(|c| c.lifetime_value).sum();
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
        Ok(self
            .lock()
            .customers
            .iter()
            .filter(|c| c.created_at >= from && c.created_at < to)
            .count() as i64)
    }
}

#[async_trait]
impl InteractionRepository for MemoryStore {
    async fn create(&self, new: NewInteraction) -> RepoResult<Interaction> {
        let mut t = self.lock();
        if !t.customers.iter().any(|c| c.id == new.customer_id)
            || !t.users.iter().any(|u| u.id == new.user_id)
        {
            return Err(RepoError::Constraint("referenced record missing".into()));
        }
        let interaction = Interaction {
            id: Uuid::new_v4(),
            customer_id: new.customer_id,
            user_id: new.user_id,
            kind: new.kind,
            channel: new.channel,
            subject: new.subject,
            content: new.content,
            sentiment: new.sentiment,
            created_at: t.tick(),
        };
        t.interactions.push(interaction.clone());
        Ok(interaction)
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Interaction>> {
        let mut rows: Vec<Interaction> = self
            .lock()
            .interactions
            .iter()
            .filter(|i| i.customer_id == customer_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

#[async_trait]
impl DealRepository for MemoryStore {
    async fn create(&self, new: NewDeal) -> RepoResult<Deal> {
        let mut t = self.lock();
        if !t.customers.iter().any(|c| c.id == new.customer_id)
            || !t.users.iter().any(|u| u.id == new.assigned_to)
        {
            return Err(RepoError::Constraint("referenced record missing".into()));
        }
        let now = t.tick();
        let deal = Deal {
            id: Uuid::new_v4(),
            title: new.title,
            value: new.value,
            currency: new.currency,
            stage: new.stage,
            probability: new.probability,
            customer_id: new.customer_id,
            assigned_to: new.assigned_to,
            expected_close_date: new.expected_close_date,
            closed_at: new.stage.is_closed().then_some(now),
            created_at: now,
            updated_at: now,
        };
        t.deals.push(deal.clone());
        Ok(deal)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Deal>> {
        Ok(self.lock().deals.iter().find(|d| d.id == id).cloned())
    }

    async fn list(&self, filter: &DealFilter) -> RepoResult<Paginated<Deal>> {
        let mut rows: Vec<Deal> = self
            .lock()
            .deals
            .iter()
            .filter(|d| filter.stage.map_or(true, |s| d.stage == s))
            .filter(|d| filter.assigned_to.map_or(true, |u| d.assigned_to == u))
            .filter(|d| filter.customer_id.map_or(true, |c| d.customer_id == c))
            .filter(|d| filter.min_value.map_or(true, |v| d.value >= v))
            .filter(|d| filter.max_value.map_or(true, |v| d.value <= v))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, filter.page))
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Deal>> {
        let mut rows: Vec<Deal> = self
            .lock()
            .deals
            .iter()
            .filter(|d| d.customer_id == customer_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn update(&self, id: Uuid, changes: DealChanges) -> RepoResult<Option<Deal>> {
        let mut t = self.lock();
        if let Some(assignee) = changes.assigned_to {
            if !t.users.iter().any(|u| u.id == assignee) {
                return Err(RepoError::Constraint("referenced record missing".into()));
            }
        }
        let now = t.tick();
        let Some(d) = t.deals.iter_mut().find(|d| d.id == id) else {
            return Ok(None);
        };
        if let Some(v) = changes.title {
            d.title = v;
        }
        if let Some(v) = changes.value {
            d.value = v;
        }
        if let Some(v) = changes.currency {
            d.currency = v;
        }
        if let Some(v) = changes.stage {
            if v != d.stage {
                d.closed_at = v.is_closed().then_some(now);
            }
            d.stage = v;
        }
        if let Some(v) = changes.probability {
            d.probability = v;
        }
        if let Some(v) = changes.assigned_to {
            d.assigned_to = v;
        }
        if let Some(v) = changes.expected_close_date {
            d.expected_close_date = Some(v);
        }
        d.updated_at = now;
        Ok(Some(d.clone()))
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let mut t = self.lock();
        let before = t.deals.len();
        t.deals.retain(|d| d.id != id);
        if t.deals.len() == before {
            return Ok(false);
        }
        t.notes.retain(|n| n.deal_id != id);
        for a in t.activities.iter_mut().filter(|a| a.deal_id == Some(id)) {
            a.deal_id = None;
        }
        Ok(true)
    }

    async fn closed_won_total_for_customer(&self, customer_id: Uuid) -> RepoResult<Decimal> {
        Ok(self
            .lock()
            .deals
            .iter()
            .filter(|d| d.customer_id == customer_id && d.stage == DealStage::ClosedWon)
            .map(|d| d.value)
            .sum())
    }

    async fn stage_summary(&self) -> RepoResult<Vec<StageSummary>> {
        let mut by_stage: BTreeMap<DealStage, (i64, Decimal)> = BTreeMap::new();
        for d in self.lock().deals.iter() {
            let entry = by_stage.entry(d.stage).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += d.value;
        }
        Ok(by_stage
            .into_iter()
            .map(|(stage, (count, value))| StageSummary {
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
        let mut by_month: BTreeMap<time::Date, Decimal> = BTreeMap::new();
        for d in self
            .lock()
            .deals
            .iter()
            .filter(|d| d.stage == DealStage::ClosedWon)
        {
            let Some(closed_at) = d.closed_at.filter(|at| *at >= since) else {
                continue;
            };
            let month = calendar::month_start(closed_at.to_offset(time::UtcOffset::UTC).date());
            *by_month.entry(month).or_insert(Decimal::ZERO) += d.value;
        }
        Ok(by_month
            .into_iter()
            .map(|(month, revenue)| MonthlyRevenue { month, revenue })
            .collect())
    }

    async fn count_created_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> RepoResult<i64> {
        Ok(self
            .lock()
            .deals
            .iter()
            .filter(|d| d.created_at >= from && d.created_at < to)
            .count() as i64)
    }

    async fn closed_counts_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> RepoResult<(i64, i64)> {
        let t = self.lock();
        let in_window = |d: &&Deal| d.closed_at.is_some_and(|at| at >= from && at < to);
        let won = t
            .deals
            .iter()
            .filter(in_window)
            .filter(|d| d.stage == DealStage::ClosedWon)
            .count() as i64;
        let lost = t
            .deals
            .iter()
            .filter(in_window)
            .filter(|d| d.stage == DealStage::ClosedLost)
            .count() as i64;
        Ok((won, lost))
    }
}

#[async_trait]
impl NoteRepository for MemoryStore {
    async fn create(&self, new: NewNote) -> RepoResult<Note> {
        let mut t = self.lock();
        if !t.deals.iter().any(|d| d.id == new.deal_id)
            || !t.users.iter().any(|u| u.id == new.author_id)
        {
            return Err(RepoError::Constraint("referenced record missing".into()));
        }
        let note = Note {
            id: Uuid::new_v4(),
            deal_id: new.deal_id,
            author_id: new.author_id,
            content: new.content,
            created_at: t.tick(),
        };
        t.notes.push(note.clone());
        Ok(note)
    }

    async fn list_for_deal(&self, deal_id: Uuid) -> RepoResult<Vec<Note>> {
        let mut rows: Vec<Note> = self
            .lock()
            .notes
            .iter()
            .filter(|n| n.deal_id == deal_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }
}

#[async_trait]
impl ActivityRepository for MemoryStore {
    async fn create(&self, new: NewActivity) -> RepoResult<Activity> {
        let mut t = self.lock();
        let deal_ok = new
            .deal_id
            .map_or(true, |deal| t.deals.iter().any(|d| d.id == deal));
        if !deal_ok || !t.users.iter().any(|u| u.id == new.user_id) {
            return Err(RepoError::Constraint("referenced record missing".into()));
        }
        let now = t.tick();
        let activity = Activity {
            id: Uuid::new_v4(),
            kind: new.kind,
            subject: new.subject,
            description: new.description,
            due_date: new.due_date,
            completed: false,
            deal_id: new.deal_id,
            user_id: new.user_id,
            created_at: now,
            updated_at: now,
        };
        t.activities.push(activity.clone());
        Ok(activity)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Activity>> {
        Ok(self.lock().activities.iter().find(|a| a.id == id).cloned())
    }

    async fn list(&self, filter: &ActivityFilter) -> RepoResult<Paginated<Activity>> {
        let mut rows: Vec<Activity> = self
            .lock()
            .activities
            .iter()
            .filter(|a| filter.user_id.map_or(true, |u| a.user_id == u))
            .filter(|a| filter.deal_id.map_or(true, |d| a.deal_id == Some(d)))
            .filter(|a| filter.completed.map_or(true, |c| a.completed == c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, filter.page))
    }

    async fn list_for_deal(&self, deal_id: Uuid) -> RepoResult<Vec<Activity>> {
        let mut rows: Vec<Activity> = self
            .lock()
            .activities
            .iter()
            .filter(|a| a.deal_id == Some(deal_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn update(&self, id: Uuid, changes: ActivityChanges) -> RepoResult<Option<Activity>> {
        let mut t = self.lock();
        let now = t.tick();
        let Some(a) = t.activities.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        if let Some(v) = changes.subject {
            a.subject = v;
        }
        if let Some(v) = changes.description {
            a.description = Some(v);
        }
        if let Some(v) = changes.due_date {
            a.due_date = Some(v);
        }
        if let Some(v) = changes.completed {
            a.completed = v;
        }
        a.updated_at = now;
        Ok(Some(a.clone()))
    }

    async fn recent(&self, limit: i64) -> RepoResult<Vec<Activity>> {
        let mut rows: Vec<Activity> = self.lock().activities.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}
