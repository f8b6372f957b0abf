use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::dto::normalize_email,
    calendar,
    customers::{
        dto::{
            split_tags, CreateCustomerRequest, CreateInteractionRequest, CustomerDetails,
            ListCustomersQuery, UpdateCustomerRequest,
        },
        repo_types::{
            Customer, CustomerChanges, CustomerFilter, CustomerStats, Interaction, NewCustomer,
            NewInteraction,
        },
    },
    db::RepoError,
    error::{AppError, AppResult},
    pagination::{PageRequest, Paginated},
    state::AppState,
};

fn customer_not_found(id: Uuid) -> AppError {
    AppError::not_found(format!("Customer with ID {id} not found"))
}

fn duplicate_email() -> AppError {
    AppError::conflict("Customer with this email already exists")
}

pub async fn create(state: &AppState, req: CreateCustomerRequest) -> AppResult<Customer> {
    let email = normalize_email(&req.email);
    if state.customers.find_by_email(&email).await?.is_some() {
        warn!(%email, "customer email already exists");
        return Err(duplicate_email());
    }

    let customer = state
        .customers
        .create(NewCustomer {
            email,
            first_name: req.first_name,
            last_name: req.last_name,
            company: req.company,
            phone: req.phone,
            address: req.address,
            tags: req.tags,
        })
        .await
        .map_err(|e| match e {
            RepoError::Duplicate(_) => duplicate_email(),
            other => other.into(),
        })?;

    info!(customer_id = %customer.id, "customer created");
    Ok(customer)
}

pub async fn list(state: &AppState, q: ListCustomersQuery) -> AppResult<Paginated<Customer>> {
    let filter = CustomerFilter {
        search: q.search.filter(|s| !s.trim().is_empty()),
        tags: split_tags(q.tags.as_deref()),
        min_score: q.min_score,
        max_score: q.max_score,
        company: q.company.filter(|s| !s.trim().is_empty()),
        sort_by: q.sort_by.unwrap_or_default(),
        sort_order: q.sort_order.unwrap_or_default(),
        page: PageRequest::new(q.page, q.limit),
    };
    Ok(state.customers.list(&filter).await?)
}

pub async fn find_one(state: &AppState, id: Uuid) -> AppResult<CustomerDetails> {
    let customer = state
        .customers
        .find_by_id(id)
        .await?
        .ok_or_else(|| customer_not_found(id))?;
    let deals = state.deals.list_for_customer(id).await?;
    let interactions = state.interactions.list_for_customer(id).await?;
    Ok(CustomerDetails {
        customer,
        deals,
        interactions,
    })
}

pub async fn update(
    state: &AppState,
    id: Uuid,
    req: UpdateCustomerRequest,
) -> AppResult<Customer> {
    let email = req.email.as_deref().map(normalize_email);
    if let Some(email) = email.as_deref() {
        if let Some(existing) = state.customers.find_by_email(email).await? {
            if existing.id != id {
                warn!(%email, customer_id = %id, "customer email already exists");
                return Err(duplicate_email());
            }
        }
    }

    let changes = CustomerChanges {
        email,
        first_name: req.first_name,
        last_name: req.last_name,
        company: req.company,
        phone: req.phone,
        address: req.address,
        tags: req.tags,
        score: req.score,
    };
    let customer = state
        .customers
        .update(id, changes)
        .await
        .map_err(|e| match e {
            RepoError::Duplicate(_) => duplicate_email(),
            other => other.into(),
        })?
        .ok_or_else(|| customer_not_found(id))?;

    info!(customer_id = %id, "customer updated");
    Ok(customer)
}

pub async fn remove(state: &AppState, id: Uuid) -> AppResult<()> {
    match state.customers.delete(id).await {
        Ok(true) => {
            info!(customer_id = %id, "customer deleted");
            Ok(())
        }
        Ok(false) => Err(customer_not_found(id)),
        Err(RepoError::Constraint(_)) => {
            warn!(customer_id = %id, "customer delete blocked by deals");
            Err(AppError::conflict("Customer has deals and cannot be deleted"))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn update_score(state: &AppState, id: Uuid, score: i32) -> AppResult<Customer> {
    let changes = CustomerChanges {
        score: Some(score),
        ..Default::default()
    };
    let customer = state
        .customers
        .update(id, changes)
        .await?
        .ok_or_else(|| customer_not_found(id))?;
    info!(customer_id = %id, score, "customer score updated");
    Ok(customer)
}

/// Sums the customer's closed-won deals and stores the result on the customer.
pub async fn calculate_lifetime_value(state: &AppState, id: Uuid) -> AppResult<Decimal> {
    if state.customers.find_by_id(id).await?.is_none() {
        return Err(customer_not_found(id));
    }
    let total = state.deals.closed_won_total_for_customer(id).await?;
    if !state.customers.set_lifetime_value(id, total).await? {
        return Err(customer_not_found(id));
    }
    info!(customer_id = %id, lifetime_value = %total, "lifetime value recalculated");
    Ok(total)
}

pub async fn stats(state: &AppState, now: OffsetDateTime) -> AppResult<CustomerStats> {
    let month_start = calendar::at_midnight_utc(calendar::month_start(now.date()));
    Ok(state.customers.stats(month_start).await?)
}

pub async fn record_interaction(
    state: &AppState,
    customer_id: Uuid,
    user_id: Uuid,
    req: CreateInteractionRequest,
) -> AppResult<Interaction> {
    if state.customers.find_by_id(customer_id).await?.is_none() {
        return Err(customer_not_found(customer_id));
    }
    let interaction = state
        .interactions
        .create(NewInteraction {
            customer_id,
            user_id,
            kind: req.kind,
            channel: req.channel,
            subject: req.subject,
            content: req.content,
            sentiment: req.sentiment,
        })
        .await?;
    info!(customer_id = %customer_id, interaction_id = %interaction.id, "interaction recorded");
    Ok(interaction)
}

pub async fn interactions(state: &AppState, customer_id: Uuid) -> AppResult<Vec<Interaction>> {
    if state.customers.find_by_id(customer_id).await?.is_none() {
        return Err(customer_not_found(customer_id));
    }
    Ok(state.interactions.list_for_customer(customer_id).await?)
}
