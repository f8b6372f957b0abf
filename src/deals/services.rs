use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    db::RepoError,
    deals::{
        dto::{CreateDealRequest, CreateNoteRequest, DealDetails, ListDealsQuery, UpdateDealRequest},
        repo_types::{Deal, DealChanges, DealFilter, DealStage, DealStats, NewDeal, NewNote, Note},
    },
    error::{AppError, AppResult},
    pagination::{PageRequest, Paginated},
    state::AppState,
};

fn deal_not_found(id: Uuid) -> AppError {
    AppError::not_found(format!("Deal with ID {id} not found"))
}

async fn ensure_assignee(state: &AppState, user_id: Uuid) -> AppResult<()> {
    if state.users.find_by_id(user_id).await?.is_none() {
        warn!(%user_id, "deal assignee does not exist");
        return Err(AppError::validation(format!("Assignee {user_id} does not exist")));
    }
    Ok(())
}

fn reference_error(e: RepoError) -> AppError {
    match e {
        RepoError::Constraint(msg) => AppError::validation(msg),
        other => other.into(),
    }
}

pub async fn create(state: &AppState, req: CreateDealRequest) -> AppResult<Deal> {
    if state.customers.find_by_id(req.customer_id).await?.is_none() {
        warn!(customer_id = %req.customer_id, "deal customer does not exist");
        return Err(AppError::validation(format!(
            "Customer {} does not exist",
            req.customer_id
        )));
    }
    ensure_assignee(state, req.assigned_to).await?;

    let deal = state
        .deals
        .create(NewDeal {
            title: req.title,
            value: req.value.round_dp(2),
            currency: req.currency.unwrap_or_else(|| "USD".into()),
            stage: req.stage.unwrap_or_default(),
            probability: req.probability.unwrap_or(0),
            customer_id: req.customer_id,
            assigned_to: req.assigned_to,
            expected_close_date: req.expected_close_date,
        })
        .await
        .map_err(reference_error)?;

    info!(deal_id = %deal.id, customer_id = %deal.customer_id, "deal created");
    Ok(deal)
}

pub async fn list(state: &AppState, q: ListDealsQuery) -> AppResult<Paginated<Deal>> {
    let filter = DealFilter {
        stage: q.stage,
        assigned_to: q.assigned_to,
        customer_id: q.customer_id,
        min_value: q.min_value,
        max_value: q.max_value,
        page: PageRequest::new(q.page, q.limit),
    };
    Ok(state.deals.list(&filter).await?)
}

pub async fn find_one(state: &AppState, id: Uuid) -> AppResult<DealDetails> {
    let deal = state
        .deals
        .find_by_id(id)
        .await?
        .ok_or_else(|| deal_not_found(id))?;
    let notes = state.notes.list_for_deal(id).await?;
    let activities = state.activities.list_for_deal(id).await?;
    Ok(DealDetails {
        deal,
        notes,
        activities,
    })
}

pub async fn update(state: &AppState, id: Uuid, req: UpdateDealRequest) -> AppResult<Deal> {
    if let Some(assignee) = req.assigned_to {
        ensure_assignee(state, assignee).await?;
    }
    let changes = DealChanges {
        title: req.title,
        value: req.value.map(|v| v.round_dp(2)),
        currency: req.currency,
        stage: req.stage,
        probability: req.probability,
        assigned_to: req.assigned_to,
        expected_close_date: req.expected_close_date,
    };
    let deal = state
        .deals
        .update(id, changes)
        .await
        .map_err(reference_error)?
        .ok_or_else(|| deal_not_found(id))?;
    info!(deal_id = %id, stage = deal.stage.as_str(), "deal updated");
    Ok(deal)
}

pub async fn remove(state: &AppState, id: Uuid) -> AppResult<()> {
    if !state.deals.delete(id).await? {
        return Err(deal_not_found(id));
    }
    info!(deal_id = %id, "deal deleted");
    Ok(())
}

/// Totals across all deals; `byStage` lists every stage, zero included.
pub async fn stats(state: &AppState) -> AppResult<DealStats> {
    let summary = state.deals.stage_summary().await?;

    let mut by_stage: BTreeMap<DealStage, i64> =
        DealStage::ALL.iter().map(|s| (*s, 0)).collect();
    let mut total = 0i64;
    let mut total_value = Decimal::ZERO;
    for row in summary {
        by_stage.insert(row.stage, row.count);
        total += row.count;
        total_value += row.value;
    }
    let average_value = if total == 0 {
        Decimal::ZERO
    } else {
        (total_value / Decimal::from(total)).round_dp(2)
    };

    Ok(DealStats {
        total,
        total_value,
        by_stage,
        average_value,
    })
}

pub async fn add_note(
    state: &AppState,
    deal_id: Uuid,
    author_id: Uuid,
    req: CreateNoteRequest,
) -> AppResult<Note> {
    if state.deals.find_by_id(deal_id).await?.is_none() {
        return Err(deal_not_found(deal_id));
    }
    let note = state
        .notes
        .create(NewNote {
            deal_id,
            author_id,
            content: req.content,
        })
        .await?;
    info!(deal_id = %deal_id, note_id = %note.id, "note added");
    Ok(note)
}

pub async fn notes(state: &AppState, deal_id: Uuid) -> AppResult<Vec<Note>> {
    if state.deals.find_by_id(deal_id).await?.is_none() {
        return Err(deal_not_found(deal_id));
    }
    Ok(state.notes.list_for_deal(deal_id).await?)
}
