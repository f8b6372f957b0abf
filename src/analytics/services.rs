use std::collections::HashMap;

use rust_decimal::{prelude::ToPrimitive, Decimal};
use time::{Date, OffsetDateTime};
use tracing::debug;

use crate::{
    analytics::dto::{Dashboard, Kpis, PipelineSlice, RecentActivity, RevenuePoint},
    calendar,
    deals::repo_types::DealStage,
    error::AppResult,
    state::AppState,
};

const TREND_MONTHS: usize = 12;
const RECENT_ACTIVITY_LIMIT: i64 = 10;

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Percentage change from `previous` to `current`; `None` when there is no base.
fn pct_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some(round2((current - previous) / previous * 100.0))
    }
}

/// won / (won + lost) as a percentage; 0 with no closed deals.
fn conversion_rate(won: i64, lost: i64) -> f64 {
    let closed = won + lost;
    if closed == 0 {
        0.0
    } else {
        round2(won as f64 / closed as f64 * 100.0)
    }
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or_default()
}

pub async fn dashboard(state: &AppState, now: OffsetDateTime) -> AppResult<Dashboard> {
    let today = now.date();
    let current = calendar::month_start(today);
    let previous = calendar::previous_month(today);
    let cur_from = calendar::at_midnight_utc(current);
    let cur_to = calendar::at_midnight_utc(calendar::next_month(today));
    let prev_from = calendar::at_midnight_utc(previous);

    // pipeline and totals
    let summary = state.deals.stage_summary().await?;
    let count_of = |stage: DealStage| {
        summary
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.count)
            .unwrap_or(0)
    };
    let revenue = summary
        .iter()
        .find(|s| s.stage == DealStage::ClosedWon)
        .map(|s| s.value)
        .unwrap_or(Decimal::ZERO);
    let pipeline_chart = DealStage::ALL
        .iter()
        .map(|stage| PipelineSlice {
            name: stage.label(),
            value: count_of(*stage),
        })
        .collect();

    // 12-month won revenue trend
    let months = calendar::trailing_months(today, TREND_MONTHS);
    let since = calendar::at_midnight_utc(months[0]);
    let by_month: HashMap<_, _> = state
        .deals
        .won_revenue_by_month(since)
        .await?
        .into_iter()
        .map(|m| (m.month, m.revenue))
        .collect();
    let revenue_in = |month: Date| by_month.get(&month).copied().unwrap_or(Decimal::ZERO);
    let revenue_chart = months
        .iter()
        .map(|m| RevenuePoint {
            month: calendar::month_label(*m),
            revenue: revenue_in(*m),
        })
        .collect();

    // month-over-month
    let customers_total = state.customers.stats(cur_from).await?.total;
    let new_customers_cur = state.customers.count_created_between(cur_from, cur_to).await?;
    let new_customers_prev = state.customers.count_created_between(prev_from, cur_from).await?;
    let new_deals_cur = state.deals.count_created_between(cur_from, cur_to).await?;
    let new_deals_prev = state.deals.count_created_between(prev_from, cur_from).await?;
    let (won_cur, lost_cur) = state.deals.closed_counts_between(cur_from, cur_to).await?;
    let (won_prev, lost_prev) = state.deals.closed_counts_between(prev_from, cur_from).await?;

    let kpis = Kpis {
        revenue,
        revenue_change: pct_change(to_f64(revenue_in(previous)), to_f64(revenue_in(current))),
        customers: customers_total,
        customers_change: pct_change(new_customers_prev as f64, new_customers_cur as f64),
        active_deals: count_of(DealStage::Qualified),
        deals_change: pct_change(new_deals_prev as f64, new_deals_cur as f64),
        conversion_rate: conversion_rate(count_of(DealStage::ClosedWon), count_of(DealStage::ClosedLost)),
        conversion_change: pct_change(
            conversion_rate(won_prev, lost_prev),
            conversion_rate(won_cur, lost_cur),
        ),
    };

    let recent_activities = state
        .activities
        .recent(RECENT_ACTIVITY_LIMIT)
        .await?
        .into_iter()
        .map(RecentActivity::from)
        .collect();

    debug!(month = %calendar::month_label(current), "dashboard computed");
    Ok(Dashboard {
        kpis,
        revenue_chart,
        pipeline_chart,
        recent_activities,
    })
}
