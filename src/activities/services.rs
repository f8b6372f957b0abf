use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    activities::{
        dto::{CreateActivityRequest, ListActivitiesQuery, UpdateActivityRequest},
        repo_types::{Activity, ActivityChanges, ActivityFilter, NewActivity},
    },
    error::{AppError, AppResult},
    pagination::{PageRequest, Paginated},
    state::AppState,
};

fn activity_not_found(id: Uuid) -> AppError {
    AppError::not_found(format!("Activity with ID {id} not found"))
}

pub async fn create(
    state: &AppState,
    user_id: Uuid,
    req: CreateActivityRequest,
) -> AppResult<Activity> {
    if let Some(deal_id) = req.deal_id {
        if state.deals.find_by_id(deal_id).await?.is_none() {
            warn!(%deal_id, "activity deal does not exist");
            return Err(AppError::validation(format!("Deal {deal_id} does not exist")));
        }
    }
    let activity = state
        .activities
        .create(NewActivity {
            kind: req.kind,
            subject: req.subject,
            description: req.description,
            due_date: req.due_date,
            deal_id: req.deal_id,
            user_id,
        })
        .await?;
    info!(activity_id = %activity.id, %user_id, "activity created");
    Ok(activity)
}

/// The caller's own activities, newest first.
pub async fn list(
    state: &AppState,
    user_id: Uuid,
    q: ListActivitiesQuery,
) -> AppResult<Paginated<Activity>> {
    let filter = ActivityFilter {
        user_id: Some(user_id),
        deal_id: q.deal_id,
        completed: q.completed,
        page: PageRequest::new(q.page, q.limit),
    };
    Ok(state.activities.list(&filter).await?)
}

/// Someone else's activity is reported as missing.
pub async fn update(
    state: &AppState,
    user_id: Uuid,
    id: Uuid,
    req: UpdateActivityRequest,
) -> AppResult<Activity> {
    match state.activities.find_by_id(id).await? {
        Some(a) if a.user_id == user_id => {}
        _ => return Err(activity_not_found(id)),
    }
    let changes = ActivityChanges {
        subject: req.subject,
        description: req.description,
        due_date: req.due_date,
        completed: req.completed,
    };
    let activity = state
        .activities
        .update(id, changes)
        .await?
        .ok_or_else(|| activity_not_found(id))?;
    info!(activity_id = %id, completed = activity.completed, "activity updated");
    Ok(activity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::repo_types::ActivityType;
    use crate::customers::services::tests::seed_user;

    fn body(subject: &str) -> CreateActivityRequest {
        CreateActivityRequest {
            kind: ActivityType::Task,
            subject: subject.into(),
            description: None,
            due_date: None,
            deal_id: None,
        }
    }

    #[tokio::test]
    async fn list_is_scoped_to_caller_and_filterable() {
        let state = AppState::fake();
        let me = seed_user(&state).await;
        let other = seed_user(&state).await;

        let first = create(&state, me.id, body("first")).await.unwrap();
        create(&state, me.id, body("second")).await.unwrap();
        create(&state, other.id, body("theirs")).await.unwrap();

        let page = list(&state, me.id, ListActivitiesQuery::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.data[0].subject, "second");
        assert!(page.data.iter().all(|a| a.user_id == me.id));

        update(
            &state,
            me.id,
            first.id,
            UpdateActivityRequest {
                completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let done = list(
            &state,
            me.id,
            ListActivitiesQuery {
                completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(done.total, 1);
        assert_eq!(done.data[0].id, first.id);
        assert_eq!(done.data[0].subject, "first");
    }

    #[tokio::test]
    async fn cannot_update_someone_elses_activity() {
        let state = AppState::fake();
        let me = seed_user(&state).await;
        let other = seed_user(&state).await;
        let theirs = create(&state, other.id, body("theirs")).await.unwrap();

        let err = update(&state, me.id, theirs.id, UpdateActivityRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_deal_is_a_validation_error() {
        let state = AppState::fake();
        let me = seed_user(&state).await;
        let mut req = body("call");
        req.deal_id = Some(Uuid::new_v4());
        let err = create(&state, me.id, req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
