use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::{ApiError, ApiResult};
use super::extract::{JsonBody, PathParam, QueryParams, TenantEngine};
use crate::limits::MAX_STAY_NIGHTS;
use crate::model::Stay;
use crate::rules::{Condition, ConditionType, DateType, FilterDraft, Rule, RuleId};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/filters", get(list_filters).post(create_filter))
        .route("/filters/applicable", get(applicable_filters))
        .route(
            "/filters/{id}",
            get(get_filter).put(update_filter).delete(delete_filter),
        )
}

/// Flat wire shape of a rule; kind-specific fields are omitted when unused.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResponse {
    pub id: RuleId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub activated: bool,
    pub increment: bool,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    pub date_type: DateType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_days: Option<String>,
    pub condition_type: ConditionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anticipation_hours: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_days: Option<u32>,
}

impl From<Rule> for FilterResponse {
    fn from(rule: Rule) -> Self {
        let window = rule.applicability.window();
        let (anticipation_hours, min_days) = match rule.condition {
            Condition::None => (None, None),
            Condition::LastMinute { anticipation_hours } => (Some(anticipation_hours), None),
            Condition::LongStay { min_days } => (None, Some(min_days)),
        };
        Self {
            id: rule.id,
            date_type: rule.applicability.date_type(),
            start_date: window.map(|w| w.first),
            end_date: window.map(|w| w.last),
            week_days: rule.applicability.week_days().map(|d| d.to_string()),
            condition_type: rule.condition.condition_type(),
            anticipation_hours,
            min_days,
            name: rule.name,
            description: rule.description,
            activated: rule.activated,
            increment: rule.increment,
            value: rule.value,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StayQuery {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicableFiltersResponse {
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub total_nights: u32,
    pub filters_by_date: BTreeMap<NaiveDate, Vec<FilterResponse>>,
}

async fn create_filter(
    TenantEngine(engine): TenantEngine,
    JsonBody(draft): JsonBody<FilterDraft>,
) -> ApiResult<(StatusCode, Json<FilterResponse>)> {
    let rule = engine.create_filter(draft).await?;
    Ok((StatusCode::CREATED, Json(rule.into())))
}

async fn update_filter(
    TenantEngine(engine): TenantEngine,
    PathParam(id): PathParam<RuleId>,
    JsonBody(draft): JsonBody<FilterDraft>,
) -> ApiResult<Json<FilterResponse>> {
    Ok(Json(engine.update_filter(id, draft).await?.into()))
}

async fn delete_filter(
    TenantEngine(engine): TenantEngine,
    PathParam(id): PathParam<RuleId>,
) -> ApiResult<StatusCode> {
    engine.delete_filter(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_filter(
    TenantEngine(engine): TenantEngine,
    PathParam(id): PathParam<RuleId>,
) -> ApiResult<Json<FilterResponse>> {
    Ok(Json(engine.get_filter(id).await?.into()))
}

async fn list_filters(TenantEngine(engine): TenantEngine) -> Json<Vec<FilterResponse>> {
    Json(engine.list_filters().await.into_iter().map(Into::into).collect())
}

async fn applicable_filters(
    TenantEngine(engine): TenantEngine,
    QueryParams(q): QueryParams<StayQuery>,
) -> ApiResult<Json<ApplicableFiltersResponse>> {
    let now = Utc::now();
    let stay = Stay::checked(q.check_in, q.check_out)
        .ok_or_else(|| ApiError::Validation("checkOut must be after checkIn".into()))?;
    if stay.start < now.date_naive() {
        return Err(ApiError::Validation("checkIn must not be in the past".into()));
    }
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(ApiError::Validation(format!("stay must not exceed {MAX_STAY_NIGHTS} nights")));
    }

    let nightly = engine.applicable_filters(&stay, now).await;
    Ok(Json(ApplicableFiltersResponse {
        check_in_date: stay.start,
        check_out_date: stay.end,
        total_nights: nightly.total_nights,
        filters_by_date: nightly
            .by_night
            .into_iter()
            .map(|(night, rules)| (night, rules.into_iter().map(Into::into).collect()))
            .collect(),
    }))
}
