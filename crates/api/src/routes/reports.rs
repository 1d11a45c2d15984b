//! Sales reports (admin only).

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use common::OrderState;
use reporting::{ReportQuery, SalesReport};
use serde::Deserialize;
use store::Store;

use super::{ApiResult, ok};
use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

pub fn router<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new().route("/sales", get(sales::<S>))
}

/// `?from=&to=&states=Confirmed,Delivered`. Bounds are RFC 3339 timestamps
/// or plain dates; a plain `to` date covers the whole day.
#[derive(Debug, Deserialize)]
pub struct SalesParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub states: Option<String>,
}

fn parse_bound(name: &str, raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest(format!(
            "Invalid {name} '{raw}': expected YYYY-MM-DD or an RFC 3339 timestamp"
        ))
    })?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN)
    } else {
        NaiveTime::MIN
    };
    Ok(date.and_time(time).and_utc())
}

fn parse_states(raw: &str) -> Result<Vec<OrderState>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<OrderState>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))
        })
        .collect()
}

impl SalesParams {
    pub fn into_query(self) -> Result<ReportQuery, ApiError> {
        let mut query = ReportQuery::new();
        if let Some(from) = self.from.as_deref().filter(|s| !s.trim().is_empty()) {
            query = query.from(parse_bound("from", from, false)?);
        }
        if let Some(to) = self.to.as_deref().filter(|s| !s.trim().is_empty()) {
            query = query.to(parse_bound("to", to, true)?);
        }
        if let Some(states) = self.states.as_deref() {
            query = query.states(parse_states(states)?);
        }
        Ok(query)
    }
}

/// GET /api/v1/reports/sales
#[tracing::instrument(skip(state))]
pub async fn sales<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    params: Result<Query<SalesParams>, QueryRejection>,
) -> ApiResult<SalesReport> {
    auth.require_admin()?;
    let Query(params) = params?;
    let query = params.into_query()?;
    ok(state.reports.report(&query).await?)
}
