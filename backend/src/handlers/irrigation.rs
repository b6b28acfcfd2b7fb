//! HTTP handlers for irrigation decisions

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use shared::{BatchReport, FieldId, FieldScope, IrrigationDecision, PlantType, UserId, PLANT_CATALOG};

use crate::error::AppResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ScopeQuery {
    pub owner_id: Option<UserId>,
}

impl From<ScopeQuery> for FieldScope {
    fn from(query: ScopeQuery) -> Self {
        match query.owner_id {
            Some(owner) => FieldScope::Owner(owner),
            None => FieldScope::All,
        }
    }
}

/// Decide the pump action for one field
pub async fn decide_field_irrigation(
    State(state): State<AppState>,
    Path(field_id): Path<FieldId>,
) -> AppResult<Json<IrrigationDecision>> {
    let decision = state.irrigation.decide_irrigation(field_id).await?;
    Ok(Json(decision))
}

/// Decide every field, optionally restricted to one owner
pub async fn decide_all_irrigation(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> AppResult<Json<BatchReport<IrrigationDecision>>> {
    let report = state.irrigation.decide_all(query.into()).await?;
    Ok(Json(report))
}

/// Built-in plant threshold presets
pub async fn list_plant_types() -> Json<&'static [PlantType]> {
    Json(PLANT_CATALOG)
}
