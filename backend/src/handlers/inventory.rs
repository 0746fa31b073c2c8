//! HTTP handlers for stage ledger endpoints

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::models::{
    ApiResponse, DeleteOutcome, ExportFormat, HistoryEntry, InventoryRecord, LedgerKey,
    RecordFilter, Stage, StageInfo, TransferOutcome,
};
use crate::services::{AddStockInput, DeleteItemInput, RemoveStockInput, ReturnToNextStageInput};
use crate::AppState;

/// Add stock to a stage ledger
pub async fn add_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<AddStockInput>,
) -> AppResult<Json<ApiResponse<InventoryRecord>>> {
    let record = state.ledger.add(&current_user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok("Stock added", record)))
}

/// Remove stock from a stage ledger
pub async fn remove_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<RemoveStockInput>,
) -> AppResult<Json<ApiResponse<InventoryRecord>>> {
    let record = state.ledger.remove(&current_user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok("Stock removed", record)))
}

/// Move stock into the next stage
pub async fn return_to_next_stage(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ReturnToNextStageInput>,
) -> AppResult<Json<ApiResponse<TransferOutcome>>> {
    let outcome = state
        .ledger
        .return_to_next_stage(&current_user.0.user_id, input)
        .await?;
    let message = format!("Stock returned to {}", outcome.destination.stage);
    Ok(Json(ApiResponse::ok(message, outcome)))
}

/// Delete some or all of an inventory item
pub async fn delete_inventory_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(record_id): Path<Uuid>,
    Json(input): Json<DeleteItemInput>,
) -> AppResult<Json<ApiResponse<DeleteOutcome>>> {
    let outcome = state
        .ledger
        .delete_inventory_item(&current_user.0.user_id, record_id, input)
        .await?;
    let message = if outcome.deleted {
        "Inventory item deleted"
    } else {
        "Inventory item reduced"
    };
    Ok(Json(ApiResponse::ok(message, outcome)))
}

/// List inventory records
pub async fn list_inventory(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<RecordFilter>,
) -> AppResult<Json<ApiResponse<Vec<InventoryRecord>>>> {
    let records = state.ledger.list(&filter).await?;
    let message = format!("{} records", records.len());
    Ok(Json(ApiResponse::ok(message, records)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupQuery {
    pub stage: Stage,
    pub owner_id: String,
    pub item_ref: String,
}

/// Get the record for (stage, owner, item)
pub async fn lookup_inventory(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<LookupQuery>,
) -> AppResult<Json<ApiResponse<InventoryRecord>>> {
    let key = LedgerKey::new(query.stage, query.owner_id, query.item_ref);
    let record = state.ledger.find(&key).await?;
    Ok(Json(ApiResponse::ok("Inventory record", record)))
}

/// Get an inventory record by id
pub async fn get_inventory_record(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(record_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<InventoryRecord>>> {
    let record = state.ledger.get(record_id).await?;
    Ok(Json(ApiResponse::ok("Inventory record", record)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

/// Get the history of a record, as JSON or CSV
pub async fn get_inventory_history(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(record_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Response> {
    let entries = state.ledger.history(record_id).await?;

    match query.format {
        ExportFormat::Csv => {
            let csv = export_to_csv(&entries)?;
            let disposition = format!("attachment; filename=\"history_{}.csv\"", record_id);
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                csv,
            )
                .into_response())
        }
        ExportFormat::Json => {
            let message = format!("{} history entries", entries.len());
            Ok(Json(ApiResponse::<Vec<HistoryEntry>>::ok(message, entries)).into_response())
        }
    }
}

/// List the workflow stages in order
pub async fn list_stages() -> Json<ApiResponse<Vec<StageInfo>>> {
    let stages = Stage::ALL.into_iter().map(StageInfo::from).collect();
    Json(ApiResponse::ok("Workflow stages", stages))
}

/// Serialize rows as CSV with a header line
pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in data {
        wtr.serialize(record)
            .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
}
