//! Request handlers.

use crate::error::ApiError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::PathBuf;
use tabulookup_core::{
    parse_filters, AnalyticsSummary, Dataset, DatasetId, FilterableColumns, LookupService,
    QueryLog, QueryResponse, SetConfigResponse, SheetConfigUpdate, SheetConfiguration, SheetList,
};

/// Header carrying the name of the requesting user, if the deployment
/// authenticates in front of the server.
pub const USER_HEADER: &str = "x-user";

type ApiResult<T> = Result<Json<T>, ApiError>;

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn dataset_id(raw: &str) -> Result<DatasetId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid file ID: {raw}")))
}

#[derive(Debug, Deserialize)]
pub struct SheetsParams {
    file_id: Option<String>,
}

pub async fn get_sheets(
    State(service): State<LookupService>,
    Query(params): Query<SheetsParams>,
) -> ApiResult<SheetList> {
    let file_id =
        required(params.file_id).ok_or_else(|| ApiError::bad_request("File ID is required"))?;
    let id = dataset_id(&file_id)?;
    Ok(Json(service.list_enabled_sheets(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ColumnsParams {
    file_id: Option<String>,
    sheet_name: Option<String>,
}

pub async fn get_columns(
    State(service): State<LookupService>,
    Query(params): Query<ColumnsParams>,
) -> ApiResult<FilterableColumns> {
    let (Some(file_id), Some(sheet_name)) = (required(params.file_id), required(params.sheet_name))
    else {
        return Err(ApiError::bad_request("File ID and sheet name are required"));
    };
    let id = dataset_id(&file_id)?;
    Ok(Json(service.filterable_columns(id, &sheet_name).await?))
}

#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    file_id: Option<String>,
    sheet_name: Option<String>,
    #[serde(default)]
    filters: IndexMap<String, serde_json::Value>,
}

pub async fn fetch_results(
    State(service): State<LookupService>,
    headers: HeaderMap,
    payload: Result<Json<FetchRequest>, JsonRejection>,
) -> ApiResult<QueryResponse> {
    let Json(request) = payload.map_err(|_| ApiError::bad_request("Invalid JSON data"))?;
    let (Some(file_id), Some(sheet_name)) =
        (required(request.file_id), required(request.sheet_name))
    else {
        return Err(ApiError::bad_request("File ID and sheet name are required"));
    };
    let id = dataset_id(&file_id)?;
    let filters = parse_filters(request.filters)?;
    let user = headers.get(USER_HEADER).and_then(|v| v.to_str().ok());

    Ok(Json(service.query(id, &sheet_name, &filters, user).await?))
}

// ===== Administration =====

pub async fn list_datasets(State(service): State<LookupService>) -> Json<Vec<Dataset>> {
    Json(service.datasets().await)
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    name: String,
    #[serde(default)]
    description: String,
    path: PathBuf,
}

pub async fn register_dataset(
    State(service): State<LookupService>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Dataset>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let dataset = service
        .register(&request.name, &request.description, request.path)
        .await?;
    Ok((StatusCode::CREATED, Json(dataset)))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    remove_file: bool,
}

pub async fn delete_dataset(
    State(service): State<LookupService>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<Dataset> {
    let id = dataset_id(&id)?;
    Ok(Json(service.delete(id, params.remove_file).await?))
}

pub async fn toggle_dataset(
    State(service): State<LookupService>,
    Path(id): Path<String>,
) -> ApiResult<Dataset> {
    let id = dataset_id(&id)?;
    Ok(Json(service.toggle_active(id).await?))
}

pub async fn get_sheet_config(
    State(service): State<LookupService>,
    Path((id, sheet)): Path<(String, String)>,
) -> ApiResult<SheetConfiguration> {
    let id = dataset_id(&id)?;
    Ok(Json(service.sheet_config(id, &sheet).await?))
}

pub async fn set_sheet_config(
    State(service): State<LookupService>,
    Path((id, sheet)): Path<(String, String)>,
    payload: Result<Json<SheetConfigUpdate>, JsonRejection>,
) -> ApiResult<SetConfigResponse> {
    let id = dataset_id(&id)?;
    let Json(update) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    Ok(Json(service.set_sheet_config(id, &sheet, update).await?))
}

// ===== Analytics =====

pub async fn analytics(State(service): State<LookupService>) -> ApiResult<AnalyticsSummary> {
    Ok(Json(service.analytics().await?))
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    limit: Option<usize>,
}

pub async fn recent_queries(
    State(service): State<LookupService>,
    Query(params): Query<RecentParams>,
) -> ApiResult<Vec<QueryLog>> {
    Ok(Json(service.recent_queries(params.limit.unwrap_or(100)).await?))
}
