//! HTTP API
//!
//! JSON endpoints over the warehouse context:
//!
//! - `POST /api/schemas` - register a schema version
//! - `GET  /api/schemas` / `GET /api/schemas/:name` - inspect schemas
//! - `POST /api/ingest` - ingest a batch of rows
//! - `POST /api/query` - run a query spec, returns a `{data, metadata}`
//!   envelope
//! - `GET  /api/partitions/:layer` - list partitions (optionally by schema)
//! - `GET  /api/lineage/:partition_id` - derivation history
//! - `POST /api/promote` - promote a schema's partitions one layer
//! - `POST /api/optimize` - run a maintenance cycle on demand
//! - `GET  /health` - health report (503 when unhealthy)
//!
//! The Prometheus exporter runs on its own listener (see `main.rs`), so
//! scraping is isolated from API traffic.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use lakehouse_core::batch::Row;
use lakehouse_core::{BatchInput, DataPartition, DataSchema, IngestionConfig, LakeLayer};

use crate::error::WarehouseError;
use crate::query::QuerySpec;
use crate::warehouse::{HealthStatus, LakeWarehouse, OptimizeReport};

type ApiResult<T> = std::result::Result<T, WarehouseError>;

impl IntoResponse for WarehouseError {
    fn into_response(self) -> Response {
        let status = match &self {
            WarehouseError::SchemaValidation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WarehouseError::InvalidInput(_) | WarehouseError::InvalidPromotion(_) => {
                StatusCode::BAD_REQUEST
            }
            WarehouseError::MetadataStore(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": self.to_string(),
            "error_type": self.error_type(),
        });
        (status, Json(body)).into_response()
    }
}

/// Build the API router over a shared warehouse.
pub fn create_api_router(warehouse: Arc<LakeWarehouse>) -> Router {
    Router::new()
        .route("/api/schemas", get(list_schemas).post(register_schema))
        .route("/api/schemas/:name", get(get_schema))
        .route("/api/ingest", post(ingest))
        .route("/api/query", post(query))
        .route("/api/partitions/:layer", get(list_partitions))
        .route("/api/lineage/:partition_id", get(get_lineage))
        .route("/api/promote", post(promote))
        .route("/api/optimize", post(optimize))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(warehouse)
}

// ============================================================
// Schemas
// ============================================================

#[derive(Serialize)]
struct RegisterSchemaResponse {
    name: String,
    version: u32,
}

async fn register_schema(
    State(warehouse): State<Arc<LakeWarehouse>>,
    Json(schema): Json<DataSchema>,
) -> ApiResult<Json<RegisterSchemaResponse>> {
    let name = schema.name.clone();
    let version = warehouse.catalog().register_schema(&schema).await?;
    Ok(Json(RegisterSchemaResponse { name, version }))
}

async fn list_schemas(
    State(warehouse): State<Arc<LakeWarehouse>>,
) -> ApiResult<Json<Vec<DataSchema>>> {
    Ok(Json(warehouse.catalog().list_schemas().await?))
}

async fn get_schema(
    State(warehouse): State<Arc<LakeWarehouse>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    match warehouse.catalog().get_schema(&name).await? {
        Some(schema) => Ok(Json(schema).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("schema '{}' not found", name) })),
        )
            .into_response()),
    }
}

// ============================================================
// Ingestion
// ============================================================

#[derive(Deserialize)]
struct IngestRequest {
    config: IngestionConfig,
    rows: Vec<Row>,
}

#[derive(Serialize)]
struct IngestResponse {
    /// `null` for an empty batch (a no-op)
    partition_id: Option<String>,
    records: usize,
}

async fn ingest(
    State(warehouse): State<Arc<LakeWarehouse>>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<Json<IngestResponse>> {
    let records = request.rows.len();
    let partition_id = warehouse
        .ingest_batch(BatchInput::Rows(request.rows), &request.config)
        .await?;
    Ok(Json(IngestResponse {
        partition_id,
        records,
    }))
}

// ============================================================
// Query
// ============================================================

async fn query(
    State(warehouse): State<Arc<LakeWarehouse>>,
    Json(spec): Json<QuerySpec>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = warehouse.query(spec).await?;
    // The {data, metadata} envelope callers page with.
    Ok(Json(json!({
        "data": result.data.rows(),
        "metadata": {
            "record_count": result.record_count,
            "partitions_scanned": result.partitions_scanned,
            "elapsed_ms": result.elapsed_ms,
        }
    })))
}

// ============================================================
// Partitions & lineage
// ============================================================

#[derive(Deserialize)]
struct PartitionListParams {
    schema: Option<String>,
}

async fn list_partitions(
    State(warehouse): State<Arc<LakeWarehouse>>,
    Path(layer): Path<String>,
    Query(params): Query<PartitionListParams>,
) -> ApiResult<Json<Vec<DataPartition>>> {
    let layer = LakeLayer::parse(&layer)
        .ok_or_else(|| WarehouseError::InvalidInput(format!("unknown layer '{}'", layer)))?;
    let partitions = warehouse
        .catalog()
        .find_partitions(params.schema.as_deref(), layer, &BTreeMap::new())
        .await?;
    Ok(Json(partitions))
}

async fn get_lineage(
    State(warehouse): State<Arc<LakeWarehouse>>,
    Path(partition_id): Path<String>,
) -> ApiResult<Json<Vec<lakehouse_catalog::LineageRecord>>> {
    Ok(Json(warehouse.catalog().get_lineage(&partition_id).await?))
}

// ============================================================
// Maintenance & health
// ============================================================

#[derive(Deserialize)]
struct PromoteRequest {
    schema_name: String,
    from_layer: String,
}

async fn promote(
    State(warehouse): State<Arc<LakeWarehouse>>,
    Json(request): Json<PromoteRequest>,
) -> ApiResult<Json<Vec<String>>> {
    let from = LakeLayer::parse(&request.from_layer).ok_or_else(|| {
        WarehouseError::InvalidInput(format!("unknown layer '{}'", request.from_layer))
    })?;
    let promoted = warehouse
        .promote_partitions(&request.schema_name, from)
        .await?;
    Ok(Json(promoted))
}

async fn optimize(
    State(warehouse): State<Arc<LakeWarehouse>>,
) -> ApiResult<Json<OptimizeReport>> {
    Ok(Json(warehouse.optimize_storage().await?))
}

async fn health(State(warehouse): State<Arc<LakeWarehouse>>) -> Response {
    let report = warehouse.health().await;
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(report)).into_response()
}
