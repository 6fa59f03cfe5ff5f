use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use nzbdav_common::{DavItemId, Error, ItemType, PostProcessing, Priority, QueueItemId};
use nzbdav_db::get_conn;
use nzbdav_db::queries::{history, items, queue};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{AppContext, AppError};
use crate::queue::NewJob;

type ApiResult<T> = std::result::Result<T, AppError>;

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/queue", get(list_queue).post(add_nzb))
        .route("/queue/current", get(current_job))
        .route("/queue/:id", delete(remove_queue_item))
        .route("/history", get(list_history))
        .route("/items/:id/health", get(item_health))
        .route("/config", get(get_config).put(update_config))
}

#[derive(Deserialize)]
struct AddNzbQuery {
    name: String,
    category: String,
    priority: Option<String>,
    pp: Option<String>,
}

#[derive(Serialize)]
struct AddNzbResponse {
    id: QueueItemId,
    job_name: String,
}

async fn add_nzb(
    State(ctx): State<AppContext>,
    Query(params): Query<AddNzbQuery>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let priority = match params.priority.as_deref() {
        Some(p) => p.parse::<Priority>()?,
        None => Priority::Default,
    };
    let post_processing = match params.pp.as_deref() {
        Some(pp) => pp.parse::<PostProcessing>()?,
        None => PostProcessing::Default,
    };

    let item = ctx.queue.add_nzb(NewJob {
        nzb: &body,
        file_name: &params.name,
        category: &params.category,
        priority,
        post_processing,
    })?;

    Ok((
        StatusCode::CREATED,
        Json(AddNzbResponse {
            id: item.id,
            job_name: item.job_name,
        }),
    ))
}

async fn list_queue(State(ctx): State<AppContext>) -> ApiResult<impl IntoResponse> {
    let conn = get_conn(&ctx.db)?;
    Ok(Json(queue::list_queue_items(&conn)?))
}

async fn current_job(State(ctx): State<AppContext>) -> impl IntoResponse {
    match ctx.queue.current().await {
        Some(job) => Json(job).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn remove_queue_item(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id: QueueItemId = id
        .parse()
        .map_err(|_| Error::invalid_input(format!("invalid queue item id `{id}`")))?;
    ctx.queue.remove_queue_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

async fn list_history(
    State(ctx): State<AppContext>,
    Query(params): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let conn = get_conn(&ctx.db)?;
    Ok(Json(history::list_history_items(
        &conn,
        params.limit.unwrap_or(100),
    )?))
}

#[derive(Serialize)]
struct HealthResponse {
    id: DavItemId,
    healthy: bool,
}

/// Check that every segment of a plain file is still on the provider.
async fn item_health(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<HealthResponse>> {
    let id: DavItemId = id
        .parse()
        .map_err(|_| Error::invalid_input(format!("invalid item id `{id}`")))?;

    let segment_ids = {
        let conn = get_conn(&ctx.db)?;
        let item = items::get_item(&conn, id)?.ok_or_else(|| Error::not_found(format!("item {id}")))?;
        if item.item_type != ItemType::NzbFile {
            return Err(Error::invalid_input(format!("{} is not a plain file", item.name)).into());
        }
        items::get_nzb_file(&conn, id)?
            .ok_or_else(|| Error::not_found(format!("segments of {id}")))?
            .segment_ids
    };

    // Stops the checks if the client goes away.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let healthy = ctx.usenet.check_file_health(&segment_ids, &cancel).await?;
    if !healthy {
        tracing::warn!(item = %id, "item has missing segments");
    }
    Ok(Json(HealthResponse { id, healthy }))
}

async fn get_config(State(ctx): State<AppContext>) -> impl IntoResponse {
    let mut values = ctx.config.snapshot();
    if let Some(pass) = values.get_mut(crate::config::manager::USENET_PASS) {
        if !pass.is_empty() {
            *pass = "********".to_string();
        }
    }
    Json(values)
}

async fn update_config(
    State(ctx): State<AppContext>,
    Json(values): Json<HashMap<String, String>>,
) -> ApiResult<StatusCode> {
    ctx.config.update_values(values.into_iter().collect())?;
    Ok(StatusCode::NO_CONTENT)
}
