//! Transfer handlers
//!
//! Thin adapters: validate the body, convert to a coordinator request, map
//! the result into the unified envelope. The acting user always comes from
//! the [`Actor`] extension.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use validator::Validate;

use super::super::state::AppState;
use super::super::types::{
    Actor, ApiResult, ApproveTransferBody, CreateTransferBody, CreatedTransferData,
    DistributedItemsData, ItemsQuery, ListTransfersQuery, RejectTransferBody,
    TransferDetailData, TransferData, TransferListData, UpdateTransferBody, ok,
};
use crate::core_types::TransferId;

/// Create a transfer request
///
/// POST /api/v1/transfers
#[utoipa::path(
    post,
    path = "/api/v1/transfers",
    request_body = CreateTransferBody,
    responses(
        (status = 200, description = "Transfer created", body = CreatedTransferData, content_type = "application/json"),
        (status = 400, description = "Invalid body or lines"),
        (status = 401, description = "Missing x-user-id"),
        (status = 404, description = "Store not found")
    ),
    security(("actor" = [])),
    tag = "Transfer"
)]
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(body): Json<CreateTransferBody>,
) -> ApiResult<CreatedTransferData> {
    body.validate()?;
    let req = body.into_request()?;
    let transfer_id = state.coordinator.create(req, actor).await?;
    ok(CreatedTransferData { transfer_id })
}

/// List transfers, newest first
///
/// GET /api/v1/transfers
#[utoipa::path(
    get,
    path = "/api/v1/transfers",
    params(ListTransfersQuery),
    responses(
        (status = 200, description = "One page of transfers", body = TransferListData, content_type = "application/json")
    ),
    security(("actor" = [])),
    tag = "Transfer"
)]
pub async fn list_transfers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTransfersQuery>,
) -> ApiResult<TransferListData> {
    if let (Some(from), Some(to)) = (query.requested_from, query.requested_to)
        && from > to
    {
        return Err(super::super::types::ApiError::bad_request(
            "requested_from must not be after requested_to",
        ));
    }
    let paging = query.paging();
    let (transfers, total) = state
        .coordinator
        .list_transfers(&query.filter(), paging)
        .await?;
    ok(TransferListData {
        transfers: transfers.into_iter().map(TransferData::from).collect(),
        total,
        page: paging.page,
        page_size: paging.page_size,
    })
}

/// Transfer with stores and lines
///
/// GET /api/v1/transfers/{transfer_id}
#[utoipa::path(
    get,
    path = "/api/v1/transfers/{transfer_id}",
    params(("transfer_id" = i64, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "Transfer detail", body = TransferDetailData, content_type = "application/json"),
        (status = 404, description = "Transfer not found")
    ),
    security(("actor" = [])),
    tag = "Transfer"
)]
pub async fn get_transfer(
    State(state): State<Arc<AppState>>,
    Path(transfer_id): Path<TransferId>,
) -> ApiResult<TransferDetailData> {
    let detail = state.coordinator.get_transfer_detail(transfer_id).await?;
    ok(detail.into())
}

/// Edit a DRAFT or PENDING transfer; lines are replaced wholesale
///
/// PUT /api/v1/transfers/{transfer_id}
#[utoipa::path(
    put,
    path = "/api/v1/transfers/{transfer_id}",
    params(("transfer_id" = i64, Path, description = "Transfer ID")),
    request_body = UpdateTransferBody,
    responses(
        (status = 200, description = "Transfer updated", body = TransferData, content_type = "application/json"),
        (status = 400, description = "Invalid body or lines"),
        (status = 404, description = "Transfer not found"),
        (status = 409, description = "Transfer no longer editable")
    ),
    security(("actor" = [])),
    tag = "Transfer"
)]
pub async fn update_transfer(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(transfer_id): Path<TransferId>,
    Json(body): Json<UpdateTransferBody>,
) -> ApiResult<TransferData> {
    body.validate()?;
    let req = body.into_request()?;
    state.coordinator.update(transfer_id, req, actor).await?;
    let transfer = state.coordinator.get_transfer(transfer_id).await?;
    ok(transfer.into())
}

/// Approve a PENDING transfer and decrement source stock
///
/// POST /api/v1/transfers/{transfer_id}/approve
#[utoipa::path(
    post,
    path = "/api/v1/transfers/{transfer_id}/approve",
    params(("transfer_id" = i64, Path, description = "Transfer ID")),
    request_body = ApproveTransferBody,
    responses(
        (status = 200, description = "Transfer approved", body = TransferData, content_type = "application/json"),
        (status = 400, description = "Invalid body, lines or driver"),
        (status = 404, description = "Transfer, driver or recipe not found"),
        (status = 409, description = "Transfer not PENDING, or modified concurrently"),
        (status = 422, description = "Insufficient stock at the source store")
    ),
    security(("actor" = [])),
    tag = "Transfer"
)]
pub async fn approve_transfer(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(transfer_id): Path<TransferId>,
    Json(body): Json<ApproveTransferBody>,
) -> ApiResult<TransferData> {
    body.validate()?;
    let approval = body.into_request()?;
    state.coordinator.approve(transfer_id, approval, actor).await?;
    let transfer = state.coordinator.get_transfer(transfer_id).await?;
    ok(transfer.into())
}

/// Reject a PENDING transfer
///
/// POST /api/v1/transfers/{transfer_id}/reject
#[utoipa::path(
    post,
    path = "/api/v1/transfers/{transfer_id}/reject",
    params(("transfer_id" = i64, Path, description = "Transfer ID")),
    request_body = RejectTransferBody,
    responses(
        (status = 200, description = "Transfer rejected", body = TransferData, content_type = "application/json"),
        (status = 404, description = "Transfer not found"),
        (status = 409, description = "Transfer not PENDING")
    ),
    security(("actor" = [])),
    tag = "Transfer"
)]
pub async fn reject_transfer(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(transfer_id): Path<TransferId>,
    Json(body): Json<RejectTransferBody>,
) -> ApiResult<TransferData> {
    body.validate()?;
    state
        .coordinator
        .reject(transfer_id, body.notes, actor)
        .await?;
    let transfer = state.coordinator.get_transfer(transfer_id).await?;
    ok(transfer.into())
}

/// Mark an APPROVED transfer delivered and increment destination stock
///
/// POST /api/v1/transfers/{transfer_id}/deliver
#[utoipa::path(
    post,
    path = "/api/v1/transfers/{transfer_id}/deliver",
    params(("transfer_id" = i64, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "Transfer delivered", body = TransferData, content_type = "application/json"),
        (status = 404, description = "Transfer not found"),
        (status = 409, description = "Transfer not APPROVED")
    ),
    security(("actor" = [])),
    tag = "Transfer"
)]
pub async fn deliver_transfer(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(transfer_id): Path<TransferId>,
) -> ApiResult<TransferData> {
    state.coordinator.deliver(transfer_id, actor).await?;
    let transfer = state.coordinator.get_transfer(transfer_id).await?;
    ok(transfer.into())
}

/// Requested or shipped lines, split into raw items and recipes
///
/// GET /api/v1/transfers/{transfer_id}/items?is_requested=
#[utoipa::path(
    get,
    path = "/api/v1/transfers/{transfer_id}/items",
    params(("transfer_id" = i64, Path, description = "Transfer ID"), ItemsQuery),
    responses(
        (status = 200, description = "Distributed lines", body = DistributedItemsData, content_type = "application/json"),
        (status = 404, description = "Transfer not found")
    ),
    security(("actor" = [])),
    tag = "Transfer"
)]
pub async fn get_transfer_items(
    State(state): State<Arc<AppState>>,
    Path(transfer_id): Path<TransferId>,
    Query(query): Query<ItemsQuery>,
) -> ApiResult<DistributedItemsData> {
    let items = state
        .coordinator
        .distribute_transfer_items(transfer_id, query.is_requested.unwrap_or(true))
        .await?;
    ok(items.into())
}
