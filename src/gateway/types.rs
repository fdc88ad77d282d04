//! Gateway types
//!
//! - `ApiResponse<T>`: unified response wrapper
//! - `ApiError`: error response, built from [`TransferError`]
//! - `error_codes`: numeric codes carried in `ApiResponse::code`
//! - Request bodies (validated with `validator`) and response DTOs

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::core_types::{DriverId, InventoryItemId, RecipeId, StoreId, TransferId, UserId};
use crate::transfer::{
    ApprovalRequest, CreateTransferRequest, DistributedItems, DriverSelection, Line, Paging,
    Store, Transfer, TransferDetail, TransferError, TransferFilter, TransferItem, TransferStatus,
    UpdateTransferRequest,
};
use crate::transfer::types::{QUANTITY_SCALE, max_quantity};

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: payload on success, error details on failure
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create success response
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }
}

/// Standard API error codes
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_STOCK: i32 = 1002;
    pub const INVALID_STATE: i32 = 1003;

    // Actor errors (2xxx)
    pub const MISSING_ACTOR: i32 = 2001;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4004;
    pub const CONCURRENCY_CONFLICT: i32 = 4009;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}

// ============================================================================
// Errors
// ============================================================================

/// Error response: HTTP status plus an `ApiResponse` body whose `data`
/// carries `{"error": NAME, ...details}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub error: &'static str,
    pub msg: String,
    pub details: serde_json::Value,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Wrap a payload in a success envelope
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, error: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            error,
            msg: msg.into(),
            details: json!({}),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_PARAMETER,
            "VALIDATION_ERROR",
            msg,
        )
    }

    pub fn missing_actor(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            error_codes::MISSING_ACTOR,
            "MISSING_ACTOR",
            msg,
        )
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            msg,
        )
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

impl From<TransferError> for ApiError {
    fn from(e: TransferError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match &e {
            TransferError::Validation(_) => error_codes::INVALID_PARAMETER,
            TransferError::InvalidState { .. } => error_codes::INVALID_STATE,
            TransferError::InsufficientStock { .. } => error_codes::INSUFFICIENT_STOCK,
            TransferError::NotFound { .. } => error_codes::NOT_FOUND,
            TransferError::ConcurrencyConflict(_) => error_codes::CONCURRENCY_CONFLICT,
            TransferError::DatabaseError(_) | TransferError::SystemError(_) => {
                error_codes::INTERNAL_ERROR
            }
        };
        let details = match &e {
            TransferError::InvalidState {
                transfer_id,
                status,
                operation,
            } => json!({ "transfer_id": transfer_id, "status": status, "operation": operation }),
            TransferError::InsufficientStock {
                store_id,
                item_id,
                required,
                available,
            } => json!({
                "store_id": store_id,
                "inventory_item_id": item_id,
                "required": required.to_string(),
                "available": available.to_string(),
            }),
            TransferError::NotFound { entity, id } => json!({ "entity": entity, "id": id }),
            TransferError::ConcurrencyConflict(id) => json!({ "transfer_id": id }),
            _ => json!({}),
        };
        // Infrastructure detail stays in the logs
        let msg = match &e {
            TransferError::DatabaseError(_) | TransferError::SystemError(_) => {
                tracing::error!(code = e.code(), "Internal error: {}", e);
                "internal error".to_string()
            }
            _ => e.to_string(),
        };
        ApiError::new(status, code, e.code(), msg).with_details(details)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut data = self.details;
        if let Some(obj) = data.as_object_mut() {
            obj.insert("error".to_string(), json!(self.error));
        }
        let body = ApiResponse {
            code: self.code,
            msg: self.msg,
            data: Some(data),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Acting user, injected by the `x-user-id` middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub UserId);

// ============================================================================
// Request Bodies
// ============================================================================

fn positive_quantity(q: &Decimal) -> Result<(), ValidationError> {
    if !q.is_sign_positive() || q.is_zero() {
        return Err(ValidationError::new("quantity_must_be_positive"));
    }
    if q.normalize().scale() > QUANTITY_SCALE {
        return Err(ValidationError::new("quantity_too_precise"));
    }
    if *q > max_quantity() {
        return Err(ValidationError::new("quantity_too_large"));
    }
    Ok(())
}

/// One line: exactly one of `inventory_item_id` / `recipe_id`
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ApiLine {
    #[schema(example = 100)]
    pub inventory_item_id: Option<InventoryItemId>,
    pub recipe_id: Option<RecipeId>,
    #[validate(custom(function = "positive_quantity"))]
    #[schema(value_type = String, example = "10")]
    pub quantity: Decimal,
}

impl ApiLine {
    pub fn item(inventory_item_id: InventoryItemId, quantity: impl Into<Decimal>) -> Self {
        Self {
            inventory_item_id: Some(inventory_item_id),
            recipe_id: None,
            quantity: quantity.into(),
        }
    }

    pub fn recipe(recipe_id: RecipeId, quantity: impl Into<Decimal>) -> Self {
        Self {
            inventory_item_id: None,
            recipe_id: Some(recipe_id),
            quantity: quantity.into(),
        }
    }
}

fn to_lines(lines: &[ApiLine]) -> Result<Vec<Line>, TransferError> {
    lines
        .iter()
        .map(|l| Line::from_parts(l.inventory_item_id, l.recipe_id, l.quantity))
        .collect()
}

/// POST /api/v1/transfers
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateTransferBody {
    pub from_store_id: Option<StoreId>,
    /// The requesting store
    pub to_store_id: StoreId,
    /// Defaults to now
    pub requested_at: Option<DateTime<Utc>>,
    /// DRAFT or PENDING, defaults to PENDING
    pub status: Option<TransferStatus>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(min = 1), nested)]
    pub items: Vec<ApiLine>,
}

impl CreateTransferBody {
    pub fn into_request(self) -> Result<CreateTransferRequest, TransferError> {
        Ok(CreateTransferRequest {
            from_store_id: self.from_store_id,
            to_store_id: self.to_store_id,
            requested_at: self.requested_at,
            status: self.status.unwrap_or(TransferStatus::Pending),
            notes: self.notes,
            items: to_lines(&self.items)?,
        })
    }
}

/// PUT /api/v1/transfers/{id}
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateTransferBody {
    pub from_store_id: Option<StoreId>,
    /// DRAFT or PENDING
    pub status: TransferStatus,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(min = 1), nested)]
    pub items: Vec<ApiLine>,
}

impl UpdateTransferBody {
    pub fn into_request(self) -> Result<UpdateTransferRequest, TransferError> {
        Ok(UpdateTransferRequest {
            from_store_id: self.from_store_id,
            status: self.status,
            notes: self.notes,
            items: to_lines(&self.items)?,
        })
    }
}

/// POST /api/v1/transfers/{id}/approve
///
/// Either `driver_id` or new driver details, not both.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct ApproveTransferBody {
    pub driver_id: Option<DriverId>,
    #[validate(length(min = 1, max = 200))]
    pub new_driver_name: Option<String>,
    #[validate(email)]
    pub new_driver_email: Option<String>,
    /// Only when the transfer was created without a source store
    pub from_store_id: Option<StoreId>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(min = 1), nested)]
    pub items: Vec<ApiLine>,
}

impl ApproveTransferBody {
    pub fn into_request(self) -> Result<ApprovalRequest, TransferError> {
        let new_driver = self.new_driver_name.is_some() || self.new_driver_email.is_some();
        let driver = match (self.driver_id, new_driver) {
            (Some(_), true) => {
                return Err(TransferError::validation(
                    "give either driver_id or new driver details, not both",
                ));
            }
            (Some(id), false) => Some(DriverSelection::Existing(id)),
            (None, true) => Some(DriverSelection::New {
                name: self.new_driver_name,
                email: self.new_driver_email,
            }),
            (None, false) => None,
        };
        Ok(ApprovalRequest {
            driver,
            from_store_id: self.from_store_id,
            items: to_lines(&self.items)?,
            notes: self.notes,
        })
    }
}

/// POST /api/v1/transfers/{id}/reject
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct RejectTransferBody {
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// GET /api/v1/transfers
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListTransfersQuery {
    /// Either side of the transfer
    pub store_id: Option<StoreId>,
    pub from_store_id: Option<StoreId>,
    pub to_store_id: Option<StoreId>,
    pub status: Option<TransferStatus>,
    pub requested_from: Option<DateTime<Utc>>,
    pub requested_to: Option<DateTime<Utc>>,
    /// 1-based
    pub page: Option<u32>,
    /// 1..=100, default 20
    pub page_size: Option<u32>,
}

impl ListTransfersQuery {
    pub fn filter(&self) -> TransferFilter {
        TransferFilter {
            store_id: self.store_id,
            from_store_id: self.from_store_id,
            to_store_id: self.to_store_id,
            status: self.status,
            requested_from: self.requested_from,
            requested_to: self.requested_to,
        }
    }

    pub fn paging(&self) -> Paging {
        Paging::new(
            self.page.unwrap_or(1),
            self.page_size.unwrap_or(Paging::DEFAULT_PAGE_SIZE),
        )
    }
}

/// GET /api/v1/transfers/{id}/items
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ItemsQuery {
    /// `true` (default) for requested lines, `false` for shipped lines
    pub is_requested: Option<bool>,
}

// ============================================================================
// Response DTOs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CreatedTransferData {
    pub transfer_id: TransferId,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TransferData {
    pub transfer_id: TransferId,
    pub from_store_id: Option<StoreId>,
    pub to_store_id: StoreId,
    pub status: TransferStatus,
    pub requested_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub driver_id: Option<DriverId>,
    pub driver_name: Option<String>,
    pub driver_email: Option<String>,
    pub requested_by_user_id: UserId,
    pub approved_by_user_id: Option<UserId>,
}

impl From<Transfer> for TransferData {
    fn from(t: Transfer) -> Self {
        Self {
            transfer_id: t.id,
            from_store_id: t.from_store_id,
            to_store_id: t.to_store_id,
            status: t.status,
            requested_at: t.requested_at,
            received_at: t.received_at,
            notes: t.notes,
            driver_id: t.driver_id,
            driver_name: t.driver_name,
            driver_email: t.driver_email,
            requested_by_user_id: t.requested_by_user_id,
            approved_by_user_id: t.approved_by_user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TransferItemData {
    pub transfer_item_id: i64,
    pub inventory_item_id: Option<InventoryItemId>,
    pub recipe_id: Option<RecipeId>,
    #[schema(value_type = String, example = "10")]
    pub quantity: Decimal,
    pub is_requested: bool,
}

impl From<TransferItem> for TransferItemData {
    fn from(i: TransferItem) -> Self {
        Self {
            transfer_item_id: i.id,
            inventory_item_id: i.line.inventory_item_id(),
            recipe_id: i.line.recipe_id(),
            quantity: i.line.quantity(),
            is_requested: i.is_requested,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StoreData {
    pub store_id: StoreId,
    pub name: String,
    pub organization_id: i64,
}

impl From<Store> for StoreData {
    fn from(s: Store) -> Self {
        Self {
            store_id: s.id,
            name: s.name,
            organization_id: s.organization_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TransferDetailData {
    pub transfer: TransferData,
    pub from_store: Option<StoreData>,
    pub to_store: Option<StoreData>,
    pub requested_items: Vec<TransferItemData>,
    pub shipped_items: Vec<TransferItemData>,
}

impl From<TransferDetail> for TransferDetailData {
    fn from(d: TransferDetail) -> Self {
        Self {
            transfer: d.transfer.into(),
            from_store: d.from_store.map(Into::into),
            to_store: d.to_store.map(Into::into),
            requested_items: d.requested_items.into_iter().map(Into::into).collect(),
            shipped_items: d.shipped_items.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TransferListData {
    pub transfers: Vec<TransferData>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ItemQuantityData {
    pub inventory_item_id: InventoryItemId,
    #[schema(value_type = String, example = "13")]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RecipeQuantityData {
    pub recipe_id: RecipeId,
    #[schema(value_type = String, example = "5")]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DistributedItemsData {
    pub inventory: Vec<ItemQuantityData>,
    pub recipes: Vec<RecipeQuantityData>,
}

impl From<DistributedItems> for DistributedItemsData {
    fn from(d: DistributedItems) -> Self {
        Self {
            inventory: d
                .inventory
                .into_iter()
                .map(|q| ItemQuantityData {
                    inventory_item_id: q.inventory_item_id,
                    quantity: q.quantity,
                })
                .collect(),
            recipes: d
                .recipes
                .into_iter()
                .map(|r| RecipeQuantityData {
                    recipe_id: r.recipe_id,
                    quantity: r.quantity,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_needs_exactly_one_id() {
        let both = ApiLine {
            inventory_item_id: Some(1),
            recipe_id: Some(2),
            quantity: Decimal::ONE,
        };
        assert!(matches!(to_lines(&[both]), Err(TransferError::Validation(_))));

        let neither = ApiLine {
            inventory_item_id: None,
            recipe_id: None,
            quantity: Decimal::ONE,
        };
        assert!(to_lines(&[neither]).is_err());

        assert_eq!(
            to_lines(&[ApiLine::recipe(2, 3)]).unwrap(),
            vec![Line::recipe(2, 3)]
        );
    }

    #[test]
    fn test_body_validation() {
        let body = CreateTransferBody {
            from_store_id: Some(1),
            to_store_id: 2,
            requested_at: None,
            status: None,
            notes: None,
            items: vec![],
        };
        assert!(body.validate().is_err());

        let body = CreateTransferBody {
            items: vec![ApiLine::item(1, 0)],
            ..body
        };
        assert!(body.validate().is_err());

        let body = CreateTransferBody {
            items: vec![ApiLine::item(1, Decimal::MAX), ApiLine::item(1, Decimal::MAX)],
            ..body
        };
        assert!(body.validate().is_err());

        let body = CreateTransferBody {
            items: vec![ApiLine::item(1, Decimal::new(1, 7))],
            ..body
        };
        assert!(body.validate().is_err());

        let body = CreateTransferBody {
            items: vec![ApiLine::item(1, 2)],
            ..body
        };
        assert!(body.validate().is_ok());
        assert_eq!(body.into_request().unwrap().status, TransferStatus::Pending);
    }

    #[test]
    fn test_approve_body_driver_choice() {
        let body = ApproveTransferBody {
            driver_id: Some(3),
            new_driver_name: Some("Kim".to_string()),
            items: vec![ApiLine::item(1, 1)],
            ..Default::default()
        };
        assert!(body.into_request().is_err());

        let body = ApproveTransferBody {
            driver_id: Some(3),
            items: vec![ApiLine::item(1, 1)],
            ..Default::default()
        };
        assert_eq!(
            body.into_request().unwrap().driver,
            Some(DriverSelection::Existing(3))
        );

        let body = ApproveTransferBody {
            new_driver_email: Some("not-an-email".to_string()),
            items: vec![ApiLine::item(1, 1)],
            ..Default::default()
        };
        assert!(body.validate().is_err());
    }

    #[test]
    fn test_insufficient_stock_maps_to_422_with_details() {
        let err: ApiError = TransferError::InsufficientStock {
            store_id: 1,
            item_id: 42,
            required: Decimal::from(10),
            available: Decimal::from(5),
        }
        .into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, error_codes::INSUFFICIENT_STOCK);
        assert_eq!(err.error, "INSUFFICIENT_STOCK");
        assert_eq!(err.details["inventory_item_id"], 42);
        assert_eq!(err.details["available"], "5");
    }

    #[test]
    fn test_internal_errors_hide_detail() {
        let err: ApiError = TransferError::DatabaseError("connection reset".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.msg, "internal error");
    }

    #[test]
    fn test_list_query_paging_defaults() {
        let q = ListTransfersQuery::default();
        assert_eq!(q.paging(), Paging::new(1, 20));
        let q = ListTransfersQuery {
            page: Some(0),
            page_size: Some(500),
            ..Default::default()
        };
        assert_eq!(q.paging(), Paging::new(1, 100));
    }
}
