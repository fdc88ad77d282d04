//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::handlers::HealthResponse;
use crate::gateway::types::{
    ApiLine, ApproveTransferBody, CreateTransferBody, CreatedTransferData, DistributedItemsData,
    ItemQuantityData, RecipeQuantityData, RejectTransferBody, StoreData, TransferData,
    TransferDetailData, TransferItemData, TransferListData, UpdateTransferBody,
};
use crate::transfer::TransferStatus;

/// Acting user header
struct ActorAddon;

impl Modify for ActorAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "actor",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-user-id",
                    "Numeric id of the acting user, resolved by the upstream auth layer",
                ))),
            );
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Inventory Transfer API",
        version = "0.1.0",
        description = "Request, approve, ship and deliver stock between stores.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health::health_check,
        crate::gateway::handlers::transfer::create_transfer,
        crate::gateway::handlers::transfer::list_transfers,
        crate::gateway::handlers::transfer::get_transfer,
        crate::gateway::handlers::transfer::update_transfer,
        crate::gateway::handlers::transfer::approve_transfer,
        crate::gateway::handlers::transfer::reject_transfer,
        crate::gateway::handlers::transfer::deliver_transfer,
        crate::gateway::handlers::transfer::get_transfer_items,
    ),
    components(
        schemas(
            HealthResponse,
            TransferStatus,
            ApiLine,
            CreateTransferBody,
            UpdateTransferBody,
            ApproveTransferBody,
            RejectTransferBody,
            CreatedTransferData,
            TransferData,
            TransferItemData,
            StoreData,
            TransferDetailData,
            TransferListData,
            ItemQuantityData,
            RecipeQuantityData,
            DistributedItemsData,
        )
    ),
    modifiers(&ActorAddon),
    tags(
        (name = "Transfer", description = "Inventory transfer workflow (x-user-id required)"),
        (name = "System", description = "Health checks and system info")
    )
)]
pub struct ApiDoc;
