//! Transfer Coordinator
//!
//! Drives the transfer state machine. Each transition opens one unit of
//! work, checks the current status under lock, runs its side effects and
//! commits the new status with a compare-and-swap. Any failure drops the
//! unit of work, which rolls everything back.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::audit::{AuditSink, TracingAuditSink, TransitionEvent};
use super::error::TransferError;
use super::ledger;
use super::reconciler::{RecipeCatalog, reconcile};
use super::state::TransferStatus;
use super::store::{TransferStore, UnitOfWork};
use super::types::{
    ApprovalRequest, CreateTransferRequest, DistributedItems, Driver, DriverSelection, Line,
    NewTransfer, Paging, Store, Transfer, TransferDetail, TransferFilter, UpdateTransferRequest,
    validate_lines,
};
use crate::core_types::{StoreId, TransferId, UserId};

/// Transfer Coordinator
pub struct TransferCoordinator {
    store: Arc<dyn TransferStore>,
    catalog: Arc<dyn RecipeCatalog>,
    audit: Arc<dyn AuditSink>,
}

impl TransferCoordinator {
    /// Coordinator over `store`, using the store itself as recipe catalog
    /// and logging transitions through `tracing`.
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: TransferStore + 'static,
    {
        Self {
            catalog: store.clone(),
            store,
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn RecipeCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn store(&self) -> &Arc<dyn TransferStore> {
        &self.store
    }

    /// Create a transfer in Draft or Pending. No stock moves.
    pub async fn create(
        &self,
        req: CreateTransferRequest,
        actor: UserId,
    ) -> Result<TransferId, TransferError> {
        if !req.status.is_initial() {
            return Err(TransferError::validation(format!(
                "a new transfer must be DRAFT or PENDING, got {}",
                req.status
            )));
        }
        validate_lines(&req.items)?;
        if req.from_store_id == Some(req.to_store_id) {
            return Err(TransferError::validation(
                "source and destination store must differ",
            ));
        }

        let mut uow = self.store.begin().await?;
        ensure_store(uow.as_mut(), req.to_store_id).await?;
        if let Some(from) = req.from_store_id {
            ensure_store(uow.as_mut(), from).await?;
        }

        let id = uow
            .insert_transfer(&NewTransfer {
                from_store_id: req.from_store_id,
                to_store_id: req.to_store_id,
                status: req.status,
                requested_at: req.requested_at.unwrap_or_else(Utc::now),
                notes: req.notes,
                requested_by_user_id: actor,
            })
            .await?;
        uow.append_items(id, &req.items, true).await?;
        uow.commit().await?;

        info!(
            transfer_id = id,
            to_store_id = req.to_store_id,
            status = %req.status,
            lines = req.items.len(),
            actor = actor,
            "Transfer created"
        );
        self.emit(id, None, req.status, actor).await;
        Ok(id)
    }

    /// Edit a Draft or Pending transfer. Requested lines are replaced wholesale.
    pub async fn update(
        &self,
        id: TransferId,
        req: UpdateTransferRequest,
        actor: UserId,
    ) -> Result<(), TransferError> {
        let result = self.update_inner(id, req, actor).await;
        log_failure(id, "update", &result);
        result
    }

    async fn update_inner(
        &self,
        id: TransferId,
        req: UpdateTransferRequest,
        actor: UserId,
    ) -> Result<(), TransferError> {
        if !req.status.is_initial() {
            return Err(TransferError::validation(format!(
                "an edit can only keep a transfer DRAFT or PENDING, got {}",
                req.status
            )));
        }
        validate_lines(&req.items)?;

        let mut uow = self.store.begin().await?;
        let current = lock_transfer(uow.as_mut(), id).await?;
        if !current.status.is_editable() {
            return Err(invalid_state(&current, "edit"));
        }
        if current.status == TransferStatus::Pending && req.status == TransferStatus::Draft {
            return Err(TransferError::validation(
                "a submitted transfer cannot return to DRAFT",
            ));
        }
        if let Some(from) = req.from_store_id {
            if from == current.to_store_id {
                return Err(TransferError::validation(
                    "source and destination store must differ",
                ));
            }
            ensure_store(uow.as_mut(), from).await?;
        }

        uow.replace_requested_items(id, &req.items).await?;

        let mut updated = current.clone();
        updated.status = req.status;
        updated.from_store_id = req.from_store_id.or(current.from_store_id);
        if req.notes.is_some() {
            updated.notes = req.notes;
        }
        commit_transition(uow, current.status, &updated).await?;

        info!(
            transfer_id = id,
            from = %current.status,
            to = %updated.status,
            lines = req.items.len(),
            actor = actor,
            "Transfer updated"
        );
        self.emit(id, Some(current.status), updated.status, actor)
            .await;
        Ok(())
    }

    /// Approve a Pending transfer and take the shipped quantities out of the
    /// source store.
    pub async fn approve(
        &self,
        id: TransferId,
        approval: ApprovalRequest,
        actor: UserId,
    ) -> Result<(), TransferError> {
        let result = self.approve_inner(id, approval, actor).await;
        log_failure(id, "approve", &result);
        result
    }

    async fn approve_inner(
        &self,
        id: TransferId,
        approval: ApprovalRequest,
        actor: UserId,
    ) -> Result<(), TransferError> {
        validate_lines(&approval.items)?;
        let selection = approval.driver.ok_or_else(|| {
            TransferError::validation("approval needs an existing driver or new driver details")
        })?;

        let mut uow = self.store.begin().await?;
        let current = lock_transfer(uow.as_mut(), id).await?;
        if current.status != TransferStatus::Pending {
            return Err(invalid_state(&current, "approve"));
        }
        let from_store = resolve_source_store(uow.as_mut(), &current, approval.from_store_id).await?;

        // 1. Driver
        let driver = resolve_driver(uow.as_mut(), from_store, selection).await?;

        // 2. Reconcile
        let deltas = reconcile(&approval.items, self.catalog.as_ref()).await?;
        if deltas.is_empty() {
            return Err(TransferError::validation(
                "approved lines resolve to no inventory items",
            ));
        }

        // 3. Shipped lines, one per reconciled raw item
        let shipped: Vec<Line> = deltas
            .iter()
            .map(|d| Line::item(d.inventory_item_id, d.quantity))
            .collect();
        uow.append_items(id, &shipped, false).await?;

        // 4. Source stock
        let remaining = ledger::decrement_all(uow.as_mut(), from_store, &deltas).await?;
        for level in &remaining {
            debug!(
                transfer_id = id,
                store_id = from_store,
                item_id = level.inventory_item_id,
                remaining = %level.quantity,
                "Source stock decremented"
            );
        }

        // 5. Status
        let mut updated = current.clone();
        updated.status = TransferStatus::Approved;
        updated.from_store_id = Some(from_store);
        updated.approved_by_user_id = Some(actor);
        updated.driver_id = Some(driver.id);
        updated.driver_name = driver.name;
        updated.driver_email = driver.email;
        if approval.notes.is_some() {
            updated.notes = approval.notes;
        }
        commit_transition(uow, TransferStatus::Pending, &updated).await?;

        info!(
            transfer_id = id,
            from_store_id = from_store,
            driver_id = driver.id,
            items = deltas.len(),
            actor = actor,
            "Transfer approved"
        );
        self.emit(id, Some(TransferStatus::Pending), TransferStatus::Approved, actor)
            .await;
        Ok(())
    }

    /// Reject a Pending transfer. No stock moves.
    pub async fn reject(
        &self,
        id: TransferId,
        notes: Option<String>,
        actor: UserId,
    ) -> Result<(), TransferError> {
        let result = self.reject_inner(id, notes, actor).await;
        log_failure(id, "reject", &result);
        result
    }

    async fn reject_inner(
        &self,
        id: TransferId,
        notes: Option<String>,
        actor: UserId,
    ) -> Result<(), TransferError> {
        let mut uow = self.store.begin().await?;
        let current = lock_transfer(uow.as_mut(), id).await?;
        if current.status != TransferStatus::Pending {
            return Err(invalid_state(&current, "reject"));
        }

        let mut updated = current.clone();
        updated.status = TransferStatus::Rejected;
        if notes.is_some() {
            updated.notes = notes;
        }
        commit_transition(uow, TransferStatus::Pending, &updated).await?;

        info!(transfer_id = id, actor = actor, "Transfer rejected");
        self.emit(id, Some(TransferStatus::Pending), TransferStatus::Rejected, actor)
            .await;
        Ok(())
    }

    /// Deliver an Approved transfer into the destination store.
    pub async fn deliver(&self, id: TransferId, actor: UserId) -> Result<(), TransferError> {
        let result = self.deliver_inner(id, actor).await;
        log_failure(id, "deliver", &result);
        result
    }

    async fn deliver_inner(&self, id: TransferId, actor: UserId) -> Result<(), TransferError> {
        let mut uow = self.store.begin().await?;
        let current = lock_transfer(uow.as_mut(), id).await?;
        if current.status != TransferStatus::Approved {
            return Err(invalid_state(&current, "deliver"));
        }

        let items = uow.load_items(id).await?;
        let shipped = DistributedItems::from_lines(
            items.iter().filter(|i| !i.is_requested).map(|i| &i.line),
        )?;
        let deltas = reconcile(&shipped.to_lines(), self.catalog.as_ref()).await?;
        if !deltas.is_empty() {
            ledger::increment_all(uow.as_mut(), current.to_store_id, &deltas).await?;
        }

        let mut updated = current.clone();
        updated.status = TransferStatus::Delivered;
        updated.received_at = Some(Utc::now());
        commit_transition(uow, TransferStatus::Approved, &updated).await?;

        info!(
            transfer_id = id,
            to_store_id = current.to_store_id,
            items = deltas.len(),
            actor = actor,
            "Transfer delivered"
        );
        self.emit(id, Some(TransferStatus::Approved), TransferStatus::Delivered, actor)
            .await;
        Ok(())
    }

    /// Requested (`is_requested = true`) or shipped lines, split and merged
    pub async fn distribute_transfer_items(
        &self,
        id: TransferId,
        is_requested: bool,
    ) -> Result<DistributedItems, TransferError> {
        self.get_transfer(id).await?;
        let items = self.store.get_items(id).await?;
        DistributedItems::from_lines(
            items
                .iter()
                .filter(|i| i.is_requested == is_requested)
                .map(|i| &i.line),
        )
    }

    pub async fn get_transfer(&self, id: TransferId) -> Result<Transfer, TransferError> {
        self.store
            .get_transfer(id)
            .await?
            .ok_or_else(|| TransferError::not_found("Transfer", id))
    }

    pub async fn get_transfer_detail(&self, id: TransferId) -> Result<TransferDetail, TransferError> {
        let transfer = self.get_transfer(id).await?;
        let from_store = match transfer.from_store_id {
            Some(s) => self.store.get_store(s).await?,
            None => None,
        };
        let to_store: Option<Store> = self.store.get_store(transfer.to_store_id).await?;

        let (requested_items, shipped_items) = self
            .store
            .get_items(id)
            .await?
            .into_iter()
            .partition(|i| i.is_requested);

        Ok(TransferDetail {
            transfer,
            from_store,
            to_store,
            requested_items,
            shipped_items,
        })
    }

    pub async fn list_transfers(
        &self,
        filter: &TransferFilter,
        paging: Paging,
    ) -> Result<(Vec<Transfer>, u64), TransferError> {
        self.store.list_transfers(filter, paging).await
    }

    async fn emit(
        &self,
        id: TransferId,
        from: Option<TransferStatus>,
        to: TransferStatus,
        actor: UserId,
    ) {
        self.audit
            .record(TransitionEvent::new(id, from, to, actor))
            .await;
    }
}

async fn lock_transfer(uow: &mut dyn UnitOfWork, id: TransferId) -> Result<Transfer, TransferError> {
    uow.lock_transfer(id)
        .await?
        .ok_or_else(|| TransferError::not_found("Transfer", id))
}

async fn ensure_store(uow: &mut dyn UnitOfWork, id: StoreId) -> Result<(), TransferError> {
    if uow.store_exists(id).await? {
        Ok(())
    } else {
        Err(TransferError::not_found("Store", id))
    }
}

/// The approval may supply the source store only when the transfer has none.
async fn resolve_source_store(
    uow: &mut dyn UnitOfWork,
    transfer: &Transfer,
    from_approval: Option<StoreId>,
) -> Result<StoreId, TransferError> {
    match (transfer.from_store_id, from_approval) {
        (Some(from), None) => Ok(from),
        (Some(from), Some(given)) if from == given => Ok(from),
        (Some(from), Some(given)) => Err(TransferError::validation(format!(
            "transfer already ships from store {}, cannot switch to {}",
            from, given
        ))),
        (None, Some(given)) => {
            if given == transfer.to_store_id {
                return Err(TransferError::validation(
                    "source and destination store must differ",
                ));
            }
            ensure_store(uow, given).await?;
            Ok(given)
        }
        (None, None) => Err(TransferError::validation(
            "transfer has no source store to ship from",
        )),
    }
}

async fn resolve_driver(
    uow: &mut dyn UnitOfWork,
    from_store: StoreId,
    selection: DriverSelection,
) -> Result<Driver, TransferError> {
    match selection {
        DriverSelection::Existing(driver_id) => uow
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| TransferError::not_found("Driver", driver_id)),
        DriverSelection::New { name, email } => {
            let name = name.filter(|n| !n.trim().is_empty());
            let email = email.filter(|e| !e.trim().is_empty());
            if name.is_none() && email.is_none() {
                return Err(TransferError::validation(
                    "a new driver needs a name or an email",
                ));
            }
            let driver = uow
                .create_driver(from_store, name.as_deref(), email.as_deref())
                .await?;
            debug!(driver_id = driver.id, store_id = from_store, "Driver created");
            Ok(driver)
        }
    }
}

/// CAS the new status and commit. A CAS miss means another writer got there first.
async fn commit_transition(
    mut uow: Box<dyn UnitOfWork>,
    expected: TransferStatus,
    updated: &Transfer,
) -> Result<(), TransferError> {
    if !uow.update_transfer_if(expected, updated).await? {
        return Err(TransferError::ConcurrencyConflict(updated.id));
    }
    uow.commit().await
}

fn invalid_state(transfer: &Transfer, operation: &'static str) -> TransferError {
    TransferError::InvalidState {
        transfer_id: transfer.id,
        status: transfer.status,
        operation,
    }
}

fn log_failure<T>(id: TransferId, operation: &str, result: &Result<T, TransferError>) {
    if let Err(e) = result {
        warn!(
            transfer_id = id,
            operation = operation,
            code = e.code(),
            "Transfer {} failed: {}",
            operation,
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::audit::MemoryAuditSink;
    use crate::transfer::reconciler::StaticCatalog;
    use crate::transfer::store::MemoryTransferStore;
    use crate::transfer::types::Ingredient;
    use rust_decimal::Decimal;

    const ALICE: UserId = 100;
    const BOB: UserId = 200;

    async fn setup() -> (TransferCoordinator, Arc<MemoryTransferStore>, Arc<MemoryAuditSink>) {
        let store = Arc::new(MemoryTransferStore::new());
        for id in 1..=3 {
            store
                .add_store(Store {
                    id,
                    name: format!("Store {}", id),
                    organization_id: 1,
                })
                .await;
        }
        let audit = Arc::new(MemoryAuditSink::new());
        let coordinator = TransferCoordinator::new(store.clone()).with_audit(audit.clone());
        (coordinator, store, audit)
    }

    async fn on_hand(store: &MemoryTransferStore, s: StoreId, item: i64) -> Decimal {
        store
            .stock_level(s, item)
            .await
            .unwrap()
            .map(|l| l.quantity_on_hand)
            .unwrap_or_default()
    }

    fn new_driver() -> DriverSelection {
        DriverSelection::New {
            name: Some("Dana".to_string()),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_create_rejects_bad_requests() {
        let (c, _, _) = setup().await;

        let empty = CreateTransferRequest::new(Some(1), 2, vec![]);
        assert!(matches!(c.create(empty, ALICE).await, Err(TransferError::Validation(_))));

        let zero = CreateTransferRequest::new(Some(1), 2, vec![Line::item(10, 0)]);
        assert!(matches!(c.create(zero, ALICE).await, Err(TransferError::Validation(_))));

        let same = CreateTransferRequest::new(Some(2), 2, vec![Line::item(10, 1)]);
        assert!(matches!(c.create(same, ALICE).await, Err(TransferError::Validation(_))));

        let approved = CreateTransferRequest::new(Some(1), 2, vec![Line::item(10, 1)])
            .with_status(TransferStatus::Approved);
        assert!(matches!(
            c.create(approved, ALICE).await,
            Err(TransferError::Validation(_))
        ));

        let unknown = CreateTransferRequest::new(Some(9), 2, vec![Line::item(10, 1)]);
        assert_eq!(
            c.create(unknown, ALICE).await,
            Err(TransferError::not_found("Store", 9))
        );
    }

    #[tokio::test]
    async fn test_create_stores_requested_lines_only() {
        let (c, store, audit) = setup().await;
        store.set_stock(1, 10, Decimal::from(5)).await;

        let id = c
            .create(
                CreateTransferRequest::new(Some(1), 2, vec![Line::item(10, 3), Line::recipe(7, 1)]),
                ALICE,
            )
            .await
            .unwrap();

        let t = c.get_transfer(id).await.unwrap();
        assert_eq!(t.status, TransferStatus::Pending);
        assert_eq!(t.requested_by_user_id, ALICE);
        let items = store.get_items(id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.is_requested));
        assert_eq!(on_hand(&store, 1, 10).await, Decimal::from(5));

        let events = audit.events_for(id);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].from_status, None);
        assert_eq!(events[0].to_status, TransferStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_replaces_lines_wholesale() {
        let (c, store, _) = setup().await;
        let id = c
            .create(
                CreateTransferRequest::new(Some(1), 2, vec![Line::item(10, 3), Line::item(11, 1)])
                    .with_status(TransferStatus::Draft),
                ALICE,
            )
            .await
            .unwrap();

        c.update(
            id,
            UpdateTransferRequest {
                from_store_id: None,
                status: TransferStatus::Pending,
                notes: Some("urgent".to_string()),
                items: vec![Line::item(12, 4)],
            },
            ALICE,
        )
        .await
        .unwrap();

        let t = c.get_transfer(id).await.unwrap();
        assert_eq!(t.status, TransferStatus::Pending);
        assert_eq!(t.notes.as_deref(), Some("urgent"));
        let items = store.get_items(id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].line, Line::item(12, 4));
    }

    #[tokio::test]
    async fn test_update_cannot_unsubmit() {
        let (c, _, _) = setup().await;
        let id = c
            .create(CreateTransferRequest::new(Some(1), 2, vec![Line::item(10, 1)]), ALICE)
            .await
            .unwrap();
        let err = c
            .update(
                id,
                UpdateTransferRequest {
                    from_store_id: None,
                    status: TransferStatus::Draft,
                    notes: None,
                    items: vec![Line::item(10, 2)],
                },
                ALICE,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));
    }

    #[tokio::test]
    async fn test_approve_records_driver_and_approver() {
        let (c, store, _) = setup().await;
        store.set_stock(1, 10, Decimal::from(20)).await;
        let id = c
            .create(CreateTransferRequest::new(Some(1), 2, vec![Line::item(10, 10)]), ALICE)
            .await
            .unwrap();

        c.approve(
            id,
            ApprovalRequest::new(new_driver(), vec![Line::item(10, 8)]).with_notes("short by 2"),
            BOB,
        )
        .await
        .unwrap();

        let t = c.get_transfer(id).await.unwrap();
        assert_eq!(t.status, TransferStatus::Approved);
        assert_eq!(t.approved_by_user_id, Some(BOB));
        assert_eq!(t.driver_name.as_deref(), Some("Dana"));
        assert_eq!(t.notes.as_deref(), Some("short by 2"));
        assert_eq!(on_hand(&store, 1, 10).await, Decimal::from(12));

        let drivers = store.drivers_for_store(1).await;
        assert_eq!(drivers.len(), 1);
        assert_eq!(t.driver_id, Some(drivers[0].id));
    }

    #[tokio::test]
    async fn test_approve_without_driver_is_validation() {
        let (c, store, _) = setup().await;
        store.set_stock(1, 10, Decimal::from(20)).await;
        let id = c
            .create(CreateTransferRequest::new(Some(1), 2, vec![Line::item(10, 1)]), ALICE)
            .await
            .unwrap();

        let mut approval = ApprovalRequest::new(new_driver(), vec![Line::item(10, 1)]);
        approval.driver = None;
        assert!(matches!(
            c.approve(id, approval, BOB).await,
            Err(TransferError::Validation(_))
        ));

        let blank = ApprovalRequest::new(
            DriverSelection::New {
                name: Some("  ".to_string()),
                email: None,
            },
            vec![Line::item(10, 1)],
        );
        assert!(matches!(
            c.approve(id, blank, BOB).await,
            Err(TransferError::Validation(_))
        ));

        assert_eq!(
            c.approve(
                id,
                ApprovalRequest::new(DriverSelection::Existing(77), vec![Line::item(10, 1)]),
                BOB
            )
            .await,
            Err(TransferError::not_found("Driver", 77))
        );
        assert_eq!(c.get_transfer(id).await.unwrap().status, TransferStatus::Pending);
    }

    #[tokio::test]
    async fn test_approve_expands_recipes_into_shipped_lines() {
        let (c, store, _) = setup().await;
        store.add_recipe(
            7,
            vec![
                Ingredient {
                    inventory_item_id: 10,
                    quantity_per_unit: Decimal::from(2),
                },
                Ingredient {
                    inventory_item_id: 11,
                    quantity_per_unit: Decimal::ONE,
                },
            ],
        );
        store.set_stock(1, 10, Decimal::from(20)).await;
        store.set_stock(1, 11, Decimal::from(20)).await;

        let lines = vec![Line::recipe(7, 5), Line::item(10, 3)];
        let id = c
            .create(CreateTransferRequest::new(Some(1), 2, lines.clone()), ALICE)
            .await
            .unwrap();
        c.approve(id, ApprovalRequest::new(new_driver(), lines), BOB)
            .await
            .unwrap();

        let shipped = c.distribute_transfer_items(id, false).await.unwrap();
        assert!(shipped.recipes.is_empty());
        assert_eq!(
            shipped.inventory,
            vec![
                crate::transfer::types::ItemQuantity::new(10, 13),
                crate::transfer::types::ItemQuantity::new(11, 5)
            ]
        );
        let requested = c.distribute_transfer_items(id, true).await.unwrap();
        assert_eq!(requested.recipes.len(), 1);

        assert_eq!(on_hand(&store, 1, 10).await, Decimal::from(7));
        assert_eq!(on_hand(&store, 1, 11).await, Decimal::from(15));
    }

    #[tokio::test]
    async fn test_approve_can_supply_missing_source_store() {
        let (c, store, _) = setup().await;
        store.set_stock(3, 10, Decimal::from(4)).await;
        let id = c
            .create(CreateTransferRequest::new(None, 2, vec![Line::item(10, 4)]), ALICE)
            .await
            .unwrap();

        let without = ApprovalRequest::new(new_driver(), vec![Line::item(10, 4)]);
        assert!(matches!(
            c.approve(id, without.clone(), BOB).await,
            Err(TransferError::Validation(_))
        ));

        let mut with = without;
        with.from_store_id = Some(3);
        c.approve(id, with, BOB).await.unwrap();
        assert_eq!(c.get_transfer(id).await.unwrap().from_store_id, Some(3));
        assert_eq!(on_hand(&store, 3, 10).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_deliver_sets_received_at() {
        let (c, store, audit) = setup().await;
        store.set_stock(1, 10, Decimal::from(10)).await;
        let id = c
            .create(CreateTransferRequest::new(Some(1), 2, vec![Line::item(10, 10)]), ALICE)
            .await
            .unwrap();
        c.approve(id, ApprovalRequest::new(new_driver(), vec![Line::item(10, 10)]), BOB)
            .await
            .unwrap();
        c.deliver(id, ALICE).await.unwrap();

        let t = c.get_transfer(id).await.unwrap();
        assert_eq!(t.status, TransferStatus::Delivered);
        assert!(t.received_at.is_some());
        assert_eq!(on_hand(&store, 1, 10).await, Decimal::ZERO);
        assert_eq!(on_hand(&store, 2, 10).await, Decimal::from(10));

        let to: Vec<_> = audit.events_for(id).iter().map(|e| e.to_status).collect();
        assert_eq!(
            to,
            vec![
                TransferStatus::Pending,
                TransferStatus::Approved,
                TransferStatus::Delivered
            ]
        );
    }

    fn ingredient(item: i64, per_unit: Decimal) -> Ingredient {
        Ingredient {
            inventory_item_id: item,
            quantity_per_unit: per_unit,
        }
    }

    /// Approved transfer of `(10, 1)` from store 1 to store 2
    async fn approved_transfer(
        c: &TransferCoordinator,
        store: &MemoryTransferStore,
    ) -> TransferId {
        store.set_stock(1, 10, Decimal::from(10)).await;
        let id = c
            .create(CreateTransferRequest::new(Some(1), 2, vec![Line::item(10, 1)]), ALICE)
            .await
            .unwrap();
        c.approve(id, ApprovalRequest::new(new_driver(), vec![Line::item(10, 1)]), BOB)
            .await
            .unwrap();
        id
    }

    async fn ship_extra(store: &MemoryTransferStore, id: TransferId, lines: &[Line]) {
        let mut uow = store.begin().await.unwrap();
        uow.append_items(id, lines, false).await.unwrap();
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_deliver_resolves_shipped_recipe_lines() {
        let (c, store, _) = setup().await;
        store.add_recipe(
            7,
            vec![
                ingredient(10, Decimal::from(2)),
                ingredient(11, Decimal::new(5, 1)),
            ],
        );
        let id = approved_transfer(&c, &store).await;
        ship_extra(&store, id, &[Line::recipe(7, 2)]).await;

        c.deliver(id, ALICE).await.unwrap();

        // 1 raw + 2 x 2 from the recipe
        assert_eq!(on_hand(&store, 2, 10).await, Decimal::from(5));
        assert_eq!(on_hand(&store, 2, 11).await, Decimal::ONE);
        assert_eq!(c.get_transfer(id).await.unwrap().status, TransferStatus::Delivered);
    }

    #[tokio::test]
    async fn test_deliver_with_unknown_shipped_recipe_rolls_back() {
        let (c, store, audit) = setup().await;
        let id = approved_transfer(&c, &store).await;
        ship_extra(&store, id, &[Line::recipe(99, 1)]).await;

        assert_eq!(
            c.deliver(id, ALICE).await,
            Err(TransferError::not_found("Recipe", 99))
        );
        let t = c.get_transfer(id).await.unwrap();
        assert_eq!(t.status, TransferStatus::Approved);
        assert!(t.received_at.is_none());
        assert_eq!(on_hand(&store, 2, 10).await, Decimal::ZERO);
        assert_eq!(audit.events_for(id).len(), 2);
    }

    #[tokio::test]
    async fn test_approve_skips_zero_quantity_ingredients() {
        let (c, store, _) = setup().await;
        store.add_recipe(
            7,
            vec![ingredient(10, Decimal::ZERO), ingredient(11, Decimal::ONE)],
        );
        store.set_stock(1, 11, Decimal::from(5)).await;
        let lines = vec![Line::recipe(7, 2)];
        let id = c
            .create(CreateTransferRequest::new(Some(1), 2, lines.clone()), ALICE)
            .await
            .unwrap();

        c.approve(id, ApprovalRequest::new(new_driver(), lines), BOB)
            .await
            .unwrap();

        let shipped = c.distribute_transfer_items(id, false).await.unwrap();
        assert_eq!(
            shipped.inventory,
            vec![crate::transfer::types::ItemQuantity::new(11, 2)]
        );
        assert_eq!(on_hand(&store, 1, 11).await, Decimal::from(3));
    }

    #[tokio::test]
    async fn test_oversized_approval_fails_and_keeps_pending() {
        let (c, store, _) = setup().await;
        store.set_stock(1, 1, Decimal::from(5)).await;
        let id = c
            .create(CreateTransferRequest::new(Some(1), 2, vec![Line::item(1, 1)]), ALICE)
            .await
            .unwrap();

        let huge = vec![Line::item(1, Decimal::MAX), Line::item(1, Decimal::MAX)];
        assert!(matches!(
            c.approve(id, ApprovalRequest::new(new_driver(), huge), BOB).await,
            Err(TransferError::Validation(_))
        ));
        assert_eq!(c.get_transfer(id).await.unwrap().status, TransferStatus::Pending);
        assert_eq!(on_hand(&store, 1, 1).await, Decimal::from(5));
        assert!(store.drivers_for_store(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_external_catalog_replaces_store_recipes() {
        let (c, store, _) = setup().await;
        store.add_recipe(7, vec![ingredient(10, Decimal::from(100))]);
        let c = c.with_catalog(Arc::new(
            StaticCatalog::new().with_recipe(7, vec![ingredient(10, Decimal::ONE)]),
        ));
        store.set_stock(1, 10, Decimal::from(3)).await;
        let lines = vec![Line::recipe(7, 3)];
        let id = c
            .create(CreateTransferRequest::new(Some(1), 2, lines.clone()), ALICE)
            .await
            .unwrap();

        c.approve(id, ApprovalRequest::new(new_driver(), lines), BOB)
            .await
            .unwrap();
        assert_eq!(on_hand(&store, 1, 10).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_detail_and_missing_transfer() {
        let (c, store, _) = setup().await;
        store.set_stock(1, 10, Decimal::from(10)).await;
        let id = c
            .create(CreateTransferRequest::new(Some(1), 2, vec![Line::item(10, 2)]), ALICE)
            .await
            .unwrap();
        c.approve(id, ApprovalRequest::new(new_driver(), vec![Line::item(10, 2)]), BOB)
            .await
            .unwrap();

        let detail = c.get_transfer_detail(id).await.unwrap();
        assert_eq!(detail.from_store.map(|s| s.id), Some(1));
        assert_eq!(detail.to_store.map(|s| s.name), Some("Store 2".to_string()));
        assert_eq!(detail.requested_items.len(), 1);
        assert_eq!(detail.shipped_items.len(), 1);

        assert_eq!(
            c.get_transfer_detail(999).await,
            Err(TransferError::not_found("Transfer", 999))
        );
        assert_eq!(
            c.distribute_transfer_items(999, true).await,
            Err(TransferError::not_found("Transfer", 999))
        );
    }
}
