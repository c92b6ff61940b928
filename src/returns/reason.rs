//! Return reason catalogue

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::traits::*;
use crate::types::*;

/// Fields of a return reason as entered by staff
#[derive(Debug, Clone, PartialEq)]
pub struct ReasonRequest {
    pub name: String,
    pub description: String,
    pub restocks_inventory: bool,
    pub requires_note: bool,
    pub sort_order: u32,
    pub is_active: bool,
}

impl ReasonRequest {
    /// Create a request for an active reason that restocks inventory
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            restocks_inventory: true,
            requires_note: false,
            sort_order: 0,
            is_active: true,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn restocks_inventory(mut self, restocks: bool) -> Self {
        self.restocks_inventory = restocks;
        self
    }

    pub fn requires_note(mut self, requires_note: bool) -> Self {
        self.requires_note = requires_note;
        self
    }

    pub fn sort_order(mut self, sort_order: u32) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    fn apply_to(self, reason: &mut ReturnReason) {
        reason.name = self.name.trim().to_string();
        reason.description = self.description;
        reason.restocks_inventory = self.restocks_inventory;
        reason.requires_note = self.requires_note;
        reason.sort_order = self.sort_order;
        reason.is_active = self.is_active;
    }
}

/// Reason manager for handling the reason catalogue
pub struct ReasonManager<S: ReturnsStorage> {
    pub(crate) storage: S,
    validator: Box<dyn ReasonValidator>,
}

impl<S: ReturnsStorage> ReasonManager<S> {
    /// Create a new reason manager
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultReasonValidator),
        }
    }

    /// Create a new reason manager with custom validator
    pub fn with_validator(storage: S, validator: Box<dyn ReasonValidator>) -> Self {
        Self { storage, validator }
    }

    /// Create a new reason
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_reason(&mut self, request: ReasonRequest) -> ReturnsResult<ReturnReason> {
        let mut reason = ReturnReason::new(String::new());
        request.apply_to(&mut reason);

        self.validator.validate_reason(&reason)?;
        self.ensure_unique_name(&reason).await?;

        self.storage.save_reason(&reason).await?;
        debug!(reason_id = %reason.id, "Created return reason");

        Ok(reason)
    }

    /// Get a reason by ID, skipping deleted ones
    pub async fn get_reason(&self, reason_id: Uuid) -> ReturnsResult<Option<ReturnReason>> {
        Ok(self
            .storage
            .get_reason(reason_id)
            .await?
            .filter(|reason| !reason.is_deleted))
    }

    /// Get a reason by ID, returning an error if not found
    pub async fn get_reason_required(&self, reason_id: Uuid) -> ReturnsResult<ReturnReason> {
        self.get_reason(reason_id)
            .await?
            .ok_or_else(|| ReturnsError::ReasonNotFound(reason_id.to_string()))
    }

    /// List reasons ordered by sort order, then name
    pub async fn list_reasons(&self, include_inactive: bool) -> ReturnsResult<Vec<ReturnReason>> {
        let mut reasons: Vec<ReturnReason> = self
            .storage
            .list_reasons()
            .await?
            .into_iter()
            .filter(|reason| !reason.is_deleted && (include_inactive || reason.is_active))
            .collect();
        reasons.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(reasons)
    }

    /// Replace the editable fields of a reason
    pub async fn update_reason(
        &mut self,
        reason_id: Uuid,
        request: ReasonRequest,
    ) -> ReturnsResult<ReturnReason> {
        let mut reason = self.get_reason_required(reason_id).await?;
        request.apply_to(&mut reason);
        reason.updated_at = now();

        self.validator.validate_reason(&reason)?;
        self.ensure_unique_name(&reason).await?;

        self.storage.update_reason(&reason).await?;
        Ok(reason)
    }

    /// Soft-delete a reason; returns already using it keep the reference
    pub async fn delete_reason(&mut self, reason_id: Uuid) -> ReturnsResult<()> {
        let mut reason = self.get_reason_required(reason_id).await?;
        reason.is_deleted = true;
        reason.updated_at = now();
        self.storage.update_reason(&reason).await
    }

    async fn ensure_unique_name(&self, reason: &ReturnReason) -> ReturnsResult<()> {
        let name = reason.name.to_lowercase();
        let clash = self
            .storage
            .list_reasons()
            .await?
            .into_iter()
            .any(|other| {
                !other.is_deleted && other.id != reason.id && other.name.to_lowercase() == name
            });
        if clash {
            return Err(ReturnsError::Validation(format!(
                "Return reason '{}' already exists",
                reason.name
            )));
        }
        Ok(())
    }
}

/// Utility functions for working with reasons
pub mod utils {
    use super::*;
    use std::collections::HashMap;

    /// Create the reasons most stores start with
    pub async fn create_standard_reasons<S: ReturnsStorage>(
        manager: &mut ReasonManager<S>,
    ) -> ReturnsResult<HashMap<String, ReturnReason>> {
        let mut reasons = HashMap::new();

        let defective = manager
            .create_reason(
                ReasonRequest::new("Defective")
                    .description("Product does not work as expected")
                    .restocks_inventory(false)
                    .sort_order(1),
            )
            .await?;
        reasons.insert("defective".to_string(), defective);

        let wrong_item = manager
            .create_reason(
                ReasonRequest::new("Wrong Item")
                    .description("Customer received or bought the wrong product")
                    .sort_order(2),
            )
            .await?;
        reasons.insert("wrong_item".to_string(), wrong_item);

        let changed_mind = manager
            .create_reason(
                ReasonRequest::new("Changed Mind")
                    .description("Customer no longer wants the product")
                    .sort_order(3),
            )
            .await?;
        reasons.insert("changed_mind".to_string(), changed_mind);

        let damaged = manager
            .create_reason(
                ReasonRequest::new("Damaged in Transit")
                    .description("Product arrived damaged")
                    .restocks_inventory(false)
                    .requires_note(true)
                    .sort_order(4),
            )
            .await?;
        reasons.insert("damaged_in_transit".to_string(), damaged);

        Ok(reasons)
    }
}
