use log::info;
use serde::Deserialize;
use serde_json::json;

use super::{
    check_transition, long_text, opt_long_text, opt_short_text, Service, ServiceError,
};
use crate::authorization::{AccessDenied, Action, Resource};
use crate::models::{
    timestamp_now, AuditAction, AuditEntry, EntityType, ResourceID, SupplyRequest,
    SupplyRequestID, SupplyRequestStatus, UserData,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewSupplyRequest {
    pub resource_id: Option<ResourceID>,
    /// Defaults to the linked resource's name
    pub item_name: Option<String>,
    pub quantity: u32,
    pub unit_cost_cents: i64,
    pub supplier: Option<String>,
    pub justification: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Review {
    pub note: Option<String>,
}

impl Service {
    pub async fn create_supply_request(
        &self,
        actor: &UserData,
        input: NewSupplyRequest,
    ) -> Result<SupplyRequest, ServiceError> {
        self.enforce(actor).create(Resource::Procurement)?;

        if input.quantity == 0 {
            return Err(ServiceError::Invalid("quantity"));
        }
        if input.unit_cost_cents < 0 {
            return Err(ServiceError::Invalid("unit_cost_cents"));
        }
        let justification = long_text("justification", &input.justification)?;
        let supplier = opt_short_text("supplier", input.supplier.as_deref())?;

        let linked = match input.resource_id {
            Some(resource_id) => Some(self.db.get_resource(resource_id).await?),
            None => None,
        };
        let item_name = match (opt_short_text("item_name", input.item_name.as_deref())?, linked) {
            (Some(name), _) => name,
            (None, Some(resource)) => resource.name,
            (None, None) => return Err(ServiceError::Invalid("item_name")),
        };

        let request = SupplyRequest {
            id: SupplyRequestID::new(),
            resource_id: input.resource_id,
            item_name,
            quantity: input.quantity,
            unit_cost_cents: input.unit_cost_cents,
            supplier,
            justification,
            status: SupplyRequestStatus::Pending,
            requested_by: actor.id,
            reviewed_by: None,
            review_note: None,
            created_at: timestamp_now(),
            reviewed_at: None,
            fulfilled_at: None,
        };

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Create,
            EntityType::SupplyRequest,
            request.id,
            json!({
                "item": request.item_name,
                "quantity": request.quantity,
                "total_cost_cents": request.total_cost_cents(),
            }),
        );
        self.db.insert_supply_request(&request, &audit).await?;
        Ok(request)
    }

    pub async fn get_supply_request(
        &self,
        actor: &UserData,
        id: SupplyRequestID,
    ) -> Result<SupplyRequest, ServiceError> {
        self.enforce(actor).read(Resource::Procurement)?;
        Ok(self.db.get_supply_request(id).await?)
    }

    pub async fn list_supply_requests(
        &self,
        actor: &UserData,
        status: Option<SupplyRequestStatus>,
    ) -> Result<Vec<SupplyRequest>, ServiceError> {
        self.enforce(actor).read(Resource::Procurement)?;
        Ok(self.db.list_supply_requests(status).await?)
    }

    pub async fn approve_supply_request(
        &self,
        actor: &UserData,
        id: SupplyRequestID,
        review: Review,
    ) -> Result<SupplyRequest, ServiceError> {
        self.review_supply_request(actor, id, SupplyRequestStatus::Approved, review)
            .await
    }

    /// A rejection must say why
    pub async fn reject_supply_request(
        &self,
        actor: &UserData,
        id: SupplyRequestID,
        review: Review,
    ) -> Result<SupplyRequest, ServiceError> {
        self.review_supply_request(actor, id, SupplyRequestStatus::Rejected, review)
            .await
    }

    async fn review_supply_request(
        &self,
        actor: &UserData,
        id: SupplyRequestID,
        decision: SupplyRequestStatus,
        review: Review,
    ) -> Result<SupplyRequest, ServiceError> {
        self.enforce(actor).approve(Resource::Procurement)?;

        let note = opt_long_text("note", review.note.as_deref())?;
        if decision == SupplyRequestStatus::Rejected && note.is_none() {
            return Err(ServiceError::Invalid("note"));
        }

        let mut request = self.db.get_supply_request(id).await?;
        if request.requested_by == actor.id {
            info!("{} tried to review their own request {}", actor.username, request.id);
            return Err(AccessDenied.into());
        }
        let previous = request.status;
        check_transition(previous, decision)?;

        request.status = decision;
        request.reviewed_by = Some(actor.id);
        request.review_note = note;
        request.reviewed_at = Some(timestamp_now());

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::StatusChange,
            EntityType::SupplyRequest,
            request.id,
            json!({ "from": previous, "to": decision, "note": request.review_note }),
        );
        self.db
            .update_supply_request_status(&request, previous, &audit)
            .await?;
        Ok(request)
    }

    /// Marks an approved request as delivered, restocking its linked resource
    pub async fn fulfil_supply_request(
        &self,
        actor: &UserData,
        id: SupplyRequestID,
    ) -> Result<SupplyRequest, ServiceError> {
        self.enforce(actor).update(Resource::Procurement)?;

        let mut request = self.db.get_supply_request(id).await?;
        let previous = request.status;
        check_transition(previous, SupplyRequestStatus::Fulfilled)?;

        // The stock has to fit before the delivery is booked
        if let Some(resource_id) = request.resource_id {
            self.db.get_resource(resource_id).await?.restock(request.quantity)?;
        }

        request.status = SupplyRequestStatus::Fulfilled;
        request.fulfilled_at = Some(timestamp_now());

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::StatusChange,
            EntityType::SupplyRequest,
            request.id,
            json!({
                "from": previous,
                "to": request.status,
                "restocked": request.resource_id.map(|id| json!({ "resource_id": id, "quantity": request.quantity })),
            }),
        );
        self.db
            .update_supply_request_status(&request, previous, &audit)
            .await?;

        info!("Supply request {} fulfilled ({} x {})", request.id, request.quantity, request.item_name);
        Ok(request)
    }

    /// Withdrawn by the requester, or by a reviewer
    pub async fn cancel_supply_request(
        &self,
        actor: &UserData,
        id: SupplyRequestID,
    ) -> Result<SupplyRequest, ServiceError> {
        let ctx = self.enforce(actor);
        ctx.read(Resource::Procurement)?;

        let mut request = self.db.get_supply_request(id).await?;
        if request.requested_by != actor.id {
            ctx.require(Resource::Procurement, Action::Approve)?;
        }
        let previous = request.status;
        check_transition(previous, SupplyRequestStatus::Cancelled)?;
        request.status = SupplyRequestStatus::Cancelled;

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::StatusChange,
            EntityType::SupplyRequest,
            request.id,
            json!({ "from": previous, "to": request.status }),
        );
        self.db
            .update_supply_request_status(&request, previous, &audit)
            .await?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceCategory, Role};
    use crate::services::test_support::{actor, service};
    use crate::services::NewResource;

    fn oxygen(resource_id: Option<ResourceID>) -> NewSupplyRequest {
        NewSupplyRequest {
            resource_id,
            item_name: None,
            quantity: 10,
            unit_cost_cents: 850_000,
            supplier: Some("BOC Kenya".to_string()),
            justification: "ICU consumption doubled this month".to_string(),
        }
    }

    #[tokio::test]
    async fn test_approve_then_fulfil_restocks() {
        let service = service().await;
        let buyer = actor(&service, Role::ProcurementOfficer, "buyer").await;
        let finance = actor(&service, Role::FinanceOfficer, "finance").await;
        let nurse = actor(&service, Role::Nurse, "nurse").await;

        let cylinders = service
            .create_resource(
                &buyer,
                NewResource {
                    name: "Oxygen cylinder".to_string(),
                    category: ResourceCategory::Supply,
                    department: "ICU".to_string(),
                    unit: "cylinder".to_string(),
                    total_quantity: 4,
                    available_quantity: Some(1),
                    reorder_level: 2,
                },
            )
            .await
            .unwrap();

        let request = service
            .create_supply_request(&nurse, oxygen(Some(cylinders.id)))
            .await
            .unwrap();
        assert_eq!(request.item_name, "Oxygen cylinder");
        assert_eq!(request.total_cost_cents(), 8_500_000);

        // Fulfilment needs an approval first
        assert!(matches!(
            service.fulfil_supply_request(&buyer, request.id).await,
            Err(ServiceError::InvalidTransition { .. })
        ));

        let approved = service
            .approve_supply_request(&finance, request.id, Review::default())
            .await
            .unwrap();
        assert_eq!(approved.reviewed_by, Some(finance.id));

        service.fulfil_supply_request(&buyer, request.id).await.unwrap();
        let restocked = service.get_resource(&buyer, cylinders.id).await.unwrap();
        assert_eq!((restocked.total_quantity, restocked.available_quantity), (14, 11));
    }

    #[tokio::test]
    async fn test_fulfilment_refuses_stock_past_the_maximum() {
        let service = service().await;
        let buyer = actor(&service, Role::ProcurementOfficer, "buyer").await;
        let finance = actor(&service, Role::FinanceOfficer, "finance").await;

        let gauze = service
            .create_resource(
                &buyer,
                NewResource {
                    name: "Gauze swab".to_string(),
                    category: ResourceCategory::Supply,
                    department: "Central stores".to_string(),
                    unit: "swab".to_string(),
                    total_quantity: 4_000_000_000,
                    available_quantity: None,
                    reorder_level: 1_000,
                },
            )
            .await
            .unwrap();

        let mut input = oxygen(Some(gauze.id));
        input.quantity = 1_000_000_000;
        input.unit_cost_cents = 1;
        let request = service.create_supply_request(&buyer, input).await.unwrap();
        service
            .approve_supply_request(&finance, request.id, Review::default())
            .await
            .unwrap();

        assert!(matches!(
            service.fulfil_supply_request(&buyer, request.id).await,
            Err(ServiceError::Conflict(_))
        ));

        // Nothing moved: the request is still approved and the line still reads
        let unchanged = service.get_resource(&buyer, gauze.id).await.unwrap();
        assert_eq!(unchanged.total_quantity, 4_000_000_000);
        let request = service.get_supply_request(&buyer, request.id).await.unwrap();
        assert_eq!(request.status, SupplyRequestStatus::Approved);
        assert!(service.list_resources(&buyer, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_reviewers_cannot_review_their_own_requests() {
        let service = service().await;
        let buyer = actor(&service, Role::ProcurementOfficer, "buyer").await;
        let mut input = oxygen(None);
        input.item_name = Some("Suction catheters".to_string());
        let request = service.create_supply_request(&buyer, input).await.unwrap();

        assert!(matches!(
            service.approve_supply_request(&buyer, request.id, Review::default()).await,
            Err(ServiceError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_rejection_needs_a_note_and_cancel_rights() {
        let service = service().await;
        let nurse = actor(&service, Role::Nurse, "nurse").await;
        let other_nurse = actor(&service, Role::Nurse, "other_nurse").await;
        let finance = actor(&service, Role::FinanceOfficer, "finance").await;

        let mut input = oxygen(None);
        input.item_name = Some("Gauze rolls".to_string());
        let first = service.create_supply_request(&nurse, input.clone()).await.unwrap();
        let second = service.create_supply_request(&nurse, input).await.unwrap();

        assert!(matches!(
            service.reject_supply_request(&finance, first.id, Review::default()).await,
            Err(ServiceError::Invalid("note"))
        ));
        let rejected = service
            .reject_supply_request(&finance, first.id, Review { note: Some("Over budget".to_string()) })
            .await
            .unwrap();
        assert_eq!(rejected.status, SupplyRequestStatus::Rejected);

        assert!(matches!(
            service.cancel_supply_request(&other_nurse, second.id).await,
            Err(ServiceError::AccessDenied(_))
        ));
        let cancelled = service.cancel_supply_request(&nurse, second.id).await.unwrap();
        assert_eq!(cancelled.status, SupplyRequestStatus::Cancelled);

        assert_eq!(
            service
                .list_supply_requests(&finance, Some(SupplyRequestStatus::Pending))
                .await
                .unwrap()
                .len(),
            0
        );
    }

    #[tokio::test]
    async fn test_request_validation() {
        let service = service().await;
        let nurse = actor(&service, Role::Nurse, "nurse").await;

        assert!(matches!(
            service.create_supply_request(&nurse, oxygen(None)).await,
            Err(ServiceError::Invalid("item_name"))
        ));
        let mut none = oxygen(None);
        none.item_name = Some("Gloves".to_string());
        none.quantity = 0;
        assert!(matches!(
            service.create_supply_request(&nurse, none).await,
            Err(ServiceError::Invalid("quantity"))
        ));
    }
}
