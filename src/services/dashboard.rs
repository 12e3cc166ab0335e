use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Service, ServiceError};
use crate::authorization::{Action, Resource};
use crate::capacity::{summarize, CategoryAvailability};
use crate::models::{
    timestamp_now, AmbulanceStatus, ClaimStatus, ResourceCategory, SupplyRequestStatus,
    TransferStatus, UserData,
};
use crate::queue::{queue_stats, QueueStats};

/// Operational overview. A section is left out when the caller may not
/// read what it summarizes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Dashboard {
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_emergencies: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_ambulances: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triage: Option<QueueStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beds: Option<CategoryAvailability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_stock: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_procurement: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_transfers: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_duty_staff: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims_awaiting_decision: Option<u64>,
}

impl Service {
    pub async fn dashboard(&self, actor: &UserData) -> Result<Dashboard, ServiceError> {
        let ctx = self.enforce(actor);
        ctx.read(Resource::Dashboard)?;
        let readable = |resource| ctx.can(resource, Action::Read);

        let now = timestamp_now();
        let mut dashboard = Dashboard {
            generated_at: now,
            ..Default::default()
        };

        if readable(Resource::Emergencies) {
            dashboard.active_emergencies = Some(self.db.list_active_emergencies(None).await?.len());
        }
        if readable(Resource::Ambulances) {
            let available = self
                .db
                .list_ambulances(Some(AmbulanceStatus::Available))
                .await?;
            dashboard.available_ambulances = Some(available.len());
        }
        if readable(Resource::Triage) {
            let active = self.db.list_active_triage().await?;
            dashboard.triage = Some(queue_stats(&active, now));
        }
        if readable(Resource::Resources) {
            let summary = summarize(&self.db.list_resources(None).await?);
            dashboard.beds = Some(summary.category(ResourceCategory::Bed));
            dashboard.low_stock = Some(summary.low_stock.len());
        }
        if readable(Resource::Procurement) {
            dashboard.pending_procurement = Some(
                self.db
                    .count_supply_requests(SupplyRequestStatus::Pending)
                    .await?,
            );
        }
        if readable(Resource::Transfers) {
            dashboard.pending_transfers =
                Some(self.db.count_transfers(TransferStatus::Requested).await?);
        }
        if readable(Resource::Shifts) {
            dashboard.on_duty_staff = Some(self.db.on_duty(now).await?.len());
        }
        if readable(Resource::Claims) {
            let totals = self.db.claim_totals().await?;
            dashboard.claims_awaiting_decision = Some(
                totals
                    .get(&ClaimStatus::Submitted)
                    .map_or(0, |submitted| submitted.count),
            );
        }

        Ok(dashboard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use crate::models::Role;
    use crate::services::test_support::{actor, service};

    #[tokio::test]
    async fn test_sections_follow_permissions() {
        let service = service().await;
        let admin = actor(&service, Role::Admin, "admin").await;
        let finance = actor(&service, Role::FinanceOfficer, "finance").await;
        let nurse = actor(&service, Role::Nurse, "nurse").await;
        let patient = fixtures::stored_patient(service.db(), &nurse, "Amani", "Otieno").await;
        fixtures::stored_triage(service.db(), &nurse, &patient).await;

        let full = service.dashboard(&admin).await.unwrap();
        assert_eq!(full.triage.as_ref().map(|t| t.waiting), Some(1));
        assert_eq!(full.active_emergencies, Some(0));
        assert_eq!(full.claims_awaiting_decision, Some(0));

        let money = service.dashboard(&finance).await.unwrap();
        assert!(money.triage.is_none() && money.active_emergencies.is_none());
        assert_eq!(money.pending_procurement, Some(0));

        let json = serde_json::to_value(&money).unwrap();
        assert!(json.get("triage").is_none());
        assert!(json.get("claims_awaiting_decision").is_some());
    }
}
