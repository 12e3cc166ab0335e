//! Bed and stock availability across the hospital

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{utilization_percent, Resource, ResourceCategory, ResourceID};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CategoryAvailability {
    pub total: u64,
    pub available: u64,
    pub in_use: u64,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowStockItem {
    pub id: ResourceID,
    pub name: String,
    pub department: String,
    pub available: u32,
    pub reorder_level: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AvailabilitySummary {
    pub by_category: BTreeMap<ResourceCategory, CategoryAvailability>,
    pub low_stock: Vec<LowStockItem>,
}

impl AvailabilitySummary {
    pub fn category(&self, category: ResourceCategory) -> CategoryAvailability {
        self.by_category.get(&category).copied().unwrap_or_default()
    }
}

pub fn summarize(resources: &[Resource]) -> AvailabilitySummary {
    let mut summary = AvailabilitySummary::default();

    for resource in resources {
        let slot = summary.by_category.entry(resource.category).or_default();
        slot.total += u64::from(resource.total_quantity);
        slot.available += u64::from(resource.available_quantity);

        if resource.is_low_stock() {
            summary.low_stock.push(LowStockItem {
                id: resource.id,
                name: resource.name.clone(),
                department: resource.department.clone(),
                available: resource.available_quantity,
                reorder_level: resource.reorder_level,
            });
        }
    }

    for slot in summary.by_category.values_mut() {
        slot.in_use = slot.total - slot.available;
        // Category totals can exceed u32, scale down before the percentage
        let scale = (slot.total / u64::from(u32::MAX)) + 1;
        slot.utilization_percent = utilization_percent(
            (slot.total / scale) as u32,
            (slot.available / scale) as u32,
        );
    }

    summary
        .low_stock
        .sort_by(|a, b| a.available.cmp(&b.available).then_with(|| a.name.cmp(&b.name)));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn resource(name: &str, category: ResourceCategory, total: u32, available: u32, reorder: u32) -> Resource {
        Resource {
            id: ResourceID::new(),
            name: name.to_string(),
            category,
            department: "General".to_string(),
            unit: "unit".to_string(),
            total_quantity: total,
            available_quantity: available,
            reorder_level: reorder,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_groups_by_category() {
        let summary = summarize(&[
            resource("Ward bed", ResourceCategory::Bed, 40, 10, 5),
            resource("ICU bed", ResourceCategory::Bed, 8, 1, 2),
            resource("Ventilator", ResourceCategory::Equipment, 6, 6, 1),
            resource("Paracetamol 500mg", ResourceCategory::Medication, 1000, 150, 200),
        ]);

        let beds = summary.category(ResourceCategory::Bed);
        assert_eq!((beds.total, beds.available, beds.in_use), (48, 11, 37));
        assert_eq!(beds.utilization_percent, 77.1);

        assert_eq!(summary.category(ResourceCategory::Equipment).utilization_percent, 0.0);
        assert_eq!(summary.category(ResourceCategory::Blood), CategoryAvailability::default());
    }

    #[test]
    fn test_low_stock_is_sorted_by_remaining() {
        let summary = summarize(&[
            resource("Paracetamol 500mg", ResourceCategory::Medication, 1000, 150, 200),
            resource("ICU bed", ResourceCategory::Bed, 8, 1, 2),
            resource("Gauze", ResourceCategory::Supply, 500, 400, 50),
        ]);

        let names: Vec<&str> = summary.low_stock.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["ICU bed", "Paracetamol 500mg"]);
    }
}
