use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};
use thiserror::Error;

use super::ResourceID;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    AsRefStr,
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceCategory {
    Bed,
    Equipment,
    Medication,
    Supply,
    Blood,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    #[error("only {available} available")]
    Insufficient { available: u32 },
    #[error("release would exceed the total of {total}")]
    OverRelease { total: u32 },
    #[error("{in_use} are in use, total cannot drop below that")]
    TotalBelowInUse { in_use: u32 },
    #[error("restock would take the total of {total} past the maximum stock")]
    StockOverflow { total: u32 },
}

/// A stocked item or a pool of beds. `available <= total` always holds.
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    pub id: ResourceID,
    pub name: String,
    pub category: ResourceCategory,
    pub department: String,
    pub unit: String,
    pub total_quantity: u32,
    pub available_quantity: u32,
    pub reorder_level: u32,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    pub fn in_use(&self) -> u32 {
        self.total_quantity - self.available_quantity
    }

    /// Share of the total in use, in percent with one decimal
    pub fn utilization_percent(&self) -> f64 {
        utilization_percent(self.total_quantity, self.available_quantity)
    }

    pub fn is_low_stock(&self) -> bool {
        self.available_quantity <= self.reorder_level
    }

    pub fn allocate(&mut self, quantity: u32) -> Result<(), CapacityError> {
        if quantity == 0 {
            return Err(CapacityError::ZeroQuantity);
        }
        if quantity > self.available_quantity {
            return Err(CapacityError::Insufficient {
                available: self.available_quantity,
            });
        }
        self.available_quantity -= quantity;
        Ok(())
    }

    pub fn release(&mut self, quantity: u32) -> Result<(), CapacityError> {
        if quantity == 0 {
            return Err(CapacityError::ZeroQuantity);
        }
        match self.available_quantity.checked_add(quantity) {
            Some(available) if available <= self.total_quantity => {
                self.available_quantity = available;
                Ok(())
            }
            _ => Err(CapacityError::OverRelease {
                total: self.total_quantity,
            }),
        }
    }

    /// Changes the total while keeping the quantity in use
    pub fn resize(&mut self, total: u32) -> Result<(), CapacityError> {
        let in_use = self.in_use();
        if total < in_use {
            return Err(CapacityError::TotalBelowInUse { in_use });
        }
        self.total_quantity = total;
        self.available_quantity = total - in_use;
        Ok(())
    }

    /// New stock received: both total and available grow
    pub fn restock(&mut self, quantity: u32) -> Result<(), CapacityError> {
        let overflow = CapacityError::StockOverflow {
            total: self.total_quantity,
        };
        let total = self.total_quantity.checked_add(quantity).ok_or(overflow)?;
        let available = self.available_quantity.checked_add(quantity).ok_or(overflow)?;
        self.total_quantity = total;
        self.available_quantity = available;
        Ok(())
    }
}

/// `(total - available) / total` in percent, rounded to one decimal; 0 for an empty pool
pub fn utilization_percent(total: u32, available: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let in_use = f64::from(total.saturating_sub(available));
    (in_use / f64::from(total) * 1000.0).round() / 10.0
}
