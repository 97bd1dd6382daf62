use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfferId(pub String);

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A partner discount offer as published in the catalog. Catalog CRUD lives
/// elsewhere; this crate reads offers and bumps `current_redemptions` when a
/// redemption finalizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub points_cost: u64,
    pub validity_days: u32,
    pub max_redemptions: Option<u32>,
    pub current_redemptions: u32,
    pub min_purchase: Option<u64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Offer {
    /// Whether another redemption may still be issued against this offer.
    pub fn has_capacity(&self) -> bool {
        self.max_redemptions.map_or(true, |max| self.current_redemptions < max)
    }
}
