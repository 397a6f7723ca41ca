use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stock lot of one medicine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Batch {
    pub id: i64,
    pub medicine_id: i64,
    pub quantity: i32,
    pub import_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub status: BatchStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// Active and not past its expiry date on `today`.
    pub fn is_dispensable(&self, today: NaiveDate) -> bool {
        self.status == BatchStatus::Active && self.expiry_date >= today && self.quantity > 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BatchStatus {
    Active,
    Expired,
    Disposed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Active => "Active",
            BatchStatus::Expired => "Expired",
            BatchStatus::Disposed => "Disposed",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
