//! Domain types for tracked entities.
//!
//! Loads and carriers share the same position model; each kind has its own
//! status lifecycle.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

use crate::error::ValidationError;

/// Which table a tracked entity lives in
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    AsRefStr,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Load,
    Carrier,
}

/// Load lifecycle: available → booked → in_transit → delivered → completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, IntoStaticStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Available,
    Booked,
    InTransit,
    Delivered,
    Completed,
}

/// Carrier availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, IntoStaticStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CarrierStatus {
    Active,
    Inactive,
    Maintenance,
}

impl EntityKind {
    /// Normalize a free-form status to this kind's lifecycle state, if it is one.
    pub fn lifecycle_status(&self, status: &str) -> Option<&'static str> {
        let status = status.trim();
        match self {
            EntityKind::Load => status.parse::<LoadStatus>().ok().map(|s| s.into()),
            EntityKind::Carrier => status.parse::<CarrierStatus>().ok().map(|s| s.into()),
        }
    }
}

/// A complete coordinate pair. There is no way to hold half a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    lat: f64,
    lng: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(ValidationError::Latitude(lat));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(ValidationError::Longitude(lng));
        }
        Ok(Self { lat, lng })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// `[lat, lng]` as sent in carrier snapshots
    pub fn as_pair(&self) -> [f64; 2] {
        [self.lat, self.lng]
    }
}
