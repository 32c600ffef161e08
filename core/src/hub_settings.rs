//! Hub reference point: where drivers must stand to request a ticket.
//!
//! The reference point is shared configuration owned by the settings store. Only a
//! master administrator may move it; the ticket issuer just reads it.

use crate::geo::Coordinates;
use crate::queue_store::StoreFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configured hub location with audit fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    /// Hub position
    pub coordinates: Coordinates,
    /// When it was last changed
    pub updated_at: DateTime<Utc>,
    /// Display name of the administrator who changed it
    pub updated_by: String,
}

/// Administrator privilege level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    /// May change hub-wide settings
    Master,
    /// May operate the queue only
    Operator,
}

/// A signed-in administrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminProfile {
    /// Identity-provider uid
    pub admin_id: String,
    /// Display name
    pub name: String,
    /// Privilege level
    pub role: AdminRole,
}

impl AdminProfile {
    /// Whether this administrator may change hub-wide settings.
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.role == AdminRole::Master
    }
}

/// Storage for hub-wide settings.
pub trait HubSettingsStore: Send + Sync {
    /// Read the reference point, if one has been configured.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: backend unreachable
    /// - `Serialization`: the stored value could not be decoded
    fn load_reference_point(&self) -> StoreFuture<'_, Option<ReferencePoint>>;

    /// Overwrite the reference point.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: backend unreachable
    fn save_reference_point(&self, point: ReferencePoint) -> StoreFuture<'_, ()>;
}
