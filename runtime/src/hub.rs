//! Hub reference-point management.

use driver_queue_core::environment::{Clock, IdentityContext, LocationProvider};
use driver_queue_core::error::QueueError;
use driver_queue_core::geo::Coordinates;
use driver_queue_core::hub_settings::{AdminProfile, HubSettingsStore, ReferencePoint};
use std::sync::Arc;

/// Reads and changes the hub reference point.
#[derive(Clone)]
pub struct HubSettingsService {
    settings: Arc<dyn HubSettingsStore>,
    clock: Arc<dyn Clock>,
    location: Arc<dyn LocationProvider>,
    identity: Arc<dyn IdentityContext>,
}

impl HubSettingsService {
    /// Create a service over `settings`.
    #[must_use]
    pub fn new(
        settings: Arc<dyn HubSettingsStore>,
        clock: Arc<dyn Clock>,
        location: Arc<dyn LocationProvider>,
        identity: Arc<dyn IdentityContext>,
    ) -> Self {
        Self {
            settings,
            clock,
            location,
            identity,
        }
    }

    /// The configured reference point, if any.
    ///
    /// # Errors
    ///
    /// [`QueueError::StoreUnavailable`] on backend failure.
    pub async fn reference_point(&self) -> Result<Option<ReferencePoint>, QueueError> {
        Ok(self.settings.load_reference_point().await?)
    }

    /// Move the reference point to `latitude`, `longitude` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// - [`QueueError::PermissionDenied`]: `actor` is not a master administrator
    /// - [`QueueError::InvalidCoordinates`]: not a position on the globe
    /// - [`QueueError::StoreUnavailable`]: backend failure
    #[tracing::instrument(skip(self, actor), fields(admin = %actor.name))]
    pub async fn set_reference_point(
        &self,
        actor: &AdminProfile,
        latitude: f64,
        longitude: f64,
    ) -> Result<ReferencePoint, QueueError> {
        if !actor.is_master() {
            tracing::warn!("Reference point change refused");
            return Err(QueueError::PermissionDenied(format!(
                "{} may not change the hub reference point",
                actor.name
            )));
        }

        let coordinates = Coordinates::new(latitude, longitude);
        if !coordinates.is_valid() {
            return Err(QueueError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }

        let point = ReferencePoint {
            coordinates,
            updated_at: self.clock.now(),
            updated_by: actor.name.clone(),
        };
        self.settings.save_reference_point(point.clone()).await?;
        tracing::info!(coordinates = %point.coordinates, "Reference point updated");
        Ok(point)
    }

    /// Move the reference point to where the signed-in administrator is standing.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotAuthenticated`]: no administrator is signed in
    /// - [`QueueError::LocationUnavailable`]: no device position, or one off the globe
    /// - otherwise as [`HubSettingsService::set_reference_point`]
    pub async fn set_reference_point_here(&self) -> Result<ReferencePoint, QueueError> {
        let actor = self
            .identity
            .current_admin()
            .ok_or(QueueError::NotAuthenticated)?;
        let position = self
            .location
            .current_position()
            .await
            .map_err(|e| QueueError::LocationUnavailable(e.to_string()))?;
        if !position.is_valid() {
            return Err(QueueError::LocationUnavailable(format!(
                "device reported an invalid position {position}"
            )));
        }
        self.set_reference_point(&actor, position.latitude, position.longitude)
            .await
    }
}
