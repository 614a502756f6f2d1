//! Preorder checkout and rental history.

use evride_core::{PackageId, RentalPackage, UserId, VehicleId};
use evride_remote::{PreorderRequest, RemoteAuthority};
use evride_session::SessionContext;
use evride_ui::{RentalHistory, format_amount};

use crate::AppError;

/// Priced preorder awaiting the customer's confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PreorderQuote {
    request: PreorderRequest,
    package: RentalPackage,
}

impl PreorderQuote {
    /// Quotes `vehicle` on `package` for `user`, using the advertised packages.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] without a signed-in customer and
    /// [`AppError::Checkout`] for a package that is not offered.
    pub fn prepare(
        packages: &[RentalPackage],
        user: Option<UserId>,
        vehicle: VehicleId,
        package: PackageId,
    ) -> Result<Self, AppError> {
        let user_id = user.ok_or_else(|| {
            AppError::Config("EVRIDE_USER_ID must be set to place a preorder".to_string())
        })?;
        let package = packages
            .iter()
            .find(|offered| offered.id == package)
            .cloned()
            .ok_or_else(|| AppError::Checkout(format!("package {package} is not offered")))?;

        Ok(Self {
            request: PreorderRequest {
                user_id,
                vehicle_id: vehicle,
                package_id: package.id,
            },
            package,
        })
    }

    /// Body for the preorder call.
    pub fn request(&self) -> &PreorderRequest {
        &self.request
    }

    /// Question shown above the summary.
    pub fn headline(&self) -> String {
        format!("Ready to reserve vehicle #{}?", self.request.vehicle_id)
    }

    /// Summary lines.
    pub fn lines(&self) -> Vec<String> {
        vec![
            format!(
                "Package: {} ({}h)",
                self.package.name, self.package.duration_hours
            ),
            format!("Price: {}", format_amount(self.package.price)),
        ]
    }
}

/// Fetches and groups the signed-in customer's rentals.
///
/// # Errors
/// Returns [`AppError::Config`] without a signed-in customer and
/// [`AppError::Remote`] when the authority fails.
pub async fn load_history(
    remote: &dyn RemoteAuthority,
    session: &SessionContext,
) -> Result<RentalHistory, AppError> {
    let user_id = session.user_id().ok_or_else(|| {
        AppError::Config("EVRIDE_USER_ID must be set to list rentals".to_string())
    })?;
    let rentals = remote.list_user_rentals(user_id).await?;
    tracing::debug!(%user_id, count = rentals.len(), "rental history loaded");
    Ok(RentalHistory::project(&rentals))
}
