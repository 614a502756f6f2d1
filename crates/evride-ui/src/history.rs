//! Customer rental history grouped for display.

use chrono::{DateTime, Utc};
use evride_core::{Rental, RentalId, RentalStatus};

use crate::{format_amount, package_label, status_badge};

/// One rental in the history list.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Rental shown.
    pub rental_id: RentalId,
    /// Canonical status.
    pub status: RentalStatus,
    /// Short status badge.
    pub badge: &'static str,
    /// Vehicle label.
    pub vehicle: String,
    /// Origin station name, when the snapshot names one.
    pub station: Option<String>,
    /// Package label with its duration.
    pub package: String,
    /// Formatted total cost.
    pub total_cost: String,
    /// Pickup time.
    pub started: Option<DateTime<Utc>>,
    /// Return time.
    pub ended: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    /// Projects one rental.
    pub fn project(rental: &Rental) -> Self {
        Self {
            rental_id: rental.id,
            status: rental.status,
            badge: status_badge(rental.status),
            vehicle: rental.vehicle.label(),
            station: rental.vehicle.origin_station_name().map(str::to_string),
            package: package_label(rental),
            total_cost: format_amount(rental.total_cost),
            started: rental.start_time,
            ended: rental.end_time,
        }
    }

    /// Returns `true` while the rental still needs the customer.
    pub fn is_ongoing(&self) -> bool {
        matches!(
            self.status,
            RentalStatus::Pending | RentalStatus::Paid | RentalStatus::Active
        )
    }
}

/// Rentals of one customer split into ongoing and past, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RentalHistory {
    /// Pending, paid and active rentals.
    pub ongoing: Vec<HistoryEntry>,
    /// Completed and cancelled rentals.
    pub past: Vec<HistoryEntry>,
}

impl RentalHistory {
    /// Groups `rentals`, dropping duplicate ids.
    pub fn project(rentals: &[Rental]) -> Self {
        let mut entries: Vec<HistoryEntry> = rentals.iter().map(HistoryEntry::project).collect();
        entries.sort_by(|left, right| right.rental_id.cmp(&left.rental_id));
        entries.dedup_by_key(|entry| entry.rental_id);

        let (ongoing, past) = entries.into_iter().partition(HistoryEntry::is_ongoing);
        Self { ongoing, past }
    }

    /// Returns `true` when the customer has no rentals at all.
    pub fn is_empty(&self) -> bool {
        self.ongoing.is_empty() && self.past.is_empty()
    }
}
