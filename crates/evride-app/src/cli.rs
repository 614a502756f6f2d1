//! Command line definition.

use clap::{Parser, Subcommand};
use evride_core::{PackageId, RentalId, VehicleId};

use crate::APP_VERSION;

/// Rental client command line.
#[derive(Debug, Parser)]
#[command(
    name = "evride-app",
    about = "Reserve, pay for, pick up and return rented vehicles",
    version = APP_VERSION,
    after_help = "Side-effecting commands print a summary and only run with --yes."
)]
pub struct Cli {
    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Parsed subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print one rental.
    Show {
        /// Rental id, with or without a leading `#`.
        #[arg(value_parser = parse_rental_id)]
        rental_id: RentalId,
    },
    /// Print the countdown until the rental ends.
    Watch {
        /// Rental id, with or without a leading `#`.
        #[arg(value_parser = parse_rental_id)]
        rental_id: RentalId,
    },
    /// List your ongoing and past rentals.
    History,
    /// Reserve a vehicle on a rental package.
    Preorder {
        /// Vehicle to reserve.
        #[arg(long, value_parser = parse_vehicle_id)]
        vehicle: VehicleId,
        /// Package to rent it on.
        #[arg(long, value_parser = parse_package_id)]
        package: PackageId,
        /// Run without stopping at the summary.
        #[arg(long = "yes", short = 'y')]
        confirmed: bool,
    },
    /// Confirm payment, or pay through the gateway.
    Pay {
        /// Rental id, with or without a leading `#`.
        #[arg(value_parser = parse_rental_id)]
        rental_id: RentalId,
        /// Use the external gateway instead of direct confirmation.
        #[arg(long)]
        gateway: bool,
        /// Run without stopping at the summary.
        #[arg(long = "yes", short = 'y')]
        confirmed: bool,
    },
    /// Start the rental by scanning the vehicle.
    Pickup {
        /// Rental id, with or without a leading `#`.
        #[arg(value_parser = parse_rental_id)]
        rental_id: RentalId,
        /// Scanned vehicle code.
        code: String,
        /// Run without stopping at the summary.
        #[arg(long = "yes", short = 'y')]
        confirmed: bool,
    },
    /// End the rental by scanning a station.
    Return {
        /// Rental id, with or without a leading `#`.
        #[arg(value_parser = parse_rental_id)]
        rental_id: RentalId,
        /// Scanned station code.
        code: String,
        /// Run without stopping at the summary.
        #[arg(long = "yes", short = 'y')]
        confirmed: bool,
    },
    /// Apply a payment gateway callback query.
    Callback {
        /// Query string the gateway redirected with.
        query: String,
    },
}

fn positive_id(raw: &str) -> Result<u64, String> {
    match raw.trim().trim_start_matches('#').parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(format!("`{raw}` is not a positive id")),
    }
}

fn parse_rental_id(raw: &str) -> Result<RentalId, String> {
    positive_id(raw).map(RentalId)
}

fn parse_vehicle_id(raw: &str) -> Result<VehicleId, String> {
    positive_id(raw).map(VehicleId)
}

fn parse_package_id(raw: &str) -> Result<PackageId, String> {
    positive_id(raw).map(PackageId)
}
