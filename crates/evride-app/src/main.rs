#![warn(missing_docs)]
//! # evride-app binary
//!
//! Command line entry point for the rental client.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use evride_app::{
    AppConfig, Cli, Command, ConfirmationDesk, DeskAction, DeskOutcome, PreorderQuote,
    init_tracing, load_history, redact_sensitive, render_history, render_view,
};
use evride_core::{Clock, SystemClock};
use evride_lifecycle::{LifecycleContext, RefreshOutcome, RentalController, TimeWindowTicker};
use evride_qr::scan;
use evride_remote::{HttpAuthority, PaymentCallback, RemoteAuthority};
use evride_ui::{RecoveryHint, RentalView, TicketIssuer, format_duration};

const REFRESH_EVERY: Duration = Duration::from_secs(30);

/// CLI entry point.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::from_env()?;
    init_tracing(config.log_level)?;
    tracing::debug!(?config, "configuration loaded");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let session = Arc::new(config.session());
    let remote: Arc<dyn RemoteAuthority> = Arc::new(
        HttpAuthority::new(
            &config.api_base_url,
            config.request_timeout,
            Arc::clone(&session),
        )?
        .with_clock(Arc::clone(&clock)),
    );
    let context =
        LifecycleContext::new(Arc::clone(&remote), Arc::clone(&session)).with_clock(clock);

    match cli.command {
        Command::Show { rental_id } => {
            let controller = RentalController::load(rental_id, context).await?;
            print_view(&controller);
        }
        Command::Watch { rental_id } => {
            let controller = RentalController::load(rental_id, context).await?;
            watch(&controller, config.tick_interval).await?;
        }
        Command::History => {
            let history = load_history(remote.as_ref(), &session).await?;
            for line in render_history(&history) {
                println!("{line}");
            }
        }
        Command::Preorder {
            vehicle,
            package,
            confirmed,
        } => {
            let packages = remote.list_packages().await?;
            let quote = PreorderQuote::prepare(&packages, config.user_id, vehicle, package)?;
            println!("{}", quote.headline());
            for line in quote.lines() {
                println!("  {line}");
            }
            if !confirmed {
                println!("Nothing was changed. Re-run with --yes to confirm.");
                return Ok(());
            }
            let controller = RentalController::preorder(quote.request(), context).await?;
            print_view(&controller);
        }
        Command::Pay {
            rental_id,
            gateway,
            confirmed,
        } => {
            let controller = RentalController::load(rental_id, context).await?;
            let action = if gateway {
                DeskAction::ExternalPayment
            } else {
                DeskAction::ConfirmPayment
            };
            confirm(ConfirmationDesk::new(issuer()), &controller, action, confirmed).await?;
        }
        Command::Pickup {
            rental_id,
            code,
            confirmed,
        } => {
            let controller = RentalController::load(rental_id, context).await?;
            let action = DeskAction::Pickup(scan(code));
            confirm(ConfirmationDesk::new(issuer()), &controller, action, confirmed).await?;
        }
        Command::Return {
            rental_id,
            code,
            confirmed,
        } => {
            let controller = RentalController::load(rental_id, context).await?;
            let stations = match remote.list_stations().await {
                Ok(stations) => stations,
                Err(error) => {
                    tracing::warn!(error = %redact_sensitive(&error.to_string()), "station list unavailable");
                    Vec::new()
                }
            };
            let desk = ConfirmationDesk::new(issuer()).with_stations(stations);
            let action = DeskAction::Return(scan(code));
            confirm(desk, &controller, action, confirmed).await?;
        }
        Command::Callback { query } => {
            let callback = PaymentCallback::from_query(&query);
            let rental_id = callback
                .rental_id()
                .context("callback does not name a rental")?;
            let controller = RentalController::load(rental_id, context).await?;
            controller.apply_payment_callback(&callback).await?;
            print_view(&controller);
        }
    }

    Ok(())
}

fn issuer() -> TicketIssuer {
    TicketIssuer::from_os_rng()
}

fn print_view(controller: &RentalController) {
    let view = RentalView::project(&controller.snapshot(), &controller.time_window());
    for line in render_view(&view) {
        println!("{line}");
    }
}

async fn confirm(
    mut desk: ConfirmationDesk,
    controller: &RentalController,
    action: DeskAction,
    confirmed: bool,
) -> Result<()> {
    let Some((ticket, summary)) = desk.review(controller, action) else {
        bail!("another action is still in progress");
    };

    println!("{}", summary.headline());
    for line in summary.lines() {
        println!("  {line}");
    }
    if !confirmed {
        desk.dismiss();
        println!("Nothing was changed. Re-run with --yes to confirm.");
        return Ok(());
    }

    match desk.submit(controller, &ticket).await {
        Some(Ok(DeskOutcome::Updated(_))) => {
            print_view(controller);
            Ok(())
        }
        Some(Ok(DeskOutcome::Redirect(url))) => {
            println!("Open this page to pay: {url}");
            Ok(())
        }
        Some(Err(error)) => {
            if let Some(hint) = RecoveryHint::for_error(&error) {
                eprintln!("{}", hint.message());
            }
            Err(error.into())
        }
        None => bail!("confirmation was not accepted"),
    }
}

async fn watch(controller: &RentalController, cadence: Duration) -> Result<()> {
    print_view(controller);
    let ticker = TimeWindowTicker::spawn(controller, cadence);
    let mut windows = ticker.windows();
    let mut refresh = tokio::time::interval(REFRESH_EVERY);
    refresh.tick().await;

    loop {
        tokio::select! {
            changed = windows.changed() => {
                if changed.is_err() {
                    break;
                }
                let window = *windows.borrow_and_update();
                if let Some(remaining) = window.remaining_ms {
                    println!(
                        "{} left ({:.0}% used)",
                        format_duration(remaining),
                        window.percent_complete
                    );
                }
            }
            _ = refresh.tick() => {
                match controller.refresh().await {
                    Ok(RefreshOutcome::Applied(rental)) => {
                        tracing::info!(rental_id = %rental.id, status = %rental.status, "rental changed elsewhere");
                    }
                    Ok(RefreshOutcome::Unchanged | RefreshOutcome::Superseded) => {}
                    Err(error) => {
                        tracing::warn!(error = %redact_sensitive(&error.to_string()), "refresh failed");
                    }
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                ticker.cancel();
                break;
            }
        }
    }

    controller.teardown();
    print_view(controller);
    Ok(())
}
