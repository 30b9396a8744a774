//! Periodic poll of the telescope-control gateway.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::live::{GatewayReading, LiveBoard};
use crate::gateway::{
    channels, read_bool, read_f64, with_timeout, GatewayError, GatewayResult, TelescopeGateway,
};
use crate::models::Coordinates;

/// Read connection state, pointing in both frames and the shutter state.
///
/// A frame whose channels cannot be read is reported as unknown. The shutter
/// channel is mandatory: if it cannot be read the whole reading fails.
pub async fn read_gateway(gateway: &dyn TelescopeGateway) -> GatewayResult<GatewayReading> {
    if !gateway.is_connected() {
        return Err(GatewayError::NotConnected);
    }

    let ra_dec = match (
        read_f64(gateway, channels::TELESCOPE_RA).await,
        read_f64(gateway, channels::TELESCOPE_DEC).await,
    ) {
        (Ok(ra), Ok(dec)) => Some(Coordinates::RaDec { ra, dec }),
        _ => None,
    };
    let az_el = match (
        read_f64(gateway, channels::TELESCOPE_AZ).await,
        read_f64(gateway, channels::TELESCOPE_EL).await,
    ) {
        (Ok(az), Ok(el)) => Some(Coordinates::AzEl { az, el }),
        _ => None,
    };
    let laser_open = read_bool(gateway, channels::LASER_SHUTTER_OPEN).await?;

    Ok(GatewayReading {
        connected: gateway.is_connected(),
        simulated: gateway.uses_simulated_telescope(),
        last_update: gateway.last_update(),
        pointing_ra_dec: ra_dec,
        pointing_az_el: az_el,
        laser_open: Some(laser_open),
    })
}

/// Timing for [`run_gateway_poll`].
#[derive(Debug, Clone)]
pub struct GatewayPollSettings {
    pub address: String,
    pub period: Duration,
    pub timeout: Duration,
}

/// Poll the gateway every period until cancelled, reconnecting when the
/// connection drops.
pub async fn run_gateway_poll(
    gateway: Arc<dyn TelescopeGateway>,
    board: LiveBoard,
    settings: GatewayPollSettings,
    cancel: CancellationToken,
) {
    let mut ticker = interval(settings.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !gateway.is_connected() {
            match with_timeout("connect", settings.timeout, gateway.connect(&settings.address))
                .await
            {
                Ok(()) => info!(address = %settings.address, "Gateway connected"),
                Err(error) => {
                    warn!(%error, "Gateway reconnect failed");
                    board.mark_gateway_stale();
                    continue;
                }
            }
        }

        match with_timeout("read", settings.timeout, read_gateway(gateway.as_ref())).await {
            Ok(reading) => {
                board.publish_gateway(reading, Utc::now());
            }
            Err(error) => {
                warn!(%error, "Gateway poll failed");
                board.mark_gateway_stale();
            }
        }
    }
    debug!("Gateway poll task stopped");
}
