//! Background expiry sweeper.

use chrono::Utc;
use settlement_types::SettlementRepository;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, instrument};

use crate::SettlementService;

/// Periodically expires overdue pending orders and deposits.
///
/// Status reads expire records lazily too; the sweeper covers the ones
/// nobody polls.
pub struct ExpirySweeper<R: SettlementRepository> {
    service: SettlementService<R>,
}

impl<R: SettlementRepository> ExpirySweeper<R> {
    pub fn new(service: SettlementService<R>) -> Self {
        Self { service }
    }

    #[instrument(skip(self))]
    pub async fn run(self) {
        let period = self.service.config().sweep_interval;
        info!("Starting expiry sweeper every {:?}", period);

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    async fn sweep_once(&self) {
        match self.service.sweep_expired(Utc::now()).await {
            Ok(report) => {
                if report.expired_orders + report.expired_deposits + report.stuck_orders > 0 {
                    info!(
                        expired_orders = report.expired_orders,
                        expired_deposits = report.expired_deposits,
                        stuck_orders = report.stuck_orders,
                        "Sweep finished"
                    );
                }
            }
            Err(e) => {
                error!("Expiry sweep failed: {}", e);
            }
        }
    }
}
