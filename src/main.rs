mod aggregator;
mod config;
mod domain;
mod engine;
mod error;
mod gateway;
mod kis;
mod monitoring;
mod notifier;
mod risk;
mod scheduler;
mod source;
mod state;
mod strategy;
mod throttle;
mod time;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::aggregator::BarAggregator;
use crate::gateway::{OrderGateway, PaperGateway};
use crate::kis::KisClient;
use crate::scheduler::{Pacing, Scheduler};
use crate::source::{ReplayDataset, ReplaySource};
use crate::strategy::MomentumBreakout;

#[tokio::main]
async fn main() -> Result<()> {
    // Load local .env if present (no-op in prod/systemd envs)
    let _ = dotenvy::dotenv();

    monitoring::init_tracing();

    let cfg = config::Config::from_env()?;
    info!(
        session = %time::day_key(&cfg.tz)?,
        instruments = cfg.instruments.len(),
        thresholds = ?cfg.thresholds,
        replay = cfg.replay_mode,
        account_mode = %cfg.account_mode,
        dry_run = cfg.dry_run,
        base_url = %cfg.kis_base_url,
        "boot"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown.requested"),
            Err(e) => error!(error = %e, "shutdown.signal_handler_failed"),
        }
        let _ = shutdown_tx.send(true);
    });

    let kis = Arc::new(KisClient::new(&cfg, throttle::Throttle::new(cfg.request_spacing)));
    let gateway: Arc<dyn OrderGateway> = if cfg.dry_run {
        Arc::new(PaperGateway::new())
    } else {
        kis.clone()
    };
    let engine = engine::Engine::new(
        gateway,
        cfg.account.clone(),
        notifier::Notifier::new(cfg.slack_webhook_url.clone()),
    );

    let pacing = Pacing {
        replay_step: cfg.replay_step_delay,
        live_poll: cfg.poll_interval,
    };
    let mut scheduler = Scheduler::new(
        &cfg.instruments,
        MomentumBreakout::new(cfg.thresholds),
        engine,
        pacing,
        shutdown_rx.clone(),
    );

    if cfg.replay_mode {
        let aggregator = BarAggregator::new(cfg.market_open, cfg.max_pages, cfg.page_delay);
        let mut datasets = Vec::with_capacity(cfg.instruments.len());
        for inst in &cfg.instruments {
            if *shutdown_rx.borrow() {
                info!("shutdown.during_collection");
                return Ok(());
            }
            match aggregator.collect(kis.as_ref(), &inst.code, cfg.replay_anchor).await {
                Ok(ds) => datasets.push(ds),
                Err(e) => {
                    warn!(code = %inst.code, error = %e, "aggregator.failed");
                    datasets.push(ReplayDataset { code: inst.code.clone(), bars: vec![] });
                }
            }
        }
        let source = ReplaySource::new(datasets)?;
        scheduler.run_replay(&source).await?;
    } else {
        scheduler.run_live(kis.as_ref()).await?;
    }

    info!("shutdown.complete");
    Ok(())
}
