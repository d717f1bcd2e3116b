//! Actor that runs the overdue sweep on a fixed interval.
//!
//! Sweeps run inside the actor context with `.wait(ctx)`, so the next tick
//! (or a `RunSweep` request) is not processed until the current sweep ends.

use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use chrono::{DateTime, Utc};
use log::{error, info};

use super::{OverdueDetector, SweepReport};
use crate::store::StoreError;

/// Runs one sweep immediately, e.g. at startup before the first tick.
/// `now` overrides the clock.
#[derive(Message)]
#[rtype(result = "Result<SweepReport, StoreError>")]
pub struct RunSweep {
    pub now: Option<DateTime<Utc>>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Shutdown;

pub struct OverdueScheduler {
    detector: Arc<OverdueDetector>,
    every: Duration,
}

impl OverdueScheduler {
    pub fn new(detector: Arc<OverdueDetector>, every: Duration) -> Self {
        OverdueScheduler { detector, every }
    }

    fn tick(&mut self, ctx: &mut Context<Self>) {
        let detector = self.detector.clone();
        async move { detector.sweep().await }
            .into_actor(self)
            .map(|res, _act, _ctx| {
                if let Err(e) = res {
                    error!("Error in overdue task check: {}", e);
                }
            })
            .wait(ctx);
    }
}

impl Actor for OverdueScheduler {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Overdue scheduler started, checking every {:?}", self.every);
        ctx.run_interval(self.every, |act, ctx| act.tick(ctx));
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        info!("Overdue scheduler stopped");
    }
}

impl Handler<RunSweep> for OverdueScheduler {
    type Result = AtomicResponse<Self, Result<SweepReport, StoreError>>;

    fn handle(&mut self, msg: RunSweep, _: &mut Context<Self>) -> Self::Result {
        let detector = self.detector.clone();
        let now = msg.now.unwrap_or_else(Utc::now);
        AtomicResponse::new(Box::pin(
            async move { detector.sweep_at(now).await }
                .into_actor(self)
                .map(|res, _act, _ctx| {
                    if let Err(e) = &res {
                        error!("Error in requested overdue task check: {}", e);
                    }
                    res
                }),
        ))
    }
}

impl Handler<Shutdown> for OverdueScheduler {
    type Result = ();

    fn handle(&mut self, _: Shutdown, ctx: &mut Context<Self>) {
        ctx.stop();
    }
}
