//! Drives the pool of virtual users along a [`Profile`].
//!
//! Every tick the scheduler reads the profile's target concurrency and grows or shrinks the
//! pool to match. Shrinking never cancels a request: a retired virtual user finishes its
//! in-flight iteration and then exits.
mod timer;

use crate::client::TargetApi;
use crate::dispatch::Dispatcher;
use crate::profile::{Phase, Profile};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::num::{NonZeroU32, NonZeroU64};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use timer::Timer;
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

pub const SCHEDULER_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Iterations started, skipped ones included.
    pub iterations: u64,
    /// Started iterations whose operation had nothing to target. Nothing was recorded for them.
    pub skipped: u64,
    pub peak_concurrency: usize,
}

struct VirtualUser {
    handle: JoinHandle<()>,
    retire: Arc<AtomicBool>,
}

/// Shared cap on the number of iterations across all virtual users.
struct IterationBudget {
    remaining: AtomicU64,
}

impl IterationBudget {
    fn new(limit: NonZeroU64) -> Self {
        Self {
            remaining: AtomicU64::new(limit.get()),
        }
    }

    fn claim(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn exhausted(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }
}

pub struct Scheduler<A> {
    dispatcher: Arc<Dispatcher<A>>,
    users: Vec<VirtualUser>,
    retired: Vec<JoinHandle<()>>,
    budget: Option<Arc<IterationBudget>>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    started: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
    spawned: usize,
    peak: usize,
}

impl<A> Scheduler<A>
where
    A: TargetApi + Send + Sync + 'static,
{
    pub fn new(dispatcher: Arc<Dispatcher<A>>) -> Self {
        Self {
            dispatcher,
            users: vec![],
            retired: vec![],
            budget: None,
            limiter: None,
            started: Arc::new(AtomicU64::new(0)),
            skipped: Arc::new(AtomicU64::new(0)),
            spawned: 0,
            peak: 0,
        }
    }

    /// Stop the run once `limit` iterations have been started.
    pub fn max_iterations(mut self, limit: Option<NonZeroU64>) -> Self {
        self.budget = limit.map(|limit| Arc::new(IterationBudget::new(limit)));
        self
    }

    /// Cap the rate at which iterations start, across all virtual users.
    pub fn max_rps(mut self, rps: Option<NonZeroU32>) -> Self {
        self.limiter = rps.map(|rps| {
            Arc::new(RateLimiter::direct(
                Quota::per_second(rps).allow_burst(NonZeroU32::MIN),
            ))
        });
        self
    }

    /// Runs until the profile has elapsed or the iteration budget is spent, then waits for
    /// every virtual user to finish its last iteration.
    #[instrument(name = "scheduler", skip_all, fields(stages = profile.stages().len()))]
    pub async fn run(mut self, profile: &Profile) -> SchedulerStats {
        let mut timer = Timer::new(SCHEDULER_TICK).await;
        info!(
            "Running profile of {} re-evaluating every {timer}",
            humantime::format_duration(profile.total_duration())
        );

        let start = Instant::now();
        let mut phase = None;
        loop {
            let elapsed = start.elapsed();
            let current = profile.phase_at(elapsed);
            if phase != Some(current) {
                info!("Entering {current} phase at {elapsed:.1?}");
                phase = Some(current);
            }

            if current == Phase::Drained {
                break;
            }

            if self.budget.as_ref().is_some_and(|b| b.exhausted()) {
                info!("Iteration budget exhausted at {elapsed:.1?}");
                break;
            }

            self.set_concurrency(profile.concurrency_at(elapsed));

            let tick = timer.tick().await;
            trace!("Tick after {tick:?} with {} virtual users", self.concurrency());
        }

        self.wait_for_shutdown().await
    }

    pub fn concurrency(&self) -> usize {
        self.users.len()
    }

    fn set_concurrency(&mut self, concurrency: usize) {
        if self.users.len() == concurrency {
            return;
        } else if self.users.len() > concurrency {
            debug!(
                "Retiring {} virtual user(s), target {concurrency}",
                self.users.len() - concurrency
            );
            for user in self.users.drain(concurrency..) {
                user.retire.store(true, Ordering::Relaxed);
                self.retired.push(user.handle);
            }
        } else {
            debug!(
                "Starting {} virtual user(s), target {concurrency}",
                concurrency - self.users.len()
            );
            while self.users.len() < concurrency {
                let user = self.spawn_user();
                self.users.push(user);
            }
        }
        self.peak = self.peak.max(self.users.len());
    }

    fn spawn_user(&mut self) -> VirtualUser {
        let id = self.spawned;
        self.spawned += 1;

        let retire = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(
            virtual_user(
                id,
                self.dispatcher.clone(),
                retire.clone(),
                self.budget.clone(),
                self.limiter.clone(),
                self.started.clone(),
                self.skipped.clone(),
            )
            .in_current_span(),
        );

        VirtualUser { handle, retire }
    }

    async fn wait_for_shutdown(mut self) -> SchedulerStats {
        for user in &self.users {
            user.retire.store(true, Ordering::Relaxed);
        }

        let mut handles: Vec<_> = self.users.drain(..).map(|u| u.handle).collect();
        handles.append(&mut self.retired);
        debug!("Waiting on {} virtual user(s) to finish", handles.len());

        for handle in handles {
            if let Err(err) = handle.await {
                error!("Virtual user failed: {err}");
            }
        }

        SchedulerStats {
            iterations: self.started.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            peak_concurrency: self.peak,
        }
    }
}

async fn virtual_user<A>(
    id: usize,
    dispatcher: Arc<Dispatcher<A>>,
    retire: Arc<AtomicBool>,
    budget: Option<Arc<IterationBudget>>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    started: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
) where
    A: TargetApi + Send + Sync + 'static,
{
    trace!("Virtual user {id} started");
    let mut rng = SmallRng::from_entropy();

    while !retire.load(Ordering::Relaxed) {
        if let Some(limiter) = &limiter {
            limiter.until_ready().await;
        }

        if let Some(budget) = &budget {
            if !budget.claim() {
                break;
            }
        }

        started.fetch_add(1, Ordering::Relaxed);
        if dispatcher.iterate(&mut rng).await.is_none() {
            skipped.fetch_add(1, Ordering::Relaxed);
            // Nothing was sent; let the other tasks run.
            tokio::task::yield_now().await;
        }
    }

    trace!("Virtual user {id} retired");
}
