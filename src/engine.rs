use std::future;
use std::sync::Arc;
use std::time::Duration;

use ::time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::probe::Prober;
use crate::types::{Family, ProbeOutcome, RunSummary, SiteResult, Target};

pub const DEFAULT_CONCURRENCY: usize = 16;
const MAX_CONCURRENCY: usize = 1024;

/// Relative weight of each family in the composite score.
///
/// The score is `floor(10 * (w4 * p4 + w6 * p6) / (w4 + w6))` where `p4`/`p6`
/// are per-family success ratios, computed in integer arithmetic so ratios
/// such as 0.4 + 0.6 never round below the exact result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringPolicy {
    pub ipv4_weight: u32,
    pub ipv6_weight: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            ipv4_weight: 40,
            ipv6_weight: 60,
        }
    }
}

impl ScoringPolicy {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.ipv4_weight == 0 && self.ipv6_weight == 0 {
            return Err(EngineError::ZeroWeights);
        }
        Ok(())
    }

    /// Score in `0..=10`. Returns 0 for an empty run or an all-zero policy.
    pub fn score(&self, ipv4_successes: usize, ipv6_successes: usize, total: usize) -> u8 {
        let w4 = u128::from(self.ipv4_weight);
        let w6 = u128::from(self.ipv6_weight);
        let n = total as u128;
        let s4 = (ipv4_successes as u128).min(n);
        let s6 = (ipv6_successes as u128).min(n);
        let den = (w4 + w6) * n;
        if den == 0 {
            return 0;
        }
        (10 * (w4 * s4 + w6 * s6) / den).min(10) as u8
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Max probes in flight at once.
    pub concurrency: usize,
    /// Global run deadline; probes still running when it expires count as failed.
    pub deadline: Option<Duration>,
    pub policy: ScoringPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            deadline: None,
            policy: ScoringPolicy::default(),
        }
    }
}

/// Runs every (target, family) probe concurrently and aggregates the results.
pub struct ConnectivityEngine<P> {
    prober: Arc<P>,
    config: EngineConfig,
}

impl<P: Prober> ConnectivityEngine<P> {
    pub fn new(prober: P, config: EngineConfig) -> Self {
        Self {
            prober: Arc::new(prober),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Probe all targets over both families.
    pub async fn run(&self, targets: &[Target]) -> Result<RunSummary, EngineError> {
        self.run_with_cancel(targets, CancellationToken::new()).await
    }

    /// Variant that accepts a `CancellationToken` to allow external cancellation.
    ///
    /// - Limits concurrent probes using a `Semaphore`.
    /// - Outcomes land in per-target slots by index, so the summary keeps
    ///   target order whatever the completion order.
    /// - On deadline expiry or cancellation the remaining probes are aborted
    ///   and recorded as failures (`"timeout"` / `"cancelled"`); the run still
    ///   produces a summary.
    pub async fn run_with_cancel(
        &self,
        targets: &[Target],
        cancel: CancellationToken,
    ) -> Result<RunSummary, EngineError> {
        if targets.is_empty() {
            return Err(EngineError::NoTargets);
        }
        self.config.policy.validate()?;

        let sem = Arc::new(Semaphore::new(
            self.config.concurrency.clamp(1, MAX_CONCURRENCY),
        ));
        let mut set = JoinSet::new();

        for (idx, target) in targets.iter().enumerate() {
            for family in Family::BOTH {
                let sem = sem.clone();
                let prober = self.prober.clone();
                let target = target.clone();
                set.spawn(async move {
                    let _permit = sem.acquire_owned().await; // held until the probe returns
                    let outcome = prober.probe(&target, family).await;
                    (idx, outcome)
                });
            }
        }

        let mut slots: Vec<[Option<ProbeOutcome>; 2]> = vec![[None, None]; targets.len()];
        let deadline = async {
            match self.config.deadline {
                Some(d) => time::sleep(d).await,
                None => future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let interrupted = loop {
            tokio::select! {
                joined = set.join_next() => match joined {
                    Some(Ok((idx, outcome))) => {
                        debug!(
                            site = %targets[idx].name,
                            family = %outcome.family,
                            success = outcome.success,
                            latency_ms = outcome.latency_ms(),
                            error = outcome.error.as_deref(),
                            "probe finished"
                        );
                        let family = outcome.family.index();
                        slots[idx][family] = Some(outcome);
                    }
                    Some(Err(e)) => warn!(error = %e, "probe task failed"),
                    None => break None,
                },
                _ = &mut deadline => break Some("timeout"),
                _ = cancel.cancelled() => break Some("cancelled"),
            }
        };

        if let Some(reason) = interrupted {
            warn!(reason, pending = set.len(), "run interrupted, abandoning in-flight probes");
            set.abort_all();
        }

        let missing = interrupted.unwrap_or("probe task failed");
        let sites = targets
            .iter()
            .zip(slots)
            .map(|(target, [v4, v6])| SiteResult {
                name: target.name.clone(),
                url: target.url.clone(),
                ipv4: v4.unwrap_or_else(|| ProbeOutcome::failed(Family::V4, missing)),
                ipv6: v6.unwrap_or_else(|| ProbeOutcome::failed(Family::V6, missing)),
            })
            .collect();

        let summary = summarize(sites, &self.config.policy);
        info!(
            sites = summary.site_count,
            ipv4 = summary.ipv4_successes,
            ipv6 = summary.ipv6_successes,
            score = summary.score,
            "connectivity run complete"
        );
        Ok(summary)
    }
}

/// Aggregate finished site results into a summary stamped with the current UTC time.
pub fn summarize(sites: Vec<SiteResult>, policy: &ScoringPolicy) -> RunSummary {
    let ipv4_successes = sites.iter().filter(|s| s.ipv4.success).count();
    let ipv6_successes = sites.iter().filter(|s| s.ipv6.success).count();
    let site_count = sites.len();
    RunSummary {
        score: policy.score(ipv4_successes, ipv6_successes, site_count),
        ipv4_success: ipv4_successes > 0,
        ipv6_success: ipv6_successes > 0,
        ipv4_successes,
        ipv6_successes,
        site_count,
        sites,
        timestamp: OffsetDateTime::now_utc(),
    }
}
