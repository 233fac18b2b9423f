// FallbackCascade - primary attempt plus exactly one provider-native retry
//
// States: NotStarted -> PrimaryAttempt -> (Succeeded | FallbackAttempt)
//         FallbackAttempt -> (Succeeded | Failed)
// The retry uses a "best under budget" expression instead of the resolver's
// exact id; the resolver is not consulted again.

use tracing::{info, warn};

use super::errors::{DownloadFailure, PipelineError};
use super::executor::{DownloadExecutor, DownloadJob};
use super::models::{AchievedTier, DownloadResult, Selection, SizeBudget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeState {
    NotStarted,
    PrimaryAttempt,
    FallbackAttempt,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptEvent {
    Start,
    ProviderSucceeded,
    ProviderFailed,
}

impl CascadeState {
    /// Transition function; events that do not apply leave the state unchanged
    pub fn on(self, event: AttemptEvent) -> CascadeState {
        use AttemptEvent::*;
        use CascadeState::*;

        match (self, event) {
            (NotStarted, Start) => PrimaryAttempt,
            (PrimaryAttempt, ProviderSucceeded) | (FallbackAttempt, ProviderSucceeded) => Succeeded,
            (PrimaryAttempt, ProviderFailed) => FallbackAttempt,
            (FallbackAttempt, ProviderFailed) => Failed,
            (state, _) => state,
        }
    }
}

/// Result of one cascade run together with the states it went through
#[derive(Debug)]
pub struct CascadeOutcome {
    pub trace: Vec<CascadeState>,
    pub result: Result<DownloadResult, PipelineError>,
}

impl CascadeOutcome {
    pub fn final_state(&self) -> CascadeState {
        self.trace.last().copied().unwrap_or(CascadeState::NotStarted)
    }
}

pub struct FallbackCascade {
    executor: DownloadExecutor,
    budget: SizeBudget,
}

impl FallbackCascade {
    pub fn new(executor: DownloadExecutor, budget: SizeBudget) -> Self {
        Self { executor, budget }
    }

    pub async fn run(&self, job: &DownloadJob<'_>, primary: Selection) -> CascadeOutcome {
        let fallback = Selection::best_under_budget(job.tier, self.budget);

        let mut state = CascadeState::NotStarted.on(AttemptEvent::Start);
        let mut trace = vec![CascadeState::NotStarted, state];
        let mut primary_failure: Option<DownloadFailure> = None;

        loop {
            let selection = match state {
                CascadeState::PrimaryAttempt => &primary,
                _ => &fallback,
            };

            match self.executor.execute(job, selection).await {
                Ok(mut download) => {
                    state = state.on(AttemptEvent::ProviderSucceeded);
                    trace.push(state);
                    if selection.is_fallback() {
                        download.achieved_tier = AchievedTier::BestAvailableFallback;
                        info!(requested = %job.tier, "Fallback download succeeded");
                    }
                    return CascadeOutcome {
                        trace,
                        result: Ok(download),
                    };
                }
                Err(failure) => {
                    state = state.on(AttemptEvent::ProviderFailed);
                    trace.push(state);

                    if state == CascadeState::Failed {
                        warn!(error = %failure, "Fallback download failed");
                        let primary = primary_failure.take().unwrap_or_else(|| failure.clone());
                        return CascadeOutcome {
                            trace,
                            result: Err(PipelineError::FallbackExhausted {
                                primary,
                                fallback: failure,
                            }),
                        };
                    }

                    warn!(
                        selector = %failure.selector,
                        fallback = %fallback,
                        fallback_likely = failure.reason.map_or(true, |r| r.fallback_might_help()),
                        permanent = failure.reason.is_some_and(|r| r.is_permanent()),
                        "Primary download failed, retrying with fallback selector"
                    );
                    primary_failure = Some(failure);
                }
            }
        }
    }
}
