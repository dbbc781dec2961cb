//! Two-phase collection across many resources sharing one budget.
//!
//! Phase 1 harvests priority resources child by child to completion. Phase 2
//! runs bounded rounds over balanced resources, resuming each child where the
//! previous round left it, until rounds run out, the budget drops to the round
//! floor, or a round yields nothing new.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::harvest::{HarvestOutcome, HarvestState, ThreadHarvester};
use crate::models::{ChildResource, HarvestBatch, Resource, ResourceClass};
use crate::resume::ResumeBook;
use crate::traits::{ContentApi, ResourceClassifier, SnapshotStore};

/// Collection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Priority,
    Balanced,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Priority => write!(f, "priority"),
            Phase::Balanced => write!(f, "balanced"),
        }
    }
}

/// Events emitted by the orchestrator for monitoring/logging.
#[derive(Debug, Clone)]
pub enum HarvestEvent<'a> {
    RunStarted {
        priority: usize,
        balanced: usize,
        remaining: u64,
    },
    PhaseStarted {
        phase: Phase,
        remaining: u64,
    },
    PhaseSkipped {
        phase: Phase,
        remaining: u64,
    },
    ChildStarted {
        resource: &'a Resource,
        child: &'a ChildResource,
        class: ResourceClass,
    },
    ChildFinished {
        child: &'a ChildResource,
        new_items: usize,
        pages: u32,
        state: &'a HarvestState,
    },
    ChildSkipped {
        child: &'a ChildResource,
        reason: &'a str,
    },
    ChildFailed {
        child: &'a ChildResource,
        error: &'a str,
    },
    RoundFinished {
        round: u32,
        new_items: usize,
        remaining: u64,
    },
    BudgetExhausted {
        phase: Phase,
        remaining: u64,
    },
    Interrupted,
    RunFinished {
        new_items: usize,
        remaining: u64,
    },
}

/// Trait for receiving harvest events (decoupled logging).
pub trait HarvestReporter: Send + Sync {
    fn report(&self, event: HarvestEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHarvestReporter;

impl HarvestReporter for TracingHarvestReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        match event {
            HarvestEvent::RunStarted {
                priority,
                balanced,
                remaining,
            } => {
                tracing::info!(priority, balanced, remaining, "Collection started");
            }
            HarvestEvent::PhaseStarted { phase, remaining } => {
                tracing::info!(%phase, remaining, "Phase started");
            }
            HarvestEvent::PhaseSkipped { phase, remaining } => {
                tracing::info!(%phase, remaining, "Phase skipped, budget too low");
            }
            HarvestEvent::ChildStarted {
                resource,
                child,
                class,
            } => {
                tracing::debug!(
                    resource = %resource.display_name,
                    child = %child.id,
                    estimate = child.comment_count_estimate,
                    %class,
                    "Harvesting child"
                );
            }
            HarvestEvent::ChildFinished {
                child,
                new_items,
                pages,
                state,
            } => {
                tracing::info!(child = %child.id, new_items, pages, %state, "Child harvested");
            }
            HarvestEvent::ChildSkipped { child, reason } => {
                tracing::debug!(child = %child.id, reason, "Child skipped");
            }
            HarvestEvent::ChildFailed { child, error } => {
                tracing::warn!(child = %child.id, %error, "Child failed");
            }
            HarvestEvent::RoundFinished {
                round,
                new_items,
                remaining,
            } => {
                tracing::info!(round, new_items, remaining, "Round finished");
            }
            HarvestEvent::BudgetExhausted { phase, remaining } => {
                tracing::warn!(%phase, remaining, "Budget exhausted, ending phase");
            }
            HarvestEvent::Interrupted => {
                tracing::warn!("Collection interrupted");
            }
            HarvestEvent::RunFinished {
                new_items,
                remaining,
            } => {
                tracing::info!(new_items, remaining, "Collection finished");
            }
        }
    }
}

/// A child that produced no items, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipRecord {
    pub resource_id: String,
    pub child_id: String,
    pub reason: String,
    /// True when the child failed rather than being skipped by policy.
    pub failed: bool,
}

/// Summary of one orchestration pass. Items live in the caller's batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionReport {
    pub new_items: usize,
    pub children_visited: usize,
    pub rounds_run: u32,
    pub skips: Vec<SkipRecord>,
    pub interrupted: bool,
    pub budget_exhausted: bool,
}

impl CollectionReport {
    pub fn failures(&self) -> usize {
        self.skips.iter().filter(|s| s.failed).count()
    }
}

/// How the current phase should continue after a child.
enum Flow {
    Continue,
    EndPhase,
    Stop,
}

/// Runs the two collection phases over enumerated resources.
pub struct CollectionOrchestrator<A: ContentApi> {
    harvester: ThreadHarvester<A>,
    classifier: Arc<dyn ResourceClassifier>,
    resume_store: Arc<dyn SnapshotStore<ResumeBook>>,
}

impl<A: ContentApi> CollectionOrchestrator<A> {
    pub fn new(
        harvester: ThreadHarvester<A>,
        classifier: Arc<dyn ResourceClassifier>,
        resume_store: Arc<dyn SnapshotStore<ResumeBook>>,
    ) -> Self {
        Self {
            harvester,
            classifier,
            resume_store,
        }
    }

    fn remaining(&self) -> u64 {
        self.harvester.quota().remaining()
    }

    fn save_book(&self, book: &ResumeBook) {
        if let Err(e) = self.resume_store.save(book) {
            tracing::warn!(error = %e, "Failed to persist resume state");
        }
    }

    /// Harvest every resource in `plan`, merging new items into `batch`.
    ///
    /// Per-child failures are recorded in the report and the run continues.
    /// `Err` is returned only when the budget can no longer be persisted; the
    /// items gathered until then remain in `batch`.
    pub async fn run<R: HarvestReporter>(
        &self,
        plan: &[(Resource, Vec<ChildResource>)],
        book: &mut ResumeBook,
        batch: &mut HarvestBatch,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<CollectionReport, AppError> {
        let config = self.harvester.config();
        let mut report = CollectionReport::default();

        let (priority, balanced): (Vec<_>, Vec<_>) = plan
            .iter()
            .map(|(resource, children)| (resource, by_estimate(children)))
            .partition(|(resource, _)| {
                self.classifier.classify(resource) == ResourceClass::Priority
            });

        reporter.report(HarvestEvent::RunStarted {
            priority: priority.len(),
            balanced: balanced.len(),
            remaining: self.remaining(),
        });

        // Phase 1
        if !priority.is_empty() {
            reporter.report(HarvestEvent::PhaseStarted {
                phase: Phase::Priority,
                remaining: self.remaining(),
            });
        }
        'priority: for (resource, children) in &priority {
            for child in children {
                if self.remaining() < config.priority_phase_floor {
                    reporter.report(HarvestEvent::BudgetExhausted {
                        phase: Phase::Priority,
                        remaining: self.remaining(),
                    });
                    break 'priority;
                }
                let outcome = self
                    .visit(resource, child, ResourceClass::Priority, book, cancel, reporter)
                    .await?;
                self.save_book(book);
                match self.absorb(resource, child, outcome, batch, &mut report, reporter) {
                    Flow::Continue => {}
                    Flow::EndPhase => {
                        reporter.report(HarvestEvent::BudgetExhausted {
                            phase: Phase::Priority,
                            remaining: self.remaining(),
                        });
                        break 'priority;
                    }
                    Flow::Stop => return Ok(self.finish(report, reporter)),
                }
            }
        }

        // Phase 2
        if balanced.is_empty() {
            return Ok(self.finish(report, reporter));
        }
        if self.remaining() <= config.balanced_phase_threshold {
            reporter.report(HarvestEvent::PhaseSkipped {
                phase: Phase::Balanced,
                remaining: self.remaining(),
            });
            return Ok(self.finish(report, reporter));
        }
        reporter.report(HarvestEvent::PhaseStarted {
            phase: Phase::Balanced,
            remaining: self.remaining(),
        });

        let mut round = 0;
        'rounds: while round < config.max_rounds && self.remaining() > config.round_floor {
            round += 1;
            report.rounds_run = round;
            let mut round_items = 0;

            for (resource, children) in &balanced {
                let mut productive = 0;
                for child in children {
                    if productive >= config.children_per_round
                        || self.remaining() < config.child_start_floor
                    {
                        break;
                    }
                    if book.is_complete(&child.id) {
                        continue;
                    }
                    let outcome = self
                        .visit(resource, child, ResourceClass::Balanced, book, cancel, reporter)
                        .await?;
                    self.save_book(book);

                    let new_items = outcome.items.len();
                    let flow = self.absorb(resource, child, outcome, batch, &mut report, reporter);
                    if new_items > 0 {
                        productive += 1;
                        round_items += new_items;
                    }
                    match flow {
                        Flow::Continue => {}
                        Flow::EndPhase => {
                            reporter.report(HarvestEvent::BudgetExhausted {
                                phase: Phase::Balanced,
                                remaining: self.remaining(),
                            });
                            break 'rounds;
                        }
                        Flow::Stop => return Ok(self.finish(report, reporter)),
                    }
                }
            }

            reporter.report(HarvestEvent::RoundFinished {
                round,
                new_items: round_items,
                remaining: self.remaining(),
            });
            if round_items == 0 {
                break;
            }
        }

        Ok(self.finish(report, reporter))
    }

    async fn visit<R: HarvestReporter>(
        &self,
        resource: &Resource,
        child: &ChildResource,
        class: ResourceClass,
        book: &mut ResumeBook,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<HarvestOutcome, AppError> {
        reporter.report(HarvestEvent::ChildStarted {
            resource,
            child,
            class,
        });
        let state = book.state_mut(&child.id);
        self.harvester.harvest(child, class, state, cancel).await
    }

    /// Merge an outcome into the batch and report, deciding how to go on.
    fn absorb<R: HarvestReporter>(
        &self,
        resource: &Resource,
        child: &ChildResource,
        outcome: HarvestOutcome,
        batch: &mut HarvestBatch,
        report: &mut CollectionReport,
        reporter: &R,
    ) -> Flow {
        report.children_visited += 1;
        let interrupted = outcome.was_interrupted();
        let exhausted = outcome.budget_exhausted();

        let HarvestOutcome {
            items,
            pages_fetched,
            state,
            skip_reason,
            failure,
        } = outcome;

        if let Some(error) = &failure {
            let error = error.to_string();
            reporter.report(HarvestEvent::ChildFailed {
                child,
                error: &error,
            });
            report.skips.push(SkipRecord {
                resource_id: resource.id.clone(),
                child_id: child.id.clone(),
                reason: error,
                failed: true,
            });
        } else if items.is_empty() {
            if let Some(reason) = &skip_reason {
                reporter.report(HarvestEvent::ChildSkipped { child, reason });
                report.skips.push(SkipRecord {
                    resource_id: resource.id.clone(),
                    child_id: child.id.clone(),
                    reason: reason.clone(),
                    failed: false,
                });
            }
        }

        let new_items = if items.is_empty() {
            0
        } else {
            batch.merge_items(resource, child, items)
        };
        report.new_items += new_items;
        if pages_fetched > 0 {
            reporter.report(HarvestEvent::ChildFinished {
                child,
                new_items,
                pages: pages_fetched,
                state: &state,
            });
        }

        if interrupted {
            report.interrupted = true;
            return Flow::Stop;
        }
        if exhausted {
            report.budget_exhausted = true;
            return Flow::EndPhase;
        }
        Flow::Continue
    }

    fn finish<R: HarvestReporter>(&self, report: CollectionReport, reporter: &R) -> CollectionReport {
        if report.interrupted {
            reporter.report(HarvestEvent::Interrupted);
        }
        reporter.report(HarvestEvent::RunFinished {
            new_items: report.new_items,
            remaining: self.remaining(),
        });
        report
    }
}

/// Children ordered by descending comment estimate; ties keep listing order.
fn by_estimate(children: &[ChildResource]) -> Vec<&ChildResource> {
    let mut ordered: Vec<&ChildResource> = children.iter().collect();
    ordered.sort_by(|a, b| b.comment_count_estimate.cmp(&a.comment_count_estimate));
    ordered
}
