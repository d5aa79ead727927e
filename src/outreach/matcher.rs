//! Background matcher: finds candidates for queued queries.
//!
//! Polls the durable `match_jobs` queue. On startup, jobs left `running` by
//! a previous process are put back to `pending`. Jobs are processed one at
//! a time; a failed job is requeued until its attempt budget is spent.
//! Redelivery is safe because reach-outs are unique per (query, target).

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MatcherConfig;
use crate::error::OutreachError;
use crate::outreach::candidates::CandidateSource;
use crate::outreach::coordinator::Coordinator;
use crate::outreach::model::MatchJob;

/// Spawn the matcher background loop. The first tick fires immediately.
pub fn spawn_matcher_loop(
    coordinator: Arc<Coordinator>,
    candidates: Arc<dyn CandidateSource>,
    config: MatcherConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Matcher loop started (interval: {}s)",
            config.poll_interval.as_secs()
        );

        match coordinator.gateway().store().reset_running_match_jobs().await {
            Ok(0) => {}
            Ok(count) => info!(count, "Requeued match jobs left running"),
            Err(e) => warn!(error = %e, "Failed to reset running match jobs"),
        }

        let mut tick = tokio::time::interval(config.poll_interval);
        loop {
            tick.tick().await;
            run_match_cycle(&coordinator, candidates.as_ref(), &config).await;
        }
    })
}

/// Drain the queue once. Returns how many jobs finished successfully.
///
/// Stops early after a requeued failure so the job waits for the next tick.
pub async fn run_match_cycle(
    coordinator: &Coordinator,
    candidates: &dyn CandidateSource,
    config: &MatcherConfig,
) -> usize {
    let db = coordinator.gateway().store();
    let mut done = 0;

    loop {
        let job = match db.claim_next_match_job().await {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to claim match job");
                break;
            }
        };

        match process_job(coordinator, candidates, &job).await {
            Ok(()) => {
                if let Err(e) = db.complete_match_job(job.id).await {
                    warn!(job_id = %job.id, error = %e, "Failed to complete match job");
                }
                done += 1;
            }
            Err(e) => {
                let requeue = job.attempts < config.max_attempts;
                warn!(
                    job_id = %job.id,
                    query_id = %job.query_id,
                    attempts = job.attempts,
                    requeue,
                    error = %e,
                    "Match job failed"
                );
                if let Err(e) = db.fail_match_job(job.id, &e.to_string(), requeue).await {
                    warn!(job_id = %job.id, error = %e, "Failed to record match job failure");
                }
                if requeue {
                    break;
                }
            }
        }
    }

    if done > 0 {
        debug!(done, "Match cycle finished");
    }
    done
}

/// Re-fetches everything from the query id alone.
async fn process_job(
    coordinator: &Coordinator,
    candidates: &dyn CandidateSource,
    job: &MatchJob,
) -> Result<(), OutreachError> {
    let query = match coordinator.queries().get_by_id(job.query_id).await {
        Ok(query) => query,
        Err(OutreachError::NotFound { .. }) => {
            warn!(job_id = %job.id, query_id = %job.query_id, "Match job for missing query");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    if query.status.is_terminal() {
        debug!(query_id = %query.id, status = %query.status, "Query already settled");
        return Ok(());
    }

    let author = coordinator.gateway().get_user_by_id(query.author_id).await?;
    let found = candidates
        .find(&query, &author, coordinator.config.candidate_limit)
        .await?;
    info!(query_id = %query.id, found = found.len(), "Matcher sourced candidates");
    coordinator.fan_out(&query, &author, &found).await;
    Ok(())
}
