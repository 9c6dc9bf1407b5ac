//! Background job scheduling

pub mod backlog;
pub mod daily_search;
pub mod proper_finder;
pub mod show_updater;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

pub use backlog::BacklogSearcher;

use crate::app::AppState;

/// Every second
const QUEUE_TICK: &str = "* * * * * *";

/// Initialize and start the job scheduler
pub async fn start_scheduler(state: AppState) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    let settings = state.settings.search.clone();

    // Queue runners start the next item once the current one is done
    let search_queue = state.search_queue.clone();
    let show_queue = state.show_queue.clone();
    let tick_job = Job::new(QUEUE_TICK, move |_uuid, _l| {
        search_queue.run();
        show_queue.run();
    })?;
    scheduler.add(tick_job).await?;

    let daily_state = state.clone();
    let daily_job = Job::new_async(settings.daily_search_cron.as_str(), move |_uuid, _l| {
        let state = daily_state.clone();
        Box::pin(async move {
            info!("Running daily searcher");
            if let Err(e) = daily_search::run_daily_search(&state.db, &state.search_queue).await {
                error!(error = %e, "Daily searcher failed");
            }
        })
    })?;
    scheduler.add(daily_job).await?;

    let backlog_state = state.clone();
    let backlog_job = Job::new_async(settings.backlog_search_cron.as_str(), move |_uuid, _l| {
        let state = backlog_state.clone();
        Box::pin(async move {
            info!("Running backlog searcher");
            if let Err(e) = state
                .backlog
                .search_backlog(&state.db, &state.search_queue, false)
                .await
            {
                error!(error = %e, "Backlog searcher failed");
            }
        })
    })?;
    scheduler.add(backlog_job).await?;

    let proper_queue = state.search_queue.clone();
    let proper_job = Job::new(settings.proper_finder_cron.as_str(), move |_uuid, _l| {
        if let Err(e) = proper_finder::queue_proper_search(&proper_queue) {
            error!(error = %e, "Failed to queue proper search");
        }
    })?;
    scheduler.add(proper_job).await?;

    let update_state = state.clone();
    let update_job = Job::new_async(settings.show_update_cron.as_str(), move |_uuid, _l| {
        let state = update_state.clone();
        Box::pin(async move {
            info!("Running show updater");
            if let Err(e) = show_updater::update_all_shows(&state.db, &state.show_queue).await {
                error!(error = %e, "Show updater failed");
            }
        })
    })?;
    scheduler.add(update_job).await?;

    scheduler.start().await?;

    info!("Job scheduler started");
    Ok(scheduler)
}
