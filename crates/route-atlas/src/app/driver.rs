//! Async render loop
//!
//! Feeds surface events into a [`RenderScheduler`], sleeps until the debounce
//! deadline, and runs the Computing phase on the blocking pool so selection
//! and simplification never stall event intake. Changes arriving while a pass
//! is computing are queued by the scheduler and start the next cycle.

use crate::app::AppError;
use route_atlas_lib::scheduler::{RenderRequest, plan_render};
use route_atlas_lib::{MapSurface, RenderPlan, RenderScheduler, RouteCollection, SurfaceEvent};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant as TokioInstant, sleep_until};

type ComputeTask = (RenderRequest, JoinHandle<RenderPlan>);

/// Scheduler clock. Goes through tokio so paused test time applies.
fn now() -> instant::Instant {
    TokioInstant::now().into_std()
}

async fn spawn_compute(
    request: RenderRequest,
    scheduler: &RenderScheduler,
    collection: &Arc<RwLock<RouteCollection>>,
) -> ComputeTask {
    // Arc clones only; the lock is released before computing
    let routes = collection.read().await.routes().to_vec();
    let config = scheduler.config().clone();
    tracing::trace!("Computing cycle {} over {} routes", request.cycle, routes.len());
    let handle = tokio::task::spawn_blocking(move || plan_render(&request, &routes, &config));
    (request, handle)
}

async fn join_compute(task: &mut Option<ComputeTask>) -> Result<(RenderRequest, RenderPlan), JoinError> {
    match task.as_mut() {
        Some((request, handle)) => Ok((*request, handle.await?)),
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<TokioInstant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Run render cycles until `events` is closed and every change has been
/// committed. Once the channel closes, a pending change is flushed without
/// waiting out the debounce period.
///
/// Returns the last plan handed to the surface, if any. Surface errors are
/// logged and the loop carries on; the next change retries.
pub async fn run_render_loop<S: MapSurface>(
    scheduler: &mut RenderScheduler,
    collection: Arc<RwLock<RouteCollection>>,
    surface: &mut S,
    mut events: mpsc::Receiver<SurfaceEvent>,
) -> Result<Option<RenderPlan>, AppError> {
    let mut events_open = true;
    let mut computing: Option<ComputeTask> = None;
    let mut last_plan = None;

    loop {
        if computing.is_none() {
            let t = now();
            let mut request = scheduler.poll(t);
            if request.is_none() && !events_open {
                request = scheduler.flush(t);
            }
            if let Some(request) = request {
                computing = Some(spawn_compute(request, scheduler, &collection).await);
            } else if !events_open && scheduler.deadline().is_none() {
                break;
            }
        }

        let deadline = scheduler.deadline().map(TokioInstant::from_std);
        tokio::select! {
            event = events.recv(), if events_open => match event {
                Some(event) => {
                    tracing::trace!("Surface event {:?}", event);
                    scheduler.notify(event.view(), now());
                }
                None => events_open = false,
            },
            _ = sleep_until_deadline(deadline), if computing.is_none() && deadline.is_some() => {}
            joined = join_compute(&mut computing), if computing.is_some() => {
                computing = None;
                let (request, plan) = joined?;
                match scheduler.commit(&plan, &mut *surface, request.started_at, now()) {
                    Ok(metrics) => {
                        tracing::info!(
                            "Rendered {} routes ({} points) in {:.1} ms",
                            metrics.route_count,
                            metrics.point_count,
                            metrics.render_time_ms
                        );
                        last_plan = Some(plan);
                    }
                    Err(e) => tracing::warn!("Render cycle {} not committed: {}", plan.cycle, e),
                }
            }
            else => break,
        }
    }

    Ok(last_plan)
}
