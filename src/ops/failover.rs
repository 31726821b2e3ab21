use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument as _, info, info_span, warn};

use crate::cancel::{CancelHandle, cancellation};
use crate::config::Config;
use crate::converge::{self, ApplyOptions, RunStatus};
use crate::fleet::FleetApi;
use crate::id::new_run_id;
use crate::jitter::sleep_jitter;
use crate::ops::cli::{ExitError, FailoverArgs};
use crate::ops::group::resolve_group;
use crate::ops::preflight::jitter_window;
use crate::ops::report;
use crate::ops::util::{Mode, connect, remote_exit, unless_cancelled};
use crate::ring;

pub async fn cmd_failover(config: Config, args: FailoverArgs) -> Result<(), ExitError> {
    let run_id = new_run_id();
    let span = info_span!("failover", run_id = %run_id, state = args.state.as_str());
    run_failover(config, args).instrument(span).await
}

async fn run_failover(config: Config, args: FailoverArgs) -> Result<(), ExitError> {
    let mode = Mode::from_dry_run(args.dry_run);
    let window = jitter_window(&args)?;
    let client = Arc::new(connect(&config)?);

    let (cancel_handle, cancel) = cancellation();
    spawn_interrupt_watcher(cancel_handle.clone());

    if args.sleep {
        let delay = window.pick(&mut rand::thread_rng());
        if mode == Mode::DryRun {
            eprintln!("would sleep {}s before starting", delay.as_secs());
        } else {
            info!(
                delay_secs = delay.as_secs(),
                "sleeping to let every collector in the group come up"
            );
            if !sleep_jitter(delay, &cancel).await {
                return Err(ExitError::new(
                    7,
                    "cancelled: interrupted during pre-run delay; nothing was changed",
                ));
            }
        }
    }

    let group = unless_cancelled(
        &cancel,
        "collector group lookup",
        resolve_group(&client, &args.group),
    )
    .await?;
    let members = unless_cancelled(&cancel, "collector listing", async {
        client
            .list_members(group.id)
            .await
            .map_err(|e| remote_exit(&format!("collectors of group {}", group.id), e))
    })
    .await?;
    if members.is_empty() {
        return Err(ExitError::new(
            3,
            format!("lookup_failed: no collectors found in group {}", group.id),
        ));
    }
    info!(group_id = group.id, members = members.len(), "found collectors in group");

    let plan = ring::plan(&members, args.state)
        .map_err(|e| ExitError::new(5, format!("plan_error: group {}: {e}", group.id)))?;
    for a in &plan {
        info!(member_id = %a.member_id, requested = %a.requested_state(), "planned");
    }

    if mode == Mode::DryRun {
        eprint!("{}", report::render_plan(&group.name, &plan));
        eprintln!("would apply {} member updates (dry run)", plan.len());
        if args.json {
            println!("{}", report::to_json(&plan)?);
        }
        return Ok(());
    }

    if let Some(secs) = args.deadline_secs {
        spawn_deadline(cancel_handle, Duration::from_secs(secs));
    }

    let options = ApplyOptions {
        concurrency: usize::try_from(args.concurrency).unwrap_or(usize::MAX),
    };
    let api: Arc<dyn FleetApi> = client;
    let result = converge::apply(api, &plan, options, cancel).await;

    if args.json {
        println!("{}", report::to_json(&result)?);
    } else {
        print!("{}", report::render_result(&result));
    }

    let converged = result.converged();
    if result.all_success {
        info!(converged, "failover converged on every collector");
        return Ok(());
    }
    match result.status {
        RunStatus::Cancelled => Err(ExitError::new(
            7,
            format!(
                "cancelled: {converged} of {} collectors converged before cancellation",
                result.planned
            ),
        )),
        RunStatus::Completed => Err(ExitError::new(
            6,
            format!(
                "convergence_incomplete: {} of {} collectors did not converge",
                result.planned - converged,
                result.planned
            ),
        )),
    }
}

fn spawn_interrupt_watcher(handle: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling");
            handle.cancel();
        }
    });
}

fn spawn_deadline(handle: CancelHandle, after: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        warn!(deadline_secs = after.as_secs(), "deadline reached; cancelling");
        handle.cancel();
    });
}
