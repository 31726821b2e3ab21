use tracing::{Instrument as _, info, info_span, warn};

use crate::config::Config;
use crate::id::new_run_id;
use crate::ops::cli::{AutoBalanceArgs, ExitError};
use crate::ops::group::resolve_group;
use crate::ops::util::{Mode, connect, remote_exit};

pub async fn cmd_auto_balance(config: Config, args: AutoBalanceArgs) -> Result<(), ExitError> {
    let span = info_span!("auto_balance", run_id = %new_run_id(), enabled = args.state.enabled());
    run_auto_balance(config, args).instrument(span).await
}

async fn run_auto_balance(config: Config, args: AutoBalanceArgs) -> Result<(), ExitError> {
    let mode = Mode::from_dry_run(args.dry_run);
    let enabled = args.state.enabled();
    let client = connect(&config)?;
    let group = resolve_group(&client, &args.group).await?;

    if group.auto_balance == enabled
        && (!enabled || group.auto_balance_instance_count_threshold == args.threshold)
    {
        info!(group_id = group.id, enabled, "auto-balance already in requested state");
        println!(
            "group {} ({:?}): auto_balance={} threshold={} (unchanged)",
            group.id, group.name, group.auto_balance, group.auto_balance_instance_count_threshold
        );
        return Ok(());
    }

    if mode == Mode::DryRun {
        eprintln!(
            "would set auto-balance on group {} ({:?}): enabled={enabled} threshold={} (currently enabled={} threshold={})",
            group.id,
            group.name,
            args.threshold,
            group.auto_balance,
            group.auto_balance_instance_count_threshold
        );
        return Ok(());
    }

    client
        .patch_collector_group_auto_balance(group.id, enabled, args.threshold)
        .await
        .map_err(|e| remote_exit(&format!("update collector group {}", group.id), e))?;

    let observed = client
        .get_collector_group(group.id)
        .await
        .map_err(|e| remote_exit(&format!("re-read collector group {}", group.id), e))?;

    let threshold_ok =
        !enabled || observed.auto_balance_instance_count_threshold == args.threshold;
    if observed.auto_balance != enabled || !threshold_ok {
        warn!(
            group_id = group.id,
            observed_enabled = observed.auto_balance,
            observed_threshold = observed.auto_balance_instance_count_threshold,
            "auto-balance change did not stick"
        );
        return Err(ExitError::new(
            6,
            format!(
                "convergence_incomplete: group {} reports auto_balance={} threshold={} after update",
                group.id, observed.auto_balance, observed.auto_balance_instance_count_threshold
            ),
        ));
    }

    info!(group_id = group.id, enabled, threshold = args.threshold, "auto-balance updated");
    println!(
        "group {} ({:?}): auto_balance={} threshold={}",
        observed.id, observed.name, observed.auto_balance, observed.auto_balance_instance_count_threshold
    );
    Ok(())
}
