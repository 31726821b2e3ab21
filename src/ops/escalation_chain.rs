use tracing::{Instrument as _, info, info_span, warn};

use crate::config::Config;
use crate::id::new_run_id;
use crate::logicmonitor::{EscalationChain, LogicMonitorClient};
use crate::ops::cli::{EscalationChainArgs, ExitError};
use crate::ops::util::{Mode, connect, remote_exit};

pub async fn cmd_escalation_chain(
    config: Config,
    args: EscalationChainArgs,
) -> Result<(), ExitError> {
    let span = info_span!(
        "escalation_chain",
        run_id = %new_run_id(),
        collector_id = args.collector_id
    );
    run_escalation_chain(config, args).instrument(span).await
}

async fn run_escalation_chain(config: Config, args: EscalationChainArgs) -> Result<(), ExitError> {
    let mode = Mode::from_dry_run(args.dry_run);
    let client = connect(&config)?;
    let collector_id = args.collector_id;

    let collector = client
        .get_collector(collector_id)
        .await
        .map_err(|e| remote_exit(&format!("collector {collector_id}"), e))?;
    let chain = resolve_chain(&client, &args.chain_name).await?;

    if collector.escalating_chain_id == chain.id {
        info!(chain_id = chain.id, "escalation chain already set");
        println!(
            "collector {collector_id}: escalation chain {} ({:?}) (unchanged)",
            chain.id, chain.name
        );
        return Ok(());
    }

    if mode == Mode::DryRun {
        eprintln!(
            "would set escalation chain on collector {collector_id} to {} ({:?}) (currently {})",
            chain.id, chain.name, collector.escalating_chain_id
        );
        return Ok(());
    }

    client
        .patch_collector_escalation_chain(collector_id, chain.id)
        .await
        .map_err(|e| remote_exit(&format!("update collector {collector_id}"), e))?;

    let observed = client
        .get_collector(collector_id)
        .await
        .map_err(|e| remote_exit(&format!("re-read collector {collector_id}"), e))?;
    if observed.escalating_chain_id != chain.id {
        warn!(
            requested = chain.id,
            observed = observed.escalating_chain_id,
            "escalation chain change did not stick"
        );
        return Err(ExitError::new(
            6,
            format!(
                "convergence_incomplete: collector {collector_id} reports escalation chain {} after update (requested {})",
                observed.escalating_chain_id, chain.id
            ),
        ));
    }

    info!(chain_id = chain.id, "escalation chain updated");
    println!(
        "collector {collector_id}: escalation chain {} ({:?})",
        chain.id, chain.name
    );
    Ok(())
}

async fn resolve_chain(
    client: &LogicMonitorClient,
    name: &str,
) -> Result<EscalationChain, ExitError> {
    info!(name = %name, "searching for escalation chain by name");
    let mut chains = client
        .find_escalation_chains_by_name(name)
        .await
        .map_err(|e| remote_exit("escalation chain search", e))?;
    match chains.len() {
        0 => Err(ExitError::new(
            3,
            format!("lookup_failed: no escalation chain named {name:?}"),
        )),
        1 => Ok(chains.remove(0)),
        n => Err(ExitError::new(
            3,
            format!("lookup_failed: {n} escalation chains are named {name:?}"),
        )),
    }
}
