use crate::config::Config;
use crate::ops::auto_balance;
use crate::ops::escalation_chain;
use crate::ops::failover;
use crate::ops::preflight;
use crate::ring::FailoverAction;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "lmc",
    about = "LogicMonitor collector group failover and auto-balance",
    version = crate::version::VERSION,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Point every collector in a group at the next one as its backup (or clear it).
    Failover(FailoverArgs),

    /// Turn collector group auto-balancing on or off.
    AutoBalance(AutoBalanceArgs),

    /// Set the escalation chain alerted when a collector goes down.
    EscalationChain(EscalationChainArgs),
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct GroupSelector {
    #[arg(long = "cg-id", value_name = "ID")]
    pub id: Option<u64>,

    /// Exact collector group name, resolved to an id first.
    #[arg(long = "cg-name", value_name = "NAME")]
    pub name: Option<String>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Enable,
    Disable,
}

impl Toggle {
    pub fn enabled(&self) -> bool {
        matches!(self, Self::Enable)
    }
}

#[derive(Args, Debug, Clone)]
pub struct FailoverArgs {
    #[command(flatten)]
    pub group: GroupSelector,

    #[arg(long, value_enum, value_name = "STATE", default_value = "enable")]
    pub state: FailoverAction,

    /// Members updated in parallel.
    #[arg(
        long,
        value_name = "N",
        default_value_t = 4,
        value_parser = clap::value_parser!(u64).range(1..=64)
    )]
    pub concurrency: u64,

    /// Sleep a random time inside the jitter window before starting.
    #[arg(long)]
    pub sleep: bool,

    #[arg(long, value_name = "SECS", default_value_t = 120)]
    pub jitter_min_secs: u64,

    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub jitter_max_secs: u64,

    /// Stop issuing updates after this many seconds and report what converged.
    #[arg(
        long,
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub deadline_secs: Option<u64>,

    /// Print the planned ring without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the result as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AutoBalanceArgs {
    #[command(flatten)]
    pub group: GroupSelector,

    #[arg(long, value_enum, value_name = "STATE")]
    pub state: Toggle,

    /// Instance count threshold that triggers rebalancing.
    #[arg(long, value_name = "N", default_value_t = 10_000)]
    pub threshold: u64,

    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EscalationChainArgs {
    #[arg(long = "collector-id", value_name = "ID")]
    pub collector_id: u64,

    /// Exact escalation chain name.
    #[arg(long = "ec-name", value_name = "NAME")]
    pub chain_name: String,

    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub async fn run() -> i32 {
    let cli = Cli::parse();

    if let Err(e) =
        crate::logging::init_tracing(cli.config.log_level, cli.config.log_file.as_deref())
    {
        eprintln!("invalid_args: {e:#}");
        return 2;
    }

    if let Err(e) = preflight::preflight(&cli.config, &cli.command) {
        eprintln!("{}", e.message);
        return e.code;
    }

    let res: Result<(), ExitError> = match cli.command {
        Command::Failover(args) => failover::cmd_failover(cli.config, args).await,
        Command::AutoBalance(args) => auto_balance::cmd_auto_balance(cli.config, args).await,
        Command::EscalationChain(args) => {
            escalation_chain::cmd_escalation_chain(cli.config, args).await
        }
    };

    match res {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}", e.message);
            e.code
        }
    }
}
