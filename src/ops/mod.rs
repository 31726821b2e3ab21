pub mod cli;

mod auto_balance;
mod escalation_chain;
mod failover;
mod group;
mod preflight;
mod report;
mod util;
