use std::{future::Future, pin::Pin};

use serde::Serialize;

use crate::domain::{Member, MemberId};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteError {
    NotFound { resource: String },
    Http { status: u16, message: String },
    Timeout,
    Transport { message: String },
    Decode { message: String },
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { resource } => write!(f, "not found: {resource}"),
            Self::Http { status, message } => write!(f, "http {status}: {message}"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Transport { message } => write!(f, "transport error: {message}"),
            Self::Decode { message } => write!(f, "decode error: {message}"),
        }
    }
}

impl std::error::Error for RemoteError {}

/// One member's failover configuration as sent to the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MutateRequest {
    pub member_id: MemberId,
    pub backup_id: Option<MemberId>,
    pub fail_back: bool,
    pub local_failover: bool,
}

/// Remote capabilities the failover core needs. The vendor client implements
/// this; tests use in-memory fakes.
pub trait FleetApi: Send + Sync + 'static {
    /// Current member snapshot of a group, in the order the remote lists them.
    fn list_members(&self, group_id: u64) -> BoxFuture<'_, Result<Vec<Member>, RemoteError>>;

    fn mutate(&self, req: MutateRequest) -> BoxFuture<'_, Result<(), RemoteError>>;

    fn fetch(&self, member_id: MemberId) -> BoxFuture<'_, Result<Member, RemoteError>>;
}
