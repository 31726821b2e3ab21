//! Ring planning for collector group failover.
//!
//! Every member of a group gets the next member (in input order) as its
//! backup, and the last member wraps around to the first. The planner is pure:
//! it never touches the network and never mutates the member snapshot it is
//! given.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::domain::{FailoverState, Member, MemberId};

/// Minimum number of members needed to build a ring without self-assignment.
pub const MIN_RING_MEMBERS: usize = 2;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverAction {
    Enable,
    Disable,
}

impl FailoverAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }

    pub fn is_enable(&self) -> bool {
        matches!(self, Self::Enable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    InsufficientMembers { required: usize, found: usize },
    DuplicateMember { id: MemberId },
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientMembers { required, found } => write!(
                f,
                "insufficient members: a failover ring needs at least {required}, found {found}"
            ),
            Self::DuplicateMember { id } => write!(f, "member {id} appears more than once"),
        }
    }
}

impl std::error::Error for PlanError {}

/// Planned failover settings for a single member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub member_id: MemberId,
    pub backup_id: Option<MemberId>,
    pub fail_back: bool,
    pub local_failover: bool,
}

impl Assignment {
    pub fn requested_state(&self) -> FailoverState {
        FailoverState {
            backup_id: self.backup_id,
            fail_back: self.fail_back,
            local_failover: self.local_failover,
        }
    }
}

/// Member id to backup assignment, kept in planning order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RingAssignment {
    action: FailoverAction,
    entries: Vec<Assignment>,
}

impl RingAssignment {
    pub fn action(&self) -> FailoverAction {
        self.action
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.entries.iter()
    }

    pub fn get(&self, member_id: MemberId) -> Option<&Assignment> {
        self.entries.iter().find(|a| a.member_id == member_id)
    }

    /// Backup assigned to `member_id`; `None` for unknown members or a disable plan.
    pub fn successor(&self, member_id: MemberId) -> Option<MemberId> {
        self.get(member_id).and_then(|a| a.backup_id)
    }
}

impl<'a> IntoIterator for &'a RingAssignment {
    type Item = &'a Assignment;
    type IntoIter = std::slice::Iter<'a, Assignment>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

pub fn plan(members: &[Member], action: FailoverAction) -> Result<RingAssignment, PlanError> {
    let mut seen = BTreeSet::new();
    for member in members {
        if !seen.insert(member.id) {
            return Err(PlanError::DuplicateMember { id: member.id });
        }
    }

    let entries = match action {
        FailoverAction::Enable => {
            if members.len() < MIN_RING_MEMBERS {
                return Err(PlanError::InsufficientMembers {
                    required: MIN_RING_MEMBERS,
                    found: members.len(),
                });
            }
            let total = members.len();
            members
                .iter()
                .enumerate()
                .map(|(index, member)| Assignment {
                    member_id: member.id,
                    backup_id: Some(members[(index + 1) % total].id),
                    fail_back: true,
                    local_failover: false,
                })
                .collect()
        }
        FailoverAction::Disable => members
            .iter()
            .map(|member| Assignment {
                member_id: member.id,
                backup_id: None,
                fail_back: false,
                local_failover: false,
            })
            .collect(),
    };

    Ok(RingAssignment { action, entries })
}
