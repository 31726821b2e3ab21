use serde::{Deserialize, Serialize};

/// Remote entity id of one fleet member (a LogicMonitor collector id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub u64);

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MemberId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Snapshot of one member as reported by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    /// `None` means no backup is assigned.
    pub backup_id: Option<MemberId>,
    pub fail_back_enabled: bool,
    pub fail_over_local_enabled: bool,
}

impl Member {
    pub fn new(id: impl Into<MemberId>) -> Self {
        Self {
            id: id.into(),
            backup_id: None,
            fail_back_enabled: false,
            fail_over_local_enabled: false,
        }
    }

    pub fn failover_state(&self) -> FailoverState {
        FailoverState {
            backup_id: self.backup_id,
            fail_back: self.fail_back_enabled,
            local_failover: self.fail_over_local_enabled,
        }
    }
}

/// The three failover fields the ring manages on a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverState {
    pub backup_id: Option<MemberId>,
    pub fail_back: bool,
    pub local_failover: bool,
}

impl FailoverState {
    /// Names of the fields that differ between `self` (requested) and `observed`.
    pub fn mismatched_fields(&self, observed: &FailoverState) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.backup_id != observed.backup_id {
            fields.push("backup_id");
        }
        if self.fail_back != observed.fail_back {
            fields.push("fail_back");
        }
        if self.local_failover != observed.local_failover {
            fields.push("local_failover");
        }
        fields
    }
}

impl std::fmt::Display for FailoverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.backup_id {
            Some(id) => write!(f, "backup={id}")?,
            None => write!(f, "backup=none")?,
        }
        write!(
            f,
            " fail_back={} local_failover={}",
            self.fail_back, self.local_failover
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mismatched_fields_lists_every_difference() {
        let requested = FailoverState {
            backup_id: Some(MemberId(2)),
            fail_back: true,
            local_failover: false,
        };
        let observed = FailoverState {
            backup_id: None,
            fail_back: true,
            local_failover: true,
        };
        assert_eq!(
            requested.mismatched_fields(&observed),
            vec!["backup_id", "local_failover"]
        );
        assert!(requested.mismatched_fields(&requested).is_empty());
    }

    #[test]
    fn display_spells_out_missing_backup() {
        let state = FailoverState {
            backup_id: None,
            fail_back: false,
            local_failover: false,
        };
        assert_eq!(
            state.to_string(),
            "backup=none fail_back=false local_failover=false"
        );
    }
}
