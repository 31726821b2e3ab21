use tracing::info;

use crate::logicmonitor::{CollectorGroup, LogicMonitorClient};
use crate::ops::cli::{ExitError, GroupSelector};
use crate::ops::util::remote_exit;

pub async fn resolve_group(
    client: &LogicMonitorClient,
    selector: &GroupSelector,
) -> Result<CollectorGroup, ExitError> {
    let group_id = match (&selector.name, selector.id) {
        (Some(name), _) => {
            info!(name = %name, "searching for collector group by name");
            let groups = client
                .find_collector_groups_by_name(name)
                .await
                .map_err(|e| remote_exit("collector group search", e))?;
            match groups.as_slice() {
                [] => {
                    return Err(ExitError::new(
                        3,
                        format!("lookup_failed: no collector group named {name:?}"),
                    ));
                }
                [group] => group.id,
                _ => {
                    return Err(ExitError::new(
                        3,
                        format!(
                            "lookup_failed: {} collector groups are named {name:?}",
                            groups.len()
                        ),
                    ));
                }
            }
        }
        (None, Some(id)) => id,
        (None, None) => {
            return Err(ExitError::new(
                2,
                "invalid_args: specify one of --cg-id or --cg-name",
            ));
        }
    };

    let group = client
        .get_collector_group(group_id)
        .await
        .map_err(|e| remote_exit(&format!("collector group {group_id}"), e))?;
    info!(group_id = group.id, name = %group.name, "found collector group");
    Ok(group)
}
