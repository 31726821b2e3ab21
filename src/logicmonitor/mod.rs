//! LogicMonitor REST API (v3) client.

use std::time::Duration;

use reqwest::{Method, StatusCode, header};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    domain::{Member, MemberId},
    fleet::{BoxFuture, FleetApi, MutateRequest, RemoteError},
};

pub mod auth;

pub use auth::Credentials;

const API_VERSION: &str = "3";
const PAGE_SIZE: usize = 1000;
const COLLECTOR_FIELDS: &str =
    "id,backupAgentId,enableFailBack,enableFailOverOnCollectorDevice,escalatingChainId,description";

/// Characters that cannot appear inside a quoted `filter` value.
const FILTER_RESERVED: &[char] = &['"', ',', '\\'];

pub fn portal_base_url(portal: &str) -> String {
    format!("https://{portal}.logicmonitor.com/santaba/rest")
}

/// Whether `value` can be placed inside `name:"..."` in a list filter as is.
pub fn is_filter_safe(value: &str) -> bool {
    !value.contains(FILTER_RESERVED)
}

fn name_filter(name: &str) -> Result<String, RemoteError> {
    if !is_filter_safe(name) {
        return Err(RemoteError::Transport {
            message: format!("name {name:?} contains a reserved filter character"),
        });
    }
    Ok(format!("name:\"{name}\""))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collector {
    pub id: u64,
    /// `0` when no backup is assigned.
    #[serde(default)]
    pub backup_agent_id: u64,
    #[serde(default)]
    pub enable_fail_back: bool,
    #[serde(default)]
    pub enable_fail_over_on_collector_device: bool,
    /// `0` when no escalation chain is set.
    #[serde(default)]
    pub escalating_chain_id: u64,
    #[serde(default)]
    pub description: Option<String>,
}

impl Collector {
    pub fn into_member(self) -> Member {
        Member {
            id: MemberId(self.id),
            backup_id: (self.backup_agent_id != 0).then_some(MemberId(self.backup_agent_id)),
            fail_back_enabled: self.enable_fail_back,
            fail_over_local_enabled: self.enable_fail_over_on_collector_device,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorGroup {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub auto_balance: bool,
    #[serde(default)]
    pub auto_balance_instance_count_threshold: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EscalationChain {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default)]
    total: i64,
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorBody {
    error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LogicMonitorClient {
    base: String,
    credentials: Credentials,
    client: reqwest::Client,
}

impl LogicMonitorClient {
    pub fn new(
        base: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lmc/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport {
                message: e.to_string(),
            })?;
        Ok(Self {
            base: base.into(),
            credentials,
            client,
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        resource_path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<T, RemoteError> {
        let body = match body {
            Some(v) => serde_json::to_string(&v).map_err(|e| RemoteError::Decode {
                message: e.to_string(),
            })?,
            None => String::new(),
        };
        let epoch_ms = chrono::Utc::now().timestamp_millis();
        let authorization =
            auth::sign_request(&self.credentials, &method, epoch_ms, &body, resource_path)
                .map_err(|message| RemoteError::Transport { message })?;

        let url = format!("{}{resource_path}", self.base.trim_end_matches('/'));
        debug!(%method, %url, "logicmonitor request");

        let mut req = self
            .client
            .request(method, url)
            .query(query)
            .header(header::AUTHORIZATION, authorization)
            .header("X-Version", API_VERSION);
        if !body.is_empty() {
            req = req
                .header(header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let resp = req.send().await.map_err(map_reqwest_error)?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound {
                resource: resource_path.to_string(),
            });
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .ok()
                .and_then(|b| b.error_message)
                .unwrap_or(text);
            return Err(RemoteError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = resp.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode {
            message: e.to_string(),
        })
    }

    pub async fn get_collector_group(&self, group_id: u64) -> Result<CollectorGroup, RemoteError> {
        self.request(
            Method::GET,
            &format!("/setting/collector/groups/{group_id}"),
            &[],
            None,
        )
        .await
    }

    /// Groups whose name matches exactly. The API filter is a substring match,
    /// so the result is narrowed client-side.
    pub async fn find_collector_groups_by_name(
        &self,
        name: &str,
    ) -> Result<Vec<CollectorGroup>, RemoteError> {
        let resp: ListResponse<CollectorGroup> = self
            .request(
                Method::GET,
                "/setting/collector/groups",
                &[("filter", name_filter(name)?)],
                None,
            )
            .await?;
        Ok(resp.items.into_iter().filter(|g| g.name == name).collect())
    }

    /// Escalation chains whose name matches exactly.
    pub async fn find_escalation_chains_by_name(
        &self,
        name: &str,
    ) -> Result<Vec<EscalationChain>, RemoteError> {
        let resp: ListResponse<EscalationChain> = self
            .request(
                Method::GET,
                "/setting/alert/chains",
                &[
                    ("filter", name_filter(name)?),
                    ("fields", "id,name".to_string()),
                ],
                None,
            )
            .await?;
        Ok(resp.items.into_iter().filter(|c| c.name == name).collect())
    }

    pub async fn list_collectors_in_group(
        &self,
        group_id: u64,
    ) -> Result<Vec<Collector>, RemoteError> {
        let mut collectors = Vec::new();
        loop {
            let page: ListResponse<Collector> = self
                .request(
                    Method::GET,
                    "/setting/collector/collectors",
                    &[
                        ("filter", format!("collectorGroupId:\"{group_id}\"")),
                        ("fields", COLLECTOR_FIELDS.to_string()),
                        ("sort", "id".to_string()),
                        ("size", PAGE_SIZE.to_string()),
                        ("offset", collectors.len().to_string()),
                    ],
                    None,
                )
                .await?;
            let fetched = page.items.len();
            collectors.extend(page.items);
            // A negative total is an estimate; only a short page ends the listing then.
            let reached_total =
                usize::try_from(page.total).is_ok_and(|total| total > 0 && collectors.len() >= total);
            if fetched < PAGE_SIZE || reached_total {
                break;
            }
        }
        debug!(group_id, count = collectors.len(), "listed collectors");
        Ok(collectors)
    }

    pub async fn get_collector(&self, collector_id: u64) -> Result<Collector, RemoteError> {
        self.request(
            Method::GET,
            &format!("/setting/collector/collectors/{collector_id}"),
            &[("fields", COLLECTOR_FIELDS.to_string())],
            None,
        )
        .await
    }

    /// "No backup" is sent as an explicit `backupAgentId: 0`.
    pub async fn patch_collector_failover(
        &self,
        req: &MutateRequest,
    ) -> Result<Collector, RemoteError> {
        let body = serde_json::json!({
            "backupAgentId": req.backup_id.map(|id| id.0).unwrap_or(0),
            "enableFailBack": req.fail_back,
            "enableFailOverOnCollectorDevice": req.local_failover,
        });
        self.request(
            Method::PATCH,
            &format!("/setting/collector/collectors/{}", req.member_id),
            &[],
            Some(body),
        )
        .await
    }

    pub async fn patch_collector_escalation_chain(
        &self,
        collector_id: u64,
        chain_id: u64,
    ) -> Result<Collector, RemoteError> {
        let body = serde_json::json!({ "escalatingChainId": chain_id });
        self.request(
            Method::PATCH,
            &format!("/setting/collector/collectors/{collector_id}"),
            &[],
            Some(body),
        )
        .await
    }

    pub async fn patch_collector_group_auto_balance(
        &self,
        group_id: u64,
        enabled: bool,
        threshold: u64,
    ) -> Result<CollectorGroup, RemoteError> {
        let body = serde_json::json!({
            "autoBalance": enabled,
            "autoBalanceInstanceCountThreshold": threshold,
        });
        self.request(
            Method::PATCH,
            &format!("/setting/collector/groups/{group_id}"),
            &[],
            Some(body),
        )
        .await
    }
}

fn map_reqwest_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else if err.is_decode() {
        RemoteError::Decode {
            message: err.to_string(),
        }
    } else {
        RemoteError::Transport {
            message: err.to_string(),
        }
    }
}

impl FleetApi for LogicMonitorClient {
    fn list_members(&self, group_id: u64) -> BoxFuture<'_, Result<Vec<Member>, RemoteError>> {
        Box::pin(async move {
            let collectors = self.list_collectors_in_group(group_id).await?;
            Ok(collectors.into_iter().map(Collector::into_member).collect())
        })
    }

    fn mutate(&self, req: MutateRequest) -> BoxFuture<'_, Result<(), RemoteError>> {
        Box::pin(async move { self.patch_collector_failover(&req).await.map(|_| ()) })
    }

    fn fetch(&self, member_id: MemberId) -> BoxFuture<'_, Result<Member, RemoteError>> {
        Box::pin(async move {
            self.get_collector(member_id.0)
                .await
                .map(Collector::into_member)
        })
    }
}
