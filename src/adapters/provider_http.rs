use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;

use crate::adapters::remote::RemoteError;
use crate::domain::models::{
    ChargingSession, Cluster, ErrorNotification, TenantConfig, format_timestamp,
};

const API_KEY_HEADER: &str = "x-api-key";

/// Read-only access to the charging provider.
pub trait ProviderApi {
    fn fetch_clusters(&self, tenant: &TenantConfig) -> Result<Vec<Cluster>, RemoteError>;

    fn fetch_sessions(
        &self,
        tenant: &TenantConfig,
        charge_point_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ChargingSession>, RemoteError>;

    fn fetch_errors(
        &self,
        tenant: &TenantConfig,
        charge_point_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ErrorNotification>, RemoteError>;
}

#[derive(Debug, Clone)]
pub struct GpJouleHttpClient {
    client: Client,
}

impl GpJouleHttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
        })
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        tenant: &TenantConfig,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        let url = format!("{}{path}", tenant.root_url.trim_end_matches('/'));
        tracing::trace!(url = %url, "reading provider endpoint");

        let response = self
            .client
            .get(&url)
            .query(query)
            .header(API_KEY_HEADER, &tenant.api_key)
            .timeout(tenant.request_timeout())
            .send()
            .map_err(|error| RemoteError::from_reqwest(&url, error))?;

        if response.status() != StatusCode::OK {
            return Err(RemoteError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        response
            .json::<T>()
            .map_err(|error| RemoteError::from_reqwest(&url, error))
    }
}

fn window(
    charge_point_id: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> [(&'static str, String); 3] {
    [
        ("from", format_timestamp(since)),
        ("to", format_timestamp(until)),
        ("chargepoint_id", charge_point_id.to_string()),
    ]
}

impl ProviderApi for GpJouleHttpClient {
    fn fetch_clusters(&self, tenant: &TenantConfig) -> Result<Vec<Cluster>, RemoteError> {
        self.get_json(tenant, "/clusters", &[])
    }

    fn fetch_sessions(
        &self,
        tenant: &TenantConfig,
        charge_point_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ChargingSession>, RemoteError> {
        self.get_json(tenant, "/chargelogs", &window(charge_point_id, since, until))
    }

    fn fetch_errors(
        &self,
        tenant: &TenantConfig,
        charge_point_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ErrorNotification>, RemoteError> {
        self.get_json(
            tenant,
            "/error-notifications",
            &window(charge_point_id, since, until),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::adapters::remote::RemoteError;
    use crate::test_support::{respond_once, sample_tenant};

    use super::{GpJouleHttpClient, ProviderApi};

    #[test]
    fn fetches_clusters_with_api_key_header() {
        let (base_url, request) = respond_once(
            200,
            r#"[{"name":"Depot","chargepoints":[{"chargepoint_id":"CP-1","connectors":[]}]}]"#,
        );
        let tenant = sample_tenant(1, &base_url);

        let client = GpJouleHttpClient::new().expect("client should build");
        let clusters = client.fetch_clusters(&tenant).expect("fetch should succeed");

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].charge_points[0].charge_point_id, "CP-1");

        let head = request.join().expect("responder should finish");
        assert!(head.starts_with("GET /clusters "));
        assert!(head.to_lowercase().contains("x-api-key: secret"));
    }

    #[test]
    fn sends_utc_window_for_sessions() {
        let (base_url, request) = respond_once(200, "[]");
        let tenant = sample_tenant(1, &base_url);

        let client = GpJouleHttpClient::new().expect("client should build");
        let sessions = client
            .fetch_sessions(
                &tenant,
                "CP-1",
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap(),
            )
            .expect("fetch should succeed");

        assert!(sessions.is_empty());
        let head = request.join().expect("responder should finish");
        assert!(head.starts_with(
            "GET /chargelogs?from=2024-01-01T00%3A00%3A00Z&to=2024-01-01T02%3A00%3A00Z&chargepoint_id=CP-1 "
        ));
    }

    #[test]
    fn non_ok_status_is_a_protocol_error() {
        let (base_url, request) = respond_once(500, r#"{"error":"boom"}"#);
        let tenant = sample_tenant(1, &base_url);

        let client = GpJouleHttpClient::new().expect("client should build");
        let result = client.fetch_clusters(&tenant);

        assert!(matches!(result, Err(RemoteError::Status { status: 500, .. })));
        request.join().expect("responder should finish");
    }
}
