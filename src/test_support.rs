use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::adapters::db::{
    get_configuration, insert_configuration, open_connection, run_migrations,
};
use crate::adapters::platform_http::AssetPlatform;
use crate::adapters::provider_http::ProviderApi;
use crate::adapters::remote::RemoteError;
use crate::domain::models::{
    AlarmRule, ChargingSession, Cluster, DataPoint, ErrorNotification, NewAsset,
    NewTenantConfig, TenantConfig,
};

static TEST_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn open_test_connection(test_name: &str) -> Connection {
    let template = ensure_template_db();
    let test_db_path = unique_test_db_path(test_name);

    if let Some(parent) = test_db_path.parent() {
        std::fs::create_dir_all(parent).expect("test db dir should be creatable");
    }

    std::fs::copy(&template, &test_db_path).expect("template db should be copied");
    open_connection(test_db_path.to_string_lossy().as_ref()).expect("test db should open")
}

fn ensure_template_db() -> PathBuf {
    static TEMPLATE_PATH: OnceLock<PathBuf> = OnceLock::new();

    TEMPLATE_PATH
        .get_or_init(|| {
            let template_path = std::env::var("TEST_DB_TEMPLATE_PATH")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_template_path);

            if let Some(parent) = template_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).expect("template parent dir should be creatable");
            }

            let mut connection = open_connection(template_path.to_string_lossy().as_ref())
                .expect("template db opens");
            run_migrations(&mut connection).expect("template migrations should succeed");

            template_path
        })
        .clone()
}

fn default_template_path() -> PathBuf {
    Path::new("./target/testdb/gp_joule_template.db").to_path_buf()
}

fn unique_test_db_path(test_name: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let counter = TEST_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
    Path::new("./target/testdb")
        .join(format!("{test_name}-{now}-{counter}.sqlite"))
        .to_path_buf()
}

pub fn sample_tenant(id: i64, root_url: &str) -> TenantConfig {
    TenantConfig {
        id,
        root_url: root_url.to_string(),
        api_key: "secret".to_string(),
        enable: true,
        refresh_interval_secs: 60,
        request_timeout_secs: 5,
        project_ids: vec!["10".to_string()],
        asset_filter: Vec::new(),
        active: false,
        user_id: None,
    }
}

pub fn insert_sample_tenant(connection: &Connection, root_url: &str) -> TenantConfig {
    let id = insert_configuration(
        connection,
        &NewTenantConfig {
            root_url: root_url.to_string(),
            api_key: "secret".to_string(),
            enable: true,
            refresh_interval_secs: 60,
            request_timeout_secs: 5,
            project_ids: vec!["10".to_string()],
            asset_filter: Vec::new(),
            user_id: None,
        },
    )
    .expect("tenant should insert");

    get_configuration(connection, id)
        .expect("tenant should load")
        .expect("tenant should exist")
}

/// Serves a single HTTP response on a local port and returns the raw request it received.
pub fn respond_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let port = listener.local_addr().expect("addr should be available").port();

    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().expect("client should connect");
        let mut reader = BufReader::new(stream.try_clone().expect("stream should clone"));

        let mut request = String::new();
        let mut content_length = 0_usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("request line should be readable");
            if let Some(value) = line.to_lowercase().strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap_or(0);
            }
            let end_of_head = line == "\r\n" || line.is_empty();
            request.push_str(&line);
            if end_of_head {
                break;
            }
        }

        let mut request_body = vec![0_u8; content_length];
        reader
            .read_exact(&mut request_body)
            .expect("request body should be readable");
        request.push_str(&String::from_utf8_lossy(&request_body));

        let response = format!(
            "HTTP/1.1 {status} TEST\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let mut stream = stream;
        stream
            .write_all(response.as_bytes())
            .expect("response should be written");
        request
    });

    (format!("http://127.0.0.1:{port}"), handle)
}

/// Provider double serving canned inventory and events.
#[derive(Default)]
pub struct FakeProvider {
    pub clusters: Mutex<Vec<Cluster>>,
    pub sessions: Mutex<Vec<ChargingSession>>,
    pub errors: Mutex<Vec<ErrorNotification>>,
    pub session_windows: Mutex<Vec<(String, DateTime<Utc>)>>,
    pub error_windows: Mutex<Vec<(String, DateTime<Utc>)>>,
    pub fail_clusters: Mutex<bool>,
    /// When set, `fetch_clusters` reports entry and blocks until released.
    pub gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl ProviderApi for FakeProvider {
    fn fetch_clusters(&self, _tenant: &TenantConfig) -> Result<Vec<Cluster>, RemoteError> {
        if let Some((entered, release)) = self.gate.lock().expect("gate lock").as_ref() {
            entered.send(()).expect("test should listen for entry");
            release.recv().expect("test should release the gate");
        }
        if *self.fail_clusters.lock().expect("flag lock") {
            return Err(RemoteError::Transient {
                url: "fake://clusters".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(self.clusters.lock().expect("clusters lock").clone())
    }

    fn fetch_sessions(
        &self,
        _tenant: &TenantConfig,
        charge_point_id: &str,
        since: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> Result<Vec<ChargingSession>, RemoteError> {
        self.session_windows
            .lock()
            .expect("windows lock")
            .push((charge_point_id.to_string(), since));
        Ok(self
            .sessions
            .lock()
            .expect("sessions lock")
            .iter()
            .filter(|session| session.charge_point_id == charge_point_id)
            .cloned()
            .collect())
    }

    fn fetch_errors(
        &self,
        _tenant: &TenantConfig,
        charge_point_id: &str,
        since: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> Result<Vec<ErrorNotification>, RemoteError> {
        self.error_windows
            .lock()
            .expect("windows lock")
            .push((charge_point_id.to_string(), since));
        Ok(self
            .errors
            .lock()
            .expect("errors lock")
            .iter()
            .filter(|notification| notification.charge_point_id == charge_point_id)
            .cloned()
            .collect())
    }
}

/// Platform double recording every call.
pub struct FakePlatform {
    next_id: AtomicI32,
    pub created: Mutex<Vec<NewAsset>>,
    pub points: Mutex<Vec<DataPoint>>,
    pub alarm_rules: Mutex<Vec<AlarmRule>>,
    pub missing: Mutex<HashSet<i32>>,
    /// Number of further upserts accepted before every upsert fails.
    pub upsert_budget: Mutex<Option<usize>>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            next_id: AtomicI32::new(1000),
            created: Mutex::default(),
            points: Mutex::default(),
            alarm_rules: Mutex::default(),
            missing: Mutex::default(),
            upsert_budget: Mutex::default(),
        }
    }
}

impl FakePlatform {
    pub fn points_for(&self, asset_id: i32) -> Vec<DataPoint> {
        self.points
            .lock()
            .expect("points lock")
            .iter()
            .filter(|point| point.asset_id == asset_id)
            .cloned()
            .collect()
    }
}

impl AssetPlatform for FakePlatform {
    fn create_asset(&self, asset: &NewAsset) -> Result<i32, RemoteError> {
        self.created.lock().expect("created lock").push(asset.clone());
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn asset_exists(&self, asset_id: i32) -> Result<bool, RemoteError> {
        Ok(!self.missing.lock().expect("missing lock").contains(&asset_id))
    }

    fn upsert_data(&self, point: &DataPoint) -> Result<(), RemoteError> {
        let mut budget = self.upsert_budget.lock().expect("budget lock");
        if let Some(remaining) = budget.as_mut() {
            if *remaining == 0 {
                return Err(RemoteError::Transient {
                    url: "fake://data".to_string(),
                    message: "timed out".to_string(),
                });
            }
            *remaining -= 1;
        }
        self.points.lock().expect("points lock").push(point.clone());
        Ok(())
    }

    fn create_alarm_rule(&self, rule: &AlarmRule) -> Result<(), RemoteError> {
        self.alarm_rules.lock().expect("rules lock").push(rule.clone());
        Ok(())
    }
}
