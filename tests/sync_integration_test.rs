use async_trait::async_trait;
use edge_ip_sync::config::SourceFormat;
use edge_ip_sync::domain::model::FirewallRule;
use edge_ip_sync::domain::ports::Firewall;
use edge_ip_sync::{
    LocalStorage, NginxControl, Result, SyncConfig, SyncEngine, SyncError, SyncOptions,
    SyncPipeline,
};
use httpmock::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const IPS_V4: &str = "173.245.48.0/20\n103.21.244.0/22\n103.22.200.0/22\n\n";
const IPS_V6: &str = "2400:cb00::/32\n2606:4700::/32\n";

#[derive(Clone, Default)]
struct RecordingFirewall {
    rules: Arc<Mutex<Vec<FirewallRule>>>,
    changes: Arc<Mutex<usize>>,
    ipv6: bool,
}

#[async_trait]
impl Firewall for RecordingFirewall {
    async fn ipv6_enabled(&self) -> Result<bool> {
        Ok(self.ipv6)
    }

    async fn list_tagged(&self, tag: &str) -> Result<Vec<FirewallRule>> {
        let rules = self.rules.lock().unwrap();
        Ok(rules.iter().filter(|r| r.comment == tag).cloned().collect())
    }

    async fn add(&self, rule: &FirewallRule) -> Result<()> {
        *self.changes.lock().unwrap() += 1;
        self.rules.lock().unwrap().push(rule.clone());
        Ok(())
    }

    async fn delete(&self, rule: &FirewallRule) -> Result<()> {
        *self.changes.lock().unwrap() += 1;
        self.rules.lock().unwrap().retain(|r| r != rule);
        Ok(())
    }
}

struct Fixture {
    dir: TempDir,
    config: SyncConfig,
}

impl Fixture {
    fn new(server: &MockServer) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = SyncConfig::default();
        config.source.ipv4_url = server.url("/ips-v4");
        config.source.ipv6_url = server.url("/ips-v6");
        config.source.api_url = server.url("/client/v4/ips");
        config.source.retry_attempts = 0;
        config.source.timeout_seconds = 5;
        config.nginx.real_ip_path = dir.path().join("conf.d/cloudflare_real_ip.conf");
        config.nginx.geo_path = dir.path().join("conf.d/cloudflare_geo.conf");
        // Accept the scratch config only if it includes readable staged files.
        config.nginx.stage_validate_command = sh_with_config(
            r#"grep -q include "$1" || exit 1; for f in $(sed -n 's/^ *include "\(.*\)";$/\1/p' "$1"); do test -r "$f" || exit 1; done"#,
        );
        config.nginx.validate_command = sh("exit 0");
        config.nginx.reload_command = sh(&format!(
            "echo reload >> '{}'",
            dir.path().join("reloads.log").display()
        ));
        Self { dir, config }
    }

    fn reloads(&self) -> usize {
        std::fs::read_to_string(self.dir.path().join("reloads.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    fn real_ip(&self) -> String {
        read(&self.config.nginx.real_ip_path)
    }

    fn geo(&self) -> String {
        read(&self.config.nginx.geo_path)
    }

    async fn run(&self, firewall: &RecordingFirewall) -> Result<edge_ip_sync::SyncReport> {
        let pipeline = SyncPipeline::new(
            LocalStorage::new(),
            firewall.clone(),
            NginxControl::from_config(&self.config.nginx),
            self.config.clone(),
            SyncOptions::default(),
        )?;
        SyncEngine::new(pipeline).run().await
    }
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn sh_with_config(script: &str) -> Vec<String> {
    let mut argv = sh(script);
    argv.extend(["sh".to_string(), "{config}".to_string()]);
    argv
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

async fn serve_lists(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ips-v4");
            then.status(200).body(IPS_V4);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ips-v6");
            then.status(200).body(IPS_V6);
        })
        .await;
}

fn seed_existing(fixture: &Fixture) -> (PathBuf, PathBuf) {
    let real_ip = fixture.config.nginx.real_ip_path.clone();
    let geo = fixture.config.nginx.geo_path.clone();
    std::fs::create_dir_all(real_ip.parent().unwrap()).unwrap();
    std::fs::write(&real_ip, "set_real_ip_from 10.0.0.0/8;\n").unwrap();
    std::fs::write(&geo, "geo $realip_remote_addr $cloudflare_ip { default 0; }\n").unwrap();
    (real_ip, geo)
}

#[tokio::test]
async fn test_end_to_end_sync_with_real_http() {
    let server = MockServer::start_async().await;
    serve_lists(&server).await;
    let fixture = Fixture::new(&server);
    let firewall = RecordingFirewall {
        ipv6: true,
        ..RecordingFirewall::default()
    };

    let report = fixture.run(&firewall).await.unwrap();

    assert_eq!(report.ipv4_ranges, 3);
    assert_eq!(report.ipv6_ranges, 2);
    assert_eq!(report.firewall.added, 5);
    assert!(report.reloaded);
    assert_eq!(fixture.reloads(), 1);

    // Every non-blank upstream line appears exactly once in each artifact.
    let real_ip = fixture.real_ip();
    let geo = fixture.geo();
    for line in IPS_V4.lines().chain(IPS_V6.lines()).filter(|l| !l.trim().is_empty()) {
        let directive = format!("set_real_ip_from {};", line);
        assert_eq!(real_ip.lines().filter(|l| *l == directive).count(), 1);
        let entry = format!("    {} 1;", line);
        assert_eq!(geo.lines().filter(|l| *l == entry).count(), 1);
    }
    assert!(real_ip.ends_with("real_ip_header CF-Connecting-IP;\n"));
    assert!(geo.contains("geo $realip_remote_addr $cloudflare_ip {\n    default 0;\n"));
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let server = MockServer::start_async().await;
    serve_lists(&server).await;
    let fixture = Fixture::new(&server);
    let firewall = RecordingFirewall::default();

    fixture.run(&firewall).await.unwrap();
    let first_real_ip = fixture.real_ip();
    let first_geo = fixture.geo();
    let first_rules = firewall.rules.lock().unwrap().clone();
    let first_changes = *firewall.changes.lock().unwrap();

    let report = fixture.run(&firewall).await.unwrap();

    assert!(!report.config_changed());
    assert!(!report.reloaded);
    assert_eq!(fixture.real_ip(), first_real_ip);
    assert_eq!(fixture.geo(), first_geo);
    assert_eq!(*firewall.rules.lock().unwrap(), first_rules);
    assert_eq!(*firewall.changes.lock().unwrap(), first_changes);
    assert_eq!(fixture.reloads(), 1);
}

#[tokio::test]
async fn test_fetch_failure_leaves_everything_untouched() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ips-v4");
            then.status(200).body(IPS_V4);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ips-v6");
            then.status(500);
        })
        .await;
    let fixture = Fixture::new(&server);
    let (real_ip, geo) = seed_existing(&fixture);
    let firewall = RecordingFirewall::default();

    let err = fixture.run(&firewall).await.unwrap_err();

    assert!(matches!(err, SyncError::FetchError { .. }));
    assert_eq!(read(&real_ip), "set_real_ip_from 10.0.0.0/8;\n");
    assert_eq!(read(&geo), "geo $realip_remote_addr $cloudflare_ip { default 0; }\n");
    assert_eq!(*firewall.changes.lock().unwrap(), 0);
    assert_eq!(fixture.reloads(), 0);

    // No temp files left next to the targets.
    let entries = std::fs::read_dir(real_ip.parent().unwrap()).unwrap().count();
    assert_eq!(entries, 2);
}

#[tokio::test]
async fn test_failed_validation_keeps_existing_config() {
    let server = MockServer::start_async().await;
    serve_lists(&server).await;
    let mut fixture = Fixture::new(&server);
    fixture.config.nginx.validate_command = sh("echo 'nginx: [emerg] bad geo' >&2; exit 1");
    let (real_ip, geo) = seed_existing(&fixture);

    let err = fixture.run(&RecordingFirewall::default()).await.unwrap_err();

    match err {
        SyncError::ValidationFailed { output } => assert!(output.contains("bad geo")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(read(&real_ip), "set_real_ip_from 10.0.0.0/8;\n");
    assert_eq!(read(&geo), "geo $realip_remote_addr $cloudflare_ip { default 0; }\n");
    assert_eq!(fixture.reloads(), 0);
}

#[tokio::test]
async fn test_staged_rejection_never_touches_live_files() {
    let server = MockServer::start_async().await;
    serve_lists(&server).await;
    let mut fixture = Fixture::new(&server);
    fixture.config.nginx.stage_validate_command =
        sh_with_config("echo 'nginx: [emerg] unknown directive' >&2; exit 1");
    let live_checks = fixture.dir.path().join("live-checks.log");
    fixture.config.nginx.validate_command =
        sh(&format!("echo check >> '{}'", live_checks.display()));
    let (real_ip, geo) = seed_existing(&fixture);

    let err = fixture.run(&RecordingFirewall::default()).await.unwrap_err();

    match err {
        SyncError::ValidationFailed { output } => assert!(output.contains("unknown directive")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(read(&real_ip), "set_real_ip_from 10.0.0.0/8;\n");
    assert_eq!(read(&geo), "geo $realip_remote_addr $cloudflare_ip { default 0; }\n");
    assert!(!live_checks.exists());
    assert_eq!(fixture.reloads(), 0);
    let entries = std::fs::read_dir(real_ip.parent().unwrap()).unwrap().count();
    assert_eq!(entries, 2);
}

#[tokio::test]
async fn test_reload_failure_is_reported_without_rollback() {
    let server = MockServer::start_async().await;
    serve_lists(&server).await;
    let mut fixture = Fixture::new(&server);
    fixture.config.nginx.reload_command = sh("exit 1");

    let err = fixture.run(&RecordingFirewall::default()).await.unwrap_err();

    assert!(matches!(err, SyncError::ReloadFailed { .. }));
    assert_eq!(err.exit_code(), 1);
    assert!(fixture.real_ip().contains("set_real_ip_from 173.245.48.0/20;"));
    assert!(fixture.geo().contains("    2606:4700::/32 1;"));
}

#[tokio::test]
async fn test_json_api_source() {
    let server = MockServer::start_async().await;
    let api = server
        .mock_async(|when, then| {
            when.method(GET).path("/client/v4/ips");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "result": {
                        "ipv4_cidrs": ["173.245.48.0/20", "103.21.244.0/22"],
                        "ipv6_cidrs": ["2400:cb00::/32"]
                    },
                    "success": true,
                    "errors": [],
                    "messages": []
                }));
        })
        .await;
    let mut fixture = Fixture::new(&server);
    fixture.config.source.format = SourceFormat::Json;

    let report = fixture.run(&RecordingFirewall::default()).await.unwrap();

    api.assert_async().await;
    assert_eq!(report.ipv4_ranges, 2);
    assert_eq!(report.ipv6_ranges, 1);
    assert!(fixture.geo().contains("    2400:cb00::/32 1;"));
}
