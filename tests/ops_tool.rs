mod common;

use common::{app_with, FakeConnector, Script};
use opsguard::errors::{ToolError, ToolErrorKind};
use serde_json::json;

#[tokio::test]
async fn status_tolerates_failing_probes() {
    let connector = FakeConnector::new()
        .script("top -bn1", Script::ok("12.5\n"))
        .script("free -m", Script::ok("41.3%"))
        .script("df -h /", Script::ok(""))
        .script("uptime |", Script::failing("awk: not found", 127))
        .script("uptime -p", Script::failing("uptime: invalid option", 1));
    let app = app_with(connector.clone());
    let status = app
        .tool_executor
        .execute("ops", json!({"action": "status", "host": "10.0.0.5"}))
        .await
        .expect("status");
    assert_eq!(status["host"], "10.0.0.5");
    assert_eq!(status["online"], true);
    assert_eq!(status["cpu_usage"], "12.5");
    assert_eq!(status["memory_usage"], "41.3%");
    assert_eq!(status["disk_usage"], "N/A");
    assert_eq!(status["load_average"], "N/A");
    assert_eq!(status["uptime"], "N/A");
    assert_eq!(connector.counters.connects(), 1);
    assert_eq!(connector.counters.disconnects(), 1);
    assert_eq!(connector.counters.commands().len(), 5);
}

#[tokio::test]
async fn status_offline_when_connect_fails() {
    let connector = FakeConnector::new().refuse(ToolError::connection("Connection timed out: 10.0.0.9:22"));
    let app = app_with(connector);
    let status = app
        .tool_executor
        .execute("ops", json!({"action": "status", "host": "10.0.0.9"}))
        .await
        .expect("status");
    assert_eq!(status["online"], false);
    for metric in ["cpu_usage", "memory_usage", "disk_usage", "load_average", "uptime"] {
        assert_eq!(status[metric], "N/A", "{}", metric);
    }
}

#[tokio::test]
async fn diagnose_uses_one_connection_per_check() {
    let connector = FakeConnector::new()
        .script("systemctl status nginx", Script::ok("active (running)"))
        .script("journalctl -u nginx -n 50", Script::failing("No entries", 1))
        .script("ps aux | grep nginx", Script::ok("root 1 nginx: master"));
    let app = app_with(connector.clone());
    let report = app
        .tool_executor
        .execute(
            "ops",
            json!({"action": "diagnose", "host": "web01", "service_name": "nginx"}),
        )
        .await
        .expect("diagnose");
    assert_eq!(report["service"], "nginx");
    assert_eq!(report["host"], "web01");
    let checks = &report["diagnostics"];
    assert_eq!(checks["service_status"]["success"], true);
    assert_eq!(checks["service_status"]["output"], "active (running)");
    assert_eq!(checks["recent_logs"]["success"], false);
    assert_eq!(checks["recent_logs"]["output"], "No entries");
    assert_eq!(checks["process_check"]["success"], true);
    assert_eq!(connector.counters.connects(), 3);
    assert_eq!(connector.counters.disconnects(), 3);
}

#[tokio::test]
async fn diagnose_maps_connection_errors_per_check() {
    let connector = FakeConnector::new().refuse(ToolError::connection("Authentication failed: root@web01"));
    let app = app_with(connector.clone());
    let report = app
        .tool_executor
        .execute(
            "ops",
            json!({"action": "diagnose", "host": "web01", "service_name": "nginx"}),
        )
        .await
        .expect("diagnose");
    for check in ["service_status", "recent_logs", "process_check"] {
        assert_eq!(report["diagnostics"][check]["success"], false);
        assert_eq!(
            report["diagnostics"][check]["output"],
            "Authentication failed: root@web01"
        );
    }
    assert_eq!(connector.counters.attempts(), 3);
}

#[tokio::test]
async fn service_name_must_be_an_identifier() {
    let connector = FakeConnector::new();
    let app = app_with(connector.clone());
    let err = app
        .tool_executor
        .execute(
            "ops",
            json!({"action": "diagnose", "host": "web01", "service_name": "nginx; reboot"}),
        )
        .await
        .expect_err("rejected");
    assert_eq!(err.kind, ToolErrorKind::InvalidParams);
    assert_eq!(connector.counters.attempts(), 0);
}

#[tokio::test]
async fn service_status_reads_is_active() {
    let connector = FakeConnector::new()
        .script("systemctl is-active", Script::ok("active\n"))
        .script("systemctl status", Script::ok("● sshd.service - OpenSSH\n"));
    let app = app_with(connector.clone());
    let result = app
        .tool_executor
        .execute(
            "ops",
            json!({"action": "service_status", "host": "10.0.0.5", "service_name": "sshd"}),
        )
        .await
        .expect("service");
    assert_eq!(result["service"], "sshd");
    assert_eq!(result["is_active"], true);
    assert_eq!(result["details"], "● sshd.service - OpenSSH\n");
    assert_eq!(connector.counters.connects(), 1);
}

#[tokio::test]
async fn containers_are_parsed_from_tab_rows() {
    let connector = FakeConnector::new().script(
        "docker ps -a",
        Script::ok("a1b2\tweb\tUp 2 hours\t0.0.0.0:80->80/tcp\nc3d4\tdb\tExited (0) 1 day ago\n"),
    );
    let app = app_with(connector.clone());
    let result = app
        .tool_executor
        .execute(
            "ops",
            json!({"action": "containers", "host": "10.0.0.5", "container_name": "web"}),
        )
        .await
        .expect("containers");
    let rows = result["containers"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "web");
    assert_eq!(rows[1]["ports"], "");
    assert!(connector.counters.commands()[0].contains("name=web"));
}

#[tokio::test]
async fn container_stderr_yields_empty_list() {
    let connector = FakeConnector::new().fallback(Script::failing(
        "Cannot connect to the Docker daemon",
        1,
    ));
    let app = app_with(connector);
    let result = app
        .tool_executor
        .execute("ops", json!({"action": "containers", "host": "10.0.0.5"}))
        .await
        .expect("containers");
    assert_eq!(result["error"], "Cannot connect to the Docker daemon");
    assert_eq!(result["containers"], json!([]));
}

#[tokio::test]
async fn pods_default_namespace() {
    let connector = FakeConnector::new().fallback(Script::ok("NAME READY\n"));
    let app = app_with(connector.clone());
    let result = app
        .tool_executor
        .execute("ops", json!({"action": "pods", "host": "10.0.0.5"}))
        .await
        .expect("pods");
    assert_eq!(result["namespace"], "default");
    assert_eq!(result["output"], "NAME READY\n");
    assert!(result["error"].is_null());
    assert_eq!(
        connector.counters.commands(),
        vec!["kubectl get pods -n default -o wide".to_string()]
    );
}

#[tokio::test]
async fn denied_host_blocks_probes() {
    let connector = FakeConnector::new();
    let app = app_with(connector.clone());
    let err = app
        .tool_executor
        .execute("ops", json!({"action": "status", "host": "-badhost"}))
        .await
        .expect_err("bad host");
    assert!(err.is_denied());
    assert_eq!(connector.counters.attempts(), 0);
}
