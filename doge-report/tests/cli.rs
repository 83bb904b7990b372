use assert_cmd::assert::OutputAssertExt;
use assert_cmd::Command;
use clap::Parser;
use doge_report::cli::{execute, run, Cli};
use doge_report::load_config::load_config;
use doge_report_core::config::Endpoint;
use doge_report_core::contract::MockPageSource;
use predicates::prelude::*;
use serde_json::{json, Value};
use serial_test::serial;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Environment the loader would otherwise pick up from the host.
const AMBIENT_VARS: [&str; 4] = [
    "DOGE_API_KEY",
    "DOGE_API_BASE_URL",
    "HTTP_PROXY",
    "HTTPS_PROXY",
];

fn clear_ambient_env() {
    for name in AMBIENT_VARS {
        std::env::remove_var(name);
    }
}

fn cli(args: &[&str]) -> Cli {
    Cli::parse_from(std::iter::once("doge-report").chain(args.iter().copied()))
}

async fn mount_page(server: &MockServer, endpoint_path: &str, page: u32, body: Value) {
    Mock::given(method("GET"))
        .and(path(endpoint_path))
        .and(query_param("page", page.to_string()))
        .and(query_param("per_page", "500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

#[test]
fn help_lists_endpoints_and_options() {
    Command::cargo_bin("doge-report")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("statistics")
                .and(predicate::str::contains("--api-key"))
                .and(predicate::str::contains("--format")),
        );
}

#[test]
fn unknown_endpoint_is_an_argument_error() {
    Command::cargo_bin("doge-report")
        .unwrap()
        .arg("savings")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn unknown_format_is_an_argument_error() {
    Command::cargo_bin("doge-report")
        .unwrap()
        .args(["grants", "--format", "xml"])
        .assert()
        .failure()
        .code(2);
}

#[tokio::test]
#[serial]
async fn run_writes_all_pages_of_grants_as_csv() {
    clear_ambient_env();
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/savings/grants",
        1,
        json!({
            "success": true,
            "result": {"grants": [
                {"agency": "GSA", "value": 10, "links": {"x": 1}},
                {"agency": "DOE", "value": 20, "links": null}
            ]},
            "meta": {"pages": 2}
        }),
    )
    .await;
    mount_page(
        &server,
        "/savings/grants",
        2,
        json!({
            "success": true,
            "result": {"grants": [{"agency": "NASA", "value": 30, "links": null}]},
            "meta": {"pages": 2}
        }),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let uri = server.uri();
    let out_dir = dir.path().to_str().unwrap();

    let summary = run(cli(&["grants", "--base-url", &uri, "-f", "csv", "-d", out_dir, "-r", "0"]))
        .await
        .unwrap();

    let expected = dir.path().join("doge_grants_data.csv");
    assert_eq!(summary.endpoint, Endpoint::Grants);
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.records, 3);
    assert_eq!(summary.outputs, vec![expected.clone()]);
    assert_eq!(
        fs::read_to_string(expected).unwrap(),
        "agency,value,links\r\nGSA,10,\"{\"\"x\"\": 1}\"\r\nDOE,20,\r\nNASA,30,\r\n"
    );
}

#[tokio::test]
#[serial]
async fn run_honours_explicit_output_path() {
    clear_ambient_env();
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/payments",
        1,
        json!({
            "success": true,
            "result": {"payments": [{"id": 1}]},
            "meta": {"pages": 1}
        }),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("reports").join("payments.json");
    let uri = server.uri();

    let summary = run(cli(&["payments", "--base-url", &uri, "-o", output.to_str().unwrap()]))
        .await
        .unwrap();

    assert_eq!(summary.outputs, vec![output.clone()]);
    let saved: Value = serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
    assert_eq!(saved, json!([{"id": 1}]));
}

#[tokio::test]
#[serial]
async fn run_writes_one_file_per_statistics_dimension() {
    clear_ambient_env();
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/payments/statistics",
        1,
        json!({
            "success": true,
            "result": {
                "agency": [{"agency_name": "GSA", "count": 4}],
                "request_date": [{"date": "2025-01-01", "count": 2}],
                "org_names": [{"org_name": "Office", "count": 1}]
            },
            "meta": {"pages": 1}
        }),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let uri = server.uri();
    let out_dir = dir.path().to_str().unwrap();

    let summary = run(cli(&["statistics", "--base-url", &uri, "-d", out_dir]))
        .await
        .unwrap();

    assert_eq!(summary.records, 3);
    let names: Vec<String> = summary
        .outputs
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "doge_statistics_agency_data.json",
            "doge_statistics_request_date_data.json",
            "doge_statistics_org_names_data.json",
        ]
    );
    let agency: Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("doge_statistics_agency_data.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(agency, json!([{"agency_name": "GSA", "count": 4}]));
}

#[tokio::test]
#[serial]
async fn statistics_summary_ignores_files_left_by_earlier_runs() {
    clear_ambient_env();
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/payments/statistics",
        1,
        json!({
            "success": true,
            "result": {
                "agency": [{"agency_name": "GSA", "count": 4}],
                "request_date": [{"date": "2025-01-01", "count": 2}],
                "org_names": []
            },
            "meta": {"pages": 3}
        }),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let stale = dir.path().join("doge_statistics_org_names_data.csv");
    fs::write(&stale, "org_name,count\r\nOld,9\r\n").unwrap();
    let uri = server.uri();
    let out_dir = dir.path().to_str().unwrap();

    let summary = run(cli(&["statistics", "--base-url", &uri, "-f", "csv", "-d", out_dir]))
        .await
        .unwrap();

    assert_eq!(summary.pages, 1);
    assert_eq!(
        summary.outputs,
        vec![
            dir.path().join("doge_statistics_agency_data.csv"),
            dir.path().join("doge_statistics_request_date_data.csv"),
        ]
    );
    assert_eq!(
        fs::read_to_string(&stale).unwrap(),
        "org_name,count\r\nOld,9\r\n"
    );
}

#[tokio::test]
#[serial]
async fn empty_csv_result_writes_no_file() {
    clear_ambient_env();
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/savings/leases",
        1,
        json!({"success": true, "result": {"leases": []}, "meta": {"pages": 4}}),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let uri = server.uri();
    let out_dir = dir.path().to_str().unwrap();

    let summary = run(cli(&["leases", "--base-url", &uri, "-f", "csv", "-d", out_dir]))
        .await
        .unwrap();

    assert_eq!(summary.records, 0);
    assert!(summary.outputs.is_empty());
    assert!(!dir.path().join("doge_leases_data.csv").exists());
}

#[tokio::test]
#[serial]
async fn api_failure_writes_nothing() {
    clear_ambient_env();
    let dir = TempDir::new().unwrap();
    let out_dir = dir.path().to_str().unwrap();
    let config = load_config(&cli(&["contracts", "-d", out_dir])).unwrap();

    let mut source = MockPageSource::new();
    source.expect_fetch().times(1).returning(|_| {
        Ok(serde_json::from_value(json!({"success": false, "message": "maintenance"})).unwrap())
    });

    let err = execute(&config, source).await.unwrap_err();

    assert!(format!("{err:#}").contains("API error: maintenance"));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
#[serial]
async fn forbidden_exits_with_code_one_and_api_key_hint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let uri = server.uri();
    let work_dir = dir.path().to_path_buf();

    // The binary blocks, so keep it off the runtime thread serving the mock.
    let output = tokio::task::spawn_blocking(move || {
        let mut cmd = Command::cargo_bin("doge-report").unwrap();
        for name in AMBIENT_VARS {
            cmd.env_remove(name);
        }
        cmd.current_dir(&work_dir)
            .args(["grants", "--base-url", &uri])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    output
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Retrieving data from /savings/grants"))
        .stderr(
            predicate::str::contains("[ERROR] HTTP error 403 Forbidden")
                .and(predicate::str::contains("Try using the --api-key option")),
        );
    assert!(!dir.path().join("doge_grants_data.json").exists());
}
