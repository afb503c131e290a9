//! End-to-end runs: fixture files on disk, the real HTTP adapter, and a
//! scripted in-process server.

use std::collections::HashSet;
use std::path::Path;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use sqllogic::{BackendConfig, BackendKind, ParseErrorPolicy, RunOptions, Runner};

/// A minimal SQL-over-HTTP server: understands `SET <k> = '<v>';`,
/// `SELECT @@<k>;`, `SELECT 1 = 1;`, and `DROP TABLE missing;`, and echoes
/// session state back the way the real protocol does.
struct ScriptedServer;

impl Respond for ScriptedServer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).expect("request body should be JSON");
        let sql = body["sql"].as_str().unwrap_or_default().trim();
        let mut session = body.get("session").cloned().unwrap_or_else(|| serde_json::json!({}));

        if let Some(assignment) = sql.strip_prefix("SET ") {
            if let Some((key, value)) = assignment.trim_end_matches(';').split_once('=') {
                session[key.trim()] = serde_json::json!(value.trim().trim_matches('\''));
            }
            return ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "affected_rows": 0, "session": session }));
        }
        if let Some(key) = sql.strip_prefix("SELECT @@") {
            let value = session.get(key.trim_end_matches(';')).cloned();
            return match value {
                Some(value) => ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "data": [[value]],
                    "session": session,
                })),
                None => ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "error": { "code": 1064, "message": "unknown session variable" },
                    "session": session,
                })),
            };
        }
        match sql {
            "SELECT 1 = 1;" => ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [[true]],
                "session": session,
            })),
            "DROP TABLE missing;" => ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": { "code": 1146, "message": "no such table: missing" },
                "session": session,
            })),
            _ => ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "session": session,
            })),
        }
    }
}

async fn scripted_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/query"))
        .respond_with(ScriptedServer)
        .mount(&server)
        .await;
    server
}

fn http_backend(server: &MockServer) -> BackendConfig {
    let address = server.address();
    BackendConfig {
        label: "http".to_string(),
        protocol: BackendKind::Http,
        host: address.ip().to_string(),
        port: address.port(),
        user: String::new(),
        password: String::new(),
        database: None,
    }
}

fn write_fixture(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).expect("fixture should be writable");
}

#[tokio::test]
async fn run_passes_with_sticky_session_and_labeled_booleans() {
    let server = scripted_server().await;
    let dir = tempfile::tempdir().expect("tempdir");
    write_fixture(
        dir.path(),
        "session.test",
        "-- session stickiness across records\n\
         statement ok\n\
         SET time_zone = '+08:00';\n\
         \n\
         statement query T\n\
         SELECT @@time_zone;\n\
         \n\
         ----\n\
         +08:00\n",
    );
    write_fixture(
        dir.path(),
        "booleans.test",
        "statement query B label(http)\n\
         SELECT 1 = 1;\n\
         \n\
         ---- http\n\
         true\n\
         \n\
         statement error .*no such table.*\n\
         DROP TABLE missing;\n",
    );

    let runner = Runner::new(RunOptions::new(dir.path()), vec![http_backend(&server)])
        .expect("runner should build");
    let report = runner.run().await.expect("run should complete");

    let totals = report.totals();
    assert!(report.success(), "report: {}", report.display(false));
    assert_eq!(totals.passed, 4);
    assert_eq!(totals.failed, 0);
}

#[tokio::test]
async fn wrong_boolean_literal_fails_only_that_record() {
    let server = scripted_server().await;
    let dir = tempfile::tempdir().expect("tempdir");
    // The server answers a typed JSON boolean; expecting the MySQL literal
    // `1` from the HTTP backend must fail.
    write_fixture(
        dir.path(),
        "booleans.test",
        "statement query B label(http)\n\
         SELECT 1 = 1;\n\
         \n\
         ---- http\n\
         1\n\
         \n\
         statement query B label(http)\n\
         SELECT 1 = 1;\n\
         \n\
         ---- http\n\
         true\n",
    );

    let runner = Runner::new(RunOptions::new(dir.path()), vec![http_backend(&server)])
        .expect("runner should build");
    let report = runner.run().await.expect("run should complete");

    let totals = report.totals();
    assert!(!report.success());
    assert_eq!(totals.failed, 1);
    assert_eq!(totals.passed, 1);
    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].backend, "http");
}

#[tokio::test]
async fn skip_list_and_parse_errors_are_reported() {
    let server = scripted_server().await;
    let dir = tempfile::tempdir().expect("tempdir");
    write_fixture(dir.path(), "broken.test", "this is not a directive\n");
    write_fixture(dir.path(), "flaky.test", "statement ok\nSELECT 1;\n");
    write_fixture(dir.path(), "good.test", "statement ok\nSELECT 1;\n");

    let mut options = RunOptions::new(dir.path());
    options.skip_list = HashSet::from(["flaky".to_string()]);
    options.parse_error_policy = ParseErrorPolicy::Skip;
    let runner =
        Runner::new(options, vec![http_backend(&server)]).expect("runner should build");
    let report = runner.run().await.expect("run should complete");

    // The parse failure fails the run but the good suite still executed.
    assert!(!report.success());
    assert_eq!(report.parse_errors().len(), 1);
    assert_eq!(report.totals().passed, 1);

    let rendered = report.display(false).to_string();
    assert!(rendered.contains("flaky.test: skipped (skip list)"));
    assert!(rendered.contains("parse error"));
}

#[tokio::test]
async fn unreachable_backend_errors_every_suite() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_fixture(dir.path(), "good.test", "statement ok\nSELECT 1;\n");

    // Grab a port nothing listens on, so the MySQL connect is refused
    // immediately instead of waiting out a handshake.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("local addr").port()
    };
    let backend = BackendConfig {
        label: "mysql".to_string(),
        protocol: BackendKind::Mysql,
        host: "127.0.0.1".to_string(),
        port,
        user: "root".to_string(),
        password: String::new(),
        database: None,
    };

    let runner = Runner::new(RunOptions::new(dir.path()), vec![backend])
        .expect("runner should build");
    let report = runner.run().await.expect("run should complete");

    assert!(!report.success());
    assert_eq!(report.totals().errored, 1);
}
