//! Ingress protocol end-to-end tests
//!
//! Drives the engine binary over its stdin/stdout protocol: envelopes
//! go in, one reply line comes out per request. A /bin/sh fake stands
//! in for the C interpreter so the tests run anywhere.

mod common;

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use tempfile::TempDir;

// ─────────────────────────────────────────────────────────────────
// Payload helpers
// ─────────────────────────────────────────────────────────────────

/// Armor a value: JSON bytes wrapped in base64
fn armor(v: &Value) -> String {
    STANDARD.encode(v.to_string())
}

/// Armor raw text (C sources travel as plain text, not JSON)
fn armor_text(text: &str) -> String {
    STANDARD.encode(text)
}

/// Unarmor a reply payload back into JSON
fn unarmor(blob: &str) -> Value {
    serde_json::from_slice(&STANDARD.decode(blob).unwrap()).unwrap()
}

/// The closure (a, b) -> a + b in wire form
fn add_closure() -> String {
    armor(&json!({
        "t": "CLOSURE",
        "v": {
            "params": ["a", "b"],
            "body": {
                "kind": "binary",
                "op": "add",
                "left": {"kind": "var", "name": "a"},
                "right": {"kind": "var", "name": "b"}
            }
        }
    }))
}

fn int_arg(n: i64) -> String {
    armor(&json!({"t": "INT", "v": n}))
}

const SUMA_SOURCE: &str =
    "#include <stdio.h>\nvoid suma(int a, int b, float *c)\n{\n    *c = a + b;\n}\n";

/// A param descriptor blob for the C executor
fn c_param(c_type: &str, var_name: &str, value: Option<&Value>, mode: &str) -> String {
    let mut descriptor = json!({
        "type": c_type,
        "var_name": var_name,
        "mode": mode,
    });
    if let Some(v) = value {
        descriptor["value"] = Value::String(armor(v));
    }
    armor(&descriptor)
}

fn suma_params() -> Vec<String> {
    vec![
        c_param("int", "a", Some(&json!({"t": "INT", "v": 2})), "IN"),
        c_param("int", "b", Some(&json!({"t": "INT", "v": 5})), "IN"),
        c_param("float *", "c", None, "OUT"),
    ]
}

// ─────────────────────────────────────────────────────────────────
// Engine process harness
// ─────────────────────────────────────────────────────────────────

/// A running engine with a config whose interpreter is a shell fake
struct EngineProc {
    _root: TempDir,
    child: Child,
    stdin: Option<ChildStdin>,
    reader: BufReader<std::process::ChildStdout>,
}

impl EngineProc {
    /// Spawn the engine with the given fake interpreter script
    fn spawn(interpreter_script: &str) -> Self {
        let root = TempDir::new().unwrap();
        let config_path = root.path().join("config.toml");
        let config = format!(
            r#"
[engine]
max_concurrent_tasks = 2
max_finished_tasks = 32

[interpreter]
command = "/bin/sh"
args = ["-c", "{}"]

[logging]
level = "error"
"#,
            interpreter_script
        );
        fs::write(&config_path, config).unwrap();

        let mut child = Command::new(assert_cmd::cargo::cargo_bin("offload-engine"))
            .arg("run")
            .arg("--config")
            .arg(&config_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to spawn engine");

        let stdin = child.stdin.take().unwrap();
        let reader = BufReader::new(child.stdout.take().unwrap());

        Self {
            _root: root,
            child,
            stdin: Some(stdin),
            reader,
        }
    }

    /// Send one envelope and read back its reply
    fn request(&mut self, envelope: &Value) -> Value {
        let stdin = self.stdin.as_mut().expect("stdin already closed");
        writeln!(stdin, "{}", envelope).unwrap();
        stdin.flush().unwrap();

        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .expect("Failed to read reply");
        serde_json::from_str(&line).expect("Reply is not valid JSON")
    }

    /// Close stdin and wait for a clean exit
    fn finish(mut self) {
        drop(self.stdin.take());
        let status = self.child.wait().expect("Failed to wait for engine");
        assert!(status.success(), "Engine exited with {}", status);
    }
}

impl Drop for EngineProc {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

/// Poll a task until it leaves WORKING, up to ~5 seconds
fn poll_until_settled(engine: &mut EngineProc, exec_id: &Value) -> Value {
    for _ in 0..100 {
        let reply = engine.request(&json!({
            "mode": "status",
            "request_id": "poll",
            "payload": exec_id,
        }));
        assert_eq!(reply["code"], 200);
        if reply["message"]["status"] != "WORKING" {
            return reply;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("Task never settled");
}

// ─────────────────────────────────────────────────────────────────
// One-shot tests (stdin written in full, then EOF)
// ─────────────────────────────────────────────────────────────────

/// Run the engine over a fixed stdin and collect one reply per line
fn run_lines(input: &str) -> Vec<Value> {
    let assert = assert_cmd::Command::cargo_bin("offload-engine")
        .unwrap()
        .arg("run")
        .arg("--config")
        .arg(common::valid_config_fixture())
        .write_stdin(input.to_string())
        .timeout(Duration::from_secs(30))
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("Reply is not valid JSON"))
        .collect()
}

#[test]
fn test_sync_py_add() {
    let envelope = json!({
        "mode": "sync",
        "request_id": "r1",
        "payload": {
            "lang": "PY",
            "fc": add_closure(),
            "params": [int_arg(2), int_arg(3)],
        },
    });

    let replies = run_lines(&format!("{}\n", envelope));
    assert_eq!(replies.len(), 1);

    let reply = &replies[0];
    assert_eq!(reply["request_id"], "r1");
    assert_eq!(reply["code"], 200);
    assert_eq!(reply["message"]["ret_code"], 0);
    assert_eq!(reply["message"]["err"], Value::Null);

    let res = unarmor(reply["message"]["res"].as_str().unwrap());
    assert_eq!(res, json!({"t": "INT", "v": 5}));
}

#[test]
fn test_sync_c_float_result() {
    // The fixture config fakes the interpreter with a shell that echoes
    // a cling-style float
    let envelope = json!({
        "mode": "sync",
        "request_id": "c1",
        "payload": {
            "lang": "C",
            "fc": armor_text(SUMA_SOURCE),
            "params": suma_params(),
        },
    });

    let replies = run_lines(&format!("{}\n", envelope));
    assert_eq!(replies.len(), 1);

    let reply = &replies[0];
    assert_eq!(reply["code"], 200);
    assert_eq!(reply["message"]["ret_code"], 0);

    let res = unarmor(reply["message"]["res"].as_str().unwrap());
    assert_eq!(res, json!({"t": "FLOAT", "v": 7.0}));
}

#[test]
fn test_unsupported_language_rejected() {
    let ruby = json!({
        "mode": "sync",
        "request_id": "rb",
        "payload": {"lang": "RUBY", "fc": armor_text("puts 1"), "params": []},
    });
    let metrics = json!({"mode": "metrics", "request_id": "m"});

    let replies = run_lines(&format!("{}\n{}\n", ruby, metrics));
    assert_eq!(replies.len(), 2);

    assert_eq!(replies[0]["code"], 400);
    let message = replies[0]["message"].as_str().unwrap();
    assert!(message.contains("Unsupported language"));
    assert!(message.contains("RUBY"));

    // A rejected request never reaches the executors
    assert_eq!(replies[1]["code"], 200);
    assert_eq!(replies[1]["message"]["counters"]["executed"], 0);
}

#[test]
fn test_malformed_line_rejected() {
    let replies = run_lines("this is not json\n");
    assert_eq!(replies.len(), 1);

    assert_eq!(replies[0]["code"], 400);
    assert_eq!(replies[0]["request_id"], "");
    assert!(replies[0]["message"]
        .as_str()
        .unwrap()
        .contains("Malformed request"));
}

#[test]
fn test_blank_lines_skipped() {
    let envelope = json!({
        "mode": "sync",
        "request_id": "r1",
        "payload": {
            "lang": "PY",
            "fc": add_closure(),
            "params": [int_arg(1), int_arg(1)],
        },
    });

    let replies = run_lines(&format!("\n\n{}\n\n", envelope));
    assert_eq!(replies.len(), 1);
}

#[test]
fn test_status_unknown_task() {
    let envelope = json!({
        "mode": "status",
        "request_id": "s1",
        "payload": {"faas_task_uuid": "123e4567-e89b-12d3-a456-426614174000"},
    });

    let replies = run_lines(&format!("{}\n", envelope));
    assert_eq!(replies.len(), 1);

    assert_eq!(replies[0]["code"], 404);
    assert!(replies[0]["message"]
        .as_str()
        .unwrap()
        .contains("Task not found"));
}

#[test]
fn test_metrics_count_captured_errors() {
    let ok = json!({
        "mode": "sync",
        "request_id": "ok",
        "payload": {
            "lang": "PY",
            "fc": add_closure(),
            "params": [int_arg(2), int_arg(3)],
        },
    });
    // One argument for a two-parameter closure: captured at run time
    let arity = json!({
        "mode": "sync",
        "request_id": "arity",
        "payload": {
            "lang": "PY",
            "fc": add_closure(),
            "params": [int_arg(2)],
        },
    });
    let metrics = json!({"mode": "metrics", "request_id": "m"});

    let replies = run_lines(&format!("{}\n{}\n{}\n", ok, arity, metrics));
    assert_eq!(replies.len(), 3);

    // The arity failure is an execution result, not a transport error
    assert_eq!(replies[1]["code"], 200);
    assert_eq!(replies[1]["message"]["ret_code"], -1);
    assert!(replies[1]["message"]["err"]
        .as_str()
        .unwrap()
        .starts_with("Error executing function:"));

    let counters = &replies[2]["message"]["counters"];
    assert_eq!(counters["executed"], 2);
    assert_eq!(counters["succeeded"], 1);
    assert_eq!(counters["failed"], 1);
    assert_eq!(replies[2]["message"]["recent_calls"].as_array().unwrap().len(), 2);
}

// ─────────────────────────────────────────────────────────────────
// Interactive tests (poll the engine while tasks run)
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_async_lifecycle() {
    // The fake interpreter sleeps long enough for the first poll to
    // catch the task in flight
    let mut engine = EngineProc::spawn("sleep 0.3; cat >/dev/null; echo '(float) 7.00000f'");

    let submit = engine.request(&json!({
        "mode": "async",
        "request_id": "a1",
        "payload": {
            "lang": "C",
            "fc": armor_text(SUMA_SOURCE),
            "params": suma_params(),
        },
    }));

    assert_eq!(submit["code"], 200);
    assert_eq!(submit["message"]["status"], "WORKING");
    let exec_id = submit["message"]["exec_id"].clone();
    assert!(exec_id["faas_task_uuid"].is_string());

    let settled = poll_until_settled(&mut engine, &exec_id);
    assert_eq!(settled["message"]["status"], "READY");
    assert_eq!(settled["message"]["res"]["ret_code"], 0);

    let res = unarmor(settled["message"]["res"]["res"].as_str().unwrap());
    assert_eq!(res, json!({"t": "FLOAT", "v": 7.0}));

    engine.finish();
}

#[test]
fn test_async_captured_error_still_ready() {
    // Interpreter failure is captured into the result; the task settles
    // READY with an error payload, not FAILED
    let mut engine = EngineProc::spawn("cat >/dev/null; exit 3");

    let submit = engine.request(&json!({
        "mode": "async",
        "request_id": "a1",
        "payload": {
            "lang": "C",
            "fc": armor_text(SUMA_SOURCE),
            "params": suma_params(),
        },
    }));
    assert_eq!(submit["code"], 200);
    let exec_id = submit["message"]["exec_id"].clone();

    let settled = poll_until_settled(&mut engine, &exec_id);
    assert_eq!(settled["message"]["status"], "READY");
    assert_eq!(settled["message"]["res"]["ret_code"], -1);
    assert!(settled["message"]["res"]["err"]
        .as_str()
        .unwrap()
        .starts_with("Error executing function:"));

    engine.finish();
}

#[test]
fn test_async_distinct_ids() {
    let mut engine = EngineProc::spawn("cat >/dev/null; echo '(float) 7.00000f'");

    let mut ids = Vec::new();
    for i in 0..3 {
        let submit = engine.request(&json!({
            "mode": "async",
            "request_id": format!("a{}", i),
            "payload": {
                "lang": "C",
                "fc": armor_text(SUMA_SOURCE),
                "params": suma_params(),
            },
        }));
        assert_eq!(submit["code"], 200);
        ids.push(
            submit["message"]["exec_id"]["faas_task_uuid"]
                .as_str()
                .unwrap()
                .to_string(),
        );
    }

    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3, "Task ids must be unique");

    engine.finish();
}
