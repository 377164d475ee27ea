use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{json, Value};

use csource_contracts::{CALL_TABLE_SCHEMA_VERSION, CSOURCE_REPORT_SCHEMA_VERSION};

mod exec_program;

use exec_program::{res, Arg, ExecBuilder};

struct Inputs {
    tmp: tempfile::TempDir,
    prog: PathBuf,
    calls: PathBuf,
}

impl Inputs {
    fn new(exec: &[u8]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let prog = dir.path().join("prog.bin");
        let calls = dir.path().join("calls.json");
        std::fs::write(&prog, exec).expect("write prog");
        let doc = json!({
            "schema_version": CALL_TABLE_SCHEMA_VERSION,
            "calls": [
                {"name": "openat", "nr": 257},
                {"name": "close", "nr": 3},
                {"name": "pidfd_open", "nr": 434},
            ],
            "unknown_nrs": {"pidfd_open": 434},
        });
        std::fs::write(&calls, serde_json::to_vec(&doc).expect("json")).expect("write calls");
        Self {
            tmp: dir,
            prog,
            calls,
        }
    }

    fn dir(&self) -> &Path {
        self.tmp.path()
    }

    fn args(&self) -> Vec<String> {
        vec![
            "--prog".to_string(),
            self.prog.display().to_string(),
            "--calls".to_string(),
            self.calls.display().to_string(),
        ]
    }
}

fn run_csource(args: &[String]) -> std::process::Output {
    let exe = env!("CARGO_BIN_EXE_csource");
    Command::new(exe).args(args).output().expect("run csource")
}

fn parse_json_stdout(out: &std::process::Output) -> Value {
    serde_json::from_slice(&out.stdout).expect("parse stdout JSON")
}

fn program() -> Vec<u8> {
    ExecBuilder::new()
        .call(0, &[Arg::Const(0xffffffffffffff9c), Arg::Const(0x2000), Arg::Const(0)])
        .call(2, &[Arg::Const(1), Arg::Const(0)])
        .call(1, &[res(0)])
        .eof()
}

#[test]
fn prints_source_on_stdout() {
    let inputs = Inputs::new(&program());
    let out = run_csource(&inputs.args());
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let src = String::from_utf8(out.stdout).expect("utf8 source");
    assert!(src.starts_with("// autogenerated by csource"));
    assert!(src.contains("#ifndef SYS_pidfd_open\n#define SYS_pidfd_open 434\n#endif\n"));
    assert!(src.contains("r[0] = syscall(SYS_openat, 0xffffffffffffff9cul, 0x2000ul, 0x0ul, 0, 0, 0);"));
    assert!(src.contains("r[2] = syscall(SYS_close, r[0], 0, 0, 0, 0, 0);"));
    assert!(!src.contains("pthread_create"));
}

#[test]
fn report_json_carries_source_and_stats() {
    let inputs = Inputs::new(&program());
    let mut args = inputs.args();
    args.extend(["--collide".to_string(), "--report-json".to_string()]);
    let out = run_csource(&args);
    assert_eq!(out.status.code(), Some(0));

    let v = parse_json_stdout(&out);
    assert_eq!(v["schema_version"], CSOURCE_REPORT_SCHEMA_VERSION);
    assert_eq!(v["ok"], true);
    assert_eq!(v["topology"], "collision");
    assert_eq!(v["options"]["collide"], true);
    assert_eq!(v["stats"]["calls"], 3);
    assert_eq!(v["stats"]["fragments"], 3);
    assert_eq!(v["stats"]["result_slots"], 3);
    assert_eq!(v["stats"]["macros"], 1);
    let src = v["source"].as_str().expect("source");
    assert_eq!(src.matches("pthread_create(").count(), 2);
    assert!(v.get("error").is_none());
}

#[test]
fn out_writes_file_and_keeps_stdout_empty() {
    let inputs = Inputs::new(&program());
    let dst = inputs.dir().join("repro.c");
    let mut args = inputs.args();
    args.extend([
        "--threaded".to_string(),
        "--out".to_string(),
        dst.display().to_string(),
    ]);
    let out = run_csource(&args);
    assert_eq!(out.status.code(), Some(0));
    assert!(out.stdout.is_empty());

    let src = std::fs::read_to_string(&dst).expect("read repro.c");
    assert!(src.contains("void *thr(void *arg)"));
    assert!(src.contains("\tpthread_t th[3];\n"));
}

#[test]
fn generation_fault_exits_one() {
    let exec = ExecBuilder::new().call(7, &[]).eof();
    let inputs = Inputs::new(&exec);

    let out = run_csource(&inputs.args());
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty(), "no partial source on a fault");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unknown call"), "stderr:\n{stderr}");

    let mut args = inputs.args();
    args.push("--report-json".to_string());
    let out = run_csource(&args);
    assert_eq!(out.status.code(), Some(1));
    let v = parse_json_stdout(&out);
    assert_eq!(v["ok"], false);
    assert_eq!(v["error"]["kind"], "unknown_call");
    assert!(v.get("source").is_none());
    assert!(v.get("stats").is_none());
}

#[test]
fn bad_call_table_is_usage_error() {
    let inputs = Inputs::new(&program());
    std::fs::write(&inputs.calls, br#"{"schema_version":"other@1","calls":[]}"#)
        .expect("overwrite calls");
    let out = run_csource(&inputs.args());
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("schema_version"), "stderr:\n{stderr}");

    let missing = vec![
        "--prog".to_string(),
        inputs.dir().join("absent.bin").display().to_string(),
        "--calls".to_string(),
        inputs.calls.display().to_string(),
    ];
    let out = run_csource(&missing);
    assert_eq!(out.status.code(), Some(2));
}
