use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    temp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let workspace = Self { temp };

        fs::create_dir_all(workspace.sheets().join("mcu")).expect("sheets dir should be created");
        fs::create_dir_all(workspace.sheets().join("adc")).expect("adc dir should be created");
        pdf_engine::fixtures::write_blank_pdf(&workspace.doc(), 3).expect("fixture should be written");
        pdf_engine::fixtures::write_blank_pdf(&workspace.sheets().join("adc").join("ads1115.pdf"), 1)
            .expect("fixture should be written");
        fs::write(workspace.sheets().join("notes.txt"), b"not a pdf").expect("text file");

        workspace
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn sheets(&self) -> PathBuf {
        self.path().join("sheets")
    }

    fn doc(&self) -> PathBuf {
        self.sheets().join("mcu").join("stm32f4.pdf")
    }

    fn config(&self) -> PathBuf {
        self.path().join("config").join("datasheet_config.json")
    }

    fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("datasheet-explorer");
        cmd.current_dir(self.path())
            .env_remove("DATASHEET_EXPLORER_CONFIG")
            .env_remove("DATASHEET_EXPLORER_NO_SPAWN")
            .arg("--config")
            .arg(self.config());
        cmd
    }

    fn with_root(self) -> Self {
        self.cmd().args(["root", "set"]).arg(self.sheets()).assert().success();
        self
    }
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("datasheet-explorer")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn root_is_persisted_between_runs() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["root", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Welcome. Select a root folder."));

    ws.cmd().args(["root", "set", "sheets"]).assert().success();

    ws.cmd()
        .args(["root", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains(ws.sheets().display().to_string()));

    let raw: Value = serde_json::from_slice(&fs::read(ws.config()).expect("config written"))
        .expect("config should be json");
    assert_eq!(raw["root_folder"], Value::String(ws.sheets().display().to_string()));

    ws.cmd().args(["root", "clear"]).assert().success();
    ws.cmd()
        .args(["root", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Welcome"));
}

#[test]
fn root_set_rejects_missing_directory() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["root", "set", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("root folder is not a directory"));
}

#[test]
fn data_directory_is_adopted_as_root() {
    let ws = Workspace::new();
    fs::create_dir_all(ws.path().join("data")).expect("data dir should be created");

    ws.cmd()
        .args(["root", "show"])
        .assert()
        .success()
        .stdout(predicate::str::ends_with(format!("{}\n", ws.path().join("data").display())));
}

#[test]
fn tree_lists_directories_then_pdfs() {
    let ws = Workspace::new().with_root();

    let output = ws.cmd().arg("tree").assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).expect("utf-8 output");
    let lines: Vec<_> = text.lines().skip(1).collect();

    assert_eq!(lines, vec!["  adc/", "    ads1115.pdf", "  mcu/", "    stm32f4.pdf"]);
}

#[test]
fn tree_requires_root() {
    let ws = Workspace::new();

    ws.cmd()
        .arg("tree")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no root folder set"));
}

#[test]
fn open_reports_page_and_breadcrumb() {
    let ws = Workspace::new().with_root();

    ws.cmd()
        .arg("open")
        .arg(ws.doc())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Page 1/3 — mcu / stm32f4.pdf"));

    ws.cmd()
        .arg("open")
        .arg(ws.doc())
        .args(["--scroll", "1.0", "--zoom-steps", "-1"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Page 3/3 — mcu / stm32f4.pdf"));
}

#[test]
fn open_without_root_uses_file_name() {
    let ws = Workspace::new();

    ws.cmd()
        .arg("open")
        .arg(ws.doc())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Page 1/3 — stm32f4.pdf"));
}

#[test]
fn notes_round_trip_through_config() {
    let ws = Workspace::new().with_root();

    ws.cmd()
        .args(["notes", "add"])
        .arg(ws.doc())
        .args(["--page", "2", "--text", "pinout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("added: [p2] pinout"));

    ws.cmd()
        .args(["notes", "add"])
        .arg(ws.doc())
        .args(["--page", "99", "--text", "  errata  "])
        .assert()
        .success()
        .stdout(predicate::str::contains("added: [p3] errata"));

    ws.cmd()
        .args(["notes", "edit"])
        .arg(ws.doc())
        .args(["--index", "1", "--text", "pin map"])
        .assert()
        .success()
        .stdout(predicate::str::contains("edited: [p2] pin map"));

    let output = ws
        .cmd()
        .args(["notes", "list", "--json"])
        .arg(ws.doc())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");

    insta::assert_json_snapshot!(value, @r#"
    {
      "key": "mcu/stm32f4.pdf",
      "notes": [
        {
          "index": 1,
          "page": 2,
          "text": "pin map"
        },
        {
          "index": 2,
          "page": 3,
          "text": "errata"
        }
      ],
      "page_count": 3
    }
    "#);

    ws.cmd()
        .arg("open")
        .arg(ws.doc())
        .args(["--note", "2"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Page 3/3"))
        .stdout(predicate::str::contains("2. [p3] errata"));

    ws.cmd()
        .args(["notes", "remove"])
        .arg(ws.doc())
        .args(["--index", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("removed: [p2] pin map"));

    ws.cmd().args(["notes", "remove"]).arg(ws.doc()).args(["--index", "1"]).assert().success();

    ws.cmd()
        .args(["notes", "list"])
        .arg(ws.doc())
        .assert()
        .success()
        .stdout(predicate::str::contains("No notes for mcu/stm32f4.pdf."));

    let raw: Value = serde_json::from_slice(&fs::read(ws.config()).expect("config written"))
        .expect("config should be json");
    assert_eq!(raw["notes"], serde_json::json!({}));
}

#[test]
fn out_of_range_note_index_fails() {
    let ws = Workspace::new().with_root();

    ws.cmd()
        .args(["notes", "remove"])
        .arg(ws.doc())
        .args(["--index", "4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("select a note first"));
}

#[test]
fn note_number_zero_selects_nothing() {
    let ws = Workspace::new().with_root();

    ws.cmd()
        .args(["notes", "add"])
        .arg(ws.doc())
        .args(["--page", "2", "--text", "pinout"])
        .assert()
        .success();

    ws.cmd()
        .args(["notes", "remove"])
        .arg(ws.doc())
        .args(["--index", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("select a note first"));

    ws.cmd()
        .args(["notes", "list"])
        .arg(ws.doc())
        .assert()
        .success()
        .stdout(predicate::str::contains("1. [p2] pinout"));
}

#[test]
fn unknown_config_keys_survive_note_edits() {
    let ws = Workspace::new();
    fs::create_dir_all(ws.config().parent().expect("config parent")).expect("config dir");
    fs::write(ws.config(), br#"{"root_folder": "", "notes": {}, "window": {"w": 1100}}"#)
        .expect("seed config");

    ws.cmd()
        .args(["notes", "add"])
        .arg(ws.doc())
        .args(["--page", "1", "--text", "cover"])
        .assert()
        .success();

    let raw: Value = serde_json::from_slice(&fs::read(ws.config()).expect("config written"))
        .expect("config should be json");
    assert_eq!(raw["window"]["w"], serde_json::json!(1100));
    assert_eq!(raw["notes"][ws.doc().display().to_string()][0]["text"], "cover");
}

#[test]
fn unwritable_config_is_a_warning() {
    let ws = Workspace::new();
    let blocker = ws.path().join("blocker");
    fs::write(&blocker, b"x").expect("blocker file");

    cargo_bin_cmd!("datasheet-explorer")
        .current_dir(ws.path())
        .arg("--config")
        .arg(blocker.join("datasheet_config.json"))
        .args(["notes", "add"])
        .arg(ws.doc())
        .args(["--page", "1", "--text", "cover"])
        .assert()
        .success()
        .stderr(predicate::str::contains("warning: could not save config"));
}

#[test]
fn open_fails_for_missing_file() {
    let ws = Workspace::new();

    ws.cmd()
        .arg("open")
        .arg(ws.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn open_fails_for_invalid_pdf() {
    let ws = Workspace::new();
    let broken = ws.path().join("broken.pdf");
    fs::write(&broken, b"this is not a pdf").expect("write garbage");

    ws.cmd()
        .arg("open")
        .arg(&broken)
        .assert()
        .failure()
        .stderr(predicate::str::contains("PDF load failed (status=error)"));
}

#[test]
fn open_fails_for_encrypted_marker_pdf() {
    let ws = Workspace::new();
    let locked = ws.path().join("locked.pdf");
    fs::write(&locked, b"%PDF-1.4\n/Encrypt 5 0 R\n%%EOF").expect("write marker file");

    ws.cmd()
        .arg("open")
        .arg(&locked)
        .assert()
        .failure()
        .stderr(predicate::str::contains("encrypted PDFs are not supported"));
}

#[test]
fn reveal_and_launch_support_dry_run() {
    let ws = Workspace::new().with_root();

    ws.cmd()
        .arg("reveal")
        .env("DATASHEET_EXPLORER_NO_SPAWN", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("reveal:"));

    ws.cmd()
        .arg("launch")
        .arg(ws.doc())
        .env("DATASHEET_EXPLORER_NO_SPAWN", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("launch:"))
        .stdout(predicate::str::contains("stm32f4.pdf"));
}

#[test]
fn reveal_without_root_uses_working_directory() {
    let ws = Workspace::new();
    let cwd = ws.path().canonicalize().expect("temp dir should resolve");

    let output = ws
        .cmd()
        .arg("reveal")
        .env("DATASHEET_EXPLORER_NO_SPAWN", "1")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let revealed = String::from_utf8(output).expect("stdout should be utf-8");
    let revealed = revealed.trim().strip_prefix("reveal:").expect("reveal line");
    let revealed = Path::new(revealed).canonicalize().expect("revealed path should exist");
    assert_eq!(revealed, cwd);
}
