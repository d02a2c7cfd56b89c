use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn bin() -> Command {
    let path = assert_cmd::cargo::cargo_bin!("vsenvlite");
    Command::new(path)
}

fn parse_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("json output")
}

fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    for (name, contents) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

fn nested_archive(dir: &Path) -> PathBuf {
    let archive = dir.join("VSCode-win32-x64.zip");
    write_zip(
        &archive,
        &[("code/product.json", "{}"), ("code/bin/code", "#!/bin/sh\n")],
    );
    archive
}

fn create_env(root: &Path, name: &str, archive: &Path) {
    bin()
        .arg("--json")
        .arg("--root")
        .arg(root)
        .arg("create")
        .arg(name)
        .arg(archive)
        .assert()
        .success();
}

#[cfg(unix)]
fn write_fake_helper(dir: &Path) -> (PathBuf, PathBuf) {
    use std::os::unix::fs::PermissionsExt;
    let helper = dir.join("fake-vsenv");
    let args_log = dir.join("helper-args.txt");
    let script = format!("#!/bin/sh\necho \"$@\" >> {}\nexit 0\n", args_log.display());
    fs::write(&helper, script).unwrap();
    fs::set_permissions(&helper, fs::Permissions::from_mode(0o755)).unwrap();
    (helper, args_log)
}

#[test]
fn list_empty_root_reports_no_environments() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");

    let output = bin()
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("list")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(value["ok"].as_bool().unwrap());
    let envs = value["result"]["environments"].as_array().unwrap();
    assert!(envs.is_empty());
}

#[test]
fn create_extracts_archive_and_list_shows_environment() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    let archive = nested_archive(dir.path());

    let output = bin()
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("create")
        .arg("dev")
        .arg(&archive)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(value["ok"].as_bool().unwrap());
    assert_eq!(value["result"]["environment"], "dev");

    let marker = root.join("dev").join("vscode");
    assert!(marker.is_dir());
    assert_eq!(
        fs::read_to_string(marker.join("product.json")).unwrap(),
        "{}"
    );

    let output = bin()
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("list")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = parse_json(&output);
    let envs = value["result"]["environments"].as_array().unwrap();
    assert_eq!(envs.len(), 1);
    assert_eq!(envs[0], "dev");
}

#[test]
fn create_rejects_duplicate_name() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    let archive = nested_archive(dir.path());
    create_env(&root, "dev", &archive);

    let output = bin()
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("create")
        .arg("dev")
        .arg(&archive)
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(!value["ok"].as_bool().unwrap());
    assert_eq!(value["error_code"], "conflict");
    assert!(root.join("dev").join("vscode").is_dir());
}

#[test]
fn create_rejects_name_with_whitespace() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    let archive = nested_archive(dir.path());

    let output = bin()
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("create")
        .arg("my env")
        .arg(&archive)
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert_eq!(value["error_code"], "validation");
    assert!(!root.join("my env").exists());
}

#[test]
fn create_rejects_missing_archive() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");

    let output = bin()
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("create")
        .arg("dev")
        .arg(dir.path().join("missing.zip"))
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert_eq!(value["error_code"], "not_found");
}

#[test]
fn root_env_var_overrides_default_root() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("env-root");
    let archive = nested_archive(dir.path());

    bin()
        .env("VSENVLITE_ROOT", &root)
        .arg("--json")
        .arg("create")
        .arg("dev")
        .arg(&archive)
        .assert()
        .success();

    assert!(root.join("dev").join("vscode").is_dir());
}

#[test]
fn remove_requires_yes_when_not_interactive() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    let archive = nested_archive(dir.path());
    create_env(&root, "dev", &archive);

    let output = bin()
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("remove")
        .arg("dev")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert_eq!(value["error_code"], "validation");
    assert!(root.join("dev").exists());
}

#[test]
fn remove_with_yes_deletes_environment() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    let archive = nested_archive(dir.path());
    create_env(&root, "dev", &archive);

    let output = bin()
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("remove")
        .arg("dev")
        .arg("--yes")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(value["ok"].as_bool().unwrap());
    assert!(!root.join("dev").exists());
}

#[test]
fn remove_rejects_unknown_environment() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");

    let output = bin()
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("remove")
        .arg("ghost")
        .arg("--yes")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert_eq!(value["error_code"], "validation");
}

#[cfg(unix)]
#[test]
fn start_invokes_helper_and_persists_options() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    let archive = nested_archive(dir.path());
    create_env(&root, "dev", &archive);
    let (helper, args_log) = write_fake_helper(dir.path());

    let output = bin()
        .env("VSENVLITE_HELPER", &helper)
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("start")
        .arg("dev")
        .arg("--host")
        .arg("true")
        .arg("--proxy")
        .arg("10.0.0.1:8080")
        .arg("--sandbox")
        .arg("sandbox")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(value["ok"].as_bool().unwrap());
    assert_eq!(value["result"]["environment"], "dev");

    let recorded = fs::read_to_string(&args_log).unwrap();
    assert_eq!(
        recorded.trim(),
        "start dev --host --proxy 10.0.0.1:8080 --sandbox sandbox"
    );

    let options: Value =
        serde_json::from_str(&fs::read_to_string(root.join("last_options.json")).unwrap()).unwrap();
    assert_eq!(options["host"], true);
    assert_eq!(options["proxy"], "10.0.0.1:8080");
    assert_eq!(options["sandbox"], "sandbox");
}

#[cfg(unix)]
#[test]
fn start_by_index_reuses_persisted_options() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    let archive = nested_archive(dir.path());
    create_env(&root, "dev", &archive);
    fs::write(root.join("last_options.json"), "{\"host\": true}\n").unwrap();
    let (helper, args_log) = write_fake_helper(dir.path());

    bin()
        .env("VSENVLITE_HELPER", &helper)
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("start")
        .arg("1")
        .assert()
        .success();

    let recorded = fs::read_to_string(&args_log).unwrap();
    assert_eq!(recorded.trim(), "start dev --host");
}

#[test]
fn start_failure_still_persists_options() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    let archive = nested_archive(dir.path());
    create_env(&root, "dev", &archive);

    let output = bin()
        .env("VSENVLITE_HELPER", dir.path().join("no-such-helper"))
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("start")
        .arg("dev")
        .arg("--proxy")
        .arg("10.0.0.1:8080")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert_eq!(value["error_code"], "launch");

    let options: Value =
        serde_json::from_str(&fs::read_to_string(root.join("last_options.json")).unwrap()).unwrap();
    assert_eq!(options["proxy"], "10.0.0.1:8080");
}

#[test]
fn start_rejects_out_of_range_index() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    let archive = nested_archive(dir.path());
    create_env(&root, "dev", &archive);

    let output = bin()
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("start")
        .arg("5")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert_eq!(value["error_code"], "validation");
    assert!(!root.join("last_options.json").exists());
}

#[test]
fn start_without_environments_fails() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");

    let output = bin()
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("start")
        .arg("dev")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert_eq!(value["error_code"], "not_found");
}

#[cfg(unix)]
#[test]
fn regist_passes_through_to_helper() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    let (helper, args_log) = write_fake_helper(dir.path());

    bin()
        .env("VSENVLITE_HELPER", &helper)
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("regist")
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&args_log).unwrap().trim(), "regist");
}

#[test]
fn paths_reports_registry_layout() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");

    let output = bin()
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("paths")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(value["ok"].as_bool().unwrap());
    assert_eq!(
        value["result"]["root"].as_str().unwrap(),
        root.to_string_lossy()
    );
    assert_eq!(value["result"]["root_exists"], false);
    assert!(value["result"]["options_file"]
        .as_str()
        .unwrap()
        .ends_with("last_options.json"));
    assert!(value["result"]["log_file"]
        .as_str()
        .unwrap()
        .ends_with("launcher.log"));
}

#[test]
fn doctor_reports_missing_helper_in_json() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");

    let output = bin()
        .env("PATH", "")
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("doctor")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(!value["ok"].as_bool().unwrap());
    assert_eq!(value["result"]["checks"]["helper_on_path"], false);
    let error = value["error"].as_str().unwrap_or_default();
    assert!(error.contains("not available on PATH"));
}

#[test]
fn menu_requires_tty() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");

    bin()
        .arg("--root")
        .arg(&root)
        .assert()
        .failure()
        .stderr(contains("requires a TTY"));
}

#[test]
fn failed_operation_is_logged() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");

    bin()
        .arg("--json")
        .arg("--root")
        .arg(&root)
        .arg("create")
        .arg("dev")
        .arg(dir.path().join("missing.zip"))
        .assert()
        .failure();

    let log = fs::read_to_string(root.join("launcher.log")).unwrap();
    assert!(log.contains("ERROR"));
    assert!(log.contains("archive not found"));
}
