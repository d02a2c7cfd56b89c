use chrono::Utc;
use clap::{Parser, Subcommand};
use dialoguer::console::style;
use dialoguer::console::Term;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::io;
use std::io::IsTerminal;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

const INSTALL_MARKER: &str = "vscode";
const OPTIONS_FILE: &str = "last_options.json";
const LOG_FILE: &str = "launcher.log";
const HELPER_PROGRAM: &str = "vsenv";
const HELPER_ENV: &str = "VSENVLITE_HELPER";
const ROOT_ENV: &str = "VSENVLITE_ROOT";

#[derive(Parser, Debug)]
#[command(name = "vsenvlite", version, about = "Offline VS Code environment launcher")]
struct Cli {
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    List,
    Create {
        name: String,
        archive: PathBuf,
    },
    Start {
        env: Option<String>,
        #[arg(long)]
        host: Option<bool>,
        #[arg(long)]
        mac: Option<bool>,
        #[arg(long)]
        proxy: Option<String>,
        #[arg(long, value_parser = ["none", "sandbox", "appcontainer", "wsb"])]
        sandbox: Option<String>,
        #[arg(long)]
        augment: Option<bool>,
    },
    Remove {
        env: String,
        #[arg(long)]
        yes: bool,
    },
    Regist,
    Logoff,
    Reset,
    Paths,
    Doctor,
}

#[derive(Debug, Error)]
enum VsenvError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict error: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("launch error: {0}")]
    Launch(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
}

impl VsenvError {
    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Archive(_) => "archive",
            Self::Launch(_) => "launch",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Prompt(_) => "prompt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SandboxMode {
    None,
    Sandbox,
    Appcontainer,
    Wsb,
}

impl SandboxMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sandbox => "sandbox",
            Self::Appcontainer => "appcontainer",
            Self::Wsb => "wsb",
        }
    }

    fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    fn parse(input: &str) -> Option<Self> {
        match input {
            "none" => Some(Self::None),
            "sandbox" => Some(Self::Sandbox),
            "appcontainer" => Some(Self::Appcontainer),
            "wsb" => Some(Self::Wsb),
            _ => None,
        }
    }
}

impl Default for SandboxMode {
    fn default() -> Self {
        Self::None
    }
}

// Only non-default values are written to last_options.json; absent keys fall
// back to defaults on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
struct LaunchOptions {
    #[serde(skip_serializing_if = "is_false")]
    host: bool,
    #[serde(skip_serializing_if = "is_false")]
    mac: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    proxy: String,
    #[serde(skip_serializing_if = "SandboxMode::is_none")]
    sandbox: SandboxMode,
    #[serde(skip_serializing_if = "is_false")]
    augment: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Serialize)]
struct JsonResult<T: Serialize> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
}

#[derive(Debug, Clone)]
struct Context {
    root: PathBuf,
    json: bool,
}

trait HelperRunner {
    fn run(&self, args: &[String]) -> Result<i32, io::Error>;
}

struct RealHelperRunner;

impl HelperRunner for RealHelperRunner {
    fn run(&self, args: &[String]) -> Result<i32, io::Error> {
        let status = Command::new(helper_program()).args(args).status()?;
        Ok(status
            .code()
            .unwrap_or(if status.success() { 0 } else { 1 }))
    }
}

fn main() -> Result<(), VsenvError> {
    let cli = Cli::parse();
    let ctx = build_context(&cli);
    let registry = Registry::new(ctx.root.clone());
    let logger = Logger::new(registry.log_path());
    let runner = RealHelperRunner;

    let result = match cli.command {
        Some(command) => dispatch(&ctx, &registry, &logger, &runner, command),
        None => run_menu(&ctx, &registry, &logger, &runner),
    };

    if let Err(err) = result {
        logger.error(&err.to_string());
        if ctx.json {
            let payload = JsonResult::<serde_json::Value> {
                ok: false,
                result: None,
                error: Some(err.to_string()),
                error_code: Some(err.code().to_string()),
            };
            print_json(&payload)?;
        } else {
            eprintln!("{err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn dispatch<R: HelperRunner>(
    ctx: &Context,
    registry: &Registry,
    logger: &Logger,
    runner: &R,
    command: Commands,
) -> Result<(), VsenvError> {
    match command {
        Commands::List => handle_list(ctx, registry),
        Commands::Create { name, archive } => handle_create(ctx, registry, logger, &name, &archive),
        Commands::Start {
            env,
            host,
            mac,
            proxy,
            sandbox,
            augment,
        } => handle_start(
            ctx, registry, logger, runner, env, host, mac, proxy, sandbox, augment,
        ),
        Commands::Remove { env, yes } => handle_remove(ctx, registry, logger, &env, yes),
        Commands::Regist => {
            handle_helper_action(ctx, logger, runner, "regist", "Environment registered.")
        }
        Commands::Logoff => handle_helper_action(
            ctx,
            logger,
            runner,
            "logoff",
            "Current environment logged off.",
        ),
        Commands::Reset => handle_helper_action(ctx, logger, runner, "reset", "Environment reset."),
        Commands::Paths => handle_paths(ctx, registry),
        Commands::Doctor => handle_doctor(ctx, registry),
    }
}

fn build_context(cli: &Cli) -> Context {
    Context {
        root: resolve_root(cli.root.as_ref()),
        json: cli.json,
    }
}

fn resolve_root(override_path: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = override_path {
        return path.clone();
    }
    if let Ok(path) = env::var(ROOT_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    let mut base = home_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push(".vsenv");
    base
}

fn helper_program() -> String {
    env::var(HELPER_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| HELPER_PROGRAM.to_string())
}

fn ensure_parent(path: &Path) -> Result<(), VsenvError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct Registry {
    root: PathBuf,
}

impl Registry {
    fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn env_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn options_path(&self) -> PathBuf {
        self.root.join(OPTIONS_FILE)
    }

    fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    fn list(&self) -> Result<Vec<String>, VsenvError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = BTreeSet::new();
        collect_environment_names(&self.root, &self.root, &mut names)?;
        Ok(names.into_iter().collect())
    }

    fn exists(&self, name: &str) -> Result<bool, VsenvError> {
        Ok(self.list()?.iter().any(|env| env == name) || self.env_dir(name).exists())
    }

    fn create(&self, name: &str, archive: &Path, logger: &Logger) -> Result<PathBuf, VsenvError> {
        validate_env_name(name)?;
        if self.exists(name)? {
            return Err(VsenvError::Conflict(format!(
                "environment already exists: {name}"
            )));
        }
        if !archive.exists() {
            return Err(VsenvError::NotFound(format!(
                "archive not found: {}",
                archive.display()
            )));
        }
        let dest = self.env_dir(name);
        fs::create_dir_all(&dest)?;
        match import_archive(archive, &dest) {
            Ok(marker) => {
                logger.info(&format!("created environment {name}"));
                Ok(marker)
            }
            Err(err) => {
                // A half-extracted environment is useless; take it back out.
                let _ = fs::remove_dir_all(&dest);
                logger.error(&format!("create {name} failed: {err}"));
                Err(err)
            }
        }
    }

    fn remove(&self, name: &str, logger: &Logger) -> Result<(), VsenvError> {
        if !self.exists(name)? {
            return Err(VsenvError::NotFound(format!(
                "environment not found: {name}"
            )));
        }
        fs::remove_dir_all(self.env_dir(name))?;
        logger.info(&format!("removed environment {name}"));
        Ok(())
    }
}

fn collect_environment_names(
    root: &Path,
    dir: &Path,
    names: &mut BTreeSet<String>,
) -> Result<(), VsenvError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        if entry.file_name() == INSTALL_MARKER {
            if let Ok(relative) = path.strip_prefix(root) {
                if let Some(first) = relative.components().next() {
                    names.insert(first.as_os_str().to_string_lossy().to_string());
                }
            }
            continue;
        }
        collect_environment_names(root, &path, names)?;
    }
    Ok(())
}

fn validate_env_name(name: &str) -> Result<(), VsenvError> {
    if name.is_empty() {
        return Err(VsenvError::Validation(
            "environment name must not be empty".to_string(),
        ));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(VsenvError::Validation(
            "environment name must not contain whitespace".to_string(),
        ));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(VsenvError::Validation(
            "environment name must not contain path separators".to_string(),
        ));
    }
    Ok(())
}

fn import_archive(archive_path: &Path, dest: &Path) -> Result<PathBuf, VsenvError> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|err| {
        VsenvError::Archive(format!(
            "failed to open {}: {err}",
            archive_path.display()
        ))
    })?;
    if archive.len() == 0 {
        return Err(VsenvError::Archive("archive has no entries".to_string()));
    }

    // Nested means every entry lives under the same single top-level
    // directory.
    let mut top_segments: BTreeSet<String> = BTreeSet::new();
    let mut all_prefixed = true;
    for name in archive.file_names() {
        match name.split_once('/') {
            Some((first, _)) if !first.is_empty() => {
                top_segments.insert(first.to_string());
            }
            _ => {
                all_prefixed = false;
                break;
            }
        }
    }
    let nested = all_prefixed && top_segments.len() == 1;
    let top_segment = top_segments.into_iter().next().unwrap_or_default();

    // Nested archives land under dest and get their top directory renamed to
    // the marker; flat archives extract straight into the marker directory.
    let extract_root = if nested {
        dest.to_path_buf()
    } else {
        dest.join(INSTALL_MARKER)
    };
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| VsenvError::Archive(format!("failed to read archive entry: {err}")))?;
        let name = entry.name().to_string();
        if name.contains("..") || name.starts_with('/') {
            continue;
        }
        let out_path = extract_root.join(&name);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out_file = fs::File::create(&out_path)?;
            io::copy(&mut entry, &mut out_file)?;
        }
    }

    let marker = dest.join(INSTALL_MARKER);
    if nested && top_segment != INSTALL_MARKER {
        fs::rename(dest.join(&top_segment), &marker)?;
    }
    if !marker.is_dir() || fs::read_dir(&marker)?.next().is_none() {
        return Err(VsenvError::Archive(
            "archive did not produce an installation directory".to_string(),
        ));
    }
    Ok(marker)
}

fn load_last_options(path: &Path) -> LaunchOptions {
    let Ok(content) = fs::read_to_string(path) else {
        return LaunchOptions::default();
    };
    serde_json::from_str(&content).unwrap_or_default()
}

fn save_options(path: &Path, opts: &LaunchOptions) -> Result<(), VsenvError> {
    let mut content = serde_json::to_string_pretty(opts)?;
    content.push('\n');
    write_atomic_text_file(path, &content)
}

fn write_atomic_text_file(path: &Path, content: &str) -> Result<(), VsenvError> {
    ensure_parent(path)?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let pid = std::process::id();
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let tmp_path = parent.join(format!(
        ".{}.tmp.{}.{}",
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "vsenvlite".to_string()),
        pid,
        ts
    ));

    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[derive(Debug, Clone)]
struct Logger {
    path: Option<PathBuf>,
}

impl Logger {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    #[allow(dead_code)]
    fn disabled() -> Self {
        Self { path: None }
    }

    fn info(&self, message: &str) {
        self.append("INFO", message);
    }

    fn error(&self, message: &str) {
        self.append("ERROR", message);
    }

    // Best-effort; a failed log write must never surface to the caller.
    fn append(&self, level: &str, message: &str) {
        let Some(path) = &self.path else {
            return;
        };
        let ts = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{ts}] {level}: {message}\n");
        let _ = ensure_parent(path);
        let _ = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
    }
}

fn render_helper_command(args: &[String]) -> String {
    let mut parts = vec![helper_program()];
    parts.extend(args.iter().cloned());
    parts.join(" ")
}

fn execute_helper<R: HelperRunner>(runner: &R, args: &[String]) -> Result<(), VsenvError> {
    let command = render_helper_command(args);
    let status_code = runner.run(args).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            VsenvError::Launch(format!(
                "helper `{}` not found on PATH; install vsenv and retry",
                helper_program()
            ))
        } else {
            VsenvError::Launch(format!("failed to run `{command}`: {err}"))
        }
    })?;
    if status_code != 0 {
        return Err(VsenvError::Launch(format!(
            "command `{command}` failed with status {status_code}"
        )));
    }
    Ok(())
}

fn build_launch_args(env_name: &str, opts: &LaunchOptions) -> Vec<String> {
    let mut args = vec!["start".to_string(), env_name.to_string()];
    if opts.host {
        args.push("--host".to_string());
    }
    if opts.mac {
        args.push("--mac".to_string());
    }
    if !opts.proxy.is_empty() {
        args.push("--proxy".to_string());
        args.push(opts.proxy.clone());
    }
    if !opts.sandbox.is_none() {
        args.push("--sandbox".to_string());
        args.push(opts.sandbox.as_str().to_string());
    }
    if opts.augment {
        args.push("--augment".to_string());
    }
    args
}

// Options are persisted before the helper runs so a failed launch still
// remembers what the user asked for.
fn launch<R: HelperRunner>(
    registry: &Registry,
    logger: &Logger,
    runner: &R,
    env_name: &str,
    opts: &LaunchOptions,
) -> Result<(), VsenvError> {
    save_options(&registry.options_path(), opts)?;
    let args = build_launch_args(env_name, opts);
    match execute_helper(runner, &args) {
        Ok(()) => {
            logger.info(&format!(
                "started {env_name} with `{}`",
                render_helper_command(&args)
            ));
            Ok(())
        }
        Err(err) => {
            logger.error(&format!("start {env_name} failed: {err}"));
            Err(err)
        }
    }
}

fn select_environment(input: &str, envs: &[String]) -> Result<String, VsenvError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(VsenvError::Validation("no environment selected".to_string()));
    }
    if let Ok(index) = trimmed.parse::<usize>() {
        if (1..=envs.len()).contains(&index) {
            return Ok(envs[index - 1].clone());
        }
    }
    if envs.iter().any(|name| name == trimmed) {
        return Ok(trimmed.to_string());
    }
    Err(VsenvError::Validation(format!(
        "invalid environment selection: {trimmed}"
    )))
}

fn handle_list(ctx: &Context, registry: &Registry) -> Result<(), VsenvError> {
    let envs = registry.list()?;
    if ctx.json {
        return output(ctx, json!({ "environments": envs }));
    }
    if envs.is_empty() {
        println!(
            "No environments found under {}.",
            registry.root().display()
        );
        return Ok(());
    }
    for (index, name) in envs.iter().enumerate() {
        println!("{}. {}", index + 1, name);
    }
    Ok(())
}

fn handle_create(
    ctx: &Context,
    registry: &Registry,
    logger: &Logger,
    name: &str,
    archive: &Path,
) -> Result<(), VsenvError> {
    let marker = registry.create(name, archive, logger)?;
    if ctx.json {
        return output(
            ctx,
            json!({"action": "create", "environment": name, "install_dir": marker}),
        );
    }
    println!("Environment '{name}' created at {}.", marker.display());
    Ok(())
}

fn handle_start<R: HelperRunner>(
    ctx: &Context,
    registry: &Registry,
    logger: &Logger,
    runner: &R,
    env: Option<String>,
    host: Option<bool>,
    mac: Option<bool>,
    proxy: Option<String>,
    sandbox: Option<String>,
    augment: Option<bool>,
) -> Result<(), VsenvError> {
    let Some(input) = env else {
        if ctx.json || !io::stdin().is_terminal() {
            return Err(VsenvError::Validation(
                "environment name or index is required in non-interactive mode".to_string(),
            ));
        }
        return interactive_start(registry, logger, runner, &ColorfulTheme::default());
    };
    let envs = registry.list()?;
    if envs.is_empty() {
        return Err(VsenvError::NotFound(
            "no environments available; create one first".to_string(),
        ));
    }
    let env_name = select_environment(&input, &envs)?;
    let mut opts = load_last_options(&registry.options_path());
    if let Some(value) = host {
        opts.host = value;
    }
    if let Some(value) = mac {
        opts.mac = value;
    }
    if let Some(value) = proxy {
        opts.proxy = value.trim().to_string();
    }
    if let Some(value) = sandbox {
        opts.sandbox = SandboxMode::parse(&value).ok_or_else(|| {
            VsenvError::Validation(format!("unsupported sandbox mode: {value}"))
        })?;
    }
    if let Some(value) = augment {
        opts.augment = value;
    }
    launch(registry, logger, runner, &env_name, &opts)?;
    if ctx.json {
        return output(
            ctx,
            json!({
                "action": "start",
                "environment": env_name,
                "command": render_helper_command(&build_launch_args(&env_name, &opts)),
            }),
        );
    }
    println!("Environment '{env_name}' started.");
    Ok(())
}

fn handle_remove(
    ctx: &Context,
    registry: &Registry,
    logger: &Logger,
    env: &str,
    yes: bool,
) -> Result<(), VsenvError> {
    let envs = registry.list()?;
    let name = select_environment(env, &envs)?;
    if !yes {
        if ctx.json || !io::stdin().is_terminal() {
            return Err(VsenvError::Validation(
                "remove requires --yes in non-interactive mode".to_string(),
            ));
        }
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Delete environment '{name}'?"))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }
    registry.remove(&name, logger)?;
    if ctx.json {
        return output(ctx, json!({"action": "remove", "environment": name}));
    }
    println!("Environment '{name}' removed.");
    Ok(())
}

fn handle_helper_action<R: HelperRunner>(
    ctx: &Context,
    logger: &Logger,
    runner: &R,
    action: &str,
    success_message: &str,
) -> Result<(), VsenvError> {
    let args = vec![action.to_string()];
    match execute_helper(runner, &args) {
        Ok(()) => {
            logger.info(&format!("{action} executed"));
            if ctx.json {
                return output(ctx, json!({ "action": action }));
            }
            println!("{success_message}");
            Ok(())
        }
        Err(err) => {
            logger.error(&format!("{action} failed: {err}"));
            Err(err)
        }
    }
}

fn handle_paths(ctx: &Context, registry: &Registry) -> Result<(), VsenvError> {
    output(
        ctx,
        json!({
            "root": registry.root(),
            "root_exists": registry.root().exists(),
            "options_file": registry.options_path(),
            "log_file": registry.log_path(),
            "helper": helper_program(),
        }),
    )
}

fn handle_doctor(ctx: &Context, registry: &Registry) -> Result<(), VsenvError> {
    let helper = helper_program();
    let helper_ok = which::which(&helper).is_ok();
    let root_ok = host_dir_writable(registry.root());
    let mut checks = BTreeMap::new();
    checks.insert("helper_on_path".to_string(), helper_ok);
    checks.insert("root_writable".to_string(), root_ok);

    let ok = helper_ok && root_ok;
    let error = if ok {
        None
    } else if !helper_ok {
        Some(format!("helper `{helper}` is not available on PATH"))
    } else {
        Some("registry root is not writable".to_string())
    };

    if ctx.json {
        let payload = JsonResult {
            ok,
            result: Some(json!({ "checks": checks })),
            error,
            error_code: None,
        };
        print_json(&payload)?;
        return Ok(());
    }

    println!(
        "Helper: {}",
        if helper_ok { "ok" } else { "missing from PATH" }
    );
    println!(
        "Registry root: {}",
        if root_ok { "writable" } else { "not writable" }
    );
    if !helper_ok {
        return Err(VsenvError::Launch(format!(
            "helper `{helper}` is not available on PATH"
        )));
    }
    if !root_ok {
        return Err(VsenvError::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "registry root is not writable",
        )));
    }
    Ok(())
}

fn host_dir_writable(dir: &Path) -> bool {
    fs::create_dir_all(dir)
        .and_then(|_| {
            let probe = dir.join(".vsenvlite_write_test");
            fs::write(&probe, b"ok")?;
            fs::remove_file(&probe)
        })
        .is_ok()
}

// Every action error is reported and logged here; only "exit" leaves the loop.
fn run_menu<R: HelperRunner>(
    ctx: &Context,
    registry: &Registry,
    logger: &Logger,
    runner: &R,
) -> Result<(), VsenvError> {
    if ctx.json {
        return Err(VsenvError::Validation(
            "--json is only supported with subcommands".to_string(),
        ));
    }
    if !io::stdin().is_terminal() {
        return Err(VsenvError::Validation(
            "interactive menu requires a TTY; use a subcommand instead (see --help)".to_string(),
        ));
    }
    let theme = ColorfulTheme::default();
    let entries: &[(&str, &str)] = &[
        ("1", "List environments"),
        ("2", "Create environment"),
        ("3", "Start environment"),
        ("4", "Delete environment"),
        ("5", "Register environment"),
        ("6", "Log off current environment"),
        ("7", "Reset environment"),
        ("8", "Exit"),
    ];

    if io::stdout().is_terminal() {
        // Best-effort clear; the menu is not a full-screen TUI.
        let _ = Term::stdout().clear_screen();
    }
    loop {
        println!();
        println!("{}", style("======== vsenvlite ========").bold().cyan());
        for (token, description) in entries {
            println!("{token}. {description}");
        }
        let choice = match Input::<String>::with_theme(&theme)
            .with_prompt("Select")
            .allow_empty(true)
            .interact_text()
        {
            Ok(choice) => choice.trim().to_string(),
            Err(_) => {
                println!("{}", style("Cancelled.").yellow());
                continue;
            }
        };
        if choice == "8" {
            println!("{}", style("Bye.").green());
            return Ok(());
        }
        let result = match choice.as_str() {
            "1" => menu_list(registry),
            "2" => menu_create(registry, logger, &theme),
            "3" => interactive_start(registry, logger, runner, &theme),
            "4" => menu_remove(registry, logger, &theme),
            "5" => menu_helper_action(logger, runner, "regist", "Environment registered."),
            "6" => menu_helper_action(logger, runner, "logoff", "Current environment logged off."),
            "7" => menu_helper_action(logger, runner, "reset", "Environment reset."),
            _ => {
                println!("{}", style("Please choose 1-8.").yellow());
                continue;
            }
        };
        if let Err(err) = result {
            println!("{}", style(err.to_string()).red());
            logger.error(&err.to_string());
        }
    }
}

fn menu_list(registry: &Registry) -> Result<(), VsenvError> {
    let envs = registry.list()?;
    if envs.is_empty() {
        println!(
            "{}",
            style("No environments yet; create one first.").yellow()
        );
        return Ok(());
    }
    println!("{}", style("=== Environments ===").cyan());
    for (index, name) in envs.iter().enumerate() {
        println!("{}. {}", index + 1, name);
    }
    Ok(())
}

fn menu_create(
    registry: &Registry,
    logger: &Logger,
    theme: &ColorfulTheme,
) -> Result<(), VsenvError> {
    println!("{}", style("=== Create environment ===").cyan());
    let Some(archive) = prompt_archive_path(theme)? else {
        println!("{}", style("Cancelled.").yellow());
        return Ok(());
    };
    if !archive.exists() {
        return Err(VsenvError::NotFound(format!(
            "archive not found: {}",
            archive.display()
        )));
    }
    let name = prompt_environment_name(theme)?;
    println!("{}", style("Extracting, this can take a while...").dim());
    let marker = registry.create(&name, &archive, logger)?;
    println!(
        "{}",
        style(format!(
            "Environment '{name}' created at {}.",
            marker.display()
        ))
        .green()
    );
    Ok(())
}

fn offline_packages_in_cwd() -> Vec<PathBuf> {
    let Ok(cwd) = env::current_dir() else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(cwd) else {
        return Vec::new();
    };
    let mut packages: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            name.starts_with("VSCode") && name.ends_with(".zip")
        })
        .collect();
    packages.sort();
    packages
}

fn prompt_archive_path(theme: &ColorfulTheme) -> Result<Option<PathBuf>, VsenvError> {
    let packages = offline_packages_in_cwd();
    if !packages.is_empty() {
        let mut items: Vec<String> = packages
            .iter()
            .map(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default()
            })
            .collect();
        items.push("Enter a path manually".to_string());
        let selection = Select::with_theme(theme)
            .with_prompt("Offline packages found in the current directory")
            .items(&items)
            .default(0)
            .interact()?;
        if selection < packages.len() {
            return Ok(Some(packages[selection].clone()));
        }
    }
    let input = Input::<String>::with_theme(theme)
        .with_prompt("Offline package path")
        .allow_empty(true)
        .interact_text()?;
    // Drag-and-drop on some terminals wraps the path in quotes.
    let trimmed = input.trim().trim_matches('"').to_string();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(PathBuf::from(trimmed)))
}

fn prompt_environment_name(theme: &ColorfulTheme) -> Result<String, VsenvError> {
    loop {
        let input = Input::<String>::with_theme(theme)
            .with_prompt("Environment name (no whitespace)")
            .allow_empty(true)
            .interact_text()?;
        let name = input.trim().to_string();
        match validate_env_name(&name) {
            Ok(()) => return Ok(name),
            Err(err) => println!("{}", style(err.to_string()).red()),
        }
    }
}

fn interactive_start<R: HelperRunner>(
    registry: &Registry,
    logger: &Logger,
    runner: &R,
    theme: &ColorfulTheme,
) -> Result<(), VsenvError> {
    let envs = registry.list()?;
    if envs.is_empty() {
        println!(
            "{}",
            style("No environments yet; create one first.").yellow()
        );
        return Ok(());
    }
    println!("{}", style("=== Start environment ===").cyan());
    let env_name = prompt_environment_selection(theme, &envs)?;
    let last = load_last_options(&registry.options_path());
    let opts = prompt_launch_options(theme, &last)?;
    launch(registry, logger, runner, &env_name, &opts)?;
    println!(
        "{}",
        style(format!("Environment '{env_name}' started.")).green()
    );
    Ok(())
}

fn prompt_environment_selection(
    theme: &ColorfulTheme,
    envs: &[String],
) -> Result<String, VsenvError> {
    for (index, name) in envs.iter().enumerate() {
        println!("{}. {}", index + 1, name);
    }
    let input = Input::<String>::with_theme(theme)
        .with_prompt("Environment (number or name)")
        .interact_text()?;
    select_environment(&input, envs)
}

fn prompt_launch_options(
    theme: &ColorfulTheme,
    last: &LaunchOptions,
) -> Result<LaunchOptions, VsenvError> {
    println!(
        "{}",
        style("=== Launch options (Enter keeps the last value) ===").cyan()
    );
    let mut opts = last.clone();
    opts.host = prompt_bool(theme, "Randomize hostname", last.host)?;
    opts.mac = prompt_bool(theme, "Randomize MAC address", last.mac)?;
    let proxy = Input::<String>::with_theme(theme)
        .with_prompt(format!(
            "Proxy address [{}]",
            if last.proxy.is_empty() {
                "none"
            } else {
                &last.proxy
            }
        ))
        .allow_empty(true)
        .interact_text()?;
    if !proxy.trim().is_empty() {
        opts.proxy = proxy.trim().to_string();
    }
    opts.sandbox = prompt_sandbox_mode(theme, last.sandbox)?;
    opts.augment = prompt_bool(theme, "Augment support", last.augment)?;
    Ok(opts)
}

fn prompt_bool(theme: &ColorfulTheme, label: &str, last: bool) -> Result<bool, VsenvError> {
    let input = Input::<String>::with_theme(theme)
        .with_prompt(format!("{label} (y/n) [{}]", if last { "y" } else { "n" }))
        .allow_empty(true)
        .interact_text()?;
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() {
        return Ok(last);
    }
    Ok(matches!(trimmed.as_str(), "y" | "yes" | "true"))
}

fn prompt_sandbox_mode(
    theme: &ColorfulTheme,
    last: SandboxMode,
) -> Result<SandboxMode, VsenvError> {
    let modes = [
        SandboxMode::None,
        SandboxMode::Sandbox,
        SandboxMode::Appcontainer,
        SandboxMode::Wsb,
    ];
    let items: Vec<&str> = modes.iter().map(|mode| mode.as_str()).collect();
    let default_idx = modes.iter().position(|mode| *mode == last).unwrap_or(0);
    let selection = Select::with_theme(theme)
        .with_prompt(format!("Sandbox mode (Enter = keep {})", last.as_str()))
        .items(&items)
        .default(default_idx)
        .interact()?;
    Ok(modes[selection])
}

fn menu_remove(
    registry: &Registry,
    logger: &Logger,
    theme: &ColorfulTheme,
) -> Result<(), VsenvError> {
    let envs = registry.list()?;
    if envs.is_empty() {
        println!("{}", style("No environments to delete.").yellow());
        return Ok(());
    }
    println!("{}", style("=== Delete environment ===").cyan());
    let name = prompt_environment_selection(theme, &envs)?;
    let confirmed = Confirm::with_theme(theme)
        .with_prompt(format!("Delete environment '{name}'?"))
        .default(false)
        .interact()?;
    if !confirmed {
        println!("{}", style("Cancelled.").yellow());
        return Ok(());
    }
    registry.remove(&name, logger)?;
    println!(
        "{}",
        style(format!("Environment '{name}' removed.")).green()
    );
    Ok(())
}

fn menu_helper_action<R: HelperRunner>(
    logger: &Logger,
    runner: &R,
    action: &str,
    success_message: &str,
) -> Result<(), VsenvError> {
    match execute_helper(runner, &[action.to_string()]) {
        Ok(()) => {
            logger.info(&format!("{action} executed"));
            println!("{}", style(success_message).green());
            Ok(())
        }
        Err(err) => {
            logger.error(&format!("{action} failed: {err}"));
            Err(err)
        }
    }
}

fn output(ctx: &Context, payload: serde_json::Value) -> Result<(), VsenvError> {
    if ctx.json {
        let wrapper = JsonResult {
            ok: true,
            result: Some(payload),
            error: None,
            error_code: None,
        };
        print_json(&wrapper)?;
    } else {
        println!("{}", payload);
    }
    Ok(())
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), VsenvError> {
    let text = serde_json::to_string_pretty(payload)?;
    println!("{}", text);
    Ok(())
}
