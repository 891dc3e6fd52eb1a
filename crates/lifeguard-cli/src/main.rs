//! `Lifeguard` CLI: command-line client for a `Lifeguard` server.
//!
//! Read-only commands talk to the server's JSON API with a bearer token.
//! `parse` runs the `zpool status` parser locally on a saved report, which
//! is handy for checking what the server would make of a given output.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;

use lifeguard_core::status::StatusParser;

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// Lifeguard: ZFS pool status from the command line.
#[derive(Parser)]
#[command(
    name = "lifeguard",
    version,
    about = "Lifeguard CLI: inspect pools through a Lifeguard server",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         LIFEGUARD_ADDR    Server address (default: http://127.0.0.1:5120)\n  \
         LIFEGUARD_TOKEN   API token\n\n\
         {DIM}Examples:{RESET}\n  \
         lifeguard pools\n  \
         lifeguard pool <id>\n  \
         zpool status tank > tank.txt && lifeguard parse tank.txt"
    ),
)]
struct Cli {
    /// Lifeguard server address.
    #[arg(long, env = "LIFEGUARD_ADDR", default_value = "http://127.0.0.1:5120")]
    addr: String,

    /// API token.
    #[arg(long, env = "LIFEGUARD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print raw JSON instead of formatted output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every pool with its status.
    Pools,
    /// Show one pool with its datasets and snapshots.
    Pool {
        /// Pool id as printed by `lifeguard pools`.
        id: String,
    },
    /// Show the notification log.
    Notifications,
    /// Show server and ZFS versions.
    Info,
    /// Parse a saved `zpool status` report and print the result as JSON.
    Parse {
        /// File holding the report.
        file: PathBuf,
        /// Log the parsed header map to stderr.
        #[arg(long)]
        debug: bool,
    },
}

// ── Output helpers ───────────────────────────────────────────────────

fn header(title: &str) {
    println!("{BOLD}{CYAN}{title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<12}{RESET} {WHITE}{value}{RESET}");
}

fn print_json(value: &Value) {
    if value.is_null() {
        return;
    }
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to format JSON: {e}"),
    }
}

fn text<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn colored_state(state: &str) -> String {
    let color = match state {
        "ONLINE" => GREEN,
        "DEGRADED" => YELLOW,
        _ => RED,
    };
    format!("{color}{BOLD}{state}{RESET}")
}

/// Token handed out for the object's `name` property.
fn token_of(row: &Value) -> &str {
    row.get("name")
        .and_then(|name| name.get("HMAC"))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn print_pool(pool: &Value) {
    header(&format!("Pool {}", text(pool, "Name")));
    kv_line("State", &colored_state(text(pool, "State")));
    kv_line("Status", text(pool, "Status"));
    kv_line("Action", text(pool, "Action"));
    kv_line("Scan", text(pool, "Scan"));
    kv_line("Errors", text(pool, "Errors"));
    if let Some(properties) = pool.get("Properties") {
        let id = token_of(properties);
        if !id.is_empty() {
            kv_line("Id", id);
        }
    }

    if let Some(containers) = pool.get("Containers").and_then(Value::as_array) {
        println!();
        for container in containers {
            let level = container.get("Level").and_then(Value::as_u64).unwrap_or(0);
            let indent = "  ".repeat(usize::try_from(level).unwrap_or(0));
            println!(
                "  {indent}{CYAN}├─{RESET} {:<16} {} {DIM}{}/{}/{}{RESET}",
                text(container, "Name"),
                colored_state(text(container, "State")),
                text(container, "Read"),
                text(container, "Write"),
                text(container, "Cksum"),
            );
        }
    }
    println!();
}

fn print_rows(title: &str, rows: &Value) {
    let Some(rows) = rows.as_array().filter(|r| !r.is_empty()) else {
        return;
    };
    header(title);
    for row in rows {
        let name = row
            .get("name")
            .and_then(|n| n.get("Value"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        println!("  {CYAN}├─{RESET} {name}  {DIM}{}{RESET}", token_of(row));
    }
    println!();
}

// ── HTTP client ──────────────────────────────────────────────────────

struct Client {
    http: reqwest::Client,
    addr: String,
    token: Option<String>,
}

impl Client {
    fn new(addr: String, token: Option<String>) -> Self {
        let http = reqwest::Client::new();
        Self { http, addr, token }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v0{path}", self.addr.trim_end_matches('/'))
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no token provided, set LIFEGUARD_TOKEN or use --token"))?;
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    let body = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or(body);
        bail!("server returned {status}: {message}");
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).context("failed to parse response JSON")
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;
    let client = Client::new(cli.addr, cli.token);

    match run(&client, cli.command, json).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{RED}{BOLD}✗ Error:{RESET} {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(client: &Client, cmd: Commands, json: bool) -> Result<()> {
    match cmd {
        Commands::Pools => cmd_pools(client, json).await,
        Commands::Pool { id } => cmd_pool(client, &id, json).await,
        Commands::Notifications => cmd_notifications(client, json).await,
        Commands::Info => cmd_info(client, json).await,
        Commands::Parse { file, debug } => cmd_parse(&file, debug),
    }
}

async fn cmd_pools(client: &Client, json: bool) -> Result<()> {
    let pools = client.get("/pools").await?;
    if json {
        print_json(&pools);
        return Ok(());
    }
    match pools.as_array() {
        Some(list) if !list.is_empty() => list.iter().for_each(print_pool),
        _ => println!("{DIM}no pools available{RESET}"),
    }
    Ok(())
}

async fn cmd_pool(client: &Client, id: &str, json: bool) -> Result<()> {
    let pool = client.get(&format!("/pool/{id}")).await?;
    if json {
        print_json(&pool);
        return Ok(());
    }
    print_pool(&pool);
    if let Some(datasets) = pool.get("Datasets") {
        print_rows("Datasets", datasets);
    }
    if let Some(snapshots) = pool.get("Snapshots") {
        print_rows("Snapshots", snapshots);
    }
    Ok(())
}

async fn cmd_notifications(client: &Client, json: bool) -> Result<()> {
    let notifications = client.get("/notifications").await?;
    if json {
        print_json(&notifications);
        return Ok(());
    }
    header("Notifications");
    match notifications.as_array() {
        Some(list) if !list.is_empty() => {
            for n in list {
                let color = match text(n, "Severity") {
                    "critical" => RED,
                    "warning" => YELLOW,
                    _ => CYAN,
                };
                println!(
                    "  {DIM}{}{RESET} {color}{:<8}{RESET} {}",
                    text(n, "Timestamp"),
                    text(n, "Severity"),
                    text(n, "Message"),
                );
            }
        }
        _ => println!("  {DIM}(empty){RESET}"),
    }
    println!();
    Ok(())
}

async fn cmd_info(client: &Client, json: bool) -> Result<()> {
    let info = client.get("/info").await?;
    if json {
        print_json(&info);
        return Ok(());
    }
    header(text(&info, "Product"));
    kv_line("Version", text(&info, "Version"));
    kv_line("ZFS", text(&info, "ZFSVersion"));
    println!();
    Ok(())
}

fn cmd_parse(file: &Path, debug: bool) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    if debug {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
            .without_time()
            .init();
    }

    let pool = StatusParser::new().with_header_dump(debug).parse(&raw);
    let json = serde_json::to_string_pretty(&pool).context("failed to encode pool")?;
    println!("{json}");
    Ok(())
}
