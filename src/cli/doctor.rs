use crate::client::BackendClient;
use crate::config::Config;
use crate::flow::FlowStore;
use anyhow::Result;
use std::path::{Path, PathBuf};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

fn ok(label: &str, detail: &str) {
    println!("  {GREEN}[OK]{RESET}   {label}: {detail}");
}

fn fail(label: &str, detail: &str) {
    println!("  {RED}[FAIL]{RESET} {label}: {detail}");
}

fn info(label: &str, detail: &str) {
    println!("  {CYAN}[INFO]{RESET} {label}: {detail}");
}

pub async fn run(config: &Config, config_path: Option<&Path>) -> Result<()> {
    println!("qisu doctor\n");

    ok("Version", env!("CARGO_PKG_VERSION"));

    match config_path {
        Some(p) => ok("Config", &p.display().to_string()),
        None => info("Config", "(default)"),
    }
    match config.validate() {
        Ok(()) => ok("Config values", "valid"),
        Err(e) => fail("Config values", &e.to_string()),
    }

    ok("Home", &crate::paths::qisu_home().display().to_string());

    check_backend(config).await;
    check_flow();
    check_log_dir(config);

    println!();
    Ok(())
}

async fn check_backend(config: &Config) {
    let client = match BackendClient::new(&config.backend) {
        Ok(c) => c,
        Err(e) => {
            fail("Backend", &format!("failed to build HTTP client: {}", e));
            return;
        }
    };
    // Any HTTP answer, even a 404 on `/`, means the server is up.
    match client.ping().await {
        Ok(status) => ok(
            "Backend",
            &format!("{} (HTTP {})", client.base_url(), status.as_u16()),
        ),
        Err(e) => fail("Backend", &format!("{} ({})", client.base_url(), e)),
    }
}

fn check_flow() {
    let store = FlowStore::new();
    match store.load() {
        Ok(state) => ok(
            "Flow",
            &format!(
                "step {}, {} answers",
                state.step.as_str(),
                state.flow.entries().len()
            ),
        ),
        Err(e) => fail("Flow", &format!("{} ({})", store.path().display(), e)),
    }
}

fn check_log_dir(config: &Config) {
    let dir = config
        .logging
        .directory
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(crate::paths::logs_dir);

    if !dir.exists() {
        info("Logs", &format!("{} (not found)", dir.display()));
        return;
    }
    let test_path = dir.join(".doctor-check");
    match std::fs::write(&test_path, "") {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_path);
            ok("Logs", &dir.display().to_string());
        }
        Err(_) => fail("Logs", &format!("{} (not writable)", dir.display())),
    }
}
