use crate::Config;
use anyhow::Result;
use std::path::Path;

#[derive(Debug)]
enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Ok => write!(f, "\x1b[32m✓ OK\x1b[0m"),
            CheckStatus::Warn => write!(f, "\x1b[33m⚠ WARN\x1b[0m"),
            CheckStatus::Fail => write!(f, "\x1b[31m✗ FAIL\x1b[0m"),
        }
    }
}

struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

pub async fn run(config_path: &Path, api_url: Option<&str>) -> Result<()> {
    println!("\n  Videoplay — Configuration Check\n");

    let mut results: Vec<CheckResult> = Vec::new();

    let config = match Config::load(config_path, api_url) {
        Ok(c) => {
            results.push(CheckResult {
                name: "Configuration".into(),
                status: CheckStatus::Ok,
                detail: format!("Loaded from {}", config_path.display()),
            });
            c
        }
        Err(e) => {
            results.push(CheckResult {
                name: "Configuration".into(),
                status: CheckStatus::Fail,
                detail: e.to_string(),
            });
            print_results(&results);
            println!("\n  \x1b[31mSome checks failed.\x1b[0m\n");
            return Ok(());
        }
    };

    results.push(match config.revalidate.secret {
        Some(_) => CheckResult {
            name: "Revalidation".into(),
            status: CheckStatus::Ok,
            detail: "/api/revalidate enabled".into(),
        },
        None => CheckResult {
            name: "Revalidation".into(),
            status: CheckStatus::Warn,
            detail: "revalidate.secret not set, endpoint disabled".into(),
        },
    });

    let hosts: Vec<&str> = config
        .images
        .remote_patterns
        .iter()
        .map(|p| p.hostname.as_str())
        .collect();
    results.push(CheckResult {
        name: "Image remote patterns".into(),
        status: CheckStatus::Ok,
        detail: hosts.join(", "),
    });

    let client = reqwest::Client::builder().timeout(config.api.timeout()).build()?;
    let mut has_failure = false;
    match client.get(&config.api.base_url).send().await {
        Ok(resp) => results.push(CheckResult {
            name: "Content API".into(),
            status: if resp.status().is_server_error() {
                CheckStatus::Warn
            } else {
                CheckStatus::Ok
            },
            detail: format!("{} answered HTTP {}", config.api.base_url, resp.status()),
        }),
        Err(e) => {
            has_failure = true;
            results.push(CheckResult {
                name: "Content API".into(),
                status: CheckStatus::Fail,
                detail: format!("{} unreachable: {}", config.api.base_url, e),
            });
        }
    }

    print_results(&results);
    if has_failure {
        println!("\n  \x1b[31mSome checks failed.\x1b[0m\n");
    } else {
        println!("\n  \x1b[32mAll checks passed.\x1b[0m\n");
    }

    Ok(())
}

fn print_results(results: &[CheckResult]) {
    let max_name_len = results.iter().map(|r| r.name.len()).max().unwrap_or(20);

    for (i, result) in results.iter().enumerate() {
        println!(
            "  {:>2}. {:<width$}  {}  {}",
            i + 1,
            result.name,
            result.status,
            result.detail,
            width = max_name_len,
        );
    }
}
