//! Plancode CLI
//!
//! 用法: plancode [--config PATH] [--name KEYWORD | KEY...]
//! 执行一次查询，汇出内容写到 stdout，失败的 key 写到 stderr。

use std::path::PathBuf;

use anyhow::{bail, Context};
use plancode::core::create_session_builder;
use plancode::query::{QueryMode, QueryOutcome};

const USAGE: &str = "usage: plancode [--config PATH] [--name KEYWORD | KEY...]";

struct Args {
    config: Option<PathBuf>,
    mode: QueryMode,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config = None;
    let mut keyword = None;
    let mut keys = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next().context(USAGE)?)),
            "--name" => keyword = Some(args.next().context(USAGE)?),
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            // 也接受逗号分隔的清单
            _ => keys.extend(arg.split(',').map(str::to_string)),
        }
    }

    let mode = match keyword {
        Some(_) if !keys.is_empty() => bail!("--name cannot be combined with keys\n{}", USAGE),
        Some(keyword) => QueryMode::ByNameKeyword { keyword },
        None if keys.is_empty() => bail!(USAGE),
        None => QueryMode::by_keys(keys),
    };
    Ok(Args { config, mode })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    plancode::observability::init();

    let args = parse_args()?;
    let session = create_session_builder(args.config)
        .build()
        .context("Failed to build query session")?;

    match session.start_query(args.mode).await {
        QueryOutcome::Completed(_) | QueryOutcome::Partial { .. } => {}
        QueryOutcome::Cancelled => bail!("query cancelled"),
        QueryOutcome::AuthExpired => {
            bail!("credential missing or expired; set PLANCODE__CREDENTIAL__TOKEN")
        }
        QueryOutcome::Failed(e) => return Err(e).context("Query failed"),
    }

    println!("{}", session.copy_all_visible().await);
    for failure in session.failures().await {
        eprintln!("{}\t{}", failure.key, failure.reason);
    }
    let summary = session.status_summary().await;
    tracing::info!(
        "{} item(s): {} current, {} pending, {} stopped, {} abnormal, {} with anomalies",
        summary.total,
        summary.current,
        summary.pending,
        summary.stopped,
        summary.abnormal,
        summary.anomalies
    );
    Ok(())
}
