use anyhow::{Context, Result, bail};
use std::env;
use tokio::runtime::Runtime;
use warikan_sync::domain::sync::WireRecord;
use warikan_sync::domain::value_objects::EntityKind;
use warikan_sync::{AppConfig, ConnectionPool, EntityCache, SqliteEntityCache};

#[derive(Debug, Clone, serde::Serialize)]
struct KindReport {
    kind: EntityKind,
    count: usize,
    pending: usize,
    records: Vec<WireRecord>,
}

#[derive(Debug, Clone)]
struct CliOptions {
    kinds: Vec<EntityKind>,
    pretty: bool,
    summary_only: bool,
    database_url: Option<String>,
}

fn usage() -> &'static str {
    "Usage: cache_inspect [--kind <event|participant|item|transaction|payment_method>] [--summary] [--pretty] [--database-url <url>]"
}

fn main() -> Result<()> {
    warikan_sync::init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_args(args)?;
    let database_url = options
        .database_url
        .clone()
        .unwrap_or_else(|| AppConfig::from_env().database.url);

    let rt = Runtime::new().context("Failed to create Tokio runtime")?;
    let reports = rt.block_on(async {
        collect(&database_url, &options.kinds)
            .await
            .with_context(|| format!("Failed to read cache from {database_url}"))
    })?;

    if options.summary_only {
        for report in &reports {
            println!("{:<16} {:>6} cached {:>6} unsent", report.kind.as_str(), report.count, report.pending);
        }
        return Ok(());
    }

    let payload = if options.pretty {
        serde_json::to_string_pretty(&reports)?
    } else {
        serde_json::to_string(&reports)?
    };
    println!("{payload}");
    Ok(())
}

async fn collect(database_url: &str, kinds: &[EntityKind]) -> Result<Vec<KindReport>> {
    let pool = ConnectionPool::new(database_url, 1).await?;
    pool.migrate().await?;
    let cache = SqliteEntityCache::new(pool.clone());

    let mut reports = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let records = cache.list(*kind).await?;
        let pending = records
            .iter()
            .filter(|record| record.id.is_none() || record.intent.is_delete())
            .count();
        reports.push(KindReport {
            kind: *kind,
            count: records.len(),
            pending,
            records,
        });
    }
    pool.close().await;
    Ok(reports)
}

fn parse_args<I>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut kinds = Vec::new();
    let mut pretty = false;
    let mut summary_only = false;
    let mut database_url = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--kind" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--kind requires a value\n{}", usage()))?;
                let kind = EntityKind::try_from(value.as_str())
                    .map_err(|e| anyhow::anyhow!("{e}\n{}", usage()))?;
                kinds.push(kind);
            }
            "--pretty" => pretty = true,
            "--summary" => summary_only = true,
            "--database-url" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow::anyhow!("--database-url requires a value\n{}", usage())
                })?;
                database_url = Some(value);
            }
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other => bail!("Unknown argument: {other}\n{}", usage()),
        }
    }

    if kinds.is_empty() {
        kinds = EntityKind::ALL.to_vec();
    }

    Ok(CliOptions {
        kinds,
        pretty,
        summary_only,
        database_url,
    })
}
