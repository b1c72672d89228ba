//! dormancy-report: headless runner for the dormancy analytics engine.
//!
//! Usage:
//!   dormancy-report --op summary                      (demo store, in memory)
//!   dormancy-report --db shop.db --store 3 --op segments
//!   dormancy-report --op trends --start 2024-01-01 --end 2024-12-31 --granularity monthly
//!   dormancy-report --op churn --customer 17 --as-of 2024-06-01
//!
//! Operations: churn, batch, risk, segments, churn-risk, trends,
//! reactivation, revenue, summary, dormant, count, all.
//! Results are printed to stdout as JSON.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use dormancy_core::{
    cache::MokaCache,
    clock::{Clock, FixedClock, SystemClock},
    config::{ConfigProvider, ConfigSnapshot, JsonFileConfig, StaticConfig},
    population::{self, DemoSpec},
    query::{DormantCustomerQuery, SortField},
    reactivation::RevenueImpactRequest,
    segmentation::ChurnRiskRequest,
    store::CustomerStore,
    trend::Granularity,
    types::{CustomerId, StoreId},
    AnalyticsEngine,
};
use serde::Serialize;
use std::{env, path::Path, sync::Arc};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let store_id: StoreId = parse_arg(&args, "--store", 1);
    let op = str_arg(&args, "--op").unwrap_or("summary");
    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = str_arg(&args, "--data-dir").unwrap_or("./data");

    let clock: Arc<dyn Clock> = match str_arg(&args, "--as-of") {
        Some(s) => Arc::new(FixedClock::new(parse_date(s)?)),
        None => Arc::new(SystemClock),
    };
    let now = clock.now();

    let config: Arc<dyn ConfigProvider> = match str_arg(&args, "--config") {
        Some(path) => Arc::new(JsonFileConfig::new(path)),
        None => {
            let default_file = format!("{data_dir}/config/analytics.json");
            if Path::new(&default_file).exists() {
                Arc::new(JsonFileConfig::in_data_dir(data_dir))
            } else {
                log::info!("report: no config at {default_file}, using defaults");
                Arc::new(StaticConfig::new(ConfigSnapshot::default()))
            }
        }
    };

    let store = CustomerStore::open(db).with_context(|| format!("opening {db}"))?;
    store.migrate()?;

    let demo_seed = str_arg(&args, "--demo-seed").map(|s| s.parse::<u64>()).transpose()?;
    if db == ":memory:" || demo_seed.is_some() {
        let size = parse_arg(&args, "--demo-size", 500usize);
        let spec = DemoSpec::new(demo_seed.unwrap_or(42), store_id, size);
        population::seed(&store, &spec, now)?;
    }

    let engine = AnalyticsEngine::new(Box::new(store), Arc::new(MokaCache::new()), config, clock);

    eprintln!("dormancy-report: op={op} store={store_id} db={db} now={now}");

    match op {
        "churn" => {
            let id: CustomerId = required(&args, "--customer")?;
            print(&engine.churn_probability(id)?)
        }
        "batch" => {
            let ids = str_arg(&args, "--customers")
                .ok_or_else(|| anyhow!("--customers 1,2,3 is required"))?
                .split(',')
                .map(|s| s.trim().parse::<CustomerId>())
                .collect::<Result<Vec<_>, _>>()?;
            print(&engine.batch_churn_probability(&ids)?)
        }
        "risk" => {
            let id: CustomerId = required(&args, "--customer")?;
            print(&engine.risk_level(id)?)
        }
        "segments" => print(&engine.segment_distributions(store_id)?),
        "churn-risk" => print(&engine.churn_risk_segments(&ChurnRiskRequest::new(store_id))?),
        "trends" => {
            let (start, end) = date_range(&args, now)?;
            let granularity: Granularity =
                str_arg(&args, "--granularity").unwrap_or("monthly").parse()?;
            print(&engine.trends(store_id, start, end, granularity)?)
        }
        "reactivation" => print(&engine.reactivation_potential(store_id)?),
        "revenue" => {
            let (start, end) = date_range(&args, now)?;
            let mut request = RevenueImpactRequest::new(store_id, start, end);
            request.include_projections = !args.iter().any(|a| a == "--no-projections");
            request.period_months = str_arg(&args, "--period-months").map(str::parse).transpose()?;
            request.projection_months =
                str_arg(&args, "--projection-months").map(str::parse).transpose()?;
            print(&engine.revenue_impact(&request)?)
        }
        "summary" => print(&engine.summary_stats(store_id)?),
        "dormant" => {
            let mut query = DormantCustomerQuery::new(store_id);
            query.page = parse_arg(&args, "--page", 1u32);
            query.page_size = parse_arg(&args, "--page-size", query.page_size);
            query.sort_by = parse_sort(str_arg(&args, "--sort").unwrap_or("days"))?;
            query.descending = !args.iter().any(|a| a == "--ascending");
            print(&engine.dormant_customers(&query)?)
        }
        "count" => print(&engine.dormant_customer_count(store_id, &Default::default())?),
        "all" => {
            let (start, end) = date_range(&args, now)?;
            let report = serde_json::json!({
                "summary":      engine.summary_stats(store_id)?,
                "segments":     engine.segment_distributions(store_id)?,
                "churn_risk":   engine.churn_risk_segments(&ChurnRiskRequest::new(store_id))?,
                "trends":       engine.trends(store_id, start, end, Granularity::Monthly)?,
                "reactivation": engine.reactivation_potential(store_id)?,
                "revenue":      engine.revenue_impact(&RevenueImpactRequest::new(store_id, start, end))?,
            });
            print(&report)
        }
        other => bail!("unknown --op '{other}'"),
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `--start`/`--end`, defaulting to the twelve months before now.
fn date_range(args: &[String], now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let end = match str_arg(args, "--end") {
        Some(s) => parse_date(s)?,
        None => now,
    };
    let start = match str_arg(args, "--start") {
        Some(s) => parse_date(s)?,
        None => end - Duration::days(365),
    };
    Ok((start, end))
}

fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD, got '{s}'"))?;
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid date '{s}'"))?;
    Ok(midnight.and_utc())
}

fn parse_sort(s: &str) -> Result<SortField> {
    Ok(match s {
        "days"        => SortField::DaysSinceLastOrder,
        "spent"       => SortField::TotalSpent,
        "orders"      => SortField::TotalOrders,
        "probability" => SortField::ChurnProbability,
        other => bail!("unknown --sort '{other}', expected days|spent|orders|probability"),
    })
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn required<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<T> {
    str_arg(args, flag)
        .ok_or_else(|| anyhow!("{flag} is required"))?
        .parse()
        .map_err(|_| anyhow!("{flag} has an invalid value"))
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
