//! Run command - execute an execution plan

use crate::cache::{create_provider, CacheManager};
use crate::cli::args::RunArgs;
use crate::config::{targets_for_plan, Config};
use crate::error::{GbuildError, GbuildResult};
use crate::execution::{PlanReport, PlanRunner, Scheduler, TargetResult, TargetStatus};
use console::style;
use std::path::Path;
use tracing::debug;

/// Execute the run command
pub async fn execute(args: RunArgs, config: &Config, root: &Path) -> GbuildResult<()> {
    let targets = targets_for_plan(config, &args.plan)?;
    let scheduler = Scheduler::from_config(&config.execution);
    let mut runner = PlanRunner::new(root, scheduler);

    if config.cache.enabled && !args.no_cache {
        let provider = create_provider(&config.cache, root)?;
        debug!("Using {} artifact cache", provider.provider_name());
        runner = runner.with_cache(CacheManager::new(root, provider, config.cache.revision_keys).await?);
    } else {
        debug!("Artifact cache disabled");
    }

    println!(
        "{} {} ({} targets)",
        style("Running plan").cyan().bold(),
        args.plan,
        targets.len()
    );

    let report = tokio::select! {
        report = runner.run(targets) => report?,
        _ = tokio::signal::ctrl_c() => return Err(GbuildError::Interrupted),
    };

    print_summary(&report);

    match report.error() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn print_summary(report: &PlanReport) {
    println!();
    println!(
        "{:<24} {:<12} {:>8} {:>10} {:>10}",
        style("TARGET").bold(),
        style("STATUS").bold(),
        style("ATTEMPTS").bold(),
        style("WAIT").bold(),
        style("ELAPSED").bold()
    );
    println!("{}", "-".repeat(68));

    for result in &report.results {
        println!(
            "{:<24} {:<12} {:>8} {:>10} {:>10}",
            result.name(),
            status_label(result),
            result.attempts,
            format!("{:.2?}", result.wait),
            format!("{:.2?}", result.elapsed)
        );
        if let Some(error) = &result.error {
            println!("  {} {}", style("└").dim(), style(error).dim());
        }
    }

    println!();
    let succeeded = report.count(TargetStatus::Succeeded);
    let summary = format!(
        "{} succeeded ({} cached), {} failed, {} cancelled in {:.2?}",
        succeeded,
        report.cached_count(),
        report.count(TargetStatus::Failed),
        report.count(TargetStatus::Cancelled),
        report.elapsed
    );
    if report.is_success() {
        println!("{} {}", style("[OK]").green(), summary);
    } else {
        println!("{} {}", style("[FAIL]").red(), summary);
    }
}

fn status_label(result: &TargetResult) -> String {
    match result.status() {
        TargetStatus::Succeeded if result.cached => style("cached").cyan().to_string(),
        TargetStatus::Succeeded => style("succeeded").green().to_string(),
        TargetStatus::Failed => style("failed").red().to_string(),
        TargetStatus::Cancelled => style("cancelled").yellow().to_string(),
    }
}
