//! List command - show execution plans

use crate::cli::args::{ListArgs, OutputFormat};
use crate::config::{Config, ExecutionPlan};
use crate::error::GbuildResult;
use console::style;

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config) -> GbuildResult<()> {
    let plans = &config.execution_plans;

    if plans.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => println!("No execution plans defined"),
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(plans, config),
        OutputFormat::Json => print_json(plans)?,
        OutputFormat::Plain => print_plain(plans),
    }

    Ok(())
}

fn print_table(plans: &[ExecutionPlan], config: &Config) {
    println!(
        "{:<20} {:<8} {:<50}",
        style("PLAN").bold(),
        style("COUNT").bold(),
        style("TARGETS").bold()
    );
    println!("{}", "-".repeat(78));

    for plan in plans {
        println!(
            "{:<20} {:<8} {:<50}",
            plan.name,
            plan.targets.len(),
            plan.targets.join(", ")
        );
    }

    println!();
    println!(
        "{} plan(s), {} target(s) defined",
        plans.len(),
        config.targets.len()
    );
}

fn print_json(plans: &[ExecutionPlan]) -> GbuildResult<()> {
    let json = serde_json::to_string_pretty(plans)?;
    println!("{}", json);
    Ok(())
}

fn print_plain(plans: &[ExecutionPlan]) {
    for plan in plans {
        println!("{}", plan.name);
    }
}
