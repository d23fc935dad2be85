//! Job command handlers
//!
//! Handles all job-related CLI commands including listing, viewing details,
//! reading logs, cancelling and removing jobs.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use docforge_core::domain::job::{Job, JobStatus, StepStatus};
use docforge_runner::Config;

use super::open_jobs;
use crate::id_resolver::resolve_job_id;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// List jobs, most recent first
    List {
        /// Maximum number of jobs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Get job details
    Get {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Get job logs
    Logs {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Mark a job as cancelled
    Cancel {
        /// Job ID (a job that does not exist yet is recorded as cancelled)
        id: String,
    },
    /// Delete a job from the record
    Delete {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Delete every job from the record
    Clear,
}

/// Handle job commands
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let jobs = open_jobs(config).await?;

    match command {
        JobCommands::List { limit } => {
            let listed = jobs.list(limit).await;
            if listed.is_empty() {
                println!("{}", "No jobs found.".yellow());
            } else {
                println!("{}", format!("Found {} job(s):", listed.len()).bold());
                println!();
                for job in &listed {
                    print_job_summary(job);
                }
            }
        }
        JobCommands::Get { id } => {
            let id = resolve_job_id(&jobs.list(usize::MAX).await, &id)?;
            if let Some(job) = jobs.get(&id).await {
                print_job_details(&job);
            }
        }
        JobCommands::Logs { id } => {
            let id = resolve_job_id(&jobs.list(usize::MAX).await, &id)?;
            let Some(job) = jobs.get(&id).await else {
                return Ok(());
            };
            if job.logs.is_empty() {
                println!("{}", "No logs found for this job.".yellow());
            } else {
                println!("{}", format!("Logs for job {}:", job.id).bold());
                println!("{}", "─".repeat(80).dimmed());
                for line in &job.logs {
                    print_log_line(line);
                }
                println!("{}", "─".repeat(80).dimmed());
            }
        }
        JobCommands::Cancel { id } => {
            let all = jobs.list(usize::MAX).await;
            let id = resolve_job_id(&all, &id).unwrap_or(id);
            let job = jobs.cancel(&id).await?;
            if job.status == JobStatus::Cancelled {
                println!("{} Job {} cancelled", "✓".green(), job.id.cyan());
            } else {
                println!(
                    "{} Job {} already finished ({})",
                    "ℹ".blue(),
                    job.id.cyan(),
                    colorize_status(&job.status)
                );
            }
        }
        JobCommands::Delete { id } => {
            let id = resolve_job_id(&jobs.list(usize::MAX).await, &id)?;
            jobs.delete(&id).await?;
            println!("{} Job {} deleted", "✓".green(), id.cyan());
        }
        JobCommands::Clear => {
            let removed = jobs.clear().await?;
            println!("{} Removed {} job(s)", "✓".green(), removed);
        }
    }

    Ok(())
}

/// Print a one-job summary
pub fn print_job_summary(job: &Job) {
    println!("  {} Job {}", "▸".cyan(), job.id.dimmed());
    println!("    Template: {}", job.template_id);
    println!("    Status:   {}", colorize_status(&job.status));
    println!(
        "    Started:  {}",
        job.started_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
    );
    if let Some(file) = &job.file {
        println!("    File:     {}", file.path.dimmed());
    }
    println!();
}

/// Print detailed job information
pub fn print_job_details(job: &Job) {
    println!("{}", "Job Details:".bold());
    println!("  ID:          {}", job.id.cyan());
    println!("  Customer:    {}", job.customer_id);
    println!("  Workspace:   {}", job.workspace_id);
    println!("  Template:    {}", job.template_id);
    println!("  Status:      {}", colorize_status(&job.status));
    println!("  Started:     {}", job.started_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(completed) = job.completed_at {
        println!("  Completed:   {}", completed.format("%Y-%m-%d %H:%M:%S"));
        let duration = completed.signed_duration_since(job.started_at);
        println!("  Duration:    {}ms", duration.num_milliseconds());
    }

    if !job.steps.is_empty() {
        println!("\n{}", "Steps:".bold());
        for step in &job.steps {
            let marker = match step.status {
                StepStatus::Ok => "✓".green(),
                StepStatus::Start => "…".yellow(),
            };
            let duration = step
                .duration_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_default();
            println!("  {} {:<10} {}", marker, step.name, duration.dimmed());
        }
    }

    if let Some(file) = &job.file {
        println!("\n{}", "Output:".bold());
        println!("  {}", file.path);
    }

    if let Some(meta) = &job.meta {
        if let Ok(pretty) = serde_json::to_string_pretty(meta) {
            println!("\n{}", "Meta:".bold());
            println!("{}", pretty);
        }
    }

    if let Some(error) = &job.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

/// Print a job log line, coloured by its level tag or error kind
fn print_log_line(line: &str) {
    let coloured = if line.starts_with("[error]") || line.contains("Error:") || line.starts_with("ContractViolation")
    {
        line.red()
    } else if line.starts_with("[warning]") || line.starts_with("MergeDegradation") {
        line.yellow()
    } else if line.starts_with("[debug]") {
        line.dimmed()
    } else {
        line.normal()
    };
    println!("{}", coloured);
}

/// Colorize job status for display
pub fn colorize_status(status: &JobStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        JobStatus::Running => status_str.cyan(),
        JobStatus::Done => status_str.green(),
        JobStatus::Error => status_str.red(),
        JobStatus::Cancelled => status_str.dimmed(),
    }
}
