//! Generate command handler
//!
//! Submits one generation request and follows its progress events until the
//! job is terminal. Ctrl-C cancels the job in this process.

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::*;
use docforge_core::domain::job::{Job, JobStatus, StepStatus};
use docforge_core::dto::event::{JobEvent, ProgressEvent};
use docforge_core::dto::job::GenerationRequest;
use docforge_runner::service::EventBus;
use docforge_runner::{Config, GenerationPipeline, GenerationScheduler};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use super::open_jobs;

/// Arguments of `docforge generate`
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Template id under the template root
    #[arg(short, long)]
    pub template: String,

    /// Customer the document is generated for
    #[arg(short, long)]
    pub customer: String,

    /// Workspace the document is generated in
    #[arg(short, long)]
    pub workspace: String,

    /// Free-text instructions for the artifact
    #[arg(short, long)]
    pub instructions: Option<String>,

    /// Use the enhanced artifact for this workspace
    #[arg(long)]
    pub enhance: bool,

    /// Regenerate the enhanced artifact even if the cached one is fresh
    #[arg(long, requires = "enhance")]
    pub refresh: bool,

    /// Output file name (extension is taken from the template)
    #[arg(short, long)]
    pub output_name: Option<String>,

    /// Job id to use instead of a generated one
    #[arg(long)]
    pub job_id: Option<String>,

    /// File with metadata about relevant documents, used by enhancement
    #[arg(long)]
    pub document_metadata: Option<PathBuf>,
}

/// Handle `docforge generate`
pub async fn handle_generate(args: GenerateArgs, config: &Config) -> Result<()> {
    let document_metadata = match &args.document_metadata {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None => None,
    };
    let job_id = args.job_id.clone().unwrap_or_else(Job::generate_id);

    let request = GenerationRequest {
        job_id: Some(job_id.clone()),
        customer_id: args.customer,
        workspace_id: args.workspace,
        template_id: args.template,
        output_name: args.output_name,
        instructions: args.instructions,
        enhance: args.enhance,
        refresh: args.refresh,
        document_metadata,
    };

    let jobs = open_jobs(config).await?;
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let pipeline = GenerationPipeline::from_config(config, jobs.clone(), events);
    let scheduler = GenerationScheduler::new(Arc::new(pipeline), config.max_parallel_jobs);

    println!(
        "{} Generating {} (job {})",
        "→".blue(),
        request.template_id.bold(),
        job_id.cyan()
    );

    let mut handle = scheduler.submit(request);
    let mut closed = false;
    let outcome = loop {
        tokio::select! {
            joined = &mut handle => break joined,
            received = rx.recv(), if !closed => match received {
                Ok(event) => print_event(&job_id, &event),
                Err(RecvError::Lagged(skipped)) => {
                    println!("{} {} progress event(s) skipped", "⚠".yellow(), skipped);
                }
                Err(RecvError::Closed) => closed = true,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("{} Cancelling job {}", "⚠".yellow(), job_id.cyan());
                jobs.cancel(&job_id).await?;
            }
        }
    };

    loop {
        match rx.try_recv() {
            Ok(event) => print_event(&job_id, &event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    let job = outcome.context("Generation task failed")??;
    print_outcome(&job)
}

fn print_event(job_id: &str, event: &JobEvent) {
    if event.job_id != job_id {
        return;
    }
    match &event.event {
        ProgressEvent::Info { message, .. } => println!("  {} {}", "ℹ".blue(), message),
        ProgressEvent::Log { message } => println!("    {}", message.dimmed()),
        ProgressEvent::Step {
            name,
            status,
            progress,
        } => match status {
            StepStatus::Start => println!("  {} {:<9} {:>3}%", "…".yellow(), name, progress),
            StepStatus::Ok => println!("  {} {:<9} {:>3}%", "✓".green(), name, progress),
        },
        ProgressEvent::Done { file, .. } => {
            println!("  {} wrote {}", "✓".green(), file.path.bold())
        }
        ProgressEvent::Error { message } => println!("  {} {}", "✗".red(), message.red()),
    }
}

fn print_outcome(job: &Job) -> Result<()> {
    match job.status {
        JobStatus::Done => {
            let path = job.file.as_ref().map(|f| f.path.as_str()).unwrap_or("-");
            println!("{} Job {} done: {}", "✓".green().bold(), job.id.cyan(), path);
            Ok(())
        }
        JobStatus::Cancelled => bail!("Job {} was cancelled", job.id),
        JobStatus::Error => bail!(
            "Job {} failed: {}",
            job.id,
            job.error.as_deref().unwrap_or("unknown error")
        ),
        JobStatus::Running => bail!("Job {} did not finish", job.id),
    }
}
