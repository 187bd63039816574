use crate::api::space::SpaceClient;
use crate::api::teams::GraphClient;
use crate::cli::{Args, Commands, ExportArgs, ImportArgs};
use crate::export::{ExportSummary, Exporter};
use crate::import::{ImportSummary, Importer, RunState};
use crate::models::teams::Team;
use crate::pacing::format_duration;
use crate::settings::{self, Settings};
use crate::staging::StagingStore;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use std::time::Instant;

pub async fn run(args: Args) -> Result<()> {
    let settings = settings::load_settings(args.config.as_deref()).context("Failed to load settings")?;
    let staging = StagingStore::new(settings.staging_dir(args.staging_dir.as_deref()));

    match args.command {
        Commands::Export(export_args) => export(&settings, &staging, &export_args).await,
        Commands::Import(import_args) => import(&settings, &staging, &import_args).await,
        Commands::Migrate { export: export_args, import: import_args } => {
            export(&settings, &staging, &export_args).await?;
            import(&settings, &staging, &import_args).await
        }
    }
}

async fn export(settings: &Settings, staging: &StagingStore, args: &ExportArgs) -> Result<()> {
    let config = settings::space_config(args, settings)?;
    let space = SpaceClient::new(config.url, config.client_id, config.client_secret)?;

    let mut exporter = Exporter::new(&space, staging);
    exporter.set_batch_size(args.batch_size);
    exporter.set_clean_up(!args.keep_staging);
    for name in settings.skip_channels.iter().chain(&args.skip) {
        exporter.skip_channel(name);
    }
    for name in &args.include {
        exporter.do_not_skip_channel(name);
    }

    let summary = exporter.export().await?;
    print_export_summary(settings, staging, &summary);
    summary.into_result()?;

    Ok(())
}

async fn import(settings: &Settings, staging: &StagingStore, args: &ImportArgs) -> Result<()> {
    let started = Instant::now();
    staging.check_manifest()?;

    let config = settings::graph_config(args, settings)?;
    let graph = GraphClient::new(config.tenant_id, config.client_id, config.client_secret)?;
    let mapping = settings.mapping();

    let mut state = RunState::new(settings.retry_budget());
    let mut importer = Importer::new(
        &graph,
        staging,
        &mapping,
        settings.import_options(!args.no_progress),
    );

    importer.collect_members(&mut state).await?;
    importer.check_owners()?;

    let existing = importer.plan_cleanup(&mut state).await?;
    if !existing.is_empty() && !args.yes && !confirm_cleanup(&existing)? {
        bail!("Import cancelled by user");
    }
    importer.remove_teams(&mut state, &existing).await?;

    let summary = importer.import(&mut state).await?;
    print_import_summary(&summary);

    println!(
        "\n{} Import finished in {}",
        "✓".bright_green(),
        format_duration(started.elapsed()).bright_cyan()
    );

    Ok(())
}

fn confirm_cleanup(teams: &[Team]) -> Result<bool> {
    println!(
        "\n{}",
        "These teams will be deleted before the import:".bright_yellow()
    );
    for team in teams {
        println!("  {}", team.display_name.bright_white());
    }

    dialoguer::Confirm::new()
        .with_prompt("Delete them and import again?")
        .default(false)
        .interact()
        .context("Failed to get confirmation")
}

fn print_export_summary(settings: &Settings, staging: &StagingStore, summary: &ExportSummary) {
    println!("\n{}", "--------------------------------".dimmed());
    for name in &summary.skipped {
        println!("{} skipped {}", "ℹ".blue(), name.bright_cyan());
    }
    for name in &summary.failed {
        println!("{} failed {}", "✗".bright_red(), name.bright_cyan());
    }
    println!(
        "{} Exported {} channels to {}",
        "✓".bright_green(),
        summary.channels.to_string().bright_cyan(),
        staging.root().display()
    );
    println!(
        "Total messages exported: {}",
        summary.messages.to_string().bright_cyan()
    );
    println!(
        "Importing the messages into Microsoft Teams will take about {}",
        format_duration(settings.pacing().estimate(summary.messages)).bright_cyan()
    );
}

fn print_import_summary(summary: &ImportSummary) {
    println!("\n{}", "--------------------------------".dimmed());
    for team in &summary.teams {
        println!(
            "{} {}: {} channels, {} messages imported, {} skipped, {} members",
            "✓".bright_green(),
            team.name.bright_cyan(),
            team.channels.len(),
            team.imported(),
            team.skipped(),
            team.members
        );
    }
    for name in &summary.skipped_teams {
        println!(
            "{} {}: no staged channels, not created",
            "⚠".yellow(),
            name.bright_cyan()
        );
    }
}
