//! Soccer feature pipeline CLI
//!
//! Reconciles entity identities across sources and builds point-in-time
//! feature tables for match outcome models.

use clap::{Parser, Subcommand};
use soccer::{Config, EntityType, Result, SoccerError};

#[derive(Parser)]
#[command(name = "soccer")]
#[command(about = "Soccer identity reconciliation and match feature pipeline", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config file and data directory
    Init,
    /// Show database status
    Status,
    /// Find and merge duplicate entities across the configured sources
    Reconcile {
        /// Entity type: player, team, manager or referee
        #[arg(short, long, default_value = "player")]
        entity: String,
        /// Merge pairs above the auto-merge threshold. Each group of
        /// duplicates is merged into its lowest master id, whichever source
        /// that record came from.
        #[arg(long)]
        auto_merge: bool,
        /// Compare every record of the type with every other, not just
        /// source_a against source_b
        #[arg(long)]
        within: bool,
    },
    /// Merge two master records by hand
    Merge {
        /// Entity type: player, team, manager or referee
        #[arg(short, long, default_value = "player")]
        entity: String,
        /// Surviving master id
        keep: i64,
        /// Master id to fold into the survivor
        remove: i64,
        /// Overwrite the survivor's name
        #[arg(long)]
        name: Option<String>,
    },
    /// Report source-mapping coverage and pending reviews
    Audit {
        /// Entity type: player, team, manager or referee
        #[arg(short, long, default_value = "player")]
        entity: String,
    },
    /// Precompute rest, density and travel metrics for every match
    Schedule,
    /// Build the training feature table
    Features {
        /// Only emit rows from this season
        #[arg(short, long)]
        season: Option<String>,
        /// Emit unplayed matches without a label
        #[arg(long)]
        include_incomplete: bool,
        /// CSV output path (defaults to data.features_path)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Show the features of a single match
    Show {
        /// Match id
        match_id: String,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Init => commands::init(&cli.config),
        Commands::Status => commands::status(&config),
        Commands::Reconcile {
            entity,
            auto_merge,
            within,
        } => commands::reconcile(&config, &entity, auto_merge, within),
        Commands::Merge {
            entity,
            keep,
            remove,
            name,
        } => commands::merge(&config, &entity, keep, remove, name),
        Commands::Audit { entity } => commands::audit(&config, &entity),
        Commands::Schedule => commands::schedule(&config),
        Commands::Features {
            season,
            include_incomplete,
            output,
        } => commands::features(&config, season, include_incomplete, output),
        Commands::Show { match_id } => commands::show(&config, &match_id),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_entity(entity: &str) -> Result<EntityType> {
    EntityType::parse(entity).ok_or_else(|| {
        SoccerError::Config(format!(
            "Unknown entity type: {}. Use player, team, manager or referee.",
            entity
        ))
    })
}

mod commands {
    use super::*;
    use soccer::data::dataset::{compute_schedule_metrics, store_features, write_csv};
    use soccer::data::{Database, FeatureBuilder};
    use soccer::identity::{
        dedupe_identities, merge_entities, reconcile_identities, FieldOverrides, MergeOutcome,
    };
    use soccer::MatchId;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        println!("Created data/ directory");

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Load source data into {}", config.data.database_path);
        println!("  3. Run 'soccer reconcile --entity player' to find duplicates");
        println!("  4. Run 'soccer features' to build the training table");

        Ok(())
    }

    pub fn status(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let stats = db.get_stats()?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:     {}", config.data.database_path);
        println!("  Teams:    {}", stats.team_count);
        println!("  Players:  {}", stats.player_count);
        println!("  Matches:  {} ({} played)", stats.match_count, stats.played_count);
        println!("  Features: {}", stats.feature_rows);
        if let (Some(earliest), Some(latest)) = (stats.earliest_match, stats.latest_match) {
            println!("  Range:    {} to {}", earliest, latest);
        }

        Ok(())
    }

    pub fn reconcile(config: &Config, entity: &str, auto_merge: bool, within: bool) -> Result<()> {
        let entity_type = parse_entity(entity)?;
        let mut db = Database::open(&config.data.database_path)?;

        let mut settings = config.reconcile.clone();
        settings.auto_merge |= auto_merge;

        let report = if within {
            println!("Looking for duplicate {} records across all sources", entity_type);
            dedupe_identities(&mut db, entity_type, &settings)?
        } else {
            println!(
                "Reconciling {} records: {} vs {}",
                entity_type, settings.source_a, settings.source_b
            );
            reconcile_identities(&mut db, entity_type, &settings)?
        };

        println!("  Candidates:     {}", report.candidates);
        println!("  Queued:         {}", report.queued);
        println!("  Eligible:       {}", report.eligible.len());
        println!("  Merged:         {}", report.merged.len());
        if !report.conflicts.is_empty() {
            println!("  Not merged (teams have met):");
            for (keep, remove) in &report.conflicts {
                println!("    {} ~ {}", keep, remove);
            }
        }

        if !settings.auto_merge && !report.eligible.is_empty() {
            println!("\nPairs above {:.2}:", settings.auto_merge_threshold);
            for candidate in &report.eligible {
                println!(
                    "  {:>6} ~ {:<6} score {:.3} (name {:.3})",
                    candidate.id_a, candidate.id_b, candidate.score, candidate.name_similarity
                );
            }
            println!("\nRe-run with --auto-merge to merge them.");
        }

        Ok(())
    }

    pub fn merge(
        config: &Config,
        entity: &str,
        keep: i64,
        remove: i64,
        name: Option<String>,
    ) -> Result<()> {
        let entity_type = parse_entity(entity)?;
        let mut db = Database::open(&config.data.database_path)?;

        let overrides = FieldOverrides {
            name,
            ..FieldOverrides::default()
        };
        let overrides = (!overrides.is_empty()).then_some(&overrides);

        match merge_entities(&mut db, entity_type, keep, remove, overrides)? {
            MergeOutcome::Merged { keep, removed } => {
                println!("Merged {} {} into {}", entity_type, removed, keep)
            }
            MergeOutcome::AlreadyMerged => {
                println!("{} {} is already merged; nothing to do", entity_type, remove)
            }
        }

        Ok(())
    }

    pub fn audit(config: &Config, entity: &str) -> Result<()> {
        let entity_type = parse_entity(entity)?;
        let db = Database::open(&config.data.database_path)?;

        let audit = db.audit_id_mappings(entity_type)?;
        println!("Mapping audit: {}", entity_type);
        println!("───────────────────────────────");
        println!("  Records:  {}", audit.total);
        println!("  Mapped:   {} ({:.1}%)", audit.mapped, audit.coverage_percent);
        for (source, count) in &audit.by_source {
            println!("    {:<16} {}", source, count);
        }

        let single = db.unreconciled(entity_type)?;
        println!("  Single-source records: {}", single.len());

        let pending = db.pending_reviews(entity_type)?;
        if !pending.is_empty() {
            println!("\nPending reviews:");
            for item in &pending {
                println!(
                    "  {:>6} ~ {:<6} score {:.3} (name {:.3})",
                    item.id_a, item.id_b, item.score, item.name_similarity
                );
            }
        }

        Ok(())
    }

    pub fn schedule(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let count = compute_schedule_metrics(&db, &config.features)?;
        println!("Stored schedule metrics for {} matches", count);
        Ok(())
    }

    pub fn features(
        config: &Config,
        season: Option<String>,
        include_incomplete: bool,
        output: Option<String>,
    ) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let builder = FeatureBuilder::new(&db, &config.features);

        let records = builder.build_dataset(season.as_deref(), include_incomplete)?;
        if records.is_empty() {
            println!("No feature rows built. Check that matches are loaded.");
            return Ok(());
        }

        let stored = store_features(&db, &records)?;
        let path = output.unwrap_or_else(|| config.data.features_path.clone());
        write_csv(&path, &records)?;

        let labelled = records.iter().filter(|r| r.outcome.is_some()).count();
        println!("Built {} feature rows ({} labelled)", stored, labelled);
        println!("Wrote {}", path);

        Ok(())
    }

    pub fn show(config: &Config, match_id: &str) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let builder = FeatureBuilder::new(&db, &config.features);

        let id = MatchId::new(match_id);
        if db.get_match(&id)?.is_none() {
            return Err(SoccerError::missing("match", match_id));
        }

        match builder.build_features(&id)? {
            Some(record) => {
                let json = serde_json::to_string_pretty(&record)
                    .map_err(|e| SoccerError::Parse(e.to_string()))?;
                println!("{}", json);
            }
            None => println!("No features for match {} (see the warning above)", match_id),
        }

        Ok(())
    }
}
