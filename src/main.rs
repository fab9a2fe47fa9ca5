use anyhow::{Context, Result};
use songplay_lake::{
    cli::{Cli, Commands, SharedArgs},
    config::{Format, PipelineConfig},
    error::PipelineError,
    filter::{resolve_tables, SelectedTables},
    parser::{JsonLinesReader, LogEvent, SongRecord},
    pipeline::{load_catalog_songs, process_activity, process_catalog, run_pipeline, RunSummary, SongRow},
    schema::table_names,
    writer::{DatasetWriter, MemoryWriter, ParquetWriter, SqliteWriter},
};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.command.verbose());

    match cli.command {
        Commands::Run { shared, actions } => {
            let start = Instant::now();
            let mut config = shared.config()?;
            actions.apply(&mut config);

            let writer = open_writer(&shared, &config)?;
            let summary = run_pipeline(
                song_reader(&config),
                log_reader(&config),
                writer,
                &config.activity_options(),
            )?;
            report(&shared, &config, &summary, start);
        }

        Commands::Catalog { shared } => {
            let start = Instant::now();
            let config = shared.config()?;

            let writer = open_writer(&shared, &config)?;
            let (_, summary) = process_catalog(song_reader(&config), writer)?;
            report(&shared, &config, &summary, start);
        }

        Commands::Activity { shared, actions } => {
            let start = Instant::now();
            let mut config = shared.config()?;
            actions.apply(&mut config);

            let songs = load_songs(&config)?;
            let writer = open_writer(&shared, &config)?;
            let summary = process_activity(
                log_reader(&config),
                writer,
                &songs,
                &config.activity_options(),
            )?;
            report(&shared, &config, &summary, start);
        }

        Commands::ListTables => {
            println!("Available tables:\n");
            for name in table_names() {
                println!("  {}", name);
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn song_reader(config: &PipelineConfig) -> JsonLinesReader<SongRecord> {
    JsonLinesReader::new(&config.input_root, &config.song_glob, config.schema_policy)
}

fn log_reader(config: &PipelineConfig) -> JsonLinesReader<LogEvent> {
    JsonLinesReader::new(&config.input_root, &config.log_glob, config.schema_policy)
}

/// Backend for the configured format, limited to the selected tables
fn open_writer(
    shared: &SharedArgs,
    config: &PipelineConfig,
) -> Result<SelectedTables<Box<dyn DatasetWriter>>> {
    let tables = resolve_tables(shared.include.clone(), shared.exclude.clone())?;

    let backend: Box<dyn DatasetWriter> = if shared.dry_run {
        Box::new(MemoryWriter::new())
    } else {
        match config.format {
            Format::Parquet => Box::new(ParquetWriter::new(&config.output_root)),
            Format::Sqlite => {
                let path = config.sqlite_path();
                Box::new(
                    SqliteWriter::open(&path)
                        .with_context(|| format!("Failed to open {:?}", path))?,
                )
            }
        }
    };

    Ok(SelectedTables::new(backend, tables))
}

/// Songs persisted by an earlier catalog run
fn load_songs(config: &PipelineConfig) -> Result<Vec<SongRow>> {
    let songs = match config.format {
        Format::Parquet => load_catalog_songs(&ParquetWriter::new(&config.output_root))?,
        Format::Sqlite => {
            let path = config.sqlite_path();
            if !path.is_file() {
                return Err(PipelineError::source_unavailable(
                    path.display().to_string(),
                    "no database; run the catalog stage first",
                )
                .into());
            }
            load_catalog_songs(&SqliteWriter::open(&path)?)?
        }
    };
    Ok(songs)
}

fn report(shared: &SharedArgs, config: &PipelineConfig, summary: &RunSummary, start: Instant) {
    println!();
    for (table, rows) in &summary.tables {
        println!("  {:<10} {:>10} rows", table, rows);
    }

    let destination = match config.format {
        Format::Parquet => config.output_root.clone(),
        Format::Sqlite => config.sqlite_path(),
    };
    let verb = if shared.dry_run { "Built (dry run)" } else { "Wrote" };
    println!(
        "\n{} {} records to {:?} in {:.1}s",
        verb,
        summary.total(),
        destination,
        start.elapsed().as_secs_f64()
    );
}
