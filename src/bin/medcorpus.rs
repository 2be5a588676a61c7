use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use medcorpus::app::{App, ProgressSink};
use medcorpus::config::ConfigLoader;
use medcorpus::error::MedError;
use medcorpus::manifest::ArtifactWriter;
use medcorpus::output::{ConsoleSink, JsonOutput, OutputMode};
use medcorpus::sources::SourceRegistry;
use medcorpus::store::CorpusStore;
use medcorpus::transport::Transport;

#[derive(Parser)]
#[command(name = "medcorpus")]
#[command(about = "Resumable medical reference-data ingestion with a symptom-to-disease query index")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch all configured sources, resuming from the checkpoint")]
    Fetch(FetchArgs),
    #[command(about = "Keep only the best raw file per source directory (destructive)")]
    Dedup,
    #[command(about = "Delete manifests whose raw artifact is gone")]
    Prune,
    #[command(about = "Rebuild the symptom index from the canonical dataset")]
    Index,
    #[command(about = "Query diseases by symptom terms")]
    Query(QueryArgs),
    #[command(about = "List persisted fetch manifests")]
    List,
    #[command(about = "Run the full pipeline: fetch, dedup, prune, index")]
    Run(FetchArgs),
}

#[derive(Args, Clone)]
struct FetchArgs {
    #[arg(long, help = "Clear the checkpoint and restart the full job list")]
    reset: bool,
}

#[derive(Args, Clone)]
struct QueryArgs {
    #[arg(required = true)]
    terms: Vec<String>,

    #[arg(long, help = "Match diseases with any term instead of all terms")]
    any: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(med) = report.downcast_ref::<MedError>() {
                return ExitCode::from(map_exit_code(med));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &MedError) -> u8 {
    match error {
        MedError::MissingConfig
        | MedError::ConfigRead(_)
        | MedError::ConfigParse(_)
        | MedError::DatasetNotFound(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &ConsoleSink,
        OutputMode::NonInteractive => &JsonOutput,
    };

    let config = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;
    let store = CorpusStore::new(config.data_root.clone());

    let needs_fetchers = matches!(cli.command, Commands::Fetch(_) | Commands::Run(_));
    let registry = if needs_fetchers {
        let transport = Arc::new(Transport::new(&config).into_diagnostic()?);
        let writer = ArtifactWriter::new(store.clone());
        SourceRegistry::http(&config, transport, writer).into_diagnostic()?
    } else {
        SourceRegistry::new()
    };

    let app = App::new(store, config, registry);

    match cli.command {
        Commands::Fetch(args) => {
            let result = app.fetch(args.reset, sink).into_diagnostic()?;
            JsonOutput::print_fetch(&result).into_diagnostic()?;
            Ok(exit_for(result.success()))
        }
        Commands::Dedup => {
            let result = app.dedup(sink).into_diagnostic()?;
            JsonOutput::print_dedup(&result).into_diagnostic()?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Prune => {
            let result = app.prune(sink).into_diagnostic()?;
            JsonOutput::print_prune(&result).into_diagnostic()?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Index => {
            let result = app.build_index(sink).into_diagnostic()?;
            JsonOutput::print_index(&result).into_diagnostic()?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Query(args) => {
            let result = app.query(&args.terms, !args.any, sink).into_diagnostic()?;
            JsonOutput::print_query(&result).into_diagnostic()?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            let result = app.list(sink).into_diagnostic()?;
            JsonOutput::print_list(&result).into_diagnostic()?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run(args) => {
            let result = app.run(args.reset, sink).into_diagnostic()?;
            JsonOutput::print_pipeline(&result).into_diagnostic()?;
            Ok(exit_for(result.success()))
        }
    }
}

fn exit_for(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
