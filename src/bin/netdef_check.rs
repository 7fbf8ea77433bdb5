use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use netdef_core::logging::{self, TracingSink};
use netdef_core::schema::{EntityCategory, LayerType, LinkKind, SchemaRegistry};
use netdef_core::{pipeline, NetworkError, ValidatorConfig};
use std::path::PathBuf;
use std::process::ExitCode;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "netdef-check")]
#[command(about = "Validate neural network definitions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a network description and print the frozen definition or the report.
    Check {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Print the resolved schema of a category, layer type or link kind.
    Schema {
        category: String,

        /// Layer type symbol or numeric code.
        concrete: Option<String>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Check { input, config, format } => check(input, config, format),
        Commands::Schema { category, concrete } => {
            print_schema(&category, concrete.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn check(input: PathBuf, config: Option<PathBuf>, format: Format) -> Result<ExitCode> {
    let config = match config {
        Some(path) => ValidatorConfig::from_path(&path)?,
        None => ValidatorConfig::default(),
    };
    let guard = logging::init(&config.logging)?;
    let sink = TracingSink::new(&config.logging);

    let outcome = pipeline::validate_path(&input, &config, &sink);
    guard.shutdown();

    match outcome {
        Ok(frozen) => {
            match format {
                Format::Text => print!("{}", frozen.dump()),
                Format::Json => println!("{}", frozen.to_json()?),
            }
            for advisory in frozen.advisories() {
                eprintln!("note: {}", advisory);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(NetworkError::Invalid(mut report)) => {
            report.sort();
            match format {
                Format::Text => {
                    for diagnostic in &report.diagnostics {
                        println!("{}", diagnostic);
                    }
                    println!("{} error(s)", report.diagnostics.len());
                }
                Format::Json => println!("{}", serde_json::to_string_pretty(&report.records())?),
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).with_context(|| format!("checking {}", input.display())),
    }
}

fn print_schema(category: &str, concrete: Option<&str>) -> Result<()> {
    let registry = SchemaRegistry::standard()?;

    if let Some(kind) = LinkKind::ALL.into_iter().find(|k| k.name().eq_ignore_ascii_case(category)) {
        println!("{}", serde_json::to_string_pretty(registry.resolve_link(kind)?)?);
        return Ok(());
    }

    let category = EntityCategory::from_name(category).ok_or_else(|| anyhow!("unknown category '{}'", category))?;
    let schema = match (category, concrete) {
        (EntityCategory::Layer, None) => {
            println!("layer types: {}", registry.concrete_types(EntityCategory::Layer).join(", "));
            return Ok(());
        }
        (EntityCategory::Layer, Some(concrete)) => {
            let symbol = match concrete.parse::<i64>() {
                Ok(code) => LayerType::from_code(code)
                    .map(LayerType::symbol)
                    .ok_or_else(|| anyhow!("unknown layer type code {}", code))?,
                Err(_) => concrete,
            };
            registry.resolve(category, symbol)?
        }
        (_, _) => registry.resolve_base(category)?,
    };
    println!("{}", serde_json::to_string_pretty(schema)?);
    Ok(())
}
