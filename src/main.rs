use std::fs::File;
use std::io::Write as _;

use anyhow::{anyhow, Context as _, Result};
use camino::Utf8PathBuf;
use clap::Parser;

use treeconf::{
    read, read_path, read_schema, write, write_string, Error, IncludeMode, Node, ReadOptions,
    Schema, ValidateOptions, WriteFile,
};

/// Read a configuration, optionally validate it against a schema, and
/// print its canonical form.
#[derive(Parser)]
#[command(name = "treeconf", version)]
struct Args {
    /// Validate the input against this schema
    #[arg(short, long, value_name = "SCHEMA")]
    schema: Option<Utf8PathBuf>,

    /// Enable %include processing, searching DIR
    #[arg(
        short = 'i',
        long = "include",
        value_name = "DIR",
        num_args = 0..=1,
        default_missing_value = "."
    )]
    include: Option<Utf8PathBuf>,

    /// Write the canonical form to FILE (atomically) instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<Utf8PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Input configuration (defaults to standard input)
    input: Option<Utf8PathBuf>,
}

fn init_logger(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TREECONF_LOG")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Renders an error as `FILE:LINE: MESSAGE`, falling back to the file
/// the diagnostic came from when the error does not name an include.
fn diagnose(error: Error, fallback_file: &str) -> anyhow::Error {
    let file = error.file_name().unwrap_or(fallback_file);
    let mut message = error.kind().to_string();
    if let Some(extra) = error.extra() {
        message = format!("{message}: {extra}");
    }
    anyhow!("{}:{}: {}", file, error.line(), message)
}

fn main() {
    // Diagnostics go to stderr as "FILE:LINE: MESSAGE"; the default
    // Result-returning main would prefix them with "Error: ".
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Args {
        schema,
        include,
        output,
        verbose,
        input,
    } = Args::parse();

    init_logger(verbose);

    let options = ReadOptions {
        verbose_error: true,
        error_file_name: true,
        include: match include {
            Some(directory) => IncludeMode::Path {
                search: vec![directory],
                flags: Default::default(),
            },
            None => IncludeMode::None,
        },
    };

    let schema = schema
        .map(|path| -> Result<Schema> {
            let file = File::open(&path).with_context(|| format!("opening schema {path}"))?;
            read_schema(file, &options).map_err(|e| diagnose(e, path.as_str()))
        })
        .transpose()?;

    let (config, input_name) = match input {
        Some(path) => {
            let config = read_path(&path, &options).map_err(|e| diagnose(e, path.as_str()))?;
            (config, path.to_string())
        }
        None => {
            let config = read(std::io::stdin().lock(), &options)
                .map_err(|e| diagnose(e, "<stdin>"))?;
            (config, "<stdin>".to_owned())
        }
    };

    if let Some(schema) = &schema {
        schema
            .validate(
                &config,
                &ValidateOptions {
                    verbose_error: true,
                    error_file_name: true,
                },
            )
            .map_err(|e| diagnose(e, &input_name))?;
        tracing::info!("{input_name} validates");
    }

    emit(&config, output, &input_name)
}

fn emit(config: &Node, output: Option<Utf8PathBuf>, input_name: &str) -> Result<()> {
    match output {
        Some(path) => {
            let mut writer =
                WriteFile::create(&path).with_context(|| format!("opening {path} for writing"))?;
            write(config, &mut writer).map_err(|e| diagnose(e, input_name))?;
            writer.commit().with_context(|| format!("replacing {path}"))?;
        }
        None => {
            let text = write_string(config).map_err(|e| diagnose(e, input_name))?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
        }
    }
    Ok(())
}
