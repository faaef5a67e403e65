use clap::error::ErrorKind;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::config::Config;
use crate::core::OutputSpec;
use crate::error::{PublicizerError, Result};

#[derive(Parser, Debug)]
#[command(name = "assembly-publicizer")]
#[command(about = "Creates a copy of an assembly in which all members are public")]
#[command(version)]
pub struct Cli {
    /// Assemblies to publicize, or directories containing them
    pub inputs: Vec<PathBuf>,

    /// Additional input assembly
    #[arg(short, long = "input", value_name = "PATH")]
    pub input: Vec<PathBuf>,

    /// Output directory, file name, or both
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<String>,

    /// Suffix appended to the input name when no output file name is given
    #[arg(short, long, value_name = "TEXT")]
    pub suffix: Option<String>,

    /// Empty every method body to produce a reference-only assembly
    #[arg(long)]
    pub strip_bodies: bool,

    /// Wait for Enter before exiting
    #[arg(long)]
    pub wait: bool,

    /// Write a JSON report of the run
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parse command-line arguments; help and version print and exit directly
    pub fn try_from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|e| match e.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => e.exit(),
            _ => PublicizerError::Argument(e.to_string().trim_end().to_string()),
        })
    }
}

/// Everything a run needs, fixed before any input is touched
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub inputs: Vec<PathBuf>,
    pub output: Option<OutputSpec>,
    pub config: Config,
    pub report: Option<PathBuf>,
    pub wait: bool,
}

impl RunConfig {
    /// Merge command-line flags over the configuration file
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let inputs: Vec<PathBuf> = cli.inputs.into_iter().chain(cli.input).collect();
        if inputs.is_empty() {
            return Err(PublicizerError::MissingInput);
        }
        if let Some(empty) = inputs.iter().find(|p| p.as_os_str().is_empty()) {
            return Err(PublicizerError::Argument(format!(
                "input path {:?} is empty",
                empty
            )));
        }

        let output = cli.output.as_deref().map(OutputSpec::parse).transpose()?;

        let mut config = Config::load_or_default(cli.config.as_deref())?;
        if let Some(suffix) = cli.suffix {
            if suffix.contains(['/', '\\']) {
                return Err(PublicizerError::Argument(format!(
                    "suffix {:?} must not contain a path separator",
                    suffix
                )));
            }
            config.output.suffix = suffix;
        }
        if cli.strip_bodies {
            config.rewrite.strip_bodies = true;
        }

        Ok(Self {
            inputs,
            output,
            config,
            report: cli.report,
            wait: cli.wait,
        })
    }
}
