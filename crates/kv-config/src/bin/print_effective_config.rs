//! Collapse layer files against a domain's schematics and print the
//! effective configuration as JSON.
//!
//! Layers are applied in argument order; later files override earlier ones.

use clap::{Parser, ValueEnum};
use lms_kv_config::{
    CollapseOptions, ConfigDomain, InferenceBackend, SchematicsRegistry, UnknownKeyPolicy,
    collapse_kv_stack_with, global_config_schematics, load_kv_config_stack_from_paths,
    to_pretty_json,
};
use lms_shared::ErrorEnvelope;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "print_effective_config",
    version,
    about = "Print the effective config for a stack of layer files",
    long_about = None
)]
struct Args {
    /// Layer files (JSON/TOML), lowest precedence first.
    layers: Vec<PathBuf>,
    /// Configuration domain (`llm-load`, `llm-prediction`, `embedding-load`, `retrieval`).
    #[arg(long)]
    domain: ConfigDomain,
    /// Inference backend; omit to resolve only the fields every backend shares.
    #[arg(long)]
    backend: Option<InferenceBackend>,
    /// Handling of keys the domain does not declare; `collect` lists them on stderr.
    #[arg(long, value_enum, default_value_t = UnknownKeys::Warn)]
    unknown_keys: UnknownKeys,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum UnknownKeys {
    Ignore,
    Warn,
    Collect,
    Reject,
}

impl From<UnknownKeys> for UnknownKeyPolicy {
    fn from(value: UnknownKeys) -> Self {
        match value {
            UnknownKeys::Ignore => Self::Ignore,
            UnknownKeys::Warn => Self::Warn,
            UnknownKeys::Collect => Self::Collect,
            UnknownKeys::Reject => Self::Reject,
        }
    }
}

/// Process exit codes: rejected input exits 2, anything else 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Ok = 0,
    Internal = 1,
    InvalidInput = 2,
}

impl ExitCode {
    fn for_error(error: &ErrorEnvelope) -> Self {
        if error.is_request_rejection() {
            Self::InvalidInput
        } else {
            Self::Internal
        }
    }

    const fn as_u8(self) -> u8 {
        self as u8
    }
}

fn main() -> std::process::ExitCode {
    init_tracing();
    let code = match run(&Args::parse()) {
        Ok(()) => ExitCode::Ok,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::for_error(&error)
        },
    };
    std::process::ExitCode::from(code.as_u8())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(args: &Args) -> Result<(), ErrorEnvelope> {
    let registry = SchematicsRegistry::global();
    let schematics = match args.backend {
        Some(backend) => registry.lookup(args.domain, backend)?,
        None => registry.lookup_shared(args.domain)?,
    };

    // Nested documents flatten against every known key, not just this domain's.
    let stack = load_kv_config_stack_from_paths(&args.layers, &global_config_schematics()?)?;
    let options = CollapseOptions::default().with_unknown_keys(args.unknown_keys.into());
    let parsed = collapse_kv_stack_with(&stack, &schematics, options)?;
    for key in parsed.unknown_keys() {
        eprintln!("unknown key: {key}");
    }

    let output = to_pretty_json(&parsed.to_effective_map())?;
    let mut stdout = io::stdout();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_shared::{ErrorClass, ErrorCode};

    #[test]
    fn rejected_input_and_internal_failures_exit_differently() {
        let rejected = ErrorEnvelope::expected(
            ErrorCode::new("kv_config", "invalid_field_value"),
            "temperature must be at most 2",
        );
        let defect = ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            "failed to serialize JSON",
            ErrorClass::NonRetriable,
        );

        assert_eq!(ExitCode::for_error(&rejected).as_u8(), 2);
        assert_eq!(ExitCode::for_error(&defect).as_u8(), 1);
        assert_eq!(ExitCode::Ok.as_u8(), 0);
    }
}
