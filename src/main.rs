use std::{collections::HashMap, path::Path};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context as _, eyre},
};
use restplate::{
    config::{ClientConfig, ClientConfigValidator, loader::load_config_unchecked},
    core::{Bindings, Context, PathExpression, Templater, join_root},
    metrics, tracing_setup,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Format a URL template with bound parameters
    Format {
        /// URL template, e.g. "/users/{id}?q={term}"
        template: String,
        /// Path parameter binding (name=value)
        #[clap(long = "path", value_parser = parse_key_val)]
        path: Vec<(String, String)>,
        /// Matrix parameter binding (name=value)
        #[clap(long = "matrix", value_parser = parse_key_val)]
        matrix: Vec<(String, String)>,
        /// Query parameter binding (name=value)
        #[clap(long = "query", value_parser = parse_key_val)]
        query: Vec<(String, String)>,
        /// Fragment parameter binding (name=value)
        #[clap(long = "fragment", value_parser = parse_key_val)]
        fragment: Vec<(String, String)>,
        /// Binding visible in every context (name=value)
        #[clap(
            long = "shared",
            value_parser = parse_key_val,
            conflicts_with_all = ["path", "matrix", "query", "fragment"]
        )]
        shared: Vec<(String, String)>,
        /// Service root to prepend
        #[clap(long)]
        root: Option<String>,
    },
    /// Parse a URL or path and print its structure
    Parse {
        /// URL or path token
        token: String,
        /// Service root to strip before parsing
        #[clap(long)]
        root: Option<String>,
    },
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "restplate.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "restplate.toml")]
        config: String,
    },
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_setup::init_console_tracing()?;
    metrics::init_metrics()?;

    let args = Args::parse();

    match args.command {
        Commands::Format {
            template,
            path,
            matrix,
            query,
            fragment,
            shared,
            root,
        } => {
            let bindings = if shared.is_empty() {
                let mut bindings = Bindings::new();
                for (context, pairs) in [
                    (Context::Path, path),
                    (Context::Matrix, matrix),
                    (Context::Query, query),
                    (Context::Fragment, fragment),
                ] {
                    for (name, value) in pairs {
                        bindings.insert(context, name, value);
                    }
                }
                bindings
            } else {
                Bindings::shared(shared.into_iter().collect::<HashMap<_, _>>())
            };
            format_command(&template, &bindings, root.as_deref())
        }
        Commands::Parse { token, root } => parse_command(&token, root.as_deref()),
        Commands::Validate { config } => validate_config_command(&config).await,
        Commands::Init { config } => init_config_command(&config).await,
    }
}

fn format_command(template: &str, bindings: &Bindings, root: Option<&str>) -> Result<()> {
    let formatted = Templater::format_url(template, bindings)
        .with_context(|| format!("Failed to format template '{template}'"))?;
    match root {
        Some(root) => println!("{}", join_root(root, &formatted)),
        None => println!("{formatted}"),
    }
    Ok(())
}

fn parse_command(token: &str, root: Option<&str>) -> Result<()> {
    let expression = PathExpression::parse(token, root)
        .with_context(|| format!("Failed to parse '{token}'"))?;

    if let Some(root) = expression.root() {
        println!("root:     {root}");
    }
    println!("absolute: {}", expression.is_absolute());
    println!("path:     {}", expression.path_without_matrix());
    for (idx, segment) in expression.segments().iter().enumerate() {
        println!("segment[{idx}]: {}", segment.name);
        for (key, value) in segment.matrix.pairs() {
            println!("    ;{key}={value}");
        }
    }
    for (key, value) in expression.query().pairs() {
        println!("query:    {key}={value}");
    }
    if !expression.fragment().is_empty() {
        println!("fragment: {}", expression.fragment().join("/"));
    }
    println!("render:   {expression}");
    Ok(())
}

/// Validate a configuration file
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config_unchecked(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match ClientConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Default Root: {}", config.default_root);
            println!("   • Root Rules: {}", config.roots.len());
            println!("   • Timeout: {}ms", config.timeout_ms);
            println!("   • Max Retries: {}", config.max_retries);
            println!("   • Success Codes: {:?}", config.success_codes);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure all roots start with http:// or https://");
            println!("   • Root prefixes must start with '/'");
            println!("   • Success codes must lie between 100 and 599");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let defaults = ClientConfig::default();
    let success_codes = defaults
        .success_codes
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let default_config = format!(
        r#"# restplate client configuration

# Root used when no rule below matches
default_root = "{root}"

# Per-attempt timeout in milliseconds
timeout_ms = {timeout}

# Retries after a timed out attempt (other failures are never retried)
max_retries = {retries}

# Statuses treated as success
success_codes = [{success_codes}]

# Example: send templates starting with /files to a CDN
# [[roots]]
# prefix = "/files"
# root = "https://cdn.example.com"

# Headers added to every request that does not set them itself
[default_headers]
accept = "application/json"
"#,
        root = defaults.default_root,
        timeout = defaults.timeout_ms,
        retries = defaults.max_retries,
    );

    tokio::fs::write(path, default_config)
        .await
        .map_err(|e| eyre!("Failed to write {config_path}: {e}"))?;

    println!("✅ Created default configuration file: {config_path}");
    println!("   Run `restplate validate --config {config_path}` to check it.");
    Ok(())
}
