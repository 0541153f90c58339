//! Registry Compiler
//!
//! Main CLI entry point for validating registry headers and generating
//! static firmware configuration.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use registry_compiler::codegen::{CalibrationArtifact, GenerationContext, Generator};
use registry_compiler::compiler::RegistryCompiler;
use registry_compiler::config::RegcConfig;
use registry_compiler::document::ConfigDocument;
use registry_compiler::hash::{djb2_16, format_hash};
use registry_compiler::logging;
use registry_compiler::registry::Registries;
use registry_compiler::validate::{
    check_config_block, validate_assignments, validate_registries, ValidationReport,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser)]
#[command(name = "regc")]
#[command(version)]
#[command(about = "Registry compiler for firmware catalog headers", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to regc.toml (searched upward from the project directory by default)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the registries and run every validation pass
    Validate {
        /// Firmware project root
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Also check the static config block in config.h
        #[arg(long)]
        check_config: bool,

        /// Exit with status 1 when any error is found
        #[arg(long)]
        ci: bool,
    },

    /// Generate static configuration from a saved config document
    Generate {
        /// Config document to load
        #[arg(long, value_name = "FILE")]
        load: PathBuf,

        /// Firmware project root
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Target platform recorded in generated banners
        #[arg(long)]
        platform: Option<String>,

        /// Also emit thin sensor and application libraries
        #[arg(long)]
        thin_libs: bool,

        /// Write the normalized document back to this path
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
    },

    /// Print the DJB2-16 hash of each name
    Hash {
        /// Names to hash (case-insensitive)
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let project_dir = match &cli.command {
        Commands::Validate { project_dir, .. } | Commands::Generate { project_dir, .. } => {
            project_dir.clone()
        }
        Commands::Hash { .. } => PathBuf::from("."),
    };
    let config = load_config(cli.config.as_deref(), &project_dir)?;
    logging::init(&logging::level_for(cli.verbose, &config.logging.level));
    debug!(project_dir = %project_dir.display(), "configuration loaded");

    match cli.command {
        Commands::Validate {
            project_dir,
            check_config,
            ci,
        } => cmd_validate(&config, &project_dir, check_config, ci),
        Commands::Generate {
            load,
            project_dir,
            platform,
            thin_libs,
            save,
        } => cmd_generate(
            &config,
            &load,
            &project_dir,
            platform,
            thin_libs,
            save.as_deref(),
        ),
        Commands::Hash { names } => cmd_hash(&names),
    }
}

fn load_config(explicit: Option<&Path>, project_dir: &Path) -> Result<RegcConfig> {
    match explicit {
        Some(path) => RegcConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => RegcConfig::find_and_load(project_dir).context("Failed to load regc.toml"),
    }
}

/// Compile all three registries, printing a line per header.
fn load_registries(config: &RegcConfig, project_dir: &Path) -> Result<Registries> {
    let compiler = RegistryCompiler::new(config.registry.clone());
    let enums = compiler.load_enum_constants(project_dir);

    println!("\nChecking {}...", config.registry.sensor_header);
    let sensors = compiler
        .load_sensors(project_dir, &enums)
        .context("Could not compile the sensor registry")?;
    println!("  ✓ {} sensors loaded", sensors.len());

    println!("\nChecking {}...", config.registry.application_header);
    let applications = compiler
        .load_applications(project_dir, &enums)
        .context("Could not compile the application registry")?;
    println!("  ✓ {} applications loaded", applications.len());

    println!("\nChecking {}...", config.registry.unit_header);
    let units = compiler
        .load_units(project_dir, &enums)
        .context("Could not compile the unit registry")?;
    println!("  ✓ {} units loaded", units.len());

    Ok(Registries {
        sensors,
        applications,
        units,
    })
}

fn print_report(report: &ValidationReport) {
    for pass in &report.passes {
        println!("\n{}", pass.render().trim_end());
    }
    println!("\n=== Summary ===");
    println!("Status: {}", report.summary());
}

fn cmd_validate(config: &RegcConfig, project_dir: &Path, check_config: bool, ci: bool) -> Result<()> {
    println!("=== Registry Validation ===");
    let registries = load_registries(config, project_dir)?;

    let mut report = validate_registries(&registries);
    if check_config {
        let path = project_dir.join(&config.generator.config_header);
        let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let text = String::from_utf8_lossy(&bytes);
        let generator = Generator::new(config.generator.clone());
        report.push(check_config_block(&text, &registries, &generator.markers()));
    }

    print_report(&report);

    if ci && !report.is_valid() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_generate(
    config: &RegcConfig,
    load: &Path,
    project_dir: &Path,
    platform: Option<String>,
    thin_libs: bool,
    save: Option<&Path>,
) -> Result<()> {
    println!("=== Static Configuration ===");
    let registries = load_registries(config, project_dir)?;

    let document = ConfigDocument::load(load)
        .with_context(|| format!("Failed to load config document {}", load.display()))?;
    println!(
        "\nLoaded {} inputs from {}",
        document.inputs.len(),
        load.display()
    );

    let mut report = validate_registries(&registries);
    report.extend(validate_assignments(&document.inputs, &registries));
    print_report(&report);
    if !report.is_valid() {
        bail!(
            "Validation failed with {} errors; nothing was generated",
            report.error_count()
        );
    }

    let platform = platform
        .or_else(|| Some(document.metadata.platform.clone()).filter(|p| !p.is_empty()))
        .unwrap_or_else(|| config.generator.platform.clone());
    let ctx = GenerationContext::now(platform);

    let generator = Generator::new(config.generator.clone());
    let generated = generator
        .generate(project_dir, &registries, &document.inputs, &ctx, thin_libs)
        .context("Generation failed")?;

    println!("\n=== Generated ===");
    println!(
        "  ✓ {} ({})",
        generated.config_header.display(),
        if generated.patch.replaced {
            "block replaced"
        } else {
            "block appended"
        }
    );
    println!("  ✓ backup at {}", generated.patch.backup.display());
    match &generated.calibration {
        CalibrationArtifact::Written(path) => println!("  ✓ {}", path.display()),
        CalibrationArtifact::Removed(path) => {
            println!("  ✓ removed {} (no custom calibrations)", path.display())
        }
        CalibrationArtifact::NotNeeded => {}
    }
    for path in &generated.thin_libraries {
        println!("  ✓ {}", path.display());
    }

    if let Some(path) = save {
        document
            .save(path)
            .with_context(|| format!("Failed to save config document {}", path.display()))?;
        println!("  ✓ saved {}", path.display());
    }

    Ok(())
}

fn cmd_hash(names: &[String]) -> Result<()> {
    for name in names {
        println!("{}  {}", format_hash(djb2_16(name)), name);
    }
    Ok(())
}
