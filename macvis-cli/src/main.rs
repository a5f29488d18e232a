//! `macvis`: checks that C/C++ consumers only see the macros their libraries
//! declare public.
//!
//! Exit codes: 0 when every library and consumer passes, 1 when a conflict
//! or leak was found, 2 on a fatal error (missing file, bad manifest, cycle).

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{error, info, warn};

use macvis_core::{
    generate_dot, init_structured_logging, load_unit, ConventionKind, DefaultsConfig, FileRole,
    LibraryConfig, Macvis, MacvisError, OutputFormat, CONFIG_FILE,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Macro visibility checker: finds INTERNAL macros leaking into library consumers"
)]
pub struct Cli {
    /// Directory containing macvis.toml
    #[arg(default_value = ".")]
    path: String,

    /// Explicit manifest path (paths inside resolve relative to its directory)
    #[arg(long)]
    config: Option<String>,

    /// Output the report as JSON (overrides [output] format)
    #[arg(long)]
    json: bool,

    /// Print the inclusion graph in Graphviz DOT format
    #[arg(long)]
    dot: bool,

    /// Write the DOT graph to a file instead of stdout
    #[arg(long)]
    dot_file: Option<String>,

    /// Print the end-of-file macro table of a single file and exit
    #[arg(long)]
    table: Option<String>,

    /// Scope convention for libraries that do not set their own
    /// (prefix, location or manifest)
    #[arg(long)]
    convention: Option<String>,

    /// Do not resolve consumers' own #include directives
    #[arg(long)]
    no_scan_includes: bool,

    /// Extra directory names skipped when scanning library dirs
    #[arg(long)]
    exclude: Vec<String>,
}

/// Validates an output path, rejecting traversal and absolute paths.
fn validate_output_path(path: &str) -> Result<PathBuf> {
    // Security: null bytes truncate paths in C APIs
    if path.contains('\0') {
        return Err(anyhow!("Null bytes not allowed in output paths"));
    }

    let p = PathBuf::from(path);

    if p.is_absolute() {
        return Err(anyhow!(
            "Absolute paths not allowed for output. Use a relative path: {}",
            path
        ));
    }

    for component in p.components() {
        if matches!(component, std::path::Component::ParentDir) {
            return Err(anyhow!(
                "Path traversal (..) not allowed in output paths: {}",
                path
            ));
        }
    }

    Ok(p)
}

fn parse_convention(raw: Option<&str>) -> Result<Option<ConventionKind>> {
    raw.map(|s| ConventionKind::from_str(s).map_err(anyhow::Error::from))
        .transpose()
}

/// `--table`: scan one file and print its macro table as JSON.
fn print_table(file: &str, convention: Option<ConventionKind>) -> Result<i32> {
    let path = Path::new(file);
    let role = FileRole::from_path(path).unwrap_or(FileRole::Source);
    let rule = LibraryConfig::default().scope_rule(&DefaultsConfig::default(), convention);

    let (unit, warnings) = load_unit(path, role, &rule)?;
    for warning in &warnings {
        warn!(file = %warning.path.display(), detail = %warning.kind, "scan warning");
        eprintln!("[WARN] {}", warning);
    }

    println!("{}", serde_json::to_string_pretty(&unit)?);
    Ok(0)
}

fn run(cli: &Cli) -> Result<i32> {
    let convention = parse_convention(cli.convention.as_deref())?;

    if let Some(ref file) = cli.table {
        return print_table(file, convention);
    }

    let builder = match cli.config {
        Some(ref config) => Macvis::from_config_file(config)
            .with_context(|| format!("Failed to load manifest: {}", config))?,
        None => Macvis::from_dir(&cli.path).with_context(|| {
            format!("Failed to load {} from: {}", CONFIG_FILE, cli.path)
        })?,
    };

    let mut builder = builder.convention(convention).exclude_dirs(cli.exclude.clone());
    if cli.no_scan_includes {
        builder = builder.scan_includes(false);
    }

    let analysis = builder.analyze()?;
    let report = analysis.report();
    info!(
        libraries = analysis.libraries.len(),
        consumers = analysis.consumers.len(),
        leaks = analysis.leak_count(),
        conflicts = analysis.conflict_count(),
        verdict = %report.verdict,
        "check complete"
    );

    if cli.dot || cli.dot_file.is_some() {
        let dot = generate_dot(&analysis);
        match cli.dot_file {
            Some(ref file) => {
                let safe_path = validate_output_path(file)?;
                fs::write(&safe_path, &dot)
                    .with_context(|| format!("Failed to write {}", safe_path.display()))?;
                println!("DOT graph saved to: {}", safe_path.display());
            }
            None => print!("{}", dot),
        }
        return Ok(report.exit_code());
    }

    let json = cli.json || builder.config().output_format() == Some(OutputFormat::Json);
    if json {
        macvis_core::print_json(&report);
    } else {
        macvis_core::print_plain(&report);
    }

    Ok(report.exit_code())
}

/// Logs a fatal error, naming the offending file when there is one.
fn report_fatal(e: &anyhow::Error) {
    match e.downcast_ref::<MacvisError>().and_then(MacvisError::path) {
        Some(path) => error!(path = %path.display(), detail = %format!("{:#}", e), "fatal error"),
        None => error!(detail = %format!("{:#}", e), "fatal error"),
    }
    eprintln!("[ERROR] {:#}", e);
}

fn main() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("[PANIC] macvis internal error: {}", info);
        eprintln!("[PANIC] The process will exit with code 2.");
        std::process::exit(2);
    }));

    // JSON to stderr, respects RUST_LOG
    init_structured_logging();

    let cli = Cli::parse();

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            report_fatal(&e);
            2
        }
    };

    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_temp_dir(name: &str) -> PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("macvis_cli_tests")
            .join(format!("{}_{}_{}", name, std::process::id(), id));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn create_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("macvis").chain(args.iter().copied()))
    }

    // --- validate_output_path TESTS ---

    #[test]
    fn test_validate_output_path_relative() {
        assert_eq!(
            validate_output_path("out/graph.dot").unwrap(),
            PathBuf::from("out/graph.dot")
        );
    }

    #[test]
    fn test_validate_output_path_rejects_traversal() {
        assert!(validate_output_path("../graph.dot").is_err());
        assert!(validate_output_path("out/../../graph.dot").is_err());
    }

    #[test]
    fn test_validate_output_path_rejects_absolute() {
        assert!(validate_output_path("/tmp/graph.dot").is_err());
    }

    #[test]
    fn test_validate_output_path_rejects_null_byte() {
        assert!(validate_output_path("graph\0.dot").is_err());
    }

    // --- argument parsing TESTS ---

    #[test]
    fn test_cli_defaults() {
        let cli = cli(&[]);
        assert_eq!(cli.path, ".");
        assert!(!cli.json);
        assert!(cli.config.is_none());
        assert!(cli.convention.is_none());
    }

    #[test]
    fn test_parse_convention() {
        assert_eq!(
            parse_convention(Some("location")).unwrap(),
            Some(ConventionKind::Location)
        );
        assert_eq!(parse_convention(None).unwrap(), None);
        assert!(parse_convention(Some("bogus")).is_err());
    }

    // --- run TESTS ---

    #[test]
    fn test_run_exit_codes() {
        let root = create_temp_dir("exit_codes");
        create_file(
            &root.join(CONFIG_FILE),
            "[[library]]\nname = \"lib\"\nheaders = [\"lib.h\"]\nsources = [\"lib.c\"]\n\n\
             [[consumer]]\nfile = \"main.c\"\nlibraries = [\"lib\"]\n",
        );
        create_file(&root.join("lib.h"), "#define LIB_PUBLIC_VERSION 1\n");
        create_file(&root.join("lib.c"), "#define LIB_INTERNAL_DEBUG 1\n");
        create_file(&root.join("main.c"), "#include \"lib.h\"\n");

        let root_str = root.display().to_string();
        assert_eq!(run(&cli(&[root_str.as_str(), "--json"])).unwrap(), 0);

        create_file(&root.join("main.c"), "#include \"lib.h\"\n#include \"lib.c\"\n");
        assert_eq!(run(&cli(&[root_str.as_str(), "--json"])).unwrap(), 1);
    }

    #[test]
    fn test_run_missing_manifest_is_error() {
        let root = create_temp_dir("no_manifest");
        let root_str = root.display().to_string();
        let err = run(&cli(&[root_str.as_str()])).unwrap_err();
        let path = err
            .downcast_ref::<MacvisError>()
            .and_then(MacvisError::path)
            .cloned();
        assert_eq!(path, Some(root.join(CONFIG_FILE)));
    }

    #[test]
    fn test_table_missing_file_is_error() {
        let root = create_temp_dir("table_missing");
        let file = root.join("absent.h").display().to_string();
        assert!(run(&cli(&["--table", file.as_str()])).is_err());
    }
}
