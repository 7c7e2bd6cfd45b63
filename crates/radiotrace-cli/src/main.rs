use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::glob;
use tracing_subscriber::EnvFilter;

use radiotrace_core::trace::{AnalysisFilter, Telemetry, TimeRange};

mod profile_file;
mod report;
mod trace_dir;

#[derive(Parser, Debug)]
#[command(name = "radiotrace")]
#[command(version)]
#[command(
    about = "Offline analyzer for mobile-device network traces (sessions, RRC states, bursts, energy).",
    long_about = None,
    after_help = "Examples:\n  radiotrace analyze capture.pcap -o report.json\n  radiotrace analyze capture.pcapng --tech 3g --trace-dir ./trace -o report.json\n  radiotrace analyze capture.pcap --profile lte.toml --stdout --pretty"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a capture file and generate a versioned JSON report.
    #[command(alias = "analyse")]
    Analyze {
        /// Path to a .pcap or .pcapng file
        input: PathBuf,

        /// Trace directory with telemetry sidecar files (user events,
        /// cpu, peripheral states)
        #[arg(long)]
        trace_dir: Option<PathBuf>,

        /// Device profile TOML file
        #[arg(long, conflicts_with = "tech")]
        profile: Option<PathBuf>,

        /// Built-in profile defaults: 3g, lte, or wifi
        #[arg(long)]
        tech: Option<String>,

        /// Output report path (JSON)
        #[arg(short = 'o', long, required_unless_present = "stdout")]
        report: Option<PathBuf>,

        /// Write JSON report to stdout
        #[arg(long, conflicts_with = "report")]
        stdout: bool,

        /// Pretty-print JSON output
        #[arg(long, conflicts_with = "compact")]
        pretty: bool,

        /// Compact JSON output (default)
        #[arg(long)]
        compact: bool,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,

        /// Only analyze these application names (comma separated)
        #[arg(long, value_delimiter = ',')]
        apps: Vec<String>,

        /// Exclude UDP traffic from the analysis
        #[arg(long)]
        no_udp: bool,

        /// Exclude IPv4 traffic from the analysis
        #[arg(long)]
        no_ipv4: bool,

        /// Exclude IPv6 traffic from the analysis
        #[arg(long)]
        no_ipv6: bool,

        /// Analysis window start (seconds from trace start)
        #[arg(long)]
        from: Option<f64>,

        /// Analysis window end (seconds from trace start)
        #[arg(long, requires = "from")]
        to: Option<f64>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Analyze {
            input,
            trace_dir,
            profile,
            tech,
            report,
            stdout,
            pretty,
            compact,
            quiet,
            apps,
            no_udp,
            no_ipv4,
            no_ipv6,
            from,
            to,
        } => cmd_analyze(AnalyzeArgs {
            input,
            trace_dir,
            profile,
            tech,
            report,
            stdout,
            pretty,
            compact,
            quiet,
            apps,
            no_udp,
            no_ipv4,
            no_ipv6,
            from,
            to,
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self { message: message.into(), hint }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(err.to_string(), None)
    }
}

struct AnalyzeArgs {
    input: PathBuf,
    trace_dir: Option<PathBuf>,
    profile: Option<PathBuf>,
    tech: Option<String>,
    report: Option<PathBuf>,
    stdout: bool,
    pretty: bool,
    compact: bool,
    quiet: bool,
    apps: Vec<String>,
    no_udp: bool,
    no_ipv4: bool,
    no_ipv6: bool,
    from: Option<f64>,
    to: Option<f64>,
}

fn cmd_analyze(args: AnalyzeArgs) -> Result<(), CliError> {
    let resolved_input = resolve_input_path(&args.input)?;
    validate_input_file(&resolved_input)?;

    let meta = fs::metadata(&resolved_input)
        .with_context(|| format!("failed to read input file: {}", resolved_input.display()))?;
    if !meta.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", args.input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }

    let profile = match (&args.profile, &args.tech) {
        (Some(path), _) => Some(profile_file::load_profile(path)?),
        (None, Some(tech)) => Some(profile_file::default_profile(tech).ok_or_else(|| {
            CliError::new(
                format!("unsupported technology '{tech}'"),
                Some("expected one of: 3g, lte, wifi".to_string()),
            )
        })?),
        (None, None) => None,
    };

    let capture = radiotrace_core::source::read_capture_file(&resolved_input)
        .context("capture decoding failed")?;
    let telemetry = match &args.trace_dir {
        Some(dir) => trace_dir::load_telemetry(dir, capture.base_timestamp),
        None => Telemetry::default(),
    };

    let filter = AnalysisFilter {
        app_names: if args.apps.is_empty() {
            None
        } else {
            Some(args.apps.iter().cloned().collect::<HashSet<String>>())
        },
        ipv4: !args.no_ipv4,
        ipv6: !args.no_ipv6,
        udp: !args.no_udp,
        time_range: match (args.from, args.to) {
            (Some(begin), Some(end)) => Some(TimeRange { begin, end }),
            (Some(begin), None) => Some(TimeRange { begin, end: capture.trace_duration }),
            _ => None,
        },
    };

    let capture_end = (capture.base_timestamp > 0.0)
        .then_some(capture.base_timestamp + capture.trace_duration);
    let trace_duration = capture.trace_duration;
    let result =
        radiotrace_core::analyze(capture.packets, profile, &filter, &telemetry, trace_duration);
    let report_data = report::build_report(
        &result,
        &resolved_input.display().to_string(),
        meta.len(),
        capture_end,
    );
    let json = serialize_report(&report_data, args.pretty, args.compact)?;

    if args.stdout {
        println!("{}", json);
        return Ok(());
    }

    let report_path = args
        .report
        .expect("report path required when not using stdout");
    if let Some(parent) = report_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create output directory: {}", parent.display())
            })?;
        }
    }
    fs::write(&report_path, json)
        .with_context(|| format!("failed to write report: {}", report_path.display()))?;

    if !args.quiet {
        eprintln!("OK: report written -> {}", report_path.display());
    }
    Ok(())
}

fn serialize_report(
    report: &report::AnalysisReport,
    pretty: bool,
    compact: bool,
) -> Result<String, CliError> {
    if pretty && compact {
        return Err(CliError::new(
            "cannot use --pretty and --compact together",
            Some("choose one output format".to_string()),
        ));
    }
    if pretty {
        serde_json::to_string_pretty(report)
            .context("JSON serialization failed")
            .map_err(Into::into)
    } else {
        serde_json::to_string(report)
            .context("JSON serialization failed")
            .map_err(Into::into)
    }
}

fn validate_input_file(input: &PathBuf) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "pcap" && ext != "pcapng" {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .pcap or .pcapng file".to_string()),
        ));
    }
    Ok(())
}

fn resolve_input_path(input: &PathBuf) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.clone());
    }

    let mut matches = Vec::new();
    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    if matches.is_empty() {
        return Err(CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some("check the path or quote the pattern; expected .pcap or .pcapng".to_string()),
        ));
    }
    if matches.len() > 1 {
        return Err(CliError::new(
            format!(
                "multiple files match pattern '{}' ({} matches)",
                pattern,
                matches.len()
            ),
            Some("pass a single capture file, or run once per file".to_string()),
        ));
    }
    Ok(matches.remove(0))
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
