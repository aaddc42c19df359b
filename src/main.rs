use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use nmap_pilot_rs::api::{ApiClient, Host, JobStatus, ScanReport};
use nmap_pilot_rs::catalog;
use nmap_pilot_rs::controller::ScanController;
use nmap_pilot_rs::selection::SelectionModel;

/// nmap-pilot — configure, validate, and run Nmap scans against a remote
/// scanning service, tracking background jobs to completion.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nmap-pilot",
    version,
    about = "Configure and run Nmap scans against a remote scanning service.",
    long_about = None
)]
struct Cli {
    /// Target IP, hostname, or CIDR to scan.
    #[arg(long)]
    target: Option<String>,

    /// Base URL of the scanning service.
    #[arg(long, default_value = "http://localhost:8000")]
    server: String,

    /// Scan option as ID or ID=VALUE (repeatable); see --list-options.
    #[arg(long = "opt")]
    options: Vec<String>,

    /// Output file format (requires --output-file).
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Filename for the chosen output format.
    #[arg(long)]
    output_file: Option<String>,

    /// Extra output flag (repeatable).
    #[arg(long, value_enum)]
    extra: Vec<ExtraArg>,

    /// Run the scan as a background job and poll until it finishes.
    #[arg(long, default_value_t = false)]
    r#async: bool,

    /// Poll interval in milliseconds for background jobs.
    #[arg(long = "poll-ms", default_value_t = 3000)]
    poll_ms: u64,

    /// Write the final scan response as pretty JSON to this path (optional).
    #[arg(long)]
    json: Option<PathBuf>,

    /// Retrieve the saved results file after the scan and render it.
    #[arg(long, default_value_t = false)]
    fetch_file: bool,

    /// Print the option catalog and exit.
    #[arg(long, default_value_t = false)]
    list_options: bool,

    /// Ping the scanning service and exit.
    #[arg(long, default_value_t = false)]
    check: bool,

    /// Log filter (e.g. warn, debug, nmap_pilot_rs=debug).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Normal text output (-oN).
    Normal,
    /// XML output (-oX).
    Xml,
    /// All formats (-oA).
    All,
}

impl FormatArg {
    fn option_id(self) -> u16 {
        match self {
            FormatArg::Normal => 150,
            FormatArg::Xml => 151,
            FormatArg::All => 152,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExtraArg {
    /// Increase verbosity (-v).
    Verbose,
    /// Only show open ports (--open).
    Open,
}

impl ExtraArg {
    fn option_id(self) -> u16 {
        match self {
            ExtraArg::Verbose => 153,
            ExtraArg::Open => 154,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid --log-level: {}", cli.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cli.list_options {
        print_catalog();
        return Ok(());
    }

    let client = ApiClient::new(&cli.server);

    if cli.check {
        match client.alive().await {
            Ok(health) => {
                println!("Scan service at {} is online (status: {})", cli.server, health.status);
                return Ok(());
            }
            Err(err) => bail!("scan service at {} is not reachable: {err}", cli.server),
        }
    }

    let Some(target) = cli.target.clone() else {
        bail!("--target is required (or use --list-options / --check)");
    };

    let selection = build_selection(&cli)?;

    println!("nmap-pilot configuration:");
    println!("  server      : {}", cli.server);
    println!("  target      : {}", target);
    println!("  mode        : {}", if cli.r#async { "async" } else { "sync" });
    println!("  options     : {}", summarize_selection(&selection));
    if cli.r#async {
        println!("  poll_ms     : {}", cli.poll_ms);
    }
    println!(
        "  json        : {}",
        cli.json
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );

    let mut controller =
        ScanController::with_poll_interval(client.clone(), Duration::from_millis(cli.poll_ms));

    let status: JobStatus = if cli.r#async {
        let handle = controller.run_async(&target, &selection).await?;
        println!(
            "\nScan started as job {} (checking status every {} ms)...",
            handle.job_id, cli.poll_ms
        );
        let status = controller.wait().await?;
        println!(
            "Job finished after {} status check(s).",
            controller.poll_snapshot().poll_count
        );
        status
    } else {
        println!("\nRunning scan...");
        JobStatus::from(controller.run_sync(&target, &selection).await?)
    };

    if let Some(notice) = controller.notice() {
        println!("{notice}");
    }
    if let Some(output) = &status.report.output {
        println!("\n{output}");
    }
    if let Some(path) = status.report.output_file.as_deref().filter(|f| !f.is_empty()) {
        println!("Results saved on the service as {path}");
    }

    if let Some(path) = &cli.json {
        write_response_json(path, &status)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("Wrote JSON response to {}", path.display());
    }

    if cli.fetch_file {
        fetch_and_render_file(&client, &status.report).await?;
    }

    Ok(())
}

fn build_selection(cli: &Cli) -> Result<SelectionModel> {
    let mut selection = SelectionModel::new();
    for spec in &cli.options {
        let (id, value) = catalog::parse_option_spec(spec)?;
        if catalog::scan_option(id).is_none() {
            bail!(
                "option id {id} belongs to the output group; use --format/--extra instead"
            );
        }
        selection.toggle(id, true, value);
    }
    if let Some(format) = cli.format {
        selection.set_output_format(Some(format.option_id()));
    }
    if let Some(name) = &cli.output_file {
        selection.set_output_filename(name);
    }
    for extra in &cli.extra {
        selection.toggle_extra(extra.option_id());
    }
    Ok(selection)
}

fn summarize_selection(selection: &SelectionModel) -> String {
    let mut parts: Vec<String> = selection
        .selected()
        .iter()
        .map(|opt| {
            let flag = catalog::scan_option(opt.id).map_or("?", |d| d.flag);
            match &opt.value {
                Some(value) if !value.is_empty() => format!("{flag} {value}"),
                _ => flag.to_string(),
            }
        })
        .collect();
    if let Some(format) = selection.output_format().and_then(catalog::lookup) {
        parts.push(format!("{} {}", format.flag, selection.output_filename()));
    }
    for extra in selection.extras().iter().filter_map(|&id| catalog::lookup(id)) {
        parts.push(extra.flag.to_string());
    }
    if parts.is_empty() {
        "<none>".to_string()
    } else {
        parts.join(", ")
    }
}

fn print_catalog() {
    for category in catalog::CATEGORIES {
        println!("\n{}", category.name);
        for opt in category.options {
            print_option(opt);
        }
    }
    println!("\nOutput formats (choose one with --format, needs --output-file)");
    for opt in catalog::OUTPUT_FORMATS {
        print_option(opt);
    }
    println!("\nExtra output flags (--extra)");
    for opt in catalog::OUTPUT_EXTRAS {
        print_option(opt);
    }
}

fn print_option(opt: &catalog::OptionDescriptor) {
    let usage = match opt.placeholder {
        Some(placeholder) => format!("{} <{}>", opt.flag, placeholder),
        None => opt.flag.to_string(),
    };
    println!("  {:>3}  {:<32}  {}", opt.id, usage, opt.description);
}

/// Retrieve the results file the scan produced, preferring the chosen output
/// file and falling back to the auto-generated XML sidecar.
async fn fetch_and_render_file(client: &ApiClient, report: &ScanReport) -> Result<()> {
    let output_file = report.output_file.as_deref().filter(|f| !f.is_empty());
    let (file, mode) = match (output_file, report.output_mode, report.auto_xml.as_deref()) {
        (Some(file), Some(mode), _) => (file, mode),
        (_, _, Some(auto_xml)) => (auto_xml, 2),
        _ => {
            println!("No saved results file to fetch.");
            return Ok(());
        }
    };

    let file_report = client
        .fetch_file(file, mode)
        .await
        .context("failed to fetch results file")?;
    if let Some(err) = &file_report.error {
        bail!("scan service could not return the file: {err}");
    }
    if let Some(content) = &file_report.content {
        println!("\n{content}");
    }
    if let Some(hosts) = &file_report.data {
        print_host_tables(hosts);
    }
    Ok(())
}

fn print_host_tables(hosts: &[Host]) {
    if hosts.is_empty() {
        println!("\nNo hosts found in scan results.");
        return;
    }
    for host in hosts {
        println!("\nHost {} ({})", host.address, host.status);
        if host.ports.is_empty() {
            println!("  no open ports found");
            continue;
        }

        let mut service_w = "service".len();
        let mut banner_w = "banner".len();
        for p in &host.ports {
            service_w = service_w.max(p.service.len());
            banner_w = banner_w.max(p.banner.len().min(60));
        }
        let port_w = "port".len().max(5);
        let proto_w = "proto".len();
        let state_w = "state".len().max(8);

        println!(
            "  {:>port_w$}  {:<proto_w$}  {:<state_w$}  {:<service_w$}  {:<banner_w$}",
            "port",
            "proto",
            "state",
            "service",
            "banner",
            port_w = port_w,
            proto_w = proto_w,
            state_w = state_w,
            service_w = service_w,
            banner_w = banner_w
        );
        for p in &host.ports {
            let mut banner = p.banner.clone();
            if banner.len() > 60 {
                banner.truncate(60);
            }
            println!(
                "  {:>port_w$}  {:<proto_w$}  {:<state_w$}  {:<service_w$}  {:<banner_w$}",
                p.port,
                p.protocol,
                p.state,
                p.service,
                banner,
                port_w = port_w,
                proto_w = proto_w,
                state_w = state_w,
                service_w = service_w,
                banner_w = banner_w
            );
        }
    }
}

fn write_response_json(path: &std::path::Path, status: &JobStatus) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, status)?;
    Ok(())
}
