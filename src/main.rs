use clap::{Arg, ArgAction, Command};
use lead_outreach::clients::{Clients, SqliteLedger};
use lead_outreach::config::Config;
use lead_outreach::report::CohortReport;
use lead_outreach::segment::RESOLVABLE_COHORTS;
use lead_outreach::service::OutreachService;
use lead_outreach::{scheduler, server};
use log::LevelFilter;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("lead-outreach")
        .version(env!("CARGO_PKG_VERSION"))
        .about("CRM lead segmentation and WhatsApp campaign automation")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/lead-outreach.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and print a summary")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("serve")
                .long("serve")
                .help("Run the HTTP service and scheduler (default)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("poll-now")
                .long("poll-now")
                .help("Message new leads once and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("daily-report")
                .long("daily-report")
                .help("Send the daily cohort report and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("campaign")
                .long("campaign")
                .value_name("SEGMENT")
                .help("Run an approved campaign for a segment")
                .requires("template")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("template")
                .long("template")
                .value_name("NAME")
                .help("Template to send with --campaign")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("cohorts")
                .long("cohorts")
                .help("Print current cohort counts")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .help("Show recent campaign summaries from the ledger")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-segments")
                .long("list-segments")
                .help("List segment identifiers accepted by --campaign")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    if matches.get_flag("list-segments") {
        list_segments();
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/lead-outreach.yaml");

    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };
    config.apply_env_overrides();

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    if matches.get_flag("stats") {
        show_stats(&config);
        return;
    }

    let clients = match Clients::from_config(&config) {
        Ok(clients) => clients,
        Err(e) => {
            eprintln!("Error initializing clients: {e:#}");
            process::exit(1);
        }
    };
    let service = Arc::new(OutreachService::new(config, clients));

    if matches.get_flag("poll-now") {
        match service.poll_new_leads().await {
            Ok(summary) => println!(
                "Checked {} leads, {} new: {} sent, {} failed",
                summary.checked, summary.new_found, summary.sent, summary.failed
            ),
            Err(e) => {
                eprintln!("❌ Poll failed: {e}");
                process::exit(1);
            }
        }
        return;
    }

    if matches.get_flag("daily-report") {
        match service.send_daily_report().await {
            Ok(outcome) => {
                print_cohorts(&outcome.report);
                if outcome.emailed {
                    println!("✅ Daily report sent");
                } else {
                    println!("❌ Daily report could not be emailed");
                    process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("❌ Report failed: {e}");
                process::exit(1);
            }
        }
        return;
    }

    if matches.get_flag("cohorts") {
        match service.cohorts().await {
            Ok(report) => print_cohorts(&report),
            Err(e) => {
                eprintln!("❌ Unable to classify leads: {e}");
                process::exit(1);
            }
        }
        return;
    }

    if let Some(segment) = matches.get_one::<String>("campaign") {
        let template = matches.get_one::<String>("template").map(String::as_str);
        match service.approve_campaign(Some(segment.as_str()), template).await {
            Ok(campaign) => {
                println!(
                    "✅ Campaign {} ({}): {} sent, {} failed of {} ({:.1}%)",
                    campaign.segment,
                    campaign.template,
                    campaign.result.success,
                    campaign.result.failed,
                    campaign.result.total,
                    campaign.success_rate
                );
            }
            Err(e) => {
                eprintln!("❌ Campaign failed: {e}");
                process::exit(1);
            }
        }
        return;
    }

    for problem in service.config().validate() {
        log::warn!("{problem}");
    }

    let background = scheduler::spawn(service.clone());
    if let Err(e) = server::serve(service).await {
        log::error!("{e:#}");
        process::exit(1);
    }
    for handle in background {
        handle.abort();
    }
    log::info!("Shut down");
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn test_config(config: &Config) {
    println!("🔍 Testing configuration...");
    println!();
    println!("Listen address: {}:{}", config.server.bind_address, config.server.port);
    println!("CRM domain: {}", config.crm.domain);
    println!("Ledger database: {}", config.ledger.database_path);
    println!(
        "New lead template: {}",
        config.campaign.new_lead_template.as_deref().unwrap_or("(none)")
    );
    println!("Template aliases: {}", config.messaging.template_aliases.len());
    match config.poll_interval() {
        Some(interval) => println!("Poll interval: {}s", interval.as_secs()),
        None => println!("Poll interval: disabled"),
    }
    match config.daily_report_time() {
        Some(at) => println!("Daily report: {}", at.format("%H:%M")),
        None => println!("Daily report: disabled"),
    }
    println!();

    let problems = config.validate();
    if problems.is_empty() {
        println!("✅ Configuration is valid");
    } else {
        println!("❌ Configuration problems:");
        for problem in &problems {
            println!("  • {problem}");
        }
        process::exit(1);
    }
}

fn show_stats(config: &Config) {
    let ledger = match SqliteLedger::open(&config.ledger.database_path) {
        Ok(ledger) => ledger,
        Err(e) => {
            println!("❌ Failed to open ledger: {e:#}");
            process::exit(1);
        }
    };

    let summaries = match ledger.recent_summaries(20) {
        Ok(summaries) => summaries,
        Err(e) => {
            println!("❌ Failed to read campaign summaries: {e}");
            process::exit(1);
        }
    };

    if summaries.is_empty() {
        println!("No campaigns recorded in {}", ledger.path());
        return;
    }

    println!("📊 Recent campaigns");
    println!("═══════════════════════════════════════");
    println!(
        "{:<12} {:<24} {:>6} {:>8} {:>7} {:>5} {:>10} {:<7}",
        "Date", "Segment", "Total", "Success", "Failed", "New", "Follow-up", "Type"
    );
    for summary in summaries {
        println!(
            "{:<12} {:<24} {:>6} {:>8} {:>7} {:>5} {:>10} {:<7}",
            summary.date.format("%Y-%m-%d").to_string(),
            truncate_string(&summary.segment, 24),
            summary.total_sent,
            summary.success,
            summary.failed,
            summary.new_leads,
            summary.follow_ups,
            summary.campaign_type.as_str()
        );
    }
}

fn print_cohorts(report: &CohortReport) {
    println!("📈 Lead cohorts ({} leads)", report.total_leads);
    for bucket in &report.buckets {
        println!(
            "  {:<24} {:>6} ({:.1}%)",
            bucket.label, bucket.count, bucket.percentage
        );
    }
    println!("  {:<24} {:>6}", "High potential", report.high_potential);

    println!("By status:");
    for (status, count) in &report.by_status {
        println!("  {status:<24} {count:>6}");
    }
    println!("By source:");
    for (source, count) in &report.by_source {
        println!("  {source:<24} {count:>6}");
    }
}

fn list_segments() {
    println!("Segments accepted by --campaign and /approve-campaign:");
    for name in RESOLVABLE_COHORTS {
        println!("  • {name}");
    }
    println!("  • status:<value>   leads whose status equals <value>");
    println!("  • source:<value>   leads whose source equals <value>");
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
