mod args;
mod logging;
mod output;

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{Context, Result};
use mxprobe_lib::resolver::normalize_domain;
use mxprobe_lib::{CacheBackend, EngineConfig, Engine, MemoryBackend, ReferenceList};
use tracing::warn;

use args::{Cli, Commands};
use logging::LogFormat;
use output::{ListCheckRow, VerdictRow};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, LogFormat::parse(&cli.log_format)?)?;

    let Some(cmd) = &cli.cmd else {
        Cli::clap_command().print_help()?;
        println!();
        return Ok(());
    };

    let backend = Arc::new(MemoryBackend::new());
    backend.open().context("open result cache")?;
    let outcome = run(&cli, cmd, &backend);
    if let Err(err) = backend.close() {
        warn!(error = %err, "closing result cache failed");
    }

    // exit: 0 all valid, 2 some invalid, 1 fatal
    if outcome? {
        std::process::exit(2);
    }
    Ok(())
}

/// Returns whether any domain got an invalid verdict.
fn run(cli: &Cli, cmd: &Commands, backend: &Arc<MemoryBackend>) -> Result<bool> {
    let config = cli.engine_config()?;
    match cmd {
        Commands::Verify { domains, stdin } => {
            let engine = Engine::new(config)
                .context("engine setup")?
                .with_cache(Arc::clone(backend) as Arc<dyn CacheBackend>);
            let mut rows = Vec::new();
            for domain in collect_domains(domains, *stdin)? {
                let result = engine
                    .verify_exchangers(&domain)
                    .with_context(|| format!("verify {domain}"))?;
                rows.push(VerdictRow { domain, result });
            }
            output::write_verdicts(&rows, cli)?;
            Ok(output::any_invalid(&rows))
        }
        Commands::List { domains, stdin } => {
            let engine = Engine::new(config).context("engine setup")?;
            let rows: Vec<_> = collect_domains(domains, *stdin)?
                .iter()
                .map(|domain| engine.list_exchangers(domain))
                .collect();
            output::write_topologies(&rows, cli)?;
            Ok(false)
        }
        Commands::Lists { domains } => {
            let rows = check_lists(&config, domains, backend)?;
            output::write_list_checks(&rows, cli)?;
            Ok(false)
        }
    }
}

fn check_lists(
    config: &EngineConfig,
    domains: &[String],
    backend: &Arc<MemoryBackend>,
) -> Result<Vec<ListCheckRow>> {
    let shared = Arc::clone(backend) as Arc<dyn CacheBackend>;
    let ttl = config.cache_ttl.reference_lists;
    let prefix = config.cache_key_prefix.as_str();
    let tlds = ReferenceList::iana_tlds(prefix, ttl, Arc::clone(&shared))?;
    let disposable = ReferenceList::disposable_domains(prefix, ttl, shared)?;

    eprintln!(
        "loaded {} TLDs, {} disposable domains",
        tlds.load().len(),
        disposable.load().len()
    );

    let rows = domains
        .iter()
        .map(|raw| {
            let domain = normalize_domain(raw).unwrap_or_else(|_| raw.trim().to_ascii_lowercase());
            let tld = domain.rsplit('.').next().unwrap_or_default();
            ListCheckRow {
                known_tld: tlds.contains(tld),
                disposable: disposable.contains(&domain),
                domain,
            }
        })
        .collect();
    Ok(rows)
}

/// Arguments, then stdin lines, trimmed. Repeats are kept and answered
/// from the cache.
fn collect_domains(args: &[String], stdin: bool) -> Result<Vec<String>> {
    let mut domains: Vec<String> = args.iter().map(|d| d.trim().to_string()).collect();
    if stdin {
        for line in io::stdin().lock().lines() {
            domains.push(line.context("read stdin")?.trim().to_string());
        }
    }
    domains.retain(|d| !d.is_empty());
    Ok(domains)
}
