use std::io::Write;

use anyhow::{Context, Result, bail};
use mxprobe_lib::{LogStep, MxTopology, ReputationResult};
use serde::Serialize;

use crate::args::Cli;

#[derive(Serialize)]
pub struct VerdictRow {
    pub domain: String,
    #[serde(flatten)]
    pub result: ReputationResult,
}

#[derive(Serialize)]
pub struct ListCheckRow {
    pub domain: String,
    pub known_tld: bool,
    pub disposable: bool,
}

pub fn any_invalid(rows: &[VerdictRow]) -> bool {
    rows.iter().any(|row| !row.result.is_valid)
}

pub fn write_verdicts(rows: &[VerdictRow], cli: &Cli) -> Result<()> {
    match cli.format.as_str() {
        "human" => {
            write_verdicts_human(rows);
            Ok(())
        }
        "json" => write_json(rows, cli),
        "ndjson" => write_ndjson(rows, cli),
        "csv" => write_csv(rows.iter().map(verdict_record), VERDICT_HEADER, cli),
        other => bail!("unknown --format '{other}', use: human|json|ndjson|csv"),
    }
}

pub fn write_topologies(rows: &[MxTopology], cli: &Cli) -> Result<()> {
    match cli.format.as_str() {
        "human" => {
            for topology in rows {
                println!("{}", topology.domain);
                if topology.exchangers.is_empty() {
                    println!("        no MX records");
                }
                for mx in &topology.exchangers {
                    println!("        {:>5} {} [{}]", mx.priority, mx.host, join_ips(&mx.ips, ", "));
                }
            }
            Ok(())
        }
        "json" => write_json(rows, cli),
        "ndjson" => write_ndjson(rows, cli),
        "csv" => write_csv(
            rows.iter().flat_map(|topology| {
                topology.exchangers.iter().map(|mx| {
                    vec![
                        topology.domain.clone(),
                        mx.priority.to_string(),
                        mx.host.clone(),
                        join_ips(&mx.ips, ";"),
                    ]
                })
            }),
            &["domain", "priority", "host", "ips"],
            cli,
        ),
        other => bail!("unknown --format '{other}', use: human|json|ndjson|csv"),
    }
}

pub fn write_list_checks(rows: &[ListCheckRow], cli: &Cli) -> Result<()> {
    match cli.format.as_str() {
        "human" => {
            for row in rows {
                println!(
                    "{} :: tld={} disposable={}",
                    row.domain,
                    if row.known_tld { "known" } else { "unknown" },
                    row.disposable
                );
            }
            Ok(())
        }
        "json" => write_json(rows, cli),
        "ndjson" => write_ndjson(rows, cli),
        "csv" => write_csv(
            rows.iter().map(|row| {
                vec![
                    row.domain.clone(),
                    row.known_tld.to_string(),
                    row.disposable.to_string(),
                ]
            }),
            &["domain", "known_tld", "disposable"],
            cli,
        ),
        other => bail!("unknown --format '{other}', use: human|json|ndjson|csv"),
    }
}

fn write_verdicts_human(rows: &[VerdictRow]) {
    for row in rows {
        let result = &row.result;
        let tag = if result.is_valid { "[OK]     " } else { "[INVALID]" };
        println!(
            "{tag} {} :: confidence {:.2} ({}/{} exchangers working, {})",
            row.domain,
            result.confidence,
            result.working_exchangers,
            result.total_exchangers,
            result.transport
        );
        for mx in &result.exchangers {
            println!(
                "        mx {:>5} {} {} rbl={:.2} [{}]",
                mx.priority,
                mx.host,
                if mx.connected { "connected" } else { "unreachable" },
                mx.rbl_score,
                join_ips(&mx.ips, ", ")
            );
            for finding in &mx.blacklisted_details {
                println!("              listed: {} on {}", finding.ip, finding.provider);
            }
            if !mx.connected {
                let last_error = mx
                    .session_log
                    .iter()
                    .rev()
                    .find(|entry| entry.step == LogStep::Error);
                if let Some(entry) = last_error {
                    println!("              error: {}", entry.data);
                }
            }
        }
    }
}

const VERDICT_HEADER: &[&str] = &[
    "domain",
    "valid",
    "confidence",
    "has_multiple_mx",
    "can_connect",
    "not_blacklisted",
    "total_exchangers",
    "working_exchangers",
    "transport",
    "exchangers",
];

fn verdict_record(row: &VerdictRow) -> Vec<String> {
    let result = &row.result;
    let exchangers = result
        .exchangers
        .iter()
        .map(|mx| {
            format!(
                "{}:{}:{}:{:.3}",
                mx.priority,
                mx.host,
                if mx.connected { "up" } else { "down" },
                mx.rbl_score
            )
        })
        .collect::<Vec<_>>()
        .join(";");

    vec![
        row.domain.clone(),
        result.is_valid.to_string(),
        format!("{:.3}", result.confidence),
        format!("{:.3}", result.factors.has_multiple_mx),
        format!("{:.3}", result.factors.can_connect),
        format!("{:.3}", result.factors.not_blacklisted),
        result.total_exchangers.to_string(),
        result.working_exchangers.to_string(),
        result.transport.to_string(),
        exchangers,
    ]
}

fn join_ips(ips: &[std::net::Ipv4Addr], sep: &str) -> String {
    ips.iter()
        .map(|ip| ip.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

fn write_json<T: Serialize>(rows: &[T], cli: &Cli) -> Result<()> {
    let mut buf = serde_json::to_vec_pretty(rows)?;
    buf.push(b'\n');
    emit(&buf, cli)
}

fn write_ndjson<T: Serialize>(rows: &[T], cli: &Cli) -> Result<()> {
    let mut buf = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut buf, row)?;
        buf.push(b'\n');
    }
    emit(&buf, cli)
}

fn write_csv<I>(records: I, header: &[&str], cli: &Cli) -> Result<()>
where
    I: Iterator<Item = Vec<String>>,
{
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(header)?;
    for record in records {
        wtr.write_record(&record)?;
    }
    let data = wtr.into_inner().context("flush csv")?;
    emit(&data, cli)
}

/// Report bytes go to `--out` when given, stdout otherwise.
fn emit(bytes: &[u8], cli: &Cli) -> Result<()> {
    match &cli.out {
        Some(path) => write_all_atomically(path, bytes),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

fn write_all_atomically(path: &str, bytes: &[u8]) -> Result<()> {
    let tmp = format!("{path}.tmp");
    {
        let mut f = std::fs::File::create(&tmp).with_context(|| format!("create {tmp}"))?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("rename {tmp} -> {path}"))?;
    Ok(())
}
