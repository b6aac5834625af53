//! Simulate command implementation.
//!
//! Builds synthetic parsed NMON files for a set of hosts, runs the configured
//! post processors over them and consolidates them per host.
//!
//! The generated files exercise the consolidation paths: consecutive files
//! overlap by a quarter of their span, later files add a network interface
//! and an `errors` field, the same `java` process appears in every file with
//! a different start time, and pid 300 is reused within each file.

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use perfdata_consolidator::config::Config;
use perfdata_consolidator::model::format_time;
use perfdata_consolidator::transform::{post_processors_from_config, run_post_processors};
use perfdata_consolidator::{
    DataError, DataSet, DataType, HostRegistry, MergeReport, Process, ScaleTransform, TransformChain,
};

use crate::cli::OutputFormat;

/// 2024-01-01T00:00:00Z
const BASE_TIME_MS: i64 = 1_704_067_200_000;
const MEM_TOTAL_KB: f64 = 16.0 * 1024.0 * 1024.0;

/// Parameters of one simulation run.
#[derive(Debug, Clone, Copy)]
pub struct SimulateOptions {
    pub hosts: usize,
    pub files: usize,
    pub records: usize,
    pub interval_secs: u64,
    pub seed: Option<u64>,
}

/// Consolidation summary for one host.
#[derive(Debug, Clone, Serialize)]
pub struct HostSummary {
    pub hostname: String,
    pub source_files: usize,
    pub records: usize,
    pub types: usize,
    pub processes: usize,
    pub start: Option<String>,
    pub end: Option<String>,
    pub merge: MergeReport,
}

pub fn command_simulate(options: SimulateOptions, format: OutputFormat, config: &Config) -> anyhow::Result<()> {
    let summaries = simulate(options, config)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        OutputFormat::Text => print_summaries(&summaries),
    }
    Ok(())
}

/// Generates, post-processes and consolidates the synthetic files.
pub fn simulate(options: SimulateOptions, config: &Config) -> anyhow::Result<Vec<HostSummary>> {
    let seed = options.seed.unwrap_or_else(|| rand::thread_rng().gen());
    debug!(
        "Simulating {} hosts x {} files x {} records, seed {}",
        options.hosts, options.files, options.records, seed
    );

    let per_host: Vec<Vec<(String, DataSet)>> = (0..options.hosts)
        .into_par_iter()
        .map(|host| generate_host(host, seed, &options, config))
        .collect::<Result<_, _>>()
        .context("Failed to generate synthetic files")?;

    let mut registry = HostRegistry::with_config(config.merge.clone());
    let mut reports: Vec<(String, MergeReport)> = Vec::new();
    for files in per_host {
        for (path, data) in files {
            let report = registry
                .add_file(path.as_str(), &data)
                .with_context(|| format!("Failed to consolidate {path}"))?;
            match reports.iter_mut().find(|(h, _)| h == data.hostname()) {
                Some((_, total)) => total.absorb(&report),
                None => reports.push((data.hostname().to_string(), report)),
            }
        }
    }
    info!("Consolidated {} hosts", registry.len());

    let summaries = registry
        .hosts()
        .map(|system| HostSummary {
            hostname: system.hostname().to_string(),
            source_files: system.source_file_count(),
            records: system.record_count(),
            types: system.type_count(),
            processes: system.process_count(),
            start: system.start_time().map(format_time),
            end: system.end_time().map(format_time),
            merge: reports
                .iter()
                .find(|(h, _)| h == system.hostname())
                .map(|(_, r)| r.clone())
                .unwrap_or_default(),
        })
        .collect();
    Ok(summaries)
}

fn generate_host(
    host: usize,
    seed: u64,
    options: &SimulateOptions,
    config: &Config,
) -> Result<Vec<(String, DataSet)>, DataError> {
    let hostname = format!("host{host:02}");
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(host as u64));
    let processors = post_processors_from_config(&config.post_processing);
    let mut chain = TransformChain::new();
    chain.push(ScaleTransform::new("MEM", 1.0 / 1024.0));

    let interval_ms = options.interval_secs.max(1) as i64 * 1000;
    let span = options.records as i64 * interval_ms;
    let mut files = Vec::with_capacity(options.files);
    for index in 0..options.files {
        let start = BASE_TIME_MS + index as i64 * (span - span / 4);
        let mut data = generate_file(&mut rng, &hostname, index, start, options.records, interval_ms)?;
        chain.apply_to(&mut data);
        run_post_processors(&processors, &mut data)?;
        files.push((format!("{hostname}_{index:03}.nmon"), data));
    }
    debug!("Generated {} files for {}", files.len(), hostname);
    Ok(files)
}

fn generate_file(
    rng: &mut StdRng,
    hostname: &str,
    index: usize,
    start: i64,
    records: usize,
    interval_ms: i64,
) -> Result<DataSet, DataError> {
    let mut data = DataSet::nmon(hostname)?;
    data.set_metadata("AAA,progname", "topas_nmon");
    data.set_metadata("AAA,host", hostname);
    data.set_metadata("AAA,snapshots", records.to_string());
    data.set_system_info("BBBP,uname", format!("AIX {hostname} 3 7"));

    let cpu = data.add_type(DataType::new(
        "CPU_ALL",
        "CPU Total",
        ["User%", "Sys%", "Wait%", "Idle%"],
    )?)?;
    let mem = data.add_type(DataType::new("MEM", "Memory MB", ["memtotal", "memfree"])?)?;

    // Interfaces and fields grow over the host's lifetime.
    let mut net_fields = vec!["read-KB/s", "write-KB/s"];
    if index >= 2 {
        net_fields.push("errors");
    }
    let interfaces = if index == 0 { 1 } else { 2 };
    let mut nets = Vec::with_capacity(interfaces);
    for i in 0..interfaces {
        let name = format!("eth{i}");
        nets.push(data.add_type(DataType::sub("NET", name.as_str(), name.as_str(), net_fields.clone())?)?);
    }
    let mut disks = Vec::with_capacity(2);
    for name in ["hdisk0", "hdisk1"] {
        disks.push(data.add_type(DataType::sub("DISKBUSY", name, name, ["busy%"])?)?);
    }

    let end = start + (records.max(1) as i64 - 1) * interval_ms;
    let middle = start + (records as i64 / 2) * interval_ms;
    let mut processes = Vec::new();
    for (pid, name, begin) in [
        (100, "java", start),
        (200, "httpd", start),
        (201, "httpd", start),
        (300, "cron", start),
        (300, "backup", middle),
    ] {
        let mut process = Process::new(pid, name, begin)?;
        process.set_command_line(format!("/usr/bin/{name}"));
        let key = data.add_process(process.clone())?;
        let ty = data.add_type(DataType::for_process(&process, ["%CPU", "%Usr", "ResText"])?)?;
        processes.push((key, ty));
    }

    for r in 0..records {
        let time = start + r as i64 * interval_ms;
        let timestamp = format!("T{:04}", r + 1);

        let user = rng.gen_range(5.0..60.0);
        let sys = rng.gen_range(1.0..20.0);
        let wait = rng.gen_range(0.0..5.0);
        data.add_values(time, &timestamp, cpu.id(), vec![user, sys, wait, 100.0 - user - sys - wait])?;
        data.add_values(
            time,
            &timestamp,
            mem.id(),
            vec![MEM_TOTAL_KB, rng.gen_range(0.1..0.5) * MEM_TOTAL_KB],
        )?;
        for net in &nets {
            let mut values = vec![rng.gen_range(0.0..5000.0), rng.gen_range(0.0..2000.0)];
            if net.field_count() > 2 {
                values.push(f64::from(rng.gen_range(0u8..3)));
            }
            data.add_values(time, &timestamp, net.id(), values)?;
        }
        for disk in &disks {
            data.add_values(time, &timestamp, disk.id(), vec![rng.gen_range(0.0..100.0)])?;
        }

        for (key, ty) in &processes {
            let Some(process) = data.process(key) else {
                continue;
            };
            let alive = match process.name() {
                "cron" => time < middle,
                _ => time >= process.start_time(),
            };
            if !alive {
                continue;
            }
            // The second httpd worker idles.
            let values = if process.pid() == 201 {
                vec![0.0, 0.0, 0.0]
            } else {
                let cpu = rng.gen_range(0.0..25.0);
                vec![cpu, cpu * 0.8, rng.gen_range(1000.0..50_000.0)]
            };
            data.add_values(time, &timestamp, ty.id(), values)?;
        }
    }

    for (key, _) in &processes {
        let process_end = match data.process(key).map(Process::name) {
            Some("cron") => middle - interval_ms,
            _ => end,
        };
        if let Some(process) = data.process(key) {
            let process_end = process_end.max(process.start_time());
            data.update_process(key, None, Some(process_end))?;
        }
    }
    Ok(data)
}

fn print_summaries(summaries: &[HostSummary]) {
    println!("📊 Consolidation summary");
    println!("========================");
    for s in summaries {
        println!("\n🖥️  {}", s.hostname);
        println!("   Source files:  {}", s.source_files);
        println!("   Records:       {}", s.records);
        println!("   Types:         {}", s.types);
        println!("   Processes:     {}", s.processes);
        if let (Some(start), Some(end)) = (&s.start, &s.end) {
            println!("   Time range:    {start} - {end}");
        }
        println!(
            "   Merge:         {} types added, {} reconciled, {} processes unified, {} collisions",
            s.merge.types_added, s.merge.types_reconciled, s.merge.processes_unified, s.merge.collisions
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SimulateOptions {
        SimulateOptions {
            hosts: 2,
            files: 3,
            records: 8,
            interval_secs: 60,
            seed: Some(7),
        }
    }

    #[test]
    fn test_simulation_consolidates_every_host() {
        let summaries = simulate(options(), &Config::default()).unwrap();
        assert_eq!(summaries.len(), 2);
        for s in &summaries {
            assert_eq!(s.source_files, 3);
            // 8 records per file, each later file overlapping the last 2.
            assert_eq!(s.records, 8 + 6 + 6);
            assert!(s.merge.collisions > 0);
            assert!(s.merge.types_reconciled > 0);
            assert!(s.merge.processes_unified > 0);
        }
    }

    #[test]
    fn test_same_seed_same_result() {
        let a = simulate(options(), &Config::default()).unwrap();
        let b = simulate(options(), &Config::default()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_generated_file_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let data = generate_file(&mut rng, "h1", 2, BASE_TIME_MS, 4, 60_000).unwrap();
        assert_eq!(data.record_count(), 4);
        assert_eq!(data.process_count(), 5);
        assert_eq!(data.processes_named("httpd").count(), 2);
        let backup = data.find_process("backup", 300).unwrap();
        assert_eq!(backup.start_time(), BASE_TIME_MS + 2 * 60_000);
        let cron = data.find_process("cron", 300).unwrap();
        assert_eq!(cron.end_time(), BASE_TIME_MS + 60_000);
        assert_eq!(data.metadata_value("AAA,host"), Some("h1"));
    }
}
