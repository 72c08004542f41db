use anyhow::Result;
use env_logger::Env;
use std::env;
use std::path::Path;

use hospital_linkage::{run, ReportConfig, VERSION};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.iter().skip(1).any(|a| a == "-h" || a == "--help") {
        print_usage();
        return Ok(());
    }
    if args.len() > 2 {
        print_usage();
        anyhow::bail!("expected at most one argument, got {}", args.len() - 1);
    }

    // Optional JSON config; defaults reproduce the NC report
    let config = ReportConfig::load_or_default(args.get(1).map(Path::new))?;

    println!("🏥 Hospital Linkage v{} - state {}", VERSION, config.state);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let summary = run(&config)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for line in summary.summary().lines() {
        println!("✓ {}", line);
    }
    for conflict in &summary.link.conflicts {
        println!(
            "⚠️  {:?}: kept {:?}, discarded {:?}",
            conflict.financial_name, conflict.kept, conflict.discarded
        );
    }
    println!("\n📄 Bridge:  {}", config.bridge_output.display());
    println!("📊 Charts:  {}", config.figures_dir.display());
    println!("🗺️  Map:     {}", config.map_output.display());

    Ok(())
}

fn print_usage() {
    println!("Usage: hospital-report [config.json]");
    println!();
    println!("Links facility names to financial disclosure names, writes the");
    println!("bridge table, per-hospital charts and the facility map.");
}
