//! # ctxpack CLI
//!
//! Command-line host for the ctxpack library.

use std::process;
use std::time::Instant;

use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use ctxpack::CtxpackError;
use ctxpack::cli::{Args, PREFERENCES_KEY};
use ctxpack::compat::diagnose_path;
use ctxpack::core::filter::{JsonFilePreferenceStore, save_filter_preferences};
use ctxpack::core::output::read_json;
use ctxpack::format::TargetPlatform;
use ctxpack::pipeline::ExportJob;

fn main() {
    let args = <Args as ClapParser>::parse();
    init_tracing(&args);

    if let Err(e) = run(&args) {
        eprintln!("❌ Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> Result<(), CtxpackError> {
    let total_start = Instant::now();
    let target: TargetPlatform = args.target.into();

    println!("📦 ctxpack v{}", env!("CARGO_PKG_VERSION"));
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📂 Input:   {}", args.input.display());
    println!("🎯 Target:  {}", target);
    if args.diagnose_only {
        return print_diagnosis(args);
    }
    println!("💾 Output:  {}", args.output.display());

    let config = args.app_config()?;
    let filter = args.filter_config()?;
    if filter.is_active() {
        println!("🔍 Filter:  {}", describe_filter(&filter));
    }
    if let (true, Some(path)) = (args.save_preferences, &args.preferences) {
        save_filter_preferences(&JsonFilePreferenceStore::new(path), PREFERENCES_KEY, &filter)?;
        println!("📝 Saved filter preferences to {}", path.display());
    }

    let mut job = ExportJob::new(&args.input, target)
        .with_config(config)
        .with_filter(filter);
    if let Some(path) = &args.previous {
        println!("🔁 Previous: {}", path.display());
        job = job.with_previous(read_json(path)?);
    }
    if let Some(size) = args.chunk_size {
        job = job.with_chunk_size(size);
    }
    if args.no_validation {
        job = job.without_validation();
    }
    println!();

    println!("⏳ Processing export...");
    let run_start = Instant::now();
    let outcome = job.run()?;
    println!("   Done in {:.2}s", run_start.elapsed().as_secs_f64());

    println!("💾 Writing artifacts...");
    let written = outcome.write_to_dir(&args.output)?;
    for path in &written {
        println!("   {}", path.display());
    }

    println!();
    println!("✅ Done! Output saved to {}", args.output.display());

    println!();
    println!("📊 Summary:");
    println!("   Export version: {}", outcome.diagnostic.detected_version);
    println!("   Compatibility:  {}", outcome.diagnostic.compatibility_level);
    println!("   Projects:       {}", outcome.pack.projects.len());
    if outcome.filter_summary.removed() > 0 {
        println!("   Filtered out:   {}", outcome.filter_summary.removed());
    }
    if let Some(delta) = &outcome.delta {
        println!("   Changed:        {} projects", delta.projects.len());
    }
    if let Some(omitted) = outcome.bundle.metadata.get("omitted_projects").and_then(|v| v.as_u64()) {
        if omitted > 0 {
            println!("   ⚠️  Omitted:     {} projects (size limit)", omitted);
        }
    }
    if let Some(suite) = &outcome.suite {
        println!("   Validation:     {} questions", suite.len());
    }

    if !outcome.features.is_empty() {
        println!();
        println!("🧩 Features that do not carry over:");
        for feature in &outcome.features {
            println!("   {} ({}x): {}", feature.name, feature.occurrences, feature.workaround);
        }
    }

    if !outcome.bundle.setup_commands.is_empty() {
        println!();
        println!("🚀 Next steps:");
        for command in &outcome.bundle.setup_commands {
            println!("   {}", command);
        }
    }

    println!();
    println!("⚡ Total time: {:.2}s", total_start.elapsed().as_secs_f64());
    Ok(())
}

fn print_diagnosis(args: &Args) -> Result<(), CtxpackError> {
    let diagnostic = diagnose_path(&args.input);
    println!();
    println!("🩺 Diagnosis:");
    println!("   Version:       {}", diagnostic.detected_version);
    println!("   Compatibility: {}", diagnostic.compatibility_level);
    for issue in &diagnostic.issues {
        println!("   ⚠️  {}", issue);
    }
    for suggestion in &diagnostic.suggestions {
        println!("   💡 {}", suggestion);
    }
    if diagnostic.is_supported() {
        Ok(())
    } else {
        Err(CtxpackError::unsupported_format(
            "ChatGPT export",
            diagnostic.issues.join("; "),
        ))
    }
}

fn describe_filter(filter: &ctxpack::core::FilterConfig) -> String {
    let mut parts = Vec::new();
    if !filter.excluded_conversation_ids.is_empty() {
        parts.push(format!("{} conversations excluded", filter.excluded_conversation_ids.len()));
    }
    if !filter.excluded_topics.is_empty() {
        let topics: Vec<&str> = filter.excluded_topics.iter().map(String::as_str).collect();
        parts.push(format!("topics [{}]", topics.join(", ")));
    }
    if let Some(range) = &filter.date_range {
        parts.push(format!(
            "{} to {}",
            range.start.format("%Y-%m-%d"),
            range.end.format("%Y-%m-%d")
        ));
    }
    if filter.min_relevance_score > 0.0 {
        parts.push(format!("relevance >= {:.2}", filter.min_relevance_score));
    }
    parts.join(", ")
}
