//! Synthetic ChatGPT export generator for stress testing ctxpack.
//!
//! Usage: cargo run --features gen-test --bin gen_export -- [conversations] [output] [seed]
//! Example: cargo run --features gen-test --bin gen_export -- 20000 heavy_export.json 7

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value, json};
use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Write};

const PROJECTS: &[&str] = &[
    "Ferrite", "Harbor", "Lumen", "Quill", "Atlas", "Nimbus", "Orbit", "Pixel Forge", "Tidewatch",
    "Granary",
];

const LANGUAGES: &[&str] = &["Rust", "Python", "TypeScript", "Go", "Kotlin", "SQL"];

const FRAMEWORKS: &[&str] = &["React", "Django", "FastAPI", "Axum", "Tokio", "Next.js", "Spring"];

const TOOLS: &[&str] = &["Docker", "Kubernetes", "Git", "PostgreSQL", "Redis", "Terraform"];

const CHALLENGES: &[&str] = &[
    "the build is too slow",
    "I'm stuck on a memory leak",
    "struggling with flaky tests",
    "the query keeps timing out",
];

const FILLER: &[&str] = &[
    "Can you explain how lifetimes work?",
    "Write a haiku about autumn.",
    "What is a good name for a cat?",
    "Summarize this article for me.",
    "Мне нужен рецепт борща 🍲",
    "日本語で説明してください",
    "Message with \"quotes\" and ; semicolons",
    "",
];

fn main() -> io::Result<()> {
    let args: Vec<String> = env::args().collect();

    let count: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(10_000);
    let output = args.get(2).map(|s| s.as_str()).unwrap_or("heavy_export.json");
    let seed: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(42);

    println!("🧪 Export Generator");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   Conversations: {}", count);
    println!("   Output:        {}", output);
    println!("   Seed:          {}", seed);
    println!();

    let file = File::create(output)?;
    let mut writer = BufWriter::with_capacity(1024 * 1024, file);
    let mut rng = StdRng::seed_from_u64(seed);

    let start = std::time::Instant::now();
    let mut bytes_written: usize = 0;

    writeln!(writer, "[")?;
    for i in 0..count {
        let conversation = generate_conversation(&mut rng, i);
        let line = serde_json::to_string(&conversation)?;
        let comma = if i + 1 < count { "," } else { "" };
        writeln!(writer, "  {}{}", line, comma)?;
        bytes_written += line.len() + comma.len() + 3;

        if (i + 1) % 1000 == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            eprint!(
                "\r   Generated {}/{} ({:.1} MB, {:.0} conv/s)",
                i + 1,
                count,
                bytes_written as f64 / 1_000_000.0,
                (i + 1) as f64 / elapsed
            );
        }
    }
    writeln!(writer, "]")?;
    writer.flush()?;

    let elapsed = start.elapsed();
    println!("\n\n✅ Done!");
    println!("   Size: {:.2} MB", bytes_written as f64 / 1_000_000.0);
    println!("   Time: {:.2}s", elapsed.as_secs_f64());
    Ok(())
}

/// One conversation in the current `mapping` layout.
fn generate_conversation(rng: &mut StdRng, index: usize) -> Value {
    let created = 1_700_000_000 + (index as i64) * 3_600 + rng.gen_range(0..3_600);
    let turns = rng.gen_range(1..=6);
    let project = (index % 3 != 0).then(|| *PROJECTS.choose(rng).unwrap_or(&"Ferrite"));

    let title = match project {
        Some(name) if rng.gen_bool(0.5) => name.to_string(),
        Some(name) => format!("{} help", name),
        None => format!("Chat {}", index),
    };

    let mut mapping = Map::new();
    mapping.insert(
        "root".to_string(),
        json!({"id": "root", "parent": null, "children": ["n0"], "message": null}),
    );
    let nodes = turns * 2;
    for n in 0..nodes {
        let (role, text) = if n % 2 == 0 {
            ("user", user_text(rng, project, n == 0))
        } else {
            ("assistant", "Here is a detailed answer with code examples.".to_string())
        };
        let parent = if n == 0 { "root".to_string() } else { format!("n{}", n - 1) };
        let children: Vec<String> = if n + 1 < nodes { vec![format!("n{}", n + 1)] } else { Vec::new() };
        mapping.insert(
            format!("n{n}"),
            json!({
                "id": format!("n{n}"),
                "parent": parent,
                "children": children,
                "message": {
                    "author": {"role": role},
                    "content": {"content_type": "text", "parts": [text]},
                    "create_time": created + (n as i64) * 30,
                }
            }),
        );
    }

    json!({
        "id": format!("conv-{index:06}"),
        "title": title,
        "create_time": created,
        "update_time": created + (nodes as i64) * 30,
        "mapping": mapping,
    })
}

fn user_text(rng: &mut StdRng, project: Option<&str>, opening: bool) -> String {
    let Some(name) = project else {
        return (*FILLER.choose(rng).unwrap_or(&"")).to_string();
    };
    let language = LANGUAGES.choose(rng).unwrap_or(&"Rust");
    let framework = FRAMEWORKS.choose(rng).unwrap_or(&"Axum");
    let tool = TOOLS.choose(rng).unwrap_or(&"Docker");
    if opening {
        format!("I'm building {name}, a {language} service using {framework} and {tool}.")
    } else {
        let challenge = CHALLENGES.choose(rng).unwrap_or(&"");
        format!("Back to {name}: {challenge}. I prefer {tool} for this.")
    }
}
