use std::env;
use std::process;

use domain::adapters::memory::{InMemoryBlobStore, InMemoryBroker, InMemoryObjectStore};
use domain::service::{run_all, DemoSettings};
use domain::ResourceName;

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  domain [--runs <n>]\n\nNotes:\n  - Runs the three demos against in-memory emulators; nothing is persisted across runs.\n  - Repeating the run inside one process exercises idempotent provisioning.",
        domain::about()
    );
}

fn run() -> Result<(), String> {
    let mut runs = 1usize;
    let rest: Vec<String> = env::args().skip(1).collect();
    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--runs" => {
                if i + 1 >= rest.len() {
                    return Err("--runs requires a value".into());
                }
                runs = match rest[i + 1].parse() {
                    Ok(n) if n > 0 => n,
                    _ => return Err(format!("invalid --runs value: {}", rest[i + 1])),
                };
                i += 2;
            }
            "-h" | "--help" => {
                print_usage();
                return Ok(());
            }
            unk => return Err(format!("unknown argument: {}", unk)),
        }
    }

    let name = |s: &str| ResourceName::new(s).map_err(|e| e.to_string());
    let settings = DemoSettings::new(
        name("demo-bucket")?,
        name("demo")?,
        name("demo-topic")?,
        name("demo-sub")?,
    );

    let objects = InMemoryObjectStore::new();
    let blobs = InMemoryBlobStore::new();
    let broker = InMemoryBroker::new();

    for _ in 0..runs {
        run_all(&objects, &blobs, &broker, &broker, &settings, |report| {
            println!("{}", report.status_line())
        })
        .map_err(|e| format!("demo failed: {}", e))?;
    }
    println!("All three emulators OK.");
    Ok(())
}

fn main() {
    if let Err(msg) = run() {
        eprintln!("error: {}", msg);
        process::exit(1);
    }
}
