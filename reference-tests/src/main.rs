//! Reference test binary entry point.
//!
//! Runs every validation scenario against the diffuse-particle engine and
//! exits nonzero if any fails.

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    tracing::info!("Diffuse-Particle Reference Suite");
    tracing::info!("================================");

    let results = reference_tests::run_all();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;

    println!("\n{}", "=".repeat(72));
    for result in &results {
        match &result.message {
            None => println!("PASS  {}", result.name),
            Some(message) => println!("FAIL  {} -- {message}", result.name),
        }
    }
    println!("{}", "=".repeat(72));
    println!("{} scenarios, {passed} passed, {failed} failed", results.len());

    if failed > 0 {
        std::process::exit(1);
    }
}
