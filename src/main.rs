use simulation::simulate_line;
use tracing::error;
pub mod simulation;

fn main() -> std::io::Result<()> {
    if let Err(e) = weave_node::logging::init() {
        eprintln!("logging unavailable: {e}");
    }
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main());
    Ok(())
}

async fn async_main() {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            MESHWEAVE IN-MEMORY SIMULATION                  ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    for (nodes, messages, increments) in [(3, 50, 5), (5, 200, 10), (10, 500, 25)] {
        match simulate_line(nodes, messages, increments).await {
            Ok(stats) => stats.print(),
            Err(e) => {
                error!(error = %e, nodes, "simulation failed");
                return;
            }
        }
    }

    println!("\n✓ All simulations completed!");
}
