use mns_queue_cli::run_cli;

#[tokio::main]
async fn main() {
    // Errors go to stderr directly: logging may not be initialized yet
    if let Err(e) = run_cli().await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
