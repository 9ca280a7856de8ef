// The binary uses the library, not duplicate modules
use route_atlas::app::{logging, settings::Settings};

fn main() -> std::process::ExitCode {
    let settings = Settings::from_cli();
    logging::setup_logging();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };

    match rt.block_on(route_atlas::run(settings)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::ExitCode::FAILURE
        }
    }
}
