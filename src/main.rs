use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;

use taskboard::{api::ApiHttpApp, config::Config, logging::Logger};

fn main() {
    // Read command-line arguments
    let opt = Opt::parse_args();

    // Load configuration with optional override
    let config = Config::load_yaml_with_opt_override(&opt).expect("Failed to load configuration");

    // Initialize logging, to a file when one is configured
    let logger = config.log.clone().map(Logger::new);
    match &logger {
        Some(logger) => logger.init_env_logger(),
        None => env_logger::init(),
    }

    log::info!("Building API service...");
    let api_service = ApiHttpApp::api_http_service(&config);

    let mut server = Server::new_with_opt_and_conf(Some(opt), config.pingora);

    log::info!("Bootstrapping...");
    server.bootstrap();

    log::info!("Bootstrapped. Adding Services...");
    server.add_service(api_service);
    if let Some(logger) = logger {
        server.add_service(logger);
    }

    log::info!("Listening on {}", config.api.address);
    server.run_forever();
}
