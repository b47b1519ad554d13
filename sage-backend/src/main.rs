use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

use sage_backend::config::Config;
use sage_backend::controllers;
use sage_backend::tools::{self, load_toolkits};
use sage_backend::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;
    log::info!("Loaded configuration: {:?}", config);

    log::info!("Loading toolkits from {:?}", config.config_dir);
    let toolkits = match load_toolkits(&config.config_dir) {
        Ok(toolkits) => Arc::new(toolkits.clone()),
        Err(e) => {
            log::error!("Failed to load toolkits: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e));
        }
    };
    log::info!("Loaded {} toolkits", toolkits.toolkits().len());

    log::info!("Initializing tool registry");
    let tool_registry = Arc::new(tools::create_default_registry(config.tool_context()));
    log::info!("Registered {} tools", tool_registry.list().len());

    let state = match AppState::new(config, tool_registry, toolkits) {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            log::error!("Failed to initialize model client: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    log::info!("Starting Sage server on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::query::config)
            .configure(controllers::dag::config)
            .configure(controllers::tools::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
