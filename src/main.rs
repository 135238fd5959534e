use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::info;

use pow_ledger::api::{self, AppState};
use pow_ledger::config::Settings;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let settings = Settings::from_env();
    let Settings { host, port, chain } = settings;

    info!(
        "starting ledger API at http://{host}:{port} (initial difficulty {}, adjust every {} blocks)",
        chain.initial_difficulty, chain.adjustment_interval
    );

    let state = web::Data::new(AppState::new(chain));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
