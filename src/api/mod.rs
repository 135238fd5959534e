mod chain;
mod health;
mod mining;
pub mod models;
mod stats;

use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(chain::get_chain)
            .service(chain::validate_chain)
            .service(chain::mine_block)
            .service(chain::get_difficulty)
            .service(chain::post_block)
            .service(chain::export_chain)
            .service(chain::import_chain)
            .service(mining::get_template)
            .service(mining::submit_solution)
            .service(stats::get_stats),
    );
}
