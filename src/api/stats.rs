use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, StatsResponse};

#[get("/stats/")]
pub async fn get_stats(state: web::Data<AppState>) -> impl Responder {
    let (blocks, difficulty, config) = {
        let chain = state.chain.lock().expect("mutex poisoned");
        (chain.blocks(), chain.current_difficulty(), chain.config())
    };
    let height = blocks.len();

    let last_interval_secs = match blocks.as_slice() {
        [.., older, newer] => Some(newer.timestamp() - older.timestamp()),
        _ => None,
    };

    // average over the adjustment window ending at the tip
    let window = usize::try_from(config.adjustment_interval).unwrap_or(usize::MAX);
    let avg_interval_secs = if window > 0 && height > window {
        let newer = &blocks[height - 1];
        let older = &blocks[height - 1 - window];
        Some((newer.timestamp() - older.timestamp()) as f64 / window as f64)
    } else {
        None
    };

    HttpResponse::Ok().json(StatsResponse {
        height,
        difficulty,
        target_block_time_secs: config.block_generation_interval,
        adjust_window: config.adjustment_interval,
        last_interval_secs,
        avg_interval_secs,
    })
}
