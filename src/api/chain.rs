use actix_web::{HttpResponse, Responder, get, post, web};
use log::{debug, info, warn};

use super::models::{
    AddBlockResponse, AppState, ChainResponse, DifficultyResponse, ImportResponse, MineRequest,
    MineResponse, ValidateResponse,
};
use crate::blockchain::{Block, BlockRecord, Chain};

/// Get the full chain in its export layout.
#[get("/chain/")]
pub async fn get_chain(state: web::Data<AppState>) -> impl Responder {
    let chain = state.chain.lock().expect("mutex poisoned");
    let resp = ChainResponse {
        length: chain.len(),
        difficulty: chain.current_difficulty(),
        chain: chain.blocks().iter().map(BlockRecord::from).collect(),
    };
    HttpResponse::Ok().json(resp)
}

/// Validate the whole chain.
#[get("/validate/")]
pub async fn validate_chain(state: web::Data<AppState>) -> impl Responder {
    let chain = state.chain.lock().expect("mutex poisoned");
    let resp = ValidateResponse {
        valid: Chain::is_valid(&chain),
        length: chain.len(),
        difficulty: chain.current_difficulty(),
    };
    HttpResponse::Ok().json(resp)
}

/// Mine a new block carrying `data`. The search runs on the blocking pool
/// with the chain locked throughout, so concurrent mines and imports queue
/// behind it without stalling the worker.
#[post("/mine/")]
pub async fn mine_block(state: web::Data<AppState>, req: web::Json<MineRequest>) -> impl Responder {
    let MineRequest { data } = req.into_inner();
    debug!("MINER - request with {} payload bytes", data.as_bytes().len());

    let mined = web::block(move || {
        let mut chain = state.chain.lock().expect("mutex poisoned");
        chain.mine(data)
    })
    .await;

    match mined {
        Ok(Ok(block)) => HttpResponse::Ok().json(MineResponse {
            mined_index: block.index(),
            hash: block.hash_hex(),
            nonce: block.nonce(),
            difficulty: block.difficulty(),
        }),
        Ok(Err(e)) => {
            warn!("MINER - failed: {e}");
            HttpResponse::InternalServerError().body(e.to_string())
        }
        Err(e) => {
            warn!("MINER - blocking task failed: {e}");
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}

/// `difficulty` is the adjusted target (may bottom out at 0);
/// `mining_difficulty` is what the next mined block is sealed with.
#[get("/difficulty/")]
pub async fn get_difficulty(state: web::Data<AppState>) -> impl Responder {
    let chain = state.chain.lock().expect("mutex poisoned");
    HttpResponse::Ok().json(DifficultyResponse {
        difficulty: chain.current_difficulty(),
        mining_difficulty: chain.mining_difficulty(),
    })
}

/// Import a single externally built block.
///
/// A record that can not be built into a block is a 400; a well-formed block
/// that does not extend the tip is answered with `accepted: false`.
#[post("/blocks/")]
pub async fn post_block(
    state: web::Data<AppState>,
    body: web::Json<BlockRecord>,
) -> impl Responder {
    let record = body.into_inner();
    let block = match Block::try_from(&record) {
        Ok(b) => b,
        Err(e) => {
            warn!("POST /blocks/ - rejected record #{}: {e}", record.index);
            return HttpResponse::BadRequest().body(e.to_string());
        }
    };

    let mut chain = state.chain.lock().expect("mutex poisoned");
    let accepted = record.claims_hash_of(&block) && chain.add_block(block);
    if accepted {
        info!("POST /blocks/ - appended block #{}", record.index);
    }
    HttpResponse::Ok().json(AddBlockResponse {
        accepted,
        length: chain.len(),
    })
}

/// Export the chain as a JSON array of block records.
#[get("/export/")]
pub async fn export_chain(state: web::Data<AppState>) -> impl Responder {
    let chain = state.chain.lock().expect("mutex poisoned");
    match chain.to_json() {
        Ok(json) => HttpResponse::Ok()
            .content_type("application/json")
            .body(json),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

/// Import an exported chain block by block onto the current one.
#[post("/import/")]
pub async fn import_chain(state: web::Data<AppState>, body: String) -> impl Responder {
    let mut chain = state.chain.lock().expect("mutex poisoned");
    match chain.load_from_json(&body) {
        Ok(summary) => {
            info!(
                "IMPORT - {} accepted, {} rejected, length now {}",
                summary.accepted,
                summary.rejected,
                chain.len()
            );
            HttpResponse::Ok().json(ImportResponse {
                accepted: summary.accepted,
                rejected: summary.rejected,
                length: chain.len(),
            })
        }
        Err(e) => {
            warn!("IMPORT - malformed export: {e}");
            HttpResponse::BadRequest().body(e.to_string())
        }
    }
}
