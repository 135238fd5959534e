use actix_web::{HttpResponse, Responder, post, web};
use log::{debug, info, warn};
use uuid::Uuid;

use super::models::{
    AppState, MiningTemplate, SubmitRequest, SubmitResponse, TemplateRequest, TemplateResponse,
};
use crate::blockchain::block::now_secs;
use crate::blockchain::model::meets_difficulty;
use crate::blockchain::Block;

/// Produce a template for an external miner, fixing tip, timestamp and difficulty.
#[post("/mining/template/")]
pub async fn get_template(
    state: web::Data<AppState>,
    req: web::Json<TemplateRequest>,
) -> impl Responder {
    let TemplateRequest { data } = req.into_inner();

    let (index, previous_hash, difficulty) = {
        let chain = state.chain.lock().expect("mutex");
        let tip = chain.latest_block();
        (tip.index() + 1, tip.hash_hex(), chain.mining_difficulty())
    };
    let timestamp = now_secs();

    let template_id = Uuid::new_v4().to_string();
    {
        let mut map = state.mining_templates.lock().expect("mutex");
        // templates built on an older tip can never be accepted
        let before = map.len();
        map.retain(|_, t| t.previous_hash == previous_hash);
        if map.len() < before {
            debug!("TEMPLATE evicted {} stale templates", before - map.len());
        }
        map.insert(
            template_id.clone(),
            MiningTemplate {
                template_id: template_id.clone(),
                index,
                previous_hash: previous_hash.clone(),
                timestamp,
                difficulty,
                data: data.clone(),
            },
        );
    }

    debug!("TEMPLATE id={template_id} height={index} diff={difficulty}");

    HttpResponse::Ok().json(TemplateResponse {
        template_id,
        index,
        previous_hash,
        timestamp,
        difficulty,
        data,
    })
}

/// Submit a nonce for a template. The block is rebuilt from the template,
/// its proof-of-work checked, and imported like any external block.
#[post("/mining/submit/")]
pub async fn submit_solution(
    state: web::Data<AppState>,
    req: web::Json<SubmitRequest>,
) -> impl Responder {
    // templates are single use
    let template = {
        let mut map = state.mining_templates.lock().expect("mutex");
        match map.remove(&req.template_id) {
            Some(t) => t,
            None => return HttpResponse::BadRequest().json(SubmitResponse::rejected()),
        }
    };

    let previous_hash = match hex::decode(&template.previous_hash) {
        Ok(h) => h,
        Err(e) => return HttpResponse::InternalServerError().body(e.to_string()),
    };
    let block = match Block::new(
        template.index,
        Some(previous_hash),
        template.timestamp,
        template.data.clone(),
        template.difficulty,
        req.nonce,
    ) {
        Ok(b) => b,
        Err(e) => return HttpResponse::BadRequest().body(e.to_string()),
    };

    if !meets_difficulty(&block.hash(), block.difficulty()) {
        return HttpResponse::BadRequest().body("hash does not meet difficulty");
    }

    let mut chain = state.chain.lock().expect("mutex");
    if chain.latest_block().hash_hex() != template.previous_hash {
        warn!("stale template {}: head moved", template.template_id);
        return HttpResponse::BadRequest().json(SubmitResponse::rejected());
    }
    if !chain.add_block(block.clone()) {
        return HttpResponse::BadRequest().json(SubmitResponse::rejected());
    }

    info!(
        "ACCEPTED template {} -> block#{} hash={} diff={}",
        template.template_id,
        block.index(),
        block.hash_hex(),
        block.difficulty()
    );

    HttpResponse::Ok().json(SubmitResponse {
        accepted: true,
        mined_index: Some(block.index()),
        hash: Some(block.hash_hex()),
        difficulty: Some(block.difficulty()),
    })
}
