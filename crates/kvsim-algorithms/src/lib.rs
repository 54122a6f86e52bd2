//! Worker scoring for the kvsim prefix-aware router.
//!
//! This crate provides the [`LoadModel`] trait, the built-in load models and
//! the weighted scoring/selection used by the router:
//!
//! | Load model | Load fraction | Best For |
//! |------------|---------------|----------|
//! | [`ActiveRequests`] | In-flight requests / per-worker capacity | Interactive traffic |
//! | [`TokenShare`] | Tokens processed / busiest worker | Mixed prompt lengths |
//! | [`RequestShare`] | Requests received / busiest worker | Long-run even spread |

pub mod active_requests;
pub mod request_share;
pub mod scoring;
pub mod token_share;
pub mod traits;

pub use active_requests::ActiveRequests;
pub use request_share::RequestShare;
pub use scoring::{overlap_score, score_pool, score_worker, select_best};
pub use token_share::TokenShare;
pub use traits::*;

/// Create a load model by name.
///
/// `max_capacity_per_worker` is only used by models that measure load against
/// a fixed capacity.
pub fn load_model_by_name(name: &str, max_capacity_per_worker: u64) -> Option<Box<dyn LoadModel>> {
    match name {
        "active_requests" => Some(Box::new(ActiveRequests::new(max_capacity_per_worker))),
        "token_share" => Some(Box::new(TokenShare::new())),
        "request_share" => Some(Box::new(RequestShare::new())),
        _ => None,
    }
}

/// List all available built-in load model names.
pub fn available_load_models() -> Vec<&'static str> {
    vec!["active_requests", "token_share", "request_share"]
}
