//! Router for the about API

use std::sync::{Arc, RwLock};

use axum::{Router, response::Json, routing::get};

use super::public::AboutResponse;
use crate::api::state::AppState;

type SharedState = Arc<RwLock<AppState>>;

const TOPICS: &[&str] = &[
    "Workout routines",
    "Nutrition advice",
    "Weight loss strategies",
    "Muscle building tips",
    "Fitness motivation",
];

const HOW_TO_USE: &[&str] = &[
    "Type your fitness question in the chat box",
    "Get personalized advice based on your goals",
    "Ask follow-up questions for more details",
];

async fn about() -> Json<AboutResponse> {
    Json(AboutResponse {
        title: String::from("💪 Gym Assistant"),
        subtitle: String::from("Your personal fitness coach powered by AI"),
        topics: TOPICS.iter().map(|t| t.to_string()).collect(),
        based_on: String::from(
            "Based on the Fit4Life Academy approach to fitness and health.",
        ),
        disclaimer: String::from(
            "This assistant provides general fitness information and is not a substitute for professional medical advice.",
        ),
        how_to_use: HOW_TO_USE.iter().map(|t| t.to_string()).collect(),
    })
}

/// Create the about router
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(about))
}
