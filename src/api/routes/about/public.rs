//! Public types for the about API
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct AboutResponse {
    pub title: String,
    pub subtitle: String,
    pub topics: Vec<String>,
    pub based_on: String,
    pub disclaimer: String,
    pub how_to_use: Vec<String>,
}
