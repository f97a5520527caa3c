// Export route modules
pub mod agent;
pub mod teams;
pub mod voice;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(agent::routes(state.clone()))
        .merge(teams::routes(state.clone()))
        .merge(voice::routes(state))
}
