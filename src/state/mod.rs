use std::sync::Arc;
use std::time::Instant;

use crate::session::RaffleSession;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RaffleSession>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(session: Arc<RaffleSession>) -> Self {
        Self {
            session,
            start_time: Instant::now(),
        }
    }
}
