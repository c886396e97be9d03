use serde::Serialize;

use super::donation::DonationView;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DrawStateView {
    Idle,
    CountingDown { ticks_remaining: u32 },
    Resolved { winner: DonationView },
}

#[derive(Debug, Clone, Serialize)]
pub struct DrawStatusResponse {
    pub drawing: bool,
    pub state: DrawStateView,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DrawStartedResponse {
    pub draw_id: u64,
    pub ticks: u32,
    pub pool_size: u64,
    pub message: String,
}
