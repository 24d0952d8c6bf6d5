pub mod db;
pub mod directory;
pub mod error;
pub mod fanout;
pub mod hub;
pub mod membership;
pub mod model;
pub mod rooms;
pub mod session;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::directory::Directory;
use crate::fanout::FanoutEngine;
use crate::hub::RoomHub;
use crate::membership::MembershipCoordinator;

pub use crate::error::{AppError, AppResult};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub directory: Directory,
    pub hub: RoomHub,
    pub fanout: FanoutEngine,
    pub coordinator: MembershipCoordinator,
}

impl AppState {
    pub fn new(db_pool: SqlitePool) -> Self {
        let directory = Directory::new(db_pool);
        let hub = RoomHub::new();
        Self {
            fanout: FanoutEngine::new(directory.clone(), hub.clone()),
            coordinator: MembershipCoordinator::new(directory.clone()),
            directory,
            hub,
        }
    }
}
