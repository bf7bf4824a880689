use std::sync::Arc;

use application::ConnectionLifecycleController;
use domain::{MessageStore, RoomDirectory};

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ConnectionLifecycleController>,
    pub rooms: Arc<dyn RoomDirectory>,
    pub messages: Arc<dyn MessageStore>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        controller: Arc<ConnectionLifecycleController>,
        rooms: Arc<dyn RoomDirectory>,
        messages: Arc<dyn MessageStore>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            controller,
            rooms,
            messages,
            jwt_service,
        }
    }
}
