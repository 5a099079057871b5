use std::sync::Arc;

use crate::messages::MessageService;
use crate::users::UserService;

pub type AppState = Arc<AppStateInner>;

/// Services shared by all handlers, built once at startup.
pub struct AppStateInner {
    pub users: UserService,
    pub messages: MessageService,
}
