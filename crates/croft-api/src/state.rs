use std::sync::Arc;

use croft_db::Database;
use croft_gateway::dispatcher::Dispatcher;

use crate::voice::VoiceStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub voice: VoiceStore,
}
