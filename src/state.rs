use crate::config::Config;
use crate::moodle::MoodleClient;
use crate::router::RuntimeRoute;
use std::sync::Arc;

/// Shared application state
///
/// Built once at startup and read-only afterwards: the route table never
/// changes without a process restart.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub moodle: MoodleClient,
    pub routes: Arc<Vec<Arc<RuntimeRoute>>>,
}
