use crate::config::AppConfig;
use crate::llm::LLMProvider;
use crate::shared::utils::DbPool;
use std::sync::Arc;

pub struct AppState {
    pub config: AppConfig,
    pub conn: DbPool,
    pub llm_provider: Arc<dyn LLMProvider>,
}
