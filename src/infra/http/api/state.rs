use std::sync::Arc;

use crate::application::cursor::CursorSearchService;
use crate::application::ingest::IngestService;
use crate::application::leaderboard::LeaderboardReader;
use crate::application::search::SearchService;

#[derive(Clone)]
pub struct ApiState {
    pub search: Arc<SearchService>,
    pub cursor_search: Arc<CursorSearchService>,
    pub ingest: Arc<IngestService>,
    pub widgets: Arc<LeaderboardReader>,
}
