//! AgentContext - コンポーネントに注入する capability の束
//!
//! グローバルなクライアントは持たず、`AgentBuilder` が組み立てたものを
//! 各コンポーネントが clone して保持します（中身は `Arc` なので安価）。

use std::sync::Arc;

use tracing::{Span, info_span};

use crate::domain::RunId;
use crate::ports::{AssetSource, Clock, RecordStore, SocialClient};

#[derive(Clone)]
pub struct AgentContext {
    /// Account name, carried on every span as `account`.
    pub account: Arc<str>,
    pub store: Arc<dyn RecordStore>,
    pub assets: Arc<dyn AssetSource>,
    pub social: Arc<dyn SocialClient>,
    pub clock: Arc<dyn Clock>,
}

impl AgentContext {
    /// Span for one component invocation.
    pub fn span(&self, component: &'static str, run_id: RunId) -> Span {
        info_span!("run", component, account = %self.account, run_id = %run_id)
    }
}
