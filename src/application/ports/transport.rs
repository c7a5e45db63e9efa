use crate::domain::sync::{SubmissionRequest, SubmissionResponse, TransportError, WireRecord};
use crate::domain::value_objects::{EntityKind, SessionContext};
use async_trait::async_trait;

/// サーバーとの通信。HTTP の詳細や認証ヘッダーは実装側の責務
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn submit(
        &self,
        request: SubmissionRequest,
    ) -> Result<SubmissionResponse, TransportError>;

    /// 指定種別の有効なレコードを全件取得する
    async fn fetch(
        &self,
        kind: EntityKind,
        context: &SessionContext,
    ) -> Result<Vec<WireRecord>, TransportError>;
}
