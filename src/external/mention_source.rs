use crate::models::RawMention;
use async_trait::async_trait;

/// Content-collection collaborator. Implementations aggregate whatever
/// providers they talk to (news feeds, social search, transcripts) and
/// must tolerate partial provider failure: return the subset that
/// succeeded, never an error.
#[async_trait]
pub trait MentionSource: Send + Sync {
    async fn fetch_mentions(&self, symbol: &str, company_name: &str) -> Vec<RawMention>;
}
