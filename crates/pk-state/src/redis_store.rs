//! Distributed Conversation State Store backed by Redis (§4.3). Each
//! conversation maps to three keys — a state header, a message list, and
//! a summary list — so `MessageReader`/`MessageAppender` can use Redis's
//! native list primitives (`LRANGE`/`RPUSH`) for O(1) tail reads and
//! appends instead of a full load-modify-save round trip. TTL is a
//! store-wide option, refreshed on every write.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use pk_domain::{ConversationState, Error, Message, Result, Summary};

use crate::traits::{ConversationStore, MessageAppender, MessageReader, SummaryAccessor};

/// The fields of [`ConversationState`] that aren't the message/summary
/// lists or the version counter — stored as one JSON blob under the
/// header key. `version` lives under its own key so `append_messages`
/// can bump it with an atomic `INCR` instead of a load-then-set
/// round trip that would lose increments under concurrent appenders.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Header {
    user_id: Option<String>,
    system_prompt: Option<String>,
    token_count: u64,
    last_accessed_ms: u64,
    metadata: std::collections::HashMap<String, serde_json::Value>,
}

impl Header {
    fn from_state(state: &ConversationState) -> Self {
        Self {
            user_id: state.user_id.clone(),
            system_prompt: state.system_prompt.clone(),
            token_count: state.token_count,
            last_accessed_ms: state.last_accessed_ms,
            metadata: state.metadata.clone(),
        }
    }
}

pub struct RedisStore {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

fn header_key(id: &str) -> String {
    format!("pk:conv:{id}:header")
}

fn messages_key(id: &str) -> String {
    format!("pk:conv:{id}:messages")
}

fn summaries_key(id: &str) -> String {
    format!("pk:conv:{id}:summaries")
}

fn version_key(id: &str) -> String {
    format!("pk:conv:{id}:version")
}

/// Default TTL for a conversation's Redis keys, refreshed on every write.
pub const DEFAULT_TTL_SECONDS: u64 = 24 * 60 * 60;

impl RedisStore {
    pub async fn connect(redis_url: &str, ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::RuntimeInternal(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::RuntimeInternal(format!("redis connect failed: {e}")))?;
        Ok(Self { conn, ttl_seconds })
    }

    pub fn from_connection(conn: ConnectionManager, ttl_seconds: u64) -> Self {
        Self { conn, ttl_seconds }
    }

    async fn refresh_ttl(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let ttl = self.ttl_seconds as i64;
        let _: () = redis::pipe()
            .expire(header_key(id), ttl)
            .expire(messages_key(id), ttl)
            .expire(summaries_key(id), ttl)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn load_header(&self, id: &str) -> Result<Option<Header>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(header_key(id)).await.map_err(redis_err)?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn load_version(&self, id: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let version: Option<u64> = conn.get(version_key(id)).await.map_err(redis_err)?;
        Ok(version.unwrap_or(0))
    }

    async fn load_message_list(&self, id: &str) -> Result<Vec<Message>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(messages_key(id), 0, -1).await.map_err(redis_err)?;
        raw.iter()
            .map(|s| serde_json::from_str(s).map_err(Error::from))
            .collect()
    }

    async fn load_summary_list(&self, id: &str) -> Result<Vec<Summary>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(summaries_key(id), 0, -1).await.map_err(redis_err)?;
        raw.iter()
            .map(|s| serde_json::from_str(s).map_err(Error::from))
            .collect()
    }
}

fn redis_err(e: redis::RedisError) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::RuntimeInternal(format!("redis: {e}"))
    }
}

#[async_trait]
impl ConversationStore for RedisStore {
    async fn load(&self, id: &str) -> Result<ConversationState> {
        let header = self
            .load_header(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("conversation '{id}' not found")))?;
        let messages = self.load_message_list(id).await?;
        let summaries = self.load_summary_list(id).await?;
        let version = self.load_version(id).await?;
        Ok(ConversationState {
            id: id.to_string(),
            user_id: header.user_id,
            messages,
            system_prompt: header.system_prompt,
            summaries,
            token_count: header.token_count,
            last_accessed_ms: header.last_accessed_ms,
            metadata: header.metadata,
            version,
        })
    }

    async fn save(&self, state: &ConversationState, expected_version: Option<u64>) -> Result<()> {
        if let Some(expected) = expected_version {
            let found = self.load_version(&state.id).await?;
            if found != expected {
                return Err(Error::VersionMismatch {
                    id: state.id.clone(),
                    expected,
                    found,
                });
            }
        }

        let header = Header::from_state(state);
        let header_json = serde_json::to_string(&header)?;
        let message_jsons: Vec<String> = state
            .messages
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<_, _>>()?;
        let summary_jsons: Vec<String> = state
            .summaries
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<_, _>>()?;

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.set(header_key(&state.id), header_json)
            .set(version_key(&state.id), state.version)
            .del(messages_key(&state.id))
            .del(summaries_key(&state.id));
        if !message_jsons.is_empty() {
            pipe.rpush(messages_key(&state.id), message_jsons);
        }
        if !summary_jsons.is_empty() {
            pipe.rpush(summaries_key(&state.id), summary_jsons);
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(redis_err)?;
        self.refresh_ttl(&state.id).await
    }

    async fn fork(&self, source_id: &str, new_id: &str) -> Result<()> {
        if self.load_header(new_id).await?.is_some() {
            return Err(Error::InvalidRequest(format!(
                "conversation '{new_id}' already exists"
            )));
        }
        let source = self.load(source_id).await?;
        let forked = source.fork(new_id);
        self.save(&forked, None).await
    }

    fn as_message_reader(&self) -> Option<&dyn MessageReader> {
        Some(self)
    }

    fn as_message_appender(&self) -> Option<&dyn MessageAppender> {
        Some(self)
    }

    fn as_summary_accessor(&self) -> Option<&dyn SummaryAccessor> {
        Some(self)
    }
}

#[async_trait]
impl MessageReader for RedisStore {
    async fn load_recent_messages(&self, id: &str, n: usize) -> Result<Vec<Message>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let start = -(n as isize);
        let raw: Vec<String> = conn
            .lrange(messages_key(id), start, -1)
            .await
            .map_err(redis_err)?;
        raw.iter()
            .map(|s| serde_json::from_str(s).map_err(Error::from))
            .collect()
    }

    async fn message_count(&self, id: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(messages_key(id)).await.map_err(redis_err)?;
        Ok(len)
    }
}

#[async_trait]
impl MessageAppender for RedisStore {
    /// List-push semantics: `RPUSH` is atomic against concurrent appenders
    /// on the same key, satisfying the race policy for append without the
    /// in-process per-id lock the pipeline falls back to for `Save`-only
    /// backends. The version bump uses `INCR` on its own key rather than a
    /// load-then-set of the header, so two appenders racing on the same
    /// conversation id both land (no lost increment) the way their two
    /// `RPUSH`es both land.
    async fn append_messages(&self, id: &str, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let jsons: Vec<String> = messages
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<_, _>>()?;

        let mut conn = self.conn.clone();
        // Ensure the header exists so a pure-append conversation (no
        // `save` ever called) still reads back as a valid state.
        if self.load_header(id).await?.is_none() {
            let header = Header {
                user_id: None,
                system_prompt: None,
                token_count: 0,
                last_accessed_ms: 0,
                metadata: std::collections::HashMap::new(),
            };
            let _: () = conn
                .set(header_key(id), serde_json::to_string(&header)?)
                .await
                .map_err(redis_err)?;
        }
        let _: u64 = conn.incr(version_key(id), 1u64).await.map_err(redis_err)?;

        let _: () = conn.rpush(messages_key(id), jsons).await.map_err(redis_err)?;
        self.refresh_ttl(id).await
    }
}

#[async_trait]
impl SummaryAccessor for RedisStore {
    async fn load_summaries(&self, id: &str) -> Result<Vec<Summary>> {
        self.load_summary_list(id).await
    }

    async fn save_summary(&self, id: &str, summary: Summary) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&summary)?;
        let _: () = conn.rpush(summaries_key(id), json).await.map_err(redis_err)?;
        self.refresh_ttl(id).await
    }
}
