//! Chunked upload-session protocol.
//!
//! One upload session replaces the contents of one dataset table:
//!
//! ```text
//! open ──► Open ──push_chunk*──► Open ──publish──► Publishing ──poll──► Published
//!            └──────────── any failed request ────────────► Failed
//! ```
//!
//! Chunk indices start at 1 and grow by one per accepted chunk. A chunk is
//! never retried: after a failure the session is abandoned server-side.

use std::fmt;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use cube_common::{Cell, DatasetId, Error, ProjectId, Result, Schema, UploadSessionId};

use crate::encode::encode_rows;
use crate::http::HttpSession;
use crate::log_event;
use crate::logging::{event_names, Stage};
use crate::mapping::ColumnMapping;

/// Publish status value the server reports once the data is live.
const PUBLISH_STATUS_COMPLETE: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Open,
    Publishing,
    Published,
    Failed,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadState::Open => write!(f, "open"),
            UploadState::Publishing => write!(f, "publishing"),
            UploadState::Published => write!(f, "published"),
            UploadState::Failed => write!(f, "failed"),
        }
    }
}

/// Bounded publish-status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            attempts: 5,
            interval: Duration::from_secs(2),
        }
    }
}

/// How publish polling ended. Exhausting the budget is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    Complete { attempts: u32 },
    Unknown { attempts: u32 },
}

impl PublishOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, PublishOutcome::Complete { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PublishOutcome::Complete { attempts } | PublishOutcome::Unknown { attempts } => {
                *attempts
            }
        }
    }

    /// Promote an unknown status to [`Error::PublishTimeout`].
    pub fn into_result(self) -> Result<u32> {
        match self {
            PublishOutcome::Complete { attempts } => Ok(attempts),
            PublishOutcome::Unknown { attempts } => Err(Error::PublishTimeout { attempts }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenedSession {
    upload_session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PublishStatus {
    status: Option<i64>,
    message: Option<String>,
}

/// Server-side upload session of one table.
#[derive(Debug)]
pub struct UploadSession {
    id: UploadSessionId,
    project_id: ProjectId,
    dataset_id: DatasetId,
    table_name: String,
    schema: Schema,
    next_index: u64,
    chunks_sent: u64,
    rows_sent: u64,
    state: UploadState,
}

impl UploadSession {
    /// Open a REPLACE session on `table_name`.
    pub fn open(
        http: &mut HttpSession,
        project_id: &ProjectId,
        dataset_id: &DatasetId,
        table_name: &str,
        schema: &Schema,
    ) -> Result<Self> {
        let mapping = ColumnMapping::from_schema(schema);
        let body = json!({
            "tables": [{
                "name": table_name,
                "updatePolicy": "REPLACE",
                "columnHeaders": mapping.column_headers(),
            }]
        });

        let path = format!("/datasets/{}/uploadSessions", dataset_id);
        let response = http.post(&path, Some(project_id), body)?;
        let opened: OpenedSession = response.json()?;
        let id = opened
            .upload_session_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Remote {
                status: response.status,
                message: format!(
                    "upload session for dataset {} opened without an uploadSessionId",
                    dataset_id
                ),
            })?;

        log_event!(
            http.log(),
            INFO,
            event_names::UPLOAD_SESSION_OPENED,
            Stage::Upload,
            "Upload session opened",
            dataset_id = dataset_id.as_str(),
            upload_session_id = id.as_str(),
            table = table_name
        );

        Ok(UploadSession {
            id: UploadSessionId::new(id),
            project_id: project_id.clone(),
            dataset_id: dataset_id.clone(),
            table_name: table_name.to_string(),
            schema: schema.clone(),
            next_index: 1,
            chunks_sent: 0,
            rows_sent: 0,
            state: UploadState::Open,
        })
    }

    pub fn id(&self) -> &UploadSessionId {
        &self.id
    }

    pub fn dataset_id(&self) -> &DatasetId {
        &self.dataset_id
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Index the next chunk will carry.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent
    }

    pub fn rows_sent(&self) -> u64 {
        self.rows_sent
    }

    /// Send one batch of rows with the current index.
    ///
    /// The token is renewed first when its lease has run out, so a long row
    /// stream never pushes with a stale token.
    pub fn push_chunk(&mut self, http: &mut HttpSession, rows: &[Vec<Cell>]) -> Result<()> {
        self.require(UploadState::Open, "push a chunk")?;

        let result = self.send_chunk(http, rows);
        self.track(http, result)
    }

    fn send_chunk(&mut self, http: &mut HttpSession, rows: &[Vec<Cell>]) -> Result<()> {
        http.renew_if_expired()?;
        let data = encode_rows(rows, &self.schema)?;
        let body = json!({
            "tableName": self.table_name,
            "index": self.next_index,
            "data": data,
        });
        http.put(&self.path(""), Some(&self.project_id), body)?;

        log_event!(
            http.log(),
            INFO,
            event_names::UPLOAD_CHUNK_SENT,
            Stage::Upload,
            "Chunk sent",
            upload_session_id = self.id.as_str(),
            index = self.next_index,
            rows = rows.len() as u64
        );
        self.next_index += 1;
        self.chunks_sent += 1;
        self.rows_sent += rows.len() as u64;
        Ok(())
    }

    /// Ask the server to commit every pushed chunk.
    pub fn publish(&mut self, http: &mut HttpSession) -> Result<()> {
        self.require(UploadState::Open, "publish")?;

        let body = json!({ "tables": [self.table_name] });
        let result = http
            .post(&self.path("/publish"), Some(&self.project_id), body)
            .map(|_| ());
        self.track(http, result)?;

        self.state = UploadState::Publishing;
        log_event!(
            http.log(),
            INFO,
            event_names::PUBLISH_STARTED,
            Stage::Publish,
            "Publish requested",
            upload_session_id = self.id.as_str(),
            chunks = self.chunks_sent,
            rows = self.rows_sent
        );
        Ok(())
    }

    /// Poll publish status until complete, an error message, or the budget
    /// runs out. Sleeps between attempts, never after the last one.
    pub fn poll_publish_status(
        &mut self,
        http: &mut HttpSession,
        policy: PollPolicy,
    ) -> Result<PublishOutcome> {
        self.require(UploadState::Publishing, "poll publish status")?;

        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            let response = http.get(&self.path("/publishStatus"), Some(&self.project_id), &[]);
            let status: PublishStatus = match response.and_then(|r| r.json()) {
                Ok(status) => status,
                Err(e) => return self.track(http, Err(e)),
            };

            if let Some(message) = status.message.filter(|m| !m.is_empty()) {
                return self.track(http, Err(Error::PublishFailed(message)));
            }

            log_event!(
                http.log(),
                DEBUG,
                event_names::PUBLISH_POLL,
                Stage::Publish,
                "Publish status polled",
                attempt = attempt as u64,
                status = status.status.unwrap_or(-1)
            );

            if status.status == Some(PUBLISH_STATUS_COMPLETE) {
                self.state = UploadState::Published;
                log_event!(
                    http.log(),
                    INFO,
                    event_names::PUBLISH_COMPLETE,
                    Stage::Publish,
                    "Publish complete",
                    attempts = attempt as u64
                );
                return Ok(PublishOutcome::Complete { attempts: attempt });
            }

            if attempt < attempts && !policy.interval.is_zero() {
                thread::sleep(policy.interval);
            }
        }

        log_event!(
            http.log(),
            WARN,
            event_names::PUBLISH_UNKNOWN,
            Stage::Publish,
            "Publish status still unknown, data may appear later",
            attempts = attempts as u64
        );
        Ok(PublishOutcome::Unknown { attempts })
    }

    fn path(&self, suffix: &str) -> String {
        format!(
            "/datasets/{}/uploadSessions/{}{}",
            self.dataset_id, self.id, suffix
        )
    }

    fn require(&self, expected: UploadState, operation: &str) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        Err(Error::UploadState {
            session_id: self.id.to_string(),
            operation: operation.to_string(),
            state: self.state.to_string(),
        })
    }

    /// Any failure abandons the session.
    fn track<T>(&mut self, http: &HttpSession, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.state = UploadState::Failed;
            log_event!(
                http.log(),
                ERROR,
                event_names::UPLOAD_FAILED,
                Stage::Upload,
                e,
                upload_session_id = self.id.as_str(),
                next_index = self.next_index
            );
        }
        result
    }
}
