//! The `open` / `write_row` / `close` exporter driven by a pipeline host.
//!
//! ```text
//! Init ──open──► Opened ──write_row*──► Opened ──close──► Closed
//! ```
//!
//! Rows are buffered and pushed as one chunk whenever the buffer is full and
//! another row arrives. `close` pushes the remainder, publishes, polls the
//! publish status and logs out. An exporter dropped before `close` (for
//! instance after a rejected row) logs out without publishing.

use std::fmt;
use std::mem;

use serde::Serialize;

use cube_common::{Cell, DatasetId, Error, FolderId, LogicalType, ProjectId, Result, Schema};
use cube_config::validate::{validate_exporter_config, validate_plugin_config};
use cube_config::{ExporterConfig, PluginConfig};

use crate::http::{HttpSession, HttpTransport};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::mapping::ColumnMapping;
use crate::resolver::{self, Resolution};
use crate::upload::{PollPolicy, PublishOutcome, UploadSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExporterState {
    Init,
    Opened,
    Closed,
}

impl fmt::Display for ExporterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExporterState::Init => write!(f, "init"),
            ExporterState::Opened => write!(f, "opened"),
            ExporterState::Closed => write!(f, "closed"),
        }
    }
}

/// What `close` reports back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub dataset_id: DatasetId,
    pub dataset_created: bool,
    pub rows_written: u64,
    pub chunks_sent: u64,
    pub publish: PublishOutcome,
}

/// Rows waiting for the next chunk.
#[derive(Debug)]
struct RowBuffer {
    rows: Vec<Vec<Cell>>,
    threshold: usize,
}

impl RowBuffer {
    fn new(threshold: usize) -> Self {
        RowBuffer {
            rows: Vec::with_capacity(threshold.min(16_384)),
            threshold: threshold.max(1),
        }
    }

    fn is_full(&self) -> bool {
        self.rows.len() >= self.threshold
    }

    fn push(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    /// Empty the buffer, handing back what it held.
    fn drain(&mut self) -> Vec<Vec<Cell>> {
        mem::take(&mut self.rows)
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Everything `open` resolved.
#[derive(Debug)]
struct OpenExport {
    schema: Schema,
    mapping: ColumnMapping,
    project_id: ProjectId,
    resolution: Resolution,
    upload: UploadSession,
}

/// One export into one dataset. Not reusable after `close` or an error.
pub struct Exporter {
    config: ExporterConfig,
    http: HttpSession,
    state: ExporterState,
    opened: Option<OpenExport>,
    buffer: RowBuffer,
    rows_received: u64,
    log: LogContext,
}

impl Exporter {
    /// Exporter over the blocking `ureq` transport.
    pub fn new(config: ExporterConfig, plugin: &PluginConfig, log: LogContext) -> Result<Self> {
        validate(&config, plugin, &log)?;
        let log = log.with_dataset(config.target.normalized_dataset_name());
        let http = HttpSession::connect(
            plugin,
            config.credentials.clone(),
            config.upload.token_lease(),
            log.clone(),
        );
        Ok(Self::build(config, http, log))
    }

    /// Exporter over any transport.
    pub fn with_transport(
        config: ExporterConfig,
        plugin: &PluginConfig,
        transport: Box<dyn HttpTransport>,
        log: LogContext,
    ) -> Result<Self> {
        validate(&config, plugin, &log)?;
        let log = log.with_dataset(config.target.normalized_dataset_name());
        let http = HttpSession::with_transport(
            plugin,
            config.credentials.clone(),
            config.upload.token_lease(),
            transport,
            log.clone(),
        );
        Ok(Self::build(config, http, log))
    }

    fn build(config: ExporterConfig, http: HttpSession, log: LogContext) -> Self {
        let buffer = RowBuffer::new(config.upload.buffer_size);
        Exporter {
            config,
            http,
            state: ExporterState::Init,
            opened: None,
            buffer,
            rows_received: 0,
            log,
        }
    }

    pub fn state(&self) -> ExporterState {
        self.state
    }

    /// Rows accepted by `write_row` so far.
    pub fn rows_received(&self) -> u64 {
        self.rows_received
    }

    pub fn buffered_rows(&self) -> usize {
        self.buffer.len()
    }

    pub fn project_id(&self) -> Option<&ProjectId> {
        self.opened.as_ref().map(|o| &o.project_id)
    }

    pub fn dataset_id(&self) -> Option<&DatasetId> {
        self.opened.as_ref().map(|o| o.resolution.dataset_id())
    }

    pub fn mapping(&self) -> Option<&ColumnMapping> {
        self.opened.as_ref().map(|o| &o.mapping)
    }

    /// Capture the schema, find or create the dataset and open a REPLACE
    /// upload session on its table.
    pub fn open(&mut self, schema: Schema) -> Result<()> {
        self.require(ExporterState::Init, "open")?;
        schema.validate()?;

        let mapping = ColumnMapping::from_schema(&schema);
        let project_id = resolver::resolve_project(&mut self.http, &self.config.target)?;
        self.log = self.log.clone().with_project(&project_id);
        self.http.set_log_context(self.log.clone());

        let target = &self.config.target;
        let dataset_name = target.normalized_dataset_name();
        let table_name = target.normalized_table_name();
        let folder = target
            .folder_id
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(FolderId::new);

        let resolution = resolver::resolve_or_create(
            &mut self.http,
            &project_id,
            &dataset_name,
            table_name,
            &schema,
            folder.as_ref(),
        )?;
        let upload = UploadSession::open(
            &mut self.http,
            &project_id,
            resolution.dataset_id(),
            table_name,
            &schema,
        )?;

        log_event!(
            self.log,
            INFO,
            event_names::EXPORT_OPENED,
            Stage::Init,
            "Export opened",
            dataset_id = resolution.dataset_id().as_str(),
            created = resolution.was_created(),
            columns = schema.len() as u64,
            buffer_size = self.buffer.threshold as u64
        );

        self.opened = Some(OpenExport {
            schema,
            mapping,
            project_id,
            resolution,
            upload,
        });
        self.state = ExporterState::Opened;
        Ok(())
    }

    /// Validate and buffer one row, pushing the buffered chunk first when
    /// the buffer is already full.
    pub fn write_row(&mut self, row: Vec<Cell>) -> Result<()> {
        self.require(ExporterState::Opened, "write a row")?;
        let row_number = self.rows_received + 1;
        self.check_row(&row, row_number)?;

        if self.buffer.is_full() {
            self.flush()?;
        }
        self.buffer.push(row);
        self.rows_received = row_number;
        Ok(())
    }

    /// Push the remainder, publish, poll and log out.
    ///
    /// Logout runs whatever happened before it. An export with no rows still
    /// publishes, which leaves the table empty.
    pub fn close(&mut self) -> Result<ExportSummary> {
        self.require(ExporterState::Opened, "close")?;
        self.state = ExporterState::Closed;

        let result = self.finish();
        self.http.logout();
        result
    }

    /// Give up on the export: buffered rows are discarded, nothing is
    /// published and the server session is logged out. No-op once closed.
    pub fn abort(&mut self) {
        if self.state == ExporterState::Closed {
            return;
        }
        let discarded = self.buffer.drain().len();
        self.state = ExporterState::Closed;
        log_event!(
            self.log,
            WARN,
            event_names::EXPORT_ABORTED,
            Stage::Close,
            "Export aborted before close",
            rows_received = self.rows_received,
            rows_discarded = discarded as u64
        );
        self.http.logout();
    }

    fn finish(&mut self) -> Result<ExportSummary> {
        if self.buffer.len() > 0 {
            self.flush()?;
        }

        let opened = self
            .opened
            .as_mut()
            .ok_or_else(|| invalid_state("close", ExporterState::Init))?;
        opened.upload.publish(&mut self.http)?;
        let policy = PollPolicy {
            attempts: self.config.upload.publish_poll_attempts,
            interval: self.config.upload.publish_poll_interval(),
        };
        let publish = opened.upload.poll_publish_status(&mut self.http, policy)?;

        let summary = ExportSummary {
            dataset_id: opened.resolution.dataset_id().clone(),
            dataset_created: opened.resolution.was_created(),
            rows_written: opened.upload.rows_sent(),
            chunks_sent: opened.upload.chunks_sent(),
            publish,
        };
        log_event!(
            self.log,
            INFO,
            event_names::EXPORT_CLOSED,
            Stage::Close,
            "Export closed",
            rows = summary.rows_written,
            chunks = summary.chunks_sent,
            publish_complete = summary.publish.is_complete()
        );
        Ok(summary)
    }

    /// Send the buffered rows as one chunk. The buffer is emptied whether or
    /// not the push succeeds; rows are never replayed.
    fn flush(&mut self) -> Result<()> {
        let rows = self.buffer.drain();
        let opened = self
            .opened
            .as_mut()
            .ok_or_else(|| invalid_state("flush", ExporterState::Init))?;

        log_event!(
            self.log,
            DEBUG,
            event_names::EXPORT_FLUSH,
            Stage::Upload,
            "Flushing buffered rows",
            rows = rows.len() as u64,
            index = opened.upload.next_index()
        );
        opened.upload.push_chunk(&mut self.http, &rows)
    }

    fn check_row(&self, row: &[Cell], row_number: u64) -> Result<()> {
        let schema = match &self.opened {
            Some(opened) => &opened.schema,
            None => return Err(invalid_state("write a row", self.state)),
        };

        if row.len() != schema.len() {
            return Err(self.reject(Error::RowShape {
                row: row_number,
                expected: schema.len(),
                actual: row.len(),
            }));
        }

        for (column, cell) in schema.columns.iter().zip(row) {
            if column.logical_type == LogicalType::Boolean && cell.is_missing() {
                return Err(self.reject(Error::CellValidation {
                    column: column.name.clone(),
                    row: row_number,
                    reason: "boolean column holds a null or NaN value".to_string(),
                }));
            }
        }
        Ok(())
    }

    fn reject(&self, err: Error) -> Error {
        log_event!(
            self.log,
            ERROR,
            event_names::CELL_REJECTED,
            Stage::Upload,
            &err,
            rows_received = self.rows_received
        );
        err
    }

    fn require(&self, expected: ExporterState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(invalid_state(operation, self.state))
        }
    }
}

impl Drop for Exporter {
    fn drop(&mut self) {
        self.abort();
    }
}

fn invalid_state(operation: &str, state: ExporterState) -> Error {
    Error::InvalidState {
        operation: operation.to_string(),
        state: state.to_string(),
    }
}

/// Fail fast on missing credentials, URL or target.
fn validate(config: &ExporterConfig, plugin: &PluginConfig, log: &LogContext) -> Result<()> {
    let result = validate_plugin_config(plugin).and_then(|_| validate_exporter_config(config));
    if let Err(e) = &result {
        log_event!(
            log,
            ERROR,
            event_names::CONFIG_INVALID,
            Stage::Init,
            e,
            base_url = plugin.server.base_url.as_str(),
            username = config.credentials.username.as_str(),
            password = config.credentials.masked_password().as_str()
        );
    }
    result.map_err(Error::from)
}
