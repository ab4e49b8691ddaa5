//! Submission ingestion: assign an ID, tag the notebook, persist, dispatch.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::audit::{self, AuditSink};
use crate::grader::{GradeError, Grader};
use crate::metrics;
use crate::store::{ResultStore, StoreError, WriteOutcome, RESULT_EXT, SUBMISSION_EXT};
use gradebox_common::types::{parse_object, SubmissionMetadata, WireError};
use gradebox_common::{QueueClient, QueueError};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("notebook is not a JSON object: {0}")]
    InvalidPayload(#[from] WireError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("dispatch failed: {0}")]
    Queue(#[from] QueueError),

    #[error("local grading failed: {0}")]
    Grade(#[from] GradeError),
}

/// Where accepted submissions go.
pub enum Dispatch {
    /// Publish onto the work queue; the consumer stores the result later.
    Queue {
        client: Arc<dyn QueueClient>,
        channel: String,
    },
    /// Grade in-process and store the result before responding.
    Local(Arc<dyn Grader>),
}

impl Dispatch {
    pub fn mode(&self) -> &'static str {
        match self {
            Dispatch::Queue { .. } => "async",
            Dispatch::Local(_) => "sync",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub notebook: Vec<u8>,
    pub requested_exercise_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Receipt {
    pub submission_id: String,
    pub report_url: String,
    /// Result bytes when graded synchronously.
    pub report: Option<Vec<u8>>,
}

pub fn report_url(submission_id: &str) -> String {
    format!("/report/{}", submission_id)
}

pub struct IngestService {
    store: ResultStore,
    dispatch: Dispatch,
    audit: Option<Arc<dyn AuditSink>>,
}

impl IngestService {
    pub fn new(store: ResultStore, dispatch: Dispatch, audit: Option<Arc<dyn AuditSink>>) -> Self {
        Self {
            store,
            dispatch,
            audit,
        }
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    #[instrument(skip(self, upload), fields(mode = self.dispatch.mode(), bytes = upload.notebook.len()))]
    pub async fn submit(&self, upload: Upload, user_hash: &str) -> Result<Receipt, IngestError> {
        let mut notebook = parse_object(&upload.notebook)?;

        let submission_id = Uuid::new_v4().to_string();
        SubmissionMetadata {
            submission_id: submission_id.clone(),
            user_hash: user_hash.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            requested_exercise_id: upload.requested_exercise_id,
        }
        .inject_into(&mut notebook);

        let bytes = serde_json::to_vec(&Value::Object(notebook)).map_err(WireError::from)?;
        self.store.write_submission(&submission_id, &bytes).await?;
        self.mirror(format!("{}.{}", submission_id, SUBMISSION_EXT), &bytes);

        let report = match &self.dispatch {
            Dispatch::Queue { client, channel } => {
                client.post(channel, &bytes).await?;
                None
            }
            Dispatch::Local(grader) => {
                let result = grader.grade(&bytes).await?;
                if let Err(e) = parse_object(&result) {
                    metrics::RESULTS_UNRENDERABLE.inc();
                    warn!(submission_id = %submission_id, error = %e, "Grader output will not render");
                }
                // stored verbatim, like a result arriving from the queue
                if self.store.write_result(&submission_id, &result).await? == WriteOutcome::Replaced {
                    warn!(submission_id = %submission_id, "Local result replaced an existing one");
                }
                self.mirror(format!("{}.{}", submission_id, RESULT_EXT), &result);
                Some(result)
            }
        };

        info!(submission_id = %submission_id, "Accepted submission");
        Ok(Receipt {
            report_url: report_url(&submission_id),
            submission_id,
            report,
        })
    }

    fn mirror(&self, name: String, bytes: &[u8]) {
        if let Some(sink) = &self.audit {
            audit::spawn_record(sink.clone(), name, bytes.to_vec());
        }
    }
}
