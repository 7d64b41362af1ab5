//! Structured record of every outbound API call.
//!
//! Each call emits one `tracing` event with target [`API_LOG_TARGET`]; the
//! binary routes that target to a JSON log file. A bounded in-memory history
//! can be enabled for diagnostics and tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Tracing target carrying API call records
pub const API_LOG_TARGET: &str = "api_calls";

const HISTORY_LIMIT: usize = 1000;

/// One outbound request and its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub method: String,
    pub url: String,
    pub params: BTreeMap<String, String>,
    pub response_status: Option<u16>,
    pub response_time_ms: u64,
    pub success: bool,
    pub result_count: Option<usize>,
    pub error: Option<String>,
}

/// Sink for [`ApiCallRecord`]s
#[derive(Debug, Clone, Default)]
pub struct ApiCallLog {
    history: Option<Arc<Mutex<VecDeque<ApiCallRecord>>>>,
}

impl ApiCallLog {
    /// Log to tracing only
    pub fn new() -> Self {
        Self::default()
    }

    /// Log to tracing and keep the most recent records in memory
    pub fn recording() -> Self {
        Self {
            history: Some(Arc::new(Mutex::new(VecDeque::new()))),
        }
    }

    pub fn record(&self, record: ApiCallRecord) {
        let params = serde_json::to_string(&record.params).unwrap_or_default();
        tracing::info!(
            target: API_LOG_TARGET,
            timestamp = %record.timestamp.to_rfc3339(),
            service = %record.service,
            method = %record.method,
            url = %record.url,
            params = %params,
            response_status = record.response_status,
            response_time_ms = record.response_time_ms,
            success = record.success,
            result_count = record.result_count.map(|c| c as u64),
            error = record.error.as_deref(),
            "api call"
        );

        if let Some(history) = &self.history {
            let mut history = match history.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(record);
        }
    }

    /// Recorded calls, oldest first. Empty unless created with [`ApiCallLog::recording`].
    pub fn records(&self) -> Vec<ApiCallRecord> {
        match &self.history {
            Some(history) => match history.lock() {
                Ok(guard) => guard.iter().cloned().collect(),
                Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
            },
            None => Vec::new(),
        }
    }

    /// Recorded calls for one service
    pub fn records_for(&self, service: &str) -> Vec<ApiCallRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.service == service)
            .collect()
    }
}
