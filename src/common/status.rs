//! Execution status returned to clients and exchanged between nodes
//!
//! The wire shape is `{code, message, redirect?, sub_status?}`. Batch plans
//! carry one sub-status per row, and multi-tablet inserts nest a second level
//! (one array per tablet, one entry per tablet row).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status codes understood by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    Success = 200,
    MultipleError = 302,
    TimeseriesNotExist = 304,
    MetadataError = 305,
    DuplicatedTemplate = 320,
    StorageGroupNotExist = 322,
    ExecuteStatementError = 400,
    InternalServerError = 500,
    NoPermission = 602,
    PartitionNotReady = 700,
    TimeOut = 701,
    NoLeader = 702,
    UnsupportedOperation = 703,
    ConsistencyFailure = 705,
    NeedRedirection = 707,
}

impl StatusCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<StatusCode> for i32 {
    fn from(code: StatusCode) -> Self {
        code.code()
    }
}

/// Client-facing endpoint a later request should be sent to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndPoint {
    pub ip: String,
    pub port: u16,
}

impl EndPoint {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl fmt::Display for EndPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Result of executing a plan or a sub-plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<EndPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_status: Option<Vec<Status>>,
}

impl Status {
    pub fn new(code: impl Into<i32>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            redirect: None,
            sub_status: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::Success, "Execute successfully")
    }

    pub fn timeout() -> Self {
        Self::new(StatusCode::TimeOut, "Request timed out")
    }

    pub fn partition_table_not_ready() -> Self {
        Self::new(StatusCode::PartitionNotReady, "Partition table is not ready")
    }

    pub fn no_storage_group() -> Self {
        Self::new(
            StatusCode::StorageGroupNotExist,
            "Cannot find storage group for the plan",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InternalServerError, message)
    }

    /// Batch failure carrying one status per row.
    pub fn batch(sub_status: Vec<Status>) -> Self {
        Self {
            code: StatusCode::MultipleError.code(),
            message: "Multiple error occurred".to_string(),
            redirect: None,
            sub_status: Some(sub_status),
        }
    }

    /// Success that asks the client to talk to `endpoint` next time.
    pub fn redirect(endpoint: EndPoint) -> Self {
        Self {
            code: StatusCode::NeedRedirection.code(),
            message: String::new(),
            redirect: Some(endpoint),
            sub_status: None,
        }
    }

    pub fn is(&self, code: StatusCode) -> bool {
        self.code == code.code()
    }

    pub fn is_success(&self) -> bool {
        self.is(StatusCode::Success)
    }

    pub fn is_timeout(&self) -> bool {
        self.is(StatusCode::TimeOut)
    }

    pub fn is_batch_failure(&self) -> bool {
        self.is(StatusCode::MultipleError)
    }

    /// Success or a redirect-flavoured success.
    pub fn is_ok_or_redirect(&self) -> bool {
        self.is_success() || self.is(StatusCode::NeedRedirection)
    }

    pub fn with_code(mut self, code: impl Into<i32>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_redirect(mut self, endpoint: EndPoint) -> Self {
        self.redirect = Some(endpoint);
        self
    }

    /// Stamp `endpoint` unless the status already names a redirect target.
    pub fn with_redirect_if_absent(self, endpoint: EndPoint) -> Self {
        if self.redirect.is_some() {
            self
        } else {
            self.with_redirect(endpoint)
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(redirect) = &self.redirect {
            write!(f, " (redirect to {})", redirect)?;
        }
        if let Some(sub) = &self.sub_status {
            write!(f, " [{} sub-status]", sub.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_if_absent_keeps_existing_target() {
        let first = EndPoint::new("10.0.0.1", 6667);
        let second = EndPoint::new("10.0.0.2", 6667);

        let stamped = Status::ok().with_redirect_if_absent(first.clone());
        assert_eq!(stamped.redirect, Some(first.clone()));

        let kept = stamped.with_redirect_if_absent(second);
        assert_eq!(kept.redirect, Some(first));
    }

    #[test]
    fn test_wire_shape_skips_absent_fields() {
        let json = serde_json::to_value(Status::ok()).unwrap();
        assert_eq!(json["code"], 200);
        assert!(json.get("redirect").is_none());
        assert!(json.get("sub_status").is_none());

        let nested = Status::batch(vec![Status::batch(vec![Status::ok()])]);
        let decoded: Status = serde_json::from_str(&serde_json::to_string(&nested).unwrap()).unwrap();
        assert_eq!(decoded, nested);
    }

    #[test]
    fn test_status_predicates() {
        assert!(Status::ok().is_success());
        assert!(Status::timeout().is_timeout());
        assert!(Status::batch(vec![]).is_batch_failure());
        assert!(Status::redirect(EndPoint::new("h", 1)).is_ok_or_redirect());
        assert!(!Status::internal("boom").is_ok_or_redirect());
    }
}
