//! API error envelope.
//!
//! Every non-2xx reply carries the same JSON object: what happened, when,
//! and a numeric code naming the exact source point of the failure. The
//! numeric values are a wire contract relied on by clients; new codes are
//! appended, existing ones are never renumbered.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Serialize, Serializer};

/// Source points of API failures. One code per place in the code, so a
/// reply pins down the failing line without a stack trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ApiCode {
    Null = 0,
    BadBody = 1,
    NoReq = 2,
    BadJson = 3,
    Panic = 4,

    // upload
    UploadForm = 5,
    UploadWrite = 6,
    UploadBuf1 = 7,
    UploadSend1 = 8,
    UploadBuf2 = 9,
    UploadSend2 = 10,
    UploadReply = 11,

    // download
    DownloadBadId = 12,
    DownloadNoArg = 13,
    DownloadAbsent = 14,

    // fileinfo
    FileInfoNoArg = 15,

    // remove
    RemoveNoArg = 16,
    RemoveAbsent = 17,
    RemoveNode = 18,

    // clear
    ClearNode = 19,

    // addnode
    AddNodeNoData = 20,
    AddNodeHas = 21,
}

impl Serialize for ApiCode {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_i32(*self as i32)
    }
}

fn code_is_null(code: &ApiCode) -> bool {
    *code == ApiCode::Null
}

/// Error reply body. `when` is unix time in milliseconds; `info` optionally
/// links a description; `stack` is present only on caught panics.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub what: String,
    pub when: u64,
    #[serde(skip_serializing_if = "code_is_null")]
    pub code: ApiCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ApiError {
    pub fn new(status: StatusCode, what: impl ToString, code: ApiCode) -> Self {
        Self {
            what: what.to_string(),
            when: now_ms(),
            code,
            info: None,
            stack: None,
            status,
        }
    }

    pub fn bad_request(what: impl ToString, code: ApiCode) -> Self {
        Self::new(StatusCode::BAD_REQUEST, what, code)
    }

    pub fn not_found(what: impl ToString, code: ApiCode) -> Self {
        Self::new(StatusCode::NOT_FOUND, what, code)
    }

    pub fn internal(what: impl ToString, code: ApiCode) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, what, code)
    }

    /// Envelope of a caught handler panic, carrying the stack trace.
    pub fn panic(what: impl ToString, stack: String) -> Self {
        let mut err = Self::internal(what, ApiCode::Panic);
        err.stack = Some(stack);
        err
    }

    pub fn with_info(mut self, info: impl ToString) -> Self {
        self.info = Some(info.to_string());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

/// Unix time in milliseconds, the timestamp format of the error envelope.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
