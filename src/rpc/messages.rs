//! TCLIService request/response messages.
//!
//! These structs mirror the HiveServer2 service IDL closely enough that
//! the rest of the crate can treat them as the generated stubs the wire
//! schema assumes. Requests know how to encode themselves; responses know
//! how to decode themselves, skipping fields this driver does not use.

use std::collections::HashMap;

use crate::error::TransportError;
use crate::rpc::wire::{ttype, ThriftReader, ThriftWriter};

/// `HIVE_CLI_SERVICE_PROTOCOL_V6`: the first version with columnar
/// result sets.
pub const PROTOCOL_V6: i32 = 5;

/// Fetch orientation: next batch.
pub const FETCH_NEXT: i32 = 0;

/// Fetch type for result rows.
pub const FETCH_TYPE_ROWS: i16 = 0;
/// Fetch type for server-side log lines.
pub const FETCH_TYPE_LOGS: i16 = 1;

/// RPC status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Success,
    SuccessWithInfo,
    StillExecuting,
    Error,
    InvalidHandle,
}

impl StatusCode {
    pub fn from_i32(v: i32) -> Self {
        match v {
            0 => StatusCode::Success,
            1 => StatusCode::SuccessWithInfo,
            2 => StatusCode::StillExecuting,
            4 => StatusCode::InvalidHandle,
            _ => StatusCode::Error,
        }
    }
}

/// Server-side operation lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Initialized,
    Running,
    Finished,
    Canceled,
    Closed,
    Error,
    Unknown,
    Pending,
    TimedOut,
}

impl OperationState {
    pub fn from_i32(v: i32) -> Self {
        match v {
            0 => OperationState::Initialized,
            1 => OperationState::Running,
            2 => OperationState::Finished,
            3 => OperationState::Canceled,
            4 => OperationState::Closed,
            5 => OperationState::Error,
            7 => OperationState::Pending,
            8 => OperationState::TimedOut,
            _ => OperationState::Unknown,
        }
    }

    /// States in which the operation is still making progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OperationState::Initialized | OperationState::Running | OperationState::Pending
        )
    }
}

/// RPC-level status attached to every response.
#[derive(Debug, Clone)]
pub struct Status {
    pub status_code: StatusCode,
    pub sql_state: Option<String>,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
}

impl Default for Status {
    /// Substitute for a response that arrived without a status.
    fn default() -> Self {
        Self {
            status_code: StatusCode::Error,
            sql_state: None,
            error_code: Some(-1),
            error_message: Some("unknown error".to_string()),
        }
    }
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(
            self.status_code,
            StatusCode::Success | StatusCode::SuccessWithInfo
        )
    }

    /// Human-readable rendering for error reports.
    pub fn describe(&self) -> String {
        match &self.error_message {
            Some(msg) => format!("{:?} ({})", self.status_code, msg),
            None => format!("{:?}", self.status_code),
        }
    }

    pub fn error_message_or_default(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string())
    }

    pub fn error_code_or_default(&self) -> i32 {
        self.error_code.unwrap_or(-1)
    }

    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut status = Status {
            status_code: StatusCode::Error,
            sql_state: None,
            error_code: None,
            error_message: None,
        };
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::I32, 1) => status.status_code = StatusCode::from_i32(r.read_i32().await?),
                (ttype::STRING, 3) => status.sql_state = Some(r.read_string().await?),
                (ttype::I32, 4) => status.error_code = Some(r.read_i32().await?),
                (ttype::STRING, 5) => status.error_message = Some(r.read_string().await?),
                _ => r.skip(ft).await?,
            }
        }
        Ok(status)
    }
}

/// GUID + secret pair identifying a session or operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleIdentifier {
    pub guid: Vec<u8>,
    pub secret: Vec<u8>,
}

impl HandleIdentifier {
    fn encode(&self, w: &mut ThriftWriter) {
        w.field_begin(ttype::STRING, 1);
        w.write_bytes(&self.guid);
        w.field_begin(ttype::STRING, 2);
        w.write_bytes(&self.secret);
        w.field_stop();
    }

    async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut guid = Vec::new();
        let mut secret = Vec::new();
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::STRING, 1) => guid = r.read_binary().await?,
                (ttype::STRING, 2) => secret = r.read_binary().await?,
                _ => r.skip(ft).await?,
            }
        }
        Ok(Self { guid, secret })
    }
}

/// Opaque server-issued session identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: HandleIdentifier,
}

impl SessionHandle {
    fn encode(&self, w: &mut ThriftWriter) {
        w.field_begin(ttype::STRUCT, 1);
        self.id.encode(w);
        w.field_stop();
    }

    async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut id = None;
        while let Some((ft, fid)) = r.field_begin().await? {
            match (ft, fid) {
                (ttype::STRUCT, 1) => id = Some(HandleIdentifier::decode(r).await?),
                _ => r.skip(ft).await?,
            }
        }
        Ok(Self {
            id: id.ok_or_else(|| {
                TransportError::Protocol("session handle without identifier".to_string())
            })?,
        })
    }
}

/// Opaque server-issued identifier for an in-flight or completed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationHandle {
    pub id: HandleIdentifier,
    pub operation_type: i32,
    pub has_result_set: bool,
    pub modified_row_count: Option<f64>,
}

impl OperationHandle {
    fn encode(&self, w: &mut ThriftWriter) {
        w.field_begin(ttype::STRUCT, 1);
        self.id.encode(w);
        w.field_begin(ttype::I32, 2);
        w.write_i32(self.operation_type);
        w.field_begin(ttype::BOOL, 3);
        w.write_bool(self.has_result_set);
        if let Some(count) = self.modified_row_count {
            w.field_begin(ttype::DOUBLE, 4);
            w.write_f64(count);
        }
        w.field_stop();
    }

    async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut id = None;
        let mut operation_type = 0;
        let mut has_result_set = false;
        let mut modified_row_count = None;
        while let Some((ft, fid)) = r.field_begin().await? {
            match (ft, fid) {
                (ttype::STRUCT, 1) => id = Some(HandleIdentifier::decode(r).await?),
                (ttype::I32, 2) => operation_type = r.read_i32().await?,
                (ttype::BOOL, 3) => has_result_set = r.read_bool().await?,
                (ttype::DOUBLE, 4) => modified_row_count = Some(r.read_f64().await?),
                _ => r.skip(ft).await?,
            }
        }
        Ok(Self {
            id: id.ok_or_else(|| {
                TransportError::Protocol("operation handle without identifier".to_string())
            })?,
            operation_type,
            has_result_set,
            modified_row_count,
        })
    }
}

// ============================================================================
// OpenSession
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenSessionReq {
    pub client_protocol: i32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub configuration: Option<HashMap<String, String>>,
}

impl OpenSessionReq {
    pub(crate) fn encode(&self, w: &mut ThriftWriter) {
        w.field_begin(ttype::I32, 1);
        w.write_i32(self.client_protocol);
        if let Some(username) = &self.username {
            w.field_begin(ttype::STRING, 2);
            w.write_string(username);
        }
        if let Some(password) = &self.password {
            w.field_begin(ttype::STRING, 3);
            w.write_string(password);
        }
        if let Some(configuration) = &self.configuration {
            w.field_begin(ttype::MAP, 4);
            w.map_begin(ttype::STRING, ttype::STRING, configuration.len());
            for (key, value) in configuration {
                w.write_string(key);
                w.write_string(value);
            }
        }
        w.field_stop();
    }
}

#[derive(Debug, Clone)]
pub struct OpenSessionResp {
    pub status: Status,
    pub server_protocol_version: i32,
    pub session_handle: Option<SessionHandle>,
}

impl OpenSessionResp {
    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut status = None;
        let mut server_protocol_version = 0;
        let mut session_handle = None;
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::STRUCT, 1) => status = Some(Status::decode(r).await?),
                (ttype::I32, 2) => server_protocol_version = r.read_i32().await?,
                (ttype::STRUCT, 3) => session_handle = Some(SessionHandle::decode(r).await?),
                _ => r.skip(ft).await?,
            }
        }
        Ok(Self {
            status: status.unwrap_or_default(),
            server_protocol_version,
            session_handle,
        })
    }
}

// ============================================================================
// CloseSession
// ============================================================================

#[derive(Debug, Clone)]
pub struct CloseSessionReq {
    pub session_handle: SessionHandle,
}

impl CloseSessionReq {
    pub(crate) fn encode(&self, w: &mut ThriftWriter) {
        w.field_begin(ttype::STRUCT, 1);
        self.session_handle.encode(w);
        w.field_stop();
    }
}

#[derive(Debug, Clone)]
pub struct CloseSessionResp {
    pub status: Status,
}

impl CloseSessionResp {
    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut status = None;
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::STRUCT, 1) => status = Some(Status::decode(r).await?),
                _ => r.skip(ft).await?,
            }
        }
        Ok(Self {
            status: status.unwrap_or_default(),
        })
    }
}

// ============================================================================
// ExecuteStatement
// ============================================================================

#[derive(Debug, Clone)]
pub struct ExecuteStatementReq {
    pub session_handle: SessionHandle,
    pub statement: String,
    pub conf_overlay: Option<HashMap<String, String>>,
    pub run_async: bool,
}

impl ExecuteStatementReq {
    pub(crate) fn encode(&self, w: &mut ThriftWriter) {
        w.field_begin(ttype::STRUCT, 1);
        self.session_handle.encode(w);
        w.field_begin(ttype::STRING, 2);
        w.write_string(&self.statement);
        if let Some(overlay) = &self.conf_overlay {
            w.field_begin(ttype::MAP, 3);
            w.map_begin(ttype::STRING, ttype::STRING, overlay.len());
            for (key, value) in overlay {
                w.write_string(key);
                w.write_string(value);
            }
        }
        w.field_begin(ttype::BOOL, 4);
        w.write_bool(self.run_async);
        w.field_stop();
    }
}

#[derive(Debug, Clone)]
pub struct ExecuteStatementResp {
    pub status: Status,
    pub operation_handle: Option<OperationHandle>,
}

impl ExecuteStatementResp {
    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut status = None;
        let mut operation_handle = None;
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::STRUCT, 1) => status = Some(Status::decode(r).await?),
                (ttype::STRUCT, 2) => operation_handle = Some(OperationHandle::decode(r).await?),
                _ => r.skip(ft).await?,
            }
        }
        Ok(Self {
            status: status.unwrap_or_default(),
            operation_handle,
        })
    }
}

// ============================================================================
// GetOperationStatus
// ============================================================================

#[derive(Debug, Clone)]
pub struct GetOperationStatusReq {
    pub operation_handle: OperationHandle,
    pub get_progress_update: bool,
}

impl GetOperationStatusReq {
    pub(crate) fn encode(&self, w: &mut ThriftWriter) {
        w.field_begin(ttype::STRUCT, 1);
        self.operation_handle.encode(w);
        w.field_begin(ttype::BOOL, 2);
        w.write_bool(self.get_progress_update);
        w.field_stop();
    }
}

/// Current status of an operation, as reported by the server.
#[derive(Debug, Clone)]
pub struct OperationStatus {
    pub status: Status,
    pub operation_state: Option<OperationState>,
    pub sql_state: Option<String>,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
    pub task_status: Option<String>,
}

impl OperationStatus {
    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut resp = OperationStatus {
            status: Status::default(),
            operation_state: None,
            sql_state: None,
            error_code: None,
            error_message: None,
            task_status: None,
        };
        let mut status = None;
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::STRUCT, 1) => status = Some(Status::decode(r).await?),
                (ttype::I32, 2) => {
                    resp.operation_state = Some(OperationState::from_i32(r.read_i32().await?))
                }
                (ttype::STRING, 3) => resp.sql_state = Some(r.read_string().await?),
                (ttype::I32, 4) => resp.error_code = Some(r.read_i32().await?),
                (ttype::STRING, 5) => resp.error_message = Some(r.read_string().await?),
                (ttype::STRING, 6) => resp.task_status = Some(r.read_string().await?),
                _ => r.skip(ft).await?,
            }
        }
        resp.status = status.unwrap_or_default();
        Ok(resp)
    }
}

// ============================================================================
// FetchResults
// ============================================================================

#[derive(Debug, Clone)]
pub struct FetchResultsReq {
    pub operation_handle: OperationHandle,
    pub orientation: i32,
    pub max_rows: i64,
    pub fetch_type: i16,
}

impl FetchResultsReq {
    pub(crate) fn encode(&self, w: &mut ThriftWriter) {
        w.field_begin(ttype::STRUCT, 1);
        self.operation_handle.encode(w);
        w.field_begin(ttype::I32, 2);
        w.write_i32(self.orientation);
        w.field_begin(ttype::I64, 3);
        w.write_i64(self.max_rows);
        w.field_begin(ttype::I16, 4);
        w.write_i16(self.fetch_type);
        w.field_stop();
    }
}

#[derive(Debug, Clone)]
pub struct FetchResultsResp {
    pub status: Status,
    /// Known to be unreliable; an empty batch is the authoritative
    /// end-of-stream signal.
    pub has_more_rows: Option<bool>,
    pub results: Option<RowSetMsg>,
}

impl FetchResultsResp {
    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut status = None;
        let mut has_more_rows = None;
        let mut results = None;
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::STRUCT, 1) => status = Some(Status::decode(r).await?),
                (ttype::BOOL, 2) => has_more_rows = Some(r.read_bool().await?),
                (ttype::STRUCT, 3) => results = Some(RowSetMsg::decode(r).await?),
                _ => r.skip(ft).await?,
            }
        }
        Ok(Self {
            status: status.unwrap_or_default(),
            has_more_rows,
            results,
        })
    }
}

/// One columnar payload of up to `fetch_size` rows.
#[derive(Debug, Clone, Default)]
pub struct RowSetMsg {
    pub start_row_offset: i64,
    pub columns: Vec<Column>,
}

impl RowSetMsg {
    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut row_set = RowSetMsg::default();
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::I64, 1) => row_set.start_row_offset = r.read_i64().await?,
                (ttype::LIST, 3) => {
                    let (_, len) = r.list_begin().await?;
                    let mut columns = Vec::with_capacity(len);
                    for _ in 0..len {
                        columns.push(Column::decode(r).await?);
                    }
                    row_set.columns = columns;
                }
                _ => r.skip(ft).await?,
            }
        }
        Ok(row_set)
    }
}

/// A typed value vector plus its packed null bitmap.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Bool { values: Vec<bool>, nulls: Vec<u8> },
    Byte { values: Vec<i8>, nulls: Vec<u8> },
    I16 { values: Vec<i16>, nulls: Vec<u8> },
    I32 { values: Vec<i32>, nulls: Vec<u8> },
    I64 { values: Vec<i64>, nulls: Vec<u8> },
    Double { values: Vec<f64>, nulls: Vec<u8> },
    Str { values: Vec<String>, nulls: Vec<u8> },
    Binary { values: Vec<Vec<u8>>, nulls: Vec<u8> },
}

impl Column {
    /// Number of values in this column's vector.
    pub fn len(&self) -> usize {
        match self {
            Column::Bool { values, .. } => values.len(),
            Column::Byte { values, .. } => values.len(),
            Column::I16 { values, .. } => values.len(),
            Column::I32 { values, .. } => values.len(),
            Column::I64 { values, .. } => values.len(),
            Column::Double { values, .. } => values.len(),
            Column::Str { values, .. } => values.len(),
            Column::Binary { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The packed null bitmap (byte `i/8`, bit `i%8`).
    pub fn nulls(&self) -> &[u8] {
        match self {
            Column::Bool { nulls, .. } => nulls,
            Column::Byte { nulls, .. } => nulls,
            Column::I16 { nulls, .. } => nulls,
            Column::I32 { nulls, .. } => nulls,
            Column::I64 { nulls, .. } => nulls,
            Column::Double { nulls, .. } => nulls,
            Column::Str { nulls, .. } => nulls,
            Column::Binary { nulls, .. } => nulls,
        }
    }

    /// Name of the value family, for error messages.
    pub fn family_name(&self) -> &'static str {
        match self {
            Column::Bool { .. } => "bool",
            Column::Byte { .. } => "i8",
            Column::I16 { .. } => "i16",
            Column::I32 { .. } => "i32",
            Column::I64 { .. } => "i64",
            Column::Double { .. } => "f64",
            Column::Str { .. } => "string",
            Column::Binary { .. } => "binary",
        }
    }

    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut column = None;
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::STRUCT, 1) => {
                    let (values, nulls) = decode_bool_column(r).await?;
                    column = Some(Column::Bool { values, nulls });
                }
                (ttype::STRUCT, 2) => {
                    let (values, nulls) = decode_byte_column(r).await?;
                    column = Some(Column::Byte { values, nulls });
                }
                (ttype::STRUCT, 3) => {
                    let (values, nulls) = decode_i16_column(r).await?;
                    column = Some(Column::I16 { values, nulls });
                }
                (ttype::STRUCT, 4) => {
                    let (values, nulls) = decode_i32_column(r).await?;
                    column = Some(Column::I32 { values, nulls });
                }
                (ttype::STRUCT, 5) => {
                    let (values, nulls) = decode_i64_column(r).await?;
                    column = Some(Column::I64 { values, nulls });
                }
                (ttype::STRUCT, 6) => {
                    let (values, nulls) = decode_double_column(r).await?;
                    column = Some(Column::Double { values, nulls });
                }
                (ttype::STRUCT, 7) => {
                    let (values, nulls) = decode_string_column(r).await?;
                    column = Some(Column::Str { values, nulls });
                }
                (ttype::STRUCT, 8) => {
                    let (values, nulls) = decode_binary_column(r).await?;
                    column = Some(Column::Binary { values, nulls });
                }
                _ => r.skip(ft).await?,
            }
        }
        column.ok_or_else(|| TransportError::Protocol("column union with no value set".to_string()))
    }
}

async fn decode_bool_column(
    r: &mut ThriftReader<'_>,
) -> Result<(Vec<bool>, Vec<u8>), TransportError> {
    let mut values = Vec::new();
    let mut nulls = Vec::new();
    while let Some((ft, id)) = r.field_begin().await? {
        match (ft, id) {
            (ttype::LIST, 1) => {
                let (_, len) = r.list_begin().await?;
                values.reserve(len);
                for _ in 0..len {
                    values.push(r.read_bool().await?);
                }
            }
            (ttype::STRING, 2) => nulls = r.read_binary().await?,
            _ => r.skip(ft).await?,
        }
    }
    Ok((values, nulls))
}

async fn decode_byte_column(
    r: &mut ThriftReader<'_>,
) -> Result<(Vec<i8>, Vec<u8>), TransportError> {
    let mut values = Vec::new();
    let mut nulls = Vec::new();
    while let Some((ft, id)) = r.field_begin().await? {
        match (ft, id) {
            (ttype::LIST, 1) => {
                let (_, len) = r.list_begin().await?;
                values.reserve(len);
                for _ in 0..len {
                    values.push(r.read_i8().await?);
                }
            }
            (ttype::STRING, 2) => nulls = r.read_binary().await?,
            _ => r.skip(ft).await?,
        }
    }
    Ok((values, nulls))
}

async fn decode_i16_column(
    r: &mut ThriftReader<'_>,
) -> Result<(Vec<i16>, Vec<u8>), TransportError> {
    let mut values = Vec::new();
    let mut nulls = Vec::new();
    while let Some((ft, id)) = r.field_begin().await? {
        match (ft, id) {
            (ttype::LIST, 1) => {
                let (_, len) = r.list_begin().await?;
                values.reserve(len);
                for _ in 0..len {
                    values.push(r.read_i16().await?);
                }
            }
            (ttype::STRING, 2) => nulls = r.read_binary().await?,
            _ => r.skip(ft).await?,
        }
    }
    Ok((values, nulls))
}

async fn decode_i32_column(
    r: &mut ThriftReader<'_>,
) -> Result<(Vec<i32>, Vec<u8>), TransportError> {
    let mut values = Vec::new();
    let mut nulls = Vec::new();
    while let Some((ft, id)) = r.field_begin().await? {
        match (ft, id) {
            (ttype::LIST, 1) => {
                let (_, len) = r.list_begin().await?;
                values.reserve(len);
                for _ in 0..len {
                    values.push(r.read_i32().await?);
                }
            }
            (ttype::STRING, 2) => nulls = r.read_binary().await?,
            _ => r.skip(ft).await?,
        }
    }
    Ok((values, nulls))
}

async fn decode_i64_column(
    r: &mut ThriftReader<'_>,
) -> Result<(Vec<i64>, Vec<u8>), TransportError> {
    let mut values = Vec::new();
    let mut nulls = Vec::new();
    while let Some((ft, id)) = r.field_begin().await? {
        match (ft, id) {
            (ttype::LIST, 1) => {
                let (_, len) = r.list_begin().await?;
                values.reserve(len);
                for _ in 0..len {
                    values.push(r.read_i64().await?);
                }
            }
            (ttype::STRING, 2) => nulls = r.read_binary().await?,
            _ => r.skip(ft).await?,
        }
    }
    Ok((values, nulls))
}

async fn decode_double_column(
    r: &mut ThriftReader<'_>,
) -> Result<(Vec<f64>, Vec<u8>), TransportError> {
    let mut values = Vec::new();
    let mut nulls = Vec::new();
    while let Some((ft, id)) = r.field_begin().await? {
        match (ft, id) {
            (ttype::LIST, 1) => {
                let (_, len) = r.list_begin().await?;
                values.reserve(len);
                for _ in 0..len {
                    values.push(r.read_f64().await?);
                }
            }
            (ttype::STRING, 2) => nulls = r.read_binary().await?,
            _ => r.skip(ft).await?,
        }
    }
    Ok((values, nulls))
}

async fn decode_string_column(
    r: &mut ThriftReader<'_>,
) -> Result<(Vec<String>, Vec<u8>), TransportError> {
    let mut values = Vec::new();
    let mut nulls = Vec::new();
    while let Some((ft, id)) = r.field_begin().await? {
        match (ft, id) {
            (ttype::LIST, 1) => {
                let (_, len) = r.list_begin().await?;
                values.reserve(len);
                for _ in 0..len {
                    values.push(r.read_string().await?);
                }
            }
            (ttype::STRING, 2) => nulls = r.read_binary().await?,
            _ => r.skip(ft).await?,
        }
    }
    Ok((values, nulls))
}

async fn decode_binary_column(
    r: &mut ThriftReader<'_>,
) -> Result<(Vec<Vec<u8>>, Vec<u8>), TransportError> {
    let mut values = Vec::new();
    let mut nulls = Vec::new();
    while let Some((ft, id)) = r.field_begin().await? {
        match (ft, id) {
            (ttype::LIST, 1) => {
                let (_, len) = r.list_begin().await?;
                values.reserve(len);
                for _ in 0..len {
                    values.push(r.read_binary().await?);
                }
            }
            (ttype::STRING, 2) => nulls = r.read_binary().await?,
            _ => r.skip(ft).await?,
        }
    }
    Ok((values, nulls))
}

// ============================================================================
// CancelOperation / CloseOperation
// ============================================================================

#[derive(Debug, Clone)]
pub struct CancelOperationReq {
    pub operation_handle: OperationHandle,
}

impl CancelOperationReq {
    pub(crate) fn encode(&self, w: &mut ThriftWriter) {
        w.field_begin(ttype::STRUCT, 1);
        self.operation_handle.encode(w);
        w.field_stop();
    }
}

#[derive(Debug, Clone)]
pub struct CancelOperationResp {
    pub status: Status,
}

impl CancelOperationResp {
    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut status = None;
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::STRUCT, 1) => status = Some(Status::decode(r).await?),
                _ => r.skip(ft).await?,
            }
        }
        Ok(Self {
            status: status.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CloseOperationReq {
    pub operation_handle: OperationHandle,
}

impl CloseOperationReq {
    pub(crate) fn encode(&self, w: &mut ThriftWriter) {
        w.field_begin(ttype::STRUCT, 1);
        self.operation_handle.encode(w);
        w.field_stop();
    }
}

#[derive(Debug, Clone)]
pub struct CloseOperationResp {
    pub status: Status,
}

impl CloseOperationResp {
    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut status = None;
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::STRUCT, 1) => status = Some(Status::decode(r).await?),
                _ => r.skip(ft).await?,
            }
        }
        Ok(Self {
            status: status.unwrap_or_default(),
        })
    }
}

// ============================================================================
// GetResultSetMetadata
// ============================================================================

#[derive(Debug, Clone)]
pub struct GetResultSetMetadataReq {
    pub operation_handle: OperationHandle,
}

impl GetResultSetMetadataReq {
    pub(crate) fn encode(&self, w: &mut ThriftWriter) {
        w.field_begin(ttype::STRUCT, 1);
        self.operation_handle.encode(w);
        w.field_stop();
    }
}

#[derive(Debug, Clone)]
pub struct GetResultSetMetadataResp {
    pub status: Status,
    pub schema: Option<TableSchema>,
}

impl GetResultSetMetadataResp {
    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut status = None;
        let mut schema = None;
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::STRUCT, 1) => status = Some(Status::decode(r).await?),
                (ttype::STRUCT, 2) => schema = Some(TableSchema::decode(r).await?),
                _ => r.skip(ft).await?,
            }
        }
        Ok(Self {
            status: status.unwrap_or_default(),
            schema,
        })
    }
}

/// Result-set schema: ordered column descriptors.
#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    pub columns: Vec<ColumnDesc>,
}

impl TableSchema {
    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut schema = TableSchema::default();
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::LIST, 1) => {
                    let (_, len) = r.list_begin().await?;
                    let mut columns = Vec::with_capacity(len);
                    for _ in 0..len {
                        columns.push(ColumnDesc::decode(r).await?);
                    }
                    schema.columns = columns;
                }
                _ => r.skip(ft).await?,
            }
        }
        Ok(schema)
    }
}

/// One column of a result-set schema.
#[derive(Debug, Clone)]
pub struct ColumnDesc {
    pub column_name: String,
    /// Primitive type id of the first type entry, when present.
    pub primitive_type: Option<i32>,
}

impl ColumnDesc {
    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut column_name = String::new();
        let mut primitive_type = None;
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::STRING, 1) => column_name = r.read_string().await?,
                (ttype::STRUCT, 2) => primitive_type = decode_type_desc(r).await?,
                _ => r.skip(ft).await?,
            }
        }
        Ok(Self {
            column_name,
            primitive_type,
        })
    }
}

/// Pull the primitive type id out of a `TTypeDesc`. Complex type entries
/// are skipped; the first primitive entry wins.
async fn decode_type_desc(r: &mut ThriftReader<'_>) -> Result<Option<i32>, TransportError> {
    let mut primitive = None;
    while let Some((ft, id)) = r.field_begin().await? {
        match (ft, id) {
            (ttype::LIST, 1) => {
                let (_, len) = r.list_begin().await?;
                for _ in 0..len {
                    // TTypeEntry union
                    while let Some((eft, eid)) = r.field_begin().await? {
                        match (eft, eid) {
                            (ttype::STRUCT, 1) => {
                                // TPrimitiveTypeEntry
                                while let Some((pft, pid)) = r.field_begin().await? {
                                    match (pft, pid) {
                                        (ttype::I32, 1) => {
                                            let id = r.read_i32().await?;
                                            if primitive.is_none() {
                                                primitive = Some(id);
                                            }
                                        }
                                        _ => r.skip(pft).await?,
                                    }
                                }
                            }
                            _ => r.skip(eft).await?,
                        }
                    }
                }
            }
            _ => r.skip(ft).await?,
        }
    }
    Ok(primitive)
}

// ============================================================================
// TApplicationException
// ============================================================================

/// Remote exception raised by the Thrift processor itself.
#[derive(Debug, Clone)]
pub struct ApplicationException {
    pub message: String,
    pub exception_type: i32,
}

impl ApplicationException {
    pub(crate) async fn decode(r: &mut ThriftReader<'_>) -> Result<Self, TransportError> {
        let mut message = String::from("unknown application exception");
        let mut exception_type = 0;
        while let Some((ft, id)) = r.field_begin().await? {
            match (ft, id) {
                (ttype::STRING, 1) => message = r.read_string().await?,
                (ttype::I32, 2) => exception_type = r.read_i32().await?,
                _ => r.skip(ft).await?,
            }
        }
        Ok(Self {
            message,
            exception_type,
        })
    }
}
