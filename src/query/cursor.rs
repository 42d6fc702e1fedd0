//! The cursor: submission, polling, cancellation, and row streaming.
//!
//! A cursor drives one statement at a time on its session. `execute`
//! always submits with `run_async=true` and polls; that is what lets a
//! cancelled context translate into a real server-side `CancelOperation`
//! without a second connection. Results are fetched lazily in columnar
//! batches; `has_more` treats the server's `has_more_rows` flag as
//! advisory and takes a batch that has columns but no rows as the
//! authoritative end of the stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::params::ConnectConfiguration;
use crate::error::{FetchError, HiveError, OperationError, TransportError};
use crate::query::results::{trim_decimal, Dest, RowSet, Value};
use crate::rpc::messages::{
    CancelOperationReq, CloseOperationReq, Column, ExecuteStatementReq, FetchResultsReq,
    GetOperationStatusReq, GetResultSetMetadataReq, OperationHandle, OperationState,
    OperationStatus, SessionHandle, FETCH_NEXT, FETCH_TYPE_LOGS, FETCH_TYPE_ROWS,
};
use crate::rpc::RpcClient;
use crate::types::HiveType;

/// Ordered `(column name, column type)` schema of a result set.
pub type Description = Vec<(String, HiveType)>;

/// Cursor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// A statement has been submitted and is in progress.
    Running,
    /// The result stream is exhausted (or the statement had no results).
    Finished,
    /// No statement is active.
    None,
    /// The caller's context fired while the statement was in progress.
    ContextDone,
    /// The statement failed before an operation handle existed.
    Error,
    /// A synchronous `execute` has fully completed.
    AsyncEnded,
}

/// Client-side handle for a single query execution and its result stream.
///
/// Reusable across statements: every `execute` resets the cursor first.
/// Errors are returned and also recorded in the cursor's error slot
/// ([`Cursor::error`]); a terminal error fixes the cursor until the next
/// `execute` or `close`.
pub struct Cursor {
    client: Arc<Mutex<RpcClient>>,
    session: SessionHandle,
    config: Arc<ConnectConfiguration>,
    operation: Option<OperationHandle>,
    batch: Option<RowSet>,
    description: Option<Description>,
    state: CursorState,
    last_error: Option<HiveError>,
    logs: Option<UnboundedSender<Vec<String>>>,
}

impl Cursor {
    pub(crate) fn new(
        client: Arc<Mutex<RpcClient>>,
        session: SessionHandle,
        config: Arc<ConnectConfiguration>,
    ) -> Self {
        Self {
            client,
            session,
            config,
            operation: None,
            batch: None,
            description: None,
            state: CursorState::None,
            last_error: None,
            logs: None,
        }
    }

    /// Current cursor state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// The error recorded by the last failing call, if any.
    pub fn error(&self) -> Option<&HiveError> {
        self.last_error.as_ref()
    }

    /// Attach a channel for streamed server-side log lines. The channel
    /// is owned by the caller; the cursor only ever sends on it.
    pub fn set_log_sink(&mut self, sink: UnboundedSender<Vec<String>>) {
        self.logs = Some(sink);
    }

    /// Detach the log channel.
    pub fn clear_log_sink(&mut self) {
        self.logs = None;
    }

    fn store_result<T>(&mut self, result: Result<T, HiveError>) -> Result<T, HiveError> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Ok(value)
            }
            Err(err) => {
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Submission and polling
    // ------------------------------------------------------------------

    /// Issue a synchronous statement: submit, wait for completion, drain
    /// logs.
    pub async fn exec(&mut self, ctx: &CancellationToken, query: &str) -> Result<(), HiveError> {
        self.execute(ctx, query, false).await
    }

    /// Submit a statement. With `run_async` the call returns as soon as
    /// the server acknowledges the submission; otherwise it polls until
    /// the operation completes.
    pub async fn execute(
        &mut self,
        ctx: &CancellationToken,
        query: &str,
        run_async: bool,
    ) -> Result<(), HiveError> {
        let result = self.execute_impl(ctx, query, run_async).await;
        self.store_result(result)
    }

    async fn execute_impl(
        &mut self,
        ctx: &CancellationToken,
        query: &str,
        run_async: bool,
    ) -> Result<(), HiveError> {
        if let Err(err) = self.submit(ctx, query).await {
            if !run_async {
                if self.state == CursorState::ContextDone {
                    self.handle_done_context().await?;
                } else if self.state == CursorState::Error {
                    return Err(OperationError::Failed(
                        "context was done before the server returned an operation handle"
                            .to_string(),
                    )
                    .into());
                }
            }
            return Err(err);
        }
        if run_async {
            return Ok(());
        }

        if let Err(err) = self.wait_impl(ctx).await {
            if self.state == CursorState::ContextDone {
                self.handle_done_context().await?;
            }
            return Err(err);
        }

        // Flush logs accumulated after the last poll.
        self.forward_logs().await?;
        self.state = CursorState::AsyncEnded;
        Ok(())
    }

    /// Submit with `run_async=true`, leaving polling to the caller.
    async fn submit(&mut self, ctx: &CancellationToken, query: &str) -> Result<(), HiveError> {
        if let Err(err) = self.reset_state_impl().await {
            debug!(error = %err, "closing the previous operation failed during reset");
        }
        self.state = CursorState::Running;

        let request = ExecuteStatementReq {
            session_handle: self.session.clone(),
            statement: query.to_string(),
            conf_overlay: None,
            run_async: true,
        };
        let response = {
            let mut client = self.client.lock().await;
            tokio::select! {
                biased;
                response = client.execute_statement(&request) => response?,
                _ = ctx.cancelled() => {
                    // The submission was dropped mid-flight; no operation
                    // handle exists to cancel server-side.
                    self.state = CursorState::Error;
                    return Err(OperationError::Cancelled.into());
                }
            }
        };

        if !response.status.is_success() {
            return Err(OperationError::Server {
                message: response.status.error_message_or_default(),
                error_code: response.status.error_code_or_default(),
            }
            .into());
        }

        let handle = response.operation_handle.ok_or_else(|| {
            TransportError::Protocol("ExecuteStatement reply carried no operation handle".into())
        })?;
        if !handle.has_result_set {
            self.state = CursorState::Finished;
        }
        self.operation = Some(handle);
        Ok(())
    }

    /// Wait for the running operation to complete, forwarding logs and
    /// honoring the context between polls.
    pub async fn wait_for_completion(
        &mut self,
        ctx: &CancellationToken,
    ) -> Result<(), HiveError> {
        let result = self.wait_impl(ctx).await;
        self.store_result(result)
    }

    async fn wait_impl(&mut self, ctx: &CancellationToken) -> Result<(), HiveError> {
        loop {
            let status = self.poll_impl(true).await?;
            let state = status.operation_state.unwrap_or(OperationState::Unknown);
            if !state.is_active() {
                if state != OperationState::Finished {
                    return Err(OperationError::Failed(completion_error_message(
                        &status, state,
                    ))
                    .into());
                }
                return Ok(());
            }

            self.forward_logs().await?;

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = ctx.cancelled() => {
                    self.state = CursorState::ContextDone;
                    return Err(OperationError::Cancelled.into());
                }
            }
        }
    }

    /// The context fired mid-operation: cancel server-side best-effort,
    /// then reset so no operation handle is left open.
    async fn handle_done_context(&mut self) -> Result<(), HiveError> {
        if self.operation.is_some() {
            self.cancel_impl().await?;
        }
        if let Err(err) = self.reset_state_impl().await {
            debug!(error = %err, "closing the cancelled operation failed");
        }
        self.state = CursorState::Finished;
        Ok(())
    }

    /// Current status of the last operation.
    pub async fn poll(&mut self, get_progress: bool) -> Result<OperationStatus, HiveError> {
        let result = self.poll_impl(get_progress).await;
        self.store_result(result)
    }

    async fn poll_impl(&mut self, get_progress: bool) -> Result<OperationStatus, HiveError> {
        let handle = self.operation.clone().ok_or(FetchError::NoOperation)?;
        let response = self
            .client
            .lock()
            .await
            .get_operation_status(&GetOperationStatusReq {
                operation_handle: handle,
                get_progress_update: get_progress,
            })
            .await?;
        if !response.status.is_success() {
            return Err(OperationError::Failed(format!(
                "error getting the operation status: {}",
                response.status.describe()
            ))
            .into());
        }
        Ok(response)
    }

    /// Whether the last asynchronous operation has left the active
    /// states. Pending logs are forwarded, like on every other
    /// completion-observing path.
    pub async fn finished(&mut self) -> Result<bool, HiveError> {
        let result = self.finished_impl().await;
        self.store_result(result)
    }

    async fn finished_impl(&mut self) -> Result<bool, HiveError> {
        let status = self.poll_impl(true).await?;
        self.forward_logs().await?;
        let state = status.operation_state.unwrap_or(OperationState::Unknown);
        Ok(!state.is_active())
    }

    // ------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------

    /// All server-side execution log lines accumulated since the last
    /// call, for the current operation.
    pub async fn fetch_logs(&mut self) -> Result<Vec<String>, HiveError> {
        let result = self.fetch_logs_impl().await;
        self.store_result(result)
    }

    async fn fetch_logs_impl(&mut self) -> Result<Vec<String>, HiveError> {
        let handle = self.operation.clone().ok_or(FetchError::NoOperation)?;
        let response = self
            .client
            .lock()
            .await
            .fetch_results(&FetchResultsReq {
                operation_handle: handle,
                orientation: FETCH_NEXT,
                max_rows: self.config.fetch_size,
                fetch_type: FETCH_TYPE_LOGS,
            })
            .await?;
        let Some(results) = response.results else {
            return Ok(Vec::new());
        };
        // One row, with a string column per accumulated log line.
        let mut logs = Vec::new();
        for column in results.columns {
            if let Column::Str { values, .. } = column {
                logs.extend(values);
            }
        }
        Ok(logs)
    }

    /// Push pending log lines to the caller's channel, if one is set.
    async fn forward_logs(&mut self) -> Result<(), HiveError> {
        if self.logs.is_none() {
            return Ok(());
        }
        let lines = self.fetch_logs_impl().await?;
        if let (Some(sink), false) = (&self.logs, lines.is_empty()) {
            // The channel belongs to the caller; a dropped receiver is
            // not an error.
            let _ = sink.send(lines);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Result streaming
    // ------------------------------------------------------------------

    /// True when at least one more row can be read, fetching a batch from
    /// the server if the current one is consumed. Idempotent.
    pub async fn has_more(&mut self, ctx: &CancellationToken) -> Result<bool, HiveError> {
        let result = self.has_more_impl(ctx).await;
        self.store_result(result)
    }

    async fn has_more_impl(&mut self, ctx: &CancellationToken) -> Result<bool, HiveError> {
        if self.batch_consumed() && self.state != CursorState::Finished {
            self.poll_until_data(ctx, 1).await?;
        }
        Ok(self.state != CursorState::Finished || !self.batch_consumed())
    }

    fn batch_consumed(&self) -> bool {
        self.batch.as_ref().map(RowSet::consumed).unwrap_or(true)
    }

    /// Run the fetch loop on a background worker until rows arrive or the
    /// stream proves exhausted. A batch with columns but zero rows is the
    /// end of the stream; a response with no columns at all means the
    /// result set is not materialized yet and the worker retries after
    /// the poll interval. On cancellation the worker is flagged to stop
    /// and awaited, so the in-flight RPC is never leaked.
    async fn poll_until_data(
        &mut self,
        ctx: &CancellationToken,
        wanted: usize,
    ) -> Result<(), HiveError> {
        let handle = self.operation.clone().ok_or(FetchError::NoOperation)?;
        let client = Arc::clone(&self.client);
        let fetch_size = self.config.fetch_size;
        let poll_interval = self.config.poll_interval;
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let mut worker = tokio::spawn(async move {
            loop {
                if worker_stop.load(Ordering::Acquire) {
                    return Err(HiveError::from(OperationError::Cancelled));
                }
                let response = client
                    .lock()
                    .await
                    .fetch_results(&FetchResultsReq {
                        operation_handle: handle.clone(),
                        orientation: FETCH_NEXT,
                        max_rows: fetch_size,
                        fetch_type: FETCH_TYPE_ROWS,
                    })
                    .await?;
                if !response.status.is_success() {
                    return Err(OperationError::Failed(format!(
                        "error fetching the results: {}",
                        response.status.describe()
                    ))
                    .into());
                }
                let columns = response.results.map(|r| r.columns).unwrap_or_default();
                if !columns.is_empty() {
                    return Ok(columns);
                }
                tokio::time::sleep(poll_interval).await;
            }
        });

        let outcome = tokio::select! {
            outcome = &mut worker => outcome,
            _ = ctx.cancelled() => {
                stop.store(true, Ordering::Release);
                let _ = worker.await;
                return Err(OperationError::Cancelled.into());
            }
        };
        let columns = match outcome {
            Ok(result) => result?,
            Err(join_error) => {
                return Err(OperationError::Failed(format!(
                    "fetch worker failed: {join_error}"
                ))
                .into());
            }
        };

        let rows = RowSet::new(columns);
        if rows.total() == 0 {
            self.batch = None;
            self.state = CursorState::Finished;
            return Ok(());
        }
        if rows.total() < wanted {
            return Err(FetchError::ShortBatch {
                wanted,
                got: rows.total(),
            }
            .into());
        }
        self.batch = Some(rows);
        Ok(())
    }

    /// Load a batch if the current one is consumed; error once the stream
    /// is exhausted.
    async fn fetch_if_empty(&mut self, ctx: &CancellationToken) -> Result<(), HiveError> {
        if self.batch_consumed() {
            self.batch = None;
            if !self.has_more_impl(ctx).await? {
                return Err(FetchError::NoMoreRows.into());
            }
        }
        Ok(())
    }

    /// Read one row into the given destinations and advance the cursor.
    /// The destination count must match the column count; a type mismatch
    /// or a NULL bound to a non-optional destination aborts the row
    /// without advancing.
    pub async fn fetch_one(
        &mut self,
        ctx: &CancellationToken,
        dests: &mut [Dest<'_>],
    ) -> Result<(), HiveError> {
        let result = self.fetch_one_impl(ctx, dests).await;
        self.store_result(result)
    }

    async fn fetch_one_impl(
        &mut self,
        ctx: &CancellationToken,
        dests: &mut [Dest<'_>],
    ) -> Result<(), HiveError> {
        self.fetch_if_empty(ctx).await?;
        let batch = self.batch.as_mut().ok_or(FetchError::NoMoreRows)?;
        if batch.num_columns() != dests.len() {
            return Err(FetchError::ArgumentCount {
                expected: batch.num_columns(),
                actual: dests.len(),
            }
            .into());
        }
        for (i, dest) in dests.iter_mut().enumerate() {
            batch.bind_current(i, dest)?;
        }
        batch.advance();
        Ok(())
    }

    /// One row as a name → value map. Columns sharing a name collapse
    /// silently (a warning is logged); use `fetch_one` to disambiguate.
    pub async fn row_map(
        &mut self,
        ctx: &CancellationToken,
    ) -> Result<HashMap<String, Value>, HiveError> {
        let result = self.row_map_impl(ctx).await;
        self.store_result(result)
    }

    async fn row_map_impl(
        &mut self,
        ctx: &CancellationToken,
    ) -> Result<HashMap<String, Value>, HiveError> {
        self.fetch_if_empty(ctx).await?;
        let description = self.description_impl().await?;
        let batch = self.batch.as_mut().ok_or(FetchError::NoMoreRows)?;
        if description.len() != batch.num_columns() {
            return Err(TransportError::Protocol(
                "description length does not match the batch column count".to_string(),
            )
            .into());
        }
        let mut row = HashMap::with_capacity(description.len());
        for (i, (name, _)) in description.iter().enumerate() {
            row.insert(name.clone(), batch.value_at(i));
        }
        if row.len() != description.len() {
            warn!(
                ?description,
                "columns share a name; row_map collapses them, use fetch_one instead"
            );
        }
        batch.advance();
        Ok(row)
    }

    /// One row as an ordered sequence. Decimal values are trimmed of
    /// trailing zeros and a trailing point.
    pub async fn row_slice(&mut self, ctx: &CancellationToken) -> Result<Vec<Value>, HiveError> {
        let result = self.row_slice_impl(ctx).await;
        self.store_result(result)
    }

    async fn row_slice_impl(
        &mut self,
        ctx: &CancellationToken,
    ) -> Result<Vec<Value>, HiveError> {
        self.fetch_if_empty(ctx).await?;
        let description = self.description_impl().await?;
        let batch = self.batch.as_mut().ok_or(FetchError::NoMoreRows)?;
        if description.len() != batch.num_columns() {
            return Err(TransportError::Protocol(
                "description length does not match the batch column count".to_string(),
            )
            .into());
        }
        let mut row = Vec::with_capacity(description.len());
        for (i, (_, hive_type)) in description.iter().enumerate() {
            let mut value = batch.value_at(i);
            if *hive_type == HiveType::Decimal {
                if let Value::Str(text) = &value {
                    value = Value::Str(trim_decimal(text).to_string());
                }
            }
            row.push(value);
        }
        batch.advance();
        Ok(row)
    }

    /// The `(name, type)` schema of the current operation's result set,
    /// fetched once and cached for the life of the operation.
    pub async fn description(&mut self) -> Result<Description, HiveError> {
        let result = self.description_impl().await;
        self.store_result(result)
    }

    async fn description_impl(&mut self) -> Result<Description, HiveError> {
        if let Some(description) = &self.description {
            return Ok(description.clone());
        }
        let handle = self.operation.clone().ok_or(FetchError::NoOperation)?;
        let response = self
            .client
            .lock()
            .await
            .get_result_set_metadata(&GetResultSetMetadataReq {
                operation_handle: handle,
            })
            .await?;
        if !response.status.is_success() {
            return Err(OperationError::Failed(format!(
                "error getting the result set metadata: {}",
                response.status.describe()
            ))
            .into());
        }
        let schema = response.schema.ok_or_else(|| {
            TransportError::Protocol("metadata reply carried no schema".to_string())
        })?;
        let mut description = Vec::with_capacity(schema.columns.len());
        for column in schema.columns {
            let type_id = column.primitive_type.ok_or_else(|| {
                TransportError::Protocol(format!(
                    "column {} carries no primitive type",
                    column.column_name
                ))
            })?;
            let hive_type = HiveType::from_type_id(type_id).ok_or_else(|| {
                TransportError::Protocol(format!("unsupported column type id {type_id}"))
            })?;
            description.push((column.column_name, hive_type));
        }
        self.description = Some(description.clone());
        Ok(description)
    }

    // ------------------------------------------------------------------
    // Cancel, reset, close
    // ------------------------------------------------------------------

    /// Cancel the current operation server-side.
    pub async fn cancel(&mut self) -> Result<(), HiveError> {
        let result = self.cancel_impl().await;
        self.store_result(result)
    }

    async fn cancel_impl(&mut self) -> Result<(), HiveError> {
        let handle = self.operation.clone().ok_or(FetchError::NoOperation)?;
        let response = self
            .client
            .lock()
            .await
            .cancel_operation(&CancelOperationReq {
                operation_handle: handle,
            })
            .await?;
        if !response.status.is_success() {
            return Err(OperationError::Failed(format!(
                "error cancelling the operation: {}",
                response.status.describe()
            ))
            .into());
        }
        Ok(())
    }

    /// Clear queue, description, indices and state; close the current
    /// operation if one is held. The in-memory reset happens even when
    /// `CloseOperation` fails.
    async fn reset_state_impl(&mut self) -> Result<(), HiveError> {
        self.batch = None;
        self.description = None;
        self.state = CursorState::None;
        self.last_error = None;
        let Some(handle) = self.operation.take() else {
            return Ok(());
        };
        let response = self
            .client
            .lock()
            .await
            .close_operation(&CloseOperationReq {
                operation_handle: handle,
            })
            .await?;
        if !response.status.is_success() {
            return Err(OperationError::Failed(format!(
                "error closing the operation: {}",
                response.status.describe()
            ))
            .into());
        }
        Ok(())
    }

    /// Close the cursor, releasing the current operation. The error, if
    /// any, stays readable via [`Cursor::error`].
    pub async fn close(&mut self) -> Result<(), HiveError> {
        match self.reset_state_impl().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }
}

/// Error text for a terminal non-FINISHED operation, preferring the task
/// status (unless it is the literal `"[]"`), then the top-level error
/// message, then the nested status message.
fn completion_error_message(status: &OperationStatus, state: OperationState) -> String {
    status
        .task_status
        .clone()
        .filter(|s| s.as_str() != "[]")
        .or_else(|| status.error_message.clone())
        .or_else(|| status.status.error_message.clone())
        .unwrap_or_else(|| {
            format!("operation in state {state:?} without task status or error message")
        })
}
