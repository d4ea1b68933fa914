//! Thin client over Google BigQuery for DDL, DML, and streaming inserts.

use gcp_bigquery_client::client_builder::ClientBuilder;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::query_response::{QueryResponse, ResultSet};
use gcp_bigquery_client::model::table_data_insert_all_request::TableDataInsertAllRequest;
use gcp_bigquery_client::{error::BQError, Client};
use metrics::counter;
use std::fmt;
use tracing::info;

use crate::error::{ErrorKind, SyncResult};
use crate::metrics::LAKESYNC_WAREHOUSE_QUERY_RETRIES_TOTAL;
use crate::retry::RetryPolicy;
use crate::sync_error;
use crate::types::{ColumnSchema, ColumnType, TableSchema};

/// BigQuery project identifier.
pub type BigQueryProjectId = String;
/// BigQuery dataset identifier.
pub type BigQueryDatasetId = String;
/// BigQuery table identifier.
pub type BigQueryTableId = String;

/// HTTP status codes BigQuery returns for transient conditions worth retrying.
const RETRYABLE_RESPONSE_CODES: &[i64] = &[429, 500, 502, 503, 504];

/// Checks whether a [`BQError`] represents a transient condition.
///
/// Request-level errors (the HTTP exchange itself failed) and the retryable
/// response codes are transient; everything else (auth failures, malformed
/// statements, missing entities) requires intervention and is permanent.
fn is_retryable_bq_error(error: &BQError) -> bool {
    match error {
        BQError::RequestError(_) => true,
        BQError::ResponseError { error } => {
            RETRYABLE_RESPONSE_CODES.contains(&(error.error.code as i64))
        }
        _ => false,
    }
}

/// Converts BigQuery errors to synchronization errors with appropriate
/// classification.
fn bq_error_to_sync_error(err: BQError) -> crate::error::SyncError {
    let (kind, description) = match &err {
        BQError::InvalidServiceAccountKey(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery service account key",
        ),
        BQError::InvalidServiceAccountAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery service account authenticator",
        ),
        BQError::InvalidApplicationDefaultCredentialsAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery application default credentials",
        ),
        BQError::AuthError(_) => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication error",
        ),
        BQError::YupAuthError(_) => (
            ErrorKind::AuthenticationError,
            "BigQuery OAuth authentication error",
        ),
        BQError::NoToken => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication token missing",
        ),
        BQError::RequestError(_) => (ErrorKind::DestinationIoError, "BigQuery request failed"),
        BQError::ResponseError { .. } => {
            (ErrorKind::DestinationQueryFailed, "BigQuery response error")
        }
        BQError::NoDataAvailable => (
            ErrorKind::InvalidState,
            "BigQuery result set positioning error",
        ),
        BQError::InvalidColumnIndex { .. } => {
            (ErrorKind::InvalidData, "BigQuery invalid column index")
        }
        BQError::InvalidColumnName { .. } => {
            (ErrorKind::InvalidData, "BigQuery invalid column name")
        }
        BQError::InvalidColumnType { .. } => {
            (ErrorKind::ConversionError, "BigQuery column type mismatch")
        }
        BQError::SerializationError(_) => (
            ErrorKind::InvalidData,
            "BigQuery JSON serialization error",
        ),
        _ => (ErrorKind::DestinationQueryFailed, "BigQuery error"),
    };

    sync_error!(kind, description, err)
}

/// Client for interacting with Google BigQuery.
///
/// Provides table management, batched row insertion, and query execution with
/// authentication, bounded retry for transient failures, and error
/// classification.
#[derive(Clone)]
pub struct BigQueryClient {
    project_id: BigQueryProjectId,
    client: Client,
    retry: RetryPolicy,
}

impl BigQueryClient {
    /// Creates a new [`BigQueryClient`] from a service account key file.
    pub async fn new_with_key_path(
        project_id: BigQueryProjectId,
        sa_key_file: &str,
        retry: RetryPolicy,
    ) -> SyncResult<BigQueryClient> {
        let client = ClientBuilder::new()
            .build_from_service_account_key_file(sa_key_file)
            .await
            .map_err(bq_error_to_sync_error)?;

        Ok(BigQueryClient {
            project_id,
            client,
            retry,
        })
    }

    /// Creates a new [`BigQueryClient`] from a service account key JSON string.
    pub async fn new_with_key(
        project_id: BigQueryProjectId,
        sa_key: &str,
        retry: RetryPolicy,
    ) -> SyncResult<BigQueryClient> {
        let sa_key = gcp_bigquery_client::yup_oauth2::parse_service_account_key(sa_key)
            .map_err(BQError::from)
            .map_err(bq_error_to_sync_error)?;
        let client = ClientBuilder::new()
            .build_from_service_account_key(sa_key, false)
            .await
            .map_err(bq_error_to_sync_error)?;

        Ok(BigQueryClient {
            project_id,
            client,
            retry,
        })
    }

    /// Creates a new [`BigQueryClient`] using Application Default Credentials.
    pub async fn new_with_adc(
        project_id: BigQueryProjectId,
        retry: RetryPolicy,
    ) -> SyncResult<BigQueryClient> {
        let client = ClientBuilder::new()
            .build_from_application_default_credentials()
            .await
            .map_err(bq_error_to_sync_error)?;

        Ok(BigQueryClient {
            project_id,
            client,
            retry,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Returns the fully qualified BigQuery table name.
    ///
    /// Formats the table name as `` `project_id.dataset_id.table_id` `` with the
    /// identifiers sanitized for backtick quoting.
    pub fn full_table_name(
        &self,
        dataset_id: &BigQueryDatasetId,
        table_id: &BigQueryTableId,
    ) -> SyncResult<String> {
        let project_id = Self::sanitize_identifier(&self.project_id, "BigQuery project id")?;
        let dataset_id = Self::sanitize_identifier(dataset_id, "BigQuery dataset id")?;
        let table_id = Self::sanitize_identifier(table_id, "BigQuery table id")?;

        Ok(format!("`{project_id}.{dataset_id}.{table_id}`"))
    }

    /// Executes a BigQuery SQL statement and returns the raw response.
    ///
    /// Transient request failures are retried with backoff; response payloads
    /// are returned as-is so callers can read DML statistics or rows.
    pub async fn query(&self, sql: String) -> SyncResult<QueryResponse> {
        self.retry
            .run(
                "bigquery query",
                |err| err.kind() == ErrorKind::DestinationIoError,
                || {
                    let sql = sql.clone();
                    async move {
                        self.client
                            .job()
                            .query(&self.project_id, QueryRequest::new(sql))
                            .await
                            .map_err(|err| {
                                if is_retryable_bq_error(&err) {
                                    counter!(LAKESYNC_WAREHOUSE_QUERY_RETRIES_TOTAL).increment(1);
                                    sync_error!(
                                        ErrorKind::DestinationIoError,
                                        "BigQuery request failed transiently",
                                        err
                                    )
                                } else {
                                    bq_error_to_sync_error(err)
                                }
                            })
                    }
                },
            )
            .await
    }

    /// Executes a BigQuery SQL statement exactly once, without retry.
    ///
    /// The merge path uses this: a merge must not be re-attempted without
    /// re-verifying staging state, so even transient failures surface directly.
    pub async fn query_once(&self, sql: String) -> SyncResult<QueryResponse> {
        self.client
            .job()
            .query(&self.project_id, QueryRequest::new(sql))
            .await
            .map_err(bq_error_to_sync_error)
    }

    /// Executes a query and wraps the response rows in a [`ResultSet`].
    pub async fn query_rows(&self, sql: String) -> SyncResult<ResultSet> {
        let response = self.query(sql).await?;
        Ok(ResultSet::new_from_query_response(response))
    }

    /// Returns the number of rows a DML statement reported as affected.
    pub fn dml_affected_rows(response: &QueryResponse) -> u64 {
        response
            .num_dml_affected_rows
            .as_deref()
            .and_then(|count| count.parse::<u64>().ok())
            .unwrap_or(0)
    }

    /// Checks whether a table exists in the BigQuery dataset.
    pub async fn table_exists(
        &self,
        dataset_id: &BigQueryDatasetId,
        table_id: &BigQueryTableId,
    ) -> SyncResult<bool> {
        let table = self
            .client
            .table()
            .get(&self.project_id, dataset_id, table_id, None)
            .await;

        let exists =
            !matches!(table, Err(BQError::ResponseError { error }) if error.error.code == 404);

        Ok(exists)
    }

    /// Returns the registration type literal of a table from the dataset's
    /// information schema, or [`None`] when the table does not exist.
    ///
    /// Values follow the warehouse's vocabulary: `BASE TABLE`, `EXTERNAL`,
    /// `VIEW`, and friends.
    pub async fn table_type(
        &self,
        dataset_id: &BigQueryDatasetId,
        table_id: &BigQueryTableId,
    ) -> SyncResult<Option<String>> {
        let project_id = Self::sanitize_identifier(&self.project_id, "BigQuery project id")?;
        let dataset_id = Self::sanitize_identifier(dataset_id, "BigQuery dataset id")?;
        let table_literal = Self::escape_string_literal(table_id);

        let sql = format!(
            "select table_type from `{project_id}.{dataset_id}`.INFORMATION_SCHEMA.TABLES \
             where table_name = '{table_literal}'"
        );

        let mut rows = self.query_rows(sql).await?;
        if !rows.next_row() {
            return Ok(None);
        }

        rows.get_string_by_name("table_type")
            .map_err(bq_error_to_sync_error)
    }

    /// Drops a table from BigQuery if it exists.
    pub async fn drop_table(
        &self,
        dataset_id: &BigQueryDatasetId,
        table_id: &BigQueryTableId,
    ) -> SyncResult<()> {
        let full_table_name = self.full_table_name(dataset_id, table_id)?;

        info!(%full_table_name, "dropping table from bigquery");

        let _ = self.query(format!("drop table if exists {full_table_name}")).await?;

        Ok(())
    }

    /// Creates a table in BigQuery if it doesn't already exist.
    ///
    /// Returns `true` if the table was created, `false` if it already existed.
    /// The statement itself carries the `if not exists` guard, so the create is
    /// never destructive.
    pub async fn create_table_if_missing(
        &self,
        dataset_id: &BigQueryDatasetId,
        table_id: &BigQueryTableId,
        schema: &TableSchema,
    ) -> SyncResult<bool> {
        let existed = self.table_exists(dataset_id, table_id).await?;
        let full_table_name = self.full_table_name(dataset_id, table_id)?;
        let columns_spec = Self::create_columns_spec(schema)?;

        info!(%full_table_name, existed, "ensuring table exists in bigquery");

        let _ = self
            .query(format!(
                "create table if not exists {full_table_name} {columns_spec}"
            ))
            .await?;

        Ok(!existed)
    }

    /// Creates or replaces a native table with the given schema.
    pub async fn create_or_replace_table(
        &self,
        dataset_id: &BigQueryDatasetId,
        table_id: &BigQueryTableId,
        schema: &TableSchema,
    ) -> SyncResult<()> {
        let full_table_name = self.full_table_name(dataset_id, table_id)?;
        let columns_spec = Self::create_columns_spec(schema)?;

        info!(%full_table_name, "creating or replacing table in bigquery");

        let _ = self
            .query(format!(
                "create or replace table {full_table_name} {columns_spec}"
            ))
            .await?;

        Ok(())
    }

    /// Creates or replaces an external-table registration.
    ///
    /// The statement must not run while a native table occupies the name; the
    /// caller reconciles kinds first.
    pub async fn create_or_replace_external_table(
        &self,
        dataset_id: &BigQueryDatasetId,
        table_id: &BigQueryTableId,
        location: &str,
        format: &str,
        connection: Option<&str>,
    ) -> SyncResult<()> {
        let full_table_name = self.full_table_name(dataset_id, table_id)?;
        let sql = Self::external_table_statement(&full_table_name, location, format, connection);

        info!(%full_table_name, location, format, "creating or replacing external table");

        let _ = self.query(sql).await?;

        Ok(())
    }

    /// Renders the external-table DDL.
    fn external_table_statement(
        full_table_name: &str,
        location: &str,
        format: &str,
        connection: Option<&str>,
    ) -> String {
        let connection_clause = connection
            .map(|connection| format!("with connection `{connection}` "))
            .unwrap_or_default();
        let location_literal = Self::escape_string_literal(location);

        format!(
            "create or replace external table {full_table_name} \
             {connection_clause}options (format = '{format}', uris = ['{location_literal}'])"
        )
    }

    /// Streams pre-encoded rows into a table via the tabledata insert API.
    ///
    /// Rows are JSON objects keyed by column name. Insert-level errors in the
    /// response are permanent (bad data or schema drift) and fail the load.
    pub async fn insert_rows(
        &self,
        dataset_id: &BigQueryDatasetId,
        table_id: &BigQueryTableId,
        rows: &[serde_json::Map<String, serde_json::Value>],
    ) -> SyncResult<()> {
        let insert = || async move {
            let mut request = TableDataInsertAllRequest::new();
            for row in rows {
                request
                    .add_row(None, row.clone())
                    .map_err(bq_error_to_sync_error)?;
            }

            let response = self
                .client
                .tabledata()
                .insert_all(&self.project_id, dataset_id, table_id, request)
                .await
                .map_err(|err| {
                    if is_retryable_bq_error(&err) {
                        sync_error!(
                            ErrorKind::DestinationIoError,
                            "BigQuery insert request failed transiently",
                            err
                        )
                    } else {
                        bq_error_to_sync_error(err)
                    }
                })?;

            if let Some(errors) = &response.insert_errors {
                if !errors.is_empty() {
                    return Err(sync_error!(
                        ErrorKind::LoadFailed,
                        "BigQuery rejected rows during insert",
                        format!("{} row error(s): {:?}", errors.len(), errors)
                    ));
                }
            }

            Ok(())
        };

        self.retry
            .run(
                "bigquery insert_all",
                |err| err.kind() == ErrorKind::DestinationIoError,
                insert,
            )
            .await
    }

    /// Sanitizes a BigQuery identifier for safe backtick quoting.
    ///
    /// Rejects empty identifiers and identifiers containing control characters.
    /// Backticks and backslashes are escaped per GoogleSQL lexical rules so the
    /// value can be wrapped in backticks without allowing statement breaks.
    fn sanitize_identifier(identifier: &str, context: &str) -> SyncResult<String> {
        if identifier.is_empty() {
            return Err(sync_error!(
                ErrorKind::DestinationTableNameInvalid,
                "Invalid BigQuery identifier",
                format!("{context} cannot be empty")
            ));
        }

        if identifier.chars().any(char::is_control) {
            return Err(sync_error!(
                ErrorKind::DestinationTableNameInvalid,
                "Invalid BigQuery identifier",
                format!("{context} contains control characters")
            ));
        }

        let mut escaped = String::with_capacity(identifier.len());

        for ch in identifier.chars() {
            match ch {
                '`' => escaped.push_str("\\`"),
                '\\' => escaped.push_str("\\\\"),
                _ => escaped.push(ch),
            }
        }

        Ok(escaped)
    }

    /// Escapes a value for embedding in a single-quoted SQL string literal.
    pub fn escape_string_literal(value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for ch in value.chars() {
            match ch {
                '\'' => escaped.push_str("\\'"),
                '\\' => escaped.push_str("\\\\"),
                _ => escaped.push(ch),
            }
        }
        escaped
    }

    /// Generates the SQL column specification for one column.
    fn column_spec(column_schema: &ColumnSchema) -> SyncResult<String> {
        let column_name = Self::sanitize_identifier(&column_schema.name, "BigQuery column name")?;

        let mut column_spec = format!(
            "`{}` {}",
            column_name,
            Self::column_type_to_bigquery_type(column_schema.typ)
        );

        if !column_schema.nullable {
            column_spec.push_str(" not null");
        }

        Ok(column_spec)
    }

    /// Creates a primary key clause from columns marked as primary.
    fn add_primary_key_clause(schema: &TableSchema) -> SyncResult<String> {
        let key_columns: Vec<String> = schema
            .columns()
            .iter()
            .filter(|column| column.primary)
            .map(|column| {
                Self::sanitize_identifier(&column.name, "BigQuery primary key column")
                    .map(|name| format!("`{name}`"))
            })
            .collect::<SyncResult<Vec<_>>>()?;

        if key_columns.is_empty() {
            return Ok("".to_string());
        }

        Ok(format!(
            ", primary key ({}) not enforced",
            key_columns.join(",")
        ))
    }

    /// Builds complete column specifications for CREATE TABLE statements.
    pub fn create_columns_spec(schema: &TableSchema) -> SyncResult<String> {
        let mut spec = schema
            .columns()
            .iter()
            .map(Self::column_spec)
            .collect::<SyncResult<Vec<_>>>()?
            .join(",");

        spec.push_str(&Self::add_primary_key_clause(schema)?);

        Ok(format!("({spec})"))
    }

    /// Maps pipeline column types to BigQuery column types.
    fn column_type_to_bigquery_type(typ: ColumnType) -> &'static str {
        match typ {
            ColumnType::Bool => "bool",
            ColumnType::I64 => "int64",
            ColumnType::F64 => "float64",
            ColumnType::Numeric => "numeric",
            ColumnType::String => "string",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Debug for BigQueryClient {
    /// Formats the client for debugging, excluding client internals.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("project_id", &self.project_id)
            .finish()
    }
}
