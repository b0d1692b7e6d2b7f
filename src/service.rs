//! Query pipeline for db-lookout.
//!
//! `DataService` is the single entry point the HTTP layer calls. It owns the
//! long-lived caches and runs each request through the same strictly
//! sequential steps:
//!
//! host id → host lookup → allow-list gate (ad-hoc SQL only) → version
//! resolution (versioned specs only) → SQL selection → table check (optional
//! queries only) → execution → envelope.
//!
//! Expected failures become error envelopes at the step that detects them.
//! Only caller bugs (an unparseable host id) come back as `Err` from
//! [`DataService::execute`]; [`DataService::respond`] converts those too.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::allowlist::{self, AllowListGate};
use crate::classify::{ClassifiedError, ErrorClassifier, ErrorKind, KeywordClassifier};
use crate::clock::{system_clock, SharedClock};
use crate::config::{AllowListConfig, Config};
use crate::db::{QueryFormat, QueryParams, QuerySettings, QueryTransport, Row};
use crate::error::{LookoutError, Result};
use crate::hosts::{parse_host_id, HostConfig, HostIdInput, HostRegistry, StaticHostRegistry};
use crate::query::{
    ExecutionMetadata, ExecutionRequest, ExecutionResult, QueryCatalog, QueryConfig,
    QueryExecutor, TableValidator,
};
use crate::response::{error_response, success_response, ApiResponse, ResponseContext};
use crate::version::VersionResolver;

/// Name given to ad-hoc SQL wrapped as a query config.
const AD_HOC_QUERY_NAME: &str = "ad-hoc";

/// A query request as received from an API client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    pub host_id: HostIdInput,
    /// Ad-hoc SQL, checked against the allow-list.
    #[serde(default)]
    pub sql: Option<String>,
    /// Name of a catalog query.
    #[serde(default)]
    pub query_config_name: Option<String>,
    #[serde(default)]
    pub params: QueryParams,
    #[serde(default)]
    pub format: Option<QueryFormat>,
    #[serde(default)]
    pub settings: QuerySettings,
}

impl InboundRequest {
    /// Creates a request for a catalog query.
    pub fn named(host_id: impl Into<HostIdInput>, name: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            sql: None,
            query_config_name: Some(name.into()),
            params: QueryParams::new(),
            format: None,
            settings: QuerySettings::new(),
        }
    }

    /// Creates a request for ad-hoc SQL.
    pub fn ad_hoc(host_id: impl Into<HostIdInput>, sql: impl Into<String>) -> Self {
        Self {
            sql: Some(sql.into()),
            query_config_name: None,
            ..Self::named(host_id, "")
        }
    }

    /// Adds a parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// What the request asks to run.
enum QuerySource<'a> {
    Named(&'a str),
    AdHoc(&'a str),
}

impl<'a> QuerySource<'a> {
    fn from_request(request: &'a InboundRequest) -> std::result::Result<Self, ClassifiedError> {
        match (request.query_config_name.as_deref(), request.sql.as_deref()) {
            (Some(name), None) if !name.is_empty() => Ok(Self::Named(name)),
            (None, Some(sql)) if !sql.trim().is_empty() => Ok(Self::AdHoc(sql)),
            (Some(_), Some(_)) => Err(ClassifiedError::validation(
                "Provide either sql or queryConfigName, not both",
            )),
            _ => Err(ClassifiedError::validation(
                "Missing query: sql or queryConfigName is required",
            )),
        }
    }
}

/// Long-lived service owning the caches and running the query pipeline.
pub struct DataService {
    registry: Arc<dyn HostRegistry>,
    executor: QueryExecutor,
    versions: VersionResolver,
    validator: TableValidator,
    allow_list: AllowListGate,
    catalog: QueryCatalog,
    classifier: Arc<dyn ErrorClassifier>,
}

impl DataService {
    /// Starts building a service over a registry and transport.
    pub fn builder(
        registry: Arc<dyn HostRegistry>,
        transport: Arc<dyn QueryTransport>,
    ) -> DataServiceBuilder {
        DataServiceBuilder::new(registry, transport)
    }

    /// Builds a service from loaded configuration with the built-in catalog.
    pub fn from_config(config: &Config, transport: Arc<dyn QueryTransport>) -> Result<Self> {
        let registry = Arc::new(StaticHostRegistry::new(config.host_configs()?));
        Ok(Self::builder(registry, transport)
            .allow_list_source(config.allow_list.clone())
            .allow_list_ttl(config.cache.allow_list_ttl())
            .version_ttl(config.cache.version_ttl())
            .build())
    }

    /// Configured hosts.
    pub fn hosts(&self) -> Vec<HostConfig> {
        self.registry.list_hosts()
    }

    pub fn catalog(&self) -> &QueryCatalog {
        &self.catalog
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn allow_list(&self) -> &AllowListGate {
        &self.allow_list
    }

    pub fn versions(&self) -> &VersionResolver {
        &self.versions
    }

    /// Runs a request and always produces a response.
    ///
    /// Errors that escape the pipeline are classified here, so callers never
    /// see anything but an envelope.
    pub async fn respond(&self, request: &InboundRequest, ctx: ResponseContext) -> ApiResponse {
        match self.execute(request, ctx.clone()).await {
            Ok(response) => response,
            Err(e) => error_response(&self.classify(&e), &ctx),
        }
    }

    /// Runs a request through the pipeline.
    ///
    /// Fails with [`LookoutError::InvalidHostId`] when the host id is not a
    /// finite integer; every other failure is returned as an error envelope.
    pub async fn execute(
        &self,
        request: &InboundRequest,
        ctx: ResponseContext,
    ) -> Result<ApiResponse> {
        let host_id = parse_host_id(&request.host_id)?;
        let ctx = ctx.with_host_id(host_id);

        let host = match self.executor.resolve_host(host_id) {
            Ok(host) => host,
            Err(e) => return Ok(error_response(&e, &ctx)),
        };
        let ctx = ctx.with_host(host.name.clone());

        Ok(match self.run(request, &host, host_id).await {
            Ok((rows, metadata)) => success_response(rows, metadata),
            Err(e) => error_response(&e, &ctx),
        })
    }

    async fn run(
        &self,
        request: &InboundRequest,
        host: &HostConfig,
        host_id: i64,
    ) -> std::result::Result<(Vec<Row>, ExecutionMetadata), ClassifiedError> {
        let config: Cow<'_, QueryConfig> = match QuerySource::from_request(request)? {
            QuerySource::Named(name) => {
                Cow::Borrowed(self.catalog.get(name).ok_or_else(|| {
                    ClassifiedError::validation(format!("Unknown queryConfigName '{name}'"))
                        .with_detail("queryConfigName", name)
                })?)
            }
            QuerySource::AdHoc(sql) => {
                self.allow_list
                    .check(host, sql)
                    .await
                    .map_err(|e| ClassifiedError::permission(e.detail()))?;
                Cow::Owned(QueryConfig::new(AD_HOC_QUERY_NAME, sql))
            }
        };

        let version = if config.spec.needs_version() {
            Some(
                self.versions
                    .resolve(host)
                    .await
                    .map_err(|e| self.classify(&e))?,
            )
        } else {
            None
        };

        let sql = config
            .spec
            .select_sql(version.as_ref())
            .map_err(|e| self.classify(&e))?;

        if config.optional {
            let validation = self
                .validator
                .validate(host, sql, &config.table_check)
                .await
                .map_err(|e| self.classify(&e))?;
            if !validation.should_proceed {
                return Err(ClassifiedError::missing_tables(validation.missing_tables)
                    .with_detail("queryConfigName", config.name.clone()));
            }
        }

        let mut settings = config.settings.clone();
        settings.extend(request.settings.clone());

        let exec_request = ExecutionRequest {
            host_id,
            sql: sql.to_string(),
            params: config.merged_params(&request.params),
            format: request.format.unwrap_or_default(),
            settings,
        };

        debug!(host_id, query = %config.name, "Executing query");

        match self.executor.execute_on(host, &exec_request).await {
            ExecutionResult::Success { rows, mut metadata } => {
                metadata.server_version = version.map(|v| v.raw);
                Ok((rows, metadata))
            }
            ExecutionResult::Failure(e) => Err(e),
        }
    }

    /// Classifies an error. Variants that already say whose fault it is skip
    /// the keyword rules; internal errors are never blamed on the caller.
    fn classify(&self, error: &LookoutError) -> ClassifiedError {
        match error {
            LookoutError::Validation(msg) => {
                ClassifiedError::new(ErrorKind::ValidationError, msg.clone())
            }
            LookoutError::InvalidHostId(_) => {
                ClassifiedError::new(ErrorKind::ValidationError, error.to_string())
            }
            LookoutError::Internal(msg) => ClassifiedError::new(ErrorKind::QueryError, msg.clone()),
            other => self.classifier.classify(other),
        }
    }
}

/// Builder for [`DataService`].
pub struct DataServiceBuilder {
    registry: Arc<dyn HostRegistry>,
    transport: Arc<dyn QueryTransport>,
    catalog: QueryCatalog,
    clock: SharedClock,
    allow_list_source: AllowListConfig,
    allow_list_ttl: Duration,
    version_ttl: Duration,
    classifier: Arc<dyn ErrorClassifier>,
}

impl DataServiceBuilder {
    fn new(registry: Arc<dyn HostRegistry>, transport: Arc<dyn QueryTransport>) -> Self {
        Self {
            registry,
            transport,
            catalog: QueryCatalog::builtin(),
            clock: system_clock(),
            allow_list_source: AllowListConfig::default(),
            allow_list_ttl: allowlist::DEFAULT_TTL,
            version_ttl: Duration::from_secs(600),
            classifier: Arc::new(KeywordClassifier::default()),
        }
    }

    pub fn catalog(mut self, catalog: QueryCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn allow_list_source(mut self, source: AllowListConfig) -> Self {
        self.allow_list_source = source;
        self
    }

    pub fn allow_list_ttl(mut self, ttl: Duration) -> Self {
        self.allow_list_ttl = ttl;
        self
    }

    pub fn version_ttl(mut self, ttl: Duration) -> Self {
        self.version_ttl = ttl;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn build(self) -> DataService {
        DataService {
            executor: QueryExecutor::with_classifier(
                Arc::clone(&self.registry),
                Arc::clone(&self.transport),
                Arc::clone(&self.classifier),
            ),
            versions: VersionResolver::with_clock(
                Arc::clone(&self.transport),
                Arc::clone(&self.clock),
                self.version_ttl,
            ),
            validator: TableValidator::new(Arc::clone(&self.transport)),
            allow_list: AllowListGate::with_clock(
                Arc::clone(&self.transport),
                self.allow_list_source,
                self.clock,
                self.allow_list_ttl,
            ),
            registry: self.registry,
            catalog: self.catalog,
            classifier: self.classifier,
        }
    }
}
