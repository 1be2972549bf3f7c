//! Execution orchestrator.
//!
//! Per call: resolve configuration and credentials through the cached
//! single-flight loaders, prepare params (defaults + input resources),
//! wire up the signer/adapter/handler trio, run, return the shaped
//! response. Each call gets its own adapter and handler; the only
//! shared mutable state is the cache.

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use serde_json::Value;
use tracing::{debug, warn};

use crate::adapter::HttpAdapter;
use crate::config::{ConfigStore, Credentials, MethodConfig};
use crate::context::CallerContext;
use crate::error::{EngineError, Result};
use crate::handler::{Handler, HandlerRequest, HandlerResponse, PostOutcome, ResponseData};
use crate::resource::ResourceResolver;
use crate::schema;
use crate::signer::SignerStrategy;
use crate::store::{FileStore, UsageMeter};
use crate::util::cache::SingleFlight;

/// Engine-wide tunables.
#[derive(Debug, Clone, Builder)]
pub struct EngineSettings {
    /// TTL for cached method configs and credentials.
    #[builder(default = Duration::from_secs(30))]
    pub cache_ttl: Duration,

    #[builder(default = 256)]
    pub cache_capacity: usize,

    /// Timeout applied when a method declares none.
    #[builder(default = Duration::from_secs(30))]
    pub default_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The dynamic tool execution engine.
pub struct Engine {
    config_store: Arc<dyn ConfigStore>,
    usage_meter: Arc<dyn UsageMeter>,
    resolver: ResourceResolver,
    settings: EngineSettings,
    methods: SingleFlight<Arc<MethodConfig>>,
    credentials: SingleFlight<Credentials>,
}

impl Engine {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        file_store: Arc<dyn FileStore>,
        usage_meter: Arc<dyn UsageMeter>,
    ) -> Self {
        Self::with_settings(config_store, file_store, usage_meter, EngineSettings::default())
    }

    pub fn with_settings(
        config_store: Arc<dyn ConfigStore>,
        file_store: Arc<dyn FileStore>,
        usage_meter: Arc<dyn UsageMeter>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            config_store,
            usage_meter,
            resolver: ResourceResolver::new(file_store),
            methods: SingleFlight::new(settings.cache_capacity, settings.cache_ttl),
            credentials: SingleFlight::new(settings.cache_capacity, settings.cache_ttl),
            settings,
        }
    }

    /// Drop cached configuration for one toolset, forcing a reload on
    /// the next call.
    pub fn invalidate_toolset(&self, toolset_key: &str) {
        self.methods.invalidate_prefix(&format!("{toolset_key}::"));
        self.credentials.invalidate(toolset_key);
    }

    /// Execute one tool call. Every terminal outcome — including
    /// configuration and resource failures — comes back as a structured
    /// [`HandlerResponse`].
    pub async fn execute(
        &self,
        toolset_key: &str,
        method_name: &str,
        params: Value,
        ctx: CallerContext,
    ) -> HandlerResponse {
        match self.execute_inner(toolset_key, method_name, params, ctx).await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    toolset = toolset_key,
                    method = method_name,
                    error = %err,
                    "tool call failed"
                );
                HandlerResponse::from_engine_error(&err)
            }
        }
    }

    async fn execute_inner(
        &self,
        toolset_key: &str,
        method_name: &str,
        params: Value,
        mut ctx: CallerContext,
    ) -> Result<HandlerResponse> {
        ctx.toolset_key = toolset_key.to_string();
        ctx.tool_name = method_name.to_string();

        let method = self.load_method(toolset_key, method_name).await?;
        let credentials = self.load_credentials(toolset_key).await?;

        debug!(
            toolset = toolset_key,
            method = method_name,
            polling = method.polling.is_some(),
            "executing tool call"
        );

        let mut params = if params.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            params
        };
        schema::fill_defaults(&mut params, &method.input_schema);
        schema::validate_params(&params, &method.input_schema)
            .map_err(EngineError::InvalidArgument)?;

        let params = self
            .resolver
            .resolve_inputs(params, &method.input_schema, &ctx)
            .await?;

        let signer = SignerStrategy::select(&credentials);
        let adapter = HttpAdapter::new(signer, method.polling.clone())?;
        let mut handler = Handler::new(adapter, method.clone(), self.settings.default_timeout);

        let injected = credentials;
        handler.set_pre_handler(move |mut request: HandlerRequest| {
            let creds = injected.clone();
            async move {
                request.credentials = creds;
                Ok(request)
            }
        });

        let resolver = self.resolver.clone();
        let usage_meter = self.usage_meter.clone();
        let post_method = method.clone();
        handler.set_post_handler(move |request: HandlerRequest, data: ResponseData| {
            let resolver = resolver.clone();
            let usage_meter = usage_meter.clone();
            let method = post_method.clone();
            async move {
                if let Some(billing) = method.billing.clone() {
                    // Fire-and-forget: metering can never affect the
                    // call result.
                    let ctx = request.context.clone();
                    let params = request.params.clone();
                    let meter = usage_meter.clone();
                    tokio::spawn(async move {
                        if let Err(err) = meter.record_usage(&ctx, &billing, &params).await {
                            warn!(tool = ctx.tool_name.as_str(), error = %err, "usage metering failed");
                        }
                    });
                }

                match data {
                    ResponseData::Binary { bytes, mime_type } => {
                        let (body, files) = resolver
                            .persist_binary(bytes, &mime_type, &request.context)
                            .await?;
                        Ok(PostOutcome {
                            data: ResponseData::Json(body),
                            files,
                        })
                    }
                    ResponseData::Json(value) => {
                        let (body, files) = resolver
                            .persist_outputs(value, &method.output_schema, &request.context)
                            .await?;
                        Ok(PostOutcome {
                            data: ResponseData::Json(body),
                            files,
                        })
                    }
                }
            }
        });

        handler
            .handle(HandlerRequest {
                params,
                credentials: Credentials::default(),
                context: ctx,
            })
            .await
    }

    async fn load_method(&self, toolset_key: &str, method_name: &str) -> Result<Arc<MethodConfig>> {
        let key = format!("{toolset_key}::{method_name}");
        self.methods
            .get_or_load(&key, || async {
                self.config_store
                    .get_method_config(toolset_key, method_name)
                    .await?
                    .map(Arc::new)
                    .ok_or_else(|| EngineError::MethodNotFound {
                        toolset: toolset_key.to_string(),
                        method: method_name.to_string(),
                    })
            })
            .await
    }

    async fn load_credentials(&self, toolset_key: &str) -> Result<Credentials> {
        self.credentials
            .get_or_load(toolset_key, || async {
                self.config_store.get_credentials(toolset_key).await
            })
            .await
    }
}
