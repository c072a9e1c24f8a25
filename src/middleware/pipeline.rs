//! # Mapping Pipeline
//!
//! Builds the per-mapping request pipeline. Everything that depends only on the
//! mapping (timeout, service method, merged request/response options, error
//! builders, enabled stages) is resolved once in [`Pipeline::build`]; a request then
//! walks the pre-resolved [`StagePlan`].
//!
//! ## Request flow
//! 1. Method gate, then the service method check (both pass to the next handler)
//! 2. Request options (a missing required option fails the request)
//! 3. Plan stages: pre-validation, input transform, input rename, post-validation,
//!    then either the inlet or service dispatch plus the output stages
//! 4. Render
//!
//! Steps 2 to 4 run under the mapping's deadline. Any failure, including an expired
//! deadline, is turned into a packet, rendered, logged, and returned as `Err`.
//!
//! ## Rust Concepts Used
//! - `async_trait` for the [`Stage`] trait objects of a plan
//! - `Arc<dyn Trait>` collaborators shared by every pipeline of a portlet
//! - `tracing::Instrument` to run a request inside its own span

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info_span, trace, Instrument};

use crate::core::config::PortletConfig;
use crate::core::error_catalog::{default_error_codes, ErrorBuilder, ErrorManager, ErrorOptions};
use crate::core::failure::Failure;
use crate::core::types::{Packet, ResponseWriter, RestRequest};
use crate::discovery::service_registry::{ServiceMethod, ServiceSelector};
use crate::discovery::tracelog::{HeaderTracelog, TracelogService};
use crate::mapping::descriptor::{MappingRecord, Section};
use crate::mapping::fields::{deep_merge, omit_paths, rename_fields};
use crate::mapping::hooks::{
    ErrorTransform, InletProcess, InputTransform, OutputTransform, PostValidator, PreValidator,
    Sanitizer, Services, StageContext, Validation,
};
use crate::middleware::error_packet::{ErrorPacketBuilder, ErrorPolicy};
use crate::middleware::options::{extract_request_options, ExtractSettings, RequestOptions};
use crate::middleware::render::{add_default_response_headers, renderer_for, PacketRenderer};
use crate::middleware::request_logging::RequestLog;
use crate::middleware::timeout::TimeoutPolicy;
use crate::middleware::validator::{BasicSchemaValidator, SchemaValidator};
use crate::observability::metrics::{record_failure, record_response, RequestTimer};

/// Continuation to the host's next handler
pub type Next = Box<dyn FnOnce() + Send>;

/// How a request left the pipeline without failing
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The mapping does not serve this request
    Passed,
    /// The pipeline rendered this packet
    Rendered(Packet),
    /// An inlet handled the response; this is what it returned
    Delegated(Value),
}

/// Collaborators shared by every pipeline of a portlet
#[derive(Clone)]
pub struct PipelineContext {
    pub portlet: Arc<PortletConfig>,
    pub error_manager: Arc<dyn ErrorManager>,
    /// Builder of the portlet's own codes (option, timeout and validation errors)
    pub error_builder: Arc<dyn ErrorBuilder>,
    pub service_selector: Arc<dyn ServiceSelector>,
    pub schema_validator: Option<Arc<dyn SchemaValidator>>,
    pub tracelog: Arc<dyn TracelogService>,
    pub renderer: Arc<dyn PacketRenderer>,
}

impl PipelineContext {
    /// Registers the portlet's error codes (over the built-in ones) under `package_name`
    pub fn new(
        package_name: &str,
        portlet: Arc<PortletConfig>,
        error_manager: Arc<dyn ErrorManager>,
        service_selector: Arc<dyn ServiceSelector>,
    ) -> Self {
        let mut codes = default_error_codes();
        codes.extend(portlet.error_codes.clone());
        let error_builder = error_manager.register(package_name, &codes);
        let renderer = renderer_for(portlet.compatibility.optimized_renderer);
        Self {
            portlet,
            error_manager,
            error_builder,
            service_selector,
            schema_validator: Some(Arc::new(BasicSchemaValidator)),
            tracelog: Arc::new(HeaderTracelog::default()),
            renderer,
        }
    }

    pub fn with_schema_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.schema_validator = Some(validator);
        self
    }

    pub fn with_tracelog(mut self, tracelog: Arc<dyn TracelogService>) -> Self {
        self.tracelog = tracelog;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PacketRenderer>) -> Self {
        self.renderer = renderer;
        self
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("portlet", &self.portlet.general_path())
            .field("error_builder", &self.error_builder)
            .field("renderer", &self.renderer)
            .finish()
    }
}

/// Mutable state of one request while it walks the plan
pub struct RequestState {
    pub ctx: StageContext,
    pub response: Arc<dyn ResponseWriter>,
    pub service: ServiceMethod,
    /// Request data before dispatch, service result after
    pub data: Value,
    pub packet: Option<Packet>,
    pub delegated: Option<Value>,
}

/// One enabled step of a plan
#[async_trait]
pub trait Stage: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    async fn run(&self, state: &mut RequestState) -> Result<(), Failure>;
}

/// The enabled stages of one mapping, in execution order
#[derive(Debug, Default)]
pub struct StagePlan {
    stages: Vec<Box<dyn Stage>>,
    error_transform: Option<ErrorTransform>,
    error_renames: Option<Map<String, Value>>,
}

impl StagePlan {
    /// Resolve which stages a mapping enables
    pub fn resolve(
        mapping: &MappingRecord,
        portlet_errors: Arc<dyn ErrorBuilder>,
        response_options: &Map<String, Value>,
    ) -> Self {
        let hooks = mapping.hooks();
        let mut stages: Vec<Box<dyn Stage>> = Vec::new();

        if mapping.enabled(Section::Input) {
            if let Some(hook) = &hooks.pre_validator {
                stages.push(Box::new(PreValidate {
                    hook: hook.clone(),
                    fallback: portlet_errors.clone(),
                }));
            }
            if let Some(hook) = &hooks.input_transform {
                stages.push(Box::new(TransformInput { hook: hook.clone() }));
            }
            if let Some(renames) = mapping.renames(Section::Input) {
                stages.push(Box::new(RenameData {
                    renames: renames.clone(),
                }));
            }
            if let Some(hook) = &hooks.post_validator {
                stages.push(Box::new(PostValidate {
                    hook: hook.clone(),
                    fallback: portlet_errors,
                }));
            }
        }

        match &hooks.inlet_process {
            Some(hook) => stages.push(Box::new(ProcessInlet { hook: hook.clone() })),
            None => {
                let output_enabled = mapping.enabled(Section::Output);
                stages.push(Box::new(CallService));
                stages.push(Box::new(BuildPacket {
                    transform: hooks.output_transform.clone().filter(|_| output_enabled),
                    response_options: response_options.clone(),
                }));
                if output_enabled {
                    if let Some(renames) = mapping.renames(Section::Output) {
                        stages.push(Box::new(RenamePacket {
                            renames: renames.clone(),
                        }));
                    }
                    if let Some(paths) = mapping.output_except() {
                        stages.push(Box::new(ExceptBody { paths }));
                    }
                    if let Some(hook) = &hooks.sanitize {
                        stages.push(Box::new(SanitizeBody { hook: hook.clone() }));
                    }
                }
            }
        }

        let error_enabled = mapping.enabled(Section::Error);
        Self {
            stages,
            error_transform: hooks.error_transform.clone().filter(|_| error_enabled),
            error_renames: mapping
                .renames(Section::Error)
                .filter(|_| error_enabled)
                .cloned(),
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn is_delegating(&self) -> bool {
        self.stages.iter().any(|stage| stage.name() == "inlet")
    }
}

/// Turn a validator result into a failure when it reports `valid: false`
fn check_validation(
    result: Value,
    default_name: &str,
    fallback: &dyn ErrorBuilder,
    services: &Services,
) -> Result<(), Failure> {
    let validation = Validation::from_value(result);
    if validation.valid {
        return Ok(());
    }
    let options = ErrorOptions::payload(json!({
        "errors": validation.errors.unwrap_or(Value::Null)
    }));
    let error = match &validation.error_name {
        Some(name) => services.error_builder.new_error(name, options),
        None => fallback.new_error(default_name, options),
    };
    Err(error.into())
}

#[derive(Debug)]
struct PreValidate {
    hook: PreValidator,
    fallback: Arc<dyn ErrorBuilder>,
}

#[async_trait]
impl Stage for PreValidate {
    fn name(&self) -> &'static str {
        "pre_validator"
    }

    async fn run(&self, state: &mut RequestState) -> Result<(), Failure> {
        let result = self.hook.call(state.ctx.clone()).await?;
        check_validation(
            result,
            "RequestPreValidationError",
            self.fallback.as_ref(),
            &state.ctx.services,
        )
    }
}

#[derive(Debug)]
struct TransformInput {
    hook: InputTransform,
}

#[async_trait]
impl Stage for TransformInput {
    fn name(&self) -> &'static str {
        "input_transform"
    }

    async fn run(&self, state: &mut RequestState) -> Result<(), Failure> {
        state.data = self.hook.call(state.ctx.clone()).await?;
        Ok(())
    }
}

#[derive(Debug)]
struct RenameData {
    renames: Map<String, Value>,
}

#[async_trait]
impl Stage for RenameData {
    fn name(&self) -> &'static str {
        "input_rename"
    }

    async fn run(&self, state: &mut RequestState) -> Result<(), Failure> {
        let data = std::mem::take(&mut state.data);
        state.data = rename_fields(data, &self.renames);
        Ok(())
    }
}

#[derive(Debug)]
struct PostValidate {
    hook: PostValidator,
    fallback: Arc<dyn ErrorBuilder>,
}

#[async_trait]
impl Stage for PostValidate {
    fn name(&self) -> &'static str {
        "post_validator"
    }

    async fn run(&self, state: &mut RequestState) -> Result<(), Failure> {
        let result = self.hook.call(state.data.clone(), state.ctx.clone()).await?;
        check_validation(
            result,
            "RequestPostValidationError",
            self.fallback.as_ref(),
            &state.ctx.services,
        )
    }
}

#[derive(Debug)]
struct ProcessInlet {
    hook: InletProcess,
}

#[async_trait]
impl Stage for ProcessInlet {
    fn name(&self) -> &'static str {
        "inlet"
    }

    async fn run(&self, state: &mut RequestState) -> Result<(), Failure> {
        let data = std::mem::take(&mut state.data);
        let result = self
            .hook
            .call(
                state.service.clone(),
                state.response.clone(),
                data,
                state.ctx.clone(),
            )
            .await?;
        state.delegated = Some(result);
        Ok(())
    }
}

#[derive(Debug)]
struct CallService;

#[async_trait]
impl Stage for CallService {
    fn name(&self) -> &'static str {
        "service"
    }

    async fn run(&self, state: &mut RequestState) -> Result<(), Failure> {
        let data = std::mem::take(&mut state.data);
        state.data = state.service.call(data, state.ctx.options.clone()).await?;
        Ok(())
    }
}

#[derive(Debug)]
struct BuildPacket {
    transform: Option<OutputTransform>,
    response_options: Map<String, Value>,
}

#[async_trait]
impl Stage for BuildPacket {
    fn name(&self) -> &'static str {
        "output_transform"
    }

    async fn run(&self, state: &mut RequestState) -> Result<(), Failure> {
        let result = std::mem::take(&mut state.data);
        let packet = match &self.transform {
            Some(transform) => {
                let output = transform.call(result, state.ctx.clone()).await?;
                match &output {
                    Value::Object(object) if object.contains_key("body") => Packet::from_value(output),
                    _ => Packet::with_body(output),
                }
            }
            None => Packet::with_body(result),
        };
        state.packet = Some(add_default_response_headers(packet, &self.response_options));
        Ok(())
    }
}

#[derive(Debug)]
struct RenamePacket {
    renames: Map<String, Value>,
}

#[async_trait]
impl Stage for RenamePacket {
    fn name(&self) -> &'static str {
        "output_rename"
    }

    async fn run(&self, state: &mut RequestState) -> Result<(), Failure> {
        if let Some(packet) = state.packet.take() {
            state.packet = Some(Packet::from_value(rename_fields(
                packet.to_value(),
                &self.renames,
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct ExceptBody {
    paths: Vec<String>,
}

#[async_trait]
impl Stage for ExceptBody {
    fn name(&self) -> &'static str {
        "output_except"
    }

    async fn run(&self, state: &mut RequestState) -> Result<(), Failure> {
        if let Some(packet) = state.packet.as_mut().filter(|p| p.body.is_object()) {
            packet.body = omit_paths(&packet.body, &self.paths);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct SanitizeBody {
    hook: Sanitizer,
}

#[async_trait]
impl Stage for SanitizeBody {
    fn name(&self) -> &'static str {
        "sanitize"
    }

    async fn run(&self, state: &mut RequestState) -> Result<(), Failure> {
        let Some(packet) = state.packet.as_mut().filter(|p| p.body.is_object()) else {
            return Ok(());
        };
        let body = std::mem::take(&mut packet.body);
        packet.body = self.hook.call(body, state.ctx.clone()).await?;
        Ok(())
    }
}

/// The request pipeline of one mapping
pub struct Pipeline {
    map_path: String,
    methods: Option<Vec<String>>,
    service: Option<ServiceMethod>,
    timeout: TimeoutPolicy,
    request_options: Map<String, Value>,
    user_agent_enabled: bool,
    plan: StagePlan,
    errors: ErrorPacketBuilder,
    portlet_errors: Arc<dyn ErrorBuilder>,
    mapping_errors: Arc<dyn ErrorBuilder>,
    schema_validator: Option<Arc<dyn SchemaValidator>>,
    tracelog: Arc<dyn TracelogService>,
    renderer: Arc<dyn PacketRenderer>,
    verbose: bool,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("map_path", &self.map_path)
            .field("methods", &self.methods)
            .field("service", &self.service.is_some())
            .field("timeout", &self.timeout)
            .field("plan", &self.plan)
            .finish()
    }
}

/// Portlet defaults with the mapping's overrides merged on top
fn merged_options(defaults: &Map<String, Value>, overrides: Option<&Map<String, Value>>) -> Map<String, Value> {
    let mut merged = Value::Object(defaults.clone());
    if let Some(overrides) = overrides {
        deep_merge(&mut merged, &Value::Object(overrides.clone()));
    }
    match merged {
        Value::Object(merged) => merged,
        _ => Map::new(),
    }
}

impl Pipeline {
    pub fn build(context: &PipelineContext, mapping: &MappingRecord) -> Self {
        let portlet = &context.portlet;
        let map_path = mapping.path().first().unwrap_or_default().to_string();

        let resolver = mapping
            .service_resolver()
            .unwrap_or(portlet.service_resolver.as_str());
        let service = match (mapping.service_name(), mapping.method_name()) {
            (Some(service_name), Some(method_name)) => context
                .service_selector
                .lookup_method(resolver, service_name, method_name)
                .map(|found| found.method),
            _ => None,
        };
        if service.is_none() && mapping.hooks().inlet_process.is_none() {
            debug!(
                map_path = %map_path,
                service = ?mapping.service_name(),
                method = ?mapping.method_name(),
                "No service method resolved; requests will pass through"
            );
        }

        let request_options = merged_options(&portlet.request_options, mapping.request_options());
        let response_options = merged_options(&portlet.response_options, mapping.response_options());

        let mapping_errors = mapping
            .error_source()
            .and_then(|source| context.error_manager.get_error_builder(source))
            .unwrap_or_else(|| context.error_builder.clone());

        let plan = StagePlan::resolve(mapping, context.error_builder.clone(), &response_options);
        let errors = ErrorPacketBuilder::new(
            ErrorPolicy::from_flags(&portlet.compatibility),
            response_options,
        )
        .with_development_mode(portlet.development_mode);

        Self {
            map_path,
            methods: mapping.methods(),
            service,
            timeout: TimeoutPolicy::for_mapping(mapping, portlet),
            request_options,
            user_agent_enabled: portlet.user_agent_enabled,
            plan,
            errors,
            portlet_errors: context.error_builder.clone(),
            mapping_errors,
            schema_validator: context.schema_validator.clone(),
            tracelog: context.tracelog.clone(),
            renderer: context.renderer.clone(),
            verbose: portlet.verbose,
        }
    }

    pub fn map_path(&self) -> &str {
        &self.map_path
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn timeout(&self) -> TimeoutPolicy {
        self.timeout
    }

    pub fn accepts_method(&self, method: &str) -> bool {
        self.methods
            .as_ref()
            .map(|methods| methods.iter().any(|m| m.eq_ignore_ascii_case(method)))
            .unwrap_or(false)
    }

    /// Run the pipeline for one request, writing the response through `response`
    pub async fn run(
        &self,
        request: Arc<RestRequest>,
        response: Arc<dyn ResponseWriter>,
    ) -> Result<PipelineOutcome, Failure> {
        if !self.accepts_method(request.method.as_str()) {
            return Ok(PipelineOutcome::Passed);
        }
        let request_id = self.tracelog.get_request_id(&request);
        let log = RequestLog::new(&request_id, &self.map_path);
        log.arrived(request.method.as_str(), &request.url(), self.methods.as_deref());

        let Some(service) = self.service.clone() else {
            return Ok(PipelineOutcome::Passed);
        };

        let span = info_span!(
            "restfront_request",
            request_id = %request_id,
            map_path = %self.map_path,
            method = %request.method
        );
        let timer = RequestTimer::start(&self.map_path);

        let mut missing = Vec::new();
        let settings = ExtractSettings {
            user_agent_enabled: self.user_agent_enabled,
            extensions: vec![
                ("requestId".to_string(), Some(Value::String(request_id.clone()))),
                ("timeout".to_string(), self.timeout.as_millis().map(Value::from)),
            ],
        };
        let options = extract_request_options(&request, &self.request_options, &settings, Some(&mut missing));
        let ctx = StageContext {
            request,
            options: Arc::new(options),
            services: Services {
                error_builder: self.mapping_errors.clone(),
                schema_validator: self.schema_validator.clone(),
                span: span.clone(),
            },
        };

        let chain = self.execute(ctx.clone(), response.clone(), service, missing, &log);
        let settled = match self.timeout.run(chain.instrument(span.clone())).await {
            Ok(settled) => settled,
            Err(exceeded) => {
                log.timed_out(exceeded.after);
                Err(self.timeout_error(&ctx.options))
            }
        };

        let result = match settled {
            Ok(outcome) => Ok(outcome),
            Err(failure) => {
                self.fail(failure, ctx, response.as_ref(), &log)
                    .instrument(span)
                    .await
            }
        };
        timer.finish();
        log.ended();
        result
    }

    /// Whether this pipeline serves `request`: an accepted method and a resolved
    /// service method
    pub fn serves(&self, request: &RestRequest) -> bool {
        self.accepts_method(request.method.as_str()) && self.service.is_some()
    }

    /// Host-style entry point. A request the mapping does not serve goes to `next`:
    /// inline when not verbose, from the returned future when verbose. Served
    /// requests are spawned when not verbose; verbose pipelines return the pending run.
    pub fn invoke(
        self: &Arc<Self>,
        request: Arc<RestRequest>,
        response: Arc<dyn ResponseWriter>,
        next: Next,
    ) -> Option<BoxFuture<'static, Result<PipelineOutcome, Failure>>> {
        if !self.serves(&request) {
            if self.verbose {
                return Some(
                    async move {
                        next();
                        Ok(PipelineOutcome::Passed)
                    }
                    .boxed(),
                );
            }
            next();
            return None;
        }

        let pipeline = Arc::clone(self);
        let run = async move { pipeline.run(request, response).await }.boxed();
        if self.verbose {
            Some(run)
        } else {
            tokio::spawn(run);
            None
        }
    }

    async fn execute(
        &self,
        ctx: StageContext,
        response: Arc<dyn ResponseWriter>,
        service: ServiceMethod,
        missing: Vec<String>,
        log: &RequestLog,
    ) -> Result<PipelineOutcome, Failure> {
        if !missing.is_empty() {
            let error = self.portlet_errors.new_error(
                "RequestOptionNotFound",
                ErrorOptions {
                    payload: Some(json!({ "requestOptions": missing })),
                    language: language_of(&ctx.options),
                    message: None,
                },
            );
            return Err(error.into());
        }

        let mut state = RequestState {
            data: ctx.request.body.clone(),
            ctx,
            response,
            service,
            packet: None,
            delegated: None,
        };
        for stage in &self.plan.stages {
            trace!(stage = stage.name(), "Running stage");
            stage.run(&mut state).await?;
        }

        match (state.delegated, state.packet) {
            (Some(result), _) => Ok(PipelineOutcome::Delegated(result)),
            (None, Some(packet)) => {
                self.renderer.render(&packet, state.response.as_ref());
                record_response(packet.status_code.unwrap_or(200));
                log.completed();
                Ok(PipelineOutcome::Rendered(packet))
            }
            (None, None) => Ok(PipelineOutcome::Delegated(state.data)),
        }
    }

    fn timeout_error(&self, options: &RequestOptions) -> Failure {
        self.portlet_errors
            .new_error(
                "RequestTimeoutOnServer",
                ErrorOptions {
                    payload: Some(json!({ "timeout": options.timeout() })),
                    language: language_of(options),
                    message: None,
                },
            )
            .into()
    }

    async fn fail(
        &self,
        failure: Failure,
        ctx: StageContext,
        response: &dyn ResponseWriter,
        log: &RequestLog,
    ) -> Result<PipelineOutcome, Failure> {
        let mut packet = self
            .errors
            .to_packet(failure.clone(), self.plan.error_transform.as_ref(), ctx)
            .await;
        if let Some(renames) = &self.plan.error_renames {
            packet = Packet::from_value(rename_fields(packet.to_value(), renames));
        }
        let status_code = packet.status_code.filter(|code| *code != 0).unwrap_or(500);
        packet.status_code = Some(status_code);

        self.renderer.render(&packet, response);
        record_response(status_code);
        record_failure(&failure.label());
        log.failed(&packet);
        Err(failure)
    }
}

fn language_of(options: &RequestOptions) -> Option<String> {
    options.language_code().map(str::to_string)
}
