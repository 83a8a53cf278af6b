use std::sync::Arc;

use utoipa::openapi::path::{
    HttpMethod, Operation, OperationBuilder, Parameter, ParameterBuilder, ParameterIn, PathItem,
};
use utoipa::openapi::response::{ResponseBuilder, Responses, ResponsesBuilder};
use utoipa::openapi::schema::{ObjectBuilder, SchemaType, Type};
use utoipa::openapi::Required;
use utoipa::OpenApi;

use crate::config::Config;
use crate::endpoints::{Method, ParamType};
use crate::error::{ErrorResponse, HealthResponse};
use crate::handlers;
use crate::router::{HandlerKind, RuntimeRoute};

/// OpenAPI documentation for the fixed routes. The proxied routes are
/// added by [`build`] from the compiled route table, so the docs can
/// never drift from what the gateway actually serves.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "MoodlewareAPI",
        version = "0.1.0",
        description = "A gateway that wraps Moodle web-service functions into individual HTTP endpoints."
    ),
    paths(handlers::health::health_handler),
    components(schemas(ErrorResponse, HealthResponse)),
    tags(
        (name = "health", description = "Gateway health"),
        (name = "auth", description = "Credential exchange"),
    )
)]
pub struct ApiDoc;

/// Generate the full OpenAPI document: the fixed routes plus one
/// operation per compiled route.
pub fn build(config: &Config, routes: &[Arc<RuntimeRoute>]) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    for route in routes {
        let operation = build_operation(config, route);
        let method = http_method(route.spec.method);
        match doc.paths.paths.get_mut(&route.spec.path) {
            Some(item) => match method {
                HttpMethod::Get => item.get = Some(operation),
                HttpMethod::Put => item.put = Some(operation),
                HttpMethod::Post => item.post = Some(operation),
                HttpMethod::Delete => item.delete = Some(operation),
                HttpMethod::Options => item.options = Some(operation),
                HttpMethod::Head => item.head = Some(operation),
                HttpMethod::Patch => item.patch = Some(operation),
                HttpMethod::Trace => item.trace = Some(operation),
            },
            None => {
                doc.paths
                    .paths
                    .insert(route.spec.path.clone(), PathItem::new(method, operation));
            }
        }
    }

    doc
}

fn build_operation(config: &Config, route: &RuntimeRoute) -> Operation {
    let spec = &route.spec;
    let mut operation = OperationBuilder::new()
        .operation_id(Some(spec.function.clone()))
        .summary(Some(spec.description.clone()).filter(|s| !s.is_empty()))
        .tags(Some(spec.tags.clone()).filter(|tags| !tags.is_empty()));

    // moodle_url is only accepted when no fixed backend URL is configured.
    if config.moodle_url.is_none() {
        operation = operation.parameter(query_parameter(
            "moodle_url",
            "URL of the Moodle instance, e.g., 'https://moodle.example.com'.",
            true,
            Type::String,
        ));
    }

    if route.kind != HandlerKind::CredentialExchange {
        operation = operation.parameter(query_parameter(
            "wstoken",
            "Your Moodle token, obtained from the auth endpoint. An 'Authorization: Bearer' header works too and takes precedence.",
            false,
            Type::String,
        ));
    }

    if route.kind == HandlerKind::UniversalForward {
        operation = operation.parameter(query_parameter(
            "wsfunction",
            "Name of the Moodle web-service function to call.",
            true,
            Type::String,
        ));
    }

    for param in &spec.params {
        operation = operation.parameter(query_parameter(
            &param.name,
            &param.description,
            param.required,
            schema_type(param.ty),
        ));
    }

    operation.responses(build_responses(spec.responses.as_ref())).build()
}

fn query_parameter(name: &str, description: &str, required: bool, ty: Type) -> Parameter {
    ParameterBuilder::new()
        .name(name)
        .parameter_in(ParameterIn::Query)
        .required(if required {
            Required::True
        } else {
            Required::False
        })
        .description(Some(description).filter(|d| !d.is_empty()))
        .schema(Some(ObjectBuilder::new().schema_type(SchemaType::Type(ty))))
        .build()
}

/// Declared response metadata passes through opaquely when it parses as an
/// OpenAPI responses object; otherwise the generic contract is documented.
fn build_responses(declared: Option<&serde_json::Value>) -> Responses {
    if let Some(raw) = declared {
        if let Ok(responses) = serde_json::from_value::<Responses>(raw.clone()) {
            return responses;
        }
    }

    ResponsesBuilder::new()
        .response(
            "200",
            ResponseBuilder::new().description("Upstream Moodle response, relayed verbatim"),
        )
        .response(
            "400",
            ResponseBuilder::new().description("Parameter validation failed"),
        )
        .response(
            "502",
            ResponseBuilder::new().description("Moodle backend unreachable"),
        )
        .build()
}

fn schema_type(ty: ParamType) -> Type {
    match ty {
        ParamType::Int => Type::Integer,
        ParamType::Float => Type::Number,
        ParamType::Bool => Type::Boolean,
        // Lists travel as comma-separated strings.
        ParamType::Str | ParamType::List => Type::String,
    }
}

fn http_method(method: Method) -> HttpMethod {
    match method {
        Method::Get => HttpMethod::Get,
        Method::Post => HttpMethod::Post,
        Method::Put => HttpMethod::Put,
        Method::Delete => HttpMethod::Delete,
        Method::Patch => HttpMethod::Patch,
    }
}
