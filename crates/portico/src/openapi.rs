//! Builds the `/openapi.json` document.
//!
//! Component schemas come from the `ToSchema` derives collected in
//! [`DomainsApiDoc`]; paths are listed in [`ENDPOINTS`].

use portico_provision::http::{paths as domain_paths, DomainsApiDoc};
use utoipa::openapi::{
    path::{HttpMethod, Operation, OperationBuilder, ParameterBuilder, ParameterIn},
    request_body::RequestBodyBuilder,
    tag::TagBuilder,
    Content, InfoBuilder, LicenseBuilder, ObjectBuilder, OpenApi, PathItem, PathsBuilder, Ref,
    Required, Response, ResponseBuilder, Type,
};

use crate::adapters::http::paths;

struct Endpoint {
    method: HttpMethod,
    path: &'static str,
    summary: &'static str,
    tag: &'static str,
    request_body: Option<&'static str>,
    response_body: Option<&'static str>,
    /// `(name, type, description)`
    query: &'static [(&'static str, Type, &'static str)],
}

const fn endpoint(
    method: HttpMethod,
    path: &'static str,
    summary: &'static str,
    response_body: Option<&'static str>,
) -> Endpoint {
    Endpoint {
        method,
        path,
        summary,
        tag: "domains",
        request_body: None,
        response_body,
        query: &[],
    }
}

const ENDPOINTS: &[Endpoint] = &[
    endpoint(
        HttpMethod::Get,
        domain_paths::STATUS,
        "List provisioning status for every custom domain",
        Some("DomainStatusView"),
    ),
    endpoint(
        HttpMethod::Get,
        domain_paths::STATUS_ONE,
        "Provisioning status and state of one workspace",
        Some("DomainStatusView"),
    ),
    endpoint(
        HttpMethod::Post,
        domain_paths::VERIFY_DNS,
        "Check that the workspace domain resolves to the platform ingress",
        Some("DnsCheck"),
    ),
    Endpoint {
        query: &[(
            "preview_only",
            Type::Boolean,
            "Render the virtual host without touching the proxy",
        )],
        ..endpoint(
            HttpMethod::Post,
            domain_paths::PROVISION_NGINX,
            "Write and activate the nginx virtual host",
            Some("StepResult"),
        )
    },
    endpoint(
        HttpMethod::Post,
        domain_paths::PROVISION_SSL,
        "Obtain a certificate and enable HTTPS",
        Some("StepResult"),
    ),
    endpoint(
        HttpMethod::Post,
        domain_paths::PROVISION_FULL,
        "Run DNS verification, proxy configuration and certificate issuance",
        Some("ProvisionReport"),
    ),
    endpoint(
        HttpMethod::Delete,
        domain_paths::REMOVE,
        "Remove the virtual host and certificate of a workspace",
        Some("StepResult"),
    ),
    Endpoint {
        request_body: Some("SetupRequest"),
        ..endpoint(
            HttpMethod::Post,
            domain_paths::SETUP_AUTOMATED,
            "Create or find the workspace for a domain and provision it",
            Some("SetupReport"),
        )
    },
    Endpoint {
        request_body: Some("DomainConfig"),
        ..endpoint(
            HttpMethod::Put,
            domain_paths::WORKSPACE_DOMAIN,
            "Change the domain of a workspace, tearing down the previous one",
            Some("Workspace"),
        )
    },
    endpoint(
        HttpMethod::Delete,
        domain_paths::WORKSPACE,
        "Delete a workspace and its domain configuration",
        Some("StepResult"),
    ),
    Endpoint {
        tag: "system",
        ..endpoint(HttpMethod::Get, paths::HEALTHZ, "Basic liveness probe", None)
    },
    Endpoint {
        tag: "system",
        ..endpoint(
            HttpMethod::Get,
            paths::STATUS,
            "Daemon version, uptime and capability summary",
            None,
        )
    },
];

pub fn build_openapi() -> OpenApi {
    let mut builder = PathsBuilder::new();
    for ep in ENDPOINTS {
        builder = builder.path(ep.path, PathItem::new(ep.method.clone(), build_operation(ep)));
    }

    let info = InfoBuilder::new()
        .title("Portico Domain Provisioning API")
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(
            "Custom domains for workspaces: DNS verification, nginx virtual hosts \
             and ACME certificates.",
        ))
        .license(Some(LicenseBuilder::new().name("Apache-2.0 OR MIT").build()))
        .build();

    let mut openapi = OpenApi::new(info, builder);
    openapi.merge(<DomainsApiDoc as utoipa::OpenApi>::openapi());
    openapi.tags = Some(vec![
        TagBuilder::new()
            .name("system")
            .description(Some("Daemon liveness and status."))
            .build(),
        TagBuilder::new()
            .name("domains")
            .description(Some(
                "Per-workspace domain provisioning. Steps on one workspace are \
                 serialized; a concurrent request gets 409 in_progress.",
            ))
            .build(),
    ]);
    openapi
}

fn build_operation(ep: &Endpoint) -> Operation {
    let mut op = OperationBuilder::new().summary(Some(ep.summary));

    for segment in ep.path.split('/') {
        if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            op = op.parameter(
                ParameterBuilder::new()
                    .name(name)
                    .parameter_in(ParameterIn::Path)
                    .required(Required::True)
                    .schema(Some(ObjectBuilder::new().schema_type(Type::String)))
                    .build(),
            );
        }
    }

    for (name, schema_type, description) in ep.query {
        op = op.parameter(
            ParameterBuilder::new()
                .name(*name)
                .parameter_in(ParameterIn::Query)
                .required(Required::False)
                .description(Some(*description))
                .schema(Some(ObjectBuilder::new().schema_type(schema_type.clone())))
                .build(),
        );
    }

    if let Some(schema_name) = ep.request_body {
        let body = RequestBodyBuilder::new()
            .content("application/json", Content::new(Some(Ref::from_schema_name(schema_name))))
            .required(Some(Required::True))
            .build();
        op = op.request_body(Some(body));
    }

    let ok = match ep.response_body {
        Some(schema_name) => ResponseBuilder::new()
            .description("Success")
            .content("application/json", Content::new(Some(Ref::from_schema_name(schema_name))))
            .build(),
        None => Response::new("Success"),
    };
    op = op.response("200", ok);
    if ep.tag == "domains" {
        let error = || {
            ResponseBuilder::new()
                .description("Error")
                .content("application/json", Content::new(Some(Ref::from_schema_name("ErrorBody"))))
                .build()
        };
        op = op.response("4XX", error()).response("5XX", error());
    }

    let mut operation = op.build();
    operation.tags = Some(vec![ep.tag.to_string()]);
    operation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_domain_route_is_documented() {
        let doc = build_openapi();
        for path in [
            domain_paths::STATUS,
            domain_paths::STATUS_ONE,
            domain_paths::VERIFY_DNS,
            domain_paths::PROVISION_NGINX,
            domain_paths::PROVISION_SSL,
            domain_paths::PROVISION_FULL,
            domain_paths::REMOVE,
            domain_paths::SETUP_AUTOMATED,
            domain_paths::WORKSPACE_DOMAIN,
            domain_paths::WORKSPACE,
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn schemas_are_merged() {
        let doc = build_openapi();
        let schemas = &doc.components.expect("components").schemas;
        assert!(schemas.contains_key("DomainStatusView"));
        assert!(schemas.contains_key("ErrorBody"));
    }

    #[test]
    fn remove_route_is_a_delete() {
        let doc = build_openapi();
        let remove = &doc.paths.paths[domain_paths::REMOVE];
        assert!(remove.delete.is_some());
        assert!(remove.post.is_none());
    }
}
