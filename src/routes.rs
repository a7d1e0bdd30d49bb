//! The built-in declarative route set.
//!
//! Every route binds one store operation. Partition keys are flat delimited
//! strings assembled by the request template (`document|language|translation`);
//! the store's native key type is a plain string, not a structured key.

use std::collections::BTreeMap;

use crate::registry::{ParamSource, ParamSpec, RouteDefinition};
use crate::template::{Template, TemplateError};
use crate::unfurl;

const ITEM_REQUEST: &str = r#"{"op":"Get","table":"{table}","partition":"${document}|${language}|${translation}","sort":"${id}"}"#;

const VERSES_REQUEST: &str = r#"{"op":"Query","table":"{table}","partition":"${document}|${language}|${translation}","sort_prefix":"${prefix}"{%if after%},"start_after":{"partition":"${document}|${language}|${translation}","sort":"${after}"}{%end%}}"#;

const VERSES_DESC_REQUEST: &str = r#"{"op":"Query","table":"{table}","partition":"${document}|${language}|${translation}","sort_prefix":"${prefix}","forward":false{%if after%},"start_after":{"partition":"${document}|${language}|${translation}","sort":"${after}"}{%end%}}"#;

const FEED_REQUEST: &str = r#"{"op":"Query","table":"{table}","index":"feed","partition":"${document}|${language}|${translation}","sort_above":"{%if after%}${after}{%end%}"}"#;

const ITEMS_REQUEST: &str = r#"{"op":"BatchGet","table":"{table}","partition":"${document}|${language}|${translation}","sorts":[{%for id in ids%}"${id}"{%if loop.has_next%},{%end%}{%end%}]}"#;

fn lookup_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::required("document", ParamSource::Query),
        ParamSpec::required("language", ParamSource::Query),
        ParamSpec::required("translation", ParamSource::Query),
    ]
}

fn parse_request(text: &str, table: &str) -> Result<Template, TemplateError> {
    Template::parse(&text.replace("{table}", table))
}

/// The full route set served by the facade, bound to the configured table.
pub fn builtin_routes(table: &str) -> Result<Vec<RouteDefinition>, TemplateError> {
    let mut routes = Vec::new();

    // Point lookup of a single verse.
    let mut params = lookup_params();
    params.push(ParamSpec::required("id", ParamSource::Query));
    routes.push(RouteDefinition {
        name: "item".to_string(),
        parameters: params,
        request_template: parse_request(ITEM_REQUEST, table)?,
        response_templates: BTreeMap::new(),
        requires_credential: true,
    });

    // Prefix range over a chapter or book, ascending.
    let mut params = lookup_params();
    params.push(ParamSpec::required("prefix", ParamSource::Query));
    params.push(ParamSpec::optional("after", ParamSource::Query));
    routes.push(RouteDefinition {
        name: "verses".to_string(),
        parameters: params,
        request_template: parse_request(VERSES_REQUEST, table)?,
        response_templates: BTreeMap::new(),
        requires_credential: true,
    });

    // Same range, descending.
    let mut params = lookup_params();
    params.push(ParamSpec::required("prefix", ParamSource::Query));
    params.push(ParamSpec::optional("after", ParamSource::Query));
    routes.push(RouteDefinition {
        name: "verses-desc".to_string(),
        parameters: params,
        request_template: parse_request(VERSES_DESC_REQUEST, table)?,
        response_templates: BTreeMap::new(),
        requires_credential: true,
    });

    // Chronological feed via the secondary index; the `after` threshold is
    // the cursor, there is no separate continuation key.
    let mut params = lookup_params();
    params.push(ParamSpec::optional("after", ParamSource::Query));
    routes.push(RouteDefinition {
        name: "feed".to_string(),
        parameters: params,
        request_template: parse_request(FEED_REQUEST, table)?,
        response_templates: BTreeMap::new(),
        requires_credential: true,
    });

    // Batch lookup: a comma-delimited `ids` list exploded against one
    // shared partition. The store returns batch items in arbitrary order;
    // nothing here re-aligns them with the `ids` order.
    let mut params = lookup_params();
    params.push(ParamSpec::required("ids", ParamSource::Query));
    routes.push(RouteDefinition {
        name: "items".to_string(),
        parameters: params,
        request_template: parse_request(ITEMS_REQUEST, table)?,
        response_templates: BTreeMap::new(),
        requires_credential: true,
    });

    routes.push(unfurl::share_route(table)?);

    Ok(routes)
}
