//! Unfurl renderer: the `share/{id}` route.
//!
//! One fixed route for link-unfurling crawlers. It proxies the same point
//! lookup as the `item` route with the remaining lookup parameters pinned
//! to fixed defaults, and renders the result as an HTML document carrying
//! Open Graph / Twitter preview tags plus a client-side redirect to the
//! canonical viewer URL. Crawlers read the meta tags without executing the
//! redirect; browsers follow it.
//!
//! The verse text is the item's `data` attribute (a JSON-encoded array of
//! text fragments) with fragment `t` fields joined by single spaces. The
//! only escaping applied is `"` -> `&quot;` per fragment; ampersands and
//! angle brackets pass through unescaped. Known gap, kept as-is.

use std::collections::BTreeMap;

use crate::registry::{ParamSource, ParamSpec, RouteDefinition};
use crate::template::{Template, TemplateError};

const SHARE_REQUEST: &str = r#"{"op":"Get","table":"{table}","partition":"${document}|${language}|${translation}","sort":"${id}"}"#;

const UNFURL_HTML: &str = r#"<html>
  <head>
    <link rel="icon" type="image/png" href="https://scrollbible.app/favicon.ico">

    <meta property="og:url" content="https://scrollbible.app/v/${item.id.S}">
    <meta property="twitter:url" content="https://scrollbible.app/v/${item.id.S}">

    <title>${item.reference.S}</title>
    <meta name="title" content="${item.reference.S}">
    <meta property="og:title" content="${item.reference.S}">
    <meta property="twitter:title" content="${item.reference.S}">

    <meta name="description" content="{%for part in json(item.data.S)%}${part.t:escape_quotes}{%if loop.has_next%} {%end%}{%end%}">
    <meta property="og:description" content="{%for part in json(item.data.S)%}${part.t:escape_quotes}{%if loop.has_next%} {%end%}{%end%}">
    <meta property="twitter:description" content="{%for part in json(item.data.S)%}${part.t:escape_quotes}{%if loop.has_next%} {%end%}{%end%}">

    <meta property="twitter:card" content="summary_large_image">
    <meta property="twitter:image" content="">
    <meta property="og:image" content="">

    <meta property="og:type" content="website">
  </head>
  <body>
    <div class="loading-spinner-outer-container">
      <div class="loading-spinner-middle-container">
        <div class="loading-spinner-inner-container">
          <svg class="loading-spinner" xmlns="http://www.w3.org/2000/svg" focusable="false" viewBox="0 0 100 100">
            <circle cx="50%" cy="50%" style="stroke-dasharray: 282.743px; stroke-dashoffset: 141.372px; stroke-width: 10%;" r="45"></circle>
          </svg>
        </div>
      </div>
    </div>
    <style>
      body {
        height: 100%;
        margin: 0;
        display: flex;
        justify-content: center;
        align-items: center;
      }

      body > * {
        margin: auto;
      }

      .loading-spinner-outer-container {
        animation: loading-spinner-outer-container 1568.2352941176ms linear infinite;
        color: rgba(0, 0, 0, 0.87);
        font-size: 0px;
        font-weight: 400;
        height: 100px;
        line-height: 0px;
        position: absolute;
        width: 100px
      }

      .loading-spinner-middle-container {
        animation: loading-spinner-middle-container 5332ms cubic-bezier(0.4, 0, 0.2, 1) infinite both;
        position: absolute;
        height: 100px;
        width: 100px
      }

      .loading-spinner-inner-container {
        display: inline-flex;
        overflow-x: hidden;
        overflow-y: hidden;
        position: relative;
        white-space: nowrap;
        height: 100px;
        width: 50px
      }

      .loading-spinner {
        animation: loading-spinner 1333ms cubic-bezier(0.4, 0, 0.2, 1) infinite both;
        color: rgba(0, 0, 0, 0.87);
        fill: rgba(0, 0, 0, 0);
        height: 100px;
        position: absolute;
        stroke: rgb(63, 81, 181);
        white-space: nowrap;
        width: 100px
      }

      @keyframes loading-spinner {
        0% {
          transform: rotate(265deg);
        }
        50% {
          transform: rotate(130deg);
        }
        100% {
          transform: rotate(265deg);
        }
      }

      @keyframes loading-spinner-middle-container {
        12.5% {
          transform: rotate(135deg);
        }
        25% {
          transform: rotate(270deg);
        }
        37.5% {
          transform: rotate(405deg);
        }
        50% {
          transform: rotate(540deg);
        }
        62.5% {
          transform: rotate(675deg);
        }
        75% {
          transform: rotate(810deg);
        }
        87.5% {
          transform: rotate(945deg);
        }
        100% {
          transform: rotate(1080deg);
        }
      }

      @keyframes loading-spinner-outer-container {
        100% {
          transform: rotate(360deg);
        }
      }
    </style>
    <script>
      window.onload = function() {
        window.location.replace("https://scrollbible.app/v/${item.id.S}");
      }
    </script>
  </body>
</html>
"#;

/// Build the share route bound to the configured table.
pub fn share_route(table: &str) -> Result<RouteDefinition, TemplateError> {
    let mut response_templates = BTreeMap::new();
    response_templates.insert("text/html".to_string(), Template::parse(UNFURL_HTML)?);

    Ok(RouteDefinition {
        name: "share".to_string(),
        parameters: vec![
            ParamSpec::required("id", ParamSource::Path),
            ParamSpec::fixed("language", ParamSource::Query, "en"),
            ParamSpec::fixed("translation", ParamSource::Query, "webp"),
            ParamSpec::fixed("document", ParamSource::Query, "bible"),
        ],
        request_template: Template::parse(&SHARE_REQUEST.replace("{table}", table))?,
        response_templates,
        requires_credential: false,
    })
}
