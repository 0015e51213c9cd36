//! Embedded UI assets for the reserved routes: the route documentation page,
//! its stylesheet and the GraphQL playground.

use crate::routing::Route;
use std::fmt::Write;

/// Stylesheet served at `{docs_path}/docs.css`.
pub const DOCS_CSS: &str = r#"body{font-family:system-ui,-apple-system,sans-serif;margin:0;padding:2rem;background:#f7f7f9;color:#1d1d1f}
h1{font-size:1.6rem;margin:0 0 1.5rem}
h2{font-size:1.1rem;margin:2rem 0 .75rem}
table{border-collapse:collapse;width:100%;background:#fff;box-shadow:0 1px 2px rgba(0,0,0,.08)}
th,td{text-align:left;padding:.55rem .8rem;border-bottom:1px solid #e6e6ea;vertical-align:top}
th{font-size:.75rem;text-transform:uppercase;letter-spacing:.04em;color:#6e6e73}
code{font-family:ui-monospace,SFMono-Regular,Menlo,monospace;font-size:.9em}
.method{font-weight:600;font-family:ui-monospace,monospace}
.GET{color:#0a7d32}.POST{color:#0057b8}.PUT{color:#a15c00}.PATCH{color:#7a3db8}.DELETE{color:#b3261e}
.tag{display:inline-block;padding:0 .45rem;margin-right:.25rem;border-radius:.6rem;background:#ececf1;font-size:.75rem}
"#;

/// Escape text for HTML element content and attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

// A JSON string literal that is also safe inside a <script> element
fn script_string(raw: &str) -> String {
    serde_json::Value::from(raw)
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
}

/// Route documentation page.
pub fn docs_html(docs_path: &str, routes: &[Route], websocket_paths: &[&str]) -> String {
    let mut html = String::with_capacity(2048);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>API routes</title>\n");
    let _ = writeln!(
        html,
        "<link rel=\"stylesheet\" href=\"{}/docs.css\">",
        escape_html(docs_path.trim_end_matches('/'))
    );
    html.push_str("</head>\n<body>\n<h1>API routes</h1>\n");

    if routes.is_empty() {
        html.push_str("<p>No routes registered.</p>\n");
    } else {
        html.push_str("<table>\n<tr><th>Method</th><th>Path</th><th>Summary</th><th>Tags</th></tr>\n");
        for route in routes {
            let method = route.method.as_str();
            let _ = write!(
                html,
                "<tr><td class=\"method {m}\">{m}</td><td><code>{p}</code></td><td>",
                m = method,
                p = escape_html(&route.pattern)
            );
            if let Some(summary) = &route.doc.summary {
                html.push_str(&escape_html(summary));
            }
            if let Some(description) = &route.doc.description {
                let _ = write!(html, "<br><small>{}</small>", escape_html(description));
            }
            html.push_str("</td><td>");
            for tag in &route.doc.tags {
                let _ = write!(html, "<span class=\"tag\">{}</span>", escape_html(tag));
            }
            html.push_str("</td></tr>\n");
        }
        html.push_str("</table>\n");
    }

    if !websocket_paths.is_empty() {
        html.push_str("<h2>WebSocket endpoints</h2>\n<table>\n<tr><th>Path</th></tr>\n");
        for path in websocket_paths {
            let _ = writeln!(html, "<tr><td><code>{}</code></td></tr>", escape_html(path));
        }
        html.push_str("</table>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

/// Minimal GraphQL playground posting to `endpoint`.
pub fn playground_html(endpoint: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>GraphQL playground</title>
<style>
body{{margin:0;font-family:system-ui,sans-serif;display:flex;flex-direction:column;height:100vh}}
header{{padding:.6rem 1rem;background:#1d1d1f;color:#fff;display:flex;gap:1rem;align-items:center}}
main{{flex:1;display:grid;grid-template-columns:1fr 1fr;gap:1px;background:#ddd}}
textarea,pre{{margin:0;padding:1rem;border:0;font-family:ui-monospace,monospace;font-size:13px;background:#fff;overflow:auto}}
#side{{display:grid;grid-template-rows:3fr 1fr;gap:1px}}
button{{padding:.35rem .9rem;cursor:pointer}}
</style>
</head>
<body>
<header><strong>GraphQL</strong><code id="endpoint"></code><button id="run">Run</button></header>
<main>
<div id="side">
<textarea id="query" spellcheck="false">{{ __typename }}</textarea>
<textarea id="variables" spellcheck="false" placeholder="Variables (JSON)"></textarea>
</div>
<pre id="result"></pre>
</main>
<script>
const endpoint = {endpoint};
document.getElementById("endpoint").textContent = endpoint;
document.getElementById("run").addEventListener("click", async () => {{
  const result = document.getElementById("result");
  const raw = document.getElementById("variables").value.trim();
  let variables = null;
  try {{ variables = raw ? JSON.parse(raw) : null; }} catch (e) {{ result.textContent = "Invalid variables: " + e; return; }}
  const response = await fetch(endpoint, {{
    method: "POST",
    headers: {{"Content-Type": "application/json", "Accept": "application/json"}},
    body: JSON.stringify({{query: document.getElementById("query").value, variables}})
  }});
  result.textContent = JSON.stringify(await response.json(), null, 2);
}});
</script>
</body>
</html>
"#,
        endpoint = script_string(endpoint)
    )
}
