//! Presentation page served at `/`.
//!
//! The page opens `ws://<host>/ws`, appends every text frame to a `<pre>`,
//! and prints a notice once the socket closes.

const HOST_PLACEHOLDER: &str = "{{HOST}}";

const HOME_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8">
        <title>webtail</title>
        <style>
            body { margin: 0; background: #111; color: #ddd; }
            pre { margin: 0; padding: 1em; white-space: pre-wrap; font: 13px/1.4 monospace; }
        </style>
    </head>
    <body data-host="{{HOST}}">
        <pre id="data"></pre>
        <script>
            (function () {
                var data = document.getElementById("data");
                var scheme = location.protocol === "https:" ? "wss://" : "ws://";
                var conn = new WebSocket(scheme + document.body.dataset.host + "/ws");
                conn.onclose = function () {
                    data.appendChild(document.createTextNode("\nConnection closed\n"));
                };
                conn.onmessage = function (evt) {
                    data.appendChild(document.createTextNode(evt.data));
                    window.scrollTo(0, document.body.scrollHeight);
                };
            })();
        </script>
    </body>
</html>
"#;

/// Render the page for a request that arrived with `Host: host`.
pub fn render_home(host: &str) -> String {
    HOME_HTML.replace(HOST_PLACEHOLDER, &escape_html(host))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
