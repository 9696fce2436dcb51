//! html pages for the oidc login flow.
//!
//! consolidated here to avoid inline html in handlers.

use wirefire_types::Tailnet;

/// minimal html escaping for interpolated values.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// tailnet selection form rendered after a successful token exchange.
///
/// hidden fields carry the csrf token, the registration (flow) id, and the
/// base64-encoded id token, which is re-verified on submit.
pub fn tailnet_select_page(
    csrf_token: &str,
    rid: &str,
    token_b64: &str,
    tailnets: &[Tailnet],
) -> String {
    let options: String = tailnets
        .iter()
        .map(|t| {
            format!(
                r#"<option value="{}">{} ({})</option>"#,
                t.id,
                escape(&t.name),
                escape(&t.role)
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Choose a Tailnet</title>
    <style>
        body {{ font-family: system-ui, -apple-system, sans-serif; max-width: 600px; margin: 50px auto; padding: 20px; }}
        h1 {{ color: #333; }}
        select, button {{ font-size: 16px; padding: 8px; margin: 8px 0; }}
        button {{ background: #1a1a2e; color: #eee; border: 0; border-radius: 6px; padding: 10px 18px; cursor: pointer; }}
    </style>
</head>
<body>
    <h1>Choose a Tailnet</h1>
    <p>Select the network this device should join:</p>
    <form method="post" action="/oidc/callback">
        <input type="hidden" name="csrf_token" value="{csrf_token}">
        <input type="hidden" name="rid" value="{rid}">
        <input type="hidden" name="token" value="{token_b64}">
        <select name="tailnet">{options}</select>
        <br>
        <button type="submit">Connect device</button>
    </form>
</body>
</html>"#,
        csrf_token = escape(csrf_token),
        rid = escape(rid),
        token_b64 = escape(token_b64),
        options = options,
    )
}
