//! HTML pages shown in the flow's popup windows.

use crate::flow::Page;
use axum::response::Html;

const SDK_OBJECT: &str = "MobileConnectServerSDK";

/// Render a page descriptor as a complete HTML document.
#[must_use]
pub fn render(page: &Page) -> Html<String> {
    let body = match page {
        Page::Authorized => r#"<h1>Authorized</h1>
<p>You have been signed in with Mobile Connect. This window can be closed.</p>"#
            .to_string(),
        Page::RequestDiscovery => format!(
            "<p>Looking up your mobile operator&hellip;</p>\n{}",
            opener_script("startDiscovery")
        ),
        Page::RequestAuthorization => format!(
            "<p>Continuing with your mobile operator&hellip;</p>\n{}",
            opener_script("startAuthorization")
        ),
        Page::Error { error, description } => format!(
            r#"<h1>Mobile Connect error</h1>
<p class="error">{}</p>
<p class="error_description">{}</p>"#,
            html_escape(error),
            html_escape(description)
        ),
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Mobile Connect</title>
</head>
<body data-page="{name}">
{body}
</body>
</html>"#,
        name = page.name(),
    ))
}

// The popup hands control back to the window that opened it, then closes.
fn opener_script(method: &str) -> String {
    format!(
        r"<script>
if (window.opener && window.opener.{SDK_OBJECT}) {{
    window.opener.{SDK_OBJECT}.{method}();
}}
window.close();
</script>"
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
