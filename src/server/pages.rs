//! Verification Pages
//!
//! HTML rendering for the human side of the device flow.

use crate::types::DevicePage;

/// Escape text for HTML element and attribute content.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
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

/// Render a verification page; the form posts back to `form_action`.
pub fn render_device_page(page: &DevicePage, form_action: &str) -> String {
    let class = if page.is_error { "message error" } else { "message" };

    let form = if page.show_form {
        format!(
            r#"
    <form method="post" action="{action}">
      <label for="code">Device code</label>
      <input id="code" name="code" type="text" value="{code}" autocomplete="off" autofocus
             placeholder="XXXX-XXXX" maxlength="16">
      <button type="submit">Continue</button>
    </form>"#,
            action = escape_html(form_action),
            code = escape_html(&page.code),
        )
    } else {
        String::new()
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Device Login</title>
  <style>
    body {{ font-family: system-ui, sans-serif; max-width: 28rem; margin: 4rem auto; padding: 0 1rem; }}
    .message {{ padding: 0.75rem 1rem; border-radius: 6px; background: #eef6ee; }}
    .error {{ background: #fbeaea; color: #8a1c1c; }}
    input {{ font-size: 1.25rem; letter-spacing: 0.1em; text-transform: uppercase; width: 100%; margin: 0.5rem 0; }}
    button {{ font-size: 1rem; padding: 0.5rem 1.25rem; }}
  </style>
</head>
<body>
  <main>
    <h1>Device Login</h1>
    <p class="{class}">{message}</p>{form}
  </main>
</body>
</html>
"#,
        class = class,
        message = escape_html(&page.message),
        form = form,
    )
}
