// Static pages and HTML fragments served by the server

use std::time::Duration;

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

pub static FAVICON: &[u8] = include_bytes!("../assets/favicon.ico");

pub const NOT_LOGGED_IN: &str = "<html>
<title>Not logged in</title>
<h3>Not logged in</h3>
Click here to log in: <a href='/login'>Log in</a>.";

pub const UPLOAD_FORM: &str = r#"<!DOCTYPE html>
<title>Upload notebook</title>
<link rel='stylesheet' type='text/css' href='/static/style.css'/>
<h2>Notebook upload</h2>
You can upload a notebook for checking.
<p>
<form method="POST" action="/upload" enctype="multipart/form-data">
	<input type="file" name="notebook">
	<input type="text" name="exercise_id" placeholder="exercise (optional)">
	<input type="submit" value="Upload">
</form>"#;

pub const GIVE_UP: &str = "<title>Something went wrong</title>
<h2>Error</h2>
Something went wrong, please reload this page.
If reloading does not help, wait a minute and retry your upload.
";

pub const LOGGED_OUT: &str = "<!DOCTYPE html><a href='/login'>Log in</a>";

/// Self-reloading placeholder shown while a report is being generated.
pub fn wait_page(reload: Duration) -> String {
    let ms = reload.as_millis();
    format!(
        r#"<title>Please wait</title>
<script>
function refresh(t) {{
	setTimeout("location.reload(true)", t)
}}
</script>
<body onload="refresh({ms})">
<h2>Waiting for {secs} seconds, report is being generated now</h2>
</body>"#,
        ms = ms,
        secs = (ms + 999) / 1000,
    )
}

pub fn upload_succeeded(report_url: &str) -> String {
    format!(
        "<html>
<title>Upload completed</title>
<link rel='stylesheet' type='text/css' href='/static/style.css'/>
<h2>Upload succeeded</h2>
Click here for the <a href='{}'>Report</a>.
",
        escape_html(report_url)
    )
}

pub fn forbidden(email: &str) -> String {
    format!(
        "<title>Forbidden</title>User {} is not authorized.<br>\
         Try a different account and <a href='/login'>log in</a> again.",
        escape_html(email)
    )
}

/// Shown by `/token`. `token` is only present when bearer tokens are enabled.
pub fn token_page(email: Option<&str>, token: Option<&str>) -> String {
    let Some(email) = email else {
        return "Logged out. <a href='/login'>Log in</a>.".to_string();
    };
    let mut page = format!(
        "<p style='font-size: 24pt; text-align: center'>Logged in as {}.<p>\n",
        escape_html(email)
    );
    if let Some(token) = token {
        page.push_str(&format!(
            r#"<p><b>Please copy this token to the notebook</b></p>
<textarea id='token' rows='5' cols='120' onclick='document.getElementById("token").select(); document.execCommand("copy");'>{}</textarea>
<p><button id='copy-text' onclick='document.getElementById("token").select(); document.execCommand("copy");'>Copy</button></p>
"#,
            escape_html(token)
        ));
    }
    page
}

pub const REPORT_STYLE: &str = r#"<style type='text/css'>
h2 {
  color: #697;
  font-size: 10pt;
  font-family: Verdana, Arial, sans-serif;
  margin-top: 2em;
}
.message {
  font-size: 14pt;
  font-weight: medium;
}
.ico {
  font-size: 16pt;
  font-weight: bold;
  padding: 0px 2px 0px 2px;
  margin: 10px 4px 1px 4px;
  background: #EEE;
  border: 1pt solid #DDD;
  border-radius: 3pt;
}
.green {
  color: #2F2;
}
.red {
  color: #F22;
}
.code {
  white-space: pre;
  font-family: monospace;
  background: #F0F0F0;
  padding: 3pt;
  margin: 4pt;
  border: 1pt solid #DDD;
  border-radius: 3pt;
}
.logs {
  font-family: monospace;
  font-size: 10pt;
  background-color: #EEEEEE;
  padding: 4px;
  border-color: #E0E0E0;
  margin: 8px;
}
.error {
  font-size: 14pt;
  color: #F22;
}
</style>
"#;

/// Minimal HTML escaping for text and attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
