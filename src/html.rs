//! HTML pages for the upload form

/// What to show under the extracted text
pub enum SpeechPanel<'a> {
    /// Text only, with a button to convert it
    None,
    /// A playable `data:` URI
    Audio(&'a str),
    /// A user-facing failure message
    Error(&'a str),
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn base_template(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{} - docreader</title>
    <style>
        body {{ font-family: sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }}
        textarea {{ width: 100%; min-height: 20rem; font-family: monospace; }}
        .error {{ color: #b00020; }}
        form {{ margin: 1rem 0; }}
    </style>
</head>
<body>
    <header><a href="/">docreader</a></header>
    <main>
        <h1>{}</h1>
        {}
    </main>
</body>
</html>"#,
        html_escape(title),
        html_escape(title),
        content
    )
}

/// Upload form
pub fn index_page() -> String {
    base_template(
        "Extract text",
        r#"<p>Upload a scanned PDF, PNG or JPEG to read its text.</p>
        <form action="/extract" method="post" enctype="multipart/form-data">
            <input type="file" name="file" accept="application/pdf,image/png,image/jpeg" required>
            <button type="submit">Extract text</button>
        </form>"#,
    )
}

/// Extracted text, with the speech form and optional speech result
pub fn result_page(text: &str, speech: SpeechPanel<'_>) -> String {
    let panel = match speech {
        SpeechPanel::None => String::new(),
        SpeechPanel::Audio(data_uri) => format!(
            r#"<audio controls src="{}"></audio>"#,
            html_escape(data_uri)
        ),
        SpeechPanel::Error(message) => {
            format!(r#"<p class="error">{}</p>"#, html_escape(message))
        }
    };

    // Parsers drop one newline right after <textarea>, so one is always
    // emitted to keep a leading newline of the text itself
    let content = format!(
        r#"<form action="/synthesize" method="post">
            <textarea name="text" readonly>
{}</textarea>
            <button type="submit">Convert to speech</button>
        </form>
        {}
        <p><a href="/">Extract another file</a></p>"#,
        html_escape(text),
        panel
    );

    base_template("Extracted text", &content)
}

/// Failure that left no text to show
pub fn error_page(message: &str) -> String {
    let content = format!(
        r#"<p class="error">{}</p>
        <p><a href="/">Try another file</a></p>"#,
        html_escape(message)
    );
    base_template("Extraction failed", &content)
}
