//! Server-rendered chat page.

use std::fmt::Write as _;

use crate::chat::ChatMode;
use crate::config::ModelSection;
use crate::interaction::RenderView;
use crate::session::TurnRole;

/// Minimal HTML escaping for text and attribute values.
#[must_use]
pub fn escape(input: &str) -> String {
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

/// Generate the HTML shell for the application.
fn html_shell(title: &str, sidebar: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <script src="https://cdnjs.cloudflare.com/ajax/libs/mathjax/2.7.7/MathJax.js?config=TeX-MML-AM_CHTML" async></script>
    <script src="https://cdn.jsdelivr.net/npm/marked@12.0.2/marked.min.js"></script>
    <script src="https://cdn.jsdelivr.net/npm/dompurify@3.1.6/dist/purify.min.js"></script>
    <script type="text/x-mathjax-config">MathJax.Hub.Config({{tex2jax: {{inlineMath: [['\(', '\)']], displayMath: [['\[', '\]']], processEscapes: true}}}});</script>
    <style>
        body {{ font-family: system-ui, sans-serif; margin: 0; display: flex; min-height: 100vh; }}
        aside {{ width: 20rem; padding: 1rem; background: #f4f4f8; }}
        main {{ flex: 1; padding: 1rem 2rem; max-width: 48rem; }}
        .turn {{ padding: 0.5rem 0.75rem; margin: 0.5rem 0; border-radius: 0.5rem; white-space: pre-wrap; }}
        .turn.user {{ background: #e8f0fe; }}
        .turn.model {{ background: #fef7e0; }}
        .turn.rendered {{ white-space: normal; }}
        .error {{ background: #fde8e8; color: #8a1c1c; padding: 0.75rem; border-radius: 0.5rem; }}
        label {{ display: block; margin-top: 0.75rem; }}
    </style>
</head>
<body>
    <aside>
        <h2>Options</h2>
        {sidebar}
    </aside>
    <main>
        <h1>Chatbot</h1>
        {content}
    </main>
    <script>
        // Math spans are set aside so markdown escapes leave the TeX delimiters intact.
        document.querySelectorAll('.turn.markdown').forEach(function (el) {{
            if (!window.marked || !window.DOMPurify) return;
            var math = [];
            var source = el.textContent.replace(/\\\(.+?\\\)|\\\[[\s\S]+?\\\]/g, function (m) {{
                math.push(m);
                return '@@MATH' + (math.length - 1) + '@@';
            }});
            var html = DOMPurify.sanitize(marked.parse(source));
            el.innerHTML = html.replace(/@@MATH(\d+)@@/g, function (_, i) {{
                return math[Number(i)].replace(/&/g, '&amp;').replace(/</g, '&lt;');
            }});
            el.classList.add('rendered');
        }});
        if (window.MathJax && MathJax.Hub) MathJax.Hub.Queue(['Typeset', MathJax.Hub]);
    </script>
</body>
</html>"#
    )
}

fn list_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return format!("<p>{}</p>", escape(empty));
    }
    let mut out = String::from("<ol>");
    for item in items {
        let _ = write!(out, "<li>{}</li>", escape(item));
    }
    out.push_str("</ol>");
    out
}

fn sidebar(view: &RenderView, models: &ModelSection) -> String {
    let checked = |mode: ChatMode| if view.mode == mode { " checked" } else { "" };
    let config = view.model_config.clone().unwrap_or_else(|| models.default_config());

    let mut options = String::new();
    for model in &models.allowed_models {
        let selected = if *model == config.model { " selected" } else { "" };
        let _ = write!(
            options,
            r#"<option value="{m}"{selected}>{m}</option>"#,
            m = escape(model)
        );
    }

    let uploader = if view.mode == ChatMode::Files {
        r#"<label>Upload files to chat about <input type="file" name="files" multiple></label>"#
    } else {
        ""
    };

    let uploaded: Vec<String> = view.uploaded_files.iter().map(|f| f.name.clone()).collect();
    let contents: Vec<String> = view
        .file_contents
        .iter()
        .map(|c| {
            format!(
                "{}: Type={}, Size={:.2} MB",
                c.file_name, c.mime_type, c.size_mb
            )
        })
        .collect();

    format!(
        r#"<form method="post" enctype="multipart/form-data">
            <fieldset>
                <legend>Choose:</legend>
                <label><input type="radio" name="mode" value="converse"{converse}> Converse</label>
                <label><input type="radio" name="mode" value="files"{files}> Chat with files</label>
            </fieldset>
            {uploader}
            <label>Model <select name="model">{options}</select></label>
            <label>Temperature <input type="number" name="temperature" min="0" max="1" step="0.01" value="{temperature}"></label>
            <label>Max Output Tokens <input type="number" name="max_output_tokens" min="{min}" max="{max}" step="50" value="{max_tokens}"></label>
            <p><button type="submit">Apply</button> <button type="submit" name="new_session" value="true">Start new session</button></p>
        </form>
        <details><summary>Uploaded Files</summary>{uploaded}</details>
        <details><summary>Processed File Names</summary>{processed}</details>
        <details><summary>File Contents</summary>{contents}</details>
        <p>Total Tokens Used: {tokens}</p>"#,
        converse = checked(ChatMode::Converse),
        files = checked(ChatMode::Files),
        temperature = config.temperature,
        min = models.min_output_tokens,
        max = models.max_output_tokens,
        max_tokens = config.max_output_tokens,
        uploaded = list_or(&uploaded, "None"),
        processed = list_or(&view.processed_file_names, "None"),
        contents = list_or(&contents, "No files loaded."),
        tokens = view.token_total,
    )
}

/// Render the whole chat page for a view.
#[must_use]
pub fn render(view: &RenderView, models: &ModelSection) -> String {
    let mut content = String::new();

    let (heading, placeholder) = match view.mode {
        ChatMode::Converse => ("Ask Gemini", "Enter your question here"),
        ChatMode::Files => ("Chat with your files", "Ask a question about your files"),
    };
    let _ = write!(content, "<h2>{heading}</h2>");

    if let Some(error) = &view.error {
        let _ = write!(content, r#"<div class="error">{}</div>"#, escape(error));
    }

    content.push_str(r#"<section id="transcript">"#);
    for turn in &view.transcript {
        let class = match turn.role {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        };
        let _ = write!(
            content,
            r#"<div class="turn {class} markdown">{}</div>"#,
            escape(&turn.content)
        );
    }
    content.push_str("</section>");

    let _ = write!(
        content,
        r#"<form method="post" enctype="multipart/form-data">
            <input type="hidden" name="mode" value="{mode}">
            <input type="text" name="message" placeholder="{placeholder}" autofocus style="width: 80%">
            <button type="submit">Send</button>
        </form>"#,
        mode = view.mode,
    );

    html_shell("⚡ Chatbot", &sidebar(view, models), &content)
}
