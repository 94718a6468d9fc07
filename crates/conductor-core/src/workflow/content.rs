//! Prompt file access and PML → plain-text conversion.

use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;

use super::schema::{ContentType, DefinitionError};

/// Content type from a file name's extension.
pub fn infer_content_type(filename: &str) -> Result<ContentType, DefinitionError> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| match ext.to_ascii_lowercase().as_str() {
            "xml" | "pml" => Some(ContentType::Pml),
            "md" => Some(ContentType::Markdown),
            "txt" => Some(ContentType::Text),
            _ => None,
        })
        .ok_or_else(|| DefinitionError::UnknownContentType(filename.to_string()))
}

/// Resolve a prompt source relative to the workflow file's directory.
pub fn resolve_prompt_path(workflow_path: &str, src: &str) -> PathBuf {
    let src_path = Path::new(src);
    if src_path.is_absolute() {
        return src_path.to_path_buf();
    }
    Path::new(workflow_path)
        .parent()
        .map(|dir| dir.join(src_path))
        .unwrap_or_else(|| src_path.to_path_buf())
}

pub fn read_prompt_file(workflow_path: &str, src: &str) -> Result<String, DefinitionError> {
    let path = resolve_prompt_path(workflow_path, src);
    std::fs::read_to_string(&path).map_err(|source| DefinitionError::Io {
        path: path.to_string_lossy().to_string(),
        source,
    })
}

/// Render PML markup as plain text. Sections below the root become
/// headings, `step` / `item` / `constraint` elements become list items.
/// Content that cannot be parsed is returned unchanged.
pub fn to_plain_text(markup: &str) -> String {
    match convert(markup) {
        Ok(Some(text)) if !text.trim().is_empty() => text,
        Ok(_) => markup.to_string(),
        Err(e) => {
            tracing::warn!("[PromptContent] PML conversion failed, sending raw content: {}", e);
            markup.to_string()
        }
    }
}

fn is_list_item(name: &str) -> bool {
    matches!(name, "step" | "item" | "constraint" | "example")
}

fn heading(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>().replace(['-', '_'], " "),
        None => String::new(),
    }
}

fn convert(markup: &str) -> Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(markup);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut out: Vec<String> = Vec::new();
    let mut saw_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                saw_root = true;
                if stack.len() == 1 {
                    if !out.is_empty() {
                        out.push(String::new());
                    }
                    out.push(format!("## {}", heading(&name)));
                }
                stack.push(name);
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(t) => {
                let text = t.unescape()?.trim().to_string();
                push_text(&mut out, stack.last().map(|s| s.as_str()), &text);
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c.into_inner()).trim().to_string();
                push_text(&mut out, stack.last().map(|s| s.as_str()), &text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Ok(None);
    }
    Ok(Some(out.join("\n").trim().to_string()))
}

fn push_text(out: &mut Vec<String>, element: Option<&str>, text: &str) {
    if text.is_empty() {
        return;
    }
    match element {
        Some(name) if is_list_item(name) => out.push(format!("- {}", text)),
        _ => out.push(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_content_type() {
        assert_eq!(infer_content_type("launch.xml").unwrap(), ContentType::Pml);
        assert_eq!(infer_content_type("notes.MD").unwrap(), ContentType::Markdown);
        assert_eq!(infer_content_type("p.txt").unwrap(), ContentType::Text);
        assert!(infer_content_type("prompt").is_err());
        assert!(infer_content_type("prompt.json").is_err());
    }

    #[test]
    fn test_resolve_prompt_path_is_relative_to_workflow() {
        let path = resolve_prompt_path("/work/flows/workflow.xml", "launch.xml");
        assert_eq!(path, PathBuf::from("/work/flows/launch.xml"));
        let abs = resolve_prompt_path("/work/flows/workflow.xml", "/abs/p.md");
        assert_eq!(abs, PathBuf::from("/abs/p.md"));
    }

    #[test]
    fn test_to_plain_text_renders_sections_and_lists() {
        let pml = r#"<prompt>
            <role>You are a careful engineer.</role>
            <steps>
                <step>Read issue ${input}</step>
                <step>Fix it &amp; add tests</step>
            </steps>
        </prompt>"#;
        let text = to_plain_text(pml);
        assert_eq!(
            text,
            "## Role\nYou are a careful engineer.\n\n## Steps\n- Read issue ${input}\n- Fix it & add tests"
        );
    }

    #[test]
    fn test_to_plain_text_falls_back_on_invalid_markup() {
        let broken = "<prompt><role>unclosed</prompt>";
        assert_eq!(to_plain_text(broken), broken);
        assert_eq!(to_plain_text("just text"), "just text");
    }
}
