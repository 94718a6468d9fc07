//! Workflow file parser.
//!
//! The file is read into a small element tree with `quick-xml` and then
//! interpreted. `determine_shape` only looks at the root's children and
//! never fails.

use std::collections::HashMap;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::content::infer_content_type;
use super::schema::{
    BranchDefinition, ContentType, DefinitionError, FanOutBlock, PromptInfo, WorkflowDefinition,
};
use crate::models::job::WorkflowShape;

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: HashMap<String, String>,
    children: Vec<Element>,
}

impl Element {
    fn from_start(e: &BytesStart<'_>) -> Result<Self, DefinitionError> {
        let mut attrs = HashMap::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| DefinitionError::Xml(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map_err(|err| DefinitionError::Xml(err.to_string()))?
                .to_string();
            attrs.insert(key, value);
        }
        Ok(Self {
            name: String::from_utf8_lossy(e.name().as_ref()).to_string(),
            attrs,
            children: Vec::new(),
        })
    }

    /// Attribute value, `None` when absent or blank.
    fn attr(&self, key: &str) -> Option<String> {
        self.attrs
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    }

    fn required(&self, key: &str) -> Result<String, DefinitionError> {
        self.attr(key).ok_or_else(|| DefinitionError::MissingAttribute {
            element: self.name.clone(),
            attribute: key.to_string(),
        })
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn parse_tree(xml: &str) -> Result<Element, DefinitionError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| DefinitionError::Xml(format!("at position {}: {}", reader.buffer_position(), e)))?;
        match event {
            Event::Start(e) => stack.push(Element::from_start(&e)?),
            Event::Empty(e) => {
                let element = Element::from_start(&e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = root.or(Some(element)),
                }
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = root.or(Some(element)),
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(DefinitionError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or(DefinitionError::MissingRoot)
}

/// Parse a timeout value: `<n>ms`, `<n>s`, `<n>m`, `<n>h` or bare milliseconds.
pub fn parse_timeout(raw: &str) -> Result<i64, DefinitionError> {
    let value = raw.trim();
    let invalid = || DefinitionError::InvalidTimeout(raw.to_string());

    let (digits, factor) = if let Some(n) = value.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = value.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = value.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = value.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        (value, 1)
    };

    let n: i64 = digits.trim().parse().map_err(|_| invalid())?;
    if n <= 0 {
        return Err(invalid());
    }
    n.checked_mul(factor).ok_or_else(invalid)
}

fn timeout_of(element: &Element) -> Result<Option<i64>, DefinitionError> {
    element.attr("timeout").map(|t| parse_timeout(&t)).transpose()
}

fn parse_prompt(element: &Element) -> Result<PromptInfo, DefinitionError> {
    let src = element.required("src")?;
    let content_type = match element.attr("type") {
        Some(declared) => ContentType::from_str(&declared)
            .ok_or_else(|| DefinitionError::UnknownContentType(declared.clone()))?,
        None => infer_content_type(&src)?,
    };
    Ok(PromptInfo {
        src,
        content_type,
        bind_exp: element.attr("bindExp"),
        bind_result_type: element.attr("bindResultType"),
    })
}

fn parse_branch(element: &Element) -> Result<BranchDefinition, DefinitionError> {
    let prompts = element
        .children_named("prompt")
        .map(parse_prompt)
        .collect::<Result<Vec<_>, _>>()?;
    if prompts.is_empty() {
        return Err(DefinitionError::NoPrompts(format!("<{}>", element.name)));
    }
    Ok(BranchDefinition {
        model: element.required("model")?,
        repository: element.required("repository")?,
        prompts,
        timeout_millis: timeout_of(element)?,
        fallback_src: element.attr("fallback-src"),
    })
}

fn parse_parallel(element: &Element) -> Result<WorkflowDefinition, DefinitionError> {
    let launch = element
        .children_named("prompt")
        .next()
        .ok_or_else(|| DefinitionError::NoPrompts("<parallel>".to_string()))
        .and_then(parse_prompt)?;

    let branches = element
        .children_named("sequence")
        .map(parse_branch)
        .collect::<Result<Vec<_>, _>>()?;
    let first = branches
        .first()
        .ok_or_else(|| DefinitionError::NoPrompts("<parallel> branches".to_string()))?;

    let model = element.attr("model").unwrap_or_else(|| first.model.clone());
    let repository = element
        .attr("repository")
        .unwrap_or_else(|| first.repository.clone());
    let timeout_millis = timeout_of(element)?;
    let fallback_src = element.attr("fallback-src");

    Ok(WorkflowDefinition {
        launch: launch.clone(),
        model,
        repository,
        follow_ups: Vec::new(),
        parallel: Some(FanOutBlock {
            launch,
            branches,
            timeout_millis,
            fallback_src: fallback_src.clone(),
        }),
        timeout_millis,
        fallback_src,
    })
}

fn shape_blocks(root: &Element) -> Vec<&Element> {
    root.children
        .iter()
        .filter(|c| c.name == "sequence" || c.name == "parallel")
        .collect()
}

/// Parse workflow XML held in memory.
pub fn parse_str(xml: &str) -> Result<WorkflowDefinition, DefinitionError> {
    let root = parse_tree(xml)?;
    if root.name != "workflow" {
        return Err(DefinitionError::MissingRoot);
    }

    let blocks = shape_blocks(&root);
    if blocks.len() != 1 {
        return Err(DefinitionError::AmbiguousShape(blocks.len()));
    }
    let block = blocks[0];

    if block.name == "parallel" {
        return parse_parallel(block);
    }

    let branch = parse_branch(block)?;
    let mut prompts = branch.prompts.into_iter();
    let launch = prompts
        .next()
        .ok_or_else(|| DefinitionError::NoPrompts("<sequence>".to_string()))?;
    Ok(WorkflowDefinition {
        launch,
        model: branch.model,
        repository: branch.repository,
        follow_ups: prompts.collect(),
        parallel: None,
        timeout_millis: branch.timeout_millis,
        fallback_src: branch.fallback_src,
    })
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<WorkflowDefinition, DefinitionError> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
        path: path.to_string_lossy().to_string(),
        source,
    })?;
    parse_str(&xml)
}

/// Classify a workflow file without fully parsing it. Any structural
/// problem yields `WorkflowShape::Unknown`.
pub fn determine_shape(path: impl AsRef<Path>) -> WorkflowShape {
    let path = path.as_ref();
    let Ok(xml) = std::fs::read_to_string(path) else {
        tracing::warn!("[WorkflowParser] Cannot read {} for shape probe", path.display());
        return WorkflowShape::Unknown;
    };
    let Ok(root) = parse_tree(&xml) else {
        return WorkflowShape::Unknown;
    };
    if root.name != "workflow" {
        return WorkflowShape::Unknown;
    }
    match shape_blocks(&root).as_slice() {
        [only] if only.name == "sequence" => WorkflowShape::Sequence,
        [only] if only.name == "parallel" => WorkflowShape::Parallel,
        _ => WorkflowShape::Unknown,
    }
}
