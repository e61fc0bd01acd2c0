//! Suite file loader.
//!
//! Reads test suite XML files from disk and parses them into an owned
//! element tree that the schema validator walks.

use std::path::Path;

/// Error type for suite loading operations.
#[derive(Debug)]
pub enum LoadError {
    /// Failed to read the file.
    Io(std::io::Error),
    /// The document is not well-formed XML.
    Xml(roxmltree::Error),
    /// The root element is not `<test-suite>`.
    WrongRoot(String),
    /// The document is well-formed but violates the suite schema.
    Invalid(Vec<String>),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "failed to read file: {e}"),
            LoadError::Xml(e) => write!(f, "XML is not well-formed: {e}"),
            LoadError::WrongRoot(tag) => {
                write!(
                    f,
                    "Invalid root element. Expected <test-suite>, but found <{tag}>."
                )
            }
            LoadError::Invalid(errors) => {
                write!(f, "suite failed validation ({} error(s))", errors.len())
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// An owned XML element.
///
/// `roxmltree` borrows from the source text, so the loader converts the
/// parsed document into this owned form before handing it to the validator.
#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    /// Attributes in document order.
    pub attrs: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<Element>,
    /// Text content up to the first child element.
    pub text: String,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn find(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn find_all<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    pub fn count(&self, tag: &str) -> usize {
        self.children.iter().filter(|c| c.tag == tag).count()
    }
}

fn to_owned_element(node: roxmltree::Node<'_, '_>) -> Element {
    Element {
        tag: node.tag_name().name().to_string(),
        attrs: node
            .attributes()
            .map(|a| (a.name().to_string(), a.value().to_string()))
            .collect(),
        children: node
            .children()
            .filter(|c| c.is_element())
            .map(to_owned_element)
            .collect(),
        text: node.text().unwrap_or("").to_string(),
    }
}

/// Parse suite XML text into an owned element tree.
pub fn parse_document(text: &str) -> Result<Element, LoadError> {
    let document = roxmltree::Document::parse(text).map_err(LoadError::Xml)?;
    Ok(to_owned_element(document.root_element()))
}

/// Read a suite file and parse it. Schema validation happens separately.
pub fn load_document(path: &Path) -> Result<Element, LoadError> {
    let contents = std::fs::read_to_string(path).map_err(LoadError::Io)?;
    parse_document(&contents)
}
