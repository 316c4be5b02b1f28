// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use std::collections::btree_map::BTreeMap;
use std::rc::Rc;

use log::debug;
use roxmltree::{Node, NodeType};
use thiserror::Error;

use crate::data::document::{Document, DocumentWarning, Orientation};
use crate::data::element::{self, Change, DirectionKind, Element, ElementKind};

/// An error which prevents a document from loading.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The text is not well-formed XML.
    #[error("malformed XML")]
    Xml {
        /// The XML parser error.
        #[from]
        source: roxmltree::Error,
    },
    /// The root element is not `bulletml`.
    #[error("expected a `bulletml` root element, found `{}`", name)]
    NotBulletML {
        /// The tag name of the root element.
        name: String,
    },
}

impl ParseError {
    fn not_bulletml<N>(name: N) -> Self
    where
        N: Into<String>,
    {
        Self::NotBulletML {
            name: name.into(),
        }
    }
}

pub fn parse(text: &str) -> Result<Document, ParseError> {
    // BulletML files usually declare the external DTD; it is never fetched.
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let xml = roxmltree::Document::parse_with_options(text, options)?;
    let root = xml.root_element();

    let name = root.tag_name().name();
    if ElementKind::from_tag(name) != Some(ElementKind::BulletML) {
        return Err(ParseError::not_bulletml(name));
    }

    let mut warnings = Vec::new();
    let root = build(root, &mut warnings);
    debug!(
        "parsed BulletML document with {} top-level elements",
        root.children().len(),
    );

    Ok(Document::new(root, warnings))
}

fn check_type(kind: ElementKind, node: Node, warnings: &mut Vec<DocumentWarning>) {
    let value = if let Some(value) = node.attribute("type") {
        value
    } else {
        return;
    };

    let known = match kind {
        ElementKind::BulletML => element::from_name::<Orientation>(value).is_ok(),
        ElementKind::Direction => element::from_name::<DirectionKind>(value).is_ok(),
        _ if kind.has_value_type() => element::from_name::<Change>(value).is_ok(),
        _ => true,
    };

    if !known {
        warnings.push(DocumentWarning::unknown_type(kind, value));
    }
}

fn build(node: Node, warnings: &mut Vec<DocumentWarning>) -> Element {
    let name = node.tag_name().name();
    let kind = ElementKind::from_tag(name).unwrap_or_else(|| {
        warnings.push(DocumentWarning::unknown_element(name));
        ElementKind::default()
    });
    check_type(kind, node, warnings);

    let attributes = node
        .attributes()
        .map(|attr| (attr.name().to_string(), attr.value().to_string()))
        .collect::<BTreeMap<_, _>>();

    let mut text = None;
    let mut children = Vec::new();
    for child in node.children() {
        match child.node_type() {
            NodeType::Element => children.push(Rc::new(build(child, warnings))),
            NodeType::Text => {
                if let Some(value) = child.text() {
                    text.get_or_insert_with(String::new).push_str(value);
                }
            },
            _ => {},
        }
    }

    Element::new(kind, attributes, text, children)
}
