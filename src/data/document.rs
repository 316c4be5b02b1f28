// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use std::collections::hash_map::{Entry, HashMap};
use std::rc::Rc;

use log::warn;
use serde::Deserialize;
use thiserror::Error;

use crate::data::element::{Element, ElementKind};
use crate::data::parse::{self, ParseError};

/// The label of the action a pattern starts from.
const TOP_LABEL: &str = "top";

/// A non-fatal problem found while loading a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentWarning {
    /// An element with an unknown tag name was found.
    #[error("unknown element `{}`", name)]
    UnknownElement {
        /// The tag name of the element.
        name: String,
    },
    /// An element has a `type` attribute which it does not understand.
    #[error("unknown type `{}` for `{}`; using the default", value, element)]
    UnknownType {
        /// The kind of the element.
        element: ElementKind,
        /// The value of the `type` attribute.
        value: String,
    },
    /// More than one element of a kind uses the same label.
    #[error("duplicate {} label `{}`; keeping the first definition", kind, label)]
    DuplicateLabel {
        /// The kind of the labeled elements.
        kind: ElementKind,
        /// The label.
        label: String,
    },
}

impl DocumentWarning {
    pub(crate) fn unknown_element<N>(name: N) -> Self
    where
        N: Into<String>,
    {
        Self::UnknownElement {
            name: name.into(),
        }
    }

    pub(crate) fn unknown_type<V>(element: ElementKind, value: V) -> Self
    where
        V: Into<String>,
    {
        Self::UnknownType {
            element,
            value: value.into(),
        }
    }

    fn duplicate_label(kind: ElementKind, label: String) -> Self {
        Self::DuplicateLabel {
            kind,
            label,
        }
    }
}

/// The orientation of the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Orientation {
    /// For games with a toroidal topology.
    #[serde(rename = "none")]
    None,
    /// For games with a vertical orientation.
    #[serde(rename = "vertical")]
    Vertical,
    /// For games with a horizontal orientation.
    #[serde(rename = "horizontal")]
    Horizontal,
}

impl Default for Orientation {
    fn default() -> Self {
        Orientation::None
    }
}

/// A loaded BulletML document.
///
/// The labeled bullets, actions, and fires anywhere in the tree are indexed when the document
/// is built.
#[derive(Debug, Clone)]
pub struct Document {
    root: Rc<Element>,
    orientation: Orientation,
    bullets: HashMap<String, Rc<Element>>,
    actions: HashMap<String, Rc<Element>>,
    fires: HashMap<String, Rc<Element>>,
    top: Option<Rc<Element>>,
    top_actions: Vec<Rc<Element>>,
    warnings: Vec<DocumentWarning>,
}

/// Whether an action label marks an entry point: `top`, optionally followed by digits.
fn is_top_label(label: &str) -> bool {
    label
        .strip_prefix(TOP_LABEL)
        .map_or(false, |suffix| suffix.chars().all(|c| c.is_ascii_digit()))
}

fn try_insert(
    map: &mut HashMap<String, Rc<Element>>,
    element: &Rc<Element>,
    label: &str,
) -> Result<(), DocumentWarning> {
    match map.entry(label.into()) {
        Entry::Occupied(o) => Err(DocumentWarning::duplicate_label(element.kind(), o.key().clone())),
        Entry::Vacant(v) => {
            v.insert(element.clone());
            Ok(())
        },
    }
}

impl Document {
    /// Parse a document from XML text.
    pub fn parse<T>(text: T) -> Result<Self, ParseError>
    where
        T: AsRef<str>,
    {
        parse::parse(text.as_ref())
    }

    /// Build a document around a root element.
    ///
    /// Warnings found while building the element tree are kept alongside those found while
    /// indexing it.
    pub fn new(root: Element, warnings: Vec<DocumentWarning>) -> Self {
        let orientation = match root.value_type::<Orientation>() {
            Ok(orientation) => orientation,
            Err(_) => Orientation::default(),
        };

        let mut doc = Document {
            root: Rc::new(root),
            orientation,
            bullets: HashMap::new(),
            actions: HashMap::new(),
            fires: HashMap::new(),
            top: None,
            top_actions: Vec::new(),
            warnings,
        };

        let root = doc.root.clone();
        doc.index(&root);
        doc.top = doc.actions.get(TOP_LABEL).cloned();

        for warning in doc.warnings.iter() {
            warn!("{}", warning);
        }

        doc
    }

    fn index(&mut self, element: &Rc<Element>) {
        if let Some(label) = element.label() {
            let map = match element.kind() {
                ElementKind::Bullet => Some(&mut self.bullets),
                ElementKind::Action => Some(&mut self.actions),
                ElementKind::Fire => Some(&mut self.fires),
                _ => None,
            };

            if let Some(map) = map {
                match try_insert(map, element, label) {
                    Ok(()) => {
                        if element.kind() == ElementKind::Action && is_top_label(label) {
                            self.top_actions.push(element.clone());
                        }
                    },
                    Err(warning) => self.warnings.push(warning),
                }
            }
        }

        element
            .children()
            .iter()
            .for_each(|child| self.index(child));
    }

    /// The root element.
    pub fn root(&self) -> &Rc<Element> {
        &self.root
    }

    /// The orientation declared by the document.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// The action labeled `top`.
    pub fn top_action(&self) -> Option<&Rc<Element>> {
        self.top.as_ref()
    }

    /// Every action whose label starts with `top`, in document order.
    pub fn top_actions(&self) -> &[Rc<Element>] {
        &self.top_actions
    }

    /// Find a labeled bullet.
    pub fn labeled_bullet(&self, label: &str) -> Option<&Rc<Element>> {
        self.bullets.get(label)
    }

    /// Find a labeled action.
    pub fn labeled_action(&self, label: &str) -> Option<&Rc<Element>> {
        self.actions.get(label)
    }

    /// Find a labeled fire.
    pub fn labeled_fire(&self, label: &str) -> Option<&Rc<Element>> {
        self.fires.get(label)
    }

    /// Find the target of a reference element.
    ///
    /// Returns `None` for elements which are not references or for unknown labels.
    pub fn resolve(&self, reference: &Element) -> Option<&Rc<Element>> {
        let label = reference.attribute("label")?;
        match reference.kind() {
            ElementKind::BulletRef => self.labeled_bullet(label),
            ElementKind::ActionRef => self.labeled_action(label),
            ElementKind::FireRef => self.labeled_fire(label),
            _ => None,
        }
    }

    /// Problems found while loading the document.
    pub fn warnings(&self) -> &[DocumentWarning] {
        &self.warnings
    }
}
