// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use std::collections::btree_map::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::Deserialize;

/// Deserialize a unit enum variant from its XML spelling.
pub(crate) fn from_name<T>(name: &str) -> Result<T, ValueError>
where
    T: DeserializeOwned,
{
    let de: StrDeserializer<ValueError> = name.into_deserializer();
    T::deserialize(de)
}

/// The kind of an element in a BulletML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementKind {
    /// The document root.
    ///
    /// Unknown elements are also given this kind.
    #[serde(rename = "bulletml")]
    BulletML,
    /// A bullet template.
    Bullet,
    /// A list of commands.
    Action,
    /// Create a new bullet.
    Fire,
    /// Change the heading over time.
    ChangeDirection,
    /// Change the speed over time.
    ChangeSpeed,
    /// Ramp up an acceleration.
    Accel,
    /// Pause for a number of frames.
    Wait,
    /// Destroy the bullet.
    Vanish,
    /// Repeat an action.
    Repeat,
    /// A direction value.
    Direction,
    /// A speed value.
    Speed,
    /// The horizontal component of an acceleration.
    Horizontal,
    /// The vertical component of an acceleration.
    Vertical,
    /// A duration in frames.
    Term,
    /// A repetition count.
    Times,
    /// A reference to a labeled bullet.
    BulletRef,
    /// A reference to a labeled action.
    ActionRef,
    /// A reference to a labeled fire.
    FireRef,
    /// A positional parameter to a reference.
    Param,
}

impl ElementKind {
    /// Look up the kind for an XML tag name.
    pub fn from_tag(tag: &str) -> Option<Self> {
        from_name(tag).ok()
    }

    /// The XML tag name for the kind.
    pub fn tag(self) -> &'static str {
        match self {
            ElementKind::BulletML => "bulletml",
            ElementKind::Bullet => "bullet",
            ElementKind::Action => "action",
            ElementKind::Fire => "fire",
            ElementKind::ChangeDirection => "changeDirection",
            ElementKind::ChangeSpeed => "changeSpeed",
            ElementKind::Accel => "accel",
            ElementKind::Wait => "wait",
            ElementKind::Vanish => "vanish",
            ElementKind::Repeat => "repeat",
            ElementKind::Direction => "direction",
            ElementKind::Speed => "speed",
            ElementKind::Horizontal => "horizontal",
            ElementKind::Vertical => "vertical",
            ElementKind::Term => "term",
            ElementKind::Times => "times",
            ElementKind::BulletRef => "bulletRef",
            ElementKind::ActionRef => "actionRef",
            ElementKind::FireRef => "fireRef",
            ElementKind::Param => "param",
        }
    }

    /// Whether the kind takes a value `type` attribute.
    pub(crate) fn has_value_type(self) -> bool {
        matches!(
            self,
            ElementKind::Direction
                | ElementKind::Speed
                | ElementKind::Horizontal
                | ElementKind::Vertical
        )
    }
}

impl Default for ElementKind {
    fn default() -> Self {
        ElementKind::BulletML
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Ways a value may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Change {
    /// Set the value.
    #[serde(rename = "absolute")]
    Absolute,
    /// Set the value relative to the current value.
    #[serde(rename = "relative")]
    Relative,
    /// Set the value relative to the last value in the sequence.
    #[serde(rename = "sequence")]
    Sequence,
}

impl Default for Change {
    fn default() -> Self {
        Change::Absolute
    }
}

/// How to interpret a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DirectionKind {
    /// Aim towards the target.
    #[serde(rename = "aim")]
    Aim,
    /// An absolute heading.
    #[serde(rename = "absolute")]
    Absolute,
    /// Relative to the current heading.
    #[serde(rename = "relative")]
    Relative,
    /// Relative to the last heading in the sequence.
    #[serde(rename = "sequence")]
    Sequence,
}

impl Default for DirectionKind {
    fn default() -> Self {
        DirectionKind::Aim
    }
}

/// An element of a BulletML document.
///
/// Elements are immutable once built; they are shared with `Rc` so that the label indices of a
/// [`Document`](crate::data::Document) and the action cursors of running bullets point at the
/// same nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    kind: ElementKind,
    label: Option<String>,
    text: Option<String>,
    attributes: BTreeMap<String, String>,
    children: Vec<Rc<Element>>,
}

impl Element {
    /// Create a new element.
    ///
    /// The label is taken from a non-empty `label` attribute. Text is only kept for elements
    /// without element children and is trimmed.
    pub fn new(
        kind: ElementKind,
        attributes: BTreeMap<String, String>,
        text: Option<String>,
        children: Vec<Rc<Element>>,
    ) -> Self {
        let label = attributes
            .get("label")
            .filter(|label| !label.is_empty())
            .cloned();
        let text = if children.is_empty() {
            text.map(|text| text.trim().to_string())
        } else {
            None
        };

        Element {
            kind,
            label,
            text,
            attributes,
            children,
        }
    }

    /// A leaf element holding an expression.
    pub fn leaf<T>(kind: ElementKind, text: T) -> Self
    where
        T: Into<String>,
    {
        Self::new(kind, BTreeMap::new(), Some(text.into()), Vec::new())
    }

    /// The kind of the element.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// The label of the element.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The trimmed text of a leaf element.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Get an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// All attributes of the element.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// The child elements, in document order.
    pub fn children(&self) -> &[Rc<Element>] {
        &self.children
    }

    /// The first child of a given kind.
    pub fn child(&self, kind: ElementKind) -> Option<&Rc<Element>> {
        self.children.iter().find(|child| child.kind == kind)
    }

    /// All children of a given kind.
    pub fn children_of(&self, kind: ElementKind) -> impl Iterator<Item = &Rc<Element>> {
        self.children.iter().filter(move |child| child.kind == kind)
    }

    /// The `type` attribute, interpreted as `T`.
    ///
    /// Returns the default when the attribute is absent.
    pub fn value_type<T>(&self) -> Result<T, ValueError>
    where
        T: DeserializeOwned + Default,
    {
        self.attribute("type")
            .map(from_name)
            .unwrap_or_else(|| Ok(T::default()))
    }
}
