//! Template values and intrinsic functions.
//!
//! [`Expr`] is the property language of the template: plain literals plus the
//! handful of intrinsic functions this stack needs. References are kept
//! structured (not pre-rendered JSON) so the dependency graph can be derived
//! from them.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Prefix of platform pseudo parameters (`AWS::StackName`, `AWS::Region`, ...).
pub const PSEUDO_PREFIX: &str = "AWS::";

/// A template value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// String literal.
    Str(String),
    /// Integer literal.
    Int(i64),
    /// Floating point literal.
    Float(f64),
    /// Boolean literal.
    Bool(bool),
    /// Ordered list.
    List(Vec<Expr>),
    /// Key/value object, serialized in key order.
    Map(BTreeMap<String, Expr>),
    /// `Ref` to a resource, parameter or pseudo parameter.
    Ref(String),
    /// `Fn::GetAtt` on a resource.
    GetAtt { logical_id: String, attribute: String },
    /// `Fn::Join` with a delimiter.
    Join { delimiter: String, parts: Vec<Expr> },
    /// `Fn::Select` of one element of a list.
    Select { index: u32, list: Box<Expr> },
    /// `Fn::GetAZs` for the current region.
    GetAzs,
}

impl Expr {
    /// Build a map from `(key, value)` pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Expr)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a list from anything convertible into values.
    pub fn list<T: Into<Expr>, I: IntoIterator<Item = T>>(items: I) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// An empty object.
    #[must_use]
    pub fn empty_object() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// `Ref` to a logical ID or parameter.
    pub fn reference(logical_id: impl Into<String>) -> Self {
        Self::Ref(logical_id.into())
    }

    /// `Fn::GetAtt` on a logical ID.
    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::GetAtt {
            logical_id: logical_id.into(),
            attribute: attribute.into(),
        }
    }

    /// `Fn::Join` of `parts` with `delimiter`.
    pub fn join(delimiter: impl Into<String>, parts: Vec<Expr>) -> Self {
        Self::Join {
            delimiter: delimiter.into(),
            parts,
        }
    }

    /// The `index`-th availability zone of the deployment region.
    #[must_use]
    pub fn availability_zone(index: u32) -> Self {
        Self::Select {
            index,
            list: Box::new(Self::GetAzs),
        }
    }

    /// `Ref` to the `AWS::StackName` pseudo parameter.
    #[must_use]
    pub fn stack_name() -> Self {
        Self::Ref(format!("{PSEUDO_PREFIX}StackName"))
    }

    /// Look up `key` when this value is a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Expr> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Follow a path of map keys.
    #[must_use]
    pub fn path(&self, keys: &[&str]) -> Option<&Expr> {
        keys.iter().try_fold(self, |value, key| value.get(key))
    }

    /// Mutable map lookup.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Expr> {
        match self {
            Self::Map(map) => map.get_mut(key),
            _ => None,
        }
    }

    /// Insert `key` when this value is a map. Returns `false` otherwise.
    pub fn insert(&mut self, key: impl Into<String>, value: Expr) -> bool {
        match self {
            Self::Map(map) => {
                map.insert(key.into(), value);
                true
            }
            _ => false,
        }
    }

    /// String literal contents.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer literal, also accepting numeric strings (the platform accepts both).
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Numeric literal as a float.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Boolean literal.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// List elements.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Expr]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Whether this value is a literal that renders to nothing.
    #[must_use]
    pub fn is_empty_literal(&self) -> bool {
        match self {
            Self::Str(s) => s.trim().is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Whether the value contains no intrinsic function anywhere.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        match self {
            Self::Str(_) | Self::Int(_) | Self::Float(_) | Self::Bool(_) => true,
            Self::List(items) => items.iter().all(Self::is_literal),
            Self::Map(map) => map.values().all(Self::is_literal),
            Self::Ref(_)
            | Self::GetAtt { .. }
            | Self::Join { .. }
            | Self::Select { .. }
            | Self::GetAzs => false,
        }
    }

    /// Logical IDs this value points at, pseudo parameters excluded.
    #[must_use]
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Ref(id) if !id.starts_with(PSEUDO_PREFIX) => out.push(id),
            Self::GetAtt { logical_id, .. } => out.push(logical_id),
            Self::List(items) | Self::Join { parts: items, .. } => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Self::Map(map) => {
                for value in map.values() {
                    value.collect_references(out);
                }
            }
            Self::Select { list, .. } => list.collect_references(out),
            Self::Ref(_) | Self::Str(_) | Self::Int(_) | Self::Float(_) | Self::Bool(_) | Self::GetAzs => {}
        }
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for Expr {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Expr {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u16> for Expr {
    fn from(value: u16) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<Expr>> for Expr {
    fn from(value: Vec<Expr>) -> Self {
        Self::List(value)
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Str(s) => serializer.serialize_str(s),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Float(n) => serializer.serialize_f64(*n),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Ref(id) => single_entry(serializer, "Ref", id),
            Self::GetAtt {
                logical_id,
                attribute,
            } => single_entry(serializer, "Fn::GetAtt", &[logical_id, attribute]),
            Self::Join { delimiter, parts } => {
                single_entry(serializer, "Fn::Join", &(delimiter, parts))
            }
            Self::Select { index, list } => single_entry(serializer, "Fn::Select", &(index, list)),
            Self::GetAzs => single_entry(serializer, "Fn::GetAZs", ""),
        }
    }
}

fn single_entry<S: Serializer, V: Serialize + ?Sized>(
    serializer: S,
    key: &str,
    value: &V,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(key, value)?;
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intrinsics_serialize_to_template_json() {
        assert_eq!(
            serde_json::to_value(Expr::reference("MoodleVpc")).unwrap(),
            json!({ "Ref": "MoodleVpc" })
        );
        assert_eq!(
            serde_json::to_value(Expr::get_att("MoodleAlb", "DNSName")).unwrap(),
            json!({ "Fn::GetAtt": ["MoodleAlb", "DNSName"] })
        );
        assert_eq!(
            serde_json::to_value(Expr::availability_zone(1)).unwrap(),
            json!({ "Fn::Select": [1, { "Fn::GetAZs": "" }] })
        );
        assert_eq!(
            serde_json::to_value(Expr::join(":", vec!["a".into(), Expr::reference("B")]))
                .unwrap(),
            json!({ "Fn::Join": [":", ["a", { "Ref": "B" }]] })
        );
    }

    #[test]
    fn test_references_skip_pseudo_parameters() {
        let value = Expr::object([
            ("Name", Expr::join("-", vec![Expr::stack_name(), "redis".into()])),
            ("Vpc", Expr::reference("MoodleVpc")),
            (
                "Groups",
                Expr::list([Expr::get_att("MoodleSg", "GroupId")]),
            ),
        ]);
        let mut refs = value.references();
        refs.sort_unstable();
        assert_eq!(refs, vec!["MoodleSg", "MoodleVpc"]);
    }

    #[test]
    fn test_accessors() {
        let value = Expr::object([
            ("AllocatedStorage", Expr::from("30")),
            ("Inner", Expr::object([("Enabled", Expr::Bool(true))])),
        ]);
        assert_eq!(value.get("AllocatedStorage").and_then(Expr::as_i64), Some(30));
        assert_eq!(
            value.path(&["Inner", "Enabled"]).and_then(Expr::as_bool),
            Some(true)
        );
        assert!(value.get("Missing").is_none());
        assert!(value.is_literal());
        assert!(!Expr::reference("X").is_literal());
        assert!(Expr::from("  ").is_empty_literal());
    }
}
