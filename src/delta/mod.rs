//! Editor deltas
//!
//! The rich-text editor speaks in deltas: a list of steps that walk the
//! document from offset 0, each either keeping (`retain`), adding (`insert`)
//! or removing (`delete`) characters. Offsets count Unicode scalar values.
//!
//! ```json
//! {"ops":[{"retain":3},{"insert":"hi","attributes":{"bold":true}},{"delete":2}]}
//! ```

pub mod convert;

pub use convert::{editor_delta_to_ops, op_to_editor_delta};

use crate::crdt::text::Attributes;
use crate::error::ConversionError;
use serde::{Deserialize, Serialize};

/// One step of an editor delta
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retain: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
}

/// A step with its shape checked
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepKind<'a> {
    Insert(&'a str, Option<&'a Attributes>),
    Delete(usize),
    Retain(usize, Option<&'a Attributes>),
}

impl DeltaStep {
    pub fn insert(text: impl Into<String>, attributes: Option<Attributes>) -> Self {
        Self {
            insert: Some(serde_json::Value::String(text.into())),
            attributes,
            ..Self::default()
        }
    }

    pub fn delete(len: usize) -> Self {
        Self {
            delete: Some(len),
            ..Self::default()
        }
    }

    pub fn retain(len: usize, attributes: Option<Attributes>) -> Self {
        Self {
            retain: Some(len),
            attributes,
            ..Self::default()
        }
    }

    /// Exactly one of insert/delete/retain, non-empty, string inserts only
    ///
    /// `index` is the step's position, used in the error.
    pub fn kind(&self, index: usize) -> Result<StepKind<'_>, ConversionError> {
        let attributes = self.attributes.as_ref().filter(|a| !a.is_empty());
        match (&self.insert, self.delete, self.retain) {
            (Some(value), None, None) => {
                let text = value
                    .as_str()
                    .ok_or_else(|| ConversionError::UnsupportedInsert(value.to_string()))?;
                if text.is_empty() {
                    return Err(ConversionError::InvalidStep(index));
                }
                Ok(StepKind::Insert(text, attributes))
            }
            (None, Some(len), None) if len > 0 => Ok(StepKind::Delete(len)),
            (None, None, Some(len)) if len > 0 => Ok(StepKind::Retain(len, attributes)),
            _ => Err(ConversionError::InvalidStep(index)),
        }
    }
}

/// Editor delta in the `{"ops": [...]}` shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorDelta {
    pub ops: Vec<DeltaStep>,
}

impl EditorDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, text: impl Into<String>, attributes: Option<Attributes>) -> Self {
        self.ops.push(DeltaStep::insert(text, attributes));
        self
    }

    pub fn delete(mut self, len: usize) -> Self {
        self.ops.push(DeltaStep::delete(len));
        self
    }

    /// Keep `len` characters; a zero retain is omitted
    pub fn retain(mut self, len: usize) -> Self {
        if len > 0 {
            self.ops.push(DeltaStep::retain(len, None));
        }
        self
    }

    pub fn format(mut self, len: usize, attributes: Attributes) -> Self {
        self.ops.push(DeltaStep::retain(len, Some(attributes)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check every step against a document of `len` characters
    ///
    /// Run before conversion so that a bad delta is rejected before any
    /// operation is produced.
    pub fn validate(&self, len: usize) -> Result<(), ConversionError> {
        let mut offset: usize = 0;
        let mut length = len;
        for (index, step) in self.ops.iter().enumerate() {
            match step.kind(index)? {
                StepKind::Insert(text, _) => {
                    let n = text.chars().count();
                    match (offset.checked_add(n), length.checked_add(n)) {
                        (Some(end), Some(grown)) => {
                            offset = end;
                            length = grown;
                        }
                        _ => return Err(out_of_bounds(offset, n, length)),
                    }
                }
                StepKind::Delete(n) => {
                    in_bounds(offset, n, length)?;
                    length -= n;
                }
                StepKind::Retain(n, _) => {
                    offset = in_bounds(offset, n, length)?;
                }
            }
        }
        Ok(())
    }

    /// Apply the delta to plain text (attributes are ignored)
    pub fn apply(&self, text: &str) -> Result<String, ConversionError> {
        self.validate(text.chars().count())?;
        let mut chars = text.chars();
        let mut out = String::with_capacity(text.len());
        for (index, step) in self.ops.iter().enumerate() {
            match step.kind(index)? {
                StepKind::Insert(inserted, _) => out.push_str(inserted),
                StepKind::Delete(n) => {
                    chars.by_ref().take(n).for_each(drop);
                }
                StepKind::Retain(n, _) => out.extend(chars.by_ref().take(n)),
            }
        }
        out.extend(chars);
        Ok(out)
    }
}

fn out_of_bounds(start: usize, n: usize, length: usize) -> ConversionError {
    ConversionError::RangeOutOfBounds {
        start,
        end: start.saturating_add(n),
        length,
    }
}

/// End of `start..start + n` if the range fits in `length`
fn in_bounds(start: usize, n: usize, length: usize) -> Result<usize, ConversionError> {
    start
        .checked_add(n)
        .filter(|end| *end <= length)
        .ok_or_else(|| out_of_bounds(start, n, length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bold() -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("bold".into(), json!(true));
        attrs
    }

    #[test]
    fn test_json_shape() {
        let delta = EditorDelta::new()
            .retain(3)
            .insert("hi", Some(bold()))
            .delete(2);
        let value = serde_json::to_value(&delta).unwrap();
        assert_eq!(
            value,
            json!({"ops": [
                {"retain": 3},
                {"insert": "hi", "attributes": {"bold": true}},
                {"delete": 2}
            ]})
        );
        let back: EditorDelta = serde_json::from_value(value).unwrap();
        assert_eq!(back, delta);
    }

    #[test]
    fn test_apply() {
        let delta = EditorDelta::new().retain(1).delete(3).insert("ipp", None);
        assert_eq!(delta.apply("Hello").unwrap(), "Hippo");
    }

    #[test]
    fn test_apply_counts_chars_not_bytes() {
        let delta = EditorDelta::new().retain(2).insert("!", None);
        assert_eq!(delta.apply("héllo").unwrap(), "hé!llo");
    }

    #[test]
    fn test_invalid_steps() {
        let empty = EditorDelta {
            ops: vec![DeltaStep::default()],
        };
        assert_eq!(empty.validate(0), Err(ConversionError::InvalidStep(0)));

        let both = EditorDelta {
            ops: vec![DeltaStep {
                retain: Some(1),
                delete: Some(1),
                ..DeltaStep::default()
            }],
        };
        assert_eq!(both.validate(5), Err(ConversionError::InvalidStep(0)));

        let embed = EditorDelta::from_json(r#"{"ops":[{"insert":{"image":"x.png"}}]}"#).unwrap();
        assert!(matches!(
            embed.validate(0),
            Err(ConversionError::UnsupportedInsert(_))
        ));
    }

    #[test]
    fn test_out_of_bounds() {
        let delta = EditorDelta::new().retain(2).delete(5);
        assert_eq!(
            delta.validate(4),
            Err(ConversionError::RangeOutOfBounds {
                start: 2,
                end: 7,
                length: 4
            })
        );
    }

    #[test]
    fn test_huge_steps_are_out_of_bounds() {
        let delta = EditorDelta::from_json(
            r#"{"ops":[{"retain":1},{"retain":18446744073709551615}]}"#,
        )
        .unwrap();
        assert_eq!(
            delta.validate(5),
            Err(ConversionError::RangeOutOfBounds {
                start: 1,
                end: usize::MAX,
                length: 5
            })
        );

        let delta = EditorDelta::new().retain(2).delete(usize::MAX);
        assert!(matches!(
            delta.validate(5),
            Err(ConversionError::RangeOutOfBounds { start: 2, .. })
        ));
        assert!(delta.apply("hello").is_err());

        let delta = EditorDelta::new().insert("ab", None);
        assert!(matches!(
            delta.validate(usize::MAX),
            Err(ConversionError::RangeOutOfBounds { start: 0, .. })
        ));
    }
}
