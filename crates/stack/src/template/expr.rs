//! CloudFormation values and intrinsic functions.

use serde::{Serialize, Serializer};
use serde_json::{json, Value};

/// A string-valued CloudFormation expression.
///
/// Literals serialize as plain strings; everything else serializes as the
/// corresponding intrinsic function object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A plain string.
    Literal(String),
    /// `{"Ref": name}` for a resource or pseudo parameter.
    Ref(String),
    /// `{"Fn::GetAtt": [resource, attribute]}`.
    GetAtt(String, String),
    /// `{"Fn::Join": [delimiter, parts]}`.
    Join(String, Vec<Expr>),
    /// `{"Fn::Select": [index, list]}`.
    Select(usize, Box<Expr>),
    /// `{"Fn::GetAZs": region}` (a list-valued expression).
    GetAzs(String),
}

impl Expr {
    /// A literal string.
    #[must_use]
    pub fn lit(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Concatenate parts with no delimiter, flattening nested concatenations
    /// and folding adjacent literals.
    #[must_use]
    pub fn concat(parts: impl IntoIterator<Item = Expr>) -> Self {
        let mut flat: Vec<Expr> = Vec::new();
        for part in parts {
            match part {
                Self::Join(delimiter, inner) if delimiter.is_empty() => flat.extend(inner),
                other => flat.push(other),
            }
        }

        let mut folded: Vec<Expr> = Vec::new();
        for part in flat {
            if let Self::Literal(next) = &part {
                if next.is_empty() {
                    continue;
                }
                if let Some(Self::Literal(prev)) = folded.last_mut() {
                    prev.push_str(next);
                    continue;
                }
            }
            folded.push(part);
        }
        match folded.len() {
            0 => Self::lit(""),
            1 if matches!(folded[0], Self::Literal(_)) => folded.remove(0),
            _ => Self::Join(String::new(), folded),
        }
    }

    /// `Fn::Select` of the n-th availability zone of the current region.
    #[must_use]
    pub fn availability_zone(index: usize) -> Self {
        Self::Select(index, Box::new(Self::GetAzs(String::new())))
    }

    /// `AWS::AccountId`.
    #[must_use]
    pub fn account_id() -> Self {
        Self::Ref("AWS::AccountId".to_string())
    }

    /// `AWS::Region`.
    #[must_use]
    pub fn region() -> Self {
        Self::Ref("AWS::Region".to_string())
    }

    /// `AWS::Partition`.
    #[must_use]
    pub fn partition() -> Self {
        Self::Ref("AWS::Partition".to_string())
    }

    /// Render as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Literal(value) => Value::String(value.clone()),
            Self::Ref(name) => json!({ "Ref": name }),
            Self::GetAtt(resource, attribute) => json!({ "Fn::GetAtt": [resource, attribute] }),
            Self::Join(delimiter, parts) => {
                let parts: Vec<Value> = parts.iter().map(Self::to_value).collect();
                json!({ "Fn::Join": [delimiter, parts] })
            }
            Self::Select(index, list) => json!({ "Fn::Select": [index, list.to_value()] }),
            Self::GetAzs(region) => json!({ "Fn::GetAZs": region }),
        }
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Self::lit(value)
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intrinsics_render() {
        assert_eq!(
            Expr::GetAtt("DB".into(), "Endpoint.Address".into()).to_value(),
            json!({ "Fn::GetAtt": ["DB", "Endpoint.Address"] })
        );
        assert_eq!(
            Expr::availability_zone(1).to_value(),
            json!({ "Fn::Select": [1, { "Fn::GetAZs": "" }] })
        );
        assert_eq!(Expr::region().to_value(), json!({ "Ref": "AWS::Region" }));
    }

    #[test]
    fn test_concat_folds_literals() {
        let joined = Expr::concat([
            Expr::lit("arn:"),
            Expr::partition(),
            Expr::lit(":s3:::"),
            Expr::lit(""),
            Expr::lit("bucket"),
        ]);
        assert_eq!(
            joined.to_value(),
            json!({ "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, ":s3:::bucket"]] })
        );

        assert_eq!(Expr::concat([Expr::lit("a"), Expr::lit("b")]), Expr::lit("ab"));
        assert_eq!(Expr::concat([]), Expr::lit(""));
    }

    #[test]
    fn test_concat_flattens_nested_joins() {
        let inner = Expr::concat([Expr::lit("{{"), Expr::Ref("S".into()), Expr::lit("}}")]);
        let outer = Expr::concat([Expr::lit("url="), inner, Expr::lit("/db")]);
        assert_eq!(
            outer.to_value(),
            json!({ "Fn::Join": ["", ["url={{", { "Ref": "S" }, "}}/db"]] })
        );
    }
}
