//! Filter construction for Qdrant.
//!
//! Every search and purge goes through [`namespace_filter`], so hits can never
//! cross repository boundaries.

use qdrant_client::qdrant::{
    Condition, FieldCondition, Filter, Match, condition::ConditionOneOf, r#match::MatchValue,
};

use crate::errors::RagError;
use crate::record::NAMESPACE_FIELD;

/// `must: [{ key: "repo_id", match: { keyword: ns } }]`
pub fn namespace_filter(namespace: &str) -> Result<Filter, RagError> {
    if namespace.trim().is_empty() {
        return Err(RagError::EmptyNamespace);
    }
    Ok(Filter {
        must: vec![keyword_condition(NAMESPACE_FIELD, namespace)],
        ..Default::default()
    })
}

fn keyword_condition(field: &str, value: &str) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: field.to_string(),
            r#match: Some(Match {
                match_value: Some(MatchValue::Keyword(value.to_string())),
            }),
            ..Default::default()
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_is_mandatory() {
        assert!(matches!(namespace_filter("  "), Err(RagError::EmptyNamespace)));

        let f = namespace_filter("acme/widgets").unwrap();
        assert_eq!(f.must.len(), 1);
        assert!(f.should.is_empty());
        match &f.must[0].condition_one_of {
            Some(ConditionOneOf::Field(fc)) => {
                assert_eq!(fc.key, NAMESPACE_FIELD);
                assert_eq!(
                    fc.r#match.as_ref().and_then(|m| m.match_value.clone()),
                    Some(MatchValue::Keyword("acme/widgets".into()))
                );
            }
            other => panic!("unexpected condition: {other:?}"),
        }
    }
}
