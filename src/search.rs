//! Wildcard search over principal containers
//!
//! A deliberately simple linear scan: every principal in the container is
//! matched against the criteria, so cost grows with directory size. Good
//! enough for small directories and tests; not an index.

use crate::error::{Result, UgmError};
use std::collections::BTreeMap;

/// Search criteria and result shaping for a container scan
///
/// Criteria map an attribute name (or the reserved name `id`) to a glob term.
/// With `or_search` any matching criterion selects a principal, otherwise all
/// criteria must match; no criteria selects every principal. `exact_match`
/// requires exactly one result. When `attrlist` is given (possibly empty),
/// results carry the requested attributes; otherwise they are bare ids.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub criteria: Vec<(String, String)>,
    pub attrlist: Option<Vec<String>>,
    pub exact_match: bool,
    pub or_search: bool,
}

/// One search result: a principal id, plus projected attributes if requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    pub id: String,
    pub attrs: Option<BTreeMap<String, String>>,
}

/// Match a glob term against a value.
///
/// `*` alone matches anything; `*x*` does substring, `*x` suffix, `x*` prefix
/// match; a term that is all wildcards but not exactly `*` matches nothing;
/// anything else is exact equality.
pub(crate) fn match_term(term: &str, value: &str) -> bool {
    if term == "*" {
        return true;
    }
    if term.trim_matches('*').is_empty() {
        return false;
    }
    if let Some(inner) = term.strip_prefix('*').and_then(|t| t.strip_suffix('*')) {
        if value.contains(inner) {
            return true;
        }
    }
    if let Some(suffix) = term.strip_prefix('*') {
        if value.ends_with(suffix) {
            return true;
        }
    }
    if let Some(prefix) = term.strip_suffix('*') {
        if value.starts_with(prefix) {
            return true;
        }
    }
    term == value
}

/// Scan container ids against a query.
///
/// `attr_of` resolves an attribute for a principal id, `Ok(None)` meaning
/// absent or empty. The reserved criterion name `id` matches the principal id
/// itself. Exact-match overflow short-circuits before the scan completes.
pub(crate) fn scan<F>(ids: &[String], attr_of: F, query: &SearchQuery) -> Result<Vec<SearchMatch>>
where
    F: Fn(&str, &str) -> Result<Option<String>>,
{
    let mut found: Vec<String> = Vec::new();
    for id in ids {
        if query.exact_match && found.len() > 1 {
            return Err(UgmError::AmbiguousResult);
        }
        let mut matched = query.criteria.is_empty();
        if !matched && query.or_search {
            for (key, term) in &query.criteria {
                let value = criterion_value(id, key, &attr_of)?;
                if let Some(value) = value {
                    if match_term(term, &value) {
                        matched = true;
                        break;
                    }
                }
            }
        } else if !matched {
            matched = true;
            for (key, term) in &query.criteria {
                let value = criterion_value(id, key, &attr_of)?;
                match value {
                    Some(value) if match_term(term, &value) => {}
                    _ => {
                        matched = false;
                        break;
                    }
                }
            }
        }
        if matched {
            found.push(id.clone());
        }
    }
    if query.exact_match {
        if found.is_empty() {
            return Err(UgmError::NoResult);
        }
        if found.len() > 1 {
            return Err(UgmError::AmbiguousResult);
        }
    }
    found
        .into_iter()
        .map(|id| {
            let attrs = match &query.attrlist {
                None => None,
                Some(attrlist) => {
                    let mut projected = BTreeMap::new();
                    for key in attrlist {
                        let value = criterion_value(&id, key, &attr_of)?.unwrap_or_default();
                        projected.insert(key.clone(), value);
                    }
                    Some(projected)
                }
            };
            Ok(SearchMatch { id, attrs })
        })
        .collect()
}

fn criterion_value<F>(id: &str, key: &str, attr_of: &F) -> Result<Option<String>>
where
    F: Fn(&str, &str) -> Result<Option<String>>,
{
    if key == "id" {
        return Ok(Some(id.to_string()));
    }
    attr_of(id, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_term() {
        assert!(match_term("*", ""));
        assert!(!match_term("**", ""));
        assert!(match_term("aa", "aa"));
        assert!(!match_term("aa", "aaa"));
        assert!(match_term("*a*", "abc"));
        assert!(!match_term("*a", "abc"));
        assert!(match_term("*c", "abc"));
        assert!(match_term("a*", "abc"));
        assert!(!match_term("c*", "abc"));
    }

    fn fixture_attr(id: &str, key: &str) -> Result<Option<String>> {
        // max and sepp carry a fullname, the others carry nothing
        Ok(match (id, key) {
            ("max", "fullname") => Some("Max Muster".to_string()),
            ("sepp", "fullname") => Some("Sepp Muster".to_string()),
            _ => None,
        })
    }

    fn ids() -> Vec<String> {
        ["max", "maxii", "sepp", "123sepp"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_scan_no_criteria_matches_all() {
        let result = scan(&ids(), fixture_attr, &SearchQuery::default()).unwrap();
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_scan_and_search() {
        let query = SearchQuery {
            criteria: vec![
                ("fullname".to_string(), "*Muster*".to_string()),
                ("id".to_string(), "max*".to_string()),
            ],
            ..Default::default()
        };
        let result = scan(&ids(), fixture_attr, &query).unwrap();
        let found: Vec<_> = result.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(found, ["max"]);
    }

    #[test]
    fn test_scan_or_search() {
        let query = SearchQuery {
            criteria: vec![
                ("fullname".to_string(), "*Muster*".to_string()),
                ("id".to_string(), "max*".to_string()),
            ],
            or_search: true,
            ..Default::default()
        };
        let result = scan(&ids(), fixture_attr, &query).unwrap();
        let mut found: Vec<_> = result.iter().map(|m| m.id.as_str()).collect();
        found.sort();
        assert_eq!(found, ["max", "maxii", "sepp"]);
    }

    #[test]
    fn test_scan_exact_match_errors() {
        let ambiguous = SearchQuery {
            criteria: vec![("id".to_string(), "max*".to_string())],
            exact_match: true,
            ..Default::default()
        };
        assert!(matches!(
            scan(&ids(), fixture_attr, &ambiguous),
            Err(UgmError::AmbiguousResult)
        ));

        let empty = SearchQuery {
            criteria: vec![("id".to_string(), "inexistent".to_string())],
            exact_match: true,
            ..Default::default()
        };
        assert!(matches!(
            scan(&ids(), fixture_attr, &empty),
            Err(UgmError::NoResult)
        ));
    }

    #[test]
    fn test_scan_projection() {
        let query = SearchQuery {
            criteria: vec![("id".to_string(), "max*".to_string())],
            attrlist: Some(vec!["id".to_string(), "fullname".to_string()]),
            ..Default::default()
        };
        let result = scan(&ids(), fixture_attr, &query).unwrap();
        assert_eq!(result.len(), 2);
        let max = &result[0];
        assert_eq!(max.id, "max");
        let attrs = max.attrs.as_ref().unwrap();
        assert_eq!(attrs["id"], "max");
        assert_eq!(attrs["fullname"], "Max Muster");
        // absent attributes project as empty strings
        let maxii = &result[1];
        assert_eq!(maxii.attrs.as_ref().unwrap()["fullname"], "");
    }
}
