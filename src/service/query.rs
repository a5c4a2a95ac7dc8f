//! Query constraints (predicates, order, window) and column projection.

use crate::config::ActionSettings;
use crate::input::Paginate;
use crate::resource::{ColumnsToReturn, FieldSpec, DEFAULT_COLUMN_SET};
use crate::service::fields::is_present;
use crate::store::{Direction, OrderBy, PageWindow, Predicate};
use serde_json::{Map, Value};

/// Equality for scalars, membership for arrays, one per declared and provided field.
pub fn build_predicates(specs: Option<&[FieldSpec]>, fields: &Map<String, Value>) -> Vec<Predicate> {
    specs
        .unwrap_or_default()
        .iter()
        .filter(|f| is_present(fields, &f.name))
        .filter_map(|f| {
            Some(match fields.get(&f.name)? {
                Value::Array(values) => Predicate::In(f.name.clone(), values.clone()),
                value => Predicate::Eq(f.name.clone(), value.clone()),
            })
        })
        .collect()
}

/// `"-updated_at,name"` becomes `updated_at DESC, name ASC`.
pub fn parse_order_by(raw: &str) -> Vec<OrderBy> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter_map(|token| {
            let (column, direction) = match token.strip_prefix('-') {
                Some(rest) => (rest.trim(), Direction::Desc),
                None => (token, Direction::Asc),
            };
            (!column.is_empty()).then(|| OrderBy {
                column: column.to_string(),
                direction,
            })
        })
        .collect()
}

/// The input's order wins over the resource's default.
pub fn resolve_order_by(requested: Option<&str>, default: Option<&str>) -> Vec<OrderBy> {
    requested
        .filter(|s| !s.trim().is_empty())
        .or(default)
        .map(parse_order_by)
        .unwrap_or_default()
}

/// Window for a paginated read; `None` when the input does not paginate.
pub fn page_window(paginate: Option<&Paginate>, settings: &ActionSettings) -> Option<PageWindow> {
    paginate.map(|p| PageWindow {
        offset: p.skip.unwrap_or(0),
        limit: settings.page_limit(p.limit),
    })
}

/// Columns to return; `None` means every column.
pub fn columns_to_return(config: Option<&ColumnsToReturn>, column_set: Option<&str>) -> Option<Vec<String>> {
    let columns = match config? {
        ColumnsToReturn::List(list) => list,
        ColumnsToReturn::Sets(sets) => column_set
            .and_then(|name| sets.get(name))
            .or_else(|| sets.get(DEFAULT_COLUMN_SET))?,
    };
    (!columns.is_empty()).then(|| columns.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn predicates_follow_declared_fields() {
        let specs = [FieldSpec::new("id"), FieldSpec::new("profile_id"), FieldSpec::new("name")];
        let fields = json!({ "id": [1, 2], "profile_id": 4, "name": null, "other": 1 });
        assert_eq!(
            build_predicates(Some(&specs), fields.as_object().unwrap()),
            vec![
                Predicate::In("id".into(), vec![json!(1), json!(2)]),
                Predicate::Eq("profile_id".into(), json!(4)),
            ]
        );
        assert!(build_predicates(None, fields.as_object().unwrap()).is_empty());
    }

    #[test]
    fn order_by_chain() {
        assert_eq!(
            parse_order_by("-updated_at, name,"),
            vec![
                OrderBy {
                    column: "updated_at".into(),
                    direction: Direction::Desc
                },
                OrderBy {
                    column: "name".into(),
                    direction: Direction::Asc
                },
            ]
        );
        assert_eq!(resolve_order_by(Some("name"), Some("-id"))[0].column, "name");
        assert_eq!(resolve_order_by(None, Some("-id"))[0].direction, Direction::Desc);
        assert!(resolve_order_by(None, None).is_empty());
    }

    #[test]
    fn pagination_defaults_and_cap() {
        let settings = ActionSettings::default();
        let window = page_window(Some(&Paginate { skip: None, limit: None }), &settings).unwrap();
        assert_eq!(window, PageWindow { offset: 0, limit: 10 });
        let capped = page_window(Some(&Paginate::new(5, 5000)), &settings).unwrap();
        assert_eq!(capped.limit, 1000);
        assert!(page_window(None, &settings).is_none());
    }

    #[test]
    fn column_projection_resolution() {
        let list = ColumnsToReturn::List(strings(&["id", "name"]));
        assert_eq!(columns_to_return(Some(&list), Some("other")), Some(strings(&["id", "name"])));
        assert_eq!(columns_to_return(Some(&ColumnsToReturn::List(vec![])), None), None);
        assert_eq!(columns_to_return(None, Some("list")), None);

        let mut sets = BTreeMap::new();
        sets.insert("list".to_string(), strings(&["id"]));
        let no_default = ColumnsToReturn::Sets(sets.clone());
        assert_eq!(columns_to_return(Some(&no_default), Some("list")), Some(strings(&["id"])));
        assert_eq!(columns_to_return(Some(&no_default), Some("nope")), None);

        sets.insert("default".to_string(), strings(&["id", "slug"]));
        let with_default = ColumnsToReturn::Sets(sets);
        assert_eq!(columns_to_return(Some(&with_default), Some("nope")), Some(strings(&["id", "slug"])));
        assert_eq!(columns_to_return(Some(&with_default), None), Some(strings(&["id", "slug"])));
    }
}
