//! Query evaluation against cache-resident entities.
//!
//! The cache understands a subset of the store's query language: equality,
//! `$ne`, `$in`, `$nin` and `$gt` on top-level fields, `$or`, and `$and`.
//! Identity conditions are limited to equality, `$in` and `$gt`. Anything
//! else is rejected with `UnsupportedQueryCapability` so the caller can ask
//! the backing store instead of trusting a partial answer.

use skein_foundation::document::ID_FIELD;
use skein_foundation::{Document, Error, Result, Value};
use skein_store::{Condition, Query, Sort};

use crate::node::NodeRef;

/// Checks that the cache can evaluate every part of the query.
///
/// # Errors
///
/// Returns `UnsupportedQueryCapability` naming the first unsupported part.
pub fn check(query: &Query) -> Result<()> {
    match query {
        Query::All => Ok(()),
        Query::And(parts) | Query::Or(parts) => parts.iter().try_for_each(check),
        Query::Field { path, condition } => {
            if path.contains('.') {
                return Err(Error::unsupported_query(format!("nested path {path}")));
            }
            let supported = if path == ID_FIELD {
                matches!(condition, Condition::Eq(_) | Condition::In(_) | Condition::Gt(_))
            } else {
                matches!(
                    condition,
                    Condition::Eq(_)
                        | Condition::Ne(_)
                        | Condition::In(_)
                        | Condition::Nin(_)
                        | Condition::Gt(_)
                )
            };
            if supported {
                Ok(())
            } else {
                Err(Error::unsupported_query(format!(
                    "{} on {path}",
                    condition.operator()
                )))
            }
        }
    }
}

/// Filters candidates down to the matching ones, sorted.
///
/// # Errors
///
/// Returns `UnsupportedQueryCapability` if [`check`] rejects the query.
pub fn evaluate(query: &Query, candidates: Vec<NodeRef>, sort: &Sort) -> Result<Vec<NodeRef>> {
    check(query)?;
    let mut matched: Vec<(Document, NodeRef)> = candidates
        .into_iter()
        .filter_map(|node| {
            let document = node.snapshot();
            query.matches(&document).then_some((document, node))
        })
        .collect();
    sort_documents(&mut matched, sort);
    Ok(matched.into_iter().map(|(_, node)| node).collect())
}

/// Stable multi-key sort: one pass per key, lowest priority first.
fn sort_documents(items: &mut [(Document, NodeRef)], sort: &Sort) {
    let nil = Value::Nil;
    for (field, direction) in sort.keys().iter().rev() {
        items.sort_by(|(a, _), (b, _)| {
            let left = a.get(field).unwrap_or(&nil);
            let right = b.get(field).unwrap_or(&nil);
            direction.apply(left.cmp(right))
        });
    }
}
