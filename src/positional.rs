//! Named to positional placeholder conversion.
//!
//! Used when a statement written with `:name` placeholders has to go through
//! an API that only understands `?`.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PLACEHOLDER_RUN: Regex = Regex::new(r"\?+").unwrap();
}

/// SQL with `?` placeholders and the values in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteResult<V> {
    pub sql: String,
    pub values: Vec<V>,
}

/// Converts `:name` placeholders into `?` and orders the values to match.
///
/// Names may be given with or without the leading `:`. The order of `params`
/// does not matter; values come out in the order their placeholders appear in
/// `sql`. Each name is expected to appear exactly once. Names that do not
/// appear at all are dropped.
///
/// Placeholders must be separated by at least one other character, and any
/// literal run of `?` already present in `sql` is collapsed as well.
///
/// # Examples
///
/// ```
/// use sqlx_resilient::to_positional;
///
/// let rewritten = to_positional(
///     "SELECT * FROM foo WHERE bar = :bar AND qux = :barqux",
///     [("barqux", "fooqux"), ("bar", "quxbar")],
/// );
///
/// assert_eq!(rewritten.sql, "SELECT * FROM foo WHERE bar = ? AND qux = ?");
/// assert_eq!(rewritten.values, vec!["quxbar", "fooqux"]);
/// ```
pub fn to_positional<K, V, I>(sql: &str, params: I) -> RewriteResult<V>
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, V)>,
{
    let mut params: Vec<(K, V)> = params.into_iter().collect();
    if params.is_empty() {
        return RewriteResult {
            sql: sql.to_string(),
            values: Vec::new(),
        };
    }

    // Longest first, so ":bar" can never be found inside ":barqux".
    params.sort_by(|(a, _), (b, _)| b.as_ref().len().cmp(&a.as_ref().len()));

    let mut masked = sql.to_string();
    let mut positioned: Vec<(usize, V)> = Vec::with_capacity(params.len());
    for (name, value) in params {
        let name = name.as_ref();
        let token = if name.starts_with(':') {
            name.to_string()
        } else {
            format!(":{name}")
        };

        let Some(offset) = masked.find(&token) else {
            tracing::debug!(placeholder = %token, "placeholder not found in statement");
            continue;
        };
        positioned.push((offset, value));

        // Same byte length, so offsets of names not yet located stay valid.
        masked = masked.replace(&token, &"?".repeat(token.len()));
    }

    positioned.sort_by_key(|(offset, _)| *offset);

    RewriteResult {
        sql: PLACEHOLDER_RUN.replace_all(&masked, "?").into_owned(),
        values: positioned.into_iter().map(|(_, value)| value).collect(),
    }
}
