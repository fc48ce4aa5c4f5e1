use url::form_urlencoded;

use crate::template::Variables;

/// Collapse query parameters into one value per key.
///
/// A repeated key keeps the last value in arrival order. The `template`
/// parameter is not special here and is visible to templates like any other.
pub fn variables_from_query(query: Option<&str>) -> Variables {
    let mut variables = Variables::new();

    if let Some(query) = query {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            variables.insert(key.into_owned(), value.into_owned());
        }
    }

    variables
}
