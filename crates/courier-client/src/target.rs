//! Target URL composition.

use url::Url;

/// Joins `base`, `prefix` and `target` into the URL handed to the transport.
///
/// Absolute targets pass through untouched. Otherwise the parts are joined
/// with `/` and repeated slashes collapse, except in the scheme separator.
#[must_use]
pub fn resolve(base: Option<&str>, prefix: Option<&str>, target: &str) -> String {
    if is_absolute(target) {
        return target.to_string();
    }

    let joined = [base, prefix, Some(target)]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    let joined = if base.is_some_and(|base| !base.is_empty()) || joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    };

    collapse_slashes(&joined)
}

fn is_absolute(target: &str) -> bool {
    Url::parse(target).is_ok_and(|url| url.has_host())
}

fn collapse_slashes(url: &str) -> String {
    let (scheme, rest) = match url.find("://") {
        Some(index) => url.split_at(index + 3),
        None => ("", url),
    };

    let mut collapsed = String::with_capacity(url.len());
    collapsed.push_str(scheme);
    let mut previous_slash = false;
    for ch in rest.chars() {
        if ch == '/' && previous_slash {
            continue;
        }
        previous_slash = ch == '/';
        collapsed.push(ch);
    }
    collapsed
}
