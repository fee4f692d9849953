use crate::UrlError;
use url::Url;

/// Canonicalizes a category URL
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only http:// and https://
/// 3. Lowercase the host
/// 4. Normalize path:
///    - Remove dot segments (. and ..)
///    - Collapse repeated slashes
///    - Remove trailing slash (except for root /)
/// 5. Strip the query string and fragment
///
/// Category pages carry sort/filter/page state in the query, so two URLs
/// that differ only in their query address the same category.
///
/// # Examples
///
/// ```
/// use catalog_sweep::url::canonicalize_url;
///
/// let url = canonicalize_url("https://Shop.Example.com/c/dairy/1100/?sort=price#top").unwrap();
/// assert_eq!(url.as_str(), "https://shop.example.com/c/dairy/1100");
/// ```
pub fn canonicalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if let Some(host) = url.host_str() {
        let normalized_host = host.to_lowercase();
        url.set_host(Some(&normalized_host))
            .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;
    } else {
        return Err(UrlError::MissingDomain);
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

/// Extracts the stable numeric category id from a canonical URL
///
/// The id is the last run of ASCII digits in the path, so
/// `/browse/food/dairy/976759_9176907` yields `9176907`.
pub fn extract_category_id(url: &Url) -> Result<String, UrlError> {
    let path = url.path();
    let bytes = path.as_bytes();

    let end = match bytes.iter().rposition(|b| b.is_ascii_digit()) {
        Some(pos) => pos + 1,
        None => return Err(UrlError::MissingCategoryId(url.to_string())),
    };

    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map(|pos| pos + 1)
        .unwrap_or(0);

    Ok(path[start..end].to_string())
}

/// Returns the path tokens used to infer category ancestry
///
/// Tokens made only of digits, underscores and dashes are id tokens and
/// are excluded, so `/c/grocery/1000` and `/c/grocery/dairy/1100` produce
/// `[c, grocery]` and `[c, grocery, dairy]`.
pub fn path_segments(url: &Url) -> Vec<String> {
    url.path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| !is_id_token(segment))
        .map(|segment| segment.to_lowercase())
        .collect()
}

fn is_id_token(segment: &str) -> bool {
    segment
        .chars()
        .all(|c| c.is_ascii_digit() || c == '_' || c == '-')
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", normalized_segments.join("/"))
}
