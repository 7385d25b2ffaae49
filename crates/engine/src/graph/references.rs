//! Relative link resolution for cross references

/// Everything before `#`
pub fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(head, _)| head)
}

/// Split `scheme://host/path` into (`scheme://host`, `/path`)
fn split_origin(url: &str) -> (&str, &str) {
    match url.find("://") {
        Some(scheme_end) => {
            let after = scheme_end + 3;
            match url[after..].find('/') {
                Some(slash) => url.split_at(after + slash),
                None => (url, "/"),
            }
        }
        None => ("", url),
    }
}

/// Collapse `.` and `..` path segments
fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let trailing = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let mut out = segments.join("/");
    if absolute {
        out.insert(0, '/');
    }
    if trailing && !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Resolve `reference` relative to the document at `base`
pub fn resolve_url(base: Option<&str>, reference: &str) -> String {
    let reference = reference.trim();
    if reference.contains("://") {
        let (origin, path) = split_origin(reference);
        return format!("{origin}{}", normalize_with_fragment(path));
    }
    let Some(base) = base.map(str::trim).filter(|b| !b.is_empty()) else {
        return reference.to_string();
    };

    let base = strip_fragment(base);
    let base = base.split_once('?').map_or(base, |(head, _)| head);
    if reference.starts_with('#') {
        return format!("{base}{reference}");
    }

    let (origin, base_path) = split_origin(base);
    if let Some(rest) = reference.strip_prefix("//") {
        let scheme = origin.split_once("://").map_or("https", |(scheme, _)| scheme);
        return resolve_url(None, &format!("{scheme}://{rest}"));
    }

    let joined = if reference.starts_with('/') {
        reference.to_string()
    } else {
        let dir = base_path.rfind('/').map_or("", |idx| &base_path[..=idx]);
        format!("{dir}{reference}")
    };
    format!("{origin}{}", normalize_with_fragment(&joined))
}

fn normalize_with_fragment(path: &str) -> String {
    match path.split_once('#') {
        Some((head, fragment)) => format!("{}#{fragment}", normalize_path(head)),
        None => normalize_path(path),
    }
}

/// Document url key: resolved, fragment removed
pub fn document_key(url: &str) -> String {
    strip_fragment(&resolve_url(None, url)).to_string()
}
