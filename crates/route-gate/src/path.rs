//! Request path canonicalization
//!
//! Rules are matched against the path the frontend will actually serve, so
//! the path is first reduced to the form an HTTP client or server resolves
//! it to: unreserved percent escapes decoded, `.` and `..` segments resolved,
//! and empty segments collapsed. `\` counts as a separator the way URL
//! parsers treat it for http(s).

/// Canonical form of `path`. Always absolute; a trailing slash is kept.
pub fn normalize_path(path: &str) -> String {
    let decoded = decode_unreserved(path);

    let mut segments: Vec<&str> = Vec::new();
    let mut trailing_slash = false;
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" => trailing_slash = true,
            "." => trailing_slash = true,
            ".." => {
                segments.pop();
                trailing_slash = true;
            }
            s => {
                segments.push(s);
                trailing_slash = false;
            }
        }
    }

    let mut normalized = String::with_capacity(decoded.len());
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() || trailing_slash {
        normalized.push('/');
    }
    normalized
}

/// Decode `%XX` escapes of unreserved characters (RFC 3986 section 2.3).
/// Other escapes are left untouched.
fn decode_unreserved(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                let decoded = (hi << 4) | lo;
                if is_unreserved(decoded) {
                    out.push(decoded);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    // Only ASCII escapes are replaced, so the bytes stay valid UTF-8
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_paths_are_unchanged() {
        for path in ["/", "/dashboard", "/users/5/assign-role", "/users/", "/a%2Fb"] {
            assert_eq!(normalize_path(path), path);
        }
    }

    #[test]
    fn dot_segments_are_resolved() {
        assert_eq!(normalize_path("/x/../dashboard"), "/dashboard");
        assert_eq!(normalize_path("/./users"), "/users");
        assert_eq!(normalize_path("/../../roles"), "/roles");
        assert_eq!(normalize_path("/users/5/.."), "/users/");
        assert_eq!(normalize_path("/users/."), "/users/");
    }

    #[test]
    fn repeated_separators_collapse() {
        assert_eq!(normalize_path("//dashboard"), "/dashboard");
        assert_eq!(normalize_path("/users///5"), "/users/5");
        assert_eq!(normalize_path("/x\\..\\audit-logs"), "/audit-logs");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn unreserved_escapes_are_decoded() {
        assert_eq!(normalize_path("/%64ashboard"), "/dashboard");
        assert_eq!(normalize_path("/x/%2e%2E/permissions"), "/permissions");
        assert_eq!(normalize_path("/%7Eadmin"), "/~admin");
    }

    #[test]
    fn reserved_and_malformed_escapes_are_kept() {
        assert_eq!(normalize_path("/users%2F5"), "/users%2F5");
        assert_eq!(normalize_path("/100%"), "/100%");
        assert_eq!(normalize_path("/%zzpage"), "/%zzpage");
        assert_eq!(normalize_path("/%4"), "/%4");
    }
}
