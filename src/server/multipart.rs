/// A file part pulled out of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field name (`name="..."`).
    pub field_name: Option<String>,
    /// Client-side file name (`filename="..."`); may be empty.
    pub filename: String,
    /// The part's own `Content-Type` header, if it sent one.
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Returns the index of the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `haystack` on every occurrence of `needle`, returning the pieces
/// between occurrences (excluding the needle itself).
pub fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut result = Vec::new();
    let mut start = 0;
    while start <= haystack.len() {
        if let Some(pos) = find_subsequence(&haystack[start..], needle) {
            result.push(&haystack[start..start + pos]);
            start += pos + needle.len();
        } else {
            result.push(&haystack[start..]);
            break;
        }
    }
    result
}

/// True for `multipart/form-data`, in any case, with or without parameters.
pub fn is_multipart_form(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map_or(false, |essence| essence.trim().eq_ignore_ascii_case("multipart/form-data"))
}

/// Extracts the boundary token from a Content-Type header value like
/// `multipart/form-data; boundary=----WebKitFormBoundaryXXX`.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(|s| s.trim())
        .find(|s| s.get(..9).map_or(false, |k| k.eq_ignore_ascii_case("boundary=")))
        .map(|s| s[9..].trim_matches('"').to_owned())
        .filter(|b| !b.is_empty())
}

/// Returns every file part (parts whose disposition carries `filename=`),
/// in body order.
pub fn extract_files(body: &[u8], boundary: &str) -> Vec<UploadedFile> {
    let delimiter = format!("--{}", boundary);
    let parts = split_on(body, delimiter.as_bytes());
    let sep = b"\r\n\r\n";

    let mut files = Vec::new();
    for part in parts {
        let Some(sep_pos) = find_subsequence(part, sep) else { continue };
        let headers = String::from_utf8_lossy(&part[..sep_pos]);

        let mut field_name = None;
        let mut filename = None;
        let mut content_type = None;
        for line in headers.split("\r\n").map(str::trim).filter(|l| !l.is_empty()) {
            let Some((key, value)) = line.split_once(':') else { continue };
            let key = key.trim();
            if key.eq_ignore_ascii_case("Content-Disposition") {
                field_name = disposition_param(value, "name");
                filename = disposition_param(value, "filename");
            } else if key.eq_ignore_ascii_case("Content-Type") {
                let value = value.trim();
                if !value.is_empty() {
                    content_type = Some(value.to_owned());
                }
            }
        }

        if let Some(filename) = filename {
            let raw = &part[sep_pos + sep.len()..];
            let data = raw.strip_suffix(b"\r\n").unwrap_or(raw).to_vec();
            files.push(UploadedFile { field_name, filename, content_type, data });
        }
    }
    files
}

/// Picks the upload: the part named `preferred_field` if present, else the
/// first file part.
pub fn extract_upload(body: &[u8], boundary: &str, preferred_field: &str) -> Option<UploadedFile> {
    let mut files = extract_files(body, boundary);
    let pos = files
        .iter()
        .position(|f| f.field_name.as_deref() == Some(preferred_field))
        .unwrap_or(0);
    if files.is_empty() {
        None
    } else {
        Some(files.swap_remove(pos))
    }
}

/// Reads `key="value"` (or unquoted `key=value`) from a Content-Disposition
/// header value. `name` never matches inside `filename`.
fn disposition_param(value: &str, key: &str) -> Option<String> {
    split_params(value).into_iter().find_map(|param| {
        let (k, v) = param.split_once('=')?;
        if !k.trim().eq_ignore_ascii_case(key) {
            return None;
        }
        let v = v.trim();
        let v = v.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(v);
        Some(v.to_owned())
    })
}

/// Splits header parameters on `;`, ignoring separators inside quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[(&str, Option<&str>, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, filename, ct, data) in parts {
            out.extend_from_slice(b"--XyZ\r\n");
            let mut disp = format!("Content-Disposition: form-data; name=\"{}\"", name);
            if let Some(f) = filename {
                disp.push_str(&format!("; filename=\"{}\"", f));
            }
            out.extend_from_slice(disp.as_bytes());
            out.extend_from_slice(b"\r\n");
            if let Some(ct) = ct {
                out.extend_from_slice(format!("Content-Type: {}\r\n", ct).as_bytes());
            }
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(data);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"--XyZ--\r\n");
        out
    }

    #[test]
    fn boundary_parsing() {
        assert_eq!(extract_boundary("multipart/form-data; boundary=abc").as_deref(), Some("abc"));
        assert_eq!(extract_boundary("multipart/form-data; BOUNDARY=\"q r\"").as_deref(), Some("q r"));
        assert_eq!(extract_boundary("multipart/form-data"), None);
        assert!(is_multipart_form("Multipart/Form-Data; boundary=x"));
        assert!(!is_multipart_form("application/json"));
    }

    #[test]
    fn extracts_file_with_headers_and_binary_data() {
        let data: &[u8] = &[0xff, 0xd8, 0x00, b'\r', b'\n', 0x10];
        let b = body(&[
            ("note", None, None, &b"hello"[..]),
            ("file", Some("cat.jpg"), Some("image/jpeg"), data),
        ]);
        let f = extract_upload(&b, "XyZ", "file").unwrap();
        assert_eq!(f.field_name.as_deref(), Some("file"));
        assert_eq!(f.filename, "cat.jpg");
        assert_eq!(f.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(f.data, data);
    }

    #[test]
    fn prefers_named_field_then_first_file() {
        let b = body(&[
            ("other", Some("a.png"), Some("image/png"), &b"A"[..]),
            ("file", Some("b.png"), Some("image/png"), &b"B"[..]),
        ]);
        assert_eq!(extract_upload(&b, "XyZ", "file").unwrap().data, &b"B"[..]);
        assert_eq!(extract_upload(&b, "XyZ", "image").unwrap().data, &b"A"[..]);
    }

    #[test]
    fn text_fields_are_not_uploads() {
        let b = body(&[("filename_hint", None, None, &b"x"[..])]);
        assert!(extract_upload(&b, "XyZ", "file").is_none());
        assert!(extract_files(b"garbage", "XyZ").is_empty());
    }

    #[test]
    fn missing_part_content_type_is_none() {
        let b = body(&[("file", Some("blob"), None, &b"123"[..])]);
        assert_eq!(extract_upload(&b, "XyZ", "file").unwrap().content_type, None);
    }

    #[test]
    fn quoted_filename_may_contain_semicolons() {
        let header = "form-data; name=\"file\"; filename=\"a;b.png\"";
        assert_eq!(disposition_param(header, "filename").as_deref(), Some("a;b.png"));
        assert_eq!(disposition_param(header, "name").as_deref(), Some("file"));

        let b = body(&[("file", Some("x; y.jpg"), Some("image/jpeg"), &b"J"[..])]);
        assert_eq!(extract_upload(&b, "XyZ", "file").unwrap().filename, "x; y.jpg");
    }
}
