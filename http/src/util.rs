use crate::{Headers, KnownHeaderName};
use encoding_rs::Encoding;

/// The character encoding declared by a content-type header's `charset`
/// parameter, defaulting to windows-1252 per the whatwg encoding
/// standard when absent or unrecognized.
pub fn content_encoding(headers: &Headers) -> &'static Encoding {
    headers
        .get_str(KnownHeaderName::ContentType)
        .and_then(|content_type| {
            content_type.split(';').skip(1).find_map(|param| {
                let mut parts = param.splitn(2, '=');
                let name = parts.next()?.trim();
                let value = parts.next()?.trim().trim_matches('"');
                name.eq_ignore_ascii_case("charset")
                    .then(|| Encoding::for_label(value.as_bytes()))
                    .flatten()
            })
        })
        .unwrap_or(encoding_rs::WINDOWS_1252)
}

#[cfg(test)]
mod tests {
    use super::content_encoding;
    use crate::{Headers, KnownHeaderName};

    #[test]
    fn charset_lookup() {
        let mut headers = Headers::new();
        assert_eq!(content_encoding(&headers).name(), "windows-1252");

        headers.insert(KnownHeaderName::ContentType, "text/html; charset=UTF-8");
        assert_eq!(content_encoding(&headers).name(), "UTF-8");

        headers.insert(
            KnownHeaderName::ContentType,
            "text/html; boundary=x; charset=\"shift_jis\"",
        );
        assert_eq!(content_encoding(&headers).name(), "Shift_JIS");

        headers.insert(KnownHeaderName::ContentType, "text/html; charset=bogus");
        assert_eq!(content_encoding(&headers).name(), "windows-1252");
    }
}
