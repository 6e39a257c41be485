use url::Url;

/// Replaces the password component of a URL with `***`.
///
/// IP camera URLs usually carry credentials inline, and they end up in logs,
/// reports and error messages. Strings that do not parse as URLs are
/// returned with anything between `//` and `@` masked.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("***")).is_err() {
                return mask_userinfo(raw);
            }
            url.to_string()
        }
        Err(_) => mask_userinfo(raw),
    }
}

fn mask_userinfo(raw: &str) -> String {
    let Some(scheme_end) = raw.find("//") else {
        return raw.to_string();
    };
    let authority_start = scheme_end + 2;
    let rest = &raw[authority_start..];
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}***@{}", &raw[..authority_start], &rest[at + 1..]),
        None => raw.to_string(),
    }
}
