use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{info, warn};

/// Parse a "Name: Value" header string into the map. Malformed entries are skipped.
fn parse_and_add_header(headers: &mut HeaderMap, header_str: &str) {
    let Some((name, value)) = header_str.split_once(':') else {
        warn!(header = header_str, "Invalid header format, expected 'Name: Value'");
        return;
    };
    let (name, value) = (name.trim(), value.trim());

    let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
        warn!(name, "Invalid header name");
        return;
    };
    let Ok(header_value) = HeaderValue::from_str(value) else {
        warn!(name, "Invalid header value");
        return;
    };

    info!(name, "Adding request header");
    // Repeated names are kept, as the origin may expect several cookies.
    headers.append(header_name, header_value);
}

/// Headers sent with every playlist and segment request of the session.
pub fn parse_headers(header_strings: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for header_str in header_strings {
        parse_and_add_header(&mut headers, header_str);
    }
    headers
}
