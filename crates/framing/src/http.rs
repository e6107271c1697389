use bytes::Bytes;

/// An HTTP/1.1 response exactly as the runtime produced it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawHttpResponse {
    pub protocol: Option<String>,
    pub status_code: Option<u16>,
    pub status_message: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

const CRLF: &[u8] = b"\r\n";

fn find_crlf(haystack: &[u8], from: usize) -> Option<usize> {
    haystack[from..]
        .windows(CRLF.len())
        .position(|w| w == CRLF)
        .map(|p| p + from)
}

/// Parses using CRLF as the only line delimiter so that a lone `\n` inside
/// a binary body never shifts the header/body boundary. Header text is
/// read as latin-1; the body is returned as the untouched byte remainder.
pub fn parse_http_response(raw: &[u8]) -> RawHttpResponse {
    let mut response = RawHttpResponse::default();
    if raw.is_empty() {
        return response;
    }

    let (status_line, mut cursor) = match find_crlf(raw, 0) {
        Some(end) => (&raw[..end], Some(end + CRLF.len())),
        None => (raw, None),
    };
    parse_status_line(&latin1(status_line), &mut response);

    while let Some(start) = cursor {
        match find_crlf(raw, start) {
            Some(end) => {
                let line = &raw[start..end];
                cursor = Some(end + CRLF.len());
                if line.is_empty() {
                    response.body = Bytes::copy_from_slice(&raw[end + CRLF.len()..]);
                    break;
                }
                push_header(&latin1(line), &mut response.headers);
            }
            None => {
                // headers never terminated, so there is no body
                let line = &raw[start..];
                if !line.is_empty() {
                    push_header(&latin1(line), &mut response.headers);
                }
                cursor = None;
            }
        }
    }

    response
}

fn parse_status_line(line: &str, response: &mut RawHttpResponse) {
    let mut parts = line.splitn(3, ' ');
    response.protocol = parts.next().filter(|p| !p.is_empty()).map(String::from);
    response.status_code = parts.next().and_then(|code| code.trim().parse().ok());
    response.status_message = parts.next().map(|m| m.trim().to_string());
}

fn push_header(line: &str, headers: &mut Vec<(String, String)>) {
    if let Some((name, value)) = line.split_once(':') {
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Serializes a response the way the runtime mock does before base64 wrapping.
pub fn render_http_response(
    status_code: u16,
    status_message: &str,
    headers: &[(String, String)],
    body: &[u8],
) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status_code} {status_message}\r\n").into_bytes();
    for (name, value) in headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(CRLF);
    }
    out.extend_from_slice(CRLF);
    out.extend_from_slice(body);
    out
}
