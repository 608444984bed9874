use std::borrow::Cow;

pub fn header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|position| position + 4)
}

pub fn parse_http_status_code(raw: &[u8]) -> Option<u16> {
    let header_text = parse_http_header_text(raw)?;
    header_text
        .lines()
        .next()
        .filter(|status_line| status_line.starts_with("HTTP/"))
        .and_then(|status_line| status_line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
}

fn parse_http_header_text(raw: &[u8]) -> Option<Cow<'_, str>> {
    let end = header_end(raw)?;
    Some(String::from_utf8_lossy(&raw[..end]))
}
