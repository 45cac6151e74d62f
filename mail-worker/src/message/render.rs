//! RFC 5322 rendering for transports that speak raw message text.

use base64::Engine;
use indexmap::IndexMap;

use super::recipients::encode_mime_header;
use super::Message;
use crate::queue::digest;

const CRLF: &str = "\r\n";
const BASE64_LINE: usize = 76;

fn find_header<'a>(headers: &'a IndexMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Collapse line breaks so a value can never start a new header line.
fn single_line(value: &str) -> String {
    value
        .split(|c| c == '\r' || c == '\n')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.extend(name.chars().filter(|c| !matches!(c, '\r' | '\n' | ':')));
    out.push_str(": ");
    out.push_str(&encode_mime_header(&single_line(value)));
    out.push_str(CRLF);
}

fn wrapped_base64(bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    let lines: Vec<&str> = encoded
        .as_bytes()
        .chunks(BASE64_LINE)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    lines.join(CRLF)
}

/// Render `message` as RFC 5322 text addressed to `to`.
///
/// A `To` header is added from `to` unless the message already has one.
/// Non-ASCII header values are MIME-encoded. Attachments turn the message
/// into `multipart/mixed` with base64 parts.
pub fn render(to: &[String], message: &Message) -> String {
    let headers = message.headers();
    let body = message.body().unwrap_or_default();
    let mut out = String::new();

    if find_header(headers, "To").is_none() && !to.is_empty() {
        push_header(&mut out, "To", &to.join(", "));
    }
    if find_header(headers, "MIME-Version").is_none() {
        push_header(&mut out, "MIME-Version", "1.0");
    }

    let body_type = find_header(headers, "Content-Type")
        .unwrap_or("text/plain; charset=utf-8")
        .to_string();

    if message.attachments().is_empty() {
        for (name, value) in headers {
            push_header(&mut out, name, value);
        }
        if find_header(headers, "Content-Type").is_none() {
            push_header(&mut out, "Content-Type", &body_type);
        }
        if !body.is_ascii() && find_header(headers, "Content-Transfer-Encoding").is_none() {
            push_header(&mut out, "Content-Transfer-Encoding", "8bit");
        }
        out.push_str(CRLF);
        out.push_str(body);
        return out;
    }

    let boundary = format!("=_{}", &digest(body.as_bytes())[..24]);

    for (name, value) in headers {
        if name.eq_ignore_ascii_case("Content-Type")
            || name.eq_ignore_ascii_case("Content-Transfer-Encoding")
        {
            continue;
        }
        push_header(&mut out, name, value);
    }
    push_header(
        &mut out,
        "Content-Type",
        &format!("multipart/mixed; boundary=\"{boundary}\""),
    );
    out.push_str(CRLF);

    out.push_str(&format!("--{boundary}{CRLF}"));
    push_header(&mut out, "Content-Type", &body_type);
    if !body.is_ascii() {
        push_header(&mut out, "Content-Transfer-Encoding", "8bit");
    }
    out.push_str(CRLF);
    out.push_str(body);
    out.push_str(CRLF);

    for attachment in message.attachments() {
        out.push_str(&format!("--{boundary}{CRLF}"));
        if find_header(&attachment.headers, "Content-Type").is_none() {
            push_header(&mut out, "Content-Type", "application/octet-stream");
        }
        for (name, value) in &attachment.headers {
            if name.eq_ignore_ascii_case("Content-Transfer-Encoding") {
                continue;
            }
            push_header(&mut out, name, value);
        }
        push_header(&mut out, "Content-Transfer-Encoding", "base64");
        out.push_str(CRLF);
        out.push_str(&wrapped_base64(&attachment.content));
        out.push_str(CRLF);
    }

    out.push_str(&format!("--{boundary}--{CRLF}"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailparse::{parse_mail, MailHeaderMap};

    #[test]
    fn test_render_single_part() {
        let mut message = Message::new();
        message
            .set_header("From", "noreply@x.com")
            .set_subject("Café ouvert")
            .set_body("Bonjour");

        let raw = render(&["Ann <a@x.com>".to_string(), "b@x.com".to_string()], &message);
        let parsed = parse_mail(raw.as_bytes()).unwrap();

        assert_eq!(
            parsed.headers.get_first_value("To"),
            Some("Ann <a@x.com>, b@x.com".to_string())
        );
        assert_eq!(
            parsed.headers.get_first_value("Subject"),
            Some("Café ouvert".to_string())
        );
        assert_eq!(parsed.ctype.mimetype, "text/plain");
        assert_eq!(parsed.get_body().unwrap().trim_end(), "Bonjour");
    }

    #[test]
    fn test_line_breaks_in_params_cannot_add_headers() {
        let transport = crate::transport::InMemoryTransport::new();
        let mut message = Message::new();
        message
            .set_subject("{s}")
            .bind_param("{s}", "Hi\r\nX-Injected: yes")
            .set_header("X-Tag\r\nBcc", "v\nBcc: victim@y.com")
            .set_body("x");
        message.send("a@x.com", &transport);

        let raw = render(&["a@x.com".to_string()], &transport.deliveries()[0].message);
        let parsed = parse_mail(raw.as_bytes()).unwrap();

        assert!(!raw.contains("\r\nX-Injected: yes\r\n"));
        assert_eq!(parsed.headers.get_first_value("X-Injected"), None);
        assert_eq!(parsed.headers.get_first_value("Bcc"), None);
        assert_eq!(
            parsed.headers.get_first_value("Subject"),
            Some("Hi X-Injected: yes".to_string())
        );
    }

    #[test]
    fn test_render_keeps_existing_to() {
        let mut message = Message::new();
        message.set_header("To", "list@x.com").set_body("x");

        let raw = render(&["a@x.com".to_string()], &message);
        let parsed = parse_mail(raw.as_bytes()).unwrap();

        assert_eq!(parsed.headers.get_all_values("To"), vec!["list@x.com".to_string()]);
    }

    #[test]
    fn test_render_multipart_with_attachment() {
        let content: Vec<u8> = (0u8..=255).collect();
        let mut message = Message::new();
        message
            .set_header("Content-Type", "text/html; charset=utf-8")
            .set_body("<p>Report</p>")
            .add_attachment(
                content.clone(),
                vec![
                    ("Content-Type", "application/octet-stream"),
                    ("Content-Disposition", "attachment; filename=\"data.bin\""),
                ],
            );

        let raw = render(&["a@x.com".to_string()], &message);
        let parsed = parse_mail(raw.as_bytes()).unwrap();

        assert_eq!(parsed.ctype.mimetype, "multipart/mixed");
        assert_eq!(parsed.subparts.len(), 2);
        assert_eq!(parsed.subparts[0].ctype.mimetype, "text/html");
        assert_eq!(parsed.subparts[1].get_body_raw().unwrap(), content);
    }
}
