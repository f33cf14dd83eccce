//! Byte-level markup tokenizer.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    Text(String),
}

pub(crate) fn tokenize(source: &str) -> Vec<Token> {
    let mut out = Vec::new();
    let bytes = source.as_bytes();
    let mut idx = 0_usize;

    while idx < bytes.len() {
        if starts_with(bytes, idx, b"<!--") {
            idx = skip_comment(bytes, idx);
            continue;
        }

        if bytes[idx] == b'<' {
            if starts_with(bytes, idx, b"</") {
                if let Some((token, next)) = parse_end_tag(bytes, idx) {
                    out.push(token);
                    idx = next;
                    continue;
                }
            } else if starts_with(bytes, idx, b"<!") || starts_with(bytes, idx, b"<?") {
                idx = skip_to_gt(bytes, idx.saturating_add(2));
                continue;
            } else if let Some((token, next)) = parse_start_tag(bytes, idx) {
                let raw_text_tag = match &token {
                    Token::Start {
                        name, self_closing, ..
                    } if !*self_closing && is_raw_text_tag(name) => Some(name.clone()),
                    _ => None,
                };

                out.push(token);
                idx = next;

                if let Some(tag_name) = raw_text_tag {
                    let (raw_text, closing_end) = read_raw_text(bytes, idx, &tag_name);
                    if !raw_text.is_empty() {
                        out.push(Token::Text(raw_text));
                    }
                    out.push(Token::End { name: tag_name });
                    idx = closing_end.unwrap_or(bytes.len());
                }

                continue;
            }
        }

        // A '<' that opens nothing recognisable is literal text.
        let next = find_byte(bytes, idx.saturating_add(1), b'<').unwrap_or(bytes.len());
        let text = String::from_utf8_lossy(&bytes[idx..next]).into_owned();
        match out.last_mut() {
            Some(Token::Text(previous)) => previous.push_str(&text),
            _ => out.push(Token::Text(text)),
        }
        idx = next;
    }

    out
}

fn parse_end_tag(bytes: &[u8], start: usize) -> Option<(Token, usize)> {
    let mut idx = skip_spaces(bytes, start.saturating_add(2));
    let begin = idx;
    while idx < bytes.len() && is_name_char(bytes[idx]) {
        idx += 1;
    }
    if idx == begin {
        return None;
    }

    let name = String::from_utf8_lossy(&bytes[begin..idx]).to_ascii_lowercase();
    let close = find_byte(bytes, idx, b'>')?;
    Some((Token::End { name }, close + 1))
}

fn parse_start_tag(bytes: &[u8], start: usize) -> Option<(Token, usize)> {
    let mut idx = start.saturating_add(1);
    let begin = idx;
    while idx < bytes.len() && is_name_char(bytes[idx]) {
        idx += 1;
    }
    if idx == begin {
        return None;
    }

    let name = String::from_utf8_lossy(&bytes[begin..idx]).to_ascii_lowercase();
    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut self_closing = false;

    loop {
        idx = skip_spaces(bytes, idx);
        let byte = *bytes.get(idx)?;

        if byte == b'>' {
            idx += 1;
            break;
        }

        if byte == b'/' {
            self_closing = true;
            idx += 1;
            continue;
        }

        let attr_start = idx;
        while idx < bytes.len() && is_attr_name_char(bytes[idx]) {
            idx += 1;
        }
        if idx == attr_start {
            // Garbage inside the tag: give up on attributes, keep the element.
            idx = skip_to_gt(bytes, idx);
            break;
        }
        self_closing = false;

        let attr_name = String::from_utf8_lossy(&bytes[attr_start..idx]).to_ascii_lowercase();
        idx = skip_spaces(bytes, idx);

        let mut value = String::new();
        if bytes.get(idx).copied() == Some(b'=') {
            idx = skip_spaces(bytes, idx + 1);
            match bytes.get(idx).copied() {
                Some(quote @ (b'"' | b'\'')) => {
                    let value_start = idx + 1;
                    let value_end = find_byte(bytes, value_start, quote).unwrap_or(bytes.len());
                    value = String::from_utf8_lossy(&bytes[value_start..value_end]).into_owned();
                    idx = value_end.saturating_add(1);
                }
                _ => {
                    let value_start = idx;
                    while idx < bytes.len()
                        && !bytes[idx].is_ascii_whitespace()
                        && bytes[idx] != b'>'
                    {
                        idx += 1;
                    }
                    value = String::from_utf8_lossy(&bytes[value_start..idx]).into_owned();
                }
            }
        }

        // First occurrence wins, as in browsers.
        if !attrs.iter().any(|(existing, _)| *existing == attr_name) {
            attrs.push((attr_name, decode_entities(&value)));
        }
    }

    Some((
        Token::Start {
            name,
            attrs,
            self_closing,
        },
        idx.min(bytes.len()),
    ))
}

fn read_raw_text(bytes: &[u8], start: usize, tag_name: &str) -> (String, Option<usize>) {
    let tag_bytes = tag_name.as_bytes();
    let mut idx = start;

    while let Some(lt) = find_byte(bytes, idx, b'<') {
        let name_start = lt + 2;
        let name_end = name_start + tag_bytes.len();
        if bytes.get(lt + 1).copied() == Some(b'/')
            && name_end <= bytes.len()
            && bytes[name_start..name_end].eq_ignore_ascii_case(tag_bytes)
        {
            let close = skip_spaces(bytes, name_end);
            if bytes.get(close).copied() == Some(b'>') {
                let text = String::from_utf8_lossy(&bytes[start..lt]).into_owned();
                return (text, Some(close + 1));
            }
        }
        idx = lt + 1;
    }

    (String::from_utf8_lossy(&bytes[start..]).into_owned(), None)
}

pub(crate) fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0_usize;

    while let Some(relative) = input[cursor..].find('&') {
        let amp = cursor + relative;
        out.push_str(&input[cursor..amp]);

        let decoded = input[amp + 1..]
            .find(';')
            .filter(|len| *len <= 10)
            .and_then(|len| decode_entity(&input[amp + 1..amp + 1 + len]).map(|ch| (ch, len)));

        match decoded {
            Some((ch, len)) => {
                out.push(ch);
                cursor = amp + len + 2;
            }
            None => {
                out.push('&');
                cursor = amp + 1;
            }
        }
    }

    out.push_str(&input[cursor..]);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "nbsp" => Some('\u{a0}'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start.saturating_add(4).min(bytes.len())..]
        .windows(3)
        .position(|window| window == b"-->")
        .map(|offset| start + 4 + offset + 3)
        .unwrap_or(bytes.len())
}

fn skip_to_gt(bytes: &[u8], idx: usize) -> usize {
    find_byte(bytes, idx, b'>')
        .map(|gt| gt + 1)
        .unwrap_or(bytes.len())
}

fn skip_spaces(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx += 1;
    }
    idx
}

fn find_byte(bytes: &[u8], from: usize, byte: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|candidate| *candidate == byte)
        .map(|offset| from + offset)
}

fn starts_with(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    bytes.get(idx..).is_some_and(|rest| rest.starts_with(pattern))
}

fn is_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':')
}

fn is_attr_name_char(byte: u8) -> bool {
    !byte.is_ascii_whitespace() && !matches!(byte, b'>' | b'/' | b'=' | b'"' | b'\'' | 0)
}

fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style" | "textarea" | "title")
}

#[cfg(test)]
mod tests {
    use super::Token;
    use super::decode_entities;
    use super::tokenize;

    #[test]
    fn script_bodies_are_raw_text() {
        let tokens = tokenize("<script>if (a < b) { x = '</div>'; }</script>");
        assert_eq!(
            tokens,
            vec![
                Token::Start {
                    name: "script".to_owned(),
                    attrs: Vec::new(),
                    self_closing: false,
                },
                Token::Text("if (a < b) { x = '</div>'; }".to_owned()),
                Token::End {
                    name: "script".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn attributes_handle_quotes_and_bare_values() {
        let tokens = tokenize("<a HREF='/about' data-x=1 hidden>");
        let Some(Token::Start { attrs, .. }) = tokens.first() else {
            panic!("expected start tag, got {tokens:?}");
        };
        assert_eq!(
            attrs,
            &vec![
                ("href".to_owned(), "/about".to_owned()),
                ("data-x".to_owned(), "1".to_owned()),
                ("hidden".to_owned(), String::new()),
            ]
        );
    }

    #[test]
    fn bare_value_may_contain_slashes() {
        let tokens = tokenize("<a href=/docs/intro>");
        let Some(Token::Start {
            attrs,
            self_closing,
            ..
        }) = tokens.first()
        else {
            panic!("expected start tag, got {tokens:?}");
        };
        assert_eq!(attrs[0].1, "/docs/intro");
        assert!(!self_closing);
    }

    #[test]
    fn stray_lt_is_text() {
        let tokens = tokenize("1 < 2");
        assert_eq!(tokens, vec![Token::Text("1 < 2".to_owned())]);
    }

    #[test]
    fn decodes_named_and_numeric_entities() {
        assert_eq!(decode_entities("a &amp; b &#x41;&#66; &bogus; &"), "a & b AB &bogus; &");
    }
}
