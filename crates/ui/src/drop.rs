//! Paths delivered by a terminal drop.
//!
//! Terminals turn a dragged file into pasted text: usually the path with
//! shell escapes (`/a/my\ cv.pdf`), sometimes quoted or as a `file://` URI,
//! one per line or separated by spaces when several files are dropped.

pub(crate) fn parse_dropped_paths(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        for token in split_shell_words(line) {
            let path = strip_file_uri(&token);
            if !path.is_empty() {
                out.push(path);
            }
        }
    }
    out
}

fn split_shell_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => quote = Some(ch),
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn strip_file_uri(token: &str) -> String {
    let Some(rest) = token.strip_prefix("file://") else {
        return token.to_string();
    };
    // `file://host/path` keeps the path; `file:///path` has an empty host.
    let path = match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => rest,
    };
    percent_decode(path)
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
            && let Some(byte) = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            out.push(byte);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
