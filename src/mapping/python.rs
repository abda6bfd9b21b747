//! Python source helpers shared by the mapping rules and the script emitter

use std::collections::HashSet;

/// Render a Python string literal
pub fn py_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render a list of Python string literals
pub fn py_str_list<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let items: Vec<String> = values.into_iter().map(|v| py_str(v.as_ref())).collect();
    format!("[{}]", items.join(", "))
}

/// Render a `frames[...]` lookup
pub fn frame_ref(key: &str) -> String {
    format!("frames[{}]", py_str(key))
}

/// Lower-case identifier made of `[a-z0-9_]`, never empty and never starting with a digit
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("unnamed");
    }
    if slug.starts_with(|c: char| c.is_ascii_digit()) {
        slug.insert(0, '_');
    }
    slug
}

/// Hands out slugs that are unique within one package
#[derive(Debug, Default)]
pub struct SlugAllocator {
    used: HashSet<String>,
}

impl SlugAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, name: &str) -> String {
        let base = slugify(name);
        let mut candidate = base.clone();
        let mut n = 2;
        while !self.used.insert(candidate.clone()) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        candidate
    }
}

/// Turn free text into a single comment-safe line
pub fn comment_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Single-line text safe inside a `"""` docstring
pub fn doc_text(text: &str) -> String {
    comment_text(text).replace('\\', "/").replace('"', "'")
}
