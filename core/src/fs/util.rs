use std::cmp::Ordering;
use std::ffi::OsStr;
use std::path::Path;

use crate::error::ContentError;

use super::Result;

/// Characters rejected anywhere in a logical path.
const INVALID_PATH_CHARS: &[char] = &['<', '>', '"', '|', '?', '*', '\0'];

/// Characters additionally rejected in a flat archive entry name.
const INVALID_NAME_CHARS: &[char] = &['/', '\\', ':'];

pub fn is_hidden(path: &Path) -> bool {
    path.file_name().and_then(OsStr::to_str).map(|name| name.starts_with('.')).unwrap_or(false)
}

/// Upper-invariant table key for a name.
pub fn name_key(name: &str) -> String {
    name.to_uppercase()
}

/// Check a logical path handed to the resolver. Separators are allowed.
pub fn validate_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(ContentError::invalid_argument("path is empty"));
    }
    if let Some(bad) = path.chars().find(|ch| INVALID_PATH_CHARS.contains(ch) || ch.is_control()) {
        return Err(ContentError::invalid_argument(format!(
            "path {path:?} contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

/// Check a flat file name stored in an archive table: no separators and no
/// drive-letter colon.
pub fn validate_name(name: &str) -> Result<()> {
    validate_path(name)?;
    if let Some(bad) = name.chars().find(|ch| INVALID_NAME_CHARS.contains(ch)) {
        return Err(ContentError::invalid_argument(format!(
            "file name {name:?} contains invalid character {bad:?}"
        )));
    }
    if name == "." || name == ".." {
        return Err(ContentError::invalid_argument(format!("{name:?} is not a file name")));
    }
    Ok(())
}

/// Lowercase an extension and strip one leading dot, so `".PNG"` and `"png"`
/// compare equal.
pub fn normalize_extension(extension: &str) -> Result<String> {
    let trimmed = extension.strip_prefix('.').unwrap_or(extension);
    if trimmed.is_empty() {
        return Err(ContentError::invalid_argument(format!(
            "extension {extension:?} is empty"
        )));
    }
    if trimmed.chars().any(|ch| {
        ch == '.'
            || ch.is_whitespace()
            || INVALID_PATH_CHARS.contains(&ch)
            || INVALID_NAME_CHARS.contains(&ch)
            || ch.is_control()
    }) {
        return Err(ContentError::invalid_argument(format!(
            "extension {extension:?} is malformed"
        )));
    }
    Ok(trimmed.to_lowercase())
}

/// Extension of the last path segment, without the dot.
pub fn extension_of(name: &str) -> Option<&str> {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match file.rfind('.') {
        Some(0) | None => None,
        Some(idx) if idx + 1 < file.len() => Some(&file[idx + 1..]),
        Some(_) => None,
    }
}

pub fn natural_cmp_path(a: &Path, b: &Path) -> Ordering {
    natural_cmp(&to_cmp_key(a), &to_cmp_key(b))
}

fn to_cmp_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a_tokens = tokenize(a);
    let b_tokens = tokenize(b);

    for (a_tok, b_tok) in a_tokens.iter().zip(b_tokens.iter()) {
        let ordering = match (a_tok, b_tok) {
            (Token::Number(a_digits, a_val), Token::Number(b_digits, b_val)) => {
                a_val.cmp(b_val).then_with(|| a_digits.len().cmp(&b_digits.len()))
            }
            (Token::Text(a_text), Token::Text(b_text)) => a_text.cmp(b_text),
            (Token::Number(..), Token::Text(..)) => Ordering::Less,
            (Token::Text(..), Token::Number(..)) => Ordering::Greater,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    a_tokens.len().cmp(&b_tokens.len()).then_with(|| a.cmp(b))
}

#[derive(Debug, PartialEq)]
pub enum Token<'a> {
    Text(&'a str),
    Number(&'a str, u128),
}

pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut chars = input.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if !ch.is_ascii_digit() {
            continue;
        }
        if start < idx {
            tokens.push(Token::Text(&input[start..idx]));
        }
        let mut end = idx + ch.len_utf8();
        while let Some(&(nidx, nch)) = chars.peek() {
            if !nch.is_ascii_digit() {
                break;
            }
            chars.next();
            end = nidx + nch.len_utf8();
        }
        let digits = &input[idx..end];
        tokens.push(Token::Number(digits, digits.parse::<u128>().unwrap_or(0)));
        start = end;
    }

    if start < input.len() {
        tokens.push(Token::Text(&input[start..]));
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_dot_and_case_insensitive() {
        assert_eq!(normalize_extension(".PNG").unwrap(), "png");
        assert_eq!(normalize_extension("png").unwrap(), "png");
    }

    #[test]
    fn malformed_extensions_are_rejected() {
        for bad in ["", ".", "tar.gz", "p g", "a/b", "x*"] {
            let err = normalize_extension(bad).unwrap_err();
            assert!(matches!(err, ContentError::InvalidArgument(_)), "{bad:?}");
        }
    }

    #[test]
    fn extension_of_uses_last_segment() {
        assert_eq!(extension_of("art/hero.BMP"), Some("BMP"));
        assert_eq!(extension_of("dir.d/readme"), None);
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn names_reject_separators_and_drive_letters() {
        assert!(validate_name("a.bin").is_ok());
        assert!(validate_name("sub/a.bin").is_err());
        assert!(validate_name("c:a.bin").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_path("sub/a.bin").is_ok());
        assert!(validate_path("what?.bin").is_err());
        assert!(validate_path("   ").is_err());
    }
}
