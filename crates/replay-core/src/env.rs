//! `${VAR}` and `$(VAR)` expansion against a caller-supplied environment
//! map, grounded in the original tool's `expand_env_variables` (both
//! delimiter styles are Xcode-idiomatic and are supported interchangeably).
//!
//! An unknown variable name expands to the empty string unless the caller
//! asks for strict resolution, in which case [`expand`] returns the
//! offending name as an error. An unterminated `${`/`$(` (no matching
//! closing delimiter before the end of the string) is passed through
//! literally.

use std::collections::HashMap;

/// Expand `input` against `env`. When `strict` is true, an unknown variable
/// name is returned as `Err(name)` instead of expanding to the empty
/// string.
pub fn expand(input: &str, env: &HashMap<String, String>, strict: bool) -> Result<String, String> {
    let bytes = input.as_bytes();
    let mut result = String::with_capacity(input.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let (opener, closer) = if start < bytes.len() && bytes[start] == b'(' {
                (Some('('), ')')
            } else if start < bytes.len() && bytes[start] == b'{' {
                (Some('{'), '}')
            } else {
                (None, '\0')
            };

            if let Some(_opener) = opener {
                let name_start = start + 1;
                if let Some(rel_end) = input[name_start..].find(closer) {
                    let end = name_start + rel_end;
                    let varname = &input[name_start..end];
                    match env.get(varname) {
                        Some(value) => result.push_str(value),
                        None if strict => return Err(varname.to_string()),
                        None => {}
                    }
                    i = end + 1;
                    continue;
                }
            }
        }
        // Not a recognized ${..}/$(..) start (or no closing delimiter found):
        // copy the byte through literally. Safe because we only special-cased
        // ASCII '$', '(', '{', so the rest of the UTF-8 string is untouched.
        let ch_len = utf8_char_len(bytes[i]);
        result.push_str(&input[i..i + ch_len]);
        i += ch_len;
    }

    Ok(result)
}

fn utf8_char_len(byte: u8) -> usize {
    if byte & 0x80 == 0 {
        1
    } else if byte & 0xE0 == 0xC0 {
        2
    } else if byte & 0xF0 == 0xE0 {
        3
    } else {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn expands_brace_and_paren_forms() {
        let env = env_of(&[("HOME", "/home/u")]);
        assert_eq!(expand("${HOME}/x", &env, false).unwrap(), "/home/u/x");
        assert_eq!(expand("$(HOME)/x", &env, false).unwrap(), "/home/u/x");
    }

    #[test]
    fn unknown_variable_expands_to_empty_by_default() {
        let env = env_of(&[]);
        assert_eq!(expand("${MISSING}x", &env, false).unwrap(), "x");
    }

    #[test]
    fn unknown_variable_errors_in_strict_mode() {
        let env = env_of(&[]);
        assert_eq!(expand("${MISSING}", &env, true), Err("MISSING".to_string()));
    }

    #[test]
    fn unterminated_delimiter_is_literal() {
        let env = env_of(&[]);
        assert_eq!(expand("${MISSING", &env, false).unwrap(), "${MISSING");
    }

    #[test]
    fn literal_dollar_without_delimiter_passes_through() {
        let env = env_of(&[]);
        assert_eq!(expand("price: $5", &env, false).unwrap(), "price: $5");
    }
}
