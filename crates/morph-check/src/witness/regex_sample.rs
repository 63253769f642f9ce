//! Rough sample strings for regex domains.
//!
//! The generator understands literals, escapes, classes, groups with
//! alternation (first branch only) and the usual quantifiers (minimum count).
//! Anything it gets wrong is caught by checking the sample against the
//! compiled pattern, after which a few fixed fallbacks are tried.

use regex::Regex;

const FALLBACKS: &[&str] = &["", "a", "0", "abc", "a1", "A", "test", "a@b.co", "2024-01-01"];

/// A string the pattern matches, or `None` if the pattern is invalid or no
/// candidate matched.
pub fn sample_matching(pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    let rough = rough_sample(pattern);
    std::iter::once(rough)
        .chain(FALLBACKS.iter().map(|s| s.to_string()))
        .find(|candidate| re.is_match(candidate))
}

fn rough_sample(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut pos = 0;
    let mut out = String::new();
    sequence(&chars, &mut pos, &mut out);
    out
}

/// Generates one alternative of a sequence, leaving `pos` on the closing
/// parenthesis (or the end).
fn sequence(chars: &[char], pos: &mut usize, out: &mut String) {
    while let Some(&c) = chars.get(*pos) {
        let piece = match c {
            ')' => return,
            '|' => {
                skip_alternatives(chars, pos);
                return;
            }
            '^' | '$' => {
                *pos += 1;
                continue;
            }
            '(' => {
                *pos += 1;
                if chars.get(*pos) == Some(&'?') {
                    // (?:...), (?i) and friends: skip up to the flag terminator.
                    while let Some(&f) = chars.get(*pos) {
                        *pos += 1;
                        if f == ':' || f == ')' {
                            break;
                        }
                    }
                    if chars.get(pos.saturating_sub(1)) == Some(&')') {
                        continue;
                    }
                }
                let mut group = String::new();
                sequence(chars, pos, &mut group);
                *pos += 1;
                group
            }
            '[' => class(chars, pos).to_string(),
            '\\' => {
                *pos += 1;
                let escaped = chars.get(*pos).copied().unwrap_or('\\');
                *pos += 1;
                escape(escaped).to_string()
            }
            '.' => {
                *pos += 1;
                "a".to_string()
            }
            other => {
                *pos += 1;
                other.to_string()
            }
        };
        let count = quantifier(chars, pos);
        out.push_str(&piece.repeat(count));
    }
}

/// Skips the remaining `|` branches of the current group.
fn skip_alternatives(chars: &[char], pos: &mut usize) {
    let mut depth = 0usize;
    while let Some(&c) = chars.get(*pos) {
        match c {
            '\\' => *pos += 1,
            '(' => depth += 1,
            ')' if depth == 0 => return,
            ')' => depth -= 1,
            _ => {}
        }
        *pos += 1;
    }
}

/// A member of the class starting at `pos`, leaving `pos` after the `]`.
fn class(chars: &[char], pos: &mut usize) -> char {
    *pos += 1;
    let negated = chars.get(*pos) == Some(&'^');
    if negated {
        *pos += 1;
    }
    let mut first = None;
    let mut members = Vec::new();
    let mut start = true;
    while let Some(&c) = chars.get(*pos) {
        if c == ']' && !start {
            *pos += 1;
            break;
        }
        start = false;
        let member = if c == '\\' {
            *pos += 1;
            escape(chars.get(*pos).copied().unwrap_or('\\'))
        } else {
            c
        };
        first.get_or_insert(member);
        members.push(member);
        *pos += 1;
    }
    if negated {
        return ['a', 'x', '0', '_', ' ']
            .into_iter()
            .find(|c| !members.contains(c))
            .unwrap_or('~');
    }
    first.unwrap_or('a')
}

fn escape(c: char) -> char {
    match c {
        'd' => '0',
        'w' | 'S' | 'D' => 'a',
        's' => ' ',
        'W' => '-',
        'n' => '\n',
        't' => '\t',
        other => other,
    }
}

/// The minimum repeat count of the quantifier at `pos`, consuming it.
fn quantifier(chars: &[char], pos: &mut usize) -> usize {
    let count = match chars.get(*pos) {
        Some('?') | Some('*') => {
            *pos += 1;
            0
        }
        Some('+') => {
            *pos += 1;
            1
        }
        Some('{') => {
            let rest: String = chars[*pos + 1..].iter().take_while(|c| **c != '}').collect();
            let min = rest.split(',').next().and_then(|n| n.trim().parse().ok());
            match min {
                Some(min) => {
                    *pos += rest.chars().count() + 2;
                    min
                }
                None => return 1,
            }
        }
        _ => return 1,
    };
    // Lazy and possessive suffixes.
    if matches!(chars.get(*pos), Some('?') | Some('+')) {
        *pos += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_samples(pattern: &str) {
        let sample = sample_matching(pattern).unwrap();
        assert!(Regex::new(pattern).unwrap().is_match(&sample), "{pattern} -> {sample:?}");
    }

    #[test]
    fn rough_shapes() {
        assert_eq!(rough_sample(r"^\d{3}-\d{2}$"), "000-00");
        assert_eq!(rough_sample("^(ab|cd)+x?$"), "ab");
        assert_eq!(rough_sample("^[A-Z][a-z]*$"), "A");
        assert_eq!(rough_sample("^[^a]$"), "x");
    }

    #[test]
    fn samples_match_their_patterns() {
        for pattern in [
            r"^[a-z]+@[a-z]+\.[a-z]{2,}$",
            r"^\d{4}-\d{2}-\d{2}$",
            "^(?:GET|POST)$",
            r"^v\d+(\.\d+)*$",
            "anything",
            "^$",
        ] {
            assert_samples(pattern);
        }
    }

    #[test]
    fn invalid_patterns_have_no_sample() {
        assert_eq!(sample_matching("(unclosed"), None);
    }
}
