//! Wildcard matching for directory searches.
//!
//! Matches the way the driver filters `FindFiles` results when a filesystem
//! does not implement pattern search: `*` matches any run of characters, `?`
//! exactly one, comparison ignores case. The DOS forms `<`, `>` and `"` are
//! treated as `*`, `?` and `.`.

/// Whether `name` matches `expression`.
///
/// ```
/// use dokan_host::name_matches_expression;
///
/// assert!(name_matches_expression("*.TXT", "notes.txt"));
/// assert!(name_matches_expression("a?c", "ABC"));
/// assert!(!name_matches_expression("*.rs", "main.rs.bak"));
/// ```
pub fn name_matches_expression(expression: &str, name: &str) -> bool {
    let pattern: Vec<char> = expression
        .chars()
        .flat_map(char::to_lowercase)
        .map(dos_equivalent)
        .collect();
    let name: Vec<char> = name.chars().flat_map(char::to_lowercase).collect();

    let (mut p, mut n) = (0, 0);
    // Position after the last `*` and the name index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p + 1, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star_p, star_n)) => {
                    p = star_p;
                    n = star_n + 1;
                    backtrack = Some((star_p, star_n + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

fn dos_equivalent(c: char) -> char {
    match c {
        '<' => '*',
        '>' => '?',
        '"' => '.',
        other => other,
    }
}
