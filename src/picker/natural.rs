//! Natural, case-insensitive string ordering: runs of digits compare by
//! numeric value, everything else compares by lowercased character.
use std::{cmp::Ordering, iter::Peekable, str::Chars};

fn take_number(chars: &mut Peekable<Chars>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(*c);
        chars.next();
    }
    digits
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        // More leading zeros sort first.
        .then_with(|| b.len().cmp(&a.len()))
}

/// Compare two strings in natural order, ignoring case.
pub fn compare(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let order = compare_numbers(&take_number(&mut left), &take_number(&mut right));
                if order != Ordering::Equal {
                    return order;
                }
            }
            (Some(l), Some(r)) => {
                let order = l.to_lowercase().cmp(r.to_lowercase());
                if order != Ordering::Equal {
                    return order;
                }
                left.next();
                right.next();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_compare_numerically() {
        let mut names = vec!["test10", "test9", "Test1", "test100", "test09"];
        names.sort_by(|a, b| compare(a, b));
        assert_eq!(names, vec!["Test1", "test09", "test9", "test10", "test100"]);
    }

    #[test]
    fn case_is_ignored_with_stable_tiebreak() {
        assert_eq!(compare("block", "Block_content"), Ordering::Less);
        assert_eq!(compare("Views", "views_ui"), Ordering::Less);
        assert_ne!(compare("abc", "ABC"), Ordering::Equal);
        assert_eq!(compare("abc", "abc"), Ordering::Equal);
    }

    #[test]
    fn namespaces_sort_naturally() {
        let mut classes = vec![
            "Drupal\\Tests\\node\\Functional\\NodeTest2",
            "Drupal\\Tests\\block\\Kernel\\BlockTest",
            "Drupal\\Tests\\node\\Functional\\NodeTest10",
        ];
        classes.sort_by(|a, b| compare(a, b));
        assert_eq!(
            classes,
            vec![
                "Drupal\\Tests\\block\\Kernel\\BlockTest",
                "Drupal\\Tests\\node\\Functional\\NodeTest2",
                "Drupal\\Tests\\node\\Functional\\NodeTest10",
            ]
        );
    }
}
