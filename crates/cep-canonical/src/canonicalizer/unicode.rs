//! Character-level cleanup shared by every field kind.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Unicode normalization form C.
pub fn nfc(value: &str) -> String {
    value.nfc().collect()
}

/// Removes control and invisible formatting characters; line breaks and tabs become spaces.
pub fn strip_controls(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\t' | '\n' | '\r' | '\u{000B}' | '\u{000C}' => out.push(' '),
            '\u{200B}' | '\u{FEFF}' | '\u{00AD}' => {}
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Script-preserving cleanup.
///
/// Control characters are removed, typographic quotes are dropped, dash
/// variants become `-`, and the ellipsis becomes `...`. Latin letters lose
/// their diacritics and Latin ligatures are spelled out; characters from every
/// other script pass through untouched.
pub fn script_cleanup(value: &str) -> String {
    let stripped = strip_controls(value);
    let mut out = String::with_capacity(stripped.len());
    let mut after_latin = false;
    for c in stripped.chars() {
        if is_combining_mark(c) {
            if !after_latin {
                out.push(c);
            }
            continue;
        }
        after_latin = false;
        match c {
            '\'' | '`' | '\u{00B4}' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}'
            | '"' | '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2032}'
            | '\u{2033}' => {}
            '\u{2010}'..='\u{2015}' | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            c if is_latin(c) => {
                after_latin = true;
                fold_latin(c, &mut out);
            }
            c => out.push(c),
        }
    }
    out
}

/// Replaces every character other than letters, digits, combining marks and
/// `.` with a space, then collapses whitespace.
pub fn collapse_separators(value: &str) -> String {
    let spaced: String = value
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || is_combining_mark(c) {
                c
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&spaced)
}

/// Turns remaining `.` characters into spaces and collapses whitespace.
pub fn strip_dots(value: &str) -> String {
    collapse_whitespace(&value.replace('.', " "))
}

/// Collapses whitespace runs to one space and trims both ends.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True for letters in the Latin blocks (basic, Latin-1, extended A/B/additional/C/D).
pub fn is_latin(c: char) -> bool {
    matches!(c,
        'A'..='Z'
        | 'a'..='z'
        | '\u{00C0}'..='\u{00D6}'
        | '\u{00D8}'..='\u{00F6}'
        | '\u{00F8}'..='\u{024F}'
        | '\u{1E00}'..='\u{1EFF}'
        | '\u{2C60}'..='\u{2C7F}'
        | '\u{A720}'..='\u{A7FF}')
}

fn fold_latin(c: char, out: &mut String) {
    let ligature = match c {
        'æ' => "ae",
        'Æ' => "AE",
        'œ' => "oe",
        'Œ' => "OE",
        'ø' => "o",
        'Ø' => "O",
        'ß' => "ss",
        'ẞ' => "SS",
        'ð' => "d",
        'Ð' => "D",
        'þ' => "th",
        'Þ' => "TH",
        'ł' => "l",
        'Ł' => "L",
        'đ' => "d",
        'Đ' => "D",
        'ı' => "i",
        'ħ' => "h",
        'Ħ' => "H",
        'ŋ' => "ng",
        'Ŋ' => "NG",
        _ => "",
    };
    if !ligature.is_empty() {
        out.push_str(ligature);
        return;
    }
    if c.is_ascii() {
        out.push(c);
        return;
    }
    out.extend(std::iter::once(c).nfd().filter(|d| !is_combining_mark(*d)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nfc_composes_decomposed_input() {
        assert_eq!(nfc("Cafe\u{0301}"), "Caf\u{00E9}");
    }

    #[test]
    fn latin_diacritics_and_ligatures_fold() {
        assert_eq!(script_cleanup("Société Générale"), "Societe Generale");
        assert_eq!(script_cleanup("Æther Straße Ørsted"), "AEther Strasse Orsted");
    }

    #[test]
    fn non_latin_scripts_pass_through() {
        assert_eq!(script_cleanup("東京都庁"), "東京都庁");
        assert_eq!(script_cleanup("Москва Ёлка"), "Москва Ёлка");
        assert_eq!(script_cleanup("नगर निगम"), "नगर निगम");
    }

    #[test]
    fn quotes_dashes_and_controls() {
        assert_eq!(script_cleanup("O’Brien\u{0007}—Sons"), "OBrien-Sons");
        assert_eq!(script_cleanup("Wait\u{2026}"), "Wait...");
    }

    #[test]
    fn separators_collapse_but_dots_survive() {
        assert_eq!(collapse_separators("  Acme,  Inc.\t| x/y "), "Acme Inc. x y");
        assert_eq!(strip_dots("U.S. Steel"), "U S Steel");
    }
}
