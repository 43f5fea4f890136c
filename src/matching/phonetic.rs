// src/matching/phonetic.rs
//! Phonetic codes and keyboard geometry used by typo detection.
//!
//! - Soundex: first letter + 3 digits (e.g. "Robert" -> "R163")
//! - Metaphone: consonant skeleton by pronunciation (e.g. "Apple" -> "APL")
//! - QWERTY key positions for adjacency scoring

fn soundex_digit(c: char) -> Option<char> {
    match c {
        'B' | 'F' | 'P' | 'V' => Some('1'),
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
        'D' | 'T' => Some('3'),
        'L' => Some('4'),
        'M' | 'N' => Some('5'),
        'R' => Some('6'),
        _ => None,
    }
}

/// American Soundex. Non-letters are ignored; empty input yields "".
pub fn soundex(s: &str) -> String {
    let letters: Vec<char> = s
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let first = match letters.first() {
        Some(c) => *c,
        None => return String::new(),
    };

    let mut result = String::with_capacity(4);
    result.push(first);
    let mut prev = soundex_digit(first);

    for &c in &letters[1..] {
        if result.len() >= 4 {
            break;
        }
        let code = soundex_digit(c);
        match code {
            Some(digit) if code != prev => {
                result.push(digit);
                prev = code;
            }
            Some(_) => {}
            // H and W do not separate letters with the same code; vowels do.
            None if c == 'H' || c == 'W' => {}
            None => prev = None,
        }
    }

    while result.len() < 4 {
        result.push('0');
    }
    result
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'A' | 'E' | 'I' | 'O' | 'U')
}

/// Original Metaphone (Philips, 1990) over ASCII letters.
pub fn metaphone(s: &str) -> String {
    let mut w: Vec<char> = s
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if w.is_empty() {
        return String::new();
    }

    // Initial-letter exceptions
    match (w.first().copied(), w.get(1).copied()) {
        (Some('A'), Some('E'))
        | (Some('G'), Some('N'))
        | (Some('K'), Some('N'))
        | (Some('P'), Some('N'))
        | (Some('W'), Some('R')) => {
            w.remove(0);
        }
        (Some('X'), _) => w[0] = 'S',
        (Some('W'), Some('H')) => {
            w.remove(1);
        }
        _ => {}
    }

    let at = |i: isize| -> Option<char> {
        if i < 0 {
            None
        } else {
            w.get(i as usize).copied()
        }
    };
    let front_vowel = |c: Option<char>| matches!(c, Some('E') | Some('I') | Some('Y'));

    let mut code = String::with_capacity(w.len());
    let len = w.len() as isize;

    for i in 0..len {
        let c = w[i as usize];
        let prev = at(i - 1);
        let next = at(i + 1);
        let next2 = at(i + 2);

        if prev == Some(c) && c != 'C' {
            continue;
        }

        match c {
            'A' | 'E' | 'I' | 'O' | 'U' => {
                if i == 0 {
                    code.push(c);
                }
            }
            'B' => {
                if !(i == len - 1 && prev == Some('M')) {
                    code.push('B');
                }
            }
            'C' => {
                if next == Some('I') && next2 == Some('A') {
                    code.push('X');
                } else if next == Some('H') {
                    if prev == Some('S') {
                        code.push('K');
                    } else {
                        code.push('X');
                    }
                } else if front_vowel(next) {
                    if prev != Some('S') {
                        code.push('S');
                    }
                } else {
                    code.push('K');
                }
            }
            'D' => {
                if next == Some('G') && front_vowel(next2) {
                    code.push('J');
                } else {
                    code.push('T');
                }
            }
            'G' => {
                let silent_gh = next == Some('H') && !next2.map_or(true, is_vowel);
                let silent_gn = next == Some('N') && (i + 2 == len || (next2 == Some('E') && at(i + 3) == Some('D')));
                if silent_gh || silent_gn || (prev == Some('D') && front_vowel(next)) {
                    continue;
                }
                if front_vowel(next) {
                    code.push('J');
                } else {
                    code.push('K');
                }
            }
            'H' => {
                let after_modifier = matches!(prev, Some('C') | Some('S') | Some('P') | Some('T') | Some('G'));
                if !after_modifier && next.map_or(false, is_vowel) {
                    code.push('H');
                }
            }
            'K' => {
                if prev != Some('C') {
                    code.push('K');
                }
            }
            'P' => {
                if next == Some('H') {
                    code.push('F');
                } else {
                    code.push('P');
                }
            }
            'Q' => code.push('K'),
            'S' => {
                if next == Some('H') {
                    code.push('X');
                } else if next == Some('I') && matches!(next2, Some('O') | Some('A')) {
                    code.push('X');
                } else {
                    code.push('S');
                }
            }
            'T' => {
                if next == Some('I') && matches!(next2, Some('O') | Some('A')) {
                    code.push('X');
                } else if next == Some('H') {
                    code.push('0');
                } else if !(next == Some('C') && next2 == Some('H')) {
                    code.push('T');
                }
            }
            'V' => code.push('F'),
            'W' | 'Y' => {
                if next.map_or(false, is_vowel) {
                    code.push(c);
                }
            }
            'X' => code.push_str("KS"),
            'Z' => code.push('S'),
            other => code.push(other),
        }
    }

    code
}

const KEYBOARD_ROWS: [&str; 4] = ["1234567890", "qwertyuiop", "asdfghjkl", "zxcvbnm"];

/// (row, column) of a key on a QWERTY layout.
pub fn key_position(c: char) -> Option<(i32, i32)> {
    let lowered = c.to_ascii_lowercase();
    KEYBOARD_ROWS.iter().enumerate().find_map(|(row, keys)| {
        keys.find(lowered).map(|col| (row as i32, col as i32))
    })
}

/// Manhattan distance between two keys, `None` if either is off the layout.
pub fn key_distance(a: char, b: char) -> Option<i32> {
    let (ra, ca) = key_position(a)?;
    let (rb, cb) = key_position(b)?;
    Some((ra - rb).abs() + (ca - cb).abs())
}

/// Keys at Manhattan distance 1 from `c`.
pub fn adjacent_keys(c: char) -> Vec<char> {
    KEYBOARD_ROWS
        .iter()
        .flat_map(|row| row.chars())
        .filter(|k| key_distance(c, *k) == Some(1))
        .collect()
}
