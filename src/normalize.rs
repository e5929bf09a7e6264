//! Text normalization shared by the parser and the matcher.
//!
//! Circular text arrives in three shapes: a clean text layer, a text layer
//! built from Arabic *presentation forms* (U+FE80–U+FEFC, one codepoint per
//! contextual glyph shape), or OCR output full of harakat and bidi marks.
//! Everything downstream compares strings, so every shape is first brought
//! to the same logical codepoints.
//!
//! Three entry points, each a superset of the previous:
//!
//! * [`canonicalize`]: presentation forms → logical letters, Arabic-Indic
//!   digits → ASCII, harakat/tatweel/bidi controls removed.
//! * [`normalize_lines`]: canonicalize + per-line whitespace collapse.
//!   Keeps line breaks and case; this is what the parser consumes.
//! * [`normalize`]: the full matching key: canonicalize, case-fold,
//!   punctuation noise → space, single-space collapse, trim.
//!
//! All three are pure and idempotent.

/// First codepoint of the Arabic Presentation Forms-B letter block.
const PRESENTATION_FORMS_START: u32 = 0xFE80;

/// Letter for each run of presentation forms starting at U+FE80, with the
/// number of contextual shapes (isolated/final/initial/medial) in the run.
const PRESENTATION_FORM_RUNS: &[(&str, u32)] = &[
    ("\u{0621}", 1),         // hamza
    ("\u{0622}", 2),         // alef madda
    ("\u{0623}", 2),         // alef hamza above
    ("\u{0624}", 2),         // waw hamza
    ("\u{0625}", 2),         // alef hamza below
    ("\u{0626}", 4),         // yeh hamza
    ("\u{0627}", 2),         // alef
    ("\u{0628}", 4),         // beh
    ("\u{0629}", 2),         // teh marbuta
    ("\u{062A}", 4),         // teh
    ("\u{062B}", 4),         // theh
    ("\u{062C}", 4),         // jeem
    ("\u{062D}", 4),         // hah
    ("\u{062E}", 4),         // khah
    ("\u{062F}", 2),         // dal
    ("\u{0630}", 2),         // thal
    ("\u{0631}", 2),         // reh
    ("\u{0632}", 2),         // zain
    ("\u{0633}", 4),         // seen
    ("\u{0634}", 4),         // sheen
    ("\u{0635}", 4),         // sad
    ("\u{0636}", 4),         // dad
    ("\u{0637}", 4),         // tah
    ("\u{0638}", 4),         // zah
    ("\u{0639}", 4),         // ain
    ("\u{063A}", 4),         // ghain
    ("\u{0641}", 4),         // feh
    ("\u{0642}", 4),         // qaf
    ("\u{0643}", 4),         // kaf
    ("\u{0644}", 4),         // lam
    ("\u{0645}", 4),         // meem
    ("\u{0646}", 4),         // noon
    ("\u{0647}", 4),         // heh
    ("\u{0648}", 2),         // waw
    ("\u{0649}", 2),         // alef maksura
    ("\u{064A}", 4),         // yeh
    ("\u{0644}\u{0622}", 2), // lam-alef madda
    ("\u{0644}\u{0623}", 2), // lam-alef hamza above
    ("\u{0644}\u{0625}", 2), // lam-alef hamza below
    ("\u{0644}\u{0627}", 2), // lam-alef
];

/// Map one presentation-form codepoint to its logical letter(s).
fn presentation_form(c: char) -> Option<&'static str> {
    let cp = c as u32;
    if !(PRESENTATION_FORMS_START..=0xFEFC).contains(&cp) {
        return None;
    }
    let mut offset = cp - PRESENTATION_FORMS_START;
    for (letters, shapes) in PRESENTATION_FORM_RUNS {
        if offset < *shapes {
            return Some(letters);
        }
        offset -= shapes;
    }
    None
}

/// Harakat, tatweel, zero-width and bidi formatting characters.
fn is_stripped_mark(c: char) -> bool {
    matches!(c,
        '\u{064B}'..='\u{065F}'   // fathatan .. wavy hamza below
        | '\u{0670}'              // superscript alef
        | '\u{0640}'              // tatweel
        | '\u{FE70}'..='\u{FE7F}' // isolated/medial harakat forms
        | '\u{200B}'..='\u{200F}' // zero-width space/joiners, LRM, RLM
        | '\u{202A}'..='\u{202E}' // embeddings and overrides
        | '\u{2066}'..='\u{2069}' // isolates
        | '\u{FEFF}'              // BOM
        | '\u{00AD}'              // soft hyphen
    )
}

fn arabic_indic_digit(c: char) -> Option<char> {
    let base = match c {
        '\u{0660}'..='\u{0669}' => 0x0660,
        '\u{06F0}'..='\u{06F9}' => 0x06F0,
        _ => return None,
    };
    char::from_digit(c as u32 - base, 10)
}

/// Steps 1 and 2: logical codepoints, no diacritics or formatting marks.
///
/// Case, punctuation and whitespace are untouched.
pub fn canonicalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if is_stripped_mark(c) {
            continue;
        }
        if let Some(letters) = presentation_form(c) {
            out.push_str(letters);
        } else if let Some(d) = arabic_indic_digit(c) {
            out.push(d);
        } else if c == '\u{00A0}' || c == '\u{202F}' {
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

/// Canonicalize and collapse whitespace inside each line.
///
/// Blank lines are dropped; line order is preserved.
pub fn normalize_lines(text: &str) -> String {
    let canonical = canonicalize(text);
    let mut out = String::with_capacity(canonical.len());
    for line in canonical.lines() {
        let collapsed = collapse_whitespace(line);
        if collapsed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&collapsed);
    }
    out
}

/// Full matching key: canonical, case-folded, noise-free, single-spaced.
///
/// ```rust
/// use circulaire_extract::normalize::normalize;
///
/// assert_eq!(normalize(" ELIXTRA  2.5mg "), normalize("elixtra 2.5mg"));
/// assert_eq!(normalize("Gél. (Bt/30)"), "gel. bt 30");
/// ```
pub fn normalize(text: &str) -> String {
    let folded: Vec<char> = canonicalize(text)
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_latin_accent)
        .collect();

    let mut cleaned = String::with_capacity(folded.len());
    for (i, &c) in folded.iter().enumerate() {
        let noise = match c {
            '®' | '™' | '©' | '/' | '\\' | '(' | ')' | '[' | ']' | '{' | '}' | '|' => true,
            '–' | '—' => true,
            '-' => {
                let before = i.checked_sub(1).and_then(|j| folded.get(j));
                let after = folded.get(i + 1);
                !matches!((before, after), (Some(b), Some(a)) if b.is_alphanumeric() && a.is_alphanumeric())
            }
            _ => false,
        };
        cleaned.push(if noise { ' ' } else { c });
    }
    collapse_whitespace(&cleaned)
}

/// Whitespace-delimited tokens of the matching key.
pub fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_latin_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'μ' => 'µ',
        other => other,
    }
}

/// Count of Arabic letters (logical or presentation forms) in `text`.
pub fn arabic_letter_count(text: &str) -> usize {
    text.chars()
        .filter(|c| {
            matches!(c,
                '\u{0621}'..='\u{064A}'
                | '\u{0671}'..='\u{06D3}'
                | '\u{FB50}'..='\u{FDFF}'
                | '\u{FE80}'..='\u{FEFC}')
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_case_and_whitespace_insensitive() {
        assert_eq!(normalize(" ELIXTRA  2.5mg "), normalize("elixtra 2.5mg"));
        assert_eq!(normalize(" ELIXTRA  2.5mg "), "elixtra 2.5mg");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "XARELTO® 10mg Comp.Pell. Bt/30",
            "  ﺍﺧﺘﺼﺎﺻﺎﺕ  ﺑﺸﺮﻳﺔ ",
            "CO-APROVEL - 150mg [Bt 28]",
            "a--b -c d-",
            "مُرَاجَعَة\u{200F} أسعار",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn presentation_forms_become_logical_letters() {
        // "اختصاصات" written with isolated/final/initial/medial forms.
        let shaped = "\u{FE8D}\u{FEA7}\u{FE98}\u{FEBC}\u{FE8E}\u{FEBC}\u{FE8E}\u{FE95}";
        assert_eq!(canonicalize(shaped), "اختصاصات");
    }

    #[test]
    fn lam_alef_ligature_expands() {
        assert_eq!(canonicalize("\u{FEFB}"), "\u{0644}\u{0627}");
        assert_eq!(canonicalize("\u{FEF7}"), "\u{0644}\u{0623}");
    }

    #[test]
    fn harakat_and_bidi_marks_are_stripped() {
        assert_eq!(canonicalize("مُرَاجَعَة"), "مراجعة");
        assert_eq!(canonicalize("\u{200F}SAIPH\u{200E}"), "SAIPH");
        assert_eq!(canonicalize("تـــونس"), "تونس");
    }

    #[test]
    fn arabic_indic_digits_map_to_ascii() {
        assert_eq!(canonicalize("٢٠٢٥/٠٣"), "2025/03");
        assert_eq!(canonicalize("۱۲"), "12");
    }

    #[test]
    fn separator_hyphens_removed_but_compound_kept() {
        assert_eq!(normalize("DOLIPRANE - 500mg"), "doliprane 500mg");
        assert_eq!(normalize("CO-APROVEL"), "co-aprovel");
    }

    #[test]
    fn normalize_lines_keeps_lines_and_case() {
        let text = "  SAIPH  \n\n303760   DIARETYL 2mg\u{00A0}Gél.\n";
        assert_eq!(normalize_lines(text), "SAIPH\n303760 DIARETYL 2mg Gél.");
    }

    #[test]
    fn tokens_split_on_single_spaces() {
        assert_eq!(tokens("XARELTO  10mg (Bt 30)"), vec!["xarelto", "10mg", "bt", "30"]);
        assert!(tokens("  ").is_empty());
    }

    #[test]
    fn counts_arabic_letters() {
        assert_eq!(arabic_letter_count("SAIPH تونس 12"), 4);
        assert_eq!(arabic_letter_count("\u{FE8D}\u{FEA7}"), 2);
    }
}
